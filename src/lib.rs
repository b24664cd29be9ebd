pub mod api_connection;
pub mod assistant;
pub mod cli;
pub mod config;
pub mod dish_plan;
pub mod errors;
pub mod estimator;
pub mod fridge;
pub mod ingredient_matcher;
pub mod llm_json;
pub mod meal_planner;
pub mod models;
pub mod nutrient_table;
pub mod nutrition_aggregator;
pub mod pantry;
pub mod recipe_generator;
pub mod service;
pub mod store;
pub mod units;

use rand::Rng;

use crate::errors::EstimationError;
use crate::estimator::DeterministicEstimator;
use crate::meal_planner::WeekPlan;
use crate::models::{RecipeConstraints, UserProfile, UserTargets};
use crate::nutrition_aggregator::NutritionSummary;
use crate::recipe_generator::{RecipeVariant, RecipeVariationGenerator};

/// Offline text estimate against the built-in nutrient table.
pub fn estimate_nutrition_from_text(description: &str) -> NutritionSummary {
    DeterministicEstimator::default().summarize_text(description)
}

/// Offline image estimate. Identical bytes always give an identical summary.
pub fn estimate_nutrition_from_image_bytes(image_bytes: &[u8]) -> NutritionSummary {
    DeterministicEstimator::default().summarize_image(image_bytes)
}

pub fn generate_recipe_variations<R: Rng + ?Sized>(
    prompt: &str,
    constraints: &RecipeConstraints,
    count: usize,
    rng: &mut R,
) -> Vec<RecipeVariant> {
    RecipeVariationGenerator::default().generate(prompt, constraints, count, rng)
}

pub fn compute_user_targets(profile: &UserProfile) -> Result<UserTargets, EstimationError> {
    meal_planner::compute_user_targets(profile)
}

pub fn generate_week_plan(
    profile: &UserProfile,
    prompt_tags: &str,
    day_count: usize,
    meal_slots: &[String],
) -> Result<WeekPlan, EstimationError> {
    meal_planner::generate_week_plan(profile, prompt_tags, day_count, meal_slots)
}
