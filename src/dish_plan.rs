use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::errors::EstimationError;
use crate::meal_planner::MAX_PLAN_DAYS;
use crate::models::{round1, Cuisine, Difficulty, RecipeConstraints};
use crate::recipe_generator::{aisle_of, RecipeNutrition, RecipeVariant, RecipeVariationGenerator};

const PREP_MINUTES: u32 = 15;
const MAX_PREP_TIPS: usize = 3;
const GRAINS: &[&str] = &["rice", "pasta", "quinoa", "couscous", "noodles", "oats"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DishPlanEntry {
    pub day: String,
    pub dish: String,
    pub recipe_id: Uuid,
    pub title: String,
    pub description: String,
    pub prep_minutes: u32,
    pub cook_minutes: u32,
    pub difficulty: Difficulty,
    pub servings: u32,
    pub cuisine: Cuisine,
    pub variation_level: u8,
}

/// One recipe per requested dish, plus what to buy and how to prepare for the week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DishPlan {
    pub entries: Vec<DishPlanEntry>,
    pub recipes: Vec<RecipeVariant>,
    /// Aisle name to ingredient names, both sorted.
    pub shopping_list: BTreeMap<String, Vec<String>>,
    /// Per-serving figures averaged over the planned recipes.
    pub average_nutrition: RecipeNutrition,
    pub prep_tips: Vec<String>,
}

fn normalize_dishes(dishes: &[String]) -> Result<Vec<String>, EstimationError> {
    let mut normalized: Vec<String> =
        dishes.iter().map(|d| d.trim().to_string()).filter(|d| !d.is_empty()).collect();
    if normalized.is_empty() {
        return Err(EstimationError::EmptyRequest("at least one dish is required".to_string()));
    }
    if normalized.len() > MAX_PLAN_DAYS {
        log::warn!("Planning the first {} of {} dishes", MAX_PLAN_DAYS, normalized.len());
        normalized.truncate(MAX_PLAN_DAYS);
    }
    Ok(normalized)
}

pub fn build_shopping_list(recipes: &[RecipeVariant]) -> BTreeMap<String, Vec<String>> {
    let mut aisles: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for name in recipes.iter().flat_map(|r| r.ingredient_names()) {
        aisles.entry(aisle_of(&name).to_string()).or_default().insert(name);
    }
    aisles.into_iter().map(|(aisle, names)| (aisle, names.into_iter().collect())).collect()
}

fn average_nutrition(recipes: &[RecipeVariant]) -> RecipeNutrition {
    let count = recipes.len().max(1) as f64;
    let (mut calories, mut protein, mut carbs, mut fat) = (0.0, 0.0, 0.0, 0.0);
    for n in recipes.iter().map(|r| &r.nutrition) {
        calories += n.calories_per_serving as f64;
        protein += n.protein_g;
        carbs += n.carbs_g;
        fat += n.fat_g;
    }
    RecipeNutrition {
        calories_per_serving: (calories / count).round() as u32,
        protein_g: round1(protein / count),
        carbs_g: round1(carbs / count),
        fat_g: round1(fat / count),
    }
}

/// Up to three tips, picked in a fixed order from what the plan actually contains.
pub fn prep_tips(recipes: &[RecipeVariant], shopping_list: &BTreeMap<String, Vec<String>>) -> Vec<String> {
    let has_aisle = |aisle: &str| shopping_list.get(aisle).is_some_and(|items| !items.is_empty());
    let names: Vec<BTreeSet<String>> = recipes.iter().map(|r| r.ingredient_names()).collect();
    let has_grains = names.iter().flatten().any(|n| GRAINS.iter().any(|g| n.contains(g)));
    let overlapping = names
        .iter()
        .enumerate()
        .any(|(i, a)| names[i + 1..].iter().any(|b| !a.is_disjoint(b)));
    let gourmet = recipes.iter().any(|r| r.variation_level >= 3);

    let candidates = [
        (has_aisle("vegetables"), "Prep vegetables in advance to save time during the week"),
        (has_grains, "Cook grains in large batches for multiple meals"),
        (has_aisle("proteins"), "Marinate proteins the night before for better flavor"),
        (overlapping, "Use overlapping ingredients across different dishes"),
        (gourmet, "For gourmet recipes, prep sauces and dressings ahead"),
        (true, "Portion meals into containers for easy grab-and-go"),
    ];
    candidates
        .iter()
        .filter(|(applies, _)| *applies)
        .take(MAX_PREP_TIPS)
        .map(|(_, tip)| tip.to_string())
        .collect()
}

/// Plans one day per dish (at most 14), cycling variation levels 0 to 4.
///
/// # Arguments
/// * `generator`: builds each day's recipe from the dish name.
/// * `dishes`: dish names in day order; blank names are skipped.
/// * `constraints`: dietary, cuisine and difficulty options shared by every day.
/// * `rng`: source for every random choice.
pub fn generate_dish_plan<R: Rng + ?Sized>(
    generator: &RecipeVariationGenerator,
    dishes: &[String],
    constraints: &RecipeConstraints,
    rng: &mut R,
) -> Result<DishPlan, EstimationError> {
    let dishes = normalize_dishes(dishes)?;

    let recipes: Vec<RecipeVariant> = dishes
        .iter()
        .enumerate()
        .map(|(index, dish)| generator.variant_at_level(dish, constraints, index % 5, rng))
        .collect();

    let entries = dishes
        .iter()
        .zip(&recipes)
        .enumerate()
        .map(|(index, (dish, recipe))| DishPlanEntry {
            day: format!("Day {}", index + 1),
            dish: dish.clone(),
            recipe_id: recipe.id,
            title: recipe.title.clone(),
            description: recipe.description.clone(),
            prep_minutes: PREP_MINUTES,
            cook_minutes: recipe.time_minutes,
            difficulty: recipe.difficulty,
            servings: recipe.servings,
            cuisine: recipe.cuisine,
            variation_level: recipe.variation_level,
        })
        .collect();

    let shopping_list = build_shopping_list(&recipes);
    let prep_tips = prep_tips(&recipes, &shopping_list);
    let average_nutrition = average_nutrition(&recipes);
    log::info!("Planned {} dish day(s) across {} aisle(s)", recipes.len(), shopping_list.len());

    Ok(DishPlan { entries, recipes, shopping_list, average_nutrition, prep_tips })
}
