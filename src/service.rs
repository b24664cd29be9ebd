use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::api_connection::connection::TextCompletion;
use crate::assistant::{Assistant, ChatReply};
use crate::config::EngineConfig;
use crate::dish_plan::{generate_dish_plan, DishPlan};
use crate::errors::EstimationError;
use crate::estimator::{DeterministicEstimator, FallbackEstimator, NutritionEstimator, RemoteLlmEstimator};
use crate::fridge::{suggest_fridge_recipes, FridgeRecipe};
use crate::meal_planner::{
    generate_day_plan, generate_day_plan_assisted, generate_week_plan, generate_week_plan_assisted, DayPlan, WeekPlan,
};
use crate::models::{RecipeConstraints, UserProfile, UserTargets};
use crate::nutrient_table::NutrientTable;
use crate::nutrition_aggregator::NutritionSummary;
use crate::pantry::{enhance_recipe, generate_budget_plan, BudgetPlan, BudgetRecipe, Enhancement};
use crate::recipe_generator::{RecipeVariant, RecipeVariationGenerator};
use crate::store::{InMemoryRepository, Repository};

/// A result together with the id it was stored under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stored<T> {
    pub id: Uuid,
    #[serde(flatten)]
    pub value: T,
}

/// Decodes an image given either as raw base64 or as a `data:<mime>;base64,` URL.
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>> {
    let trimmed = payload.trim();
    let encoded = match trimmed.split_once(',') {
        Some((header, body)) if header.starts_with("data:") => body,
        _ => trimmed,
    };
    general_purpose::STANDARD
        .decode(encoded)
        .context("Image payload is not valid base64")
}

/// Entry point for callers: estimation, recipes, planning and chat, with every
/// result stored under a fresh id.
pub struct FoodService {
    estimator: FallbackEstimator,
    generator: RecipeVariationGenerator,
    completion: Option<Arc<dyn TextCompletion>>,
    assistant: Assistant,
    rng: Mutex<StdRng>,
    nutrition_store: Arc<dyn Repository<NutritionSummary>>,
    recipe_store: Arc<dyn Repository<RecipeVariant>>,
    fridge_store: Arc<dyn Repository<FridgeRecipe>>,
    budget_store: Arc<dyn Repository<BudgetRecipe>>,
}

impl FoodService {
    /// # Arguments
    /// * `table`: Nutrient facts used by the deterministic path.
    /// * `completion`: Optional remote backend consulted first.
    /// * `rng`: Source of recipe randomness.
    pub fn new(table: NutrientTable, completion: Option<Arc<dyn TextCompletion>>, rng: StdRng) -> Self {
        let deterministic = DeterministicEstimator::new(Arc::new(table));
        let primary = completion
            .clone()
            .map(|c| Arc::new(RemoteLlmEstimator::new(c)) as Arc<dyn NutritionEstimator>);

        Self {
            estimator: FallbackEstimator::new(primary, deterministic),
            generator: RecipeVariationGenerator::default(),
            assistant: Assistant::new(completion.clone()),
            completion,
            rng: Mutex::new(rng),
            nutrition_store: Arc::new(InMemoryRepository::new()),
            recipe_store: Arc::new(InMemoryRepository::new()),
            fridge_store: Arc::new(InMemoryRepository::new()),
            budget_store: Arc::new(InMemoryRepository::new()),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let table = config.nutrient_table()?;
        let completion = config
            .provider_chain()
            .map(|chain| Arc::new(chain) as Arc<dyn TextCompletion>);
        log::info!(
            "Food service ready: {} nutrient facts, remote completion {}",
            table.len(),
            if completion.is_some() { "enabled" } else { "disabled" }
        );
        Ok(Self::new(table, completion, config.recipe_rng()))
    }

    pub fn with_repositories(
        mut self,
        nutrition_store: Arc<dyn Repository<NutritionSummary>>,
        recipe_store: Arc<dyn Repository<RecipeVariant>>,
    ) -> Self {
        self.nutrition_store = nutrition_store;
        self.recipe_store = recipe_store;
        self
    }

    pub fn with_generator(mut self, generator: RecipeVariationGenerator) -> Self {
        self.generator = generator;
        self
    }

    fn store_summary(&self, summary: NutritionSummary) -> Stored<NutritionSummary> {
        let id = Uuid::new_v4();
        self.nutrition_store.put(id, summary.clone());
        Stored { id, value: summary }
    }

    pub async fn analyze_text(&self, description: &str) -> Stored<NutritionSummary> {
        let summary = self.estimator.summarize_text(description).await;
        self.store_summary(summary)
    }

    pub async fn analyze_image(&self, image_bytes: &[u8]) -> Stored<NutritionSummary> {
        let summary = self.estimator.summarize_image(image_bytes).await;
        self.store_summary(summary)
    }

    pub async fn analyze_image_payload(&self, payload: &str) -> Result<Stored<NutritionSummary>> {
        let bytes = decode_image_payload(payload)?;
        Ok(self.analyze_image(&bytes).await)
    }

    pub fn nutrition_result(&self, id: &Uuid) -> Option<NutritionSummary> {
        self.nutrition_store.get(id)
    }

    /// Generates variants and stores each one under its own id.
    pub fn recipe_variations(&self, prompt: &str, constraints: &RecipeConstraints, count: usize) -> Vec<RecipeVariant> {
        let variants = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.generator.generate(prompt, constraints, count, &mut *rng)
        };
        for variant in &variants {
            self.recipe_store.put(variant.id, variant.clone());
        }
        variants
    }

    pub fn recipe(&self, id: &Uuid) -> Option<RecipeVariant> {
        self.recipe_store.get(id)
    }

    pub fn user_targets(&self, profile: &UserProfile) -> Result<UserTargets, EstimationError> {
        crate::meal_planner::compute_user_targets(profile)
    }

    pub async fn week_plan(
        &self,
        profile: &UserProfile,
        prompt: &str,
        day_count: usize,
        slots: &[String],
    ) -> Result<WeekPlan, EstimationError> {
        match &self.completion {
            Some(completion) => generate_week_plan_assisted(completion.as_ref(), profile, prompt, day_count, slots).await,
            None => generate_week_plan(profile, prompt, day_count, slots),
        }
    }

    /// A single day at the full daily target, assisted when a backend answers.
    pub async fn day_plan(
        &self,
        profile: &UserProfile,
        prompt: &str,
        day_label: &str,
        slots: &[String],
    ) -> Result<DayPlan, EstimationError> {
        match &self.completion {
            Some(completion) => generate_day_plan_assisted(completion.as_ref(), profile, prompt, day_label, slots).await,
            None => generate_day_plan(profile, prompt, day_label, slots),
        }
    }

    /// Recipes for the given dishes, one per day, each stored like a variation.
    pub fn dish_plan(&self, dishes: &[String], constraints: &RecipeConstraints) -> Result<DishPlan, EstimationError> {
        let plan = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            generate_dish_plan(&self.generator, dishes, constraints, &mut *rng)?
        };
        for variant in &plan.recipes {
            self.recipe_store.put(variant.id, variant.clone());
        }
        Ok(plan)
    }

    pub async fn fridge_recipes(&self, items: &[String]) -> Result<Vec<FridgeRecipe>, EstimationError> {
        let recipes = suggest_fridge_recipes(self.completion.as_deref(), items).await?;
        for recipe in &recipes {
            self.fridge_store.put(recipe.id, recipe.clone());
        }
        Ok(recipes)
    }

    pub fn fridge_recipe(&self, id: &Uuid) -> Option<FridgeRecipe> {
        self.fridge_store.get(id)
    }

    pub fn budget_plan(&self, prompt: &str, day_count: usize, slots: &[String]) -> BudgetPlan {
        let plan = generate_budget_plan(prompt, day_count, slots);
        for recipe in plan.recipes() {
            self.budget_store.put(recipe.id, recipe.clone());
        }
        plan
    }

    pub fn budget_recipe(&self, id: &Uuid) -> Option<BudgetRecipe> {
        self.budget_store.get(id)
    }

    /// Applies `enhancement` to a stored budget recipe and stores the result under
    /// the same id. `None` when the id is unknown.
    pub fn enhance_budget_recipe(&self, id: &Uuid, enhancement: &Enhancement) -> Option<BudgetRecipe> {
        let mut recipe = self.budget_store.get(id)?;
        enhance_recipe(&mut recipe, enhancement);
        self.budget_store.put(*id, recipe.clone());
        log::debug!("Enhanced budget recipe {} ({:?})", id, enhancement);
        Some(recipe)
    }

    pub async fn chat(&self, message: &str) -> ChatReply {
        self.assistant.reply(message).await
    }
}
