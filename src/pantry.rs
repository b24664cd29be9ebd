use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::meal_planner::{clamp_day_count, day_label};
use crate::models::{Confidence, Difficulty, Source};
use crate::units::to_grams;

const FALLBACK_PRICE_INR: f64 = 20.0;
const MIN_LINE_COST_INR: f64 = 1.0;
const BASELINE_GRAMS: f64 = 50.0;
const SPICE_COST_INR: f64 = 5.0;
const CUSTOM_COST_INR: f64 = 10.0;

pub const DEFAULT_BUDGET_SLOTS: [&str; 4] = ["breakfast", "lunch", "dinner", "snack"];

// First matching fragment wins, so "olive oil" must precede "oil".
const PRICES_INR: &[(&str, f64)] = &[
    ("tomato", 10.0),
    ("onion", 8.0),
    ("garlic", 3.0),
    ("bell pepper", 30.0),
    ("capsicum", 30.0),
    ("olive oil", 20.0),
    ("oil", 20.0),
    ("rice", 30.0),
    ("chicken", 120.0),
    ("egg", 8.0),
    ("paneer", 80.0),
    ("tofu", 50.0),
    ("flour", 25.0),
    ("banana", 7.0),
    ("bread", 30.0),
    ("yogurt", 25.0),
];

const MEAT_WORDS: &[&str] = &["chicken", "fish", "salmon", "beef", "pork"];

/// Rough market price in rupees for a typical unit (or 50 g) of an ingredient.
pub fn estimate_price_inr(name: &str) -> f64 {
    let name = name.to_lowercase();
    PRICES_INR
        .iter()
        .filter(|(fragment, _)| !(*fragment == "egg" && name.contains("eggplant")))
        .find(|(fragment, _)| name.contains(fragment))
        .map(|(_, price)| *price)
        .unwrap_or(FALLBACK_PRICE_INR)
}

fn mentions_any(title: &str, words: &[&str]) -> bool {
    words.iter().any(|w| title.contains(w))
}

/// Minutes a dish takes, guessed from words in its title.
pub fn estimate_time_for_title(title: &str) -> u32 {
    let title = title.to_lowercase();
    if mentions_any(&title, &["salad", "smoothie", "toast", "bowl"]) {
        10
    } else if mentions_any(&title, &["stir-fry", "pasta", "rice", "one-pot"]) {
        20
    } else if mentions_any(&title, &["grill", "bake"]) {
        30
    } else {
        25
    }
}

pub fn estimate_calories_for_title(title: &str) -> u32 {
    let title = title.to_lowercase();
    if mentions_any(&title, &["salad", "smoothie"]) {
        300
    } else if mentions_any(&title, &["bowl", "pasta"]) {
        450
    } else if mentions_any(&title, &["fried", "burger"]) {
        600
    } else {
        420
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mass and millilitre amounts are priced against a 50 g baseline, anything else
/// (pieces, spoons, cloves) per unit.
pub fn ingredient_cost_inr(name: &str, quantity: f64, unit: &str) -> f64 {
    let unit = unit.trim().to_lowercase();
    let baseline_units = match unit.as_str() {
        "ml" | "milliliter" | "millilitre" => Some(quantity),
        "g" | "gram" | "grams" | "kg" | "kilogram" | "kilograms" | "oz" | "ounce" | "ounces" => {
            to_grams(quantity, &unit)
        }
        _ => None,
    };
    let units = match baseline_units {
        Some(grams) => grams / BASELINE_GRAMS,
        None => quantity,
    };
    round2((estimate_price_inr(name) * units).max(MIN_LINE_COST_INR))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricedIngredient {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub cost_inr: f64,
}

impl PricedIngredient {
    pub fn new(name: &str, quantity: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            quantity,
            unit: unit.to_string(),
            cost_inr: ingredient_cost_inr(name, quantity, unit),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BudgetMacros {
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

/// A cheap everyday recipe with a rupee cost per ingredient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetRecipe {
    pub id: Uuid,
    pub title: String,
    pub slot: String,
    pub time_minutes: u32,
    pub servings: u32,
    pub cost_inr: f64,
    pub calories: u32,
    pub ingredients: Vec<PricedIngredient>,
    pub instructions: Vec<String>,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub nutrition: BudgetMacros,
    pub confidence: Confidence,
    pub source: Source,
}

impl BudgetRecipe {
    fn recompute_cost(&mut self) {
        self.cost_inr = round2(self.ingredients.iter().map(|i| i.cost_inr).sum());
    }

    fn add_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }
}

fn slot_template(slot: &str) -> (Vec<PricedIngredient>, &'static [&'static str]) {
    match slot {
        "breakfast" => (
            vec![
                PricedIngredient::new("Rolled oats", 50.0, "g"),
                PricedIngredient::new("Milk or water", 200.0, "ml"),
                PricedIngredient::new("Banana", 1.0, "pc"),
                PricedIngredient::new("Peanut butter", 1.0, "tbsp"),
            ],
            &["quick", "vegetarian", "cheap"],
        ),
        "lunch" => (
            vec![
                PricedIngredient::new("Rice", 150.0, "g"),
                PricedIngredient::new("Mixed vegetables", 150.0, "g"),
                PricedIngredient::new("Onion", 1.0, "pc"),
                PricedIngredient::new("Tomato", 1.0, "pc"),
                PricedIngredient::new("Oil", 1.0, "tbsp"),
            ],
            &["one-pot", "budget"],
        ),
        "dinner" => (
            vec![
                PricedIngredient::new("Whole wheat pasta", 120.0, "g"),
                PricedIngredient::new("Tomato sauce", 100.0, "g"),
                PricedIngredient::new("Bell pepper", 1.0, "pc"),
                PricedIngredient::new("Garlic", 2.0, "cloves"),
                PricedIngredient::new("Olive oil", 1.0, "tbsp"),
            ],
            &["comfort", "quick"],
        ),
        _ => (
            vec![
                PricedIngredient::new("Yogurt", 150.0, "g"),
                PricedIngredient::new("Honey", 1.0, "tbsp"),
                PricedIngredient::new("Mixed nuts", 20.0, "g"),
            ],
            &["snack", "quick"],
        ),
    }
}

/// Builds the fixed template recipe for `slot` under `title`. Unknown slots get the
/// snack template. Only the id differs between calls.
pub fn build_template_recipe(title: &str, slot: &str) -> BudgetRecipe {
    let slot = slot.trim().to_lowercase();
    let (ingredients, tags) = slot_template(&slot);
    let mut recipe = BudgetRecipe {
        id: Uuid::new_v4(),
        title: title.to_string(),
        slot,
        time_minutes: estimate_time_for_title(title),
        servings: 2,
        cost_inr: 0.0,
        calories: estimate_calories_for_title(title),
        ingredients,
        instructions: vec![
            format!("Prep ingredients for {}.", title),
            "Heat a pan, cook main ingredients until tender.".to_string(),
            "Season to taste and serve.".to_string(),
        ],
        difficulty: Difficulty::Easy,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        nutrition: BudgetMacros { protein_g: 12.0, carbs_g: 45.0, fat_g: 14.0 },
        confidence: Confidence::High,
        source: Source::Deterministic,
    };
    recipe.recompute_cost();
    recipe
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Title for a slot. Students asking for quick or cheap food get named staples.
pub fn budget_meal_title(prompt: &str, slot: &str) -> String {
    let prompt = prompt.to_lowercase();
    let student_staples = prompt.contains("student") && (prompt.contains("quick") || prompt.contains("cheap"));
    if !student_staples {
        return format!("{} Recipe", capitalize(slot));
    }
    match slot {
        "breakfast" => "Quick Oats & Fruit Bowl".to_string(),
        "lunch" => "One-pot Veg Pulao".to_string(),
        "dinner" => "Simple Pasta with Veggies".to_string(),
        "snack" => "Yogurt & Nuts Snack".to_string(),
        other => format!("Quick {}", capitalize(other)),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetDay {
    pub day_label: String,
    pub meals: Vec<BudgetRecipe>,
    pub cost_inr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetPlan {
    pub days: Vec<BudgetDay>,
    pub total_cost_inr: f64,
}

impl BudgetPlan {
    pub fn recipes(&self) -> impl Iterator<Item = &BudgetRecipe> {
        self.days.iter().flat_map(|d| d.meals.iter())
    }

    /// Recomputes day and plan totals from the meal costs, e.g. after enhancing meals.
    pub fn refresh_costs(&mut self) {
        for day in &mut self.days {
            day.cost_inr = round2(day.meals.iter().map(|m| m.cost_inr).sum());
        }
        self.total_cost_inr = round2(self.days.iter().map(|d| d.cost_inr).sum());
    }
}

/// A plan of template recipes for `day_count` days (1..=14). Empty `slots` means
/// breakfast, lunch, dinner and snack.
pub fn generate_budget_plan(prompt: &str, day_count: usize, slots: &[String]) -> BudgetPlan {
    let mut normalized: Vec<String> = Vec::new();
    for slot in slots.iter().map(|s| s.trim().to_lowercase()) {
        if !slot.is_empty() && !normalized.contains(&slot) {
            normalized.push(slot);
        }
    }
    if normalized.is_empty() {
        normalized = DEFAULT_BUDGET_SLOTS.iter().map(|s| s.to_string()).collect();
    }

    let days: Vec<BudgetDay> = (0..clamp_day_count(day_count))
        .map(|day_index| BudgetDay {
            day_label: day_label(day_index),
            meals: normalized
                .iter()
                .map(|slot| build_template_recipe(&budget_meal_title(prompt, slot), slot))
                .collect(),
            cost_inr: 0.0,
        })
        .collect();

    let mut plan = BudgetPlan { days, total_cost_inr: 0.0 };
    plan.refresh_costs();
    log::info!("Built {}-day budget plan costing {:.2} INR", plan.days.len(), plan.total_cost_inr);
    plan
}

/// Follow-up edits to a stored budget recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enhancement {
    /// Swaps meat and fish for tofu.
    Vegetarian,
    Spicier,
    DoublePortions,
    Custom(String),
}

impl Enhancement {
    /// Parses the enhancement names used by clients; `custom` needs instructions.
    pub fn from_parts(kind: &str, instructions: Option<&str>) -> Option<Self> {
        match kind.trim().to_lowercase().as_str() {
            "vegetarian" => Some(Enhancement::Vegetarian),
            "spicier" => Some(Enhancement::Spicier),
            "double-portions" | "double_portions" => Some(Enhancement::DoublePortions),
            "custom" => instructions
                .map(str::trim)
                .filter(|i| !i.is_empty())
                .map(|i| Enhancement::Custom(i.to_string())),
            _ => None,
        }
    }
}

pub fn enhance_recipe(recipe: &mut BudgetRecipe, enhancement: &Enhancement) {
    match enhancement {
        Enhancement::Vegetarian => {
            for ingredient in &mut recipe.ingredients {
                let name = ingredient.name.to_lowercase();
                if MEAT_WORDS.iter().any(|w| name.contains(w)) {
                    ingredient.name = "Tofu".to_string();
                    ingredient.cost_inr = round2(estimate_price_inr("tofu"));
                }
            }
            recipe.add_tag("vegetarian");
            recipe.recompute_cost();
        }
        Enhancement::Spicier => {
            recipe.ingredients.push(PricedIngredient {
                name: "Red chili powder".to_string(),
                quantity: 1.0,
                unit: "tsp".to_string(),
                cost_inr: SPICE_COST_INR,
            });
            recipe.instructions.push("Add extra red chili powder to taste.".to_string());
            recipe.add_tag("spicy");
            recipe.recompute_cost();
        }
        Enhancement::DoublePortions => {
            recipe.servings *= 2;
            for ingredient in &mut recipe.ingredients {
                ingredient.quantity = round2(ingredient.quantity * 2.0);
                ingredient.cost_inr = round2(ingredient.cost_inr * 2.0);
            }
            recipe.recompute_cost();
        }
        Enhancement::Custom(instructions) => {
            recipe.instructions.push(format!("Custom: {}", instructions));
            recipe.cost_inr = round2(recipe.cost_inr + CUSTOM_COST_INR);
            recipe.add_tag("custom");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_lookup_order() {
        assert_eq!(estimate_price_inr("Olive oil"), 20.0);
        assert_eq!(estimate_price_inr("Cherry tomatoes"), 10.0);
        assert_eq!(estimate_price_inr("Chicken thigh"), 120.0);
        assert_eq!(estimate_price_inr("Eggplant"), 20.0);
        assert_eq!(estimate_price_inr("Egg curry"), 8.0);
        assert_eq!(estimate_price_inr("Saffron"), 20.0);
    }

    #[test]
    fn test_title_heuristics() {
        assert_eq!(estimate_time_for_title("Greek Salad"), 10);
        assert_eq!(estimate_time_for_title("One-pot Veg Pulao"), 20);
        assert_eq!(estimate_time_for_title("Baked Potatoes"), 30);
        assert_eq!(estimate_time_for_title("Dal Tadka"), 25);
        assert_eq!(estimate_calories_for_title("Berry Smoothie"), 300);
        assert_eq!(estimate_calories_for_title("Simple Pasta with Veggies"), 450);
        assert_eq!(estimate_calories_for_title("Fried Rice"), 600);
        assert_eq!(estimate_calories_for_title("Dal Tadka"), 420);
    }

    #[test]
    fn test_ingredient_cost_baselines() {
        assert_eq!(ingredient_cost_inr("Rice", 150.0, "g"), 90.0);
        assert_eq!(ingredient_cost_inr("Rice", 0.15, "kg"), 90.0);
        assert_eq!(ingredient_cost_inr("Onion", 1.0, "pc"), 8.0);
        assert_eq!(ingredient_cost_inr("Milk or water", 200.0, "ml"), 80.0);
        assert_eq!(ingredient_cost_inr("Garlic", 0.1, "cloves"), MIN_LINE_COST_INR);
    }

    #[test]
    fn test_template_recipe_cost_is_sum_of_lines() {
        let recipe = build_template_recipe("One-pot Veg Pulao", "Lunch");
        assert_eq!(recipe.slot, "lunch");
        assert_eq!(recipe.ingredients.len(), 5);
        let line_sum: f64 = recipe.ingredients.iter().map(|i| i.cost_inr).sum();
        assert!((recipe.cost_inr - line_sum).abs() < 0.001);
        assert_eq!(recipe.time_minutes, 20);
        assert_eq!(recipe.confidence, Confidence::High);
        assert!(recipe.tags.contains(&"budget".to_string()));

        let snack = build_template_recipe("Midnight Bite", "supper");
        assert_eq!(snack.ingredients[0].name, "Yogurt");
    }

    #[test]
    fn test_budget_plan_defaults_and_student_titles() {
        let plan = generate_budget_plan("cheap food for a student", 2, &[]);
        assert_eq!(plan.days.len(), 2);
        assert_eq!(plan.days[1].day_label, "Tuesday");
        let titles: Vec<&str> = plan.days[0].meals.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Quick Oats & Fruit Bowl", "One-pot Veg Pulao", "Simple Pasta with Veggies", "Yogurt & Nuts Snack"]
        );
        let day_sum: f64 = plan.days.iter().map(|d| d.cost_inr).sum();
        assert!((plan.total_cost_inr - day_sum).abs() < 0.001);
        assert_eq!(plan.recipes().count(), 8);

        let generic = generate_budget_plan("", 20, &["Dinner".to_string(), "dinner".to_string()]);
        assert_eq!(generic.days.len(), 14);
        assert_eq!(generic.days[0].meals.len(), 1);
        assert_eq!(generic.days[0].meals[0].title, "Dinner Recipe");
        assert_eq!(generic.days[13].day_label, "Sunday (Week 2)");
    }

    #[test]
    fn test_enhancements() {
        let mut recipe = build_template_recipe("Lunch Recipe", "lunch");
        recipe.ingredients.push(PricedIngredient::new("Chicken breast", 1.0, "pc"));
        recipe.recompute_cost();
        let before = recipe.cost_inr;

        enhance_recipe(&mut recipe, &Enhancement::Vegetarian);
        assert!(recipe.ingredients.iter().all(|i| !i.name.to_lowercase().contains("chicken")));
        assert!(recipe.cost_inr < before);
        assert!(recipe.tags.contains(&"vegetarian".to_string()));

        let servings = recipe.servings;
        let cost = recipe.cost_inr;
        enhance_recipe(&mut recipe, &Enhancement::DoublePortions);
        assert_eq!(recipe.servings, servings * 2);
        assert!((recipe.cost_inr - cost * 2.0).abs() < 0.05);

        enhance_recipe(&mut recipe, &Enhancement::Spicier);
        enhance_recipe(&mut recipe, &Enhancement::Spicier);
        assert_eq!(recipe.tags.iter().filter(|t| *t == "spicy").count(), 1);
        assert_eq!(recipe.ingredients.last().map(|i| i.name.as_str()), Some("Red chili powder"));

        assert_eq!(Enhancement::from_parts("custom", Some("  ")), None);
        assert_eq!(Enhancement::from_parts("custom", Some(" more lime ")), Some(Enhancement::Custom("more lime".to_string())));
        assert_eq!(Enhancement::from_parts("Double-Portions", None), Some(Enhancement::DoublePortions));
        assert_eq!(Enhancement::from_parts("sweeter", None), None);
    }

    #[test]
    fn test_refresh_costs_after_enhancing_meals() {
        let mut plan = generate_budget_plan("", 2, &["lunch".to_string()]);
        let original = plan.total_cost_inr;
        enhance_recipe(&mut plan.days[1].meals[0], &Enhancement::Custom("extra herbs".to_string()));
        plan.refresh_costs();
        assert!((plan.total_cost_inr - (original + CUSTOM_COST_INR)).abs() < 0.001);
        assert!((plan.days[1].cost_inr - plan.days[0].cost_inr - CUSTOM_COST_INR).abs() < 0.001);
    }
}
