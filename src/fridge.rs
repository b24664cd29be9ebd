use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::api_connection::connection::TextCompletion;
use crate::errors::EstimationError;
use crate::llm_json::{extract_json, parse_llm_json};
use crate::meal_planner::parse_calories_value;
use crate::models::{Difficulty, Source};
use crate::pantry::estimate_price_inr;

pub const FRIDGE_RECIPE_COUNT: usize = 3;
const MAX_FRIDGE_ITEMS: usize = 30;

const FRIDGE_SYSTEM_PROMPT: &str = "You are a recipe expert. Suggest simple recipes that primarily use the \
ingredients given, adding only minimal common pantry items. Output ONLY a JSON object with key \"recipes\" \
holding exactly 3 objects, each with: \"title\", \"time\" (e.g. \"20 min\"), \"servings\", \"calories\", \
\"ingredients\" (array of strings), \"instructions\" (array of strings), \"cuisine\", \"difficulty\", \
\"costBreakdown\" (short estimated prices in INR).";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FridgeRecipe {
    pub id: Uuid,
    pub title: String,
    pub time_minutes: u32,
    pub servings: u32,
    pub calories: u32,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub cuisine: String,
    pub difficulty: Difficulty,
    pub cost_breakdown: String,
    pub source: Source,
}

/// Trims, lowercases and de-duplicates fridge items, keeping the first 30.
pub fn normalize_fridge_items(items: &[String]) -> Result<Vec<String>, EstimationError> {
    let mut normalized: Vec<String> = Vec::new();
    for item in items.iter().map(|i| i.trim().to_lowercase()) {
        if !item.is_empty() && !normalized.contains(&item) {
            normalized.push(item);
        }
    }
    if normalized.is_empty() {
        return Err(EstimationError::EmptyRequest("no fridge ingredients given".to_string()));
    }
    if normalized.len() > MAX_FRIDGE_ITEMS {
        log::warn!("Keeping the first {} of {} fridge items", MAX_FRIDGE_ITEMS, normalized.len());
        normalized.truncate(MAX_FRIDGE_ITEMS);
    }
    Ok(normalized)
}

/// Reads an ingredient list from free text: a JSON array of strings when one is
/// present (as vision models tend to answer), otherwise comma or newline separated.
pub fn parse_ingredient_list(text: &str) -> Vec<String> {
    if let Some(Value::Array(values)) = extract_json(text) {
        return values
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    text.split([',', '\n'])
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn cost_breakdown(items: &[String], staples: &[&str]) -> String {
    let mut total = 0.0;
    let mut parts: Vec<String> = Vec::with_capacity(items.len() + staples.len() + 1);
    for name in items.iter().map(String::as_str).chain(staples.iter().copied()) {
        let price = estimate_price_inr(name);
        total += price;
        parts.push(format!("{}: {:.2} INR", name, price));
    }
    parts.push(format!("Total: {:.2} INR", total));
    parts.join(", ")
}

struct Template {
    title: &'static str,
    time_minutes: u32,
    servings: u32,
    calories: u32,
    cuisine: &'static str,
    staples: &'static [&'static str],
}

const PASTA: Template = Template {
    title: "Quick Pasta Primavera",
    time_minutes: 20,
    servings: 2,
    calories: 380,
    cuisine: "Italian",
    staples: &["pasta", "olive oil"],
};

const STIR_FRY: Template = Template {
    title: "Vegetable Stir Fry",
    time_minutes: 15,
    servings: 3,
    calories: 290,
    cuisine: "Asian",
    staples: &["oil", "soy sauce"],
};

const SALAD: Template = Template {
    title: "Garden Salad",
    time_minutes: 10,
    servings: 2,
    calories: 180,
    cuisine: "Mediterranean",
    staples: &["olive oil", "vinegar"],
};

impl Template {
    fn build(&self, ingredients: Vec<String>, instructions: Vec<String>) -> FridgeRecipe {
        FridgeRecipe {
            id: Uuid::new_v4(),
            title: self.title.to_string(),
            time_minutes: self.time_minutes,
            servings: self.servings,
            calories: self.calories,
            cost_breakdown: cost_breakdown(&ingredients, self.staples),
            ingredients,
            instructions,
            cuisine: self.cuisine.to_string(),
            difficulty: Difficulty::Easy,
            source: Source::Deterministic,
        }
    }
}

/// The three fixed suggestions: a pasta using the first three items, then a stir fry
/// and a salad using all of them.
pub fn fallback_fridge_recipes(items: &[String]) -> Vec<FridgeRecipe> {
    let first_three: Vec<String> = items.iter().take(3).cloned().collect();
    let all = items.join(", ");

    vec![
        PASTA.build(
            first_three.clone(),
            vec![
                "Boil pasta according to package instructions".to_string(),
                format!("Sauté {} in olive oil", first_three.join(", ")),
                "Combine pasta with sautéed vegetables".to_string(),
                "Season with salt and pepper to taste".to_string(),
            ],
        ),
        STIR_FRY.build(
            items.to_vec(),
            vec![
                format!("Chop {} into bite-sized pieces", all),
                "Heat oil in a wok or large pan".to_string(),
                "Add vegetables and stir-fry for 5-7 minutes".to_string(),
                "Add soy sauce and serve with rice".to_string(),
            ],
        ),
        SALAD.build(
            items.to_vec(),
            vec![
                format!("Wash and chop {}", all),
                "Combine in a large bowl".to_string(),
                "Drizzle with olive oil and vinegar".to_string(),
                "Season with salt and pepper".to_string(),
            ],
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct RemoteFridgeRecipe {
    title: String,
    #[serde(default)]
    time: Option<Value>,
    #[serde(default)]
    servings: Option<Value>,
    #[serde(default)]
    calories: Option<Value>,
    #[serde(default)]
    ingredients: Vec<String>,
    #[serde(default)]
    instructions: Vec<String>,
    #[serde(default)]
    cuisine: String,
    #[serde(default)]
    difficulty: String,
    #[serde(default, rename = "costBreakdown")]
    cost_breakdown: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FridgeReply {
    Wrapped { recipes: Vec<RemoteFridgeRecipe> },
    Bare(Vec<RemoteFridgeRecipe>),
}

/// Validates a model reply: exactly three recipes, each with a title and steps.
pub fn recipes_from_remote_reply(reply: &str) -> Result<Vec<FridgeRecipe>, EstimationError> {
    let recipes = match parse_llm_json::<FridgeReply>(reply)? {
        FridgeReply::Wrapped { recipes } | FridgeReply::Bare(recipes) => recipes,
    };
    if recipes.len() != FRIDGE_RECIPE_COUNT {
        return Err(EstimationError::MalformedExternalResponse(format!(
            "expected {} recipes, got {}",
            FRIDGE_RECIPE_COUNT,
            recipes.len()
        )));
    }

    recipes
        .into_iter()
        .map(|remote| {
            let title = remote.title.trim().to_string();
            if title.is_empty() || remote.instructions.is_empty() {
                return Err(EstimationError::MalformedExternalResponse("recipe without title or steps".to_string()));
            }
            Ok(FridgeRecipe {
                id: Uuid::new_v4(),
                title,
                time_minutes: parse_calories_value(remote.time.as_ref(), 20) as u32,
                servings: parse_calories_value(remote.servings.as_ref(), 2) as u32,
                calories: parse_calories_value(remote.calories.as_ref(), 350) as u32,
                ingredients: remote.ingredients,
                instructions: remote.instructions,
                cuisine: remote.cuisine,
                difficulty: Difficulty::from_string(&remote.difficulty).unwrap_or(Difficulty::Easy),
                cost_breakdown: remote.cost_breakdown,
                source: Source::RemoteLlm,
            })
        })
        .collect()
}

/// Three recipe ideas for what is in the fridge. The remote backend is asked first;
/// any failure or off-schema reply gives [`fallback_fridge_recipes`].
pub async fn suggest_fridge_recipes(
    completion: Option<&dyn TextCompletion>,
    items: &[String],
) -> Result<Vec<FridgeRecipe>, EstimationError> {
    let items = normalize_fridge_items(items)?;

    if let Some(completion) = completion {
        let user_prompt = format!("Ingredients: {}", items.join(", "));
        let remote = match completion.complete_text(FRIDGE_SYSTEM_PROMPT, &user_prompt).await {
            Ok(reply) => recipes_from_remote_reply(&reply),
            Err(err) => Err(err.into()),
        };
        match remote {
            Ok(recipes) => return Ok(recipes),
            Err(err) => log::warn!("Remote fridge recipes unavailable, using templates: {}", err),
        }
    }

    Ok(fallback_fridge_recipes(&items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::connection::ApiConnectionError;

    fn items(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_fridge_items() {
        let normalized = normalize_fridge_items(&items(&[" Tomato", "onion", "TOMATO", ""])).unwrap();
        assert_eq!(normalized, vec!["tomato", "onion"]);
        assert!(matches!(normalize_fridge_items(&items(&["  "])), Err(EstimationError::EmptyRequest(_))));
    }

    #[test]
    fn test_parse_ingredient_list_forms() {
        assert_eq!(parse_ingredient_list("```json\n[\"tomatoes\", \"onions\"]\n```"), vec!["tomatoes", "onions"]);
        assert_eq!(parse_ingredient_list("eggs, spinach\nfeta"), vec!["eggs", "spinach", "feta"]);
        assert!(parse_ingredient_list(" , ").is_empty());
    }

    #[test]
    fn test_fallback_templates_use_fridge_items() {
        let recipes = fallback_fridge_recipes(&items(&["tomato", "onion", "spinach", "paneer"]));
        assert_eq!(recipes.len(), FRIDGE_RECIPE_COUNT);
        assert_eq!(recipes[0].ingredients, vec!["tomato", "onion", "spinach"]);
        assert_eq!(recipes[1].ingredients.len(), 4);
        assert_eq!(recipes[2].title, "Garden Salad");
        assert!(recipes[0].instructions[1].contains("tomato, onion, spinach"));
        assert!(recipes[0].cost_breakdown.ends_with("Total: 78.00 INR"));
        assert!(recipes.iter().all(|r| r.source == Source::Deterministic));
        assert_ne!(recipes[0].id, recipes[1].id);
    }

    #[test]
    fn test_remote_reply_needs_exactly_three() {
        let one = r#"{"recipes": [{"title": "Shakshuka", "instructions": ["Cook"]}]}"#;
        assert!(recipes_from_remote_reply(one).is_err());

        let three = r#"[
            {"title": "A", "time": "25 min", "servings": "4", "calories": "510", "instructions": ["x"], "difficulty": "Medium"},
            {"title": "B", "instructions": ["y"]},
            {"title": "C", "instructions": ["z"], "costBreakdown": "Total: 90 INR"}
        ]"#;
        let recipes = recipes_from_remote_reply(three).unwrap();
        assert_eq!(recipes[0].time_minutes, 25);
        assert_eq!(recipes[0].servings, 4);
        assert_eq!(recipes[0].calories, 510);
        assert_eq!(recipes[0].difficulty, Difficulty::Medium);
        assert_eq!(recipes[1].time_minutes, 20);
        assert_eq!(recipes[2].cost_breakdown, "Total: 90 INR");
        assert!(recipes.iter().all(|r| r.source == Source::RemoteLlm));
    }

    struct Failing;

    #[async_trait::async_trait]
    impl TextCompletion for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete_text(&self, _system: &str, _user: &str) -> Result<String, ApiConnectionError> {
            Err(ApiConnectionError::NoProvidersAvailable)
        }
    }

    #[tokio::test]
    async fn test_suggest_falls_back_to_templates() {
        let recipes = suggest_fridge_recipes(Some(&Failing), &items(&["rice", "egg"])).await.unwrap();
        assert_eq!(recipes.len(), 3);
        assert_eq!(recipes[0].title, "Quick Pasta Primavera");

        let offline = suggest_fridge_recipes(None, &items(&["rice"])).await.unwrap();
        assert_eq!(offline[1].title, "Vegetable Stir Fry");

        assert!(suggest_fridge_recipes(None, &[]).await.is_err());
    }

    struct Canned(&'static str);

    #[async_trait::async_trait]
    impl TextCompletion for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete_text(&self, _system: &str, user: &str) -> Result<String, ApiConnectionError> {
            assert!(user.contains("tomato, basil"));
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_suggest_uses_valid_remote_reply() {
        let reply = Canned(
            r#"```json
{"recipes": [
  {"title": "Bruschetta", "time": "10 min", "instructions": ["Toast", "Top"]},
  {"title": "Caprese", "instructions": ["Slice"]},
  {"title": "Tomato Soup", "instructions": ["Simmer"]}
]}
```"#,
        );
        let recipes = suggest_fridge_recipes(Some(&reply), &items(&["Tomato", "basil"])).await.unwrap();
        let titles: Vec<&str> = recipes.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Bruschetta", "Caprese", "Tomato Soup"]);
        assert_eq!(recipes[0].time_minutes, 10);
    }
}
