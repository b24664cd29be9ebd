use std::sync::{Arc, LazyLock};
use std::time::Instant;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api_connection::connection::TextCompletion;
use crate::models::Source;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    NutritionAnalysis,
    FridgeIngredients,
    RecipeExtraction,
    DietPlan,
    FoodSafety,
    GeneralQuery,
}

impl Intent {
    /// Feature a client should route the user to, if any.
    pub fn redirect(&self) -> Option<&'static str> {
        match self {
            Intent::NutritionAnalysis => Some("extract-nutrition"),
            Intent::FridgeIngredients => Some("fridge"),
            Intent::RecipeExtraction => Some("extract-recipe"),
            Intent::DietPlan => Some("diet-plan"),
            Intent::FoodSafety | Intent::GeneralQuery => None,
        }
    }
}

// Checked in order; the first intent with a matching pattern wins.
static INTENT_PATTERNS: LazyLock<Vec<(Intent, Regex)>> = LazyLock::new(|| {
    let table: [(Intent, &[&str]); 5] = [
        (
            Intent::NutritionAnalysis,
            &[
                r"nutrition.*food",
                r"calories.*dish",
                r"nutrients.*meal",
                r"health.*benefits",
                r"food.*analysis",
                r"analyze.*nutrition",
                r"what.*nutrition",
                r"how.*healthy",
                r"food.*value",
                r"drink.*nutrition",
            ],
        ),
        (
            Intent::FridgeIngredients,
            &[
                r"fridge.*ingredients",
                r"ingredients.*fridge",
                r"what.*make.*ingredients",
                r"recipe.*ingredients",
                r"cook.*ingredients",
                r"make.*ingredients",
                r"what.*cook.*fridge",
                r"ingredients.*have",
                r"fridge.*what.*make",
            ],
        ),
        (
            Intent::RecipeExtraction,
            &[
                r"recipe.*dish",
                r"how.*make.*dish",
                r"cooking.*instructions",
                r"restaurant.*recipe",
                r"dish.*recipe",
                r"how.*cook",
                r"preparation.*steps",
                r"cooking.*method",
                r"make.*recipe",
            ],
        ),
        (
            Intent::DietPlan,
            &[
                r"diet.*plan",
                r"weekly.*diet",
                r"meal.*plan",
                r"food.*schedule",
                r"eating.*plan",
                r"nutrition.*plan",
                r"weekly.*menu",
                r"diet.*schedule",
                r"meal.*prep",
            ],
        ),
        (
            Intent::FoodSafety,
            &[
                r"safe.*eat",
                r"can.*eat",
                r"is.*safe",
                r"food.*safety",
                r"healthy.*drink",
                r"can.*drink",
                r"mix.*food",
                r"food.*combination",
            ],
        ),
    ];

    table
        .iter()
        .map(|(intent, patterns)| {
            let joined = patterns.iter().map(|p| format!("(?:{})", p)).collect::<Vec<_>>().join("|");
            (*intent, Regex::new(&joined).expect("valid intent pattern"))
        })
        .collect()
});

pub fn detect_intent(message: &str) -> Intent {
    let lowered = message.to_lowercase();
    INTENT_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(&lowered))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::GeneralQuery)
}

fn mentions_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Canned answer used when no completion backend replies.
pub fn fallback_reply(message: &str) -> String {
    let lowered = message.to_lowercase();

    if mentions_any(&lowered, &["sprite", "soda", "soft drink"]) && mentions_any(&lowered, &["milk", "dairy"]) {
        return "**Soda with milk: not recommended**\n\n\
                The acidity of carbonated soft drinks (pH around 3.3) curdles milk proteins. \
                The mixture can cause bloating and indigestion, and the acid is hard on tooth enamel.\n\n\
                **Better options:** milk with a flavored syrup, a fruit smoothie, or a yogurt drink."
            .to_string();
    }

    if mentions_any(&lowered, &["nutrition", "healthy", "calorie"]) {
        return "**Nutrition guidance**\n\n\
                For precise figures, check a food database or the nutrition label, and talk to a registered \
                dietitian about individual needs.\n\n\
                **Quick tips:** favour whole foods, balance your macronutrients, stay hydrated and watch portion sizes."
            .to_string();
    }

    if mentions_any(&lowered, &["recipe", "cook", "make"]) {
        return "**Recipe help**\n\n\
                Ask about a specific dish, for example \"How do I make chicken curry?\" or \"Easy pasta recipes\". \
                Mention the ingredients you have and any dietary preferences."
            .to_string();
    }

    format!(
        "**Culinary assistant**\n\n\
         You asked about: **\"{}\"**\n\n\
         Advanced answers are unavailable right now. In the meantime, the nutrition estimator, recipe \
         generator and diet planner all work offline.",
        message.trim()
    )
}

const ASSISTANT_SYSTEM_PROMPT: &str = "You are an expert nutritionist, chef and food scientist. \
Give accurate, practical answers about food, nutrition and cooking. Be specific when discussing food \
combinations, state health implications clearly, and format the answer with short **bold** sections.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub intent: Intent,
    pub reply: String,
    pub redirect: Option<String>,
    pub source: Source,
    pub elapsed_ms: u64,
}

/// Food Q&A: remote completion first, canned replies when it is missing or fails.
#[derive(Clone, Default)]
pub struct Assistant {
    completion: Option<Arc<dyn TextCompletion>>,
}

impl Assistant {
    pub fn new(completion: Option<Arc<dyn TextCompletion>>) -> Self {
        Self { completion }
    }

    pub fn offline() -> Self {
        Self::default()
    }

    pub fn has_remote(&self) -> bool {
        self.completion.is_some()
    }

    pub async fn reply(&self, message: &str) -> ChatReply {
        let started = Instant::now();
        let intent = detect_intent(message);
        log::debug!("Detected intent {:?}", intent);

        let remote = match (&self.completion, message.trim().is_empty()) {
            (Some(completion), false) => match completion.complete_text(ASSISTANT_SYSTEM_PROMPT, message).await {
                Ok(text) => Some(text),
                Err(err) => {
                    log::warn!("Assistant completion failed, using canned reply: {}", err);
                    None
                }
            },
            _ => None,
        };

        let (reply, source) = match remote {
            Some(text) => (text, Source::RemoteLlm),
            None => (fallback_reply(message), Source::Deterministic),
        };

        ChatReply {
            intent,
            reply,
            redirect: intent.redirect().map(str::to_string),
            source,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::connection::ApiConnectionError;

    #[test]
    fn test_detect_intent_examples() {
        assert_eq!(detect_intent("What is the nutrition of this food?"), Intent::NutritionAnalysis);
        assert_eq!(detect_intent("I have eggs in the fridge, what can I make with these ingredients"), Intent::FridgeIngredients);
        assert_eq!(detect_intent("How do I cook biryani?"), Intent::RecipeExtraction);
        assert_eq!(detect_intent("Build me a weekly diet plan"), Intent::DietPlan);
        assert_eq!(detect_intent("Is it safe to mix sprite and milk?"), Intent::FoodSafety);
        assert_eq!(detect_intent("hello there"), Intent::GeneralQuery);
    }

    #[test]
    fn test_redirects() {
        assert_eq!(Intent::DietPlan.redirect(), Some("diet-plan"));
        assert_eq!(Intent::FoodSafety.redirect(), None);
    }

    #[test]
    fn test_fallback_reply_topics() {
        assert!(fallback_reply("can I drink Sprite with milk").contains("not recommended"));
        assert!(fallback_reply("is this healthy").contains("Nutrition guidance"));
        assert!(fallback_reply("recipe for pancakes").contains("Recipe help"));
        assert!(fallback_reply("  what about tea  ").contains("\"what about tea\""));
    }

    struct Failing;

    #[async_trait::async_trait]
    impl TextCompletion for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete_text(&self, _system: &str, _user: &str) -> Result<String, ApiConnectionError> {
            Err(ApiConnectionError::EmptyResponse("failing".to_string()))
        }
    }

    struct Echo;

    #[async_trait::async_trait]
    impl TextCompletion for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete_text(&self, _system: &str, user: &str) -> Result<String, ApiConnectionError> {
            Ok(format!("echo: {}", user))
        }
    }

    #[tokio::test]
    async fn test_reply_prefers_remote() {
        let assistant = Assistant::new(Some(Arc::new(Echo)));
        let reply = assistant.reply("weekly meal plan please").await;
        assert_eq!(reply.reply, "echo: weekly meal plan please");
        assert_eq!(reply.source, Source::RemoteLlm);
        assert_eq!(reply.redirect.as_deref(), Some("diet-plan"));
    }

    #[tokio::test]
    async fn test_reply_falls_back_on_failure() {
        let assistant = Assistant::new(Some(Arc::new(Failing)));
        let reply = assistant.reply("how many calories in rice").await;
        assert_eq!(reply.source, Source::Deterministic);
        assert!(reply.reply.contains("Nutrition guidance"));

        let offline = Assistant::offline().reply("").await;
        assert_eq!(offline.intent, Intent::GeneralQuery);
        assert_eq!(offline.source, Source::Deterministic);
    }
}
