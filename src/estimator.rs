use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::api_connection::connection::TextCompletion;
use crate::errors::EstimationError;
use crate::ingredient_matcher::{contains_word, IngredientMatcher, IngredientMention};
use crate::llm_json::parse_llm_json;
use crate::models::{round1, Confidence, InputKind, Source};
use crate::nutrient_table::NutrientTable;
use crate::nutrition_aggregator::{aggregate, estimate, NutritionLineItem, NutritionSummary};
use crate::units::Quantity;

/// Anything that can turn a meal description or photo into a nutrition summary.
#[async_trait::async_trait]
pub trait NutritionEstimator: Send + Sync {
    async fn estimate_text(&self, description: &str) -> Result<NutritionSummary, EstimationError>;

    async fn estimate_image(&self, image_bytes: &[u8]) -> Result<NutritionSummary, EstimationError>;
}

struct DishTemplate {
    name: &'static str,
    items: &'static [(&'static str, Quantity)],
}

const IMAGE_DISHES: &[DishTemplate] = &[
    DishTemplate {
        name: "Grilled chicken with rice and vegetables",
        items: &[
            ("chicken breast", Quantity::Grams(150.0)),
            ("rice", Quantity::Grams(150.0)),
            ("mixed vegetables", Quantity::Grams(100.0)),
        ],
    },
    DishTemplate {
        name: "Salmon with potatoes",
        items: &[
            ("salmon", Quantity::Grams(140.0)),
            ("potato", Quantity::Grams(200.0)),
            ("mixed vegetables", Quantity::Grams(80.0)),
        ],
    },
    DishTemplate {
        name: "Tofu stir-fry with brown rice",
        items: &[
            ("tofu", Quantity::Grams(150.0)),
            ("brown rice", Quantity::Grams(150.0)),
            ("mixed vegetables", Quantity::Grams(120.0)),
        ],
    },
    DishTemplate {
        name: "Beef pasta bowl",
        items: &[
            ("pasta", Quantity::Grams(180.0)),
            ("beef", Quantity::Grams(100.0)),
            ("mixed vegetables", Quantity::Grams(60.0)),
        ],
    },
    DishTemplate {
        name: "Oatmeal with banana and yogurt",
        items: &[
            ("oats", Quantity::Grams(60.0)),
            ("banana", Quantity::Pieces(1)),
            ("yogurt", Quantity::Grams(150.0)),
        ],
    },
    DishTemplate {
        name: "Lentil and rice bowl",
        items: &[
            ("lentils", Quantity::Grams(200.0)),
            ("rice", Quantity::Grams(100.0)),
            ("mixed vegetables", Quantity::Grams(100.0)),
        ],
    },
];

const MIN_JITTERED_GRAMS: f64 = 10.0;

// (trigger words, key, quantity) tried in order when no ingredient resolves
const KEYWORD_HEURISTICS: &[(&[&str], &str, Quantity)] = &[
    (&["chicken", "breast"], "chicken breast", Quantity::Grams(150.0)),
    (&["rice", "biryani", "pulao", "pilaf", "fried rice"], "rice", Quantity::Grams(150.0)),
    (&["egg", "eggs", "omelette", "omelet"], "egg", Quantity::Pieces(2)),
    (&["salad", "vegetable", "vegetables", "veg", "veggies"], "mixed vegetables", Quantity::Grams(100.0)),
];

/// Table-driven estimator that never touches the network and never fails.
#[derive(Debug, Clone)]
pub struct DeterministicEstimator {
    table: Arc<NutrientTable>,
}

impl Default for DeterministicEstimator {
    fn default() -> Self {
        Self::new(Arc::new(NutrientTable::builtin()))
    }
}

impl DeterministicEstimator {
    pub fn new(table: Arc<NutrientTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &NutrientTable {
        &self.table
    }

    fn line_items(&self, mentions: &[IngredientMention]) -> Vec<NutritionLineItem> {
        mentions.iter().map(|m| estimate(m, &self.table)).collect()
    }

    /// Chicken breast 150 g with brown rice 100 g, at low confidence.
    pub fn default_summary(&self) -> NutritionSummary {
        let mentions = [
            IngredientMention::resolved("chicken breast", Some(Quantity::Grams(150.0))),
            IngredientMention::resolved("brown rice", Some(Quantity::Grams(100.0))),
        ];
        let mut summary = aggregate(self.line_items(&mentions));
        summary.description = "Mixed meal (deterministic fallback)".to_string();
        summary.confidence = Confidence::Low;
        summary.input_kind = InputKind::Fallback;
        summary.analysis = "fallback".to_string();
        summary
    }

    fn keyword_heuristic(&self, text: &str) -> Option<NutritionSummary> {
        let lowered = text.to_lowercase();
        let mentions: Vec<IngredientMention> = KEYWORD_HEURISTICS
            .iter()
            .filter(|(words, _, _)| words.iter().any(|w| contains_word(&lowered, w)))
            .map(|(_, key, quantity)| IngredientMention::resolved(key, Some(*quantity)))
            .collect();
        if mentions.is_empty() {
            return None;
        }

        let mut summary = aggregate(self.line_items(&mentions));
        summary.confidence = Confidence::Low;
        summary.analysis = "keyword_heuristic".to_string();
        Some(summary)
    }

    /// Text path: matcher and aggregator, then the keyword heuristic, then the
    /// default summary. Empty input yields the default summary.
    pub fn summarize_text(&self, description: &str) -> NutritionSummary {
        let text = description.trim();
        if text.is_empty() {
            return self.default_summary();
        }

        let matcher = IngredientMatcher::new(&self.table);
        let (resolved, unresolved): (Vec<_>, Vec<_>) = matcher
            .extract_mentions(text)
            .into_iter()
            .partition(|m| m.resolved_key.is_some());
        for mention in &unresolved {
            log::debug!("{}", EstimationError::UnresolvedIngredient(mention.raw_text.clone()));
        }

        if !resolved.is_empty() {
            log::debug!("Resolved {} ingredient mention(s) from text", resolved.len());
            return aggregate(self.line_items(&resolved));
        }

        self.keyword_heuristic(text).unwrap_or_else(|| {
            log::info!("No ingredients recognized, returning default summary");
            self.default_summary()
        })
    }

    /// Image path without any vision capability. The SHA-256 of the bytes picks a
    /// dish template and jitters each gram quantity by up to ±15 g, so identical
    /// bytes always give identical output.
    pub fn summarize_image(&self, image_bytes: &[u8]) -> NutritionSummary {
        if image_bytes.is_empty() {
            return self.default_summary();
        }

        let digest = Sha256::digest(image_bytes);
        let mut seed_bytes = [0u8; 8];
        seed_bytes.copy_from_slice(&digest[..8]);
        let seed = u64::from_be_bytes(seed_bytes);
        let dish = &IMAGE_DISHES[(seed % IMAGE_DISHES.len() as u64) as usize];

        let mentions: Vec<IngredientMention> = dish
            .items
            .iter()
            .enumerate()
            .map(|(i, (key, quantity))| {
                let quantity = match *quantity {
                    Quantity::Grams(grams) => {
                        let jitter = (digest[8 + i] % 31) as f64 - 15.0;
                        Quantity::Grams((grams + jitter).max(MIN_JITTERED_GRAMS))
                    }
                    pieces => pieces,
                };
                IngredientMention::resolved(key, Some(quantity))
            })
            .collect();

        log::debug!("Image hash {} mapped to '{}'", hex::encode(&digest[..8]), dish.name);
        let mut summary = aggregate(self.line_items(&mentions));
        summary.description = format!("{} (estimated from image)", dish.name);
        summary.confidence = Confidence::Low;
        summary.input_kind = InputKind::Image;
        summary.analysis = "image_hash_estimate".to_string();
        summary
    }
}

#[async_trait::async_trait]
impl NutritionEstimator for DeterministicEstimator {
    async fn estimate_text(&self, description: &str) -> Result<NutritionSummary, EstimationError> {
        Ok(self.summarize_text(description))
    }

    async fn estimate_image(&self, image_bytes: &[u8]) -> Result<NutritionSummary, EstimationError> {
        Ok(self.summarize_image(image_bytes))
    }
}

pub const NUTRITION_SYSTEM_PROMPT: &str = "You are a nutrition analyst. Estimate the nutrition of the meal the user \
describes. Reply with JSON only, no prose, shaped as: {\"description\": string, \"items\": [{\"name\": string, \
\"quantity\": string, \"calories\": number, \"protein_g\": number, \"carbs_g\": number, \"fat_g\": number}], \
\"total_calories\": number, \"confidence\": \"low\" | \"medium\" | \"high\"}";

#[derive(Debug, Deserialize)]
struct RemoteItem {
    name: String,
    #[serde(default)]
    quantity: Option<String>,
    calories: f64,
    #[serde(default, alias = "protein")]
    protein_g: f64,
    #[serde(default, alias = "carbs")]
    carbs_g: f64,
    #[serde(default, alias = "fats", alias = "fat")]
    fat_g: f64,
}

#[derive(Debug, Deserialize)]
struct RemoteEstimate {
    #[serde(default)]
    description: Option<String>,
    #[serde(alias = "identifiedIngredients", alias = "ingredients")]
    items: Vec<RemoteItem>,
    #[serde(default, alias = "totalCalories")]
    total_calories: Option<f64>,
    #[serde(default)]
    confidence: Option<String>,
}

fn parse_confidence(raw: Option<&str>) -> Confidence {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("high") => Confidence::High,
        Some("low") => Confidence::Low,
        _ => Confidence::Medium,
    }
}

/// Normalizes a model reply into a summary. Percentages are always recomputed from
/// the macro grams; the reported calorie total is kept when it is positive.
pub fn summary_from_remote_reply(reply: &str) -> Result<NutritionSummary, EstimationError> {
    let remote: RemoteEstimate = parse_llm_json(reply)?;
    if remote.items.is_empty() {
        return Err(EstimationError::MalformedExternalResponse("no items in estimate".to_string()));
    }

    let mut items = Vec::with_capacity(remote.items.len());
    for item in remote.items {
        let values = [item.calories, item.protein_g, item.carbs_g, item.fat_g];
        if item.name.trim().is_empty() || values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(EstimationError::MalformedExternalResponse(format!(
                "invalid item '{}' in estimate",
                item.name
            )));
        }
        items.push(NutritionLineItem {
            name: item.name.trim().to_string(),
            quantity_description: item.quantity.unwrap_or_else(|| "unspecified".to_string()),
            calories: round1(item.calories),
            protein_g: round1(item.protein_g),
            carbs_g: round1(item.carbs_g),
            fat_g: round1(item.fat_g),
        });
    }

    let mut summary = aggregate(items);
    if let Some(total) = remote.total_calories.filter(|t| t.is_finite() && *t > 0.0) {
        summary.total_calories = total.round() as i64;
    }
    if let Some(description) = remote.description.filter(|d| !d.trim().is_empty()) {
        summary.description = description;
    }
    summary.confidence = parse_confidence(remote.confidence.as_deref());
    summary.source = Source::RemoteLlm;
    summary.analysis = "remote_llm".to_string();
    Ok(summary)
}

/// Asks a text-completion backend for the estimate. Text only.
pub struct RemoteLlmEstimator {
    completion: Arc<dyn TextCompletion>,
}

impl RemoteLlmEstimator {
    pub fn new(completion: Arc<dyn TextCompletion>) -> Self {
        Self { completion }
    }
}

#[async_trait::async_trait]
impl NutritionEstimator for RemoteLlmEstimator {
    async fn estimate_text(&self, description: &str) -> Result<NutritionSummary, EstimationError> {
        let reply = self.completion.complete_text(NUTRITION_SYSTEM_PROMPT, description).await?;
        summary_from_remote_reply(&reply)
    }

    async fn estimate_image(&self, _image_bytes: &[u8]) -> Result<NutritionSummary, EstimationError> {
        Err(EstimationError::CapabilityUnavailable(format!(
            "{} cannot analyze images",
            self.completion.name()
        )))
    }
}

/// Remote first, deterministic on any failure. Never returns an error.
pub struct FallbackEstimator {
    primary: Option<Arc<dyn NutritionEstimator>>,
    fallback: DeterministicEstimator,
}

impl FallbackEstimator {
    pub fn new(primary: Option<Arc<dyn NutritionEstimator>>, fallback: DeterministicEstimator) -> Self {
        Self { primary, fallback }
    }

    pub fn deterministic_only(fallback: DeterministicEstimator) -> Self {
        Self::new(None, fallback)
    }

    pub fn deterministic(&self) -> &DeterministicEstimator {
        &self.fallback
    }

    pub async fn summarize_text(&self, description: &str) -> NutritionSummary {
        if description.trim().is_empty() {
            return self.fallback.default_summary();
        }
        if let Some(primary) = &self.primary {
            match primary.estimate_text(description).await {
                Ok(summary) => return summary,
                Err(err) => log::warn!("Remote text estimate failed, using local estimate: {}", err),
            }
        }
        self.fallback.summarize_text(description)
    }

    pub async fn summarize_image(&self, image_bytes: &[u8]) -> NutritionSummary {
        if image_bytes.is_empty() {
            return self.fallback.default_summary();
        }
        if let Some(primary) = &self.primary {
            match primary.estimate_image(image_bytes).await {
                Ok(summary) => return summary,
                Err(EstimationError::CapabilityUnavailable(detail)) => log::debug!("{}", detail),
                Err(err) => log::warn!("Remote image estimate failed, using local estimate: {}", err),
            }
        }
        self.fallback.summarize_image(image_bytes)
    }
}

#[async_trait::async_trait]
impl NutritionEstimator for FallbackEstimator {
    async fn estimate_text(&self, description: &str) -> Result<NutritionSummary, EstimationError> {
        Ok(self.summarize_text(description).await)
    }

    async fn estimate_image(&self, image_bytes: &[u8]) -> Result<NutritionSummary, EstimationError> {
        Ok(self.summarize_image(image_bytes).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::connection::ApiConnectionError;

    struct CannedCompletion(Result<&'static str, ()>);

    #[async_trait::async_trait]
    impl TextCompletion for CannedCompletion {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete_text(&self, _system: &str, _user: &str) -> Result<String, ApiConnectionError> {
            self.0
                .map(str::to_string)
                .map_err(|_| ApiConnectionError::NoProvidersAvailable)
        }
    }

    fn fallback_with(reply: Result<&'static str, ()>) -> FallbackEstimator {
        let remote: Arc<dyn NutritionEstimator> = Arc::new(RemoteLlmEstimator::new(Arc::new(CannedCompletion(reply))));
        FallbackEstimator::new(Some(remote), DeterministicEstimator::default())
    }

    #[test]
    fn test_empty_text_is_default_summary() {
        let estimator = DeterministicEstimator::default();
        let summary = estimator.summarize_text("   ");
        assert_eq!(summary.confidence, Confidence::Low);
        assert_eq!(summary.input_kind, InputKind::Fallback);
        assert_eq!(summary.line_items.len(), 2);
        assert_eq!(summary.total_calories, 359);
    }

    #[test]
    fn test_text_with_quantities() {
        let estimator = DeterministicEstimator::default();
        let summary = estimator.summarize_text("200g chicken breast and 2 eggs");
        assert_eq!(summary.confidence, Confidence::Medium);
        assert_eq!(summary.line_items.len(), 2);
        assert_eq!(summary.total_calories, 486);
        let line_sum: f64 = summary.line_items.iter().map(|i| i.calories).sum();
        assert_eq!(summary.total_calories, line_sum.round() as i64);
    }

    #[test]
    fn test_keyword_heuristic_and_default() {
        let estimator = DeterministicEstimator::default();
        let biryani = estimator.summarize_text("A plate of biryani with salad");
        assert_eq!(biryani.analysis, "keyword_heuristic");
        let names: Vec<_> = biryani.line_items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["rice", "mixed vegetables"]);
        assert_eq!(biryani.confidence, Confidence::Low);

        let nothing = estimator.summarize_text("a glass of water");
        assert_eq!(nothing.analysis, "fallback");
    }

    #[test]
    fn test_image_estimate_is_reproducible() {
        let estimator = DeterministicEstimator::default();
        let bytes = b"\x89PNG fake image payload".to_vec();
        let first = serde_json::to_string(&estimator.summarize_image(&bytes)).unwrap();
        let second = serde_json::to_string(&estimator.summarize_image(&bytes)).unwrap();
        assert_eq!(first, second);

        let summary = estimator.summarize_image(&bytes);
        assert_eq!(summary.input_kind, InputKind::Image);
        assert!(summary.total_calories > 0);
    }

    #[test]
    fn test_image_jitter_stays_within_bounds() {
        let estimator = DeterministicEstimator::default();
        for seed in 0u32..40 {
            let summary = estimator.summarize_image(&seed.to_le_bytes());
            let dish = IMAGE_DISHES
                .iter()
                .find(|d| summary.description.starts_with(d.name))
                .unwrap();
            for (item, (_, base)) in summary.line_items.iter().zip(dish.items.iter()) {
                if let Quantity::Grams(base) = base {
                    let grams: f64 = item.quantity_description.split(' ').next().unwrap().parse().unwrap();
                    assert!((grams - base).abs() <= 15.0, "{} vs {}", grams, base);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_fallback_uses_remote_reply() {
        let reply = "```json\n{\"description\": \"Toast\", \"items\": [{\"name\": \"toast\", \"quantity\": \"2 slices\", \
                     \"calories\": 160, \"protein_g\": 6, \"carbs_g\": 28, \"fat_g\": 2}], \"confidence\": \"high\"}\n```";
        let estimator = fallback_with(Ok(reply));
        let summary = estimator.summarize_text("two slices of toast").await;
        assert_eq!(summary.source, Source::RemoteLlm);
        assert_eq!(summary.confidence, Confidence::High);
        assert_eq!(summary.total_calories, 160);
        assert!((99..=101).contains(&summary.macros.percentage_sum()));
    }

    #[tokio::test]
    async fn test_fallback_on_failure_or_malformed_reply() {
        let failing = fallback_with(Err(()));
        let summary = failing.summarize_text("150g salmon").await;
        assert_eq!(summary.source, Source::Deterministic);
        assert_eq!(summary.line_items[0].name, "salmon");

        let malformed = fallback_with(Ok("I think it's about 400 calories"));
        let summary = malformed.summarize_text("150g salmon").await;
        assert_eq!(summary.source, Source::Deterministic);
        assert_eq!(summary.total_calories, 312);
    }

    #[tokio::test]
    async fn test_remote_image_falls_back_to_hash_estimate() {
        let estimator = fallback_with(Ok("{}"));
        let bytes = [1u8, 2, 3, 4];
        let summary = estimator.summarize_image(&bytes).await;
        assert_eq!(summary, DeterministicEstimator::default().summarize_image(&bytes));
    }
}
