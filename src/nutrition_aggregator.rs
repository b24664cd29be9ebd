use serde::{Deserialize, Serialize};

use crate::ingredient_matcher::IngredientMention;
use crate::models::{round1, Confidence, InputKind, Source};
use crate::nutrient_table::{Basis, NutrientFact, NutrientTable};
use crate::units::Quantity;

const PROTEIN_KCAL_PER_G: f64 = 4.0;
const CARBS_KCAL_PER_G: f64 = 4.0;
const FAT_KCAL_PER_G: f64 = 9.0;

/// One ingredient's contribution to a meal. All values are non-negative and rounded
/// to one decimal; calories keep the decimal so small portions still scale linearly.
/// Summaries round only the calorie total, see [`NutritionSummary::total_calories`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NutritionLineItem {
    pub name: String,
    pub quantity_description: String,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MacroValue {
    pub value_g: f64,
    pub percentage: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MacroBreakdown {
    pub protein: MacroValue,
    pub carbs: MacroValue,
    pub fats: MacroValue,
}

impl MacroBreakdown {
    pub fn percentage_sum(&self) -> u32 {
        self.protein.percentage + self.carbs.percentage + self.fats.percentage
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Micronutrient {
    pub name: String,
    pub value: String,
    pub daily: String,
}

impl Micronutrient {
    fn new(name: &str, value: &str, daily: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            daily: daily.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Reduce,
    Add,
    Balance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub title: String,
    pub description: String,
    pub impact: String,
}

impl Suggestion {
    fn new(kind: SuggestionKind, title: &str, description: &str, impact: &str) -> Self {
        Self {
            kind,
            title: title.to_string(),
            description: description.to_string(),
            impact: impact.to_string(),
        }
    }

    pub fn reduce_portion() -> Self {
        Self::new(SuggestionKind::Reduce, "Reduce portion", "Consider smaller portions", "Lower calories")
    }

    pub fn lower_fats() -> Self {
        Self::new(SuggestionKind::Reduce, "Lower fats", "Choose leaner options", "Better heart health")
    }

    pub fn add_protein() -> Self {
        Self::new(SuggestionKind::Add, "Add protein", "Include lean protein or legumes", "Satiety & muscle")
    }

    pub fn balanced() -> Self {
        Self::new(SuggestionKind::Balance, "Balanced meal", "Looks reasonably balanced", "Maintain")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NutritionSummary {
    pub description: String,
    /// For deterministic summaries, the line-item calories summed and then rounded
    /// half away from zero. Remote summaries report their own total.
    pub total_calories: i64,
    pub macros: MacroBreakdown,
    pub line_items: Vec<NutritionLineItem>,
    pub micronutrients: Vec<Micronutrient>,
    pub suggestions: Vec<Suggestion>,
    pub confidence: Confidence,
    pub input_kind: InputKind,
    pub source: Source,
    /// Short tag naming the path that produced the summary ("local_estimate", "fallback", ...).
    pub analysis: String,
}

impl NutritionSummary {
    /// Unrounded sum of the line-item calories.
    pub fn line_item_calories(&self) -> f64 {
        self.line_items.iter().map(|i| i.calories).sum()
    }
}

fn scaled(fact: &NutrientFact, factor: f64) -> (f64, f64, f64, f64) {
    (
        fact.calories * factor,
        fact.protein_g * factor,
        fact.carbs_g * factor,
        fact.fat_g * factor,
    )
}

/// Computes the line item for a single mention.
///
/// Selection order, first applicable wins:
/// 1. piece count with a per-piece fact
/// 2. grams with a per-100g fact
/// 3. grams with a per-piece fact that has a default piece weight
/// 4. piece count with a per-100g fact that has a default serving weight
/// 5. per-100g fact, "100 g (assumed)"
/// 6. per-piece fact, "1 piece (assumed)"
/// 7. fixed catch-all of 100 kcal / 5 g protein / 10 g carbs / 5 g fat
///
/// Mentions whose key is unresolved or missing from `table` take the catch-all.
pub fn estimate(mention: &IngredientMention, table: &NutrientTable) -> NutritionLineItem {
    let fact = mention.resolved_key.as_deref().and_then(|key| table.get(key));
    let Some(fact) = fact else {
        log::debug!("No nutrient fact for '{}', using catch-all estimate", mention.raw_text);
        return NutritionLineItem {
            name: mention.resolved_key.clone().unwrap_or_else(|| mention.raw_text.clone()),
            quantity_description: "assumed".to_string(),
            calories: 100.0,
            protein_g: 5.0,
            carbs_g: 10.0,
            fat_g: 5.0,
        };
    };

    let quantity = mention.quantity.filter(|q| match q {
        Quantity::Grams(g) => *g > 0.0,
        Quantity::Pieces(n) => *n > 0,
    });

    let ((calories, protein, carbs, fat), quantity_description) = match (quantity, fact.basis, fact.default_grams) {
        (Some(Quantity::Pieces(count)), Basis::PerPiece, _) => {
            (scaled(fact, count as f64), format!("{} piece(s)", count))
        }
        (Some(Quantity::Grams(grams)), Basis::Per100g, _) => {
            (scaled(fact, grams / 100.0), format!("{} g", grams as i64))
        }
        (Some(Quantity::Grams(grams)), Basis::PerPiece, Some(piece_grams)) if piece_grams > 0.0 => {
            let pieces = grams / piece_grams;
            (scaled(fact, pieces), format!("{} g (~{:.1} piece(s))", grams as i64, pieces))
        }
        (Some(Quantity::Pieces(count)), Basis::Per100g, Some(serving_grams)) => {
            let grams = serving_grams * count as f64;
            (scaled(fact, grams / 100.0), format!("{} serving(s) (~{} g)", count, grams as i64))
        }
        (_, Basis::Per100g, _) => (scaled(fact, 1.0), "100 g (assumed)".to_string()),
        (_, Basis::PerPiece, _) => (scaled(fact, 1.0), "1 piece (assumed)".to_string()),
    };

    NutritionLineItem {
        name: fact.key.clone(),
        quantity_description,
        calories: round1(calories.max(0.0)),
        protein_g: round1(protein.max(0.0)),
        carbs_g: round1(carbs.max(0.0)),
        fat_g: round1(fat.max(0.0)),
    }
}

/// Integer percentages of each macro's caloric contribution. Each is rounded
/// independently; a zero denominator yields the even 33/33/34 split.
pub fn macro_percentages(protein_g: f64, carbs_g: f64, fat_g: f64) -> (u32, u32, u32) {
    let protein_kcal = protein_g * PROTEIN_KCAL_PER_G;
    let carbs_kcal = carbs_g * CARBS_KCAL_PER_G;
    let fat_kcal = fat_g * FAT_KCAL_PER_G;
    let total = protein_kcal + carbs_kcal + fat_kcal;
    if total <= 0.0 {
        return (33, 33, 34);
    }
    let pct = |kcal: f64| (kcal / total * 100.0).round() as u32;
    (pct(protein_kcal), pct(carbs_kcal), pct(fat_kcal))
}

fn micronutrients_for(items: &[NutritionLineItem]) -> Vec<Micronutrient> {
    let names = items
        .iter()
        .map(|i| i.name.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let mut micronutrients = Vec::new();

    if ["banana", "apple", "vegetable", "veg", "spinach"].iter().any(|w| names.contains(w)) {
        micronutrients.push(Micronutrient::new("Vitamin C", "20-60mg", "20-60%"));
        micronutrients.push(Micronutrient::new("Fiber", "3-8g", "10-30%"));
    }
    if ["yogurt", "cheese", "milk"].iter().any(|w| names.contains(w)) {
        micronutrients.push(Micronutrient::new("Calcium", "100-250mg", "10-25%"));
    }
    if micronutrients.is_empty() {
        micronutrients.push(Micronutrient::new("Iron", "1-3mg", "5-15%"));
    }
    micronutrients
}

/// Threshold rules; several can fire at once and at least one entry is always returned.
pub fn suggestions_for(total_calories: i64, macros: &MacroBreakdown) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    if total_calories > 800 {
        suggestions.push(Suggestion::reduce_portion());
    }
    if macros.fats.percentage > 35 {
        suggestions.push(Suggestion::lower_fats());
    }
    if macros.protein.percentage < 15 {
        suggestions.push(Suggestion::add_protein());
    }
    if suggestions.is_empty() {
        suggestions.push(Suggestion::balanced());
    }
    suggestions
}

/// Sums line items into a summary.
///
/// Percentages are derived from macro calories (4/4/9 kcal per gram), not from the
/// calorie total. The result is tagged as a medium-confidence deterministic text
/// estimate; callers adjust `confidence`, `input_kind` and `analysis` as needed.
pub fn aggregate(items: Vec<NutritionLineItem>) -> NutritionSummary {
    let total_calories: f64 = items.iter().map(|i| i.calories).sum();
    let protein: f64 = items.iter().map(|i| i.protein_g).sum();
    let carbs: f64 = items.iter().map(|i| i.carbs_g).sum();
    let fat: f64 = items.iter().map(|i| i.fat_g).sum();

    let (protein_pct, carbs_pct, fat_pct) = macro_percentages(protein, carbs, fat);
    let macros = MacroBreakdown {
        protein: MacroValue { value_g: round1(protein), percentage: protein_pct },
        carbs: MacroValue { value_g: round1(carbs), percentage: carbs_pct },
        fats: MacroValue { value_g: round1(fat), percentage: fat_pct },
    };

    let total_calories = total_calories.round() as i64;
    let micronutrients = micronutrients_for(&items);
    let suggestions = suggestions_for(total_calories, &macros);

    NutritionSummary {
        description: "Estimated from input".to_string(),
        total_calories,
        macros,
        line_items: items,
        micronutrients,
        suggestions,
        confidence: Confidence::Medium,
        input_kind: InputKind::Text,
        source: Source::Deterministic,
        analysis: "local_estimate".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(key: &str, quantity: Option<Quantity>) -> IngredientMention {
        IngredientMention::resolved(key, quantity)
    }

    #[test]
    fn test_estimate_per_100g_scaling() {
        let table = NutrientTable::builtin();
        let item = estimate(&mention("chicken breast", Some(Quantity::Grams(150.0))), &table);
        assert_eq!(item.calories, 247.5);
        assert_eq!(item.protein_g, 46.5);
        assert_eq!(item.fat_g, 5.4);
        assert_eq!(item.quantity_description, "150 g");
    }

    #[test]
    fn test_estimate_calories_match_per_100g_for_every_fact() {
        let table = NutrientTable::builtin();
        for fact in table.keys().filter_map(|k| table.get(k)) {
            if fact.basis != Basis::Per100g {
                continue;
            }
            for grams in [1.0, 37.5, 100.0, 250.0] {
                let item = estimate(&mention(&fact.key, Some(Quantity::Grams(grams))), &table);
                let expected = fact.calories * grams / 100.0;
                assert!((item.calories - expected).abs() <= 0.05, "{} {}g", fact.key, grams);
            }
        }
    }

    #[test]
    fn test_estimate_piece_paths() {
        let table = NutrientTable::builtin();

        let eggs = estimate(&mention("egg", Some(Quantity::Pieces(2))), &table);
        assert_eq!(eggs.calories, 156.0);
        assert_eq!(eggs.quantity_description, "2 piece(s)");

        let egg_grams = estimate(&mention("egg", Some(Quantity::Grams(100.0))), &table);
        assert_eq!(egg_grams.calories, 156.0);

        let potatoes = estimate(&mention("potato", Some(Quantity::Pieces(2))), &table);
        assert_eq!(potatoes.quantity_description, "2 serving(s) (~300 g)");
        assert_eq!(potatoes.calories, 231.0);

        let rice_count = estimate(&mention("rice", Some(Quantity::Pieces(2))), &table);
        assert_eq!(rice_count.quantity_description, "100 g (assumed)");
        assert_eq!(rice_count.calories, 130.0);
    }

    #[test]
    fn test_estimate_assumed_and_catch_all() {
        let table = NutrientTable::builtin();

        let banana = estimate(&mention("banana", None), &table);
        assert_eq!(banana.quantity_description, "1 piece (assumed)");
        assert_eq!(banana.calories, 105.0);

        let unknown = IngredientMention {
            raw_text: "dragonfruit".to_string(),
            resolved_key: None,
            quantity: Some(Quantity::Grams(50.0)),
        };
        let item = estimate(&unknown, &table);
        assert_eq!(item.name, "dragonfruit");
        assert_eq!(item.quantity_description, "assumed");
        assert_eq!((item.calories, item.protein_g, item.carbs_g, item.fat_g), (100.0, 5.0, 10.0, 5.0));
    }

    #[test]
    fn test_aggregate_totals_and_percentages() {
        let table = NutrientTable::builtin();
        let items = vec![
            estimate(&mention("chicken breast", Some(Quantity::Grams(150.0))), &table),
            estimate(&mention("brown rice", Some(Quantity::Grams(100.0))), &table),
        ];
        let summary = aggregate(items);
        assert_eq!(summary.total_calories, 359);
        assert_eq!(summary.macros.protein.value_g, 49.1);
        assert_eq!(summary.macros.protein.percentage, 57);
        assert_eq!(summary.macros.carbs.percentage, 27);
        assert_eq!(summary.macros.fats.percentage, 16);
        assert_eq!(summary.suggestions, vec![Suggestion::balanced()]);
        assert_eq!(summary.micronutrients[0].name, "Iron");
    }

    #[test]
    fn test_aggregate_empty_is_even_split() {
        let summary = aggregate(Vec::new());
        assert_eq!(summary.total_calories, 0);
        assert_eq!(summary.macros.percentage_sum(), 100);
        assert_eq!(summary.macros.fats.percentage, 34);
        assert_eq!(summary.suggestions.len(), 1);
        assert_eq!(summary.suggestions[0].kind, SuggestionKind::Balance);
    }

    #[test]
    fn test_percentages_sum_within_rounding() {
        for (p, c, f) in [(1.0, 1.0, 1.0), (10.3, 7.7, 2.2), (0.1, 0.0, 0.0), (33.3, 33.3, 33.3), (5.0, 90.0, 12.5)] {
            let (pp, cp, fp) = macro_percentages(p, c, f);
            let sum = pp + cp + fp;
            assert!((99..=101).contains(&sum), "{:?} -> {}", (p, c, f), sum);
        }
    }

    #[test]
    fn test_suggestion_rules_co_occur() {
        let table = NutrientTable::builtin();
        let items = vec![estimate(&mention("nuts", Some(Quantity::Grams(200.0))), &table)];
        let summary = aggregate(items);
        let titles: Vec<_> = summary.suggestions.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Reduce portion", "Lower fats", "Add protein"]);
    }

    #[test]
    fn test_micronutrients_for_fruit_and_dairy() {
        let table = NutrientTable::builtin();
        let items = vec![
            estimate(&mention("banana", Some(Quantity::Pieces(1))), &table),
            estimate(&mention("yogurt", Some(Quantity::Grams(150.0))), &table),
        ];
        let names: Vec<_> = aggregate(items).micronutrients.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Vitamin C", "Fiber", "Calcium"]);
    }

    #[test]
    fn test_total_is_rounded_line_item_sum() {
        let table = NutrientTable::builtin();
        let keys: Vec<&str> = table.keys().collect();
        for window in keys.windows(4) {
            let items: Vec<NutritionLineItem> = window
                .iter()
                .zip([33.0, 75.0, 110.0, 7.5])
                .map(|(key, grams)| estimate(&mention(key, Some(Quantity::Grams(grams))), &table))
                .collect();
            let summary = aggregate(items);
            assert_eq!(summary.total_calories, summary.line_item_calories().round() as i64, "{:?}", window);
            assert!((summary.total_calories as f64 - summary.line_item_calories()).abs() <= 0.5);
        }
    }
}
