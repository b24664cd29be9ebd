use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::nutrient_table::NutrientTable;
use crate::units::{self, Quantity};

/// An ingredient mentioned in free text, possibly resolved to a table key.
/// `quantity` of `None` means "assume a default serving".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngredientMention {
    pub raw_text: String,
    pub resolved_key: Option<String>,
    pub quantity: Option<Quantity>,
}

impl IngredientMention {
    pub fn resolved(key: &str, quantity: Option<Quantity>) -> Self {
        Self {
            raw_text: key.to_string(),
            resolved_key: Some(key.to_string()),
            quantity,
        }
    }
}

/// Canonical aliases grouped by base ingredient. The base name is matched as a plain
/// substring of the table keys ("veg" -> "mixed vegetables").
const SYNONYMS: &[(&str, &[&str])] = &[
    ("chicken", &["chicken", "chicken breast", "chicken breasts"]),
    ("rice", &["rice", "white rice", "brown rice"]),
    ("veg", &["veg", "veggies", "vegetable", "vegetables", "mixed vegetables"]),
    ("egg", &["egg", "eggs"]),
];

// <number><optional unit><optional "of"><food words>, terminated by end, comma, "and" or a period
static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d+(?:[.,]\d+)?)\s*(?:(grams|gram|g|kilograms|kilogram|kg|cups|cup|tablespoons|tablespoon|tbsp|teaspoons|teaspoon|tsp|slices|slice|pieces|piece|ounces|ounce|oz)\b)?\s*(of\s+)?([a-z\s]+?)(?:$|,|\band\b|\.)",
    )
    .expect("valid quantity regex")
});

/// True when `needle` occurs in `haystack` delimited by non-alphanumeric characters
/// (or the string edges), so "egg" does not match inside "veggies".
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

pub struct IngredientMatcher<'a> {
    table: &'a NutrientTable,
}

impl<'a> IngredientMatcher<'a> {
    pub fn new(table: &'a NutrientTable) -> Self {
        Self { table }
    }

    /// Maps a raw phrase to a canonical table key.
    ///
    /// Matching order: exact key, then word-level substring in either direction
    /// against the keys in table order, then the synonym groups, then the same three
    /// steps on a naive singular form ("bananas" -> "banana"). First hit wins.
    pub fn identify(&self, raw_phrase: &str) -> Option<String> {
        let phrase = raw_phrase.trim().to_lowercase();
        if phrase.is_empty() {
            return None;
        }
        self.identify_normalized(&phrase).or_else(|| {
            phrase
                .strip_suffix('s')
                .filter(|singular| !singular.is_empty())
                .and_then(|singular| self.identify_normalized(singular))
        })
    }

    fn identify_normalized(&self, phrase: &str) -> Option<String> {
        if let Some(fact) = self.table.get(phrase) {
            return Some(fact.key.clone());
        }
        if let Some(key) = self
            .table
            .keys()
            .find(|key| contains_word(phrase, key) || contains_word(key, phrase))
        {
            return Some(key.to_string());
        }
        SYNONYMS
            .iter()
            .filter(|(_, aliases)| aliases.contains(&phrase))
            .find_map(|(canon, _)| self.table.keys().find(|key| key.contains(canon)))
            .map(str::to_string)
    }

    /// Scans free text for ingredient mentions.
    ///
    /// First pass: every `<number> [unit] [of] <food words>` occurrence, resolved
    /// through [`identify`](Self::identify) and converted with the unit rules.
    /// Second pass: table keys and synonyms present anywhere in the text without a
    /// quantity, skipping keys already covered (including keys that are part of a
    /// longer covered key, e.g. "rice" inside "brown rice").
    ///
    /// Unresolved quantity phrases are returned too, with `resolved_key: None`.
    pub fn extract_mentions(&self, text: &str) -> Vec<IngredientMention> {
        let desc = text.to_lowercase();
        let mut mentions: Vec<IngredientMention> = Vec::new();

        for caps in QUANTITY_RE.captures_iter(&desc) {
            let Some(number) = caps.get(1).and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok()) else {
                continue;
            };
            let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let raw_food = caps.get(4).map(|m| m.as_str().trim()).unwrap_or("");
            if raw_food.is_empty() {
                continue;
            }

            let resolved_key = self.identify(raw_food);
            if resolved_key.is_none() {
                log::debug!("Unresolved ingredient phrase '{}'", raw_food);
            }
            mentions.push(IngredientMention {
                raw_text: raw_food.to_string(),
                resolved_key,
                quantity: Some(units::interpret(number, unit)),
            });
        }

        let mut covered: Vec<String> = mentions.iter().filter_map(|m| m.resolved_key.clone()).collect();

        let literal_keys: Vec<&str> = self.table.keys().filter(|key| contains_word(&desc, key)).collect();
        for key in literal_keys.iter().copied() {
            let is_covered = covered.iter().any(|c| c == key)
                || literal_keys
                    .iter()
                    .copied()
                    .chain(covered.iter().map(String::as_str))
                    .any(|other| other != key && contains_word(other, key));
            if !is_covered {
                mentions.push(IngredientMention::resolved(key, None));
                covered.push(key.to_string());
            }
        }

        for (_, aliases) in SYNONYMS {
            for alias in aliases.iter() {
                if !contains_word(&desc, alias) {
                    continue;
                }
                let Some(key) = self.identify(alias) else { continue };
                let is_covered = covered.iter().any(|c| *c == key || contains_word(c, &key));
                if !is_covered {
                    mentions.push(IngredientMention {
                        raw_text: alias.to_string(),
                        resolved_key: Some(key.clone()),
                        quantity: None,
                    });
                    covered.push(key);
                }
            }
        }

        mentions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> NutrientTable {
        NutrientTable::builtin()
    }

    #[test]
    fn test_identify_order() {
        let table = table();
        let matcher = IngredientMatcher::new(&table);
        assert_eq!(matcher.identify("Brown Rice").as_deref(), Some("brown rice"));
        assert_eq!(matcher.identify("chicken").as_deref(), Some("chicken breast"));
        assert_eq!(matcher.identify("grilled salmon fillet").as_deref(), Some("salmon"));
        assert_eq!(matcher.identify("veggies").as_deref(), Some("mixed vegetables"));
        assert_eq!(matcher.identify("eggs").as_deref(), Some("egg"));
        assert_eq!(matcher.identify("bananas").as_deref(), Some("banana"));
        assert_eq!(matcher.identify("dragonfruit"), None);
        assert_eq!(matcher.identify("   "), None);
    }

    #[test]
    fn test_contains_word_respects_boundaries() {
        assert!(contains_word("2 eggs and rice", "rice"));
        assert!(!contains_word("veggies", "egg"));
        assert!(contains_word("brown rice", "rice"));
        assert!(!contains_word("rice", ""));
    }

    #[test]
    fn test_extract_quantities_and_units() {
        let table = table();
        let matcher = IngredientMatcher::new(&table);
        let mentions = matcher.extract_mentions("200g chicken breast, 2 eggs and 1 cup of rice");

        let chicken = mentions.iter().find(|m| m.resolved_key.as_deref() == Some("chicken breast")).unwrap();
        assert_eq!(chicken.quantity, Some(Quantity::Grams(200.0)));
        let egg = mentions.iter().find(|m| m.resolved_key.as_deref() == Some("egg")).unwrap();
        assert_eq!(egg.quantity, Some(Quantity::Pieces(2)));
        let rice = mentions.iter().find(|m| m.resolved_key.as_deref() == Some("rice")).unwrap();
        assert_eq!(rice.quantity, Some(Quantity::Grams(160.0)));
        assert_eq!(mentions.len(), 3);
    }

    #[test]
    fn test_extract_appends_literal_keys_without_quantity() {
        let table = table();
        let matcher = IngredientMatcher::new(&table);
        let mentions = matcher.extract_mentions("a bowl of brown rice with salmon");
        let keys: Vec<_> = mentions.iter().filter_map(|m| m.resolved_key.as_deref()).collect();
        assert_eq!(keys, vec!["salmon", "brown rice"]);
        assert!(mentions.iter().all(|m| m.quantity.is_none()));
    }

    #[test]
    fn test_extract_synonym_pass() {
        let table = table();
        let matcher = IngredientMatcher::new(&table);
        let mentions = matcher.extract_mentions("chicken curry with veggies");
        let keys: Vec<_> = mentions.iter().filter_map(|m| m.resolved_key.as_deref()).collect();
        assert_eq!(keys, vec!["chicken breast", "mixed vegetables"]);
    }

    #[test]
    fn test_extract_keeps_unresolved_quantity_phrases() {
        let table = table();
        let matcher = IngredientMatcher::new(&table);
        let mentions = matcher.extract_mentions("3 dragonfruits");
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].resolved_key, None);
        assert_eq!(mentions[0].quantity, Some(Quantity::Pieces(3)));
    }
}
