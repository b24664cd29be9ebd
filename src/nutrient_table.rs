use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a fact's values are expressed against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    Per100g,
    /// Values are per piece (or slice).
    PerPiece,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NutrientFact {
    pub key: String,
    pub basis: Basis,
    /// Typical weight of one piece or serving, used to convert between grams and counts.
    pub default_grams: Option<f64>,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

impl NutrientFact {
    fn per_100g(key: &str, calories: f64, protein_g: f64, carbs_g: f64, fat_g: f64) -> Self {
        Self {
            key: key.to_string(),
            basis: Basis::Per100g,
            default_grams: None,
            calories,
            protein_g,
            carbs_g,
            fat_g,
        }
    }

    fn per_piece(key: &str, default_grams: f64, calories: f64, protein_g: f64, carbs_g: f64, fat_g: f64) -> Self {
        Self {
            key: key.to_string(),
            basis: Basis::PerPiece,
            default_grams: Some(default_grams),
            calories,
            protein_g,
            carbs_g,
            fat_g,
        }
    }

    fn with_serving(mut self, grams: f64) -> Self {
        self.default_grams = Some(grams);
        self
    }
}

/// Ordered, read-only lookup from canonical ingredient key to nutrient values.
/// Order matters: matching walks the keys front to back and the first hit wins.
#[derive(Debug, Clone)]
pub struct NutrientTable {
    facts: Vec<NutrientFact>,
}

impl Default for NutrientTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl NutrientTable {
    pub fn builtin() -> Self {
        let facts = vec![
            NutrientFact::per_100g("chicken breast", 165.0, 31.0, 0.0, 3.6),
            NutrientFact::per_100g("salmon", 208.0, 20.0, 0.0, 13.0),
            NutrientFact::per_piece("egg", 50.0, 78.0, 6.3, 0.6, 5.3),
            NutrientFact::per_100g("rice", 130.0, 2.4, 28.0, 0.3),
            NutrientFact::per_100g("brown rice", 111.0, 2.6, 23.0, 0.9),
            NutrientFact::per_100g("tofu", 76.0, 8.0, 1.9, 4.8),
            NutrientFact::per_100g("lentils", 116.0, 9.0, 20.0, 0.4),
            NutrientFact::per_100g("mixed vegetables", 40.0, 2.0, 7.0, 0.3),
            NutrientFact::per_100g("oats", 389.0, 17.0, 66.0, 7.0),
            NutrientFact::per_piece("banana", 118.0, 105.0, 1.3, 27.0, 0.3),
            NutrientFact::per_100g("potato", 77.0, 2.0, 17.0, 0.1).with_serving(150.0),
            NutrientFact::per_100g("yogurt", 59.0, 10.0, 3.6, 0.4),
            NutrientFact::per_piece("bread", 30.0, 80.0, 3.0, 14.0, 1.0),
            NutrientFact::per_100g("nuts", 607.0, 20.0, 21.0, 54.0),
            NutrientFact::per_100g("beef", 250.0, 26.0, 0.0, 15.0),
            NutrientFact::per_100g("pasta", 131.0, 5.0, 25.0, 1.1),
            NutrientFact::per_piece("apple", 182.0, 95.0, 0.5, 25.0, 0.3),
        ];
        Self { facts }
    }

    pub fn from_facts(facts: Vec<NutrientFact>) -> Self {
        Self { facts }
    }

    /// Merges `extra` into the table: a fact with an existing key replaces it in
    /// place, new keys are appended in the order given.
    pub fn with_overrides(mut self, extra: Vec<NutrientFact>) -> Self {
        for fact in extra {
            match self.facts.iter_mut().find(|f| f.key == fact.key) {
                Some(existing) => *existing = fact,
                None => self.facts.push(fact),
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&NutrientFact> {
        self.facts.iter().find(|f| f.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.facts.iter().map(|f| f.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

// Expected column headers for nutrient CSV files
const NAME_COL: &str = "Name";
const KCAL_COL: &str = "kcal/100g";
const PROTEIN_COL: &str = "Protein (g/100g)";
const CARB_COL: &str = "Carbohydrate (g/100g)";
const FAT_COL: &str = "Fat (g/100g)";
// Optional: "100g" (default) or "piece"; when "piece" the value columns are per piece
const BASIS_COL: &str = "Basis";
const DEFAULT_GRAMS_COL: &str = "Default grams";

fn parse_optional_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// Loads additional nutrient facts from a CSV file. Keys are lowercased; rows with an
/// empty name or an unparseable calorie value are skipped, missing macro values read
/// as zero.
pub fn load_nutrient_csv(csv_path: &Path) -> Result<Vec<NutrientFact>> {
    if !csv_path.exists() {
        return Err(anyhow::anyhow!("Nutrient CSV file not found at: {:?}", csv_path));
    }

    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open nutrient CSV file at {:?}", csv_path))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = rdr.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| anyhow::anyhow!("Column '{}' not found", name))
    };

    let name_idx = column(NAME_COL)?;
    let kcal_idx = column(KCAL_COL)?;
    let protein_idx = column(PROTEIN_COL)?;
    let carb_idx = column(CARB_COL)?;
    let fat_idx = column(FAT_COL)?;
    let basis_idx = column(BASIS_COL).ok();
    let default_grams_idx = column(DEFAULT_GRAMS_COL).ok();

    let mut facts = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read record at row index {}", row_index))?;

        let key = record.get(name_idx).unwrap_or_default().trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        let Some(calories) = record.get(kcal_idx).and_then(parse_optional_f64) else {
            log::warn!("Skipping nutrient row {} ('{}'): unparseable calories", row_index + 1, key);
            continue;
        };

        let per_piece = basis_idx
            .and_then(|idx| record.get(idx))
            .map(|s| s.trim().eq_ignore_ascii_case("piece"))
            .unwrap_or(false);

        facts.push(NutrientFact {
            key,
            basis: if per_piece { Basis::PerPiece } else { Basis::Per100g },
            default_grams: default_grams_idx.and_then(|idx| record.get(idx)).and_then(parse_optional_f64),
            calories,
            protein_g: record.get(protein_idx).and_then(parse_optional_f64).unwrap_or(0.0),
            carbs_g: record.get(carb_idx).and_then(parse_optional_f64).unwrap_or(0.0),
            fat_g: record.get(fat_idx).and_then(parse_optional_f64).unwrap_or(0.0),
        });
    }

    if facts.is_empty() {
        return Err(anyhow::anyhow!("No valid nutrient data loaded from {:?}", csv_path));
    }

    log::info!("Loaded {} nutrient facts from {:?}", facts.len(), csv_path);
    Ok(facts)
}
