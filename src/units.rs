use serde::{Deserialize, Serialize};

/// A resolved amount: either a mass or a count of pieces/slices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Grams(f64),
    Pieces(u32),
}

const OUNCE_GRAMS: f64 = 28.35;

/// Grams per unit for the mass/volume units we know about.
fn grams_per_unit(unit: &str) -> Option<f64> {
    match unit {
        "g" | "gram" | "grams" => Some(1.0),
        "kg" | "kilogram" | "kilograms" => Some(1000.0),
        "cup" | "cups" => Some(160.0),
        "tbsp" | "tablespoon" | "tablespoons" => Some(15.0),
        "tsp" | "teaspoon" | "teaspoons" => Some(5.0),
        "oz" | "ounce" | "ounces" => Some(OUNCE_GRAMS),
        _ => None,
    }
}

fn is_count_unit(unit: &str) -> bool {
    matches!(unit, "slice" | "slices" | "piece" | "pieces" | "pc" | "pcs")
}

/// Converts `quantity unit` to grams.
///
/// Returns `None` for count units (slice/piece) and for units that are not in the
/// conversion table; callers that need a best-effort answer use [`interpret`].
pub fn to_grams(quantity: f64, unit: &str) -> Option<f64> {
    let unit = unit.trim().to_lowercase();
    if is_count_unit(&unit) {
        return None;
    }
    grams_per_unit(&unit).map(|factor| quantity * factor)
}

/// Resolves a quantity/unit pair into either grams or a piece count. Never fails:
/// an unknown unit with a whole-number quantity is read as a piece count, any other
/// unknown unit as raw grams.
pub fn interpret(quantity: f64, unit: &str) -> Quantity {
    let unit = unit.trim().to_lowercase();
    let quantity = quantity.max(0.0);

    if is_count_unit(&unit) {
        return Quantity::Pieces(quantity.round() as u32);
    }
    if let Some(grams) = to_grams(quantity, &unit) {
        return Quantity::Grams(grams);
    }
    if quantity.fract() == 0.0 {
        Quantity::Pieces(quantity as u32)
    } else {
        Quantity::Grams(quantity)
    }
}
