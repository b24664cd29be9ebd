use serde::{Deserialize, Serialize};
use std::fmt;

/// How sure the engine is about a nutrition estimate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// What kind of input a summary was produced from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Text,
    Image,
    Fallback,
}

/// Which path produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Deterministic,
    RemoteLlm,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Dietary {
    #[default]
    Regular,
    Vegetarian,
    Vegan,
    GlutenFree,
}

impl Dietary {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "regular" | "none" => Some(Dietary::Regular),
            "vegetarian" => Some(Dietary::Vegetarian),
            "vegan" => Some(Dietary::Vegan),
            "gluten-free" | "glutenfree" => Some(Dietary::GlutenFree),
            _ => None,
        }
    }

    /// Title-cased label used when composing recipe titles.
    pub fn label(&self) -> &'static str {
        match self {
            Dietary::Regular => "Regular",
            Dietary::Vegetarian => "Vegetarian",
            Dietary::Vegan => "Vegan",
            Dietary::GlutenFree => "Gluten-Free",
        }
    }
}

impl fmt::Display for Dietary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dietary::Regular => "regular",
            Dietary::Vegetarian => "vegetarian",
            Dietary::Vegan => "vegan",
            Dietary::GlutenFree => "gluten-free",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Cuisine {
    Italian,
    Indian,
    Mexican,
    Asian,
    Mediterranean,
    #[default]
    Fusion,
}

impl Cuisine {
    pub const ALL: [Cuisine; 6] = [
        Cuisine::Italian,
        Cuisine::Indian,
        Cuisine::Mexican,
        Cuisine::Asian,
        Cuisine::Mediterranean,
        Cuisine::Fusion,
    ];

    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "italian" => Some(Cuisine::Italian),
            "indian" => Some(Cuisine::Indian),
            "mexican" => Some(Cuisine::Mexican),
            "asian" => Some(Cuisine::Asian),
            "mediterranean" => Some(Cuisine::Mediterranean),
            "fusion" => Some(Cuisine::Fusion),
            _ => None,
        }
    }
}

impl fmt::Display for Cuisine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cuisine::Italian => "italian",
            Cuisine::Indian => "indian",
            Cuisine::Mexican => "mexican",
            Cuisine::Asian => "asian",
            Cuisine::Mediterranean => "mediterranean",
            Cuisine::Fusion => "fusion",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        write!(f, "{}", s)
    }
}

/// Recognized options for recipe generation. Unknown strings map to the defaults
/// (regular / fusion / medium) when parsed through `from_strings`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RecipeConstraints {
    pub dietary: Dietary,
    pub cuisine: Cuisine,
    pub difficulty: Difficulty,
}

impl RecipeConstraints {
    pub fn from_strings(dietary: &str, cuisine: &str, difficulty: &str) -> Self {
        Self {
            dietary: Dietary::from_string(dietary).unwrap_or_default(),
            cuisine: Cuisine::from_string(cuisine).unwrap_or_default(),
            difficulty: Difficulty::from_string(difficulty).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Anything starting with "f" is female, everything else male.
    pub fn from_string(s: &str) -> Self {
        if s.trim().to_lowercase().starts_with('f') {
            Sex::Female
        } else {
            Sex::Male
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    #[default]
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    /// Unrecognized values fall back to `Moderate`.
    pub fn from_string(s: &str) -> Self {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "sedentary" => ActivityLevel::Sedentary,
            "light" => ActivityLevel::Light,
            "active" => ActivityLevel::Active,
            "very_active" => ActivityLevel::VeryActive,
            _ => ActivityLevel::Moderate,
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
            ActivityLevel::VeryActive => 1.9,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    LoseWeight,
    #[default]
    Maintain,
    GainWeight,
}

impl Goal {
    pub fn from_string(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "lose_weight" => Goal::LoseWeight,
            "gain_weight" => Goal::GainWeight,
            _ => Goal::Maintain,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub age_years: u32,
    pub sex: Sex,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub activity_level: ActivityLevel,
    pub goal: Goal,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            age_years: 30,
            sex: Sex::Male,
            weight_kg: 70.0,
            height_cm: 170.0,
            activity_level: ActivityLevel::Moderate,
            goal: Goal::Maintain,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UserTargets {
    pub bmr: f64,
    pub tdee: f64,
    pub target_calories: i64,
}

/// Rounds to one decimal place, the precision every gram/kcal figure is reported at.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
