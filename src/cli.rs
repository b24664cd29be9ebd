use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::models::{ActivityLevel, Goal, RecipeConstraints, Sex, UserProfile};

#[derive(Parser, Debug)]
#[command(author, version, about = "Nutrition estimates, recipe variations and meal plans", long_about = None)]
pub struct Cli {
    /// Never call a remote completion backend
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Estimate nutrition from a meal description
    Text {
        description: String,
    },
    /// Estimate nutrition from an image file
    Image {
        /// Path to the image
        path: PathBuf,
        /// The file holds base64 text or a data URL instead of raw bytes
        #[arg(long)]
        base64: bool,
    },
    /// Generate recipe variations
    Recipes {
        prompt: String,
        #[arg(short, long, default_value = "regular")]
        dietary: String,
        #[arg(short, long, default_value = "fusion")]
        cuisine: String,
        #[arg(long, default_value = "medium")]
        difficulty: String,
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Compute BMR, TDEE and the daily calorie target
    Targets {
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// Build a multi-day meal plan
    Plan {
        #[command(flatten)]
        profile: ProfileArgs,
        /// Comma separated preferences, e.g. "vegetarian, quick"
        #[arg(short, long, default_value = "")]
        prompt: String,
        #[arg(long, default_value_t = 7)]
        days: usize,
        /// Meal slots, comma separated
        #[arg(long, value_delimiter = ',')]
        meals: Vec<String>,
    },
    /// Build a single day of meals
    Day {
        #[command(flatten)]
        profile: ProfileArgs,
        #[arg(short, long, default_value = "")]
        prompt: String,
        #[arg(long, default_value = "Monday")]
        day: String,
        #[arg(long, value_delimiter = ',')]
        meals: Vec<String>,
    },
    /// Plan one day per dish, with a shopping list and prep tips
    Dishes {
        /// Dish names, comma separated
        #[arg(value_delimiter = ',', required = true)]
        dishes: Vec<String>,
        #[arg(short, long, default_value = "regular")]
        dietary: String,
        #[arg(short, long, default_value = "fusion")]
        cuisine: String,
        #[arg(long, default_value = "medium")]
        difficulty: String,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Suggest three recipes from what is in the fridge
    Fridge {
        /// Ingredients, comma separated
        #[arg(value_delimiter = ',', required = true)]
        items: Vec<String>,
    },
    /// Cheap template meals with rupee costs
    Budget {
        #[arg(short, long, default_value = "")]
        prompt: String,
        #[arg(long, default_value_t = 7)]
        days: usize,
        #[arg(long, value_delimiter = ',')]
        meals: Vec<String>,
        /// vegetarian, spicier, double-portions or custom
        #[arg(long)]
        enhance: Option<String>,
        /// Instructions for a custom enhancement
        #[arg(long, requires = "enhance")]
        instructions: Option<String>,
    },
    /// Ask the food assistant a question
    Chat {
        message: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ProfileArgs {
    #[arg(long, default_value_t = 30)]
    pub age: u32,
    #[arg(long, default_value = "male")]
    pub sex: String,
    /// Body weight in kg
    #[arg(long, default_value_t = 70.0)]
    pub weight: f64,
    /// Height in cm
    #[arg(long, default_value_t = 170.0)]
    pub height: f64,
    /// sedentary, light, moderate, active or very_active
    #[arg(long, default_value = "moderate")]
    pub activity: String,
    /// lose_weight, maintain or gain_weight
    #[arg(long, default_value = "maintain")]
    pub goal: String,
}

impl ProfileArgs {
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            age_years: self.age,
            sex: Sex::from_string(&self.sex),
            weight_kg: self.weight,
            height_cm: self.height,
            activity_level: ActivityLevel::from_string(&self.activity),
            goal: Goal::from_string(&self.goal),
        }
    }
}

pub fn recipe_constraints(dietary: &str, cuisine: &str, difficulty: &str) -> RecipeConstraints {
    RecipeConstraints::from_strings(dietary, cuisine, difficulty)
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Dietary;

    #[test]
    fn test_plan_arguments() {
        let cli = Cli::try_parse_from([
            "nutri",
            "plan",
            "--weight",
            "82.5",
            "--goal",
            "lose_weight",
            "--meals",
            "breakfast,lunch,dinner,snack",
            "--days",
            "3",
        ])
        .unwrap();
        let Command::Plan { profile, days, meals, .. } = cli.command else {
            panic!("expected plan command");
        };
        assert_eq!(days, 3);
        assert_eq!(meals.len(), 4);
        let profile = profile.to_profile();
        assert_eq!(profile.weight_kg, 82.5);
        assert_eq!(profile.goal, Goal::LoseWeight);
    }

    #[test]
    fn test_recipe_defaults_and_offline_flag() {
        let cli = Cli::try_parse_from(["nutri", "recipes", "tofu stir fry", "-d", "vegan", "--offline"]).unwrap();
        assert!(cli.offline);
        let Command::Recipes { dietary, cuisine, difficulty, count, seed, .. } = cli.command else {
            panic!("expected recipes command");
        };
        assert_eq!(count, 5);
        assert_eq!(seed, None);
        assert_eq!(recipe_constraints(&dietary, &cuisine, &difficulty).dietary, Dietary::Vegan);
    }

    #[test]
    fn test_pantry_commands() {
        let cli = Cli::try_parse_from(["nutri", "fridge", "tomato, eggs,spinach"]).unwrap();
        let Command::Fridge { items } = cli.command else {
            panic!("expected fridge command");
        };
        assert_eq!(items.len(), 3);
        assert!(Cli::try_parse_from(["nutri", "fridge"]).is_err());

        let cli = Cli::try_parse_from(["nutri", "budget", "--days", "2", "--enhance", "custom", "--instructions", "add lime"])
            .unwrap();
        let Command::Budget { days, enhance, instructions, meals, .. } = cli.command else {
            panic!("expected budget command");
        };
        assert_eq!(days, 2);
        assert!(meals.is_empty());
        assert_eq!(enhance.as_deref(), Some("custom"));
        assert_eq!(instructions.as_deref(), Some("add lime"));
        assert!(Cli::try_parse_from(["nutri", "budget", "--instructions", "add lime"]).is_err());
    }

    #[test]
    fn test_dishes_command() {
        let cli = Cli::try_parse_from(["nutri", "dishes", "dal,paneer tikka", "-d", "vegetarian", "--seed", "9"]).unwrap();
        let Command::Dishes { dishes, dietary, seed, .. } = cli.command else {
            panic!("expected dishes command");
        };
        assert_eq!(dishes, vec!["dal", "paneer tikka"]);
        assert_eq!(dietary, "vegetarian");
        assert_eq!(seed, Some(9));
    }
}
