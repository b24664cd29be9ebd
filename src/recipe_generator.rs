use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::ingredient_matcher::contains_word;
use crate::models::{Cuisine, Dietary, Difficulty, RecipeConstraints};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;
pub const MAX_VARIATIONS: usize = 10;
const MAX_LEVEL: usize = 4;
const MAX_SPECIFIED_INGREDIENTS: usize = 5;
const MAX_DIVERSIFY_ROUNDS: usize = 20;
const MAX_REDRAFTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Protein,
    Vegetable,
    Carb,
    Dairy,
    Spice,
    Specialty,
}

const CATEGORIES: &[(Category, &[&str])] = &[
    (
        Category::Protein,
        &[
            "chicken breast", "ground beef", "salmon", "shrimp", "tofu", "lentils", "chickpeas", "black beans",
            "paneer", "eggs", "pork", "turkey", "tuna", "cod", "lamb", "bacon", "sausage", "tempeh", "seitan",
        ],
    ),
    (
        Category::Vegetable,
        &[
            "spinach", "broccoli", "carrots", "bell peppers", "zucchini", "mushrooms", "onions", "garlic",
            "tomatoes", "potatoes", "sweet potatoes", "cauliflower", "eggplant", "asparagus", "kale", "cabbage",
            "green beans", "peas", "corn", "avocado", "cucumber", "celery", "lettuce",
        ],
    ),
    (
        Category::Carb,
        &[
            "pasta", "rice", "quinoa", "bread", "couscous", "noodles", "tortillas", "naan", "pita bread", "oats",
        ],
    ),
    (
        Category::Dairy,
        &[
            "cheese", "milk", "yogurt", "butter", "cream", "sour cream", "parmesan", "mozzarella", "feta",
            "cream cheese", "buttermilk",
        ],
    ),
    (
        Category::Spice,
        &[
            "salt", "black pepper", "cumin", "coriander", "turmeric", "paprika", "chili powder", "garlic powder",
            "onion powder", "oregano", "thyme", "rosemary", "basil", "curry powder", "ginger", "cinnamon", "nutmeg",
        ],
    ),
    (
        Category::Specialty,
        &[
            "soy sauce", "olive oil", "vinegar", "honey", "maple syrup", "mustard", "mayonnaise", "ketchup",
            "hot sauce", "worcestershire", "fish sauce",
        ],
    ),
];

// Complements by level, from basic aromatics to globally exotic condiments
const PALETTES: [&[&str]; 5] = [
    &["olive oil", "garlic", "salt", "black pepper", "onion", "lemon juice", "parsley", "butter"],
    &["sesame oil", "ginger", "soy sauce", "honey", "lime", "scallions", "chili flakes", "rice vinegar"],
    &[
        "tahini", "miso", "coconut milk", "lemongrass", "fish sauce", "smoked paprika", "pomegranate molasses",
        "toasted sesame seeds",
    ],
    &[
        "truffle oil", "saffron", "prosciutto", "aged parmesan", "fresh herbs", "black garlic", "porcini powder",
        "aged balsamic",
    ],
    &[
        "gochujang", "sumac", "preserved lemon", "za'atar", "mirin", "yuzu kosho", "harissa", "black lime",
        "bonito flakes",
    ],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Meat,
    Fish,
    Egg,
    Dairy,
    Honey,
    Gluten,
}

const ORIGINS: &[(&str, Origin)] = &[
    ("chicken breast", Origin::Meat),
    ("chicken", Origin::Meat),
    ("ground beef", Origin::Meat),
    ("beef", Origin::Meat),
    ("pork", Origin::Meat),
    ("turkey", Origin::Meat),
    ("lamb", Origin::Meat),
    ("bacon", Origin::Meat),
    ("sausage", Origin::Meat),
    ("duck", Origin::Meat),
    ("venison", Origin::Meat),
    ("quail", Origin::Meat),
    ("prosciutto", Origin::Meat),
    ("carnitas", Origin::Meat),
    ("salmon", Origin::Fish),
    ("shrimp", Origin::Fish),
    ("tuna", Origin::Fish),
    ("cod", Origin::Fish),
    ("fish", Origin::Fish),
    ("scallops", Origin::Fish),
    ("fish sauce", Origin::Fish),
    ("bonito flakes", Origin::Fish),
    ("worcestershire", Origin::Fish),
    ("eggs", Origin::Egg),
    ("egg", Origin::Egg),
    ("mayonnaise", Origin::Egg),
    ("cheese", Origin::Dairy),
    ("milk", Origin::Dairy),
    ("yogurt", Origin::Dairy),
    ("butter", Origin::Dairy),
    ("cream", Origin::Dairy),
    ("sour cream", Origin::Dairy),
    ("parmesan", Origin::Dairy),
    ("aged parmesan", Origin::Dairy),
    ("mozzarella", Origin::Dairy),
    ("feta", Origin::Dairy),
    ("cream cheese", Origin::Dairy),
    ("buttermilk", Origin::Dairy),
    ("paneer", Origin::Dairy),
    ("honey", Origin::Honey),
    ("pasta", Origin::Gluten),
    ("bread", Origin::Gluten),
    ("couscous", Origin::Gluten),
    ("noodles", Origin::Gluten),
    ("tortillas", Origin::Gluten),
    ("naan", Origin::Gluten),
    ("pita bread", Origin::Gluten),
    ("seitan", Origin::Gluten),
    ("soy sauce", Origin::Gluten),
];

fn origin_of(ingredient: &str) -> Option<Origin> {
    let name = ingredient.trim().to_lowercase();
    ORIGINS.iter().find(|(n, _)| *n == name).map(|(_, o)| *o)
}

/// Whether a diet may contain `ingredient`. Unknown names count as plant-based.
pub fn dietary_allows(dietary: Dietary, ingredient: &str) -> bool {
    match (dietary, origin_of(ingredient)) {
        (_, None) => true,
        (Dietary::Vegan, Some(origin)) => origin == Origin::Gluten,
        (Dietary::Vegetarian, Some(origin)) => !matches!(origin, Origin::Meat | Origin::Fish),
        (Dietary::GlutenFree, Some(origin)) => origin != Origin::Gluten,
        (Dietary::Regular, Some(_)) => true,
    }
}

fn category_of(ingredient: &str) -> Option<Category> {
    CATEGORIES
        .iter()
        .find(|(_, items)| items.contains(&ingredient))
        .map(|(category, _)| *category)
}

/// Shopping aisle for an ingredient name; names outside the known lists are "pantry".
pub fn aisle_of(ingredient: &str) -> &'static str {
    match category_of(&ingredient.trim().to_lowercase()) {
        Some(Category::Protein) => "proteins",
        Some(Category::Vegetable) => "vegetables",
        Some(Category::Dairy) => "dairy",
        Some(Category::Spice) => "spices",
        Some(Category::Carb) | Some(Category::Specialty) | None => "pantry",
    }
}

struct CuisineTemplate {
    proteins: &'static [&'static str],
    bases: &'static [&'static str],
}

fn cuisine_template(cuisine: Cuisine) -> CuisineTemplate {
    match cuisine {
        Cuisine::Italian => CuisineTemplate {
            proteins: &["Chicken", "Beef", "Shrimp", "Tofu", "Sausage"],
            bases: &["Spaghetti", "Penne", "Fettuccine", "Linguine", "Rigatoni"],
        },
        Cuisine::Indian => CuisineTemplate {
            proteins: &["Chicken", "Lamb", "Paneer", "Chickpeas", "Lentils"],
            bases: &["Curry", "Biryani", "Masala", "Tikka", "Korma"],
        },
        Cuisine::Mexican => CuisineTemplate {
            proteins: &["Chicken", "Beef", "Beans", "Carnitas", "Shrimp"],
            bases: &["Tacos", "Burritos", "Quesadillas", "Enchiladas", "Fajitas"],
        },
        Cuisine::Asian => CuisineTemplate {
            proteins: &["Chicken", "Beef", "Tofu", "Shrimp", "Pork"],
            bases: &["Stir Fry", "Noodle Bowl", "Rice Bowl", "Soup", "Dumplings"],
        },
        Cuisine::Mediterranean => CuisineTemplate {
            proteins: &["Chicken", "Lamb", "Fish", "Chickpeas", "Falafel"],
            bases: &["Salad", "Bowl", "Wrap", "Platter", "Skewers"],
        },
        Cuisine::Fusion => CuisineTemplate {
            proteins: &["Tofu", "Salmon", "Chicken", "Beef", "Shrimp"],
            bases: &["Bowl", "Plate", "Dish"],
        },
    }
}

const STYLE_PHRASES: &[&str] = &["with a twist", "fusion", "reimagined", "elevated"];
const GOURMET_TERMS: &[&str] = &["Gourmet", "Artisanal", "Signature", "Premium", "Chef's"];
const STYLE_NOUNS: &[&str] = &["Experience", "Creation", "Masterpiece", "Specialty"];
const REPLACEMENT_QUANTITIES: &[&str] = &["1", "2", "3", "1/2", "1/4"];

const VARIETY_DESCRIPTIONS: [&str; 5] = [
    "Classic preparation with your specified ingredients",
    "Creative twist with complementary flavors",
    "Innovative combination with new ingredients",
    "Fusion-style with unexpected pairings",
    "Gourmet version with premium ingredients",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipeIngredient {
    pub quantity: String,
    pub name: String,
}

impl fmt::Display for RecipeIngredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.quantity, self.name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RecipeNutrition {
    pub calories_per_serving: u32,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeVariant {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub variety_description: String,
    pub time_minutes: u32,
    pub servings: u32,
    pub ingredients: Vec<RecipeIngredient>,
    pub instructions: Vec<String>,
    pub user_specified_ingredients: Vec<String>,
    pub cuisine: Cuisine,
    pub dietary: Dietary,
    pub difficulty: Difficulty,
    pub variation_level: u8,
    pub nutrition: RecipeNutrition,
}

impl RecipeVariant {
    pub fn ingredient_names(&self) -> BTreeSet<String> {
        self.ingredients.iter().map(|i| i.name.to_lowercase()).collect()
    }

    pub fn ingredient_lines(&self) -> Vec<String> {
        self.ingredients.iter().map(|i| i.to_string()).collect()
    }
}

/// |A ∩ B| / |A ∪ B|; two empty sets count as identical.
pub fn jaccard_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Ingredients from the category tables that appear in `prompt`, in order of first
/// appearance. Simple plural/singular variants match too; an item that is part of a
/// longer match ("pepper" inside "black pepper") is dropped.
pub fn extract_specified_ingredients(prompt: &str) -> Vec<String> {
    let lowered = prompt.to_lowercase();
    let mut found: Vec<(usize, &str)> = Vec::new();

    for (_, items) in CATEGORIES {
        for item in items.iter().copied() {
            let plural = format!("{}s", item);
            let variants = [Some(item), Some(plural.as_str()), item.strip_suffix('s')];
            let position = variants
                .iter()
                .flatten()
                .filter(|v| contains_word(&lowered, v))
                .filter_map(|v| lowered.find(*v))
                .min();
            if let Some(position) = position {
                if !found.iter().any(|(_, f)| *f == item) {
                    found.push((position, item));
                }
            }
        }
    }

    let names: Vec<&str> = found.iter().map(|(_, n)| *n).collect();
    found.retain(|(_, item)| !names.iter().any(|other| other != item && contains_word(other, item)));
    found.sort_by_key(|(position, _)| *position);
    found.into_iter().map(|(_, item)| item.to_string()).collect()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
struct Draft {
    quantity: String,
    name: String,
    category: Option<Category>,
    specified: bool,
}

impl Draft {
    fn new(quantity: &str, name: &str, specified: bool) -> Self {
        Self {
            quantity: quantity.to_string(),
            name: name.to_string(),
            category: category_of(name),
            specified,
        }
    }
}

fn draft_names(drafts: &[Draft]) -> BTreeSet<String> {
    drafts.iter().map(|d| d.name.to_lowercase()).collect()
}

fn push_unique(drafts: &mut Vec<Draft>, draft: Draft) {
    if !drafts.iter().any(|d| d.name == draft.name) {
        drafts.push(draft);
    }
}

fn proteins_for(dietary: Dietary, level: usize) -> Vec<&'static str> {
    let mut proteins = match dietary {
        Dietary::Vegetarian => vec!["tofu", "tempeh", "lentils", "chickpeas", "paneer"],
        Dietary::Vegan => vec!["tofu", "tempeh", "lentils", "chickpeas", "black beans"],
        Dietary::Regular | Dietary::GlutenFree => vec!["chicken breast", "salmon", "shrimp", "beef", "pork"],
    };
    if level >= 1 {
        if dietary == Dietary::Regular {
            proteins.extend(["duck", "lamb", "scallops"]);
        } else {
            proteins.extend(["seitan", "jackfruit"]);
        }
    }
    if level >= 2 {
        if dietary == Dietary::Regular {
            proteins.extend(["venison", "quail"]);
        } else {
            proteins.extend(["artichoke hearts", "king oyster mushrooms"]);
        }
    }
    proteins.retain(|p| dietary_allows(dietary, p));
    proteins
}

fn vegetables_for(level: usize) -> Vec<&'static str> {
    let mut vegetables = vec!["carrots", "bell peppers", "spinach", "broccoli", "zucchini"];
    if level >= 1 {
        vegetables.extend(["mushrooms", "asparagus", "kale", "sweet potatoes"]);
    }
    if level >= 2 {
        vegetables.extend(["bok choy", "brussels sprouts", "artichokes", "fennel"]);
    }
    if level >= 3 {
        vegetables.extend(["heirloom tomatoes", "rainbow chard", "purple cauliflower"]);
    }
    vegetables
}

fn instructions_for(level: usize, specified: &[String]) -> Vec<String> {
    let main_step = match specified.first() {
        Some(main) => format!("Cook the {} until properly done", main),
        None => "Cook main ingredients until properly done".to_string(),
    };
    let mut steps = vec![
        "Gather and prepare all ingredients".to_string(),
        "Heat oil in a pan over medium heat".to_string(),
        main_step,
        "Add seasonings and adjust to taste".to_string(),
        "Serve hot and enjoy your meal".to_string(),
    ];
    if level >= 1 {
        steps.insert(2, "Sauté aromatic vegetables until fragrant".to_string());
        steps.insert(4, "Add sauces and simmer".to_string());
    }
    if level >= 2 {
        steps.insert(3, "Deglaze pan with liquid for extra flavor".to_string());
        steps.insert(5, "Create and reduce sauce for better consistency".to_string());
    }
    if level >= 3 {
        steps.insert(1, "Marinate proteins for enhanced flavor".to_string());
        steps.insert(6, "Garnish with fresh herbs and toppings".to_string());
    }
    if level >= 4 {
        let last = steps.len() - 1;
        steps.insert(last, "Plate with a finishing drizzle of the reduced sauce".to_string());
    }
    steps
}

fn description_for(level: usize, constraints: &RecipeConstraints) -> String {
    let difficulty = constraints.difficulty;
    let dietary = constraints.dietary;
    match level {
        0 => format!(
            "A perfect {} {} recipe that highlights your chosen ingredients with classic flavors and simple techniques.",
            difficulty, dietary
        ),
        1 => format!(
            "Creative {} {} preparation that adds unexpected twists while keeping the essence of your original idea.",
            difficulty, dietary
        ),
        2 => format!(
            "Innovative {} {} approach combining unique ingredient pairings for a memorable dining experience.",
            difficulty, dietary
        ),
        3 => format!(
            "Sophisticated {} {} recipe featuring premium ingredients and advanced cooking techniques.",
            difficulty, dietary
        ),
        _ => format!(
            "Ultimate {} {} gourmet experience with complex flavors and restaurant-quality presentation.",
            difficulty, dietary
        ),
    }
}

fn base_minutes(difficulty: Difficulty) -> u32 {
    match difficulty {
        Difficulty::Easy => 15,
        Difficulty::Medium => 30,
        Difficulty::Hard => 45,
    }
}

/// Produces progressively more adventurous takes on a prompt.
///
/// All randomness is drawn from the caller's `Rng`, so a seeded generator gives a
/// reproducible batch.
#[derive(Debug, Clone)]
pub struct RecipeVariationGenerator {
    similarity_threshold: f64,
}

impl Default for RecipeVariationGenerator {
    fn default() -> Self {
        Self { similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD }
    }
}

impl RecipeVariationGenerator {
    pub fn with_similarity_threshold(threshold: f64) -> Self {
        Self { similarity_threshold: threshold.clamp(0.3, 1.0) }
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    /// Generates `count` variants (at most [`MAX_VARIATIONS`]) at levels 0, 1, ...;
    /// palettes and titles stop escalating at level 4.
    ///
    /// # Arguments
    /// * `prompt`: free-text request, scanned for known ingredients.
    /// * `constraints`: dietary, cuisine and difficulty options.
    /// * `count`: number of variants wanted.
    /// * `rng`: source for every random choice.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        prompt: &str,
        constraints: &RecipeConstraints,
        count: usize,
        rng: &mut R,
    ) -> Vec<RecipeVariant> {
        let count = count.min(MAX_VARIATIONS);
        let specified = extract_specified_ingredients(prompt);
        log::debug!("Generating {} variation(s), specified ingredients: {:?}", count, specified);

        let mut variants: Vec<RecipeVariant> = Vec::with_capacity(count);
        let mut previous: Vec<BTreeSet<String>> = Vec::with_capacity(count);

        for index in 0..count {
            let level = index.min(MAX_LEVEL);
            let accepted = (0..=MAX_REDRAFTS).find_map(|attempt| {
                let mut drafts = self.draft_ingredients(&specified, constraints.dietary, level, rng);
                if self.diversify(&mut drafts, &previous, constraints.dietary, level, rng) {
                    Some(drafts)
                } else {
                    log::debug!("Redrafting level {} variant (attempt {})", level, attempt + 1);
                    None
                }
            });
            let Some(drafts) = accepted else {
                log::warn!(
                    "Dropping variant {}: still above similarity {} after {} drafts",
                    index,
                    self.similarity_threshold,
                    MAX_REDRAFTS + 1
                );
                continue;
            };

            previous.push(draft_names(&drafts));
            variants.push(self.assemble(level, drafts, &specified, constraints, rng));
        }

        variants
    }

    /// One standalone variant at `level` (capped at 4), with no similarity check.
    pub fn variant_at_level<R: Rng + ?Sized>(
        &self,
        prompt: &str,
        constraints: &RecipeConstraints,
        level: usize,
        rng: &mut R,
    ) -> RecipeVariant {
        let level = level.min(MAX_LEVEL);
        let specified = extract_specified_ingredients(prompt);
        let drafts = self.draft_ingredients(&specified, constraints.dietary, level, rng);
        self.assemble(level, drafts, &specified, constraints, rng)
    }

    fn draft_ingredients<R: Rng + ?Sized>(
        &self,
        specified: &[String],
        dietary: Dietary,
        level: usize,
        rng: &mut R,
    ) -> Vec<Draft> {
        let mut drafts: Vec<Draft> = specified
            .iter()
            .take(MAX_SPECIFIED_INGREDIENTS)
            .map(|name| Draft::new("2", name, true))
            .collect();

        let palette: Vec<&str> = PALETTES[level]
            .iter()
            .copied()
            .filter(|item| dietary_allows(dietary, item))
            .collect();
        for item in palette.choose_multiple(rng, 2 + level) {
            push_unique(&mut drafts, Draft::new("1", item, false));
        }

        let has_protein = drafts.iter().any(|d| d.category == Some(Category::Protein));
        if level > 0 && !has_protein {
            if let Some(protein) = proteins_for(dietary, level).choose(rng) {
                push_unique(&mut drafts, Draft::new("1", protein, false));
            }
        }

        let present = draft_names(&drafts);
        let vegetables: Vec<&str> = vegetables_for(level)
            .into_iter()
            .filter(|v| !present.contains(*v))
            .collect();
        for vegetable in vegetables.choose_multiple(rng, 2) {
            push_unique(&mut drafts, Draft::new("1", vegetable, false));
        }

        if dietary != Dietary::Vegan && level >= 1 {
            if let Some((_, dairy)) = CATEGORIES.iter().find(|(c, _)| *c == Category::Dairy) {
                if let Some(item) = dairy.choose(rng) {
                    push_unique(&mut drafts, Draft::new("1", item, false));
                }
            }
        }

        drafts
    }

    fn too_similar<'a>(&self, drafts: &[Draft], previous: &'a [BTreeSet<String>]) -> Option<&'a BTreeSet<String>> {
        let names = draft_names(drafts);
        previous
            .iter()
            .find(|p| jaccard_similarity(&names, p) > self.similarity_threshold)
    }

    /// Swaps shared, non-specified ingredients for items from categories the draft does
    /// not use yet. If swapping runs dry, pads the draft with ingredients no earlier
    /// variant used. Returns whether the draft ends within the threshold of every
    /// earlier one.
    fn diversify<R: Rng + ?Sized>(
        &self,
        drafts: &mut Vec<Draft>,
        previous: &[BTreeSet<String>],
        dietary: Dietary,
        level: usize,
        rng: &mut R,
    ) -> bool {
        let replacements = (level + 1).min(2);
        let seen_before = |item: &str| previous.iter().any(|p| p.contains(item));

        for round in 0..MAX_DIVERSIFY_ROUNDS {
            let Some(similar) = self.too_similar(drafts, previous) else {
                return true;
            };
            log::debug!("Variant at level {} too similar to an earlier one (round {})", level, round);

            let shared: Vec<String> = drafts
                .iter()
                .filter(|d| !d.specified && similar.contains(&d.name.to_lowercase()))
                .map(|d| d.name.clone())
                .collect();
            if shared.is_empty() {
                break;
            }

            let used: Vec<Category> = drafts.iter().filter_map(|d| d.category).collect();
            let present = draft_names(drafts);
            let fresh = |unused_only: bool| -> Vec<&'static str> {
                CATEGORIES
                    .iter()
                    .filter(|(category, _)| !unused_only || !used.contains(category))
                    .flat_map(|(_, items)| items.iter().copied())
                    .filter(|item| dietary_allows(dietary, item) && !present.contains(*item) && !seen_before(*item))
                    .collect()
            };
            let mut candidates = fresh(true);
            if candidates.is_empty() {
                candidates = fresh(false);
            }
            if candidates.is_empty() {
                break;
            }

            for name in shared.choose_multiple(rng, replacements).cloned().collect::<Vec<_>>() {
                drafts.retain(|d| d.name != name);
            }
            for item in candidates.choose_multiple(rng, replacements).copied().collect::<Vec<_>>() {
                let quantity = REPLACEMENT_QUANTITIES.choose(rng).copied().unwrap_or("1");
                let quantity = if item.contains("milk") || item.contains("cream") {
                    format!("{} cup", quantity)
                } else {
                    quantity.to_string()
                };
                push_unique(drafts, Draft::new(&quantity, item, false));
            }
        }

        if self.too_similar(drafts, previous).is_none() {
            return true;
        }

        // Each unseen ingredient lowers the similarity to every earlier variant.
        let mut pool: Vec<&'static str> = CATEGORIES
            .iter()
            .flat_map(|(_, items)| items.iter().copied())
            .chain(PALETTES.iter().flat_map(|p| p.iter().copied()))
            .chain(vegetables_for(MAX_LEVEL))
            .filter(|item| dietary_allows(dietary, item) && !seen_before(*item))
            .collect();
        pool.shuffle(rng);
        for item in pool {
            if self.too_similar(drafts, previous).is_none() {
                return true;
            }
            push_unique(drafts, Draft::new("1", item, false));
        }

        let within = self.too_similar(drafts, previous).is_none();
        if !within {
            log::warn!("No unused ingredients left to separate level {} variant", level);
        }
        within
    }

    fn title<R: Rng + ?Sized>(&self, level: usize, specified: &[String], dietary: Dietary, cuisine: Cuisine, rng: &mut R) -> String {
        let diet = dietary.label();
        if level == 0 {
            return match specified {
                [first, second, ..] => format!("{} {} and {} Delight", diet, title_case(first), title_case(second)),
                [only] => format!("{} {} Special", diet, title_case(only)),
                [] => format!("{} Chef's Creation", diet),
            };
        }

        let template = cuisine_template(cuisine);
        let proteins: Vec<&str> = template
            .proteins
            .iter()
            .copied()
            .filter(|p| dietary_allows(dietary, p))
            .collect();
        let protein = proteins.choose(rng).copied().unwrap_or("Vegetable");

        if level <= 2 {
            let base = template.bases.choose(rng).copied().unwrap_or("Bowl");
            let style = STYLE_PHRASES.choose(rng).copied().unwrap_or("reimagined");
            format!("{} {} {} {}", diet, protein, base, style)
        } else {
            let term = GOURMET_TERMS.choose(rng).copied().unwrap_or("Gourmet");
            let noun = STYLE_NOUNS.choose(rng).copied().unwrap_or("Creation");
            format!("{} {} {} {}", term, diet, protein, noun)
        }
    }

    fn assemble<R: Rng + ?Sized>(
        &self,
        level: usize,
        drafts: Vec<Draft>,
        specified: &[String],
        constraints: &RecipeConstraints,
        rng: &mut R,
    ) -> RecipeVariant {
        let cuisine = if level >= 2 {
            let others: Vec<Cuisine> = Cuisine::ALL.iter().copied().filter(|c| *c != constraints.cuisine).collect();
            others.choose(rng).copied().unwrap_or(constraints.cuisine)
        } else {
            constraints.cuisine
        };

        let title = self.title(level, specified, constraints.dietary, cuisine, rng);
        let time_minutes = base_minutes(constraints.difficulty) + 10 * level as u32 + rng.gen_range(0..=5);

        let calorie_offset = match constraints.dietary {
            Dietary::Vegan => 50,
            Dietary::Vegetarian => 20,
            _ => 0,
        };
        let nutrition = RecipeNutrition {
            calories_per_serving: rng.gen_range(300..=600) - calorie_offset,
            protein_g: rng.gen_range(15..=35u32) as f64,
            carbs_g: rng.gen_range(40..=80u32) as f64,
            fat_g: rng.gen_range(10..=30u32) as f64,
        };

        let mut id_bytes = [0u8; 16];
        rng.fill(&mut id_bytes[..]);

        RecipeVariant {
            id: uuid::Builder::from_random_bytes(id_bytes).into_uuid(),
            title,
            description: description_for(level, constraints),
            variety_description: VARIETY_DESCRIPTIONS[level].to_string(),
            time_minutes,
            servings: rng.gen_range(2..=4),
            ingredients: drafts
                .into_iter()
                .map(|d| RecipeIngredient { quantity: d.quantity, name: d.name })
                .collect(),
            instructions: instructions_for(level, specified),
            user_specified_ingredients: specified.to_vec(),
            cuisine,
            dietary: constraints.dietary,
            difficulty: constraints.difficulty,
            variation_level: level as u8,
            nutrition,
        }
    }
}
