use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::api_connection::connection::TextCompletion;
use crate::errors::EstimationError;
use crate::llm_json::parse_llm_json;
use crate::models::{round1, ActivityLevel, Goal, Sex, Source, UserProfile, UserTargets};

pub const WEEKDAYS: [&str; 7] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];
pub const DEFAULT_MEAL_SLOTS: [&str; 3] = ["breakfast", "lunch", "dinner"];
pub const MAX_PLAN_DAYS: usize = 14;

const MIN_AGE_YEARS: u32 = 18;
const MAX_AGE_YEARS: u32 = 100;
const MIN_WEIGHT_KG: f64 = 40.0;
const MIN_HEIGHT_CM: f64 = 140.0;

const THREE_SLOT_WEIGHTS: [(&str, f64); 3] = [("breakfast", 0.25), ("lunch", 0.35), ("dinner", 0.40)];
const FOUR_SLOT_WEIGHTS: [(&str, f64); 4] =
    [("breakfast", 0.22), ("lunch", 0.30), ("dinner", 0.33), ("snack", 0.15)];

/// Share of a meal's calories coming from each macronutrient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MealRatio {
    pub protein: f64,
    pub fat: f64,
    pub carb: f64,
}

impl MealRatio {
    const fn new(protein: f64, fat: f64, carb: f64) -> Self {
        Self { protein, fat, carb }
    }
}

impl Default for MealRatio {
    fn default() -> Self {
        Self::new(0.30, 0.25, 0.45)
    }
}

struct MealTemplate {
    name: &'static str,
    description: &'static str,
    ratio: MealRatio,
}

const fn template(name: &'static str, description: &'static str, ratio: MealRatio) -> MealTemplate {
    MealTemplate { name, description, ratio }
}

const BREAKFAST_TEMPLATES: [MealTemplate; 3] = [
    template("Greek Yogurt Quinoa Bowl", "Greek yogurt, cooked quinoa, berries, nuts", MealRatio::new(0.35, 0.25, 0.40)),
    template("Protein Oatmeal", "Rolled oats, protein powder, banana, nuts", MealRatio::new(0.30, 0.20, 0.50)),
    template("Veggie Omelette", "Eggs, spinach, tomato, onions", MealRatio::new(0.34, 0.30, 0.36)),
];

const LUNCH_TEMPLATES: [MealTemplate; 3] = [
    template(
        "Grilled Chicken Salad",
        "Greens, grilled chicken, olive oil dressing, seeds",
        MealRatio::new(0.40, 0.30, 0.30),
    ),
    template("Tofu Quinoa Bowl", "Tofu, quinoa, mixed veggies, tahini", MealRatio::new(0.30, 0.30, 0.40)),
    template(
        "Chickpea & Veggie Wrap",
        "Whole-wheat wrap with spiced chickpeas and veggies",
        MealRatio::new(0.28, 0.25, 0.47),
    ),
];

const DINNER_TEMPLATES: [MealTemplate; 3] = [
    template(
        "Baked Salmon with Veggies",
        "Salmon, roasted veg, small potato or quinoa",
        MealRatio::new(0.35, 0.30, 0.35),
    ),
    template("Lentil Curry and Rice", "Lentils, tomato-onion gravy, brown rice", MealRatio::new(0.25, 0.20, 0.55)),
    template(
        "Stir-fried Tofu & Rice",
        "Tofu, mixed vegetables, soy glaze, brown rice",
        MealRatio::new(0.30, 0.28, 0.42),
    ),
];

const SNACK_TEMPLATES: [MealTemplate; 3] = [
    template("Apple with Peanut Butter", "Apple slices with natural peanut butter", MealRatio::new(0.15, 0.40, 0.45)),
    template("Protein Shake", "Protein powder with water or milk", MealRatio::new(0.70, 0.10, 0.20)),
    template("Mixed Nuts", "Handful of almonds, walnuts, and cashews", MealRatio::new(0.15, 0.65, 0.20)),
];

fn templates_for(meal_type: &str) -> &'static [MealTemplate] {
    match meal_type {
        "breakfast" => &BREAKFAST_TEMPLATES,
        "lunch" => &LUNCH_TEMPLATES,
        "dinner" => &DINNER_TEMPLATES,
        "snack" => &SNACK_TEMPLATES,
        _ => &[],
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MealMacros {
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meal {
    pub id: Uuid,
    pub slot: String,
    pub name: String,
    pub description: String,
    pub calories: i64,
    pub macros: MealMacros,
    pub ingredients_hint: String,
    pub source: Source,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayPlan {
    pub day_label: String,
    pub target_calories: i64,
    /// Sum of the meal calories, which may drift from the target for remote meals.
    pub total_calories: i64,
    pub notes: String,
    pub meals: Vec<Meal>,
    pub total_macros: MealMacros,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeekPlan {
    /// The profile after clamping, i.e. the one the targets were computed from.
    pub profile: UserProfile,
    pub targets: UserTargets,
    pub days: Vec<DayPlan>,
    pub source: Source,
}

/// Progress of a plan build. Stages only ever move forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStage {
    NotStarted,
    AllocatingCalories,
    SelectingMeals { day_index: usize, slot: String },
    Aggregating,
    Complete,
}

/// The template picked for one meal slot. `index` is `None` for meal types without
/// templates.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateChoice {
    pub index: Option<usize>,
    pub name: String,
    pub description: String,
    pub ratio: MealRatio,
}

/// Mifflin-St Jeor basal metabolic rate in kcal/day.
pub fn bmr_mifflin(weight_kg: f64, height_cm: f64, age_years: u32, sex: Sex) -> f64 {
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age_years);
    match sex {
        Sex::Male => base + 5.0,
        Sex::Female => base - 161.0,
    }
}

pub fn tdee(bmr: f64, activity_level: ActivityLevel) -> f64 {
    bmr * activity_level.multiplier()
}

pub fn target_calories(tdee: f64, goal: Goal) -> i64 {
    let adjusted = match goal {
        Goal::LoseWeight => tdee * 0.8,
        Goal::GainWeight => tdee * 1.15,
        Goal::Maintain => tdee,
    };
    adjusted.round() as i64
}

/// Raises out-of-range biometrics to the documented minimums. Only non-finite values
/// are rejected.
pub fn sanitize_profile(profile: &UserProfile) -> Result<UserProfile, EstimationError> {
    if !profile.weight_kg.is_finite() {
        return Err(EstimationError::InvalidProfileInput(format!("weight_kg is {}", profile.weight_kg)));
    }
    if !profile.height_cm.is_finite() {
        return Err(EstimationError::InvalidProfileInput(format!("height_cm is {}", profile.height_cm)));
    }

    let mut sanitized = profile.clone();
    sanitized.age_years = profile.age_years.clamp(MIN_AGE_YEARS, MAX_AGE_YEARS);
    sanitized.weight_kg = profile.weight_kg.max(MIN_WEIGHT_KG);
    sanitized.height_cm = profile.height_cm.max(MIN_HEIGHT_CM);

    if sanitized != *profile {
        log::warn!(
            "Clamped profile values: age {} -> {}, weight {} -> {}, height {} -> {}",
            profile.age_years,
            sanitized.age_years,
            profile.weight_kg,
            sanitized.weight_kg,
            profile.height_cm,
            sanitized.height_cm
        );
    }
    Ok(sanitized)
}

fn targets_for(profile: &UserProfile) -> UserTargets {
    let bmr = bmr_mifflin(profile.weight_kg, profile.height_cm, profile.age_years, profile.sex);
    let daily = tdee(bmr, profile.activity_level);
    UserTargets {
        bmr: round1(bmr),
        tdee: round1(daily),
        target_calories: target_calories(daily, profile.goal),
    }
}

/// Computes BMR, TDEE and the goal-adjusted daily calorie target.
///
/// # Arguments
/// * `profile`: Biometrics; values below the minimums are clamped before use.
///
/// # Returns
/// The targets, or `InvalidProfileInput` for non-finite weight or height.
pub fn compute_user_targets(profile: &UserProfile) -> Result<UserTargets, EstimationError> {
    let profile = sanitize_profile(profile)?;
    Ok(targets_for(&profile))
}

pub fn macros_from_calories(calories: i64, ratio: MealRatio) -> MealMacros {
    let calories = calories as f64;
    MealMacros {
        protein_g: round1(calories * ratio.protein / 4.0),
        fat_g: round1(calories * ratio.fat / 9.0),
        carbs_g: round1(calories * ratio.carb / 4.0),
    }
}

/// Splits a day's calories across meal slots.
///
/// Exactly three or four slots use the fixed weight tables (unknown slot names fall
/// back to an equal share), any other count is split equally. The rounding remainder
/// goes to "dinner" when present, else to the last slot, so the allocations always
/// sum to `total_calories`.
pub fn split_across_meals(total_calories: i64, slots: &[String]) -> Vec<(String, i64)> {
    if slots.is_empty() {
        return Vec::new();
    }

    let weights: &[(&str, f64)] = match slots.len() {
        3 => &THREE_SLOT_WEIGHTS,
        4 => &FOUR_SLOT_WEIGHTS,
        _ => &[],
    };
    let equal_share = 1.0 / slots.len() as f64;

    let mut allocation: Vec<(String, i64)> = slots
        .iter()
        .map(|slot| {
            let weight = weights
                .iter()
                .find(|(name, _)| *name == slot.as_str())
                .map(|(_, w)| *w)
                .unwrap_or(equal_share);
            (slot.clone(), (total_calories as f64 * weight).round() as i64)
        })
        .collect();

    let remainder = total_calories - allocation.iter().map(|(_, c)| c).sum::<i64>();
    if remainder != 0 {
        let target = allocation
            .iter()
            .position(|(slot, _)| slot == "dinner")
            .unwrap_or(allocation.len() - 1);
        allocation[target].1 += remainder;
    }
    allocation
}

/// Weekday name, with a week suffix from the second week on so labels stay unique.
pub fn day_label(day_index: usize) -> String {
    let weekday = WEEKDAYS[day_index % WEEKDAYS.len()];
    if day_index < WEEKDAYS.len() {
        weekday.to_string()
    } else {
        format!("{} (Week {})", weekday, day_index / WEEKDAYS.len() + 1)
    }
}

/// Day targets cycle through 0.95, 1.00 and 1.05 of the daily target.
pub fn day_target_calories(daily_target: i64, day_index: usize) -> i64 {
    let factor = 1.0 + 0.05 * ((day_index % 3) as f64 - 1.0);
    (daily_target as f64 * factor).round() as i64
}

/// Comma separated preference tags, trimmed and lowercased.
pub fn preference_tags(prompt: &str) -> Vec<String> {
    prompt
        .split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Lowercases and dedupes slot names, keeping first occurrence order. An empty list
/// becomes breakfast, lunch and dinner.
pub fn normalize_slots(slots: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let normalized: Vec<String> = slots
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect();
    if normalized.is_empty() {
        DEFAULT_MEAL_SLOTS.iter().map(|s| s.to_string()).collect()
    } else {
        normalized
    }
}

pub fn clamp_day_count(day_count: usize) -> usize {
    day_count.clamp(1, MAX_PLAN_DAYS)
}

fn stable_seed(meal_type: &str, day_index: usize, tags: &[String]) -> u32 {
    let mut sorted: Vec<&str> = tags.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let seed_input = format!("{}|{}|{}", meal_type, day_index, sorted.join("|"));
    let digest = Sha256::digest(seed_input.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Picks a meal template from a hash of `meal_type|day_index|sorted tags`.
///
/// Names in `avoid` are skipped by probing forward through the list; if every
/// template is taken the day label is appended to the name. Identical arguments
/// always give the identical choice.
pub fn select_meal_template(
    meal_type: &str,
    day_index: usize,
    preference_tags: &[String],
    avoid: &HashSet<String>,
) -> TemplateChoice {
    let templates = templates_for(meal_type);

    let mut choice = if templates.is_empty() {
        TemplateChoice {
            index: None,
            name: format!("{} Meal", title_case(meal_type)),
            description: "Balanced meal".to_string(),
            ratio: MealRatio::default(),
        }
    } else {
        let start = stable_seed(meal_type, day_index, preference_tags) as usize % templates.len();
        let index = (0..templates.len())
            .map(|offset| (start + offset) % templates.len())
            .find(|&i| !avoid.contains(templates[i].name))
            .unwrap_or(start);
        let chosen = &templates[index];
        TemplateChoice {
            index: Some(index),
            name: chosen.name.to_string(),
            description: chosen.description.to_string(),
            ratio: chosen.ratio,
        }
    };

    if avoid.contains(&choice.name) {
        let label = day_label(day_index);
        let mut candidate = format!("{} ({})", choice.name, label);
        let mut counter = 2;
        while avoid.contains(&candidate) {
            candidate = format!("{} ({} #{})", choice.name, label, counter);
            counter += 1;
        }
        choice.name = candidate;
    }
    choice
}

fn template_meal(
    slot: &str,
    calories: i64,
    day_index: usize,
    tags: &[String],
    used_names: &HashSet<String>,
) -> Meal {
    let choice = select_meal_template(slot, day_index, tags, used_names);
    Meal {
        id: Uuid::new_v4(),
        slot: slot.to_string(),
        name: choice.name,
        ingredients_hint: choice.description.clone(),
        description: choice.description,
        calories,
        macros: macros_from_calories(calories, choice.ratio),
        source: Source::Deterministic,
    }
}

fn assemble_day(day_label: String, target_calories: i64, notes: String, meals: Vec<Meal>) -> DayPlan {
    let total_calories = meals.iter().map(|m| m.calories).sum();
    let mut total_macros = MealMacros::default();
    for meal in &meals {
        total_macros.protein_g += meal.macros.protein_g;
        total_macros.fat_g += meal.macros.fat_g;
        total_macros.carbs_g += meal.macros.carbs_g;
    }
    DayPlan {
        day_label,
        target_calories,
        total_calories,
        notes,
        meals,
        total_macros: MealMacros {
            protein_g: round1(total_macros.protein_g),
            fat_g: round1(total_macros.fat_g),
            carbs_g: round1(total_macros.carbs_g),
        },
    }
}

pub fn generate_week_plan(
    profile: &UserProfile,
    prompt: &str,
    day_count: usize,
    slots: &[String],
) -> Result<WeekPlan, EstimationError> {
    generate_week_plan_with_progress(profile, prompt, day_count, slots, |_| {})
}

/// Builds a plan of `day_count` days (clamped to 1..=14) from the meal templates,
/// reporting each stage to `progress`. No two meals in the plan share a name.
pub fn generate_week_plan_with_progress<F>(
    profile: &UserProfile,
    prompt: &str,
    day_count: usize,
    slots: &[String],
    mut progress: F,
) -> Result<WeekPlan, EstimationError>
where
    F: FnMut(&PlanStage),
{
    progress(&PlanStage::NotStarted);
    let profile = sanitize_profile(profile)?;
    let targets = targets_for(&profile);
    let day_count = clamp_day_count(day_count);
    let slots = normalize_slots(slots);
    let tags = preference_tags(prompt);

    progress(&PlanStage::AllocatingCalories);
    let allocations: Vec<(i64, Vec<(String, i64)>)> = (0..day_count)
        .map(|day_index| {
            let day_target = day_target_calories(targets.target_calories, day_index);
            (day_target, split_across_meals(day_target, &slots))
        })
        .collect();

    let mut used_names = HashSet::new();
    let mut meals_per_day = Vec::with_capacity(day_count);
    for (day_index, (_, allocation)) in allocations.iter().enumerate() {
        let mut meals = Vec::with_capacity(allocation.len());
        for (slot, calories) in allocation {
            progress(&PlanStage::SelectingMeals { day_index, slot: slot.clone() });
            let meal = template_meal(slot, *calories, day_index, &tags, &used_names);
            used_names.insert(meal.name.clone());
            meals.push(meal);
        }
        meals_per_day.push(meals);
    }

    progress(&PlanStage::Aggregating);
    let days = allocations
        .into_iter()
        .zip(meals_per_day)
        .enumerate()
        .map(|(day_index, ((day_target, _), meals))| assemble_day(day_label(day_index), day_target, String::new(), meals))
        .collect();

    progress(&PlanStage::Complete);
    log::info!("Built {}-day plan at {} kcal/day", day_count, targets.target_calories);
    Ok(WeekPlan { profile, targets, days, source: Source::Deterministic })
}

/// A single day at the undiluted daily target. Slot `i` is seeded with day index `i`,
/// so the same slot list always yields the same menu.
pub fn generate_day_plan(
    profile: &UserProfile,
    prompt: &str,
    label: &str,
    slots: &[String],
) -> Result<DayPlan, EstimationError> {
    let profile = sanitize_profile(profile)?;
    let targets = targets_for(&profile);
    let slots = normalize_slots(slots);
    let tags = preference_tags(prompt);

    let no_avoid = HashSet::new();
    let meals = split_across_meals(targets.target_calories, &slots)
        .into_iter()
        .enumerate()
        .map(|(index, (slot, calories))| template_meal(&slot, calories, index, &tags, &no_avoid))
        .collect();

    Ok(assemble_day(label.to_string(), targets.target_calories, String::new(), meals))
}

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+").expect("valid number regex"));

/// Reads a calorie figure that may be a number or a string such as "450 kcal".
/// Missing, unparseable or non-positive values give `fallback`.
pub fn parse_calories_value(value: Option<&Value>, fallback: i64) -> i64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64().map(|f| f.round() as i64),
        Some(Value::String(s)) => NUMBER_RE
            .find(&s.replace(',', ""))
            .and_then(|m| m.as_str().parse::<i64>().ok()),
        _ => None,
    };
    parsed.filter(|&c| c > 0).unwrap_or(fallback)
}

const PLANNER_SYSTEM_PROMPT: &str = "You are a professional nutritionist and meal planner. Output ONLY valid JSON. \
Ensure diversity across days - do not repeat the same meal name more than once in the week. \
Schema: {\"days\": [{\"day\":\"Monday\",\"calories\":2200, \"notes\":\"Brief notes\"}, ...]}";

const MEAL_SYSTEM_PROMPT: &str = "You are a recipe and meal generator. Output ONLY valid JSON for a single meal with keys:\n\
{\"name\":\"Meal Name\",\"description\":\"Brief description\",\"calories\":400,\
\"macros\":{\"protein_g\":30,\"fat_g\":15,\"carbs_g\":40},\"ingredients_hint\":\"ingredient1, ingredient2\"}";

#[derive(Debug, Deserialize)]
struct PlannerReply {
    #[serde(default)]
    days: Vec<PlannerDay>,
}

#[derive(Debug, Deserialize)]
struct PlannerDay {
    #[serde(default)]
    calories: Option<Value>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteMeal {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    calories: Option<Value>,
    #[serde(default)]
    macros: Option<MealMacros>,
    #[serde(default)]
    ingredients_hint: String,
}

async fn remote_meal(
    completion: &dyn TextCompletion,
    slot: &str,
    calorie_target: i64,
    prompt: &str,
    profile_json: &str,
    used_names: &HashSet<String>,
) -> Result<Meal, EstimationError> {
    let mut avoid: Vec<&str> = used_names.iter().map(String::as_str).collect();
    avoid.sort_unstable();
    let user_prompt = format!(
        "Create one {} meal with constraints:\n- Target calories: {}\n- User preferences: {}\n- User profile: {}\n\
         - Avoid these meal names (already used): {:?}\nReturn only the JSON object. Name should be unique and concise.",
        slot, calorie_target, prompt, profile_json, avoid
    );
    let reply = completion.complete_text(MEAL_SYSTEM_PROMPT, &user_prompt).await?;
    let remote: RemoteMeal = parse_llm_json(&reply)?;

    let name = remote.name.trim().to_string();
    if name.is_empty() {
        return Err(EstimationError::MalformedExternalResponse("meal without a name".to_string()));
    }
    if used_names.contains(&name) {
        return Err(EstimationError::MalformedExternalResponse(format!("duplicate meal name '{}'", name)));
    }

    let calories = parse_calories_value(remote.calories.as_ref(), calorie_target);
    Ok(Meal {
        id: Uuid::new_v4(),
        slot: slot.to_string(),
        name,
        description: remote.description,
        calories,
        macros: remote.macros.unwrap_or_else(|| macros_from_calories(calories, MealRatio::default())),
        ingredients_hint: remote.ingredients_hint,
        source: Source::RemoteLlm,
    })
}

/// Like [`generate_week_plan`] but asks `completion` for the day targets and for each
/// meal first. A failed planner call yields the fully deterministic plan; a failed or
/// duplicate meal is replaced by a template meal; missing planner days use the
/// deterministic day target.
pub async fn generate_week_plan_assisted(
    completion: &dyn TextCompletion,
    profile: &UserProfile,
    prompt: &str,
    day_count: usize,
    slots: &[String],
) -> Result<WeekPlan, EstimationError> {
    let sanitized = sanitize_profile(profile)?;
    let day_count = clamp_day_count(day_count);
    let slots = normalize_slots(slots);

    let assisted = assisted_plan(completion, &sanitized, prompt, day_count, &slots, day_target_calories).await;
    match assisted {
        Some(plan) => Ok(plan),
        None => generate_week_plan(&sanitized, prompt, day_count, &slots),
    }
}

/// Single-day counterpart of [`generate_week_plan_assisted`]. The day keeps the full
/// daily target unless the planner names another, and a failed planner call yields
/// [`generate_day_plan`].
pub async fn generate_day_plan_assisted(
    completion: &dyn TextCompletion,
    profile: &UserProfile,
    prompt: &str,
    label: &str,
    slots: &[String],
) -> Result<DayPlan, EstimationError> {
    let sanitized = sanitize_profile(profile)?;
    let slots = normalize_slots(slots);

    let assisted = assisted_plan(completion, &sanitized, prompt, 1, &slots, |target, _| target).await;
    match assisted.and_then(|plan| plan.days.into_iter().next()) {
        Some(mut day) => {
            day.day_label = label.to_string();
            Ok(day)
        }
        None => generate_day_plan(&sanitized, prompt, label, &slots),
    }
}

/// `None` when the planner call fails or names no days.
async fn assisted_plan(
    completion: &dyn TextCompletion,
    profile: &UserProfile,
    prompt: &str,
    day_count: usize,
    slots: &[String],
    default_target: fn(i64, usize) -> i64,
) -> Option<WeekPlan> {
    let targets = targets_for(profile);
    let tags = preference_tags(prompt);

    let profile_json = serde_json::json!({ "profile": profile, "targets": &targets }).to_string();
    let planner_user = format!(
        "User profile: {}\nPreferences/prompt: {}\nNumber of days: {}\nMeals per day: {:?}\n\
         Return a planner JSON with target calories for each day and brief notes. Ensure day-to-day variety.",
        profile_json, prompt, day_count, slots
    );

    let planner = match completion.complete_text(PLANNER_SYSTEM_PROMPT, &planner_user).await {
        Ok(text) => parse_llm_json::<PlannerReply>(&text),
        Err(err) => Err(err.into()),
    };
    let planner = match planner {
        Ok(reply) if !reply.days.is_empty() => reply,
        Ok(_) => {
            log::warn!("Planner reply had no days, using deterministic plan");
            return None;
        }
        Err(err) => {
            log::warn!("Planner call failed, using deterministic plan: {}", err);
            return None;
        }
    };

    let mut used_names = HashSet::new();
    let mut days = Vec::with_capacity(day_count);
    for day_index in 0..day_count {
        let fallback_target = default_target(targets.target_calories, day_index);
        let planned = planner.days.get(day_index);
        let day_target = parse_calories_value(planned.and_then(|d| d.calories.as_ref()), fallback_target);
        let notes = planned.and_then(|d| d.notes.clone()).unwrap_or_default();
        let label = day_label(day_index);

        let mut meals = Vec::with_capacity(slots.len());
        for (slot, calories) in split_across_meals(day_target, slots) {
            let meal = match remote_meal(completion, &slot, calories, prompt, &profile_json, &used_names).await {
                Ok(meal) => meal,
                Err(err) => {
                    log::warn!("Remote {} for {} failed, using template: {}", slot, label, err);
                    template_meal(&slot, calories, day_index, &tags, &used_names)
                }
            };
            used_names.insert(meal.name.clone());
            meals.push(meal);
        }
        days.push(assemble_day(label, day_target, notes, meals));
    }

    Some(WeekPlan { profile: profile.clone(), targets, days, source: Source::RemoteLlm })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::connection::ApiConnectionError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn slots(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn profile_with_goal(goal: Goal) -> UserProfile {
        UserProfile { goal, ..UserProfile::default() }
    }

    #[test]
    fn test_split_three_slots() {
        let allocation = split_across_meals(2000, &slots(&["breakfast", "lunch", "dinner"]));
        assert_eq!(
            allocation,
            vec![("breakfast".to_string(), 500), ("lunch".to_string(), 700), ("dinner".to_string(), 800)]
        );
    }

    #[test]
    fn test_split_remainder_goes_to_dinner_or_last() {
        let four = split_across_meals(2001, &slots(&["breakfast", "lunch", "dinner", "snack"]));
        assert_eq!(four.iter().map(|(_, c)| c).sum::<i64>(), 2001);

        let five = split_across_meals(2003, &slots(&["a", "dinner", "b", "c", "d"]));
        assert_eq!(five[1].1, 401 - 2);
        assert_eq!(five.iter().map(|(_, c)| c).sum::<i64>(), 2003);

        let two = split_across_meals(1001, &slots(&["brunch", "supper"]));
        assert_eq!(two.iter().map(|(_, c)| c).sum::<i64>(), 1001);
        assert!(split_across_meals(1000, &[]).is_empty());
    }

    #[test]
    fn test_bmr_mifflin_reference_values() {
        assert!((bmr_mifflin(70.0, 170.0, 30, Sex::Male) - 1617.5).abs() < 0.01);
        assert!((bmr_mifflin(70.0, 170.0, 30, Sex::Female) - 1451.5).abs() < 0.01);
    }

    #[test]
    fn test_target_calories_ordered_by_goal() {
        for activity in [ActivityLevel::Sedentary, ActivityLevel::Moderate, ActivityLevel::VeryActive] {
            let mut base = UserProfile { activity_level: activity, ..UserProfile::default() };
            base.goal = Goal::LoseWeight;
            let lose = compute_user_targets(&base).unwrap().target_calories;
            base.goal = Goal::Maintain;
            let maintain = compute_user_targets(&base).unwrap().target_calories;
            base.goal = Goal::GainWeight;
            let gain = compute_user_targets(&base).unwrap().target_calories;
            assert!(lose < maintain && maintain < gain);
        }
    }

    #[test]
    fn test_compute_user_targets_default_profile() {
        let targets = compute_user_targets(&profile_with_goal(Goal::Maintain)).unwrap();
        assert_eq!(targets.bmr, 1617.5);
        assert_eq!(targets.tdee, 2507.1);
        assert_eq!(targets.target_calories, 2507);
    }

    #[test]
    fn test_profile_is_clamped_not_rejected() {
        let profile = UserProfile { age_years: 12, weight_kg: 20.0, height_cm: 90.0, ..UserProfile::default() };
        let sanitized = sanitize_profile(&profile).unwrap();
        assert_eq!(sanitized.age_years, 18);
        assert_eq!(sanitized.weight_kg, 40.0);
        assert_eq!(sanitized.height_cm, 140.0);

        let nan = UserProfile { weight_kg: f64::NAN, ..UserProfile::default() };
        assert!(matches!(compute_user_targets(&nan), Err(EstimationError::InvalidProfileInput(_))));
    }

    #[test]
    fn test_select_meal_template_is_pure() {
        let tags = vec!["high protein".to_string(), "quick".to_string()];
        let reversed: Vec<String> = tags.iter().rev().cloned().collect();
        let avoid = HashSet::new();
        for day in 0..14 {
            let first = select_meal_template("lunch", day, &tags, &avoid);
            let second = select_meal_template("lunch", day, &reversed, &avoid);
            assert_eq!(first, second);
            assert!(first.index.unwrap() < 3);
        }
    }

    #[test]
    fn test_select_meal_template_skips_taken_then_suffixes() {
        let none = HashSet::new();
        let first = select_meal_template("dinner", 2, &[], &none);

        let avoid: HashSet<String> = [first.name.clone()].into_iter().collect();
        let next_free = select_meal_template("dinner", 2, &[], &avoid);
        assert_eq!(next_free.index, Some((first.index.unwrap() + 1) % 3));

        let all: HashSet<String> = DINNER_TEMPLATES.iter().map(|t| t.name.to_string()).collect();
        let exhausted = select_meal_template("dinner", 2, &[], &all);
        assert_eq!(exhausted.name, format!("{} (Wednesday)", first.name));
    }

    #[test]
    fn test_unknown_meal_type_uses_generic_meal() {
        let choice = select_meal_template("late brunch", 0, &[], &HashSet::new());
        assert_eq!(choice.index, None);
        assert_eq!(choice.name, "Late Brunch Meal");
        assert_eq!(choice.ratio, MealRatio::default());
    }

    #[test]
    fn test_week_plan_has_unique_meal_names() {
        let plan = generate_week_plan(&UserProfile::default(), "", 7, &slots(&["breakfast", "lunch", "dinner"])).unwrap();
        let names: Vec<&str> = plan.days.iter().flat_map(|d| d.meals.iter().map(|m| m.name.as_str())).collect();
        assert_eq!(names.len(), 21);
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(unique.len(), 21);
    }

    #[test]
    fn test_two_week_plan_labels_and_totals() {
        let plan = generate_week_plan(&UserProfile::default(), "vegetarian", 30, &[]).unwrap();
        assert_eq!(plan.days.len(), MAX_PLAN_DAYS);
        assert_eq!(plan.days[0].day_label, "Monday");
        assert_eq!(plan.days[7].day_label, "Monday (Week 2)");

        let labels: HashSet<&str> = plan.days.iter().map(|d| d.day_label.as_str()).collect();
        assert_eq!(labels.len(), MAX_PLAN_DAYS);

        for (i, day) in plan.days.iter().enumerate() {
            assert_eq!(day.target_calories, day_target_calories(plan.targets.target_calories, i));
            assert_eq!(day.total_calories, day.target_calories);
            assert_eq!(day.meals.len(), 3);
        }
        assert_eq!(plan.days[0].target_calories, (2507.0_f64 * 0.95).round() as i64);
    }

    #[test]
    fn test_zero_days_still_plans_one() {
        let plan = generate_week_plan(&UserProfile::default(), "", 0, &slots(&["snack"])).unwrap();
        assert_eq!(plan.days.len(), 1);
        assert_eq!(plan.days[0].meals[0].slot, "snack");
    }

    #[test]
    fn test_progress_stages_in_order() {
        let mut stages = Vec::new();
        generate_week_plan_with_progress(&UserProfile::default(), "", 2, &slots(&["lunch", "dinner"]), |s| {
            stages.push(s.clone())
        })
        .unwrap();

        assert_eq!(stages.first(), Some(&PlanStage::NotStarted));
        assert_eq!(stages[1], PlanStage::AllocatingCalories);
        assert_eq!(stages[2], PlanStage::SelectingMeals { day_index: 0, slot: "lunch".to_string() });
        assert_eq!(stages.iter().filter(|s| matches!(s, PlanStage::SelectingMeals { .. })).count(), 4);
        assert_eq!(&stages[stages.len() - 2..], &[PlanStage::Aggregating, PlanStage::Complete]);
    }

    #[test]
    fn test_generate_day_plan_is_reproducible() {
        let day_slots = slots(&["breakfast", "lunch", "dinner", "snack"]);
        let first = generate_day_plan(&UserProfile::default(), "quick", "Friday", &day_slots).unwrap();
        let second = generate_day_plan(&UserProfile::default(), "quick", "Friday", &day_slots).unwrap();
        let names = |d: &DayPlan| d.meals.iter().map(|m| m.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&first), names(&second));
        assert_eq!(first.total_calories, 2507);
        assert_eq!(first.day_label, "Friday");
    }

    #[test]
    fn test_parse_calories_value_formats() {
        let fallback = 300;
        assert_eq!(parse_calories_value(Some(&serde_json::json!(412.6)), fallback), 413);
        assert_eq!(parse_calories_value(Some(&serde_json::json!("1,250 kcal")), fallback), 1250);
        assert_eq!(parse_calories_value(Some(&serde_json::json!("about many")), fallback), 300);
        assert_eq!(parse_calories_value(Some(&serde_json::json!(-5)), fallback), 300);
        assert_eq!(parse_calories_value(None, fallback), 300);
    }

    struct PlannerMock {
        meal_calls: AtomicUsize,
        repeat_name: bool,
    }

    #[async_trait::async_trait]
    impl TextCompletion for PlannerMock {
        fn name(&self) -> &str {
            "planner-mock"
        }

        async fn complete_text(&self, system: &str, _user: &str) -> Result<String, ApiConnectionError> {
            if system.contains("meal planner") {
                return Ok("```json\n{\"days\": [{\"day\": \"Monday\", \"calories\": 1800, \"notes\": \"light\"}]}\n```"
                    .to_string());
            }
            let n = self.meal_calls.fetch_add(1, Ordering::SeqCst);
            let name = if self.repeat_name { "House Bowl".to_string() } else { format!("Chef Plate {}", n) };
            Ok(format!("{{\"name\": \"{}\", \"description\": \"d\", \"calories\": \"450 kcal\"}}", name))
        }
    }

    struct Offline;

    #[async_trait::async_trait]
    impl TextCompletion for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        async fn complete_text(&self, _system: &str, _user: &str) -> Result<String, ApiConnectionError> {
            Err(ApiConnectionError::NoProvidersAvailable)
        }
    }

    #[tokio::test]
    async fn test_assisted_plan_uses_remote_meals_and_day_targets() {
        let mock = PlannerMock { meal_calls: AtomicUsize::new(0), repeat_name: false };
        let plan = generate_week_plan_assisted(&mock, &UserProfile::default(), "", 2, &[]).await.unwrap();

        assert_eq!(plan.source, Source::RemoteLlm);
        assert_eq!(plan.days[0].target_calories, 1800);
        assert_eq!(plan.days[0].notes, "light");
        assert_eq!(plan.days[1].target_calories, day_target_calories(2507, 1));
        assert!(plan.days.iter().flat_map(|d| &d.meals).all(|m| m.source == Source::RemoteLlm && m.calories == 450));
    }

    #[tokio::test]
    async fn test_assisted_plan_replaces_duplicate_remote_meals() {
        let mock = PlannerMock { meal_calls: AtomicUsize::new(0), repeat_name: true };
        let plan = generate_week_plan_assisted(&mock, &UserProfile::default(), "", 1, &[]).await.unwrap();

        let meals = &plan.days[0].meals;
        assert_eq!(meals[0].name, "House Bowl");
        assert!(meals[1..].iter().all(|m| m.source == Source::Deterministic));
    }

    #[tokio::test]
    async fn test_assisted_plan_falls_back_when_offline() {
        let assisted = generate_week_plan_assisted(&Offline, &UserProfile::default(), "", 7, &[]).await.unwrap();
        let local = generate_week_plan(&UserProfile::default(), "", 7, &[]).unwrap();

        assert_eq!(assisted.source, Source::Deterministic);
        let names = |p: &WeekPlan| p.days.iter().flat_map(|d| d.meals.iter().map(|m| m.name.clone())).collect::<Vec<_>>();
        assert_eq!(names(&assisted), names(&local));
    }

    #[tokio::test]
    async fn test_assisted_day_plan_keeps_full_target_when_offline() {
        let profile = UserProfile::default();
        let assisted = generate_day_plan_assisted(&Offline, &profile, "", "Friday", &[]).await.unwrap();
        let local = generate_day_plan(&profile, "", "Friday", &[]).unwrap();

        assert_eq!(assisted.target_calories, 2507);
        assert_eq!(assisted.total_calories, local.total_calories);
        assert_eq!(assisted.day_label, "Friday");
        let names = |d: &DayPlan| d.meals.iter().map(|m| m.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&assisted), names(&local));
    }

    struct TargetlessPlanner;

    #[async_trait::async_trait]
    impl TextCompletion for TargetlessPlanner {
        fn name(&self) -> &str {
            "targetless"
        }

        async fn complete_text(&self, system: &str, _user: &str) -> Result<String, ApiConnectionError> {
            if system.contains("meal planner") {
                return Ok("{\"days\": [{\"day\": \"Monday\", \"notes\": \"rest day\"}]}".to_string());
            }
            Err(ApiConnectionError::EmptyResponse("targetless".to_string()))
        }
    }

    #[tokio::test]
    async fn test_assisted_day_plan_without_planner_calories_uses_daily_target() {
        let day = generate_day_plan_assisted(&TargetlessPlanner, &UserProfile::default(), "", "Sunday", &[])
            .await
            .unwrap();
        assert_eq!(day.target_calories, 2507);
        assert_eq!(day.total_calories, 2507);
        assert_eq!(day.notes, "rest day");
        assert_eq!(day.day_label, "Sunday");
    }
}
