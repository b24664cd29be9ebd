use anyhow::{Context, Result};
use nutri_engine::cli::{parse_args, recipe_constraints, Command};
use nutri_engine::config::EngineConfig;
use nutri_engine::pantry::Enhancement;
use nutri_engine::service::FoodService;
use serde::Serialize;
use tokio::fs;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok(); // Load .env file for API keys
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli_args = parse_args();

    let mut config = EngineConfig::from_env().context("Failed to read configuration")?;
    if cli_args.offline {
        config.llm_enabled = false;
    }
    if let Command::Recipes { seed: Some(seed), .. } | Command::Dishes { seed: Some(seed), .. } = &cli_args.command {
        config.recipe_seed = Some(*seed);
    }
    let service = FoodService::from_config(&config).context("Failed to initialize food service")?;

    match cli_args.command {
        Command::Text { description } => {
            print_json(&service.analyze_text(&description).await)?;
        }
        Command::Image { path, base64 } => {
            let stored = if base64 {
                let payload = fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read image payload '{}'", path.display()))?;
                service.analyze_image_payload(&payload).await?
            } else {
                let bytes = fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read image file '{}'", path.display()))?;
                service.analyze_image(&bytes).await
            };
            print_json(&stored)?;
        }
        Command::Recipes { prompt, dietary, cuisine, difficulty, count, .. } => {
            let constraints = recipe_constraints(&dietary, &cuisine, &difficulty);
            print_json(&service.recipe_variations(&prompt, &constraints, count))?;
        }
        Command::Targets { profile } => {
            let targets = service.user_targets(&profile.to_profile())?;
            print_json(&targets)?;
        }
        Command::Plan { profile, prompt, days, meals } => {
            let plan = service.week_plan(&profile.to_profile(), &prompt, days, &meals).await?;
            print_json(&plan)?;
        }
        Command::Day { profile, prompt, day, meals } => {
            let plan = service.day_plan(&profile.to_profile(), &prompt, &day, &meals).await?;
            print_json(&plan)?;
        }
        Command::Dishes { dishes, dietary, cuisine, difficulty, .. } => {
            let constraints = recipe_constraints(&dietary, &cuisine, &difficulty);
            print_json(&service.dish_plan(&dishes, &constraints)?)?;
        }
        Command::Fridge { items } => {
            print_json(&service.fridge_recipes(&items).await?)?;
        }
        Command::Budget { prompt, days, meals, enhance, instructions } => {
            let mut plan = service.budget_plan(&prompt, days, &meals);
            if let Some(kind) = enhance {
                let enhancement = Enhancement::from_parts(&kind, instructions.as_deref())
                    .with_context(|| format!("Unknown enhancement '{}'", kind))?;
                for meal in plan.days.iter_mut().flat_map(|d| d.meals.iter_mut()) {
                    if let Some(enhanced) = service.enhance_budget_recipe(&meal.id, &enhancement) {
                        *meal = enhanced;
                    }
                }
                plan.refresh_costs();
            }
            print_json(&plan)?;
        }
        Command::Chat { message } => {
            print_json(&service.chat(&message).await)?;
        }
    }

    Ok(())
}
