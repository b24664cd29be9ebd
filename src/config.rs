use anyhow::{Context, Result};
use dotenv::dotenv;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::api_connection::connection::{ProviderChain, TextCompletion};
use crate::api_connection::endpoints::Provider;
use crate::nutrient_table::{load_nutrient_csv, NutrientTable};

pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 20;

const LLM_ENABLED_VAR: &str = "LLM_ENABLED";
const LLM_TIMEOUT_VAR: &str = "LLM_TIMEOUT_SECS";
const NUTRIENT_TABLE_VAR: &str = "NUTRIENT_TABLE_CSV";
const RECIPE_SEED_VAR: &str = "RECIPE_SEED";

/// Where to find one provider's key, and which model to ask for.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub api_key_env_var: String,
    pub model: Option<String>,
}

impl ProviderSettings {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>, key_var: &str, model_var: &str) -> Self {
        Self {
            api_key_env_var: key_var.to_string(),
            model: lookup(model_var).map(|m| m.trim().to_string()).filter(|m| !m.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub llm_enabled: bool,
    pub llm_timeout: Duration,
    pub nutrient_table_csv: Option<PathBuf>,
    pub recipe_seed: Option<u64>,
    pub gemini: ProviderSettings,
    pub groq: ProviderSettings,
    pub openai: ProviderSettings,
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("'{}' is not a boolean", other)),
    }
}

impl EngineConfig {
    /// Reads the process environment after loading `.env`.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// # Arguments
    /// * `lookup`: returns the value of a variable, or `None` when unset.
    ///
    /// # Returns
    /// The configuration, or an error naming the variable that failed to parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let llm_enabled = match lookup(LLM_ENABLED_VAR) {
            Some(v) => parse_flag(&v).with_context(|| format!("Invalid {}", LLM_ENABLED_VAR))?,
            None => true,
        };

        let timeout_secs = match lookup(LLM_TIMEOUT_VAR) {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid {} value '{}'", LLM_TIMEOUT_VAR, v))?,
            None => DEFAULT_LLM_TIMEOUT_SECS,
        };

        let recipe_seed = lookup(RECIPE_SEED_VAR)
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("Invalid {} value '{}'", RECIPE_SEED_VAR, v))
            })
            .transpose()?;

        let nutrient_table_csv = lookup(NUTRIENT_TABLE_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            llm_enabled,
            llm_timeout: Duration::from_secs(timeout_secs.max(1)),
            nutrient_table_csv,
            recipe_seed,
            gemini: ProviderSettings::from_lookup(&lookup, "GEMINI_API_KEY", "GEMINI_MODEL"),
            groq: ProviderSettings::from_lookup(&lookup, "GROQ_API_KEY", "GROQ_MODEL"),
            openai: ProviderSettings::from_lookup(&lookup, "OPENAI_API_KEY", "OPENAI_MODEL"),
        })
    }

    /// Fully offline configuration, used by tests and `--offline`.
    pub fn offline() -> Self {
        let none = |_: &str| -> Option<String> { None };
        Self {
            llm_enabled: false,
            llm_timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
            nutrient_table_csv: None,
            recipe_seed: None,
            gemini: ProviderSettings::from_lookup(&none, "GEMINI_API_KEY", "GEMINI_MODEL"),
            groq: ProviderSettings::from_lookup(&none, "GROQ_API_KEY", "GROQ_MODEL"),
            openai: ProviderSettings::from_lookup(&none, "OPENAI_API_KEY", "OPENAI_MODEL"),
        }
    }

    /// Gemini, Groq, then OpenAI. `None` when remote completion is disabled.
    pub fn provider_chain(&self) -> Option<ProviderChain> {
        if !self.llm_enabled {
            return None;
        }
        let backends: Vec<Arc<dyn TextCompletion>> = vec![
            Arc::new(Provider::gemini(&self.gemini.api_key_env_var, self.gemini.model.as_deref())),
            Arc::new(Provider::groq(&self.groq.api_key_env_var, self.groq.model.as_deref())),
            Arc::new(Provider::openai(&self.openai.api_key_env_var, self.openai.model.as_deref())),
        ];
        Some(ProviderChain::new(backends, self.llm_timeout))
    }

    /// The built-in table, extended by the CSV file when one is configured.
    pub fn nutrient_table(&self) -> Result<NutrientTable> {
        let table = NutrientTable::builtin();
        match &self.nutrient_table_csv {
            Some(path) => {
                let facts = load_nutrient_csv(path)
                    .with_context(|| format!("Failed to load nutrient table from {:?}", path))?;
                Ok(table.with_overrides(facts))
            }
            None => Ok(table),
        }
    }

    /// Seeded when `RECIPE_SEED` is set, otherwise seeded from entropy.
    pub fn recipe_rng(&self) -> StdRng {
        match self.recipe_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}
