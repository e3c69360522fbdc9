//! Model pricing tables and cost calculation.
//!
//! The built-in table ships as `data/pricing.toml` (USD per million tokens). A
//! replacement can be loaded from a file in the same format or from LiteLLM's
//! `model_prices_and_context_window.json` (USD per token).

use crate::error::PricingError;
use crate::models::TokenSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const BUILTIN_PRICING: &str = include_str!("../data/pricing.toml");

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Prices in USD per million tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub input: Option<f64>,
    #[serde(default)]
    pub output: Option<f64>,
    /// Falls back to `input` when absent.
    #[serde(default)]
    pub cache_read: Option<f64>,
    /// Falls back to `input` when absent.
    #[serde(default)]
    pub cache_write: Option<f64>,
}

/// Cost of a usage delta and how much of it the table could price.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PricedUsage {
    pub cost: f64,
    pub priced_tokens: u64,
    pub unpriced_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct PricingFile {
    #[serde(default)]
    models: BTreeMap<String, ModelPricing>,
}

#[derive(Debug, Deserialize)]
struct LiteLlmEntry {
    #[serde(default)]
    input_cost_per_token: Option<f64>,
    #[serde(default)]
    output_cost_per_token: Option<f64>,
    #[serde(default)]
    cache_read_input_token_cost: Option<f64>,
    #[serde(default)]
    cache_creation_input_token_cost: Option<f64>,
}

impl LiteLlmEntry {
    fn per_million(&self) -> ModelPricing {
        let scale = |price: Option<f64>| price.map(|p| p * TOKENS_PER_MILLION);
        ModelPricing {
            input: scale(self.input_cost_per_token),
            output: scale(self.output_cost_per_token),
            cache_read: scale(self.cache_read_input_token_cost),
            cache_write: scale(self.cache_creation_input_token_cost),
        }
    }
}

/// Model id → prices. Keys are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PricingTable {
    models: BTreeMap<String, ModelPricing>,
}

impl PricingTable {
    pub fn builtin() -> Result<Self, PricingError> {
        Self::from_toml_str(BUILTIN_PRICING)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PricingError> {
        let file: PricingFile = toml::from_str(content)?;
        Ok(Self::from_models(file.models))
    }

    /// Entries that are not price objects (LiteLLM's `sample_spec`) are skipped.
    pub fn from_litellm_json(content: &str) -> Result<Self, PricingError> {
        let raw: BTreeMap<String, Value> = serde_json::from_str(content)?;
        let models = raw
            .into_iter()
            .filter_map(|(model, entry)| match serde_json::from_value::<LiteLlmEntry>(entry) {
                Ok(entry) => Some((model, entry.per_million())),
                Err(e) => {
                    debug!(model = %model, error = %e, "Skipping LiteLLM pricing entry");
                    None
                }
            })
            .collect();
        Ok(Self::from_models(models))
    }

    /// Load a table from disk; `.json` files are read as LiteLLM data, anything else as TOML.
    pub fn load(path: &Path) -> Result<Self, PricingError> {
        let content = std::fs::read_to_string(path).map_err(|source| PricingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_litellm_json(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    fn from_models(models: BTreeMap<String, ModelPricing>) -> Self {
        Self {
            models: models
                .into_iter()
                .map(|(model, pricing)| (model.trim().to_lowercase(), pricing))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn models(&self) -> impl Iterator<Item = (&str, &ModelPricing)> {
        self.models.iter().map(|(model, pricing)| (model.as_str(), pricing))
    }

    /// Exact id, then normalized id, then without a date suffix, then the
    /// longest table key that prefixes the id at a separator.
    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        if let Some(pricing) = self.models.get(model) {
            return Some(pricing);
        }

        let normalized = normalize_model_id(model);
        if let Some(pricing) = self.models.get(&normalized) {
            return Some(pricing);
        }

        let undated = strip_date_suffix(&normalized);
        if let Some(pricing) = self.models.get(undated) {
            return Some(pricing);
        }

        self.models
            .iter()
            .filter(|(key, _)| is_boundary_prefix(key, undated))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, pricing)| pricing)
    }

    pub fn calculate(&self, model: &str, usage: &TokenSnapshot) -> PricedUsage {
        let Some(pricing) = self.get(model) else {
            return PricedUsage {
                cost: 0.0,
                priced_tokens: 0,
                unpriced_tokens: usage.billable(),
            };
        };

        let parts = [
            (usage.input_tokens, pricing.input),
            (usage.output_tokens, pricing.output),
            (usage.cache_read_tokens, pricing.cache_read.or(pricing.input)),
            (usage.cache_write_tokens, pricing.cache_write.or(pricing.input)),
        ];

        let mut priced = PricedUsage::default();
        for (tokens, price) in parts {
            match price {
                Some(price) => {
                    priced.cost += tokens as f64 * price / TOKENS_PER_MILLION;
                    priced.priced_tokens = priced.priced_tokens.saturating_add(tokens);
                }
                None => priced.unpriced_tokens = priced.unpriced_tokens.saturating_add(tokens),
            }
        }
        priced
    }
}

/// Lowercase, trimmed, without a `provider/` prefix.
fn normalize_model_id(model: &str) -> String {
    let lowered = model.trim().to_lowercase();
    match lowered.rsplit_once('/') {
        Some((_, name)) => name.to_string(),
        None => lowered,
    }
}

/// Drops a trailing `-YYYYMMDD` or `-YYYY-MM-DD`.
fn strip_date_suffix(model: &str) -> &str {
    let bytes = model.as_bytes();
    let is_digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);
    let len = bytes.len();

    if len > 9 && bytes[len - 9] == b'-' && is_digits(len - 8..len) {
        return &model[..len - 9];
    }
    if len > 11
        && bytes[len - 11] == b'-'
        && bytes[len - 6] == b'-'
        && bytes[len - 3] == b'-'
        && is_digits(len - 10..len - 6)
        && is_digits(len - 5..len - 3)
        && is_digits(len - 2..len)
    {
        return &model[..len - 11];
    }
    model
}

fn is_boundary_prefix(key: &str, model: &str) -> bool {
    !key.is_empty()
        && model.starts_with(key)
        && model[key.len()..]
            .chars()
            .next()
            .map_or(true, |c| matches!(c, '-' | '.' | ':' | '@'))
}
