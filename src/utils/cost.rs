//! Token pricing for the status line.
//!
//! Queue records carry a single token count per task (prompt and completion
//! are not split), so pricing is a flat USD rate per million tokens per model.
//! Custom entries from the queue config take precedence over the built-in
//! table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Pricing for a single model, in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Cost per 1 000 000 tokens in USD.
    pub cost_per_million: f64,
}

/// Returns the built-in pricing table.
///
/// Prices reflect public list prices for the models the queue was first
/// tuned for.
pub fn default_pricing() -> HashMap<String, ModelPricing> {
    let mut m = HashMap::new();

    m.insert(
        "gpt-4".to_string(),
        ModelPricing {
            cost_per_million: 45.0,
        },
    );
    m.insert(
        "gpt-3.5-turbo".to_string(),
        ModelPricing {
            cost_per_million: 2.0,
        },
    );
    m.insert(
        "text-embedding-ada-002".to_string(),
        ModelPricing {
            cost_per_million: 0.4,
        },
    );

    m
}

/// Estimate the cost of `tokens` on `model` in USD.
///
/// Looks up `custom_pricing` first, then [`default_pricing`]. Returns `None`
/// if the model is unknown in both.
pub fn estimate_cost(
    model: &str,
    tokens: u64,
    custom_pricing: &HashMap<String, ModelPricing>,
) -> Option<f64> {
    let defaults = default_pricing();
    let pricing = custom_pricing.get(model).or_else(|| defaults.get(model));

    pricing.map(|p| (tokens as f64 / 1_000_000.0) * p.cost_per_million)
}
