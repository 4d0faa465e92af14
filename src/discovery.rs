//! Gemini model discovery.
//!
//! Model names on the Gemini API come and go faster than a release cycle.
//! When no model is configured we list what the key can call and pick the
//! best flash model that supports `generateContent`.

use crate::error::TaxShieldError;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const GEMINI_MODELS_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// One entry of the ListModels response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Fully qualified name, e.g. `models/gemini-1.5-flash-latest`.
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// Fetch the model list for `api_key` and choose one.
pub async fn discover_gemini_model(api_key: &str, timeout_secs: u64) -> Result<String, TaxShieldError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TaxShieldError::ModelDiscoveryFailed(e.to_string()))?;

    let response = client
        .get(GEMINI_MODELS_URL)
        .query(&[("key", api_key)])
        .send()
        .await
        .map_err(|e| TaxShieldError::ModelDiscoveryFailed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TaxShieldError::ModelDiscoveryFailed(format!(
            "ListModels failed: HTTP {status}: {body}"
        )));
    }

    let list: ListModelsResponse = response
        .json()
        .await
        .map_err(|e| TaxShieldError::ModelDiscoveryFailed(e.to_string()))?;
    debug!("ListModels returned {} models", list.models.len());

    let model = choose_model(&list.models)
        .ok_or_else(|| TaxShieldError::ModelDiscoveryFailed("No valid models found.".into()))?;
    info!("Discovered Gemini model: {}", model);
    Ok(model)
}

/// Pick a model from a ListModels response.
///
/// Preference order among models that support `generateContent`:
/// a `gemini-1.5-flash` "latest" alias, then any `gemini-1.5-flash`, then
/// the first listed. The `models/` prefix is stripped.
pub fn choose_model(models: &[ModelInfo]) -> Option<String> {
    let valid: Vec<&str> = models
        .iter()
        .filter(|m| {
            m.supported_generation_methods
                .iter()
                .any(|g| g == "generateContent")
        })
        .map(|m| m.name.as_str())
        .collect();

    let chosen = valid
        .iter()
        .copied()
        .find(|n| n.contains("gemini-1.5-flash") && n.contains("latest"))
        .or_else(|| valid.iter().copied().find(|n| n.contains("gemini-1.5-flash")))
        .or_else(|| valid.first().copied())?;

    Some(chosen.strip_prefix("models/").unwrap_or(chosen).to_string())
}
