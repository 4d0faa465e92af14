//! Resolve the vision provider for the extraction call.

use crate::config::TaxShieldConfig;
use crate::discovery::discover_gemini_model;
use crate::error::TaxShieldError;
use edgequake_llm::{GeminiProvider, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Fallback model when discovery is not possible.
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model`; for
///    `gemini` without a model the model is discovered from the key.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Google key present**: Gemini with a discovered model.
///
/// Whenever Gemini is chosen, the configured key (`--google-api-key`) wins
/// over `GEMINI_API_KEY`.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub async fn resolve_provider(
    config: &TaxShieldConfig,
) -> Result<Arc<dyn LLMProvider>, TaxShieldError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = match (&config.model, name.as_str()) {
            (Some(m), _) => m.clone(),
            (None, "gemini") => gemini_model(config).await?,
            (None, _) => {
                return Err(TaxShieldError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: "Set --model for this provider.".into(),
                })
            }
        };
        return match name.as_str() {
            "gemini" => gemini_provider(config, &model),
            _ => create_vision_provider(name, &model),
        };
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if prov == "gemini" && !model.is_empty() {
            return gemini_provider(config, &model);
        }
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if google_key(config).is_some() {
        let model = match config.model {
            Some(ref m) => m.clone(),
            None => gemini_model(config).await?,
        };
        return gemini_provider(config, &model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TaxShieldError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or ANTHROPIC_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, TaxShieldError> {
    debug!("Creating provider {} with model {}", provider_name, model);
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TaxShieldError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Gemini bound to the resolved key, so the key used for model discovery is
/// also the one the extraction call authenticates with.
fn gemini_provider(
    config: &TaxShieldConfig,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, TaxShieldError> {
    match google_key(config) {
        Some(key) => {
            debug!("Creating provider gemini with model {}", model);
            Ok(Arc::new(GeminiProvider::new(key).with_model(model)))
        }
        None => create_vision_provider("gemini", model),
    }
}

async fn gemini_model(config: &TaxShieldConfig) -> Result<String, TaxShieldError> {
    match google_key(config) {
        Some(key) => discover_gemini_model(&key, config.api_timeout_secs).await,
        None => Ok(DEFAULT_GEMINI_MODEL.to_string()),
    }
}

fn google_key(config: &TaxShieldConfig) -> Option<String> {
    config
        .google_api_key
        .clone()
        .or_else(|| std::env::var("GEMINI_API_KEY").ok())
        .filter(|k| !k.is_empty())
}
