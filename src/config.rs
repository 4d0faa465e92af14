//! Configuration for scanning, pricing, and payment.
//!
//! All behaviour is controlled through [`TaxShieldConfig`], built via its
//! [`TaxShieldConfigBuilder`]. Credentials live here too so one value can be
//! handed to every interaction; the `Debug` impl redacts them.

use crate::compute::TaxRules;
use crate::error::TaxShieldError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// 5 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Longest scan cooldown honoured (one day).
pub const MAX_SCAN_COOLDOWN_SECS: u64 = 24 * 60 * 60;

/// Configuration for a taxshield session.
///
/// # Example
/// ```rust
/// use taxshield::TaxShieldConfig;
///
/// let config = TaxShieldConfig::builder()
///     .scan_cooldown_secs(30)
///     .public_base_url("https://taxshield.example")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
/// ```
#[derive(Clone)]
pub struct TaxShieldConfig {
    /// Largest accepted upload in bytes. Default: 5 MiB.
    pub max_upload_bytes: usize,

    /// Minimum seconds between two accepted scans in one session. Default: 30.
    ///
    /// Every scan is a paid model call; the cooldown keeps a stuck upload
    /// button from burning through the API budget.
    pub scan_cooldown_secs: u64,

    /// Divisors, tip cap, and refund rate.
    pub rules: TaxRules,

    /// Base URL the payment provider redirects back to. Default: `http://localhost:8501`.
    ///
    /// The success URL carries the provider's `{CHECKOUT_SESSION_ID}`
    /// placeholder so the session id comes back on redirect.
    pub public_base_url: String,

    /// Price of unlocking one report, in the currency's minor unit. Default: 999.
    pub unlock_price_cents: u64,

    /// ISO currency code for the checkout. Default: `usd`.
    pub currency: String,

    /// LLM model identifier. If None, discovered (Gemini) or provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Google API key for Gemini: model discovery and the extraction call.
    pub google_api_key: Option<String>,

    /// Stripe secret key.
    pub stripe_api_key: Option<String>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction is transcription; any creativity is a wrong number.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 1024.
    pub max_tokens: usize,

    /// Per-request timeout for model and payment calls in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom extraction prompt. If None, uses the built-in auditor prompt.
    pub system_prompt: Option<String>,
}

impl Default for TaxShieldConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            scan_cooldown_secs: 30,
            rules: TaxRules::default(),
            public_base_url: "http://localhost:8501".to_string(),
            unlock_price_cents: 999,
            currency: "usd".to_string(),
            model: None,
            provider_name: None,
            provider: None,
            google_api_key: None,
            stripe_api_key: None,
            temperature: 0.0,
            max_tokens: 1024,
            api_timeout_secs: 60,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for TaxShieldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaxShieldConfig")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("scan_cooldown_secs", &self.scan_cooldown_secs)
            .field("rules", &self.rules)
            .field("public_base_url", &self.public_base_url)
            .field("unlock_price_cents", &self.unlock_price_cents)
            .field("currency", &self.currency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("google_api_key", &self.google_api_key.as_ref().map(|_| "<redacted>"))
            .field("stripe_api_key", &self.stripe_api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl TaxShieldConfig {
    /// Create a new builder for `TaxShieldConfig`.
    pub fn builder() -> TaxShieldConfigBuilder {
        TaxShieldConfigBuilder {
            config: Self::default(),
        }
    }

    /// Where the provider sends the buyer after paying.
    pub fn success_url(&self) -> String {
        format!(
            "{}/?session_id={{CHECKOUT_SESSION_ID}}",
            self.public_base_url.trim_end_matches('/')
        )
    }

    /// Minimum gap between scans, capped at [`MAX_SCAN_COOLDOWN_SECS`].
    pub fn scan_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.scan_cooldown_secs.min(MAX_SCAN_COOLDOWN_SECS) as i64)
    }

    /// Where the provider sends the buyer after backing out.
    pub fn cancel_url(&self) -> String {
        format!("{}/", self.public_base_url.trim_end_matches('/'))
    }
}

/// Builder for [`TaxShieldConfig`].
#[derive(Debug)]
pub struct TaxShieldConfigBuilder {
    config: TaxShieldConfig,
}

impl TaxShieldConfigBuilder {
    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn scan_cooldown_secs(mut self, secs: u64) -> Self {
        self.config.scan_cooldown_secs = secs.min(MAX_SCAN_COOLDOWN_SECS);
        self
    }

    pub fn rules(mut self, rules: TaxRules) -> Self {
        self.config.rules = rules;
        self
    }

    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.public_base_url = url.into();
        self
    }

    pub fn unlock_price_cents(mut self, cents: u64) -> Self {
        self.config.unlock_price_cents = cents;
        self
    }

    pub fn currency(mut self, code: impl Into<String>) -> Self {
        self.config.currency = code.into().to_lowercase();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn google_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.google_api_key = Some(key.into());
        self
    }

    pub fn stripe_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.stripe_api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n.max(64);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TaxShieldConfig, TaxShieldError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(TaxShieldError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        if c.unlock_price_cents == 0 {
            return Err(TaxShieldError::InvalidConfig(
                "Unlock price must be ≥ 1 cent".into(),
            ));
        }
        if !(c.public_base_url.starts_with("http://") || c.public_base_url.starts_with("https://"))
        {
            return Err(TaxShieldError::InvalidConfig(format!(
                "Public base URL must be http(s), got '{}'",
                c.public_base_url
            )));
        }
        c.rules.validate().map_err(TaxShieldError::InvalidConfig)?;
        Ok(self.config)
    }
}
