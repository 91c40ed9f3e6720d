use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_SITE_URL: &str = "http://localhost:8080";
const DEFAULT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Public origin of the storefront; payment return URLs are built from it
    #[serde(default = "default_site_url")]
    #[validate(custom = "validate_site_url")]
    pub site_url: String,

    /// ISO 4217 currency code, lowercase
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency")]
    pub currency: String,

    /// Stripe secret key; payment endpoints answer 503 without it
    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    /// Stripe publishable key handed to the embedded payment form
    #[serde(default)]
    pub stripe_publishable_key: Option<String>,

    /// Stripe REST base URL (overridable for tests and proxies)
    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    /// Bot-mitigation challenge site key
    #[serde(default)]
    pub turnstile_site_key: Option<String>,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Upper bound for any single inbound request (seconds)
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub request_timeout_secs: u64,

    /// Quiet period before a payment intent is created or updated (milliseconds)
    #[serde(default = "default_debounce_ms")]
    #[validate(range(min = 50, max = 10000))]
    pub checkout_debounce_ms: u64,

    /// Fallback sales tax rate for states without a table entry (e.g. 0.05)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub default_tax_rate: f64,
}

impl AppConfig {
    /// Creates a new AppConfig with defaults for everything but the listener and environment
    pub fn new(host: String, port: u16, environment: String) -> Self {
        Self {
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            site_url: default_site_url(),
            currency: default_currency(),
            stripe_secret_key: None,
            stripe_publishable_key: None,
            stripe_api_base: default_stripe_api_base(),
            turnstile_site_key: None,
            cors_allowed_origins: None,
            request_timeout_secs: default_request_timeout_secs(),
            checkout_debounce_ms: default_debounce_ms(),
            default_tax_rate: default_tax_rate(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn checkout_debounce(&self) -> Duration {
        Duration::from_millis(self.checkout_debounce_ms)
    }

    /// Parsed CORS origins, empty when unset
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// A configured key that is not blank
    fn non_blank(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn stripe_secret_key(&self) -> Option<&str> {
        Self::non_blank(&self.stripe_secret_key)
    }

    pub fn stripe_publishable_key(&self) -> Option<&str> {
        Self::non_blank(&self.stripe_publishable_key)
    }

    pub fn turnstile_site_key(&self) -> Option<&str> {
        Self::non_blank(&self.turnstile_site_key)
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_site_url() -> String {
    DEFAULT_SITE_URL.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_tax_rate() -> f64 {
    0.05
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_currency(currency: &str) -> Result<(), ValidationError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_lowercase()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("Currency must be 3 lowercase letters (ISO 4217)".into());
        Err(err)
    }
}

fn validate_site_url(site_url: &str) -> Result<(), ValidationError> {
    match url::Url::parse(site_url) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(()),
        _ => {
            let mut err = ValidationError::new("site_url");
            err.message = Some("site_url must be an absolute http(s) URL".into());
            Err(err)
        }
    }
}

fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if rate.is_finite() && (0.0..=0.25).contains(&rate) {
        Ok(())
    } else {
        let mut err = ValidationError::new("default_tax_rate");
        err.message = Some("Tax rate must be between 0.0 and 0.25".into());
        Err(err)
    }
}

/// Installs the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("drainline_checkout={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if app_config.stripe_secret_key().is_none() {
        warn!("APP__STRIPE_SECRET_KEY not set; payment endpoints will report unavailable");
    }
    if app_config.stripe_publishable_key().is_none() {
        warn!("APP__STRIPE_PUBLISHABLE_KEY not set; payment form will be disabled");
    }
    if app_config.turnstile_site_key().is_none() {
        warn!("APP__TURNSTILE_SITE_KEY not set; bot challenge will be disabled");
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}
