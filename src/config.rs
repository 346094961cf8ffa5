use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Payment gateway configuration for redirect signing and callback verification.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct GatewayConfig {
    /// Merchant code issued by the gateway
    #[serde(default = "default_merchant_code")]
    pub merchant_code: String,

    /// Shared HMAC-SHA512 secret for signing and verifying payloads
    #[validate(length(min = 8, message = "Gateway secret must be at least 8 characters"))]
    #[serde(default = "default_gateway_secret")]
    pub secret_key: String,

    /// Gateway hosted-payment page URL
    #[serde(default = "default_payment_url")]
    pub payment_url: String,

    /// URL the gateway redirects the customer back to
    #[serde(default = "default_return_url")]
    pub return_url: String,

    /// Gateway API version string
    #[serde(default = "default_gateway_version")]
    pub version: String,

    /// ISO currency code sent with redirect payloads
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Locale for the hosted payment page
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Minutes until an initiated payment redirect expires
    #[serde(default = "default_expire_minutes")]
    pub expire_minutes: i64,
}

fn default_merchant_code() -> String {
    "COURIER01".to_string()
}
fn default_gateway_secret() -> String {
    "development_gateway_secret".to_string()
}
fn default_payment_url() -> String {
    "https://sandbox.gateway.example/paymentv2/vpcpay.html".to_string()
}
fn default_return_url() -> String {
    "http://localhost:8080/payments/return".to_string()
}
fn default_gateway_version() -> String {
    "2.1.0".to_string()
}
fn default_currency() -> String {
    "VND".to_string()
}
fn default_locale() -> String {
    "vn".to_string()
}
fn default_expire_minutes() -> i64 {
    15
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            merchant_code: default_merchant_code(),
            secret_key: default_gateway_secret(),
            payment_url: default_payment_url(),
            return_url: default_return_url(),
            version: default_gateway_version(),
            currency: default_currency(),
            locale: default_locale(),
            expire_minutes: default_expire_minutes(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Runtime environment name (development, test, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level for the env-filter default directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Run embedded migrations on startup
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    /// Database pool sizing
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Request timeout applied by the HTTP timeout layer, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Payment gateway settings
    #[serde(default)]
    #[validate]
    pub gateway: GatewayConfig,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_true() -> bool {
    true
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            request_timeout_secs: default_request_timeout_secs(),
            gateway: GatewayConfig::default(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Loads layered configuration: config/default.toml, config/<env>.toml,
/// then APP__* environment overrides (e.g. APP__GATEWAY__SECRET_KEY).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg: AppConfig = Config::builder()
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    Ok(cfg)
}

/// Initializes the global tracing subscriber with env-filter support.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("courier_api={level},tower_http=debug");
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(format!("courier_api={level}")));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
