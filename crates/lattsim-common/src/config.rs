//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for
//! deployment. Config precedence: env vars > .env file > config.toml > defaults.

use serde::Deserialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// Falls back to built-in defaults when [`init`] has not run — library
/// consumers (and tests) get a working configuration without touching the
/// process environment.
pub fn get() -> &'static AppConfig {
    CONFIG.get_or_init(AppConfig::default)
}

/// Initialize the global configuration from the environment.
///
/// Should be called once at server startup, before any other code accesses
/// config.
pub fn init() -> Result<&'static AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("device.name", "Lattsim")?
        .set_default("device.firmware", "0.15.0")?
        .set_default("pairing.window_ms", 60_000)?
        .set_default("ui.request_timeout_ms", 300_000)?
        .set_default("ui.heartbeat_interval_secs", 30)?
        .set_default("signing.timeout_ms", 300_000)?
        .set_default("limits.max_addresses", 10)?
        .set_default("limits.kv_entry_max_bytes", 63)?
        // Optional config file
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (LATTSIM_SERVER__PORT, LATTSIM_DEVICE__NAME, etc.)
        .add_source(
            config::Environment::with_prefix("LATTSIM")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    Ok(CONFIG.get_or_init(|| app_config))
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub device: DeviceConfig,
    pub pairing: PairingConfig,
    pub ui: UiConfig,
    pub signing: SigningConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    /// Display name given to newly created simulated devices.
    pub name: String,
    /// Firmware version reported on CONNECT, `major.minor.patch`.
    pub firmware: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PairingConfig {
    /// How long a pairing window stays open before it times out.
    pub window_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    /// Deadline for a correlated UI round-trip before `userTimeout`.
    pub request_timeout_ms: u64,
    /// Heartbeat cadence on an open UI channel.
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SigningConfig {
    /// Default deadline for a pending signing request.
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Maximum address count a single getAddresses request may ask for.
    pub max_addresses: u8,
    /// Maximum byte length of a key/value store key or value.
    pub kv_entry_max_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
            device: DeviceConfig {
                name: "Lattsim".into(),
                firmware: "0.15.0".into(),
            },
            pairing: PairingConfig { window_ms: 60_000 },
            ui: UiConfig {
                request_timeout_ms: 300_000,
                heartbeat_interval_secs: 30,
            },
            signing: SigningConfig {
                timeout_ms: 300_000,
            },
            limits: LimitsConfig {
                max_addresses: 10,
                kv_entry_max_bytes: 63,
            },
        }
    }
}
