use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Pigeon messaging server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "pigeon-server", version, about = "Pigeon messaging server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PIGEON_PORT", default_value = "8000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PIGEON_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./pigeon.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PIGEON_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (keys)
    #[arg(long, env = "PIGEON_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Interval in seconds between ephemeral-message sweep runs
    #[arg(
        long,
        env = "PIGEON_EPHEMERAL_SWEEP_INTERVAL_SECS",
        default_value = "3600"
    )]
    pub ephemeral_sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "0.0.0.0".to_string(),
            config: "./pigeon.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            ephemeral_sweep_interval_secs: 3600,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PIGEON_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PIGEON_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Pigeon Messaging Server Configuration
# Place this file at ./pigeon.toml or specify with --config <path>
# All settings can be overridden via environment variables (PIGEON_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8000)
# port = 8000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the JWT signing key
# data_dir = "./data"

# Interval in seconds between sweeps that physically remove expired
# ephemeral messages (default: 3600 = 1 hour). Expired messages are
# already hidden from reads; the sweep only reclaims storage.
# ephemeral_sweep_interval_secs = 3600
"#
    .to_string()
}
