use serde::Deserialize;
use tokio::fs;

const CONFIG_FILE: &str = "meshboard.toml";

const DEFAULT_CONFIG: &str = r#"[server]
host = "0.0.0.0"
port = 3001

[headscale]
# Base URL of the control server; the API key can also be supplied via
# the HEADSCALE_API_KEY environment variable.
url = "http://127.0.0.1:8080"
api_key = ""

[prometheus]
# Optional. Leave unset to run without metrics.
# url = "http://prometheus:9090"

[admin]
username = "admin"
# bcrypt hash of the admin password. Generate one with e.g.
#   htpasswd -bnBC 10 "" yourpassword | tr -d ':\n'
# Can also be supplied via MESHBOARD_PASSWORD_HASH.
password_hash = ""

[updates]
stats_interval_secs = 30
activity_interval_secs = 60
# Emits fake activity entries for demos on an otherwise idle network.
# Never enable this where the feed could be mistaken for real telemetry.
demo_activity = false
"#;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub headscale: HeadscaleConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub updates: UpdatesConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct HeadscaleConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct PrometheusConfig {
    pub url: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AdminConfig {
    #[serde(default = "default_admin_username")]
    pub username: String,
    #[serde(default)]
    pub password_hash: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            password_hash: String::new(),
        }
    }
}

fn default_admin_username() -> String {
    "admin".to_string()
}

#[derive(Deserialize, Clone, Debug)]
pub struct UpdatesConfig {
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    #[serde(default = "default_activity_interval")]
    pub activity_interval_secs: u64,
    #[serde(default)]
    pub demo_activity: bool,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval(),
            activity_interval_secs: default_activity_interval(),
            demo_activity: false,
        }
    }
}

fn default_stats_interval() -> u64 {
    30
}

fn default_activity_interval() -> u64 {
    60
}

/// Loads `meshboard.toml` from the working directory, writing a commented
/// default file first if none exists. Secrets can be overridden from the
/// environment so they never have to live on disk.
pub async fn load() -> anyhow::Result<Config> {
    let config_str = match fs::read_to_string(CONFIG_FILE).await {
        Ok(s) => s,
        Err(_) => {
            eprintln!("Configuration file '{CONFIG_FILE}' not found. Creating default.");
            fs::write(CONFIG_FILE, DEFAULT_CONFIG).await?;
            DEFAULT_CONFIG.to_string()
        }
    };

    let mut config: Config = toml::from_str(&config_str)?;

    if let Ok(key) = std::env::var("HEADSCALE_API_KEY") {
        config.headscale.api_key = key;
    }
    if let Ok(hash) = std::env::var("MESHBOARD_PASSWORD_HASH") {
        config.admin.password_hash = hash;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.admin.username, "admin");
        assert!(config.prometheus.url.is_none());
        assert_eq!(config.updates.stats_interval_secs, 30);
        assert!(!config.updates.demo_activity);
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let raw = r#"
[server]
host = "127.0.0.1"
port = 8000

[headscale]
url = "https://hs.example.org"
api_key = "k"
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.updates.activity_interval_secs, 60);
        assert_eq!(config.admin.username, "admin");
        assert!(config.admin.password_hash.is_empty());
    }
}
