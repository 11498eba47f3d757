use crate::core::currency::Currency;
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramProviderConfig {
    #[serde(default = "default_telegram_url")]
    pub base_url: String,
    pub token: Option<String>,
}

fn default_telegram_url() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub coingecko: Option<CoinGeckoProviderConfig>,
    pub telegram: Option<TelegramProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            coingecko: Some(CoinGeckoProviderConfig {
                base_url: "https://api.coingecko.com/api/v3".to_string(),
            }),
            telegram: Some(TelegramProviderConfig {
                base_url: default_telegram_url(),
                token: None,
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_seconds: u64,
    pub send_timeout_seconds: u64,
    pub max_attempts: u32,
    pub retry_delay_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            tick_seconds: 60,
            send_timeout_seconds: 10,
            max_attempts: 3,
            retry_delay_seconds: 2,
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_seconds: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            interval_seconds: 300,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub currencies: Vec<Currency>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "cryptorate", "cryptorate")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "cryptorate", "cryptorate")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for currency in &self.currencies {
            if currency.name.trim().is_empty() || currency.symbol.trim().is_empty() {
                bail!("Currency {} must have a name and a symbol", currency.id);
            }
            if !ids.insert(currency.id) {
                bail!("Duplicate currency id: {}", currency.id);
            }
        }
        if self.scheduler.tick_seconds == 0 {
            bail!("scheduler.tick_seconds must be positive");
        }
        if self.scheduler.send_timeout_seconds == 0 {
            bail!("scheduler.send_timeout_seconds must be positive");
        }
        if self.scheduler.max_attempts == 0 {
            bail!("scheduler.max_attempts must be at least 1");
        }
        if self.poller.interval_seconds == 0 {
            bail!("poller.interval_seconds must be positive");
        }
        Ok(())
    }

    pub fn coingecko_url(&self) -> &str {
        self.providers
            .coingecko
            .as_ref()
            .map_or("https://api.coingecko.com/api/v3", |p| &p.base_url)
    }

    pub fn telegram_url(&self) -> &str {
        self.providers
            .telegram
            .as_ref()
            .map_or("https://api.telegram.org", |p| &p.base_url)
    }

    /// Bot token from the config file, falling back to the environment.
    pub fn telegram_token(&self) -> Result<String> {
        if let Some(token) = self
            .providers
            .telegram
            .as_ref()
            .and_then(|t| t.token.clone())
            .filter(|t| !t.is_empty())
        {
            return Ok(token);
        }
        std::env::var(TELEGRAM_TOKEN_ENV).with_context(|| {
            format!("Telegram token missing: set providers.telegram.token or {TELEGRAM_TOKEN_ENV}")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
currencies:
  - id: 1
    name: "bitcoin"
    display_name: "Bitcoin"
    symbol: "BTC"
  - id: 2
    name: "ethereum"
    display_name: "Ethereum"
    symbol: "ETH"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.currencies.len(), 2);
        assert_eq!(config.currencies[0].name, "bitcoin");
        assert_eq!(config.currencies[1].symbol, "ETH");
        assert!(config.validate().is_ok());

        // Defaults apply when sections are missing
        assert_eq!(config.scheduler.tick_seconds, 60);
        assert_eq!(config.scheduler.max_attempts, 3);
        assert_eq!(config.scheduler.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.poller.interval(), Duration::from_secs(300));
        assert_eq!(config.coingecko_url(), "https://api.coingecko.com/api/v3");
        assert_eq!(config.telegram_url(), "https://api.telegram.org");

        let yaml_str_with_providers = r#"
currencies: []
providers:
  coingecko:
    base_url: "http://example.com/coingecko"
  telegram:
    token: "123:abc"
scheduler:
  tick_seconds: 30
poller:
  interval_seconds: 120
data_path: "/tmp/cryptorate"
        "#;
        let config: AppConfig = serde_yaml::from_str(yaml_str_with_providers).unwrap();
        assert_eq!(config.coingecko_url(), "http://example.com/coingecko");
        assert_eq!(config.telegram_url(), "https://api.telegram.org");
        assert_eq!(config.telegram_token().unwrap(), "123:abc");
        assert_eq!(config.scheduler.tick_seconds, 30);
        assert_eq!(config.scheduler.send_timeout_seconds, 10);
        assert_eq!(config.poller.interval_seconds, 120);
        assert_eq!(
            config.default_data_path().unwrap(),
            PathBuf::from("/tmp/cryptorate")
        );
    }

    #[test]
    fn test_duplicate_currency_ids_rejected() {
        let yaml_str = r#"
currencies:
  - id: 1
    name: "bitcoin"
    display_name: "Bitcoin"
    symbol: "BTC"
  - id: 1
    name: "ethereum"
    display_name: "Ethereum"
    symbol: "ETH"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate currency id"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let yaml_str = r#"
currencies: []
scheduler:
  max_attempts: 0
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_send_timeout_rejected() {
        let yaml_str = r#"
currencies: []
scheduler:
  send_timeout_seconds: 0
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("send_timeout_seconds"));
    }
}
