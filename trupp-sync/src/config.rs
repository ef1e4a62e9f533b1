use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use trupp_core::{Catalog, StatusCode};

use crate::store::DEFAULT_NAMESPACE;

/// Process configuration. Dispatch server settings are not part of it;
/// they live in the status store.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub car: CarConfig,
    /// Shown until a status is confirmed for the first time.
    #[serde(default = "default_status")]
    pub default_status: StatusCode,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory {
        #[serde(default = "default_namespace")]
        namespace: String,
    },
    Sqlite {
        path: PathBuf,
        /// Key prefix, e.g. `flutter` gives `flutter.lastStatus`.
        #[serde(default = "default_namespace")]
        namespace: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    /// Both surfaces run in this process.
    #[default]
    Local,
    /// The counterpart surface runs in another process.
    Tcp { addr: SocketAddr, role: TcpRole },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TcpRole {
    Listen,
    Connect,
}

#[derive(Debug, Deserialize)]
pub struct CarConfig {
    /// Hide statuses that are not relevant while driving.
    #[serde(default = "default_driving_only")]
    pub driving_only: bool,
}

impl CarConfig {
    pub fn catalog(&self) -> Catalog {
        if self.driving_only {
            Catalog::driving_only()
        } else {
            Catalog::all()
        }
    }
}

fn default_status() -> StatusCode {
    StatusCode::FALLBACK
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_owned()
}

fn default_driving_only() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            channel: ChannelConfig::default(),
            car: CarConfig::default(),
            default_status: default_status(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Sqlite {
            path: PathBuf::from("trupp.db"),
            namespace: default_namespace(),
        }
    }
}

impl Default for CarConfig {
    fn default() -> Self {
        Self {
            driving_only: default_driving_only(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let config: Config = toml::from_str(
            r#"
            default_status = 2

            [store]
            type = "sqlite"
            path = "/var/lib/trupp/trupp.db"

            [channel]
            type = "tcp"
            addr = "127.0.0.1:7410"
            role = "connect"

            [car]
            driving_only = false
            "#,
        )
        .unwrap();

        assert_eq!(config.default_status.get(), 2);
        assert!(matches!(
            config.store,
            StoreConfig::Sqlite { ref namespace, .. } if namespace == "flutter"
        ));
        assert!(matches!(
            config.channel,
            ChannelConfig::Tcp { role: TcpRole::Connect, .. }
        ));
        assert_eq!(config.car.catalog(), Catalog::all());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.default_status, StatusCode::FALLBACK);
        assert!(matches!(config.channel, ChannelConfig::Local));
        assert_eq!(config.car.catalog(), Catalog::driving_only());
    }

    #[test]
    fn rejects_out_of_range_default_status() {
        assert!(toml::from_str::<Config>("default_status = 12").is_err());
    }
}
