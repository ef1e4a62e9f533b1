pub mod memory;
pub mod sqlite;

use std::fmt;

use async_trait::async_trait;
use tracing::warn;
use trupp_core::{ConfigField, ConnectionConfig, CurrentStatus, StatusCode};

/// Key prefix used by the phone app's preference storage.
pub const DEFAULT_NAMESPACE: &str = "flutter";

/// Keys kept in the status store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Connection(ConfigField),
    LastStatus,
    LastStatusAt,
}

impl StoreKey {
    pub fn name(self) -> &'static str {
        match self {
            StoreKey::Connection(field) => field.key(),
            StoreKey::LastStatus => "lastStatus",
            StoreKey::LastStatusAt => "lastStatusAt",
        }
    }

    /// Full key as written to the backing storage, e.g. `flutter.issi`.
    pub fn qualified(self, namespace: &str) -> String {
        if namespace.is_empty() {
            self.name().to_owned()
        } else {
            format!("{namespace}.{}", self.name())
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreValue {
    Text(String),
    Int(i64),
}

impl StoreValue {
    pub fn into_text(self) -> Option<String> {
        match self {
            StoreValue::Text(s) => Some(s),
            StoreValue::Int(i) => Some(i.to_string()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            StoreValue::Int(i) => Some(*i),
            StoreValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Durable key/value storage for the last confirmed status and the
/// dispatch server connection settings.
///
/// Single-key writes are independent; there are no transactions.
#[async_trait]
pub trait StatusStore: Send + Sync + 'static {
    /// Error type specific to this storage implementation
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get(&self, key: StoreKey) -> Result<Option<StoreValue>, Self::Error>;

    async fn set(&self, key: StoreKey, value: StoreValue) -> Result<(), Self::Error>;

    /// Read all connection fields. Absent keys stay `None`.
    async fn load_connection_config(&self) -> Result<ConnectionConfig, Self::Error> {
        let mut config = ConnectionConfig::default();
        for field in ConfigField::ALL {
            let value = self.get(StoreKey::Connection(field)).await?;
            config.set_field(field, value.and_then(StoreValue::into_text));
        }
        Ok(config)
    }

    /// Write the fields that are set in `config`; absent fields are left
    /// untouched.
    async fn save_connection_config(&self, config: &ConnectionConfig) -> Result<(), Self::Error> {
        for field in ConfigField::ALL {
            if let Some(value) = config.field(field) {
                self.set(StoreKey::Connection(field), StoreValue::Text(value.to_owned()))
                    .await?;
            }
        }
        Ok(())
    }

    /// Last status confirmed on this device, if one was ever persisted.
    async fn load_last_status(&self) -> Result<Option<CurrentStatus>, Self::Error> {
        let Some(raw) = self.get(StoreKey::LastStatus).await? else {
            return Ok(None);
        };

        let code = match raw.as_int().map(StatusCode::new) {
            Some(Ok(code)) => code,
            _ => {
                warn!(value = ?raw, "Ignoring unreadable persisted status");
                return Ok(None);
            }
        };

        let confirmed_at = self
            .get(StoreKey::LastStatusAt)
            .await?
            .and_then(StoreValue::into_text)
            .and_then(|s| s.parse::<jiff::Timestamp>().ok());

        Ok(Some(CurrentStatus {
            code,
            last_confirmed_by_server: false,
            confirmed_at,
        }))
    }

    async fn save_last_status(&self, status: &CurrentStatus) -> Result<(), Self::Error> {
        self.set(StoreKey::LastStatus, StoreValue::Int(i64::from(status.code.get())))
            .await?;
        if let Some(at) = status.confirmed_at {
            self.set(StoreKey::LastStatusAt, StoreValue::Text(at.to_string()))
                .await?;
        }
        Ok(())
    }
}
