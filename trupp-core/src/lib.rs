use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod message;

pub use catalog::{Catalog, CatalogFilter, STATUS_TABLE, StatusDefinition, TileColor};
pub use message::{MessageError, StatusMessage};

/// Operator duty status as shown on the tiles (0–9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct StatusCode(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("status code {0} is outside 0..={max}", max = StatusCode::MAX)]
pub struct InvalidStatusCode(pub i64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseStatusCodeError {
    #[error("{0:?} is not a status code")]
    NotANumber(String),
    #[error(transparent)]
    OutOfRange(#[from] InvalidStatusCode),
}

impl StatusCode {
    /// Highest code the status table knows about.
    pub const MAX: u8 = 9;

    /// Shown when nothing was ever confirmed on this device.
    pub const FALLBACK: StatusCode = StatusCode(1);

    pub fn new(raw: i64) -> Result<Self, InvalidStatusCode> {
        match u8::try_from(raw) {
            Ok(code) if code <= Self::MAX => Ok(Self(code)),
            _ => Err(InvalidStatusCode(raw)),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// All valid codes in ascending numeric order.
    pub fn all() -> impl Iterator<Item = StatusCode> {
        (0..=Self::MAX).map(StatusCode)
    }

    /// Static definition (label, colour, icon) of this code.
    pub fn definition(self) -> &'static StatusDefinition {
        catalog::definition(self)
    }
}

impl TryFrom<i64> for StatusCode {
    type Error = InvalidStatusCode;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<StatusCode> for u8 {
    fn from(code: StatusCode) -> Self {
        code.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StatusCode {
    type Err = ParseStatusCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .trim()
            .parse::<i64>()
            .map_err(|_| ParseStatusCodeError::NotANumber(s.to_owned()))?;
        Ok(Self::new(raw)?)
    }
}

/// The two UI surfaces that can set the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    /// Head-unit UI (Android Automotive / CarPlay).
    Car,
    /// Phone app UI.
    Mobile,
}

impl Surface {
    pub fn counterpart(self) -> Surface {
        match self {
            Surface::Car => Surface::Mobile,
            Surface::Mobile => Surface::Car,
        }
    }

    /// Channel this surface announces confirmed statuses on.
    pub fn outbound(self) -> ChannelName {
        match self {
            Surface::Mobile => ChannelName::StatusUpdate,
            Surface::Car => ChannelName::StatusChanged,
        }
    }

    /// Channel this surface listens on.
    pub fn inbound(self) -> ChannelName {
        self.counterpart().outbound()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Surface::Car => "car",
            Surface::Mobile => "mobile",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Surface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "car" => Ok(Surface::Car),
            "mobile" | "phone" => Ok(Surface::Mobile),
            other => Err(format!("unknown surface '{other}'")),
        }
    }
}

/// Logical channel names, one per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelName {
    /// Mobile -> car: "apply this status" command.
    StatusUpdate,
    /// Car -> mobile: "status changed" notification.
    StatusChanged,
}

/// Whether a message is a command or a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Command,
    Notification,
}

impl ChannelName {
    pub const ALL: [ChannelName; 2] = [ChannelName::StatusUpdate, ChannelName::StatusChanged];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelName::StatusUpdate => "trupp.status.update",
            ChannelName::StatusChanged => "trupp.status.changed",
        }
    }

    pub fn kind(self) -> MessageKind {
        match self {
            ChannelName::StatusUpdate => MessageKind::Command,
            ChannelName::StatusChanged => MessageKind::Notification,
        }
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of the dispatch server connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    Protocol,
    Server,
    Token,
    Issi,
}

impl ConfigField {
    pub const ALL: [ConfigField; 4] = [
        ConfigField::Protocol,
        ConfigField::Server,
        ConfigField::Token,
        ConfigField::Issi,
    ];

    /// Storage key without namespace.
    pub fn key(self) -> &'static str {
        match self {
            ConfigField::Protocol => "protocol",
            ConfigField::Server => "server",
            ConfigField::Token => "token",
            ConfigField::Issi => "issi",
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Dispatch server connection settings as read from the status store.
///
/// Every field may be absent; an absent or blank field makes the whole
/// config unusable.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// `http` or `https`.
    pub protocol: Option<String>,
    /// `host` or `host:port`.
    pub server: Option<String>,
    pub token: Option<String>,
    /// Device / unit identifier reported to the server.
    pub issi: Option<String>,
}

impl ConnectionConfig {
    pub fn field(&self, field: ConfigField) -> Option<&str> {
        let value = match field {
            ConfigField::Protocol => &self.protocol,
            ConfigField::Server => &self.server,
            ConfigField::Token => &self.token,
            ConfigField::Issi => &self.issi,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn set_field(&mut self, field: ConfigField, value: Option<String>) {
        let slot = match field {
            ConfigField::Protocol => &mut self.protocol,
            ConfigField::Server => &mut self.server,
            ConfigField::Token => &mut self.token,
            ConfigField::Issi => &mut self.issi,
        };
        *slot = value;
    }

    /// First field that is absent or blank, if any.
    pub fn missing_field(&self) -> Option<ConfigField> {
        ConfigField::ALL
            .into_iter()
            .find(|f| self.field(*f).is_none())
    }

    pub fn is_complete(&self) -> bool {
        self.missing_field().is_none()
    }
}

// The token is a credential and must not end up in logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("protocol", &self.protocol)
            .field("server", &self.server)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("issi", &self.issi)
            .finish()
    }
}

/// The status this process currently believes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentStatus {
    pub code: StatusCode,
    /// True once the dispatch server (or the counterpart, after its server
    /// accepted it) confirmed `code`.
    pub last_confirmed_by_server: bool,
    /// When the last confirmation was applied.
    pub confirmed_at: Option<jiff::Timestamp>,
}

impl CurrentStatus {
    /// Status restored from storage; not confirmed in this session.
    pub fn restored(code: StatusCode) -> Self {
        Self {
            code,
            last_confirmed_by_server: false,
            confirmed_at: None,
        }
    }

    pub fn confirmed(code: StatusCode, at: jiff::Timestamp) -> Self {
        Self {
            code,
            last_confirmed_by_server: true,
            confirmed_at: Some(at),
        }
    }
}

impl Default for CurrentStatus {
    fn default() -> Self {
        Self::restored(StatusCode::FALLBACK)
    }
}

/// Outcome glyph of the most recent report attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionIndicator {
    #[default]
    Idle,
    Success,
    Failure,
}

impl ConnectionIndicator {
    pub fn glyph(self) -> char {
        match self {
            ConnectionIndicator::Idle => '○',
            ConnectionIndicator::Success => '●',
            ConnectionIndicator::Failure => '✗',
        }
    }
}
