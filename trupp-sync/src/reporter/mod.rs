pub mod http;
pub mod mock;

use async_trait::async_trait;
use reqwest::Url;
use trupp_core::{ConfigField, ConnectionConfig, StatusCode};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("connection setting '{0}' is not configured")]
    ConfigurationMissing(ConfigField),
    #[error("invalid dispatch endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("network failure: {0}")]
    NetworkFailure(#[from] reqwest::Error),
    #[error("dispatch server rejected the status with HTTP {0}")]
    ServerRejected(reqwest::StatusCode),
}

/// Reports a status to the dispatch server.
///
/// One request per call, no retries. Implementations must not hold the
/// caller up beyond the request itself.
#[async_trait]
pub trait StatusReporter: Send + Sync + 'static {
    async fn report(&self, code: StatusCode, config: &ConnectionConfig) -> Result<(), ReportError>;
}

fn required(config: &ConnectionConfig, field: ConfigField) -> Result<&str, ReportError> {
    config
        .field(field)
        .ok_or(ReportError::ConfigurationMissing(field))
}

/// Build `{protocol}://{server}/{token}/setstatus?issi={issi}&status={code}`.
///
/// `server` may carry a port. The token and issi are percent-encoded.
pub fn status_url(code: StatusCode, config: &ConnectionConfig) -> Result<Url, ReportError> {
    if let Some(field) = config.missing_field() {
        return Err(ReportError::ConfigurationMissing(field));
    }
    let protocol = required(config, ConfigField::Protocol)?.to_ascii_lowercase();
    let server = required(config, ConfigField::Server)?;
    let token = required(config, ConfigField::Token)?;
    let issi = required(config, ConfigField::Issi)?;

    if protocol != "http" && protocol != "https" {
        return Err(ReportError::InvalidEndpoint(format!(
            "unsupported protocol '{protocol}'"
        )));
    }

    let mut url = Url::parse(&format!("{protocol}://{server}/"))
        .map_err(|e| ReportError::InvalidEndpoint(format!("server '{server}': {e}")))?;

    if url.host_str().is_none() || url.path() != "/" || url.query().is_some() {
        return Err(ReportError::InvalidEndpoint(format!(
            "server '{server}' must be a host with an optional port"
        )));
    }

    url.path_segments_mut()
        .map_err(|_| ReportError::InvalidEndpoint(format!("server '{server}' cannot be a base")))?
        .clear()
        .push(token)
        .push("setstatus");
    url.query_pairs_mut()
        .append_pair("issi", issi)
        .append_pair("status", &code.to_string());

    Ok(url)
}
