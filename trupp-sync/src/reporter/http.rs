use async_trait::async_trait;
use tracing::{debug, instrument};
use trupp_core::{ConnectionConfig, StatusCode};

use super::{ReportError, StatusReporter, status_url};

/// Reports statuses with a plain `GET` against the dispatch server.
///
/// The transport's default timeouts apply; nothing is configured here.
#[derive(Clone, Default)]
pub struct HttpStatusReporter {
    http: reqwest::Client,
}

impl HttpStatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl StatusReporter for HttpStatusReporter {
    #[instrument(name = "report_status", skip(self, config), fields(%code))]
    async fn report(&self, code: StatusCode, config: &ConnectionConfig) -> Result<(), ReportError> {
        let url = status_url(code, config)?;
        debug!(host = url.host_str(), "Sending status to dispatch server");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        debug!(%status, "Dispatch server answered");

        if status.is_success() {
            Ok(())
        } else {
            Err(ReportError::ServerRejected(status))
        }
    }
}
