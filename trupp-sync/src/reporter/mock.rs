use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Notify, oneshot};
use trupp_core::{ConnectionConfig, StatusCode};

use super::{ReportError, StatusReporter};

/// Scripted result for [`MockReporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    Accept,
    /// Answer with the given non-2xx HTTP status.
    Reject(u16),
}

impl MockOutcome {
    fn into_result(self) -> Result<(), ReportError> {
        match self {
            MockOutcome::Accept => Ok(()),
            MockOutcome::Reject(code) => Err(ReportError::ServerRejected(
                reqwest::StatusCode::from_u16(code)
                    .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            )),
        }
    }
}

/// In-process stand-in for the dispatch server.
///
/// By default every call resolves immediately with the configured outcome.
/// In held mode each call waits until the test releases it, which makes
/// completion order controllable.
#[derive(Clone)]
pub struct MockReporter {
    inner: Arc<Mutex<MockState>>,
    called: Arc<Notify>,
}

struct MockState {
    outcome: MockOutcome,
    hold: bool,
    calls: Vec<StatusCode>,
    held: Vec<Option<oneshot::Sender<MockOutcome>>>,
}

impl MockReporter {
    pub fn accepting() -> Self {
        Self::with_outcome(MockOutcome::Accept)
    }

    pub fn rejecting(http_status: u16) -> Self {
        Self::with_outcome(MockOutcome::Reject(http_status))
    }

    /// Calls block until [`MockReporter::release`] is called for them.
    pub fn held() -> Self {
        let reporter = Self::accepting();
        reporter.state().hold = true;
        reporter
    }

    fn with_outcome(outcome: MockOutcome) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                outcome,
                hold: false,
                calls: Vec::new(),
                held: Vec::new(),
            })),
            called: Arc::new(Notify::new()),
        }
    }

    /// A test that panicked mid-call leaves the bookkeeping intact, so a
    /// poisoned lock is simply taken over.
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_outcome(&self, outcome: MockOutcome) {
        self.state().outcome = outcome;
    }

    /// Codes reported so far, in call order.
    pub fn calls(&self) -> Vec<StatusCode> {
        self.state().calls.clone()
    }

    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let notified = self.called.notified();
            if self.calls().len() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Let held call number `index` (0-based) finish with `outcome`.
    /// Returns false if there is no such call waiting.
    pub fn release(&self, index: usize, outcome: MockOutcome) -> bool {
        let sender = self.state().held.get_mut(index).and_then(Option::take);
        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl StatusReporter for MockReporter {
    async fn report(&self, code: StatusCode, _config: &ConnectionConfig) -> Result<(), ReportError> {
        let waiter = {
            let mut state = self.state();
            state.calls.push(code);
            if state.hold {
                let (tx, rx) = oneshot::channel();
                state.held.push(Some(tx));
                Err(rx)
            } else {
                state.held.push(None);
                Ok(state.outcome)
            }
        };
        self.called.notify_waiters();

        match waiter {
            Ok(outcome) => outcome.into_result(),
            Err(rx) => rx
                .await
                .unwrap_or(MockOutcome::Reject(503))
                .into_result(),
        }
    }
}
