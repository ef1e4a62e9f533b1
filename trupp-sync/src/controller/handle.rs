use tokio::sync::{mpsc, oneshot, watch};
use trupp_core::{ConfigField, StatusCode, Surface};

use crate::machine::StatusSnapshot;
use crate::reporter::ReportError;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("status controller has stopped")]
    Stopped,
    #[error("status {0} is not offered on the {1} surface")]
    NotOnSurface(StatusCode, Surface),
}

/// How a selection ended.
#[derive(Debug)]
pub enum SelectionOutcome {
    /// The server accepted the code and it is now the current status.
    Confirmed(StatusCode),
    /// A connection setting is absent; the network was not contacted.
    ConfigurationMissing(ConfigField),
    /// The connection settings could not be read.
    StoreUnavailable(String),
    /// The report failed; the current status is unchanged.
    Failed(ReportError),
    /// A newer confirmation arrived first; this result was discarded.
    Superseded,
}

impl SelectionOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, SelectionOutcome::Confirmed(_))
    }
}

pub(crate) enum Command {
    Select {
        code: StatusCode,
        reply: oneshot::Sender<SelectionOutcome>,
    },
}

/// A selection the controller accepted. Dropping it does not cancel
/// anything.
#[derive(Debug)]
pub struct Selection {
    code: StatusCode,
    reply: oneshot::Receiver<SelectionOutcome>,
}

impl Selection {
    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// Wait for the report to finish.
    pub async fn outcome(self) -> Result<SelectionOutcome, ControllerError> {
        self.reply.await.map_err(|_| ControllerError::Stopped)
    }
}

/// Cheap, cloneable access to one surface's controller.
#[derive(Clone)]
pub struct StatusHandle {
    surface: Surface,
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<StatusSnapshot>,
}

impl StatusHandle {
    pub(crate) fn new(
        surface: Surface,
        commands: mpsc::Sender<Command>,
        snapshot: watch::Receiver<StatusSnapshot>,
    ) -> Self {
        Self {
            surface,
            commands,
            snapshot,
        }
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    /// Ask the controller to report `code`. Returns as soon as the
    /// controller has the request; the report runs in the background.
    pub async fn select(&self, code: StatusCode) -> Result<Selection, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Select { code, reply })
            .await
            .map_err(|_| ControllerError::Stopped)?;
        Ok(Selection { code, reply: rx })
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        *self.snapshot.borrow()
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until a published snapshot satisfies `f`.
    pub async fn wait_until(
        &self,
        mut f: impl FnMut(&StatusSnapshot) -> bool,
    ) -> Result<StatusSnapshot, ControllerError> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| f(s))
            .await
            .map_err(|_| ControllerError::Stopped)?;
        Ok(*snapshot)
    }
}
