//! Per-surface driver around [`StatusMachine`].
//!
//! One task owns the machine. Selections arrive as commands, report
//! results come back from spawned tasks over a channel, and counterpart
//! updates come from the event channel listener. All three are handled on
//! the same task, so the machine is never touched concurrently.

mod handle;

pub use handle::{ControllerError, Selection, SelectionOutcome, StatusHandle};

use std::sync::Arc;

use handle::Command;
use jiff::Timestamp;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use trupp_channel::{Delivery, EventChannel, Listener};
use trupp_core::{CurrentStatus, StatusCode, StatusMessage, Surface};

use crate::machine::{Completion, StatusMachine, StatusSnapshot, Ticket};
use crate::reporter::{ReportError, StatusReporter};
use crate::store::StatusStore;

/// Selections waiting for the controller task.
const COMMAND_BUFFER: usize = 16;

struct Finished {
    ticket: Ticket,
    result: Result<(), ReportError>,
    reply: oneshot::Sender<SelectionOutcome>,
}

pub struct StatusController<S, R, C> {
    surface: Surface,
    store: S,
    reporter: Arc<R>,
    channel: C,
    machine: StatusMachine,
    listener: Listener,
    commands: mpsc::Receiver<Command>,
    finished_tx: mpsc::UnboundedSender<Finished>,
    finished_rx: mpsc::UnboundedReceiver<Finished>,
    snapshot: watch::Sender<StatusSnapshot>,
    handle: StatusHandle,
}

impl<S, R, C> StatusController<S, R, C>
where
    S: StatusStore,
    R: StatusReporter,
    C: EventChannel,
{
    /// Restore the last persisted status (or `fallback`) and start
    /// listening for the counterpart.
    pub async fn new(
        surface: Surface,
        store: S,
        reporter: R,
        channel: C,
        fallback: StatusCode,
    ) -> Self {
        let current = match store.load_last_status().await {
            Ok(Some(status)) => {
                info!(%surface, code = %status.code, "Restored last status");
                status
            }
            Ok(None) => CurrentStatus::restored(fallback),
            Err(e) => {
                warn!(%surface, error = %e, "Could not read last status, using fallback");
                CurrentStatus::restored(fallback)
            }
        };

        let machine = StatusMachine::new(current);
        let listener = channel.register(surface.inbound());
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let (snapshot, snapshot_rx) = watch::channel(machine.snapshot());

        Self {
            surface,
            store,
            reporter: Arc::new(reporter),
            channel,
            machine,
            listener,
            commands,
            finished_tx,
            finished_rx,
            snapshot,
            handle: StatusHandle::new(surface, commands_tx, snapshot_rx),
        }
    }

    pub fn handle(&self) -> StatusHandle {
        self.handle.clone()
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    #[instrument(name = "status_controller", skip_all, fields(surface = %self.surface))]
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(code = %self.machine.current().code, "Status controller started");
        let mut listening = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Status controller shutting down");
                    break;
                }
                Some(Command::Select { code, reply }) = self.commands.recv() => {
                    self.on_select(code, reply).await;
                }
                Some(finished) = self.finished_rx.recv() => self.on_finished(finished).await,
                payload = self.listener.recv(), if listening => match payload {
                    Some(payload) => self.on_message(&payload).await,
                    None => {
                        warn!(channel = %self.surface.inbound(), "Listener was replaced, no longer receiving updates");
                        listening = false;
                    }
                },
            }
        }

        self.listener.unregister();
    }

    async fn on_select(&mut self, code: StatusCode, reply: oneshot::Sender<SelectionOutcome>) {
        // Settings may change while the app is in the background, so they
        // are read for every selection.
        let config = match self.store.load_connection_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!(%code, error = %e, "Could not read connection settings");
                self.machine.reject(code);
                self.publish();
                let _ = reply.send(SelectionOutcome::StoreUnavailable(e.to_string()));
                return;
            }
        };

        let ticket = match self.machine.select(code, &config) {
            Ok(ticket) => ticket,
            Err(field) => {
                info!(%code, missing = %field, "Connection settings incomplete, status not sent");
                self.publish();
                let _ = reply.send(SelectionOutcome::ConfigurationMissing(field));
                return;
            }
        };
        self.publish();
        debug!(%code, ticket = ticket.seq(), "Reporting status");

        let reporter = Arc::clone(&self.reporter);
        let finished = self.finished_tx.clone();
        tokio::spawn(async move {
            let result = reporter.report(ticket.code(), &config).await;
            let _ = finished.send(Finished {
                ticket,
                result,
                reply,
            });
        });
    }

    async fn on_finished(&mut self, finished: Finished) {
        let Finished {
            ticket,
            result,
            reply,
        } = finished;

        let completion = self
            .machine
            .complete(ticket, result.is_ok(), Timestamp::now());

        let outcome = match (completion, result) {
            (Completion::Confirmed(code), _) => {
                info!(%code, "Status confirmed by dispatch server");
                self.persist().await;
                self.notify_counterpart(code);
                SelectionOutcome::Confirmed(code)
            }
            (Completion::Failed, Err(e)) => {
                warn!(code = %ticket.code(), error = %e, "Status report failed");
                SelectionOutcome::Failed(e)
            }
            (Completion::Failed, Ok(())) | (Completion::Superseded, _) => {
                debug!(code = %ticket.code(), ticket = ticket.seq(), "Discarding stale report result");
                SelectionOutcome::Superseded
            }
        };

        self.publish();
        let _ = reply.send(outcome);
    }

    async fn on_message(&mut self, payload: &[u8]) {
        let message = match StatusMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Dropping invalid status message");
                return;
            }
        };

        let code = message.status;
        info!(%code, from = %self.surface.counterpart(), "Status received from counterpart");
        self.machine.apply_remote(code, Timestamp::now());
        // Local cache refresh only; the counterpart already persisted its
        // own copy and the message is not sent back.
        self.persist().await;
        self.publish();
    }

    async fn persist(&self) {
        let current = self.machine.current();
        if let Err(e) = self.store.save_last_status(&current).await {
            warn!(code = %current.code, error = %e, "Failed to persist status");
        }
    }

    fn notify_counterpart(&self, code: StatusCode) {
        let channel = self.surface.outbound();
        match self.channel.send(channel, StatusMessage::new(code).encode()) {
            Delivery::Sent => debug!(%channel, %code, "Counterpart notified"),
            Delivery::NoListener => debug!(%channel, %code, "Counterpart not listening"),
            Delivery::Dropped => warn!(%channel, %code, "Counterpart busy, notification dropped"),
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.machine.snapshot());
    }
}
