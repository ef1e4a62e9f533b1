//! Status propagation state machine.
//!
//! Pure and synchronous: it never touches the network, the store or the
//! channel. The controller feeds it user selections, report completions and
//! counterpart updates, and carries out what it decides.
//!
//! ```text
//!            select(c), config ok
//!   Idle ─────────────────────────▶ Pending
//!    ▲  select(c), config missing     │
//!    │  (indicator = failure)         │ complete(ticket)
//!    └────────────────────────────────┘ (indicator = success | failure)
//! ```
//!
//! Every accepted selection gets a [`Ticket`]. Successes are matched
//! against the last applied confirmation so a slow answer for an older
//! selection cannot overwrite a newer confirmed status. Failures only count
//! for the newest selection.

use jiff::Timestamp;
use trupp_core::{ConfigField, ConnectionConfig, ConnectionIndicator, CurrentStatus, StatusCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// A report is in flight for the latest selection.
    Pending,
}

/// Handle for one accepted selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket {
    seq: u64,
    code: StatusCode,
}

impl Ticket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }
}

/// Outcome of the last finished selection, shown as a banner until the
/// next user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub code: StatusCode,
    pub success: bool,
}

/// What a surface needs to draw itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub current: CurrentStatus,
    pub indicator: ConnectionIndicator,
    pub phase: Phase,
    /// Code of the selection in flight, if any.
    pub pending: Option<StatusCode>,
    pub confirmation: Option<Confirmation>,
}

/// How a completion was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The code became the current status.
    Confirmed(StatusCode),
    /// The report failed; the current status is unchanged.
    Failed,
    /// A newer confirmation or selection made this completion irrelevant.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct StatusMachine {
    current: CurrentStatus,
    indicator: ConnectionIndicator,
    confirmation: Option<Confirmation>,
    /// Latest selection still waiting for its report.
    pending: Option<Ticket>,
    /// Sequence number of the last issued ticket.
    issued: u64,
    /// Sequence number of the newest confirmation applied so far.
    applied: u64,
}

impl StatusMachine {
    pub fn new(current: CurrentStatus) -> Self {
        Self {
            current,
            indicator: ConnectionIndicator::Idle,
            confirmation: None,
            pending: None,
            issued: 0,
            applied: 0,
        }
    }

    pub fn current(&self) -> CurrentStatus {
        self.current
    }

    pub fn phase(&self) -> Phase {
        if self.pending.is_some() {
            Phase::Pending
        } else {
            Phase::Idle
        }
    }

    /// The user picked `code`. Returns the ticket to report it under, or the
    /// first unusable connection field.
    pub fn select(&mut self, code: StatusCode, config: &ConnectionConfig) -> Result<Ticket, ConfigField> {
        if let Some(field) = config.missing_field() {
            self.reject(code);
            return Err(field);
        }

        self.issued += 1;
        let ticket = Ticket {
            seq: self.issued,
            code,
        };
        self.pending = Some(ticket);
        self.indicator = ConnectionIndicator::Idle;
        self.confirmation = None;
        Ok(ticket)
    }

    /// A selection of `code` failed before a report could be issued.
    ///
    /// Nothing is in flight for it, so the current status stays and older
    /// in-flight reports keep their tickets.
    pub fn reject(&mut self, code: StatusCode) {
        self.indicator = ConnectionIndicator::Failure;
        self.confirmation = Some(Confirmation {
            code,
            success: false,
        });
    }

    /// The report for `ticket` finished.
    pub fn complete(&mut self, ticket: Ticket, success: bool, now: Timestamp) -> Completion {
        if self.pending == Some(ticket) {
            self.pending = None;
        }

        if !success {
            if ticket.seq != self.issued {
                return Completion::Superseded;
            }
            self.indicator = ConnectionIndicator::Failure;
            self.confirmation = Some(Confirmation {
                code: ticket.code,
                success: false,
            });
            return Completion::Failed;
        }

        if ticket.seq <= self.applied {
            return Completion::Superseded;
        }

        self.current = CurrentStatus::confirmed(ticket.code, now);
        self.applied = ticket.seq;
        self.indicator = ConnectionIndicator::Success;
        self.confirmation = Some(Confirmation {
            code: ticket.code,
            success: true,
        });
        Completion::Confirmed(ticket.code)
    }

    /// The counterpart confirmed `code` with its server.
    ///
    /// Reports still in flight keep their tickets: a later local success is
    /// what the server holds last and replaces this code again. The
    /// indicator belongs to local reports and is left alone.
    pub fn apply_remote(&mut self, code: StatusCode, now: Timestamp) -> CurrentStatus {
        self.current = CurrentStatus::confirmed(code, now);
        self.current
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            current: self.current,
            indicator: self.indicator,
            phase: self.phase(),
            pending: self.pending.map(|t| t.code),
            confirmation: self.confirmation,
        }
    }
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new(CurrentStatus::default())
    }
}
