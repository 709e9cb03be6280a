use event_store::Version;
use messaging::Message;
use serde::Serialize;
use serde_json::Value;

/// A subscriber or process manager that failed on an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryFailure {
    pub recipient: String,
    pub event_name: String,
    pub reason: String,
}

/// A follow-up command that failed or was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowUpFailure {
    pub command_name: String,
    pub code: String,
    pub reason: String,
}

/// What happened after events were appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub subscriber_failures: Vec<DeliveryFailure>,
    pub follow_up_failures: Vec<FollowUpFailure>,
    pub follow_ups_dispatched: usize,
}

impl BroadcastReport {
    /// True when every recipient and follow-up succeeded.
    pub fn is_clean(&self) -> bool {
        self.subscriber_failures.is_empty() && self.follow_up_failures.is_empty()
    }

    pub(crate) fn merge(&mut self, other: BroadcastReport) {
        self.subscriber_failures.extend(other.subscriber_failures);
        self.follow_up_failures.extend(other.follow_up_failures);
        self.follow_ups_dispatched += other.follow_ups_dispatched;
    }
}

/// Result of a handled command.
#[derive(Debug, Clone)]
pub struct CommandOutcome<S> {
    pub aggregate_type: String,
    pub aggregate_id: String,
    /// Stream version after the append; unchanged for no-op commands.
    pub version: Version,
    /// Recorded events in append order, with engine metadata.
    pub events: Vec<Message>,
    /// Aggregate state after the events were applied.
    pub state: Option<S>,
    pub report: BroadcastReport,
}

impl<S> CommandOutcome<S> {
    /// True when the handler produced no events.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.events.iter().map(Message::name).collect()
    }
}

/// Result of [`Engine::dispatch`](crate::Engine::dispatch), by message type.
#[derive(Debug, Clone)]
pub enum DispatchOutcome<S> {
    Accepted(CommandOutcome<S>),
    Published(BroadcastReport),
    QueryResult(Value),
}

impl<S> DispatchOutcome<S> {
    pub fn into_command(self) -> Option<CommandOutcome<S>> {
        match self {
            DispatchOutcome::Accepted(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn into_query_result(self) -> Option<Value> {
        match self {
            DispatchOutcome::QueryResult(value) => Some(value),
            _ => None,
        }
    }

    /// The broadcast report of a command or published event.
    pub fn report(&self) -> Option<&BroadcastReport> {
        match self {
            DispatchOutcome::Accepted(outcome) => Some(&outcome.report),
            DispatchOutcome::Published(report) => Some(report),
            DispatchOutcome::QueryResult(_) => None,
        }
    }
}
