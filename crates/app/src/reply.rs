//! JSON replies written back for each dispatched message.

use engine::{BroadcastReport, DispatchOutcome};
use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Reply {
    #[serde(rename_all = "camelCase")]
    Accepted {
        aggregate_type: String,
        aggregate_id: String,
        version: i64,
        events: Vec<String>,
        failures: usize,
    },
    #[serde(rename_all = "camelCase")]
    Published { failures: usize },
    Result { result: Value },
    Error { code: String, message: String },
}

fn failures(report: &BroadcastReport) -> usize {
    report.subscriber_failures.len() + report.follow_up_failures.len()
}

impl<S> From<DispatchOutcome<S>> for Reply {
    fn from(outcome: DispatchOutcome<S>) -> Self {
        match outcome {
            DispatchOutcome::Accepted(outcome) => Reply::Accepted {
                failures: failures(&outcome.report),
                events: outcome.event_names().into_iter().map(str::to_string).collect(),
                aggregate_type: outcome.aggregate_type,
                aggregate_id: outcome.aggregate_id,
                version: outcome.version.as_i64(),
            },
            DispatchOutcome::Published(report) => Reply::Published {
                failures: failures(&report),
            },
            DispatchOutcome::QueryResult(result) => Reply::Result { result },
        }
    }
}

impl From<&AppError> for Reply {
    fn from(err: &AppError) -> Self {
        Reply::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
