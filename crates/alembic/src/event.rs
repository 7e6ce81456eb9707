//! Triggers and event payloads
//!
//! A chain terminates into a function unit bound to one trigger. Triggers
//! form a closed set of variants — schedule-based, queue-pull-based, and
//! stream-subscription-based — and each descriptor carries what the host
//! needs to wire the trigger to the unit. The `Event` is the payload a
//! trigger delivers to one invocation.

use alembic_core::{AlembicError, Result};
use chrono::{DateTime, Duration, Utc};
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// When a scheduled trigger fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Cron expression (6-field, with seconds).
    Cron { expression: String },
    /// Fixed interval in seconds.
    Rate { seconds: u64 },
}

impl Schedule {
    pub fn cron(expression: impl Into<String>) -> Self {
        Schedule::Cron {
            expression: expression.into(),
        }
    }

    pub fn rate_seconds(seconds: u64) -> Self {
        Schedule::Rate { seconds }
    }

    /// Validate the schedule configuration.
    pub fn validate(&self) -> Result<()> {
        match self {
            Schedule::Cron { expression } => {
                CronSchedule::from_str(expression)
                    .map_err(|e| AlembicError::InvalidSchedule(e.to_string()))?;
                Ok(())
            }
            Schedule::Rate { seconds } => {
                if *seconds == 0 {
                    return Err(AlembicError::InvalidSchedule(
                        "Rate must be greater than 0 seconds".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Next firing time after the given instant.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        match self {
            Schedule::Cron { expression } => {
                let schedule = CronSchedule::from_str(expression)
                    .map_err(|e| AlembicError::InvalidSchedule(e.to_string()))?;
                Ok(schedule.after(&after).next())
            }
            Schedule::Rate { seconds } => Ok(Some(after + Duration::seconds(*seconds as i64))),
        }
    }
}

/// Where a stream subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartingPosition {
    TrimHorizon,
    Latest,
}

/// Everything the host needs to wire a trigger to a function unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerDescriptor {
    Schedule {
        schedule: Schedule,
    },
    Queue {
        queue: String,
        batch_size: usize,
    },
    Stream {
        stream: String,
        batch_size: usize,
        starting_position: StartingPosition,
    },
}

/// The payload one trigger firing delivers to an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A scheduled tick.
    Schedule { time: DateTime<Utc> },
    /// A pulled batch of queue messages.
    Queue { messages: Vec<serde_json::Value> },
    /// A batch of stream records.
    Stream { records: Vec<serde_json::Value> },
}

impl Event {
    /// Short kind name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Schedule { .. } => "schedule",
            Event::Queue { .. } => "queue",
            Event::Stream { .. } => "stream",
        }
    }
}
