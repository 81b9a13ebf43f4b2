//! Poll-loop policy for a single run
//!
//! Pure decisions only; the executor owns the ticker and the I/O.

use crate::assistant::{Run, RunStatus, ToolCallRequest};
use std::time::Duration;

/// How often and how many times to check a run before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub interval: Duration,
    /// Hard cap on status fetches per turn
    pub max_attempts: u32,
}

impl PollBudget {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Wall-clock bound for the whole loop: `interval × max_attempts`
    pub fn deadline(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

impl Default for PollBudget {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 60)
    }
}

/// What the loop does after observing a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    /// Still queued or working; wait for the next tick
    Continue,
    /// Answer these tool calls, then keep polling
    DispatchTools(Vec<ToolCallRequest>),
    /// Finished with an answer
    Completed,
    /// Finished without an answer
    Ended {
        status: RunStatus,
        code: String,
        message: String,
    },
}

pub fn next_step(run: &Run) -> PollStep {
    match run.status {
        RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling => PollStep::Continue,
        // A requires_action snapshot without calls is treated as still working
        RunStatus::RequiresAction if run.tool_calls.is_empty() => PollStep::Continue,
        RunStatus::RequiresAction => PollStep::DispatchTools(run.tool_calls.clone()),
        RunStatus::Completed => PollStep::Completed,
        RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired | RunStatus::Incomplete => {
            PollStep::Ended {
                status: run.status,
                code: run
                    .last_error
                    .as_ref()
                    .map(|e| e.code.clone())
                    .unwrap_or_default(),
                message: run
                    .last_error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("Run ended with status {}", run.status)),
            }
        }
    }
}
