//! Runtime for executing conversation turns
//!
//! A turn submits one user message to the assistant thread, drives the
//! resulting run to a terminal state while answering its tool calls, and
//! persists the outcome on the session record.

mod executor;
mod failure;
mod poll;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{Turn, TurnExecutor};
pub use failure::{classify, ClassifiedFailure, TurnFailure};
pub use poll::PollBudget;
pub use traits::*;

use crate::assistant::AssistantClient;
use serde::{Deserialize, Serialize};

/// Executor wired to SQLite for state and metrics, with any assistant client
pub type ProductionExecutor = TurnExecutor<DatabaseStorage, dyn AssistantClient, DatabaseStorage>;

/// Caller-supplied identity for the turn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserContext {
    /// Name and email, when the caller is signed in and both are present
    pub fn identity(&self) -> Option<(&str, &str)> {
        if !self.is_authenticated {
            return None;
        }
        let name = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
        let email = self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
        Some((name, email))
    }
}
