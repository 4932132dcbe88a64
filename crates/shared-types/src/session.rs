//! # Session Contexts
//!
//! Logged-in identity and current selection for a client process. Owned by
//! the client, lifecycle tied to the client process.

use serde::{Deserialize, Serialize};

/// Session state for a student-group client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSession {
    /// The group this client represents.
    pub group_number: u32,
    /// Module currently selected in the client.
    pub selected_module: u32,
    /// Zero-based task index currently selected.
    pub selected_task: u32,
}

impl StudentSession {
    #[must_use]
    pub fn new(group_number: u32) -> Self {
        Self {
            group_number,
            selected_module: 1,
            selected_task: 0,
        }
    }
}

/// Session state for a TA client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaSession {
    /// Display name of the logged-in TA; claim arbitration matches on this.
    pub ta_name: String,
}

impl TaSession {
    #[must_use]
    pub fn new(ta_name: impl Into<String>) -> Self {
        Self {
            ta_name: ta_name.into(),
        }
    }
}
