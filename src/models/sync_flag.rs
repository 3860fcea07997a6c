//! Persisted state guarding bulk synchronization runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlagState {
    Idle,
    Running,
    Finished,
    Error,
}

impl FlagState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for FlagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "finished" => Ok(Self::Finished),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown flag state `{}`", other)),
        }
    }
}

/// Row of the `sync_flags` table.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct SyncFlag {
    /// Flag identifier; one row per kind of run.
    pub code: String,

    /// Stored as text; see [`FlagState`].
    pub state: String,

    /// Last time a run touched the flag.
    pub last_update: Option<DateTime<Utc>>,

    /// JSON progress data written by the current run.
    pub flag_data: Option<String>,

    /// Error message of the last failed run.
    pub error_data: Option<String>,
}

impl SyncFlag {
    pub fn idle(code: &str) -> Self {
        Self {
            code: code.to_string(),
            state: FlagState::Idle.as_str().to_string(),
            last_update: None,
            flag_data: None,
            error_data: None,
        }
    }

    /// Unknown stored states read as idle.
    pub fn state(&self) -> FlagState {
        self.state.parse().unwrap_or(FlagState::Idle)
    }

    pub fn set_state(&mut self, state: FlagState) {
        self.state = state.as_str().to_string();
    }
}
