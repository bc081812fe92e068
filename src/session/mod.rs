mod ids;
mod registry;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ProctorError, Result};

pub use ids::{new_opaque_id, new_session_code, SESSION_CODE_LEN};
pub use registry::{Joined, SessionCreated, SessionRegistry};

/// Lifecycle of an exam room. Only Waiting -> Active is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Waiting,
    Active,
    NetworkLoss,
    Paused,
    Complete,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Waiting
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantStatus {
    Online,
    Offline,
    Submitted,
    Flagged,
}

impl Default for ParticipantStatus {
    fn default() -> Self {
        Self::Online
    }
}

/// Full session record, secret included. This is what the store persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub code: String,
    pub name: String,
    pub host_id: String,
    pub secret: String,
    /// Question set label -> resource URL
    #[serde(default)]
    pub sets: HashMap<String, String>,
    /// Zero means unbounded
    #[serde(default)]
    pub time_allocated_secs: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: SessionState,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub reg_no: String,
    pub status: ParticipantStatus,
    pub selected_set: String,
    /// Captured at join for audit only
    pub origin_address: String,
    pub last_seen: DateTime<Utc>,
    pub score: Option<f64>,
}

/// What a participant reports about themselves when joining
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParticipantInput {
    pub user_id: String,
    pub username: String,
    pub reg_no: String,
    pub selected_set: String,
}

/// Admin partial update. `None` leaves the attribute untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub name: Option<String>,
    pub sets: Option<HashMap<String, String>>,
    pub time_allocated_secs: Option<u64>,
    pub state: Option<SessionState>,
}

/// Read-side snapshot handed to callers and viewers; never carries the secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub code: String,
    pub name: String,
    pub host_id: String,
    pub sets: HashMap<String, String>,
    pub time_allocated_secs: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub state: SessionState,
    pub participants: Vec<Participant>,
}

impl Session {
    pub fn new(code: String, name: String, host_id: String, secret: String) -> Self {
        Self {
            code,
            name,
            host_id,
            secret,
            sets: HashMap::new(),
            time_allocated_secs: 0,
            start_time: None,
            end_time: None,
            state: SessionState::Waiting,
            participants: Vec::new(),
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            code: self.code.clone(),
            name: self.name.clone(),
            host_id: self.host_id.clone(),
            sets: self.sets.clone(),
            time_allocated_secs: self.time_allocated_secs,
            start_time: self.start_time,
            end_time: self.end_time,
            state: self.state,
            participants: self.participants.clone(),
        }
    }

    /// Exact match against the secret set at creation
    pub fn authorize(&self, secret: &str) -> bool {
        self.secret == secret
    }

    /// Existing participant with the same user id, or the same non-empty reg number
    pub fn find_existing(&self, input: &ParticipantInput) -> Option<&Participant> {
        self.participants.iter().find(|p| {
            p.user_id == input.user_id || (!input.reg_no.is_empty() && p.reg_no == input.reg_no)
        })
    }

    /// Marks the session active from `now`, deriving the end from the allotted time.
    /// Nothing changes when the end is out of range.
    fn activate(&mut self, now: DateTime<Utc>) -> Result<()> {
        let end_time = end_after(now, self.time_allocated_secs)?;
        self.state = SessionState::Active;
        self.start_time = Some(now);
        self.end_time = end_time;
        Ok(())
    }
}

/// End of an exam started at `start` lasting `secs`; `None` when unbounded
fn end_after(start: DateTime<Utc>, secs: u64) -> Result<Option<DateTime<Utc>>> {
    if secs == 0 {
        return Ok(None);
    }
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|d| start.checked_add_signed(d))
        .map(Some)
        .ok_or(ProctorError::InvalidDuration(secs))
}
