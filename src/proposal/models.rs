//! Proposal data models
//!
//! A match proposal is a time-bounded scheduling offer between two teams.
//! This service only reads proposals and applies the `active -> expired` edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Proposal status as stored on the document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Open and waiting for the receiving team
    #[default]
    Active,
    /// Deadline passed while still active
    Expired,
    /// Accepted by the receiving team
    Accepted,
    /// Declined by the receiving team
    Declined,
    /// Withdrawn by the proposing team
    Cancelled,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Active => "active",
            ProposalStatus::Expired => "expired",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Declined => "declined",
            ProposalStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProposalStatus::Active),
            "expired" => Ok(ProposalStatus::Expired),
            "accepted" => Ok(ProposalStatus::Accepted),
            "declined" => Ok(ProposalStatus::Declined),
            "cancelled" => Ok(ProposalStatus::Cancelled),
            other => Err(format!("unknown proposal status '{}'", other)),
        }
    }
}

/// A match proposal document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: Uuid,
    /// Team that sent the proposal
    pub proposing_team_id: Option<String>,
    /// Team the proposal was sent to
    pub receiving_team_id: Option<String>,
    /// Current status
    pub status: ProposalStatus,
    /// End of the validity window, fixed at creation
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Free-form match details (slots, venue, notes). Never touched here.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Proposal {
    pub fn new(expires_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            proposing_team_id: None,
            receiving_team_id: None,
            status: ProposalStatus::Active,
            expires_at,
            created_at: now,
            updated_at: now,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_status(mut self, status: ProposalStatus) -> Self {
        self.status = status;
        self
    }

    pub fn between(mut self, proposing: impl Into<String>, receiving: impl Into<String>) -> Self {
        self.proposing_team_id = Some(proposing.into());
        self.receiving_team_id = Some(receiving.into());
        self
    }

    /// True when this proposal is due for expiry at `now`.
    /// The deadline is exclusive: a proposal expiring exactly at `now` is still valid.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ProposalStatus::Active && self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            ProposalStatus::Active,
            ProposalStatus::Expired,
            ProposalStatus::Accepted,
            ProposalStatus::Declined,
            ProposalStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ProposalStatus>(), Ok(status));
        }
        assert!("pending".parse::<ProposalStatus>().is_err());
        assert_eq!(ProposalStatus::default(), ProposalStatus::Active);
    }

    #[test]
    fn test_document_uses_camel_case_fields() {
        let proposal = Proposal::new(Utc::now()).between("falcons", "otters");
        let json = serde_json::to_value(&proposal).unwrap();

        assert_eq!(json["status"], "active");
        assert!(json.get("expiresAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert_eq!(json["proposingTeamId"], "falcons");
    }

    #[test]
    fn test_overdue_boundary_is_exclusive() {
        let now = Utc::now();
        assert!(!Proposal::new(now).is_overdue(now));
        assert!(Proposal::new(now - Duration::milliseconds(1)).is_overdue(now));
    }

    #[test]
    fn test_only_active_proposals_are_overdue() {
        let now = Utc::now();
        let long_gone = now - Duration::days(30);

        assert!(!Proposal::new(long_gone).with_status(ProposalStatus::Accepted).is_overdue(now));
        assert!(!Proposal::new(long_gone).with_status(ProposalStatus::Expired).is_overdue(now));
    }
}
