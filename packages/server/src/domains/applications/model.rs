//! Application model: one user's attempt to apply to one job.

use automation::AtsType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Application status state machine.
///
/// `QUEUED → APPLYING → {SUBMITTED | RETRYING → APPLYING | FAILED |
/// CANCELLED}`; `CANCELLED` is reachable only from `QUEUED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "application_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    Queued,
    Applying,
    Submitted,
    Retrying,
    Failed,
    Cancelled,
}

impl ApplicationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Submitted | ApplicationStatus::Failed | ApplicationStatus::Cancelled
        )
    }

    /// A worker may start executing from these states.
    pub fn is_claimable(&self) -> bool {
        matches!(self, ApplicationStatus::Queued | ApplicationStatus::Retrying)
    }

    /// Whether the state machine permits this transition.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (Queued, Applying)
                | (Queued, Cancelled)
                | (Retrying, Applying)
                | (Applying, Submitted)
                | (Applying, Retrying)
                | (Applying, Failed)
        )
    }
}

/// Which strategy produced the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "apply_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApplyMethod {
    Ai,
    Recipe,
}

/// One user's attempt to apply to one job.
///
/// Created in `Queued` by the API layer; from then on the worker
/// processing its queue job is the exclusive writer.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Application {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub user_id: Uuid,
    pub job_id: Uuid,
    pub job_url: String,

    /// Detected ATS platform key, `unknown` when undetected
    #[builder(default = AtsType::Unknown.as_str().to_string())]
    pub ats: String,

    #[builder(default)]
    pub status: ApplicationStatus,

    /// Set once a strategy succeeds
    #[builder(default, setter(strip_option))]
    pub method: Option<ApplyMethod>,

    /// Monetary cost accumulated across attempts
    #[builder(default = 0.0)]
    pub cost: f64,

    #[builder(default = 0)]
    pub retry_count: i32,

    #[builder(default, setter(strip_option))]
    pub error_kind: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,

    #[builder(default, setter(strip_option))]
    pub confirmation_id: Option<String>,
    #[builder(default, setter(strip_option))]
    pub confirmation_screenshot: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub submitted_at: Option<DateTime<Utc>>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Parse the stored ATS key back to the enum.
    pub fn ats_type(&self) -> AtsType {
        self.ats.parse().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_only_reachable_from_queued() {
        use ApplicationStatus::*;
        assert!(Queued.can_transition_to(Cancelled));
        assert!(!Applying.can_transition_to(Cancelled));
        assert!(!Retrying.can_transition_to(Cancelled));
        assert!(!Submitted.can_transition_to(Cancelled));
    }

    #[test]
    fn retrying_loops_back_to_applying() {
        use ApplicationStatus::*;
        assert!(Applying.can_transition_to(Retrying));
        assert!(Retrying.can_transition_to(Applying));
        assert!(Retrying.is_claimable());
        assert!(!Retrying.is_terminal());
    }

    #[test]
    fn terminal_states() {
        use ApplicationStatus::*;
        for status in [Submitted, Failed, Cancelled] {
            assert!(status.is_terminal());
            assert!(!status.is_claimable());
        }
    }
}
