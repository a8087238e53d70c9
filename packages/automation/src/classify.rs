//! Error classification and retry policy.
//!
//! One static table maps every failure kind to its retry policy and
//! user-facing message. This table is the single source of truth for
//! retry decisions: no other component retries on its own initiative.
//! Every raised failure passes through `classify` exactly once before a
//! retry or terminal decision is made.

use serde::{Deserialize, Serialize};

use crate::error::{AutomationError, BrowserError, SecurityError};

/// Cap on any single retry delay.
pub const MAX_DELAY_MS: u64 = 5 * 60 * 1000;

/// Canonical failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NetworkTimeout,
    NetworkError,
    RateLimited,
    ServerError,
    CaptchaTimeout,
    CaptchaUnsolvable,
    PageLoadTimeout,
    BrowserCrash,
    DatabaseTimeout,
    DatabaseLock,
    InvalidUrl,
    JobNotFound,
    JobClosed,
    ProfileIncomplete,
    DuplicateApplication,
    FormNotFound,
    RecipeSelectorStale,
    InsufficientCredits,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NetworkTimeout => "network_timeout",
            FailureKind::NetworkError => "network_error",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ServerError => "server_error",
            FailureKind::CaptchaTimeout => "captcha_timeout",
            FailureKind::CaptchaUnsolvable => "captcha_unsolvable",
            FailureKind::PageLoadTimeout => "page_load_timeout",
            FailureKind::BrowserCrash => "browser_crash",
            FailureKind::DatabaseTimeout => "database_timeout",
            FailureKind::DatabaseLock => "database_lock",
            FailureKind::InvalidUrl => "invalid_url",
            FailureKind::JobNotFound => "job_not_found",
            FailureKind::JobClosed => "job_closed",
            FailureKind::ProfileIncomplete => "profile_incomplete",
            FailureKind::DuplicateApplication => "duplicate_application",
            FailureKind::FormNotFound => "form_not_found",
            FailureKind::RecipeSelectorStale => "recipe_selector_stale",
            FailureKind::InsufficientCredits => "insufficient_credits",
        }
    }

    /// Whether a failure of this kind belongs to the recipe path itself,
    /// in which case falling back to a recipe makes no sense.
    pub fn is_recipe_specific(&self) -> bool {
        matches!(self, FailureKind::RecipeSelectorStale)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry policy and messaging for one failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub kind: FailureKind,
    pub retryable: bool,
    /// Attempt ceiling including the first attempt
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Shown to the user on terminal failure; never a raw error string
    pub user_message: &'static str,
}

/// The policy table. Order matches `FailureKind` for readability; lookup
/// goes through `policy_for`.
pub const POLICY_TABLE: &[ErrorPolicy] = &[
    ErrorPolicy {
        kind: FailureKind::NetworkTimeout,
        retryable: true,
        max_attempts: 4,
        base_delay_ms: 5_000,
        user_message: "The application site was slow to respond. We'll retry shortly.",
    },
    ErrorPolicy {
        kind: FailureKind::NetworkError,
        retryable: true,
        max_attempts: 4,
        base_delay_ms: 5_000,
        user_message: "We hit a network problem reaching the application site.",
    },
    ErrorPolicy {
        kind: FailureKind::RateLimited,
        retryable: true,
        max_attempts: 5,
        base_delay_ms: 30_000,
        user_message: "The site is rate-limiting us. We'll retry with a longer delay.",
    },
    ErrorPolicy {
        kind: FailureKind::ServerError,
        retryable: true,
        max_attempts: 3,
        base_delay_ms: 10_000,
        user_message: "The application site had a server error. We'll retry shortly.",
    },
    ErrorPolicy {
        kind: FailureKind::CaptchaTimeout,
        retryable: true,
        max_attempts: 2,
        base_delay_ms: 60_000,
        user_message: "A CAPTCHA blocked the application and wasn't cleared in time.",
    },
    ErrorPolicy {
        kind: FailureKind::CaptchaUnsolvable,
        retryable: false,
        max_attempts: 1,
        base_delay_ms: 0,
        user_message: "This application is protected by a CAPTCHA we can't get past.",
    },
    ErrorPolicy {
        kind: FailureKind::PageLoadTimeout,
        retryable: true,
        max_attempts: 3,
        base_delay_ms: 10_000,
        user_message: "The application page took too long to load.",
    },
    ErrorPolicy {
        kind: FailureKind::BrowserCrash,
        retryable: true,
        max_attempts: 2,
        base_delay_ms: 15_000,
        user_message: "Our browser crashed while applying. We'll retry with a fresh session.",
    },
    ErrorPolicy {
        kind: FailureKind::DatabaseTimeout,
        retryable: true,
        max_attempts: 3,
        base_delay_ms: 2_000,
        user_message: "A temporary storage problem interrupted this application.",
    },
    ErrorPolicy {
        kind: FailureKind::DatabaseLock,
        retryable: true,
        max_attempts: 3,
        base_delay_ms: 1_000,
        user_message: "A temporary storage problem interrupted this application.",
    },
    ErrorPolicy {
        kind: FailureKind::InvalidUrl,
        retryable: false,
        max_attempts: 1,
        base_delay_ms: 0,
        user_message: "This job link isn't a valid application URL.",
    },
    ErrorPolicy {
        kind: FailureKind::JobNotFound,
        retryable: false,
        max_attempts: 1,
        base_delay_ms: 0,
        user_message: "This job posting no longer exists.",
    },
    ErrorPolicy {
        kind: FailureKind::JobClosed,
        retryable: false,
        max_attempts: 1,
        base_delay_ms: 0,
        user_message: "This job is no longer accepting applications.",
    },
    ErrorPolicy {
        kind: FailureKind::ProfileIncomplete,
        retryable: false,
        max_attempts: 1,
        base_delay_ms: 0,
        user_message: "Your profile is missing information this application requires.",
    },
    ErrorPolicy {
        kind: FailureKind::DuplicateApplication,
        retryable: false,
        max_attempts: 1,
        base_delay_ms: 0,
        user_message: "You've already applied to this job.",
    },
    ErrorPolicy {
        kind: FailureKind::FormNotFound,
        retryable: false,
        max_attempts: 1,
        base_delay_ms: 0,
        user_message: "We couldn't find an application form on this page.",
    },
    ErrorPolicy {
        kind: FailureKind::RecipeSelectorStale,
        retryable: true,
        max_attempts: 2,
        base_delay_ms: 5_000,
        user_message: "The saved application script is out of date for this site.",
    },
    ErrorPolicy {
        kind: FailureKind::InsufficientCredits,
        retryable: false,
        max_attempts: 1,
        base_delay_ms: 0,
        user_message: "You're out of application credits.",
    },
];

/// Look up the policy for a kind. The table covers every kind.
pub fn policy_for(kind: FailureKind) -> ErrorPolicy {
    POLICY_TABLE
        .iter()
        .copied()
        .find(|p| p.kind == kind)
        .unwrap_or(ErrorPolicy {
            kind,
            retryable: false,
            max_attempts: 1,
            base_delay_ms: 0,
            user_message: "The application failed.",
        })
}

/// Map a raised failure to its policy.
pub fn classify(error: &AutomationError) -> ErrorPolicy {
    policy_for(kind_of(error))
}

/// Map a raised failure to its canonical kind.
pub fn kind_of(error: &AutomationError) -> FailureKind {
    match error {
        AutomationError::Browser(b) => match b {
            BrowserError::PageLoadTimeout { .. } => FailureKind::PageLoadTimeout,
            BrowserError::NetworkTimeout(_) => FailureKind::NetworkTimeout,
            BrowserError::Network(_) => FailureKind::NetworkError,
            BrowserError::Crashed(_) | BrowserError::Launch(_) => FailureKind::BrowserCrash,
            BrowserError::SelectorNotFound { .. }
            | BrowserError::Evaluation(_)
            | BrowserError::Screenshot(_) => FailureKind::FormNotFound,
        },
        AutomationError::Security(s) => match s {
            // All validator rejections are terminal invalid-URL conditions.
            SecurityError::DisallowedScheme(_)
            | SecurityError::BlockedHost(_)
            | SecurityError::BlockedCidr(_)
            | SecurityError::NoHost
            | SecurityError::UrlTooLong(_)
            | SecurityError::UnrecognizedHost(_)
            | SecurityError::DnsResolution(_)
            | SecurityError::UrlParse(_) => FailureKind::InvalidUrl,
        },
        AutomationError::RateLimited => FailureKind::RateLimited,
        AutomationError::Server(_) | AutomationError::Ai(_) => FailureKind::ServerError,
        AutomationError::FormNotFound { .. } => FailureKind::FormNotFound,
        AutomationError::Captcha { solvable, .. } => {
            if *solvable {
                FailureKind::CaptchaTimeout
            } else {
                FailureKind::CaptchaUnsolvable
            }
        }
        AutomationError::JobNotFound { .. } => FailureKind::JobNotFound,
        AutomationError::JobClosed { .. } => FailureKind::JobClosed,
        AutomationError::ProfileIncomplete { .. } | AutomationError::TemplatePath { .. } => {
            FailureKind::ProfileIncomplete
        }
        AutomationError::DuplicateApplication { .. } => FailureKind::DuplicateApplication,
        AutomationError::InsufficientCredits => FailureKind::InsufficientCredits,
        AutomationError::RecipeSelectorStale { .. } => FailureKind::RecipeSelectorStale,
        AutomationError::DatabaseTimeout(_) => FailureKind::DatabaseTimeout,
        AutomationError::DatabaseLock(_) => FailureKind::DatabaseLock,
        AutomationError::Storage(_) => FailureKind::DatabaseTimeout,
        AutomationError::JsonParse(_) | AutomationError::Config(_) => FailureKind::ServerError,
    }
}

/// Exponential backoff for a retryable kind:
/// `min(base * 2^attempt, cap)` with ±20% jitter. `attempt` is
/// zero-based (the delay before the first retry uses `attempt = 0`).
pub fn backoff_delay_ms(policy: &ErrorPolicy, attempt: u32) -> u64 {
    let jitter = 0.8 + fastrand::f64() * 0.4;
    (backoff_base_ms(policy, attempt) as f64 * jitter) as u64
}

/// The deterministic part of the backoff, exposed for tests.
pub fn backoff_base_ms(policy: &ErrorPolicy, attempt: u32) -> u64 {
    policy
        .base_delay_ms
        .saturating_mul(1u64 << attempt.min(20))
        .min(MAX_DELAY_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn table_covers_all_kinds_once() {
        assert_eq!(POLICY_TABLE.len(), 18);
        for policy in POLICY_TABLE {
            let matches = POLICY_TABLE.iter().filter(|p| p.kind == policy.kind).count();
            assert_eq!(matches, 1, "duplicate entry for {:?}", policy.kind);
        }
    }

    #[test]
    fn non_retryable_kinds_have_one_attempt() {
        for policy in POLICY_TABLE {
            if !policy.retryable {
                assert_eq!(policy.max_attempts, 1, "{:?}", policy.kind);
            } else {
                assert!(policy.max_attempts > 1, "{:?}", policy.kind);
                assert!(policy.base_delay_ms > 0, "{:?}", policy.kind);
            }
        }
    }

    #[test]
    fn security_errors_classify_invalid_url() {
        let err = AutomationError::Security(SecurityError::BlockedHost("127.0.0.1".into()));
        let policy = classify(&err);
        assert_eq!(policy.kind, FailureKind::InvalidUrl);
        assert!(!policy.retryable);
    }

    #[test]
    fn browser_errors_classify_by_variant() {
        let timeout = AutomationError::Browser(BrowserError::PageLoadTimeout {
            url: "https://x".into(),
        });
        assert_eq!(kind_of(&timeout), FailureKind::PageLoadTimeout);

        let crash = AutomationError::Browser(BrowserError::Crashed("gone".into()));
        assert_eq!(kind_of(&crash), FailureKind::BrowserCrash);
        assert!(classify(&crash).retryable);
    }

    #[test]
    fn captcha_splits_on_solvability() {
        let timed_out = AutomationError::Captcha {
            reason: "timeout".into(),
            solvable: true,
        };
        assert_eq!(kind_of(&timed_out), FailureKind::CaptchaTimeout);
        assert!(classify(&timed_out).retryable);

        let unsolvable = AutomationError::Captcha {
            reason: "no solver".into(),
            solvable: false,
        };
        assert!(!classify(&unsolvable).retryable);
    }

    #[test]
    fn stale_recipe_is_retryable_and_recipe_specific() {
        let err = AutomationError::RecipeSelectorStale {
            selector: "#gone".into(),
        };
        let policy = classify(&err);
        assert!(policy.retryable);
        assert!(policy.kind.is_recipe_specific());
        assert!(!FailureKind::NetworkTimeout.is_recipe_specific());
    }

    #[test]
    fn backoff_caps_at_five_minutes() {
        let policy = policy_for(FailureKind::RateLimited);
        assert_eq!(backoff_base_ms(&policy, 30), MAX_DELAY_MS);
    }

    proptest! {
        /// Ignoring jitter, delay is monotonically non-decreasing in the
        /// attempt number and never exceeds the cap.
        #[test]
        fn backoff_monotone_and_capped(attempt in 0u32..24) {
            for policy in POLICY_TABLE.iter().filter(|p| p.retryable) {
                let current = backoff_base_ms(policy, attempt);
                let next = backoff_base_ms(policy, attempt + 1);
                prop_assert!(next >= current);
                prop_assert!(next <= MAX_DELAY_MS);
            }
        }

        /// Jitter stays within ±20% of the deterministic delay.
        #[test]
        fn jitter_within_bounds(attempt in 0u32..10) {
            let policy = policy_for(FailureKind::NetworkTimeout);
            let base = backoff_base_ms(&policy, attempt);
            let jittered = backoff_delay_ms(&policy, attempt);
            prop_assert!(jittered as f64 >= base as f64 * 0.8 - 1.0);
            prop_assert!(jittered as f64 <= base as f64 * 1.2 + 1.0);
        }
    }
}
