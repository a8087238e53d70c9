//! Typed errors for the automation library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Every failure that can
//! surface from a job execution is representable here so the classifier
//! has a single normalized input shape.

use thiserror::Error;

/// Errors that can occur while executing an application.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// Browser-level failure (navigation, query, mutation)
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    /// URL failed security or allowlist validation
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// AI provider unavailable or returned an unusable response
    #[error("AI service error: {0}")]
    Ai(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// AI provider rejected the request for rate limiting
    #[error("AI rate limited")]
    RateLimited,

    /// Upstream service returned a 5xx
    #[error("server error: {0}")]
    Server(String),

    /// No form fields were found on the target page
    #[error("no application form found at {url}")]
    FormNotFound { url: String },

    /// A CAPTCHA widget blocked the form and was not cleared in time
    #[error("CAPTCHA not cleared: {reason}")]
    Captcha { reason: String, solvable: bool },

    /// The job posting no longer exists
    #[error("job not found: {url}")]
    JobNotFound { url: String },

    /// The job posting exists but is closed to new applications
    #[error("job closed: {url}")]
    JobClosed { url: String },

    /// The user profile is missing data a required field needs
    #[error("profile incomplete: missing {field}")]
    ProfileIncomplete { field: String },

    /// An application for this (user, job) pair already exists
    #[error("duplicate application for job {job_id}")]
    DuplicateApplication { job_id: String },

    /// The user has no automation credits left
    #[error("insufficient credits")]
    InsufficientCredits,

    /// A required recipe step's selector no longer matches the page
    #[error("recipe selector stale: {selector}")]
    RecipeSelectorStale { selector: String },

    /// Database operation timed out
    #[error("database timeout: {0}")]
    DatabaseTimeout(String),

    /// Database lock contention
    #[error("database lock contention: {0}")]
    DatabaseLock(String),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Template interpolation referenced a missing profile path
    #[error("unresolved template path: {path}")]
    TemplatePath { path: String },

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by the browser automation runtime.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Navigation did not complete within the timeout
    #[error("page load timeout: {url}")]
    PageLoadTimeout { url: String },

    /// Network-level failure during navigation or action
    #[error("network error: {0}")]
    Network(String),

    /// Network request timed out
    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    /// No live DOM node matched the selector
    #[error("selector not found: {selector}")]
    SelectorNotFound { selector: String },

    /// The browser process crashed or the session was lost
    #[error("browser crashed: {0}")]
    Crashed(String),

    /// Failed to launch or connect to a browser instance
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// JavaScript evaluation failed
    #[error("script evaluation failed: {0}")]
    Evaluation(String),

    /// Screenshot capture failed
    #[error("screenshot failed: {0}")]
    Screenshot(String),
}

/// Security-related errors, primarily for SSRF protection.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (anything but https)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is blocked (e.g., localhost, internal IPs)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// IP in blocked CIDR range (e.g., 10.0.0.0/8)
    #[error("blocked IP range: {0}")]
    BlockedCidr(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// URL exceeds the maximum accepted length
    #[error("URL too long: {0} chars")]
    UrlTooLong(usize),

    /// Host is not an ATS domain and the URL carries no platform marker
    #[error("not a recognized application URL: {0}")]
    UnrecognizedHost(String),

    /// DNS resolution failed
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias for automation operations.
pub type Result<T> = std::result::Result<T, AutomationError>;

/// Result type alias for browser operations.
pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Result type alias for security checks.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;
