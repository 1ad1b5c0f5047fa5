/// Outcome of a single transport submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Collector confirmed receipt (2xx).
    Delivered,
    /// Credential rejected (401). The coordinator refreshes once and resends
    /// before giving up on the attempt.
    Unauthorized,
    /// Business rejection (4xx other than 401, malformed payload). Retrying
    /// can never succeed.
    Rejected(String),
    /// Network error, timeout, or 5xx. Worth retrying on a later pass.
    Transient(String),
}

/// What the caller of `submit_now` is told about a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Delivered directly, nothing persisted locally.
    Uploaded,
    /// Staged durably; a later drain will deliver it.
    Queued,
    /// Permanently rejected, not queued.
    Rejected(String),
}

/// Per-pass counters returned by `drain`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Intents delivered and cleaned up this pass.
    pub delivered: usize,
    /// Intents left in the journal for a later pass.
    pub retained: usize,
    /// Intents purged after a permanent rejection.
    pub rejected: usize,
}
