//! Per-account failure accounting and the bounded retry decision.

use std::collections::HashMap;

/// Maps account identifiers to consecutive-failure counts for one run.
///
/// Owned by the run's task; counts only grow while the run is active and
/// are dropped with it.
#[derive(Debug)]
pub struct ErrorLedger {
    counts: HashMap<String, u32>,
    retry_limit: u32,
}

impl ErrorLedger {
    /// Create an empty ledger with the given attempt limit.
    pub fn new(retry_limit: u32) -> Self {
        Self {
            counts: HashMap::new(),
            retry_limit,
        }
    }

    /// Record one failure for `account` and decide whether to retry.
    ///
    /// Returns `true` iff the post-increment count is still below the
    /// limit, i.e. the account gets another attempt. With the default
    /// limit of 2 an account is attempted at most twice in total.
    pub fn record_failure(&mut self, account: &str) -> bool {
        let count = self.counts.entry(account.to_string()).or_insert(0);
        *count += 1;
        *count < self.retry_limit
    }

    /// Failure count recorded for `account` so far.
    pub fn count(&self, account: &str) -> u32 {
        self.counts.get(account).copied().unwrap_or(0)
    }
}
