//! The mutable work queue of accounts still pending processing.

use rand::Rng;
use rand::seq::index;

/// Account identifiers awaiting a fetch attempt.
///
/// Owned by the run's task and passed explicitly through the scheduler;
/// an identifier is either in here or has a terminal outcome recorded in
/// the job document, never both.
#[derive(Debug, Default)]
pub struct WorkQueue {
    pending: Vec<String>,
}

impl WorkQueue {
    /// Build the initial queue from the job's account identifiers.
    pub fn new(accounts: impl IntoIterator<Item = String>) -> Self {
        Self {
            pending: accounts.into_iter().collect(),
        }
    }

    /// Number of accounts still pending.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the queue is drained.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Re-enqueue an account for a later batch.
    pub fn push(&mut self, account: String) {
        self.pending.push(account);
    }

    /// Remove and return up to `max` accounts, sampled uniformly at random
    /// without replacement.
    ///
    /// Random sampling (rather than FIFO order) bounds per-round load and
    /// avoids retry clustering at the tail of the queue.
    pub fn sample_batch(&mut self, max: usize, rng: &mut impl Rng) -> Vec<String> {
        let take = self.pending.len().min(max);
        if take == 0 {
            return Vec::new();
        }

        let mut picked = index::sample(rng, self.pending.len(), take).into_vec();
        // Remove highest indices first so earlier removals don't shift later ones.
        picked.sort_unstable_by(|a, b| b.cmp(a));
        picked
            .into_iter()
            .map(|i| self.pending.swap_remove(i))
            .collect()
    }
}
