//! Short, log-friendly identifiers for queries and transactions.

use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix used when no instance identifier is configured.
pub const LOCAL_INSTANCE: &str = "local";

/// Generates `{instance}-{n}` tokens that correlate start and end log lines.
///
/// `n` comes from an atomic counter owned by the generator, so two handles in
/// one process never share a sequence.
#[derive(Debug)]
pub struct QueryIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl QueryIdGenerator {
    pub fn new(instance_id: &str) -> Self {
        Self {
            prefix: short_instance_id(instance_id),
            counter: AtomicU64::new(0),
        }
    }

    /// The shortened instance prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Produce the next identifier. Never returns the same value twice.
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.prefix, n)
    }

    /// Number of identifiers handed out so far.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// Instance IDs longer than eight characters keep only their last four; the
/// low-order part of generated instance names is the most random.
fn short_instance_id(instance_id: &str) -> String {
    let chars: Vec<char> = instance_id.chars().collect();
    match chars.len() {
        0 => LOCAL_INSTANCE.to_string(),
        n if n > 8 => chars[n - 4..].iter().collect(),
        _ => instance_id.to_string(),
    }
}
