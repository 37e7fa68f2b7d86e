//! Wall-clock helpers shared by every crate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_ID_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Current Unix time in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Timestamp-derived record id, strictly increasing within the process.
///
/// Ids sort lexicographically in creation order: `{prefix}-{millis:013}`.
pub fn next_id(prefix: &str) -> String {
    let now = epoch_millis();
    let mut last = LAST_ID_MILLIS.load(Ordering::Relaxed);
    let value = loop {
        let candidate = now.max(last + 1);
        match LAST_ID_MILLIS.compare_exchange_weak(
            last,
            candidate,
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => break candidate,
            Err(current) => last = current,
        }
    };
    format!("{prefix}-{value:013}")
}
