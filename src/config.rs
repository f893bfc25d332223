//! Process-wide tunables read once from the environment.
//!
//! Per-call parameters live in [`crate::DetectorConfig`]; these knobs only
//! steer how the work is scheduled, never what is detected.

use std::sync::OnceLock;

fn parse_env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_env_bool_u8(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u8>().ok())
        .map(|v| v != 0)
        .unwrap_or(default)
}

static PARALLEL_SEARCH: OnceLock<bool> = OnceLock::new();

/// `HAAR_PARALLEL=0` forces every scale level onto the calling thread.
pub(crate) fn parallel_search() -> bool {
    *PARALLEL_SEARCH.get_or_init(|| parse_env_bool_u8("HAAR_PARALLEL", true))
}

static PARALLEL_MIN_WINDOWS: OnceLock<usize> = OnceLock::new();

/// Levels with fewer candidate windows than this are scanned sequentially.
pub(crate) fn parallel_min_windows() -> usize {
    *PARALLEL_MIN_WINDOWS
        .get_or_init(|| parse_env_usize("HAAR_PARALLEL_MIN_WINDOWS", 4096).max(1))
}
