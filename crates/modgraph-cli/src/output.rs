//! Formatted output helpers for CLI commands.
//!
//! Provides consistent status markers, output listings, and
//! human-readable duration formatting.

use modgraph_common::types::{InstanceState, Outputs};

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const RESET: &str = "\x1b[0m";

/// Single-character marker for an instance's terminal state.
#[must_use]
pub const fn state_marker(state: InstanceState) -> &'static str {
    match state {
        InstanceState::Done => "\u{2713}",
        InstanceState::Failed => "\u{2717}",
        InstanceState::Pending | InstanceState::Ready | InstanceState::Running => "\u{2026}",
    }
}

/// Renders outputs as `name = value` lines, in name order.
#[must_use]
pub fn format_outputs(outputs: &Outputs) -> Vec<String> {
    outputs
        .iter()
        .map(|(name, value)| format!("{name} = {value}"))
        .collect()
}

/// Formats a millisecond duration (e.g., "340ms", "1.2s").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_elapsed(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

/// Pluralizes `noun` for `count`.
#[must_use]
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
