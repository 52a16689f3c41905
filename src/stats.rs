//! Serializable snapshots exposed for observability and tests.

use serde::{Deserialize, Serialize};

/// Queue depths for one channel at the moment of the call. Cheap to take;
/// never held across a `sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelStats {
    pub senders_queued: usize,
    pub receivers_queued: usize,
}

/// A point-in-time view of one timing wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WheelStats {
    /// Timer entries currently armed across every level, including the
    /// overflow list.
    pub armed: usize,
    /// Entries fired since the wheel started.
    pub fired_total: u64,
    /// Entries cancelled before they fired.
    pub cancelled_total: u64,
    /// Number of `advance` ticks processed.
    pub ticks_total: u64,
    /// Callback panics caught and logged rather than propagated.
    pub callback_panics_total: u64,
}
