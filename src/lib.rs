//! Concurrent ML style composable synchronization events.
//!
//! An [`Event<T>`](event::Event) describes a potential synchronization
//! action: a channel send or receive, a timeout, or a combinator over
//! other events, without performing it. Calling [`sync`] or [`poll`]
//! commits to exactly one ready alternative, running every other
//! alternative's cancellation logic (including any
//! [`with_nack`](event::with_nack) cleanup) before returning.
//!
//! ```
//! use cml::{always, choose, sync, timeout, wrap};
//! use std::time::Duration;
//!
//! let e = choose(vec![always(1), wrap(timeout(Duration::from_secs(1)), |()| 2)]);
//! assert_eq!(sync(&e), 1);
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod channel;
pub mod config;
pub mod error;
pub mod event;
mod pick;
pub mod stats;
pub mod sync;
pub mod wheel;

pub use channel::Chan;
pub use config::{CallbackMode, WheelConfig};
pub use error::{CmlError, CmlResult};
pub use event::{always, choose, guard, never, with_nack, wrap, Canceller, Event};
pub use stats::{ChannelStats, WheelStats};
pub use sync::{poll, sync};
pub use wheel::{timeout, TimerId, TimingWheel};
