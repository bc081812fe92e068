//! Publish/subscribe fan-out from the session registry to live viewers.
//!
//! The hub is a single task that owns every viewer's topic set and the
//! sending half of its bounded outbound queue. Publishing never waits on a
//! viewer: a full queue gets the viewer evicted instead.

mod broadcast;
mod message;

pub use broadcast::{Frame, Hub, HubHandle, HubStats, ViewerId};
pub use message::{Notification, NotificationKind, Topic, ViewerControl};
