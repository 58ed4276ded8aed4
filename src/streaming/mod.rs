//! Viewer streaming stack: wire framing, broadcast hub and sessions

pub mod hub;
pub mod limiter;
pub mod messages;
pub mod session;
pub mod wire;

pub use hub::{BroadcastHub, ConnectionLedger, HubEvent, HubSender};
pub use limiter::FrameRateLimiter;
pub use session::ViewerContext;
pub use wire::{Serializer, WireFormat};
