//! Vehicle events
//!
//! Classifies decoded messages into domain events and hands them to the
//! application's listener.

pub mod broadcaster;
pub mod event;

pub use broadcaster::{EventBroadcaster, EventListener, PipeContext};
pub use event::{classify, PipeEvent, Vin};
