//! Message Pipeline
//!
//! Two chains of stages, one per direction, between the vehicle link and the
//! application:
//!
//! - **out chain** (vehicle to application): reassemble frames, decode,
//!   auto-reply to vehicle requests, raise events, re-encode
//! - **in chain** (application to vehicle): optional reply, otherwise
//!   forwarded unchanged

pub mod builder;
pub mod chain;
mod message;
pub mod responder;
pub mod splitter;
pub mod translator;

pub use builder::{PhevPipe, PipeSettings, PipeStats};
pub use chain::{
    concat_aggregator, AggregateFn, Chain, ChainConfig, ChainOutput, FilterFn, RespondFn, SplitFn,
    TransformFn,
};
pub use message::{MessageBundle, PipeMessage};
pub use responder::CommandResponder;
pub use splitter::FrameReassembler;
pub use translator::FrameTranslator;

/// Maximum number of frames extracted from a single read buffer
pub const MAX_BUNDLE_MESSAGES: usize = 256;

/// Default size of the buffer used for each transport read
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;
