//! Per-direction processing chains
//!
//! A chain takes one read buffer and runs it through its configured stages:
//!
//! 1. split the buffer into frames
//! 2. per frame: input transform, filter, respond, output transform
//! 3. aggregate the surviving frames
//!
//! Replies go back to the side the buffer came from, everything else is
//! forwarded to the opposite side. Frames are processed strictly in order.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::error::PipeError;

use super::{MessageBundle, PipeMessage};

/// Rewrites a message, or drops it by returning `None`
pub type TransformFn = Arc<dyn Fn(PipeMessage) -> Option<PipeMessage> + Send + Sync>;

/// Splits a buffer into frames; `Ok(None)` leaves the buffer unsplit
pub type SplitFn = Arc<dyn Fn(&[u8]) -> Result<Option<MessageBundle>, PipeError> + Send + Sync>;

/// Keeps a message when it returns `true`
pub type FilterFn = Arc<dyn Fn(&PipeMessage) -> bool + Send + Sync>;

/// Produces a reply for the source side
pub type RespondFn = Arc<dyn Fn(Option<&PipeMessage>) -> Option<PipeMessage> + Send + Sync>;

/// Combines the forwarded messages of one buffer
pub type AggregateFn = Arc<dyn Fn(Vec<PipeMessage>) -> Vec<PipeMessage> + Send + Sync>;

/// Stage configuration for one direction
#[derive(Clone, Default)]
pub struct ChainConfig {
    /// Applied to each frame first
    pub input_transform: Option<TransformFn>,
    /// Splits the read buffer into frames
    pub split: Option<SplitFn>,
    /// Drops frames it rejects
    pub filter: Option<FilterFn>,
    /// Applied to each frame before forwarding
    pub output_transform: Option<TransformFn>,
    /// Builds replies for the source side
    pub respond: Option<RespondFn>,
    /// Combines forwarded frames
    pub aggregate: Option<AggregateFn>,
    /// At most one reply per read buffer
    pub respond_once: bool,
}

impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("input_transform", &self.input_transform.is_some())
            .field("split", &self.split.is_some())
            .field("filter", &self.filter.is_some())
            .field("output_transform", &self.output_transform.is_some())
            .field("respond", &self.respond.is_some())
            .field("aggregate", &self.aggregate.is_some())
            .field("respond_once", &self.respond_once)
            .finish()
    }
}

/// Result of running one buffer through a chain
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChainOutput {
    /// Messages for the opposite side, in stream order
    pub forward: Vec<PipeMessage>,
    /// Replies for the side the buffer came from
    pub replies: Vec<PipeMessage>,
}

impl ChainOutput {
    /// Check whether there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.replies.is_empty()
    }
}

/// An immutable, configured chain
#[derive(Debug, Clone)]
pub struct Chain {
    name: &'static str,
    config: ChainConfig,
}

impl Chain {
    /// Create a chain from its configuration
    pub fn new(name: &'static str, config: ChainConfig) -> Self {
        Self { name, config }
    }

    /// Chain configuration
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Run one read buffer through the chain
    pub fn process(&self, data: &[u8]) -> ChainOutput {
        let mut output = ChainOutput::default();
        if data.is_empty() {
            return output;
        }

        trace!(chain = self.name, length = data.len(), "processing buffer");

        let frames = match &self.config.split {
            Some(split) => match split(data) {
                Ok(Some(bundle)) => bundle.into_messages(),
                Ok(None) => vec![PipeMessage::raw(data.to_vec())],
                Err(e) => {
                    error!(chain = self.name, error = %e, "dropping buffer");
                    return output;
                }
            },
            None => vec![PipeMessage::raw(data.to_vec())],
        };

        let mut replied = false;

        for frame in frames {
            let message = match &self.config.input_transform {
                Some(transform) => match transform(frame) {
                    Some(message) => message,
                    None => continue,
                },
                None => frame,
            };

            if let Some(filter) = &self.config.filter {
                if !filter(&message) {
                    debug!(chain = self.name, "message filtered");
                    continue;
                }
            }

            if let Some(respond) = &self.config.respond {
                if !(self.config.respond_once && replied) {
                    if let Some(reply) = respond(Some(&message)) {
                        output.replies.push(reply);
                        replied = true;
                    }
                }
            }

            let message = match &self.config.output_transform {
                Some(transform) => match transform(message) {
                    Some(message) => message,
                    None => continue,
                },
                None => message,
            };

            output.forward.push(message);
        }

        if let Some(aggregate) = &self.config.aggregate {
            if !output.forward.is_empty() {
                output.forward = aggregate(std::mem::take(&mut output.forward));
            }
        }

        debug!(
            chain = self.name,
            forward = output.forward.len(),
            replies = output.replies.len(),
            "buffer processed"
        );

        output
    }
}

/// Aggregator that joins all forwarded frames into a single write
pub fn concat_aggregator() -> AggregateFn {
    Arc::new(|messages: Vec<PipeMessage>| {
        let data: Vec<u8> = messages.into_iter().flat_map(PipeMessage::into_data).collect();
        vec![PipeMessage::raw(data)]
    })
}
