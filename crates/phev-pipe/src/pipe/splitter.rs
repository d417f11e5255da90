//! Frame reassembly
//!
//! Splits one read buffer into the complete frames it contains. Bytes after
//! the last complete frame are dropped for this read and not carried into the
//! next one; the vehicle re-sends its state on the next poll.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::PipeError;
use crate::protocol::{hex_dump, FrameCodec};

use super::{MessageBundle, PipeMessage, SplitFn};

/// Splits raw buffers into frames using the codec's frame extractor
#[derive(Clone)]
pub struct FrameReassembler {
    codec: Arc<dyn FrameCodec>,
}

impl FrameReassembler {
    /// Create a reassembler for the given codec
    pub fn new(codec: Arc<dyn FrameCodec>) -> Self {
        Self { codec }
    }

    /// Extract every complete frame from `data`.
    ///
    /// Returns `Ok(None)` when the buffer is empty or the first frame is not
    /// valid. Only a bundle overflow is reported as an error.
    pub fn split(&self, data: &[u8]) -> Result<Option<MessageBundle>, PipeError> {
        trace!(length = data.len(), "splitting buffer");

        if data.is_empty() {
            return Ok(None);
        }

        let first = match self.codec.extract_frame(data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "no frame at start of buffer\n{}", hex_dump(data));
                return Ok(None);
            }
        };

        let mut bundle = MessageBundle::new();
        let mut offset = first.len();
        bundle.push(PipeMessage::raw(first.to_vec()))?;

        while offset < data.len() {
            match self.codec.extract_frame(&data[offset..]) {
                Ok(frame) => {
                    offset += frame.len();
                    bundle.push(PipeMessage::raw(frame.to_vec()))?;
                }
                Err(e) => {
                    debug!(
                        error = %e,
                        discarded = data.len() - offset,
                        "dropping trailing bytes"
                    );
                    break;
                }
            }
        }

        debug!(frames = bundle.len(), "split messages");
        for (i, frame) in bundle.iter().enumerate() {
            trace!(index = i, "frame\n{}", hex_dump(frame.data()));
        }

        Ok(Some(bundle))
    }

    /// Wrap the reassembler as a chain split stage
    pub fn into_stage(self) -> SplitFn {
        Arc::new(move |data: &[u8]| self.split(data))
    }
}
