//! Splitting frames into data-channel messages and joining them again.
//!
//! SCTP refuses messages above its negotiated maximum (64 KiB by default),
//! while a data frame carries a whole file chunk. Each frame therefore leaves
//! as a run of fragments on the ordered channel, and the receiver cuts the
//! byte stream back into frames using the length in each frame header.

use bytes::{Buf, Bytes, BytesMut};
use dropmesh_core::FRAME_HEADER_LEN;
use thiserror::Error;

/// Largest single message handed to the data channel.
pub(crate) const MAX_MESSAGE_SIZE: usize = 16 * 1024;

/// Largest frame a peer may announce before the channel is torn down.
pub(crate) const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024 + FRAME_HEADER_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum FragmentError {
    #[error("frame of {declared} bytes exceeds the {limit} byte limit")]
    Oversized { declared: usize, limit: usize },
}

/// Cuts an encoded frame into messages of at most `max` bytes.
pub(crate) fn split(frame: &Bytes, max: usize) -> impl Iterator<Item = Bytes> + '_ {
    let max = max.max(1);
    (0..frame.len())
        .step_by(max)
        .map(move |start| frame.slice(start..frame.len().min(start + max)))
}

/// Rebuilds whole frames from fragments received in order.
pub(crate) struct FrameAssembler {
    buf: BytesMut,
    limit: usize,
    failed: bool,
}

impl FrameAssembler {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
            failed: false,
        }
    }

    /// Appends one fragment and returns every frame it completed.
    ///
    /// After an oversized header the stream can no longer be framed, so every
    /// later call fails too.
    pub(crate) fn push(&mut self, fragment: &[u8]) -> Result<Vec<Bytes>, FragmentError> {
        if self.failed {
            return Err(FragmentError::Oversized {
                declared: 0,
                limit: self.limit,
            });
        }
        self.buf.extend_from_slice(fragment);

        let mut frames = Vec::new();
        while self.buf.len() >= FRAME_HEADER_LEN {
            let mut header = &self.buf[1..FRAME_HEADER_LEN];
            let total = FRAME_HEADER_LEN + header.get_u32() as usize;
            if total > self.limit {
                self.failed = true;
                self.buf.clear();
                return Err(FragmentError::Oversized {
                    declared: total,
                    limit: self.limit,
                });
            }
            if self.buf.len() < total {
                break;
            }
            frames.push(self.buf.split_to(total).freeze());
        }
        Ok(frames)
    }

    /// Bytes of an incomplete frame still waiting for fragments.
    pub(crate) fn pending(&self) -> usize {
        self.buf.len()
    }
}
