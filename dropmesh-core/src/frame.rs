//! Peer-to-peer channel framing.
//!
//! Every message on a data channel carries a five byte header: a one byte
//! tag followed by the payload length as a big-endian `u32`. Control frames
//! carry a JSON object, data frames carry raw file bytes. The tag alone
//! decides how a message is read, so file content can never be mistaken for
//! a control frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FRAME_HEADER_LEN: usize = 5;

const TAG_CONTROL: u8 = 0x01;
const TAG_DATA: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// Announces a file; always precedes its data frames.
    Meta { name: String, size: u64, mime: String },
    /// Ends the file announced by the last `Meta`.
    Eof,
    Clipboard { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Control(ControlFrame),
    Data(Bytes),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {0} bytes is shorter than the header")]
    Truncated(usize),

    #[error("unknown frame tag {0:#04x}")]
    UnknownTag(u8),

    #[error("header declares {declared} payload bytes but {actual} arrived")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("payload of {0} bytes does not fit a frame")]
    TooLarge(usize),

    #[error("malformed control frame: {0}")]
    Control(#[from] serde_json::Error),
}

impl Frame {
    pub fn control(frame: ControlFrame) -> Self {
        Frame::Control(frame)
    }

    pub fn data(bytes: impl Into<Bytes>) -> Self {
        Frame::Data(bytes.into())
    }

    pub fn encode(&self) -> Result<Bytes, FrameError> {
        match self {
            Frame::Control(control) => {
                let json = serde_json::to_vec(control)?;
                Self::encode_parts(TAG_CONTROL, &json)
            }
            Frame::Data(bytes) => Self::encode_parts(TAG_DATA, bytes),
        }
    }

    pub fn decode(mut raw: Bytes) -> Result<Self, FrameError> {
        if raw.len() < FRAME_HEADER_LEN {
            return Err(FrameError::Truncated(raw.len()));
        }

        let tag = raw.get_u8();
        let declared = raw.get_u32() as usize;
        if declared != raw.len() {
            return Err(FrameError::LengthMismatch {
                declared,
                actual: raw.len(),
            });
        }

        match tag {
            TAG_CONTROL => Ok(Frame::Control(serde_json::from_slice(&raw)?)),
            TAG_DATA => Ok(Frame::Data(raw)),
            other => Err(FrameError::UnknownTag(other)),
        }
    }

    fn encode_parts(tag: u8, payload: &[u8]) -> Result<Bytes, FrameError> {
        let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge(payload.len()))?;

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
        buf.put_u8(tag);
        buf.put_u32(len);
        buf.put_slice(payload);
        Ok(buf.freeze())
    }
}

impl From<ControlFrame> for Frame {
    fn from(frame: ControlFrame) -> Self {
        Frame::Control(frame)
    }
}
