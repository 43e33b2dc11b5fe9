//! Frame types and encoding

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::*;
use crate::error::ProtocolError;

/// How a request expects to be answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionModel {
    /// One payload in, one payload out
    RequestResponse,
    /// One payload in, nothing out
    FireAndForget,
    /// One payload in, a stream of payloads out
    RequestStream,
}

impl InteractionModel {
    fn frame_type(self) -> u8 {
        match self {
            InteractionModel::RequestResponse => FRAME_REQUEST_RESPONSE,
            InteractionModel::FireAndForget => FRAME_FIRE_AND_FORGET,
            InteractionModel::RequestStream => FRAME_REQUEST_STREAM,
        }
    }
}

impl std::fmt::Display for InteractionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InteractionModel::RequestResponse => "request-response",
            InteractionModel::FireAndForget => "fire-and-forget",
            InteractionModel::RequestStream => "request-stream",
        };
        f.write_str(name)
    }
}

/// Error code carried by an ERROR frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Handler failed (e.g. the store rejected the write)
    ApplicationError,
    /// Responder refused to continue (e.g. subscriber overflow)
    Rejected,
    /// Request was cancelled
    Canceled,
    /// Request was malformed or addressed to an unknown route
    Invalid,
    /// Code not known to this implementation
    Other(u32),
}

impl ErrorCode {
    pub fn from_u32(code: u32) -> Self {
        match code {
            ERROR_APPLICATION => ErrorCode::ApplicationError,
            ERROR_REJECTED => ErrorCode::Rejected,
            ERROR_CANCELED => ErrorCode::Canceled,
            ERROR_INVALID => ErrorCode::Invalid,
            other => ErrorCode::Other(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            ErrorCode::ApplicationError => ERROR_APPLICATION,
            ErrorCode::Rejected => ERROR_REJECTED,
            ErrorCode::Canceled => ERROR_CANCELED,
            ErrorCode::Invalid => ERROR_INVALID,
            ErrorCode::Other(code) => code,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::ApplicationError => f.write_str("APPLICATION_ERROR"),
            ErrorCode::Rejected => f.write_str("REJECTED"),
            ErrorCode::Canceled => f.write_str("CANCELED"),
            ErrorCode::Invalid => f.write_str("INVALID"),
            ErrorCode::Other(code) => write!(f, "0x{:08x}", code),
        }
    }
}

/// A single protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Request addressed to a named route
    Request {
        interaction: InteractionModel,
        stream_id: u32,
        route: String,
        payload: Bytes,
    },
    /// Requester abandons the stream
    Cancel { stream_id: u32 },
    /// One response payload; more may follow
    Next { stream_id: u32, payload: Bytes },
    /// Stream finished successfully
    Complete { stream_id: u32 },
    /// Single response payload that also ends the stream
    NextComplete { stream_id: u32, payload: Bytes },
    /// Stream finished with an error
    Error {
        stream_id: u32,
        code: ErrorCode,
        message: String,
    },
}

impl Frame {
    /// Build an ERROR frame
    pub fn error(stream_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Frame::Error {
            stream_id,
            code,
            message: message.into(),
        }
    }

    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::Request { stream_id, .. }
            | Frame::Cancel { stream_id }
            | Frame::Next { stream_id, .. }
            | Frame::Complete { stream_id }
            | Frame::NextComplete { stream_id, .. }
            | Frame::Error { stream_id, .. } => *stream_id,
        }
    }

    /// Whether this frame ends its stream from the responder's side
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Frame::Complete { .. } | Frame::NextComplete { .. } | Frame::Error { .. }
        )
    }

    fn frame_type(&self) -> u8 {
        match self {
            Frame::Request { interaction, .. } => interaction.frame_type(),
            Frame::Cancel { .. } => FRAME_CANCEL,
            Frame::Next { .. } => FRAME_NEXT,
            Frame::Complete { .. } => FRAME_COMPLETE,
            Frame::NextComplete { .. } => FRAME_NEXT_COMPLETE,
            Frame::Error { .. } => FRAME_ERROR,
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Frame::Request { route, payload, .. } => 1 + route.len() + payload.len(),
            Frame::Cancel { .. } | Frame::Complete { .. } => 0,
            Frame::Next { payload, .. } | Frame::NextComplete { payload, .. } => payload.len(),
            Frame::Error { message, .. } => 4 + message.len(),
        }
    }

    /// Append the encoded frame, length prefix included, to `buf`
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        if let Frame::Request { route, .. } = self {
            if route.len() > MAX_ROUTE_LEN {
                return Err(ProtocolError::RouteTooLong(route.len()));
            }
        }

        let len = FRAME_HEADER_SIZE + self.body_len();
        let len_field = u32::try_from(len).map_err(|_| ProtocolError::FrameTooLarge {
            size: len,
            max: u32::MAX as usize,
        })?;

        buf.reserve(LENGTH_FIELD_SIZE + len);
        buf.put_u32(len_field);
        buf.put_u8(self.frame_type());
        buf.put_u32(self.stream_id());

        match self {
            Frame::Request { route, payload, .. } => {
                buf.put_u8(route.len() as u8);
                buf.put_slice(route.as_bytes());
                buf.put_slice(payload);
            }
            Frame::Cancel { .. } | Frame::Complete { .. } => {}
            Frame::Next { payload, .. } | Frame::NextComplete { payload, .. } => {
                buf.put_slice(payload);
            }
            Frame::Error { code, message, .. } => {
                buf.put_u32(code.as_u32());
                buf.put_slice(message.as_bytes());
            }
        }

        Ok(())
    }

    /// Encode into a fresh buffer
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Parse a frame from its header fields and body
    pub(super) fn parse(frame_type: u8, stream_id: u32, mut body: Bytes) -> Result<Self, ProtocolError> {
        let interaction = match frame_type {
            FRAME_REQUEST_RESPONSE => Some(InteractionModel::RequestResponse),
            FRAME_FIRE_AND_FORGET => Some(InteractionModel::FireAndForget),
            FRAME_REQUEST_STREAM => Some(InteractionModel::RequestStream),
            _ => None,
        };

        if let Some(interaction) = interaction {
            if body.is_empty() {
                return Err(ProtocolError::Truncated("route length"));
            }
            let route_len = body.get_u8() as usize;
            if body.len() < route_len {
                return Err(ProtocolError::Truncated("route"));
            }
            let route_bytes = body.split_to(route_len);
            let route = String::from_utf8(route_bytes.to_vec())
                .map_err(|_| ProtocolError::InvalidUtf8("route"))?;

            return Ok(Frame::Request {
                interaction,
                stream_id,
                route,
                payload: body,
            });
        }

        match frame_type {
            FRAME_CANCEL => Ok(Frame::Cancel { stream_id }),
            FRAME_NEXT => Ok(Frame::Next {
                stream_id,
                payload: body,
            }),
            FRAME_COMPLETE => Ok(Frame::Complete { stream_id }),
            FRAME_NEXT_COMPLETE => Ok(Frame::NextComplete {
                stream_id,
                payload: body,
            }),
            FRAME_ERROR => {
                if body.len() < 4 {
                    return Err(ProtocolError::Truncated("error code"));
                }
                let code = ErrorCode::from_u32(body.get_u32());
                let message = String::from_utf8(body.to_vec())
                    .map_err(|_| ProtocolError::InvalidUtf8("error message"))?;
                Ok(Frame::Error {
                    stream_id,
                    code,
                    message,
                })
            }
            other => Err(ProtocolError::UnknownFrameType(other)),
        }
    }
}
