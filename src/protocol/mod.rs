//! Framed request/stream protocol
//!
//! A small multiplexed protocol modelled on RSocket interaction models. Every
//! frame carries a stream ID chosen by the requester; responses reuse it.
//!
//! ```text
//! +-----------+--------+-------------+----------------------+
//! | len (u32) | type   | stream id   | body                 |
//! |           | (u8)   | (u32)       | (len - 5 bytes)      |
//! +-----------+--------+-------------+----------------------+
//! ```
//!
//! Request frames carry a route (`u8` length + UTF-8) followed by the
//! payload. ERROR frames carry a `u32` code followed by a UTF-8 message.
//!
//! ```text
//! Requester                                Responder
//!   |-- REQUEST_RESPONSE(id, route, item) -->|
//!   |<------------- NEXT_COMPLETE(id, item) -|
//!   |                                        |
//!   |-- FIRE_AND_FORGET(id, route, item) --->|   (no reply)
//!   |                                        |
//!   |-- REQUEST_STREAM(id, route) ---------->|
//!   |<-------------------- NEXT(id, item) ---|
//!   |<-------------------- NEXT(id, item) ---|
//!   |<-------------------- COMPLETE(id) -----|
//!   |                                        |
//!   |-- CANCEL(id) ------------------------->|   (ends a stream early)
//! ```

pub mod codec;
pub mod constants;
pub mod frame;

pub use codec::FrameDecoder;
pub use frame::{ErrorCode, Frame, InteractionModel};
