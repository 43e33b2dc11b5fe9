//! Wire protocol constants

/// Size of the big-endian frame length prefix
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Frame type (1 byte) + stream ID (4 bytes)
pub const FRAME_HEADER_SIZE: usize = 5;

/// Default upper bound on a single frame, excluding the length prefix
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Routes are length-prefixed with a single byte
pub const MAX_ROUTE_LEN: usize = u8::MAX as usize;

// Frame types
pub const FRAME_REQUEST_RESPONSE: u8 = 0x04;
pub const FRAME_FIRE_AND_FORGET: u8 = 0x05;
pub const FRAME_REQUEST_STREAM: u8 = 0x06;
pub const FRAME_CANCEL: u8 = 0x09;
pub const FRAME_NEXT: u8 = 0x0A;
pub const FRAME_COMPLETE: u8 = 0x0B;
pub const FRAME_NEXT_COMPLETE: u8 = 0x0C;
pub const FRAME_ERROR: u8 = 0x0D;

// Error codes
pub const ERROR_APPLICATION: u32 = 0x0000_0201;
pub const ERROR_REJECTED: u32 = 0x0000_0202;
pub const ERROR_CANCELED: u32 = 0x0000_0203;
pub const ERROR_INVALID: u32 = 0x0000_0204;
