//! Incremental frame decoder
//!
//! Reads length-prefixed frames out of a growing read buffer. Partial frames
//! are left in place until the rest arrives.

use bytes::{Buf, BytesMut};
use futures::{FutureExt, Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::constants::{DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE, LENGTH_FIELD_SIZE};
use super::frame::Frame;
use crate::error::{self, ProtocolError};

/// Stateless frame decoder with a size limit
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default frame size limit
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Decode the next complete frame from `buf`
    ///
    /// Returns `Ok(None)` when more bytes are needed. Consumed bytes are
    /// removed from `buf`.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if buf.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }
        if len < FRAME_HEADER_SIZE {
            return Err(ProtocolError::Truncated("frame header"));
        }

        let total = LENGTH_FIELD_SIZE + len;
        if buf.len() < total {
            buf.reserve(total - buf.len());
            return Ok(None);
        }

        let mut frame = buf.split_to(total).freeze();
        frame.advance(LENGTH_FIELD_SIZE);
        let frame_type = frame.get_u8();
        let stream_id = frame.get_u32();

        Frame::parse(frame_type, stream_id, frame).map(Some)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain `frames` onto `writer` until the stream ends
///
/// Frames already queued are coalesced into one write, up to
/// `buffer_size` bytes.
pub(crate) async fn write_frames<W, S>(
    mut writer: W,
    mut frames: S,
    buffer_size: usize,
) -> error::Result<()>
where
    W: AsyncWrite + Unpin,
    S: Stream<Item = Frame> + Unpin,
{
    let mut buf = BytesMut::with_capacity(buffer_size);

    while let Some(frame) = frames.next().await {
        frame.encode(&mut buf)?;
        while buf.len() < buffer_size {
            match frames.next().now_or_never() {
                Some(Some(frame)) => frame.encode(&mut buf)?,
                _ => break,
            }
        }

        writer.write_all(&buf).await?;
        buf.clear();
    }

    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    use super::*;
    use crate::protocol::frame::{ErrorCode, InteractionModel};

    fn request() -> Frame {
        Frame::Request {
            interaction: InteractionModel::FireAndForget,
            stream_id: 3,
            route: "newItems.fire-and-forget".into(),
            payload: Bytes::from_static(br#"{"name":"lamp"}"#),
        }
    }

    #[test]
    fn test_decode_needs_more_bytes() {
        let decoder = FrameDecoder::new();
        let encoded = request().to_bytes().unwrap();

        let mut buf = BytesMut::new();
        for chunk in encoded.chunks(3) {
            assert!(buf.len() < encoded.len());
            if let Some(frame) = decoder.decode(&mut buf).unwrap() {
                panic!("decoded early: {:?}", frame);
            }
            buf.extend_from_slice(chunk);
        }

        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(request()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();
        request().encode(&mut buf).unwrap();
        Frame::Complete { stream_id: 3 }.encode(&mut buf).unwrap();
        Frame::error(4, ErrorCode::Rejected, "overflow")
            .encode(&mut buf)
            .unwrap();

        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(request()));
        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Some(Frame::Complete { stream_id: 3 })
        );
        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Some(Frame::error(4, ErrorCode::Rejected, "overflow"))
        );
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_rejects_oversize() {
        let decoder = FrameDecoder::with_max_frame_size(16);
        let mut buf = BytesMut::new();
        request().encode(&mut buf).unwrap();

        assert!(matches!(
            decoder.decode(&mut buf),
            Err(ProtocolError::FrameTooLarge { max: 16, .. })
        ));
    }

    #[tokio::test]
    async fn test_write_frames_until_senders_drop() {
        use tokio::io::AsyncReadExt;

        let (client, mut server) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::channel(8);

        tx.send(request()).await.unwrap();
        tx.send(Frame::Complete { stream_id: 3 }).await.unwrap();
        drop(tx);

        write_frames(client, ReceiverStream::new(rx), 64).await.unwrap();

        let mut raw = Vec::new();
        server.read_to_end(&mut raw).await.unwrap();

        let decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&raw[..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(request()));
        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Some(Frame::Complete { stream_id: 3 })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_rejects_short_header() {
        let decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x02, 0x0B, 0x00][..]);

        assert_eq!(
            decoder.decode(&mut buf),
            Err(ProtocolError::Truncated("frame header"))
        );
    }
}
