//! Item client connection
//!
//! Multiplexes requests over one TCP connection. A reader task routes
//! response frames to the waiting request by stream ID; a writer task drains
//! the outbound queue together with an unbounded control queue for CANCEL.
//!
//! The reader never waits on a single stream. Each stream buffers up to
//! `stream_buffer` frames; a stream that falls further behind is cancelled
//! and reports [`Error::StreamOverflow`] once its buffered items are read.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{stream, Stream};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};

use super::config::ClientConfig;
use crate::error::{Error, ProtocolError, Result};
use crate::item::Item;
use crate::protocol::codec::write_frames;
use crate::protocol::{Frame, FrameDecoder, InteractionModel};
use crate::router::Route;

type PendingStreams = Arc<Mutex<Streams>>;

/// Delivery end of one open stream
struct Slot {
    tx: mpsc::Sender<Frame>,
    overflowed: Arc<AtomicBool>,
}

/// Open streams awaiting response frames
#[derive(Default)]
struct Streams {
    open: HashMap<u32, Slot>,
    /// Set once the reader has stopped; no new stream can be registered
    closed: bool,
}

impl Streams {
    fn close(&mut self) {
        self.closed = true;
        self.open.clear();
    }
}

fn lock(pending: &Mutex<Streams>) -> MutexGuard<'_, Streams> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client for the item routes
///
/// # Example
/// ```no_run
/// use itemcast::client::{ClientConfig, ItemClient};
/// use itemcast::Item;
/// use futures::StreamExt;
///
/// # async fn example() -> itemcast::error::Result<()> {
/// let client = ItemClient::connect(ClientConfig::new("127.0.0.1:7000".parse().unwrap())).await?;
///
/// let mut feed = client.monitor().await?;
/// client.fire_and_forget(&Item::new().with_field("name", "lamp")).await?;
///
/// while let Some(item) = feed.next().await {
///     println!("{:?}", item?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ItemClient {
    config: ClientConfig,
    writer_tx: mpsc::Sender<Frame>,
    control_tx: mpsc::UnboundedSender<Frame>,
    pending: PendingStreams,
    next_stream_id: AtomicU32,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl ItemClient {
    /// Connect to an item server
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let socket = tokio::time::timeout(config.connect_timeout, TcpStream::connect(config.addr))
            .await
            .map_err(|_| Error::Timeout)??;
        if config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }

        let (reader, writer) = socket.into_split();
        let (writer_tx, writer_rx) = mpsc::channel(config.write_queue_capacity);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let pending: PendingStreams = Arc::new(Mutex::new(Streams::default()));

        let frames = stream::select(
            ReceiverStream::new(writer_rx),
            UnboundedReceiverStream::new(control_rx),
        );
        let writer_task = tokio::spawn(async move {
            if let Err(e) = write_frames(writer, frames, 64 * 1024).await {
                tracing::debug!(error = %e, "Client writer stopped");
            }
        });

        let reader_task = tokio::spawn(read_responses(
            reader,
            Arc::clone(&pending),
            control_tx.clone(),
            FrameDecoder::with_max_frame_size(config.max_frame_size),
        ));

        tracing::debug!(addr = %config.addr, "Connected to item server");

        Ok(Self {
            config,
            writer_tx,
            control_tx,
            pending,
            next_stream_id: AtomicU32::new(1),
            reader_task,
            writer_task,
        })
    }

    /// Save an item and wait for the stored instance
    pub async fn request_response(&self, item: &Item) -> Result<Item> {
        let payload = self
            .request_response_raw(Route::RequestResponse.as_str(), item.to_bytes()?)
            .await?;
        Ok(Item::from_slice(&payload)?)
    }

    /// Send an item without waiting for any acknowledgement
    pub async fn fire_and_forget(&self, item: &Item) -> Result<()> {
        let frame = Frame::Request {
            interaction: InteractionModel::FireAndForget,
            stream_id: self.allocate_stream_id(),
            route: Route::FireAndForget.as_str().to_string(),
            payload: item.to_bytes()?,
        };
        self.send(frame).await
    }

    /// Stream every stored item
    pub async fn request_stream(&self) -> Result<ResponseStream> {
        self.request_stream_raw(Route::RequestStream.as_str()).await
    }

    /// Subscribe to the live item feed
    pub async fn monitor(&self) -> Result<ResponseStream> {
        self.request_stream_raw(Route::Monitor.as_str()).await
    }

    /// Request-response on an arbitrary route with a raw payload
    ///
    /// Dropping the returned future before the reply arrives cancels the
    /// request.
    pub async fn request_response_raw(&self, route: &str, payload: Bytes) -> Result<Bytes> {
        let (mut guard, mut rx) = self
            .open(InteractionModel::RequestResponse, route, payload)
            .await?;

        let reply = rx.recv().await;
        guard.finish();

        match reply {
            Some(Frame::NextComplete { payload, .. }) | Some(Frame::Next { payload, .. }) => {
                Ok(payload)
            }
            Some(Frame::Error { code, message, .. }) => Err(Error::Remote { code, message }),
            Some(other) => Err(ProtocolError::UnexpectedFrame(format!("{:?}", other)).into()),
            None if guard.overflowed() => Err(Error::StreamOverflow {
                stream_id: guard.stream_id,
            }),
            None => Err(Error::ConnectionClosed),
        }
    }

    /// Request-stream on an arbitrary route
    pub async fn request_stream_raw(&self, route: &str) -> Result<ResponseStream> {
        let (guard, rx) = self
            .open(InteractionModel::RequestStream, route, Bytes::new())
            .await?;

        Ok(ResponseStream {
            rx,
            guard,
            done: false,
        })
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn allocate_stream_id(&self) -> u32 {
        self.next_stream_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn open(
        &self,
        interaction: InteractionModel,
        route: &str,
        payload: Bytes,
    ) -> Result<(StreamGuard, mpsc::Receiver<Frame>)> {
        let stream_id = self.allocate_stream_id();
        let (tx, rx) = mpsc::channel(self.config.stream_buffer);
        let overflowed = Arc::new(AtomicBool::new(false));
        {
            let mut streams = lock(&self.pending);
            if streams.closed {
                return Err(Error::ConnectionClosed);
            }
            streams.open.insert(
                stream_id,
                Slot {
                    tx,
                    overflowed: Arc::clone(&overflowed),
                },
            );
        }

        let mut guard = StreamGuard {
            stream_id,
            pending: Arc::clone(&self.pending),
            control_tx: self.control_tx.clone(),
            overflowed,
            finished: false,
        };

        let frame = Frame::Request {
            interaction,
            stream_id,
            route: route.to_string(),
            payload,
        };

        if let Err(e) = self.send(frame).await {
            // Nothing reached the server, so there is nothing to cancel
            guard.finish();
            return Err(e);
        }

        Ok((guard, rx))
    }

    async fn send(&self, frame: Frame) -> Result<()> {
        self.writer_tx
            .send(frame)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }
}

impl Drop for ItemClient {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
        lock(&self.pending).close();
    }
}

/// Registration of one open stream
///
/// Dropping the guard unregisters the stream and, unless it already ended,
/// queues a CANCEL on the control channel.
struct StreamGuard {
    stream_id: u32,
    pending: PendingStreams,
    control_tx: mpsc::UnboundedSender<Frame>,
    overflowed: Arc<AtomicBool>,
    finished: bool,
}

impl StreamGuard {
    fn finish(&mut self) {
        self.finished = true;
    }

    fn overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Acquire)
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        lock(&self.pending).open.remove(&self.stream_id);

        // The reader already cancelled an overflowed stream
        if !self.finished && !self.overflowed() {
            let _ = self.control_tx.send(Frame::Cancel {
                stream_id: self.stream_id,
            });
        }
    }
}

async fn read_responses(
    mut reader: OwnedReadHalf,
    pending: PendingStreams,
    control_tx: mpsc::UnboundedSender<Frame>,
    decoder: FrameDecoder,
) {
    if let Err(e) = route_responses(&mut reader, &pending, &control_tx, decoder).await {
        tracing::debug!(error = %e, "Client reader stopped");
    }

    // Dropping every sender wakes waiting requests with ConnectionClosed
    lock(&pending).close();
}

async fn route_responses(
    reader: &mut OwnedReadHalf,
    pending: &PendingStreams,
    control_tx: &mpsc::UnboundedSender<Frame>,
    decoder: FrameDecoder,
) -> Result<()> {
    let mut buf = BytesMut::with_capacity(64 * 1024);

    loop {
        while let Some(frame) = decoder.decode(&mut buf)? {
            deliver(pending, control_tx, frame);
        }

        if reader.read_buf(&mut buf).await? == 0 {
            return Ok(());
        }
    }
}

/// Hand a frame to its stream without waiting
fn deliver(pending: &PendingStreams, control_tx: &mpsc::UnboundedSender<Frame>, frame: Frame) {
    let stream_id = frame.stream_id();
    let terminal = frame.is_terminal();

    let mut streams = lock(pending);
    let Some(slot) = streams.open.get(&stream_id) else {
        tracing::trace!(stream_id = stream_id, "Frame for closed stream dropped");
        return;
    };

    match slot.tx.try_send(frame) {
        Ok(()) => {
            if terminal {
                streams.open.remove(&stream_id);
            }
        }
        Err(TrySendError::Full(_)) => {
            if let Some(slot) = streams.open.remove(&stream_id) {
                slot.overflowed.store(true, Ordering::Release);
            }
            drop(streams);

            tracing::warn!(stream_id = stream_id, "Response stream fell behind, cancelling");
            if !terminal {
                let _ = control_tx.send(Frame::Cancel { stream_id });
            }
        }
        Err(TrySendError::Closed(_)) => {
            streams.open.remove(&stream_id);
        }
    }
}

/// Items streamed back for a request-stream or monitor request
///
/// Dropping the stream before it completes cancels the request on the
/// server.
pub struct ResponseStream {
    rx: mpsc::Receiver<Frame>,
    guard: StreamGuard,
    done: bool,
}

impl ResponseStream {
    pub fn stream_id(&self) -> u32 {
        self.guard.stream_id
    }

    /// Whether the stream has ended
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn end(&mut self) {
        self.done = true;
        self.guard.finish();
    }
}

impl Stream for ResponseStream {
    type Item = Result<Item>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let frame = match this.rx.poll_recv(cx) {
            Poll::Ready(frame) => frame,
            Poll::Pending => return Poll::Pending,
        };

        let item = match frame {
            Some(Frame::Next { payload, .. }) => Item::from_slice(&payload).map_err(Error::from),
            Some(Frame::NextComplete { payload, .. }) => {
                this.end();
                Item::from_slice(&payload).map_err(Error::from)
            }
            Some(Frame::Complete { .. }) => {
                this.end();
                return Poll::Ready(None);
            }
            Some(Frame::Error { code, message, .. }) => {
                this.end();
                Err(Error::Remote { code, message })
            }
            Some(other) => Err(ProtocolError::UnexpectedFrame(format!("{:?}", other)).into()),
            None => {
                this.end();
                if this.guard.overflowed() {
                    Err(Error::StreamOverflow {
                        stream_id: this.guard.stream_id,
                    })
                } else {
                    Err(Error::ConnectionClosed)
                }
            }
        };

        Poll::Ready(Some(item))
    }
}
