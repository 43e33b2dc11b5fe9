//! Per-connection request handling
//!
//! One reader loop decodes frames and spawns a task per request. All tasks
//! share a bounded outbound queue drained by a dedicated writer task.
//!
//! ```text
//!  socket ──► reader loop ──► spawn(serve_request) ──┐
//!               │  CANCEL ──► abort task             │ frames
//!               │                                    ▼
//!               └───────────────────────── mpsc ──► writer task ──► socket
//! ```
//!
//! When the peer stops sending, streams are aborted and the writer is left to
//! flush replies that are still owed.
//!
//! A slow peer fills the outbound queue, which stalls only the tasks of this
//! connection. A stalled monitor task then falls behind the hub and is
//! disconnected by its lag policy; the hub itself never waits.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Result;
use crate::protocol::codec::write_frames;
use crate::protocol::{ErrorCode, Frame, FrameDecoder, InteractionModel};
use crate::router::{Reply, Router};
use crate::server::config::ServerConfig;
use crate::stats::ServerCounters;
use crate::store::ItemStore;

/// A spawned request task
struct InFlight {
    interaction: InteractionModel,
    task: JoinHandle<()>,
}

pub(crate) struct Connection<S: ItemStore> {
    session_id: u64,
    peer_addr: SocketAddr,
    socket: Option<TcpStream>,
    config: ServerConfig,
    router: Router<S>,
    counters: Arc<ServerCounters>,
    /// Cancellable requests keyed by stream ID
    in_flight: HashMap<u32, InFlight>,
}

impl<S: ItemStore> Connection<S> {
    pub fn new(
        session_id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        router: Router<S>,
        counters: Arc<ServerCounters>,
    ) -> Self {
        Self {
            session_id,
            peer_addr,
            socket: Some(socket),
            config,
            router,
            counters,
            in_flight: HashMap::new(),
        }
    }

    /// Serve requests until the peer stops sending or sends an undecodable frame
    ///
    /// Streams are aborted once reading stops; replies already owed to
    /// request-response requests are flushed for up to `drain_timeout`.
    pub async fn run(&mut self) -> Result<()> {
        let Some(socket) = self.socket.take() else {
            return Ok(());
        };
        let (mut reader, writer) = socket.into_split();

        let (tx, rx) = mpsc::channel(self.config.write_queue_capacity);
        let mut writer_task = tokio::spawn(write_frames(
            writer,
            ReceiverStream::new(rx),
            self.config.write_buffer_size,
        ));

        let result = self.read_loop(&mut reader, &tx).await;

        // Dropping streaming tasks releases their hub subscriptions
        let mut owed = Vec::new();
        for (_, request) in self.in_flight.drain() {
            if request.interaction == InteractionModel::RequestStream {
                request.task.abort();
            } else {
                owed.push(request.task);
            }
        }
        drop(tx);

        // The writer ends once every request task has dropped its sender
        if tokio::time::timeout(self.config.drain_timeout, &mut writer_task)
            .await
            .is_err()
        {
            tracing::debug!(
                session_id = self.session_id,
                pending = owed.len(),
                "Reply drain timed out"
            );
            for task in owed {
                task.abort();
            }
            writer_task.abort();
        }

        result
    }

    async fn read_loop(&mut self, reader: &mut OwnedReadHalf, tx: &mpsc::Sender<Frame>) -> Result<()> {
        let decoder = FrameDecoder::with_max_frame_size(self.config.max_frame_size);
        let mut buf = BytesMut::with_capacity(self.config.read_buffer_size);

        loop {
            while let Some(frame) = decoder.decode(&mut buf)? {
                self.handle_frame(frame, tx);
            }

            if reader.read_buf(&mut buf).await? == 0 {
                tracing::debug!(
                    session_id = self.session_id,
                    peer = %self.peer_addr,
                    "Peer closed connection"
                );
                return Ok(());
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame, tx: &mpsc::Sender<Frame>) {
        match frame {
            Frame::Request {
                interaction,
                stream_id,
                route,
                payload,
            } => {
                self.counters
                    .requests
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                self.in_flight.retain(|_, request| !request.task.is_finished());

                if self.in_flight.contains_key(&stream_id) {
                    tracing::warn!(
                        session_id = self.session_id,
                        stream_id = stream_id,
                        "Stream ID already in use"
                    );
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let _ = tx
                            .send(Frame::error(
                                stream_id,
                                ErrorCode::Invalid,
                                "stream id already in use",
                            ))
                            .await;
                    });
                    return;
                }

                tracing::debug!(
                    session_id = self.session_id,
                    stream_id = stream_id,
                    route = %route,
                    interaction = %interaction,
                    "Request received"
                );

                let task = tokio::spawn(serve_request(
                    self.router.clone(),
                    interaction,
                    stream_id,
                    route,
                    payload,
                    tx.clone(),
                ));

                // Fire-and-forget has nothing to cancel and runs to completion
                if interaction != InteractionModel::FireAndForget {
                    self.in_flight
                        .insert(stream_id, InFlight { interaction, task });
                }
            }
            Frame::Cancel { stream_id } => {
                if let Some(request) = self.in_flight.remove(&stream_id) {
                    request.task.abort();
                    tracing::debug!(
                        session_id = self.session_id,
                        stream_id = stream_id,
                        "Request cancelled"
                    );
                }
            }
            other => {
                tracing::warn!(
                    session_id = self.session_id,
                    frame = ?other,
                    "Ignoring response frame sent by requester"
                );
            }
        }
    }
}

async fn serve_request<S: ItemStore>(
    router: Router<S>,
    interaction: InteractionModel,
    stream_id: u32,
    route: String,
    payload: Bytes,
    tx: mpsc::Sender<Frame>,
) {
    let reply = match router.dispatch(interaction, &route, payload).await {
        Ok(reply) => reply,
        Err(e) if interaction == InteractionModel::FireAndForget => {
            tracing::warn!(route = %route, error = %e, "Fire-and-forget request failed");
            return;
        }
        Err(e) => {
            tracing::debug!(route = %route, error = %e, "Request failed");
            let _ = tx
                .send(Frame::error(stream_id, e.error_code(), e.to_string()))
                .await;
            return;
        }
    };

    match reply {
        Reply::Empty => {}
        Reply::Single(item) => {
            let frame = match item.to_bytes() {
                Ok(payload) => Frame::NextComplete { stream_id, payload },
                Err(e) => Frame::error(stream_id, ErrorCode::ApplicationError, e.to_string()),
            };
            let _ = tx.send(frame).await;
        }
        Reply::Stream(mut stream) => {
            while let Some(result) = stream.next().await {
                let frame = match result.map_err(|e| (e.error_code(), e.to_string())) {
                    Ok(item) => match item.to_bytes() {
                        Ok(payload) => Frame::Next { stream_id, payload },
                        Err(e) => {
                            Frame::error(stream_id, ErrorCode::ApplicationError, e.to_string())
                        }
                    },
                    Err((code, message)) => {
                        tracing::debug!(route = %route, error = %message, "Stream ended with error");
                        Frame::error(stream_id, code, message)
                    }
                };

                let terminal = frame.is_terminal();
                if tx.send(frame).await.is_err() || terminal {
                    return;
                }
            }

            let _ = tx.send(Frame::Complete { stream_id }).await;
        }
    }
}
