use std::sync::Arc;

use anyhow::bail;
use bytes::BytesMut;
use flume::{Receiver, Sender, TryRecvError, TrySendError};
use mithril_protocol::{Frame, FrameDecoder};
use mithril_world::Connection;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::transport::Transport;

const READ_BUF_SIZE: usize = 4096;

/// Decoded frames a client may have queued before the tick drains them.
const INBOUND_QUEUE_FRAMES: usize = 256;

/// Outbound byte batches awaiting the writer; one per flushed tick.
const OUTBOUND_QUEUE_BATCHES: usize = 64;

/// The world-facing handle to a connection actor.
pub(crate) struct ConnectionHandle {
    out_tx: Sender<BytesMut>,
    in_rx: Receiver<Frame>,
    shutdown: Arc<Notify>,
}

impl Connection for ConnectionHandle {
    fn try_send(&self, bytes: BytesMut) -> anyhow::Result<()> {
        match self.out_tx.try_send(bytes) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => bail!("outbound queue full"),
            Err(TrySendError::Disconnected(_)) => bail!("connection closed"),
        }
    }

    fn try_recv(&self) -> anyhow::Result<Option<Frame>> {
        match self.in_rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => bail!("connection closed"),
        }
    }

    fn close(&self) {
        self.shutdown.notify_one();
    }
}

/// Spawns the connection's one logical task and returns the world-facing
/// handle.
///
/// The task parses frames into the bounded inbound queue and drains the
/// outbound queue through the transport. Any fatal error (decode failure,
/// short read, overfull queue) terminates the task, which closes both
/// channels; the tick engine sees the closed channel and enqueues the
/// logout.
pub(crate) fn spawn_actor(
    mut transport: Transport,
    mut decoder: FrameDecoder,
    peer: String,
) -> Arc<dyn Connection> {
    let (out_tx, out_rx) = flume::bounded::<BytesMut>(OUTBOUND_QUEUE_BATCHES);
    let (in_tx, in_rx) = flume::bounded::<Frame>(INBOUND_QUEUE_FRAMES);
    let shutdown = Arc::new(Notify::new());

    let handle = Arc::new(ConnectionHandle {
        out_tx,
        in_rx,
        shutdown: shutdown.clone(),
    });

    tokio::spawn(async move {
        loop {
            // Drain whole frames before suspending on IO so inbound order
            // is preserved.
            loop {
                match decoder.try_next_frame() {
                    Ok(Some(frame)) => {
                        if let Err(e) = in_tx.try_send(frame) {
                            debug!(peer, "inbound queue stalled: {e}");
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(peer, "frame decode failed: {e:#}");
                        return;
                    }
                }
            }

            decoder.reserve(READ_BUF_SIZE);
            let mut read_buf = decoder.take_capacity();

            tokio::select! {
                read = transport.read_buf(&mut read_buf) => {
                    match read {
                        Ok(0) => {
                            debug!(peer, "remote closed");
                            return;
                        }
                        Ok(_) => decoder.queue_bytes(read_buf),
                        Err(e) => {
                            debug!(peer, "read failed: {e:#}");
                            return;
                        }
                    }
                }
                batch = out_rx.recv_async() => {
                    let Ok(batch) = batch else { return };
                    if let Err(e) = transport.write_all(&batch).await {
                        debug!(peer, "write failed: {e:#}");
                        return;
                    }
                    // Whatever else is queued goes out in the same flush.
                    while let Ok(batch) = out_rx.try_recv() {
                        if let Err(e) = transport.write_all(&batch).await {
                            debug!(peer, "write failed: {e:#}");
                            return;
                        }
                    }
                }
                () = shutdown.notified() => {
                    while let Ok(batch) = out_rx.try_recv() {
                        let _ = transport.write_all(&batch).await;
                    }
                    debug!(peer, "connection closed by server");
                    return;
                }
            }
        }
    });

    handle
}
