use bytes::BytesMut;
use mithril_protocol::Frame;

/// The world-facing side of a connection actor. The actor owns the socket
/// and the frame codec; world code only enqueues and dequeues.
pub trait Connection: Send + Sync {
    /// Queues encoded bytes for the writer. Never blocks; a full or closed
    /// channel is an error the caller treats as a dead connection.
    fn try_send(&self, bytes: BytesMut) -> anyhow::Result<()>;

    /// Pops one decoded inbound frame, if any. An error means the actor has
    /// terminated and the player should be logged out.
    fn try_recv(&self) -> anyhow::Result<Option<Frame>>;

    /// Asks the actor to shut down after flushing queued writes.
    fn close(&self);
}
