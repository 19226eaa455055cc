//! Model change notifications (§4.4), delivered over a
//! `tokio::sync::broadcast` channel so the Model Store never blocks on a
//! slow presentation-layer consumer.

use tokio::sync::broadcast;

use crate::wire::Pointer;

/// Default channel capacity. Lagging consumers see
/// [`broadcast::error::RecvError::Lagged`] rather than stalling the store.
pub const CHANNEL_CAPACITY: usize = 256;

/// A change to the Model Store, emitted after the mutation that caused it
/// is durably applied (§5's ordering guarantee — never mid-mutation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEvent {
    /// A new buffer was created.
    BufferAdded(Pointer),
    /// A buffer was removed (`_buffer_closing`).
    BufferRemoved(Pointer),
    /// A buffer's metadata changed (title, unread counts, rename, ...).
    BufferChanged(Pointer),
    /// A line was appended to a buffer's history.
    LineAdded {
        /// The owning buffer.
        buffer: Pointer,
        /// The new line.
        line: Pointer,
    },
    /// A buffer's nicklist changed.
    NicksChanged(Pointer),
    /// The hotlist snapshot changed.
    HotlistChanged,
}

/// Owns the sending half of the model's broadcast channel.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ModelEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default channel capacity.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to future model events.
    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Dropped silently if there are no subscribers, per
    /// `tokio::sync::broadcast`'s semantics.
    pub fn emit(&self, event: ModelEvent) {
        let _ = self.tx.send(event);
    }
}
