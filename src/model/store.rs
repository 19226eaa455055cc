//! The Model Store itself (§4.4): a pointer-indexed cache of buffers,
//! lines, nicks and the hotlist, mutated only by the Sync Engine.

use std::collections::HashMap;

use tokio::sync::broadcast;

use crate::error::ModelError;
use crate::model::buffer::Buffer;
use crate::model::event::{EventBus, ModelEvent};
use crate::model::hotlist::HotListItem;
use crate::model::line::BufferLine;
use crate::model::nick::Nick;
use crate::wire::Pointer;

/// The in-memory cache described by §3/§4.4. All mutation methods are
/// idempotent: applying the same snapshot twice leaves the store in the
/// same observable state.
#[derive(Debug)]
pub struct ModelStore {
    buffers: HashMap<Pointer, Buffer>,
    /// Maps a line's pointer to its owning buffer, for O(1) buffer
    /// resolution without scanning every buffer's history.
    line_index: HashMap<Pointer, Pointer>,
    hotlist: Vec<HotListItem>,
    events: EventBus,
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            line_index: HashMap::new(),
            hotlist: Vec::new(),
            events: EventBus::new(),
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.events.subscribe()
    }

    /// Look up a buffer by pointer.
    pub fn buffer(&self, pointer: Pointer) -> Option<&Buffer> {
        self.buffers.get(&pointer)
    }

    /// Iterate all known buffers, in no particular order.
    pub fn buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.values()
    }

    /// Look up a line by pointer, resolving its owning buffer in O(1)
    /// before scanning that buffer's (typically short) line history.
    pub fn line(&self, pointer: Pointer) -> Option<&BufferLine> {
        let buffer_ptr = *self.line_index.get(&pointer)?;
        self.buffers
            .get(&buffer_ptr)?
            .lines
            .iter()
            .find(|l| l.pointer == pointer)
    }

    /// Current hotlist snapshot.
    pub fn hotlist(&self) -> &[HotListItem] {
        &self.hotlist
    }

    /// Create the buffer if it doesn't exist, then apply `f` to it.
    /// Emits [`ModelEvent::BufferAdded`] for a new buffer or
    /// [`ModelEvent::BufferChanged`] for an existing one.
    pub fn upsert_buffer(&mut self, pointer: Pointer, f: impl FnOnce(&mut Buffer)) {
        let is_new = !self.buffers.contains_key(&pointer);
        let buffer = self
            .buffers
            .entry(pointer)
            .or_insert_with(|| Buffer::new(pointer));
        f(buffer);

        self.events.emit(if is_new {
            ModelEvent::BufferAdded(pointer)
        } else {
            ModelEvent::BufferChanged(pointer)
        });
    }

    /// Remove a buffer and all of its lines. Returns `false` if it wasn't
    /// present (a no-op, matching §4.5's "unknown ids are ignored").
    pub fn remove_buffer(&mut self, pointer: Pointer) -> bool {
        let Some(buffer) = self.buffers.remove(&pointer) else {
            return false;
        };
        for line in &buffer.lines {
            self.line_index.remove(&line.pointer);
        }
        self.events.emit(ModelEvent::BufferRemoved(pointer));
        true
    }

    /// Insert a new line, keeping `buffer.lines` ordered by non-decreasing
    /// timestamp (§3 invariant). A no-op if `line.pointer` is already
    /// present — spec.md §4.4 defines this as idempotent insertion, not
    /// create-or-update (unlike [`ModelStore::upsert_buffer`]).
    pub fn upsert_line(&mut self, buffer: Pointer, line: BufferLine) -> Result<(), ModelError> {
        let buf = self
            .buffers
            .get_mut(&buffer)
            .ok_or(ModelError::UnknownBuffer(buffer.0))?;

        if buf.lines.iter().any(|l| l.pointer == line.pointer) {
            return Ok(());
        }

        let pos = buf
            .lines
            .partition_point(|l| l.timestamp <= line.timestamp);
        self.line_index.insert(line.pointer, buffer);
        let line_ptr = line.pointer;
        buf.lines.insert(pos, line);
        self.events.emit(ModelEvent::LineAdded {
            buffer,
            line: line_ptr,
        });
        Ok(())
    }

    /// Insert or update a nick within a buffer's nicklist.
    pub fn upsert_nick(&mut self, buffer: Pointer, nick: Nick) -> Result<(), ModelError> {
        let buf = self
            .buffers
            .get_mut(&buffer)
            .ok_or(ModelError::UnknownBuffer(buffer.0))?;
        buf.nicks.insert(nick.pointer, nick);
        self.events.emit(ModelEvent::NicksChanged(buffer));
        Ok(())
    }

    /// Replace a buffer's entire nicklist wholesale, matching the relay's
    /// `nicklist` snapshot semantics (§4.5: "Rebuilds the Buffer's nick
    /// list"), as opposed to [`ModelStore::upsert_nick`]'s incremental delta.
    pub fn replace_nicks(&mut self, buffer: Pointer, nicks: Vec<Nick>) -> Result<(), ModelError> {
        let buf = self
            .buffers
            .get_mut(&buffer)
            .ok_or(ModelError::UnknownBuffer(buffer.0))?;
        buf.nicks = nicks.into_iter().map(|n| (n.pointer, n)).collect();
        self.events.emit(ModelEvent::NicksChanged(buffer));
        Ok(())
    }

    /// Remove a nick from a buffer's nicklist. A missing buffer is an
    /// error; a missing nick within a known buffer is a silent no-op.
    pub fn remove_nick(&mut self, buffer: Pointer, nick: Pointer) -> Result<(), ModelError> {
        let buf = self
            .buffers
            .get_mut(&buffer)
            .ok_or(ModelError::UnknownBuffer(buffer.0))?;
        if buf.nicks.remove(&nick).is_some() {
            self.events.emit(ModelEvent::NicksChanged(buffer));
        }
        Ok(())
    }

    /// Replace the hotlist wholesale — the relay always sends a full
    /// snapshot rather than a diff.
    pub fn set_hotlist(&mut self, items: Vec<HotListItem>) {
        self.hotlist = items;
        self.events.emit(ModelEvent::HotlistChanged);
    }

    /// Drop all cached state (used when reconnecting to a relay that may
    /// have a different buffer set). No event is emitted; callers treat
    /// a fresh connection as starting the resync handshake from scratch.
    pub fn clear_all(&mut self) {
        self.buffers.clear();
        self.line_index.clear();
        self.hotlist.clear();
    }

    /// Drop every buffer (and their lines) without touching the hotlist,
    /// used by the `buffers` snapshot handler (§4.5) before it upserts a
    /// fresh listing. No event is emitted, matching [`ModelStore::clear_all`].
    pub fn clear_buffers(&mut self) {
        self.buffers.clear();
        self.line_index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::segment;

    fn line(pointer: u64, timestamp: i64) -> BufferLine {
        BufferLine {
            pointer: Pointer(pointer),
            buffer: Pointer(1),
            timestamp,
            displayed: true,
            highlight: false,
            tags: Vec::new(),
            prefix: "nick".into(),
            message: "hello".into(),
            segments: segment("hello"),
        }
    }

    #[test]
    fn upserting_a_buffer_twice_reuses_it() {
        let mut store = ModelStore::new();
        store.upsert_buffer(Pointer(1), |b| b.name = "a".into());
        store.upsert_buffer(Pointer(1), |b| b.title = "A Title".into());
        let buf = store.buffer(Pointer(1)).unwrap();
        assert_eq!(buf.name, "a");
        assert_eq!(buf.title, "A Title");
        assert_eq!(store.buffers().count(), 1);
    }

    #[test]
    fn lines_stay_ordered_by_timestamp() {
        let mut store = ModelStore::new();
        store.upsert_buffer(Pointer(1), |_| {});
        store.upsert_line(Pointer(1), line(10, 100)).unwrap();
        store.upsert_line(Pointer(1), line(11, 50)).unwrap();
        store.upsert_line(Pointer(1), line(12, 75)).unwrap();

        let timestamps: Vec<i64> = store
            .buffer(Pointer(1))
            .unwrap()
            .lines
            .iter()
            .map(|l| l.timestamp)
            .collect();
        assert_eq!(timestamps, vec![50, 75, 100]);
    }

    #[test]
    fn line_lookup_resolves_owning_buffer() {
        let mut store = ModelStore::new();
        store.upsert_buffer(Pointer(1), |_| {});
        store.upsert_line(Pointer(1), line(10, 100)).unwrap();
        assert_eq!(store.line(Pointer(10)).unwrap().buffer, Pointer(1));
    }

    #[test]
    fn line_for_unknown_buffer_is_an_error() {
        let mut store = ModelStore::new();
        let err = store.upsert_line(Pointer(99), line(10, 100)).unwrap_err();
        assert!(matches!(err, ModelError::UnknownBuffer(99)));
    }

    #[test]
    fn applying_same_snapshot_twice_is_idempotent() {
        let mut store = ModelStore::new();
        store.upsert_buffer(Pointer(1), |b| {
            b.name = "a".into();
            b.number = 3;
        });
        store.upsert_line(Pointer(1), line(10, 100)).unwrap();

        let before = store.buffer(Pointer(1)).unwrap().clone();

        store.upsert_buffer(Pointer(1), |b| {
            b.name = "a".into();
            b.number = 3;
        });
        store.upsert_line(Pointer(1), line(10, 100)).unwrap();

        let after = store.buffer(Pointer(1)).unwrap();
        assert_eq!(before.name, after.name);
        assert_eq!(before.number, after.number);
        assert_eq!(before.lines.len(), after.lines.len());
    }

    #[test]
    fn upserting_an_already_present_line_is_a_no_op_even_with_different_fields() {
        let mut store = ModelStore::new();
        store.upsert_buffer(Pointer(1), |_| {});
        store.upsert_line(Pointer(1), line(10, 100)).unwrap();

        let mut changed = line(10, 999);
        changed.message = "edited".into();
        changed.prefix = "someone-else".into();
        store.upsert_line(Pointer(1), changed).unwrap();

        let buf = store.buffer(Pointer(1)).unwrap();
        assert_eq!(buf.lines.len(), 1);
        assert_eq!(buf.lines[0].timestamp, 100);
        assert_eq!(buf.lines[0].message, "hello");
        assert_eq!(buf.lines[0].prefix, "nick");
    }

    #[test]
    fn removing_a_buffer_drops_its_lines_from_the_index() {
        let mut store = ModelStore::new();
        store.upsert_buffer(Pointer(1), |_| {});
        store.upsert_line(Pointer(1), line(10, 100)).unwrap();
        assert!(store.remove_buffer(Pointer(1)));
        assert!(store.line(Pointer(10)).is_none());
        assert!(!store.remove_buffer(Pointer(1)));
    }

    #[tokio::test]
    async fn events_are_emitted_after_mutation() {
        let mut store = ModelStore::new();
        let mut rx = store.subscribe();
        store.upsert_buffer(Pointer(1), |b| b.name = "a".into());
        let event = rx.recv().await.unwrap();
        assert_eq!(event, ModelEvent::BufferAdded(Pointer(1)));
        assert_eq!(store.buffer(Pointer(1)).unwrap().name, "a");
    }
}
