//! HotListItem (§3): per-buffer unread counts as reported by `gui_hotlist`.

use crate::wire::Pointer;

/// One entry of the relay's hotlist (buffers with unread activity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotListItem {
    /// The buffer this entry refers to.
    pub buffer: Pointer,
    /// Low-priority unread count.
    pub low: i32,
    /// Plain-message unread count.
    pub message: i32,
    /// Private-message unread count.
    pub private: i32,
    /// Highlight (mention) unread count.
    pub highlight: i32,
}
