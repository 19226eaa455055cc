//! Buffer (§3): a chat window's metadata, its ordered line history and
//! its nick list.

use std::collections::HashMap;

use crate::model::line::BufferLine;
use crate::model::nick::Nick;
use crate::wire::Pointer;

/// A single relay-side buffer (a channel, query, or server window).
#[derive(Debug, Clone)]
pub struct Buffer {
    /// The server-minted identity of this buffer.
    pub pointer: Pointer,
    /// The buffer's display number (as shown in `/buffer list`).
    pub number: i32,
    /// The internal buffer name, e.g. `irc.freenode.#rust`.
    pub name: String,
    /// The buffer's title, escape-bearing.
    pub title: String,
    /// Server-defined key/value metadata (`localvar_*`).
    pub local_variables: HashMap<String, String>,
    /// Unread message count.
    pub unread_count: i32,
    /// Unread highlight (mention) count.
    pub highlight_count: i32,
    /// Lines in arrival order (non-decreasing timestamp, §3 invariant).
    pub lines: Vec<BufferLine>,
    /// Nicks present in this buffer, keyed by pointer for O(1) lookup.
    pub nicks: HashMap<Pointer, Nick>,
    /// Whether the initial line backlog fetch has completed.
    pub initial_fetch_done: bool,
    /// The size of the last `fetch_more_lines` request issued for this
    /// buffer, if any (supplement from `original_source`'s
    /// `m_lastRequestedCount`). relaycore records but does not itself
    /// throttle repeated requests — that policy belongs to the caller.
    pub last_requested_count: Option<u32>,
}

impl Buffer {
    /// Create a new, empty buffer for `pointer`.
    pub fn new(pointer: Pointer) -> Self {
        Self {
            pointer,
            number: 0,
            name: String::new(),
            title: String::new(),
            local_variables: HashMap::new(),
            unread_count: 0,
            highlight_count: 0,
            lines: Vec::new(),
            nicks: HashMap::new(),
            initial_fetch_done: false,
            last_requested_count: None,
        }
    }
}
