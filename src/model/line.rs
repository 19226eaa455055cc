//! BufferLine (§3): one line of chat history, with its rendered text
//! segmented for presentation (§4.2).

use crate::segment::Segment;
use crate::wire::Pointer;

/// One line within a [`Buffer`](super::Buffer)'s history.
#[derive(Debug, Clone)]
pub struct BufferLine {
    /// The server-minted identity of this line.
    pub pointer: Pointer,
    /// The buffer this line belongs to.
    pub buffer: Pointer,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Whether this line should be rendered at all (server-side filters).
    pub displayed: bool,
    /// Whether this line triggered a highlight/mention.
    pub highlight: bool,
    /// Server-assigned tags, in declared order.
    pub tags: Vec<String>,
    /// The rendered prefix (nick or marker), escape-bearing.
    pub prefix: String,
    /// The rendered message body, escape-bearing.
    pub message: String,
    /// `message` split into plain/link/embed/image/video segments (§4.2).
    pub segments: Vec<Segment>,
}
