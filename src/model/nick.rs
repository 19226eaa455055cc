//! Nick (§3): one entry in a buffer's nick list.

use crate::wire::Pointer;

/// One nick (or nick group heading) in a buffer's nicklist.
#[derive(Debug, Clone)]
pub struct Nick {
    /// The server-minted identity of this nick entry.
    pub pointer: Pointer,
    /// Whether this entry is currently visible in the nicklist.
    pub visible: bool,
    /// Whether this entry is a group heading rather than a nick itself.
    pub group: bool,
    /// Sort/privilege level (lower sorts first).
    pub level: i32,
    /// The nick's display name.
    pub name: String,
    /// The colour name assigned to the nick's name.
    pub colour: String,
    /// The nick's mode prefix (e.g. `@`, `+`), if any.
    pub prefix: String,
    /// The colour name for `prefix`.
    pub prefix_colour: String,
}
