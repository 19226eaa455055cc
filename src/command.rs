//! Outbound command grammar (§6): line-based ASCII commands sent to the
//! relay. Builders return the command body without its terminating
//! newline; [`line`] assembles the wire-ready line, optionally prefixed
//! with an explicit request id.

use crate::wire::Pointer;

/// `init password=<passphrase>,compression=off`
pub fn init(passphrase: &str) -> String {
    format!("init password={passphrase},compression=off")
}

/// `hdata buffer:gui_buffers(*) number,name,hidden,title`
pub fn buffers_snapshot() -> String {
    "hdata buffer:gui_buffers(*) number,name,hidden,title".to_owned()
}

/// `hdata buffer:gui_buffers(*)/lines/last_line(-1)/data`
pub fn lines_snapshot() -> String {
    "hdata buffer:gui_buffers(*)/lines/last_line(-1)/data".to_owned()
}

/// `hdata buffer:0x<ptr-hex>/lines/last_line(-<count>)/data`
pub fn fetch_more_lines(buffer: Pointer, count: u32) -> String {
    format!("hdata buffer:0x{buffer}/lines/last_line(-{count})/data")
}

/// `hdata hotlist:gui_hotlist(*)`
pub fn hotlist() -> String {
    "hdata hotlist:gui_hotlist(*)".to_owned()
}

/// `sync`
pub fn sync() -> String {
    "sync".to_owned()
}

/// `nicklist`
pub fn nicklist() -> String {
    "nicklist".to_owned()
}

/// `input 0x<ptr-hex> <user-text>`
pub fn input(buffer: Pointer, text: &str) -> String {
    format!("input 0x{buffer} {text}")
}

/// Assemble a wire-ready command line: an optional `(id) ` request-id
/// prefix, the command body, and the terminating `\n`.
pub fn line(request_id: Option<&str>, body: &str) -> String {
    match request_id {
        Some(id) => format!("({id}) {body}\n"),
        None => format!("{body}\n"),
    }
}
