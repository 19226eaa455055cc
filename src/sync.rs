//! Sync Engine (§4.5): interprets decoded `HData` replies and asynchronous
//! push events, folding them into the Model Store.
//!
//! **Resolved ambiguity (SPEC_FULL §4.5):** the handshake's `hdata`/`sync`/
//! `nicklist` commands carry no `(id)` prefix, so their replies share an
//! empty request id. Non-`_`-prefixed replies are therefore routed by the
//! decoded `hda`'s `hpath` instead of by request id; `_`-prefixed push
//! events keep request-id routing since the relay always assigns those.

use std::collections::{HashMap, HashSet};

use crate::attribute;
use crate::frame::Frame;
use crate::model::{Buffer, BufferLine, HotListItem, ModelStore, Nick};
use crate::segment;
use crate::wire::{HData, HDataRow, Pointer, Value};

/// Fold one decoded frame into `store`, routing replies by `hpath` and
/// push events by request id (§4.5).
pub fn apply_frame(store: &mut ModelStore, frame: &Frame) {
    if frame.is_event() {
        handle_event(store, frame);
        return;
    }
    match &frame.value {
        Value::HData(hdata) => handle_reply(store, hdata),
        _ => tracing::debug!(
            request_id = %frame.request_id,
            "ignoring non-hdata reply"
        ),
    }
}

fn handle_reply(store: &mut ModelStore, hdata: &HData) {
    match hdata.hpath.as_slice() {
        [a] if a == "buffer" => handle_buffers_snapshot(store, hdata),
        [a] if a == "hotlist" => handle_hotlist(store, hdata),
        [a, b] if a == "buffer" && b == "nicklist_item" => handle_nicklist(store, hdata),
        path if is_lines_path(path) => handle_lines(store, hdata),
        _ => tracing::debug!(hpath = ?hdata.hpath, "unknown hdata reply path; ignoring"),
    }
}

fn handle_event(store: &mut ModelStore, frame: &Frame) {
    let Value::HData(hdata) = &frame.value else {
        tracing::debug!(request_id = %frame.request_id, "ignoring non-hdata event");
        return;
    };
    match frame.request_id.as_str() {
        "_buffer_line_added" => handle_buffer_line_added(store, hdata),
        "_buffer_opened" => handle_buffer_opened(store, hdata),
        "_buffer_closing" => handle_buffer_closing(store, hdata),
        "_buffer_renamed" => handle_buffer_renamed(store, hdata),
        "_buffer_title_changed" => handle_buffer_title_changed(store, hdata),
        "_nicklist" => handle_nicklist(store, hdata),
        "_nicklist_diff" => handle_nicklist_diff(store, hdata),
        "_upgrade" | "_pong" => {}
        other => tracing::debug!(request_id = %other, "unknown event id; ignoring"),
    }
}

fn is_lines_path(hpath: &[String]) -> bool {
    matches!(hpath, [.., a, b, c] if a == "lines" && b == "last_line" && c == "data")
}

// --- field extraction helpers -------------------------------------------

fn str_field(row: &HDataRow, name: &str) -> String {
    row.fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default()
}

/// Run the Attribute Decoder over a field known to carry inline escapes
/// (§4.1's [`crate::wire::ESCAPE_BEARING_KEYS`] set), returning the
/// escape-stripped plain text — the Model Store's string fields have no
/// style channel (§3), so styling is intentionally dropped here.
fn escaped_field(row: &HDataRow, name: &str) -> String {
    debug_assert!(
        crate::wire::ESCAPE_BEARING_KEYS.contains(&name),
        "{name} is not in ESCAPE_BEARING_KEYS; add it there or use str_field instead"
    );
    let raw = str_field(row, name);
    attribute::plain_text(&attribute::decode(raw.as_bytes()))
}

fn int_field(row: &HDataRow, name: &str) -> i32 {
    row.fields.get(name).and_then(Value::as_int).unwrap_or(0)
}

fn char_field(row: &HDataRow, name: &str) -> bool {
    matches!(row.fields.get(name), Some(Value::Char(c)) if *c != 0)
}

fn arr_str_field(row: &HDataRow, name: &str) -> Vec<String> {
    match row.fields.get(name) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_owned).collect(),
        _ => Vec::new(),
    }
}

fn arr_int_field(row: &HDataRow, name: &str) -> Vec<i32> {
    match row.fields.get(name) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_int).collect(),
        _ => Vec::new(),
    }
}

fn local_variables_field(row: &HDataRow) -> HashMap<String, String> {
    match row.fields.get("local_variables") {
        Some(Value::HashTable(pairs)) => pairs.iter().cloned().collect(),
        _ => HashMap::new(),
    }
}

// --- buffer handlers -----------------------------------------------------

fn apply_buffer_fields(b: &mut Buffer, row: &HDataRow) {
    if row.fields.contains_key("number") {
        b.number = int_field(row, "number");
    }
    if row.fields.contains_key("name") {
        b.name = str_field(row, "name");
    }
    if row.fields.contains_key("title") {
        b.title = escaped_field(row, "title");
    }
    if row.fields.contains_key("local_variables") {
        b.local_variables = local_variables_field(row);
    }
}

fn upsert_buffer_rows(store: &mut ModelStore, hdata: &HData) {
    for row in &hdata.rows {
        let Some(pointer) = row.id() else {
            tracing::debug!("buffer row missing identity pointer; skipping");
            continue;
        };
        store.upsert_buffer(pointer, |b| apply_buffer_fields(b, row));
    }
}

fn handle_buffers_snapshot(store: &mut ModelStore, hdata: &HData) {
    store.clear_buffers();
    upsert_buffer_rows(store, hdata);
}

fn handle_buffer_opened(store: &mut ModelStore, hdata: &HData) {
    upsert_buffer_rows(store, hdata);
}

fn handle_buffer_renamed(store: &mut ModelStore, hdata: &HData) {
    upsert_buffer_rows(store, hdata);
}

fn handle_buffer_title_changed(store: &mut ModelStore, hdata: &HData) {
    upsert_buffer_rows(store, hdata);
}

fn handle_buffer_closing(store: &mut ModelStore, hdata: &HData) {
    for row in &hdata.rows {
        if let Some(pointer) = row.id() {
            store.remove_buffer(pointer);
        }
    }
}

// --- line handlers --------------------------------------------------------

fn build_line(pointer: Pointer, buffer: Pointer, row: &HDataRow) -> BufferLine {
    let message = escaped_field(row, "message");
    let segments = segment::segment(&message);
    BufferLine {
        pointer,
        buffer,
        timestamp: row.fields.get("date").and_then(Value::as_time).unwrap_or(0),
        displayed: char_field(row, "displayed"),
        highlight: char_field(row, "highlight"),
        tags: arr_str_field(row, "tags_array"),
        prefix: escaped_field(row, "prefix"),
        message,
        segments,
    }
}

fn handle_lines(store: &mut ModelStore, hdata: &HData) {
    let mut touched = HashSet::new();
    for row in &hdata.rows {
        let (Some(buffer), Some(line_ptr)) = (row.owner(), row.id()) else {
            tracing::debug!("line row missing identity tuple; skipping");
            continue;
        };
        let line = build_line(line_ptr, buffer, row);
        if let Err(e) = store.upsert_line(buffer, line) {
            tracing::debug!(error = %e, buffer = %buffer, "line for unknown buffer");
            continue;
        }
        touched.insert(buffer);
    }
    for buffer in touched {
        store.upsert_buffer(buffer, |b| b.initial_fetch_done = true);
    }
}

fn handle_buffer_line_added(store: &mut ModelStore, hdata: &HData) {
    for row in &hdata.rows {
        let Some(line_ptr) = row.id() else {
            tracing::debug!("_buffer_line_added row missing identity pointer; skipping");
            continue;
        };
        let Some(buffer) = row.fields.get("buffer").and_then(Value::as_pointer) else {
            tracing::debug!("_buffer_line_added row missing buffer field; skipping");
            continue;
        };
        let line = build_line(line_ptr, buffer, row);
        if let Err(e) = store.upsert_line(buffer, line) {
            tracing::debug!(error = %e, buffer = %buffer, "_buffer_line_added for unknown buffer");
        }
    }
}

// --- hotlist handler -------------------------------------------------------

fn handle_hotlist(store: &mut ModelStore, hdata: &HData) {
    let mut items = Vec::with_capacity(hdata.rows.len());
    let mut referenced = HashSet::new();

    for row in &hdata.rows {
        let Some(buffer) = row.fields.get("buffer").and_then(Value::as_pointer) else {
            tracing::debug!("hotlist row missing buffer field; skipping");
            continue;
        };
        let counts = arr_int_field(row, "count");
        let low = counts.first().copied().unwrap_or(0);
        let message = counts.get(1).copied().unwrap_or(0);
        let private = counts.get(2).copied().unwrap_or(0);
        let highlight = counts.get(3).copied().unwrap_or(0);

        referenced.insert(buffer);
        store.upsert_buffer(buffer, |b| {
            b.unread_count = low + message + private;
            b.highlight_count = highlight;
        });
        items.push(HotListItem {
            buffer,
            low,
            message,
            private,
            highlight,
        });
    }

    let stale: Vec<Pointer> = store
        .buffers()
        .map(|b| b.pointer)
        .filter(|p| !referenced.contains(p))
        .collect();
    for buffer in stale {
        store.upsert_buffer(buffer, |b| {
            b.unread_count = 0;
            b.highlight_count = 0;
        });
    }

    store.set_hotlist(items);
}

// --- nicklist handlers -----------------------------------------------------

fn build_nick(pointer: Pointer, row: &HDataRow) -> Nick {
    Nick {
        pointer,
        visible: char_field(row, "visible"),
        group: char_field(row, "group"),
        level: int_field(row, "level"),
        name: str_field(row, "name"),
        colour: str_field(row, "color"),
        prefix: str_field(row, "prefix"),
        prefix_colour: str_field(row, "prefix_color"),
    }
}

fn handle_nicklist(store: &mut ModelStore, hdata: &HData) {
    let mut by_buffer: HashMap<Pointer, Vec<Nick>> = HashMap::new();
    for row in &hdata.rows {
        let (Some(buffer), Some(id)) = (row.owner(), row.id()) else {
            tracing::debug!("nicklist row missing identity tuple; skipping");
            continue;
        };
        by_buffer.entry(buffer).or_default().push(build_nick(id, row));
    }
    for (buffer, nicks) in by_buffer {
        if let Err(e) = store.replace_nicks(buffer, nicks) {
            tracing::debug!(error = %e, buffer = %buffer, "nicklist for unknown buffer");
        }
    }
}

fn handle_nicklist_diff(store: &mut ModelStore, hdata: &HData) {
    for row in &hdata.rows {
        let (Some(buffer), Some(id)) = (row.owner(), row.id()) else {
            tracing::debug!("_nicklist_diff row missing identity tuple; skipping");
            continue;
        };
        let diff = row.fields.get("_diff").and_then(Value::as_str).unwrap_or("");
        let result = match diff {
            "-" => store.remove_nick(buffer, id),
            "+" | "*" => store.upsert_nick(buffer, build_nick(id, row)),
            other => {
                tracing::debug!(diff = other, "unknown _nicklist_diff marker; ignoring");
                continue;
            }
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, buffer = %buffer, "_nicklist_diff for unknown buffer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::wire::HDataRow;

    fn hdata(hpath: &[&str], rows: Vec<HDataRow>) -> HData {
        HData {
            hpath: hpath.iter().map(|s| s.to_string()).collect(),
            keys: Vec::new(),
            rows,
        }
    }

    fn row(pointers: &[u64], fields: Vec<(&str, Value)>) -> HDataRow {
        HDataRow {
            pointers: pointers.iter().map(|p| Pointer(*p)).collect(),
            fields: fields.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
        }
    }

    #[test]
    fn buffers_snapshot_clears_and_upserts() {
        let mut store = ModelStore::new();
        store.upsert_buffer(Pointer(99), |b| b.name = "stale".into());

        let h = hdata(
            &["buffer"],
            vec![row(
                &[1],
                vec![
                    ("number", Value::Int(3)),
                    ("name", Value::Str(Some("irc.freenode.#rust".into()))),
                    ("title", Value::Str(Some("Welcome".into()))),
                ],
            )],
        );
        handle_buffers_snapshot(&mut store, &h);

        assert!(store.buffer(Pointer(99)).is_none());
        let buf = store.buffer(Pointer(1)).unwrap();
        assert_eq!(buf.number, 3);
        assert_eq!(buf.name, "irc.freenode.#rust");
        assert_eq!(buf.title, "Welcome");
    }

    #[test]
    fn lines_insert_ordered_and_mark_initial_fetch_done() {
        let mut store = ModelStore::new();
        store.upsert_buffer(Pointer(10), |_| {});

        let h = hdata(
            &["buffer", "lines", "last_line", "data"],
            vec![
                row(
                    &[10, 1, 1, 20],
                    vec![
                        ("date", Value::Time(200)),
                        ("message", Value::Str(Some("second".into()))),
                    ],
                ),
                row(
                    &[10, 1, 1, 21],
                    vec![
                        ("date", Value::Time(100)),
                        ("message", Value::Str(Some("first".into()))),
                    ],
                ),
            ],
        );
        handle_lines(&mut store, &h);

        let buf = store.buffer(Pointer(10)).unwrap();
        assert!(buf.initial_fetch_done);
        let messages: Vec<&str> = buf.lines.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn hotlist_updates_counts_and_clears_stale() {
        let mut store = ModelStore::new();
        store.upsert_buffer(Pointer(1), |b| {
            b.unread_count = 5;
            b.highlight_count = 1;
        });
        store.upsert_buffer(Pointer(2), |_| {});

        let h = hdata(
            &["hotlist"],
            vec![row(
                &[],
                vec![
                    ("buffer", Value::Pointer(Pointer(2))),
                    (
                        "count",
                        Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(0), Value::Int(3)]),
                    ),
                ],
            )],
        );
        handle_hotlist(&mut store, &h);

        assert_eq!(store.buffer(Pointer(1)).unwrap().unread_count, 0);
        assert_eq!(store.buffer(Pointer(1)).unwrap().highlight_count, 0);
        assert_eq!(store.buffer(Pointer(2)).unwrap().unread_count, 3);
        assert_eq!(store.buffer(Pointer(2)).unwrap().highlight_count, 3);
        assert_eq!(store.hotlist().len(), 1);
    }

    #[test]
    fn nicklist_replaces_wholesale() {
        let mut store = ModelStore::new();
        store.upsert_buffer(Pointer(1), |_| {});
        store
            .upsert_nick(Pointer(1), Nick {
                pointer: Pointer(50),
                visible: true,
                group: false,
                level: 0,
                name: "old".into(),
                colour: String::new(),
                prefix: String::new(),
                prefix_colour: String::new(),
            })
            .unwrap();

        let h = hdata(
            &["buffer", "nicklist_item"],
            vec![row(&[1, 7], vec![("name", Value::Str(Some("alice".into())))])],
        );
        handle_nicklist(&mut store, &h);

        let buf = store.buffer(Pointer(1)).unwrap();
        assert_eq!(buf.nicks.len(), 1);
        assert_eq!(buf.nicks.get(&Pointer(7)).unwrap().name, "alice");
    }

    #[test]
    fn nicklist_diff_adds_and_removes() {
        let mut store = ModelStore::new();
        store.upsert_buffer(Pointer(1), |_| {});

        let add = hdata(
            &["buffer", "nicklist_item"],
            vec![row(
                &[1, 7],
                vec![("_diff", Value::Str(Some("+".into()))), ("name", Value::Str(Some("bob".into())))],
            )],
        );
        handle_nicklist_diff(&mut store, &add);
        assert_eq!(store.buffer(Pointer(1)).unwrap().nicks.len(), 1);

        let remove = hdata(
            &["buffer", "nicklist_item"],
            vec![row(&[1, 7], vec![("_diff", Value::Str(Some("-".into())))])],
        );
        handle_nicklist_diff(&mut store, &remove);
        assert!(store.buffer(Pointer(1)).unwrap().nicks.is_empty());
    }

    #[test]
    fn buffer_closing_removes_buffer() {
        let mut store = ModelStore::new();
        store.upsert_buffer(Pointer(1), |_| {});

        let h = hdata(&["buffer"], vec![row(&[1], vec![])]);
        handle_buffer_closing(&mut store, &h);
        assert!(store.buffer(Pointer(1)).is_none());
    }

    #[test]
    fn unknown_event_id_is_ignored_not_an_error() {
        let mut store = ModelStore::new();
        let frame = Frame {
            request_id: "_something_new".into(),
            tag: *b"hda",
            value: Value::HData(hdata(&["buffer"], vec![])),
        };
        apply_frame(&mut store, &frame);
        assert_eq!(store.buffers().count(), 0);
    }
}
