//! Attribute decoder (§4.2): turns inline colour/attribute escapes
//! embedded in message text into a structured list of styled runs.
//!
//! Grounded on `original_source/src/protocol.cpp`'s `convertColorsToHtml`,
//! reworked as a tagged-run parser per spec.md §9's recommendation rather
//! than inline HTML generation (HTML rendering is still offered via
//! [`Run::escape_html`] for callers that want it).

const SET_COLOUR: u8 = 0x19;
const SET_ATTR: u8 = 0x1A;
const CLEAR_ATTR: u8 = 0x1B;
const RESET_ALL: u8 = 0x1C;

/// One contiguous span of text sharing a single style.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Run {
    /// The literal text content of this run (escapes already removed).
    pub text: String,
    /// The style active for the whole run.
    pub style: Style,
}

/// Foreground/background colour plus boolean attribute flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    /// Foreground colour name, or `None` for the default colour.
    pub fg: Option<Colour>,
    /// Background colour name, or `None` for the default colour.
    pub bg: Option<Colour>,
    /// Bold (`*`).
    pub bold: bool,
    /// Italic (`/`).
    pub italic: bool,
    /// Underline (`_`).
    pub underline: bool,
    /// Reverse video (`!`). The original renderer leaves this a no-op;
    /// relaycore still exposes it since a tagged-run consumer can act on it.
    pub reverse: bool,
}

/// A resolved colour: either a standard palette entry or a degraded
/// extended-colour fallback (§4.2, §9 Open Question).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    /// One of the 17 standard palette entries (0-16).
    Standard(u8),
    /// An extended (256-colour) foreground code, degraded to a fallback hue.
    ExtendedFgFallback,
    /// An extended (256-colour) background code, degraded to a fallback hue.
    ExtendedBgFallback,
}

impl Colour {
    /// Human-readable name, matching `original_source`'s `weechatColors` map
    /// for standard entries and its hard-coded fallback hues otherwise.
    pub fn name(self) -> &'static str {
        match self {
            Colour::Standard(code) => STANDARD_PALETTE
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, name)| *name)
                .unwrap_or("default"),
            Colour::ExtendedFgFallback => "green",
            Colour::ExtendedBgFallback => "red",
        }
    }
}

/// The 17-entry standard colour palette (§4.2).
pub const STANDARD_PALETTE: &[(u8, &str)] = &[
    (0, "default"),
    (1, "black"),
    (2, "dark gray"),
    (3, "dark red"),
    (4, "light red"),
    (5, "dark green"),
    (6, "light green"),
    (7, "brown"),
    (8, "yellow"),
    (9, "dark blue"),
    (10, "light blue"),
    (11, "dark magenta"),
    (12, "light magenta"),
    (13, "dark cyan"),
    (14, "light cyan"),
    (15, "gray"),
    (16, "white"),
];

/// Decode a byte string carrying inline attribute escapes into a list of
/// styled runs. Input must be valid UTF-8 except for the single-byte
/// control sentinels, which never appear inside a multibyte sequence.
pub fn decode(input: &[u8]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut style = Style::default();
    let mut text = String::new();
    let mut i = 0;

    while i < input.len() {
        let b = input[i];
        match b {
            SET_COLOUR => {
                flush(&mut runs, &mut text, style);
                i += 1;
                i = apply_set_colour(input, i, &mut style);
            }
            SET_ATTR => {
                flush(&mut runs, &mut text, style);
                i += 1;
                i = apply_set_attr(input, i, &mut style);
            }
            CLEAR_ATTR => {
                flush(&mut runs, &mut text, style);
                i += 1;
                i = apply_clear_attr(input, i, &mut style);
            }
            RESET_ALL => {
                flush(&mut runs, &mut text, style);
                style = Style::default();
                i += 1;
            }
            _ => {
                let (ch_len, _) = next_char_len(input, i);
                text.push_str(std::str::from_utf8(&input[i..i + ch_len]).unwrap_or(""));
                i += ch_len;
            }
        }
    }
    flush(&mut runs, &mut text, style);
    coalesce(runs)
}

/// Merge adjacent runs that share an identical style into one, so a run
/// boundary reflects an actual style change rather than merely the
/// presence of a control byte (e.g. two back-to-back escapes that resolve
/// to the same colour/attributes produce a single run, matching the
/// original HTML renderer's "only open a new tag when the previous one
/// was closed first" behavior).
fn coalesce(runs: Vec<Run>) -> Vec<Run> {
    let mut out: Vec<Run> = Vec::with_capacity(runs.len());
    for run in runs {
        match out.last_mut() {
            Some(prev) if prev.style == run.style => prev.text.push_str(&run.text),
            _ => out.push(run),
        }
    }
    out
}

fn flush(runs: &mut Vec<Run>, text: &mut String, style: Style) {
    if !text.is_empty() {
        runs.push(Run {
            text: std::mem::take(text),
            style,
        });
    }
}

/// Length in bytes of the UTF-8 sequence starting at `i`.
fn next_char_len(input: &[u8], i: usize) -> (usize, ()) {
    let b = input[i];
    let len = if b & 0b1111_1000 == 0b1111_0000 {
        4
    } else if b & 0b1111_0000 == 0b1110_0000 {
        3
    } else if b & 0b1110_0000 == 0b1100_0000 {
        2
    } else {
        1
    };
    (len.min(input.len() - i).max(1), ())
}

const MODIFIER_CHARS: &[u8] = b"@*!/_|";

fn skip_modifiers(input: &[u8], mut i: usize) -> usize {
    while i < input.len() && MODIFIER_CHARS.contains(&input[i]) {
        i += 1;
    }
    i
}

fn read_digits(input: &[u8], mut i: usize, n: usize) -> (u32, usize) {
    let mut code = 0u32;
    for _ in 0..n {
        if i >= input.len() || !input[i].is_ascii_digit() {
            break;
        }
        code = code * 10 + (input[i] - b'0') as u32;
        i += 1;
    }
    (code, i)
}

/// Apply attribute characters appearing inline (after `0x1A`, `0x1B`, or as
/// colour-escape modifiers). Returns the new cursor position. Terminates
/// (without consuming) on an unrecognised byte.
fn apply_attr_chars(input: &[u8], mut i: usize, style: &mut Style, setting: bool) -> usize {
    while i < input.len() {
        match input[i] {
            b'*' | 0x01 => style.bold = setting,
            b'!' => style.reverse = setting,
            b'/' => style.italic = setting,
            b'_' => style.underline = setting,
            b'|' => {}
            b'@' => {}
            SET_COLOUR | SET_ATTR | CLEAR_ATTR => {
                // Inline re-entry into another escape mode terminates this one.
                break;
            }
            _ => break,
        }
        i += 1;
    }
    i
}

fn apply_set_attr(input: &[u8], i: usize, style: &mut Style) -> usize {
    apply_attr_chars(input, i, style, true)
}

fn apply_clear_attr(input: &[u8], i: usize, style: &mut Style) -> usize {
    apply_attr_chars(input, i, style, false)
}

fn apply_set_colour(input: &[u8], i: usize, style: &mut Style) -> usize {
    if i >= input.len() {
        return i;
    }
    match input[i] {
        b'F' => read_fg(input, i + 1, style),
        b'B' => read_bg(input, i + 1, style),
        b'*' => {
            let i = read_fg_bg_combo(input, i + 1, style);
            i
        }
        b'@' => read_extended_fg(input, i + 1, style),
        RESET_ALL => {
            style.fg = None;
            style.bg = None;
            i + 1
        }
        _ => read_fg(input, i, style),
    }
}

fn read_fg(input: &[u8], i: usize, style: &mut Style) -> usize {
    let i = apply_attr_chars(input, i, style, true);
    if i < input.len() && input[i] == b'@' {
        read_extended_fg(input, i + 1, style)
    } else {
        let (code, i) = read_digits(input, i, 2);
        if let Some(c) = resolve_standard(code) {
            style.fg = Some(c);
        }
        i
    }
}

fn read_bg(input: &[u8], i: usize, style: &mut Style) -> usize {
    let i = apply_attr_chars(input, i, style, true);
    if i < input.len() && input[i] == b'@' {
        let i = i + 1;
        let (_code, i) = read_digits(input, i, 5);
        style.bg = Some(Colour::ExtendedBgFallback);
        i
    } else {
        let (code, i) = read_digits(input, i, 2);
        if let Some(c) = resolve_standard(code) {
            style.bg = Some(c);
        }
        i
    }
}

fn read_extended_fg(input: &[u8], i: usize, style: &mut Style) -> usize {
    let i = apply_attr_chars(input, i, style, true);
    let (_code, i) = read_digits(input, i, 5);
    style.fg = Some(Colour::ExtendedFgFallback);
    i
}

fn read_fg_bg_combo(input: &[u8], i: usize, style: &mut Style) -> usize {
    let i = apply_attr_chars(input, i, style, true);
    let i = if i < input.len() && input[i] == b'@' {
        read_extended_fg(input, i + 1, style)
    } else {
        let (code, i) = read_digits(input, i, 2);
        if let Some(c) = resolve_standard(code) {
            style.fg = Some(c);
        }
        i
    };
    let i = apply_attr_chars(input, i, style, true);
    let i = if i < input.len() && (input[i] == b',' || input[i] == b'~') {
        i + 1
    } else {
        i
    };
    let i = apply_attr_chars(input, i, style, true);
    if i < input.len() && input[i] == b'@' {
        let i = i + 1;
        let (_code, i) = read_digits(input, i, 5);
        style.bg = Some(Colour::ExtendedBgFallback);
        i
    } else {
        let (code, i) = read_digits(input, i, 2);
        if let Some(c) = resolve_standard(code) {
            style.bg = Some(c);
        }
        i
    }
}

/// Resolve a 2-digit standard colour code, or `None` if it falls outside
/// the 0-16 palette — out-of-range codes leave the current colour
/// unchanged rather than resetting to default (§4.2).
fn resolve_standard(code: u32) -> Option<Colour> {
    if code <= 16 {
        Some(Colour::Standard(code as u8))
    } else {
        None
    }
}

/// Plain text content of a run list, with all escapes already stripped —
/// the property exercised by the round-trip test in spec.md §8.
pub fn plain_text(runs: &[Run]) -> String {
    runs.iter().map(|r| r.text.as_str()).collect()
}

/// Render runs as an HTML-like markup string, escaping `< > & " '` in text
/// content (§4.2's output contract, option (b)).
pub fn to_html(runs: &[Run]) -> String {
    let mut out = String::from("<html><body>");
    for run in runs {
        let mut open = String::new();
        let mut close = String::new();
        if let Some(fg) = run.style.fg {
            open += &format!("<font color=\"{}\">", fg.name());
            close = format!("</font>{close}");
        }
        if let Some(bg) = run.style.bg {
            open += &format!("<span style=\"background-color: {}\">", bg.name());
            close = format!("</span>{close}");
        }
        if run.style.bold {
            open += "<b>";
            close = format!("</b>{close}");
        }
        if run.style.italic {
            open += "<i>";
            close = format!("</i>{close}");
        }
        if run.style.underline {
            open += "<u>";
            close = format!("</u>{close}");
        }
        out += &open;
        out += &escape_html(&run.text);
        out += &close;
    }
    out += "</body></html>";
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_round_trip_strips_escapes() {
        let mut input = vec![0x19u8, b'F'];
        input.extend_from_slice(b"05hello");
        input.push(0x1C);
        input.extend_from_slice(b"world");
        let runs = decode(&input);
        assert_eq!(plain_text(&runs), "helloworld");
    }

    #[test]
    fn scenario_5_colours() {
        // "\x19" "F" "05" "hello" "\x1C" "world"
        let mut input = vec![0x19u8, b'F'];
        input.extend_from_slice(b"05hello");
        input.push(0x1C);
        input.extend_from_slice(b"world");
        let runs = decode(&input);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text, "hello");
        assert_eq!(runs[0].style.fg, Some(Colour::Standard(5)));
        assert_eq!(runs[0].style.fg.unwrap().name(), "dark green");
        assert_eq!(runs[1].text, "world");
        assert_eq!(runs[1].style.fg, None);
    }

    #[test]
    fn multibyte_utf8_preserved() {
        let mut input = vec![0x19u8, b'F'];
        input.extend_from_slice(b"05");
        input.extend_from_slice("héllo→".as_bytes());
        let runs = decode(&input);
        assert_eq!(plain_text(&runs), "héllo→");
    }

    #[test]
    fn html_escapes_reserved_chars() {
        let input = b"<script>&\"'".to_vec();
        let runs = decode(&input);
        let html = to_html(&runs);
        assert!(html.contains("&lt;script&gt;&amp;&quot;&apos;"));
    }

    #[test]
    fn extended_colour_degrades_to_fallback() {
        let mut input = vec![0x19u8, b'@'];
        input.extend_from_slice(b"00042");
        input.extend_from_slice(b"x");
        let runs = decode(&input);
        assert_eq!(runs[0].style.fg, Some(Colour::ExtendedFgFallback));
        assert_eq!(runs[0].style.fg.unwrap().name(), "green");
    }

    #[test]
    fn bold_alias_0x01() {
        let mut input = vec![0x1Au8, 0x01];
        input.extend_from_slice(b"bold");
        let runs = decode(&input);
        assert!(runs[0].style.bold);
    }

    #[test]
    fn adjacent_escapes_with_same_resolved_style_coalesce() {
        // Two back-to-back "set foreground 05" escapes around a text
        // boundary resolve to the same style and must not split the run.
        let mut input = vec![0x19u8, b'F'];
        input.extend_from_slice(b"05hello");
        input.push(0x19);
        input.push(b'F');
        input.extend_from_slice(b"05world");
        let runs = decode(&input);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "helloworld");
        assert_eq!(runs[0].style.fg, Some(Colour::Standard(5)));
    }

    #[test]
    fn reset_clears_all() {
        let mut input = vec![0x19u8, b'F'];
        input.extend_from_slice(b"05");
        input.extend_from_slice(b"a");
        input.push(0x1A);
        input.push(b'*');
        input.extend_from_slice(b"b");
        input.push(0x1C);
        input.extend_from_slice(b"c");
        let runs = decode(&input);
        let last = runs.last().unwrap();
        assert_eq!(last.text, "c");
        assert_eq!(last.style.fg, None);
        assert!(!last.style.bold);
    }
}
