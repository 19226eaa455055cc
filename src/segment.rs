//! Message segmenter (§4.2): splits rendered message text on URL patterns
//! into plain/link/embed/image/video segments. Classification is
//! heuristic by design (extension/host-based) and sits outside the hard
//! core per spec.md §4.2.

/// The kind of a message segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Ordinary text.
    Plain,
    /// A bare URL with no further classification.
    Link,
    /// A URL recognised as an embeddable resource (e.g. a tweet, a gist).
    Embed,
    /// A URL pointing at an image file.
    Image,
    /// A URL pointing at a video file or stream.
    Video,
}

/// One segment of a rendered message.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// The kind of content this segment carries.
    pub kind: SegmentKind,
    /// The literal text for this segment (the URL itself, for non-plain kinds).
    pub text: String,
    /// A short description for non-plain segments (e.g. link-preview title),
    /// populated by a caller-side fetch; the core never fetches it itself.
    pub summary: Option<String>,
    /// The resolved embeddable resource URL for [`SegmentKind::Embed`]
    /// segments, when it differs from `text` (e.g. an oEmbed target).
    pub embed_url: Option<String>,
}

impl Segment {
    fn plain(text: String) -> Self {
        Self {
            kind: SegmentKind::Plain,
            text,
            summary: None,
            embed_url: None,
        }
    }

    fn url(kind: SegmentKind, text: String) -> Self {
        Self {
            kind,
            text,
            summary: None,
            embed_url: None,
        }
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "svg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv", "avi"];
const EMBED_HOSTS: &[&str] = &["twitter.com", "x.com", "gist.github.com", "youtube.com", "youtu.be"];

/// Split `text` into plain/link/embed/image/video segments.
pub fn segment(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some(start) = find_url_start(rest) {
        if start > 0 {
            segments.push(Segment::plain(rest[..start].to_owned()));
        }
        let url_len = url_len_at(&rest[start..]);
        let url = &rest[start..start + url_len];
        segments.push(Segment::url(classify(url), url.to_owned()));
        rest = &rest[start + url_len..];
    }

    if !rest.is_empty() {
        segments.push(Segment::plain(rest.to_owned()));
    }

    if segments.is_empty() {
        segments.push(Segment::plain(String::new()));
    }

    segments
}

fn find_url_start(text: &str) -> Option<usize> {
    text.find("http://").or_else(|| text.find("https://"))
}

fn url_len_at(text: &str) -> usize {
    text.find(|c: char| c.is_whitespace())
        .unwrap_or(text.len())
}

fn classify(url: &str) -> SegmentKind {
    let lower = url.to_ascii_lowercase();
    if let Some(ext) = extension_of(&lower) {
        if IMAGE_EXTENSIONS.contains(&ext) {
            return SegmentKind::Image;
        }
        if VIDEO_EXTENSIONS.contains(&ext) {
            return SegmentKind::Video;
        }
    }
    if EMBED_HOSTS.iter().any(|host| lower.contains(host)) {
        return SegmentKind::Embed;
    }
    SegmentKind::Link
}

fn extension_of(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('.').next().filter(|ext| ext.len() <= 5 && !ext.contains('/'))
}
