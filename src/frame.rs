//! Message dispatcher (§4.3): frames length-prefixed server messages and
//! routes each to a handler by its request id tag.

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};

use crate::error::FrameError;
use crate::wire::{Value, WireCursor, decode_value_for_tag};

/// Size of the frame header: 4-byte length + 1-byte compression flag.
pub const HEADER_LEN: usize = 5;

/// One fully decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// The request id this reply corresponds to, or an async event id
    /// (conventionally `_`-prefixed).
    pub request_id: String,
    /// The 3-byte object type tag that precedes the body (commonly `hda`
    /// or `htb`).
    pub tag: [u8; 3],
    /// The decoded body value.
    pub value: Value,
}

impl Frame {
    /// Whether this frame is an asynchronous push rather than a reply to
    /// a specific outstanding request (§4.3's `_`-prefix convention).
    pub fn is_event(&self) -> bool {
        self.request_id.starts_with('_')
    }
}

/// Accumulates socket bytes and yields complete, decoded frames.
///
/// Frames may arrive split across multiple reads (§8 scenario 2); `feed`
/// appends whatever bytes just arrived and `next_frame` pulls out as many
/// complete frames as are available, returning `Ok(None)` once the buffer
/// holds only a partial frame.
pub struct FrameDecoder {
    buf: BytesMut,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Append freshly read bytes to the internal buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Try to decode the next complete frame out of the buffer.
    ///
    /// Returns `Ok(None)` if fewer bytes than a full frame are currently
    /// buffered — the caller should read more from the socket and feed
    /// again. A compressed frame (§1 non-goal) is consumed from the buffer
    /// but reported as [`FrameError::Compressed`] rather than decoded.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let total_len =
            u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if total_len < HEADER_LEN {
            return Err(FrameError::InvalidLength(total_len as u32));
        }
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let compressed = self.buf[4] != 0;
        let body_len = total_len - HEADER_LEN;
        let body_start = HEADER_LEN;
        let body = self.buf[body_start..body_start + body_len].to_vec();
        self.buf.advance(total_len);

        if compressed {
            return Err(FrameError::Compressed);
        }

        decode_body(&body).map(Some)
    }
}

fn decode_body(body: &[u8]) -> Result<Frame, FrameError> {
    let nul = body
        .iter()
        .position(|&b| b == 0)
        .ok_or(FrameError::MissingRequestId)?;
    let request_id = String::from_utf8_lossy(&body[..nul]).into_owned();

    let rest = &body[nul + 1..];
    let mut cursor = WireCursor::new(rest);
    let tag = cursor
        .take_tag()
        .map_err(|_| FrameError::MissingRequestId)?;
    let value = decode_value_for_tag(&tag, &mut cursor)
        .map_err(|_| FrameError::MissingRequestId)?;

    Ok(Frame {
        request_id,
        tag,
        value,
    })
}

/// Routes decoded frames one at a time, guarding against re-entrant
/// dispatch if a handler were to pump the event loop (§4.3's reentrancy
/// guard, realised as an explicit queue per spec.md §9 rather than a
/// boolean flag).
pub struct Dispatcher {
    decoder: FrameDecoder,
    pending: VecDeque<Frame>,
    dispatching: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self {
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            dispatching: false,
        }
    }

    /// Feed freshly read socket bytes and drain as many complete frames
    /// as are available into the pending queue. Malformed frames are
    /// dropped (logged by the caller) without breaking subsequent framing,
    /// since `FrameDecoder::next_frame` already consumed their bytes.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), FrameError> {
        self.decoder.feed(data);
        loop {
            match self.decoder.next_frame() {
                Ok(Some(frame)) => self.pending.push_back(frame),
                Ok(None) => return Ok(()),
                Err(FrameError::Compressed) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Pop the next frame ready for dispatch, unless a handler is already
    /// in progress (`dispatching`), in which case the frame stays queued
    /// and `None` is returned.
    pub fn poll(&mut self) -> Option<Frame> {
        if self.dispatching {
            return None;
        }
        self.pending.pop_front()
    }

    /// Mark dispatch as begun; subsequent `poll` calls defer until
    /// [`Dispatcher::finish`] is called.
    pub fn begin(&mut self) {
        self.dispatching = true;
    }

    /// Mark the current handler as finished, allowing the next queued
    /// frame to be dispatched.
    pub fn finish(&mut self) {
        self.dispatching = false;
    }

    /// True if there is at least one frame waiting to be dispatched.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
