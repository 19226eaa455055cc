//! End-to-end tests driving the frame decoder and Sync Engine together
//! over a real async byte stream, without a live relay server.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use relaycore::frame::{Dispatcher, Frame};
use relaycore::model::ModelStore;
use relaycore::sync;
use relaycore::wire::Pointer;

/// Surfaces `tracing::debug!` output (e.g. the Sync Engine's "unknown
/// event id" logging) under `RUST_LOG=debug` when these tests run with
/// `--nocapture`, without requiring every test to set it up itself.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn encode_str(s: &str) -> Vec<u8> {
    let mut out = (s.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(s.as_bytes());
    out
}

fn encode_ptr(hex: &str) -> Vec<u8> {
    let mut out = vec![hex.len() as u8];
    out.extend_from_slice(hex.as_bytes());
    out
}

/// Encode a minimal `buffer` snapshot `hda` frame body: one row with
/// `number`, `name` and `title` fields.
fn encode_buffers_snapshot_frame(request_id: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(request_id.as_bytes());
    body.push(0);
    body.extend_from_slice(b"hda");

    body.extend(encode_str("buffer"));
    body.extend(encode_str("number:int,name:str,title:str"));
    body.extend(1u32.to_be_bytes()); // row count

    body.extend(encode_ptr("1")); // identity pointer
    body.extend(3i32.to_be_bytes()); // number
    body.extend(encode_str("irc.freenode.#rust")); // name
    body.extend(encode_str("Welcome")); // title

    let total_len = (5 + body.len()) as u32;
    let mut frame = total_len.to_be_bytes().to_vec();
    frame.push(0); // uncompressed
    frame.extend_from_slice(&body);
    frame
}

async fn read_into(
    reader: &mut (impl AsyncRead + Unpin),
    dispatcher: &mut Dispatcher,
) -> Vec<Frame> {
    let mut buf = vec![0u8; 4096];
    let n = reader.read(&mut buf).await.unwrap();
    dispatcher.feed(&buf[..n]).unwrap();
    let mut frames = Vec::new();
    while let Some(f) = dispatcher.poll() {
        dispatcher.begin();
        frames.push(f);
        dispatcher.finish();
    }
    frames
}

#[tokio::test]
async fn frame_split_across_reads_still_updates_the_model() {
    init_tracing();
    let (mut client, mut server) = tokio::io::duplex(16);

    let frame_bytes = encode_buffers_snapshot_frame("");
    let (first, second) = frame_bytes.split_at(frame_bytes.len() / 2);

    let writer = tokio::spawn(async move {
        server.write_all(first).await.unwrap();
        server.write_all(second).await.unwrap();
    });

    let mut dispatcher = Dispatcher::new();
    let mut store = ModelStore::new();
    let mut frames = Vec::new();

    // The duplex's 16-byte internal buffer forces several partial reads
    // before a complete frame is assembled, exercising the same codepath
    // a socket split across TCP segments would.
    while frames.is_empty() {
        frames.extend(read_into(&mut client, &mut dispatcher).await);
    }
    writer.await.unwrap();

    for frame in &frames {
        sync::apply_frame(&mut store, frame);
    }

    let buf = store.buffer(Pointer(1)).expect("buffer should be present");
    assert_eq!(buf.number, 3);
    assert_eq!(buf.name, "irc.freenode.#rust");
    assert_eq!(buf.title, "Welcome");
}

#[tokio::test]
async fn applying_the_same_snapshot_twice_is_idempotent() {
    let mut store = ModelStore::new();
    let frame_bytes = encode_buffers_snapshot_frame("");
    let mut decoder = Dispatcher::new();
    decoder.feed(&frame_bytes).unwrap();
    let frame = decoder.poll().unwrap();

    sync::apply_frame(&mut store, &frame);
    let before = store.buffer(Pointer(1)).unwrap().clone();
    sync::apply_frame(&mut store, &frame);
    let after = store.buffer(Pointer(1)).unwrap();

    assert_eq!(before.name, after.name);
    assert_eq!(store.buffers().count(), 1);
}
