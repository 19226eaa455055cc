//! Connection Controller (§4.6): the state machine driving connect,
//! authenticate, sync, reconnect and timeout over a single cooperative
//! task (§5).

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{
    split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time::{interval, sleep, Instant, Interval, MissedTickBehavior};

use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::command;
use crate::config::{Settings, SettingsStore};
use crate::error::ConnectionError;
use crate::frame::Dispatcher;
use crate::model::{ModelEvent, ModelStore};
use crate::sync as sync_engine;
use crate::wire::Pointer;

#[cfg(feature = "tls")]
use tokio_rustls::{client::TlsStream, rustls::pki_types::ServerName};

/// Response timeout applied uniformly to every outstanding request-response
/// round trip (SPEC_FULL §4.6 resolves spec.md §9's Open Question this way).
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Initial reconnect backoff.
const INITIAL_RECONNECT: Duration = Duration::from_millis(1000);
/// Reconnect backoff ceiling.
const MAX_RECONNECT: Duration = Duration::from_millis(5000);
/// Hotlist poll interval.
const HOTLIST_INTERVAL: Duration = Duration::from_secs(1);
/// Socket read buffer size.
const READ_BUF_LEN: usize = 16 * 1024;

/// The Connection Controller's state (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Settings are incomplete; no connection attempted.
    Unconfigured,
    /// A TCP (or TLS) connect attempt is underway.
    Connecting,
    /// Socket open, handshake sent, sync active.
    Connected,
    /// Socket closed cleanly or by timeout; awaiting reconnect.
    Disconnected,
    /// Socket closed due to an error; awaiting reconnect.
    Error,
}

/// Either a plain TCP socket or a TLS-wrapped one, behind one `AsyncRead`
/// + `AsyncWrite` type so the rest of the controller is transport-agnostic.
enum Socket {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Socket {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Plain(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Socket::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Socket {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Socket::Plain(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Socket::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Plain(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls")]
            Socket::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Plain(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Socket::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

async fn open_socket(settings: &Settings) -> Result<Socket, ConnectionError> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let tcp = TcpStream::connect(&addr)
        .await
        .map_err(ConnectionError::Connect)?;
    let _ = tcp.set_nodelay(true);

    if !settings.encrypted {
        return Ok(Socket::Plain(tcp));
    }

    #[cfg(feature = "tls")]
    {
        let connector = crate::tls::connector().map_err(|e| ConnectionError::Tls(e.to_string()))?;
        let server_name = ServerName::try_from(settings.host.clone())
            .map_err(|_| ConnectionError::Tls(format!("invalid DNS name: {}", settings.host)))?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ConnectionError::Tls(e.to_string()))?;
        Ok(Socket::Tls(Box::new(tls)))
    }
    #[cfg(not(feature = "tls"))]
    {
        Err(ConnectionError::Tls(
            "TLS requested but the `tls` feature is disabled".into(),
        ))
    }
}

/// The exact six handshake lines (§8 scenario 1), in order.
fn handshake_lines(passphrase: &str) -> [String; 6] {
    [
        command::line(None, &command::init(passphrase)),
        command::line(None, &command::buffers_snapshot()),
        command::line(None, &command::lines_snapshot()),
        command::line(None, &command::hotlist()),
        command::line(None, &command::sync()),
        command::line(None, &command::nicklist()),
    ]
}

/// A handle to a running [`ConnectionController`]: the caller-facing half
/// of §6's Model interface (`send_input`, `fetch_more_lines`, model reads,
/// change notifications) plus settings control.
#[derive(Clone)]
pub struct Connection {
    store: Arc<RwLock<ModelStore>>,
    settings: Arc<SettingsStore>,
    commands: mpsc::UnboundedSender<String>,
}

impl Connection {
    /// Current connection settings.
    pub fn settings(&self) -> Settings {
        self.settings.get()
    }

    /// Replace the connection settings; the controller reconnects in
    /// response if they changed meaningfully (§4.6).
    pub fn set_settings(&self, settings: Settings) {
        self.settings.set(settings);
    }

    /// Read access to the Model Store.
    pub async fn store(&self) -> tokio::sync::RwLockReadGuard<'_, ModelStore> {
        self.store.read().await
    }

    /// Subscribe to Model Store change notifications.
    pub async fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.store.read().await.subscribe()
    }

    /// Subscribe to Model Store change notifications as a [`Stream`], for
    /// callers that want to combine them with other async sources rather
    /// than polling `recv()` directly.
    ///
    /// [`Stream`]: tokio_stream::Stream
    pub async fn event_stream(
        &self,
    ) -> impl tokio_stream::Stream<Item = Result<ModelEvent, BroadcastStreamRecvError>> {
        BroadcastStream::new(self.subscribe().await)
    }

    /// Send user input to a buffer (`input 0x<ptr> <text>`, §6).
    pub fn send_input(&self, buffer: Pointer, text: &str) {
        let _ = self
            .commands
            .send(command::line(None, &command::input(buffer, text)));
    }

    /// Request `count` more lines of history for `buffer` (pagination, §6).
    /// Records `count` on the buffer as `last_requested_count` so a caller
    /// can deduplicate or throttle repeated pagination requests against the
    /// same buffer (SPEC_FULL §3's supplement from `original_source`'s
    /// `m_lastRequestedCount`; relaycore itself applies no such policy).
    pub async fn fetch_more_lines(&self, buffer: Pointer, count: u32) {
        self.store
            .write()
            .await
            .upsert_buffer(buffer, |b| b.last_requested_count = Some(count));
        let _ = self
            .commands
            .send(command::line(None, &command::fetch_more_lines(buffer, count)));
    }
}

/// The runnable half: owns the socket and drives the state machine.
/// Constructed together with its [`Connection`] handle by [`connect`].
pub struct ConnectionController {
    settings_rx: watch::Receiver<Settings>,
    store: Arc<RwLock<ModelStore>>,
    commands_rx: mpsc::UnboundedReceiver<String>,
    state: State,
}

/// Create a [`Connection`] handle paired with the [`ConnectionController`]
/// that drives it. The caller is expected to `tokio::spawn` (or otherwise
/// poll) [`ConnectionController::run`].
pub fn connect(initial: Settings) -> (Connection, ConnectionController) {
    let settings = Arc::new(SettingsStore::new(initial));
    let settings_rx = settings.subscribe();
    let store = Arc::new(RwLock::new(ModelStore::new()));
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    let handle = Connection {
        store: store.clone(),
        settings,
        commands: commands_tx,
    };
    let controller = ConnectionController {
        settings_rx,
        store,
        commands_rx,
        state: State::Unconfigured,
    };
    (handle, controller)
}

impl ConnectionController {
    /// Current state, for diagnostics/tests.
    pub fn state(&self) -> State {
        self.state
    }

    /// Drive the state machine forever. Returns only if the paired
    /// [`Connection`] handle (and every clone) has been dropped, since no
    /// further settings changes or commands can ever arrive (§7: no error
    /// is otherwise fatal to the process).
    pub async fn run(mut self) {
        let mut dispatcher = Dispatcher::new();
        let mut halves: Option<(ReadHalf<Socket>, WriteHalf<Socket>)> = None;
        let mut reconnect_interval = INITIAL_RECONNECT;
        let mut awaiting_since: Option<Instant> = None;
        // Persisted across `Connected` turns of the select loop below (like
        // `awaiting_since`) so a busy socket can't starve the periodic poll
        // by always winning the race before this tick fires.
        let mut hotlist_timer: Option<Interval> = None;

        loop {
            match self.state {
                State::Unconfigured => {
                    let settings = self.settings_rx.borrow().clone();
                    if settings.is_complete() {
                        self.state = State::Connecting;
                        continue;
                    }
                    if self.settings_rx.changed().await.is_err() {
                        return;
                    }
                }

                State::Connecting => {
                    let settings = self.settings_rx.borrow().clone();
                    tracing::info!(host = %settings.host, port = settings.port, "connecting");
                    match open_socket(&settings).await {
                        Ok(s) => {
                            self.store.write().await.clear_all();
                            let mut s = s;
                            let mut failed = false;
                            for line in handshake_lines(&settings.passphrase) {
                                if let Err(e) = s.write_all(line.as_bytes()).await {
                                    tracing::warn!(error = %e, "failed to write handshake");
                                    failed = true;
                                    break;
                                }
                            }
                            if failed {
                                self.state = State::Error;
                            } else {
                                halves = Some(split(s));
                                dispatcher = Dispatcher::new();
                                reconnect_interval = INITIAL_RECONNECT;
                                awaiting_since = Some(Instant::now());
                                let mut timer = interval(HOTLIST_INTERVAL);
                                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                                hotlist_timer = Some(timer);
                                self.state = State::Connected;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "connect failed");
                            self.state = State::Error;
                        }
                    }
                }

                State::Connected => {
                    let Some((reader, writer)) = halves.as_mut() else {
                        self.state = State::Error;
                        continue;
                    };
                    let Some(timer) = hotlist_timer.as_mut() else {
                        self.state = State::Error;
                        continue;
                    };
                    let remaining = awaiting_since
                        .map(|since| RESPONSE_TIMEOUT.saturating_sub(since.elapsed()))
                        .unwrap_or(RESPONSE_TIMEOUT);

                    let mut buf = vec![0u8; READ_BUF_LEN];
                    tokio::select! {
                        read = reader.read(&mut buf) => {
                            match read {
                                Ok(0) => {
                                    tracing::info!("remote closed the connection");
                                    halves = None;
                                    hotlist_timer = None;
                                    self.state = State::Disconnected;
                                }
                                Ok(n) => {
                                    awaiting_since = None;
                                    if let Err(e) = dispatcher.feed(&buf[..n]) {
                                        tracing::warn!(error = %e, "frame framing error; discarding");
                                    }
                                    self.drain_dispatcher(&mut dispatcher).await;
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "socket read error");
                                    halves = None;
                                    hotlist_timer = None;
                                    self.state = State::Error;
                                }
                            }
                        }
                        Some(cmd) = self.commands_rx.recv() => {
                            if let Err(e) = writer.write_all(cmd.as_bytes()).await {
                                tracing::warn!(error = %e, "socket write error");
                                halves = None;
                                hotlist_timer = None;
                                self.state = State::Error;
                            } else {
                                awaiting_since = Some(Instant::now());
                            }
                        }
                        _ = timer.tick() => {
                            let line = command::line(None, &command::hotlist());
                            if let Err(e) = writer.write_all(line.as_bytes()).await {
                                tracing::warn!(error = %e, "hotlist poll write failed");
                                halves = None;
                                hotlist_timer = None;
                                self.state = State::Error;
                            }
                        }
                        _ = sleep(remaining), if awaiting_since.is_some() => {
                            tracing::warn!("response timeout; reconnecting");
                            halves = None;
                            hotlist_timer = None;
                            self.state = State::Disconnected;
                        }
                        changed = self.settings_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            tracing::info!("settings changed while connected; reconnecting");
                            halves = None;
                            hotlist_timer = None;
                            self.state = State::Connecting;
                        }
                    }
                }

                State::Disconnected | State::Error => {
                    tracing::info!(delay_ms = reconnect_interval.as_millis() as u64, "scheduling reconnect");
                    sleep(reconnect_interval).await;
                    reconnect_interval = (reconnect_interval * 2).min(MAX_RECONNECT);

                    let settings = self.settings_rx.borrow().clone();
                    self.state = if settings.is_complete() {
                        State::Connecting
                    } else {
                        State::Unconfigured
                    };
                }
            }
        }
    }

    /// Dispatch every frame currently queued, honoring the reentrancy
    /// guard (§4.3): only one frame is "in flight" to the Sync Engine at
    /// a time, though nothing here actually yields mid-handler.
    async fn drain_dispatcher(&self, dispatcher: &mut Dispatcher) {
        while let Some(frame) = dispatcher.poll() {
            dispatcher.begin();
            {
                let mut store = self.store.write().await;
                sync_engine::apply_frame(&mut store, &frame);
            }
            dispatcher.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn handshake_matches_scenario_1() {
        let lines = handshake_lines("secret");
        let joined = lines.concat();
        assert_eq!(
            joined,
            concat!(
                "init password=secret,compression=off\n",
                "hdata buffer:gui_buffers(*) number,name,hidden,title\n",
                "hdata buffer:gui_buffers(*)/lines/last_line(-1)/data\n",
                "hdata hotlist:gui_hotlist(*)\n",
                "sync\n",
                "nicklist\n",
            )
        );
    }

    /// Regression test for the hotlist-poll starvation bug: a `sleep`
    /// future rebuilt fresh on every `select!` re-entry can never
    /// accumulate enough elapsed time to fire if something else always
    /// completes the surrounding select first, whereas a persisted
    /// `Interval`'s deadline survives across re-entries (§4.6's "repeating,
    /// 1000 ms" hotlist timer).
    #[tokio::test(start_paused = true)]
    async fn persisted_interval_fires_despite_busy_select_unlike_a_fresh_sleep() {
        async fn drive_with_fresh_sleep(iterations: u32) -> bool {
            for _ in 0..iterations {
                tokio::select! {
                    _ = tokio::time::sleep(HOTLIST_INTERVAL) => { return true; }
                    _ = tokio::time::sleep(Duration::from_millis(1)) => {}
                }
            }
            false
        }

        async fn drive_with_persisted_interval(iterations: u32) -> bool {
            let mut timer = interval(HOTLIST_INTERVAL);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            for _ in 0..iterations {
                tokio::select! {
                    _ = timer.tick() => { return true; }
                    _ = tokio::time::sleep(Duration::from_millis(1)) => {}
                }
            }
            false
        }

        assert!(
            !drive_with_fresh_sleep(2000).await,
            "a sleep rebuilt every loop turn should never accumulate a full interval's elapsed time"
        );
        assert!(
            drive_with_persisted_interval(2000).await,
            "a persisted interval's deadline must survive repeated select re-entry"
        );
    }

    #[test]
    fn reconnect_backoff_sequence_matches_scenario_6() {
        let mut interval = INITIAL_RECONNECT;
        let mut used = Vec::new();
        for _ in 0..5 {
            used.push(interval.as_millis());
            interval = (interval * 2).min(MAX_RECONNECT);
        }
        assert_eq!(used, vec![1000, 2000, 4000, 5000, 5000]);
    }

    #[tokio::test]
    async fn fresh_connection_starts_unconfigured() {
        let (_handle, controller) = connect(Settings::default());
        assert_eq!(controller.state(), State::Unconfigured);
    }

    #[tokio::test]
    async fn send_input_before_connect_is_buffered_not_lost() {
        let (handle, mut controller) = connect(Settings {
            host: "localhost".into(),
            port: 9001,
            encrypted: false,
            passphrase: "x".into(),
        });
        handle.send_input(Pointer(1), "hello");
        // Draining the channel directly proves the command was queued
        // rather than dropped, without needing a live socket.
        let queued = controller.commands_rx.recv().await.unwrap();
        assert_eq!(queued, "input 0x1 hello\n");
    }

    #[tokio::test]
    async fn fetch_more_lines_records_requested_count_and_queues_command() {
        let (handle, mut controller) = connect(Settings::default());
        handle.store.write().await.upsert_buffer(Pointer(1), |_| {});

        handle.fetch_more_lines(Pointer(1), 50).await;

        let queued = controller.commands_rx.recv().await.unwrap();
        assert_eq!(queued, "hdata buffer:0x1/lines/last_line(-50)/data\n");
        assert_eq!(
            handle.store().await.buffer(Pointer(1)).unwrap().last_requested_count,
            Some(50)
        );
    }

    #[tokio::test]
    async fn event_stream_surfaces_model_events() {
        let (handle, _controller) = connect(Settings::default());
        let mut events = Box::pin(handle.event_stream().await);
        handle
            .store
            .write()
            .await
            .upsert_buffer(Pointer(1), |b| b.name = "a".into());
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event, ModelEvent::BufferAdded(Pointer(1)));
    }
}
