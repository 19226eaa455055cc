//! Connection settings (§4.6's `Settings`), with reactive change
//! notification standing in for `original_source/src/settings.h`'s
//! `QSettings`-backed `xChanged` signals.

use tokio::sync::watch;

/// The four fields the Connection Controller needs to open a session.
/// Persistence and the remaining UI-only settings in the original
/// (`lastOpenBuffer`, `baseFontSize`, ...) are out of scope here — this
/// crate owns the connection, not the preference store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Relay server hostname or address.
    pub host: String,
    /// Relay server port. Defaults to 9001 (§6).
    pub port: u16,
    /// Whether to connect over TLS.
    pub encrypted: bool,
    /// The relay's shared passphrase, sent in the `init` handshake command.
    pub passphrase: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 9001,
            encrypted: true,
            passphrase: String::new(),
        }
    }
}

impl Settings {
    /// Whether enough is configured to attempt a connection: a non-empty
    /// host and passphrase (§4.6's `onConnectionSettingsChanged` guard).
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && !self.passphrase.is_empty()
    }
}

/// Holds the current [`Settings`] and notifies subscribers when they
/// change, so the Connection Controller can reconnect in response
/// (§4.6) without polling.
#[derive(Debug)]
pub struct SettingsStore {
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    /// Create a store seeded with `initial`.
    pub fn new(initial: Settings) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Current settings snapshot.
    pub fn get(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// Replace the settings, notifying subscribers only if something
    /// actually changed (mirrors each `SETTING` macro's `if (m_x != o)`
    /// guard in the original).
    pub fn set(&self, new: Settings) {
        self.tx.send_if_modified(|current| {
            if *current == new {
                false
            } else {
                *current = new;
                true
            }
        });
    }

    /// Subscribe to future settings changes. The receiver's first `changed()`
    /// call returns the value as of subscription time, per `tokio::sync::watch`.
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }
}
