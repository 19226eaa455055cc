//! relaycore: client core for a remote chat-relay protocol.
//!
//! This crate owns everything up to, but not including, a UI: decoding the
//! relay's binary wire format, unescaping its inline text attributes,
//! keeping a synchronized model of buffers/lines/nicks/hotlist, and driving
//! the connection state machine that keeps that model current. Rendering,
//! persistence and notification policy are left to the embedding
//! application.

pub mod attribute;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod model;
pub mod segment;
pub mod sync;
#[cfg(feature = "tls")]
pub mod tls;
pub mod wire;

pub use config::{Settings, SettingsStore};
pub use connection::{connect, Connection, ConnectionController, State as ConnectionState};
pub use error::{Error, Result};
pub use model::{Buffer, BufferLine, HotListItem, ModelEvent, ModelStore, Nick};
pub use wire::Pointer;
