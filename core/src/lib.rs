/// Atrium Core - Conversation Reconciliation Engine
///
/// Keeps one ordered chat transcript consistent across local appends,
/// room history backfill and live room events, and mirrors eligible
/// locally generated assistant replies back into the room exactly once.

pub mod config;
pub mod error;
pub mod message;
pub mod mirror;
pub mod session;
pub mod transcript;
pub mod transport;
pub mod utils;

pub use config::Config;
pub use error::{AtriumError, Result};
pub use message::{ContentPart, Message, Role, SenderInfo, Source, REMOTE_ID_PREFIX};
pub use session::Session;
pub use transcript::{MergeReport, Transcript};
pub use transport::{HistoryEntry, LoopbackRoom, RoomEvent, RoomTransport};
pub use utils::event_emitter::SessionEvent;
