/// Configuration management
use crate::error::{AtriumError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const DEFAULT_DEDUP_WINDOW_SECS: i64 = 10;
pub const DEFAULT_QUIESCENCE_MS: u64 = 2_000;

const DEFAULT_ROOM: &str = "lobby";
const DEFAULT_USER: &str = "local-user";

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Room the session mirrors into; None means a solo session
    pub room_id: Option<String>,

    /// Our identity in the room, matched against inbound sender ids
    pub local_user_id: String,

    /// Display name advertised to the room
    pub display_name: Option<String>,

    /// How many history entries to backfill at startup
    pub history_limit: usize,

    /// Timestamp window for content-matching history entries against
    /// existing messages
    pub dedup_window_secs: i64,

    /// Quiet period before an assistant reply is mirrored out
    pub quiescence_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            room_id: None,
            local_user_id: DEFAULT_USER.to_string(),
            display_name: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            dedup_window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            quiescence_delay: Duration::from_millis(DEFAULT_QUIESCENCE_MS),
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut room_id: Option<String> = None;
        let mut local_user_id: Option<String> = None;
        let mut display_name: Option<String> = None;
        let mut history_limit: Option<usize> = None;
        let mut quiesce_ms: Option<u64> = None;
        let mut window_secs: Option<i64> = None;
        let mut solo = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--user" => {
                    let id = args.get(i + 1).ok_or_else(|| {
                        AtriumError::Config("--user requires an id argument".to_string())
                    })?;
                    local_user_id = Some(id.clone());
                    i += 2;
                }
                "--name" => {
                    let name = args.get(i + 1).ok_or_else(|| {
                        AtriumError::Config("--name requires a name argument".to_string())
                    })?;
                    display_name = Some(name.clone());
                    i += 2;
                }
                "--history-limit" => {
                    let n = args.get(i + 1).ok_or_else(|| {
                        AtriumError::Config("--history-limit requires a number".to_string())
                    })?;
                    history_limit = Some(n.parse::<usize>().map_err(|_| {
                        AtriumError::Config("--history-limit must be a valid number".to_string())
                    })?);
                    i += 2;
                }
                "--quiesce-ms" => {
                    let n = args.get(i + 1).ok_or_else(|| {
                        AtriumError::Config("--quiesce-ms requires a number".to_string())
                    })?;
                    quiesce_ms = Some(n.parse::<u64>().map_err(|_| {
                        AtriumError::Config("--quiesce-ms must be a valid number".to_string())
                    })?);
                    i += 2;
                }
                "--window-secs" => {
                    let n = args.get(i + 1).ok_or_else(|| {
                        AtriumError::Config("--window-secs requires a number".to_string())
                    })?;
                    window_secs = Some(n.parse::<i64>().map_err(|_| {
                        AtriumError::Config("--window-secs must be a valid number".to_string())
                    })?);
                    i += 2;
                }
                "--solo" => {
                    solo = true;
                    i += 1;
                }
                other if other.starts_with("--") => {
                    return Err(AtriumError::Config(format!(
                        "Unknown flag: {} (usage: {} [room] [--user <id>] [--name <name>] [--history-limit <n>] [--quiesce-ms <n>] [--window-secs <n>] [--solo])",
                        other,
                        args.first().map(String::as_str).unwrap_or("chat")
                    )));
                }
                other => {
                    if room_id.is_some() {
                        return Err(AtriumError::Config(format!(
                            "Unexpected extra argument: {}",
                            other
                        )));
                    }
                    room_id = Some(other.to_string());
                    i += 1;
                }
            }
        }

        // Environment variable overrides
        if let Ok(room) = std::env::var("ATRIUM_ROOM") {
            if room_id.is_none() {
                room_id = Some(room);
            }
        }
        if let Ok(user) = std::env::var("ATRIUM_USER") {
            if local_user_id.is_none() {
                local_user_id = Some(user);
            }
        }
        if let Some(ms) = std::env::var("ATRIUM_QUIESCE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            quiesce_ms = Some(ms);
        }

        let room_id = if solo {
            None
        } else {
            Some(room_id.unwrap_or_else(|| DEFAULT_ROOM.to_string()))
        };

        Ok(Self {
            room_id,
            local_user_id: local_user_id.unwrap_or_else(|| DEFAULT_USER.to_string()),
            display_name,
            history_limit: history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            dedup_window_secs: window_secs.unwrap_or(DEFAULT_DEDUP_WINDOW_SECS),
            quiescence_delay: Duration::from_millis(quiesce_ms.unwrap_or(DEFAULT_QUIESCENCE_MS)),
        })
    }
}
