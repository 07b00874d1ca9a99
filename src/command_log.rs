//! Read-only view of the operator command log kept by the orchestration
//! service. The controller only asks what kind the most recent command was,
//! to decide whether an ICMP exchange is worth reporting.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime};
use log::warn;

use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Ping,
    Pingall,
    Other(String),
}

impl CommandKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "ping" => CommandKind::Ping,
            "pingall" => CommandKind::Pingall,
            other => CommandKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Completed,
    Error,
}

/// The `last_command` record written by the orchestration service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastCommand {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<CommandStatus>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

pub trait CommandLog: Send + Sync {
    fn is_last_command_of_kind(&self, kind: &CommandKind) -> bool;
}

/// In-process log, for embedding the controller next to the orchestrator.
#[derive(Debug, Default)]
pub struct MemoryCommandLog {
    last: RwLock<Option<CommandKind>>,
}

impl MemoryCommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: CommandKind) {
        if let Ok(mut last) = self.last.write() {
            *last = Some(kind);
        }
    }
}

impl CommandLog for MemoryCommandLog {
    fn is_last_command_of_kind(&self, kind: &CommandKind) -> bool {
        self.last
            .read()
            .map(|last| last.as_ref() == Some(kind))
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct CommandFile {
    #[serde(default)]
    last_command: Option<LastCommand>,
}

/// File identity used to skip re-parsing an unchanged command file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    modified: SystemTime,
    len: u64,
}

/// The orchestration service's JSON command file. Only the file's metadata
/// is checked per query; it is parsed again when its mtime or size changes.
#[derive(Debug)]
pub struct JsonFileCommandLog {
    path: PathBuf,
    cached: Mutex<Option<(Stamp, Option<LastCommand>)>>,
    warnings: Mutex<RateLimiter>,
}

impl JsonFileCommandLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
            warnings: Mutex::new(RateLimiter::new(Duration::from_secs(30))),
        }
    }

    fn read(&self) -> Result<Option<LastCommand>, String> {
        let metadata = fs::metadata(&self.path).map_err(|e| e.to_string())?;
        let stamp = Stamp {
            modified: metadata.modified().map_err(|e| e.to_string())?,
            len: metadata.len(),
        };

        let mut cached = self.cached.lock().map_err(|e| e.to_string())?;
        if let Some((seen, last)) = cached.as_ref() {
            if *seen == stamp {
                return Ok(last.clone());
            }
        }

        let content = fs::read_to_string(&self.path).map_err(|e| e.to_string())?;
        let file = serde_json::from_str::<CommandFile>(&content).map_err(|e| e.to_string())?;
        *cached = Some((stamp, file.last_command.clone()));
        Ok(file.last_command)
    }

    pub fn last_command(&self) -> Option<LastCommand> {
        match self.read() {
            Ok(last) => last,
            Err(e) => {
                if let Ok(mut limiter) = self.warnings.lock() {
                    if limiter.allow("command_log") {
                        warn!("Cannot read command log {}: {}", self.path.display(), e);
                    }
                }
                None
            }
        }
    }
}

impl CommandLog for JsonFileCommandLog {
    fn is_last_command_of_kind(&self, kind: &CommandKind) -> bool {
        self.last_command()
            .and_then(|last| last.kind)
            .is_some_and(|last| CommandKind::parse(&last) == *kind)
    }
}
