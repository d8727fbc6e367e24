//! In-memory logging port with a bounded ring buffer and subscriber set.
//!
//! The session core takes a [`Logger`] by reference instead of writing to a
//! process-global sink, so tests can capture exactly what the reducer and
//! connection manager reported. Entries are mirrored to `tracing` so normal
//! process logging still works.

#[cfg(test)]
#[path = "logging_test.rs"]
mod tests;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

/// Maximum entries retained in the ring buffer.
const MAX_ENTRIES: usize = 500;

/// Severity of a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One captured log entry.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub id: String,
    pub ts: i64,
    pub level: LogLevel,
    pub message: String,
    pub data: Option<Value>,
}

type Subscriber = Box<dyn Fn(&LogEntry) + Send + Sync>;

struct LoggerInner {
    buffer: Mutex<VecDeque<LogEntry>>,
    subscribers: Mutex<Vec<(usize, Subscriber)>>,
    next_sub_id: Mutex<usize>,
}

/// Cloneable handle to a shared log buffer.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                buffer: Mutex::new(VecDeque::new()),
                subscribers: Mutex::new(Vec::new()),
                next_sub_id: Mutex::new(0),
            }),
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, None);
    }

    /// Append an entry, trim the buffer, and notify subscribers.
    pub fn log(&self, level: LogLevel, message: impl Into<String>, data: Option<Value>) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!(target: "liveclass", "{message}"),
            LogLevel::Info => tracing::info!(target: "liveclass", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "liveclass", "{message}"),
            LogLevel::Error => tracing::error!(target: "liveclass", "{message}"),
        }

        let entry = LogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            ts: now_ms(),
            level,
            message,
            data,
        };

        if let Ok(mut buffer) = self.inner.buffer.lock() {
            buffer.push_back(entry.clone());
            while buffer.len() > MAX_ENTRIES {
                buffer.pop_front();
            }
        }

        if let Ok(subscribers) = self.inner.subscribers.lock() {
            for (_, subscriber) in subscribers.iter() {
                subscriber(&entry);
            }
        }
    }

    /// Snapshot of the current buffer contents, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner
            .buffer
            .lock()
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Register a subscriber for future entries; returns an id usable with
    /// [`Logger::unsubscribe`].
    pub fn subscribe(&self, subscriber: Subscriber) -> usize {
        let id = {
            let Ok(mut next) = self.inner.next_sub_id.lock() else {
                return usize::MAX;
            };
            let id = *next;
            *next += 1;
            id
        };
        if let Ok(mut subscribers) = self.inner.subscribers.lock() {
            subscribers.push((id, subscriber));
        }
        id
    }

    pub fn unsubscribe(&self, id: usize) {
        if let Ok(mut subscribers) = self.inner.subscribers.lock() {
            subscribers.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut buffer) = self.inner.buffer.lock() {
            buffer.clear();
        }
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(duration.as_millis()).unwrap_or(0)
}
