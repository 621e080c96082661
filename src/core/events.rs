// ─── Log Events ───
// One-way stream of user-facing log lines for the UI layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Fan-out of [`LogEvent`]s. Cloning shares the same channel.
///
/// Emitting never blocks: with no subscribers the event is only traced,
/// and slow subscribers skip what they missed.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LogEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => tracing::info!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
            LogLevel::Debug => tracing::debug!("{}", message),
        }

        let _ = self.sender.send(LogEvent {
            level,
            message,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(LogLevel::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.info("first");
        bus.error("second");

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.level, LogLevel::Info);
        assert_eq!(first.message, "first");
        assert_eq!(second.level, LogLevel::Error);
        assert_eq!(second.message, "second");
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.warning("nobody is listening");
    }
}
