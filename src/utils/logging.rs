use log::Level;

/// Installs the `env_logger` backend. `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();
}

/// Log levels for console messages
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    fn as_level(&self) -> Level {
        match self {
            LogLevel::Error => Level::Error,
            LogLevel::Warning => Level::Warn,
            LogLevel::Info => Level::Info,
            LogLevel::Debug => Level::Debug,
        }
    }
}

/// Builder for creating formatted log messages
pub struct LogMessage {
    level: LogLevel,
    context: Option<String>,
    message: String,
}

impl LogMessage {
    /// Create a new log message with the specified level
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            context: None,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, message)
    }

    /// Add context to the log message (e.g., "split", "cleanup")
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Format the message for console output
    fn format_for_console(&self) -> String {
        match &self.context {
            Some(ctx) => format!("[{}] {}", ctx, self.message),
            None => self.message.clone(),
        }
    }

    /// Send the message to the installed logger
    pub fn send(self) {
        log::log!(self.level.as_level(), "{}", self.format_for_console());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_message_formatting() {
        let msg = LogMessage::new(LogLevel::Error, "Test error")
            .with_context("test");

        assert_eq!(msg.format_for_console(), "[test] Test error");
    }

    #[test]
    fn test_log_message_no_context() {
        let msg = LogMessage::info("Test info");

        assert_eq!(msg.format_for_console(), "Test info");
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(LogLevel::Error.as_level(), Level::Error);
        assert_eq!(LogLevel::Warning.as_level(), Level::Warn);
        assert_eq!(LogLevel::Info.as_level(), Level::Info);
        assert_eq!(LogLevel::Debug.as_level(), Level::Debug);
    }

    #[test]
    fn test_send_without_logger_is_noop() {
        LogMessage::warning("nobody listens").with_context("test").send();
    }
}
