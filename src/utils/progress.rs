use std::cell::Cell;

use crate::utils::logging::LogMessage;

pub trait ProgressSink {
    fn set(&self, progress_0_1: f32, message: Option<&str>);
    fn finish(&self, message: Option<&str>);
}

/// Reports progress through the logger, throttled to one message per `step`.
pub struct LogProgress {
    context: String,
    step: f32,
    last_reported: Cell<f32>,
}

impl LogProgress {
    pub fn new(context: impl Into<String>) -> Self {
        Self::with_step(context, 0.1)
    }

    pub fn with_step(context: impl Into<String>, step: f32) -> Self {
        Self { context: context.into(), step: step.max(0.0), last_reported: Cell::new(0.0) }
    }

    /// Whether `progress` has moved far enough since the last report.
    fn should_report(&self, progress: f32) -> bool {
        progress - self.last_reported.get() >= self.step
    }
}

impl ProgressSink for LogProgress {
    fn set(&self, progress_0_1: f32, message: Option<&str>) {
        let clamped = progress_0_1.clamp(0.0, 1.0);
        // Wiadomości zawsze przechodzą, sam postęp co `step`
        if message.is_none() && !self.should_report(clamped) {
            return;
        }
        self.last_reported.set(clamped);

        let text = match message {
            Some(m) => format!("{:>3.0}% {}", clamped * 100.0, m),
            None => format!("{:>3.0}%", clamped * 100.0),
        };
        LogMessage::debug(text).with_context(self.context.as_str()).send();
    }

    fn finish(&self, message: Option<&str>) {
        self.last_reported.set(1.0);
        LogMessage::info(message.unwrap_or("done")).with_context(self.context.as_str()).send();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_throttling() {
        let progress = LogProgress::with_step("test", 0.25);
        assert!(!progress.should_report(0.1));
        assert!(progress.should_report(0.25));

        progress.set(0.3, None);
        assert!(!progress.should_report(0.4));
        assert!(progress.should_report(0.6));
    }

    #[test]
    fn test_progress_is_clamped() {
        let progress = LogProgress::new("test");
        progress.set(7.0, None);
        assert_eq!(progress.last_reported.get(), 1.0);
        progress.finish(None);
        assert_eq!(progress.last_reported.get(), 1.0);
    }
}
