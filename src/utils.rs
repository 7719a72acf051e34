//! Timing helpers for log fields.

use std::time::{Duration, Instant};

/// Render a duration for log fields: `1.94ms`, `2.34s`.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// A named operation with a latency budget.
#[derive(Debug)]
pub struct Timed {
    operation: &'static str,
    budget: Duration,
    started: Instant,
}

impl Timed {
    pub fn start(operation: &'static str, budget: Duration) -> Self {
        Self {
            operation,
            budget,
            started: Instant::now(),
        }
    }

    /// Logs at `debug` within budget and `warn` past it. Returns the elapsed time.
    pub fn finish(self, subject: &str) -> Duration {
        let elapsed = self.started.elapsed();
        if elapsed > self.budget {
            tracing::warn!(
                operation = self.operation,
                subject,
                duration = fmt_duration(elapsed),
                budget = fmt_duration(self.budget),
                "slow operation"
            );
        } else {
            tracing::debug!(
                operation = self.operation,
                subject,
                duration = fmt_duration(elapsed),
                "operation finished"
            );
        }
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_with_two_decimals() {
        assert_eq!(fmt_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(fmt_duration(Duration::from_micros(2500)), "2.50ms");
    }

    #[test]
    fn finish_reports_elapsed_time() {
        let timed = Timed::start("test", Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(timed.finish("subject") >= Duration::from_millis(2));
    }
}
