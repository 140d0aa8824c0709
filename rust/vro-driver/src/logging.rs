//! Structured logging helpers for lifecycle operations.

use std::time::Instant;

/// Times one lifecycle operation on one machine.
///
/// Logs a debug record when started and exactly one completion or failure
/// record, with `duration_ms`, when finished.
///
/// ```rust,ignore
/// use vro_driver::logging::OpTimer;
///
/// let timer = OpTimer::new("web01", "allocate");
/// let result = do_allocate().await;
/// timer.finish_with_result(&result);
/// ```
#[derive(Debug)]
pub struct OpTimer {
    /// Machine the operation runs against.
    machine: String,
    /// Operation being performed (e.g. "allocate", "ready").
    operation: String,
    start: Instant,
}

impl OpTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(machine: impl Into<String>, operation: impl std::fmt::Display) -> Self {
        let machine = machine.into();
        let operation = operation.to_string();

        tracing::debug!(
            machine = %machine,
            operation = %operation,
            "Operation started"
        );

        Self {
            machine,
            operation,
            start: Instant::now(),
        }
    }

    /// Milliseconds since the timer started.
    #[must_use]
    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    /// Finishes the timer, logging success or the error.
    pub fn finish_with_result<T, E: std::fmt::Display>(self, result: &Result<T, E>) {
        let duration_ms = self.elapsed_ms();

        match result {
            Ok(_) => {
                tracing::info!(
                    machine = %self.machine,
                    operation = %self.operation,
                    duration_ms = duration_ms,
                    "Operation completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    machine = %self.machine,
                    operation = %self.operation,
                    duration_ms = duration_ms,
                    error = %e,
                    "Operation failed"
                );
            }
        }
    }
}
