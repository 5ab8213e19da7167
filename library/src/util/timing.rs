use std::time::{Duration, Instant};

use log::Level;

/// Logs how long a scope took when dropped. The label is only built when
/// debug logging is on; the clock always runs.
pub struct ScopedTimer {
    label: Option<String>,
    start: Instant,
}

impl ScopedTimer {
    pub fn debug_lazy<F>(label_gen: F) -> Self
    where
        F: FnOnce() -> String,
    {
        let label = log::log_enabled!(Level::Debug).then(label_gen);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if let Some(label) = &self.label {
            log::debug!("{} took {} us", label, self.start.elapsed().as_micros());
        }
    }
}

/// Runs `f` and returns its result with the wall time it took.
pub fn measure_elapsed<T, F, L>(label_gen: L, f: F) -> (T, Duration)
where
    F: FnOnce() -> T,
    L: FnOnce() -> String,
{
    let timer = ScopedTimer::debug_lazy(label_gen);
    let value = f();
    (value, timer.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_elapsed_reports_sleep() {
        let (value, elapsed) = measure_elapsed(
            || "sleep".to_string(),
            || {
                std::thread::sleep(Duration::from_millis(5));
                42
            },
        );
        assert_eq!(value, 42);
        assert!(elapsed >= Duration::from_millis(5));
    }

    #[test]
    fn test_timer_elapsed_is_monotonic() {
        let timer = ScopedTimer::debug_lazy(|| "idle".to_string());
        let first = timer.elapsed();
        assert!(timer.elapsed() >= first);
    }
}
