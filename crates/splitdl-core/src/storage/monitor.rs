//! Progress reporting for destination-file space reservation.

use crate::error::{EngineError, EngineResult};

/// One progress report emitted by [`AllocationMonitor::show_progress`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationProgress {
    pub current: u64,
    pub min: u64,
    pub max: u64,
    /// In [0.0, 100.0]; 100 when `max == min`.
    pub percent: f64,
}

/// Tracks a position inside `[min, max]` and reports it as a percentage.
pub struct AllocationMonitor {
    min: u64,
    max: u64,
    current: u64,
    sink: Option<Box<dyn FnMut(&AllocationProgress)>>,
    last_logged: Option<u8>,
}

impl AllocationMonitor {
    /// Monitor over `[min, max]`, starting at `min`. `max` below `min` is raised to `min`.
    pub fn new(min: u64, max: u64) -> Self {
        Self {
            min,
            max: max.max(min),
            current: min,
            sink: None,
            last_logged: None,
        }
    }

    /// Forward every report to `sink` (e.g. a console progress line).
    pub fn with_sink(mut self, sink: impl FnMut(&AllocationProgress) + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn min_value(&self) -> u64 {
        self.min
    }

    pub fn max_value(&self) -> u64 {
        self.max
    }

    pub fn current_value(&self) -> u64 {
        self.current
    }

    pub fn set_current_value(&mut self, value: u64) -> EngineResult<()> {
        if value < self.min || value > self.max {
            return Err(EngineError::OutOfRange {
                value,
                min: self.min,
                max: self.max,
            });
        }
        self.current = value;
        Ok(())
    }

    pub fn percent(&self) -> f64 {
        if self.max == self.min {
            return 100.0;
        }
        let done = (self.current - self.min) as f64;
        let span = (self.max - self.min) as f64;
        (done / span * 100.0).min(100.0)
    }

    pub fn is_done(&self) -> bool {
        self.current == self.max
    }

    /// Emit the current position. Safe to call any number of times, including
    /// again after reaching `max`.
    pub fn show_progress(&mut self) -> AllocationProgress {
        let report = AllocationProgress {
            current: self.current,
            min: self.min,
            max: self.max,
            percent: self.percent(),
        };
        let whole = report.percent as u8;
        if self.last_logged != Some(whole) {
            tracing::debug!(
                current = report.current,
                max = report.max,
                "allocating: {}%",
                whole
            );
            self.last_logged = Some(whole);
        }
        if let Some(sink) = self.sink.as_mut() {
            sink(&report);
        }
        report
    }
}

impl std::fmt::Debug for AllocationMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationMonitor")
            .field("min", &self.min)
            .field("max", &self.max)
            .field("current", &self.current)
            .finish()
    }
}
