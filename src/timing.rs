use std::time::{Duration, Instant};

/// Weight of the newest inter-cycle interval in the FPS average.
const FPS_SMOOTHING: f64 = 0.1;

/// Boundaries a pipeline reports inside one render cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    Resized,
    Inferred,
}

/// Durations of the last completed cycle plus the smoothed frame rate.
///
/// A stage is `None` when its boundary was never reported, which is the
/// case for resize and inference when no mask is needed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTimings {
    pub resize: Option<Duration>,
    pub inference: Option<Duration>,
    pub post_process: Option<Duration>,
    pub fps: f64,
}

impl FrameTimings {
    fn millis(duration: Option<Duration>) -> Option<f64> {
        duration.map(|d| d.as_secs_f64() * 1000.0)
    }

    pub fn resize_ms(&self) -> Option<f64> {
        Self::millis(self.resize)
    }

    pub fn inference_ms(&self) -> Option<f64> {
        Self::millis(self.inference)
    }

    pub fn post_process_ms(&self) -> Option<f64> {
        Self::millis(self.post_process)
    }
}

#[derive(Debug, Default)]
pub struct FrameTimer {
    cycle_start: Option<Instant>,
    resized_at: Option<Instant>,
    inferred_at: Option<Instant>,
    previous_cycle_start: Option<Instant>,
    average_interval: Option<f64>,
    completed: FrameTimings,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_cycle(&mut self) {
        self.begin_cycle_at(Instant::now());
    }

    pub fn begin_cycle_at(&mut self, now: Instant) {
        if let Some(previous) = self.previous_cycle_start {
            let interval = now.saturating_duration_since(previous).as_secs_f64();
            if interval > 0.0 {
                let average = match self.average_interval {
                    Some(average) => average + FPS_SMOOTHING * (interval - average),
                    None => interval,
                };
                self.average_interval = Some(average);
                self.completed.fps = 1.0 / average;
            }
        }
        self.previous_cycle_start = Some(now);
        self.cycle_start = Some(now);
        self.resized_at = None;
        self.inferred_at = None;
    }

    pub fn mark(&mut self, event: FrameEvent) {
        self.mark_at(event, Instant::now());
    }

    pub fn mark_at(&mut self, event: FrameEvent, now: Instant) {
        match event {
            FrameEvent::Resized => self.resized_at = Some(now),
            FrameEvent::Inferred => self.inferred_at = Some(now),
        }
    }

    pub fn end_cycle(&mut self) {
        self.end_cycle_at(Instant::now());
    }

    /// Closes the current cycle. Without a matching `begin_cycle` this is a no-op.
    pub fn end_cycle_at(&mut self, now: Instant) {
        let Some(start) = self.cycle_start.take() else {
            return;
        };
        let between = |from: Option<Instant>, to: Option<Instant>| match (from, to) {
            (Some(from), Some(to)) => Some(to.saturating_duration_since(from)),
            _ => None,
        };

        self.completed.resize = between(Some(start), self.resized_at);
        self.completed.inference = between(self.resized_at, self.inferred_at);
        let compose_start = self.inferred_at.or(self.resized_at).unwrap_or(start);
        self.completed.post_process = Some(now.saturating_duration_since(compose_start));
    }

    pub fn timings(&self) -> FrameTimings {
        self.completed
    }

    pub fn fps(&self) -> f64 {
        self.completed.fps
    }
}
