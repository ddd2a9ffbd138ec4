//! Level-aware sampling (§4.7): a tick-window two-arm tee. `error` and
//! above always pass through; everything below is rate-limited per level
//! as `(initial, thereafter)` counts within each window.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub tick: Duration,
    pub rates: HashMap<tracing::Level, (u64, u64)>,
}

impl Default for SampleConfig {
    fn default() -> Self {
        let mut rates = HashMap::new();
        rates.insert(tracing::Level::TRACE, (1, 0));
        rates.insert(tracing::Level::DEBUG, (10, 0));
        rates.insert(tracing::Level::INFO, (100, 10));
        rates.insert(tracing::Level::WARN, (100, 100));
        Self {
            tick: Duration::from_secs(1),
            rates,
        }
    }
}

struct Window {
    tick_start: Instant,
    count: u64,
}

pub struct SampleLayer {
    config: SampleConfig,
    windows: Mutex<HashMap<tracing::Level, Window>>,
}

impl SampleLayer {
    pub fn new(config: SampleConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// `error` and above are never sampled; every other level passes its
    /// first `initial` events per tick window, then one in every
    /// `thereafter` events (none, if `thereafter == 0`).
    fn should_sample(&self, level: tracing::Level) -> bool {
        if level == tracing::Level::ERROR {
            return true;
        }
        let Some(&(initial, thereafter)) = self.config.rates.get(&level) else {
            return true;
        };

        let mut windows = self.windows.lock();
        let window = windows.entry(level).or_insert_with(|| Window {
            tick_start: Instant::now(),
            count: 0,
        });
        if window.tick_start.elapsed() >= self.config.tick {
            window.tick_start = Instant::now();
            window.count = 0;
        }
        window.count += 1;

        if window.count <= initial {
            true
        } else if thereafter == 0 {
            false
        } else {
            (window.count - initial) % thereafter == 0
        }
    }
}

impl<S: Subscriber> Layer<S> for SampleLayer {
    fn event_enabled(&self, event: &Event<'_>, _ctx: Context<'_, S>) -> bool {
        self.should_sample(*event.metadata().level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(level: tracing::Level, initial: u64, thereafter: u64) -> SampleConfig {
        let mut rates = HashMap::new();
        rates.insert(level, (initial, thereafter));
        SampleConfig {
            tick: Duration::from_secs(60),
            rates,
        }
    }

    #[test]
    fn error_level_is_never_sampled_regardless_of_config() {
        let layer = SampleLayer::new(config_with(tracing::Level::ERROR, 0, 0));
        for _ in 0..50 {
            assert!(layer.should_sample(tracing::Level::ERROR));
        }
    }

    #[test]
    fn trace_passes_only_the_initial_allotment() {
        let layer = SampleLayer::new(config_with(tracing::Level::TRACE, 1, 0));
        assert!(layer.should_sample(tracing::Level::TRACE));
        assert!(!layer.should_sample(tracing::Level::TRACE));
        assert!(!layer.should_sample(tracing::Level::TRACE));
    }

    #[test]
    fn info_falls_back_to_thereafter_rate_after_initial() {
        let layer = SampleLayer::new(config_with(tracing::Level::INFO, 2, 10));
        assert!(layer.should_sample(tracing::Level::INFO));
        assert!(layer.should_sample(tracing::Level::INFO));
        for i in 0..9 {
            assert!(
                !layer.should_sample(tracing::Level::INFO),
                "event {i} after initial should be dropped before the 10th"
            );
        }
        assert!(layer.should_sample(tracing::Level::INFO));
    }

    #[test]
    fn unconfigured_level_defaults_to_pass_through() {
        let layer = SampleLayer::new(SampleConfig {
            tick: Duration::from_secs(60),
            rates: HashMap::new(),
        });
        assert!(layer.should_sample(tracing::Level::INFO));
    }

    #[test]
    fn window_resets_after_tick_elapses() {
        let layer = SampleLayer::new(SampleConfig {
            tick: Duration::from_millis(10),
            rates: {
                let mut r = HashMap::new();
                r.insert(tracing::Level::TRACE, (1, 0));
                r
            },
        });
        assert!(layer.should_sample(tracing::Level::TRACE));
        assert!(!layer.should_sample(tracing::Level::TRACE));
        std::thread::sleep(Duration::from_millis(15));
        assert!(layer.should_sample(tracing::Level::TRACE));
    }
}
