//! The structured logging core (§4.7): custom levels, level-aware sampling,
//! and defense-in-depth redaction, built as `tracing_subscriber::Layer`s on
//! top of the teacher's existing `tracing` + `tracing-subscriber` baseline
//! (see `main.rs`'s `tracing_subscriber::registry()...init()`) rather than a
//! bespoke logger from zero.

mod redact;
mod sampler;

pub use redact::{RedactingFormatter, Secret};
pub use sampler::SampleLayer;

use crate::config::LogFormat;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// The crate's custom level set (§4.7), richer than `tracing::Level`'s five
/// variants. `trace`/`dpanic`/`fatal` are represented on events as an
/// integer `level` field rather than native `tracing` levels, since
/// `tracing::Level` cannot be extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    DPanic,
    Panic,
    Fatal,
}

impl Level {
    /// The spec's numeric encoding: `trace(-2), debug(-1), info(0), warn,
    /// error, dpanic, panic, fatal`.
    pub fn as_i8(self) -> i8 {
        match self {
            Level::Trace => -2,
            Level::Debug => -1,
            Level::Info => 0,
            Level::Warn => 1,
            Level::Error => 2,
            Level::DPanic => 3,
            Level::Panic => 4,
            Level::Fatal => 5,
        }
    }

    /// Maps onto the nearest native `tracing::Level`. `dpanic`, `panic`,
    /// and `fatal` all collapse to `ERROR` since they are severities of
    /// "error", not forms of filtering.
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            Level::Trace => tracing::Level::TRACE,
            Level::Debug => tracing::Level::DEBUG,
            Level::Info => tracing::Level::INFO,
            Level::Warn => tracing::Level::WARN,
            Level::Error | Level::DPanic | Level::Panic | Level::Fatal => tracing::Level::ERROR,
        }
    }

    pub fn from_tracing_level(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }

    /// `error` and above are never sampled (§4.7).
    pub fn always_logged(self) -> bool {
        self >= Level::Error
    }
}

/// Installs the global subscriber: `EnvFilter` (same default as the
/// teacher's `"info"` fallback), the sampler, and a `fmt` layer whose event
/// formatter is [`RedactingFormatter`] — redaction happens in the encoder
/// itself, selected json-or-console by [`LogFormat`], rather than in an
/// observer layered alongside a stock encoder.
pub fn init(format: LogFormat) {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(SampleLayer::new(sampler::SampleConfig::default()));

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().event_format(RedactingFormatter::json()))
            .init(),
        LogFormat::Console => registry
            .with(tracing_subscriber::fmt::layer().event_format(RedactingFormatter::console()))
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_encoding_matches_spec() {
        assert_eq!(Level::Trace.as_i8(), -2);
        assert_eq!(Level::Debug.as_i8(), -1);
        assert_eq!(Level::Info.as_i8(), 0);
    }

    #[test]
    fn error_and_above_are_always_logged() {
        assert!(Level::Error.always_logged());
        assert!(Level::DPanic.always_logged());
        assert!(Level::Panic.always_logged());
        assert!(Level::Fatal.always_logged());
        assert!(!Level::Warn.always_logged());
        assert!(!Level::Info.always_logged());
    }

    #[test]
    fn dpanic_panic_fatal_collapse_to_error_for_filtering() {
        assert_eq!(Level::DPanic.as_tracing_level(), tracing::Level::ERROR);
        assert_eq!(Level::Panic.as_tracing_level(), tracing::Level::ERROR);
        assert_eq!(Level::Fatal.as_tracing_level(), tracing::Level::ERROR);
    }
}
