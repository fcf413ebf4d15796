#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::cast_possible_truncation)]

//! Opt-in tracing for test binaries.
//!
//! Test crates call [`enable_tracing!`] once; the subscriber is installed
//! before `main` when `WALLET_TX_TRACE` is set, and filtered by `RUST_LOG`.

use ctor::ctor;
use std::env::var;
use tracing_subscriber::{
    EnvFilter,
    fmt::format,
};

/// Name of the variable switching test tracing on.
pub const TRACE_VAR: &str = "WALLET_TX_TRACE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TraceFormat {
    Full,
    Compact,
    Pretty,
}

fn parse_format(value: &str) -> Option<TraceFormat> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "on" => Some(TraceFormat::Full),
        "compact" => Some(TraceFormat::Compact),
        "pretty" => Some(TraceFormat::Pretty),
        _ => None,
    }
}

#[ctor]
pub static TRACE: () = {
    if let Some(trace_format) = var(TRACE_VAR).ok().as_deref().and_then(parse_format) {
        let builder = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer();
        // Another test binary in the same process may have installed one already.
        let _ = match trace_format {
            TraceFormat::Full => builder.try_init(),
            TraceFormat::Compact => builder.event_format(format().compact()).try_init(),
            TraceFormat::Pretty => builder.event_format(format().pretty()).try_init(),
        };
    }
};

#[macro_export]
macro_rules! enable_tracing {
    () => {
        static _TRACE: &$crate::TRACE<()> = &$crate::TRACE;
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::*;

    #[test]
    fn recognises_trace_formats() {
        assert_eq!(parse_format("ON"), Some(TraceFormat::Full));
        assert_eq!(parse_format("compact"), Some(TraceFormat::Compact));
        assert_eq!(parse_format("Pretty"), Some(TraceFormat::Pretty));
        assert_eq!(parse_format("log-file"), None);
    }

    #[test]
    fn works() {
        error!("visible if WALLET_TX_TRACE=1 is set");
        info!("visible if WALLET_TX_TRACE=1 and RUST_LOG=info are set");
    }
}
