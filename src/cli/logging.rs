//! Log output and progress rendering for `ccmd`.
//!
//! On a terminal, events are printed compactly through the progress layer so the sync bar and
//! per-command spinners are not torn by log lines. Anywhere else, or with `--log-json`, events
//! are JSON lines written to stderr by a background worker.

use std::io::IsTerminal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_indicatif::IndicatifLayer;
use tracing_indicatif::style::ProgressStyle;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

use super::LogArgs;

//================================================================================================
// Statics
//================================================================================================

/// Whether log output may carry ANSI colours. Cleared once the JSON writer is chosen.
pub static ANSI: AtomicBool = AtomicBool::new(true);

//================================================================================================
// Modules
//================================================================================================

/// Escape codes used in human-readable output.
pub mod ansi {
    /// Magenta foreground.
    pub const MAGENTA: &str = "\x1b[35m";
    /// Reset all styling.
    pub const RESET: &str = "\x1b[0m";
}

//================================================================================================
// Macros
//================================================================================================

/// Log an error that ends the run.
#[macro_export]
macro_rules! fatal {
    ($error:expr) => {{
        use $crate::cli::logging::{ANSI, ansi};
        let ansi = ANSI.load(std::sync::atomic::Ordering::SeqCst);
        tracing::error!(
            fatal = true,
            "{}ccmd failed{} {}",
            if ansi { ansi::MAGENTA } else { "" },
            if ansi { ansi::RESET } else { "" },
            $error
        );
    }};
}

//================================================================================================
// Functions
//================================================================================================

/// Install the global subscriber. Logs are flushed when the returned guard drops.
pub fn init_global_subscriber(args: LogArgs) -> WorkerGuard {
    let log_level = get_log_level(args);
    let env_filter = EnvFilter::from_default_env().add_directive(log_level.into());
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());

    let progress_layer = IndicatifLayer::new().with_progress_style(
        ProgressStyle::with_template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    let fmt = if std::io::stderr().is_terminal() && !args.log_json {
        fmt::layer()
            .without_time()
            .with_writer(progress_layer.get_stderr_writer())
            .with_target(false)
            .compact()
            .boxed()
    } else {
        ANSI.store(false, Ordering::SeqCst);
        fmt::layer()
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_writer(non_blocking)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt)
        .with(env_filter)
        .with(progress_layer)
        .init();

    guard
}

/// `--quiet` first, then `RUST_LOG` when it names a plain level, then `--verbosity`.
fn get_log_level(args: LogArgs) -> LevelFilter {
    match args.quiet {
        0 => (),
        1 => return LevelFilter::WARN,
        _ => return LevelFilter::ERROR,
    }

    if let Ok(level) = std::env::var(EnvFilter::DEFAULT_ENV)
        .map_err(drop)
        .and_then(|l| LevelFilter::from_str(&l).map_err(drop))
    {
        return level;
    }

    match args.verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

#[test]
fn quiet_overrides_verbosity() {
    let level = |verbosity, quiet| {
        get_log_level(LogArgs {
            verbosity,
            quiet,
            log_json: false,
        })
    };
    assert_eq!(level(2, 1), LevelFilter::WARN);
    assert_eq!(level(0, 3), LevelFilter::ERROR);
}
