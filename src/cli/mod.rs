//! Argument parsing for the `ccmd` binary.

mod commands;
pub mod logging;
mod project;

use std::path::PathBuf;

use clap::Parser;
pub use commands::run;
pub use logging::init_global_subscriber;

/// Manage agent slash commands declared in `ccmd.toml`.
///
/// Commands live in git repositories and are referenced as `owner/repo`, optionally pinned
/// with `@version`. `ccmd` installs them into the project's commands directory and records
/// what it installed in `ccmd.lock`.
#[derive(Parser)]
#[command(author, version, verbatim_doc_comment)]
pub struct Args {
    /// Run as if ccmd was started in DIR
    ///
    /// The manifest is searched for from DIR upwards, and a new manifest is created in DIR.
    #[arg(short = 'C', value_name = "DIR", global = true, value_parser = validate_path)]
    working_directory: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    command: commands::Commands,
}

#[derive(Parser, Clone, Copy, Debug)]
#[command(next_help_heading = "Log Options")]
pub struct LogArgs {
    /// Log more: `-v` for debug output, `-vv` to trace git invocations and resolution
    ///
    /// `RUST_LOG` (e.g. `RUST_LOG=ccmd_core=debug`) takes precedence over this flag.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbosity: u8,

    /// Log less: `-q` for warnings only, `-qq` for errors only
    ///
    /// Wins over both `--verbosity` and `RUST_LOG`, which makes it the flag to reach for in
    /// scripts and CI.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    /// Emit logs as JSON lines on stderr, even on a terminal
    ///
    /// Logs are always JSON when stderr is not a terminal.
    #[arg(long, global = true)]
    log_json: bool,
}

fn validate_path(path: &str) -> Result<PathBuf, std::io::Error> {
    std::fs::canonicalize(path)
}

/// The process arguments, after honouring the first `-C DIR`.
///
/// The directory has to change before clap runs so that the manifest search starts in the right
/// place. Its argument is made absolute first, so `validate_path` still finds it afterwards.
pub fn change_directory() -> Vec<String> {
    let mut args: Vec<String> = std::env::args().collect();
    let Some(i) = args.iter().position(|a| a == "-C").map(|i| i + 1) else {
        return args;
    };
    // an unusable DIR is left for clap to report through `validate_path`
    if let Some(dir) = args.get_mut(i)
        && let Ok(abs) = std::fs::canonicalize(&*dir)
        && std::env::set_current_dir(&abs).is_ok()
    {
        *dir = abs.to_string_lossy().into_owned();
    }
    args
}
