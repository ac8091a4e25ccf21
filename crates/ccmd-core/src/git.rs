//! # Git Client
//!
//! Everything the installer needs from a repository goes through the [`GitClient`] trait:
//! cloning, listing tags, checking out a reference and reading the commit at `HEAD`.
//! [`SystemGit`] implements it by running the `git` binary, so transport, credentials and
//! retries are whatever the user's git is configured to do. Interactive prompts are disabled;
//! a command that would need one fails instead.
//!
//! Every [`GitClient`] is also a [`TagSource`], which is how the version resolver is fed.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;
use std::string::FromUtf8Error;

use thiserror::Error as ThisError;

use crate::repo::Repo;
use crate::version::TagSource;

//================================================================================================
// Types
//================================================================================================

/// An error encountered while running git.
#[derive(ThisError, Debug)]
pub enum Error {
    /// The git binary could not be started.
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
    /// Git exited unsuccessfully.
    #[error("`git {command}` failed: {stderr}")]
    Failed {
        /// The arguments git was called with.
        command: String,
        /// What git printed to stderr.
        stderr: String,
    },
    /// Git printed something that is not UTF-8.
    #[error(transparent)]
    Utf8(#[from] FromUtf8Error),
    /// `HEAD` did not resolve to a full commit id.
    #[error("unexpected commit id `{0}`")]
    Commit(String),
}

/// The git operations needed to install a command.
pub trait GitClient: Send + Sync {
    /// Clone `url` into `dest`, which must not exist yet.
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), Error>;
    /// Every tag of the repository at `repo_dir`.
    fn list_tags(&self, repo_dir: &Path) -> Result<Vec<String>, Error>;
    /// Detach the working tree of `repo_dir` at `reference`.
    fn checkout(&self, repo_dir: &Path, reference: &str) -> Result<(), Error>;
    /// The full commit id `HEAD` points at.
    fn head_commit(&self, repo_dir: &Path) -> Result<String, Error>;
}

/// A [`GitClient`] shelling out to the `git` on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGit;

//================================================================================================
// Impls
//================================================================================================

impl GitClient for SystemGit {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), Error> {
        tracing::debug!(%url, dest = %dest.display(), "cloning");
        let args: [&OsStr; 4] = [
            OsStr::new("clone"),
            OsStr::new("--quiet"),
            OsStr::new(url),
            dest.as_os_str(),
        ];
        run_git_command(args).map(drop)
    }

    fn list_tags(&self, repo_dir: &Path) -> Result<Vec<String>, Error> {
        let out = run_git_command(in_dir(repo_dir, &["tag", "--list"]))?;
        Ok(parse_lines(&out))
    }

    fn checkout(&self, repo_dir: &Path, reference: &str) -> Result<(), Error> {
        const CHECKOUT: [&str; 5] = [
            "-c",
            "advice.detachedHead=false",
            "checkout",
            "--quiet",
            "--detach",
        ];

        let mut args = in_dir(repo_dir, &CHECKOUT);
        args.push(OsStr::new(reference));
        match run_git_command(&args) {
            Ok(_) => Ok(()),
            // branches other than the default only exist as remote-tracking refs after a clone
            Err(Error::Failed { .. }) if !reference.starts_with("origin/") => {
                tracing::trace!(%reference, "retrying checkout against origin");
                let remote = format!("origin/{}", reference);
                let mut args = in_dir(repo_dir, &CHECKOUT);
                args.push(OsStr::new(&remote));
                run_git_command(&args).map(drop)
            },
            Err(e) => Err(e),
        }
    }

    fn head_commit(&self, repo_dir: &Path) -> Result<String, Error> {
        let out = run_git_command(in_dir(repo_dir, &["rev-parse", "HEAD"]))?;
        let commit = out.trim();
        if commit.len() != 40 || !commit.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::Commit(commit.to_owned()));
        }
        Ok(commit.to_ascii_lowercase())
    }
}

impl<G: GitClient + ?Sized> TagSource for G {
    type Error = Error;

    fn tags(&self, repo_dir: &Path) -> Result<Vec<String>, Self::Error> {
        self.list_tags(repo_dir)
    }
}

//================================================================================================
// Functions
//================================================================================================

/// The clone url of `repo` on `host`.
pub fn remote_url(host: &str, repo: &Repo) -> String {
    format!("{}/{}.git", host.trim_end_matches('/'), repo)
}

/// Run the git binary, returning its stdout or an error carrying its stderr.
///
/// Terminal prompts are disabled so a missing credential fails rather than blocks.
pub fn run_git_command<I, S>(args: I) -> Result<String, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
    let output = Command::new("git")
        .args(&args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()?;

    if output.status.success() {
        Ok(String::from_utf8(output.stdout)?)
    } else {
        let command = args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        Err(Error::Failed {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

fn in_dir<'a>(dir: &'a Path, args: &'a [&'a str]) -> Vec<&'a OsStr> {
    let mut all = vec![OsStr::new("-C"), dir.as_os_str()];
    all.extend(args.iter().map(OsStr::new));
    all
}

fn parse_lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
