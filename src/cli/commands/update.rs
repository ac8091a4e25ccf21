use std::cmp::Ordering;

use anyhow::Context;
use ccmd_core::manifest::{ConfigCommand, ConfigError};
use ccmd_core::sync::Installer;
use ccmd_core::version::{self, ResolveError};
use ccmd_core::Repo;
use clap::Parser;

use crate::cli::project::Project;

#[derive(Parser, Debug)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// The command to update, as `owner/repo`
    repo: Repo,
    /// A new version specifier to declare before reinstalling
    #[arg(long)]
    version: Option<String>,
}

/// How the installed version moved.
#[derive(Debug, PartialEq, Eq)]
enum Change {
    Installed,
    Upgraded,
    Downgraded,
    Unchanged,
    Changed,
}

pub(super) fn run<I: Installer + ?Sized>(
    project: &Project,
    installer: &I,
    args: Args,
) -> anyhow::Result<()> {
    let store = project.manifest();
    let lock = project.lock()?;
    let span = tracing::info_span!("update", repo = %args.repo);
    let _enter = span.enter();

    let doc = store.load()?;
    let declared = doc
        .config()
        .commands()
        .iter()
        .find(|c| c.repo() == &args.repo)
        .ok_or_else(|| ConfigError::NotFound(args.repo.to_string()))?;
    let target = match args.version {
        Some(version) => ConfigCommand::new(args.repo.to_owned(), Some(version))?,
        None => declared.to_owned(),
    };

    let previous = lock.get_command(target.name());
    let entry = installer
        .install(target.repo(), target.version_spec(), target.name())
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("failed to install {}", target))?;

    if &target != declared {
        store.update(target.repo(), target.declared_version().map(ToOwned::to_owned))?;
    }
    let change = classify(previous.as_ref().map(|e| e.version.as_str()), &entry.version);
    lock.add_command(entry.to_owned())?;
    lock.save()?;

    let from = previous.map(|e| e.version).unwrap_or_default();
    match change {
        Change::Installed => {
            tracing::info!(command.name = %entry.name, version = %entry.version, "installed")
        },
        Change::Upgraded => {
            tracing::info!(command.name = %entry.name, %from, to = %entry.version, "upgraded")
        },
        Change::Downgraded => {
            tracing::warn!(command.name = %entry.name, %from, to = %entry.version, "downgraded")
        },
        Change::Unchanged => {
            tracing::info!(command.name = %entry.name, version = %entry.version, "already up to date")
        },
        Change::Changed => {
            tracing::info!(command.name = %entry.name, %from, to = %entry.version, "changed")
        },
    }
    Ok(())
}

fn classify(previous: Option<&str>, current: &str) -> Change {
    let Some(previous) = previous else {
        return Change::Installed;
    };
    match version::compare(current, previous) {
        Ok(Ordering::Greater) => Change::Upgraded,
        Ok(Ordering::Less) => Change::Downgraded,
        Ok(Ordering::Equal) => Change::Unchanged,
        Err(ResolveError::NotComparable(..)) => {
            tracing::debug!(%previous, %current, "versions are not comparable");
            Change::Changed
        },
        Err(e) => {
            tracing::debug!(error = %e, "could not compare versions");
            Change::Changed
        },
    }
}

#[cfg(test)]
mod test {
    use super::super::fake::{self, FakeInstaller};
    use super::*;

    fn setup(manifest: &str) -> anyhow::Result<(Project, FakeInstaller)> {
        let (_, project) = fake::project(Some(manifest))?;
        let installer = FakeInstaller::default();
        for command in project.manifest().load()?.config().commands() {
            let entry = installer
                .install(command.repo(), command.version_spec(), command.name())
                .map_err(|e| anyhow::anyhow!(e))?;
            let lock = project.lock()?;
            lock.add_command(entry)?;
            lock.save()?;
        }
        Ok((project, installer))
    }

    #[test]
    fn changes_declared_version() -> anyhow::Result<()> {
        let (project, installer) = setup("commands = [\"acme/review@v1.0.0\"]\n")?;

        run(&project, &installer, Args {
            repo: "acme/review".parse()?,
            version: Some("^2".into()),
        })?;

        let doc = project.manifest().load()?;
        assert_eq!(doc.config().commands()[0].to_string(), "acme/review@^2");
        let entry = project.lock()?.get_command("review");
        assert_eq!(entry.map(|e| e.version), Some("v2.0.0".into()));
        Ok(())
    }

    #[test]
    fn reinstalls_without_version() -> anyhow::Result<()> {
        let (project, installer) = setup("commands = [\"acme/review\"]\n")?;
        let before = project.manifest().load()?.to_string();

        run(&project, &installer, Args {
            repo: "acme/review".parse()?,
            version: None,
        })?;

        assert_eq!(project.manifest().load()?.to_string(), before);
        assert_eq!(project.lock()?.len(), 1);
        Ok(())
    }

    #[test]
    fn undeclared_repo_is_not_found() -> anyhow::Result<()> {
        let (project, installer) = setup("commands = []\n")?;

        let err = run(&project, &installer, Args {
            repo: "acme/ghost".parse()?,
            version: None,
        })
        .unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
        assert!(installer.names().is_empty());
        Ok(())
    }

    #[test]
    fn failed_install_keeps_declaration() -> anyhow::Result<()> {
        let (project, _) = setup("commands = [\"acme/review@v1.0.0\"]\n")?;
        let installer = FakeInstaller {
            failing: vec!["review".into()],
            ..Default::default()
        };

        assert!(
            run(&project, &installer, Args {
                repo: "acme/review".parse()?,
                version: Some("v2.0.0".into()),
            })
            .is_err()
        );
        let doc = project.manifest().load()?;
        assert_eq!(doc.config().commands()[0].to_string(), "acme/review@v1.0.0");
        Ok(())
    }

    #[test]
    fn classifies_version_moves() {
        assert_eq!(classify(None, "v1.0.0"), Change::Installed);
        assert_eq!(classify(Some("v1.0.0"), "v1.1.0"), Change::Upgraded);
        assert_eq!(classify(Some("v2.0.0"), "v1.1.0"), Change::Downgraded);
        assert_eq!(classify(Some("v1.0.0"), "1.0.0"), Change::Unchanged);
        assert_eq!(classify(Some("main"), "main"), Change::Unchanged);
        assert_eq!(classify(Some("main"), "v1.0.0"), Change::Changed);
    }
}
