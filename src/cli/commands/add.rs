use anyhow::Context;
use ccmd_core::manifest::{ConfigCommand, ConfigError};
use ccmd_core::sync::Installer;
use clap::Parser;

use crate::cli::project::Project;

#[derive(Parser, Debug)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// The commands to add, as `owner/repo` or `owner/repo@version`
    #[arg(required = true)]
    commands: Vec<ConfigCommand>,
}

pub(super) fn run<I: Installer + ?Sized>(
    project: &Project,
    installer: &I,
    args: Args,
) -> anyhow::Result<()> {
    let store = project.manifest();
    let lock = project.lock()?;
    let mut failed = 0;

    for command in args.commands {
        let span = tracing::info_span!("add", repo = %command.repo());
        let _enter = span.enter();

        if let Err(e) = add_one(&store, &lock, installer, command) {
            tracing::error!(error = %format!("{e:#}"), "failed to add command");
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} command(s) could not be added", failed);
    }
    Ok(())
}

fn add_one<I: Installer + ?Sized>(
    store: &ccmd_core::ConfigStore,
    lock: &ccmd_core::LockStore,
    installer: &I,
    command: ConfigCommand,
) -> anyhow::Result<()> {
    let declared = store.load_opt()?;
    if declared.is_some_and(|doc| doc.config().contains(command.repo())) {
        return Err(ConfigError::Duplicate(command.repo().to_owned()).into());
    }

    let entry = installer
        .install(command.repo(), command.version_spec(), command.name())
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("failed to install {}", command))?;

    store.add(command)?;
    lock.add_command(entry.to_owned())?;
    lock.save()?;
    tracing::info!(command.name = %entry.name, version = %entry.version, "added");
    Ok(())
}
