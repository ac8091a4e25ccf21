use ccmd_core::manifest::ConfigError;
use ccmd_core::sync::Installer;
use ccmd_core::{ConfigStore, LockStore, Repo};
use clap::Parser;

use crate::cli::project::Project;

#[derive(Parser, Debug)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// The commands to remove, by command name or `owner/repo`
    #[arg(required = true)]
    commands: Vec<String>,
}

pub(super) fn run<I: Installer + ?Sized>(
    project: &Project,
    installer: &I,
    args: Args,
) -> anyhow::Result<()> {
    let store = project.manifest();
    let lock = project.lock()?;
    let mut failed = 0;

    for key in &args.commands {
        if let Err(e) = remove_one(&store, &lock, installer, key) {
            tracing::error!(command = %key, error = %format!("{e:#}"), "failed to remove command");
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} command(s) could not be removed", failed);
    }
    Ok(())
}

fn remove_one<I: Installer + ?Sized>(
    store: &ConfigStore,
    lock: &LockStore,
    installer: &I,
    key: &str,
) -> anyhow::Result<()> {
    let declared = store
        .load_opt()?
        .and_then(|doc| doc.config().find(key).map(|c| c.repo().to_owned()));
    let name = match &declared {
        Some(repo) => repo.name().to_owned(),
        None => key
            .parse::<Repo>()
            .map(|r| r.name().to_owned())
            .unwrap_or_else(|_| key.to_owned()),
    };
    let recorded = lock.get_command(&name);

    if declared.is_none() && recorded.is_none() {
        return Err(ConfigError::NotFound(key.to_owned()).into());
    }

    if let Err(e) = installer.remove(&name) {
        if recorded.is_some() {
            return Err(anyhow::anyhow!(e).context(format!("failed to uninstall {}", name)));
        }
        tracing::warn!(command.name = %name, error = %e, "command was not installed");
    }

    if let Some(repo) = &declared {
        store.remove(repo)?;
    }
    if lock.remove_command(&name).is_some() {
        lock.save()?;
    }
    tracing::info!(command.name = %name, "removed");
    Ok(())
}
