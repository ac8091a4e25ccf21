mod add;
mod init;
mod list;
mod remove;
mod sync;
mod update;

use clap::Subcommand;
use config::Config;

use super::Args;
use super::project::Project;

#[derive(Subcommand)]
pub(super) enum Commands {
    /// Create a new command manifest.
    ///
    /// Writes an empty `ccmd.toml` in the current directory. Fails if one already exists.
    #[command(verbatim_doc_comment)]
    Init(init::Args),
    /// Declare and install commands.
    ///
    /// Each command is given as `owner/repo` or `owner/repo@version`, where version is
    /// an exact tag, a semantic version constraint such as `^1.2`, `latest`, or a
    /// branch or commit. The command is installed before it is declared, so a failed
    /// install leaves the manifest untouched.
    #[command(verbatim_doc_comment)]
    Add(add::Args),
    /// Undeclare and uninstall commands.
    ///
    /// Commands may be named by their command name or by `owner/repo`.
    #[command(verbatim_doc_comment)]
    Remove(remove::Args),
    /// Reinstall a command, optionally at a new version.
    ///
    /// Reports whether the installed version moved up, down, or stayed put.
    #[command(verbatim_doc_comment)]
    Update(update::Args),
    /// List installed commands.
    #[command(verbatim_doc_comment)]
    List(list::Args),
    /// Converge installed commands with the manifest.
    ///
    /// Installs what is declared but not installed and removes what is installed but
    /// no longer declared. Commands present in both are left alone. Removals ask for
    /// confirmation unless `--force` is given.
    #[command(verbatim_doc_comment)]
    Sync(sync::Args),
}

pub fn run(args: Args, config: Config) -> anyhow::Result<()> {
    let project = Project::detect(&config)?;
    match args.command {
        Commands::Init(args) => init::run(&project, args)?,
        Commands::Add(args) => add::run(&project, &project.installer(), args)?,
        Commands::Remove(args) => remove::run(&project, &project.installer(), args)?,
        Commands::Update(args) => update::run(&project, &project.installer(), args)?,
        Commands::List(args) => list::run(&project, args)?,
        Commands::Sync(args) => sync::run(&project, &project.installer(), args)?,
    }
    Ok(())
}

#[cfg(test)]
mod fake {
    //! An in-memory project and installer for exercising command handlers.

    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use ccmd_core::fs::MemoryFs;
    use ccmd_core::sync::Installer;
    use ccmd_core::{BoxError, LockEntry, Repo};
    use chrono::Utc;

    use super::Project;

    pub(super) const COMMIT: &str = "fedcba9876543210fedcba9876543210fedcba98";

    /// Tags every fake repository advertises.
    pub(super) const TAGS: [&str; 3] = ["v1.0.0", "v1.1.0", "v2.0.0"];

    #[derive(Default)]
    pub(super) struct FakeInstaller {
        pub(super) installed: Mutex<BTreeMap<String, LockEntry>>,
        pub(super) failing: Vec<String>,
    }

    impl Installer for FakeInstaller {
        fn install(&self, repo: &Repo, spec: &str, name: &str) -> Result<LockEntry, BoxError> {
            if self.failing.iter().any(|f| f == name) {
                return Err(format!("failed to clone {repo}").into());
            }
            let version = ccmd_core::version::resolve(&TAGS, spec)?.to_string();
            let mut installed = self.installed.lock().map_err(|e| e.to_string())?;
            let mut entry = LockEntry::new(repo, version, COMMIT, Utc::now());
            if let Some(previous) = installed.get(name) {
                entry.installed_at = previous.installed_at;
            }
            installed.insert(name.to_owned(), entry.clone());
            Ok(entry)
        }

        fn remove(&self, name: &str) -> Result<(), BoxError> {
            match self.installed.lock().map_err(|e| e.to_string())?.remove(name) {
                Some(_) => Ok(()),
                None => Err(format!("command '{name}' is not installed").into()),
            }
        }

        fn list_installed(&self) -> Result<Vec<LockEntry>, BoxError> {
            Ok(self
                .installed
                .lock()
                .map_err(|e| e.to_string())?
                .values()
                .cloned()
                .collect())
        }
    }

    impl FakeInstaller {
        pub(super) fn names(&self) -> Vec<String> {
            self.installed
                .lock()
                .map(|i| i.keys().cloned().collect())
                .unwrap_or_default()
        }
    }

    pub(super) fn project(manifest: Option<&str>) -> anyhow::Result<(Arc<MemoryFs>, Project)> {
        let fs = Arc::new(MemoryFs::new());
        let root = PathBuf::from("/work");
        if let Some(manifest) = manifest {
            use ccmd_core::fs::FileSystem;
            fs.write(&root.join(ccmd_core::MANIFEST_NAME), manifest.as_bytes())?;
        }
        let project = Project::at(root, fs.clone(), &config::Config::default());
        Ok((fs, project))
    }
}
