use clap::Parser;

use crate::cli::project::Project;

#[derive(Parser, Debug)]
#[command(next_help_heading = "Init Options")]
#[group(id = "init_args")]
pub struct Args {
    /// A name for the project, recorded in the manifest
    #[arg(long)]
    name: Option<String>,
}

pub(super) fn run(project: &Project, args: Args) -> anyhow::Result<()> {
    let store = project.manifest();
    store.init(args.name)?;
    tracing::info!(manifest = %store.path().display(), "successfully initialized");
    Ok(())
}

#[test]
fn init_writes_manifest() -> anyhow::Result<()> {
    use ccmd_core::fs::FileSystem;

    let (fs, project) = super::fake::project(None)?;
    run(&project, Args {
        name: Some("demo".into()),
    })?;

    let doc = project.manifest().load()?;
    assert_eq!(doc.config().metadata().name.as_deref(), Some("demo"));
    assert!(doc.config().commands().is_empty());
    assert!(fs.exists(&project.root().join(ccmd_core::MANIFEST_NAME))?);
    Ok(())
}

#[test]
fn init_refuses_existing_manifest() -> anyhow::Result<()> {
    let (_, project) = super::fake::project(Some("commands = []\n"))?;
    let err = run(&project, Args { name: None }).unwrap_err();
    assert!(err.to_string().contains("already exists"));
    Ok(())
}
