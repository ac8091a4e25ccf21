use std::fmt::Write as _;
use std::io::{IsTerminal, Write};

use ccmd_core::manifest::ConfigError;
use ccmd_core::sync::{Installer, SyncOptions, SyncPlan, SyncReport, SyncStatus};
use ccmd_core::{BoxError, Reconciler};
use clap::Parser;
use dialoguer::Confirm;

use crate::cli::project::Project;

#[derive(Parser, Debug)]
#[command(next_help_heading = "Sync Options")]
pub struct Args {
    /// Show what would change without touching anything
    #[arg(long)]
    dry_run: bool,
    /// Remove undeclared commands without asking
    #[arg(long, short)]
    force: bool,
}

pub(super) fn run<I: Installer + ?Sized>(
    project: &Project,
    installer: &I,
    args: Args,
) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    reconcile(project, installer, args, prompt, &mut stdout)
}

/// Plan and apply a sync, writing the plan and then every outcome to `out`.
fn reconcile<I, F>(
    project: &Project,
    installer: &I,
    args: Args,
    confirm: F,
    out: &mut dyn Write,
) -> anyhow::Result<()>
where
    I: Installer + ?Sized,
    F: FnOnce(&SyncPlan) -> Result<bool, BoxError>,
{
    let doc = match project.manifest().load() {
        Ok(doc) => doc,
        Err(e @ ConfigError::Missing(_)) => {
            return Err(anyhow::anyhow!(e).context("run `ccmd init` to create a manifest"));
        },
        Err(e) => return Err(e.into()),
    };
    let lock = project.lock()?;
    let options = SyncOptions {
        dry_run: args.dry_run,
        force: args.force,
    };

    let reconciler = Reconciler::new(doc.config(), &lock, installer);
    write!(out, "{}", reconciler.plan()?)?;
    out.flush()?;

    let report = reconciler.run(options, confirm)?;
    match report.status {
        SyncStatus::DryRun => {
            tracing::info!("dry run, nothing was changed");
            return Ok(());
        },
        SyncStatus::Cancelled => return Ok(()),
        SyncStatus::Completed => {},
    }

    write!(out, "{}", render_outcomes(&report))?;
    if !report.is_success() {
        anyhow::bail!(
            "{} of {} sync step(s) failed",
            report.failures().count(),
            report.outcomes.len()
        );
    }
    tracing::info!(changes = report.outcomes.len(), "in sync");
    Ok(())
}

fn render_outcomes(report: &SyncReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        let _ = match &outcome.error {
            None => writeln!(out, "ok     {} {}", outcome.operation, outcome.name),
            Some(e) => writeln!(out, "failed {} {}: {}", outcome.operation, outcome.name, e),
        };
    }
    out
}

fn prompt(plan: &SyncPlan) -> Result<bool, BoxError> {
    if !std::io::stdin().is_terminal() {
        tracing::warn!("refusing to remove commands without a terminal, pass `--force` to proceed");
        return Ok(false);
    }
    let confirmed = Confirm::new()
        .with_prompt(format!("Remove {} command(s)?", plan.to_remove.len()))
        .default(false)
        .interact()?;
    Ok(confirmed)
}
