use std::fmt::Write;

use ccmd_core::LockEntry;
use clap::Parser;

use crate::cli::project::Project;

#[derive(Parser, Debug)]
#[command(next_help_heading = "List Options")]
pub struct Args {
    /// Print the ledger entries as JSON
    #[arg(long)]
    json: bool,
}

pub(super) fn run(project: &Project, args: Args) -> anyhow::Result<()> {
    let entries = project.lock()?.list_commands();
    let out = if args.json {
        serde_json::to_string_pretty(&entries)?
    } else {
        render(&entries)
    };
    println!("{}", out);
    Ok(())
}

fn render(entries: &[LockEntry]) -> String {
    if entries.is_empty() {
        return "no commands installed".into();
    }
    let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{:width$}  {:<10} {:<30} {} {}",
            entry.name,
            entry.version,
            entry.source.to_string(),
            &entry.commit[..entry.commit.len().min(7)],
            entry.updated_at.format("%Y-%m-%d"),
        );
    }
    out.truncate(out.trim_end().len());
    out
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};

    use super::super::fake::{self, COMMIT};
    use super::*;

    #[test]
    fn renders_rows() -> anyhow::Result<()> {
        let at = Utc
            .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
            .single()
            .ok_or_else(|| anyhow::anyhow!("ambiguous timestamp"))?;
        let entries = [
            LockEntry::new(&"acme/review".parse()?, "v1.1.0", COMMIT, at),
            LockEntry::new(&"acme/lint-all".parse()?, "main", COMMIT, at),
        ];

        let out = render(&entries);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("review    v1.1.0"));
        assert!(lines[0].ends_with("fedcba9 2026-01-02"));
        assert!(lines[1].starts_with("lint-all  main"));
        Ok(())
    }

    #[test]
    fn renders_empty_ledger() {
        assert_eq!(render(&[]), "no commands installed");
    }

    #[test]
    fn lists_from_ledger() -> anyhow::Result<()> {
        let (_, project) = fake::project(None)?;
        run(&project, Args { json: true })?;
        Ok(())
    }
}
