//! `tally stage` — register and list stages.

use clap::{Args, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tally_core::model::{NewStage, Stage};
use tally_core::rules::ClassificationRules;

use crate::cmd::open_store;
use crate::output::{OutputMode, or_unset, pretty_section, render, render_mode};

#[derive(Args, Debug)]
pub struct StageArgs {
    #[command(subcommand)]
    pub command: StageCommand,
}

#[derive(Subcommand, Debug)]
pub enum StageCommand {
    #[command(about = "Register a stage")]
    Add(StageAddArgs),

    #[command(about = "List stages in board order")]
    List,
}

#[derive(Args, Debug)]
pub struct StageAddArgs {
    /// Display name. Prefixes such as "Backlog" or "To Do" and markers such
    /// as "2023 Arşiv" drive KPI classification.
    pub name: String,

    /// Mark the stage as closed (done).
    #[arg(long, conflicts_with = "open")]
    pub closed: bool,

    /// Mark the stage as explicitly open.
    #[arg(long)]
    pub open: bool,

    /// Set the folded flag, used when no closed flag is recorded.
    #[arg(long)]
    pub fold: bool,

    /// Board position.
    #[arg(long, default_value_t = 0)]
    pub sequence: i64,
}

/// A stage as printed by `tally stage list`.
#[derive(Debug, Serialize)]
struct StageRecord {
    id: i64,
    name: String,
    is_closed: Option<bool>,
    fold: Option<bool>,
    sequence: i64,
    closed: bool,
    archive_year: Option<i32>,
}

impl StageRecord {
    fn new(stage: &Stage, rules: &ClassificationRules) -> Self {
        Self {
            id: stage.id.0,
            name: stage.name.clone(),
            is_closed: stage.is_closed,
            fold: stage.fold,
            sequence: stage.sequence,
            closed: stage.closed_flag(),
            archive_year: rules.archive_year_of(Some(stage)),
        }
    }
}

/// Execute `tally stage <command>`.
///
/// # Errors
///
/// Returns an error if the project is not initialized or the store fails.
pub fn run_stage(args: &StageArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let store = open_store(project_root)?;

    match &args.command {
        StageCommand::Add(add) => {
            let mut new = NewStage::named(add.name.as_str()).at(add.sequence);
            if add.closed {
                new = new.closed(true);
            } else if add.open {
                new = new.closed(false);
            }
            if add.fold {
                new = new.folded(true);
            }

            let stage = store.add_stage(new)?;
            let record = StageRecord::new(&stage, store.rules());
            render(output, &record, |r, w| {
                writeln!(
                    w,
                    "Added stage {} '{}' ({})",
                    r.id,
                    r.name,
                    if r.closed { "closed" } else { "open" }
                )
            })
        }
        StageCommand::List => {
            let records: Vec<StageRecord> = store
                .list_stages()?
                .iter()
                .map(|stage| StageRecord::new(stage, store.rules()))
                .collect();
            render_mode(output, &records, render_stages_text, render_stages_pretty)
        }
    }
}

fn render_stages_text(stages: &Vec<StageRecord>, w: &mut dyn Write) -> std::io::Result<()> {
    for stage in stages {
        writeln!(
            w,
            "{}  {}  {}  {}",
            stage.id,
            if stage.closed { "closed" } else { "open" },
            or_unset(stage.archive_year),
            stage.name
        )?;
    }
    Ok(())
}

fn render_stages_pretty(stages: &Vec<StageRecord>, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Stages ({})", stages.len()))?;
    writeln!(w, "{:>4}  {:<6}  {:>7}  NAME", "ID", "STATE", "ARCHIVE")?;
    for stage in stages {
        writeln!(
            w,
            "{:>4}  {:<6}  {:>7}  {}",
            stage.id,
            if stage.closed { "closed" } else { "open" },
            or_unset(stage.archive_year),
            stage.name
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::config::ProjectConfig;
    use tally_core::model::StageId;

    #[test]
    fn record_resolves_closed_and_archive() {
        let rules = ClassificationRules::from_config(&ProjectConfig::default());
        let stage = Stage {
            id: StageId(4),
            name: "2022 arsiv".into(),
            is_closed: None,
            fold: Some(true),
            sequence: 9,
        };
        let record = StageRecord::new(&stage, &rules);
        assert!(record.closed);
        assert_eq!(record.archive_year, Some(2022));

        let mut buf = Vec::new();
        render_stages_text(&vec![record], &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "4  closed  2022  2022 arsiv\n");
    }
}
