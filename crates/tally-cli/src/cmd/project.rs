//! `tally project` — register and list projects.

use clap::{Args, Subcommand};
use std::path::Path;

use crate::cmd::open_store;
use crate::output::{OutputMode, pretty_section, render, render_mode};

#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[command(subcommand)]
    pub command: ProjectCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    #[command(about = "Register a project")]
    Add(ProjectAddArgs),

    #[command(about = "List projects")]
    List,
}

#[derive(Args, Debug)]
pub struct ProjectAddArgs {
    /// Unique project name.
    pub name: String,
}

/// Execute `tally project <command>`.
///
/// # Errors
///
/// Returns an error if the project is not initialized, the name is taken,
/// or the store fails.
pub fn run_project(
    args: &ProjectArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let store = open_store(project_root)?;

    match &args.command {
        ProjectCommand::Add(add) => {
            let project = store.add_project(&add.name)?;
            render(output, &project, |p, w| {
                writeln!(w, "Added project {} '{}'", p.id, p.name)
            })
        }
        ProjectCommand::List => {
            let projects = store.list_projects()?;
            render_mode(
                output,
                &projects,
                |projects, w| {
                    for project in projects {
                        writeln!(w, "{}  {}", project.id, project.name)?;
                    }
                    Ok(())
                },
                |projects, w| {
                    pretty_section(w, &format!("Projects ({})", projects.len()))?;
                    for project in projects {
                        writeln!(w, "{:>4}  {}", project.id, project.name)?;
                    }
                    Ok(())
                },
            )
        }
    }
}
