#![forbid(unsafe_code)]

mod actor;
mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::path::Path;
use std::process::ExitCode;
use tally_core::config::load_user_config;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tally: first-done tracking and quarterly KPI rollups",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output (alias for `--format json`).
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Actor recorded on user changes (defaults to `TALLY_ACTOR`, then `USER`).
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        let user_output = match load_user_config() {
            Ok(config) => config.output,
            Err(error) => {
                warn!(error = %error, "ignoring unreadable user config");
                None
            }
        };
        resolve_output_mode(self.format, self.json, user_output.as_deref())
    }

    fn actor(&self) -> String {
        actor::resolve_actor(self.actor.as_deref())
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a tally project",
        long_about = "Create .tally/ with a default config and a migrated store in the current directory.",
        after_help = "EXAMPLES:\n    # Initialize a project in the current directory\n    tally init\n\n    # Rewrite the default config\n    tally init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Manage stages",
        long_about = "Register and list the stages work items move through.",
        after_help = "EXAMPLES:\n    # Add board stages\n    tally stage add Backlog --sequence 1\n    tally stage add \"To Do\" --sequence 2\n    tally stage add Done --closed --sequence 9\n\n    # Archive stage reporting everything under 2023\n    tally stage add \"2023 Arşiv\" --fold\n\n    # List stages\n    tally stage list"
    )]
    Stage(cmd::stage::StageArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Manage projects",
        after_help = "EXAMPLES:\n    # Add a project\n    tally project add Apollo\n\n    # List projects\n    tally project list --json"
    )]
    Project(cmd::project::ProjectArgs),

    #[command(
        next_help_heading = "Items",
        about = "Create a work item",
        long_about = "Create a work item. An item created in a closed stage is done as of its creation.",
        after_help = "EXAMPLES:\n    # Create a task\n    tally create --title \"Quarterly report\"\n\n    # Create in a stage and project with two assignees\n    tally create -t \"Ship login\" --stage \"To Do\" --project Apollo -a ayse -a mehmet"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Items",
        about = "Move a work item to another stage",
        long_about = "Move a work item. The first move into a closed stage records its done time.",
        after_help = "EXAMPLES:\n    # Close an item\n    tally move tk-1a2b3c4d Done\n\n    # Clear the stage\n    tally move tk-1a2b3c4d --unstage"
    )]
    Move(cmd::move_cmd::MoveArgs),

    #[command(
        next_help_heading = "Items",
        about = "Assign people to a work item",
        after_help = "EXAMPLES:\n    tally assign tk-1a2b3c4d ayse mehmet"
    )]
    Assign(cmd::assign::AssignArgs),

    #[command(
        next_help_heading = "Items",
        about = "Remove assignees from a work item",
        after_help = "EXAMPLES:\n    tally unassign tk-1a2b3c4d mehmet"
    )]
    Unassign(cmd::assign::AssignArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one work item",
        long_about = "Show a work item with its stored and reported period and its change history.",
        after_help = "EXAMPLES:\n    tally show tk-1a2b3c4d\n\n    # Emit machine-readable output\n    tally show tk-1a2b3c4d --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Read",
        about = "List work items",
        after_help = "EXAMPLES:\n    # Items done at least once in 2024 Q1\n    tally list --done --year 2024 --quarter 1\n\n    # Open items for one assignee\n    tally list --open --assignee ayse"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Report",
        about = "Show KPI rows",
        long_about = "Aggregate items per assignee, project, year and quarter into backlog/todo/in-progress/done counts.",
        after_help = "EXAMPLES:\n    # All rows\n    tally kpi\n\n    # One person's 2024 rows as JSON\n    tally kpi --assignee ayse --year 2024 --json"
    )]
    Kpi(cmd::kpi::KpiArgs),

    #[command(
        next_help_heading = "Report",
        about = "List the items behind a KPI count",
        long_about = "Build the drill-down filter for one KPI row and metric and list the matching items. Omitted key flags address undefined row components.",
        after_help = "EXAMPLES:\n    # Done items of ayse in 2024 Q1\n    tally drill --assignee ayse --year 2024 --quarter 1 --metric done\n\n    # Unassigned archive row for 2023\n    tally drill --year 2023 --metric done --json"
    )]
    Drill(cmd::drill::DrillArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "tally=debug,tally_core=debug,info"
        } else {
            "tally=info,tally_core=info,warn"
        })
    });

    let format = env::var("TALLY_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, output, project_root),
        Commands::Stage(args) => cmd::stage::run_stage(args, output, project_root),
        Commands::Project(args) => cmd::project::run_project(args, output, project_root),
        Commands::Create(args) => cmd::create::run_create(args, &cli.actor(), output, project_root),
        Commands::Move(args) => cmd::move_cmd::run_move(args, &cli.actor(), output, project_root),
        Commands::Assign(args) => cmd::assign::run_assign(args, &cli.actor(), output, project_root),
        Commands::Unassign(args) => {
            cmd::assign::run_unassign(args, &cli.actor(), output, project_root)
        }
        Commands::Show(args) => cmd::show::run_show(args, output, project_root),
        Commands::List(args) => cmd::list::run_list(args, output, project_root),
        Commands::Kpi(args) => cmd::kpi::run_kpi(args, output, project_root),
        Commands::Drill(args) => cmd::drill::run_drill(args, output, project_root),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = cli.output_mode();
    debug!(?output, "resolved output mode");

    let result =
        env::current_dir().map_err(anyhow::Error::from).and_then(|root| run(&cli, output, &root));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            debug!(error = ?error, "command failed");
            if let Err(render_failure) = render_error(output, &CliError::from_anyhow(&error)) {
                eprintln!("error: {error:#} ({render_failure})");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_before_and_after_subcommand() {
        let cli = Cli::parse_from(["tally", "--json", "kpi"]);
        assert!(cli.json);
        let cli = Cli::parse_from(["tally", "kpi", "--json"]);
        assert!(cli.json);
        assert_eq!(cli.output_mode(), OutputMode::Json);
    }

    #[test]
    fn format_flag_parses() {
        let cli = Cli::parse_from(["tally", "list", "--format", "text"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
        assert_eq!(cli.output_mode(), OutputMode::Text);
    }

    #[test]
    fn actor_flag_is_global() {
        let cli = Cli::parse_from(["tally", "move", "tk-1", "Done", "--actor", "ayse"]);
        assert_eq!(cli.actor(), "ayse");
    }

    #[test]
    fn stage_add_parses_flags() {
        let cli = Cli::parse_from([
            "tally", "stage", "add", "Done", "--closed", "--sequence", "9",
        ]);
        let Commands::Stage(args) = cli.command else {
            panic!("expected stage command");
        };
        let cmd::stage::StageCommand::Add(add) = args.command else {
            panic!("expected stage add");
        };
        assert_eq!(add.name, "Done");
        assert!(add.closed);
        assert_eq!(add.sequence, 9);
    }

    #[test]
    fn stage_add_rejects_closed_and_open() {
        let result = Cli::try_parse_from(["tally", "stage", "add", "X", "--closed", "--open"]);
        assert!(result.is_err());
    }

    #[test]
    fn create_collects_assignees() {
        let cli = Cli::parse_from(["tally", "create", "-t", "Ship", "-a", "ayse", "-a", "mehmet"]);
        let Commands::Create(args) = cli.command else {
            panic!("expected create command");
        };
        assert_eq!(args.assignees, vec!["ayse", "mehmet"]);
    }

    #[test]
    fn move_requires_stage_or_unstage() {
        assert!(Cli::try_parse_from(["tally", "move", "tk-1"]).is_err());
        assert!(Cli::try_parse_from(["tally", "move", "tk-1", "--unstage"]).is_ok());
        assert!(Cli::try_parse_from(["tally", "move", "tk-1", "Done", "--unstage"]).is_err());
    }

    #[test]
    fn kpi_quarter_accepts_q_prefix() {
        let cli = Cli::parse_from(["tally", "kpi", "--quarter", "Q3", "--year", "2024"]);
        let Commands::Kpi(args) = cli.command else {
            panic!("expected kpi command");
        };
        assert_eq!(args.quarter, Some(tally_core::model::Quarter::Q3));
        assert_eq!(args.year, Some(2024));
    }

    #[test]
    fn drill_metric_defaults_to_total() {
        let cli = Cli::parse_from(["tally", "drill", "--year", "2023"]);
        let Commands::Drill(args) = cli.command else {
            panic!("expected drill command");
        };
        assert_eq!(args.metric, tally_core::drilldown::Metric::Total);

        let cli = Cli::parse_from(["tally", "drill", "-m", "in-progress"]);
        let Commands::Drill(args) = cli.command else {
            panic!("expected drill command");
        };
        assert_eq!(args.metric, tally_core::drilldown::Metric::InProgress);
    }

    #[test]
    fn invalid_metric_is_rejected() {
        assert!(Cli::try_parse_from(["tally", "drill", "--metric", "blocked"]).is_err());
    }

    #[test]
    fn all_subcommands_listed() {
        let command = Cli::command();
        let names: Vec<&str> = command.get_subcommands().map(clap::Command::get_name).collect();
        for expected in [
            "init", "stage", "project", "create", "move", "assign", "unassign", "show", "list",
            "kpi", "drill",
        ] {
            assert!(names.contains(&expected), "missing subcommand {expected}");
        }
    }
}
