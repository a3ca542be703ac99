//! reviewmark CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "reviewmark",
    version,
    about = "Review mark aggregation and normalization for academic projects"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create starter config, rubric and mark sheet
    Init,

    /// Check a rubric file for common issues
    Validate {
        /// Rubric TOML file
        #[arg(long)]
        rubric: PathBuf,
    },

    /// Compute assessments from files without touching a store
    Normalize {
        /// Rubric TOML file
        #[arg(long)]
        rubric: PathBuf,

        /// Mark sheet TOML file
        #[arg(long)]
        marks: PathBuf,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Save a rubric to the store
    PushRubric {
        /// Rubric TOML file
        #[arg(long)]
        rubric: PathBuf,

        /// Override the program named in the file
        #[arg(long)]
        program: Option<String>,

        /// Override the coordinator named in the file
        #[arg(long)]
        coordinator: Option<String>,

        /// Keep running and autosave the file whenever it changes
        #[arg(long)]
        watch: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Normalize marks and save them for a student or project group
    Submit {
        /// Mark sheet TOML file
        #[arg(long)]
        marks: PathBuf,

        /// Program (defaults to the mark sheet's)
        #[arg(long)]
        program: Option<String>,

        /// Register number of an individual student
        #[arg(long, conflicts_with = "group")]
        student: Option<String>,

        /// Project name of a group
        #[arg(long)]
        group: Option<String>,

        /// Rubric owner
        #[arg(long)]
        coordinator: Option<String>,

        /// Write the outcome as JSON
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Re-write the members a saved outcome failed to save
    Retry {
        /// Outcome JSON written by `submit --output`
        #[arg(long)]
        outcome: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show per-stage submission lateness for a student
    Lateness {
        /// Register number
        #[arg(long)]
        student: String,

        /// Program
        #[arg(long)]
        program: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show a program's assessments
    Roster {
        /// Program
        #[arg(long)]
        program: String,

        /// Project groups to check for diverging members (comma-separated)
        #[arg(long)]
        groups: Option<String>,

        /// Keep polling and reprint on change
        #[arg(long)]
        watch: bool,

        /// Write the report as JSON
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("reviewmark=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { rubric } => commands::validate::execute(rubric),
        Commands::Normalize {
            rubric,
            marks,
            format,
        } => commands::normalize::execute(rubric, marks, format),
        Commands::PushRubric {
            rubric,
            program,
            coordinator,
            watch,
            config,
        } => commands::push_rubric::execute(rubric, program, coordinator, watch, config).await,
        Commands::Submit {
            marks,
            program,
            student,
            group,
            coordinator,
            output,
            config,
        } => {
            commands::submit::execute(marks, program, student, group, coordinator, output, config)
                .await
        }
        Commands::Retry { outcome, config } => commands::retry::execute(outcome, config).await,
        Commands::Lateness {
            student,
            program,
            config,
        } => commands::lateness::execute(student, program, config).await,
        Commands::Roster {
            program,
            groups,
            watch,
            output,
            config,
        } => commands::roster::execute(program, groups, watch, output, config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
