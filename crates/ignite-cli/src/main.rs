mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    draft::DraftSubcommand, lesson::LessonSubcommand, lesson::StepSubcommand, mode::ModeSubcommand,
    project::ProjectSubcommand, state::StateSubcommand,
};
use ignite_core::types::Actor;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ignite",
    about = "Projects, lessons and steps with a draft/publish workflow and progress tracking",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .ignite/)
    #[arg(long, global = true, env = "IGNITE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Acting user id
    #[arg(long, global = true, env = "IGNITE_USER", default_value_t = 1)]
    user: u64,

    /// Act with reviewer rights
    #[arg(long, global = true)]
    superuser: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Ignite in the current directory
    Init {
        /// Project name written to config.yaml (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Manage lessons of a project
    Lesson {
        #[command(subcommand)]
        subcommand: LessonSubcommand,
    },

    /// Manage steps of a lesson
    Step {
        #[command(subcommand)]
        subcommand: StepSubcommand,
    },

    /// Edit a published project through its draft
    Draft {
        #[command(subcommand)]
        subcommand: DraftSubcommand,
    },

    /// Move projects and drafts through edit, review, ready and published
    Mode {
        #[command(subcommand)]
        subcommand: ModeSubcommand,
    },

    /// Track progress through a project
    State {
        #[command(subcommand)]
        subcommand: StateSubcommand,
    },

    /// Run the HTTP API server
    Serve {
        /// Port to listen on (default: server.port from config.yaml)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let actor = Actor {
        user: cli.user,
        is_superuser: cli.superuser,
    };

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref()),
        Commands::Project { subcommand } => cmd::project::run(&root, &actor, subcommand, cli.json),
        Commands::Lesson { subcommand } => cmd::lesson::run_lesson(&root, &actor, subcommand, cli.json),
        Commands::Step { subcommand } => cmd::lesson::run_step(&root, &actor, subcommand, cli.json),
        Commands::Draft { subcommand } => cmd::draft::run(&root, &actor, subcommand, cli.json),
        Commands::Mode { subcommand } => cmd::mode::run(&root, &actor, subcommand, cli.json),
        Commands::State { subcommand } => cmd::state::run(&root, &actor, subcommand, cli.json),
        Commands::Serve { port } => cmd::serve::run(&root, port),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
