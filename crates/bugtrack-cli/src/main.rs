//! bugtrack - Bug tracker with email notifications
//!
//! Talks to the same SQLite database as bugtrack-api.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "bugtrack")]
#[command(about = "Bug tracker with email notifications")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file and create the database
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// List bugs
    List {
        /// Filter by status (open, in_progress, closed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show bug details
    Show {
        /// Bug ID
        id: i64,
    },

    /// Create a new bug
    Create {
        /// Bug title
        title: String,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Priority (low, medium, high)
        #[arg(short, long, default_value = "medium")]
        priority: String,

        /// Developer ID to assign
        #[arg(long)]
        developer: Option<String>,

        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
    },

    /// Update a bug
    Update {
        /// Bug ID
        id: i64,

        #[command(flatten)]
        args: commands::UpdateArgs,
    },

    /// Close a bug
    Close {
        /// Bug ID
        id: i64,
    },

    /// Delete a bug
    Delete {
        /// Bug ID
        id: i64,
    },

    /// Manage developers
    Dev {
        #[command(subcommand)]
        command: DevCommands,
    },

    /// Export all bugs
    Export {
        /// Output format
        format: ExportFormat,

        /// Output file (defaults to bugs.csv or bugs.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Send a test email through the configured relay
    TestEmail {
        /// Recipient (defaults to test_recipient from config)
        to: Option<String>,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum DevCommands {
    /// List developers
    List,

    /// Add a developer
    Add {
        /// Display name
        name: String,

        /// Email address for notifications
        email: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Pdf,
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => commands::init(force),
        Commands::List { status } => commands::list(status, cli.json),
        Commands::Show { id } => commands::show(id, cli.json),
        Commands::Create {
            title,
            description,
            priority,
            developer,
            due,
        } => commands::create(&title, &description, &priority, developer, due, cli.json),
        Commands::Update { id, args } => commands::update(id, args, cli.json).await,
        Commands::Close { id } => commands::close(id, cli.json).await,
        Commands::Delete { id } => commands::delete(id, cli.json),
        Commands::Dev { command } => match command {
            DevCommands::List => commands::dev_list(cli.json),
            DevCommands::Add { name, email } => commands::dev_add(&name, &email, cli.json),
        },
        Commands::Export { format, output } => commands::export(format, output),
        Commands::TestEmail { to } => commands::test_email(to).await,
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => commands::config_show(cli.json),
        },
    }
}
