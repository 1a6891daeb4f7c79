use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use repowiki::ClassifyType;
use repowiki::cli::commands::overview::OverviewOptions;

#[derive(Parser)]
#[command(name = "repowiki")]
#[command(version, about = "LLM-written overview documents for code repositories")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the overview document for a repository
    Overview {
        #[arg(long, help = "File containing the repository catalogue")]
        catalog: PathBuf,
        #[arg(long, help = "README file")]
        readme: PathBuf,
        #[arg(long, help = "Repository URL")]
        repo: String,
        #[arg(long, default_value = "main", help = "Branch name")]
        branch: String,
        #[arg(long, default_value = ".", help = "Checked-out repository for file tools")]
        workdir: PathBuf,
        #[arg(long, help = "Repository classification (e.g. Libraries, CLITools)")]
        classify: Option<ClassifyType>,
        #[arg(long, help = "Chat model override")]
        model: Option<String>,
        #[arg(long, help = "Directory of prompt templates overriding the built-ins")]
        templates: Option<PathBuf>,
        #[arg(long, short, help = "Output file (stdout when omitted)")]
        output: Option<PathBuf>,
        #[arg(long, help = "Do not load the code-analysis prompt bundle")]
        no_code_analysis: bool,
        #[arg(long, short, help = "Configuration file to use")]
        config: Option<PathBuf>,
    },

    /// Show the output-token cap resolved for a model
    Tokens {
        model: String,
        #[arg(long, help = "TOML model token table replacing the built-in one")]
        table: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources, secrets omitted)
    Show {
        #[arg(long, help = "Print as JSON instead of TOML")]
        json: bool,
    },
    /// Show configuration file paths
    Path,
}

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Overview {
            catalog,
            readme,
            repo,
            branch,
            workdir,
            classify,
            model,
            templates,
            output,
            no_code_analysis,
            config,
        } => {
            repowiki::cli::commands::overview::run(OverviewOptions {
                catalog,
                readme,
                repository_url: repo,
                branch,
                working_dir: workdir,
                classification: classify,
                model,
                templates,
                output,
                no_code_analysis,
                config_file: config,
            })?;
        }
        Commands::Tokens { model, table } => {
            repowiki::cli::commands::tokens::run(&model, table.as_deref())?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { json } => {
                repowiki::cli::commands::config::show(json)?;
            }
            ConfigAction::Path => {
                repowiki::cli::commands::config::path()?;
            }
        },
    }

    Ok(())
}
