use clap::{Parser, Subcommand};
use modsync::SyncError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;

/// Default remote asset index for the nightly modpack.
const DEFAULT_INDEX_URL: &str =
    "https://raw.githubusercontent.com/GTNewHorizons/DreamAssemblerXXL/master/gtnh-assets.json";

/// Default Maven repository queried in `--latest` mode.
const DEFAULT_MAVEN_URL: &str =
    "https://nexus.gtnewhorizons.com/repository/public/com/github/GTNewHorizons";

#[derive(Parser)]
#[command(name = "modsync")]
#[command(about = "Keep modpack installations in sync with the nightly asset manifest")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize one or more installations against the asset manifest
    Sync {
        /// Re-resolve each mod to its latest published version
        #[arg(short = 'l', long)]
        latest: bool,
        /// Installation to update, as DIR:SIDE or DIR:SIDE:symlink
        /// (SIDE is client or server); repeatable
        #[arg(short = 'i', long = "instance", required = true)]
        instances: Vec<cli::InstanceArg>,
        /// Remote asset index URL
        #[arg(long, default_value = DEFAULT_INDEX_URL)]
        manifest_url: String,
        /// Maven repository for latest-version lookups
        #[arg(long, default_value = DEFAULT_MAVEN_URL)]
        maven_url: String,
        /// Cache directory (defaults to the platform cache dir)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Maximum concurrent downloads
        #[arg(short = 'j', long, default_value_t = 4)]
        jobs: usize,
    },
    /// Prune cached artifacts older than the given age
    Clean {
        #[arg(long, default_value_t = 30)]
        max_age_days: u64,
        /// Cache directory (defaults to the platform cache dir)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sync {
            latest,
            instances,
            manifest_url,
            maven_url,
            cache_dir,
            jobs,
        } => {
            cli::sync::run(cli::sync::SyncOptions {
                latest,
                instances,
                manifest_url,
                maven_url,
                cache_dir,
                jobs,
            })
            .await
        }
        Commands::Clean {
            max_age_days,
            cache_dir,
        } => cli::clean::run(max_age_days, cache_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let SyncError::Fetch(_) = e {
                eprintln!("The remote service may be down; try again later.");
            }
            ExitCode::FAILURE
        }
    }
}
