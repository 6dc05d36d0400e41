use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use static_toml::static_toml;
use strum::VariantArray;
use tracing_subscriber::EnvFilter;

use crate::data::{Category, Priority};
use crate::store::{Store, sqlite::SqliteStore};

mod analytics;
mod assignment;
mod compose;
mod context;
mod data;
mod filter;
mod import;
mod present;
mod serve;
mod services;
mod store;
mod submission;

static_toml! {
    pub static CONFIG = include_toml!("config.toml");
}

#[derive(Parser)]
#[command(version = env!("LONG_VERSION"), about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty database.
    Init { db: PathBuf },

    /// Create a database from a directory of seed TOML files.
    Import { source: PathBuf, db: PathBuf },

    Serve {
        db: PathBuf,

        #[arg(short = 'p', long)]
        port: Option<String>,

        /// Where uploaded photos are kept.
        #[arg(long, default_value = CONFIG.photo.dir)]
        photos: PathBuf,

        /// Acknowledge reports without saving them.
        #[arg(long)]
        simulate: bool,

        #[arg(long)]
        live_reload: bool,
    },

    /// Print complaint counts by status, priority and category.
    Stats { db: PathBuf },

    /// Print the JSON schema of the seed files.
    Schema,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("civic_portal=info,tower_http=info")),
        )
        .init();

    let args = Cli::parse();

    match args.command {
        Commands::Init { db } => import::init(&db).with_context(|| "could not run `init`"),

        Commands::Import { source, db } => {
            import::run(&source, &db).with_context(|| "could not run `import`")
        }

        Commands::Serve {
            db,
            port,
            photos,
            simulate,
            live_reload,
        } => {
            let runtime = tokio::runtime::Runtime::new().context("could not start runtime")?;
            runtime
                .block_on(serve::run(
                    &db,
                    port.as_deref(),
                    photos,
                    simulate,
                    live_reload,
                ))
                .with_context(|| "failed to run `serve`")
        }

        Commands::Stats { db } => stats(db).with_context(|| "could not run `stats`"),

        Commands::Schema => {
            let schema = schemars::schema_for!(data::seed::SeedSchema);
            println!("{}", serde_json::to_string_pretty(&schema)?);

            Ok(())
        }
    }
}

fn stats(db: PathBuf) -> Result<()> {
    anyhow::ensure!(db.exists(), "no database at {:?}", db);
    let store = SqliteStore::open(&db)?;
    let reports = store.reports()?;
    let counts = analytics::StatusCounts::of(&reports);

    println!("Complaint Statistics:");
    println!("---------------------");
    println!("Total: {}", counts.total());
    println!("  Pending:     {:>5}", counts.pending);
    println!("  Assigned:    {:>5}", counts.assigned);
    println!("  In progress: {:>5}", counts.in_progress);
    println!("  Resolved:    {:>5}", counts.resolved);
    if counts.unknown > 0 {
        println!("  Unknown:     {:>5}", counts.unknown);
    }

    println!();
    println!("By priority:");
    for priority in Priority::VARIANTS {
        let n = reports.iter().filter(|r| r.priority == *priority).count();
        println!("  {:<24} {:>5}", priority.label(), n);
    }

    println!();
    println!("By category:");
    for category in Category::VARIANTS {
        let n = reports.iter().filter(|r| r.category == *category).count();
        if n > 0 {
            println!("  {:<24} {:>5}", category.label(), n);
        }
    }

    Ok(())
}
