use anyhow::Result;
use clap::{Parser, Subcommand};
use uuid::Uuid;
use worknest_core::ListingKind;
use worknest_fetch::{FixtureRecordSource, RecordSource};

#[derive(Debug, Parser)]
#[command(name = "worknest")]
#[command(about = "WorkNest marketplace command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the marketplace web UI.
    Serve,
    /// Fetch the listing fixture once and print snapshot totals.
    Fetch {
        /// Path to a listings JSON file.
        #[arg(default_value = "fixtures/listings.json")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            worknest_web::serve_from_env().await?;
        }
        Commands::Fetch { path } => {
            let source = FixtureRecordSource::new(&path);
            let records = source.fetch_records(Uuid::new_v4()).await?;
            let gigs = records.iter().filter(|r| r.kind == ListingKind::Gig).count();
            println!(
                "fetched {} listings from {} (gigs={} posts={})",
                records.len(),
                path,
                gigs,
                records.len() - gigs
            );
        }
    }

    Ok(())
}
