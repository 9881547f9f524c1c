//! Shelfkeeper - library indexing daemon
//!
//! Runs scheduled library scans until Ctrl-C, or a one-shot command.

use anyhow::Result;

use shelfkeeper::App;
use shelfkeeper::cli::{CliOptions, Command, USAGE};
use shelfkeeper::config::Config;
use shelfkeeper::indexer::PassReport;
use shelfkeeper::services::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let options = CliOptions::from_args()?;
    if options.command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = Config::from_env()?;
    let live_log = init_tracing(&config);
    tracing::info!("Starting shelfkeeper");

    let app = App::build(config, live_log).await?;

    match options.command {
        Command::Daemon => {
            app.run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                }
            })
            .await?;
        }
        Command::Scan(slug) => match app.manager.run_now(&slug).await? {
            Some(report) => print_report(&report)?,
            None => println!("A pass for '{slug}' is already running"),
        },
        Command::ScanAll => {
            for library in app.db.libraries().list_enabled().await? {
                match app.manager.run_now(&library.slug).await {
                    Ok(Some(report)) => print_report(&report)?,
                    Ok(None) => println!("A pass for '{}' is already running", library.slug),
                    Err(e) => tracing::error!(library = %library.slug, error = %e, "Library pass failed"),
                }
            }
        }
        Command::ListDuplicates => {
            let duplicates = app.db.duplicates().list_open().await?;
            if duplicates.is_empty() {
                println!("No duplicates awaiting review");
            }
            for record in duplicates {
                println!(
                    "#{} {} [{}]\n    {}\n    {}",
                    record.id, record.title_slug, record.library_slug, record.folder_a, record.folder_b
                );
            }
        }
        Command::Help => println!("{USAGE}"),
    }

    app.close().await;
    Ok(())
}

fn print_report(report: &PassReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
