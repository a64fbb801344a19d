use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use leads_scraper::config::Config;
use leads_scraper::constants;
use leads_scraper::export::Exporter;
use leads_scraper::pipeline::{LeadPipeline, RunReport};
use leads_scraper::sources::{HttpWebsiteAnalyzer, MapsSource, RegistrySource};
use leads_scraper::storage::{LeadStore, SqliteLeadStore};
use leads_scraper::types::{LeadSource, RawLead, SearchQuery};
use leads_scraper::{logging, metrics};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "leads_scraper")]
#[command(about = "Czech business lead scraper and reconciliation pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the configured sources and reconcile the results
    Scrape {
        /// Niche to scrape (must exist in the config)
        #[arg(long)]
        niche: Option<String>,

        /// Run every niche in the config
        #[arg(long)]
        all_niches: bool,

        /// City to search in
        #[arg(long)]
        city: String,

        /// Specific sources to run (comma-separated). Available: registry, maps
        #[arg(long)]
        sources: Option<String>,

        /// Cap on fetched records per niche (defaults to the config value)
        #[arg(long)]
        max_results: Option<usize>,

        /// Skip the website quality checks
        #[arg(long)]
        skip_website_checks: bool,

        /// SQLite database for cross-run lead persistence
        #[arg(long, default_value = "data/leads.db")]
        database: PathBuf,
    },
    /// Reconcile a JSON file of raw records without touching the network
    Reconcile {
        /// Path to a JSON array of raw records
        #[arg(long)]
        input: PathBuf,

        /// Niche to file the leads under
        #[arg(long)]
        niche: String,

        /// City the records belong to
        #[arg(long)]
        city: String,

        /// SQLite database for cross-run lead persistence
        #[arg(long, default_value = "data/leads.db")]
        database: PathBuf,
    },
    /// List the configured niches and their keywords
    Niches,
}

async fn fetch_from_sources(
    source_names: &[String],
    config: &Config,
    query: &SearchQuery,
) -> Vec<RawLead> {
    let mut raw = Vec::new();

    for name in source_names {
        let source: Box<dyn LeadSource> = match name.as_str() {
            constants::REGISTRY_SOURCE => match RegistrySource::new(&config.scraping) {
                Ok(source) => Box::new(source),
                Err(e) => {
                    error!("Registry source unavailable: {}", e);
                    println!("⚠️  Registry source unavailable: {e}");
                    continue;
                }
            },
            constants::MAPS_SOURCE => match MapsSource::new(&config.scraping) {
                Ok(source) => Box::new(source),
                Err(e) => {
                    error!("Maps source unavailable: {}", e);
                    println!("⚠️  Maps source unavailable: {e}");
                    continue;
                }
            },
            _ => {
                warn!("Unknown source specified");
                println!("⚠️  Unknown source: {name}");
                continue;
            }
        };

        info!("Fetching from {}", source.source_name());
        println!("📡 Fetching from {}...", source.source_name());
        match source.fetch(query).await {
            Ok(mut leads) => {
                info!("Fetched {} records from {}", leads.len(), source.source_name());
                println!("✅ Fetched {} records from {}", leads.len(), source.source_name());
                raw.append(&mut leads);
            }
            Err(e) => {
                error!("Fetch failed for {}: {}", source.source_name(), e);
                println!("❌ Fetch failed for {}: {}", source.source_name(), e);
            }
        }
    }

    raw
}

fn print_report(report: &RunReport, files: &[String]) {
    println!("\n📊 Run results for {}/{}:", report.niche, report.city);
    println!("   Raw records: {}", report.raw_records);
    println!("   Skipped (no name): {}", report.skipped_no_name);
    println!("   Stored leads in: {}", report.stored_leads_in);
    println!("   Duplicates collapsed: {}", report.duplicates_collapsed);
    println!("   Final leads: {}", report.summary.total);
    println!("   Without website: {}", report.summary.no_website);
    println!("   High priority: {}", report.summary.high);
    println!("   Mean score: {:.1}", report.summary.mean_score);
    println!("   Exported files:");
    for file in files {
        println!("      - {}", file);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);
    metrics::init_metrics();

    // Invalid configuration aborts here, before any work starts.
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Scrape {
            niche,
            all_niches,
            city,
            sources,
            max_results,
            skip_website_checks,
            database,
        } => {
            let niches: Vec<String> = if all_niches {
                config.niches.keys().cloned().collect()
            } else if let Some(name) = niche {
                vec![name]
            } else {
                println!("⚠️  Specify --niche <name> or --all-niches");
                return Ok(());
            };

            let source_names: Vec<String> = if let Some(list) = sources {
                list.split(',').map(|s| s.trim().to_string()).collect()
            } else {
                constants::get_supported_sources()
                    .into_iter()
                    .map(String::from)
                    .collect()
            };

            let store: Arc<dyn LeadStore> = Arc::new(SqliteLeadStore::open(&database)?);

            for niche_name in &niches {
                let niche_config = config.niche(niche_name)?;
                let query = SearchQuery {
                    niche: niche_name.clone(),
                    city: city.clone(),
                    keywords: niche_config.all_keywords().map(String::from).collect(),
                    max_results: max_results.unwrap_or(config.scraping.max_results_per_niche),
                };

                println!("\n🔍 Scraping {} in {}...", niche_name, city);
                let raw = fetch_from_sources(&source_names, &config, &query).await;

                let mut pipeline = LeadPipeline::new(config.clone()).with_store(store.clone());
                if !skip_website_checks {
                    let analyzer = HttpWebsiteAnalyzer::new(&config.scraping)?;
                    pipeline = pipeline.with_analyzer(Arc::new(analyzer));
                }

                let outcome = pipeline.run(niche_name, &city, raw).await?;
                let exporter = Exporter::new(&config.export.output_dir);
                let written = exporter.export(&outcome.categorized, &outcome.report)?;
                print_report(&outcome.report, &written);
            }
        }
        Commands::Reconcile {
            input,
            niche,
            city,
            database,
        } => {
            let content = std::fs::read_to_string(&input)?;
            let raw: Vec<RawLead> = serde_json::from_str(&content)?;
            println!("📥 Loaded {} raw records from {}", raw.len(), input.display());

            let store: Arc<dyn LeadStore> = Arc::new(SqliteLeadStore::open(&database)?);
            let pipeline = LeadPipeline::new(config.clone()).with_store(store);
            let outcome = pipeline.run(&niche, &city, raw).await?;

            let exporter = Exporter::new(&config.export.output_dir);
            let written = exporter.export(&outcome.categorized, &outcome.report)?;
            print_report(&outcome.report, &written);
        }
        Commands::Niches => {
            println!("📋 Configured niches:");
            for (name, niche) in &config.niches {
                println!("   {} ({} keywords)", name, niche.all_keywords().count());
                for keyword in niche.all_keywords() {
                    println!("      - {}", keyword);
                }
            }
        }
    }

    Ok(())
}
