use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use placelens::api::{self, AppState};
use placelens::attractions::{AttractionGenerator, OpenAIAttractions};
use placelens::config::AppCfg;
use placelens::search::{PhotoSearch, ProviderSection};

#[derive(Parser)]
#[command(name = "placelens", version, about = "Attraction photos filtered by visual consensus")]
struct Cli {
    /// YAML config file
    #[arg(long, global = true, env = "PLACELENS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search every enabled provider for a query
    Search {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Generate attractions for a place and search each of them
    Place {
        place: String,
        #[arg(long)]
        json: bool,
    },
    /// Run the consensus filter directly on image URLs
    Filter {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long)]
        max_keep: Option<usize>,
    },
    /// Serve the JSON API
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

fn print_sections(sections: &[ProviderSection]) {
    for s in sections {
        let cached = if s.cached { ", cached" } else { "" };
        println!("### {} ({} of {} kept{cached})", s.provider, s.urls.len(), s.candidates);
        if let Some(err) = &s.error {
            println!("  error: {err}");
        } else if s.urls.is_empty() {
            println!("  no images after visual filtering");
        }
        for url in &s.urls {
            println!("  {url}");
        }
    }
}

fn generator(cfg: &AppCfg) -> Option<Arc<dyn AttractionGenerator>> {
    let generator = OpenAIAttractions::from_cfg(&cfg.attractions)?;
    Some(Arc::new(generator))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = AppCfg::load(cli.config.as_deref())?;

    match cli.command {
        Command::Search { query, json } => {
            let search = PhotoSearch::from_cfg(&cfg)?;
            let sections = search.search(&query).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&sections)?);
            } else {
                print_sections(&sections);
            }
        }
        Command::Place { place, json } => {
            let Some(gen) = generator(&cfg) else {
                bail!(
                    "attraction generator unavailable: enable `attractions` and set {}",
                    cfg.attractions.api_key_env
                );
            };
            let search = PhotoSearch::from_cfg(&cfg)?;
            let result = search.search_place(&place, gen.as_ref()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                if let Some(err) = &result.generator_error {
                    eprintln!(
                        "attraction list unavailable ({err}); searched the place name instead"
                    );
                }
                for attraction in &result.attractions {
                    println!("## {}", attraction.name);
                    print_sections(&attraction.sections);
                }
            }
        }
        Command::Filter { urls, max_keep } => {
            let search = PhotoSearch::from_cfg(&cfg)?;
            for url in search.filter().filter(&urls, max_keep).await {
                println!("{url}");
            }
        }
        Command::Serve { bind } => {
            let search = Arc::new(PhotoSearch::from_cfg(&cfg)?);
            tracing::info!(providers = ?search.provider_names(), "starting server");
            api::serve(bind, AppState::new(search, generator(&cfg))).await?;
        }
    }
    Ok(())
}
