mod config;
mod etl;
mod loader;
mod ml;
mod models;
mod pipeline;
mod scraper;
mod storage;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::loader::load_city_list;
use crate::ml::predict::{ModelPath, Predictor, ProductAliases};
use crate::pipeline::Pipeline;
use crate::storage::ArtifactStore;

#[derive(Parser)]
#[command(
    name = "villes-etl",
    about = "City cost-of-living ETL and price prediction",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape cost-of-living and quality-of-life pages for every city
    Scrape {
        /// City list CSV with a `ville` column (default: from config)
        #[arg(short, long)]
        cities: Option<PathBuf>,
    },

    /// Clean the raw artifacts and build the merged city profile table
    Etl,

    /// Fit the primary and fallback price models, report MSE and R²
    Train,

    /// Predict the price of a product in a city
    Predict {
        #[arg(short, long)]
        city: String,

        #[arg(short, long)]
        product: String,
    },

    /// Show artifact row counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "villes_etl=info,warn",
        1 => "villes_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Scrape { cities } => {
            let _t = StageTimer::start("scrape");
            let path = cities.unwrap_or_else(|| config.storage.cities_path.clone());
            let cities = load_city_list(&path)?;

            let stats = Pipeline::new(config).run_scrape(&cities).await?;
            info!(
                "Done: {} price rows, {} quality rows ({} / {} cities skipped)",
                stats.price_records, stats.quality_records, stats.price_skips, stats.quality_skips
            );
        }

        Command::Etl => {
            let _t = StageTimer::start("etl");
            let store = ArtifactStore::new(&config.storage.data_dir);
            let summary = etl::run_etl(&store)?;
            info!(
                "Done: {}/{} price rows kept, {}/{} quality rows kept, {} city profiles",
                summary.cleaned_prices,
                summary.raw_prices,
                summary.cleaned_quality,
                summary.raw_quality,
                summary.profiles
            );
        }

        Command::Train => {
            let _t = StageTimer::start("train");
            let store = ArtifactStore::new(&config.storage.data_dir);
            let prices = store
                .read_cleaned_prices()
                .context("No cleaned price artifact — run `etl` first")?;
            let profiles = store
                .read_profiles()
                .context("No profile artifact — run `etl` first")?;

            let (_, report) = ml::train_models(&prices, &profiles, &config.model)?;
            println!(
                "Trained on {} rows, evaluated on {}.",
                report.n_train, report.n_test
            );
            if let (Some(mse), Some(r2)) = (report.primary_mse, report.primary_r2) {
                println!("  Primary  : MSE = {:.4}  R² = {:.4}", mse, r2);
            }
            if let (Some(mse), Some(r2)) = (report.fallback_mse, report.fallback_r2) {
                println!("  Fallback : MSE = {:.4}  R² = {:.4}", mse, r2);
            }
        }

        Command::Predict { city, product } => {
            let store = ArtifactStore::new(&config.storage.data_dir);
            let prices = store
                .read_cleaned_prices()
                .context("No cleaned price artifact — run `etl` first")?;
            let profiles = store
                .read_profiles()
                .context("No profile artifact — run `etl` first")?;

            let (models, _) = ml::train_models(&prices, &profiles, &config.model)?;
            let predictor = Predictor::new(models, profiles, ProductAliases::default());

            let prediction = predictor.predict(&city, &product)?;
            let path = match prediction.path {
                ModelPath::Primary => "primary model",
                ModelPath::Fallback => "fallback model — product not seen in training",
            };
            println!(
                "{} in {}: {:.2} € ({})",
                prediction.resolved_label, city.trim(), prediction.price, path
            );
        }

        Command::Stats => {
            let store = ArtifactStore::new(&config.storage.data_dir);
            let artifacts = [
                ("Raw prices   ", store.raw_prices_path()),
                ("Raw quality  ", store.raw_quality_path()),
                ("Clean prices ", store.cleaned_prices_path()),
                ("Clean quality", store.cleaned_quality_path()),
                ("Profiles     ", store.profiles_path()),
            ];
            println!("─────────────────────────────────");
            println!("  villes-etl — Artifact Stats");
            println!("─────────────────────────────────");
            for (label, path) in artifacts {
                let count = store
                    .row_count(&path)?
                    .map(fmt_count)
                    .unwrap_or_else(|| "—".into());
                println!("  {} : {}", label, count);
            }
            println!("─────────────────────────────────");
        }
    }

    Ok(())
}

/// Logs a pipeline stage's wall-clock duration when dropped.
struct StageTimer {
    stage: &'static str,
    started: Instant,
}

impl StageTimer {
    fn start(stage: &'static str) -> Self {
        info!("Stage `{}` started", stage);
        Self {
            stage,
            started: Instant::now(),
        }
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        info!("Stage `{}` took {:.2?}", self.stage, self.started.elapsed());
    }
}

/// Artifact row counts with French-style thousands grouping: 12345 → "12 345".
fn fmt_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}
