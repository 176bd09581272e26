use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ecowatch::{
    alerts,
    analysis::DashboardSeries,
    config::Settings,
    insights::{GeminiClient, InsightsService},
    metrics::{synthesize, Coordinates},
    report::ReportExporter,
    rng::RngManager,
    web::{self, WebServerConfig},
    Dashboard, RuleSet, SettingsLoader,
};

const DEFAULT_CONFIG: &str = "config/ecowatch.yaml";

#[derive(Debug, Parser)]
#[command(author, version, about = "EcoWatch deforestation intelligence dashboard")]
struct Cli {
    /// Settings file. Without it, `config/ecowatch.yaml` is used when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fixed seed for alert and metric draws, overriding the settings file
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the web dashboard
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the metrics bundle and chart series for a point
    Analyze {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// primary (manual entry) or map-click
        #[arg(long)]
        rule_set: Option<RuleSet>,
    },
    /// Write the text report for a point
    Report {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Output directory, overriding the configured one
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate an alert field and summarise it
    Alerts,
    /// Ask the text-generation service for insights on a point
    Insights {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
    /// Fetch environmental headlines
    News,
    /// Resolve a place name to coordinates
    Locate { place: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let loader = SettingsLoader::new(".");
    let mut settings = match &cli.config {
        Some(path) => loader.load(path)?,
        None => loader.load_or_default(DEFAULT_CONFIG)?,
    };
    if cli.seed.is_some() {
        settings.simulation.seed = cli.seed;
    }

    match cli.command {
        Command::Serve { host, port } => serve(settings, host, port).await,
        Command::Analyze { lat, lng, rule_set } => {
            let rule_set = rule_set.unwrap_or(settings.simulation.entry_rule_set);
            analyze(&settings, point(lat, lng)?, rule_set)
        }
        Command::Report { lat, lng, out } => report(&settings, point(lat, lng)?, out),
        Command::Alerts => summarise_alerts(settings.simulation.seed),
        Command::Insights { lat, lng } => insights(&settings, point(lat, lng)?).await,
        Command::News => news(&settings).await,
        Command::Locate { place } => locate(&settings, &place).await,
    }
}

fn point(lat: f64, lng: f64) -> Result<Coordinates> {
    Coordinates::new(lat, lng).context("invalid coordinates")
}

fn generator(settings: &Settings) -> Result<GeminiClient> {
    GeminiClient::from_settings(&settings.generator)
        .context("failed to build text-generation client")
}

async fn serve(settings: Settings, host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = WebServerConfig {
        host: host.unwrap_or_else(|| settings.server.host.clone()),
        port: port.unwrap_or(settings.server.port),
    };
    if settings.generator.api_key().is_none() {
        info!(
            env = %settings.generator.api_key_env,
            "no API key set; insights, news and place search will use fallbacks"
        );
    }
    let dashboard = Arc::new(Dashboard::new(&settings, generator(&settings)?));
    web::run(dashboard, config).await
}

fn analyze(settings: &Settings, at: Coordinates, rule_set: RuleSet) -> Result<()> {
    let mut rng = RngManager::with_seed(settings.simulation.seed);
    let metrics = synthesize(at, rule_set, &mut rng.stream("metrics"));
    let series = DashboardSeries::from_metrics(&metrics);
    let output = serde_json::json!({
        "ruleSet": rule_set,
        "metrics": metrics,
        "series": series,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn report(settings: &Settings, at: Coordinates, out: Option<PathBuf>) -> Result<()> {
    let mut rng = RngManager::with_seed(settings.simulation.seed);
    let metrics = synthesize(
        at,
        settings.simulation.entry_rule_set,
        &mut rng.stream("metrics"),
    );
    let dir = out.unwrap_or_else(|| settings.report.output_dir.clone());
    let exporter = ReportExporter::new(&dir, settings.report.number_format());
    let path = exporter
        .write(&metrics)
        .with_context(|| format!("failed to write report into {}", dir.display()))?;
    println!("{}", path.display());
    Ok(())
}

fn summarise_alerts(seed: Option<u64>) -> Result<()> {
    let mut rng = RngManager::with_seed(seed);
    let field = alerts::generate(&mut rng.stream("alerts"));

    let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_intensity: BTreeMap<&str, usize> = BTreeMap::new();
    for alert in &field {
        *by_kind.entry(alert.kind.label()).or_default() += 1;
        *by_intensity
            .entry(alert.intensity.label())
            .or_default() += 1;
    }

    let output = serde_json::json!({
        "total": field.len(),
        "byKind": by_kind,
        "byIntensity": by_intensity,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn insights(settings: &Settings, at: Coordinates) -> Result<()> {
    let mut rng = RngManager::with_seed(settings.simulation.seed);
    let metrics = synthesize(
        at,
        settings.simulation.entry_rule_set,
        &mut rng.stream("metrics"),
    );
    let service = InsightsService::new(generator(settings)?, settings.generator.news_count);
    let text = service.request_insights(&metrics.region, &metrics).await;
    println!("{}\n\n{text}", metrics.region);
    Ok(())
}

async fn news(settings: &Settings) -> Result<()> {
    let service = InsightsService::new(generator(settings)?, settings.generator.news_count);
    let items = service.request_news().await;
    if items.is_empty() {
        info!("no news available");
    }
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}

async fn locate(settings: &Settings, place: &str) -> Result<()> {
    let service = InsightsService::new(generator(settings)?, settings.generator.news_count);
    match service.resolve_place_coordinates(place).await {
        Some(at) => println!("{place}: {}", at.label()),
        None => println!("{place}: not found"),
    }
    Ok(())
}
