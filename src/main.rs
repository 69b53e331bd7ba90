use anyhow::Result;
use clap::Parser;
use grapher_map_scanner::{
    fetch::inventory::InventoryMode,
    report::{self, Summary},
    settings::{DEFAULT_API_URL, DEFAULT_GRAPHER_URL, DEFAULT_METADATA_URL},
    ScanSettings, Scanner,
};
use std::{env, path::PathBuf, time::Instant};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Scan grapher charts for map tabs and single-year maps"
)]
struct Args {
    /// Tabular query endpoint (takes `sql` and `_size`).
    #[arg(long, default_value = DEFAULT_API_URL)]
    api_url: Url,
    #[arg(long, default_value = DEFAULT_GRAPHER_URL)]
    grapher_url: Url,
    #[arg(long, default_value = DEFAULT_METADATA_URL)]
    metadata_url: Url,

    #[arg(short, long, default_value = "owid_grapher_maps_complete.csv")]
    output: PathBuf,
    #[arg(long, default_value = "chart_cache")]
    cache_dir: PathBuf,
    #[arg(long, default_value = "debug_data.json")]
    debug_dump: PathBuf,
    #[arg(long)]
    no_debug_dump: bool,

    #[arg(long, default_value_t = 1000)]
    page_size: usize,
    /// 1 runs sequentially; more runs a bounded pool.
    #[arg(short, long, default_value_t = 1)]
    workers: usize,
    #[arg(long, default_value = "map-candidates")]
    mode: InventoryMode,
    /// Only scan the first N charts.
    #[arg(long)]
    limit: Option<usize>,

    /// Classify from chart configs alone; fetch no exports or metadata.
    #[arg(long)]
    skip_years: bool,
    /// Ignore cached exports and download them again.
    #[arg(long)]
    refresh_cache: bool,
    /// Probe chart pages for map markers when a record has no config.
    #[arg(long)]
    html_probe: bool,
    /// Order the report by chart id even when running sequentially.
    #[arg(long)]
    sorted: bool,
}

impl From<Args> for ScanSettings {
    fn from(a: Args) -> Self {
        ScanSettings {
            api_url: a.api_url,
            grapher_url: a.grapher_url,
            metadata_url: a.metadata_url,
            output: a.output,
            cache_dir: a.cache_dir,
            debug_dump: (!a.no_debug_dump).then_some(a.debug_dump),
            page_size: a.page_size,
            workers: a.workers,
            mode: a.mode,
            limit: a.limit,
            fetch_years: !a.skip_years,
            refresh_cache: a.refresh_cache,
            html_probe: a.html_probe,
            sorted: a.sorted,
            ..ScanSettings::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .init();

    let settings: ScanSettings = Args::parse().into();
    info!(
        mode = %settings.mode,
        workers = settings.workers,
        output = %settings.output.display(),
        "OWID Grapher Map Scanner"
    );
    let start = Instant::now();

    // ─── 2) inventory + classification ───────────────────────────────
    let scanner = Scanner::new(settings)?;
    let outcome = match scanner.run().await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("inventory fetch failed: {:#}", e);
            println!("{}", Summary::default());
            return Err(e);
        }
    };
    if !outcome.inventory_complete {
        info!("inventory was cut short; report covers a partial chart list");
    }
    if outcome.rows.is_empty() {
        info!("No charts found");
        println!("{}", Summary::default());
        return Ok(());
    }

    // ─── 3) write artifacts ──────────────────────────────────────────
    let written = report::write_report(&scanner.settings().output, &outcome.rows)?;
    let summary = Summary::from_rows(&outcome.rows);
    info!(
        total = summary.total,
        with_map = summary.with_map,
        published = summary.published,
        single_year = summary.single_year,
        unknown = summary.unknown_years,
        network_fetches = scanner.years().network_fetches(),
        elapsed = ?start.elapsed(),
        "scan finished"
    );

    println!("{}", summary);
    println!();
    println!("Files created:");
    println!("  1. {} - All results", written.paths.csv.display());
    println!("  2. {} - JSON mirror", written.paths.json.display());
    if let Some(n) = written.published_rows {
        println!(
            "  3. {} - Published maps only ({} rows)",
            written.paths.published.display(),
            n
        );
    }
    Ok(())
}
