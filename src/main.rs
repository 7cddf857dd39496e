use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use resmon_service::capacity::MemoryCapacityTable;
use resmon_service::config::{self, DEFAULT_CONFIG_PATH, PipelineConfig};
use resmon_service::db::{self, PgCapacityTable, PgDeviceStore};
use resmon_service::dev_mode::{self, FileChartSource};
use resmon_service::ingest::chart::{ChartSource, HttpChartSource};
use resmon_service::logging::{self, DataSource};
use resmon_service::ocr;
use resmon_service::pipeline::{FeedOutcome, FeedReport, Pipeline};
use resmon_service::store::MemoryDeviceStore;
use resmon_service::verify;

#[derive(Parser)]
#[command(name = "resmon_service")]
#[command(about = "Reservoir water-level and rainfall chart ingest")]
#[command(version)]
struct Cli {
    /// Configuration file; defaults apply when it does not exist
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingest cycle against the live feeds and the database
    Run,
    /// Check the feeds and the database without writing anything
    Verify {
        /// Also write the report as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Run the pipeline over saved chart images
    Replay {
        #[arg(long)]
        level_image: PathBuf,
        #[arg(long)]
        rain_image: PathBuf,
        /// Write into memory and print the rows instead of using the database
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli.config.to_string_lossy().to_string();
    let cfg = match config::load_config_or_default(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let min_level = match cfg.logging.min_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init_logger(min_level, cfg.logging.file.as_deref(), cfg.logging.timestamps);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(cfg),
        Commands::Verify { json } => run_verify(cfg, json),
        Commands::Replay { level_image, rain_image, dry_run } => {
            replay(cfg, FileChartSource::new(level_image, rain_image), dry_run)
        }
    }
}

fn run(cfg: PipelineConfig) -> ExitCode {
    let source = match HttpChartSource::new(&cfg.feeds) {
        Ok(source) => source,
        Err(e) => {
            logging::error(DataSource::System, None, &format!("Cannot build HTTP client: {}", e));
            return ExitCode::FAILURE;
        }
    };
    run_against_database(cfg, source)
}

fn run_against_database<S: ChartSource>(cfg: PipelineConfig, source: S) -> ExitCode {
    // Capacity reads and device writes use separate connections.
    let connections = db::connect_and_verify().and_then(|store| Ok((db::connect_from_env()?, store)));
    let (capacity_client, store_client) = match connections {
        Ok(clients) => clients,
        Err(e) => {
            logging::error(DataSource::Database, None, &format!("Database unavailable: {}", e));
            return ExitCode::FAILURE;
        }
    };
    let mut capacity = PgCapacityTable::new(capacity_client);
    let mut store = PgDeviceStore::new(store_client);

    let recognizer = ocr::default_recognizer(&cfg.ocr);
    let pipeline = Pipeline::new(cfg, source, recognizer);
    let reports = pipeline.run_cycle(Local::now().naive_local(), &mut capacity, &mut store);
    log_cycle(&pipeline.config().station.name, &reports);
    ExitCode::SUCCESS
}

fn replay(cfg: PipelineConfig, source: FileChartSource, dry_run: bool) -> ExitCode {
    if !dry_run {
        return run_against_database(cfg, source);
    }

    // Volumes resolve to zero without a capacity table.
    let mut capacity = MemoryCapacityTable::default();
    let mut store = MemoryDeviceStore::new();
    let recognizer = ocr::default_recognizer(&cfg.ocr);
    let pipeline = Pipeline::new(cfg, source, recognizer);
    let reports = pipeline.run_cycle(Local::now().naive_local(), &mut capacity, &mut store);
    log_cycle(&pipeline.config().station.name, &reports);

    print!("{}", dev_mode::format_rows(&store.rows()));
    ExitCode::SUCCESS
}

fn run_verify(cfg: PipelineConfig, json: Option<PathBuf>) -> ExitCode {
    let recognizer = ocr::default_recognizer(&cfg.ocr);
    let report = match verify::run_full_verification(&cfg, &recognizer) {
        Ok(report) => report,
        Err(e) => {
            logging::error(DataSource::System, None, &format!("Verification could not start: {}", e));
            return ExitCode::FAILURE;
        }
    };
    verify::print_summary(&report);

    if let Some(path) = json {
        let path = path.to_string_lossy().to_string();
        match verify::save_report(&report, &path) {
            Ok(()) => println!("Report written to {}", path),
            Err(e) => logging::error(DataSource::System, None, &format!("Cannot write {}: {}", path, e)),
        }
    }
    ExitCode::SUCCESS
}

fn log_cycle(site: &str, reports: &[FeedReport]) {
    for report in reports {
        let source = DataSource::from(report.kind);
        let message = match &report.outcome {
            FeedOutcome::NoData => format!("No records written ({} lines skipped)", report.skipped.len()),
            FeedOutcome::Written(w) => format!(
                "{} records parsed, {} skipped, {} written",
                report.parsed,
                report.skipped.len(),
                w.inserted() + w.updated()
            ),
            FeedOutcome::Failed(e) => format!("Batch failed: {}", e),
        };
        if report.is_failure() {
            logging::error(source, Some(site), &message);
        } else {
            logging::info(source, Some(site), &message);
        }
    }
}
