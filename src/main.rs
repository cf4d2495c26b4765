use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use crossbeam::channel;
use log::{error, info, warn};
use parking_lot::Mutex;

use onocmap::config::{Configuration, Objective, StrategyKind};
use onocmap::strategy::{build_strategy, Progress, SearchControl, SearchOutcome};
use onocmap::{generator, parser, Evaluator, NocArchitecture, RouterKind};

#[derive(Parser)]
#[command(
    version,
    about,
    long_about = None,
    before_help = "onocmap: crosstalk and power-aware application mapping for optical networks-on-chip"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map one application onto the configured architecture
    Map {
        /// Architecture and search configuration
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Application communication graph
        #[arg(short, long, value_name = "FILE")]
        application: PathBuf,

        /// Output directory for reports (default: ./output)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Override the configured mapping strategy
        #[arg(long)]
        strategy: Option<StrategyKind>,

        /// Override the configured objective
        #[arg(long)]
        objective: Option<Objective>,

        /// Override the configured iteration budget
        #[arg(short, long)]
        iterations: Option<usize>,

        /// Seed the search for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Skip writing report files
        #[arg(long)]
        no_report: bool,
    },
    /// Print a router's connectivity, loss and crosstalk matrices
    Router {
        /// Router name (Crux, OXY, ODOR)
        #[arg(short, long)]
        kind: RouterKind,

        /// Take loss and crosstalk coefficients from this configuration
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Map every application in a directory
    Batch {
        /// Architecture and search configuration
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Directory holding `.app` files
        #[arg(long, value_name = "DIR")]
        apps: PathBuf,

        /// Output directory for reports (default: ./output)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Only process files whose name contains this pattern
        #[arg(short, long, value_name = "PATTERN")]
        pattern: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    println!("onocmap v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Map { config, application, output, strategy, objective, iterations, seed, no_report } => {
            let mut config = parser::parse_configuration(config)?;
            if let Some(strategy) = strategy {
                config.strategy = *strategy;
            }
            if let Some(objective) = objective {
                config.objective = *objective;
            }
            if let Some(iterations) = iterations {
                config.iterations = *iterations;
            }
            if seed.is_some() {
                config.seed = *seed;
            }
            config.validate()?;

            let architecture = build_architecture(&config)?;
            let output_dir = output.clone().unwrap_or_else(|| PathBuf::from("output"));
            let report_dir = if *no_report { None } else { Some(output_dir.as_path()) };
            let outcome = map_application(&config, architecture, application, report_dir)?;
            print_summary(&outcome);
        }
        Commands::Router { kind, config } => {
            let config = match config {
                Some(path) => parser::parse_configuration(path)?,
                None => Configuration::default(),
            };
            let router = kind.build(&config).context(format!("Failed to build router {}", kind))?;
            let stdout = std::io::stdout();
            generator::write_router_summary(&mut stdout.lock(), &router)?;
        }
        Commands::Batch { config, apps, output, pattern } => {
            if !apps.is_dir() {
                error!("Application directory doesn't exist or is not a directory: {:?}", apps);
                return Err(anyhow!("Invalid application directory"));
            }
            let config = parser::parse_configuration(config)?;
            let architecture = build_architecture(&config)?;
            let output_dir = output.clone().unwrap_or_else(|| PathBuf::from("output"));

            let mut entries = fs::read_dir(apps)?.map(|entry| entry.map(|e| e.path())).collect::<Result<Vec<_>, _>>()?;
            entries.sort();

            let mut processed = 0;
            let mut failed = 0;
            for path in entries.iter().filter(|path| path.is_file()) {
                let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if let Some(ref pat) = pattern {
                    if !file_name.to_lowercase().contains(&pat.to_lowercase()) {
                        continue;
                    }
                }
                if !file_name.to_lowercase().ends_with(".app") {
                    continue;
                }
                info!("Processing: {}", file_name);
                match map_application(&config, Arc::clone(&architecture), path, Some(&output_dir)) {
                    Ok(outcome) => {
                        processed += 1;
                        println!("{}: score {:.3}", file_name, outcome.evaluation.score());
                    }
                    Err(e) => {
                        error!("Error processing {}: {:#}", file_name, e);
                        failed += 1;
                    }
                }
            }
            println!("Batch processing complete: {} succeeded, {} failed.", processed, failed);
        }
    }
    Ok(())
}

fn build_architecture(config: &Configuration) -> Result<Arc<NocArchitecture>> {
    let start = Instant::now();
    info!(
        "Building {} {}x{} with {} routers and {} routing",
        config.topology, config.rows, config.columns, config.router, config.routing
    );
    let architecture = NocArchitecture::new(config).context("Failed to build the NoC architecture")?;
    info!("Architecture ready in {:?}", start.elapsed());
    Ok(Arc::new(architecture))
}

/// Runs the configured search on a worker thread and logs its progress.
fn map_application(
    config: &Configuration,
    architecture: Arc<NocArchitecture>,
    application_path: &Path,
    report_dir: Option<&Path>,
) -> Result<SearchOutcome> {
    let application = Arc::new(parser::parse_application(application_path, config.modulation_rate)?);
    let evaluator = Evaluator::new(Arc::clone(&architecture), Arc::clone(&application), config)
        .context(format!("Cannot map {}", application.name()))?;

    if application.is_idle() {
        warn!("{} has no communicating cores", application.name());
    }

    let (sender, receiver) = channel::unbounded::<Progress>();
    let last_percent = Mutex::new(usize::MAX);
    let control = SearchControl::new().with_progress(move |progress: Progress| {
        let percent = progress.iteration * 100 / progress.budget.max(1);
        let mut last = last_percent.lock();
        if *last != percent {
            *last = percent;
            let _ = sender.send(progress);
        }
    });

    let (kind, options) = (config.strategy, config.search_options());
    info!("Mapping {} with {} ({})", application.name(), kind, config.objective);
    let worker = thread::spawn(move || {
        let mut strategy = build_strategy(kind, options);
        let outcome = strategy.search(&evaluator, &control);
        (strategy.name(), outcome)
    });

    for progress in receiver {
        info!(
            "{:>3}% (iteration {} of {}), best score {:.3}",
            progress.iteration * 100 / progress.budget.max(1),
            progress.iteration,
            progress.budget,
            progress.best_score
        );
    }
    let (strategy_name, outcome) = worker.join().map_err(|_| anyhow!("Search thread panicked"))?;
    let outcome = outcome.context("Mapping search failed")?;

    if let Some(dir) = report_dir {
        fs::create_dir_all(dir).context(format!("Failed to create directory: {:?}", dir))?;
        let report_name = generator::report_file_name(application.name(), config);
        let report_path = dir.join(&report_name);
        let input = generator::ReportInput {
            config,
            architecture: &architecture,
            application: &application,
            strategy: strategy_name,
            outcome: &outcome,
        };
        generator::write_report(&report_path, &input)?;
        println!("Report written to: {}", report_path.display());

        if config.strategy == StrategyKind::Random {
            let scores_path = dir.join(generator::score_distribution_file_name(&report_name));
            generator::write_score_distribution(&scores_path, &outcome.scores)?;
            println!("Score distribution written to: {}", scores_path.display());
        }
    }
    Ok(outcome)
}

fn print_summary(outcome: &SearchOutcome) {
    let evaluation = &outcome.evaluation;
    println!("Best mapping after {} iterations ({:?}):", outcome.iterations, outcome.elapsed);
    print!("{}", outcome.mapping);
    if let Some((src, dst)) = evaluation.worst_case {
        println!("worst case {} -> {}", src, dst);
    }
    println!("signal attenuation {:.3} dB", evaluation.signal_attenuation);
    println!("SNR {:.3} dB", evaluation.snr);
    println!("laser power {:.3} mW", evaluation.laser_power);
}
