use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use topfilms::admin::{self, DEFAULT_TOP};
use topfilms::config::{CrawlArgs, StoreArgs};
use topfilms::coordinator::{CrawlCoordinator, CrawlOutcome, CrawlReport};
use topfilms::http_client::HttpClient;
use topfilms::movie_store::{DedupStore, MemoryMovieStore, RocksMovieStore};
use topfilms::ui;

const LOG_FILE: &str = "output/topfilms.log";

#[derive(Parser, Debug)]
#[command(name = "topfilms", version, about = "Collects the best rated feature films into a local store")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl list and detail pages and store the admitted movies
    Crawl(CrawlArgs),
    /// Print the number of stored movies and the best rated ones
    Report {
        #[arg(long, default_value_t = DEFAULT_TOP)]
        top: usize,
    },
    /// Delete every stored movie
    Wipe {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

fn init_tracing(to_file: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "topfilms=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if to_file {
        fs::create_dir_all("output").context("failed to create output directory")?;
        let file = fs::File::create(LOG_FILE).with_context(|| format!("failed to create {LOG_FILE}"))?;
        registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let tui = matches!(&cli.command, Command::Crawl(args) if args.tui);
    init_tracing(tui)?;

    let store_config = cli.store.build_store_config();
    store_config.validate()?;

    match cli.command {
        Command::Crawl(args) => {
            let report = if args.dry_run {
                info!("dry run, movies are kept in memory");
                crawl(&args, MemoryMovieStore::new()).await?
            } else {
                let store = RocksMovieStore::open(&store_config)
                    .with_context(|| format!("failed to open store at {}", store_config.uri.display()))?;
                crawl(&args, store).await?
            };
            print_report(&report);
            if let CrawlOutcome::Aborted { reason } = report.outcome {
                bail!("crawl aborted after persisting {} movies: {reason}", report.persisted);
            }
        }
        Command::Report { top } => {
            let store = RocksMovieStore::open(&store_config)
                .with_context(|| format!("failed to open store at {}", store_config.uri.display()))?;
            admin::report(&store, &store_config.family_name(), top, &mut io::stdout().lock())?;
        }
        Command::Wipe { yes } => {
            let store = RocksMovieStore::open(&store_config)
                .with_context(|| format!("failed to open store at {}", store_config.uri.display()))?;
            admin::wipe(&store, yes, &mut io::stdin().lock(), &mut io::stdout().lock())?;
        }
    }

    Ok(())
}

async fn crawl<S: DedupStore>(args: &CrawlArgs, store: S) -> anyhow::Result<CrawlReport> {
    let config = args.build_config();
    config.validate()?;
    let client = HttpClient::new(&config).context("failed to build HTTP client")?;
    let quota = config.quota;
    let coordinator = CrawlCoordinator::new(config, client, store)?;

    let dashboard = args.tui.then(|| {
        let stats = coordinator.stats();
        tokio::spawn(async move {
            let result = ui::run_ui(stats.clone(), quota).await;
            if stats.is_detached() {
                info!("dashboard closed, crawl continues");
            }
            result
        })
    });

    let report = coordinator.run().await?;

    if let Some(handle) = dashboard {
        match handle.await {
            Ok(Err(e)) => warn!(error = %e, "dashboard failed"),
            Err(e) => warn!(error = %e, "dashboard task panicked"),
            Ok(Ok(())) => {}
        }
    }
    Ok(report)
}

fn print_report(report: &CrawlReport) {
    println!("Persisted movies : {}", report.persisted);
    println!("  inserted       : {}", report.inserted);
    println!("  updated        : {}", report.updated);
    println!("List pages       : {}", report.lists_fetched);
    println!("Detail pages     : {}", report.details_fetched);
    for (reason, count) in &report.drops {
        println!("Dropped {reason:<24}: {count}");
    }
}
