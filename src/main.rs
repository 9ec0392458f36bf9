use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crud_bench::config::{parse_scans, Config, KeyType, DEFAULT_SCANS, DEFAULT_VALUE_TEMPLATE};
use crud_bench::generators::{worker_rng, Template};
use crud_bench::report::RunReport;
use crud_bench::runner::Runner;
use crud_bench::{new_adapter, BenchError};

#[derive(Parser)]
#[command(name = "crud-bench")]
#[command(about = "CRUD benchmarking tool for SQL, document, graph, key-value and embedded databases")]
#[command(long_about = None)]
struct Cli {
    /// The database to benchmark
    #[arg(short = 'd', long)]
    database: String,

    /// Number of samples to be created, read, updated, and deleted
    #[arg(short = 's', long)]
    samples: usize,

    /// Number of concurrent clients
    #[arg(short = 'c', long, default_value = "1")]
    clients: usize,

    /// Number of concurrent threads per client
    #[arg(short = 't', long, default_value = "1")]
    threads: usize,

    /// The type of the key
    #[arg(short = 'k', long = "key", value_enum, default_value = "integer")]
    key: KeyType,

    /// Value template rendered for every create and update
    #[arg(
        short = 'v',
        long,
        env = "CRUD_BENCH_VALUE",
        default_value = DEFAULT_VALUE_TEMPLATE
    )]
    value: String,

    /// Generate the keys in a pseudo-randomized order
    #[arg(short = 'r', long)]
    random: bool,

    /// An optional name for the test, used as a suffix for result file names
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Connect to this endpoint instead of starting a container
    #[arg(short = 'e', long)]
    endpoint: Option<String>,

    /// Specify a custom container image
    #[arg(short = 'i', long)]
    image: Option<String>,

    /// Run the container in privileged mode
    #[arg(short = 'p', long)]
    privileged: bool,

    /// An array of scan specifications (JSON)
    #[arg(short = 'a', long, default_value = DEFAULT_SCANS)]
    scans: String,

    /// Print an example of a generated value and exit
    #[arg(long)]
    show_sample: bool,

    /// Collect system information for a given pid
    #[arg(long)]
    pid: Option<u32>,

    /// Seed making key order and rendered values reproducible
    #[arg(long)]
    seed: Option<u64>,

    /// Upper-bound wall time per phase, in seconds
    #[arg(long)]
    phase_timeout: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    // Everything configuration-shaped is rejected before any adapter exists.
    let scans = match parse_scans(&cli.scans) {
        Ok(scans) => scans,
        Err(e) => return config_failure(e),
    };

    let config = Config {
        database: cli.database,
        name: cli.name,
        endpoint: cli.endpoint,
        image: cli.image,
        privileged: cli.privileged,
        samples: cli.samples,
        clients: cli.clients,
        threads: cli.threads,
        key_type: cli.key,
        value: cli.value,
        random: cli.random,
        scans,
        pid: cli.pid,
        seed: cli.seed,
        phase_timeout: cli.phase_timeout,
    };
    if let Err(e) = config.validate() {
        return config_failure(e);
    }

    let template = match Template::parse(&config.value) {
        Ok(template) => template,
        Err(e) => return config_failure(e),
    };

    if cli.show_sample {
        let mut rng = worker_rng(config.seed, 0);
        let sample = template.render(&mut rng);
        match serde_json::to_string_pretty(&sample) {
            Ok(json) => {
                println!("{json}");
                return 0;
            }
            Err(e) => return config_failure(BenchError::Config(e.to_string())),
        }
    }

    let adapter = match new_adapter(&config) {
        Ok(adapter) => adapter,
        Err(e) => return config_failure(e),
    };

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt signal, shutting down...");
            signal_token.cancel();
        }
    });

    info!(
        "Starting benchmark for {} with {} samples...",
        adapter.name(),
        config.samples
    );
    let config = Arc::new(config);
    let runner = Runner::new(Arc::clone(&adapter), Arc::clone(&config), template, token);

    let started = Instant::now();
    let outcome = runner.run().await;
    let total = started.elapsed();
    info!("Benchmark completed in {total:?}");

    let report = RunReport::new(
        adapter.name(),
        &config,
        total,
        outcome.fatal.as_ref().map(|e| e.to_string()),
        outcome.records,
    );
    report.print_table();
    match report.write_files() {
        Ok((json, csv)) => {
            info!("Results saved to {} and {}", json.display(), csv.display())
        }
        Err(e) => eprintln!("Error writing result files: {e:#}"),
    }

    match outcome.fatal {
        Some(e) => {
            let code = e.exit_code();
            if code != 0 {
                eprintln!("Error: {e}");
            }
            code
        }
        None => 0,
    }
}

fn config_failure(e: BenchError) -> i32 {
    eprintln!("Error: {e}");
    e.exit_code()
}
