//! Command line runner: introspect an endpoint, compile its schema, fuzz it.

mod http;
mod persist;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use gql_fuzz::{compile, DependencyGraph, Engine, FuzzConfig, Orchestrator, Schema};
use http::HttpTransport;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gql-fuzz")]
#[command(about = "Dependency-aware fuzzing for GraphQL APIs")]
struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. `debug` or `gql_fuzz=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Introspect the endpoint and write the compiled schema
    Compile(TargetArgs),
    /// Compile, then search for operation sequences and record failures
    Fuzz(FuzzArgs),
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// GraphQL endpoint URL
    #[arg(long)]
    url: String,

    /// Output directory for results
    #[arg(short, long, default_value = "./gql-fuzz-output")]
    output: PathBuf,

    /// Use a saved introspection result instead of querying the endpoint
    #[arg(long)]
    introspection: Option<PathBuf>,

    /// Value of the Authorization header
    #[arg(long)]
    auth: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = HttpTransport::DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = HttpTransport::DEFAULT_CONNECT_TIMEOUT_SECS)]
    connect_timeout_secs: u64,
}

#[derive(Args, Debug)]
struct FuzzArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// YAML run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Longest operation sequence to explore
    #[arg(long)]
    max_sequence_length: Option<usize>,

    /// Stop after this many operations
    #[arg(long)]
    max_operations: Option<usize>,

    /// Count `null` operation results as successes
    #[arg(long)]
    null_data_is_success: bool,
}

impl TargetArgs {
    fn transport(&self) -> HttpTransport {
        HttpTransport::new(
            &self.url,
            Duration::from_secs(self.timeout_secs),
            Duration::from_secs(self.connect_timeout_secs),
        )
        .with_auth(self.auth.clone())
    }

    fn introspection(&self, transport: &HttpTransport) -> Result<Value> {
        match &self.introspection {
            Some(path) => persist::read_json(path),
            None => {
                info!(url = %self.url, "introspecting");
                transport.introspect()
            }
        }
    }
}

impl FuzzArgs {
    fn config(&self) -> Result<FuzzConfig> {
        let mut config = match &self.config {
            Some(path) => persist::load_config(path)?,
            None => FuzzConfig::default(),
        };
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(length) = self.max_sequence_length {
            config = config.with_max_sequence_length(length);
        }
        if let Some(budget) = self.max_operations {
            config = config.with_max_operations(budget);
        }
        if self.null_data_is_success {
            config = config.with_null_data_is_success(true);
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Command::Compile(target) => {
            let transport = target.transport();
            compile_target(&target, &transport)?;
            println!("Compiled schema written to {}", target.output.display());
        }
        Command::Fuzz(args) => fuzz(&args)?,
    }
    Ok(())
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Introspect (or load), compile, build the graph and write all of it.
fn compile_target(
    target: &TargetArgs,
    transport: &HttpTransport,
) -> Result<(Schema, DependencyGraph)> {
    let introspection = target.introspection(transport)?;
    let schema = compile(&introspection)?;
    let graph = DependencyGraph::build(&schema);
    info!(
        objects = schema.objects.len(),
        queries = schema.queries.len(),
        mutations = schema.mutations.len(),
        edges = graph.edges.len(),
        "schema compiled"
    );
    persist::persist_compiled(&target.output, &introspection, &schema, &graph)?;
    Ok((schema, graph))
}

fn fuzz(args: &FuzzArgs) -> Result<()> {
    let mut config = args.config()?;
    let seed = config.seed.unwrap_or_else(rand::random);
    config = config.with_seed(seed);
    println!("Using seed: {}", seed);
    println!("Output directory: {}", args.target.output.display());

    let transport = args.target.transport();
    let (schema, graph) = compile_target(&args.target, &transport)?;

    let mut engine = Engine::new(&schema, config, transport);
    let report = Orchestrator::new(&graph).run(&mut engine);
    let stats = engine.recorder().stats();
    persist::persist_report(&args.target.output, &report, &stats)?;

    println!();
    println!(
        "Executed {} operations: {} succeeded, {} failed, {} unrunnable ({} retried, {} recovered)",
        stats.executed,
        stats.succeeded,
        stats.failed,
        stats.unrunnable,
        stats.retried,
        stats.recovered
    );
    println!(
        "Sequences: {} valid, {} bugs; {} deferred, {} unreachable operations",
        report.valid.len(),
        report.bugs.len(),
        report.deferred.len(),
        report.unreachable.len()
    );
    if report.budget_exhausted {
        println!("Stopped early: operation budget exhausted");
    }
    Ok(())
}
