// lidar-control-cli/src/main.rs
// ============================================================================
// Module: LiDAR Control Plane CLI Entry Point
// Description: Command dispatcher wiring concrete adapters behind the core
//              traits and running either a one-shot command or a
//              long-running loop.
// Purpose: The one binary that operators and CI both use to drive the
//          ingest-and-orchestration control plane.
// Dependencies: clap, lidar-control-config, lidar-control-core,
//               lidar-control-catalog-pg, lidar-control-objectstore,
//               lidar-control-status-kv, lidar-control-broker,
//               lidar-control-providers, lidar-control-orchestrator.
// ============================================================================

//! ## Overview
//! Every subcommand shares one wiring step (`build_adapters`): load
//! [`lidar_control_config::Settings`] from the environment, then construct
//! the concrete adapter behind each of [`ObjectStore`], [`CatalogRepository`],
//! [`StatusStore`], [`EventPublisher`], and [`WorkflowGateway`] exactly once.
//! `--dry-run` swaps the real HTTP workflow gateway for the deterministic
//! in-memory one, so an operator can exercise the ingest use case end to end
//! without a live workflow engine reachable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use lidar_control_broker::HttpPollIngestSource;
use lidar_control_broker::IngestSource;
use lidar_control_broker::LogEventPublisher;
use lidar_control_broker::parse_ingest_start;
use lidar_control_catalog_pg::CatalogPgConfig;
use lidar_control_catalog_pg::PgCatalogRepository;
use lidar_control_config::Settings;
use lidar_control_core::crs::descriptor::RawCrsDescriptor;
use lidar_control_core::crs::normalizer::PassthroughProjOracle;
use lidar_control_core::crs::normalizer::build_crs;
use lidar_control_core::ids::CompanyId;
use lidar_control_core::ids::CrsId;
use lidar_control_core::ids::ScanId;
use lidar_control_core::ids::WorkflowId;
use lidar_control_core::interfaces::CatalogRepository;
use lidar_control_core::interfaces::EventPublisher;
use lidar_control_core::interfaces::ObjectStore;
use lidar_control_core::interfaces::StatusStore;
use lidar_control_core::interfaces::WorkflowGateway;
use lidar_control_core::scenario::ScenarioRegistry;
use lidar_control_objectstore::S3ObjectStore;
use lidar_control_objectstore::S3ObjectStoreConfig;
use lidar_control_orchestrator::artifact_service::ArtifactService;
use lidar_control_orchestrator::consumer::ConsumerOutcome;
use lidar_control_orchestrator::consumer::IngestConsumer;
use lidar_control_orchestrator::ingest_run_fsm::IngestRunFsm;
use lidar_control_orchestrator::ingest_use_case::IngestOutcome;
use lidar_control_orchestrator::ingest_use_case::IngestUseCase;
use lidar_control_orchestrator::pipeline::PipelineCommand;
use lidar_control_orchestrator::pipeline::PipelineOrchestrator;
use lidar_control_providers::HttpWorkflowGateway;
use lidar_control_providers::InMemoryWorkflowGateway;
use lidar_control_providers::http::HttpWorkflowGatewayConfig;
use lidar_control_status_kv::SqliteStatusStore;
use lidar_control_status_kv::SqliteStatusStoreConfig;
use thiserror::Error;
use tracing::info;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "lidar-control", version, about = "LiDAR ingest-and-orchestration control plane", arg_required_else_help = true)]
struct Cli {
    /// Use the deterministic in-memory workflow gateway instead of the
    /// configured `TEMPORAL_DSN` endpoint.
    #[arg(long, global = true)]
    dry_run: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the long-running `ingest.start` consumer loop.
    Serve(ServeCommand),
    /// Decode and process a single `ingest.start` message file (C10 one-shot).
    Ingest {
        #[command(subcommand)]
        command: IngestCommand,
    },
    /// Catalog repository maintenance operations (C3/C4).
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Ingest run state machine worker operations (C11).
    IngestRun {
        #[command(subcommand)]
        command: IngestRunCommand,
    },
    /// Run the dataset-version pipeline DAG (C13).
    Pipeline {
        #[command(subcommand)]
        command: PipelineCmd,
    },
    /// Read the projected workflow status (C8).
    Status(StatusCommand),
    /// Validate and build a CRS descriptor into canonical PROJJSON (C5).
    Crs {
        #[command(subcommand)]
        command: CrsCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// How long to sleep between empty polls.
    #[arg(long, value_name = "MS", default_value_t = 500)]
    poll_interval_ms: u64,
    /// Stop after this many poll iterations instead of running forever
    /// (mainly for tests and CI smoke runs).
    #[arg(long, value_name = "N")]
    max_iterations: Option<u64>,
}

/// Ingest subcommands.
#[derive(Subcommand, Debug)]
enum IngestCommand {
    /// Process one `ingest.start` message body read from a file.
    Submit(IngestSubmitCommand),
}

/// Arguments for `ingest submit`.
#[derive(Args, Debug)]
struct IngestSubmitCommand {
    /// Path to a JSON file holding one `ingest.start` message body.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
}

/// Catalog subcommands.
#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Connect and run schema migrations, then exit.
    Migrate,
    /// Probe PENDING artifact rows against the object store and reconcile
    /// them to AVAILABLE/FAILED.
    Reconcile(CatalogReconcileCommand),
}

/// Arguments for `catalog reconcile`.
#[derive(Args, Debug)]
struct CatalogReconcileCommand {
    /// Maximum number of PENDING rows to probe in this pass.
    #[arg(long, default_value_t = 100)]
    limit: i64,
}

/// Ingest run subcommands.
#[derive(Subcommand, Debug)]
enum IngestRunCommand {
    /// Poll queued ingest runs, claim, and execute them.
    Worker(IngestRunWorkerCommand),
}

/// Arguments for `ingest-run worker`.
#[derive(Args, Debug)]
struct IngestRunWorkerCommand {
    /// Maximum number of queued rows to list per pass.
    #[arg(long, default_value_t = 50)]
    limit: i64,
    /// Keep polling forever instead of running a single pass.
    #[arg(long)]
    r#loop: bool,
    /// Sleep between passes when `--loop` is set.
    #[arg(long, value_name = "MS", default_value_t = 1_000)]
    interval_ms: u64,
}

/// Pipeline subcommands.
#[derive(Subcommand, Debug)]
enum PipelineCmd {
    /// Run every DAG stage for one dataset-version worth of scans.
    Run(PipelineRunCommand),
}

/// Arguments for `pipeline run`.
#[derive(Args, Debug)]
struct PipelineRunCommand {
    /// Path to a JSON file describing the [`PipelineCommandFile`].
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
}

/// On-disk shape of a pipeline command, parsed into [`PipelineCommand`].
#[derive(Debug, serde::Deserialize)]
struct PipelineCommandFile {
    company: String,
    target_crs_id: String,
    schema_version: String,
    scan_ids: Vec<String>,
    #[serde(default)]
    run_cluster: bool,
}

/// Arguments for `status`.
#[derive(Args, Debug)]
struct StatusCommand {
    /// Workflow id to look up.
    workflow_id: String,
}

/// CRS subcommands.
#[derive(Subcommand, Debug)]
enum CrsCommand {
    /// Validate and build a descriptor file into canonical PROJJSON.
    Build(CrsBuildCommand),
}

/// Arguments for `crs build`.
#[derive(Args, Debug)]
struct CrsBuildCommand {
    /// Path to a JSON file holding a [`RawCrsDescriptor`].
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper; every subcommand's failure path ends here.
#[derive(Debug, Error)]
#[error("{0}")]
struct CliError(String);

impl CliError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<lidar_control_config::ConfigError> for CliError {
    fn from(err: lidar_control_config::ConfigError) -> Self {
        Self::new(format!("config: {err}"))
    }
}

type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Serve(command) => command_serve(cli.dry_run, command),
        Commands::Ingest { command: IngestCommand::Submit(command) } => command_ingest_submit(cli.dry_run, command),
        Commands::Catalog { command } => command_catalog(command),
        Commands::IngestRun { command: IngestRunCommand::Worker(command) } => command_ingest_run_worker(command),
        Commands::Pipeline { command: PipelineCmd::Run(command) } => command_pipeline_run(command),
        Commands::Status(command) => command_status(command),
        Commands::Crs { command: CrsCommand::Build(command) } => command_crs_build(command),
    }
}

// ============================================================================
// SECTION: Adapter Wiring
// ============================================================================

/// Every adapter a subcommand might need, wired once from [`Settings`].
struct Adapters {
    object_store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogRepository>,
    status_store: Arc<dyn StatusStore>,
    event_publisher: Arc<dyn EventPublisher>,
    gateway: Arc<dyn WorkflowGateway>,
    scenario_registry: ScenarioRegistry,
    bucket: String,
    rabbit_dsn: String,
}

fn build_adapters(dry_run: bool) -> CliResult<Adapters> {
    let settings = Settings::from_env()?;

    let object_store: Arc<dyn ObjectStore> = Arc::new(
        S3ObjectStore::new(S3ObjectStoreConfig {
            endpoint: settings.s3.endpoint.clone(),
            access_key: settings.s3.access_key.clone(),
            secret_key: settings.s3.secret_key.clone(),
            bucket: settings.s3.bucket.clone(),
            region: settings.s3.region.clone(),
            force_path_style: true,
        })
        .map_err(|err| CliError::new(format!("object store: {err}")))?,
    );

    let catalog: Arc<dyn CatalogRepository> = Arc::new(
        PgCatalogRepository::new(&CatalogPgConfig { connection: settings.pg_dsn.clone(), ..CatalogPgConfig::default() })
            .map_err(|err| CliError::new(format!("catalog: {err}")))?,
    );

    let status_store: Arc<dyn StatusStore> = Arc::new(
        SqliteStatusStore::new(&SqliteStatusStoreConfig { path: PathBuf::from(&settings.keydb_dsn), ..SqliteStatusStoreConfig::default() })
            .map_err(|err| CliError::new(format!("status store: {err}")))?,
    );

    let event_publisher: Arc<dyn EventPublisher> = Arc::new(LogEventPublisher::new(std::io::stdout()));

    let gateway: Arc<dyn WorkflowGateway> = if dry_run {
        Arc::new(InMemoryWorkflowGateway::new())
    } else {
        Arc::new(
            HttpWorkflowGateway::new(HttpWorkflowGatewayConfig::new(settings.temporal_dsn.clone(), Duration::from_secs(300)))
                .map_err(|err| CliError::new(format!("workflow gateway: {err}")))?,
        )
    };

    let scenario_registry = ScenarioRegistry::with_overrides(
        settings.scenario_overrides.into_iter().map(|o| ((o.scenario, o.pipeline_version), o.route)),
    );

    Ok(Adapters {
        object_store,
        catalog,
        status_store,
        event_publisher,
        gateway,
        scenario_registry,
        bucket: settings.s3.bucket,
        rabbit_dsn: settings.rabbit_dsn,
    })
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

fn command_serve(dry_run: bool, command: ServeCommand) -> CliResult<()> {
    let adapters = build_adapters(dry_run)?;
    let source: Arc<dyn IngestSource> = Arc::new(
        HttpPollIngestSource::new(adapters.rabbit_dsn.clone(), Duration::from_secs(20))
            .map_err(|err| CliError::new(format!("ingest source: {err}")))?,
    );
    let use_case = Arc::new(IngestUseCase::new(adapters.scenario_registry, adapters.gateway, adapters.status_store, adapters.event_publisher));
    let consumer = IngestConsumer::new(source, use_case);

    let mut iterations: u64 = 0;
    loop {
        if let Some(max) = command.max_iterations {
            if iterations >= max {
                return Ok(());
            }
        }
        match consumer.poll_and_process_once() {
            Ok(ConsumerOutcome::Empty) => std::thread::sleep(Duration::from_millis(command.poll_interval_ms)),
            Ok(outcome) => info!(?outcome, "processed ingest.start message"),
            Err(err) => eprintln!("consumer error: {err}"),
        }
        iterations += 1;
    }
}

// ============================================================================
// SECTION: Ingest Submit Command
// ============================================================================

fn command_ingest_submit(dry_run: bool, command: IngestSubmitCommand) -> CliResult<()> {
    let adapters = build_adapters(dry_run)?;
    let body = fs::read(&command.file).map_err(|err| CliError::new(format!("reading {}: {err}", command.file.display())))?;
    let parsed = parse_ingest_start(&body).map_err(|err| CliError::new(format!("decoding message: {err}")))?;

    let use_case = IngestUseCase::new(adapters.scenario_registry, adapters.gateway, adapters.status_store, adapters.event_publisher);
    let outcome = use_case.run(&parsed).map_err(|err| CliError::new(format!("ingest use case: {err}")))?;

    let summary = match outcome {
        IngestOutcome::Completed { outputs } => serde_json::json!({ "outcome": "completed", "outputs": outputs }),
        IngestOutcome::ValidationFailed => serde_json::json!({ "outcome": "validation_failed" }),
        IngestOutcome::EngineFailed { retryable } => serde_json::json!({ "outcome": "engine_failed", "retryable": retryable }),
    };
    println!("{summary}");
    Ok(())
}

// ============================================================================
// SECTION: Catalog Commands
// ============================================================================

fn command_catalog(command: CatalogCommand) -> CliResult<()> {
    let adapters = build_adapters(true)?;
    match command {
        CatalogCommand::Migrate => {
            // PgCatalogRepository::new already ran migrations; this
            // subcommand exists purely for an operator to confirm they
            // succeeded without also standing up every other adapter.
            info!("catalog migrations applied");
            Ok(())
        }
        CatalogCommand::Reconcile(args) => {
            let artifacts = ArtifactService::new(adapters.object_store, adapters.catalog, adapters.bucket);
            let report = artifacts.reconcile_pending(args.limit).map_err(|err| CliError::new(format!("reconcile: {err}")))?;
            println!("{}", serde_json::json!({ "healed": report.healed, "failed": report.failed }));
            Ok(())
        }
    }
}

// ============================================================================
// SECTION: Ingest Run Worker Command
// ============================================================================

fn command_ingest_run_worker(command: IngestRunWorkerCommand) -> CliResult<()> {
    let adapters = build_adapters(true)?;
    let artifacts = Arc::new(ArtifactService::new(adapters.object_store, adapters.catalog.clone(), adapters.bucket));
    let fsm = IngestRunFsm::new(adapters.catalog, artifacts);

    loop {
        let report =
            fsm.poll_and_execute_once(None, None, command.limit).map_err(|err| CliError::new(format!("worker pass: {err}")))?;
        info!(attempted = report.attempted, skipped = report.skipped, errors = report.errors, "ingest run worker pass complete");
        if !command.r#loop {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(command.interval_ms));
    }
}

// ============================================================================
// SECTION: Pipeline Command
// ============================================================================

fn command_pipeline_run(command: PipelineRunCommand) -> CliResult<()> {
    let adapters = build_adapters(true)?;
    let text = fs::read_to_string(&command.file).map_err(|err| CliError::new(format!("reading {}: {err}", command.file.display())))?;
    let file: PipelineCommandFile = serde_json::from_str(&text).map_err(|err| CliError::new(format!("parsing pipeline command: {err}")))?;

    let scan_ids = file
        .scan_ids
        .iter()
        .map(|raw| ScanId::parse(raw).map_err(|err| CliError::new(format!("invalid scan id `{raw}`: {err}"))))
        .collect::<CliResult<Vec<_>>>()?;

    let pipeline_command = PipelineCommand {
        company: CompanyId::new(file.company),
        target_crs_id: CrsId::new(file.target_crs_id),
        schema_version: file.schema_version,
        scan_ids,
        run_cluster: file.run_cluster,
    };

    let artifacts = Arc::new(ArtifactService::new(adapters.object_store, adapters.catalog.clone(), adapters.bucket.clone()));
    let ingest_fsm = Arc::new(IngestRunFsm::new(adapters.catalog.clone(), artifacts.clone()));
    let orchestrator = PipelineOrchestrator::new(adapters.catalog, artifacts, ingest_fsm, adapters.bucket);

    let outcome = orchestrator.run(&pipeline_command).map_err(|err| CliError::new(format!("pipeline run: {err}")))?;
    println!(
        "{}",
        serde_json::json!({
            "dataset_version_id": outcome.dataset_version_id.to_string(),
            "merged_artifact_key": outcome.merged_artifact_key,
            "clustered": outcome.clustered,
        })
    );
    Ok(())
}

// ============================================================================
// SECTION: Status Command
// ============================================================================

fn command_status(command: StatusCommand) -> CliResult<()> {
    let adapters = build_adapters(true)?;
    let workflow_id = WorkflowId::new(command.workflow_id).map_err(|err| CliError::new(format!("invalid workflow id: {err}")))?;
    match adapters.status_store.get_status(&workflow_id).map_err(|err| CliError::new(format!("status lookup: {err}")))? {
        Some(record) => {
            println!("{}", serde_json::json!({ "status": record.status, "payload": record.payload }));
            Ok(())
        }
        None => Err(CliError::new(format!("no status recorded for workflow {}", workflow_id.as_str()))),
    }
}

// ============================================================================
// SECTION: CRS Command
// ============================================================================

fn command_crs_build(command: CrsBuildCommand) -> CliResult<()> {
    let text = fs::read_to_string(&command.file).map_err(|err| CliError::new(format!("reading {}: {err}", command.file.display())))?;
    let descriptor: RawCrsDescriptor = serde_json::from_str(&text).map_err(|err| CliError::new(format!("parsing descriptor: {err}")))?;
    let normalized = build_crs(&descriptor, &PassthroughProjOracle).map_err(|err| CliError::new(format!("build_crs: {err}")))?;
    println!("{}", serde_json::to_string_pretty(&normalized.built_crs_projjson).map_err(|err| CliError::new(err.to_string()))?);
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
