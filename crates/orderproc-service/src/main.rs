//! Main entry point for the order-processing service.
//!
//! This binary loads configuration, brings up the KV-backed Order Record
//! Store, the consensus-backed Cluster Coordinator, and the Pipeline
//! Manager, then serves the HTTP surface described in spec.md §6 until
//! interrupted.

use clap::Parser;
use orderproc_cluster::ClusterCoordinator;
use orderproc_config::Config;
use orderproc_pipeline::{Job, PipelineManager, StepHandler, StepOutcome};
use orderproc_storage::{KvError, OrderRecordStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod server;

/// Command-line arguments for the order-processing service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file.
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,
}

#[tokio::main]
async fn main() {
	let args = Args::parse();

	let log_level = std::env::var("ORDERPROC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
	init_tracing(&log_level);

	if let Err(err) = run(args).await {
		tracing::error!(error = %err, "fatal startup error");
		std::process::exit(1);
	}
}

fn init_tracing(default_directive: &str) {
	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
	let config = Config::from_file(args.config.to_str().unwrap())?;
	tracing::info!(service_id = %config.cluster.service_id, "loaded configuration");

	let kv_backend = build_kv_backend(&config)?;
	let store = Arc::new(OrderRecordStore::new(kv_backend));

	let http_client = reqwest::Client::builder()
		.pool_idle_timeout(Duration::from_secs(90))
		.timeout(Duration::from_secs(30))
		.build()?;

	let connection_string = format!("http://{}:{}", config.cluster.host, config.cluster.port);
	let coordinator = ClusterCoordinator::start(
		config.cluster.service_id.clone(),
		connection_string,
		config.cluster.join_addr.clone(),
		config.cluster.heartbeat_interval_ms,
		config.cluster.max_heartbeat_fail_times,
		Duration::from_secs(config.cluster.status_check_interval_secs),
		config.cluster.max_transfer_attempts,
		http_client.clone(),
	)
	.await
	.map_err(|e| format!("cluster coordinator failed to start: {e}"))?;

	let handlers = build_handlers(&config.pipeline.steps);
	let mut manager = PipelineManager::new(
		config.cluster.service_id.clone(),
		config.pipeline.pipeline_count,
		config.pipeline.steps.clone(),
		handlers,
		store.clone(),
	);
	manager.start().await;
	let manager = Arc::new(manager);

	let bind_address = format!("{}:{}", config.service.ip, config.service.port);
	tracing::info!(bind_address, "starting HTTP server");

	server::serve(bind_address, config, coordinator, manager, store)
		.await
		.map_err(|e| e.into())
}

fn build_kv_backend(config: &Config) -> Result<Arc<dyn orderproc_storage::KvStore>, KvError> {
	let mut table = toml::value::Table::new();
	table.insert("host".into(), toml::Value::String(config.kv.host.clone()));
	table.insert("port".into(), toml::Value::Integer(config.kv.port as i64));
	let value = toml::Value::Table(table);

	let factories = orderproc_storage::get_all_implementations();
	let factory = factories
		.iter()
		.find(|(name, _)| *name == config.kv.implementation.as_str())
		.map(|(_, f)| *f)
		.ok_or_else(|| KvError::Configuration(format!("unknown kv.implementation '{}'", config.kv.implementation)))?;

	let backend = factory(&value)?;
	Ok(Arc::from(backend))
}

/// Every configured non-terminal step executes the same pass-through
/// handler in this reference service: step bodies are domain-specific and
/// out of scope (spec.md §1 Non-goals), so each one simply reports success
/// and lets the Pipeline tick drive the state machine forward. The
/// `Completed` and `Failed` terminals never reach a handler lookup — the
/// Pipeline finishes them directly.
fn build_handlers(steps: &[String]) -> HashMap<String, Arc<dyn StepHandler>> {
	let mut handlers: HashMap<String, Arc<dyn StepHandler>> = HashMap::new();
	for step in steps {
		handlers.insert(step.clone(), Arc::new(PassThroughHandler));
	}
	handlers
}

struct PassThroughHandler;

#[async_trait::async_trait]
impl StepHandler for PassThroughHandler {
	async fn execute(&self, _job: &Job) -> StepOutcome {
		StepOutcome::Done
	}

	async fn rollback(&self, _job: &Job) -> StepOutcome {
		StepOutcome::Done
	}
}
