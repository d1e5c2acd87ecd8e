//! batchgridd — the BatchGrid scheduler daemon.
//!
//! Assembles the state store, the scheduler event controller and its
//! background workers, and feeds it callbacks from a local simulated
//! cluster manager.
//!
//! # Usage
//!
//! ```text
//! batchgridd run --data-dir /var/lib/batchgrid --agents 3 --jobs 20
//! batchgridd status --data-dir /var/lib/batchgrid
//! ```

mod sim;

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use batchgrid_resources::NodeResources;
use batchgrid_scheduler::{SchedulerConfig, SchedulerEventController};
use batchgrid_state::{NewJob, StateStore, TaskKind};

use sim::{ClusterShape, SimulatedCluster};

const DB_FILE: &str = "batchgrid.redb";

#[derive(Parser)]
#[command(name = "batchgridd", about = "BatchGrid scheduler daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler against a simulated local cluster.
    Run {
        /// Scheduler config file (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/batchgrid")]
        data_dir: PathBuf,

        /// Number of simulated agents.
        #[arg(long, default_value = "3")]
        agents: usize,

        /// CPUs per simulated agent.
        #[arg(long, default_value = "4")]
        agent_cpus: f64,

        /// Memory (MiB) per simulated agent.
        #[arg(long, default_value = "8192")]
        agent_mem: f64,

        /// Demo jobs to queue before starting.
        #[arg(long, default_value = "10")]
        jobs: usize,

        /// How long each simulated task runs, in seconds.
        #[arg(long, default_value = "3")]
        task_secs: u64,

        /// Exit once the queue is empty and nothing is running.
        #[arg(long)]
        until_idle: bool,
    },

    /// Print the durable scheduler state as JSON.
    Status {
        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/batchgrid")]
        data_dir: PathBuf,
    },
}

struct RunArgs {
    config: Option<PathBuf>,
    data_dir: PathBuf,
    shape: ClusterShape,
    jobs: usize,
    until_idle: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,batchgridd=debug,batchgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            data_dir,
            agents,
            agent_cpus,
            agent_mem,
            jobs,
            task_secs,
            until_idle,
        } => {
            let shape = ClusterShape {
                agents,
                capacity: NodeResources::from_scalars(agent_cpus, agent_mem, 0.0),
                task_duration: Duration::from_secs(task_secs),
                offer_interval: Duration::from_secs(1),
            };
            run(RunArgs {
                config,
                data_dir,
                shape,
                jobs,
                until_idle,
            })
            .await
        }
        Command::Status { data_dir } => status(data_dir),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    info!("BatchGrid daemon starting");

    let config = match &args.config {
        Some(path) => SchedulerConfig::from_file(path)?,
        None => SchedulerConfig::default(),
    };
    config.validate()?;

    std::fs::create_dir_all(&args.data_dir)?;
    let db_path = args.data_dir.join(DB_FILE);
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    store.initialize_system()?;
    queue_demo_jobs(&store, args.jobs)?;

    // ── Cluster and controller ─────────────────────────────────

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let cluster = SimulatedCluster::new(args.shape, events_tx)?;
    let controller = SchedulerEventController::new(config, store.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cluster_handle = tokio::spawn(cluster.clone().run(shutdown_rx));
    cluster.register();

    // ── Event loop ─────────────────────────────────────────────

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut idle_check = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => controller.handle(event),
            _ = idle_check.tick(), if args.until_idle => {
                if store.list_queued_jobs(1)?.is_empty()
                    && controller.executions().is_empty()
                    && cluster.active_tasks() == 0
                {
                    info!("queue drained, nothing running");
                    break;
                }
            }
            result = &mut ctrl_c => {
                result?;
                info!("shutdown signal received");
                break;
            }
        }
    }

    controller.shutdown();
    let _ = shutdown_tx.send(true);
    controller.join_workers().await;
    if let Err(e) = cluster_handle.await {
        error!(error = %e, "simulated cluster task failed");
    }

    let report = controller.generate_status();
    info!(status = %serde_json::to_string(&report)?, "final scheduler status");
    info!("BatchGrid daemon stopped");
    Ok(())
}

fn status(data_dir: PathBuf) -> anyhow::Result<()> {
    let store = StateStore::open(&data_dir.join(DB_FILE))?;
    let running = store.get_running_job_executions()?;
    let queued = store.list_queued_jobs(usize::MAX)?;

    let report = serde_json::json!({
        "scheduler": store.get_scheduler_record()?,
        "queued": queued.len(),
        "running": running,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Queue a mix of single- and three-task jobs.
fn queue_demo_jobs(store: &StateStore, count: usize) -> anyhow::Result<()> {
    const JOB_TYPES: [&str; 3] = ["ingest", "convert", "index"];

    let when = epoch_secs();
    for n in 0..count {
        let tasks = if n % 3 == 0 {
            vec![TaskKind::Pre, TaskKind::Main, TaskKind::Post]
        } else {
            vec![TaskKind::Main]
        };
        let job_exe_id = store.queue_job(
            NewJob {
                job_type: JOB_TYPES[n % JOB_TYPES.len()].to_string(),
                priority: (n % 3) as u32,
                resources: NodeResources::from_scalars(1.0, 512.0, 0.0),
                tasks,
            },
            when,
        )?;
        debug!(job_exe_id, "demo job queued");
    }
    if count > 0 {
        info!(jobs = count, "demo jobs queued");
    }
    Ok(())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
