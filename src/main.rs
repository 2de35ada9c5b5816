use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use degu_queue::config::QueueConfig;
use degu_queue::error::BoxError;
use degu_queue::scheduler::{Job, JobParams, ReportHandlers, Status, StatusReport};
use degu_queue::shutdown::install_shutdown_handler;
use degu_queue::worker::SimulatedWorker;
use degu_queue::JobQueue;

#[derive(Parser, Debug)]
#[command(name = "degu-queue")]
#[command(version)]
#[command(about = "Single-worker job queue with async status dispatch")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a batch of simulated generation jobs through the queue
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Number of jobs to submit
    #[arg(long, default_value = "3")]
    jobs: usize,

    /// Iterations per job (negative runs none)
    #[arg(long, default_value = "2", allow_negative_numbers = true)]
    iterations: i64,

    /// Simulated time spent on each iteration, in milliseconds
    #[arg(long, default_value = "500")]
    work_ms: u64,

    /// Make the N-th worker call fail (1-based, counted across jobs)
    #[arg(long)]
    fail_at: Option<u64>,

    /// Prompt forwarded to the worker as the first argument
    #[arg(long, default_value = "Degu enjoys its morning coffee")]
    prompt: String,

    /// Dispatcher poll interval in milliseconds
    #[arg(long, default_value = "250")]
    poll_ms: u64,

    /// Make worker construction fail, to see how the queue reports it
    #[arg(long)]
    broken_worker: bool,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct ReportOutput {
    job_id: String,
    submitter: String,
    submitted_at: DateTime<Utc>,
    elapsed_ms: i64,
    status: String,
    result: Option<Value>,
}

/// Handlers that print every report and cancel `done` once `expected` jobs
/// have finished.
fn report_printer(
    format: OutputFormat,
    expected: usize,
    finished: Arc<AtomicUsize>,
    done: CancellationToken,
) -> ReportHandlers<String> {
    let mut handlers = ReportHandlers::<String>::new();

    for status in [Status::Starting, Status::Progress, Status::Failed] {
        handlers.register(status, move |job, report| print_report(format, job, report));
    }

    let on_finished = move |job: &Job<String>, report: &StatusReport| -> Result<(), BoxError> {
        print_report(format, job, report)?;
        if finished.fetch_add(1, Ordering::SeqCst) + 1 >= expected {
            tracing::info!(jobs = expected, "All jobs finished");
            done.cancel();
        }
        Ok(())
    };
    handlers.register(Status::Finished, on_finished);

    handlers
}

fn print_report(
    format: OutputFormat,
    job: &Job<String>,
    report: &StatusReport,
) -> Result<(), BoxError> {
    match format {
        OutputFormat::Table => {
            let result = report
                .result()
                .map(|value| value.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<38} {:<14} {:<10} {:>8} {}",
                job.id,
                job.external_reference,
                report.status(),
                job.age().num_milliseconds(),
                result
            );
        }
        OutputFormat::Json => {
            let output = ReportOutput {
                job_id: job.id.to_string(),
                submitter: job.external_reference.clone(),
                submitted_at: job.created_at,
                elapsed_ms: job.age().num_milliseconds(),
                status: report.status().to_string(),
                result: report.result(),
            };
            println!("{}", serde_json::to_string(&output)?);
        }
    }
    Ok(())
}

async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let token = CancellationToken::new();
    install_shutdown_handler(token.clone())?;

    let config = QueueConfig::new()
        .with_dispatch_poll_interval_ms(args.poll_ms)
        .with_dispatch_idle_interval_ms(args.poll_ms.saturating_mul(2));
    let finished = Arc::new(AtomicUsize::new(0));
    let handlers = report_printer(args.output, args.jobs, finished, token.clone());
    let queue = JobQueue::new(config, handlers).with_shutdown_token(token);

    let delay = Duration::from_millis(args.work_ms);
    let fail_at = args.fail_at;
    let broken = args.broken_worker;
    let executor = queue.spawn_executor(move || {
        if broken {
            return Err("worker construction refused (--broken-worker)".to_string());
        }
        let worker = SimulatedWorker::new(delay);
        Ok(match fail_at {
            Some(call) => worker.with_fail_at(call),
            None => worker,
        })
    })?;

    let jobs = (1..=args.jobs).map(|n| {
        Job::new(format!("submitter-{n}"), args.iterations)
            .with_params(JobParams::new().with_arg(args.prompt.clone()))
    });
    queue.add_jobs(jobs);

    if matches!(args.output, OutputFormat::Table) {
        println!(
            "{:<38} {:<14} {:<10} {:>8} RESULT",
            "JOB ID", "SUBMITTER", "STATUS", "AGE MS"
        );
    }

    if args.jobs == 0 {
        queue.shutdown();
    }
    queue.run_dispatcher().await;

    tokio::task::spawn_blocking(move || executor.join()).await??;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Run(run_args) => run(run_args).await?,
    }

    Ok(())
}
