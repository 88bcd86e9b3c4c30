//! Binary entry point for the cloudjobs CLI.

use std::future::Future;
use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use cloudjobs::{
    AsyncOperation, CausalChain, ClientConfig, Closeable, Closer, ConfigError, ErrorDescriptor,
    HttpJobSource, HttpSourceError, JobCompletion, JobError, JobSource, LifecycleError,
    MapperKind, OperationError, RetryingPredicate, StatusMapper, WorkerPool,
};

mod cli;

use cli::{ClassifyCommand, Cli, ListCommand, MapperChoice, WaitCommand};

type SourceError = OperationError<HttpSourceError>;
type WaitOutcome = Result<Option<serde_json::Value>, JobError<SourceError>>;
type SharedCompletion =
    Arc<RetryingPredicate<JobCompletion<HttpJobSource<serde_json::Value>, MapperKind>>>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("client error: {0}")]
    Client(#[from] HttpSourceError),
    #[error("job source error: {0}")]
    Source(#[from] SourceError),
    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("worker task failed: {0}")]
    Worker(String),
    #[error("{failed} of {total} job(s) did not succeed")]
    JobsFailed { failed: usize, total: usize },
    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl From<MapperChoice> for MapperKind {
    fn from(choice: MapperChoice) -> Self {
        match choice {
            MapperChoice::Progress => Self::Progress,
            MapperChoice::CloudStack => Self::CloudStack,
            MapperChoice::GoGrid => Self::GoGrid,
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let config = ClientConfig::load_without_cli_args()?;
    match cli {
        Cli::Wait(command) => wait(&config, command).await,
        Cli::List(command) => list(&config, &command, io::stdout()).await,
        Cli::Classify(command) => classify(&config, &command, io::stdout()),
    }
}

fn http_source(config: &ClientConfig) -> Result<HttpJobSource<serde_json::Value>, CliError> {
    let source = HttpJobSource::new(
        &config.endpoint,
        config.request_policy()?,
        config.classifier(),
    )?;
    Ok(match &config.auth_token {
        Some(token) => source.with_auth_token(token.as_str()),
        None => source,
    })
}

async fn wait(config: &ClientConfig, command: WaitCommand) -> Result<i32, CliError> {
    let completion = Arc::new(
        JobCompletion::new(http_source(config)?, MapperKind::from(command.mapper))
            .retrying(config.retry_policy()?),
    );
    let closer = config.closer();
    let pool = Arc::new(WorkerPool::new("job-waits", config.user_threads));
    closer
        .add_to_close(Arc::clone(&pool) as Arc<dyn Closeable>)
        .await?;

    let tally = closing_after(&closer, async {
        let handles = spawn_waits(&pool, &completion, command.job_ids).await?;
        report_results(handles, io::stdout(), io::stderr()).await
    })
    .await?;

    if tally.failed > 0 {
        return Err(CliError::JobsFailed {
            failed: tally.failed,
            total: tally.total,
        });
    }
    Ok(0)
}

/// Runs `work`, then closes `closer` whether or not `work` succeeded.
///
/// The error from `work` wins over a close failure.
async fn closing_after<T>(
    closer: &Closer,
    work: impl Future<Output = Result<T, CliError>>,
) -> Result<T, CliError> {
    let outcome = work.await;
    let closed = closer.close().await;
    let value = outcome?;
    closed?;
    Ok(value)
}

async fn spawn_waits(
    pool: &WorkerPool,
    completion: &SharedCompletion,
    job_ids: Vec<String>,
) -> Result<Vec<JoinHandle<WaitOutcome>>, CliError> {
    let mut handles = Vec::with_capacity(job_ids.len());
    for job_id in job_ids {
        let shared = Arc::clone(completion);
        let operation = AsyncOperation::<serde_json::Value>::new(job_id);
        let handle = pool
            .spawn(async move { operation.await_result(shared.as_ref()).await })
            .await?;
        handles.push(handle);
    }
    Ok(handles)
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct Tally {
    failed: usize,
    total: usize,
}

async fn report_results(
    handles: Vec<JoinHandle<WaitOutcome>>,
    mut out: impl Write,
    mut err: impl Write,
) -> Result<Tally, CliError> {
    let mut tally = Tally::default();
    for handle in handles {
        tally.total = tally.total.saturating_add(1);
        let outcome = handle
            .await
            .map_err(|join| CliError::Worker(join.to_string()))?;
        match outcome {
            Ok(Some(result)) => writeln!(out, "{}", serde_json::to_string(&result)?)?,
            Ok(None) => {}
            Err(failure) => {
                tally.failed = tally.failed.saturating_add(1);
                writeln!(err, "{failure}")?;
            }
        }
    }
    Ok(tally)
}

async fn list(
    config: &ClientConfig,
    command: &ListCommand,
    mut out: impl Write,
) -> Result<i32, CliError> {
    let source = http_source(config)?;
    let mapper = MapperKind::from(command.mapper);
    let mut inconsistent = 0_usize;
    for record in source.list_jobs().await? {
        let id = record.id.clone();
        match mapper.map(record) {
            Ok(state) => writeln!(out, "{id}\t{}", state.status())?,
            Err(err) => {
                inconsistent = inconsistent.saturating_add(1);
                writeln!(out, "{id}\tINCONSISTENT\t{}", err.reason)?;
            }
        }
    }
    Ok(if inconsistent == 0 { 0 } else { 1 })
}

fn classify(
    config: &ClientConfig,
    command: &ClassifyCommand,
    mut out: impl Write,
) -> Result<i32, CliError> {
    let chain = CausalChain::from_descriptors(
        command
            .messages
            .iter()
            .map(|message| ErrorDescriptor::from_message(message.as_str())),
    );
    let class = config.classifier().classify_chain(&chain);
    writeln!(out, "{class}")?;
    Ok(0)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
