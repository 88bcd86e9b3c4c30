//! Test support utilities shared across unit and integration tests.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::classify::TransportError;
use crate::job::{JobId, JobRecord, JobSource, SourceFuture};
use crate::lifecycle::{CloseFuture, Closeable};

fn lock<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum ScriptStep<T> {
    Record(JobRecord<T>),
    Fail(TransportError),
}

struct Script<T> {
    steps: HashMap<JobId, VecDeque<ScriptStep<T>>>,
    fetches: HashMap<JobId, u32>,
    listing: Vec<JobRecord<T>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            steps: HashMap::new(),
            fetches: HashMap::new(),
            listing: Vec::new(),
        }
    }
}

/// Errors raised by [`ScriptedJobSource`].
#[derive(Debug, Error)]
pub enum ScriptedSourceError {
    /// No record was scripted for the job.
    #[error("no scripted record for job {0}")]
    Missing(JobId),
    /// A scripted transport failure.
    #[error("scripted transport failure")]
    Transport(#[source] TransportError),
}

/// Job source that answers pre-seeded records in FIFO order per job.
///
/// Once a job's queue holds a single record, that record is answered for
/// every further fetch, modelling a job that stays in its last state.
pub struct ScriptedJobSource<T> {
    script: Arc<StdMutex<Script<T>>>,
}

impl<T> Clone for ScriptedJobSource<T> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
        }
    }
}

impl<T> Default for ScriptedJobSource<T> {
    fn default() -> Self {
        Self {
            script: Arc::new(StdMutex::new(Script::default())),
        }
    }
}

impl<T> std::fmt::Debug for ScriptedJobSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedJobSource").finish_non_exhaustive()
    }
}

impl<T> ScriptedJobSource<T> {
    /// Creates a source with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `record` as the next answer for job `id`.
    pub fn push(&self, id: impl Into<JobId>, record: JobRecord<T>) {
        lock(&self.script)
            .steps
            .entry(id.into())
            .or_default()
            .push_back(ScriptStep::Record(record));
    }

    /// Queues a transport failure as the next answer for job `id`.
    pub fn push_failure(&self, id: impl Into<JobId>, err: TransportError) {
        lock(&self.script)
            .steps
            .entry(id.into())
            .or_default()
            .push_back(ScriptStep::Fail(err));
    }

    /// Replaces the records answered by `list_jobs`.
    pub fn set_listing(&self, records: Vec<JobRecord<T>>) {
        lock(&self.script).listing = records;
    }

    /// Returns how many times job `id` was fetched.
    #[must_use]
    pub fn fetch_count(&self, id: impl Into<JobId>) -> u32 {
        lock(&self.script)
            .fetches
            .get(&id.into())
            .copied()
            .unwrap_or(0)
    }
}

impl<T> ScriptedJobSource<T>
where
    T: Clone,
{
    fn next(&self, id: &JobId) -> Result<JobRecord<T>, ScriptedSourceError> {
        let mut script = lock(&self.script);
        *script.fetches.entry(id.clone()).or_insert(0) += 1;
        let queue = script
            .steps
            .get_mut(id)
            .ok_or_else(|| ScriptedSourceError::Missing(id.clone()))?;
        let last = match queue.front() {
            Some(ScriptStep::Record(record)) if queue.len() == 1 => Some(record.clone()),
            _ => None,
        };
        if let Some(record) = last {
            return Ok(record);
        }
        match queue.pop_front() {
            Some(ScriptStep::Record(record)) => Ok(record),
            Some(ScriptStep::Fail(err)) => Err(ScriptedSourceError::Transport(err)),
            None => Err(ScriptedSourceError::Missing(id.clone())),
        }
    }
}

impl<T> JobSource for ScriptedJobSource<T>
where
    T: Clone + Send + 'static,
{
    type Payload = T;
    type Error = ScriptedSourceError;

    fn fetch_job<'a>(
        &'a self,
        id: &'a JobId,
    ) -> SourceFuture<'a, JobRecord<Self::Payload>, Self::Error> {
        let scripted = self.next(id);
        Box::pin(async move { scripted })
    }

    fn list_jobs(&self) -> SourceFuture<'_, Vec<JobRecord<Self::Payload>>, Self::Error> {
        let listing = lock(&self.script).listing.clone();
        Box::pin(async move { Ok(listing) })
    }
}

/// Shared, ordered record of resource closes.
#[derive(Clone, Debug, Default)]
pub struct CloseLog {
    entries: Arc<StdMutex<Vec<String>>>,
}

impl CloseLog {
    /// Returns the closed resource names in close order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }

    /// Returns how many times `name` was closed.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|entry| entry.as_str() == name)
            .count()
    }

    fn record(&self, name: &str) {
        lock(&self.entries).push(name.to_owned());
    }
}

/// Closeable resource that records its close in a [`CloseLog`].
#[derive(Clone, Debug)]
pub struct RecordingResource {
    name: String,
    log: CloseLog,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl RecordingResource {
    /// Creates a resource recording into `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &CloseLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            delay: None,
            failure: None,
        }
    }

    /// Makes the close take `delay` before it is recorded.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes the close fail with `message` after it is recorded.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

impl Closeable for RecordingResource {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn close(&self) -> CloseFuture<'_> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.log.record(&self.name);
            match &self.failure {
                Some(message) => Err(message.clone().into()),
                None => Ok(()),
            }
        })
    }
}

/// Canned HTTP response served by [`serve_http`].
#[derive(Clone, Debug)]
pub struct HttpReply {
    status: u16,
    body: String,
}

impl HttpReply {
    /// Creates a JSON response.
    #[must_use]
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    fn render(&self) -> String {
        let reason = reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("Unknown");
        format!(
            "HTTP/1.1 {} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.body.len(),
            self.body
        )
    }
}

/// Local HTTP server answering canned replies in order.
///
/// The last reply is repeated once the list is exhausted. Dropping the
/// server stops it.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    requests: Arc<StdMutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Returns the base URL of the server.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Returns the request heads received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts a [`TestServer`] on an ephemeral local port.
///
/// # Errors
///
/// Returns the bind error when no local port is available.
pub async fn serve_http(replies: Vec<HttpReply>) -> io::Result<TestServer> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let requests = Arc::new(StdMutex::new(Vec::new()));
    let seen = Arc::clone(&requests);
    let task = tokio::spawn(async move {
        let mut served = 0_usize;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let reply = replies
                .get(served)
                .or_else(|| replies.last())
                .cloned()
                .unwrap_or_else(|| HttpReply::json(404, "{}"));
            served = served.saturating_add(1);
            if let Err(err) = answer(stream, &reply, &seen).await {
                tracing::debug!(%err, "test server connection failed");
            }
        }
    });
    Ok(TestServer {
        addr,
        requests,
        task,
    })
}

async fn answer(
    mut stream: TcpStream,
    reply: &HttpReply,
    seen: &StdMutex<Vec<String>>,
) -> io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0_u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        head.extend_from_slice(buf.get(..read).unwrap_or_default());
    }
    lock(seen).push(String::from_utf8_lossy(&head).into_owned());
    stream.write_all(reply.render().as_bytes()).await?;
    stream.shutdown().await
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
