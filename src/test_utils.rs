//! In-memory doubles shared by the unit tests.

use std::{
    collections::{HashSet, VecDeque},
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Notify;
use tracing_subscriber::fmt::MakeWriter;

use crate::{
    codec::{Event, WireMessage},
    config::AdapterConfig,
    error::{BoxError, ConnectionError},
    event_processor::{EventProcessor, ProcessingError},
    job_pool::JobPool,
    queue_client::{Connect, QueueClient},
};

/// How long a test waits on the in-memory queue before giving up.
const WAIT_LIMIT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryQueueError {
    #[error("queue is closed")]
    Closed,
    #[error("injected {0} failure")]
    Injected(&'static str),
}

#[derive(Default)]
struct MemoryQueueState {
    pending: Mutex<VecDeque<WireMessage>>,
    deleted: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
    receive_waits: Mutex<Vec<u32>>,
    receive_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    close_calls: AtomicUsize,
    closed: AtomicBool,
    fail_deletes: AtomicBool,
    fail_sends: AtomicBool,
    changed: Notify,
}

/// A queue living in memory. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    state: Arc<MemoryQueueState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message, giving it a receipt handle derived from its id if it has none.
    pub fn push(&self, mut message: WireMessage) {
        if message.receipt_handle.is_none() {
            let id = message.message_id.clone().unwrap_or_default();
            message.receipt_handle = Some(format!("rh-{id}"));
        }
        self.state.pending.lock().unwrap().push_back(message);
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.deleted.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn receive_waits(&self) -> Vec<u32> {
        self.state.receive_waits.lock().unwrap().clone()
    }

    pub fn receive_calls(&self) -> usize {
        self.state.receive_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.state.delete_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.state.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Close the queue without going through the client facade.
    pub fn close_now(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }

    pub async fn wait_for_receive_calls(&self, count: usize) {
        self.wait_until(|queue| queue.receive_calls() >= count).await;
    }

    pub async fn wait_for_deletions(&self, count: usize) {
        self.wait_until(|queue| queue.deleted().len() >= count).await;
    }

    async fn wait_until(&self, done: impl Fn(&Self) -> bool) {
        let wait = async {
            loop {
                let changed = self.state.changed.notified();
                if done(self) {
                    return;
                }
                changed.await;
            }
        };
        tokio::time::timeout(WAIT_LIMIT, wait)
            .await
            .expect("timed out waiting on memory queue");
    }

    fn check_open(&self) -> Result<(), MemoryQueueError> {
        if self.state.closed.load(Ordering::SeqCst) {
            Err(MemoryQueueError::Closed)
        } else {
            Ok(())
        }
    }
}

impl QueueClient for MemoryQueue {
    type Error = MemoryQueueError;

    async fn receive(
        &self,
        _queue_url: &str,
        wait_seconds: u32,
    ) -> Result<Vec<WireMessage>, Self::Error> {
        self.state.receive_calls.fetch_add(1, Ordering::SeqCst);
        self.state.receive_waits.lock().unwrap().push(wait_seconds);
        self.state.changed.notify_waiters();
        self.check_open()?;

        let next = self.state.pending.lock().unwrap().pop_front();
        match next {
            Some(message) => Ok(vec![message]),
            None => {
                // Stand-in for the long-poll wait; keeps idle loops yielding.
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn delete(&self, _queue_url: &str, receipt_handle: &str) -> Result<(), Self::Error> {
        self.state.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_open()?;
        if self.state.fail_deletes.load(Ordering::SeqCst) {
            return Err(MemoryQueueError::Injected("delete"));
        }
        self.state
            .deleted
            .lock()
            .unwrap()
            .push(receipt_handle.to_string());
        self.state.changed.notify_waiters();
        Ok(())
    }

    async fn send(&self, _queue_url: &str, body: &str) -> Result<(), Self::Error> {
        self.check_open()?;
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(MemoryQueueError::Injected("send"));
        }
        self.state.sent.lock().unwrap().push(body.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out a shared [`MemoryQueue`], or failing on demand.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    pub queue: MemoryQueue,
    pub fail: bool,
}

impl Connect for MemoryConnector {
    type Client = MemoryQueue;

    async fn connect(&self, _config: &AdapterConfig) -> Result<MemoryQueue, ConnectionError> {
        if self.fail {
            return Err(ConnectionError::Client(BoxError::from("connection refused")));
        }
        Ok(self.queue.clone())
    }
}

/// Connector handing out a different queue on every call, in order.
pub struct RotatingConnector {
    queues: Vec<MemoryQueue>,
    next: AtomicUsize,
}

impl RotatingConnector {
    pub fn new(queues: &[MemoryQueue]) -> Self {
        Self {
            queues: queues.to_vec(),
            next: AtomicUsize::new(0),
        }
    }
}

impl Connect for RotatingConnector {
    type Client = MemoryQueue;

    async fn connect(&self, _config: &AdapterConfig) -> Result<MemoryQueue, ConnectionError> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        self.queues
            .get(index)
            .cloned()
            .ok_or_else(|| ConnectionError::Client(BoxError::from("no queue left")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorMode {
    Succeed,
    Fail,
    Panic,
}

/// Processor that records every event it is given.
pub struct RecordingProcessor {
    mode: ProcessorMode,
    failing_ids: HashSet<String>,
    events: Mutex<Vec<Event>>,
}

impl RecordingProcessor {
    pub fn new(mode: ProcessorMode) -> Self {
        Self {
            mode,
            failing_ids: HashSet::new(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Fail only for the given external ids.
    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            mode: ProcessorMode::Succeed,
            failing_ids: ids.iter().map(|id| id.to_string()).collect(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl EventProcessor for RecordingProcessor {
    async fn process_event(&self, event: Event) -> Result<(), ProcessingError> {
        let fail = self.failing_ids.contains(&event.ext_id);
        self.events.lock().unwrap().push(event);

        match self.mode {
            ProcessorMode::Panic => panic!("processor blew up"),
            ProcessorMode::Fail => Err("processor rejected event".into()),
            ProcessorMode::Succeed if fail => Err("processor rejected event".into()),
            ProcessorMode::Succeed => Ok(()),
        }
    }
}

/// Job pool that counts submissions and runs them on the current tokio runtime.
#[derive(Default)]
pub struct CountingJobPool {
    submitted: AtomicUsize,
}

impl CountingJobPool {
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

impl JobPool for CountingJobPool {
    fn submit(&self, job: BoxFuture<'static, ()>) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(job);
    }
}

/// Buffer collecting formatted log lines.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Capture log output on the current thread until the guard is dropped.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}
