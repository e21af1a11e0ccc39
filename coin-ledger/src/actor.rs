//! Actor-based concurrency for the ledger
//!
//! The [`Ledger`] is owned by a single Tokio task. Callers hold a cloneable
//! [`LedgerHandle`] and send transactions over a bounded mailbox, so
//! transactions run one at a time in arrival order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │     execute(|txn| ...) / view(|txn| ...) / flush()    │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ Ledger::execute → committed change set         │  │
//! │  │ Timer: 10ms or 100 change sets → flush()       │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                       │                               │
//! │                       ▼                               │
//! │           Storage::write_change_sets()                │
//! │          (atomic write to RocksDB)                    │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::{store::Transaction, Config, Error, Ledger, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Duration};

type Job = Box<dyn FnOnce(&mut Ledger) + Send>;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Run a job against the ledger
    Run(Job),

    /// Flush buffered change sets immediately
    Flush {
        /// Number of change sets written
        response: oneshot::Sender<Result<usize>>,
    },

    /// Flush and stop the actor
    Shutdown {
        /// Result of the final flush
        response: oneshot::Sender<Result<()>>,
    },
}

impl std::fmt::Debug for LedgerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerMessage::Run(_) => f.write_str("Run"),
            LedgerMessage::Flush { .. } => f.write_str("Flush"),
            LedgerMessage::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}

/// Actor that owns the ledger
#[derive(Debug)]
pub struct LedgerActor {
    /// The ledger
    ledger: Ledger,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Maximum batch size (change sets)
    max_batch_size: usize,

    /// Batch timeout
    batch_timeout: Duration,

    /// Batching enabled
    batching_enabled: bool,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(ledger: Ledger, mailbox: mpsc::Receiver<LedgerMessage>, config: &Config) -> Self {
        Self {
            ledger,
            mailbox,
            max_batch_size: config.batching.max_batch_size,
            batch_timeout: Duration::from_millis(config.batching.batch_timeout_ms.max(1)),
            batching_enabled: config.batching.enabled,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut batch_timer = interval(self.batch_timeout);
        batch_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut shutdown_reply = None;

        loop {
            tokio::select! {
                // Process incoming messages
                Some(msg) = self.mailbox.recv() => {
                    match msg {
                        LedgerMessage::Run(job) => job(&mut self.ledger),
                        LedgerMessage::Flush { response } => {
                            let _ = response.send(self.ledger.flush());
                        }
                        LedgerMessage::Shutdown { response } => {
                            shutdown_reply = Some(response);
                            break;
                        }
                    }

                    // Check if batch is full
                    if self.batching_enabled && self.ledger.pending_len() >= self.max_batch_size {
                        if let Err(e) = self.ledger.flush() {
                            tracing::error!(error = %e, "Error flushing batch");
                        }
                    }
                }

                // Batch timeout expired
                _ = batch_timer.tick(), if self.batching_enabled && self.ledger.pending_len() > 0 => {
                    if let Err(e) = self.ledger.flush() {
                        tracing::error!(error = %e, "Error flushing batch on timeout");
                    }
                }

                // Mailbox closed
                else => break,
            }
        }

        // Flush remaining batch and release storage before acknowledging
        let LedgerActor {
            ledger, mailbox, ..
        } = self;
        drop(mailbox);
        let result = ledger.close();
        if let Err(e) = &result {
            tracing::error!(error = %e, "Error closing ledger on shutdown");
        }
        tracing::info!("Ledger actor stopped");

        if let Some(response) = shutdown_reply {
            let _ = response.send(result);
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn send(&self, msg: LedgerMessage) -> Result<()> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))
    }

    async fn call<T: Send + 'static>(
        &self,
        f: impl FnOnce(&mut Ledger) -> T + Send + 'static,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |ledger| {
            let _ = tx.send(f(ledger));
        });
        self.send(LedgerMessage::Run(job)).await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Run `f` as one transaction, see [`Ledger::execute`]
    pub async fn execute<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Transaction<'_>) -> Result<T> + Send + 'static,
    {
        self.call(move |ledger| ledger.execute(f)).await?
    }

    /// Run `f` against committed state, see [`Ledger::view`]
    pub async fn view<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Transaction<'_>) -> Result<T> + Send + 'static,
    {
        self.call(move |ledger| ledger.view(f)).await?
    }

    /// Read from the ledger itself, e.g. its event log
    pub async fn inspect<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Ledger) -> T + Send + 'static,
    {
        self.call(move |ledger| f(ledger)).await
    }

    /// Flush buffered change sets immediately
    pub async fn flush(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::Flush { response: tx }).await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Flush and stop the actor; resolves once storage is released
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::Shutdown { response: tx }).await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(ledger: Ledger, config: &Config) -> LedgerHandle {
    // Bounded channel for backpressure
    let (tx, rx) = mpsc::channel(config.actor.mailbox_capacity.max(1));
    let actor = LedgerActor::new(ledger, rx, config);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
