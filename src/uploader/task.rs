//! The upload task: a sequential, message-driven uploader.
//!
//! The task owns a FIFO queue of chunks and uploads them one at a time.
//! It alternates between two states:
//!
//! ```text
//!   IDLE ──enqueue──▶ RUNNING ──queue drained──▶ IDLE
//!     │                  │
//!     └──────stop────────┴──▶ (task exits)
//! ```
//!
//! Failed chunks are retried with backoff and, once their attempts are
//! exhausted, put back at the head of the queue so delivery order holds.

use crate::uploader::client::{UploadClient, UploadError};
use crate::uploader::protocol::{
    command_channel, status_channel, CommandRx, CommandTx, StatusRx, StatusTx, UploadCommand,
    UploadItem, UploadStatus,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Retry schedule for a single chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per queue cycle
    pub max_attempts: u32,
    /// Delay after the first ordinary failure; doubles on each further one
    pub base_delay: Duration,
    /// Fixed delay after an HTTP 403
    pub forbidden_delay: Duration,
    /// Exhausted cycles after which a chunk is dropped (None = never)
    pub max_requeues: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            forbidden_delay: Duration::from_secs(60),
            max_requeues: None,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32, err: &UploadError) -> Duration {
        if err.is_forbidden() {
            return self.forbidden_delay;
        }
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
}

/// A queued chunk plus how many times it has been put back.
#[derive(Debug)]
struct PendingItem {
    item: UploadItem,
    requeues: u32,
}

impl PendingItem {
    fn new(item: UploadItem) -> Self {
        Self { item, requeues: 0 }
    }
}

/// Handle to a spawned upload task.
pub struct UploadHandle {
    commands: CommandTx,
    status: StatusRx,
    join: JoinHandle<()>,
}

impl UploadHandle {
    /// Sender for enqueue/stop commands.
    pub fn commands(&self) -> CommandTx {
        self.commands.clone()
    }

    /// Split into the command sender, the status receiver and the join
    /// handle.
    pub fn into_parts(self) -> (CommandTx, StatusRx, JoinHandle<()>) {
        (self.commands, self.status, self.join)
    }
}

/// Sequential uploader driven by [`UploadCommand`]s.
pub struct UploadTask {
    client: UploadClient,
    policy: RetryPolicy,
    commands: CommandRx,
    status: StatusTx,
    queue: VecDeque<PendingItem>,
    state: TaskState,
    closed: bool,
}

impl UploadTask {
    /// Create a task around existing channels.
    pub fn new(
        client: UploadClient,
        policy: RetryPolicy,
        commands: CommandRx,
        status: StatusTx,
    ) -> Self {
        Self {
            client,
            policy,
            commands,
            status,
            queue: VecDeque::new(),
            state: TaskState::Idle,
            closed: false,
        }
    }

    /// Spawn a task on the current tokio runtime.
    pub fn spawn(client: UploadClient, policy: RetryPolicy) -> UploadHandle {
        let (commands, command_rx) = command_channel();
        let (status_tx, status) = status_channel();
        let task = Self::new(client, policy, command_rx, status_tx);
        let join = tokio::spawn(task.run());

        UploadHandle {
            commands,
            status,
            join,
        }
    }

    /// Run until a stop command arrives, or until every sender is gone and
    /// the queue is drained.
    pub async fn run(mut self) {
        info!("Upload task started");

        loop {
            if self.queue.is_empty() {
                self.set_state(TaskState::Idle);
                match self.commands.recv().await {
                    Some(UploadCommand::Enqueue(item)) => {
                        self.queue.push_back(PendingItem::new(item));
                    }
                    Some(UploadCommand::Stop) | None => break,
                }
                continue;
            }

            self.set_state(TaskState::Running);
            if !self.process_queue().await {
                break;
            }
        }

        info!(abandoned = self.queue.len(), "Upload task stopped");
    }

    /// Drain the queue. Returns false if a stop command arrived.
    async fn process_queue(&mut self) -> bool {
        while !self.queue.is_empty() {
            self.emit(UploadStatus::Start {
                in_queue: self.queue.len(),
            });

            let Some(mut pending) = self.queue.pop_front() else {
                break;
            };
            let started = Instant::now();

            // Keep accepting commands while the upload and its backoff run
            let result = {
                let upload = deliver(&self.client, &self.policy, &pending.item);
                tokio::pin!(upload);

                loop {
                    tokio::select! {
                        result = &mut upload => break result,
                        command = self.commands.recv(), if !self.closed => match command {
                            Some(UploadCommand::Enqueue(item)) => {
                                self.queue.push_back(PendingItem::new(item));
                            }
                            Some(UploadCommand::Stop) => {
                                info!(count = pending.item.count, "Stop received, abandoning upload");
                                return false;
                            }
                            None => self.closed = true,
                        },
                    }
                }
            };

            match result {
                Ok(()) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    debug!(
                        count = pending.item.count,
                        duration_ms,
                        in_queue = self.queue.len(),
                        "Chunk uploaded"
                    );
                    self.emit(UploadStatus::Ok {
                        in_queue: self.queue.len(),
                        duration_ms,
                    });
                }
                Err(err) => {
                    pending.requeues += 1;
                    let code = err.status();
                    let dropped = self
                        .policy
                        .max_requeues
                        .is_some_and(|max| pending.requeues >= max);

                    let message = if dropped {
                        format!(
                            "Dropping chunk of {} samples for user {} after {} failed cycles: {err}",
                            pending.item.count, pending.item.user_id, pending.requeues
                        )
                    } else {
                        format!(
                            "Upload of {} samples for user {} failed, requeued: {err}",
                            pending.item.count, pending.item.user_id
                        )
                    };
                    error!(status = ?code, place = %pending.item.place_id, "{message}");
                    self.emit(UploadStatus::Error { message, code });

                    if !dropped {
                        self.queue.push_front(pending);
                    }
                }
            }
        }

        self.set_state(TaskState::Idle);
        self.emit(UploadStatus::Start { in_queue: 0 });
        true
    }

    fn set_state(&mut self, state: TaskState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Upload task state change");
            self.state = state;
        }
    }

    fn emit(&self, status: UploadStatus) {
        if self.status.send(status).is_err() {
            debug!("Status receiver dropped");
        }
    }
}

/// Upload one chunk, sleeping after every failed attempt.
async fn deliver(
    client: &UploadClient,
    policy: &RetryPolicy,
    item: &UploadItem,
) -> Result<(), UploadError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match client.post_chunk(&item.endpoint, item.samples.clone()).await {
            Ok(_) => return Ok(()),
            Err(err) => {
                let delay = policy.delay_for(attempt, &err);
                warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    status = ?err.status(),
                    delay_ms = delay.as_millis() as u64,
                    "Chunk upload failed: {err}"
                );
                tokio::time::sleep(delay).await;

                attempt += 1;
                if attempt >= max_attempts {
                    return Err(err);
                }
            }
        }
    }
}
