//! Accumulation buffer
//!
//! The buffer is owned by a single task. Fetch adapters append through a
//! `BufferHandle`; the flush drains it in one step, so a flush can never
//! observe a partially applied append.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::sensors::Sample;

/// Pending commands before appends start waiting on the owner task
pub const COMMAND_CAPACITY: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Accumulation buffer task has stopped")]
pub struct BufferClosed;

#[derive(Debug)]
enum BufferCommand {
    Append(Vec<Sample>),
    Drain(oneshot::Sender<Vec<Sample>>),
    Len(oneshot::Sender<usize>),
}

/// Cloneable address of the buffer task
#[derive(Debug, Clone)]
pub struct BufferHandle {
    tx: mpsc::Sender<BufferCommand>,
}

/// Spawns the owner task. It exits once every handle is dropped.
pub fn spawn_buffer() -> BufferHandle {
    let (tx, mut rx) = mpsc::channel(COMMAND_CAPACITY);

    tokio::spawn(async move {
        let mut samples: Vec<Sample> = Vec::new();
        while let Some(command) = rx.recv().await {
            match command {
                BufferCommand::Append(mut batch) => samples.append(&mut batch),
                BufferCommand::Drain(reply) => {
                    let _ = reply.send(std::mem::take(&mut samples));
                }
                BufferCommand::Len(reply) => {
                    let _ = reply.send(samples.len());
                }
            }
        }
        if !samples.is_empty() {
            tracing::debug!(dropped = samples.len(), "Accumulation buffer closed with unsent samples");
        }
    });

    BufferHandle { tx }
}

impl BufferHandle {
    pub async fn append(&self, samples: Vec<Sample>) -> Result<(), BufferClosed> {
        if samples.is_empty() {
            return Ok(());
        }
        self.tx.send(BufferCommand::Append(samples)).await.map_err(|_| BufferClosed)
    }

    /// Takes the whole contents, leaving the buffer empty
    pub async fn drain(&self) -> Result<Vec<Sample>, BufferClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(BufferCommand::Drain(reply)).await.map_err(|_| BufferClosed)?;
        rx.await.map_err(|_| BufferClosed)
    }

    pub async fn len(&self) -> Result<usize, BufferClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(BufferCommand::Len(reply)).await.map_err(|_| BufferClosed)?;
        rx.await.map_err(|_| BufferClosed)
    }
}
