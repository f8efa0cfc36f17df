// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Serialized access to a [`QueueFile`] from many threads.
//!
//! ## Architecture
//!
//! The queue is moved onto a dedicated thread. Callers send closures over a
//! crossbeam channel and block on a per-call reply channel, so operations
//! run one at a time, in the order they reach the channel.
//!
//! ```text
//! ┌──────────────┐     crossbeam      ┌──────────────┐               ┌──────────────┐
//! │ QueueHandle  │ ──── channel ────► │ queue worker │ ────────────► │  QueueFile   │
//! │  (any thread)│ ◄─── reply ─────── │  (bg thread) │               │   (owned)    │
//! └──────────────┘                    └──────────────┘               └──────────────┘
//! ```
//!
//! Each call observes the effects of every call that completed before it.

use std::{
    ops::Deref,
    thread::{self, JoinHandle},
};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};
use snafu::ResultExt;
use tracing::{error, info};

use crate::{
    OffsetCachePolicy, QueueFile, Result,
    error::{IoSnafu, WorkerStoppedSnafu},
};

const WORKER_THREAD_NAME: &str = "queue-file-worker";

type Job = Box<dyn FnOnce(&mut QueueFile) + Send>;

enum Command {
    Run(Job),
    /// Sync everything and stop; the reply carries the sync result.
    Shutdown(Sender<Result<()>>),
}

/// Owner of the worker thread.
///
/// Dereferences to a [`QueueHandle`]; clone handles to share the queue.
/// Dropping the owner stops the worker after a final sync.
pub struct SerializedQueue {
    handle: QueueHandle,
    worker: Option<JoinHandle<()>>,
}

impl SerializedQueue {
    /// Moves `queue` onto a new worker thread.
    pub fn spawn(queue: QueueFile) -> Result<Self> {
        let path = queue.path().to_path_buf();
        let (tx, rx) = channel::unbounded();
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run(queue, &rx))
            .context(IoSnafu { path })?;

        Ok(Self {
            handle: QueueHandle { tx },
            worker: Some(worker),
        })
    }

    /// A cloneable handle to the queue.
    #[must_use]
    pub fn handle(&self) -> QueueHandle { self.handle.clone() }

    /// Stops the worker after a final [`sync_all`](QueueFile::sync_all).
    ///
    /// Outstanding handles fail with `WorkerStopped` afterwards.
    pub fn shutdown(mut self) -> Result<()> { self.stop() }

    fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let (reply_tx, reply_rx) = channel::bounded(1);
        let synced = match self.handle.tx.send(Command::Shutdown(reply_tx)) {
            Ok(()) => reply_rx.recv().unwrap_or_else(|_| WorkerStoppedSnafu.fail()),
            Err(_) => WorkerStoppedSnafu.fail(),
        };
        if worker.join().is_err() {
            error!("Queue worker panicked");
            return WorkerStoppedSnafu.fail();
        }
        synced
    }
}

impl Deref for SerializedQueue {
    type Target = QueueHandle;

    fn deref(&self) -> &Self::Target { &self.handle }
}

impl Drop for SerializedQueue {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(error = %e, "Failed to stop queue worker cleanly");
        }
    }
}

fn run(mut queue: QueueFile, rx: &Receiver<Command>) {
    info!(path = ?queue.path(), "Queue worker starting");

    let mut reply = None;
    for command in rx {
        match command {
            Command::Run(job) => job(&mut queue),
            Command::Shutdown(tx) => {
                reply = Some(tx);
                break;
            }
        }
    }

    let synced = queue.sync_all();
    if let Err(ref e) = synced {
        error!(error = %e, "Failed final sync of queue file");
    }
    if let Some(tx) = reply {
        let _ = tx.send(synced);
    }

    info!(path = ?queue.path(), "Queue worker stopped");
}

/// Cloneable, `Send + Sync` handle that runs queue operations on the worker.
#[derive(Clone)]
pub struct QueueHandle {
    tx: Sender<Command>,
}

impl QueueHandle {
    /// Runs `f` on the worker thread with exclusive access to the queue.
    pub fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut QueueFile) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = channel::bounded(1);
        let job: Job = Box::new(move |queue| {
            let _ = reply_tx.send(f(queue));
        });
        self.tx
            .send(Command::Run(job))
            .map_err(|_| WorkerStoppedSnafu.build())?;
        reply_rx.recv().map_err(|_| WorkerStoppedSnafu.build())?
    }

    pub fn add(&self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        self.execute(move |queue| queue.add(&data))
    }

    pub fn add_n<I>(&self, payloads: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        let payloads: Vec<Bytes> = payloads.into_iter().map(Into::into).collect();
        self.execute(move |queue| queue.add_n(payloads))
    }

    pub fn peek(&self) -> Result<Option<Bytes>> { self.execute(|queue| queue.peek()) }

    pub fn remove(&self) -> Result<()> { self.execute(QueueFile::remove) }

    pub fn remove_n(&self, n: usize) -> Result<()> { self.execute(move |queue| queue.remove_n(n)) }

    pub fn clear(&self) -> Result<()> { self.execute(QueueFile::clear) }

    pub fn get_all(&self) -> Result<Vec<Bytes>> { self.execute(QueueFile::get_all) }

    pub fn size(&self) -> Result<usize> { self.execute(|queue| Ok(queue.size())) }

    pub fn is_empty(&self) -> Result<bool> { self.execute(|queue| Ok(queue.is_empty())) }

    pub fn file_len(&self) -> Result<u64> { self.execute(|queue| Ok(queue.file_len())) }

    pub fn used_bytes(&self) -> Result<u64> { self.execute(|queue| Ok(queue.used_bytes())) }

    pub fn sync_all(&self) -> Result<()> { self.execute(|queue| queue.sync_all()) }

    pub fn sync_writes(&self) -> Result<bool> { self.execute(|queue| Ok(queue.sync_writes())) }

    pub fn overwrite_on_remove(&self) -> Result<bool> {
        self.execute(|queue| Ok(queue.overwrite_on_remove()))
    }

    pub fn cache_offset_policy(&self) -> Result<OffsetCachePolicy> {
        self.execute(|queue| Ok(queue.cache_offset_policy()))
    }

    pub fn set_sync_writes(&self, value: bool) -> Result<()> {
        self.execute(move |queue| {
            queue.set_sync_writes(value);
            Ok(())
        })
    }

    pub fn set_overwrite_on_remove(&self, value: bool) -> Result<()> {
        self.execute(move |queue| {
            queue.set_overwrite_on_remove(value);
            Ok(())
        })
    }

    pub fn set_cache_offset_policy(&self, policy: OffsetCachePolicy) -> Result<()> {
        self.execute(move |queue| queue.set_cache_offset_policy(policy))
    }
}
