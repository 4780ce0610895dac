//! Single-threaded event loops.
//!
//! # Responsibilities
//! - Run N worker threads, each driving a current-thread runtime + `LocalSet`
//! - Accept requests from connection tasks and route them on a loop
//! - Send the finalized response back over a one-shot channel
//!
//! # Design Decisions
//! - Every `Response` is created, mutated and finalized on one loop thread,
//!   so handler state is `Rc`/`RefCell` and never locked
//! - Loops are picked round robin
//! - Each loop's queue is bounded; a full queue rejects instead of growing
//! - A dropped reply receiver (client gone) is seen by the response as
//!   `is_alive() == false`

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use axum::http::header;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::LocalSet;

use super::request::{HttpRequest, Request};
use super::response::{Response, WireResponse};
use super::AsyncResp;
use crate::routing::Router;

/// One request posted to a loop.
struct Job {
    request: Request,
    reply: oneshot::Sender<WireResponse>,
}

/// Why a request could not be posted to a loop.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("event loop queue is full")]
    Full,
    #[error("event loop has stopped")]
    Stopped,
}

/// Fixed pool of single-threaded loops sharing one router.
#[derive(Debug)]
pub struct EventLoopPool {
    senders: Vec<mpsc::Sender<Job>>,
    next: AtomicUsize,
}

impl EventLoopPool {
    /// Spawn `workers` loop threads (at least one), each queueing up to
    /// `queue_depth` requests.
    pub fn start(workers: usize, queue_depth: usize, router: Arc<Router>) -> io::Result<Self> {
        let mut senders = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let (tx, rx) = mpsc::channel(queue_depth.max(1));
            let router = Arc::clone(&router);
            thread::Builder::new()
                .name(format!("event-loop-{index}"))
                .spawn(move || {
                    let local = LocalSet::new();
                    local.block_on(&runtime, run_loop(index, rx, router));
                })?;
            senders.push(tx);
        }
        tracing::info!(workers = senders.len(), queue_depth, "Event loops started");
        Ok(Self {
            senders,
            next: AtomicUsize::new(0),
        })
    }

    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Post a request to the next loop without waiting for queue space.
    /// The receiver yields the finalized response, or an error if the
    /// request was dropped unanswered.
    pub fn submit(&self, request: Request) -> Result<oneshot::Receiver<WireResponse>, SubmitError> {
        let (reply, rx) = oneshot::channel();
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        match self.senders[index].try_send(Job { request, reply }) {
            Ok(()) => Ok(rx),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(event_loop = index, "Event loop queue is full");
                Err(SubmitError::Full)
            }
            Err(TrySendError::Closed(_)) => {
                tracing::error!(event_loop = index, "Event loop has stopped");
                Err(SubmitError::Stopped)
            }
        }
    }
}

async fn run_loop(index: usize, mut rx: mpsc::Receiver<Job>, router: Arc<Router>) {
    tracing::debug!(event_loop = index, "Event loop running");
    while let Some(Job { request, reply }) = rx.recv().await {
        let router = Arc::clone(&router);
        // A panicking handler ends its own task, not the loop.
        tokio::task::spawn_local(async move {
            let mut res = Response::for_connection(reply);
            if let Some(tag) = request.header(header::IF_NONE_MATCH.as_str()) {
                res.set_expected_hash(tag);
            }
            router.dispatch(request, AsyncResp::new(res));
        });
    }
    tracing::debug!(event_loop = index, "Event loop stopped");
}
