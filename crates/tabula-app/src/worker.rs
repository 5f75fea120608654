// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

use crate::gateway::{PersistenceGateway, Request, Response, execute};
use crate::optimistic::Ticket;

/// A gateway call queued by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub ticket: Ticket,
    pub request: Request,
}

#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub result: Result<Response>,
}

/// Owns the gateway on a background thread. Requests run one at a time in
/// submission order, so storage sees mutations in the order they were
/// issued and completions come back in that same order.
pub struct PersistenceWorker {
    requests: Option<Sender<Outgoing>>,
    completions: Receiver<Completion>,
    handle: Option<JoinHandle<()>>,
}

impl PersistenceWorker {
    pub fn spawn<G>(gateway: G) -> Result<Self>
    where
        G: PersistenceGateway + Send + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel::<Outgoing>();
        let (completion_tx, completion_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("tabula-persistence".to_owned())
            .spawn(move || {
                for outgoing in request_rx {
                    let label = outgoing.request.label();
                    debug!(ticket = outgoing.ticket.get(), op = label, "executing request");
                    let result = execute(&gateway, outgoing.request);
                    let completion = Completion {
                        ticket: outgoing.ticket,
                        result,
                    };
                    if completion_tx.send(completion).is_err() {
                        break;
                    }
                }
                info!("persistence worker stopped");
            })
            .context("spawn persistence worker thread")?;

        Ok(Self {
            requests: Some(request_tx),
            completions: completion_rx,
            handle: Some(handle),
        })
    }

    pub fn submit(&self, outgoing: Outgoing) -> Result<()> {
        let sender = self
            .requests
            .as_ref()
            .ok_or_else(|| anyhow!("persistence worker is shut down"))?;
        sender
            .send(outgoing)
            .map_err(|_| anyhow!("persistence worker stopped unexpectedly; restart tabula"))
    }

    pub fn submit_all(&self, batch: Vec<Outgoing>) -> Result<()> {
        for outgoing in batch {
            self.submit(outgoing)?;
        }
        Ok(())
    }

    /// Drain every completion that has already arrived without blocking.
    pub fn try_completions(&self) -> Vec<Completion> {
        let mut drained = Vec::new();
        while let Ok(completion) = self.completions.try_recv() {
            drained.push(completion);
        }
        drained
    }

    pub fn wait_completion(&self, timeout: Duration) -> Result<Option<Completion>> {
        match self.completions.recv_timeout(timeout) {
            Ok(completion) => Ok(Some(completion)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(anyhow!("persistence worker stopped unexpectedly; restart tabula"))
            }
        }
    }
}

impl Drop for PersistenceWorker {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Execute queued calls on the current thread, in order.
pub fn run_inline<G>(gateway: &G, batch: Vec<Outgoing>) -> Vec<Completion>
where
    G: PersistenceGateway + ?Sized,
{
    batch
        .into_iter()
        .map(|outgoing| Completion {
            ticket: outgoing.ticket,
            result: execute(gateway, outgoing.request),
        })
        .collect()
}
