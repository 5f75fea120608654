// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tabula_app::{Completion, Outgoing, PersistenceGateway, PersistenceWorker};
use tabula_tui::GridRuntime;
use tracing_subscriber::EnvFilter;

/// Drives the terminal page against a gateway running on the persistence
/// worker thread.
pub struct WorkerRuntime {
    worker: PersistenceWorker,
}

impl WorkerRuntime {
    pub fn spawn<G>(gateway: G) -> Result<Self>
    where
        G: PersistenceGateway + Send + 'static,
    {
        Ok(Self {
            worker: PersistenceWorker::spawn(gateway)?,
        })
    }
}

impl GridRuntime for WorkerRuntime {
    fn submit(&mut self, batch: Vec<Outgoing>) -> Result<()> {
        self.worker.submit_all(batch)
    }

    fn poll_completions(&mut self, timeout: Duration) -> Result<Vec<Completion>> {
        let mut ready = self.worker.try_completions();
        if ready.is_empty()
            && !timeout.is_zero()
            && let Some(completion) = self.worker.wait_completion(timeout)?
        {
            ready.push(completion);
            ready.extend(self.worker.try_completions());
        }
        Ok(ready)
    }
}

/// Send tracing output to `path`; the terminal page owns stdout.
/// `TABULA_LOG` overrides the configured filter.
pub fn init_logging(path: &Path, level: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {} -- set [log].path", path.display()))?;

    let filter = match std::env::var("TABULA_LOG") {
        Ok(raw) if !raw.trim().is_empty() => EnvFilter::try_new(&raw)
            .with_context(|| format!("TABULA_LOG={raw:?} is not a valid log filter"))?,
        _ => EnvFilter::try_new(level)
            .with_context(|| format!("log.level {level:?} is not a valid log filter"))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))
}

#[cfg(test)]
mod tests {
    use super::WorkerRuntime;
    use anyhow::Result;
    use std::time::{Duration, Instant};
    use tabula_app::{GridController, GridSettings, SEED_ROW_COUNT};
    use tabula_db::Store;
    use tabula_tui::GridRuntime;

    #[test]
    fn worker_runtime_loads_a_fresh_base() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let base = store.ensure_base("My Base")?;
        let mut runtime = WorkerRuntime::spawn(store)?;

        let mut grid = GridController::new(base.id, GridSettings::default());
        grid.start();
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            runtime.submit(grid.take_requests())?;
            let completions = runtime.poll_completions(Duration::from_millis(50))?;
            grid.complete_all(completions, Instant::now());
            if grid.is_idle() && grid.row_count() > 0 {
                break;
            }
        }

        assert_eq!(grid.tables().len(), 1);
        assert_eq!(grid.row_count(), SEED_ROW_COUNT);
        Ok(())
    }
}
