//! Auxiliary execution pools handed to players for a match.

use crate::config::MatchConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

/// A bounded pool running blocking jobs on tokio's blocking threads.
///
/// At most `size` jobs run at once; further jobs wait for a slot. Once the
/// match ends the pool is closed and new jobs fail.
#[derive(Debug, Clone)]
pub struct ExecutorPool {
    name: &'static str,
    size: usize,
    permits: Arc<Semaphore>,
}

impl ExecutorPool {
    /// Creates a pool running at most `size` jobs concurrently.
    pub fn new(name: &'static str, size: usize) -> Self {
        Self {
            name,
            size,
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    /// Pool name, for logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Maximum number of concurrent jobs.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `job` on a blocking thread once a slot is free.
    #[instrument(skip(self, job), fields(pool = self.name))]
    pub async fn run<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .with_context(|| format!("{} pool is shut down", self.name))?;
        let output = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .with_context(|| format!("{} pool job failed", self.name))?;
        Ok(output)
    }

    /// True once the pool stopped accepting jobs.
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    fn close(&self) {
        self.permits.close();
    }
}

/// Pools configured for one match.
#[derive(Debug, Clone, Default, derive_getters::Getters)]
pub struct Executors {
    /// Cap on extra threads a player may occupy for its own searches.
    extra_threads: Option<ExecutorPool>,
    /// Pool for computations a move depends on.
    aux: Option<ExecutorPool>,
    /// Pool for bookkeeping off the move path, such as replaying moves.
    background: Option<ExecutorPool>,
}

impl Executors {
    /// Builds the pools `config` asks for, or `None` when it sets no bounds.
    #[instrument(skip(config))]
    pub(crate) fn from_config(config: &MatchConfig) -> Option<Self> {
        let executors = Self {
            extra_threads: config
                .max_extra_threads()
                .map(|size| ExecutorPool::new("extra_threads", size)),
            aux: config.aux_pool_size().map(|size| ExecutorPool::new("aux", size)),
            background: config
                .background_pool_size()
                .map(|size| ExecutorPool::new("background", size)),
        };
        if executors.extra_threads.is_none()
            && executors.aux.is_none()
            && executors.background.is_none()
        {
            return None;
        }
        debug!(?executors, "Built match executors");
        Some(executors)
    }

    /// Closes every pool.
    pub(crate) fn shutdown(&self) {
        for pool in [&self.extra_threads, &self.aux, &self.background]
            .into_iter()
            .flatten()
        {
            pool.close();
        }
        debug!("Match executors shut down");
    }
}
