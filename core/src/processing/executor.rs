//! Sequential and pooled execution of preparation units.
//!
//! Both executors return one output path per descriptor, in submission order.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

use crate::prelude::{EnmError, EnmResult};
use crate::processing::unit::{PreparationWorker, UnitDescriptor};
use crate::telemetry::LogManager;

pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs every descriptor and blocks until the batch is finished.
    fn submit_and_wait(
        &self,
        descriptors: Vec<UnitDescriptor>,
        worker: Arc<PreparationWorker>,
    ) -> EnmResult<Vec<PathBuf>>;
}

/// Runs units one after another on the calling thread and stops at the
/// first failure.
#[derive(Debug)]
pub struct InProcessExecutor {
    logger: LogManager,
}

impl Default for InProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessExecutor {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new("sequential"),
        }
    }
}

impl Executor for InProcessExecutor {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn submit_and_wait(
        &self,
        descriptors: Vec<UnitDescriptor>,
        worker: Arc<PreparationWorker>,
    ) -> EnmResult<Vec<PathBuf>> {
        let mut remaining = descriptors.len();
        let mut outputs = Vec::with_capacity(remaining);
        for descriptor in &descriptors {
            outputs.push(worker.prepare(descriptor)?);
            remaining -= 1;
            self.logger
                .record(&format!("{} images remaining to process", remaining));
        }
        Ok(outputs)
    }
}

/// Blocking tasks submitted as one group and joined together.
///
/// Results come back indexed by submission, whatever order the tasks finish
/// in. Nothing is cancelled when a task fails.
pub struct TaskGroup<'rt, T> {
    runtime: &'rt Runtime,
    handles: Vec<JoinHandle<EnmResult<T>>>,
}

impl<'rt, T: Send + 'static> TaskGroup<'rt, T> {
    pub fn new(runtime: &'rt Runtime) -> Self {
        Self {
            runtime,
            handles: Vec::new(),
        }
    }

    /// Queues `task` on the blocking pool and returns its submission index.
    pub fn submit<F>(&mut self, task: F) -> usize
    where
        F: FnOnce() -> EnmResult<T> + Send + 'static,
    {
        self.handles.push(self.runtime.spawn_blocking(task));
        self.handles.len() - 1
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every submitted task.
    pub fn join(self) -> Vec<EnmResult<T>> {
        let handles = self.handles;
        self.runtime.block_on(async move {
            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(EnmError::Worker(e.to_string())),
                });
            }
            results
        })
    }
}

/// Fans units out over a dedicated blocking pool of `workers` threads.
///
/// Each descriptor crosses to its worker as JSON. A failed unit is reported
/// only after all of its siblings have finished.
pub struct PooledExecutor {
    runtime: Runtime,
    workers: usize,
    logger: LogManager,
}

impl PooledExecutor {
    pub fn new(workers: usize) -> EnmResult<Self> {
        if workers == 0 {
            return Err(EnmError::Configuration(
                "pooled executor needs at least one worker".to_string(),
            ));
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("enm-prepare")
            .build()?;
        Ok(Self {
            runtime,
            workers,
            logger: LogManager::new("pooled"),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Executor for PooledExecutor {
    fn name(&self) -> &'static str {
        "pooled"
    }

    fn submit_and_wait(
        &self,
        descriptors: Vec<UnitDescriptor>,
        worker: Arc<PreparationWorker>,
    ) -> EnmResult<Vec<PathBuf>> {
        let mut group = TaskGroup::new(&self.runtime);
        for descriptor in &descriptors {
            let payload = descriptor.encode()?;
            let worker = Arc::clone(&worker);
            group.submit(move || {
                let descriptor = UnitDescriptor::decode(&payload)?;
                worker.prepare(&descriptor)
            });
        }
        self.logger.record(&format!(
            "submitted {} units to {} workers",
            group.len(),
            self.workers
        ));

        let results = group.join();
        let mut outputs = Vec::with_capacity(results.len());
        let mut first_failure = None;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(path) => outputs.push(path),
                Err(e) => {
                    self.logger.warn(&format!(
                        "unit {} ({}) failed: {}",
                        index,
                        descriptors[index].source.display(),
                        e
                    ));
                    first_failure.get_or_insert(e);
                }
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(outputs),
        }
    }
}
