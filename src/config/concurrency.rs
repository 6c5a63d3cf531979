use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};

/// Worker runtime for network and storage I/O
///
/// Nothing here ever touches host session state; results rejoin the
/// simulation loop through its handle.
pub struct WorkerPool {
    runtime: Arc<Runtime>,
    pool_config: WorkerPoolConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub worker_threads: usize,
    pub max_blocking_threads: usize,
    pub stack_size: Option<usize>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            worker_threads: (num_cpus / 2).max(1),
            // storage calls run on the blocking pool
            max_blocking_threads: 4,
            stack_size: Some(2 * 1024 * 1024), // 2MB stack size
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPoolStats {
    pub worker_threads: usize,
    pub max_blocking_threads: usize,
    pub alive_tasks: usize,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> anyhow::Result<Self> {
        tracing::info!("Initializing worker pool with config: {:?}", config);

        let counter = Arc::new(AtomicUsize::new(0));
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder
            .worker_threads(config.worker_threads.max(1))
            .max_blocking_threads(config.max_blocking_threads.max(1))
            .thread_name_fn(move || format!("skinmotion-io-{}", counter.fetch_add(1, Ordering::Relaxed)))
            .enable_all();
        if let Some(stack_size) = config.stack_size {
            builder.thread_stack_size(stack_size);
        }

        let runtime = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create worker runtime: {}", e))?;

        tracing::info!("Created worker pool: {} I/O threads", config.worker_threads.max(1));

        Ok(Self {
            runtime: Arc::new(runtime),
            pool_config: config,
        })
    }

    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Spawn an async task on the I/O runtime
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    /// Block on an async operation (use sparingly, never from the simulation loop)
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: std::future::Future,
    {
        self.runtime.block_on(future)
    }

    pub fn get_stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            worker_threads: self.pool_config.worker_threads.max(1),
            max_blocking_threads: self.pool_config.max_blocking_threads.max(1),
            alive_tasks: self.runtime.metrics().num_alive_tasks(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_creation() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        assert!(pool.is_ok());
    }

    #[test]
    fn test_spawned_work_completes() {
        let pool = WorkerPool::new(WorkerPoolConfig {
            worker_threads: 1,
            max_blocking_threads: 1,
            stack_size: None,
        })
        .unwrap();

        let handle = pool.spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            42
        });
        assert_eq!(pool.block_on(handle).unwrap(), 42);
    }

    #[test]
    fn test_worker_threads_are_named() {
        let pool = WorkerPool::new(WorkerPoolConfig::default()).unwrap();
        let name = pool
            .block_on(pool.spawn(async { std::thread::current().name().map(str::to_string) }))
            .unwrap();
        assert!(name.unwrap().starts_with("skinmotion-io-"));
    }
}
