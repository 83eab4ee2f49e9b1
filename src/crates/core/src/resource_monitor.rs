//! Periodic CPU/memory/disk sampling on a dedicated worker task.
//!
//! [`ResourceMonitor`] never blocks a caller: [`snapshot`](ResourceMonitor::snapshot)
//! reads the most recently published sample from an `arc-swap`-free
//! `RwLock`, while a background task refreshes it once a second.

use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// A single point-in-time reading of system load.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceSnapshot {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_available_bytes: u64,
    /// Bytes read across all processes since the previous sample.
    pub disk_read_bytes_per_s: u64,
    /// Bytes written across all processes since the previous sample.
    pub disk_write_bytes_per_s: u64,
    /// `None` when no GPU telemetry source is configured.
    pub gpu_percent: Option<f32>,
}

/// Background sampler. Construct with [`ResourceMonitor::start`]; call
/// [`shutdown`](Self::shutdown) to stop the worker cleanly, or just drop it
/// (the worker task is aborted on drop).
pub struct ResourceMonitor {
    snapshot: Arc<RwLock<ResourceSnapshot>>,
    worker: JoinHandle<()>,
}

impl ResourceMonitor {
    pub fn start() -> Self {
        let snapshot = Arc::new(RwLock::new(ResourceSnapshot::default()));
        let worker_snapshot = snapshot.clone();
        let worker = tokio::spawn(async move {
            let mut sys = System::new_all();
            let mut ticker = interval(SAMPLE_INTERVAL);
            loop {
                ticker.tick().await;
                sys.refresh_cpu_usage();
                sys.refresh_memory();
                sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

                let (read, written) = sys.processes().values().fold((0u64, 0u64), |acc, p| {
                    let usage = p.disk_usage();
                    (acc.0 + usage.read_bytes, acc.1 + usage.written_bytes)
                });

                let total = sys.total_memory();
                let used = sys.used_memory();
                let memory_percent = if total == 0 {
                    0.0
                } else {
                    (used as f64 / total as f64 * 100.0) as f32
                };

                let next = ResourceSnapshot {
                    cpu_percent: sys.global_cpu_usage(),
                    memory_percent,
                    memory_available_bytes: total.saturating_sub(used),
                    disk_read_bytes_per_s: read,
                    disk_write_bytes_per_s: written,
                    gpu_percent: None,
                };
                *worker_snapshot.write().await = next;
            }
        });

        Self { snapshot, worker }
    }

    /// Most recent sample. Never blocks on the sampling worker.
    pub async fn snapshot(&self) -> ResourceSnapshot {
        *self.snapshot.read().await
    }

    pub fn shutdown(self) {
        self.worker.abort();
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_is_available_immediately_without_blocking() {
        let monitor = ResourceMonitor::start();
        let snapshot = monitor.snapshot().await;
        assert!(snapshot.cpu_percent >= 0.0);
        monitor.shutdown();
    }
}
