//! Admission control for subprocess launches (encodes, exports).
//!
//! [`ResourceGate`] combines a [`ResourceMonitor`] snapshot with an
//! in-process job registry behind one mutex, so the admission predicate and
//! the registry mutation it depends on can never observe each other
//! torn-apart by a race.

use crate::resource_monitor::ResourceMonitor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// The kind of job requesting admission; only `Encode` has its own
/// concurrency ceiling distinct from the general export ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Export,
    Encode,
}

#[derive(Debug, Clone)]
pub struct ResourceGateConfig {
    pub max_cpu_percent: f32,
    pub max_memory_percent: f32,
    pub max_gpu_percent: f32,
    pub max_parallel_exports: usize,
    pub max_parallel_encodes: usize,
    /// How often `AcquireWithTimeout` re-checks the predicate while waiting.
    pub poll_interval: Duration,
}

impl Default for ResourceGateConfig {
    fn default() -> Self {
        Self {
            max_cpu_percent: 80.0,
            max_memory_percent: 70.0,
            max_gpu_percent: 90.0,
            max_parallel_exports: 2,
            max_parallel_encodes: 1,
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
#[error("timed out waiting for resource admission after {0:?}")]
pub struct GateTimeoutError(pub Duration);

#[derive(Default)]
struct Registry {
    active_jobs: usize,
    active_encodes: usize,
}

/// Gates launches of external subprocesses against live resource samples
/// and a count of currently-active jobs.
pub struct ResourceGate {
    monitor: Arc<ResourceMonitor>,
    config: ResourceGateConfig,
    registry: Arc<Mutex<Registry>>,
}

/// Proof of admission. Releases its slot when dropped; hold it for the
/// lifetime of the subprocess it gates.
#[must_use = "dropping a Ticket immediately releases its resource slot"]
pub struct Ticket {
    registry: Arc<Mutex<Registry>>,
    kind: JobKind,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap();
        registry.active_jobs = registry.active_jobs.saturating_sub(1);
        if self.kind == JobKind::Encode {
            registry.active_encodes = registry.active_encodes.saturating_sub(1);
        }
    }
}

impl ResourceGate {
    pub fn new(monitor: Arc<ResourceMonitor>, config: ResourceGateConfig) -> Self {
        Self {
            monitor,
            config,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// True iff every admission condition holds right now.
    pub async fn can_start(&self, job_kind: JobKind) -> bool {
        let snapshot = self.monitor.snapshot().await;
        let registry = self.registry.lock().unwrap();
        self.predicate_holds(job_kind, &snapshot, &registry)
    }

    fn predicate_holds(
        &self,
        job_kind: JobKind,
        snapshot: &crate::resource_monitor::ResourceSnapshot,
        registry: &Registry,
    ) -> bool {
        if snapshot.cpu_percent >= self.config.max_cpu_percent {
            return false;
        }
        if snapshot.memory_percent >= self.config.max_memory_percent {
            return false;
        }
        if let Some(gpu) = snapshot.gpu_percent {
            if gpu >= self.config.max_gpu_percent {
                return false;
            }
        }
        if registry.active_jobs >= self.config.max_parallel_exports {
            return false;
        }
        if job_kind == JobKind::Encode && registry.active_encodes >= self.config.max_parallel_encodes
        {
            return false;
        }
        true
    }

    /// Blocks, polling at `config.poll_interval`, until admission is granted
    /// or `timeout` elapses.
    pub async fn acquire_with_timeout(
        &self,
        job_kind: JobKind,
        timeout: Duration,
    ) -> Result<Ticket, GateTimeoutError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let snapshot = self.monitor.snapshot().await;
                let mut registry = self.registry.lock().unwrap();
                if self.predicate_holds(job_kind, &snapshot, &registry) {
                    registry.active_jobs += 1;
                    if job_kind == JobKind::Encode {
                        registry.active_encodes += 1;
                    }
                    return Ok(Ticket {
                        registry: self.registry.clone(),
                        kind: job_kind,
                    });
                }
            }
            if Instant::now() >= deadline {
                return Err(GateTimeoutError(timeout));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.config.poll_interval.min(remaining)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_monitor::ResourceSnapshot;

    fn gate_with_registry(config: ResourceGateConfig) -> ResourceGate {
        ResourceGate::new(Arc::new(ResourceMonitor::start()), config)
    }

    #[tokio::test]
    async fn predicate_fails_when_job_count_at_ceiling() {
        let gate = gate_with_registry(ResourceGateConfig {
            max_parallel_exports: 1,
            ..Default::default()
        });
        let low_load = ResourceSnapshot {
            cpu_percent: 1.0,
            memory_percent: 1.0,
            ..Default::default()
        };
        let mut registry = Registry::default();
        assert!(gate.predicate_holds(JobKind::Export, &low_load, &registry));
        registry.active_jobs = 1;
        assert!(!gate.predicate_holds(JobKind::Export, &low_load, &registry));
    }

    #[tokio::test]
    async fn encode_ceiling_is_independent_of_export_ceiling() {
        let gate = gate_with_registry(ResourceGateConfig {
            max_parallel_exports: 5,
            max_parallel_encodes: 1,
            ..Default::default()
        });
        let low_load = ResourceSnapshot {
            cpu_percent: 1.0,
            memory_percent: 1.0,
            ..Default::default()
        };
        let mut registry = Registry::default();
        registry.active_encodes = 1;
        assert!(gate.predicate_holds(JobKind::Export, &low_load, &registry));
        assert!(!gate.predicate_holds(JobKind::Encode, &low_load, &registry));
    }

    #[tokio::test]
    async fn acquire_times_out_when_predicate_never_holds() {
        let gate = gate_with_registry(ResourceGateConfig {
            max_cpu_percent: -1.0,
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        });
        let result = gate
            .acquire_with_timeout(JobKind::Export, Duration::from_millis(20))
            .await;
        assert!(result.is_err());
    }
}
