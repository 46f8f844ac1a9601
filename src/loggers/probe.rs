//! # Metric Probe
//!
//! Takes point-in-time readings of host utilization. Every metric group is
//! queried independently: a failing group is reported as unavailable and the
//! rest of the reading is still returned.

use sysinfo::{Disks, Networks, System};

use crate::core::error::SynError;
use crate::loggers::core::{HostMetrics, MemoryUsage, NetworkCounters};

/// Number of independently queried groups: cpu, memory, disk, network.
pub const METRIC_GROUPS: u32 = 4;

/// A source of raw host metrics.
///
/// [`SysinfoSource`] is the production implementation; tests plug in sources
/// with scripted failures.
pub trait MetricSource: Send {
    /// Global CPU load in percent.
    fn cpu_percent(&mut self) -> Result<f64, SynError>;

    fn memory(&mut self) -> Result<MemoryUsage, SynError>;

    /// Used share of all mounted disks, in percent.
    fn disk_percent(&mut self) -> Result<f64, SynError>;

    /// Cumulative counters summed over all interfaces.
    fn network(&mut self) -> Result<NetworkCounters, SynError>;
}

pub struct MetricProbe {
    source: Box<dyn MetricSource>,
}

impl MetricProbe {
    pub fn new(source: Box<dyn MetricSource>) -> Self {
        Self { source }
    }

    pub fn system() -> Self {
        Self::new(Box::new(SysinfoSource::new()))
    }

    pub fn sample(&mut self) -> HostMetrics {
        let mut failures = 0u32;
        let cpu_percent = available(self.source.cpu_percent().map(clamp_percent), &mut failures);
        let memory = available(self.source.memory(), &mut failures);
        let disk_percent = available(self.source.disk_percent().map(clamp_percent), &mut failures);
        let network = available(self.source.network(), &mut failures);

        HostMetrics {
            cpu_percent,
            memory_percent: memory.as_ref().map(memory_percent),
            disk_percent,
            memory,
            network,
            failures,
        }
    }
}

fn available<T>(result: Result<T, SynError>, failures: &mut u32) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(_) => {
            *failures += 1;
            None
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 100.0) }
}

fn memory_percent(memory: &MemoryUsage) -> f64 {
    if memory.total == 0 {
        return 0.0;
    }
    clamp_percent(memory.used as f64 / memory.total as f64 * 100.0)
}

pub struct SysinfoSource {
    system: System,
    disks: Disks,
    networks: Networks,
}

impl SysinfoSource {
    pub fn new() -> Self {
        // CPU usage is a delta between two refreshes; prime the first one here.
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SysinfoSource {
    fn cpu_percent(&mut self) -> Result<f64, SynError> {
        self.system.refresh_cpu();
        if self.system.cpus().is_empty() {
            return Err(SynError::ProbeError("no CPUs reported".into()));
        }
        Ok(self.system.global_cpu_info().cpu_usage() as f64)
    }

    fn memory(&mut self) -> Result<MemoryUsage, SynError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(SynError::ProbeError("total memory reported as 0".into()));
        }
        Ok(MemoryUsage {
            total,
            available: self.system.available_memory(),
            used: self.system.used_memory(),
            free: self.system.free_memory(),
        })
    }

    fn disk_percent(&mut self) -> Result<f64, SynError> {
        self.disks.refresh();
        let (total, available) = self
            .disks
            .list()
            .iter()
            .fold((0u64, 0u64), |(t, a), disk| {
                (t.saturating_add(disk.total_space()), a.saturating_add(disk.available_space()))
            });
        if total == 0 {
            return Err(SynError::ProbeError("no disk capacity reported".into()));
        }
        let used = total.saturating_sub(available);
        Ok(used as f64 / total as f64 * 100.0)
    }

    fn network(&mut self) -> Result<NetworkCounters, SynError> {
        self.networks.refresh();
        let interfaces = self.networks.list();
        if interfaces.is_empty() {
            return Err(SynError::ProbeError("no network interfaces reported".into()));
        }
        Ok(interfaces.values().fold(NetworkCounters::default(), |acc, data| NetworkCounters {
            bytes_sent: acc.bytes_sent.saturating_add(data.total_transmitted()),
            bytes_recv: acc.bytes_recv.saturating_add(data.total_received()),
            packets_sent: acc.packets_sent.saturating_add(data.total_packets_transmitted()),
            packets_recv: acc.packets_recv.saturating_add(data.total_packets_received()),
        }))
    }
}
