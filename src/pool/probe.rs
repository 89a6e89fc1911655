//! System load sampling for autoscaling decisions

use std::sync::Mutex;
use sysinfo::System;

/// A point-in-time sample of system resource pressure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemLoad {
    /// CPU utilization across all cores, 0.0 to 1.0
    pub cpu_ratio: f64,

    /// Used physical memory over total, 0.0 to 1.0
    pub memory_ratio: f64,
}

/// Source of load samples for the autoscale ticker
///
/// The production implementation reads the host via `sysinfo`; tests inject
/// fixed samples to make scaling decisions deterministic.
pub trait SystemProbe: Send + Sync {
    fn sample(&self) -> SystemLoad;
}

/// Host load probe backed by `sysinfo`
///
/// CPU usage is measured between consecutive refreshes, so the first sample
/// after startup reads near zero. The autoscale ticker cadence gives the
/// probe its measurement window.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoProbe {
    fn sample(&self) -> SystemLoad {
        let mut sys = self.system.lock().unwrap();
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let cpu_ratio = (sys.global_cpu_usage() as f64 / 100.0).clamp(0.0, 1.0);
        let total = sys.total_memory();
        let memory_ratio = if total > 0 {
            sys.used_memory() as f64 / total as f64
        } else {
            0.0
        };

        SystemLoad {
            cpu_ratio,
            memory_ratio,
        }
    }
}

/// Probe returning the same sample on every call
///
/// Used by tests that need a known load to exercise scaling paths.
pub struct FixedProbe {
    load: SystemLoad,
}

impl FixedProbe {
    pub fn new(cpu_ratio: f64, memory_ratio: f64) -> Self {
        Self {
            load: SystemLoad {
                cpu_ratio,
                memory_ratio,
            },
        }
    }
}

impl SystemProbe for FixedProbe {
    fn sample(&self) -> SystemLoad {
        self.load
    }
}
