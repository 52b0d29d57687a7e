//! System memory pressure probing for cache pre-warming.

use parking_lot::Mutex;
use sysinfo::System;
use tracing::trace;

/// Fraction of total memory below which the system counts as low on memory.
const LOW_MEMORY_FRACTION: f64 = 0.05;

/// Absolute floor below which the system counts as low on memory.
const LOW_MEMORY_FLOOR_BYTES: u64 = 128 * 1024 * 1024;

/// Reports whether the system is under memory pressure.
pub trait MemoryProbe: Send + Sync {
    fn is_low_memory(&self) -> bool;
}

/// Probe backed by the operating system's memory statistics.
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMemoryProbe {
    /// Current `(available, total)` memory in bytes.
    pub fn snapshot(&self) -> (u64, u64) {
        let mut system = self.system.lock();
        system.refresh_memory();
        (system.available_memory(), system.total_memory())
    }
}

/// Whether `available` bytes out of `total` counts as memory pressure.
fn is_low(available: u64, total: u64) -> bool {
    if total == 0 {
        // Unsupported platform; never block pre-warming on missing data.
        return false;
    }
    let threshold = ((total as f64 * LOW_MEMORY_FRACTION) as u64).max(LOW_MEMORY_FLOOR_BYTES);
    trace!(available, total, threshold, "Probed system memory");
    available < threshold
}

impl MemoryProbe for SystemMemoryProbe {
    fn is_low_memory(&self) -> bool {
        let (available, total) = self.snapshot();
        is_low(available, total)
    }
}

/// Probe with a fixed answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedMemoryProbe(pub bool);

impl MemoryProbe for FixedMemoryProbe {
    fn is_low_memory(&self) -> bool {
        self.0
    }
}
