//! Process memory sampling

use sysinfo::System;

use crate::error::ApiError;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Memory figures for the running process, in bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Address space reserved by the process (virtual size)
    pub total_bytes: u64,
    /// Memory actually resident (RSS)
    pub used_bytes: u64,
}

impl MemoryUsage {
    pub fn total_mb(&self) -> u64 {
        to_megabytes(self.total_bytes)
    }

    pub fn used_mb(&self) -> u64 {
        to_megabytes(self.used_bytes)
    }
}

/// Round a byte count to the nearest whole megabyte
pub fn to_megabytes(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_PER_MB).round() as u64
}

/// Source of memory figures for `/api/info`
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> Result<MemoryUsage, ApiError>;
}

/// Reads the current process's memory through sysinfo
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessMemoryProbe;

impl MemoryProbe for ProcessMemoryProbe {
    fn sample(&self) -> Result<MemoryUsage, ApiError> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| ApiError::MemoryUnavailable(e.to_string()))?;

        let mut system = System::new();
        if !system.refresh_process(pid) {
            return Err(ApiError::MemoryUnavailable(format!(
                "process {} not found",
                pid
            )));
        }

        let process = system
            .process(pid)
            .ok_or_else(|| ApiError::MemoryUnavailable(format!("process {} not found", pid)))?;

        Ok(MemoryUsage {
            total_bytes: process.virtual_memory(),
            used_bytes: process.memory(),
        })
    }
}
