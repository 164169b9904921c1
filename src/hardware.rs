//! GPU memory detection
//!
//! Sums the total memory of every NVIDIA device `nvidia-smi` reports. Machines
//! without the tool, or without devices, report 0.
//!
//! `nvidia-smi` reports MiB while loadouts are sized in decimal megabytes, so
//! the total is converted before it is compared against them.

use std::process::Command;

/// Total VRAM across all detected GPUs in decimal megabytes, 0 if none are found
#[must_use]
pub fn total_vram_mb() -> u64 {
    let Ok(nvidia_smi) = which::which("nvidia-smi") else {
        tracing::debug!("nvidia-smi not found on PATH, assuming no GPU");
        return 0;
    };

    let output = match Command::new(nvidia_smi)
        .args(["--query-gpu=memory.total", "--format=csv,noheader,nounits"])
        .output()
    {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            tracing::warn!("nvidia-smi exited with {}", output.status);
            return 0;
        }
        Err(e) => {
            tracing::warn!("Failed to run nvidia-smi: {e}");
            return 0;
        }
    };

    let mib = parse_memory_totals(&String::from_utf8_lossy(&output.stdout));
    let total = mib_to_mb(mib);
    tracing::debug!("Detected {mib} MiB ({total} MB) of VRAM");
    total
}

/// 1 MiB is 1.048576 MB
const fn mib_to_mb(mib: u64) -> u64 {
    mib.saturating_mul(1_048_576) / 1_000_000
}

/// Sum one MiB figure per line, ignoring lines that aren't numbers
fn parse_memory_totals(stdout: &str) -> u64 {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u64>().ok())
        .sum()
}
