//! Per-phase timing and resident-memory sampling for a harvest run.
//!
//! Every phase is timed. Memory is sampled through `sysinfo` only when
//! monitoring is requested and the `cli` feature is built in.

use std::future::Future;
use std::time::{Duration, Instant};

/// 一個擷取階段（某個資料來源或遮罩）的耗時與記憶體
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseStats {
    pub phase: String,
    pub elapsed: Duration,
    /// 階段結束時的常駐記憶體 (MB)
    pub memory_mb: Option<u64>,
    /// 執行開始至今的峰值 (MB)
    pub peak_memory_mb: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct MemorySample {
    current_mb: u64,
    peak_mb: u64,
}

pub struct SystemMonitor {
    sampler: Option<MemorySampler>,
    started: Instant,
}

impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        Self {
            sampler: enabled.then(MemorySampler::new).flatten(),
            started: Instant::now(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sampler.is_some()
    }

    /// Awaits `work` and reports how long it took and, when enabled, the
    /// memory footprint right after it.
    pub async fn measure<T>(&self, phase: &str, work: impl Future<Output = T>) -> (T, PhaseStats) {
        let start = Instant::now();
        let value = work.await;
        let elapsed = start.elapsed();
        let sample = self.sampler.as_ref().and_then(MemorySampler::sample);

        match sample {
            Some(s) => tracing::info!(
                "📊 {} - Memory: {}MB, Peak: {}MB, Time: {:?}",
                phase,
                s.current_mb,
                s.peak_mb,
                elapsed
            ),
            None => tracing::debug!("⏱️ {} took {:?}", phase, elapsed),
        }

        let stats = PhaseStats {
            phase: phase.to_string(),
            elapsed,
            memory_mb: sample.map(|s| s.current_mb),
            peak_memory_mb: sample.map(|s| s.peak_mb),
        };
        (value, stats)
    }

    pub fn log_final_stats(&self, phases: &[PhaseStats]) {
        if !self.is_enabled() {
            return;
        }
        let peak = phases.iter().filter_map(|p| p.peak_memory_mb).max().unwrap_or_default();
        if let Some(slowest) = phases.iter().max_by_key(|p| p.elapsed) {
            tracing::info!(
                "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB, Slowest: {} ({:?})",
                self.started.elapsed(),
                peak,
                slowest.phase,
                slowest.elapsed
            );
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(feature = "cli")]
struct MemorySampler {
    system: std::sync::Mutex<sysinfo::System>,
    pid: sysinfo::Pid,
    peak_mb: std::sync::atomic::AtomicU64,
}

#[cfg(feature = "cli")]
impl MemorySampler {
    fn new() -> Option<Self> {
        match sysinfo::get_current_pid() {
            Ok(pid) => Some(Self {
                system: std::sync::Mutex::new(sysinfo::System::new()),
                pid,
                peak_mb: std::sync::atomic::AtomicU64::new(0),
            }),
            Err(e) => {
                tracing::warn!("⚠️ Could not determine current PID ({}), monitoring disabled", e);
                None
            }
        }
    }

    fn sample(&self) -> Option<MemorySample> {
        use std::sync::atomic::Ordering;

        let mut system = self.system.lock().ok()?;
        system.refresh_all();
        let current_mb = system.process(self.pid)?.memory() / 1024 / 1024;
        let previous = self.peak_mb.fetch_max(current_mb, Ordering::Relaxed);

        Some(MemorySample {
            current_mb,
            peak_mb: previous.max(current_mb),
        })
    }
}

// 非 CLI 建置沒有 sysinfo，只計時
#[cfg(not(feature = "cli"))]
struct MemorySampler;

#[cfg(not(feature = "cli"))]
impl MemorySampler {
    fn new() -> Option<Self> {
        tracing::warn!("⚠️ Memory monitoring needs the 'cli' feature; timing phases only");
        None
    }

    fn sample(&self) -> Option<MemorySample> {
        None
    }
}
