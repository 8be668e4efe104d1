//! Hard-limit monitor: a background thread polling elapsed wall-clock time
//! and peak memory, plus SIGINT/SIGTERM handling, both flipping the same
//! cooperative abort flag every running search's
//! [`maplan_search::SearchCallbacks::aborted`] reads.
//!
//! A polling thread adds a grace period to the time limit, reads peak RSS,
//! and a signal handler flips the same abort state a limit breach would.
//! The grace period and poll interval are kept as `EnvParam`s in the style
//! of `maplan-transport`'s TCP
//! timeouts, rather than hardcoded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use env_param::EnvParam;

/// Added on top of `--max-time` before the monitor considers it exceeded
/// (search.c adds a fixed two-minute grace period to `max_time` so a search
/// that's about to report its own result isn't killed out from under it).
static GRACE_PERIOD_SECS: EnvParam<u64> = EnvParam::new("MAPLAN_HARD_LIMIT_GRACE_SECS", "120");

/// Supervises one run: owns the abort flag every search callback reads, and
/// optionally a background thread enforcing `--max-time`/`--max-mem`.
pub struct Supervisor {
    abort: Arc<AtomicBool>,
    max_time: Option<Duration>,
    max_mem_mb: Option<u64>,
    sleep: Duration,
    started_at: Instant,
    handle: Option<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(max_time: Option<Duration>, max_mem_mb: Option<u64>, sleep: Duration) -> Self {
        Supervisor {
            abort: Arc::new(AtomicBool::new(false)),
            max_time,
            max_mem_mb,
            sleep,
            started_at: Instant::now(),
            handle: None,
        }
    }

    /// The flag to hand to every local search's callback object.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Installs the process-wide SIGINT/SIGTERM handler (search.c's
    /// `limitMonitorSignalKill`). Only one may be active per process.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let abort = self.abort.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("caught interrupt, aborting all running searches");
            abort.store(true, Ordering::SeqCst);
        })
    }

    /// Spawns the polling thread. A no-op when neither limit is set.
    pub fn start(&mut self) {
        if self.max_time.is_none() && self.max_mem_mb.is_none() {
            return;
        }
        let abort = self.abort.clone();
        let max_time = self.max_time.map(|t| t + Duration::from_secs(GRACE_PERIOD_SECS.get()));
        let max_mem_mb = self.max_mem_mb;
        let sleep = self.sleep;
        let started_at = self.started_at;
        self.handle = Some(std::thread::spawn(move || loop {
            if abort.load(Ordering::SeqCst) {
                return;
            }
            if let Some(limit) = max_time {
                if started_at.elapsed() > limit {
                    tracing::warn!(elapsed = ?started_at.elapsed(), "hard time limit exceeded, aborting");
                    abort.store(true, Ordering::SeqCst);
                    return;
                }
            }
            if let Some(limit_mb) = max_mem_mb {
                if let Some(peak_mb) = peak_rss_mb() {
                    if peak_mb > limit_mb {
                        tracing::warn!(peak_mb, limit_mb, "hard memory limit exceeded, aborting");
                        abort.store(true, Ordering::SeqCst);
                        return;
                    }
                }
            }
            std::thread::sleep(sleep);
        }));
    }

    /// Blocks until the watchdog thread exits; a no-op if none was started.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Peak resident set size in megabytes, read from `/proc/self/status`'s
/// `VmHWM` line (stands in for `getrusage(RUSAGE_SELF).ru_maxrss` without a
/// libc binding). `None` off Linux, or if the line can't be parsed.
fn peak_rss_mb() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("VmHWM:") {
                let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
                return Some(kb / 1024);
            }
        }
        None
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_time_limit_flips_abort_flag() {
        std::env::set_var("MAPLAN_HARD_LIMIT_GRACE_SECS", "0");
        let mut sup = Supervisor::new(Some(Duration::from_millis(1)), None, Duration::from_millis(5));
        sup.start();
        for _ in 0..50 {
            if sup.is_aborted() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        sup.join();
    }

    #[test]
    fn no_limits_never_spawns_a_watchdog() {
        let mut sup = Supervisor::new(None, None, Duration::from_secs(1));
        sup.start();
        assert!(sup.handle.is_none());
        assert!(!sup.is_aborted());
    }
}
