//! Expiry Sweeper Task
//!
//! Background thread that periodically removes expired cache entries.
//! Purely a space optimization: lazy expiry at read time already keeps every
//! backend correct.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::manager::CacheManager;

// == Sweeper Handle ==
/// Handle to a running sweeper thread.
///
/// Dropping the handle signals the thread to stop; [`stop`](Self::stop)
/// additionally waits for it to finish.
pub struct SweeperHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signals the sweeper to stop and waits for the thread to finish.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

// == Spawn Sweeper ==
/// Spawns a background thread that sweeps expired entries on an interval.
///
/// # Arguments
/// * `manager` - Shared cache manager to sweep through
/// * `interval_secs` - Seconds between sweep runs
///
/// # Returns
/// A handle used to stop the sweeper during shutdown.
pub fn spawn_sweeper(manager: Arc<CacheManager>, interval_secs: u64) -> SweeperHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let interval = Duration::from_secs(interval_secs);

    let thread = thread::spawn(move || {
        info!(interval_secs, "expiry sweeper started");

        loop {
            sleep_interruptible(&flag, interval);
            if flag.load(Ordering::Relaxed) {
                break;
            }

            let removed = manager.cleanup_expired();
            if removed > 0 {
                info!(removed, "expiry sweep removed entries");
            } else {
                debug!("expiry sweep found no expired entries");
            }
        }

        info!("expiry sweeper stopped");
    });

    SweeperHandle {
        stop,
        thread: Some(thread),
    }
}

/// Sleeps up to `duration`, waking early when the stop flag is set.
fn sleep_interruptible(flag: &AtomicBool, duration: Duration) {
    let step = Duration::from_millis(50);
    let mut remaining = duration;

    while !flag.load(Ordering::Relaxed) && !remaining.is_zero() {
        let chunk = remaining.min(step);
        thread::sleep(chunk);
        remaining = remaining.saturating_sub(chunk);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::thread::sleep;

    fn memory_manager() -> Arc<CacheManager> {
        Arc::new(CacheManager::new(Box::new(MemoryBackend::new())))
    }

    #[test]
    fn test_sweeper_removes_expired_entries() {
        let manager = memory_manager();
        manager.set("expire_soon", "value", Some(1)).unwrap();

        let handle = spawn_sweeper(manager.clone(), 1);

        // Wait for the entry to expire and a sweep to run
        sleep(Duration::from_millis(2500));

        let stats = manager.get_stats();
        let backend_stats = stats.backend_stats.unwrap();
        assert_eq!(
            backend_stats.total_keys, 0,
            "expired entry should have been swept"
        );

        handle.stop();
    }

    #[test]
    fn test_sweeper_preserves_valid_entries() {
        let manager = memory_manager();
        manager.set("long_lived", "value", Some(3600)).unwrap();

        let handle = spawn_sweeper(manager.clone(), 1);

        sleep(Duration::from_millis(1500));

        assert_eq!(
            manager.get("long_lived").unwrap(),
            Some("value".to_string()),
            "valid entry should not be removed"
        );

        handle.stop();
    }

    #[test]
    fn test_sweeper_stops_promptly() {
        let manager = memory_manager();

        let handle = spawn_sweeper(manager, 3600);
        // stop() joins; with an interruptible sleep this returns quickly
        handle.stop();
    }
}
