// CLASSIFICATION: COMMUNITY
// Filename: timesync.rs v0.4
// Author: Lukas Bower
// Date Modified: 2027-01-30

//! NTP/time synchronisation boundary.
//!
//! The NTP daemon itself is an opaque external process behind [`NtpDaemon`];
//! this module owns only the periodic task that reads the OS wall clock and
//! feeds it to the flight-software time service.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use log::{debug, warn};
use thiserror::Error;

/// Errors raised at the time-sync boundary.
#[derive(Debug, Error)]
pub enum TimeSyncError {
    /// The external daemon could not be started.
    #[error("NTP daemon start failed: {0}")]
    DaemonStart(String),
    /// The external daemon could not be stopped.
    #[error("NTP daemon stop failed: {0}")]
    DaemonStop(String),
}

/// Control surface of the external NTP daemon process.
pub trait NtpDaemon: Send {
    /// Start the daemon, returning its task handle.
    fn start(&mut self) -> Result<u32, TimeSyncError>;
    /// Stop the daemon.
    fn stop(&mut self) -> Result<(), TimeSyncError>;
    /// Whether the daemon is currently running.
    fn is_running(&self) -> bool;
}

/// The flight-software core's time service, as consumed here.
pub trait FlightTimeService: Send + Sync {
    /// Current spacecraft UTC.
    fn get_utc(&self) -> SystemTime;
    /// Mission elapsed time.
    fn get_met(&self) -> Duration;
    /// Push a new wall-clock time into the core.
    fn set_time(&self, time: SystemTime);
}

struct SyncShared {
    enabled: AtomicBool,
    stop: AtomicBool,
    updates: AtomicU64,
}

/// Periodic task feeding OS wall-clock time to the flight time service.
pub struct TimeSyncTask {
    shared: Arc<SyncShared>,
    handle: Option<JoinHandle<()>>,
}

impl TimeSyncTask {
    /// Spawn the sync thread.  It starts enabled and pushes one update per
    /// `interval`.
    pub fn spawn(service: Arc<dyn FlightTimeService>, interval: Duration) -> Self {
        let shared = Arc::new(SyncShared {
            enabled: AtomicBool::new(true),
            stop: AtomicBool::new(false),
            updates: AtomicU64::new(0),
        });
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("timesync".into())
            .spawn(move || {
                debug!("timesync task up, interval {:?}", interval);
                while !thread_shared.stop.load(Ordering::SeqCst) {
                    thread::sleep(interval);
                    if thread_shared.enabled.load(Ordering::SeqCst) {
                        service.set_time(SystemTime::now());
                        thread_shared.updates.fetch_add(1, Ordering::SeqCst);
                    }
                }
                debug!("timesync task down");
            })
            .unwrap_or_else(|e| panic!("timesync task spawn failed: {e}"));
        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Resume pushing updates.
    pub fn enable(&self) {
        self.shared.enabled.store(true, Ordering::SeqCst);
    }

    /// Pause updates without stopping the thread.
    pub fn disable(&self) {
        self.shared.enabled.store(false, Ordering::SeqCst);
    }

    /// Whether updates are currently being pushed.
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Updates pushed since spawn.
    pub fn updates(&self) -> u64 {
        self.shared.updates.load(Ordering::SeqCst)
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("timesync task panicked during shutdown");
            }
        }
    }
}

impl Drop for TimeSyncTask {
    fn drop(&mut self) {
        self.stop();
    }
}
