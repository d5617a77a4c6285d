// CLASSIFICATION: COMMUNITY
// Filename: startup.rs v0.11
// Author: Lukas Bower
// Date Modified: 2027-02-03

//! Startup sequencer.
//!
//! A strictly ordered bring-up: time base, processor discovery, core API
//! layer, filesystem links, sensors, reserved memory, add-on modules,
//! watchdog and scrubber (both left disabled), task priorities, then a
//! one-way handoff to the flight-software core.  Each step either continues,
//! degrades (log and carry on), or aborts the whole sequence; the
//! classification per step is fixed and documented on [`run`].
//!
//! Task-affinity pinning is not part of the linear sequence: it fires per
//! task-creation event through [`TaskAffinityPolicy`].

use log::{error, info, warn};
use thiserror::Error;

use crate::config::{AffinityEntry, PriorityEntry, PspConfig};
use crate::hw::RegisterBlock;
use crate::memscrub::MemScrubController;
use crate::resmem::{BootRecord, MemMapError, MemoryArea, ReservedMemoryMap, ResetType};
use crate::sensors::BoardSensors;
use crate::timebase::TimeBase;
use crate::watchdog::WatchdogController;

/// Opaque RTOS task handle.
pub type TaskHandle = u32;

/// Error string bubbled up from the OS shim.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct OsError(pub String);

/// One live task as reported by the OS registry.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    /// Task name.
    pub name: String,
    /// Task handle.
    pub handle: TaskHandle,
}

/// The slice of the RTOS the sequencer drives.
pub trait OsShim: Send {
    /// Initialise the portable OS API layer.  Failure is fatal.
    fn init_core_api(&mut self) -> Result<(), OsError>;
    /// Number of processors on the board.
    fn processor_count(&self) -> Result<u32, OsError>;
    /// Register the task-lifecycle event hook used for affinity pinning.
    fn register_task_lifecycle_hook(&mut self) -> Result<(), OsError>;
    /// Create one filesystem symbolic link.
    fn map_symbolic_link(&mut self, physical: &str, virtual_path: &str) -> Result<(), OsError>;
    /// Initialise statically linked add-on modules.
    fn init_static_modules(&mut self) -> Result<(), OsError>;
}

/// The slice of the RTOS task registry used for priorities and affinity.
pub trait TaskRegistry: Send {
    /// Snapshot of live tasks.
    fn live_tasks(&self) -> Vec<TaskInfo>;
    /// Look a task up by exact name.
    fn find_task(&self, name: &str) -> Option<TaskInfo> {
        self.live_tasks().into_iter().find(|t| t.name == name)
    }
    /// Read a task's current priority.
    fn get_priority(&self, handle: TaskHandle) -> Result<u8, OsError>;
    /// Set a task's priority.
    fn set_priority(&mut self, handle: TaskHandle, priority: u8) -> Result<(), OsError>;
    /// Pin a task to a processor.
    fn set_affinity(&mut self, handle: TaskHandle, processor: u32) -> Result<(), OsError>;
}

/// The flight-software core's main entry point.  `core_main` does not
/// return until the flight software itself shuts down.
pub trait FlightCore: Send {
    /// Hand control to the flight software.
    fn core_main(&mut self, reset: ResetType, subtype: u32, mode_id: u32, startup_file: &str);
}

/// Hardware reset-cause detection, where the board provides it.
pub trait ResetSensor: Send {
    /// Reset cause of the current boot, if the hardware can tell.
    fn reset_cause(&self) -> Option<ResetType>;
}

/// Startup progress, coarse-grained.  Transient; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StartupState {
    /// Nothing has run.
    NotStarted,
    /// Step 1 done: time base running.
    TimeBaseInitialized,
    /// Steps through 7 done: reserved-memory map pointers set.
    ReservedMemoryReady,
    /// Step 9 done: add-on modules initialised.
    ModulesInitialized,
    /// Step 10 done: watchdog and scrubber configured, both disabled.
    WatchdogAndScrubInitialized,
    /// Step 12 done: task priorities applied.
    PrioritiesAssigned,
    /// Step 13 reached: control handed to the flight core.
    CoreHandoff,
}

/// Errors that abort startup.  Everything else degrades.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The portable OS API layer failed to come up.
    #[error("core API layer initialisation failed: {0}")]
    CoreApiInit(OsError),
    /// Reserved memory could not be initialised or validated.
    #[error("reserved memory initialisation failed: {0}")]
    ReservedMemory(#[from] MemMapError),
}

/// What a completed startup looked like.
#[derive(Debug, Clone)]
pub struct StartupReport {
    /// Final state; `CoreHandoff` on success.
    pub state: StartupState,
    /// Reset type the boot was treated as.
    pub reset_type: ResetType,
    /// Steps that failed non-fatally.
    pub degraded: Vec<&'static str>,
}

/// Ordered task-affinity policy, applied on every task-creation event.
/// First matching prefix wins; an empty prefix matches everything and acts
/// as a catch-all default at its position in the list.
pub struct TaskAffinityPolicy {
    entries: Vec<AffinityEntry>,
    num_processors: u32,
}

impl TaskAffinityPolicy {
    /// Build a policy for a board with `num_processors` processors.
    pub fn new(entries: Vec<AffinityEntry>, num_processors: u32) -> Self {
        Self {
            entries,
            num_processors: num_processors.max(1),
        }
    }

    /// Entry that would govern `task_name`, if any.
    pub fn lookup(&self, task_name: &str) -> Option<&AffinityEntry> {
        self.entries
            .iter()
            .find(|e| task_name.starts_with(e.prefix.as_str()))
    }

    /// Apply the policy to a task that just started.  Pinning failures and
    /// out-of-range processor indices are logged, never escalated.
    pub fn on_task_started(
        &self,
        registry: &mut dyn TaskRegistry,
        task_name: &str,
        handle: TaskHandle,
    ) {
        let Some(entry) = self.lookup(task_name) else {
            return;
        };
        if entry.processor >= self.num_processors {
            warn!(
                "affinity: task {task_name} wants processor {} of {}, skipping",
                entry.processor, self.num_processors
            );
            return;
        }
        match registry.set_affinity(handle, entry.processor) {
            Ok(()) => info!("affinity: {task_name} pinned to processor {}", entry.processor),
            Err(e) => warn!("affinity: pinning {task_name} failed: {e}"),
        }
    }
}

/// Apply the ordered priority list to every live task.  Returns how many
/// assignments failed.
fn assign_priorities(registry: &mut dyn TaskRegistry, list: &[PriorityEntry]) -> u32 {
    let mut failures = 0;
    for task in registry.live_tasks() {
        let Some(entry) = list.iter().find(|e| task.name.starts_with(e.name.as_str())) else {
            continue;
        };
        match registry.set_priority(task.handle, entry.priority) {
            Ok(()) => info!("priority: {} set to {}", task.name, entry.priority),
            Err(e) => {
                warn!("priority: {} assignment failed: {e}", task.name);
                failures += 1;
            }
        }
    }
    failures
}

/// Register-backed devices the sequencer owns.
pub struct PlatformDevices<B: RegisterBlock> {
    /// Free-running time base.
    pub timebase: TimeBase<B>,
    /// Deadman timer.
    pub watchdog: WatchdogController<B>,
    /// Memory scrubber.
    pub scrub: MemScrubController<B>,
    /// Board sensors, where fitted.
    pub sensors: Option<BoardSensors<B>>,
    /// Reset-cause detection, where fitted.
    pub reset_sensor: Option<Box<dyn ResetSensor>>,
}

/// The startup sequencer.
pub struct StartupSequencer<B: RegisterBlock> {
    cfg: PspConfig,
    resmem: ReservedMemoryMap,
    devices: PlatformDevices<B>,
    os: Box<dyn OsShim>,
    tasks: Box<dyn TaskRegistry>,
    core: Box<dyn FlightCore>,
    affinity: TaskAffinityPolicy,
    state: StartupState,
    num_processors: u32,
}

impl<B: RegisterBlock> StartupSequencer<B> {
    /// Assemble a sequencer.  The reserved-memory map is handed in so a
    /// processor reset can carry the previous cycle's block.
    pub fn new(
        cfg: PspConfig,
        resmem: ReservedMemoryMap,
        devices: PlatformDevices<B>,
        os: Box<dyn OsShim>,
        tasks: Box<dyn TaskRegistry>,
        core: Box<dyn FlightCore>,
    ) -> Self {
        let affinity = TaskAffinityPolicy::new(cfg.task_affinities.clone(), 1);
        Self {
            cfg,
            resmem,
            devices,
            os,
            tasks,
            core,
            affinity,
            state: StartupState::NotStarted,
            num_processors: 1,
        }
    }

    /// Current startup state.
    pub fn state(&self) -> StartupState {
        self.state
    }

    /// Reserved-memory map.
    pub fn resmem(&self) -> &ReservedMemoryMap {
        &self.resmem
    }

    /// Deadman timer.
    pub fn watchdog_mut(&mut self) -> &mut WatchdogController<B> {
        &mut self.devices.watchdog
    }

    /// Memory scrubber.
    pub fn scrub_mut(&mut self) -> &mut MemScrubController<B> {
        &mut self.devices.scrub
    }

    /// Forward a task-creation event to the affinity policy.
    pub fn handle_task_started(&mut self, task_name: &str, handle: TaskHandle) {
        self.affinity
            .on_task_started(self.tasks.as_mut(), task_name, handle);
    }

    fn determine_reset_type(&self) -> ResetType {
        if let Some(forced) = self.cfg.reset_type_override {
            info!("reset type forced to {forced:?} by configuration");
            return forced;
        }
        if let Some(sensor) = &self.devices.reset_sensor {
            if let Some(cause) = sensor.reset_cause() {
                info!("reset cause register reports {cause:?}");
                return cause;
            }
        }
        // Known gap: boards without a usable reset-cause register cannot
        // tell a processor reset from power-on here.  Assume power-on and
        // say so, rather than burying the assumption.
        warn!("no reset-cause detection available, assuming power-on reset");
        ResetType::PowerOn
    }

    /// Run the bring-up sequence to core handoff.
    ///
    /// Fatal (abort, `Err`): core API layer init (step 3), reserved-memory
    /// initialisation/validation (step 11).  Degraded (log and continue):
    /// filesystem links (step 5), sensor readout (step 6), priority
    /// assignment (step 12).  Everything else always proceeds.
    ///
    /// On success the call has already been through the flight core's main
    /// entry point, i.e. it returns only at flight-software shutdown.
    pub fn run(&mut self) -> Result<StartupReport, StartupError> {
        let mut degraded = Vec::new();

        // 1. Time base.
        self.devices.timebase.init();
        self.state = StartupState::TimeBaseInitialized;

        // 2. Processor count, best effort.
        self.num_processors = match self.os.processor_count() {
            Ok(n) if n > 0 => n,
            Ok(_) | Err(_) => {
                warn!("processor count unavailable, defaulting to 1");
                1
            }
        };
        info!("board reports {} processor(s)", self.num_processors);

        // 3. Core API layer; nothing below can run without it.
        if let Err(e) = self.os.init_core_api() {
            error!("core API layer failed to initialise: {e}");
            return Err(StartupError::CoreApiInit(e));
        }

        // 4. Task-lifecycle hook for affinity pinning.
        self.affinity =
            TaskAffinityPolicy::new(self.cfg.task_affinities.clone(), self.num_processors);
        if let Err(e) = self.os.register_task_lifecycle_hook() {
            warn!("task lifecycle hook not registered: {e}");
        }

        // 5. Filesystem symbolic links.
        let mut link_failures = 0;
        for link in &self.cfg.symbolic_links {
            if let Err(e) = self.os.map_symbolic_link(&link.physical, &link.virtual_path) {
                warn!(
                    "symbolic link {} -> {} failed: {e}",
                    link.physical, link.virtual_path
                );
                link_failures += 1;
            }
        }
        if link_failures > 0 {
            degraded.push("filesystem-mapping");
        }

        // 6. Sensors / hardware info.
        if let Some(sensors) = self.devices.sensors.as_mut() {
            match sensors.init().and_then(|()| sensors.snapshot()) {
                Ok(snap) => info!(
                    "hardware info: die {} m°C, core {} mV",
                    snap.die_temp_mc, snap.core_voltage_mv
                ),
                Err(e) => {
                    warn!("hardware info collection failed: {e}");
                    degraded.push("hardware-info");
                }
            }
        }

        // 7. Reserved-memory map pointers are fixed from construction;
        // publish the layout before any reset-type-dependent logic.
        for area in [
            MemoryArea::Reset,
            MemoryArea::Cds,
            MemoryArea::VolatileDisk,
            MemoryArea::UserReserved,
        ] {
            let (base, size) = self.resmem.area(area);
            info!("reserved memory: {area:?} at {base:#x}, {size} bytes");
        }
        self.state = StartupState::ReservedMemoryReady;

        // 8. Reset type.
        let reset_type = self.determine_reset_type();

        // 9. Statically linked add-on modules.
        if let Err(e) = self.os.init_static_modules() {
            warn!("static module initialisation reported: {e}");
        }
        self.state = StartupState::ModulesInitialized;

        // 10. Watchdog and scrubber come up configured but disabled;
        // enabling protection is the flight core's call, not ours.
        self.devices.watchdog.init();
        if let Err(e) = self.devices.scrub.init() {
            warn!("memory scrubber initialisation reported: {e}");
        }
        self.state = StartupState::WatchdogAndScrubInitialized;

        // 11. Reserved memory for the detected reset type.
        if let Err(e) = self.resmem.initialize(reset_type) {
            error!("reserved memory unusable: {e}");
            return Err(e.into());
        }
        self.resmem.set_boot_record(BootRecord {
            reset_type: reset_type.code(),
            reserved: [0; 3],
        });

        // 12. Task priorities.
        let failures = assign_priorities(self.tasks.as_mut(), &self.cfg.task_priorities);
        if failures > 0 {
            warn!("{failures} task priority assignment(s) failed");
            degraded.push("task-priorities");
        }
        self.state = StartupState::PrioritiesAssigned;

        // 13. Handoff; returns at flight-software shutdown.
        info!(
            "handing off to flight core: reset {reset_type:?}, subtype {}, mode {}, file {}",
            self.cfg.reset_subtype, self.cfg.mode_id, self.cfg.startup_file
        );
        self.core.core_main(
            reset_type,
            self.cfg.reset_subtype,
            self.cfg.mode_id,
            &self.cfg.startup_file,
        );
        self.state = StartupState::CoreHandoff;

        Ok(StartupReport {
            state: self.state,
            reset_type,
            degraded,
        })
    }
}
