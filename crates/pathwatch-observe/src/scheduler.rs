#![forbid(unsafe_code)]

//! Dirty-check scheduling for computed fields.
//!
//! Computed fields have no mutation to hook, so their observers are served by
//! comparing each tracked key's current value against its last snapshot. A
//! check is requested with [`schedule_check`] and runs once, after the current
//! turn, on the core microtask queue.
//!
//! The same queue carries the sweep that drops registry entries of objects
//! that no longer exist. Every check pass sweeps; when no check is pending,
//! [`schedule_sweep`] queues a standalone one.
//!
//! # State machine
//!
//! | State    | `schedule_check`          | Transition                           |
//! |----------|---------------------------|--------------------------------------|
//! | idle     | queue a run, go `armed`   | –                                    |
//! | armed    | no-op                     | microtask starts → `running`         |
//! | running  | mark `rerun`              | pass ends → re-run if `rerun`, else idle |
//!
//! # Failure modes
//!
//! | Failure                                  | Behavior                              |
//! |------------------------------------------|---------------------------------------|
//! | Callbacks keep requesting checks         | `error!` after the cycle bound; stop  |
//! | A callback panics mid-pass               | scheduler returns to idle on unwind   |
//! | Observed or watched object dropped       | entries purged at the next sweep      |

use std::cell::{Cell, RefCell};

use pathwatch_core::{Value, asap, same};
use tracing::{debug, error, trace};

use crate::config::SchedulerConfig;
use crate::{observer, watch};

#[derive(Debug, Default)]
struct CheckState {
    armed: bool,
    running: bool,
    rerun: bool,
    sweep_armed: bool,
    passes: u64,
    aborted: u64,
}

thread_local! {
    static STATE: RefCell<CheckState> = RefCell::new(CheckState::default());
    static CONFIG: Cell<SchedulerConfig> = Cell::new(SchedulerConfig::from_env());
}

/// Replace this thread's scheduler configuration.
pub fn set_scheduler_config(config: SchedulerConfig) {
    CONFIG.with(|cell| cell.set(config));
}

/// This thread's scheduler configuration.
#[must_use]
pub fn scheduler_config() -> SchedulerConfig {
    CONFIG.with(Cell::get)
}

/// Request a dirty check after the current turn.
///
/// Multiple requests before the check runs coalesce into one. A request made
/// while a check is running makes that run do one more pass.
pub fn schedule_check() {
    let queue = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.running {
            state.rerun = true;
            false
        } else if state.armed {
            false
        } else {
            state.armed = true;
            true
        }
    });
    if queue {
        trace!("dirty check armed");
        asap(run_checks);
    }
}

/// Request a sweep of registry entries whose object has been dropped.
///
/// Folded into the pending or running check when there is one.
pub fn schedule_sweep() {
    let queue = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.armed || state.running || state.sweep_armed {
            false
        } else {
            state.sweep_armed = true;
            true
        }
    });
    if queue {
        asap(run_sweep);
    }
}

fn run_sweep() {
    STATE.with(|state| state.borrow_mut().sweep_armed = false);
    sweep();
}

fn sweep() -> usize {
    let purged = observer::purge_dead_entries() + watch::purge_dead_paths();
    if purged > 0 {
        debug!(purged, "purged entries for dropped objects");
    }
    purged
}

/// Whether a check is queued and has not started yet.
#[must_use]
pub fn is_check_pending() -> bool {
    STATE.with(|state| state.borrow().armed)
}

/// Total passes run on this thread.
#[must_use]
pub fn check_passes_total() -> u64 {
    STATE.with(|state| state.borrow().passes)
}

/// Total runs stopped by the cycle bound on this thread.
#[must_use]
pub fn check_aborts_total() -> u64 {
    STATE.with(|state| state.borrow().aborted)
}

/// Returns the scheduler to idle when a run ends, including by panic.
struct RunningGuard;

impl Drop for RunningGuard {
    fn drop(&mut self) {
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.running = false;
            state.rerun = false;
        });
    }
}

fn run_checks() {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.armed = false;
        state.running = true;
    });
    let _guard = RunningGuard;
    let max_cycles = scheduler_config().max_check_cycles;
    let mut cycles = 0u32;
    loop {
        STATE.with(|state| state.borrow_mut().rerun = false);
        let changed = check_pass();
        if !STATE.with(|state| state.borrow().rerun) {
            break;
        }
        cycles += 1;
        if cycles > max_cycles {
            error!(
                cycles,
                max_cycles, changed, "dirty check did not settle; giving up on this run"
            );
            STATE.with(|state| state.borrow_mut().aborted += 1);
            break;
        }
    }
}

/// One pass over every tracked computed key. Returns how many changed.
fn check_pass() -> usize {
    STATE.with(|state| state.borrow_mut().passes += 1);
    sweep();
    let mut changed = 0;
    for (object, snapshots) in observer::computed_entries() {
        let target = Value::Object(object.clone());
        for (key, snapshot) in snapshots {
            let current = object.get(&key);
            if same(&current, &snapshot) {
                continue;
            }
            // Unobserved by an earlier callback in this pass.
            if !observer::update_snapshot(object.id(), &key, current) {
                continue;
            }
            changed += 1;
            observer::execute_callbacks(&target, &key, &snapshot);
        }
    }
    trace!(changed, "dirty check pass");
    changed
}
