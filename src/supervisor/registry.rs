// src/supervisor/registry.rs

//! Lock-guarded registry of tracked processes.
//!
//! Three actors touch the registry: callers starting processes, each
//! process' own exit task, and the kill-all loop. Every read and write goes
//! through one mutex, and each entry carries a small state machine:
//!
//! ```text
//! Running --(kill-all)--> Stopping --(kill-all removes)--> gone
//! Running --(exit task removes)--------------------------> gone
//! ```
//!
//! An exit task only removes entries that are still `Running`; once kill-all
//! has claimed an entry it is the sole remover. Removal is keyed by pid *and*
//! serial, so a stale remover can never drop a newer process that reused the
//! same pid.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::errors::{ProcError, Result};

/// Lifecycle of a registered entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Running,
    Stopping,
}

/// An entry claimed by a kill-all pass.
#[derive(Debug, Clone)]
pub struct Claimed<T> {
    pub pid: u32,
    pub serial: u64,
    pub value: T,
}

#[derive(Debug)]
struct Entry<T> {
    serial: u64,
    state: EntryState,
    value: T,
}

#[derive(Debug)]
struct RegistryState<T> {
    entries: HashMap<u32, Entry<T>>,
    accepting: bool,
}

#[derive(Debug)]
pub struct ProcessRegistry<T> {
    state: Mutex<RegistryState<T>>,
}

impl<T: Clone> Default for ProcessRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ProcessRegistry<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                entries: HashMap::new(),
                accepting: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Track `value` under `pid`.
    ///
    /// Fails with [`ProcError::DuplicatePid`] if the pid is already tracked
    /// and with [`ProcError::ShuttingDown`] once shutdown has begun.
    pub fn insert(&self, pid: u32, serial: u64, value: T) -> Result<()> {
        let mut state = self.lock();
        if !state.accepting {
            return Err(ProcError::ShuttingDown);
        }
        if state.entries.contains_key(&pid) {
            return Err(ProcError::DuplicatePid(pid));
        }
        state.entries.insert(
            pid,
            Entry {
                serial,
                state: EntryState::Running,
                value,
            },
        );
        debug!(pid, serial, tracked = state.entries.len(), "registered process");
        Ok(())
    }

    /// Remove whatever is tracked under `pid`.
    pub fn remove(&self, pid: u32) -> Result<T> {
        let mut state = self.lock();
        state
            .entries
            .remove(&pid)
            .map(|entry| entry.value)
            .ok_or(ProcError::UnknownPid(pid))
    }

    /// Remove the entry for `pid` if it still belongs to `serial`.
    ///
    /// With `only_running`, entries already claimed by kill-all are left
    /// alone. Returns whether something was removed.
    pub fn remove_if(&self, pid: u32, serial: u64, only_running: bool) -> bool {
        let mut state = self.lock();
        let matches = state.entries.get(&pid).is_some_and(|entry| {
            entry.serial == serial && (!only_running || entry.state == EntryState::Running)
        });
        if matches {
            state.entries.remove(&pid);
            debug!(pid, serial, tracked = state.entries.len(), "deregistered process");
        }
        matches
    }

    /// Move every `Running` entry to `Stopping` and return them.
    pub fn claim_running(&self) -> Vec<Claimed<T>> {
        let mut state = self.lock();
        claim(&mut state)
    }

    /// Stop accepting new entries, then claim everything still running.
    pub fn begin_shutdown(&self) -> Vec<Claimed<T>> {
        let mut state = self.lock();
        state.accepting = false;
        claim(&mut state)
    }

    pub fn is_accepting(&self) -> bool {
        self.lock().accepting
    }

    pub fn get(&self, pid: u32) -> Option<T> {
        self.lock().entries.get(&pid).map(|entry| entry.value.clone())
    }

    pub fn state_of(&self, pid: u32) -> Option<EntryState> {
        self.lock().entries.get(&pid).map(|entry| entry.state)
    }

    pub fn pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.lock().entries.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

fn claim<T: Clone>(state: &mut RegistryState<T>) -> Vec<Claimed<T>> {
    state
        .entries
        .iter_mut()
        .filter(|(_, entry)| entry.state == EntryState::Running)
        .map(|(pid, entry)| {
            entry.state = EntryState::Stopping;
            Claimed {
                pid: *pid,
                serial: entry.serial,
                value: entry.value.clone(),
            }
        })
        .collect()
}
