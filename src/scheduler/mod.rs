// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Cooperative process ring.
//!
//! Processes form a circular doubly-linked ring, threaded through each
//! [`Process`]'s own `prev`/`next` fields rather than a separate intrusive
//! list type — the same "index-based links into an arena" shape the heap
//! uses for its free list, just one level up. The scheduler only owns ring
//! topology and state transitions; actually driving a process's thunk
//! through the evaluator is [`crate::env::Environment`]'s job, since that
//! needs the heap too.


use std::collections::HashMap;

use crate::error::RuntimeError;
use crate::process::{Process, ProcessState};
use crate::types::{CellRef, ProcessId};

/// Owns every process and the ring linking the runnable ones together.
pub struct Scheduler {
    processes: HashMap<ProcessId, Process>,
    current: Option<ProcessId>,
    next_pid: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            processes: HashMap::new(),
            current: None,
            next_pid: 1,
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<ProcessId> {
        self.current
    }

    #[must_use]
    pub fn process(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.get(&pid)
    }

    pub fn process_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.processes.get_mut(&pid)
    }

    /// Every known process, live or dead (used to mirror a freshly interned
    /// symbol's value into every process's locals array).
    pub fn all_processes_mut(&mut self) -> impl Iterator<Item = &mut Process> {
        self.processes.values_mut()
    }

    /// Create a new, unscheduled process. Its locals array is seeded by
    /// copying the current process's; a fresh environment with no current
    /// process starts the child with none.
    pub fn create_process(&mut self, thunk: CellRef, attention: u32) -> ProcessId {
        let pid = ProcessId(self.next_pid);
        self.next_pid += 1;
        let locals = self
            .current
            .and_then(|cur| self.processes.get(&cur))
            .map(|p| p.locals.clone())
            .unwrap_or_default();
        self.processes
            .insert(pid, Process::new(pid, attention, thunk, locals));
        pid
    }

    /// Admit a virgin process into the ring, making it eligible to run.
    /// Idempotent once primed.
    ///
    /// # Errors
    /// [`RuntimeError::UnknownProcess`] if `pid` was never created.
    pub fn prime_process(&mut self, pid: ProcessId) -> Result<(), RuntimeError> {
        let state = self
            .processes
            .get(&pid)
            .ok_or(RuntimeError::UnknownProcess(pid))?
            .state;
        if state != ProcessState::Virgin {
            return Ok(());
        }
        self.insert_into_ring(pid);
        if let Some(process) = self.processes.get_mut(&pid) {
            process.state = ProcessState::Paused;
        }
        Ok(())
    }

    fn insert_into_ring(&mut self, pid: ProcessId) {
        match self.current {
            None => {
                if let Some(p) = self.processes.get_mut(&pid) {
                    p.prev = pid;
                    p.next = pid;
                }
                self.current = Some(pid);
            }
            Some(cur) => {
                let after = self.processes.get(&cur).map_or(cur, |p| p.next);
                if let Some(p) = self.processes.get_mut(&cur) {
                    p.next = pid;
                }
                if let Some(p) = self.processes.get_mut(&after) {
                    p.prev = pid;
                }
                if let Some(p) = self.processes.get_mut(&pid) {
                    p.prev = cur;
                    p.next = after;
                }
            }
        }
    }

    fn remove_from_ring(&mut self, pid: ProcessId) {
        let Some(process) = self.processes.get(&pid) else {
            return;
        };
        let (prev, next) = (process.prev, process.next);
        if prev == pid {
            self.current = None;
        } else {
            if let Some(p) = self.processes.get_mut(&prev) {
                p.next = next;
            }
            if let Some(p) = self.processes.get_mut(&next) {
                p.prev = prev;
            }
            if self.current == Some(pid) {
                self.current = Some(next);
            }
        }
    }

    /// Remove a process from the ring permanently.
    ///
    /// # Errors
    /// [`RuntimeError::UnknownProcess`] if `pid` was never created.
    pub fn kill(&mut self, pid: ProcessId) -> Result<(), RuntimeError> {
        if !self.processes.contains_key(&pid) {
            return Err(RuntimeError::UnknownProcess(pid));
        }
        self.remove_from_ring(pid);
        if let Some(process) = self.processes.get_mut(&pid) {
            process.state = ProcessState::Dead;
            // A dead process is kept around for inspection (e.g. reporting
            // an unhandled exception) but must stop rooting cells, or a
            // killed process would leak its last heap graph forever.
            process.value_stack.clear();
            process.binding_stack.clear();
            process.locals.clear();
            process.frames.clear();
            process.mailbox.clear();
            process.thunk = CellRef::NIL;
        }
        Ok(())
    }

    pub fn mark_waiting(&mut self, pid: ProcessId) {
        if let Some(process) = self.processes.get_mut(&pid) {
            process.state = ProcessState::Waiting;
        }
    }

    pub fn mark_runnable(&mut self, pid: ProcessId) {
        if let Some(process) = self.processes.get_mut(&pid)
            && process.state == ProcessState::Waiting
        {
            process.state = ProcessState::Paused;
        }
    }

    /// Walk the ring from the current process looking for the next
    /// `Paused` one, skipping `Waiting`/`Dead` members. Returns `None` if
    /// nothing in the ring is runnable.
    pub fn advance(&mut self) -> Option<ProcessId> {
        let start = self.current?;
        let mut probe = self.processes.get(&start)?.next;
        loop {
            if self
                .processes
                .get(&probe)
                .is_some_and(|p| p.state == ProcessState::Paused)
            {
                self.current = Some(probe);
                return Some(probe);
            }
            if probe == start {
                return None;
            }
            probe = self.processes.get(&probe)?.next;
        }
    }

    /// Consume one unit of the current process's scheduling quantum and
    /// switch to the next runnable process once it is exhausted. A process
    /// inside an atomic section never yields control here.
    pub fn yield_now(&mut self) -> Option<ProcessId> {
        let cur = self.current?;
        if let Some(process) = self.processes.get_mut(&cur) {
            if process.is_atomic() {
                return Some(cur);
            }
            process.remaining_attention = process.remaining_attention.saturating_sub(1);
            if process.remaining_attention == 0 {
                process.remaining_attention = process.attention;
                self.advance();
            }
        }
        self.current
    }

    /// Every cell kept alive by every known process, live or dead-but-not-
    /// yet-reaped.
    pub fn all_roots(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.processes.values().flat_map(Process::gc_roots)
    }
}
