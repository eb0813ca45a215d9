// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The embedding surface: [`Environment`] composes the heap, symbol table
//! and process scheduler into the full public API.
//!
//! Unlike a thread-local "current environment" pointer, an `Environment`
//! here is an ordinary owned value the embedder holds and passes
//! explicitly — Rust ownership already gives ambient-global access no
//! safety benefit over a `&mut Environment` parameter, so there is no
//! hidden global to swap (see DESIGN.md). "Current process" bookkeeping
//! is instead tracked inside the scheduler, since that is the piece that
//! actually changes underneath cooperative switching.

#[cfg(test)]
mod env_test;

use std::time::{Duration, Instant};

use crate::error::{GcError, RuntimeError};
use crate::eval;
use crate::exception;
use crate::heap::{CollectReport, FunctionalObject, Heap, NativeBinding};
use crate::mailbox::Pattern;
use crate::process::{Process, ProcessState};
use crate::scheduler::Scheduler;
use crate::symbol::{self, SymbolTable};
use crate::types::{CellRef, ProcessId};

/// Tuning knobs for a fresh environment.
#[derive(Clone, Debug)]
pub struct Parameters {
    pub heap_size: usize,
    pub grow_heap_threshold: u8,
    pub stack_size: usize,
    pub max_symbols: usize,
    pub discard_doc: bool,
    pub pretty_print: bool,
    pub tab_size: u8,
    pub default_attention: u32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            heap_size: crate::heap::DEFAULT_HEAP_SIZE,
            grow_heap_threshold: crate::heap::DEFAULT_GROW_THRESHOLD,
            stack_size: 4096,
            max_symbols: 4096,
            discard_doc: false,
            pretty_print: true,
            tab_size: 4,
            default_attention: 10,
        }
    }
}

/// Outcome of a non-blocking `receive` poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A matching message was dequeued.
    Delivered(CellRef),
    /// Nothing matched yet; the process is now `Waiting`. Caller should
    /// cooperatively yield and poll again.
    Waiting,
    /// Nothing matched before the deadline passed.
    TimedOut,
}

/// A complete runtime instance: heap, symbol table and process ring.
pub struct Environment {
    heap: Heap,
    symbols: SymbolTable,
    scheduler: Scheduler,
    quote_symbol: CellRef,
    trap_point_symbol: CellRef,
    parameters: Parameters,
}

impl Environment {
    /// Build a fresh environment, bootstrapping the `quote` and
    /// `trap-point` symbols every other operation depends on.
    ///
    /// # Errors
    /// [`RuntimeError::OutOfMemory`] if `parameters.heap_size` is too small
    /// to hold the two bootstrap symbols.
    pub fn init(parameters: Parameters) -> Result<Self, RuntimeError> {
        let mut heap = Heap::new(parameters.heap_size, parameters.grow_heap_threshold);
        let mut symbols = SymbolTable::new(parameters.max_symbols.max(1));
        let quote_symbol = Self::intern_bootstrap(&mut heap, &mut symbols, "quote")?;
        let trap_point_symbol = Self::intern_bootstrap(&mut heap, &mut symbols, "trap-point")?;
        heap.set_symbol_value(trap_point_symbol, CellRef::NIL);
        tracing::debug!(heap_size = parameters.heap_size, "environment initialized");
        Ok(Self {
            heap,
            symbols,
            scheduler: Scheduler::new(),
            quote_symbol,
            trap_point_symbol,
            parameters,
        })
    }

    fn intern_bootstrap(
        heap: &mut Heap,
        symbols: &mut SymbolTable,
        name: &str,
    ) -> Result<CellRef, RuntimeError> {
        let hash = symbol::hash_name(name);
        let bucket = symbols.bucket_index(hash);
        let sym = heap
            .try_intern_cells(name, hash)
            .ok_or(GcError { requested: 4 })?;
        symbols.insert(bucket, sym);
        symbols.reserve_local_index(sym);
        Ok(sym)
    }

    #[must_use]
    pub const fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    #[must_use]
    pub const fn quote_symbol(&self) -> CellRef {
        self.quote_symbol
    }

    /// Direct heap access for external collaborators (reader, built-ins)
    /// that need to inspect cell contents this API does not itself
    /// interpret — e.g. decoding a mailbox message or a raised value.
    #[must_use]
    pub const fn heap(&self) -> &Heap {
        &self.heap
    }

    pub const fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    // --- allocation ----------------------------------------------------------

    fn gc_roots_vec(&self) -> Vec<CellRef> {
        self.symbols
            .all_symbols()
            .chain(self.scheduler.all_roots())
            .collect()
    }

    /// Run an allocation, retrying after a collection and then after heap
    /// growth if the heap was full: GC first. If the collection left the
    /// heap below the grow-heap-threshold's free-fraction floor, grow
    /// proactively before even retrying — otherwise every further
    /// allocation on a heap that never recovers much free space would
    /// keep re-running a GC pass that reclaims almost nothing. Only if
    /// that still doesn't satisfy the request do we fall back to growing
    /// once more and retrying a final time before giving up.
    fn alloc_or_retry(
        &mut self,
        mut attempt: impl FnMut(&mut Heap) -> Option<CellRef>,
    ) -> Result<CellRef, RuntimeError> {
        if let Some(cell) = attempt(&mut self.heap) {
            return Ok(cell);
        }
        let roots = self.gc_roots_vec();
        let report = crate::heap::gc::collect(&mut self.heap, roots);
        if self.heap.should_grow(report) {
            let target = self.heap.grow_target(report, 1);
            self.heap.grow_to(target)?;
            return attempt(&mut self.heap).ok_or(RuntimeError::Assertion(
                "allocation failed even after heap growth",
            ));
        }
        if let Some(cell) = attempt(&mut self.heap) {
            return Ok(cell);
        }
        let target = self.heap.grow_target(report, 1);
        self.heap.grow_to(target)?;
        attempt(&mut self.heap).ok_or(RuntimeError::Assertion(
            "allocation failed even after heap growth",
        ))
    }

    /// # Errors
    /// [`RuntimeError::OutOfMemory`] if growth itself fails.
    pub fn cons(&mut self, head: CellRef, tail: CellRef) -> Result<CellRef, RuntimeError> {
        self.alloc_or_retry(|heap| heap.try_cons(head, tail))
    }

    /// # Errors
    /// [`RuntimeError::OutOfMemory`] if growth itself fails.
    pub fn mk_int(&mut self, value: i64) -> Result<CellRef, RuntimeError> {
        self.alloc_or_retry(|heap| heap.try_alloc_int(value))
    }

    /// # Errors
    /// [`RuntimeError::OutOfMemory`] if growth itself fails.
    pub fn mk_float(&mut self, value: f64) -> Result<CellRef, RuntimeError> {
        self.alloc_or_retry(|heap| heap.try_alloc_float(value))
    }

    /// # Errors
    /// [`RuntimeError::OutOfMemory`] if growth itself fails.
    pub fn mk_text(&mut self, text: &str) -> Result<CellRef, RuntimeError> {
        self.alloc_or_retry(|heap| heap.try_alloc_text(text))
    }

    /// # Errors
    /// [`RuntimeError::OutOfMemory`] if growth itself fails.
    pub fn mk_nativefn(&mut self, builtin: u16) -> Result<CellRef, RuntimeError> {
        self.alloc_or_retry(|heap| heap.try_alloc_nativefn(NativeBinding::Builtin(builtin)))
    }

    /// Wrap a functional object in a fresh `NATIVEFN` cell.
    ///
    /// # Errors
    /// [`RuntimeError::OutOfMemory`] if growth itself fails. On failure the
    /// object is dropped along with the failed attempt.
    pub fn mk_functional_object(
        &mut self,
        object: Box<dyn FunctionalObject>,
    ) -> Result<CellRef, RuntimeError> {
        let index = self.heap.register_functional_object(object);
        self.alloc_or_retry(|heap| heap.try_alloc_nativefn(NativeBinding::Object(index)))
    }

    /// Allocate a symbol that is never placed in any bucket.
    ///
    /// # Errors
    /// [`RuntimeError::OutOfMemory`] if growth itself fails.
    pub fn mk_anon_symbol(&mut self) -> Result<CellRef, RuntimeError> {
        self.alloc_or_retry(|heap| heap.try_alloc_symbol(CellRef::NIL))
    }

    /// Find or create the named symbol, mirroring its initial value into
    /// every live process's locals array the first time it is interned.
    ///
    /// # Errors
    /// [`RuntimeError::OutOfMemory`] if growth itself fails while building
    /// the symbol's cells.
    pub fn intern(&mut self, name: &str) -> Result<CellRef, RuntimeError> {
        let hash = symbol::hash_name(name);
        let bucket = self.symbols.bucket_index(hash);
        if let Some(existing) = self.symbols.find(&self.heap, bucket, name) {
            return Ok(existing);
        }
        let sym = self.alloc_or_retry(|heap| heap.try_intern_cells(name, hash))?;
        self.symbols.insert(bucket, sym);
        let index = self.symbols.reserve_local_index(sym);
        let value = self.heap.symbol_value(sym);
        for process in self.scheduler.all_processes_mut() {
            process.set_local(index, value);
        }
        Ok(sym)
    }

    /// Intern `name` and bind it to a built-in `NATIVEFN`.
    ///
    /// # Errors
    /// [`RuntimeError::OutOfMemory`] if growth itself fails.
    pub fn builtin_symbol(&mut self, name: &str, builtin: u16) -> Result<CellRef, RuntimeError> {
        let sym = self.intern(name)?;
        let nativefn = self.mk_nativefn(builtin)?;
        self.heap.set_symbol_value(sym, nativefn);
        if let Some(index) = self.symbols.local_index(sym) {
            for process in self.scheduler.all_processes_mut() {
                process.set_local(index, nativefn);
            }
        }
        Ok(sym)
    }

    // --- GC --------------------------------------------------------------------

    pub fn gc(&mut self) -> CollectReport {
        let roots = self.gc_roots_vec();
        crate::heap::gc::collect(&mut self.heap, roots)
    }

    pub fn mark(&mut self, root: CellRef) {
        self.heap.mark_reachable(root);
    }

    // --- processes ---------------------------------------------------------------

    #[must_use]
    pub fn current_process(&self) -> Option<ProcessId> {
        self.scheduler.current()
    }

    fn current_process_mut(&mut self) -> Result<&mut Process, RuntimeError> {
        let pid = self.scheduler.current().ok_or(RuntimeError::NoCurrentProcess)?;
        self.scheduler
            .process_mut(pid)
            .ok_or(RuntimeError::NoCurrentProcess)
    }

    /// Create and admit a new process evaluating `thunk` — creation and
    /// admission are folded together since nothing in this crate needs a
    /// virgin, not-yet-scheduled process to be externally observable.
    pub fn spawn(&mut self, thunk: CellRef) -> ProcessId {
        let pid = self
            .scheduler
            .create_process(thunk, self.parameters.default_attention);
        let _ = self.scheduler.prime_process(pid);
        pid
    }

    /// # Errors
    /// [`RuntimeError::UnknownProcess`] if `pid` is not known.
    pub fn kill(&mut self, pid: ProcessId) -> Result<(), RuntimeError> {
        self.scheduler.kill(pid)
    }

    pub fn yield_now(&mut self) -> Option<ProcessId> {
        self.scheduler.yield_now()
    }

    /// # Errors
    /// [`RuntimeError::NoCurrentProcess`] if nothing is currently running.
    pub fn enter_atomic(&mut self) -> Result<(), RuntimeError> {
        self.current_process_mut()?.enter_atomic();
        Ok(())
    }

    /// # Errors
    /// [`RuntimeError::NoCurrentProcess`] if nothing is currently running.
    pub fn leave_atomic(&mut self) -> Result<(), RuntimeError> {
        self.current_process_mut()?.leave_atomic();
        Ok(())
    }

    // --- mailboxes -----------------------------------------------------------

    /// Send `args` to `to`, tagging the message with the sending process's
    /// id. Wakes `to` if it was `Waiting`. A message sent to a dead
    /// process is dropped rather than queued — `to`'s stacks were already
    /// reclaimed when it was killed, and a mailbox nobody ever drains
    /// again would otherwise keep the message's cells reachable forever.
    ///
    /// # Errors
    /// [`RuntimeError::NoCurrentProcess`] / [`RuntimeError::UnknownProcess`].
    pub fn send(&mut self, to: ProcessId, args: CellRef) -> Result<(), RuntimeError> {
        let from = self.current_process().ok_or(RuntimeError::NoCurrentProcess)?;
        let target = self.scheduler.process(to).ok_or(RuntimeError::UnknownProcess(to))?;
        if target.state == ProcessState::Dead {
            return Ok(());
        }
        let sender = self.mk_int(i64::try_from(from.0).unwrap_or(i64::MAX))?;
        let message = self.cons(sender, args)?;
        let process = self
            .scheduler
            .process_mut(to)
            .ok_or(RuntimeError::UnknownProcess(to))?;
        process.mailbox.push(message);
        self.scheduler.mark_runnable(to);
        Ok(())
    }

    /// Poll the current process's mailbox. A `None` timeout blocks
    /// indefinitely (until a send wakes the process); `Some` resolves to
    /// [`ReceiveOutcome::TimedOut`] once the deadline passes. Either
    /// outcome restores the process to runnable — `Waiting` is only the
    /// state while a poll has found nothing to do yet, never a state a
    /// caller should be left in after this call returns something to act
    /// on.
    ///
    /// # Errors
    /// [`RuntimeError::NoCurrentProcess`] if nothing is currently running.
    pub fn receive(
        &mut self,
        patterns: &[Pattern],
        timeout: Option<Duration>,
    ) -> Result<ReceiveOutcome, RuntimeError> {
        let pid = self.current_process().ok_or(RuntimeError::NoCurrentProcess)?;
        let process = self.current_process_mut()?;
        if let Some(message) = process.mailbox.take_matching(patterns) {
            process.timeout_deadline = None;
            self.scheduler.mark_runnable(pid);
            return Ok(ReceiveOutcome::Delivered(message));
        }
        let deadline = *process
            .timeout_deadline
            .get_or_insert_with(|| Instant::now() + timeout.unwrap_or(Duration::MAX));
        if timeout.is_some() && Instant::now() >= deadline {
            process.timeout_deadline = None;
            self.scheduler.mark_runnable(pid);
            return Ok(ReceiveOutcome::TimedOut);
        }
        self.scheduler.mark_waiting(pid);
        Ok(ReceiveOutcome::Waiting)
    }

    // --- evaluation ------------------------------------------------------------

    /// # Errors
    /// Propagates [`crate::eval::eval`]'s errors.
    pub fn eval(&mut self, expr: CellRef) -> Result<CellRef, RuntimeError> {
        let pid = self.current_process().ok_or(RuntimeError::NoCurrentProcess)?;
        let quote = self.quote_symbol;
        let mut frames = {
            let process = self
                .scheduler
                .process_mut(pid)
                .ok_or(RuntimeError::NoCurrentProcess)?;
            std::mem::take(&mut process.frames)
        };
        let result = eval::eval(&mut self.heap, quote, &mut frames, expr);
        if let Some(process) = self.scheduler.process_mut(pid) {
            process.frames = frames;
        }
        result
    }

    // --- continuations ---------------------------------------------------------

    /// Capture the current process's continuation and apply `receiver` to
    /// it.
    ///
    /// # Errors
    /// [`RuntimeError::NoCurrentProcess`], or allocation/application
    /// failures.
    pub fn callcc(&mut self, receiver: CellRef) -> Result<CellRef, RuntimeError> {
        let pid = self.current_process().ok_or(RuntimeError::NoCurrentProcess)?;
        let process = self
            .scheduler
            .process(pid)
            .ok_or(RuntimeError::NoCurrentProcess)?;
        let cell = crate::continuation::capture_into_heap(&mut self.heap, process).ok_or(
            RuntimeError::Assertion("heap exhausted capturing continuation"),
        )?;
        eval::apply(&mut self.heap, receiver, &[cell])
    }

    /// Invoke a previously captured continuation.
    ///
    /// # Errors
    /// [`RuntimeError::CrossProcessContinuation`] if invoked from a
    /// different process than the one that captured it.
    pub fn invoke_continuation(
        &mut self,
        cell: CellRef,
        value: CellRef,
    ) -> Result<CellRef, RuntimeError> {
        let pid = self.current_process().ok_or(RuntimeError::NoCurrentProcess)?;
        let quote = self.quote_symbol;
        let process = self
            .scheduler
            .process_mut(pid)
            .ok_or(RuntimeError::NoCurrentProcess)?;
        crate::continuation::invoke_cell(&mut self.heap, quote, cell, process, value)
    }

    // --- exceptions --------------------------------------------------------------

    /// Establish a trap point around `body`, handled by `handler`. The
    /// trap-point binding is always retired afterward, whether `body`
    /// returned normally or a `raise` propagated out of it.
    ///
    /// # Errors
    /// [`RuntimeError::NoCurrentProcess`], or whatever `body` returns.
    pub fn try_block(
        &mut self,
        handler: CellRef,
        body: impl FnOnce(&mut Self) -> Result<CellRef, RuntimeError>,
    ) -> Result<CellRef, RuntimeError> {
        let pid = self.current_process().ok_or(RuntimeError::NoCurrentProcess)?;
        let trap_point_symbol = self.trap_point_symbol;
        let previous = self.heap.symbol_value(trap_point_symbol);
        let trap_cell = exception::new_trap_cell(&mut self.heap, pid, previous, handler).ok_or(
            RuntimeError::Assertion("heap exhausted establishing a trap point"),
        )?;

        let pos = {
            let process = self
                .scheduler
                .process_mut(pid)
                .ok_or(RuntimeError::NoCurrentProcess)?;
            let pos = process.binding_pos();
            process.pushdef(&mut self.heap, &self.symbols, trap_point_symbol, trap_cell);
            pos
        };

        let result = body(self);

        if let Some(process) = self.scheduler.process_mut(pid) {
            process.unwind_bindings(&mut self.heap, &self.symbols, pos);
        }
        result
    }

    /// Raise an exception with `args` on the current process.
    ///
    /// # Errors
    /// [`RuntimeError::UnhandledException`] if no trap point is active.
    pub fn raise(&mut self, args: CellRef) -> Result<CellRef, RuntimeError> {
        let pid = self.current_process().ok_or(RuntimeError::NoCurrentProcess)?;
        let quote = self.quote_symbol;
        let trap_point_symbol = self.trap_point_symbol;
        let process = self
            .scheduler
            .process_mut(pid)
            .ok_or(RuntimeError::NoCurrentProcess)?;
        exception::raise(
            &mut self.heap,
            quote,
            &self.symbols,
            process,
            trap_point_symbol,
            args,
        )
    }

    /// Resume execution at a captured raise site.
    ///
    /// # Errors
    /// [`RuntimeError::CrossProcessContinuation`] if invoked from a
    /// different process than the one that raised.
    pub fn resume(&mut self, resume_point: CellRef, value: CellRef) -> Result<CellRef, RuntimeError> {
        let pid = self.current_process().ok_or(RuntimeError::NoCurrentProcess)?;
        let quote = self.quote_symbol;
        let process = self
            .scheduler
            .process_mut(pid)
            .ok_or(RuntimeError::NoCurrentProcess)?;
        exception::resume(&mut self.heap, quote, process, resume_point, value)
    }
}
