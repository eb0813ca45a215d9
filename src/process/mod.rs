// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The process frame.
//!
//! A process owns its own value stack, binding stack, locals array, mailbox
//! and explicit evaluator frame stack. This runtime never switches a native
//! call stack: cooperative scheduling here means swapping which process's
//! [`Process::frames`] the evaluator is driving, so a context switch is
//! nothing more than that.


use crate::eval::Frame;
use crate::heap::Heap;
use crate::mailbox::Mailbox;
use crate::symbol::SymbolTable;
use crate::types::CellRef;
use crate::types::ProcessId;

/// A process's scheduling state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcessState {
    /// Newly created, never scheduled yet.
    Virgin,
    /// On the ring, eligible to run.
    Paused,
    /// Currently being driven by the scheduler.
    Running,
    /// Blocked in `receive` with no matching message yet.
    Waiting,
    /// Left the ring permanently; kept around only for inspection.
    Dead,
}

/// One scheduled unit of execution.
pub struct Process {
    pid: ProcessId,
    pub state: ProcessState,
    /// Scheduling quantum assigned at creation.
    pub attention: u32,
    /// Quantum left in the current scheduling slice.
    pub remaining_attention: u32,
    /// Deadline for a pending `receive` timeout, if any.
    pub timeout_deadline: Option<std::time::Instant>,
    /// The expression this process evaluates next when resumed.
    pub thunk: CellRef,
    pub value_stack: Vec<CellRef>,
    pub binding_stack: Vec<(CellRef, CellRef)>,
    pub locals: Vec<CellRef>,
    pub mailbox: Mailbox,
    /// Nesting depth of `enter_atomic` calls: atomic sections suppress
    /// preemption at yield points, they do not nest context switches.
    pub atomicity: u32,
    /// Explicit evaluator continuation, see module docs.
    pub frames: Vec<Frame>,
    pub(crate) prev: ProcessId,
    pub(crate) next: ProcessId,
}

impl Process {
    #[must_use]
    pub fn new(pid: ProcessId, attention: u32, thunk: CellRef, locals: Vec<CellRef>) -> Self {
        Self {
            pid,
            state: ProcessState::Virgin,
            attention,
            remaining_attention: attention,
            timeout_deadline: None,
            thunk,
            value_stack: Vec::new(),
            binding_stack: Vec::new(),
            locals,
            mailbox: Mailbox::new(),
            atomicity: 0,
            frames: Vec::new(),
            prev: pid,
            next: pid,
        }
    }

    #[must_use]
    pub const fn pid(&self) -> ProcessId {
        self.pid
    }

    #[must_use]
    pub const fn is_atomic(&self) -> bool {
        self.atomicity > 0
    }

    pub fn enter_atomic(&mut self) {
        self.atomicity += 1;
    }

    /// Leave one level of an atomic section. Idempotent past zero: an
    /// unmatched `leave_atomic` is a caller bug, not something that should
    /// underflow the counter into a huge `u32`.
    pub fn leave_atomic(&mut self) {
        self.atomicity = self.atomicity.saturating_sub(1);
    }

    // --- value stack ---------------------------------------------------------

    #[must_use]
    pub fn stack_pos(&self) -> usize {
        self.value_stack.len()
    }

    pub fn stack_push(&mut self, cell: CellRef) {
        self.value_stack.push(cell);
    }

    /// Truncate the value stack back to a previously recorded position.
    /// Idempotent: unwinding to a position at or past the current length is
    /// a no-op, so repeated unwinding has the same effect as a single call.
    pub fn stack_unwind(&mut self, pos: usize) {
        self.value_stack.truncate(pos);
    }

    // --- binding stack ---------------------------------------------------------

    #[must_use]
    pub fn binding_pos(&self) -> usize {
        self.binding_stack.len()
    }

    /// Shadow `sym`'s current value with `new_value`, saving the old value
    /// for `unwind_bindings`. Updates the symbol's value-slot in the heap
    /// directly and, if `sym` has already been assigned a local index,
    /// mirrors the new value into this process's locals array.
    pub fn pushdef(
        &mut self,
        heap: &mut Heap,
        symbols: &SymbolTable,
        sym: CellRef,
        new_value: CellRef,
    ) {
        let previous = heap.symbol_value(sym);
        self.binding_stack.push((sym, previous));
        heap.set_symbol_value(sym, new_value);
        if let Some(index) = symbols.local_index(sym) {
            self.set_local(index, new_value);
        }
    }

    /// Restore bindings down to `pos`, most-recent first. Idempotent past
    /// `pos`.
    pub fn unwind_bindings(&mut self, heap: &mut Heap, symbols: &SymbolTable, pos: usize) {
        while self.binding_stack.len() > pos {
            let Some((sym, previous)) = self.binding_stack.pop() else {
                break;
            };
            heap.set_symbol_value(sym, previous);
            if let Some(index) = symbols.local_index(sym) {
                self.set_local(index, previous);
            }
        }
    }

    /// Write `value` into this process's locals array at `index`, growing
    /// the array if needed. Used both by `pushdef`/`unwind_bindings` and by
    /// [`crate::env::Environment`] to mirror a new symbol's initial value
    /// or a `builtin_symbol` binding into every process.
    pub fn set_local(&mut self, index: usize, value: CellRef) {
        if index >= self.locals.len() {
            self.locals.resize(index + 1, CellRef::NIL);
        }
        self.locals[index] = value;
    }

    // --- GC -----------------------------------------------------------------

    /// Every cell this process keeps alive, for GC root enumeration.
    pub fn gc_roots(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.value_stack
            .iter()
            .copied()
            .chain(self.binding_stack.iter().flat_map(|&(s, v)| [s, v]))
            .chain(self.locals.iter().copied())
            .chain(std::iter::once(self.thunk))
            .chain(self.mailbox.gc_roots())
            .chain(self.frames.iter().flat_map(Frame::gc_roots))
    }
}
