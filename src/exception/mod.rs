// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Resumable exceptions.
//!
//! `try` establishes a trap point; `raise` walks the chain of trap points,
//! threaded through the well-known `trap-point` symbol, looking for a
//! handler. Unlike a plain exception, the raise call site is itself
//! captured as a resume point (the same snapshot [`crate::continuation`]
//! uses for `callcc`) before the handler runs: a handler that calls
//! `resume` jumps back to right after the original `raise`, as if it had
//! simply returned a value, rather than unwinding past it.

#[cfg(test)]
mod exception_test;

use crate::continuation::{capture_into_heap, invoke_cell};
use crate::error::RuntimeError;
use crate::eval;
use crate::heap::{FunctionalObject, Heap, NativeBinding};
use crate::process::Process;
use crate::symbol::SymbolTable;
use crate::types::{CellRef, ProcessId};

/// One link of the trap-point chain.
#[derive(Debug)]
pub struct TrapPoint {
    captured_by: ProcessId,
    previous: CellRef,
    handler: CellRef,
}

impl TrapPoint {
    #[must_use]
    pub const fn previous(&self) -> CellRef {
        self.previous
    }

    #[must_use]
    pub const fn handler(&self) -> CellRef {
        self.handler
    }
}

impl FunctionalObject for TrapPoint {
    fn mark(&self, heap: &mut Heap) {
        heap.mark_reachable(self.previous);
        heap.mark_reachable(self.handler);
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

/// Build a `NATIVEFN` cell wrapping a new trap point, chained onto
/// whatever the `trap-point` symbol currently holds. The caller is
/// responsible for the `pushdef`/`unwind_bindings` bracket that actually
/// installs and later retires it, mirroring how `pushdef` itself is a
/// process-level operation, not a heap one.
pub fn new_trap_cell(
    heap: &mut Heap,
    captured_by: ProcessId,
    previous: CellRef,
    handler: CellRef,
) -> Option<CellRef> {
    let object_index = heap.register_functional_object(Box::new(TrapPoint {
        captured_by,
        previous,
        handler,
    }));
    heap.try_alloc_nativefn(NativeBinding::Object(object_index))
}

/// Raise an exception with `args`.
///
/// Finds the innermost trap point via `trap_point_symbol`'s current value,
/// rebinds that symbol to the trap's `previous` link for the duration of
/// the handler call (so a `raise` from inside the handler escalates to the
/// next enclosing trap instead of looping back into this one), captures a
/// resume point, and applies the handler to `(resume-point . args)`'s two
/// halves as separate arguments.
///
/// # Errors
/// [`RuntimeError::UnhandledException`] if no trap point is active.
pub fn raise(
    heap: &mut Heap,
    quote_symbol: CellRef,
    symbols: &SymbolTable,
    process: &mut Process,
    trap_point_symbol: CellRef,
    args: CellRef,
) -> Result<CellRef, RuntimeError> {
    let trap_cell = heap.symbol_value(trap_point_symbol);
    if trap_cell.is_nil() {
        return Err(RuntimeError::UnhandledException(args));
    }
    let Some(NativeBinding::Object(object_index)) = heap.native_binding(trap_cell) else {
        return Err(RuntimeError::Assertion(
            "trap-point symbol did not hold a trap point",
        ));
    };
    let object = heap
        .take_functional_object(object_index)
        .ok_or(RuntimeError::Assertion("trap point object was already taken"))?;
    let downcast = object.as_any().downcast_ref::<TrapPoint>().map(|trap| {
        (trap.previous(), trap.handler())
    });
    heap.restore_functional_object(object_index, object);
    let Some((previous, handler)) = downcast else {
        return Err(RuntimeError::Assertion(
            "trap-point symbol did not hold a trap point",
        ));
    };

    process.pushdef(heap, symbols, trap_point_symbol, previous);
    let resume_point = capture_into_heap(heap, process)
        .ok_or(RuntimeError::Assertion("heap exhausted capturing a resume point"))?;
    eval::apply(heap, handler, &[resume_point, args])
}

/// Resume execution at a previously captured raise site with `value`, as
/// if the original `raise(args)` call had simply returned `value`.
///
/// # Errors
/// Propagates [`crate::continuation::invoke_cell`]'s errors, notably
/// [`RuntimeError::CrossProcessContinuation`].
pub fn resume(
    heap: &mut Heap,
    quote_symbol: CellRef,
    process: &mut Process,
    resume_point: CellRef,
    value: CellRef,
) -> Result<CellRef, RuntimeError> {
    invoke_cell(heap, quote_symbol, resume_point, process, value)
}
