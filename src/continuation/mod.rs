// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! First-class continuations.
//!
//! A continuation is a plain snapshot of the capturing process's value
//! stack, binding stack, locals and explicit evaluator frame stack — not a
//! copy of a native call stack. That makes capture and invocation both
//! ordinary data operations (clone in, clone out) rather than
//! `setjmp`/`longjmp`-style native stack swapping, trading a wider class of
//! portable continuations for a narrower one: a continuation can only ever
//! be invoked on the process that captured it, since there is no native
//! stack to splice a second one onto (see DESIGN.md).


use crate::error::RuntimeError;
use crate::eval::Frame;
use crate::heap::{Heap, NativeBinding};
use crate::process::Process;
use crate::types::{CellRef, ProcessId};

/// A captured point in a process's evaluation.
#[derive(Debug)]
pub struct Continuation {
    captured_by: ProcessId,
    value_stack: Vec<CellRef>,
    binding_stack: Vec<(CellRef, CellRef)>,
    locals: Vec<CellRef>,
    frames: Vec<Frame>,
}

impl Continuation {
    /// Snapshot `process`'s current state.
    #[must_use]
    pub fn capture(process: &Process) -> Self {
        Self {
            captured_by: process.pid(),
            value_stack: process.value_stack.clone(),
            binding_stack: process.binding_stack.clone(),
            locals: process.locals.clone(),
            frames: process.frames.clone(),
        }
    }

    #[must_use]
    pub const fn captured_by(&self) -> ProcessId {
        self.captured_by
    }

    /// Replace `process`'s state with the captured snapshot and resume
    /// evaluation by handing `value` to whatever frame was pending at
    /// capture time.
    ///
    /// # Errors
    /// [`RuntimeError::CrossProcessContinuation`] if `process` is not the
    /// one that captured this continuation.
    pub fn invoke(
        &self,
        heap: &mut Heap,
        quote_symbol: CellRef,
        process: &mut Process,
        value: CellRef,
    ) -> Result<CellRef, RuntimeError> {
        if process.pid() != self.captured_by {
            return Err(RuntimeError::CrossProcessContinuation {
                captured_by: self.captured_by,
                invoked_from: process.pid(),
            });
        }
        process.value_stack = self.value_stack.clone();
        process.binding_stack = self.binding_stack.clone();
        process.locals = self.locals.clone();
        let mut frames = self.frames.clone();
        // `value` was already evaluated by the caller of `invoke` (it is
        // the argument `callcc`'s escape procedure was applied to), so we
        // resume by delivering it straight to the restored frame stack
        // rather than re-entering `eval` at an expression.
        crate::eval::eval(heap, quote_symbol, &mut frames, value)
    }
}

impl crate::heap::FunctionalObject for Continuation {
    fn mark(&self, heap: &mut Heap) {
        for &cell in &self.value_stack {
            heap.mark_reachable(cell);
        }
        for &(sym, val) in &self.binding_stack {
            heap.mark_reachable(sym);
            heap.mark_reachable(val);
        }
        for &cell in &self.locals {
            heap.mark_reachable(cell);
        }
        for frame in &self.frames {
            for root in frame.gc_roots() {
                heap.mark_reachable(root);
            }
        }
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

/// Allocate a `NATIVEFN` cell wrapping a freshly captured continuation.
///
/// # Errors
/// `None` if the heap has no free cells (caller retries after GC/grow).
pub fn capture_into_heap(heap: &mut Heap, process: &Process) -> Option<CellRef> {
    let object_index = heap.register_functional_object(Box::new(Continuation::capture(process)));
    heap.try_alloc_nativefn(NativeBinding::Object(object_index))
}

/// Recover the [`Continuation`] wrapped by a `NATIVEFN` cell, if `cell` is
/// in fact one. Read-only: for invoking a continuation, use
/// [`invoke_cell`], which avoids aliasing the heap against the object it
/// owns.
#[must_use]
pub fn downcast<'h>(heap: &'h Heap, cell: CellRef) -> Option<&'h Continuation> {
    let NativeBinding::Object(object_index) = heap.native_binding(cell)? else {
        return None;
    };
    heap.functional_object(object_index)?
        .as_any()
        .downcast_ref::<Continuation>()
}

/// Invoke the continuation wrapped by `cell`.
///
/// # Errors
/// [`RuntimeError::InvalidArgument`] if `cell` does not wrap a
/// continuation; [`RuntimeError::CrossProcessContinuation`] per
/// [`Continuation::invoke`].
pub fn invoke_cell(
    heap: &mut Heap,
    quote_symbol: CellRef,
    cell: CellRef,
    process: &mut Process,
    value: CellRef,
) -> Result<CellRef, RuntimeError> {
    let Some(NativeBinding::Object(object_index)) = heap.native_binding(cell) else {
        return Err(RuntimeError::InvalidArgument(
            "cell does not wrap a functional object",
        ));
    };
    let object = heap
        .take_functional_object(object_index)
        .ok_or(RuntimeError::InvalidArgument("functional object slot was empty"))?;
    let result = match object.as_any().downcast_ref::<Continuation>() {
        Some(continuation) => continuation.invoke(heap, quote_symbol, process, value),
        None => Err(RuntimeError::InvalidArgument(
            "cell does not wrap a continuation",
        )),
    };
    heap.restore_functional_object(object_index, object);
    result
}
