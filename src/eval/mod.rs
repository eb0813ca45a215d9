// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Minimal explicit-frame tree-walking evaluator.
//!
//! This is deliberately small: just enough `quote`/apply machinery to drive
//! the arithmetic used by the control-flow scenarios, with the evaluator's
//! pending work kept on an explicit [`Vec<Frame>`] rather than the Rust call
//! stack. That is the one property that matters here — a continuation is a
//! clone of this vector (plus the value/binding stacks), so capturing one is
//! just copying data, never unwinding or re-entering native frames.
//!
//! User-defined `LAMBDA` application, and the `callcc`/`try`/`raise`/
//! `resume` family, are public API calls rather than expressions this
//! evaluator reduces itself; see [`crate::env`].


use crate::error::RuntimeError;
use crate::heap::{Heap, NativeBinding, Tag};
use crate::types::CellRef;

/// Built-in index for variadic integer addition.
pub const BUILTIN_ADD: u16 = 0;
/// Built-in index for variadic integer subtraction (left fold).
pub const BUILTIN_SUB: u16 = 1;
/// Built-in index for the one-argument identity function, used to hand a
/// captured continuation straight back to its caller without committing to
/// any particular escape behavior.
pub const BUILTIN_IDENTITY: u16 = 2;

/// One pending step of an in-progress evaluation. This is the unit a
/// captured continuation clones.
#[derive(Clone, Debug)]
pub enum Frame {
    /// The operator expression was just evaluated to a value; still need to
    /// evaluate the (unevaluated) operand expressions in `args` before
    /// applying.
    EvalOperator { args: CellRef },
    /// The operator is known; `remaining` unevaluated operand expressions
    /// are left, `evaluated` holds the results so far.
    Apply {
        operator: CellRef,
        remaining: Vec<CellRef>,
        evaluated: Vec<CellRef>,
    },
}

impl Frame {
    /// Cells this frame keeps alive — a process's explicit frame stack is
    /// part of its GC root set.
    #[must_use]
    pub fn gc_roots(&self) -> Vec<CellRef> {
        match self {
            Self::EvalOperator { args } => vec![*args],
            Self::Apply {
                operator,
                remaining,
                evaluated,
            } => {
                let mut roots = Vec::with_capacity(remaining.len() + evaluated.len() + 1);
                roots.push(*operator);
                roots.extend(remaining.iter().copied());
                roots.extend(evaluated.iter().copied());
                roots
            }
        }
    }
}

enum Step {
    Eval(CellRef),
    Value(CellRef),
}

/// Evaluate `expr`, resuming `frames` first if it is non-empty (so a
/// continuation invocation can hand back a value to its captured frame
/// stack instead of always starting a fresh top-level evaluation).
///
/// # Errors
/// Propagates arity/type errors from applying a non-callable, and
/// out-of-memory if a builtin needs to allocate and the heap is exhausted.
pub fn eval(
    heap: &mut Heap,
    quote_symbol: CellRef,
    frames: &mut Vec<Frame>,
    expr: CellRef,
) -> Result<CellRef, RuntimeError> {
    let mut step = Step::Eval(expr);
    loop {
        step = match step {
            Step::Eval(current) => reduce(heap, quote_symbol, frames, current)?,
            Step::Value(value) => match frames.pop() {
                None => return Ok(value),
                Some(frame) => deliver(heap, frames, frame, value)?,
            },
        };
    }
}

fn reduce(
    heap: &mut Heap,
    quote_symbol: CellRef,
    frames: &mut Vec<Frame>,
    current: CellRef,
) -> Result<Step, RuntimeError> {
    if current.is_nil() {
        return Ok(Step::Value(CellRef::NIL));
    }
    Ok(match heap.tag(current) {
        Tag::Symbol => Step::Value(heap.symbol_value(current)),
        Tag::Int | Tag::Float | Tag::Text | Tag::NativeFn | Tag::Lambda => Step::Value(current),
        Tag::Free => return Err(RuntimeError::Assertion("eval of a freed cell")),
        Tag::Cons => {
            let head = heap.head(current);
            if head == quote_symbol {
                Step::Value(heap.head(heap.tail(current)))
            } else {
                frames.push(Frame::EvalOperator {
                    args: heap.tail(current),
                });
                Step::Eval(head)
            }
        }
    })
}

fn deliver(
    heap: &mut Heap,
    frames: &mut Vec<Frame>,
    frame: Frame,
    value: CellRef,
) -> Result<Step, RuntimeError> {
    match frame {
        Frame::EvalOperator { args } => {
            let mut remaining = list_to_vec(heap, args);
            if remaining.is_empty() {
                Ok(Step::Value(apply(heap, value, &[])?))
            } else {
                let first = remaining.remove(0);
                frames.push(Frame::Apply {
                    operator: value,
                    remaining,
                    evaluated: Vec::new(),
                });
                Ok(Step::Eval(first))
            }
        }
        Frame::Apply {
            operator,
            mut remaining,
            mut evaluated,
        } => {
            evaluated.push(value);
            if remaining.is_empty() {
                Ok(Step::Value(apply(heap, operator, &evaluated)?))
            } else {
                let next = remaining.remove(0);
                frames.push(Frame::Apply {
                    operator,
                    remaining,
                    evaluated,
                });
                Ok(Step::Eval(next))
            }
        }
    }
}

fn list_to_vec(heap: &Heap, mut list: CellRef) -> Vec<CellRef> {
    let mut out = Vec::new();
    while !list.is_nil() {
        out.push(heap.head(list));
        list = heap.tail(list);
    }
    out
}

/// Apply an already-evaluated `operator` to already-evaluated `args`.
/// `pub(crate)` so the exception/continuation machinery can dispatch to a
/// handler the same way ordinary application does.
pub(crate) fn apply(
    heap: &mut Heap,
    operator: CellRef,
    args: &[CellRef],
) -> Result<CellRef, RuntimeError> {
    if heap.tag(operator) != Tag::NativeFn {
        return Err(RuntimeError::InvalidArgument(
            "operator position did not evaluate to a callable",
        ));
    }
    match heap.native_binding(operator) {
        Some(NativeBinding::Builtin(BUILTIN_ADD)) => {
            let sum = args.iter().map(|&a| heap.int_value(a)).sum();
            heap.try_alloc_int(sum)
                .ok_or(RuntimeError::Assertion("heap exhausted evaluating +"))
        }
        Some(NativeBinding::Builtin(BUILTIN_SUB)) => {
            let mut values = args.iter().map(|&a| heap.int_value(a));
            let first = values.next().unwrap_or(0);
            let result = values.fold(first, |acc, v| acc - v);
            heap.try_alloc_int(result)
                .ok_or(RuntimeError::Assertion("heap exhausted evaluating -"))
        }
        Some(NativeBinding::Builtin(BUILTIN_IDENTITY)) => args
            .first()
            .copied()
            .ok_or(RuntimeError::ArityMismatch { expected: 1, got: 0 }),
        _ => Err(RuntimeError::InvalidArgument(
            "operator is not a recognized builtin",
        )),
    }
}
