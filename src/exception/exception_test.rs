// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for trap-point chaining and raise/resume.

use super::{new_trap_cell, raise, resume};
use crate::eval::BUILTIN_ADD;
use crate::heap::{DEFAULT_GROW_THRESHOLD, Heap, NativeBinding};
use crate::process::Process;
use crate::symbol::SymbolTable;
use crate::types::{CellRef, ProcessId};

#[test]
fn raise_with_no_active_trap_reports_unhandled_exception() {
    let mut heap = Heap::new(16, DEFAULT_GROW_THRESHOLD);
    let quote_sym = heap.try_alloc_symbol(CellRef::NIL).unwrap();
    let symbols = SymbolTable::new(4);
    let trap_point_sym = heap.try_alloc_symbol(CellRef::NIL).unwrap(); // value-slot starts as NIL... no, self-referential
    // A freshly allocated symbol's value-slot points to itself, not NIL;
    // force it to NIL to model "no trap established".
    heap.set_symbol_value(trap_point_sym, CellRef::NIL);
    let mut process = Process::new(ProcessId(1), 10, CellRef::NIL, Vec::new());
    let args = heap.try_alloc_int(99).unwrap();

    let err = raise(
        &mut heap,
        quote_sym,
        &symbols,
        &mut process,
        trap_point_sym,
        args,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        crate::error::RuntimeError::UnhandledException(_)
    ));
}

#[test]
fn raise_dispatches_to_the_installed_handler_with_a_resume_point() {
    let mut heap = Heap::new(32, DEFAULT_GROW_THRESHOLD);
    let quote_sym = heap.try_alloc_symbol(CellRef::NIL).unwrap();
    let symbols = SymbolTable::new(4);
    let trap_point_sym = heap.try_alloc_symbol(CellRef::NIL).unwrap();
    heap.set_symbol_value(trap_point_sym, CellRef::NIL);

    let handler = heap
        .try_alloc_nativefn(NativeBinding::Builtin(BUILTIN_ADD))
        .unwrap();
    let mut process = Process::new(ProcessId(1), 10, CellRef::NIL, Vec::new());
    let trap_cell = new_trap_cell(&mut heap, process.pid(), CellRef::NIL, handler).unwrap();
    process.pushdef(&mut heap, &symbols, trap_point_sym, trap_cell);

    let args = heap.try_alloc_int(5).unwrap();
    let result = raise(
        &mut heap,
        quote_sym,
        &symbols,
        &mut process,
        trap_point_sym,
        args,
    )
    .unwrap();
    // Handler is `+`; the resume-point cell contributes 0, so the result is
    // just the raised argument summed in.
    assert_eq!(heap.int_value(result), 5);
}

#[test]
fn raise_rebinds_trap_point_to_the_enclosing_trap_before_dispatch() {
    let mut heap = Heap::new(32, DEFAULT_GROW_THRESHOLD);
    let quote_sym = heap.try_alloc_symbol(CellRef::NIL).unwrap();
    let symbols = SymbolTable::new(4);
    let trap_point_sym = heap.try_alloc_symbol(CellRef::NIL).unwrap();
    heap.set_symbol_value(trap_point_sym, CellRef::NIL);

    let outer_handler = heap
        .try_alloc_nativefn(NativeBinding::Builtin(BUILTIN_ADD))
        .unwrap();
    let mut process = Process::new(ProcessId(1), 10, CellRef::NIL, Vec::new());
    let outer_trap = new_trap_cell(&mut heap, process.pid(), CellRef::NIL, outer_handler).unwrap();
    process.pushdef(&mut heap, &symbols, trap_point_sym, outer_trap);

    let inner_handler = outer_handler;
    let inner_trap = new_trap_cell(&mut heap, process.pid(), outer_trap, inner_handler).unwrap();
    process.pushdef(&mut heap, &symbols, trap_point_sym, inner_trap);

    let args = heap.try_alloc_int(1).unwrap();
    raise(
        &mut heap,
        quote_sym,
        &symbols,
        &mut process,
        trap_point_sym,
        args,
    )
    .unwrap();

    // The inner trap rebound trap-point to the outer one before calling its
    // handler; nothing has popped it back (that is `try`'s bracket), so it
    // should now read as the outer trap.
    assert_eq!(heap.symbol_value(trap_point_sym), outer_trap);
}

#[test]
fn resume_forwards_to_the_captured_resume_point() {
    let mut heap = Heap::new(32, DEFAULT_GROW_THRESHOLD);
    let quote_sym = heap.try_alloc_symbol(CellRef::NIL).unwrap();
    let symbols = SymbolTable::new(4);
    let trap_point_sym = heap.try_alloc_symbol(CellRef::NIL).unwrap();
    heap.set_symbol_value(trap_point_sym, CellRef::NIL);

    let handler = heap
        .try_alloc_nativefn(NativeBinding::Builtin(BUILTIN_ADD))
        .unwrap();
    let mut process = Process::new(ProcessId(9), 10, CellRef::NIL, Vec::new());
    let trap_cell = new_trap_cell(&mut heap, process.pid(), CellRef::NIL, handler).unwrap();
    process.pushdef(&mut heap, &symbols, trap_point_sym, trap_cell);

    // Capture a resume point the way `raise` does, standing in for "the
    // handler decided to resume instead of aborting".
    let resume_point = crate::continuation::capture_into_heap(&mut heap, &process).unwrap();
    let value = heap.try_alloc_int(42).unwrap();
    let result = resume(&mut heap, quote_sym, &mut process, resume_point, value).unwrap();
    assert_eq!(heap.int_value(result), 42);
}
