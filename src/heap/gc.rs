// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Top-level mark-sweep orchestration.
//!
//! [`Heap`] only knows how to mark a single root and sweep; it has no
//! notion of "everything alive right now" because that set spans the
//! symbol table and every process in the ring. [`collect`] ties the two
//! together: it is handed an iterator of extra roots (built by
//! [`crate::env::Environment::gc_roots`]) and drives the full mark-and-
//! sweep pass.

use super::{CollectReport, Heap};
use crate::types::CellRef;

/// Run one full mark-sweep collection.
///
/// `extra_roots` must enumerate every cell reachable from the symbol
/// table and from every process's stacks/locals/thunk/mailbox. NIL is
/// always marked regardless of what is passed in.
pub fn collect(heap: &mut Heap, extra_roots: impl IntoIterator<Item = CellRef>) -> CollectReport {
    heap.clear_marks();
    heap.mark_reachable(CellRef::NIL);
    for root in extra_roots {
        heap.mark_reachable(root);
    }
    heap.sweep_specials();
    heap.sweep_cells();
    let report = heap.report();
    tracing::debug!(
        size = report.size,
        free = report.free,
        reachable = report.reachable(),
        "gc collection complete"
    );
    report
}
