// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Dense cell arena with mark-sweep garbage collection.
//!
//! This is the bottom of the runtime: a `Vec`-backed array of fixed-size
//! cells, a packed mark bitmap, and a free list threaded through the
//! cells themselves. The heap knows nothing about processes or the symbol
//! table — it exposes raw, non-blocking allocation (`try_*`) and the
//! mark/sweep primitives; the retry-with-GC dance and root collection
//! live in [`crate::env`], which is the only place that has both the heap
//! and the process ring in scope.

pub mod gc;

#[cfg(test)]
mod heap_test;

use crate::error::GcError;
use crate::types::CellRef;

/// Default initial heap size in cells.
pub const DEFAULT_HEAP_SIZE: usize = 65536;

/// Default grow-heap-threshold percentage.
pub const DEFAULT_GROW_THRESHOLD: u8 = 80;

/// The seven cell variants this arena stores, plus an internal `Free` tag
/// for cells currently on the free list.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[repr(u8)]
pub enum Tag {
    Cons = 0,
    Lambda = 1,
    Symbol = 2,
    NativeFn = 3,
    Int = 4,
    Float = 5,
    Text = 6,
    #[default]
    Free = 7,
}

/// The two machine-word slots every cell carries, reinterpreted per tag.
#[derive(Clone, Copy, Default)]
struct Cell {
    a: i64,
    b: i64,
}

/// What a `NativeFn` cell's context slot points to: a native callable with
/// opaque context.
#[derive(Clone, Copy, Debug)]
pub enum NativeBinding {
    /// A built-in identified by a small index into the environment's
    /// built-in table.
    Builtin(u16),
    /// A functional object living in the heap's object table, addressed by
    /// index.
    Object(usize),
}

/// A custom-destructible object carried by a `NativeFn` cell.
///
/// Implementors supply the mark and destroy callbacks; invocation is left
/// to the caller (the evaluator or an external collaborator) since this
/// crate does not define a calling convention for arbitrary native code.
pub trait FunctionalObject: core::fmt::Debug {
    /// Trace any cell references this object owns, by calling
    /// [`Heap::mark_reachable`] on each of them.
    fn mark(&self, heap: &mut Heap);

    /// Release any external resources. Called once, during sweep, for an
    /// unmarked object. Must not allocate — sweep is not a safe place for
    /// the destructor to grow the arena it is running inside of.
    fn destroy(&mut self) {}

    /// Recover the concrete type. Mark/destroy cover GC; callers that need
    /// to actually invoke an object (continuations, trap-points) get there
    /// by downcasting through this rather than the trait growing a
    /// do-everything `invoke` method every object kind would have to stub
    /// out.
    fn as_any(&self) -> &dyn core::any::Any;
}

/// Report returned by a collection pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectReport {
    pub size: usize,
    pub free: usize,
}

impl CollectReport {
    #[must_use]
    pub const fn reachable(self) -> usize {
        self.size - self.free
    }

    #[must_use]
    pub const fn free_percent(self) -> u32 {
        if self.size == 0 {
            100
        } else {
            (self.free as u64 * 100 / self.size as u64) as u32
        }
    }
}

/// The cell arena.
pub struct Heap {
    cells: Vec<Cell>,
    tags: Vec<Tag>,
    texts: Vec<Option<Box<str>>>,
    natives: Vec<Option<NativeBinding>>,
    functional_objects: Vec<Option<Box<dyn FunctionalObject>>>,
    marks: Vec<u8>,
    free_head: Option<usize>,
    free_count: usize,
    /// Cells whose destruction requires more than reclaiming the slot:
    /// owned text buffers and functional objects.
    specials: Vec<CellRef>,
    grow_threshold: u8,
}

impl Heap {
    /// Create a heap of `size` cells. Index 0 is NIL, permanently marked
    /// and never freed; the remainder start on the free list.
    #[must_use]
    pub fn new(size: usize, grow_threshold: u8) -> Self {
        let size = size.max(1);
        let mut heap = Self {
            cells: vec![Cell::default(); size],
            tags: vec![Tag::Free; size],
            texts: vec![None; size],
            natives: vec![None; size],
            functional_objects: Vec::new(),
            marks: vec![0; size.div_ceil(8)],
            free_head: None,
            free_count: 0,
            specials: Vec::new(),
            grow_threshold,
        };
        for idx in (1..size).rev() {
            heap.push_free(idx);
        }
        heap.tags[0] = Tag::Cons;
        heap.set_bit(0);
        heap
    }

    /// Total number of cells in the arena (free + reachable).
    #[must_use]
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// Number of cells currently on the free list.
    #[must_use]
    pub const fn free_count(&self) -> usize {
        self.free_count
    }

    /// Number of `Tag::Text` / `Tag::NativeFn`-with-object cells still
    /// awaiting a destructor call.
    #[must_use]
    pub fn specials_len(&self) -> usize {
        self.specials.len()
    }

    // --- tag and slot access -------------------------------------------------

    #[must_use]
    pub fn tag(&self, r: CellRef) -> Tag {
        self.tags[r.index()]
    }

    /// The `head` slot, with the quick-quote marker stripped. Used for
    /// ordinary list traversal.
    #[must_use]
    pub fn head(&self, r: CellRef) -> CellRef {
        self.raw_head(r).unquoted()
    }

    /// The `tail` slot, with the quick-quote marker stripped.
    #[must_use]
    pub fn tail(&self, r: CellRef) -> CellRef {
        self.raw_tail(r).unquoted()
    }

    /// The `head` slot exactly as stored, quick-quote marker included.
    /// Lambda formals carry this marker.
    #[must_use]
    pub fn raw_head(&self, r: CellRef) -> CellRef {
        CellRef::from_raw(self.cells[r.index()].a as i32)
    }

    /// The `tail` slot exactly as stored.
    #[must_use]
    pub fn raw_tail(&self, r: CellRef) -> CellRef {
        CellRef::from_raw(self.cells[r.index()].b as i32)
    }

    pub fn set_head(&mut self, r: CellRef, v: CellRef) {
        self.cells[r.index()].a = i64::from(v.raw());
    }

    pub fn set_tail(&mut self, r: CellRef, v: CellRef) {
        self.cells[r.index()].b = i64::from(v.raw());
    }

    #[must_use]
    pub fn int_value(&self, r: CellRef) -> i64 {
        self.cells[r.index()].a
    }

    #[must_use]
    pub fn float_value(&self, r: CellRef) -> f64 {
        f64::from_bits(self.cells[r.index()].a as u64)
    }

    #[must_use]
    pub fn text_value(&self, r: CellRef) -> &str {
        self.texts[r.index()].as_deref().unwrap_or("")
    }

    #[must_use]
    pub fn native_binding(&self, r: CellRef) -> Option<NativeBinding> {
        self.natives[r.index()]
    }

    /// Access a functional object's trace/destroy implementation.
    #[must_use]
    pub fn functional_object(&self, object_index: usize) -> Option<&dyn FunctionalObject> {
        self.functional_objects
            .get(object_index)
            .and_then(|slot| slot.as_deref())
    }

    // --- allocation (non-blocking) ------------------------------------------

    /// `cons`'s base case: obtain a cell from the free list and install a
    /// `CONS` pair. Returns `None` if the free list is empty; the caller
    /// is expected to GC-and-retry, then grow-and-retry.
    pub fn try_cons(&mut self, head: CellRef, tail: CellRef) -> Option<CellRef> {
        let idx = self.pop_free()?;
        self.cells[idx] = Cell {
            a: i64::from(head.raw()),
            b: i64::from(tail.raw()),
        };
        self.tags[idx] = Tag::Cons;
        Some(CellRef::new(idx as u32))
    }

    pub fn try_alloc_lambda(&mut self, formals: CellRef, body: CellRef) -> Option<CellRef> {
        let idx = self.pop_free()?;
        self.cells[idx] = Cell {
            a: i64::from(formals.quoted().raw()),
            b: i64::from(body.raw()),
        };
        self.tags[idx] = Tag::Lambda;
        Some(CellRef::new(idx as u32))
    }

    pub fn try_alloc_int(&mut self, value: i64) -> Option<CellRef> {
        let idx = self.pop_free()?;
        self.cells[idx] = Cell { a: value, b: 0 };
        self.tags[idx] = Tag::Int;
        Some(CellRef::new(idx as u32))
    }

    pub fn try_alloc_float(&mut self, value: f64) -> Option<CellRef> {
        let idx = self.pop_free()?;
        self.cells[idx] = Cell {
            a: value.to_bits() as i64,
            b: 0,
        };
        self.tags[idx] = Tag::Float;
        Some(CellRef::new(idx as u32))
    }

    /// Allocate an externally-owned wide-character buffer cell. The
    /// buffer is reclaimed by the destructor when this cell is swept
    /// unmarked, so the cell is registered on the specials list.
    pub fn try_alloc_text(&mut self, text: &str) -> Option<CellRef> {
        let idx = self.pop_free()?;
        self.cells[idx] = Cell {
            a: 0,
            b: text.len() as i64,
        };
        self.tags[idx] = Tag::Text;
        self.texts[idx] = Some(text.into());
        let r = CellRef::new(idx as u32);
        self.specials.push(r);
        Some(r)
    }

    /// Allocate a `NATIVEFN` cell. Cells carrying a functional object are
    /// registered on the specials list so `destroy` runs at collection
    /// time; plain built-in bindings need no destructor.
    pub fn try_alloc_nativefn(&mut self, binding: NativeBinding) -> Option<CellRef> {
        let idx = self.pop_free()?;
        self.cells[idx] = Cell::default();
        self.tags[idx] = Tag::NativeFn;
        self.natives[idx] = Some(binding);
        let r = CellRef::new(idx as u32);
        if matches!(binding, NativeBinding::Object(_)) {
            self.specials.push(r);
        }
        Some(r)
    }

    /// Register a functional object and return the index to wrap in a
    /// [`NativeBinding::Object`].
    pub fn register_functional_object(&mut self, object: Box<dyn FunctionalObject>) -> usize {
        if let Some(slot) = self.functional_objects.iter().position(Option::is_none) {
            self.functional_objects[slot] = Some(object);
            slot
        } else {
            self.functional_objects.push(Some(object));
            self.functional_objects.len() - 1
        }
    }

    /// Temporarily remove a functional object so a caller can downcast it
    /// and invoke a method that itself needs `&mut Heap`, without aliasing
    /// the boxed object against the heap that owns it. Pair with
    /// [`Heap::restore_functional_object`]; the same take-call-restore
    /// shape [`Heap::mark_functional_object`] uses internally.
    pub fn take_functional_object(&mut self, object_index: usize) -> Option<Box<dyn FunctionalObject>> {
        self.functional_objects.get_mut(object_index)?.take()
    }

    pub fn restore_functional_object(&mut self, object_index: usize, object: Box<dyn FunctionalObject>) {
        if let Some(slot) = self.functional_objects.get_mut(object_index) {
            *slot = Some(object);
        }
    }

    /// Allocate a `SYMBOL` cell whose value-slot initially points to
    /// itself, given an already-built plist (or `CellRef::NIL` for an
    /// anonymous symbol).
    pub fn try_alloc_symbol(&mut self, plist: CellRef) -> Option<CellRef> {
        let idx = self.pop_free()?;
        self.cells[idx] = Cell {
            a: 0,
            b: i64::from(plist.raw()),
        };
        self.tags[idx] = Tag::Symbol;
        let r = CellRef::new(idx as u32);
        self.cells[idx].a = i64::from(r.raw());
        Some(r)
    }

    /// Build the full `((hash . name-text) . NIL)` plist and wrap it in a
    /// fresh named symbol.
    pub fn try_intern_cells(&mut self, name: &str, hash: i64) -> Option<CellRef> {
        let text = self.try_alloc_text(name)?;
        let hash_cell = self.try_alloc_int(hash)?;
        let name_pair = self.try_cons(hash_cell, text)?;
        let plist = self.try_cons(name_pair, CellRef::NIL)?;
        self.try_alloc_symbol(plist)
    }

    /// Overwrite a symbol's value-slot — the mechanism behind dynamic
    /// rebinding (`pushdef`/`popdef`-style).
    pub fn set_symbol_value(&mut self, sym: CellRef, value: CellRef) {
        self.cells[sym.index()].a = i64::from(value.raw());
    }

    #[must_use]
    pub fn symbol_value(&self, sym: CellRef) -> CellRef {
        self.head(sym)
    }

    #[must_use]
    pub fn symbol_plist(&self, sym: CellRef) -> CellRef {
        self.tail(sym)
    }

    /// The name text of a named symbol, read back out of its plist
    /// (`(hash . name) . _`).
    #[must_use]
    pub fn symbol_name(&self, sym: CellRef) -> &str {
        let plist = self.symbol_plist(sym);
        if plist.is_nil() {
            return "";
        }
        let name_pair = self.head(plist);
        let name_cell = self.tail(name_pair);
        self.text_value(name_cell)
    }

    #[must_use]
    pub fn symbol_hash(&self, sym: CellRef) -> i64 {
        let plist = self.symbol_plist(sym);
        if plist.is_nil() {
            return i64::from(sym.raw());
        }
        let name_pair = self.head(plist);
        let hash_cell = self.head(name_pair);
        self.int_value(hash_cell)
    }

    // --- growth --------------------------------------------------------------

    /// Grow the arena to the smallest power of two `>= new_size`,
    /// preserving every existing cell reference — references are array
    /// indices and the array is grown in place.
    ///
    /// # Errors
    /// Returns [`GcError`] if the new size could not be allocated.
    pub fn grow_to(&mut self, new_size: usize) -> Result<(), GcError> {
        let new_size = new_size.next_power_of_two().max(self.cells.len());
        if new_size <= self.cells.len() {
            return Ok(());
        }
        let old_len = self.cells.len();
        self.cells.resize(new_size, Cell::default());
        self.tags.resize(new_size, Tag::Free);
        self.texts.resize_with(new_size, || None);
        self.natives.resize(new_size, None);
        self.marks.resize(new_size.div_ceil(8), 0);
        for idx in (old_len..new_size).rev() {
            self.push_free(idx);
        }
        tracing::debug!(old_len, new_size, "heap grown");
        Ok(())
    }

    /// The grow-heap-threshold policy: grow when the free fraction after
    /// a collection falls below `(100 - grow_threshold)%`.
    #[must_use]
    pub fn should_grow(&self, report: CollectReport) -> bool {
        u64::from(report.free_percent()) < 100 - u64::from(self.grow_threshold)
    }

    /// The smallest power-of-two target satisfying the growth formula for
    /// a collection that still needs `requested` more cells.
    #[must_use]
    pub fn grow_target(&self, report: CollectReport, requested: usize) -> usize {
        (2 * (report.size - report.free + requested)).next_power_of_two()
    }

    // --- free list -------------------------------------------------------------

    fn pop_free(&mut self) -> Option<usize> {
        let idx = self.free_head?;
        let next = self.cells[idx].b;
        self.free_head = if next < 0 { None } else { Some(next as usize) };
        self.free_count -= 1;
        Some(idx)
    }

    fn push_free(&mut self, idx: usize) {
        let next = self.free_head.map_or(-1, |h| h as i64);
        self.cells[idx] = Cell { a: 0, b: next };
        self.tags[idx] = Tag::Free;
        self.texts[idx] = None;
        self.natives[idx] = None;
        self.free_head = Some(idx);
        self.free_count += 1;
    }

    // --- marking ---------------------------------------------------------------

    fn clear_marks(&mut self) {
        self.marks.iter_mut().for_each(|b| *b = 0);
    }

    fn bit_set(&self, idx: usize) -> bool {
        self.marks[idx / 8] & (1 << (idx % 8)) != 0
    }

    fn set_bit(&mut self, idx: usize) {
        self.marks[idx / 8] |= 1 << (idx % 8);
    }

    /// Mark `root` and everything reachable from it.
    ///
    /// Iterative (explicit work stack) rather than recursive: cell graphs
    /// may be arbitrarily long lists, and named symbols are
    /// self-referential, so a naive recursive marker would both
    /// stack-overflow on long lists and loop forever on cycles.
    pub fn mark_reachable(&mut self, root: CellRef) {
        let mut work = vec![root];
        while let Some(r) = work.pop() {
            let idx = r.index();
            if idx >= self.cells.len() || self.bit_set(idx) {
                continue;
            }
            self.set_bit(idx);
            match self.tags[idx] {
                Tag::Cons | Tag::Lambda | Tag::Symbol => {
                    work.push(self.head(r));
                    work.push(self.tail(r));
                }
                Tag::NativeFn => {
                    if let Some(NativeBinding::Object(object_index)) = self.natives[idx] {
                        self.mark_functional_object(object_index);
                    }
                }
                Tag::Int | Tag::Float | Tag::Text | Tag::Free => {}
            }
        }
    }

    fn mark_functional_object(&mut self, object_index: usize) {
        let Some(slot) = self.functional_objects.get_mut(object_index) else {
            return;
        };
        if let Some(object) = slot.take() {
            object.mark(self);
            self.functional_objects[object_index] = Some(object);
        }
    }

    // --- sweep -------------------------------------------------------------------

    /// Run destructors for unmarked specials and splice them out of the
    /// list. Marked entries remain on the list.
    fn sweep_specials(&mut self) {
        let specials = core::mem::take(&mut self.specials);
        let mut survivors = Vec::with_capacity(specials.len());
        for special in specials {
            if self.bit_set(special.index()) {
                survivors.push(special);
            } else {
                self.run_destructor(special.index());
            }
        }
        self.specials = survivors;
    }

    fn run_destructor(&mut self, idx: usize) {
        match self.tags[idx] {
            Tag::Text => self.texts[idx] = None,
            Tag::NativeFn => {
                if let Some(NativeBinding::Object(object_index)) = self.natives[idx].take()
                    && let Some(slot) = self.functional_objects.get_mut(object_index)
                    && let Some(mut object) = slot.take()
                {
                    object.destroy();
                }
            }
            Tag::Cons | Tag::Lambda | Tag::Symbol | Tag::Int | Tag::Float | Tag::Free => {}
        }
    }

    /// Sweep the arena, rebuilding the free list. Processes the mark
    /// bitmap byte-at-a-time with an all-clear /
    /// all-set fast path, falling back to per-cell checks only for mixed
    /// bytes.
    fn sweep_cells(&mut self) {
        self.free_head = None;
        self.free_count = 0;
        let total = self.cells.len();
        let mut idx = 0;
        while idx + 8 <= total {
            let byte = self.marks[idx / 8];
            if byte == 0 {
                for i in idx..idx + 8 {
                    self.push_free(i);
                }
            } else if byte != 0xFF {
                for i in idx..idx + 8 {
                    if !self.bit_set(i) {
                        self.push_free(i);
                    }
                }
            }
            idx += 8;
        }
        while idx < total {
            if !self.bit_set(idx) {
                self.push_free(idx);
            }
            idx += 1;
        }
    }

    #[must_use]
    pub fn report(&self) -> CollectReport {
        CollectReport {
            size: self.size(),
            free: self.free_count(),
        }
    }
}
