// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Symbol interning table.
//!
//! The table only owns the bucket structure and the local-index counter;
//! it does not itself build `SYMBOL` cells (that needs the heap) nor
//! update every process's locals array on a first intern (that needs the
//! process ring). Both of those live in [`crate::env::Environment`],
//! which composes this table with [`crate::heap::Heap`] and the process
//! ring to implement the full `intern` contract.

#[cfg(test)]
mod symbol_test;

use std::collections::HashMap;

use crate::heap::Heap;
use crate::types::CellRef;

/// Hash a symbol name the same way for bucket lookup and for the
/// `(hash . name)` pair stored in a named symbol's plist.
///
/// FNV-1a over the UTF-8 bytes, folded into a signed 64-bit value so it
/// can live in an `INT` cell slot directly.
#[must_use]
pub fn hash_name(name: &str) -> i64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash as i64
}

/// Hashed-bucket symbol table. Anonymous symbols are never placed in any
/// bucket here.
pub struct SymbolTable {
    buckets: Vec<Vec<CellRef>>,
    local_indices: HashMap<CellRef, usize>,
    next_local_index: usize,
    symbols_allocated: usize,
}

impl SymbolTable {
    /// `bucket_count` seeds the initial table size (the configured
    /// `max-symbols`); buckets are allowed to grow long rather than
    /// refuse interning past this count (see DESIGN.md).
    #[must_use]
    pub fn new(bucket_count: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); bucket_count.max(1)],
            local_indices: HashMap::new(),
            next_local_index: 0,
            symbols_allocated: 0,
        }
    }

    /// `((hash % size) + size) % size`, so a negative hash still lands in
    /// range.
    #[must_use]
    pub fn bucket_index(&self, hash: i64) -> usize {
        let size = self.buckets.len() as i64;
        (((hash % size) + size) % size) as usize
    }

    /// Linear-search a bucket for a symbol whose stored name matches
    /// `name`.
    #[must_use]
    pub fn find(&self, heap: &Heap, bucket: usize, name: &str) -> Option<CellRef> {
        self.buckets[bucket]
            .iter()
            .copied()
            .find(|&sym| heap.symbol_name(sym) == name)
    }

    /// Reserve the next local index for a newly interned symbol.
    pub fn reserve_local_index(&mut self, sym: CellRef) -> usize {
        let index = self.next_local_index;
        self.next_local_index += 1;
        self.local_indices.insert(sym, index);
        index
    }

    #[must_use]
    pub fn local_index(&self, sym: CellRef) -> Option<usize> {
        self.local_indices.get(&sym).copied()
    }

    /// Prepend a newly-allocated symbol to its bucket.
    pub fn insert(&mut self, bucket: usize, sym: CellRef) {
        self.buckets[bucket].insert(0, sym);
        self.symbols_allocated += 1;
    }

    #[must_use]
    pub fn symbols_allocated(&self) -> usize {
        self.symbols_allocated
    }

    /// Every interned symbol, used as GC roots.
    pub fn all_symbols(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.buckets.iter().flatten().copied()
    }
}
