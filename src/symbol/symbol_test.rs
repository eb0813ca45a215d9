// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the symbol table's bucket mechanics.

use super::{SymbolTable, hash_name};
use crate::heap::Heap;

#[test]
fn bucket_index_handles_negative_hash() {
    let table = SymbolTable::new(4);
    // -1 % 4 == -1 in Rust; (-1 + 4) % 4 == 3.
    assert_eq!(table.bucket_index(-1), 3);
    assert_eq!(table.bucket_index(4), 0);
    assert_eq!(table.bucket_index(5), 1);
}

#[test]
fn same_name_hashes_identically() {
    assert_eq!(hash_name("foo"), hash_name("foo"));
    assert_ne!(hash_name("foo"), hash_name("bar"));
}

#[test]
fn insert_and_find_round_trip() {
    let mut heap = Heap::new(32, crate::heap::DEFAULT_GROW_THRESHOLD);
    let mut table = SymbolTable::new(4);

    let hash = hash_name("foo");
    let bucket = table.bucket_index(hash);
    let sym = heap.try_intern_cells("foo", hash).unwrap();
    table.insert(bucket, sym);
    table.reserve_local_index(sym);

    assert_eq!(table.find(&heap, bucket, "foo"), Some(sym));
    assert_eq!(table.find(&heap, bucket, "bar"), None);
    assert_eq!(table.local_index(sym), Some(0));
}

#[test]
fn local_indices_are_assigned_in_order() {
    let mut heap = Heap::new(64, crate::heap::DEFAULT_GROW_THRESHOLD);
    let mut table = SymbolTable::new(4);

    for name in ["a", "b", "c"] {
        let hash = hash_name(name);
        let bucket = table.bucket_index(hash);
        let sym = heap.try_intern_cells(name, hash).unwrap();
        table.insert(bucket, sym);
        table.reserve_local_index(sym);
    }

    assert_eq!(table.symbols_allocated(), 3);
    assert_eq!(table.all_symbols().count(), 3);
}
