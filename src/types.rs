// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Core type definitions for the Lona runtime.
//!
//! This module provides a type-safe wrapper around cell references. Using a
//! newtype prevents mixing a raw heap index with an arbitrary `i32` and
//! keeps the quick-quote sign-bit convention in one place rather than
//! scattered across every call site that negates an index.


use core::fmt;

/// A reference to a cell in the heap arena: a signed index.
///
/// The sign bit is the "quick-quote" marker: a negative value
/// refers to the same cell as its absolute value, but flags that the
/// reference should be treated as self-evaluating (used by lambda formals).
/// Index 0 is the permanent NIL cell and is never negative.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CellRef(i32);

impl CellRef {
    /// The permanent NIL cell reference (heap index 0).
    pub const NIL: Self = Self(0);

    /// Build a reference from an unsigned heap index (never quoted).
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index as i32)
    }

    /// Reconstruct a reference from a raw signed value previously obtained
    /// via [`CellRef::raw`] — used when reading a cell slot straight out of
    /// the arena, quick-quote bit included.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw signed representation, quick-quote bit included, for
    /// storing directly into a cell slot.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// The underlying heap array index, with the quick-quote bit stripped.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0.unsigned_abs() as usize
    }

    /// Whether this reference carries the quick-quote marker.
    #[must_use]
    pub const fn is_quoted(self) -> bool {
        self.0 < 0
    }

    /// Return the same cell reference with the quick-quote marker set.
    ///
    /// NIL is never quoted: quoting index 0 would be indistinguishable from
    /// an unquoted NIL, since `-0 == 0`.
    #[must_use]
    pub const fn quoted(self) -> Self {
        if self.index() == 0 {
            self
        } else {
            Self(-(self.index() as i32))
        }
    }

    /// Return the same cell reference with the quick-quote marker cleared.
    #[must_use]
    pub const fn unquoted(self) -> Self {
        Self(self.index() as i32)
    }

    /// Whether this reference is the permanent NIL cell.
    #[must_use]
    pub const fn is_nil(self) -> bool {
        self.index() == 0
    }
}

impl fmt::Debug for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_quoted() {
            write!(f, "CellRef(#{}, quoted)", self.index())
        } else {
            write!(f, "CellRef(#{})", self.index())
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index())
    }
}

/// Identifier for a process within one environment.
///
/// Stable across the process's lifetime, even after it leaves the
/// scheduling ring (e.g. for reporting after `kill`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ProcessId(pub u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid:{}", self.0)
    }
}
