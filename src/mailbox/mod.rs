// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Per-process mailbox.
//!
//! A process's mailbox is a FIFO of pending messages. A `VecDeque` gives
//! O(1) push-back/pop-front directly, where a cons-cell-based queue would
//! need to maintain its own tail pointer by hand for the same bound.


use std::collections::VecDeque;

use crate::types::CellRef;

/// A receive pattern. The evaluator (external to this crate)
/// is responsible for building real structural patterns out of user
/// syntax; this runtime core only needs enough to decide match-or-not
/// and to extract the matched message.
#[derive(Clone, Copy, Debug)]
pub enum Pattern {
    /// Matches any message.
    Any,
    /// Matches only a message that is reference-equal to this cell.
    Exact(CellRef),
}

impl Pattern {
    #[must_use]
    pub fn matches(&self, message: CellRef) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => *expected == message,
        }
    }
}

/// Per-process FIFO of pending messages, each already built as
/// `(sender-pid . args)` by [`crate::process::send`].
#[derive(Default)]
pub struct Mailbox {
    queue: VecDeque<CellRef>,
}

impl Mailbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message; appending is O(1).
    pub fn push(&mut self, message: CellRef) {
        self.queue.push_back(message);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Scan for the first message matching any of `patterns`, removing
    /// and returning it. Earlier unmatched messages are left in place,
    /// preserving FIFO order for the next `receive`.
    pub fn take_matching(&mut self, patterns: &[Pattern]) -> Option<CellRef> {
        let position = self
            .queue
            .iter()
            .position(|&message| patterns.iter().any(|p| p.matches(message)))?;
        self.queue.remove(position)
    }

    /// GC roots: every cell reachable from a still-pending message.
    pub fn gc_roots(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.queue.iter().copied()
    }
}
