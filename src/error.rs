// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Error kinds for the runtime core.
//!
//! These distinguish error *kinds*, not types: out-of-memory is fatal,
//! invalid-argument/assertion are contract violations, user-raised errors
//! are handled through the resume-point mechanism (`exception` module) and
//! never surface here, and I/O errors are a port concern external to this
//! crate. `RuntimeError` covers everything this crate's own API can fail
//! with; `GcError` is the narrower fatal case raised when heap growth
//! itself fails.

use crate::types::{CellRef, ProcessId};

/// Errors returned by the runtime core's public API.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Heap growth failed while trying to satisfy an allocation. Fatal:
    /// the environment should be torn down.
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] GcError),

    /// A built-in's contract was violated by its caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// An internal invariant did not hold. In the diagnostic profile this
    /// is reported (via `tracing`) rather than treated as fatal; see
    /// [`RuntimeError::is_recoverable`].
    #[error("assertion failed: {0}")]
    Assertion(&'static str),

    /// The symbol table has no room for another bucket entry and the
    /// caller asked for `max-symbols` to be a hard cap (see DESIGN.md).
    #[error("symbol table is full ({0} symbols interned)")]
    SymbolTableFull(usize),

    /// A lambda or native function was applied to the wrong number of
    /// arguments.
    #[error("arity mismatch: expected {expected}, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    /// A `raise` found no matching handler at any enclosing `try`. The
    /// raising process is killed after this is reported.
    #[error("unhandled exception raised with arguments {0:?}")]
    UnhandledException(CellRef),

    /// A continuation was invoked from a process other than the one that
    /// captured it; this is never allowed (see DESIGN.md).
    #[error("continuation captured by {captured_by} invoked from {invoked_from}")]
    CrossProcessContinuation {
        captured_by: ProcessId,
        invoked_from: ProcessId,
    },

    /// An operation referenced a process id the scheduler does not know
    /// about (already reaped, or never created).
    #[error("unknown process {0}")]
    UnknownProcess(ProcessId),

    /// An API call that requires a current process (e.g. `callcc`,
    /// `raise`) was made with none running.
    #[error("no current process")]
    NoCurrentProcess,
}

impl RuntimeError {
    /// Whether the shipping profile should report-and-continue rather than
    /// abort. Only assertions are ever recoverable; everything else is
    /// either a hard contract violation or fatal.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Assertion(_) | Self::InvalidArgument(_))
    }
}

/// Heap-growth failure: the arena could not be resized to satisfy a
/// request for `requested` additional cells. Growth failure always
/// surfaces as a fatal error.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("heap growth failed while trying to satisfy a request for {requested} free cells")]
pub struct GcError {
    pub requested: usize,
}
