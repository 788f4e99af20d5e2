//! Error types for the Muster service dispatcher.
//!
//! Organized by subsystem: the host boundary, snapshot validation, the
//! bucket scanner, the dispatch pass, and the tick engine that wraps
//! the latter two. Transient per-object problems never escape the
//! keepers; only scanner desynchronization and host unavailability are
//! surfaced as tick failures.

use std::error::Error;
use std::fmt;

use crate::category::Category;
use crate::id::TickId;

/// Errors reported by a [`Host`](crate::Host) implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostError {
    /// The object exists but its data cannot be interpreted this tick
    /// (missing type info, inconsistent fields).
    Malformed {
        /// Host-supplied description.
        reason: String,
    },
    /// The host refused a write-back.
    Rejected {
        /// Host-supplied description.
        reason: String,
    },
    /// The host cannot be queried at all (world unloading, level change).
    Unavailable,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed host object: {reason}"),
            Self::Rejected { reason } => write!(f, "host rejected write: {reason}"),
            Self::Unavailable => write!(f, "host unavailable"),
        }
    }
}

impl Error for HostError {}

/// Structural problems found in a host snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum SnapshotError {
    /// A position component is NaN or infinite.
    NonFinitePosition,
    /// A provider range is NaN, infinite, or negative.
    NonFiniteRange {
        /// The offending raw range.
        value: f32,
    },
    /// A unit load fraction is NaN or infinite.
    NonFiniteLoad {
        /// The offending fraction.
        value: f32,
    },
    /// Two conditions name the same category.
    DuplicateCondition {
        /// The repeated category.
        category: Category,
    },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinitePosition => write!(f, "position is not finite"),
            Self::NonFiniteRange { value } => {
                write!(f, "provider range must be finite and >= 0, got {value}")
            }
            Self::NonFiniteLoad { value } => {
                write!(f, "unit load fraction must be finite, got {value}")
            }
            Self::DuplicateCondition { category } => {
                write!(f, "duplicate {category} condition")
            }
        }
    }
}

impl Error for SnapshotError {}

/// Fatal errors from the bucket scanner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanError {
    /// The catch-up loop ran past its iteration cap without reaching the
    /// due bucket. The cursor state or the tick counter is corrupt.
    Desynchronized {
        /// Iterations performed before aborting.
        iterations: u32,
        /// The cap that was exceeded.
        limit: u32,
    },
    /// The host tick counter went backwards.
    TickRegressed {
        /// Last tick the engine processed.
        previous: TickId,
        /// Tick the host reported now.
        current: TickId,
    },
    /// The host could not be read; the scan was abandoned mid-way.
    Host(HostError),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Desynchronized { iterations, limit } => write!(
                f,
                "scanner desynchronized: {iterations} bucket iterations exceeded limit {limit}"
            ),
            Self::TickRegressed { previous, current } => {
                write!(f, "tick counter regressed from {previous} to {current}")
            }
            Self::Host(e) => write!(f, "scan aborted: {e}"),
        }
    }
}

impl Error for ScanError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Host(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HostError> for ScanError {
    fn from(e: HostError) -> Self {
        Self::Host(e)
    }
}

/// Fatal errors from one category's dispatch pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchError {
    /// The provider walk exceeded its hard iteration guard.
    IterationLimit {
        /// The guard that was exceeded.
        limit: u64,
    },
    /// The host became unavailable during the pass.
    Host(HostError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IterationLimit { limit } => {
                write!(f, "dispatch pass exceeded iteration limit {limit}")
            }
            Self::Host(e) => write!(f, "dispatch aborted: {e}"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Host(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HostError> for DispatchError {
    fn from(e: HostError) -> Self {
        Self::Host(e)
    }
}

/// Top-level failure of one engine tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// The scan failed fatally; no dispatch ran this tick.
    Scan(ScanError),
    /// One or more categories failed their dispatch pass. Other
    /// categories ran normally.
    Dispatch {
        /// Failing categories and their errors, in dispatch order.
        failures: Vec<(Category, DispatchError)>,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan(e) => write!(f, "{e}"),
            Self::Dispatch { failures } => {
                write!(f, "dispatch failed for {} categor", failures.len())?;
                f.write_str(if failures.len() == 1 { "y" } else { "ies" })?;
                for (category, e) in failures {
                    write!(f, "; {category}: {e}")?;
                }
                Ok(())
            }
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Scan(e) => Some(e),
            Self::Dispatch { failures } => failures.first().map(|(_, e)| e as &(dyn Error + 'static)),
        }
    }
}

impl From<ScanError> for EngineError {
    fn from(e: ScanError) -> Self {
        Self::Scan(e)
    }
}
