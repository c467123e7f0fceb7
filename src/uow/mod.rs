//! # Unit of Work
//!
//! A [`UnitOfWork`] is the transactional boundary around one message receive:
//! reliability-layer writes (outbox rows, inbox entries, saga state) and any
//! business-state changes enlisted by the handler commit or roll back
//! together.
//!
//! Stores stage their mutations by enlisting apply operations; nothing
//! becomes visible until [`UnitOfWork::commit`] runs the staged operations in
//! enlistment order. [`UnitOfWork::rollback`] discards them, which is what
//! guarantees that a failed or cancelled receive leaves no partial outbox or
//! inbox writes behind.
//!
//! Durable backends enlist their own database transaction through the same
//! shape; the in-process staging here is the reference implementation used by
//! the in-memory stores.

use parking_lot::Mutex;
use thiserror::Error;

/// Errors from unit-of-work lifecycle operations.
#[derive(Debug, Error)]
pub enum UowError {
    #[error("unit of work is no longer active (status: {0})")]
    NotActive(UowStatus),
}

/// Lifecycle status of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UowStatus {
    Active,
    Committed,
    RolledBack,
}

impl std::fmt::Display for UowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UowStatus::Active => write!(f, "active"),
            UowStatus::Committed => write!(f, "committed"),
            UowStatus::RolledBack => write!(f, "rolled back"),
        }
    }
}

type ApplyOp = Box<dyn FnOnce() + Send>;

/// Transactional scope for one receive operation.
///
/// Enlisted operations run on commit, in enlistment order, exactly once.
pub struct UnitOfWork {
    ops: Mutex<Vec<ApplyOp>>,
    status: Mutex<UowStatus>,
}

impl Default for UnitOfWork {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitOfWork {
    /// Begin a new, active unit of work.
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            status: Mutex::new(UowStatus::Active),
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> UowStatus {
        *self.status.lock()
    }

    /// Stage an operation to run at commit time.
    pub fn enlist(&self, op: impl FnOnce() + Send + 'static) -> Result<(), UowError> {
        let status = *self.status.lock();
        if status != UowStatus::Active {
            return Err(UowError::NotActive(status));
        }
        self.ops.lock().push(Box::new(op));
        Ok(())
    }

    /// Apply all staged operations and seal the unit of work.
    ///
    /// Returns the number of operations applied.
    pub fn commit(&self) -> Result<usize, UowError> {
        {
            let mut status = self.status.lock();
            if *status != UowStatus::Active {
                return Err(UowError::NotActive(*status));
            }
            *status = UowStatus::Committed;
        }
        let ops = std::mem::take(&mut *self.ops.lock());
        let applied = ops.len();
        for op in ops {
            op();
        }
        Ok(applied)
    }

    /// Discard all staged operations and seal the unit of work.
    ///
    /// Returns the number of operations discarded.
    pub fn rollback(&self) -> Result<usize, UowError> {
        {
            let mut status = self.status.lock();
            if *status != UowStatus::Active {
                return Err(UowError::NotActive(*status));
            }
            *status = UowStatus::RolledBack;
        }
        let discarded = self.ops.lock().len();
        self.ops.lock().clear();
        Ok(discarded)
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("status", &self.status())
            .field("staged_ops", &self.ops.lock().len())
            .finish()
    }
}
