//! Open file descriptors handed out to remote callers.

use dashmap::DashMap;
use std::fs::File;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use super::error::{HostError, HostResult};

/// First descriptor handed out; 0-2 belong to stdio.
const FIRST_FD: i32 = 3;

/// Maps numeric descriptors to open files.
///
/// Descriptors are never reused while the table lives, so a stale number
/// from a closed file cannot alias a newer one.
#[derive(Debug)]
pub struct FdTable {
    files: DashMap<i32, Arc<File>>,
    next: AtomicI32,
}

impl Default for FdTable {
    fn default() -> Self {
        Self {
            files: DashMap::new(),
            next: AtomicI32::new(FIRST_FD),
        }
    }
}

impl FdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open file and return its descriptor.
    pub fn insert(&self, file: File) -> i32 {
        let fd = self.next.fetch_add(1, Ordering::Relaxed);
        self.files.insert(fd, Arc::new(file));
        fd
    }

    /// Look up a descriptor for `syscall`.
    pub fn get(&self, fd: i64, syscall: &'static str) -> HostResult<Arc<File>> {
        i32::try_from(fd)
            .ok()
            .and_then(|key| self.files.get(&key).map(|f| Arc::clone(f.value())))
            .ok_or(HostError::BadDescriptor { fd, syscall })
    }

    /// Drop a descriptor. The file closes once in-flight users release it.
    pub fn remove(&self, fd: i64) -> HostResult<()> {
        i32::try_from(fd)
            .ok()
            .and_then(|key| self.files.remove(&key))
            .map(|_| ())
            .ok_or(HostError::BadDescriptor {
                fd,
                syscall: "close",
            })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
