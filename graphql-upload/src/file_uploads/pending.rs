use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::upload::ResolvedFile;
use super::upload::UploadRejection;

/// The state of a [`PendingUpload`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadState {
    /// The file is still being checked.
    Pending,
    /// The file was accepted.
    Resolved(ResolvedFile),
    /// The file was refused.
    Rejected(UploadRejection),
}

impl UploadState {
    pub fn is_pending(&self) -> bool {
        matches!(self, UploadState::Pending)
    }
}

struct Inner {
    state: Mutex<UploadState>,
    settled: Notify,
}

/// A file that will become available, or fail, while the request is processed.
///
/// The placeholder is put into the operation variables before the file is checked, so every
/// variable path referencing the same file shares one cell. Clones share state.
///
/// The cell settles exactly once: after [`PendingUpload::resolve`] or
/// [`PendingUpload::reject`] took effect, further calls return `false` and change nothing.
#[derive(Clone)]
pub struct PendingUpload {
    inner: Arc<Inner>,
}

impl Default for PendingUpload {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingUpload {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(UploadState::Pending),
                settled: Notify::new(),
            }),
        }
    }

    /// Settles the cell with an accepted file. Returns `false` if it was already settled.
    pub fn resolve(&self, file: ResolvedFile) -> bool {
        self.settle(UploadState::Resolved(file))
    }

    /// Settles the cell with a rejection. Returns `false` if it was already settled.
    pub fn reject(&self, rejection: UploadRejection) -> bool {
        self.settle(UploadState::Rejected(rejection))
    }

    fn settle(&self, outcome: UploadState) -> bool {
        {
            let mut state = self.inner.state.lock();
            if !state.is_pending() {
                return false;
            }
            *state = outcome;
        }
        self.inner.settled.notify_waiters();
        true
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> UploadState {
        self.inner.state.lock().clone()
    }

    pub fn is_settled(&self) -> bool {
        !self.inner.state.lock().is_pending()
    }

    /// Waits until the cell is settled. Only the calling task is suspended.
    pub async fn wait(&self) -> Result<ResolvedFile, UploadRejection> {
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            // Register before looking at the state so that a concurrent settlement
            // cannot slip between the check and the await.
            notified.as_mut().enable();

            match self.state() {
                UploadState::Pending => notified.await,
                UploadState::Resolved(file) => return Ok(file),
                UploadState::Rejected(rejection) => return Err(rejection),
            }
        }
    }

    /// Returns `true` if both handles point to the same cell.
    pub fn ptr_eq(&self, other: &PendingUpload) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for PendingUpload {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for PendingUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PendingUpload")
            .field(&*self.inner.state.lock())
            .finish()
    }
}
