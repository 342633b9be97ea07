//! Once-guarded lazy resource.
//!
//! A [`tokio::sync::OnceCell`] that also counts successful constructions, so
//! callers can observe that concurrent first access built the value once.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::OnceCell;

#[derive(Debug)]
pub struct OnceResource<T> {
    cell: OnceCell<T>,
    constructions: AtomicUsize,
}

impl<T> OnceResource<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
            constructions: AtomicUsize::new(0),
        }
    }

    /// The value, if it has been constructed.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Get the value, running `init` if nobody has built it yet.
    ///
    /// Concurrent callers wait for the one running `init`. If `init` fails the
    /// error goes to that caller only and the next call tries again.
    pub async fn get_or_try_init<E, F, Fut>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cell
            .get_or_try_init(|| async {
                let value = init().await?;
                self.constructions.fetch_add(1, Ordering::SeqCst);
                Ok::<T, E>(value)
            })
            .await
    }

    /// Number of times the value has been constructed.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

impl<T> Default for OnceResource<T> {
    fn default() -> Self {
        Self::new()
    }
}
