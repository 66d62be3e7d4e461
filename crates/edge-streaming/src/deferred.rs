//! Deferred values embedded in a render tree.

use std::fmt;
use std::future::{Future, IntoFuture};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::Instrument;

use crate::error::ComponentError;

type SharedResult<T> = Shared<BoxFuture<'static, Result<T, ComponentError>>>;

/// A value that is still being computed when rendering starts.
///
/// Only the boundary that awaits it waits for it; the rest of the tree renders
/// straight away. Clones share the same computation and result.
pub struct Deferred<T> {
    inner: SharedResult<T>,
}

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start `work` on the runtime now, like a promise created in a loader.
    pub fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = Result<T, ComponentError>> + Send + 'static,
    {
        let handle = tokio::spawn(work.in_current_span());
        Self::lazy(async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(ComponentError::msg(format!("deferred task did not finish: {e}"))),
            }
        })
    }

    /// Run `work` only once a consumer awaits it.
    pub fn lazy<F>(work: F) -> Self
    where
        F: Future<Output = Result<T, ComponentError>> + Send + 'static,
    {
        Self {
            inner: work.boxed().shared(),
        }
    }

    /// An already resolved value.
    pub fn ready(value: T) -> Self {
        Self::lazy(std::future::ready(Ok(value)))
    }

    /// An already failed value.
    pub fn failed(err: impl Into<ComponentError>) -> Self {
        Self::lazy(std::future::ready(Err(err.into())))
    }

    /// The settled result, if a consumer has already driven it to completion.
    pub fn peek(&self) -> Option<Result<T, ComponentError>> {
        self.inner.peek().cloned()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> IntoFuture for Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Result<T, ComponentError>;
    type IntoFuture = SharedResult<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.inner
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}
