//! Composition over multiple futures: `join_all` and `race`.

// Layer 1: Standard library imports
use std::io;

// Layer 2: Third-party crate imports
use futures::future::{select_all, try_join_all, FutureExt};
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use super::promise::{FluxorFuture, FutureError, Promise};

/// Resolve when every input resolves, preserving index order.
///
/// Fails fast: the first failure resolves the output with that error and the
/// remaining inputs are no longer observed.
pub fn join_all<T>(futures: Vec<FluxorFuture<T>>) -> FluxorFuture<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let promise: Promise<Vec<T>> = Promise::new();
    let output = promise.future();
    tokio::spawn(async move {
        let token = CancellationToken::new();
        let awaits = futures
            .iter()
            .map(|f| f.await_ready(&token))
            .collect::<Vec<_>>();
        match try_join_all(awaits).await {
            Ok(values) => {
                promise.complete(values);
            }
            Err(FutureError::Failed(e)) => {
                promise.fail_shared(e);
            }
            Err(FutureError::Cancelled) => {}
        }
    });
    output
}

/// Resolve with the first input to resolve, value or error.
///
/// An empty input set resolves immediately with an error.
pub fn race<T>(futures: Vec<FluxorFuture<T>>) -> FluxorFuture<T>
where
    T: Clone + Send + Sync + 'static,
{
    let promise: Promise<T> = Promise::new();
    let output = promise.future();
    if futures.is_empty() {
        promise.fail(io::Error::other("race over an empty set of futures"));
        return output;
    }
    tokio::spawn(async move {
        let token = CancellationToken::new();
        let awaits = futures
            .iter()
            .map(|f| f.await_ready(&token).boxed())
            .collect::<Vec<_>>();
        let (first, _index, _rest) = select_all(awaits).await;
        match first {
            Ok(value) => {
                promise.complete(value);
            }
            Err(FutureError::Failed(e)) => {
                promise.fail_shared(e);
            }
            Err(FutureError::Cancelled) => {}
        }
    });
    output
}
