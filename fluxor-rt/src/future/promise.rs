// Layer 1: Standard library imports
use std::error::Error;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
// (none)

/// Shared error handle; cloned into every awaiting future.
pub type SharedError = Arc<dyn Error + Send + Sync>;

/// Error surfaced when awaiting a [`FluxorFuture`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum FutureError {
    /// The promise was failed
    #[error("{0}")]
    Failed(SharedError),

    /// The caller's cancellation token fired while waiting
    #[error("await cancelled")]
    Cancelled,
}

struct Shared<T> {
    state: Mutex<Option<Result<T, SharedError>>>,
    done: AtomicBool,
    notify: Notify,
}

/// Write side of a one-shot result.
///
/// `complete` and `fail` are one-shot: the first call resolves the promise,
/// subsequent calls are observable no-ops (they return `false`).
///
/// # Example
///
/// ```rust
/// use fluxor_rt::future::Promise;
///
/// let promise: Promise<u32> = Promise::new();
/// let future = promise.future();
/// assert!(promise.complete(7));
/// assert!(!promise.complete(8)); // no-op
/// ```
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

/// Read side of a one-shot result.
pub struct FluxorFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Clone for FluxorFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    /// Create an unresolved promise.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(None),
                done: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// The future observing this promise. May be called any number of times.
    pub fn future(&self) -> FluxorFuture<T> {
        FluxorFuture {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Resolve with a value. Returns `false` if already resolved.
    pub fn complete(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolve with an error. Returns `false` if already resolved.
    pub fn fail(&self, error: impl Error + Send + Sync + 'static) -> bool {
        self.resolve(Err(Arc::new(error)))
    }

    /// Resolve with an already-shared error.
    pub fn fail_shared(&self, error: SharedError) -> bool {
        self.resolve(Err(error))
    }

    /// True once resolved (either way).
    pub fn is_complete(&self) -> bool {
        self.shared.done.load(Ordering::Acquire)
    }

    fn resolve(&self, result: Result<T, SharedError>) -> bool {
        {
            let mut state = self.shared.state.lock();
            if state.is_some() {
                return false;
            }
            *state = Some(result);
        }
        self.shared.done.store(true, Ordering::Release);
        self.shared.notify.notify_waiters();
        true
    }
}

impl<T: Clone> FluxorFuture<T> {
    /// Await resolution.
    ///
    /// Returns immediately if already resolved; otherwise parks until the
    /// promise resolves or `token` fires.
    pub async fn await_ready(&self, token: &CancellationToken) -> Result<T, FutureError> {
        loop {
            let mut notified = pin!(self.shared.notify.notified());
            notified.as_mut().enable();

            if let Some(result) = self.try_result() {
                return result;
            }

            tokio::select! {
                _ = notified.as_mut() => {}
                _ = token.cancelled() => return Err(FutureError::Cancelled),
            }
        }
    }

    /// Non-blocking poll of the result. `None` while unresolved.
    pub fn try_result(&self) -> Option<Result<T, FutureError>> {
        if !self.shared.done.load(Ordering::Acquire) {
            return None;
        }
        let state = self.shared.state.lock();
        state.as_ref().map(|result| {
            result
                .as_ref()
                .map(T::clone)
                .map_err(|e| FutureError::Failed(Arc::clone(e)))
        })
    }

    /// True once resolved.
    pub fn is_complete(&self) -> bool {
        self.shared.done.load(Ordering::Acquire)
    }
}

impl<T: Clone + Send + Sync + 'static> FluxorFuture<T> {
    /// Transform the success value.
    pub fn map<U, F>(&self, f: F) -> FluxorFuture<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let source = self.clone();
        let promise: Promise<U> = Promise::new();
        let future = promise.future();
        tokio::spawn(async move {
            let token = CancellationToken::new();
            match source.await_ready(&token).await {
                Ok(value) => {
                    promise.complete(f(value));
                }
                Err(FutureError::Failed(e)) => {
                    promise.fail_shared(e);
                }
                Err(FutureError::Cancelled) => {}
            }
        });
        future
    }

    /// Chain another asynchronous stage onto the success value.
    pub fn then<U, F>(&self, f: F) -> FluxorFuture<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> FluxorFuture<U> + Send + 'static,
    {
        let source = self.clone();
        let promise: Promise<U> = Promise::new();
        let future = promise.future();
        tokio::spawn(async move {
            let token = CancellationToken::new();
            match source.await_ready(&token).await {
                Ok(value) => {
                    let next = f(value);
                    match next.await_ready(&token).await {
                        Ok(value) => {
                            promise.complete(value);
                        }
                        Err(FutureError::Failed(e)) => {
                            promise.fail_shared(e);
                        }
                        Err(FutureError::Cancelled) => {}
                    }
                }
                Err(FutureError::Failed(e)) => {
                    promise.fail_shared(e);
                }
                Err(FutureError::Cancelled) => {}
            }
        });
        future
    }

    /// Map a failure back into a value.
    pub fn recover<F>(&self, f: F) -> FluxorFuture<T>
    where
        F: FnOnce(FutureError) -> T + Send + 'static,
    {
        let source = self.clone();
        let promise: Promise<T> = Promise::new();
        let future = promise.future();
        tokio::spawn(async move {
            let token = CancellationToken::new();
            match source.await_ready(&token).await {
                Ok(value) => {
                    promise.complete(value);
                }
                Err(err) => {
                    promise.complete(f(err));
                }
            }
        });
        future
    }
}
