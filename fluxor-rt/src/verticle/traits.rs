// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use crate::context::FluxorContext;
use crate::future::Promise;

/// Boxed error type carried across the verticle boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A deployable unit with a start/stop lifecycle.
///
/// The runtime calls `start` during deployment with a freshly injected
/// [`FluxorContext`]; an error marks the deployment `Failed` and surfaces to
/// the deployer. `stop` runs during undeploy under a bounded deadline and
/// receives a context whose token is already cancelled when the whole
/// runtime is closing.
///
/// # Example
///
/// ```rust,ignore
/// use fluxor_rt::prelude::*;
/// use async_trait::async_trait;
///
/// struct Worker;
///
/// #[async_trait]
/// impl Verticle for Worker {
///     fn name(&self) -> &str {
///         "worker"
///     }
///
///     async fn start(&mut self, ctx: FluxorContext) -> Result<(), BoxError> {
///         let consumer = ctx.consumer("work.items")?;
///         consumer.handler(|delivery| async move {
///             let _ = delivery.reply(serde_json::json!({"done": true})).await;
///         });
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Verticle: Send + 'static {
    /// Human-readable name used in logs and deployment records.
    fn name(&self) -> &str {
        "verticle"
    }

    /// Bring the verticle up. Runs once per deployment.
    async fn start(&mut self, ctx: FluxorContext) -> Result<(), BoxError>;

    /// Tear the verticle down. Runs once per undeploy.
    async fn stop(&mut self, _ctx: FluxorContext) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Callback-style verticle: start/stop signal completion through a promise.
///
/// Wrap with [`AsyncAdapter`] to deploy; the runtime awaits the promise
/// (bounded by the spawn timeout) before marking the deployment running.
#[async_trait]
pub trait AsyncVerticle: Send + 'static {
    /// Human-readable name used in logs and deployment records.
    fn name(&self) -> &str {
        "verticle"
    }

    /// Begin startup; complete (or fail) `done` when ready.
    async fn start_async(&mut self, ctx: FluxorContext, done: Promise<()>);

    /// Begin shutdown; complete `done` when finished.
    async fn stop_async(&mut self, _ctx: FluxorContext, done: Promise<()>) {
        done.complete(());
    }
}

/// Adapts an [`AsyncVerticle`] to the plain [`Verticle`] contract.
pub struct AsyncAdapter<V> {
    inner: V,
}

impl<V: AsyncVerticle> AsyncAdapter<V> {
    /// Wrap a callback-style verticle.
    pub fn new(inner: V) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<V: AsyncVerticle> Verticle for AsyncAdapter<V> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn start(&mut self, ctx: FluxorContext) -> Result<(), BoxError> {
        let done: Promise<()> = Promise::new();
        let ready = done.future();
        self.inner.start_async(ctx.clone(), done).await;
        ready
            .await_ready(ctx.token())
            .await
            .map_err(|e| Box::new(e) as BoxError)
    }

    async fn stop(&mut self, ctx: FluxorContext) -> Result<(), BoxError> {
        let done: Promise<()> = Promise::new();
        let finished = done.future();
        self.inner.stop_async(ctx.clone(), done).await;
        // Undeploy may hand us an already-cancelled token; still give the
        // completion callback a chance to resolve first.
        match finished.try_result() {
            Some(result) => result.map_err(|e| Box::new(e) as BoxError),
            None => finished
                .await_ready(ctx.token())
                .await
                .map_err(|e| Box::new(e) as BoxError),
        }
    }
}
