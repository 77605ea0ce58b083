// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::{Arc, Weak};

// Layer 2: Third-party crate imports
use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use super::deployment::{Deployment, DeploymentState};
use super::errors::DeployError;
use super::options::VertxOptions;
use crate::bus::{EventBus, LocalBus};
use crate::config::ConfigMap;
use crate::context::FluxorContext;
use crate::executor::WorkerPool;
use crate::util::DeploymentId;
use crate::verticle::Verticle;

/// The runtime: owns the event bus, the shared worker pool, the root
/// cancellation scope, and the deployment registry.
///
/// Cheap to clone; all clones share the same runtime. There is no global
/// state anywhere in the crate, so multiple runtimes can coexist in one
/// process (tests rely on this).
///
/// # Example
///
/// ```rust,ignore
/// use fluxor_rt::runtime::{Vertx, VertxOptions};
///
/// let vertx = Vertx::new(VertxOptions::default());
/// let id = vertx.deploy(MyVerticle::default()).await?;
/// vertx.undeploy(id).await?;
/// vertx.close().await?;
/// ```
#[derive(Clone)]
pub struct Vertx {
    inner: Arc<VertxInner>,
}

pub(crate) struct VertxInner {
    options: VertxOptions,
    bus: Arc<dyn EventBus>,
    executor: Arc<WorkerPool>,
    root_token: CancellationToken,
    deployments: Mutex<DeploymentTable>,
}

#[derive(Default)]
struct DeploymentTable {
    entries: HashMap<DeploymentId, Deployment>,
    /// Deployment order; undeploy-on-close walks it in reverse.
    order: Vec<DeploymentId>,
}

/// Weak handle to a runtime, carried inside contexts to avoid reference
/// cycles (verticle -> context -> vertx -> deployment -> verticle).
#[derive(Clone)]
pub struct WeakVertx(Weak<VertxInner>);

impl WeakVertx {
    /// A weak handle that never upgrades; used in tests and detached
    /// contexts.
    pub fn detached() -> Self {
        Self(Weak::new())
    }

    /// Upgrade to a full runtime handle, if the runtime is still alive.
    pub fn upgrade(&self) -> Option<Vertx> {
        self.0.upgrade().map(|inner| Vertx { inner })
    }
}

impl Vertx {
    /// Create a runtime with an in-process bus and a worker pool sized from
    /// `options`.
    pub fn new(options: VertxOptions) -> Self {
        Self::with_bus(options, Arc::new(LocalBus::new()))
    }

    /// Create a runtime over a caller-provided bus backend.
    ///
    /// The runtime composes against the [`EventBus`] trait only, so a
    /// clustered implementation slots in here.
    pub fn with_bus(options: VertxOptions, bus: Arc<dyn EventBus>) -> Self {
        let executor = Arc::new(WorkerPool::new(options.workers, options.queue_capacity));
        Self {
            inner: Arc::new(VertxInner {
                options,
                bus,
                executor,
                root_token: CancellationToken::new(),
                deployments: Mutex::new(DeploymentTable::default()),
            }),
        }
    }

    /// The event bus.
    pub fn bus(&self) -> Arc<dyn EventBus> {
        Arc::clone(&self.inner.bus)
    }

    /// The shared worker pool.
    pub fn executor(&self) -> Arc<WorkerPool> {
        Arc::clone(&self.inner.executor)
    }

    /// The runtime configuration map.
    pub fn config(&self) -> &ConfigMap {
        &self.inner.options.config
    }

    /// The runtime options.
    pub fn options(&self) -> &VertxOptions {
        &self.inner.options
    }

    /// The root cancellation token.
    pub fn root_token(&self) -> &CancellationToken {
        &self.inner.root_token
    }

    /// A fresh context scoped under the root token.
    pub fn context(&self) -> FluxorContext {
        self.context_with(
            self.inner.root_token.child_token(),
            self.inner.options.config.clone(),
        )
    }

    fn context_with(&self, token: CancellationToken, config: ConfigMap) -> FluxorContext {
        FluxorContext::new(
            token,
            Arc::clone(&self.inner.bus),
            WeakVertx(Arc::downgrade(&self.inner)),
            config,
        )
    }

    /// Deploy a verticle with the runtime's configuration.
    pub async fn deploy<V: Verticle>(&self, verticle: V) -> Result<DeploymentId, DeployError> {
        self.deploy_boxed(Box::new(verticle), self.inner.options.config.clone())
            .await
    }

    /// Deploy a verticle with a per-deployment configuration snapshot
    /// layered over the runtime map.
    pub async fn deploy_with_config<V: Verticle>(
        &self,
        verticle: V,
        overrides: ConfigMap,
    ) -> Result<DeploymentId, DeployError> {
        let config = self.inner.options.config.merged_with(&overrides);
        self.deploy_boxed(Box::new(verticle), config).await
    }

    async fn deploy_boxed(
        &self,
        mut verticle: Box<dyn Verticle>,
        config: ConfigMap,
    ) -> Result<DeploymentId, DeployError> {
        if self.inner.root_token.is_cancelled() {
            return Err(DeployError::Closed);
        }

        let id = DeploymentId::new();
        let name = verticle.name().to_string();
        let token = self.inner.root_token.child_token();
        let ctx = self.context_with(token.clone(), config);

        tracing::info!(deployment = %id, verticle = %name, "deploying verticle");
        {
            let mut table = self.inner.deployments.lock();
            table.entries.insert(
                id,
                Deployment {
                    id,
                    name: name.clone(),
                    state: DeploymentState::Deploying,
                    deployed_at: Utc::now(),
                    token: token.clone(),
                    verticle: None,
                },
            );
            table.order.push(id);
        }

        let started =
            tokio::time::timeout(self.inner.options.spawn_timeout, verticle.start(ctx)).await;

        match started {
            Ok(Ok(())) => {
                let mut table = self.inner.deployments.lock();
                if let Some(deployment) = table.entries.get_mut(&id) {
                    deployment.state = DeploymentState::Running;
                    deployment.verticle = Some(verticle);
                }
                tracing::info!(deployment = %id, verticle = %name, "verticle running");
                Ok(id)
            }
            Ok(Err(source)) => {
                self.discard_failed(id);
                token.cancel();
                tracing::error!(
                    deployment = %id,
                    verticle = %name,
                    error = %source,
                    "verticle start failed"
                );
                Err(DeployError::StartFailed { name, source })
            }
            Err(_elapsed) => {
                self.discard_failed(id);
                token.cancel();
                tracing::error!(deployment = %id, verticle = %name, "verticle start timed out");
                Err(DeployError::StartTimeout {
                    name,
                    timeout: self.inner.options.spawn_timeout,
                })
            }
        }
    }

    fn discard_failed(&self, id: DeploymentId) {
        let mut table = self.inner.deployments.lock();
        table.entries.remove(&id);
        table.order.retain(|entry| *entry != id);
    }

    /// Undeploy a verticle: transition to `Stopping`, run `stop` under the
    /// stop deadline, cancel its scope, and drop the record.
    pub async fn undeploy(&self, id: DeploymentId) -> Result<(), DeployError> {
        let (verticle, name, token) = {
            let mut table = self.inner.deployments.lock();
            let deployment = table
                .entries
                .get_mut(&id)
                .ok_or(DeployError::NotFound(id))?;
            deployment.state = DeploymentState::Stopping;
            (
                deployment.verticle.take(),
                deployment.name.clone(),
                deployment.token.clone(),
            )
        };

        tracing::info!(deployment = %id, verticle = %name, "undeploying verticle");
        let ctx = self.context_with(token.clone(), self.inner.options.config.clone());

        let result = match verticle {
            Some(mut verticle) => {
                match tokio::time::timeout(self.inner.options.stop_timeout, verticle.stop(ctx))
                    .await
                {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(source)) => Err(DeployError::StopFailed {
                        name: name.clone(),
                        source,
                    }),
                    Err(_elapsed) => Err(DeployError::StopTimeout {
                        name: name.clone(),
                        timeout: self.inner.options.stop_timeout,
                    }),
                }
            }
            None => Ok(()),
        };

        // Cancel the deployment scope either way; consumers registered by
        // the verticle unwind through their tokens.
        token.cancel();
        {
            let mut table = self.inner.deployments.lock();
            table.entries.remove(&id);
            table.order.retain(|entry| *entry != id);
        }

        if let Err(error) = &result {
            tracing::warn!(deployment = %id, verticle = %name, %error, "undeploy finished with error");
        } else {
            tracing::info!(deployment = %id, verticle = %name, "verticle stopped");
        }
        result
    }

    /// Close the runtime: cancel the root scope, undeploy everything in
    /// reverse deployment order (continuing past errors), close the bus,
    /// and shut the executor down.
    ///
    /// Returns the first error encountered.
    pub async fn close(&self) -> Result<(), DeployError> {
        tracing::info!("closing runtime");
        self.inner.root_token.cancel();

        let ids: Vec<DeploymentId> = {
            let table = self.inner.deployments.lock();
            table.order.iter().rev().copied().collect()
        };

        let mut first_error: Option<DeployError> = None;
        for id in ids {
            if let Err(error) = self.undeploy(id).await {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }

        self.inner.bus.close();

        if let Err(error) = self
            .inner
            .executor
            .shutdown(self.inner.options.shutdown_timeout)
            .await
        {
            if first_error.is_none() {
                first_error = Some(DeployError::Executor(error));
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Number of live deployments.
    pub fn deployment_count(&self) -> usize {
        self.inner.deployments.lock().entries.len()
    }

    /// State of a deployment, if it is still tracked.
    pub fn deployment_state(&self, id: DeploymentId) -> Option<DeploymentState> {
        self.inner
            .deployments
            .lock()
            .entries
            .get(&id)
            .map(|deployment| deployment.state)
    }
}
