//! The engine: instance registry, guarded transition execution, listeners.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;

// Layer 3: Internal module imports
use crate::definition::MachineDefinition;
use crate::errors::FsmError;
use crate::event::FsmEvent;
use crate::ids::InstanceId;
use crate::instance::{ExecutionContext, HistoryEntry, InstanceStatus};
use crate::persist::InstanceStore;
use fluxor_rt::executor::WorkerPool;

/// A committed (or initial) state change, delivered to listeners.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// Owning machine definition id
    pub machine_id: String,
    /// The instance that changed
    pub instance_id: InstanceId,
    /// Source state; `None` for instance creation
    pub from: Option<String>,
    /// Target state
    pub to: String,
    /// Triggering event name
    pub event: String,
}

/// Observer of committed transitions.
///
/// Listeners run asynchronously on the shared worker pool; a panicking
/// listener is isolated by the pool's recovery wrapper and never affects
/// the transition outcome.
pub trait StateChangeListener: Send + Sync + 'static {
    /// Called after every committed state change.
    fn on_transition(&self, change: StateChange) -> BoxFuture<'static, ()>;
}

struct SyncListener<F>(F);

impl<F> StateChangeListener for SyncListener<F>
where
    F: Fn(StateChange) + Send + Sync + 'static,
{
    fn on_transition(&self, change: StateChange) -> BoxFuture<'static, ()> {
        (self.0)(change);
        Box::pin(async {})
    }
}

/// Wrap a synchronous closure as a listener.
pub fn listener_fn<F>(f: F) -> Arc<dyn StateChangeListener>
where
    F: Fn(StateChange) + Send + Sync + 'static,
{
    Arc::new(SyncListener(f))
}

/// Outcome of [`Engine::send_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A transition committed
    Transitioned {
        /// Source state
        from: String,
        /// Target state
        to: String,
    },

    /// No candidate applied (unknown event for this state, or every guard
    /// declined); not an error, the instance is unchanged
    NoTransition,
}

struct InstanceCell {
    machine_id: String,
    /// Serializes transitions per instance; actions run under this lock.
    lock: Mutex<ExecutionContext>,
}

struct EngineInner {
    definitions: DashMap<String, Arc<MachineDefinition>>,
    instances: RwLock<HashMap<InstanceId, Arc<InstanceCell>>>,
    listeners: RwLock<Vec<Arc<dyn StateChangeListener>>>,
    pool: Arc<WorkerPool>,
    store: Option<Arc<dyn InstanceStore>>,
    history_limit: Option<usize>,
    record_snapshots: bool,
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    pool: Arc<WorkerPool>,
    store: Option<Arc<dyn InstanceStore>>,
    history_limit: Option<usize>,
    record_snapshots: bool,
}

impl EngineBuilder {
    /// Attach a persistence backend; instances are saved on creation and
    /// after every committed transition.
    pub fn with_store(mut self, store: Arc<dyn InstanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Bound per-instance history retention (oldest entries are dropped).
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    /// Record a copy of the instance data in each history entry.
    pub fn with_data_snapshots(mut self, enabled: bool) -> Self {
        self.record_snapshots = enabled;
        self
    }

    /// Finish the builder.
    pub fn build(self) -> Engine {
        Engine {
            inner: Arc::new(EngineInner {
                definitions: DashMap::new(),
                instances: RwLock::new(HashMap::new()),
                listeners: RwLock::new(Vec::new()),
                pool: self.pool,
                store: self.store,
                history_limit: self.history_limit,
                record_snapshots: self.record_snapshots,
            }),
        }
    }
}

/// The state-machine engine.
///
/// Cheap to clone; all clones share the same registries. Transitions on one
/// instance are serialized by that instance's lock; transitions across
/// instances run independently on different workers.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Start building an engine over the shared worker pool (used for
    /// listener dispatch).
    pub fn builder(pool: Arc<WorkerPool>) -> EngineBuilder {
        EngineBuilder {
            pool,
            store: None,
            history_limit: None,
            record_snapshots: false,
        }
    }

    /// Register a definition.
    ///
    /// # Errors
    ///
    /// [`FsmError::DuplicateDefinition`] when the id is already registered.
    pub fn register(&self, definition: MachineDefinition) -> Result<(), FsmError> {
        let id = definition.id().to_string();
        if self.inner.definitions.contains_key(&id) {
            return Err(FsmError::DuplicateDefinition(id));
        }
        tracing::info!(machine = %id, version = definition.version(), "machine registered");
        self.inner.definitions.insert(id, Arc::new(definition));
        Ok(())
    }

    /// Look up a registered definition.
    pub fn definition(&self, id: &str) -> Option<Arc<MachineDefinition>> {
        self.inner
            .definitions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Ids of all registered definitions.
    pub fn definition_ids(&self) -> Vec<String> {
        self.inner
            .definitions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Subscribe a listener to committed state changes.
    pub fn add_listener(&self, listener: Arc<dyn StateChangeListener>) {
        self.inner.listeners.write().push(listener);
    }

    /// Create an instance of `machine_id`.
    ///
    /// The initial state's entry actions run synchronously under the
    /// synthetic `__init__` event; their errors are logged but do not fail
    /// creation, so an instance is never left half-constructed and
    /// unreachable.
    pub async fn create_instance(
        &self,
        machine_id: &str,
        initial_data: Option<Value>,
    ) -> Result<InstanceId, FsmError> {
        let definition = self
            .definition(machine_id)
            .ok_or_else(|| FsmError::DefinitionNotFound(machine_id.to_string()))?;

        let data = match initial_data {
            None | Some(Value::Null) => HashMap::new(),
            Some(Value::Object(map)) => map.into_iter().collect(),
            Some(other) => {
                return Err(FsmError::Payload(format!(
                    "initial data must be an object, got {other}"
                )))
            }
        };

        let instance_id = InstanceId::new();
        let exec = ExecutionContext::new(
            machine_id,
            instance_id,
            definition.initial_state(),
            data,
        );
        let cell = Arc::new(InstanceCell {
            machine_id: machine_id.to_string(),
            lock: Mutex::new(exec),
        });
        self.inner.instances.write().insert(instance_id, Arc::clone(&cell));
        tracing::info!(machine = %machine_id, instance = %instance_id, "instance created");

        // Initial entry actions; failures are logged, never fatal.
        let snapshot = {
            let mut exec = cell.lock.lock().await;
            let init = FsmEvent::init();
            if let Some(initial) = definition.state(definition.initial_state()) {
                for action in &initial.on_enter {
                    if let Err(error) = action(&init, &mut exec).await {
                        tracing::warn!(
                            machine = %machine_id,
                            instance = %instance_id,
                            %error,
                            "initial entry action failed; instance continues"
                        );
                    }
                }
            }
            exec.clone()
        };

        self.notify(StateChange {
            machine_id: machine_id.to_string(),
            instance_id,
            from: None,
            to: definition.initial_state().to_string(),
            event: FsmEvent::init().name,
        });
        self.persist(&snapshot).await;

        Ok(instance_id)
    }

    /// Deliver an event to an instance.
    ///
    /// On an action failure after exit actions have run, the state is left
    /// pre-transition; the original state's entry actions are NOT re-run.
    pub async fn send_event(
        &self,
        instance_id: &InstanceId,
        event: FsmEvent,
    ) -> Result<EventOutcome, FsmError> {
        let cell = self
            .cell(instance_id)
            .ok_or(FsmError::InstanceNotFound(*instance_id))?;
        let definition = self
            .definition(&cell.machine_id)
            .ok_or_else(|| FsmError::DefinitionNotFound(cell.machine_id.clone()))?;

        let mut exec = cell.lock.lock().await;

        if exec.status != InstanceStatus::Running {
            return Err(FsmError::InstanceNotRunning {
                instance: *instance_id,
                status: exec.status,
            });
        }

        // Select the first candidate whose guard passes; a guard error
        // aborts the whole event with the state unchanged.
        let candidates = definition.candidates(&exec.current_state, &event.name);
        let mut selected = None;
        for transition in candidates {
            match &transition.guard {
                None => {
                    selected = Some(transition);
                    break;
                }
                Some(guard) => match guard(&event, &exec) {
                    Ok(true) => {
                        selected = Some(transition);
                        break;
                    }
                    Ok(false) => continue,
                    Err(error) => {
                        return Err(FsmError::GuardFailed {
                            event: event.name,
                            reason: error.to_string(),
                        })
                    }
                },
            }
        }

        let Some(transition) = selected else {
            tracing::debug!(
                machine = %cell.machine_id,
                instance = %instance_id,
                state = %exec.current_state,
                event = %event.name,
                "no applicable transition"
            );
            return Ok(EventOutcome::NoTransition);
        };

        let from = exec.current_state.clone();

        // Exit actions; an error aborts with the state unchanged.
        if let Some(state) = definition.state(&from) {
            for action in &state.on_exit {
                action(&event, &mut exec).await.map_err(|error| {
                    FsmError::ExitActionFailed {
                        state: from.clone(),
                        event: event.name.clone(),
                        reason: error.to_string(),
                    }
                })?;
            }
        }

        // Transition actions; an error aborts with the state unchanged
        // (exit actions have already run; the original entry actions are
        // not re-executed).
        for action in &transition.actions {
            action(&event, &mut exec).await.map_err(|error| {
                FsmError::TransitionActionFailed {
                    event: event.name.clone(),
                    reason: error.to_string(),
                }
            })?;
        }

        // Commit point: state swap + history append, atomic under the
        // instance lock.
        let now = Utc::now();
        let duration_ms = now.signed_duration_since(exec.updated_at).num_milliseconds();
        let to = transition.to.clone();
        exec.previous_state = Some(from.clone());
        exec.current_state = to.clone();
        exec.updated_at = now;
        let data_snapshot = self
            .inner
            .record_snapshots
            .then(|| serde_json::to_value(&exec.data).unwrap_or(Value::Null));
        exec.history.push(HistoryEntry {
            from: from.clone(),
            to: to.clone(),
            event: event.name.clone(),
            timestamp: now,
            duration_in_prev_state_ms: duration_ms,
            data_snapshot,
        });
        if let Some(limit) = self.inner.history_limit {
            while exec.history.len() > limit {
                exec.history.remove(0);
            }
        }

        // Entry actions after the commit; errors are logged, the
        // transition stays committed.
        if let Some(target) = definition.state(&to) {
            for action in &target.on_enter {
                if let Err(error) = action(&event, &mut exec).await {
                    tracing::warn!(
                        machine = %cell.machine_id,
                        instance = %instance_id,
                        state = %to,
                        %error,
                        "entry action failed; transition already committed"
                    );
                }
            }
            if target.is_final {
                exec.status = InstanceStatus::Completed;
            }
        }

        tracing::info!(
            machine = %cell.machine_id,
            instance = %instance_id,
            %from,
            %to,
            event = %event.name,
            "transition committed"
        );

        let snapshot = exec.clone();
        drop(exec);

        self.notify(StateChange {
            machine_id: cell.machine_id.clone(),
            instance_id: *instance_id,
            from: Some(from.clone()),
            to: to.clone(),
            event: event.name,
        });
        self.persist(&snapshot).await;

        Ok(EventOutcome::Transitioned { from, to })
    }

    /// A consistent copy of an instance's execution context.
    pub async fn snapshot(&self, instance_id: &InstanceId) -> Result<ExecutionContext, FsmError> {
        let cell = self
            .cell(instance_id)
            .ok_or(FsmError::InstanceNotFound(*instance_id))?;
        let exec = cell.lock.lock().await;
        Ok(exec.clone())
    }

    /// Ids of all instances of `machine_id`.
    pub fn instances_of(&self, machine_id: &str) -> Vec<InstanceId> {
        self.inner
            .instances
            .read()
            .iter()
            .filter(|(_, cell)| cell.machine_id == machine_id)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Total number of live instances.
    pub fn instance_count(&self) -> usize {
        self.inner.instances.read().len()
    }

    /// Remove an instance from the registry (and the store, if any).
    pub async fn remove_instance(&self, instance_id: &InstanceId) -> Result<(), FsmError> {
        let removed = self.inner.instances.write().remove(instance_id);
        if removed.is_none() {
            return Err(FsmError::InstanceNotFound(*instance_id));
        }
        if let Some(store) = &self.inner.store {
            store.remove(instance_id).await?;
        }
        Ok(())
    }

    fn cell(&self, instance_id: &InstanceId) -> Option<Arc<InstanceCell>> {
        self.inner.instances.read().get(instance_id).map(Arc::clone)
    }

    /// Dispatch listeners on the worker pool; the pool's panic recovery
    /// isolates faulty listeners.
    fn notify(&self, change: StateChange) {
        let listeners = self.inner.listeners.read().clone();
        for listener in listeners {
            let change = change.clone();
            if self.inner.pool.submit(listener.on_transition(change)).is_err() {
                tracing::warn!("listener notification dropped: executor saturated");
            }
        }
    }

    async fn persist(&self, exec: &ExecutionContext) {
        if let Some(store) = &self.inner.store {
            if let Err(error) = store.save(exec).await {
                tracing::error!(
                    instance = %exec.instance_id,
                    %error,
                    "failed to persist instance"
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use crate::definition::{guard, sync_action, DefinitionBuilder, State, Transition};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool() -> Arc<WorkerPool> {
        Arc::new(WorkerPool::new(2, 16))
    }

    fn order_definition() -> MachineDefinition {
        DefinitionBuilder::new("order")
            .initial_state("pending")
            .state(State::new("pending"))
            .state(State::new("validating"))
            .state(State::new("processing"))
            .state(State::new("completed").terminal())
            .state(State::new("rejected").terminal())
            .transition(
                Transition::new("pending", "validating", "validate").guarded(guard(
                    |_event, exec| Ok(exec.data_number("amount").unwrap_or(0.0) > 0.0),
                )),
            )
            .transition(Transition::new("validating", "processing", "process"))
            .transition(Transition::new("processing", "completed", "complete"))
            .transition(Transition::new("processing", "rejected", "reject"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_order_processing() {
        let engine = Engine::builder(pool()).build();
        engine.register(order_definition()).unwrap();

        let id = engine
            .create_instance("order", Some(json!({"amount": 150})))
            .await
            .unwrap();

        for event in ["validate", "process", "complete"] {
            let outcome = engine.send_event(&id, FsmEvent::new(event)).await.unwrap();
            assert!(matches!(outcome, EventOutcome::Transitioned { .. }));
        }

        let exec = engine.snapshot(&id).await.unwrap();
        assert_eq!(exec.current_state, "completed");
        assert_eq!(exec.status, InstanceStatus::Completed);
        assert_eq!(exec.history.len(), 3);
        assert_eq!(exec.history[0].from, "pending");
        assert_eq!(exec.history[0].to, "validating");
        assert_eq!(exec.history[0].event, "validate");
        assert_eq!(exec.previous_state.as_deref(), Some("processing"));
    }

    #[tokio::test]
    async fn test_guard_rejection_leaves_state_unchanged() {
        let engine = Engine::builder(pool()).build();
        engine.register(order_definition()).unwrap();

        let id = engine
            .create_instance("order", Some(json!({"amount": -5})))
            .await
            .unwrap();

        let outcome = engine.send_event(&id, FsmEvent::new("validate")).await.unwrap();
        assert_eq!(outcome, EventOutcome::NoTransition);

        let exec = engine.snapshot(&id).await.unwrap();
        assert_eq!(exec.current_state, "pending");
        assert!(exec.history.is_empty());
    }

    #[tokio::test]
    async fn test_priority_tie_break() {
        // Higher priority first; its guard declines, the lower one wins.
        let definition = DefinitionBuilder::new("race")
            .initial_state("s")
            .state(State::new("s"))
            .state(State::new("a"))
            .state(State::new("b"))
            .transition(
                Transition::new("s", "a", "e")
                    .with_priority(1)
                    .guarded(guard(|_, _| Ok(true))),
            )
            .transition(
                Transition::new("s", "b", "e")
                    .with_priority(10)
                    .guarded(guard(|_, _| Ok(false))),
            )
            .build()
            .unwrap();

        let engine = Engine::builder(pool()).build();
        engine.register(definition).unwrap();
        let id = engine.create_instance("race", None).await.unwrap();

        engine.send_event(&id, FsmEvent::new("e")).await.unwrap();
        let exec = engine.snapshot(&id).await.unwrap();
        assert_eq!(exec.current_state, "a");
    }

    #[tokio::test]
    async fn test_guard_error_aborts_event() {
        let definition = DefinitionBuilder::new("m")
            .initial_state("s")
            .state(State::new("s"))
            .state(State::new("t"))
            .transition(
                Transition::new("s", "t", "go")
                    .guarded(guard(|_, _| Err("guard exploded".into()))),
            )
            .build()
            .unwrap();

        let engine = Engine::builder(pool()).build();
        engine.register(definition).unwrap();
        let id = engine.create_instance("m", None).await.unwrap();

        let result = engine.send_event(&id, FsmEvent::new("go")).await;
        assert!(matches!(result, Err(FsmError::GuardFailed { .. })));

        let exec = engine.snapshot(&id).await.unwrap();
        assert_eq!(exec.current_state, "s");
    }

    #[tokio::test]
    async fn test_action_error_aborts_without_reentering() {
        // The documented choice: a failed transition action leaves the
        // state pre-transition and does not re-run the original entry
        // actions, even though exit actions already ran.
        let exits = Arc::new(AtomicUsize::new(0));
        let enters = Arc::new(AtomicUsize::new(0));

        let exit_counter = Arc::clone(&exits);
        let enter_counter = Arc::clone(&enters);
        let definition = DefinitionBuilder::new("m")
            .initial_state("s")
            .state(
                State::new("s")
                    .on_enter(sync_action(move |_, _| {
                        enter_counter.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }))
                    .on_exit(sync_action(move |_, _| {
                        exit_counter.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    })),
            )
            .state(State::new("t"))
            .transition(
                Transition::new("s", "t", "go")
                    .action(sync_action(|_, _| Err("action failed".into()))),
            )
            .build()
            .unwrap();

        let engine = Engine::builder(pool()).build();
        engine.register(definition).unwrap();
        let id = engine.create_instance("m", None).await.unwrap();
        let enters_after_init = enters.load(Ordering::Relaxed);

        let result = engine.send_event(&id, FsmEvent::new("go")).await;
        assert!(matches!(
            result,
            Err(FsmError::TransitionActionFailed { .. })
        ));

        let exec = engine.snapshot(&id).await.unwrap();
        assert_eq!(exec.current_state, "s");
        assert!(exec.history.is_empty());
        assert_eq!(exits.load(Ordering::Relaxed), 1); // exit did run
        assert_eq!(enters.load(Ordering::Relaxed), enters_after_init); // no re-entry
    }

    #[tokio::test]
    async fn test_entry_action_error_keeps_commit() {
        let definition = DefinitionBuilder::new("m")
            .initial_state("s")
            .state(State::new("s"))
            .state(State::new("t").on_enter(sync_action(|_, _| Err("enter failed".into()))))
            .transition(Transition::new("s", "t", "go"))
            .build()
            .unwrap();

        let engine = Engine::builder(pool()).build();
        engine.register(definition).unwrap();
        let id = engine.create_instance("m", None).await.unwrap();

        let outcome = engine.send_event(&id, FsmEvent::new("go")).await.unwrap();
        assert!(matches!(outcome, EventOutcome::Transitioned { .. }));

        let exec = engine.snapshot(&id).await.unwrap();
        assert_eq!(exec.current_state, "t"); // commit survives
        assert_eq!(exec.history.len(), 1);
    }

    #[tokio::test]
    async fn test_completed_instance_rejects_events() {
        let engine = Engine::builder(pool()).build();
        engine.register(order_definition()).unwrap();
        let id = engine
            .create_instance("order", Some(json!({"amount": 1})))
            .await
            .unwrap();

        for event in ["validate", "process", "complete"] {
            engine.send_event(&id, FsmEvent::new(event)).await.unwrap();
        }

        let result = engine.send_event(&id, FsmEvent::new("validate")).await;
        assert!(matches!(
            result,
            Err(FsmError::InstanceNotRunning { .. })
        ));
    }

    #[tokio::test]
    async fn test_listener_notified_of_transitions() {
        let engine = Engine::builder(pool()).build();
        engine.register(order_definition()).unwrap();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let listener_seen = Arc::clone(&seen);
        engine.add_listener(listener_fn(move |change| {
            listener_seen
                .lock()
                .push((change.from.clone(), change.to.clone()));
        }));

        let id = engine
            .create_instance("order", Some(json!({"amount": 9})))
            .await
            .unwrap();
        engine.send_event(&id, FsmEvent::new("validate")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let seen = seen.lock();
        assert!(seen.contains(&(None, "pending".to_string())));
        assert!(seen.contains(&(Some("pending".to_string()), "validating".to_string())));
    }

    #[tokio::test]
    async fn test_history_limit_trims_oldest() {
        let definition = DefinitionBuilder::new("pingpong")
            .initial_state("ping")
            .state(State::new("ping"))
            .state(State::new("pong"))
            .transition(Transition::new("ping", "pong", "hit"))
            .transition(Transition::new("pong", "ping", "hit"))
            .build()
            .unwrap();

        let engine = Engine::builder(pool()).with_history_limit(3).build();
        engine.register(definition).unwrap();
        let id = engine.create_instance("pingpong", None).await.unwrap();

        for _ in 0..10 {
            engine.send_event(&id, FsmEvent::new("hit")).await.unwrap();
        }

        let exec = engine.snapshot(&id).await.unwrap();
        assert_eq!(exec.history.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_machine_and_instance() {
        let engine = Engine::builder(pool()).build();
        assert!(matches!(
            engine.create_instance("ghost", None).await,
            Err(FsmError::DefinitionNotFound(_))
        ));
        assert!(matches!(
            engine.send_event(&InstanceId::new(), FsmEvent::new("x")).await,
            Err(FsmError::InstanceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let engine = Engine::builder(pool()).build();
        engine.register(order_definition()).unwrap();
        assert!(matches!(
            engine.register(order_definition()),
            Err(FsmError::DuplicateDefinition(_))
        ));
    }

    #[tokio::test]
    async fn test_instances_of_filters_by_machine() {
        let engine = Engine::builder(pool()).build();
        engine.register(order_definition()).unwrap();

        let other = DefinitionBuilder::new("other")
            .initial_state("s")
            .state(State::new("s"))
            .build()
            .unwrap();
        engine.register(other).unwrap();

        let a = engine.create_instance("order", None).await.unwrap();
        let b = engine.create_instance("order", None).await.unwrap();
        let c = engine.create_instance("other", None).await.unwrap();

        let mut orders = engine.instances_of("order");
        orders.sort_by_key(|id| id.to_string());
        let mut expected = vec![a, b];
        expected.sort_by_key(|id| id.to_string());
        assert_eq!(orders, expected);
        assert_eq!(engine.instances_of("other"), vec![c]);
        assert_eq!(engine.instance_count(), 3);
    }
}
