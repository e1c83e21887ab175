//! Work-queue manager.
//!
//! Turns store change events into work items, keeps at most one pending entry
//! per object and runs a fixed number of workers over the queue. An item that
//! changes while a worker holds it is queued again once the worker is done.
//! Each item has at most one live requeue timer: scheduling a new one, or
//! queueing the item directly, retires the previous timer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use realmsync_core::{ObjectKey, Resource, Secret};
use realmsync_storage::{DynStore, EventBroadcaster, ListParams, ObjectEvent, ObjectEventType};
use tokio::sync::{Mutex, Notify, broadcast, watch};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::lifecycle::Action;
use crate::reconcilers::Reconciler;

/// One object to reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub kind: &'static str,
    pub key: ObjectKey,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<WorkItem>,
    /// Items waiting to be processed, queued or not.
    dirty: HashSet<WorkItem>,
    processing: HashSet<WorkItem>,
    /// Generation of the live requeue timer per item.
    deferred: HashMap<WorkItem, u64>,
    generation: u64,
}

/// De-duplicating FIFO shared by the workers.
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, item: WorkItem) {
        let mut state = self.state.lock().await;
        state.deferred.remove(&item);
        Self::push(&mut state, item);
        drop(state);
        self.notify.notify_one();
    }

    fn push(state: &mut QueueState, item: WorkItem) {
        if !state.dirty.insert(item.clone()) || state.processing.contains(&item) {
            return;
        }
        state.queue.push_back(item);
    }

    /// Registers a requeue timer for `item`, retiring any earlier one.
    ///
    /// Returns the generation to hand back to [`WorkQueue::add_deferred`].
    pub async fn defer(&self, item: WorkItem) -> u64 {
        let mut state = self.state.lock().await;
        state.generation += 1;
        let generation = state.generation;
        state.deferred.insert(item, generation);
        generation
    }

    /// Queues `item` if the timer of `generation` is still the live one.
    pub async fn add_deferred(&self, item: WorkItem, generation: u64) -> bool {
        let mut state = self.state.lock().await;
        if state.deferred.get(&item) != Some(&generation) {
            return false;
        }
        state.deferred.remove(&item);
        Self::push(&mut state, item);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Number of items with a live requeue timer.
    pub async fn deferred_len(&self) -> usize {
        self.state.lock().await.deferred.len()
    }

    /// Takes the next item and marks it as being processed.
    pub async fn try_next(&self) -> Option<WorkItem> {
        let mut state = self.state.lock().await;
        let item = state.queue.pop_front()?;
        state.dirty.remove(&item);
        state.processing.insert(item.clone());
        if !state.queue.is_empty() {
            self.notify.notify_one();
        }
        Some(item)
    }

    pub async fn next(&self) -> WorkItem {
        loop {
            if let Some(item) = self.try_next().await {
                return item;
            }
            self.notify.notified().await;
        }
    }

    /// Releases `item`; it is queued again if it changed in the meantime.
    pub async fn done(&self, item: &WorkItem) {
        let mut state = self.state.lock().await;
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

pub struct Manager {
    store: DynStore,
    events: Arc<EventBroadcaster>,
    reconcilers: HashMap<&'static str, Arc<dyn Reconciler>>,
    queue: Arc<WorkQueue>,
    workers: usize,
    namespace: Option<String>,
}

impl Manager {
    pub fn new(
        store: DynStore,
        events: Arc<EventBroadcaster>,
        reconcilers: Vec<Arc<dyn Reconciler>>,
        workers: usize,
    ) -> Self {
        Self {
            store,
            events,
            reconcilers: reconcilers.into_iter().map(|r| (r.kind(), r)).collect(),
            queue: Arc::new(WorkQueue::new()),
            workers: workers.max(1),
            namespace: None,
        }
    }

    /// Only objects in `namespace` are reconciled.
    #[must_use]
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    fn item_for(&self, kind: &str, key: ObjectKey) -> Option<WorkItem> {
        if self
            .namespace
            .as_deref()
            .is_some_and(|ns| ns != key.namespace)
        {
            return None;
        }
        let (&kind, _) = self.reconcilers.get_key_value(kind)?;
        Some(WorkItem { kind, key })
    }

    /// Queues every existing object of every managed kind.
    pub async fn enqueue_all(&self) -> usize {
        let mut params = ListParams::new();
        if let Some(ns) = &self.namespace {
            params = params.in_namespace(ns);
        }

        let mut queued = 0;
        for kind in self.reconcilers.keys() {
            let objects = match self.store.list(kind, &params).await {
                Ok(objects) => objects,
                Err(e) => {
                    warn!(kind, error = %e, "Unable to list objects");
                    continue;
                }
            };
            for object in objects {
                let meta = &object["metadata"];
                let key = ObjectKey::new(
                    meta["namespace"].as_str().unwrap_or_default(),
                    meta["name"].as_str().unwrap_or_default(),
                );
                if let Some(item) = self.item_for(kind, key) {
                    self.queue.add(item).await;
                    queued += 1;
                }
            }
        }
        queued
    }

    async fn on_event(&self, event: ObjectEvent) {
        // Status writes are the engine's own output, and secrets are read on demand.
        if event.event_type == ObjectEventType::StatusUpdated || event.kind == Secret::KIND {
            return;
        }
        if let Some(item) = self.item_for(&event.kind, event.key) {
            debug!(kind = item.kind, key = %item.key, event = %event.event_type, "Queueing");
            self.queue.add(item).await;
        }
    }

    /// Starts the event listener and the workers.
    ///
    /// Returns a shutdown sender; sending `true` stops every task.
    pub fn start(self) -> (watch::Sender<bool>, JoinSet<()>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = Arc::new(self);
        let mut tasks = JoinSet::new();

        let mut events = manager.events.subscribe();
        {
            let manager = manager.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            tasks.spawn(async move {
                let queued = manager.enqueue_all().await;
                info!(queued, workers = manager.workers, "Manager started");
                loop {
                    tokio::select! {
                        received = events.recv() => match received {
                            Ok(event) => manager.on_event(event).await,
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(missed = n, "Event listener lagged, relisting");
                                manager.enqueue_all().await;
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("Event channel closed");
                                break;
                            }
                        },
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        for worker in 0..manager.workers {
            let manager = manager.clone();
            let shutdown_rx = shutdown_rx.clone();
            tasks.spawn(async move { manager.run_worker(worker, shutdown_rx).await });
        }

        (shutdown_tx, tasks)
    }

    async fn run_worker(self: Arc<Self>, worker: usize, mut shutdown_rx: watch::Receiver<bool>) {
        debug!(worker, "Worker started");
        loop {
            let item = tokio::select! {
                item = self.queue.next() => item,
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            };

            let action = self.process(&item).await;
            self.queue.done(&item).await;
            if let Action::Requeue(after) = action {
                self.requeue_after(item, after, shutdown_rx.clone()).await;
            }
        }
        debug!(worker, "Worker stopped");
    }

    /// Runs the reconciler for one item.
    pub async fn process(&self, item: &WorkItem) -> Action {
        let Some(reconciler) = self.reconcilers.get(item.kind) else {
            return Action::Done;
        };
        let span = info_span!(
            "reconcile",
            kind = item.kind,
            namespace = %item.key.namespace,
            name = %item.key.name
        );
        reconciler.reconcile(&item.key).instrument(span).await
    }

    async fn requeue_after(
        &self,
        item: WorkItem,
        after: std::time::Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let generation = self.queue.defer(item.clone()).await;
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {
                    if !queue.add_deferred(item.clone(), generation).await {
                        debug!(kind = item.kind, key = %item.key, "Requeue superseded");
                    }
                }
                _ = shutdown_rx.changed() => {}
            }
        });
    }
}
