use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::WatchStreamExt;
use kube::{Client, Resource, ResourceExt};
use kubetorio_core::{
    BackoffPolicy, Error, IndexWriter, ObjectKey, OperatorConfig, OwnershipIndex, Result,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::desired::DesiredState;
use crate::reconciler::{Dependent, Parent, Reconciler};
use crate::router::owner_work_item;
use crate::store::{KubeStore, ObjectStore};

/// Runs one parent kind `P` owning one dependent kind `D`.
pub struct Operator<P, D> {
    config: OperatorConfig,
    desired: Option<Arc<dyn DesiredState<P, Child = D>>>,
}

impl<P, D> Operator<P, D>
where
    P: Parent,
    D: Dependent,
{
    pub fn new(config: OperatorConfig) -> Self {
        Self {
            config,
            desired: None,
        }
    }

    pub fn desired_state(mut self, builder: impl DesiredState<P, Child = D>) -> Self {
        self.desired = Some(Arc::new(builder));
        self
    }

    pub async fn run(self) -> Result<()> {
        self.config.validate()?;
        let desired = self.desired.ok_or(Error::MissingField("desired_state"))?;
        let client = Client::try_default().await.map_err(Error::Kube)?;

        info!(
            "Starting operator for {}/{} owning {}",
            P::group(&()),
            P::kind(&()),
            D::kind(&())
        );

        let parents: Arc<dyn ObjectStore<P>> =
            Arc::new(KubeStore::<P>::new(client.clone(), &self.config.field_manager));
        let dependents: Arc<dyn ObjectStore<D>> =
            Arc::new(KubeStore::<D>::new(client.clone(), &self.config.field_manager));

        let index = Arc::new(OwnershipIndex::for_owner::<P>());
        let listing = dependents.list(self.config.namespace.as_deref()).await?;
        index.replace(&listing);
        info!(
            dependents = index.len(),
            ready = index.is_ready(),
            "Ownership index populated from a full listing"
        );

        let reconciler = Reconciler::new(parents, dependents, Arc::clone(&index), desired);
        let ctx = Arc::new(ControllerContext::new(reconciler, &self.config));

        let watcher_config = WatcherConfig::default().timeout(self.config.watch_timeout_secs);
        let parent_api: Api<P> = scoped_api(&client, self.config.namespace.as_deref());
        let dependent_api: Api<D> = scoped_api(&client, self.config.namespace.as_deref());

        let controller = Controller::new(parent_api, watcher_config.clone())
            .watches(dependent_api.clone(), watcher_config.clone(), |dependent: D| {
                owner_work_item::<P, D>(&dependent)
            })
            .shutdown_on_signal()
            .run(reconcile::<P, D>, error_policy::<P, D>, ctx)
            .for_each(|result| async move {
                match result {
                    Ok((obj, action)) => debug!("Reconciled {} - {:?}", obj, action),
                    Err(e) => warn!("Reconciliation error: {}", e),
                }
            });

        tokio::select! {
            _ = controller => info!("Controller stopped"),
            _ = maintain_index(dependent_api, watcher_config, index) => {
                error!("Dependent watch ended unexpectedly")
            }
        }

        Ok(())
    }
}

fn scoped_api<K: Parent>(client: &Client, namespace: Option<&str>) -> Api<K> {
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Keeps the ownership index current from a watch over the dependent kind.
async fn maintain_index<D: Dependent>(
    api: Api<D>,
    config: WatcherConfig,
    index: Arc<OwnershipIndex>,
) {
    let mut writer = IndexWriter::new(&index);
    let mut events = watcher::watcher(api, config).default_backoff().boxed();

    while let Some(event) = events.next().await {
        match event {
            Ok(event) => writer.apply_watcher_event(&event),
            Err(e) => warn!(error = %e, "Dependent watch failed, backing off"),
        }
    }
}

/// Consecutive failures per work item, turned into an exponential requeue delay.
pub struct FailureTracker {
    policy: BackoffPolicy,
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

impl FailureTracker {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Count one more failure for `key` and return how long to wait.
    pub fn record_failure(&self, key: &ObjectKey) -> Duration {
        let mut failures = self.failures.lock();
        let count = failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        self.policy.delay(*count)
    }

    pub fn reset(&self, key: &ObjectKey) {
        self.failures.lock().remove(key);
    }

    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.failures.lock().get(key).copied().unwrap_or(0)
    }
}

pub struct ControllerContext<P, D>
where
    P: Send + Sync,
    D: Send + Sync,
{
    reconciler: Reconciler<P, D>,
    failures: FailureTracker,
    stale_requeue: Duration,
}

impl<P, D> ControllerContext<P, D>
where
    P: Parent,
    D: Dependent,
{
    pub fn new(reconciler: Reconciler<P, D>, config: &OperatorConfig) -> Self {
        Self {
            reconciler,
            failures: FailureTracker::new(config.backoff()),
            stale_requeue: config.stale_requeue,
        }
    }
}

fn work_item<P: Resource>(parent: &P) -> Result<ObjectKey> {
    ObjectKey::from_resource(parent).ok_or(Error::MissingField("metadata.namespace"))
}

async fn reconcile<P, D>(parent: Arc<P>, ctx: Arc<ControllerContext<P, D>>) -> Result<Action>
where
    P: Parent,
    D: Dependent,
{
    let key = work_item(parent.as_ref())?;
    let outcome = ctx.reconciler.reconcile(&key).await?;
    ctx.failures.reset(&key);

    info!(parent = %key, kind = %P::kind(&()), %outcome, "Reconciled");
    if outcome.requeue() {
        Ok(Action::requeue(ctx.stale_requeue))
    } else {
        Ok(Action::await_change())
    }
}

fn error_policy<P, D>(parent: Arc<P>, error: &Error, ctx: Arc<ControllerContext<P, D>>) -> Action
where
    P: Parent,
    D: Dependent,
{
    let Ok(key) = work_item(parent.as_ref()) else {
        error!("Error reconciling {}: {:?}", parent.name_any(), error);
        return Action::requeue(ctx.stale_requeue);
    };
    let delay = ctx.failures.record_failure(&key);
    error!(
        parent = %key,
        ?error,
        attempt = ctx.failures.failures(&key),
        requeue_in = ?delay,
        "Reconciliation failed"
    );
    Action::requeue(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> FailureTracker {
        FailureTracker::new(BackoffPolicy {
            base: Duration::from_secs(1),
            max: Duration::from_secs(8),
        })
    }

    #[test]
    fn failures_back_off_per_work_item() {
        let tracker = tracker();
        let a = ObjectKey::new("default", "a");
        let b = ObjectKey::new("default", "b");

        assert_eq!(tracker.record_failure(&a), Duration::from_secs(1));
        assert_eq!(tracker.record_failure(&a), Duration::from_secs(2));
        assert_eq!(tracker.record_failure(&a), Duration::from_secs(4));
        assert_eq!(tracker.record_failure(&b), Duration::from_secs(1));
        assert_eq!(tracker.record_failure(&a), Duration::from_secs(8));
        assert_eq!(tracker.record_failure(&a), Duration::from_secs(8));
    }

    #[test]
    fn success_resets_backoff() {
        let tracker = tracker();
        let key = ObjectKey::new("default", "factorio");
        tracker.record_failure(&key);
        tracker.record_failure(&key);
        tracker.reset(&key);

        assert_eq!(tracker.failures(&key), 0);
        assert_eq!(tracker.record_failure(&key), Duration::from_secs(1));
    }
}
