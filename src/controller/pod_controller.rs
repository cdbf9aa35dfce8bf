//! Pod controller
//!
//! Watches database pods in one namespace and hands every lifecycle event,
//! one at a time and in arrival order, to [`PodEventHandler`]. There is no
//! periodic resync: transitions missed while the watch is down are not
//! replayed, only the state seen on the next relist is.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{pin_mut, Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    runtime::{watcher, WatchStreamExt},
    Api, Client, ResourceExt,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{dispatch, EventHandler, EventTranslator};
use super::readiness::check_ready_status;
use super::retry::RetryPolicy;
use super::role_labeler::{label_instance_role, LabelOutcome};
use super::triggers::ClusterTriggers;
use crate::error::{Error, Result};
use crate::platform::Platform;

/// Handles pod events: role labeling on add, readiness checks on change
pub struct PodEventHandler {
    platform: Arc<dyn Platform>,
    triggers: Arc<dyn ClusterTriggers>,
    namespace: String,
    retry: RetryPolicy,
}

impl PodEventHandler {
    pub fn new(
        platform: Arc<dyn Platform>,
        triggers: Arc<dyn ClusterTriggers>,
        namespace: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            platform,
            triggers,
            namespace: namespace.into(),
            retry,
        }
    }

    fn namespace_of(&self, pod: &Pod) -> String {
        pod.namespace().unwrap_or_else(|| self.namespace.clone())
    }
}

#[async_trait]
impl EventHandler<Pod> for PodEventHandler {
    async fn on_added(&self, pod: &Pod) {
        debug!("[PodController] OnAdd {}", pod.name_any());
        let namespace = self.namespace_of(pod);
        let outcome =
            label_instance_role(self.platform.as_ref(), pod, &namespace, &self.retry).await;
        if !matches!(
            outcome,
            LabelOutcome::Labeled { .. } | LabelOutcome::Unmanaged
        ) {
            warn!(
                "role label for pod {} not applied: {:?}",
                pod.name_any(),
                outcome
            );
        }
    }

    async fn on_changed(&self, _previous: &Pod, current: &Pod) {
        debug!("[PodController] OnUpdate {}", current.name_any());
        check_ready_status(self.triggers.as_ref(), current).await;
    }

    async fn on_removed(&self, pod: &Pod) {
        debug!("[PodController] OnDelete {}", pod.name_any());
    }
}

/// Consume a watch stream until `cancel` fires.
///
/// Events are handled strictly sequentially. Watch errors are logged and
/// skipped. Always returns [`Error::Cancelled`] once the token fires, even
/// if the stream ended earlier.
pub async fn run_event_loop<K, S, H>(stream: S, handler: &H, cancel: CancellationToken) -> Result<()>
where
    K: ResourceExt + Clone + Send + Sync,
    S: Stream<Item = std::result::Result<watcher::Event<K>, watcher::Error>>,
    H: EventHandler<K> + ?Sized,
{
    let mut translator = EventTranslator::new();
    pin_mut!(stream);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                for instance_event in translator.translate(event) {
                    dispatch(handler, &instance_event).await;
                }
            }
            Some(Err(e)) => warn!("pod watch error: {}", e),
            None => {
                warn!("pod watch stream ended, waiting for shutdown");
                cancel.cancelled().await;
                return Err(Error::Cancelled);
            }
        }
    }
}

/// Watches pods in a namespace and drives [`PodEventHandler`]
pub struct PodController {
    client: Client,
    namespace: String,
    handler: PodEventHandler,
}

impl PodController {
    pub fn new(client: Client, namespace: impl Into<String>, handler: PodEventHandler) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            handler,
        }
    }

    /// Run until `cancel` fires; returns [`Error::Cancelled`] on shutdown.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);

        // Fail fast if pods cannot be listed at all
        if let Err(e) = pods.list(&Default::default()).await {
            error!("Failed to register watch for pod resource: {}", e);
            return Err(Error::KubeError(e));
        }

        info!("Starting pod controller in namespace {}", self.namespace);

        let stream = watcher(pods, watcher::Config::default()).default_backoff();
        run_event_loop(stream, &self.handler, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::controller::triggers::recording::{RecordingTriggers, Signal};
    use crate::platform::memory::{make_pod, InMemoryPlatform};

    /// Records the order in which callbacks run
    #[derive(Default)]
    struct OrderHandler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHandler<Pod> for OrderHandler {
        async fn on_added(&self, pod: &Pod) {
            // A slow handler must still finish before the next event
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.seen
                .lock()
                .unwrap()
                .push(format!("add:{}", pod.name_any()));
        }

        async fn on_changed(&self, _previous: &Pod, current: &Pod) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("change:{}", current.name_any()));
        }

        async fn on_removed(&self, pod: &Pod) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("remove:{}", pod.name_any()));
        }
    }

    fn ok(event: watcher::Event<Pod>) -> std::result::Result<watcher::Event<Pod>, watcher::Error> {
        Ok(event)
    }

    #[tokio::test]
    async fn test_events_dispatched_in_order_then_cancelled() {
        let a = make_pod("a", &[], &[]);
        let b = make_pod("b", &[], &[]);
        let stream = futures::stream::iter(vec![
            ok(watcher::Event::Apply(a.clone())),
            ok(watcher::Event::Apply(b.clone())),
            ok(watcher::Event::Apply(a.clone())),
            ok(watcher::Event::Delete(b.clone())),
        ]);
        let handler = OrderHandler::default();
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            })
        };

        let result = run_event_loop(stream, &handler, cancel).await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec!["add:a", "add:b", "change:a", "remove:b"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_any_event() {
        let handler = OrderHandler::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stream = futures::stream::pending::<
            std::result::Result<watcher::Event<Pod>, watcher::Error>,
        >();
        let result = run_event_loop(stream, &handler, cancel).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_watch_errors_are_skipped() {
        let a = make_pod("a", &[], &[]);
        let stream = futures::stream::iter(vec![
            Err(watcher::Error::NoResourceVersion),
            ok(watcher::Event::Apply(a)),
        ]);
        let handler = OrderHandler::default();
        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let _ = run_event_loop(stream, &handler, cancel).await;
        canceller.await.unwrap();

        assert_eq!(*handler.seen.lock().unwrap(), vec!["add:a"]);
    }

    #[tokio::test]
    async fn test_add_then_ready_change_for_primary() {
        // c1-a is added, labeled, then its database container turns ready
        let added = make_pod(
            "c1-a",
            &[("role", "true"), ("cluster", "c1"), ("autofail", "false")],
            &[("database", false)],
        );
        let ready = make_pod(
            "c1-a",
            &[("role", "true"), ("cluster", "c1"), ("autofail", "false")],
            &[("database", true)],
        );
        let platform = Arc::new(InMemoryPlatform::new().with_pod(added.clone()));
        let triggers = Arc::new(RecordingTriggers::default());
        let handler = PodEventHandler::new(
            platform.clone(),
            triggers.clone(),
            "pg",
            RetryPolicy::immediate(8),
        );

        handler.on_added(&added).await;
        assert_eq!(platform.update_calls(), 1);
        assert!(triggers.signals().is_empty());

        handler.on_changed(&added, &ready).await;
        assert_eq!(
            triggers.signals(),
            vec![
                Signal::PrimaryReady("c1".to_string()),
                Signal::CreationComplete("c1".to_string()),
            ]
        );
        assert_eq!(
            platform
                .pod("c1-a")
                .and_then(|p| p.labels().get("service-selector").cloned())
                .as_deref(),
            Some("c1")
        );
    }

    #[tokio::test]
    async fn test_removed_pod_changes_nothing() {
        let pod = make_pod("c1-a", &[("role", "true"), ("cluster", "c1")], &[]);
        let platform = Arc::new(InMemoryPlatform::new().with_pod(pod.clone()));
        let triggers = Arc::new(RecordingTriggers::default());
        let handler =
            PodEventHandler::new(platform.clone(), triggers.clone(), "pg", RetryPolicy::default());

        handler.on_removed(&pod).await;

        assert!(platform.calls().is_empty());
        assert!(triggers.signals().is_empty());
    }
}
