//! Typed lifecycle events derived from a watch stream
//!
//! `kube::runtime::watcher` reports applies and deletes; handlers want to
//! know whether an object was added, changed (with its previous copy) or
//! removed. [`EventTranslator`] keeps the last seen copy of every object to
//! make that distinction, the same bookkeeping an informer store does.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use kube::runtime::watcher;
use kube::ResourceExt;

#[derive(Clone, Debug, PartialEq)]
pub enum InstanceEvent<K> {
    Added(K),
    Changed { previous: K, current: K },
    Removed(K),
}

/// Callbacks for one resource kind
#[async_trait]
pub trait EventHandler<K: Send + Sync>: Send + Sync {
    async fn on_added(&self, obj: &K);
    async fn on_changed(&self, previous: &K, current: &K);
    async fn on_removed(&self, obj: &K);
}

/// Route one event to the matching handler callback
pub async fn dispatch<K, H>(handler: &H, event: &InstanceEvent<K>)
where
    K: Send + Sync,
    H: EventHandler<K> + ?Sized,
{
    match event {
        InstanceEvent::Added(obj) => handler.on_added(obj).await,
        InstanceEvent::Changed { previous, current } => {
            handler.on_changed(previous, current).await
        }
        InstanceEvent::Removed(obj) => handler.on_removed(obj).await,
    }
}

type ObjectKey = (String, String);

fn key_of<K: ResourceExt>(obj: &K) -> ObjectKey {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Turns raw watcher events into [`InstanceEvent`]s
pub struct EventTranslator<K> {
    known: HashMap<ObjectKey, K>,
    relist: Option<HashSet<ObjectKey>>,
}

impl<K> Default for EventTranslator<K> {
    fn default() -> Self {
        Self {
            known: HashMap::new(),
            relist: None,
        }
    }
}

impl<K: ResourceExt + Clone> EventTranslator<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently tracked
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn translate(&mut self, event: watcher::Event<K>) -> Vec<InstanceEvent<K>> {
        match event {
            watcher::Event::Apply(obj) => vec![self.apply(obj)],
            watcher::Event::Delete(obj) => {
                self.known.remove(&key_of(&obj));
                vec![InstanceEvent::Removed(obj)]
            }
            watcher::Event::Init => {
                self.relist = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let Some(seen) = self.relist.as_mut() {
                    seen.insert(key_of(&obj));
                }
                vec![self.apply(obj)]
            }
            watcher::Event::InitDone => {
                // Objects that vanished while the watch was down
                let Some(seen) = self.relist.take() else {
                    return Vec::new();
                };
                let gone: Vec<ObjectKey> = self
                    .known
                    .keys()
                    .filter(|k| !seen.contains(*k))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|k| self.known.remove(&k))
                    .map(InstanceEvent::Removed)
                    .collect()
            }
        }
    }

    fn apply(&mut self, obj: K) -> InstanceEvent<K> {
        match self.known.insert(key_of(&obj), obj.clone()) {
            Some(previous) => InstanceEvent::Changed {
                previous,
                current: obj,
            },
            None => InstanceEvent::Added(obj),
        }
    }
}
