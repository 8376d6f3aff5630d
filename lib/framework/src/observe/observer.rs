use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, LazyLock, Mutex};
use std::task::{Context, Poll, ready};

use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio_util::sync::ReusableBoxFuture;

use super::target_group::{LabelSet, TargetGroup, target_key};

#[derive(Debug, thiserror::Error)]
#[error("observer {0:?} is not registered")]
pub struct NotRegistered(String);

struct Entry {
    sender: Sender<Arc<Vec<TargetGroup>>>,
    // the last published snapshot, so subscribers created after a publish
    // start from the current state instead of an empty one
    latest: Arc<Vec<TargetGroup>>,
}

static OBSERVERS: LazyLock<Mutex<BTreeMap<String, Entry>>> =
    LazyLock::new(|| Mutex::new(BTreeMap::new()));

/// register must be called before any subscriber shows up, registering the
/// same name again resets the observer.
pub fn register(name: impl Into<String>) -> Observer {
    let name = name.into();

    OBSERVERS.lock().expect("lock observers").insert(
        name.clone(),
        Entry {
            sender: Sender::new(16),
            latest: Arc::new(Vec::new()),
        },
    );

    Observer { name }
}

pub fn subscribe(name: &str) -> Option<Notifier> {
    let observers = OBSERVERS.lock().expect("lock observers");
    let entry = observers.get(name)?;
    let receiver = entry.sender.subscribe();

    let latest = Arc::clone(&entry.latest);
    let pendings = changes(&[], &latest).into_iter().collect();

    Some(Notifier {
        groups: latest,
        pendings,
        receiver: ReusableBoxFuture::new(make_future(receiver)),
    })
}

#[inline]
pub fn available_observers() -> Vec<String> {
    OBSERVERS
        .lock()
        .expect("lock observers")
        .keys()
        .cloned()
        .collect()
}

/// Observer publishes snapshots of target groups, every snapshot replaces
/// the previous one as a whole.
pub struct Observer {
    name: String,
}

impl Observer {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn publish(&mut self, groups: Vec<TargetGroup>) -> Result<(), NotRegistered> {
        let mut observers = OBSERVERS.lock().expect("lock observers");
        let entry = observers
            .get_mut(&self.name)
            .ok_or_else(|| NotRegistered(self.name.clone()))?;

        let groups = Arc::new(groups);
        entry.latest = Arc::clone(&groups);

        // an error only means nobody is subscribed right now, they will
        // start from `latest` when they do
        let _ = entry.sender.send(groups);

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    Add(Vec<LabelSet>),
    Remove(Vec<LabelSet>),
    Update(Vec<LabelSet>),
}

/// Notifier is a stream of [`Change`]s between consecutive snapshots.
pub struct Notifier {
    groups: Arc<Vec<TargetGroup>>,
    pendings: VecDeque<Change>,

    receiver: ReusableBoxFuture<
        'static,
        (
            Result<Arc<Vec<TargetGroup>>, RecvError>,
            Receiver<Arc<Vec<TargetGroup>>>,
        ),
    >,
}

impl Notifier {
    /// The snapshot the yielded changes led to.
    #[inline]
    pub fn groups(&self) -> &[TargetGroup] {
        &self.groups
    }

    /// Waits for the next snapshot and returns all changes it brought. The
    /// result is empty when the snapshot equals the previous one, an empty
    /// snapshot after an empty one included. `None` once the observer is
    /// gone.
    ///
    /// Changes still pending from subscribing late are returned first.
    pub async fn next_snapshot(&mut self) -> Option<Vec<Change>> {
        if !self.pendings.is_empty() {
            return Some(self.pendings.drain(..).collect());
        }

        loop {
            let (result, receiver) = std::future::poll_fn(|cx| self.receiver.poll(cx)).await;
            self.receiver.set(make_future(receiver));

            match result {
                Ok(groups) => return Some(self.apply(groups)),
                Err(RecvError::Closed) => return None,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(message = "notifier lagged behind", skipped);
                }
            }
        }
    }

    fn apply(&mut self, groups: Arc<Vec<TargetGroup>>) -> Vec<Change> {
        let changes = changes(&self.groups, &groups);
        self.groups = groups;
        changes
    }
}

impl Stream for Notifier {
    type Item = Change;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(change) = self.pendings.pop_front() {
                return Poll::Ready(Some(change));
            }

            let (result, receiver) = ready!(self.receiver.poll(cx));
            self.receiver.set(make_future(receiver));

            match result {
                Ok(groups) => {
                    let changes = self.apply(groups);
                    self.pendings.extend(changes);
                }
                Err(RecvError::Closed) => return Poll::Ready(None),
                Err(RecvError::Lagged(skipped)) => {
                    // the next snapshot is complete by itself, nothing is lost
                    debug!(message = "notifier lagged behind", skipped);
                }
            }
        }
    }
}

async fn make_future(
    mut receiver: Receiver<Arc<Vec<TargetGroup>>>,
) -> (
    Result<Arc<Vec<TargetGroup>>, RecvError>,
    Receiver<Arc<Vec<TargetGroup>>>,
) {
    let result = receiver.recv().await;
    (result, receiver)
}

fn index(groups: &[TargetGroup]) -> BTreeMap<(&str, &str), &LabelSet> {
    groups
        .iter()
        .flat_map(|group| {
            group.targets.iter().filter_map(|target| {
                target_key(target).map(|key| ((group.source.as_str(), key), target))
            })
        })
        .collect()
}

fn changes(existing: &[TargetGroup], new_groups: &[TargetGroup]) -> Vec<Change> {
    let existing = index(existing);
    let mut to_add = Vec::new();
    let mut to_update = Vec::new();

    for group in new_groups {
        for target in &group.targets {
            let Some(key) = target_key(target) else {
                continue;
            };

            match existing.get(&(group.source.as_str(), key)) {
                Some(prev) => {
                    if *prev != target {
                        to_update.push(target.clone());
                    }
                }
                None => to_add.push(target.clone()),
            }
        }
    }

    let current = index(new_groups);
    let to_remove = existing
        .iter()
        .filter(|(key, _)| !current.contains_key(*key))
        .map(|(_, target)| (*target).clone())
        .collect::<Vec<_>>();

    let mut changes = Vec::with_capacity(3);
    if !to_remove.is_empty() {
        changes.push(Change::Remove(to_remove));
    }

    if !to_update.is_empty() {
        changes.push(Change::Update(to_update));
    }

    if !to_add.is_empty() {
        changes.push(Change::Add(to_add));
    }

    changes
}
