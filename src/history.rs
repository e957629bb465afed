//! History controller.
//!
//! Holds one store subscription for as long as the history view is mounted.
//! Each delivery replaces the full collection (already newest first) and
//! recomputes the list of known sources. The source filter is applied on
//! read, so changing it never touches the store.
//!
//! Deletes are tracked per row: a row being deleted cannot be deleted again
//! until the first call returns, while other rows stay available.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::analysis::groupings::{SourceFilter, distinct_sources, filter_readings};
use crate::logging::{self, Component};
use crate::model::{ActionError, PersistedReading, StoreError};
use crate::notify::Notifier;
use crate::store::{ReadingStoreClient, Subscription};

/// Everything the history view shows.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryView {
    /// Readings passing the filter, newest first.
    pub readings: Vec<PersistedReading>,
    pub sources: Vec<String>,
    pub filter: SourceFilter,
    /// `true` until the first delivery (or a subscription error).
    pub loading: bool,
    /// Ids with a delete in flight.
    pub deleting: Vec<String>,
}

#[derive(Debug)]
struct HistoryState {
    all: Vec<PersistedReading>,
    sources: Vec<String>,
    filter: SourceFilter,
    loading: bool,
    deleting: HashSet<String>,
}

fn lock(state: &Mutex<HistoryState>) -> MutexGuard<'_, HistoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Re-enables a row when dropped, including when the delete future is
/// dropped before the store answers.
struct DeletingGuard<'a> {
    state: &'a Mutex<HistoryState>,
    id: &'a str,
}

impl Drop for DeletingGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).deleting.remove(self.id);
    }
}

pub struct HistoryController {
    state: Arc<Mutex<HistoryState>>,
    revision: watch::Sender<u64>,
    store: ReadingStoreClient,
    notifier: Notifier,
    subscription: Option<Subscription>,
}

impl HistoryController {
    /// Mounts the history view and opens its subscription.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(store: ReadingStoreClient, notifier: Notifier) -> Self {
        let state = Arc::new(Mutex::new(HistoryState {
            all: Vec::new(),
            sources: Vec::new(),
            filter: SourceFilter::All,
            loading: true,
            deleting: HashSet::new(),
        }));
        let (revision, _) = watch::channel(0u64);

        let on_change = {
            let state = Arc::clone(&state);
            let revision = revision.clone();
            move |records: Vec<PersistedReading>| {
                {
                    let mut st = lock(&state);
                    st.sources = distinct_sources(&records);
                    logging::debug(
                        Component::History,
                        None,
                        &format!("{} readings, {} sources", records.len(), st.sources.len()),
                    );
                    st.all = records;
                    st.loading = false;
                }
                revision.send_modify(|r| *r += 1);
            }
        };

        let on_error = {
            let state = Arc::clone(&state);
            let revision = revision.clone();
            let notifier = notifier.clone();
            move |err: StoreError| {
                lock(&state).loading = false;
                revision.send_modify(|r| *r += 1);
                logging::error(Component::History, None, &err.to_string());
                notifier.error("Failed to load readings");
            }
        };

        let subscription = store.subscribe(on_change, on_error);
        logging::debug(Component::History, None, "history mounted");

        Self {
            state,
            revision,
            store,
            notifier,
            subscription: Some(subscription),
        }
    }

    pub fn view(&self) -> HistoryView {
        let st = lock(&self.state);
        let mut deleting: Vec<String> = st.deleting.iter().cloned().collect();
        deleting.sort();
        HistoryView {
            readings: filter_readings(&st.all, &st.filter),
            sources: st.sources.clone(),
            filter: st.filter.clone(),
            loading: st.loading,
            deleting,
        }
    }

    /// Receiver bumped whenever the view changes because of the store.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn set_filter(&self, filter: SourceFilter) {
        lock(&self.state).filter = filter;
        self.revision.send_modify(|r| *r += 1);
    }

    pub fn is_deleting(&self, id: &str) -> bool {
        lock(&self.state).deleting.contains(id)
    }

    /// Deletes one reading.
    ///
    /// A record that is already gone counts as deleted. A transport failure
    /// is reported and the row becomes deletable again.
    pub async fn delete(&self, id: &str) -> Result<(), ActionError> {
        if !lock(&self.state).deleting.insert(id.to_string()) {
            return Err(ActionError::Busy);
        }
        let deleting = DeletingGuard {
            state: &self.state,
            id,
        };

        let result = match self.store.remove(id).await {
            Err(StoreError::NotFound(_)) => Ok(()),
            other => other,
        };
        drop(deleting);

        match result {
            Ok(()) => {
                self.notifier.success("Deleted entry");
                Ok(())
            }
            Err(e) => {
                self.notifier.error("Delete failed");
                Err(e.into())
            }
        }
    }

    /// Unmounts the view and closes the subscription.
    pub fn shutdown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            logging::debug(Component::History, None, "history unmounted");
        }
    }
}

impl Drop for HistoryController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
