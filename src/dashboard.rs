//! Live dashboard controller.
//!
//! Owns the acquisition loop for as long as the dashboard is mounted and
//! drives the two user actions on the live reading:
//!
//! - **classify**: run the classifier on the current reading and keep the label,
//! - **save**: append the current reading with that label and a water source.
//!
//! The two actions are independent; each has its own busy flag. Everything
//! the presentation layer needs is in a `DashboardView` snapshot.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::acquisition::{AcquisitionHandle, AcquisitionOptions, LiveState};
use crate::classify::classify_with_rule;
use crate::ingest::SensorBridge;
use crate::logging::{self, Component};
use crate::model::{ActionError, NewReading, PollutionLabel, Reading, ValidationError};
use crate::notify::Notifier;
use crate::store::ReadingStoreClient;

/// Checks what a save needs before any I/O: a label from an earlier
/// classify, then a non-blank source. Returns the label to save under.
pub fn check_save_preconditions(
    label: Option<PollutionLabel>,
    source: &str,
) -> Result<PollutionLabel, ValidationError> {
    let label = label.ok_or(ValidationError::NotClassified)?;
    if source.trim().is_empty() {
        return Err(ValidationError::MissingSource);
    }
    Ok(label)
}

/// Everything the dashboard shows.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub reading: Reading,
    pub connected: bool,
    pub last_update: Option<DateTime<Utc>>,
    /// Label from the last classify. Kept after a save.
    pub label: Option<PollutionLabel>,
    /// Pending water source text. Cleared after a successful save.
    pub source: String,
    pub classifying: bool,
    pub saving: bool,
}

#[derive(Debug, Default)]
struct ActionState {
    label: Option<PollutionLabel>,
    source: String,
    classifying: bool,
    saving: bool,
}

fn lock(actions: &Mutex<ActionState>) -> MutexGuard<'_, ActionState> {
    // State is plain data; a panic mid-update cannot leave it invalid.
    actions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears `saving` when dropped, including when the save future is dropped
/// before the store answers.
struct SavingGuard<'a> {
    actions: &'a Mutex<ActionState>,
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        lock(self.actions).saving = false;
    }
}

pub struct DashboardController {
    acquisition: AcquisitionHandle,
    store: ReadingStoreClient,
    notifier: Notifier,
    actions: Mutex<ActionState>,
}

impl DashboardController {
    /// Mounts the dashboard: starts polling `bridge` right away.
    pub fn mount(
        bridge: Arc<dyn SensorBridge>,
        options: AcquisitionOptions,
        store: ReadingStoreClient,
        notifier: Notifier,
    ) -> Self {
        Self::with_acquisition(AcquisitionHandle::start(bridge, options), store, notifier)
    }

    pub fn with_acquisition(
        acquisition: AcquisitionHandle,
        store: ReadingStoreClient,
        notifier: Notifier,
    ) -> Self {
        logging::debug(Component::Dashboard, None, "dashboard mounted");
        Self {
            acquisition,
            store,
            notifier,
            actions: Mutex::new(ActionState::default()),
        }
    }

    fn actions(&self) -> MutexGuard<'_, ActionState> {
        lock(&self.actions)
    }

    pub fn view(&self) -> DashboardView {
        let live = self.acquisition.current();
        let actions = self.actions();
        DashboardView {
            reading: live.reading,
            connected: live.connected,
            last_update: live.last_update,
            label: actions.label,
            source: actions.source.clone(),
            classifying: actions.classifying,
            saving: actions.saving,
        }
    }

    /// Receiver notified after every applied poll tick.
    pub fn live(&self) -> watch::Receiver<LiveState> {
        self.acquisition.subscribe()
    }

    /// Updates the pending water source text.
    pub fn set_source(&self, text: &str) {
        self.actions().source = text.to_string();
    }

    /// Classifies the current live reading. Never fails.
    pub async fn classify(&self) -> PollutionLabel {
        self.actions().classifying = true;

        let reading = self.acquisition.current().reading;
        let (label, rule) = classify_with_rule(&reading);
        logging::debug(
            Component::Dashboard,
            None,
            &format!("{:?} matched {:?}", reading, rule),
        );

        {
            let mut actions = self.actions();
            actions.label = Some(label);
            actions.classifying = false;
        }
        self.notifier.success(&format!("Classified: {}", label));
        label
    }

    /// Saves the current live reading under the last label and `source`.
    ///
    /// `source` becomes the pending source text, as if passed to
    /// `set_source` first. Fails without touching the store when nothing has
    /// been classified or the source is blank. Returns the new record id.
    pub async fn save(&self, source: &str) -> Result<String, ActionError> {
        let prepared = {
            let mut actions = self.actions();
            if actions.saving {
                Err(ActionError::Busy)
            } else {
                actions.source = source.to_string();
                match check_save_preconditions(actions.label, &actions.source) {
                    Ok(label) => {
                        actions.saving = true;
                        Ok((label, actions.source.trim().to_string()))
                    }
                    Err(e) => Err(ActionError::from(e)),
                }
            }
        };

        let (label, source) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                if let ActionError::Validation(v) = &e {
                    self.notifier.error(&v.to_string());
                }
                return Err(e);
            }
        };

        let saving = SavingGuard {
            actions: &self.actions,
        };
        let record = NewReading {
            reading: self.acquisition.current().reading,
            label,
            source,
            recorded_at: Utc::now(),
        };
        let result = self.store.append(&record).await;

        if result.is_ok() {
            self.actions().source.clear();
        }
        drop(saving);

        match result {
            Ok(id) => {
                self.notifier.success("Saved reading to store");
                Ok(id)
            }
            Err(e) => {
                self.notifier.error("Save failed");
                Err(e.into())
            }
        }
    }

    /// Unmounts the dashboard: stops polling. In-flight polls are discarded.
    pub fn shutdown(&mut self) {
        self.acquisition.stop();
        logging::debug(Component::Dashboard, None, "dashboard unmounted");
    }
}
