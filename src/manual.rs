//! Manual test input: classify and save a hand-entered reading.
//!
//! The form holds raw text, exactly as typed. Blank or unparseable fields
//! read as zero. Unlike the dashboard, a successful save leaves the form as
//! it was so the same sample can be tweaked and saved again.

use chrono::Utc;
use std::sync::{Mutex, MutexGuard};

use crate::classify::classify;
use crate::classify::coerce::parse_or_zero;
use crate::dashboard::check_save_preconditions;
use crate::model::{ActionError, NewReading, PollutionLabel, Reading, ValidationError};
use crate::notify::Notifier;
use crate::store::ReadingStoreClient;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualForm {
    pub temp: String,
    pub tds: String,
    pub ntu: String,
    pub dissolved_oxygen: String,
    pub ph: String,
    pub source: String,
}

impl ManualForm {
    pub fn to_reading(&self) -> Reading {
        Reading {
            temperature: parse_or_zero(&self.temp),
            tds: parse_or_zero(&self.tds),
            turbidity: parse_or_zero(&self.ntu),
            dissolved_oxygen: parse_or_zero(&self.dissolved_oxygen),
            ph: parse_or_zero(&self.ph),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManualTestView {
    pub form: ManualForm,
    pub label: Option<PollutionLabel>,
    pub saving: bool,
}

#[derive(Debug, Default)]
struct ManualState {
    form: ManualForm,
    label: Option<PollutionLabel>,
    saving: bool,
}

/// Clears `saving` when dropped, so a cancelled save does not leave the
/// form busy.
struct SavingGuard<'a> {
    state: &'a Mutex<ManualState>,
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        let mut st = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        st.saving = false;
    }
}

pub struct ManualTestController {
    store: ReadingStoreClient,
    notifier: Notifier,
    state: Mutex<ManualState>,
}

impl ManualTestController {
    pub fn new(store: ReadingStoreClient, notifier: Notifier) -> Self {
        Self {
            store,
            notifier,
            state: Mutex::new(ManualState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn view(&self) -> ManualTestView {
        let st = self.state();
        ManualTestView {
            form: st.form.clone(),
            label: st.label,
            saving: st.saving,
        }
    }

    /// Edits the form in place.
    pub fn update_form(&self, edit: impl FnOnce(&mut ManualForm)) {
        edit(&mut self.state().form);
    }

    pub fn classify(&self) -> PollutionLabel {
        let label = {
            let mut st = self.state();
            let label = classify(&st.form.to_reading());
            st.label = Some(label);
            label
        };
        self.notifier.success(&format!("Classified as: {}", label));
        label
    }

    /// Saves the form's current values under the last label.
    pub async fn save(&self) -> Result<String, ActionError> {
        let prepared = {
            let mut st = self.state();
            if st.saving {
                Err(ActionError::Busy)
            } else {
                match check_save_preconditions(st.label, &st.form.source) {
                    Ok(label) => {
                        st.saving = true;
                        Ok(NewReading {
                            reading: st.form.to_reading(),
                            label,
                            source: st.form.source.trim().to_string(),
                            recorded_at: Utc::now(),
                        })
                    }
                    Err(e) => Err(ActionError::from(e)),
                }
            }
        };

        let record = match prepared {
            Ok(record) => record,
            Err(e) => {
                match &e {
                    ActionError::Validation(ValidationError::MissingSource) => {
                        self.notifier.error("Add a source before saving")
                    }
                    ActionError::Validation(v) => self.notifier.error(&v.to_string()),
                    _ => {}
                }
                return Err(e);
            }
        };

        let saving = SavingGuard { state: &self.state };
        let result = self.store.append(&record).await;
        drop(saving);

        match result {
            Ok(id) => {
                self.notifier.success("Saved manual test to store");
                Ok(id)
            }
            Err(e) => {
                self.notifier.error("Save failed");
                Err(e.into())
            }
        }
    }
}
