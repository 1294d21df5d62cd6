//! Measurement recorder
//!
//! Owns the session of one open measurement screen. The host pushes live
//! slider positions in, asks for saves, and finally exits with one of the three
//! exit actions. Every other component is reached through this handle rather
//! than through ambient state.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

use crate::error::CoreError;
use crate::session::{close_session, open_session, SessionDisposition};
use crate::settings::SettingsStore;
use crate::store::SessionStore;
use crate::types::{Measurement, Modality, Session, SliderPosition};

/// How the user leaves a measurement screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    /// Save the pending value if needed, keep the session, close
    SaveAndExit,
    /// Close without saving; an empty session is discarded
    ExitWithoutSaving,
    /// Stay on the screen; nothing changes
    Cancel,
}

/// Whether the host should close the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseSignal {
    Closed { retained: bool },
    StayOpen,
}

/// Stateful recorder for a single measurement screen
pub struct MeasurementRecorder<S: SessionStore> {
    store: S,
    settings: Arc<SettingsStore>,
    session: Session,
    pending: SliderPosition,
    dirty: bool,
    closed: bool,
    rng: StdRng,
}

impl<S: SessionStore> MeasurementRecorder<S> {
    /// Open a session and compute the initial slider position
    pub fn open(store: S, settings: Arc<SettingsStore>, modality: Modality) -> Self {
        Self::with_rng(store, settings, modality, StdRng::from_entropy())
    }

    /// Open with a caller-provided random source (deterministic tests, previews)
    pub fn with_rng(
        store: S,
        settings: Arc<SettingsStore>,
        modality: Modality,
        mut rng: StdRng,
    ) -> Self {
        let session = open_session(modality);
        let pending = settings
            .reset_behavior()
            .next_position(modality, settings.last_position(modality).as_ref(), &mut rng);

        Self {
            store,
            settings,
            session,
            pending,
            dirty: false,
            closed: false,
            rng,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn modality(&self) -> Modality {
        self.session.modality
    }

    /// The position currently shown on the slider
    pub fn pending(&self) -> SliderPosition {
        self.pending
    }

    /// True when the pending position has not been saved
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Label the session (e.g. with the name of the other person)
    pub fn set_label(&mut self, label: Option<String>) {
        self.session.label = label;
    }

    /// Record the live slider position
    pub fn set_pending(&mut self, position: SliderPosition) {
        self.pending = position;
        self.dirty = true;
    }

    /// Save the pending position as a measurement.
    ///
    /// The session is committed to the store before the recorder adopts it; on
    /// failure the store is rolled back and the recorder is unchanged. After a
    /// successful save the next pending position comes from the reset behavior
    /// active at this moment.
    pub fn save(&mut self) -> Result<Measurement, CoreError> {
        let measurement = self.pending.to_measurement(self.modality())?;

        let mut updated = self.session.clone();
        updated.append(measurement.clone());
        self.store.insert(updated.clone());
        if let Err(e) = self.store.save() {
            self.store.rollback();
            return Err(e.into());
        }
        self.session = updated;

        let saved = SliderPosition::from_measurement(&measurement);
        if let Err(e) = self.settings.set_last_position(self.modality(), saved) {
            log::warn!("could not remember last position: {}", e);
        }

        let behavior = self.settings.reset_behavior();
        self.pending = behavior.next_position(self.modality(), Some(&saved), &mut self.rng);
        self.dirty = false;

        log::debug!(
            "saved measurement #{} ({:.3}) in session {}",
            self.session.len(),
            measurement.value(),
            self.session.id
        );
        Ok(measurement)
    }

    /// Leave the screen
    pub fn exit(&mut self, action: ExitAction) -> Result<CloseSignal, CoreError> {
        if self.closed {
            return Ok(CloseSignal::Closed {
                retained: !self.session.is_empty(),
            });
        }

        let signal = match action {
            ExitAction::Cancel => return Ok(CloseSignal::StayOpen),
            ExitAction::SaveAndExit => {
                if self.dirty || self.session.is_empty() {
                    self.save()?;
                }
                close_session(&mut self.store, &self.session, false)?;
                CloseSignal::Closed { retained: true }
            }
            ExitAction::ExitWithoutSaving => {
                let disposition = close_session(&mut self.store, &self.session, true)?;
                CloseSignal::Closed {
                    retained: disposition == SessionDisposition::Retained,
                }
            }
        };

        self.closed = true;
        log::debug!("closed session {} with {:?}", self.session.id, action);
        Ok(signal)
    }
}
