//! Session lifecycle
//!
//! A session is opened with a measurement screen, grows only by appending
//! measurements, and is closed when the screen goes away. Empty sessions are
//! transient; anything with at least one measurement is kept until deleted.

use std::collections::BTreeMap;

use crate::error::{PersistenceError, ValidationError};
use crate::store::SessionStore;
use crate::types::{Measurement, Modality, Session};

/// What happened to a session on close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDisposition {
    Retained,
    Discarded,
}

/// Open an empty session for a modality
pub fn open_session(modality: Modality) -> Session {
    let session = Session::open(modality);
    log::debug!("opened {} session {}", modality.as_str(), session.id);
    session
}

/// Construct a measurement (clamped into `[0, 1]`, non-finite rejected)
pub fn create_measurement(
    value: f64,
    secondary: BTreeMap<String, f64>,
) -> Result<Measurement, ValidationError> {
    Measurement::new(value, secondary)
}

/// Append a measurement to the end of a session
pub fn append_measurement(session: &mut Session, measurement: Measurement) {
    session.append(measurement);
}

/// Close a session.
///
/// With `discard_if_empty` an empty session is removed from the store (if it
/// was ever staged). Every other session is left exactly as it is.
pub fn close_session<S: SessionStore>(
    store: &mut S,
    session: &Session,
    discard_if_empty: bool,
) -> Result<SessionDisposition, PersistenceError> {
    if discard_if_empty && session.is_empty() {
        if store.delete(session.id) {
            store.save()?;
        }
        log::debug!("discarded empty session {}", session.id);
        return Ok(SessionDisposition::Discarded);
    }

    Ok(SessionDisposition::Retained)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_close_discards_empty_session() {
        let mut store = MemoryStore::new();
        let session = open_session(Modality::BasicIos);
        store.insert(session.clone());
        store.save().unwrap();

        let disposition = close_session(&mut store, &session, true).unwrap();
        assert_eq!(disposition, SessionDisposition::Discarded);
        assert!(store.get(session.id).is_none());
        assert!(store.committed_sessions().is_empty());
    }

    #[test]
    fn test_close_retains_non_empty_session() {
        let mut store = MemoryStore::new();
        let mut session = open_session(Modality::Proximity);
        append_measurement(&mut session, create_measurement(0.4, BTreeMap::new()).unwrap());
        store.insert(session.clone());
        store.save().unwrap();

        let disposition = close_session(&mut store, &session, true).unwrap();
        assert_eq!(disposition, SessionDisposition::Retained);
        assert_eq!(store.get(session.id), Some(session));
    }

    #[test]
    fn test_close_without_discard_keeps_empty_session() {
        let mut store = MemoryStore::new();
        let session = open_session(Modality::AdvancedIos);
        store.insert(session.clone());

        let disposition = close_session(&mut store, &session, false).unwrap();
        assert_eq!(disposition, SessionDisposition::Retained);
        assert!(store.get(session.id).is_some());
    }

    #[test]
    fn test_create_measurement_clamps() {
        assert_eq!(create_measurement(1.4, BTreeMap::new()).unwrap().value(), 1.0);
        assert_eq!(create_measurement(-0.3, BTreeMap::new()).unwrap().value(), 0.0);
        assert!(create_measurement(f64::NAN, BTreeMap::new()).is_err());
    }
}
