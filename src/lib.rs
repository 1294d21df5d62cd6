//! IOS Closeness - On-device core for "Inclusion of Other in the Self" measurements
//!
//! The core turns raw slider input into persisted measurements and exports them:
//! slider position → measurement → session → store → CSV/TSV/JSON export.
//!
//! ## Modules
//!
//! - **Measurements**: modalities, clamped measurements, and sessions
//! - **Reset behavior**: the starting slider position after each save
//! - **Labels**: human-readable descriptors for overlap and proximity values
//! - **Export**: deterministic serialization and filenames

pub mod error;
pub mod export;
pub mod labels;
pub mod recorder;
pub mod reset;
pub mod session;
pub mod settings;
pub mod store;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use error::{CoreError, ExportError, PersistenceError, ValidationError};
pub use export::{
    export_filename, export_sessions, prepare_export, DecimalSeparator, ExportFormat,
    ExportOptions, ExportScope,
};
pub use labels::{overlap_label, proximity_description, proximity_label};
pub use recorder::{CloseSignal, ExitAction, MeasurementRecorder};
pub use reset::ResetBehavior;
pub use session::{append_measurement, close_session, create_measurement, open_session};
pub use settings::{Settings, SettingsStore};
pub use store::{JsonFileStore, MemoryStore, SessionStore};
pub use types::{Measurement, Modality, Session, SliderPosition};

/// Core version embedded in reports and the FFI surface
pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "ios-closeness";
