//! Session export
//!
//! Serializes a snapshot of sessions into CSV, TSV, or JSON. Encoding is a pure
//! computation: it either produces the whole buffer or fails without output.
//!
//! - CSV/TSV: one row per measurement, one column per secondary key seen
//!   anywhere in the exported set (sorted by key name)
//! - JSON: an array of session objects with nested measurements
//! - With `include_metadata == false`, timestamps and labels are left out entirely
//! - A selection without a single measurement is `NoData`

use chrono::{DateTime, Local, NaiveDate, SecondsFormat, Utc};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ExportError;
use crate::settings::Settings;
use crate::types::{Modality, Session};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Tsv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Tsv => "text/tab-separated-values",
            ExportFormat::Json => "application/json",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "tsv" => Some(ExportFormat::Tsv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }
}

/// Decimal separator used for numbers in CSV/TSV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalSeparator {
    #[default]
    Period,
    Comma,
}

impl DecimalSeparator {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "period" | "." => Some(DecimalSeparator::Period),
            "comma" | "," => Some(DecimalSeparator::Comma),
            _ => None,
        }
    }
}

/// Which sessions an export covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportScope {
    All,
    Single(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub include_metadata: bool,
    pub decimal_separator: DecimalSeparator,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            include_metadata: true,
            decimal_separator: DecimalSeparator::Period,
        }
    }
}

impl ExportOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            format: settings.export_format,
            include_metadata: settings.include_metadata,
            decimal_separator: settings.decimal_separator,
        }
    }

    /// Field delimiter. CSV switches to `;` when numbers use a decimal comma.
    pub fn delimiter(&self) -> u8 {
        match (self.format, self.decimal_separator) {
            (ExportFormat::Tsv, _) => b'\t',
            (_, DecimalSeparator::Comma) => b';',
            (_, DecimalSeparator::Period) => b',',
        }
    }
}

/// A finished export, ready to hand to the host's share sheet
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Exported session in the JSON format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSession {
    pub id: Uuid,
    pub modality: Modality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub measurements: Vec<ExportedMeasurement>,
}

/// Exported measurement in the JSON format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedMeasurement {
    pub value: f64,
    #[serde(default)]
    pub secondary: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Encode sessions in the requested format
pub fn export_sessions(sessions: &[Session], options: &ExportOptions) -> Result<Vec<u8>, ExportError> {
    export_sessions_cancellable(sessions, options, &CancellationToken::new())
}

/// Encode sessions, checking `cancel` between sessions.
///
/// A cancelled export returns `ExportError::Cancelled` and no buffer.
pub fn export_sessions_cancellable(
    sessions: &[Session],
    options: &ExportOptions,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ExportError> {
    if sessions.iter().all(Session::is_empty) {
        return Err(ExportError::NoData);
    }
    ensure_finite(sessions)?;

    let buffer = match options.format {
        ExportFormat::Csv | ExportFormat::Tsv => encode_delimited(sessions, options, cancel)?,
        ExportFormat::Json => encode_json(sessions, options, cancel)?,
    };

    if cancel.is_cancelled() {
        return Err(ExportError::Cancelled);
    }

    log::info!(
        "exported {} sessions as {} ({} bytes)",
        sessions.len(),
        options.format.extension(),
        buffer.len()
    );
    Ok(buffer)
}

/// Filter a snapshot by scope, encode it, and name the file for `date`
pub fn prepare_export(
    sessions: &[Session],
    scope: ExportScope,
    options: &ExportOptions,
    date: NaiveDate,
) -> Result<ExportFile, ExportError> {
    let selected: Vec<Session> = match scope {
        ExportScope::All => sessions.to_vec(),
        ExportScope::Single(id) => sessions.iter().filter(|s| s.id == id).cloned().collect(),
    };

    let content = export_sessions(&selected, options)?;
    Ok(ExportFile {
        filename: export_filename(scope, options.format, date),
        content,
    })
}

/// Deterministic export filename for a scope, format, and calendar date
pub fn export_filename(scope: ExportScope, format: ExportFormat, date: NaiveDate) -> String {
    let stem = match scope {
        ExportScope::All => "IOS_All_Sessions",
        ExportScope::Single(_) => "IOS_Session",
    };
    format!("{}_{}.{}", stem, date.format("%Y-%m-%d"), format.extension())
}

/// Export filename for today's local date
pub fn export_filename_today(scope: ExportScope, format: ExportFormat) -> String {
    export_filename(scope, format, Local::now().date_naive())
}

/// Parse a JSON export back into sessions
pub fn decode_json_export(bytes: &[u8]) -> Result<Vec<ExportedSession>, ExportError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn ensure_finite(sessions: &[Session]) -> Result<(), ExportError> {
    for session in sessions {
        for measurement in session.measurements() {
            let finite = measurement.value().is_finite()
                && measurement.secondary().values().all(|v| v.is_finite());
            if !finite {
                return Err(ExportError::EncodingFailure(format!(
                    "non-finite value in session {}",
                    session.id
                )));
            }
        }
    }
    Ok(())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_number(value: f64, separator: DecimalSeparator) -> String {
    let text = value.to_string();
    match separator {
        DecimalSeparator::Period => text,
        DecimalSeparator::Comma => text.replace('.', ","),
    }
}

/// TSV has no quoting, so field-breaking characters become spaces
fn sanitize_tsv(field: &str) -> String {
    field.replace(['\t', '\r', '\n'], " ")
}

fn encode_delimited(
    sessions: &[Session],
    options: &ExportOptions,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ExportError> {
    let is_tsv = options.format == ExportFormat::Tsv;
    let mut writer = WriterBuilder::new()
        .delimiter(options.delimiter())
        .quote_style(if is_tsv {
            QuoteStyle::Never
        } else {
            QuoteStyle::Necessary
        })
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let secondary_keys: BTreeSet<&str> = sessions
        .iter()
        .flat_map(|s| s.measurements())
        .flat_map(|m| m.secondary().keys().map(String::as_str))
        .collect();

    let mut header: Vec<String> = vec!["session_id".to_string(), "modality".to_string()];
    if options.include_metadata {
        header.push("session_created_at".to_string());
        header.push("session_label".to_string());
        header.push("measured_at".to_string());
    }
    header.push("value".to_string());
    header.extend(secondary_keys.iter().map(|k| k.to_string()));
    if is_tsv {
        header = header.iter().map(|h| sanitize_tsv(h)).collect();
    }
    writer.write_record(&header)?;

    for session in sessions {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        for measurement in session.measurements() {
            let mut row: Vec<String> = Vec::with_capacity(header.len());
            row.push(session.id.to_string());
            row.push(session.modality.as_str().to_string());
            if options.include_metadata {
                row.push(format_timestamp(session.created_at));
                row.push(session.label.clone().unwrap_or_default());
                row.push(format_timestamp(measurement.created_at()));
            }
            row.push(format_number(measurement.value(), options.decimal_separator));
            for key in &secondary_keys {
                row.push(
                    measurement
                        .secondary_value(key)
                        .map(|v| format_number(v, options.decimal_separator))
                        .unwrap_or_default(),
                );
            }

            if is_tsv {
                let row: Vec<String> = row.iter().map(|f| sanitize_tsv(f)).collect();
                writer.write_record(&row)?;
            } else {
                writer.write_record(&row)?;
            }
        }
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::EncodingFailure(e.to_string()))
}

fn encode_json(
    sessions: &[Session],
    options: &ExportOptions,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ExportError> {
    let mut exported = Vec::with_capacity(sessions.len());

    for session in sessions {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        let measurements = session
            .measurements()
            .iter()
            .map(|m| ExportedMeasurement {
                value: m.value(),
                secondary: m.secondary().clone(),
                created_at: options.include_metadata.then(|| m.created_at()),
            })
            .collect();

        exported.push(ExportedSession {
            id: session.id,
            modality: session.modality,
            created_at: options.include_metadata.then_some(session.created_at),
            label: if options.include_metadata {
                session.label.clone()
            } else {
                None
            },
            measurements,
        });
    }

    Ok(serde_json::to_vec_pretty(&exported)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Measurement, SELF_SCALE};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
    }

    fn secondary(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn make_session(modality: Modality, values: &[f64]) -> Session {
        let mut session = Session::open_at(modality, ts(9));
        for (i, value) in values.iter().enumerate() {
            session.append(Measurement::at(*value, BTreeMap::new(), ts(10 + i as u32)).unwrap());
        }
        session
    }

    fn make_session_with(modality: Modality, value: f64, pairs: &[(&str, f64)]) -> Session {
        let mut session = Session::open_at(modality, ts(9));
        session.append(Measurement::at(value, secondary(pairs), ts(10)).unwrap());
        session
    }

    fn csv_options() -> ExportOptions {
        ExportOptions {
            format: ExportFormat::Csv,
            include_metadata: false,
            decimal_separator: DecimalSeparator::Period,
        }
    }

    fn as_text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_csv_single_measurement_without_metadata() {
        let session = make_session_with(Modality::AdvancedIos, 0.5, &[(SELF_SCALE, 1.2)]);
        let text = as_text(export_sessions(&[session.clone()], &csv_options()).unwrap());

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "session_id,modality,value,selfScale");
        assert_eq!(lines[1], format!("{},advanced_ios,0.5,1.2", session.id));
    }

    #[test]
    fn test_csv_with_metadata_and_sparse_keys() {
        let mut first = make_session_with(Modality::AdvancedIos, 0.25, &[(SELF_SCALE, 1.1)]);
        first.label = Some("Alex, \"the\" friend".to_string());
        let second = make_session_with(Modality::Proximity, 0.8, &[("otherPosition", 0.3)]);

        let options = ExportOptions {
            include_metadata: true,
            ..csv_options()
        };
        let text = as_text(export_sessions(&[first.clone(), second.clone()], &options).unwrap());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "session_id,modality,session_created_at,session_label,measured_at,value,otherPosition,selfScale"
        );
        assert_eq!(
            lines[1],
            format!(
                "{},advanced_ios,2024-01-15T09:00:00.000Z,\"Alex, \"\"the\"\" friend\",2024-01-15T10:00:00.000Z,0.25,,1.1",
                first.id
            )
        );
        assert_eq!(
            lines[2],
            format!(
                "{},proximity,2024-01-15T09:00:00.000Z,,2024-01-15T10:00:00.000Z,0.8,0.3,",
                second.id
            )
        );
    }

    #[test]
    fn test_decimal_comma_switches_csv_delimiter() {
        let session = make_session_with(Modality::AdvancedIos, 0.5, &[(SELF_SCALE, 1.25)]);
        let options = ExportOptions {
            decimal_separator: DecimalSeparator::Comma,
            ..csv_options()
        };
        let text = as_text(export_sessions(&[session.clone()], &options).unwrap());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "session_id;modality;value;selfScale");
        assert_eq!(lines[1], format!("{};advanced_ios;0,5;1,25", session.id));
    }

    #[test]
    fn test_tsv_replaces_tabs_and_newlines() {
        let mut session = make_session(Modality::BasicIos, &[0.75]);
        session.label = Some("line one\nline\ttwo".to_string());
        let options = ExportOptions {
            format: ExportFormat::Tsv,
            include_metadata: true,
            decimal_separator: DecimalSeparator::Comma,
        };
        let text = as_text(export_sessions(&[session], &options).unwrap());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        let fields: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[3], "line one line two");
        assert_eq!(fields[5], "0,75");
    }

    #[test]
    fn test_json_round_trip() {
        let sessions = vec![
            make_session(Modality::BasicIos, &[0.5, 0.1 + 0.2]),
            make_session_with(
                Modality::AdvancedIos,
                0.25,
                &[(SELF_SCALE, 1.2), ("otherScale", 0.9)],
            ),
            make_session(Modality::Proximity, &[1.0 / 3.0, 0.0, 1.0]),
        ];
        let options = ExportOptions {
            format: ExportFormat::Json,
            ..ExportOptions::default()
        };

        let bytes = export_sessions(&sessions, &options).unwrap();
        let decoded = decode_json_export(&bytes).unwrap();

        assert_eq!(decoded.len(), sessions.len());
        let total: usize = decoded.iter().map(|s| s.measurements.len()).sum();
        assert_eq!(total, 6);

        for (source, exported) in sessions.iter().zip(&decoded) {
            assert_eq!(exported.id, source.id);
            assert_eq!(exported.modality, source.modality);
            assert_eq!(exported.created_at, Some(source.created_at));
            for (m, e) in source.measurements().iter().zip(&exported.measurements) {
                assert!((m.value() - e.value).abs() < 1e-9);
                assert_eq!(&e.secondary, m.secondary());
            }
        }
        assert_eq!(decoded[0].measurements[0].value.to_bits(), 0.5f64.to_bits());
        assert_eq!(decoded[1].measurements[0].value.to_bits(), 0.25f64.to_bits());
    }

    #[test]
    fn test_json_without_metadata_omits_fields() {
        let session = make_session(Modality::BasicIos, &[0.6]).with_label("Sam");
        let options = ExportOptions {
            format: ExportFormat::Json,
            include_metadata: false,
            decimal_separator: DecimalSeparator::Comma,
        };
        let bytes = export_sessions(&[session], &options).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        let exported = &value[0];
        assert!(exported.get("createdAt").is_none());
        assert!(exported.get("label").is_none());
        assert!(exported["measurements"][0].get("createdAt").is_none());
        assert_eq!(exported["measurements"][0]["value"], 0.6);
        assert_eq!(exported["modality"], "basic_ios");
    }

    #[test]
    fn test_empty_export_is_no_data() {
        for format in [ExportFormat::Csv, ExportFormat::Tsv, ExportFormat::Json] {
            let options = ExportOptions {
                format,
                ..ExportOptions::default()
            };
            assert!(matches!(export_sessions(&[], &options), Err(ExportError::NoData)));
        }
    }

    #[test]
    fn test_sessions_without_measurements_are_no_data() {
        let empty = vec![
            make_session(Modality::BasicIos, &[]),
            make_session(Modality::Proximity, &[]),
        ];
        for format in [ExportFormat::Csv, ExportFormat::Tsv, ExportFormat::Json] {
            let options = ExportOptions {
                format,
                ..ExportOptions::default()
            };
            assert!(matches!(export_sessions(&empty, &options), Err(ExportError::NoData)));
        }

        let mixed = vec![empty[0].clone(), make_session(Modality::BasicIos, &[0.3])];
        let text = as_text(export_sessions(&mixed, &csv_options()).unwrap());
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_tsv_sanitizes_secondary_key_names() {
        let session = make_session_with(Modality::AdvancedIos, 0.5, &[("a\tb", 1.1), ("c\nd", 0.9)]);
        let options = ExportOptions {
            format: ExportFormat::Tsv,
            ..csv_options()
        };
        let text = as_text(export_sessions(&[session], &options).unwrap());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        let header: Vec<&str> = lines[0].split('\t').collect();
        let row: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(header, vec!["session_id", "modality", "value", "a b", "c d"]);
        assert_eq!(row.len(), header.len());
    }

    #[test]
    fn test_single_scope_filters_and_names_file() {
        let wanted = make_session(Modality::BasicIos, &[0.4]);
        let other = make_session(Modality::BasicIos, &[0.9]);
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let file = prepare_export(
            &[other.clone(), wanted.clone()],
            ExportScope::Single(wanted.id),
            &csv_options(),
            date,
        )
        .unwrap();
        assert_eq!(file.filename, "IOS_Session_2024-03-09.csv");
        let text = as_text(file.content);
        assert!(text.contains(&wanted.id.to_string()));
        assert!(!text.contains(&other.id.to_string()));

        let missing = prepare_export(
            &[other],
            ExportScope::Single(Uuid::new_v4()),
            &csv_options(),
            date,
        );
        assert!(matches!(missing, Err(ExportError::NoData)));
    }

    #[test]
    fn test_filenames_are_deterministic() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        assert_eq!(
            export_filename(ExportScope::All, ExportFormat::Tsv, date),
            "IOS_All_Sessions_2024-12-01.tsv"
        );
        assert_eq!(
            export_filename(ExportScope::All, ExportFormat::Json, date),
            export_filename(ExportScope::All, ExportFormat::Json, date)
        );
        assert!(export_filename_today(ExportScope::All, ExportFormat::Csv).ends_with(".csv"));
    }

    #[test]
    fn test_cancelled_export_returns_nothing() {
        let session = make_session(Modality::BasicIos, &[0.5]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        for format in [ExportFormat::Csv, ExportFormat::Json] {
            let options = ExportOptions {
                format,
                ..ExportOptions::default()
            };
            let result = export_sessions_cancellable(&[session.clone()], &options, &cancel);
            assert!(matches!(result, Err(ExportError::Cancelled)));
        }
    }

    #[test]
    fn test_options_from_settings() {
        let settings = Settings {
            export_format: ExportFormat::Tsv,
            include_metadata: false,
            ..Settings::default()
        };
        let options = ExportOptions::from_settings(&settings);
        assert_eq!(options.format, ExportFormat::Tsv);
        assert!(!options.include_metadata);
        assert_eq!(options.delimiter(), b'\t');
    }
}
