//! Data models for CyberGuard.
//!
//! # Producer Trust
//!
//! Threat records are produced by an external detection backend and are
//! read-only to this system. Decoding is **fail-open**: a record with missing
//! or unrecognised fields is accepted as-is and the gaps are rendered as
//! placeholders further down the pipeline. Nothing in this module rejects a
//! record because of a missing field.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A single threat detected by the backend.
///
/// Records are immutable once received. A newer record carrying the same `id`
/// supersedes the stored one (e.g. a correction event); records never expire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatRecord {
    /// Producer-assigned identifier, unique across a reconciled timeline.
    ///
    /// Empty when the producer omitted it; such records are never merged.
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: String,

    /// When the threat was detected. Drives all ordering.
    ///
    /// `None` when the producer omitted it or sent something unparseable.
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Risk score, 0-100.
    #[serde(default, deserialize_with = "lenient::score")]
    pub risk_score: Option<u32>,

    /// Ordered severity classification.
    #[serde(default)]
    pub risk_level: RiskLevel,

    /// Factor name to severity (0-5), in producer order.
    #[serde(default, deserialize_with = "lenient::factors")]
    pub risk_factors: IndexMap<String, i64>,

    #[serde(default, deserialize_with = "lenient::scenario")]
    pub scenario: Scenario,

    /// Recommended actions, in producer order.
    #[serde(default, deserialize_with = "lenient::strings")]
    pub recommendations: Vec<String>,

    /// Actions the producer already executed, possibly empty.
    #[serde(default, deserialize_with = "lenient::strings")]
    pub automated_actions: Vec<String>,

    /// Producer certainty, 0-100. The backend emits one decimal place.
    #[serde(default, deserialize_with = "lenient::confidence")]
    pub confidence: Option<f64>,
}

impl ThreatRecord {
    /// Build a record with only the fields that drive reconciliation set.
    pub fn new(id: &str, risk_level: RiskLevel, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            timestamp: Some(timestamp),
            risk_score: None,
            risk_level,
            risk_factors: IndexMap::new(),
            scenario: Scenario::default(),
            recommendations: Vec::new(),
            automated_actions: Vec::new(),
            confidence: None,
        }
    }

    pub fn with_score(mut self, score: u32) -> Self {
        self.risk_score = Some(score);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_scenario(mut self, kind: &str, description: &str, severity: &str) -> Self {
        self.scenario = Scenario {
            kind: kind.to_string(),
            description: description.to_string(),
            severity: severity.to_string(),
        };
        self
    }

    pub fn with_factor(mut self, name: &str, value: i64) -> Self {
        self.risk_factors.insert(name.to_string(), value);
        self
    }

    pub fn with_recommendation(mut self, action: &str) -> Self {
        self.recommendations.push(action.to_string());
        self
    }

    pub fn with_automated_action(mut self, action: &str) -> Self {
        self.automated_actions.push(action.to_string());
        self
    }

    /// Whether this record counts towards the critical aggregate.
    pub fn is_critical(&self) -> bool {
        self.risk_level == RiskLevel::Critical
    }

    /// Scenario type, or `None` when the producer left it blank.
    pub fn scenario_type(&self) -> Option<&str> {
        let kind = self.scenario.kind.trim();
        (!kind.is_empty()).then_some(kind)
    }

    /// Confidence formatted the way the producer reports it (`98.5`, `97`).
    pub fn confidence_label(&self) -> String {
        match self.confidence {
            Some(c) if c.fract() == 0.0 => format!("{}", c as i64),
            Some(c) => format!("{:.1}", c),
            None => String::new(),
        }
    }

    /// Risk score as text, blank when missing.
    pub fn score_label(&self) -> String {
        self.risk_score.map(|s| s.to_string()).unwrap_or_default()
    }
}

/// The threat scenario attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub severity: String,
}

/// Ordered severity: `LOW < MEDIUM < HIGH < CRITICAL`.
///
/// `Unknown` absorbs missing or unrecognised levels and sorts below `Low`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    #[default]
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Parse a level case-insensitively. Anything unrecognised is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "LOW" => RiskLevel::Low,
            "MEDIUM" => RiskLevel::Medium,
            "HIGH" => RiskLevel::High,
            "CRITICAL" => RiskLevel::Critical,
            _ => RiskLevel::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Unknown => "UNKNOWN",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    /// Severity colour shared by the report and view layers.
    ///
    /// CRITICAL and HIGH share red.
    pub fn color(&self) -> Rgb {
        match self {
            RiskLevel::Critical => Rgb::RED,
            RiskLevel::High => Rgb::RED,
            RiskLevel::Medium => Rgb::AMBER,
            RiskLevel::Low => Rgb::GREEN,
            _ => Rgb::GREY,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for RiskLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for RiskLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::String(s)) => RiskLevel::from_label(&s),
            _ => RiskLevel::Unknown,
        })
    }
}

/// An sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const RED: Rgb = Rgb(220, 38, 38);
    pub const AMBER: Rgb = Rgb(202, 138, 4);
    pub const GREEN: Rgb = Rgb(22, 163, 74);
    pub const GREY: Rgb = Rgb(100, 116, 139);

    /// CSS-style `#rrggbb`.
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

/// Running aggregates over the reconciled timeline.
///
/// Invariant: `critical <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total: u64,
    pub critical: u64,
}

impl AggregateStats {
    /// Count a sequence of records from scratch.
    pub fn scan<'a>(records: impl IntoIterator<Item = &'a ThreatRecord>) -> Self {
        records
            .into_iter()
            .fold(AggregateStats::default(), |mut stats, record| {
                stats.total += 1;
                if record.is_critical() {
                    stats.critical += 1;
                }
                stats
            })
    }

    pub fn is_consistent(&self) -> bool {
        self.critical <= self.total
    }
}

/// Newest-first sequence of records; ties keep arrival order.
pub type Timeline = VecDeque<ThreatRecord>;

/// A message pushed by the backend's live channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushMessage {
    NewThreat(ThreatRecord),
}

/// Query parameters for the history endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Case-insensitive search over scenario type and risk level.
    #[serde(default)]
    pub q: Option<String>,
}

/// Output format for report endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Pdf,
    /// The laid-out document, for inspection and testing.
    Json,
}

/// Query parameters for report endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub format: ReportFormat,

    /// Restrict the audit report to matching records.
    #[serde(default)]
    pub q: Option<String>,
}

/// Decode a snapshot array element by element.
///
/// Elements that are not records at all are skipped; everything else is
/// accepted with placeholders for whatever is missing.
pub fn decode_snapshot(values: Vec<Value>) -> Vec<ThreatRecord> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping undecodable threat record");
                None
            }
        })
        .collect()
}

/// Fail-open field decoders.
mod lenient {
    use super::*;

    pub fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(as_text).unwrap_or_default())
    }

    /// A scenario object; anything else is an empty scenario.
    pub fn scenario<'de, D>(deserializer: D) -> Result<Scenario, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        let Some(Value::Object(fields)) = value else {
            return Ok(Scenario::default());
        };
        let text = |key: &str| fields.get(key).and_then(as_text).unwrap_or_default();
        Ok(Scenario {
            kind: text("type"),
            description: text("description"),
            severity: text("severity"),
        })
    }

    /// A list of strings. Non-text entries are dropped, a non-list is empty.
    pub fn strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Array(items)) => items.iter().filter_map(as_text).collect(),
            _ => Vec::new(),
        })
    }

    pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::String(s)) => parse_timestamp(&s),
            _ => None,
        })
    }

    pub fn score<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value
            .as_ref()
            .and_then(as_f64)
            .filter(|n| *n >= 0.0)
            .map(|n| n.round() as u32))
    }

    pub fn confidence<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value
            .as_ref()
            .and_then(as_f64)
            .map(|n| (n * 10.0).round() / 10.0))
    }

    pub fn factors<'de, D>(deserializer: D) -> Result<IndexMap<String, i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        let Some(Value::Object(fields)) = value else {
            return Ok(IndexMap::new());
        };
        Ok(fields
            .into_iter()
            .filter_map(|(name, value)| as_f64(&value).map(|n| (name, n.round() as i64)))
            .collect())
    }

    fn as_text(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Parse RFC 3339, or a naive ISO-8601 timestamp interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_decode_full_record() {
        let record: ThreatRecord = serde_json::from_value(json!({
            "id": "0b6f1c1e-5d7a-4a57-9c0e-1f2a3b4c5d6e",
            "timestamp": "2025-03-01T10:15:30.123456",
            "risk_score": 92,
            "risk_level": "CRITICAL",
            "risk_factors": {"frequency": 5, "behavioral": 5, "geographic": 3},
            "scenario": {
                "type": "Brute Force Authentication",
                "description": "Multiple failed login attempts.",
                "severity": "Critical"
            },
            "recommendations": ["Lock account immediately", "Block source IP address"],
            "confidence": 98.5,
            "_id": "65f0c0ffee",
            "created_at": "2025-03-01T10:15:31"
        }))
        .unwrap();

        assert_eq!(record.risk_level, RiskLevel::Critical);
        assert_eq!(record.risk_score, Some(92));
        assert_eq!(record.confidence_label(), "98.5");
        assert_eq!(
            record.timestamp.unwrap().timestamp(),
            Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 30).unwrap().timestamp()
        );
        let names: Vec<_> = record.risk_factors.keys().cloned().collect();
        assert_eq!(names, vec!["frequency", "behavioral", "geographic"]);
        assert!(record.automated_actions.is_empty());
    }

    #[test]
    fn test_decode_missing_fields_fail_open() {
        let record: ThreatRecord = serde_json::from_value(json!({"id": "x"})).unwrap();

        assert_eq!(record.id, "x");
        assert!(record.timestamp.is_none());
        assert_eq!(record.risk_level, RiskLevel::Unknown);
        assert!(record.scenario_type().is_none());
        assert_eq!(record.confidence_label(), "");
        assert_eq!(record.score_label(), "");
    }

    #[test]
    fn test_decode_nulls_and_garbage() {
        let record: ThreatRecord = serde_json::from_value(json!({
            "id": "y",
            "timestamp": "yesterday-ish",
            "risk_level": "catastrophic",
            "scenario": null,
            "recommendations": null,
            "risk_factors": {"heuristic": "4", "label": "n/a"},
            "confidence": "97"
        }))
        .unwrap();

        assert!(record.timestamp.is_none());
        assert_eq!(record.risk_level, RiskLevel::Unknown);
        assert_eq!(record.scenario, Scenario::default());
        assert!(record.recommendations.is_empty());
        assert_eq!(record.risk_factors.get("heuristic"), Some(&4));
        assert!(!record.risk_factors.contains_key("label"));
        assert_eq!(record.confidence_label(), "97");
    }

    #[test]
    fn test_risk_level_case_insensitive_and_ordered() {
        assert_eq!(RiskLevel::from_label("high"), RiskLevel::High);
        assert_eq!(RiskLevel::from_label(" Critical "), RiskLevel::Critical);
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
        assert!(RiskLevel::Low > RiskLevel::Unknown);
    }

    #[test]
    fn test_severity_colors() {
        assert_eq!(RiskLevel::Critical.color(), Rgb::RED);
        assert_eq!(RiskLevel::High.color(), Rgb::RED);
        assert_eq!(RiskLevel::Medium.color(), Rgb::AMBER);
        assert_eq!(RiskLevel::Low.color(), Rgb::GREEN);
        assert_eq!(RiskLevel::Unknown.color(), Rgb::GREY);
        assert_eq!(Rgb::RED.hex(), "#dc2626");
    }

    #[test]
    fn test_stats_scan() {
        let now = Utc::now();
        let records = vec![
            ThreatRecord::new("a", RiskLevel::Critical, now),
            ThreatRecord::new("b", RiskLevel::High, now),
            ThreatRecord::new("c", RiskLevel::Critical, now),
        ];

        let stats = AggregateStats::scan(&records);

        assert_eq!(stats, AggregateStats { total: 3, critical: 2 });
        assert!(stats.is_consistent());
        assert!(!AggregateStats { total: 1, critical: 2 }.is_consistent());
    }

    #[test]
    fn test_decode_snapshot_skips_non_records() {
        let values = vec![json!({"id": "a"}), json!(42), json!({"id": "b"})];

        let records = decode_snapshot(values);

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].id, "b");
    }

    #[test]
    fn test_decode_snapshot_keeps_factor_order() {
        let values: Vec<Value> = serde_json::from_str(
            r#"[{"id": "a", "risk_factors": {"frequency": 5, "behavioral": 4, "geographic": 3}}]"#,
        )
        .unwrap();

        let records = decode_snapshot(values);

        let names: Vec<_> = records[0].risk_factors.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["frequency", "behavioral", "geographic"]);
    }

    #[test]
    fn test_decode_wrong_types_fail_open() {
        let record: ThreatRecord = serde_json::from_value(json!({
            "id": 1042,
            "scenario": "x",
            "risk_factors": [],
            "recommendations": "Block it",
            "automated_actions": ["isolate_host", 7, null]
        }))
        .unwrap();

        assert_eq!(record.id, "1042");
        assert_eq!(record.scenario, Scenario::default());
        assert!(record.risk_factors.is_empty());
        assert!(record.recommendations.is_empty());
        assert_eq!(record.automated_actions, vec!["isolate_host", "7"]);
    }

    #[test]
    fn test_decode_scenario_fields_leniently() {
        let record: ThreatRecord = serde_json::from_value(json!({
            "scenario": {"type": "Port Scan", "description": null, "severity": 3}
        }))
        .unwrap();

        assert_eq!(record.scenario.kind, "Port Scan");
        assert_eq!(record.scenario.description, "");
        assert_eq!(record.scenario.severity, "3");
        assert_eq!(record.id, "");
    }

    #[test]
    fn test_push_with_wrong_types_still_decodes() {
        let message: PushMessage = serde_json::from_value(json!({
            "event": "new_threat",
            "data": {"id": 7, "scenario": "x", "risk_factors": []}
        }))
        .unwrap();

        let PushMessage::NewThreat(record) = message;
        assert_eq!(record.id, "7");
    }

    #[test]
    fn test_push_message_envelope() {
        let message: PushMessage = serde_json::from_value(json!({
            "event": "new_threat",
            "data": {"id": "live-1", "risk_level": "HIGH"}
        }))
        .unwrap();

        let PushMessage::NewThreat(record) = message;
        assert_eq!(record.id, "live-1");
        assert_eq!(record.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-03-01T10:15:30Z").is_some());
        assert!(parse_timestamp("2025-03-01T10:15:30+02:00").is_some());
        assert!(parse_timestamp("2025-03-01T10:15:30").is_some());
        assert!(parse_timestamp("2025-03-01 10:15:30.5").is_some());
        assert!(parse_timestamp("not a time").is_none());
    }
}
