//! Alarm payload decoding and rule-based classification.
//!
//! An alarm event carries the complete list of alarms active at that instant as a JSON array of
//! `[code, description]` pairs. Each pair is classified by the first rule whose keyword occurs
//! (case-insensitively) in the description.

use crate::models::records::{AlertDailyCount, AlertDetail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Emergency,
    Error,
    /// Stored as `warning`
    Alert,
    Other,
}

impl AlertCategory {
    /// Value of the `alert_type` column.
    pub fn alert_type(&self) -> &'static str {
        match self {
            AlertCategory::Emergency => "emergency",
            AlertCategory::Error => "error",
            AlertCategory::Alert => "warning",
            AlertCategory::Other => "other",
        }
    }

    /// Only these categories are persisted row by row.
    pub fn keeps_detail(&self) -> bool {
        matches!(self, AlertCategory::Emergency | AlertCategory::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub category: AlertCategory,
    pub keywords: Vec<String>,
}

/// Ordered classification rules; the first matching rule wins, no match means `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRules {
    pub rules: Vec<AlertRule>,
}

impl Default for AlertRules {
    fn default() -> Self {
        let rule = |category, words: &[&str]| AlertRule {
            category,
            keywords: words.iter().map(|w| w.to_string()).collect(),
        };
        AlertRules {
            rules: vec![
                rule(AlertCategory::Emergency, &["emerg"]),
                rule(AlertCategory::Error, &["error", "err", "fallo", "fault"]),
                rule(AlertCategory::Alert, &["alert", "alarm", "warn", "aviso", "attention"]),
            ],
        }
    }
}

impl AlertRules {
    /// Parse rules from JSON such as `{"rules":[{"category":"emergency","keywords":["emerg"]}]}`.
    pub fn from_json(text: &str) -> Result<Self, String> {
        let de = &mut serde_json::Deserializer::from_str(text);
        let parsed: AlertRules = serde_path_to_error::deserialize(de)
            .map_err(|e| format!("invalid alert rules at {}: {}", e.path(), e.inner()))?;
        Ok(parsed.normalized())
    }

    fn normalized(self) -> Self {
        AlertRules {
            rules: self
                .rules
                .into_iter()
                .map(|r| AlertRule {
                    category: r.category,
                    keywords: r
                        .keywords
                        .into_iter()
                        .map(|k| k.trim().to_lowercase())
                        .filter(|k| !k.is_empty())
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn classify(&self, description: Option<&str>) -> AlertCategory {
        let Some(description) = description else {
            return AlertCategory::Other;
        };
        let haystack = description.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.keywords.iter().any(|k| haystack.contains(k.as_str())))
            .map(|r| r.category)
            .unwrap_or(AlertCategory::Other)
    }
}

/// One `[code, description]` element of an alarm payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmEntry {
    pub code: Option<String>,
    pub description: Option<String>,
    pub raw: Value,
}

fn element_text(elem: &Value, index: usize) -> Option<String> {
    let text = match elem.get(index)? {
        Value::String(s) => s.trim().to_string(),
        Value::Null => return None,
        other => other.to_string(),
    };
    if text.is_empty() { None } else { Some(text) }
}

/// Decode an alarm payload. Malformed or empty payloads yield `None`.
pub fn decode_payload(payload: Option<&str>) -> Option<Vec<AlarmEntry>> {
    let text = payload?.trim();
    if text.len() <= 2 || !text.starts_with('[') || !text.ends_with(']') {
        return None;
    }
    let elements: Vec<Value> = serde_json::from_str(text).ok()?;
    if elements.is_empty() {
        return None;
    }
    Some(
        elements
            .into_iter()
            .map(|elem| AlarmEntry {
                code: element_text(&elem, 0),
                description: element_text(&elem, 1),
                raw: elem,
            })
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedAlarm {
    pub timestamp: DateTime<Utc>,
    pub category: AlertCategory,
    pub entry: AlarmEntry,
}

/// Classify every entry of one alarm event; malformed payloads produce nothing.
pub fn classify_event(timestamp: DateTime<Utc>, payload: Option<&str>, rules: &AlertRules) -> Vec<ClassifiedAlarm> {
    decode_payload(payload)
        .unwrap_or_default()
        .into_iter()
        .map(|entry| ClassifiedAlarm {
            timestamp,
            category: rules.classify(entry.description.as_deref()),
            entry,
        })
        .collect()
}

/// Occurrences per category for one day. Categories that never occurred are omitted.
pub fn count_by_category(day: NaiveDate, alarms: &[ClassifiedAlarm]) -> Vec<AlertDailyCount> {
    let mut counts: BTreeMap<AlertCategory, i64> = BTreeMap::new();
    for alarm in alarms {
        *counts.entry(alarm.category).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(category, amount)| AlertDailyCount {
            day,
            alert_type: category.alert_type().to_string(),
            amount,
        })
        .collect()
}

/// Detail rows for the categories that keep them, newest first.
pub fn detail_rows(alarms: &[ClassifiedAlarm]) -> Vec<AlertDetail> {
    let mut rows: Vec<AlertDetail> = alarms
        .iter()
        .filter(|a| a.category.keeps_detail())
        .map(|a| AlertDetail {
            timestamp: a.timestamp,
            alert_type: a.category.alert_type().to_string(),
            alarm_code: a.entry.code.clone(),
            alarm_description: a.entry.description.clone(),
            raw_payload: Some(a.entry.raw.clone()),
        })
        .collect();
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    rows
}
