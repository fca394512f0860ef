use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MALE" | "M" => Some(Self::Male),
            "FEMALE" | "F" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "MALE",
            Self::Female => "FEMALE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LateStatus {
    Informed,
    #[serde(rename = "Not Informed", alias = "NotInformed")]
    NotInformed,
    #[serde(rename = "Letter Given", alias = "LetterGiven")]
    LetterGiven,
}

impl LateStatus {
    pub fn parse(s: &str) -> Option<Self> {
        let compact: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.as_str() {
            "informed" => Some(Self::Informed),
            "notinformed" => Some(Self::NotInformed),
            "lettergiven" => Some(Self::LetterGiven),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Informed => "Informed",
            Self::NotInformed => "Not Informed",
            Self::LetterGiven => "Letter Given",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub department_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub department_id: String,
    pub class_id: String,
    pub register_no: String,
    pub gender: Gender,
    pub parent_phone_number: Option<String>,
    pub mentor: Option<String>,
}

/// One late arrival. Names are copied from the reference data when the record
/// is created so old rows stay readable after renames and moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LateRecord {
    pub id: String,
    pub student_id: Option<String>,
    pub student_name: String,
    pub register_no: String,
    pub gender: Option<Gender>,
    pub department_name: String,
    pub class_name: String,
    pub date: String,
    pub time: String,
    /// Raw stored value; see [`LateRecord::instant`].
    pub timestamp: Option<String>,
    pub marked_by: String,
    pub status: LateStatus,
}

impl LateRecord {
    /// `None` when the timestamp is missing or unparseable.
    pub fn instant(&self) -> Option<NaiveDateTime> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }

    pub fn day(&self) -> Option<NaiveDate> {
        self.instant().map(|t| t.date())
    }
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(v) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(v);
        }
    }
    None
}

pub fn format_timestamp(t: NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Some(d);
    }
    parse_timestamp(t).map(|v| v.date())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_accepts_rfc3339_and_naive_forms() {
        let a = parse_timestamp("2025-03-10T08:15:00+05:30").expect("rfc3339");
        assert_eq!(format_timestamp(a), "2025-03-10T08:15:00.000");
        let b = parse_timestamp("2025-03-10 23:59:59.999").expect("space form");
        assert_eq!(format_timestamp(b), "2025-03-10T23:59:59.999");
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("   ").is_none());
    }

    #[test]
    fn status_parses_wire_and_compact_spellings() {
        assert_eq!(LateStatus::parse("Not Informed"), Some(LateStatus::NotInformed));
        assert_eq!(LateStatus::parse("letter_given"), Some(LateStatus::LetterGiven));
        assert_eq!(LateStatus::parse("late"), None);
        let s: LateStatus = serde_json::from_str("\"NotInformed\"").expect("alias");
        assert_eq!(serde_json::to_string(&s).expect("ser"), "\"Not Informed\"");
    }
}
