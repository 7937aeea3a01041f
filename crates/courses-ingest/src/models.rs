//! Record shapes flowing through the pipeline

use chrono::NaiveTime;
use courses_common::{CourseKey, Enrichment, GroupKey, InstanceKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One decoded element of the input array.
///
/// Kept as the raw JSON object: the normalizer pulls the fields it knows
/// about and ignores the rest.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Remove a field and render it as text.
    ///
    /// Strings are returned as-is, numbers and booleans in their JSON form;
    /// missing, `null` and nested values become empty text.
    pub fn take_text(&mut self, field: &str) -> String {
        match self.0.remove(field) {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Meeting time and place parsed from the fixed-width `Meets1` column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub days: String,
    #[serde(serialize_with = "serialize_clock")]
    pub start: NaiveTime,
    #[serde(serialize_with = "serialize_clock")]
    pub end: NaiveTime,
    pub building: String,
    pub room: String,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            days: String::new(),
            start: NaiveTime::MIN,
            end: NaiveTime::MIN,
            building: String::new(),
            room: String::new(),
        }
    }
}

fn serialize_clock<S: serde::Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format("%H:%M:%S"))
}

/// Descriptive fields shared by every section of a course family
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CourseInfo {
    /// Department, symbol and number, e.g. `COMSW4995`
    pub full_code: String,
    pub title: String,
    pub subtitle: String,
    pub prefix_name: String,
    pub prefix_long_name: String,
    pub division_code: String,
    pub division_name: String,
    pub school_code: String,
    pub school_name: String,
    pub department_code: String,
    pub department_name: String,
    pub subterm_code: String,
    pub subterm_name: String,
    pub enrollment_status: String,
    pub num_fixed_units: String,
    pub min_units: String,
    pub max_units: String,
    pub approval: String,
    pub bulletin_flags: String,
    pub class_notes: String,
}

/// Per-section schedule, enrollment and staffing fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SectionInfo {
    pub call_number: String,
    pub campus_code: String,
    pub campus_name: String,
    pub num_enrolled: String,
    pub max_size: String,
    pub type_code: String,
    pub type_name: String,
    pub schedule: Schedule,
    /// Raw `Meets1`..`Meets6` columns
    pub meets: [String; 6],
    /// `Instructor1Name`..`Instructor4Name`, empty when unset
    pub instructors: [String; 4],
    pub exam_meet: String,
    pub exam_date: String,
}

impl SectionInfo {
    pub fn named_instructors(&self) -> impl Iterator<Item = &str> {
        self.instructors
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Charge {
    pub message: String,
    pub amount: String,
}

/// A normalized section record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalEntity {
    #[serde(skip)]
    pub key: CourseKey,
    pub group_key: GroupKey,
    pub instance_key: InstanceKey,
    /// The `Course` field as it appeared in the input
    pub course_code: String,
    pub term: String,
    pub course: CourseInfo,
    pub section: SectionInfo,
    pub charges: [Charge; 2],
}

impl CanonicalEntity {
    /// Build an entity with only its keys set.
    pub fn from_key(key: CourseKey, term: impl Into<String>) -> Self {
        Self {
            group_key: key.group_key(),
            instance_key: key.instance_key(),
            course_code: key.to_string(),
            course: CourseInfo {
                full_code: key.full_code(),
                ..CourseInfo::default()
            },
            key,
            term: term.into(),
            section: SectionInfo::default(),
            charges: Default::default(),
        }
    }
}

/// An entity with its course family's enrichment attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedEntity {
    pub entity: CanonicalEntity,
    pub enrichment: Enrichment,
}

/// Serialized form of an enriched entity, one per output row
#[derive(Debug, Serialize)]
pub struct EnrichedRow<'a> {
    #[serde(flatten)]
    pub entity: &'a CanonicalEntity,
    pub description: Option<&'a str>,
    pub enrichment: &'static str,
}

impl<'a> From<&'a EnrichedEntity> for EnrichedRow<'a> {
    fn from(row: &'a EnrichedEntity) -> Self {
        Self {
            entity: &row.entity,
            description: row.enrichment.text(),
            enrichment: row.enrichment.status(),
        }
    }
}
