//! Relational catalog: a flat row per section plus normalized course and
//! section tables
//!
//! [`CatalogSink`] writes three things for every entity: the flat row, the
//! section row, and (once per course family) the course row. The course
//! ledger lives in the sink so a store only has to execute inserts.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::RowSink;
use crate::error::SinkError;
use crate::models::EnrichedEntity;

/// Flat table columns, in bind order
pub const ROW_COLUMNS: [&str; 50] = [
    "course",
    "chargemsg1",
    "chargeamt1",
    "chargemsg2",
    "chargeamt2",
    "prefixname",
    "divisioncode",
    "divisionname",
    "schoolcode",
    "schoolname",
    "departmentcode",
    "departmentname",
    "subtermcode",
    "subtermname",
    "enrollmentstatus",
    "numfixedunits",
    "minunits",
    "maxunits",
    "coursetitle",
    "coursesubtitle",
    "approval",
    "bulletinflags",
    "classnotes",
    "prefixlongname",
    "description",
    "term",
    "meetson1",
    "starttime1",
    "endtime1",
    "building1",
    "room1",
    "callnumber",
    "campuscode",
    "campusname",
    "numenrolled",
    "maxsize",
    "typecode",
    "typename",
    "meets1",
    "meets2",
    "meets3",
    "meets4",
    "meets5",
    "meets6",
    "instructor1name",
    "instructor2name",
    "instructor3name",
    "instructor4name",
    "exammeet",
    "examdate",
];

/// Course table columns, one row per course family
pub const COURSE_COLUMNS: [&str; 22] = [
    "course",
    "coursefull",
    "prefixname",
    "divisioncode",
    "divisionname",
    "schoolcode",
    "schoolname",
    "departmentcode",
    "departmentname",
    "subtermcode",
    "subtermname",
    "enrollmentstatus",
    "numfixedunits",
    "minunits",
    "maxunits",
    "coursetitle",
    "coursesubtitle",
    "approval",
    "bulletinflags",
    "classnotes",
    "prefixlongname",
    "description",
];

/// Section table columns, one row per section
pub const SECTION_COLUMNS: [&str; 26] = [
    "course",
    "term",
    "meetson1",
    "starttime1",
    "endtime1",
    "building1",
    "room1",
    "callnumber",
    "campuscode",
    "campusname",
    "numenrolled",
    "maxsize",
    "typecode",
    "typename",
    "meets1",
    "meets2",
    "meets3",
    "meets4",
    "meets5",
    "meets6",
    "instructor1name",
    "instructor2name",
    "instructor3name",
    "instructor4name",
    "exammeet",
    "examdate",
];

pub const DEFAULT_ROWS_TABLE: &str = "courses_t";
pub const DEFAULT_COURSES_TABLE: &str = "courses_v2_t";
pub const DEFAULT_SECTIONS_TABLE: &str = "sections_v2_t";

/// Target table names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTables {
    pub rows: String,
    pub courses: String,
    pub sections: String,
}

impl Default for CatalogTables {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS_TABLE.to_string(),
            courses: DEFAULT_COURSES_TABLE.to_string(),
            sections: DEFAULT_SECTIONS_TABLE.to_string(),
        }
    }
}

/// Parameterized inserts for each table
#[derive(Debug, Clone)]
pub struct CatalogStatements {
    pub row: String,
    pub course: String,
    pub section: String,
}

impl CatalogStatements {
    pub fn new(tables: &CatalogTables) -> Result<Self, SinkError> {
        Ok(Self {
            row: insert_statement(&tables.rows, &ROW_COLUMNS)?,
            course: insert_statement(&tables.courses, &COURSE_COLUMNS)?,
            section: insert_statement(&tables.sections, &SECTION_COLUMNS)?,
        })
    }
}

/// Build `INSERT INTO table (...) VALUES ($1, ...)` for `columns`.
///
/// Table names may contain ASCII letters, digits, `_` and `.` only.
pub fn insert_statement(table: &str, columns: &[&str]) -> Result<String, SinkError> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid {
        return Err(SinkError::Other(format!("invalid table name: {table:?}")));
    }

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    Ok(format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    ))
}

/// Executes catalog inserts against a backing store
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_row(&self, row: &EnrichedEntity) -> Result<(), SinkError>;

    async fn insert_section(&self, row: &EnrichedEntity) -> Result<(), SinkError>;

    async fn insert_course(&self, row: &EnrichedEntity) -> Result<(), SinkError>;
}

/// Row sink writing the flat, section and course tables.
pub struct CatalogSink<S> {
    store: S,
    courses_seen: Mutex<HashSet<String>>,
}

impl<S: CatalogStore> CatalogSink<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            courses_seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Course families whose course row has been attempted
    pub async fn courses_written(&self) -> usize {
        self.courses_seen.lock().await.len()
    }
}

#[async_trait]
impl<S: CatalogStore> RowSink for CatalogSink<S> {
    /// Every insert is attempted; the first failure is returned.
    async fn write(&self, row: &EnrichedEntity) -> Result<(), SinkError> {
        let entity = &row.entity;
        let mut first_error = None;

        if let Err(err) = self.store.insert_row(row).await {
            first_error.get_or_insert(err);
        }

        if let Err(err) = self.store.insert_section(row).await {
            warn!(course = %entity.instance_key, error = %err, "Section insert failed");
            first_error.get_or_insert(err);
        }

        // A failed course insert is not retried for later sections.
        let first_sighting = self
            .courses_seen
            .lock()
            .await
            .insert(entity.course.full_code.clone());
        if first_sighting {
            debug!(course = %entity.course.full_code, "Inserting course row");
            if let Err(err) = self.store.insert_course(row).await {
                warn!(course = %entity.course.full_code, error = %err, "Course insert failed");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
