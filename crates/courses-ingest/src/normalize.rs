//! Raw record to canonical entity transformation
//!
//! Everything here is pure. Field-level problems (unparseable times, non-numeric
//! counts) fall back to neutral values; only a malformed course code rejects
//! the record.

use chrono::NaiveTime;
use courses_common::CourseKey;

use crate::error::MalformedKeyError;
use crate::models::{CanonicalEntity, Charge, CourseInfo, RawRecord, Schedule, SectionInfo};

/// A fixed column range within the `Meets1` string. `end: None` runs to the
/// end of the string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: Option<usize>,
}

impl Window {
    pub const fn new(start: usize, end: Option<usize>) -> Self {
        Self { start, end }
    }

    /// Characters in the window with spaces removed. The range is clamped to
    /// the string; a window starting past the end yields empty text.
    pub fn extract(&self, s: &str) -> String {
        let take = match self.end {
            Some(end) => end.saturating_sub(self.start),
            None => usize::MAX,
        };
        s.chars()
            .skip(self.start)
            .take(take)
            .filter(|c| *c != ' ')
            .collect()
    }
}

pub const DAYS: Window = Window::new(0, Some(7));
pub const START_TIME: Window = Window::new(7, Some(13));
pub const END_TIME: Window = Window::new(14, Some(20));
pub const BUILDING: Window = Window::new(24, Some(35));
pub const ROOM: Window = Window::new(35, None);

/// Normalize one decoded record.
pub fn normalize(mut raw: RawRecord) -> Result<CanonicalEntity, MalformedKeyError> {
    let course_code = raw.take_text("Course");
    let key = CourseKey::parse(&course_code)?;

    let course = CourseInfo {
        full_code: key.full_code(),
        title: raw.take_text("CourseTitle"),
        subtitle: raw.take_text("CourseSubtitle"),
        prefix_name: raw.take_text("PrefixName"),
        prefix_long_name: raw.take_text("PrefixLongname"),
        division_code: raw.take_text("DivisionCode"),
        division_name: raw.take_text("DivisionName"),
        school_code: raw.take_text("SchoolCode"),
        school_name: raw.take_text("SchoolName"),
        department_code: raw.take_text("DepartmentCode"),
        department_name: raw.take_text("DepartmentName"),
        subterm_code: raw.take_text("SubtermCode"),
        subterm_name: raw.take_text("SubtermName"),
        enrollment_status: raw.take_text("EnrollmentStatus"),
        num_fixed_units: coerce_integer(&raw.take_text("NumFixedUnits")),
        min_units: coerce_integer(&raw.take_text("MinUnits")),
        max_units: coerce_integer(&raw.take_text("MaxUnits")),
        approval: raw.take_text("Approval"),
        bulletin_flags: raw.take_text("BulletinFlags"),
        class_notes: raw.take_text("ClassNotes"),
    };

    let meets = [
        raw.take_text("Meets1"),
        raw.take_text("Meets2"),
        raw.take_text("Meets3"),
        raw.take_text("Meets4"),
        raw.take_text("Meets5"),
        raw.take_text("Meets6"),
    ];

    let section = SectionInfo {
        call_number: coerce_integer(&raw.take_text("CallNumber")),
        campus_code: raw.take_text("CampusCode"),
        campus_name: raw.take_text("CampusName"),
        num_enrolled: coerce_integer(&raw.take_text("NumEnrolled")),
        max_size: coerce_integer(&raw.take_text("MaxSize")),
        type_code: raw.take_text("TypeCode"),
        type_name: raw.take_text("TypeName"),
        schedule: parse_schedule(&meets[0]),
        meets,
        instructors: [
            raw.take_text("Instructor1Name"),
            raw.take_text("Instructor2Name"),
            raw.take_text("Instructor3Name"),
            raw.take_text("Instructor4Name"),
        ],
        exam_meet: raw.take_text("ExamMeet"),
        exam_date: raw.take_text("ExamDate"),
    };

    let charges = [
        Charge {
            message: raw.take_text("ChargeMsg1"),
            amount: raw.take_text("ChargeAmt1"),
        },
        Charge {
            message: raw.take_text("ChargeMsg2"),
            amount: raw.take_text("ChargeAmt2"),
        },
    ];

    Ok(CanonicalEntity {
        group_key: key.group_key(),
        instance_key: key.instance_key(),
        key,
        course_code,
        term: raw.take_text("Term"),
        course,
        section,
        charges,
    })
}

/// Split a fixed-width meets string into days, times, building and room.
pub fn parse_schedule(meets: &str) -> Schedule {
    if meets.is_empty() {
        return Schedule::default();
    }

    Schedule {
        days: DAYS.extract(meets),
        start: parse_clock(&START_TIME.extract(meets)),
        end: parse_clock(&END_TIME.extract(meets)),
        building: BUILDING.extract(meets),
        room: ROOM.extract(meets),
    }
}

/// Parse a 12-hour time with a one-letter meridian (`9:00A`, `1:25P`).
/// Anything else becomes midnight.
pub fn parse_clock(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(&format!("{s}M"), "%I:%M%p").unwrap_or(NaiveTime::MIN)
}

/// Canonical decimal text for an integer field, `0` if it does not parse.
pub fn coerce_integer(s: &str) -> String {
    s.parse::<i64>().unwrap_or(0).to_string()
}
