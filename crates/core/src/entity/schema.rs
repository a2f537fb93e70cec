//! Per-kind relation schema
//!
//! The upstream client modeled relations through an inheritance
//! hierarchy; here a flat table keyed by [`EntityKind`] declares which
//! payload fields reference other entities. Assembly walks the table and
//! records each relation on the entity's reference registry.

use serde_json::Value;
use synergia_domain::types::{EntityId, EntityKind};

use super::refs::EntityRefs;

/// Whether a missing payload field is tolerated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    /// Field is expected; if absent the relation is simply not declared
    Required,
    /// Field may be absent; absence is recorded as a known-absent relation
    Optional,
}

/// One relation rule: attribute name, payload field holding the target
/// reference, target kind, and presence policy
struct Relation {
    attr: &'static str,
    field: &'static str,
    target: EntityKind,
    presence: Presence,
}

const fn req(attr: &'static str, field: &'static str, target: EntityKind) -> Relation {
    Relation { attr, field, target, presence: Presence::Required }
}

const fn opt(attr: &'static str, field: &'static str, target: EntityKind) -> Relation {
    Relation { attr, field, target, presence: Presence::Optional }
}

use EntityKind as K;

static NONE: &[Relation] = &[];
static GRADE: &[Relation] = &[
    req("teacher", "AddedBy", K::Teacher),
    req("subject", "Subject", K::Subject),
    req("category", "Category", K::GradeCategory),
];
static GRADE_CATEGORY: &[Relation] = &[opt("teacher", "Teacher", K::Teacher)];
static GRADE_COMMENT: &[Relation] =
    &[req("teacher", "AddedBy", K::Teacher), req("grade", "Grade", K::Grade)];
static ATTENDANCE: &[Relation] = &[
    req("teacher", "AddedBy", K::Teacher),
    req("student", "Student", K::Student),
    req("type", "Type", K::AttendanceType),
];
static EXAM: &[Relation] = &[
    req("teacher", "CreatedBy", K::Teacher),
    req("category", "Category", K::ExamCategory),
    opt("subject", "Subject", K::Subject),
];
static EXAM_CATEGORY: &[Relation] = &[req("color", "Color", K::Color)];
static LESSON: &[Relation] = &[
    req("teacher", "Teacher", K::Teacher),
    req("subject", "Subject", K::Subject),
    opt("group", "Class", K::SchoolClass),
];
static SCHOOL_CLASS: &[Relation] = &[req("tutor", "ClassTutor", K::Teacher)];
static VIRTUAL_CLASS: &[Relation] =
    &[req("teacher", "Teacher", K::Teacher), req("subject", "Subject", K::Subject)];
static NEWS: &[Relation] = &[req("teacher", "AddedBy", K::Teacher)];
static TEACHER_FREE_DAYS: &[Relation] = &[req("teacher", "Teacher", K::Teacher)];

/// Relation rules for one entity kind
fn relations(kind: EntityKind) -> &'static [Relation] {
    match kind {
        K::Grade => GRADE,
        K::GradeCategory => GRADE_CATEGORY,
        K::GradeComment => GRADE_COMMENT,
        K::Attendance => ATTENDANCE,
        K::Exam => EXAM,
        K::ExamCategory => EXAM_CATEGORY,
        K::Lesson => LESSON,
        K::SchoolClass => SCHOOL_CLASS,
        K::VirtualClass => VIRTUAL_CLASS,
        K::News => NEWS,
        K::TeacherFreeDays => TEACHER_FREE_DAYS,
        _ => NONE,
    }
}

/// Walk the relation table for `kind` and declare each relation found in
/// `payload` on `refs`
pub(super) fn declare_relations(kind: EntityKind, payload: &Value, refs: &mut EntityRefs) {
    for rule in relations(kind) {
        match payload.get(rule.field).and_then(EntityId::from_payload) {
            Some(target_id) => {
                refs.declare(rule.attr, target_id, rule.target);
            }
            None if rule.presence == Presence::Optional => {
                refs.declare_value(rule.attr, None);
            }
            None => {}
        }
    }
}
