//! Core domain data types
//!
//! Entity identity, the per-kind descriptor table, token state, and the
//! two cache entry records. Payloads everywhere are opaque
//! `serde_json::Value` documents; field-by-field typed views live outside
//! this crate.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MINUTES: u64 = 60;
const HOURS: u64 = 60 * MINUTES;
const DAYS: u64 = 24 * HOURS;

/// Numeric identifier of a remote entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl EntityId {
    /// Extract the `Id` field from a raw payload.
    ///
    /// The upstream is inconsistent about numeric ids: most documents carry
    /// them as JSON numbers, a few as digit strings. Both are accepted.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        match payload.get("Id")? {
            Value::Number(n) => n.as_i64().map(Self),
            Value::String(s) => s.parse::<i64>().ok().map(Self),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Static routing data for one entity kind
///
/// Where the kind lives on the API, which top-level key holds its data,
/// and how long a cached snapshot stays fresh by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
    /// API path segments (joined with `/` under the base URL)
    pub path: &'static [&'static str],
    /// Default extraction key for single-entity fetches; `None` means
    /// fall back to the auto-detection heuristic
    pub extraction_key: Option<&'static str>,
    /// Default maximum cache age for this kind
    pub default_max_age: Duration,
}

/// Type tag identifying an entity kind
///
/// Replaces the upstream client's class hierarchy: shared generic entity
/// behavior plus this tag selecting per-kind routing and relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Teacher,
    Student,
    Subject,
    Grade,
    GradeCategory,
    GradeComment,
    Attendance,
    AttendanceType,
    Exam,
    ExamCategory,
    Color,
    Lesson,
    SchoolClass,
    VirtualClass,
    Classroom,
    School,
    News,
    Message,
    Timetable,
    TeacherFreeDays,
    SchoolFreeDays,
    Realization,
}

impl EntityKind {
    /// Stable string form, used as the object-cache type tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teacher => "Teacher",
            Self::Student => "Student",
            Self::Subject => "Subject",
            Self::Grade => "Grade",
            Self::GradeCategory => "GradeCategory",
            Self::GradeComment => "GradeComment",
            Self::Attendance => "Attendance",
            Self::AttendanceType => "AttendanceType",
            Self::Exam => "Exam",
            Self::ExamCategory => "ExamCategory",
            Self::Color => "Color",
            Self::Lesson => "Lesson",
            Self::SchoolClass => "SchoolClass",
            Self::VirtualClass => "VirtualClass",
            Self::Classroom => "Classroom",
            Self::School => "School",
            Self::News => "News",
            Self::Message => "Message",
            Self::Timetable => "Timetable",
            Self::TeacherFreeDays => "TeacherFreeDays",
            Self::SchoolFreeDays => "SchoolFreeDays",
            Self::Realization => "Realization",
        }
    }

    /// Routing descriptor for this kind.
    ///
    /// Paths, extraction keys and freshness windows follow what the
    /// upstream API actually serves; teachers and students share the
    /// `Users` resource.
    pub fn descriptor(&self) -> KindDescriptor {
        match self {
            Self::Teacher | Self::Student => KindDescriptor {
                path: &["Users"],
                extraction_key: Some("User"),
                default_max_age: Duration::from_secs(31 * DAYS),
            },
            Self::Subject => KindDescriptor {
                path: &["Subjects"],
                extraction_key: Some("Subject"),
                default_max_age: Duration::from_secs(31 * DAYS),
            },
            Self::Grade => KindDescriptor {
                path: &["Grades"],
                extraction_key: Some("Grade"),
                default_max_age: Duration::from_secs(45 * MINUTES),
            },
            Self::GradeCategory => KindDescriptor {
                path: &["Grades", "Categories"],
                extraction_key: Some("Category"),
                default_max_age: Duration::from_secs(31 * DAYS),
            },
            Self::GradeComment => KindDescriptor {
                path: &["Grades", "Comments"],
                extraction_key: Some("Comment"),
                default_max_age: Duration::from_secs(31 * DAYS),
            },
            Self::Attendance => KindDescriptor {
                path: &["Attendances"],
                extraction_key: Some("Attendance"),
                default_max_age: Duration::from_secs(10 * MINUTES),
            },
            Self::AttendanceType => KindDescriptor {
                path: &["Attendances", "Types"],
                extraction_key: Some("Type"),
                default_max_age: Duration::from_secs(31 * DAYS),
            },
            Self::Exam => KindDescriptor {
                path: &["HomeWorks"],
                extraction_key: Some("HomeWork"),
                default_max_age: Duration::from_secs(3 * DAYS),
            },
            Self::ExamCategory => KindDescriptor {
                path: &["HomeWorks", "Categories"],
                extraction_key: Some("Category"),
                default_max_age: Duration::from_secs(31 * DAYS),
            },
            Self::Color => KindDescriptor {
                path: &["Colors"],
                extraction_key: Some("Color"),
                default_max_age: Duration::from_secs(31 * DAYS),
            },
            Self::Lesson => KindDescriptor {
                path: &["Lessons"],
                extraction_key: Some("Lesson"),
                default_max_age: Duration::from_secs(5 * MINUTES),
            },
            Self::SchoolClass => KindDescriptor {
                path: &["Classes"],
                extraction_key: Some("Class"),
                default_max_age: Duration::from_secs(31 * DAYS),
            },
            Self::VirtualClass => KindDescriptor {
                path: &["VirtualClasses"],
                extraction_key: Some("VirtualClass"),
                default_max_age: Duration::from_secs(31 * DAYS),
            },
            Self::Classroom => KindDescriptor {
                path: &["Classrooms"],
                extraction_key: None,
                default_max_age: Duration::from_secs(31 * DAYS),
            },
            // The school record is effectively never cached upstream
            Self::School => KindDescriptor {
                path: &["Schools"],
                extraction_key: Some("School"),
                default_max_age: Duration::from_secs(1),
            },
            Self::News => KindDescriptor {
                path: &["SchoolNotices"],
                extraction_key: Some("SchoolNotices"),
                default_max_age: Duration::from_secs(31 * DAYS),
            },
            Self::Message => KindDescriptor {
                path: &["Messages"],
                extraction_key: Some("Message"),
                default_max_age: Duration::from_secs(31 * DAYS),
            },
            Self::Timetable => KindDescriptor {
                path: &["Timetables"],
                extraction_key: Some("Timetable"),
                default_max_age: Duration::from_secs(15),
            },
            Self::TeacherFreeDays => KindDescriptor {
                path: &["Calendars", "TeacherFreeDays"],
                extraction_key: None,
                default_max_age: Duration::from_secs(5 * MINUTES),
            },
            Self::SchoolFreeDays => KindDescriptor {
                path: &["Calendars", "SchoolFreeDays"],
                extraction_key: None,
                default_max_age: Duration::from_secs(5 * MINUTES),
            },
            Self::Realization => KindDescriptor {
                path: &["Realizations"],
                extraction_key: Some("Realizations"),
                default_max_age: Duration::from_secs(5 * MINUTES),
            },
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown entity kind tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown entity kind tag: {}", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for EntityKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Teacher" => Ok(Self::Teacher),
            "Student" => Ok(Self::Student),
            "Subject" => Ok(Self::Subject),
            "Grade" => Ok(Self::Grade),
            "GradeCategory" => Ok(Self::GradeCategory),
            "GradeComment" => Ok(Self::GradeComment),
            "Attendance" => Ok(Self::Attendance),
            "AttendanceType" => Ok(Self::AttendanceType),
            "Exam" => Ok(Self::Exam),
            "ExamCategory" => Ok(Self::ExamCategory),
            "Color" => Ok(Self::Color),
            "Lesson" => Ok(Self::Lesson),
            "SchoolClass" => Ok(Self::SchoolClass),
            "VirtualClass" => Ok(Self::VirtualClass),
            "Classroom" => Ok(Self::Classroom),
            "School" => Ok(Self::School),
            "News" => Ok(Self::News),
            "Message" => Ok(Self::Message),
            "Timetable" => Ok(Self::Timetable),
            "TeacherFreeDays" => Ok(Self::TeacherFreeDays),
            "SchoolFreeDays" => Ok(Self::SchoolFreeDays),
            "Realization" => Ok(Self::Realization),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// Token material for one authenticated identity
///
/// Mutated only by the token ledger's refresh path; read by the transport
/// before every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenState {
    /// Short-lived resource token attached as the bearer header
    pub access_token: String,

    /// Refresh token used to renew the root token
    pub refresh_token: String,

    /// Root/session token the resource token is derived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_token: Option<String>,

    /// Synergia login the tokens are scoped to
    pub login: String,

    /// Absolute expiry of the access token (UTC)
    pub expires_at: DateTime<Utc>,
}

impl TokenState {
    /// Clock-based expiry check against the given instant
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A cached raw API response
///
/// Uniqueness key: `(uri, owner)`. Replaced wholesale on staleness,
/// never partially updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCacheEntry {
    /// Fully-assembled request URI
    pub uri: String,
    /// Identity the response belongs to (Synergia login)
    pub owner: String,
    /// Raw response document
    pub payload: Value,
    /// When the response was fetched from the origin
    pub last_loaded: DateTime<Utc>,
}

impl QueryCacheEntry {
    /// Whether the entry is older than `max_age` at instant `now`
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let age = (now - self.last_loaded).to_std().unwrap_or(Duration::ZERO);
        age > max_age
    }
}

/// A cached assembled-entity snapshot
///
/// Uniqueness key: `(id, kind)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectCacheEntry {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Entity payload snapshot as exported at assembly time
    pub payload: Value,
    /// When the snapshot was assembled from the origin
    pub last_loaded: DateTime<Utc>,
}

impl ObjectCacheEntry {
    /// Whether the snapshot is older than `max_age` at instant `now`
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let age = (now - self.last_loaded).to_std().unwrap_or(Duration::ZERO);
        age > max_age
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_entity_id_from_numeric_payload() {
        let payload = json!({"Id": 42, "Name": "Maths"});
        assert_eq!(EntityId::from_payload(&payload), Some(EntityId(42)));
    }

    #[test]
    fn test_entity_id_from_string_payload() {
        let payload = json!({"Id": "1337"});
        assert_eq!(EntityId::from_payload(&payload), Some(EntityId(1337)));
    }

    #[test]
    fn test_entity_id_missing_or_malformed() {
        assert_eq!(EntityId::from_payload(&json!({"Name": "x"})), None);
        assert_eq!(EntityId::from_payload(&json!({"Id": [1]})), None);
        assert_eq!(EntityId::from_payload(&json!({"Id": "4a"})), None);
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            EntityKind::Teacher,
            EntityKind::Grade,
            EntityKind::GradeCategory,
            EntityKind::AttendanceType,
            EntityKind::SchoolFreeDays,
            EntityKind::Realization,
        ] {
            assert_eq!(kind.as_str().parse::<EntityKind>(), Ok(kind));
        }
        assert!("Homework".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_teacher_and_student_share_users_resource() {
        assert_eq!(EntityKind::Teacher.descriptor().path, &["Users"]);
        assert_eq!(EntityKind::Student.descriptor().path, &["Users"]);
        assert_eq!(EntityKind::Teacher.descriptor().extraction_key, Some("User"));
    }

    #[test]
    fn test_descriptor_freshness_windows() {
        assert_eq!(
            EntityKind::Grade.descriptor().default_max_age,
            Duration::from_secs(45 * 60)
        );
        assert_eq!(EntityKind::Timetable.descriptor().default_max_age, Duration::from_secs(15));
        assert_eq!(
            EntityKind::Subject.descriptor().default_max_age,
            Duration::from_secs(31 * 24 * 3600)
        );
    }

    #[test]
    fn test_token_state_expiry() {
        let now = Utc::now();
        let state = TokenState {
            access_token: "acc".into(),
            refresh_token: "ref".into(),
            root_token: None,
            login: "1234567u".into(),
            expires_at: now + TimeDelta::seconds(30),
        };

        assert!(!state.is_expired_at(now));
        assert!(state.is_expired_at(now + TimeDelta::seconds(31)));
    }

    #[test]
    fn test_query_entry_staleness() {
        let now = Utc::now();
        let entry = QueryCacheEntry {
            uri: "https://api.example/2.0/Grades".into(),
            owner: "1234567u".into(),
            payload: json!({"Grades": []}),
            last_loaded: now,
        };

        assert!(!entry.is_stale(now + TimeDelta::seconds(59), Duration::from_secs(60)));
        assert!(entry.is_stale(now + TimeDelta::seconds(61), Duration::from_secs(60)));
        // A future-dated entry is never stale
        assert!(!entry.is_stale(now - TimeDelta::seconds(10), Duration::from_secs(0)));
    }

    #[test]
    fn test_object_entry_staleness() {
        let now = Utc::now();
        let entry = ObjectCacheEntry {
            id: EntityId(3),
            kind: EntityKind::Subject,
            payload: json!({"Id": 3, "Name": "Physics"}),
            last_loaded: now - TimeDelta::minutes(10),
        };

        assert!(entry.is_stale(now, Duration::from_secs(60)));
        assert!(!entry.is_stale(now, Duration::from_secs(3600)));
    }
}
