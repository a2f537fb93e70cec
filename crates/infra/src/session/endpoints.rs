//! Typed endpoint accessors
//!
//! Thin wrappers over [`Session::list_entities`] with explicit
//! extraction keys, one per upstream resource. Selecting specific
//! records uses the upstream's comma-joined id form
//! (`/Grades/1,2,3,/`-style, trailing separator included).

use chrono::NaiveDate;
use tracing::info;

use synergia_common::time::Clock;
use synergia_core::entity::Entity;
use synergia_domain::errors::{ResolutionError, Result};
use synergia_domain::types::{EntityId, EntityKind, ObjectCacheEntry};

use super::Session;

/// Join ids the way the upstream expects: `1,2,3,`
fn joined_ids(ids: &[EntityId]) -> String {
    let mut joined = String::new();
    for id in ids {
        joined.push_str(&id.to_string());
        joined.push(',');
    }
    joined
}

/// Monday of the week containing `date`
fn monday_of(date: NaiveDate) -> NaiveDate {
    use chrono::Datelike;
    date - chrono::Days::new(u64::from(date.weekday().num_days_from_monday()))
}

impl<C: Clock + Clone + 'static> Session<C> {
    /// Shared listing shape: whole collection or selected ids
    async fn listing(
        &self,
        base: &[&str],
        ids: &[EntityId],
        kind: EntityKind,
        extraction_key: &str,
    ) -> Result<Vec<Entity>> {
        if ids.is_empty() {
            let set =
                self.list_entities(base, kind, Some(extraction_key), None, false).await?;
            return Ok(set.into_vec());
        }

        let joined = joined_ids(ids);
        let mut segments: Vec<&str> = base.to_vec();
        segments.push(&joined);
        let set = self.list_entities(&segments, kind, Some(extraction_key), None, false).await?;
        Ok(set.into_vec())
    }

    /// All grades, or the selected grade ids
    pub async fn grades(&self, ids: &[EntityId]) -> Result<Vec<Entity>> {
        self.listing(&["Grades"], ids, EntityKind::Grade, "Grades").await
    }

    /// All subjects, or the selected subject ids
    pub async fn subjects(&self, ids: &[EntityId]) -> Result<Vec<Entity>> {
        self.listing(&["Subjects"], ids, EntityKind::Subject, "Subjects").await
    }

    /// All attendance records, or the selected ids
    pub async fn attendances(&self, ids: &[EntityId]) -> Result<Vec<Entity>> {
        self.listing(&["Attendances"], ids, EntityKind::Attendance, "Attendances").await
    }

    /// Attendance records whose type is not a presence kind.
    ///
    /// Resolves each record's `type` relation through the object cache;
    /// the attendance-type table is tiny and long-lived, so the first
    /// record per type pays the fetch and the rest hit the cache.
    pub async fn absences(&self) -> Result<Vec<Entity>, ResolutionError> {
        let mut absences = Vec::new();
        for attendance in self.attendances(&[]).await? {
            let Some(kind) = attendance.resolve("type").await? else {
                continue;
            };
            if kind.bool_field("IsPresenceKind") == Some(false) {
                absences.push(attendance);
            }
        }
        Ok(absences)
    }

    /// All exams, or the selected ids. The upstream serves exams from the
    /// `HomeWorks` resource.
    pub async fn exams(&self, ids: &[EntityId]) -> Result<Vec<Entity>> {
        self.listing(&["HomeWorks"], ids, EntityKind::Exam, "HomeWorks").await
    }

    /// All grade colors, or the selected ids
    pub async fn colors(&self, ids: &[EntityId]) -> Result<Vec<Entity>> {
        self.listing(&["Colors"], ids, EntityKind::Color, "Colors").await
    }

    /// Native mailbox messages (requires the mobile add-on upstream)
    pub async fn messages(&self, ids: &[EntityId]) -> Result<Vec<Entity>> {
        self.listing(&["Messages"], ids, EntityKind::Message, "Messages").await
    }

    /// Lesson realization records, or the selected ids
    pub async fn realizations(&self, ids: &[EntityId]) -> Result<Vec<Entity>> {
        self.listing(&["Realizations"], ids, EntityKind::Realization, "Realizations").await
    }

    /// School notice board
    pub async fn news_feed(&self) -> Result<Vec<Entity>> {
        self.listing(&["SchoolNotices"], &[], EntityKind::News, "SchoolNotices").await
    }

    /// The school record for this account
    pub async fn school(&self) -> Result<Option<Entity>> {
        let set = self
            .list_entities(&["Schools"], EntityKind::School, Some("School"), None, false)
            .await?;
        Ok(set.single())
    }

    /// Today's lucky number, if one is drawn
    pub async fn lucky_number(&self) -> Result<Option<i64>> {
        let document = self.get(&["LuckyNumbers"], &[]).await?;
        Ok(document["LuckyNumber"]["LuckyNumber"].as_i64())
    }

    /// Weekly timetable containing `for_date` (today when `None`).
    ///
    /// The upstream keys the week by its Monday; the returned entity
    /// wraps the raw day-by-day matrix under a pseudo id, since the
    /// timetable document itself carries none.
    pub async fn timetable(&self, for_date: Option<NaiveDate>) -> Result<Entity> {
        let date = for_date.unwrap_or_else(|| self.clock().utc_now().date_naive());
        let monday = monday_of(date).format("%Y-%m-%d").to_string();

        let document = self.get(&["Timetables"], &[("weekStart", monday.as_str())]).await?;
        let matrix = document.get("Timetable").cloned().ok_or_else(|| {
            synergia_domain::errors::TransportError::Parse(
                "timetable payload is missing 'Timetable'".into(),
            )
        })?;

        let pseudo_id = EntityId(self.clock().utc_now().timestamp());
        Ok(Entity::assemble_with_id(pseudo_id, EntityKind::Timetable, matrix, self.as_source()))
    }

    /// Teacher absence calendar, sorted by start date
    pub async fn teacher_free_days(&self, only_future: bool) -> Result<Vec<Entity>> {
        let days = self
            .list_entities(
                &["Calendars", "TeacherFreeDays"],
                EntityKind::TeacherFreeDays,
                None,
                None,
                false,
            )
            .await?;
        Ok(self.sorted_calendar(days.into_vec(), only_future))
    }

    /// School closure calendar, sorted by start date
    pub async fn school_free_days(&self, only_future: bool) -> Result<Vec<Entity>> {
        let days = self
            .list_entities(
                &["Calendars", "SchoolFreeDays"],
                EntityKind::SchoolFreeDays,
                None,
                None,
                false,
            )
            .await?;
        Ok(self.sorted_calendar(days.into_vec(), only_future))
    }

    fn sorted_calendar(&self, mut days: Vec<Entity>, only_future: bool) -> Vec<Entity> {
        days.sort_by(|a, b| {
            let a = a.str_field("DateFrom").unwrap_or_default();
            let b = b.str_field("DateFrom").unwrap_or_default();
            a.cmp(b)
        });

        if only_future {
            let today = self.clock().utc_now().date_naive();
            days.retain(|day| {
                day.str_field("DateTo")
                    .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
                    .is_some_and(|ends| ends >= today)
            });
        }
        days
    }

    /// Clear the object store and bulk-load the commonly referenced
    /// collections into it. Returns the number of snapshots loaded.
    pub async fn preload_cache(&self) -> Result<usize> {
        self.object_cache().clear()?;

        let mut entities = Vec::new();
        entities.extend(self.attendances(&[]).await?);
        entities.extend(self.grades(&[]).await?);
        entities.extend(self.subjects(&[]).await?);
        entities.extend(self.school_free_days(false).await?);
        entities.extend(self.teacher_free_days(false).await?);

        let now = self.clock().utc_now();
        for entity in &entities {
            self.object_cache().put(ObjectCacheEntry {
                id: entity.id(),
                kind: entity.kind(),
                payload: entity.export_payload(),
                last_loaded: now,
            })?;
        }

        let loaded = self.object_cache().count()?;
        info!(loaded, "preloaded object cache");
        Ok(loaded)
    }
}
