//! Roadmap, course, and module persistence.
//!
//! Course creation inserts the container, one module per outline week, and
//! the run link in a single transaction — a run never points at a course
//! whose skeleton is half-written. Module content writes commit one by one
//! so partial content generation survives a crash.

use crate::error::{Error, Result};
use crate::generate::outline::Outline;
use crate::model::{Course, CourseModule, Roadmap, Run};
use crate::store::{CourseStore, NewRoadmap};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
impl CourseStore for super::Db {
    async fn create_roadmap(&self, new: NewRoadmap) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO roadmaps (id, owner_id, title, field, level, weekly_hours, duration_weeks)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(new.owner_id)
        .bind(&new.title)
        .bind(&new.field)
        .bind(&new.level)
        .bind(new.weekly_hours)
        .bind(new.duration_weeks)
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    async fn get_roadmap(&self, id: Uuid) -> Result<Roadmap> {
        let row: Option<Roadmap> = sqlx::query_as(
            "SELECT id, owner_id, title, field, level, weekly_hours, duration_weeks
             FROM roadmaps WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.ok_or_else(|| Error::NotFound(format!("roadmap {id}")))
    }

    async fn create_course(
        &self,
        run: &Run,
        roadmap: &Roadmap,
        outline: &Outline,
    ) -> Result<Uuid> {
        let course_id = Uuid::new_v4();
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO courses (id, owner_id, roadmap_id, status, title, description)
             VALUES ($1, $2, $3, 'draft', $4, $5)",
        )
        .bind(course_id)
        .bind(run.owner_id)
        .bind(roadmap.id)
        .bind(format!("{} (AI-generated)", roadmap.title))
        .bind(format!(
            "{}-week roadmap for {}, level {}.",
            roadmap.duration_weeks, roadmap.field, roadmap.level
        ))
        .execute(&mut *tx)
        .await?;

        for week in &outline.weeks {
            let outcomes = serde_json::to_value(&week.outcomes)
                .map_err(|e| Error::Other(format!("serialize outcomes: {e}")))?;
            sqlx::query(
                "INSERT INTO course_modules (id, course_id, week, title, outcomes, content_md)
                 VALUES ($1, $2, $3, $4, $5, NULL)",
            )
            .bind(Uuid::new_v4())
            .bind(course_id)
            .bind(week.week as i32)
            .bind(&week.title)
            .bind(outcomes)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE generation_runs SET course_id = $1 WHERE id = $2")
            .bind(course_id)
            .bind(run.id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(course_id)
    }

    async fn get_course(&self, id: Uuid) -> Result<Course> {
        let row: Option<Course> = sqlx::query_as(
            "SELECT id, owner_id, roadmap_id, status, title, description
             FROM courses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.ok_or_else(|| Error::NotFound(format!("course {id}")))
    }

    async fn list_modules(&self, course_id: Uuid) -> Result<Vec<CourseModule>> {
        let rows: Vec<ModuleRow> = sqlx::query_as(
            "SELECT id, course_id, week, title, outcomes, content_md
             FROM course_modules WHERE course_id = $1
             ORDER BY week ASC",
        )
        .bind(course_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(ModuleRow::try_into_module).collect()
    }

    async fn write_module_content(&self, module_id: Uuid, content: &str) -> Result<()> {
        let rows_affected =
            sqlx::query("UPDATE course_modules SET content_md = $2 WHERE id = $1")
                .bind(module_id)
                .bind(content)
                .execute(self.pool())
                .await?
                .rows_affected();
        if rows_affected == 0 {
            return Err(Error::NotFound(format!("module {module_id}")));
        }
        Ok(())
    }

    async fn set_course_ready(&self, course_id: Uuid) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE courses SET status = 'ready', updated_at = now() WHERE id = $1",
        )
        .bind(course_id)
        .execute(self.pool())
        .await?
        .rows_affected();
        if rows_affected == 0 {
            return Err(Error::NotFound(format!("course {course_id}")));
        }
        Ok(())
    }
}

/// Internal row type for sqlx::FromRow; outcomes live in a jsonb column.
#[derive(sqlx::FromRow)]
struct ModuleRow {
    id: Uuid,
    course_id: Uuid,
    week: i32,
    title: String,
    outcomes: serde_json::Value,
    content_md: Option<String>,
}

impl ModuleRow {
    fn try_into_module(self) -> Result<CourseModule> {
        let outcomes: Vec<String> = serde_json::from_value(self.outcomes)
            .map_err(|e| Error::Other(format!("bad outcomes for module {}: {e}", self.id)))?;
        Ok(CourseModule {
            id: self.id,
            course_id: self.course_id,
            week: self.week,
            title: self.title,
            outcomes,
            content_md: self.content_md,
        })
    }
}
