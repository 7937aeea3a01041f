//! Postgres catalog store

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use super::catalog::{CatalogSink, CatalogStatements, CatalogStore, CatalogTables};
use crate::error::SinkError;
use crate::models::EnrichedEntity;

/// Row sink backed by Postgres
pub type PgRowSink = CatalogSink<PgCatalog>;

pub struct PgCatalog {
    pool: PgPool,
    statements: CatalogStatements,
}

impl PgCatalog {
    pub fn new(pool: PgPool, tables: &CatalogTables) -> Result<Self, SinkError> {
        Ok(Self {
            pool,
            statements: CatalogStatements::new(tables)?,
        })
    }

    /// Open a pool and prepare inserts for `tables`.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        tables: &CatalogTables,
    ) -> Result<Self, SinkError> {
        let statements = CatalogStatements::new(tables)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await?;

        info!(
            max_connections,
            rows = %tables.rows,
            courses = %tables.courses,
            sections = %tables.sections,
            "Database connection pool created"
        );
        Ok(Self { pool, statements })
    }
}

impl PgRowSink {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        tables: &CatalogTables,
    ) -> Result<Self, SinkError> {
        Ok(CatalogSink::new(PgCatalog::connect(url, max_connections, tables).await?))
    }
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn insert_row(&self, row: &EnrichedEntity) -> Result<(), SinkError> {
        let entity = &row.entity;
        let course = &entity.course;
        let section = &entity.section;
        let schedule = &section.schedule;

        let mut query = sqlx::query(&self.statements.row)
            .bind(entity.instance_key.as_str())
            .bind(&entity.charges[0].message)
            .bind(&entity.charges[0].amount)
            .bind(&entity.charges[1].message)
            .bind(&entity.charges[1].amount)
            .bind(&course.prefix_name)
            .bind(&course.division_code)
            .bind(&course.division_name)
            .bind(&course.school_code)
            .bind(&course.school_name)
            .bind(&course.department_code)
            .bind(&course.department_name)
            .bind(&course.subterm_code)
            .bind(&course.subterm_name)
            .bind(&course.enrollment_status)
            .bind(&course.num_fixed_units)
            .bind(&course.min_units)
            .bind(&course.max_units)
            .bind(&course.title)
            .bind(&course.subtitle)
            .bind(&course.approval)
            .bind(&course.bulletin_flags)
            .bind(&course.class_notes)
            .bind(&course.prefix_long_name)
            .bind(row.enrichment.as_stored_text())
            .bind(&entity.term)
            .bind(&schedule.days)
            .bind(schedule.start.format("%H:%M:%S").to_string())
            .bind(schedule.end.format("%H:%M:%S").to_string())
            .bind(&schedule.building)
            .bind(&schedule.room)
            .bind(&section.call_number)
            .bind(&section.campus_code)
            .bind(&section.campus_name)
            .bind(&section.num_enrolled)
            .bind(&section.max_size)
            .bind(&section.type_code)
            .bind(&section.type_name);

        for meets in &section.meets {
            query = query.bind(meets);
        }
        for instructor in &section.instructors {
            query = query.bind(instructor);
        }

        query
            .bind(&section.exam_meet)
            .bind(&section.exam_date)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_section(&self, row: &EnrichedEntity) -> Result<(), SinkError> {
        let entity = &row.entity;
        let section = &entity.section;
        let schedule = &section.schedule;

        let mut query = sqlx::query(&self.statements.section)
            .bind(entity.instance_key.as_str())
            .bind(&entity.term)
            .bind(&schedule.days)
            .bind(schedule.start.format("%H:%M:%S").to_string())
            .bind(schedule.end.format("%H:%M:%S").to_string())
            .bind(&schedule.building)
            .bind(&schedule.room)
            .bind(&section.call_number)
            .bind(&section.campus_code)
            .bind(&section.campus_name)
            .bind(&section.num_enrolled)
            .bind(&section.max_size)
            .bind(&section.type_code)
            .bind(&section.type_name);

        for meets in &section.meets {
            query = query.bind(meets);
        }
        for instructor in &section.instructors {
            query = query.bind(instructor);
        }

        query
            .bind(&section.exam_meet)
            .bind(&section.exam_date)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_course(&self, row: &EnrichedEntity) -> Result<(), SinkError> {
        let entity = &row.entity;
        let course = &entity.course;

        sqlx::query(&self.statements.course)
            .bind(entity.instance_key.as_str())
            .bind(&course.full_code)
            .bind(&course.prefix_name)
            .bind(&course.division_code)
            .bind(&course.division_name)
            .bind(&course.school_code)
            .bind(&course.school_name)
            .bind(&course.department_code)
            .bind(&course.department_name)
            .bind(&course.subterm_code)
            .bind(&course.subterm_name)
            .bind(&course.enrollment_status)
            .bind(&course.num_fixed_units)
            .bind(&course.min_units)
            .bind(&course.max_units)
            .bind(&course.title)
            .bind(&course.subtitle)
            .bind(&course.approval)
            .bind(&course.bulletin_flags)
            .bind(&course.class_notes)
            .bind(&course.prefix_long_name)
            .bind(row.enrichment.as_stored_text())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
