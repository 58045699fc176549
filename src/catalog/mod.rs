/// Course catalog
///
/// Courses, their ordered modules and module items, and enrollments.
/// Authoring calls take the caller's role and go through `authz`.
use crate::{
    authz::{self, Action, Resource, Role},
    content::ItemContent,
    db::models::{Course, Enrollment, EnrollmentStatus, Module, ModuleItem},
    error::{LmsError, LmsResult},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

/// New module within a course
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewModule {
    pub title: String,
    pub order: i64,
    pub time_limit_minutes: Option<i64>,
}

/// New item within a module
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewModuleItem {
    pub title: String,
    pub order: i64,
    pub content: ItemContent,
    pub problem_id: Option<String>,
    #[serde(default)]
    pub requires_review: bool,
}

/// Catalog manager
#[derive(Clone)]
pub struct CatalogManager {
    db: SqlitePool,
}

impl CatalogManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a course owned by `created_by`
    pub async fn create_course(
        &self,
        role: Role,
        created_by: &str,
        title: &str,
        description: Option<String>,
    ) -> LmsResult<Course> {
        authz::require(role, Resource::Course, Action::Create)?;

        if title.trim().is_empty() {
            return Err(LmsError::Validation("Course title cannot be empty".to_string()));
        }

        let course = Course {
            id: Uuid::new_v4().to_string(),
            title: title.trim().to_string(),
            description,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO course (id, title, description, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&course.id)
        .bind(&course.title)
        .bind(&course.description)
        .bind(&course.created_by)
        .bind(course.created_at)
        .execute(&self.db)
        .await?;

        tracing::info!(course_id = %course.id, "Course created");
        Ok(course)
    }

    pub async fn get_course(&self, course_id: &str) -> LmsResult<Course> {
        sqlx::query_as::<_, Course>("SELECT * FROM course WHERE id = ?1")
            .bind(course_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| LmsError::NotFound(format!("Course {} not found", course_id)))
    }

    /// Append a module; `order` must be unique within the course
    pub async fn add_module(
        &self,
        role: Role,
        course_id: &str,
        new: NewModule,
    ) -> LmsResult<Module> {
        authz::require(role, Resource::Module, Action::Create)?;
        self.get_course(course_id).await?;

        if matches!(new.time_limit_minutes, Some(limit) if limit <= 0) {
            return Err(LmsError::Validation("Time limit must be positive".to_string()));
        }

        let module = Module {
            id: Uuid::new_v4().to_string(),
            course_id: course_id.to_string(),
            title: new.title,
            order: new.order,
            time_limit_minutes: new.time_limit_minutes,
        };

        sqlx::query(
            "INSERT INTO module (id, course_id, title, sort_order, time_limit_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&module.id)
        .bind(&module.course_id)
        .bind(&module.title)
        .bind(module.order)
        .bind(module.time_limit_minutes)
        .execute(&self.db)
        .await
        .map_err(|e| unique_violation(e, format!("Module order {} already used", module.order)))?;

        Ok(module)
    }

    /// Append an item; content is validated before it is stored
    pub async fn add_item(
        &self,
        role: Role,
        module_id: &str,
        new: NewModuleItem,
    ) -> LmsResult<ModuleItem> {
        authz::require(role, Resource::ModuleItem, Action::Create)?;
        self.get_module(module_id).await?;
        new.content.check()?;

        let item = ModuleItem {
            id: Uuid::new_v4().to_string(),
            module_id: module_id.to_string(),
            title: new.title,
            kind: new.content.kind(),
            order: new.order,
            content: new.content.to_stored()?,
            problem_id: new.problem_id,
            requires_review: new.requires_review,
        };

        sqlx::query(
            "INSERT INTO module_item (id, module_id, title, kind, sort_order, content, problem_id, requires_review)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&item.id)
        .bind(&item.module_id)
        .bind(&item.title)
        .bind(item.kind)
        .bind(item.order)
        .bind(&item.content)
        .bind(&item.problem_id)
        .bind(item.requires_review)
        .execute(&self.db)
        .await
        .map_err(|e| unique_violation(e, format!("Item order {} already used", item.order)))?;

        Ok(item)
    }

    pub async fn get_module(&self, module_id: &str) -> LmsResult<Module> {
        sqlx::query_as::<_, Module>("SELECT * FROM module WHERE id = ?1")
            .bind(module_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| LmsError::NotFound(format!("Module {} not found", module_id)))
    }

    pub async fn get_item(&self, item_id: &str) -> LmsResult<ModuleItem> {
        sqlx::query_as::<_, ModuleItem>("SELECT * FROM module_item WHERE id = ?1")
            .bind(item_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| LmsError::NotFound(format!("Module item {} not found", item_id)))
    }

    /// Parsed content of an item
    pub async fn item_content(&self, item_id: &str) -> LmsResult<ItemContent> {
        let item = self.get_item(item_id).await?;
        ItemContent::parse(&item.content)
    }

    /// Modules of a course in ascending order
    pub async fn list_modules(&self, course_id: &str) -> LmsResult<Vec<Module>> {
        Ok(sqlx::query_as::<_, Module>(
            "SELECT * FROM module WHERE course_id = ?1 ORDER BY sort_order ASC",
        )
        .bind(course_id)
        .fetch_all(&self.db)
        .await?)
    }

    /// Items of a module in ascending order
    pub async fn list_items(&self, module_id: &str) -> LmsResult<Vec<ModuleItem>> {
        Ok(sqlx::query_as::<_, ModuleItem>(
            "SELECT * FROM module_item WHERE module_id = ?1 ORDER BY sort_order ASC",
        )
        .bind(module_id)
        .fetch_all(&self.db)
        .await?)
    }

    /// Enroll a user; enrolling twice returns the existing row
    pub async fn enroll(&self, user_id: &str, course_id: &str) -> LmsResult<Enrollment> {
        self.get_course(course_id).await?;

        sqlx::query(
            "INSERT INTO enrollment (user_id, course_id, status, enrolled_at)
             VALUES (?1, ?2, 'ACTIVE', ?3)
             ON CONFLICT (user_id, course_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        self.get_enrollment(user_id, course_id)
            .await?
            .ok_or_else(|| LmsError::Internal("Enrollment vanished after insert".to_string()))
    }

    pub async fn get_enrollment(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> LmsResult<Option<Enrollment>> {
        Ok(sqlx::query_as::<_, Enrollment>(
            "SELECT * FROM enrollment WHERE user_id = ?1 AND course_id = ?2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.db)
        .await?)
    }

    /// Mark an enrollment finished. Returns false when it already was.
    pub async fn complete_enrollment(&self, user_id: &str, course_id: &str) -> LmsResult<bool> {
        let result = sqlx::query(
            "UPDATE enrollment SET status = ?1, completed_at = ?2
             WHERE user_id = ?3 AND course_id = ?4 AND status <> ?1",
        )
        .bind(EnrollmentStatus::Completed)
        .bind(Utc::now())
        .bind(user_id)
        .bind(course_id)
        .execute(&self.db)
        .await?;

        let completed = result.rows_affected() > 0;
        if completed {
            tracing::info!(user_id, course_id, "Course completed");
        }
        Ok(completed)
    }
}

fn unique_violation(e: sqlx::Error, message: String) -> LmsError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => LmsError::Conflict(message),
        _ => LmsError::Database(e),
    }
}
