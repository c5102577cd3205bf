// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A company grouping accounts and projects.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Company {
    #[sqlx(rename = "id")]
    pub id: i64,

    #[sqlx(rename = "name")]
    pub name: String,

    #[sqlx(rename = "founding_date")]
    pub founding_date: DateTime<Utc>,

    #[sqlx(rename = "founding_member")]
    pub founding_member: Option<i64>,
}

#[allow(clippy::doc_overindented_list_items)]
/// An employee (or an individual user outside any company).
///
/// `manager_id` is the organisational hierarchy and has nothing to do with
/// project management: the account that manages a project is recorded on the
/// project itself.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Account {
    #[sqlx(rename = "id")]
    pub id: i64,

    #[sqlx(rename = "name")]
    pub name: String,

    #[sqlx(rename = "email")]
    pub email: String,

    #[sqlx(rename = "company_id")]
    pub company_id: Option<i64>,

    #[sqlx(rename = "manager_id")]
    pub manager_id: Option<i64>,

    #[sqlx(rename = "position")]
    pub position: Option<String>,

    #[sqlx(rename = "account_created")]
    pub account_created: DateTime<Utc>,

    // Ratio of estimated vs. actual effort. Stored, never recomputed yet.
    #[sqlx(rename = "efficiency_score")]
    pub efficiency_score: f64,
}

/// A project owned by a company (or by an individual account).
///
/// The effort fields and `efficiency` are not stored: they are filled in by the
/// rollup every time the project is read, so a freshly loaded row carries zeros.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Project {
    #[sqlx(rename = "id")]
    pub id: i64,

    #[sqlx(rename = "name")]
    pub name: String,

    #[sqlx(rename = "description")]
    pub description: Option<String>,

    #[sqlx(rename = "company_id")]
    pub company_id: Option<i64>,

    // The one account with unrestricted visibility over the project.
    #[sqlx(rename = "project_manager")]
    pub project_manager: i64,

    #[sqlx(rename = "project_created")]
    pub project_created: DateTime<Utc>,

    #[sqlx(rename = "is_finished")]
    pub is_finished: bool,

    #[sqlx(default)]
    pub human_estimated_hours: f64,

    #[sqlx(default)]
    pub ai_estimated_hours: f64,

    #[sqlx(default)]
    pub actual_hours: f64,

    #[sqlx(default)]
    pub efficiency: f64,
}

#[allow(clippy::doc_overindented_list_items)]
/// A task row. Subtasks are rows of the same table pointing at their parent
/// through `parent_task_id`.
///
/// Derivation attributes (derive):
/// - `Serialize`, `Deserialize`: Allows conversion to/from JSON.
/// - `sqlx::FromRow`: Allows `sqlx` to build a `Task` directly
///    from a database result row.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Task {
    #[sqlx(rename = "id")]
    pub id: i64,

    #[sqlx(rename = "name")]
    pub name: String,

    #[sqlx(rename = "description")]
    pub description: Option<String>,

    #[sqlx(rename = "project_id")]
    pub project_id: i64,

    // Primary assignee. Further accounts live in the assignment table.
    #[sqlx(rename = "assigned_to")]
    pub assigned_to: i64,

    #[sqlx(rename = "parent_task_id")]
    pub parent_task_id: Option<i64>,

    // Sibling sort key, not unique.
    #[sqlx(rename = "task_order")]
    pub order: i64,

    #[sqlx(rename = "task_created")]
    pub task_created: DateTime<Utc>,

    #[sqlx(rename = "task_started")]
    pub task_started: Option<DateTime<Utc>>,

    #[sqlx(rename = "task_completed")]
    pub task_completed: Option<DateTime<Utc>>,

    #[sqlx(rename = "is_finished")]
    pub is_finished: bool,

    // Entered by the task creator.
    #[sqlx(rename = "human_estimated_hours")]
    pub human_estimated_hours: Option<f64>,

    // Supplied by an external estimator, when there is one.
    #[sqlx(rename = "ai_estimated_hours")]
    pub ai_estimated_hours: Option<f64>,

    #[sqlx(rename = "actual_hours")]
    pub actual_hours: Option<f64>,

    #[sqlx(default)]
    pub efficiency: f64,
}

/// Last persisted rollup of a task. Kept apart from the task row, whose
/// effort and completion columns only ever hold entered values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaskRollup {
    #[sqlx(rename = "task_id")]
    pub task_id: i64,

    #[sqlx(rename = "human_estimated_hours")]
    pub human_estimated_hours: f64,

    #[sqlx(rename = "ai_estimated_hours")]
    pub ai_estimated_hours: f64,

    #[sqlx(rename = "actual_hours")]
    pub actual_hours: f64,

    #[sqlx(rename = "completed")]
    pub completed: bool,

    #[sqlx(rename = "efficiency")]
    pub efficiency: f64,

    #[sqlx(rename = "rolled_up_at")]
    pub rolled_up_at: DateTime<Utc>,
}

/// Payload for `POST /api/companies`.
#[derive(Deserialize, Debug)]
pub struct CreateCompanyPayload {
    pub name: String,
    pub founding_member: Option<i64>,
}

/// Payload for `POST /api/accounts`.
#[derive(Deserialize, Debug)]
pub struct CreateAccountPayload {
    pub name: String,
    pub email: String,
    pub company_id: Option<i64>,
    pub manager_id: Option<i64>,
    pub position: Option<String>,
}

/// Payload for `POST /api/projects`.
/// When `project_manager` is missing the calling account manages the project.
#[derive(Deserialize, Debug)]
pub struct CreateProjectPayload {
    pub name: String,
    pub description: Option<String>,
    pub company_id: Option<i64>,
    pub project_manager: Option<i64>,
}

/// Payload for `POST /api/tasks`.
/// It's a good practice to separate database models (`Task`)
/// from API models, as they may have different fields.
#[derive(Deserialize, Debug)]
pub struct CreateTaskPayload {
    pub name: String,
    pub description: Option<String>,
    pub project_id: i64,
    pub assigned_to: i64,
    pub parent_task_id: Option<i64>,
    #[serde(default)]
    pub order: i64,
    pub human_estimated_hours: Option<f64>,
    pub ai_estimated_hours: Option<f64>,
}

/// Payload for `PATCH /api/tasks/{id}`. Missing fields are left untouched.
#[derive(Deserialize, Debug, Default)]
pub struct UpdateTaskPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<i64>,
    pub order: Option<i64>,
    pub task_started: Option<DateTime<Utc>>,
    pub task_completed: Option<DateTime<Utc>>,
    pub is_finished: Option<bool>,
    pub human_estimated_hours: Option<f64>,
    pub ai_estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
}

/// Payload for `POST /api/tasks/{id}/assignees`.
#[derive(Deserialize, Debug)]
pub struct AssignAccountPayload {
    pub account_id: i64,
}
