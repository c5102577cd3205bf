// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::aggregator::{self, ProjectSummary};
use crate::database;
use crate::error::CoreError;
use crate::hierarchy::{access, tree};
use crate::state::{AppState, CurrentAccount};
use anyhow::Context;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use common::{
    Account, AssignAccountPayload, Company, CreateAccountPayload, CreateCompanyPayload,
    CreateProjectPayload, CreateTaskPayload, Project, Task, TaskRollup, UpdateTaskPayload,
};
use serde::Deserialize;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, error, info, warn};

async fn begin(state: &AppState) -> Result<Transaction<'static, Sqlite>, AppError> {
    Ok(state
        .pool
        .begin()
        .await
        .context("Failed to open a transaction")?)
}

async fn commit(tx: Transaction<'static, Sqlite>) -> Result<(), AppError> {
    Ok(tx.commit().await.context("Failed to commit the transaction")?)
}

fn require_text(value: &str, message: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        error!("Validation failed: {}", message);
        return Err(AppError::new(StatusCode::BAD_REQUEST, message));
    }
    Ok(())
}

fn require_hours(label: &str, hours: Option<f64>) -> Result<(), AppError> {
    match hours {
        Some(h) if !h.is_finite() || h < 0.0 => Err(AppError::new(
            StatusCode::BAD_REQUEST,
            &format!("{} must be a non-negative number of hours.", label),
        )),
        _ => Ok(()),
    }
}

/// Handler for registering a company.
pub async fn create_company(
    State(state): State<AppState>,
    Json(payload): Json<CreateCompanyPayload>,
) -> Result<(StatusCode, Json<Company>), AppError> {
    require_text(&payload.name, "Company name cannot be empty.")?;

    let mut tx = begin(&state).await?;
    if let Some(member) = payload.founding_member {
        aggregator::require_account(&mut tx, member).await?;
    }
    let company = database::create_company(&mut tx, &payload).await?;
    commit(tx).await?;

    info!("Company created successfully with ID: {}", company.id);
    Ok((StatusCode::CREATED, Json(company)))
}

/// Handler for registering an account.
pub async fn create_account(
    State(state): State<AppState>,
    Json(payload): Json<CreateAccountPayload>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    require_text(&payload.name, "Account name cannot be empty.")?;
    require_text(&payload.email, "Account email cannot be empty.")?;

    let mut tx = begin(&state).await?;
    if let Some(company_id) = payload.company_id {
        if database::get_company(&mut tx, company_id).await?.is_none() {
            return Err(CoreError::not_found("company", company_id).into());
        }
    }
    if let Some(manager_id) = payload.manager_id {
        aggregator::require_account(&mut tx, manager_id).await?;
    }
    let account = database::create_account(&mut tx, &payload).await?;
    commit(tx).await?;

    info!("Account created successfully with ID: {}", account.id);
    Ok((StatusCode::CREATED, Json(account)))
}

/// Handler for creating a project. The caller manages it unless the payload
/// names another manager.
pub async fn create_project(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Json(payload): Json<CreateProjectPayload>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    require_text(&payload.name, "Project name cannot be empty.")?;

    let mut tx = begin(&state).await?;
    aggregator::require_account(&mut tx, account_id).await?;
    let manager = payload.project_manager.unwrap_or(account_id);
    aggregator::require_account(&mut tx, manager).await?;
    if let Some(company_id) = payload.company_id {
        if database::get_company(&mut tx, company_id).await?.is_none() {
            return Err(CoreError::not_found("company", company_id).into());
        }
    }
    let project = database::create_project(&mut tx, &payload, manager).await?;
    commit(tx).await?;

    info!(
        "Project created successfully with ID: {} (manager {})",
        project.id, manager
    );
    Ok((StatusCode::CREATED, Json(project)))
}

/// Handler for the caller's projects, most outstanding work first.
pub async fn list_projects(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
) -> Result<Json<Vec<ProjectSummary>>, AppError> {
    let mut tx = begin(&state).await?;
    let projects = aggregator::list_projects_for(&mut tx, account_id, state.max_tree_depth()).await?;
    commit(tx).await?;

    info!(
        "Successfully retrieved {} projects for account {}.",
        projects.len(),
        account_id
    );
    Ok(Json(projects))
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskView {
    #[default]
    Tree,
    Flat,
}

#[derive(Deserialize, Debug, Default)]
pub struct TasksQuery {
    #[serde(default)]
    pub view: TaskView,
}

/// Handler for the rolled-up task forest of a project. `?view=flat` returns
/// the same nodes in pre-order with their depth.
pub async fn get_project_tasks(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Path(project_id): Path<i64>,
    Query(query): Query<TasksQuery>,
) -> Result<Response, AppError> {
    debug!(
        "Account {} requested tasks of project {} ({:?} view)",
        account_id, project_id, query.view
    );
    let mut tx = begin(&state).await?;
    let forest =
        aggregator::get_project_tasks(&mut tx, account_id, project_id, state.max_tree_depth())
            .await?;
    commit(tx).await?;

    let response = match query.view {
        TaskView::Tree => Json(&forest).into_response(),
        TaskView::Flat => Json(serde_json::json!({
            "project": &forest.project,
            "visibility": forest.visibility,
            "tasks": tree::pre_order(&forest.tasks),
        }))
        .into_response(),
    };
    Ok(response)
}

/// Handler for the project's aggregate effort over the caller's view.
pub async fn get_project_effort(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Path(project_id): Path<i64>,
) -> Result<Json<Project>, AppError> {
    let mut tx = begin(&state).await?;
    let project =
        aggregator::refresh_project_effort(&mut tx, account_id, project_id, state.max_tree_depth())
            .await?;
    commit(tx).await?;
    Ok(Json(project))
}

/// Handler for writing the rolled-up aggregates of a project back to the store.
pub async fn persist_project_rollup(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Path(project_id): Path<i64>,
) -> Result<Json<Project>, AppError> {
    let mut tx = begin(&state).await?;
    let project =
        aggregator::persist_project_rollup(&mut tx, account_id, project_id, state.max_tree_depth())
            .await?;
    commit(tx).await?;
    Ok(Json(project))
}

/// Handler for creating a task or subtask.
pub async fn create_task(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Json(payload): Json<CreateTaskPayload>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    debug!(
        "Received request to create task '{}' in project {}",
        payload.name, payload.project_id
    );
    require_text(&payload.name, "Task name cannot be empty.")?;
    require_hours("human_estimated_hours", payload.human_estimated_hours)?;
    require_hours("ai_estimated_hours", payload.ai_estimated_hours)?;

    let mut tx = begin(&state).await?;
    aggregator::require_account(&mut tx, account_id).await?;
    let project = aggregator::require_project(&mut tx, payload.project_id).await?;
    aggregator::visibility_of(&mut tx, account_id, &project).await?;
    aggregator::require_account(&mut tx, payload.assigned_to).await?;

    if let Some(parent_id) = payload.parent_task_id {
        let parent = aggregator::require_task(&mut tx, parent_id).await?;
        if parent.project_id != payload.project_id {
            return Err(CoreError::Invalid(format!(
                "parent task {} belongs to project {}, not {}",
                parent_id, parent.project_id, payload.project_id
            ))
            .into());
        }
    }

    let new_task = database::create_task(&mut tx, &payload).await?;
    commit(tx).await?;

    info!("Task created successfully with ID: {}", new_task.id);
    Ok((StatusCode::CREATED, Json(new_task)))
}

/// Loads a task the caller manages or is involved in.
async fn involved_task(
    tx: &mut Transaction<'static, Sqlite>,
    account_id: i64,
    task_id: i64,
) -> Result<Task, AppError> {
    let task = aggregator::require_task(tx, task_id).await?;
    let project = aggregator::require_project(tx, task.project_id).await?;
    if project.project_manager != account_id {
        let also_involved = database::task_assignees(tx, task_id).await?;
        if !access::is_involved(&task, &also_involved, account_id) {
            return Err(CoreError::Unauthorized {
                account_id,
                project_id: project.id,
            }
            .into());
        }
    }
    Ok(task)
}

/// Handler for reading a single task as stored.
pub async fn get_task(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Path(task_id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    let mut tx = begin(&state).await?;
    aggregator::require_account(&mut tx, account_id).await?;
    let task = involved_task(&mut tx, account_id, task_id).await?;
    commit(tx).await?;
    Ok(Json(task))
}

/// Applies a partial update. Finishing a task stamps the missing start and
/// completion times; reopening it clears the completion time and any actual
/// hours not given in the same update.
pub fn apply_update(
    task: &mut Task,
    payload: UpdateTaskPayload,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if let Some(name) = payload.name {
        require_text(&name, "Task name cannot be empty.")?;
        task.name = name;
    }
    require_hours("human_estimated_hours", payload.human_estimated_hours)?;
    require_hours("ai_estimated_hours", payload.ai_estimated_hours)?;
    require_hours("actual_hours", payload.actual_hours)?;

    if payload.description.is_some() {
        task.description = payload.description;
    }
    if let Some(assigned_to) = payload.assigned_to {
        task.assigned_to = assigned_to;
    }
    if let Some(order) = payload.order {
        task.order = order;
    }
    if payload.task_started.is_some() {
        task.task_started = payload.task_started;
    }
    if payload.task_completed.is_some() {
        task.task_completed = payload.task_completed;
    }
    if payload.human_estimated_hours.is_some() {
        task.human_estimated_hours = payload.human_estimated_hours;
    }
    if payload.ai_estimated_hours.is_some() {
        task.ai_estimated_hours = payload.ai_estimated_hours;
    }
    if payload.actual_hours.is_some() {
        task.actual_hours = payload.actual_hours;
    }

    match payload.is_finished {
        Some(true) => {
            task.is_finished = true;
            if task.task_completed.is_none() {
                task.task_completed = Some(now);
            }
            if task.task_started.is_none() {
                task.task_started = task.task_completed;
            }
        }
        Some(false) => {
            task.is_finished = false;
            task.task_completed = None;
            if payload.actual_hours.is_none() {
                task.actual_hours = None;
            }
        }
        None => {}
    }

    if let (Some(started), Some(completed)) = (task.task_started, task.task_completed) {
        if completed < started {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "A task cannot be completed before it started.",
            ));
        }
    }
    Ok(())
}

/// Handler for updating a task. Only the project manager or an account
/// involved in the task may change it.
pub async fn update_task(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Path(task_id): Path<i64>,
    Json(payload): Json<UpdateTaskPayload>,
) -> Result<Json<Task>, AppError> {
    let mut tx = begin(&state).await?;
    aggregator::require_account(&mut tx, account_id).await?;
    let mut task = involved_task(&mut tx, account_id, task_id).await?;

    if let Some(assigned_to) = payload.assigned_to {
        aggregator::require_account(&mut tx, assigned_to).await?;
    }
    apply_update(&mut task, payload, Utc::now())?;

    if !database::update_task(&mut tx, &task).await? {
        return Err(CoreError::not_found("task", task_id).into());
    }
    commit(tx).await?;

    info!("Task with ID {} updated successfully.", task_id);
    Ok(Json(task))
}

/// Handler for deleting a task together with its whole subtree.
pub async fn delete_task(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Path(task_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    debug!("Attempting to delete task with ID: {}", task_id);

    let mut tx = begin(&state).await?;
    let task = aggregator::require_task(&mut tx, task_id).await?;
    let project = aggregator::require_project(&mut tx, task.project_id).await?;
    access::require_manager(account_id, &project)?;

    let deleted = database::delete_subtree(&mut tx, task_id).await?;
    commit(tx).await?;

    info!(
        "Task with ID {} deleted successfully ({} tasks removed).",
        task_id, deleted
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for adding an account to a task's assignment set.
pub async fn assign_account(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Path(task_id): Path<i64>,
    Json(payload): Json<AssignAccountPayload>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let mut tx = begin(&state).await?;
    let task = aggregator::require_task(&mut tx, task_id).await?;
    let project = aggregator::require_project(&mut tx, task.project_id).await?;
    access::require_manager(account_id, &project)?;
    aggregator::require_account(&mut tx, payload.account_id).await?;

    let added = database::assign_account(&mut tx, task_id, payload.account_id).await?;
    commit(tx).await?;

    let status = if added {
        info!("Account {} assigned to task {}.", payload.account_id, task_id);
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(serde_json::json!({
            "task_id": task_id,
            "account_id": payload.account_id,
            "added": added
        })),
    ))
}

/// Handler for a task with its subtree rolled up.
pub async fn get_task_effort(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Path(task_id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    let mut tx = begin(&state).await?;
    let task =
        aggregator::refresh_task_effort(&mut tx, account_id, task_id, state.max_tree_depth())
            .await?;
    commit(tx).await?;
    Ok(Json(task))
}

/// Handler for the last persisted rollup of a task.
pub async fn get_task_rollup(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Path(task_id): Path<i64>,
) -> Result<Json<TaskRollup>, AppError> {
    let mut tx = begin(&state).await?;
    aggregator::require_account(&mut tx, account_id).await?;
    involved_task(&mut tx, account_id, task_id).await?;
    let rollup = database::get_task_rollup(&mut tx, task_id)
        .await?
        .ok_or_else(|| CoreError::not_found("task rollup", task_id))?;
    commit(tx).await?;
    Ok(Json(rollup))
}

// --- Error Handling ---

/// Error returned by every handler, rendered as `{"error", "code"}`.
#[derive(Debug)]
pub struct AppError {
    code: StatusCode,
    kind: &'static str,
    message: String,
}

impl AppError {
    pub fn new(code: StatusCode, message: &str) -> Self {
        let kind = match code {
            StatusCode::BAD_REQUEST => "invalid_input",
            StatusCode::UNAUTHORIZED => "unauthenticated",
            StatusCode::FORBIDDEN => "unauthorized",
            StatusCode::NOT_FOUND => "not_found",
            _ => "internal_error",
        };
        Self {
            code,
            kind,
            message: message.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.code
    }
}

/// Allows converting an `anyhow::Error` (coming from `database.rs`)
/// into our `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Log the internal error for debugging.
        tracing::error!("Internal server error: {:?}", err);
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "store_error",
            message: "An internal error occurred.".to_string(),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let kind = err.code();
        if let CoreError::Store(inner) = err {
            return Self {
                kind,
                ..Self::from(inner)
            };
        }

        let code = match &err {
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            CoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self {
            code,
            kind,
            message: err.to_string(),
        }
    }
}

/// Allows Axum to convert our `AppError` into an HTTP `Response`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.code.is_server_error() {
            error!(
                "Responding with error: status_code={}, message={}",
                self.code.as_u16(),
                self.message
            );
        } else {
            warn!(
                "Responding with error: status_code={}, message={}",
                self.code.as_u16(),
                self.message
            );
        }
        (
            self.code,
            Json(serde_json::json!({ "error": self.message, "code": self.kind })),
        )
            .into_response()
    }
}
