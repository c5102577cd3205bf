// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

/// Creates and configures the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/companies", post(handlers::create_company))
        .route("/api/accounts", post(handlers::create_account))
        // Projects visible to the caller, and project creation
        .route(
            "/api/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        // Rolled-up task forest, `?view=flat` for pre-order rows
        .route("/api/projects/{id}/tasks", get(handlers::get_project_tasks))
        .route("/api/projects/{id}/effort", get(handlers::get_project_effort))
        // Writes the rolled-up aggregates back to the store
        .route(
            "/api/projects/{id}/rollup",
            patch(handlers::persist_project_rollup),
        )
        .route("/api/tasks", post(handlers::create_task))
        .route(
            "/api/tasks/{id}",
            get(handlers::get_task)
                .patch(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route("/api/tasks/{id}/assignees", post(handlers::assign_account))
        .route("/api/tasks/{id}/effort", get(handlers::get_task_effort))
        .route("/api/tasks/{id}/rollup", get(handlers::get_task_rollup))
        .layer(TraceLayer::new_for_http())
        // Adds the pool and configuration to the application state
        .with_state(state)
}
