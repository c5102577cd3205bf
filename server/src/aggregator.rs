// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Per-account project views: authorization, tree building and rollup glued
//! together over one store connection.
//!
//! Every function here reads through the connection it is given, so callers
//! that pass a transaction get a consistent snapshot. Only
//! [`persist_project_rollup`] writes, and it never commits.

use std::collections::{BTreeMap, HashSet};

use common::{Account, Project, Task};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::database;
use crate::error::{CoreError, Result};
use crate::hierarchy::access::{self, TaskFilter, Visibility};
use crate::hierarchy::rollup;
use crate::hierarchy::tree::{self, TaskNode};

/// The task forest of one project as seen by one account.
#[derive(Serialize, Debug)]
pub struct ProjectForest {
    pub project: Project,
    pub visibility: Visibility,
    pub tasks: Vec<TaskNode>,
}

/// One entry of the "my projects" listing.
#[derive(Serialize, Debug)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub visibility: Visibility,
    pub tasks_remaining: usize,
}

pub async fn require_account(conn: &mut SqliteConnection, account_id: i64) -> Result<Account> {
    database::get_account(conn, account_id)
        .await?
        .ok_or_else(|| CoreError::not_found("account", account_id))
}

pub async fn require_project(conn: &mut SqliteConnection, project_id: i64) -> Result<Project> {
    database::get_project(conn, project_id)
        .await?
        .ok_or_else(|| CoreError::not_found("project", project_id))
}

pub async fn require_task(conn: &mut SqliteConnection, task_id: i64) -> Result<Task> {
    database::get_task(conn, task_id)
        .await?
        .ok_or_else(|| CoreError::not_found("task", task_id))
}

/// Resolves how much of `project` the account sees.
pub async fn visibility_of(
    conn: &mut SqliteConnection,
    account_id: i64,
    project: &Project,
) -> Result<Visibility> {
    let assigned = if project.project_manager == account_id {
        0
    } else {
        database::assigned_task_count(conn, account_id, project.id).await?
    };
    access::authorize(account_id, project, assigned)
}

/// Builds the authorized, not yet rolled-up forest of one project.
pub async fn authorized_forest(
    conn: &mut SqliteConnection,
    account_id: i64,
    project_id: i64,
    max_depth: usize,
) -> Result<ProjectForest> {
    require_account(conn, account_id).await?;
    let project = require_project(conn, project_id).await?;
    let visibility = visibility_of(conn, account_id, &project).await?;

    let filter = TaskFilter::for_visibility(visibility, account_id, project.id);
    let rows = database::scan_tasks(conn, &filter).await?;
    let tasks = tree::build_forest(rows, max_depth)?;

    debug!(
        "Built forest of project {} for account {} ({:?}, {} roots)",
        project.id,
        account_id,
        visibility,
        tasks.len()
    );
    Ok(ProjectForest {
        project,
        visibility,
        tasks,
    })
}

/// The rolled-up task forest of a project for `account_id`.
pub async fn get_project_tasks(
    conn: &mut SqliteConnection,
    account_id: i64,
    project_id: i64,
    max_depth: usize,
) -> Result<ProjectForest> {
    let mut forest = authorized_forest(conn, account_id, project_id, max_depth).await?;
    rollup::refresh_project(&mut forest.project, &mut forest.tasks)?;
    Ok(forest)
}

/// The project with its aggregate effort recomputed over the account's view.
pub async fn refresh_project_effort(
    conn: &mut SqliteConnection,
    account_id: i64,
    project_id: i64,
    max_depth: usize,
) -> Result<Project> {
    let forest = get_project_tasks(conn, account_id, project_id, max_depth).await?;
    Ok(forest.project)
}

/// The task with its subtree rolled up. Sibling subtrees are not evaluated,
/// so a broken sibling cannot fail this call.
pub async fn refresh_task_effort(
    conn: &mut SqliteConnection,
    account_id: i64,
    task_id: i64,
    max_depth: usize,
) -> Result<Task> {
    let task = require_task(conn, task_id).await?;
    let mut forest = authorized_forest(conn, account_id, task.project_id, max_depth).await?;

    let node = tree::find_mut(&mut forest.tasks, task_id).ok_or(CoreError::Unauthorized {
        account_id,
        project_id: task.project_id,
    })?;
    rollup::refresh(node)?;

    node.task
        .clone()
        .ok_or_else(|| CoreError::not_found("task", task_id))
}

/// Recomputes the full project tree and stores the per-task results as rollup
/// snapshots through `conn`. Manager only; the caller commits.
pub async fn persist_project_rollup(
    conn: &mut SqliteConnection,
    account_id: i64,
    project_id: i64,
    max_depth: usize,
) -> Result<Project> {
    let mut forest = authorized_forest(conn, account_id, project_id, max_depth).await?;
    access::require_manager(account_id, &forest.project)?;

    rollup::refresh_project(&mut forest.project, &mut forest.tasks)?;
    let stored = database::store_rollup(conn, &forest.tasks).await?;

    info!("Persisted rollup of project {} ({} tasks).", project_id, stored);
    Ok(forest.project)
}

/// Splits an ordered scan into per-project row lists, keeping row order.
pub fn bucket_by_project(rows: Vec<Task>) -> BTreeMap<i64, Vec<Task>> {
    let mut buckets: BTreeMap<i64, Vec<Task>> = BTreeMap::new();
    for row in rows {
        buckets.entry(row.project_id).or_default().push(row);
    }
    buckets
}

/// Authorized forests across projects, not rolled up.
///
/// For an account: the full tree of every project it manages, then the
/// assigned-only tree of every other project it is involved in. Without an
/// account: the full tree of every project.
pub async fn load_forests(
    conn: &mut SqliteConnection,
    account_id: Option<i64>,
    max_depth: usize,
) -> Result<Vec<ProjectForest>> {
    let Some(account_id) = account_id else {
        let projects = database::all_projects(conn).await?;
        let mut buckets =
            bucket_by_project(database::scan_tasks(conn, &TaskFilter::everything()).await?);

        let mut forests = Vec::with_capacity(projects.len());
        for project in projects {
            let rows = buckets.remove(&project.id).unwrap_or_default();
            forests.push(ProjectForest {
                tasks: tree::build_forest(rows, max_depth)?,
                visibility: Visibility::Manager,
                project,
            });
        }
        return Ok(forests);
    };

    require_account(conn, account_id).await?;

    let managed = database::managed_projects(conn, account_id).await?;
    let managed_ids: HashSet<i64> = managed.iter().map(|p| p.id).collect();

    let mut forests = Vec::new();
    for project in managed {
        let rows = database::scan_tasks(conn, &TaskFilter::project(project.id)).await?;
        forests.push(ProjectForest {
            tasks: tree::build_forest(rows, max_depth)?,
            visibility: Visibility::Manager,
            project,
        });
    }

    let assigned = database::scan_tasks(conn, &TaskFilter::assigned(account_id, None)).await?;
    for (project_id, rows) in bucket_by_project(assigned) {
        if managed_ids.contains(&project_id) {
            continue;
        }
        let project = require_project(conn, project_id).await?;
        forests.push(ProjectForest {
            tasks: tree::build_forest(rows, max_depth)?,
            visibility: Visibility::Assignee,
            project,
        });
    }

    Ok(forests)
}

/// Real tasks whose rolled-up completion is false. Placeholders never count.
pub fn count_remaining(forest: &[TaskNode]) -> usize {
    let mut remaining = 0;
    tree::walk(forest, 0, &mut |_, node| {
        if !node.placeholder && !node.completed {
            remaining += 1;
        }
    });
    remaining
}

/// The "my projects" view: every project the account manages or works in,
/// with aggregates rolled up over what the account sees, most outstanding
/// work first.
pub async fn list_projects_for(
    conn: &mut SqliteConnection,
    account_id: i64,
    max_depth: usize,
) -> Result<Vec<ProjectSummary>> {
    let forests = load_forests(conn, Some(account_id), max_depth).await?;

    let mut summaries = Vec::with_capacity(forests.len());
    for mut forest in forests {
        if forest.visibility == Visibility::Assignee && forest.tasks.is_empty() {
            continue;
        }
        rollup::refresh_project(&mut forest.project, &mut forest.tasks)?;
        summaries.push(ProjectSummary {
            tasks_remaining: count_remaining(&forest.tasks),
            visibility: forest.visibility,
            project: forest.project,
        });
    }

    // Stable: equal counts keep managed-first, then project id order.
    summaries.sort_by(|a, b| b.tasks_remaining.cmp(&a.tasks_remaining));
    Ok(summaries)
}
