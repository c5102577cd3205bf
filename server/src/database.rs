// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use chrono::Utc;
use common::{
    Account, Company, CreateAccountPayload, CreateCompanyPayload, CreateProjectPayload,
    CreateTaskPayload, Project, Task, TaskRollup,
};
use sqlx::{migrate::MigrateDatabase, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::hierarchy::access::TaskFilter;
use crate::hierarchy::tree::{walk, TaskNode};

const SCHEMA: [&str; 7] = [
    r#"
    CREATE TABLE IF NOT EXISTS companies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        founding_date TIMESTAMP NOT NULL,
        founding_member INTEGER NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        company_id INTEGER NULL REFERENCES companies(id),
        manager_id INTEGER NULL REFERENCES accounts(id),
        position TEXT NULL,
        account_created TIMESTAMP NOT NULL,
        efficiency_score REAL NOT NULL DEFAULT 1.0
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT NULL,
        company_id INTEGER NULL REFERENCES companies(id),
        project_manager INTEGER NOT NULL REFERENCES accounts(id),
        project_created TIMESTAMP NOT NULL,
        is_finished BOOLEAN NOT NULL DEFAULT 0
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT NULL,
        project_id INTEGER NOT NULL REFERENCES projects(id),
        assigned_to INTEGER NOT NULL REFERENCES accounts(id),
        parent_task_id INTEGER NULL REFERENCES tasks(id) ON DELETE CASCADE,
        task_order INTEGER NOT NULL DEFAULT 0,
        task_created TIMESTAMP NOT NULL,
        task_started TIMESTAMP NULL,
        task_completed TIMESTAMP NULL,
        is_finished BOOLEAN NOT NULL DEFAULT 0,
        human_estimated_hours REAL NULL,
        ai_estimated_hours REAL NULL,
        actual_hours REAL NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_tasks_project_parent
        ON tasks (project_id, parent_task_id, task_order);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_assignments (
        task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        assigned_at TIMESTAMP NOT NULL,
        PRIMARY KEY (task_id, account_id)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_rollups (
        task_id INTEGER PRIMARY KEY REFERENCES tasks(id) ON DELETE CASCADE,
        human_estimated_hours REAL NOT NULL,
        ai_estimated_hours REAL NOT NULL,
        actual_hours REAL NOT NULL,
        completed BOOLEAN NOT NULL,
        efficiency REAL NOT NULL,
        rolled_up_at TIMESTAMP NOT NULL
    );
    "#,
];

// Every task in the subtree rooted at ?1. UNION (not UNION ALL) stops on cycles.
const SUBTREE_CTE: &str = r#"
    WITH RECURSIVE subtree(id) AS (
        SELECT id FROM tasks WHERE id = ?1
        UNION
        SELECT t.id FROM tasks t JOIN subtree s ON t.parent_task_id = s.id
    )
"#;

/// Establishes the database connection pool.
/// If the database does not exist, it creates it, then makes sure every table exists.
pub async fn establish_connection_pool(database_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        info!("Creating database {}", database_url);
        Sqlite::create_database(database_url)
            .await
            .context("Failed to create database")?;
    } else {
        info!("Database already exists.");
    }

    let pool = SqlitePool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Creates the tables and indexes if they are missing.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to create schema")?;
    }
    info!("Schema is ready.");
    Ok(())
}

pub async fn create_company(
    conn: &mut SqliteConnection,
    payload: &CreateCompanyPayload,
) -> Result<Company> {
    let founding_date = Utc::now();
    let id = sqlx::query(
        "INSERT INTO companies (name, founding_date, founding_member) VALUES (?, ?, ?)",
    )
    .bind(&payload.name)
    .bind(founding_date)
    .bind(payload.founding_member)
    .execute(&mut *conn)
    .await
    .context("Failed to insert company into DB")?
    .last_insert_rowid();

    Ok(Company {
        id,
        name: payload.name.clone(),
        founding_date,
        founding_member: payload.founding_member,
    })
}

pub async fn create_account(
    conn: &mut SqliteConnection,
    payload: &CreateAccountPayload,
) -> Result<Account> {
    let account_created = Utc::now();
    let id = sqlx::query(
        "INSERT INTO accounts (name, email, company_id, manager_id, position, account_created, efficiency_score) VALUES (?, ?, ?, ?, ?, ?, 1.0)",
    )
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(payload.company_id)
    .bind(payload.manager_id)
    .bind(&payload.position)
    .bind(account_created)
    .execute(&mut *conn)
    .await
    .context("Failed to insert account into DB")?
    .last_insert_rowid();

    Ok(Account {
        id,
        name: payload.name.clone(),
        email: payload.email.clone(),
        company_id: payload.company_id,
        manager_id: payload.manager_id,
        position: payload.position.clone(),
        account_created,
        efficiency_score: 1.0,
    })
}

pub async fn get_account(conn: &mut SqliteConnection, account_id: i64) -> Result<Option<Account>> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await
        .context(format!("Failed to load account {}", account_id))
}

pub async fn get_company(conn: &mut SqliteConnection, company_id: i64) -> Result<Option<Company>> {
    sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = ?")
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await
        .context(format!("Failed to load company {}", company_id))
}

pub async fn create_project(
    conn: &mut SqliteConnection,
    payload: &CreateProjectPayload,
    project_manager: i64,
) -> Result<Project> {
    let project_created = Utc::now();
    let id = sqlx::query(
        "INSERT INTO projects (name, description, company_id, project_manager, project_created, is_finished) VALUES (?, ?, ?, ?, ?, 0)",
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.company_id)
    .bind(project_manager)
    .bind(project_created)
    .execute(&mut *conn)
    .await
    .context("Failed to insert project into DB")?
    .last_insert_rowid();

    Ok(Project {
        id,
        name: payload.name.clone(),
        description: payload.description.clone(),
        company_id: payload.company_id,
        project_manager,
        project_created,
        is_finished: false,
        human_estimated_hours: 0.0,
        ai_estimated_hours: 0.0,
        actual_hours: 0.0,
        efficiency: 0.0,
    })
}

pub async fn get_project(conn: &mut SqliteConnection, project_id: i64) -> Result<Option<Project>> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(project_id)
        .fetch_optional(&mut *conn)
        .await
        .context(format!("Failed to load project {}", project_id))
}

/// Projects whose manager is `account_id`, oldest first.
pub async fn managed_projects(conn: &mut SqliteConnection, account_id: i64) -> Result<Vec<Project>> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE project_manager = ? ORDER BY id ASC")
        .bind(account_id)
        .fetch_all(&mut *conn)
        .await
        .context(format!("Failed to load projects managed by {}", account_id))
}

pub async fn all_projects(conn: &mut SqliteConnection) -> Result<Vec<Project>> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY id ASC")
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load projects")
}

pub async fn create_task(conn: &mut SqliteConnection, payload: &CreateTaskPayload) -> Result<Task> {
    let task_created = Utc::now();

    debug!(
        "Insert values: name={}, project_id={}, assigned_to={}, parent_task_id={:?}, order={}",
        payload.name, payload.project_id, payload.assigned_to, payload.parent_task_id, payload.order
    );

    let id = sqlx::query(
        "INSERT INTO tasks (name, description, project_id, assigned_to, parent_task_id, task_order, task_created, is_finished, human_estimated_hours, ai_estimated_hours) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.project_id)
    .bind(payload.assigned_to)
    .bind(payload.parent_task_id)
    .bind(payload.order)
    .bind(task_created)
    .bind(payload.human_estimated_hours)
    .bind(payload.ai_estimated_hours)
    .execute(&mut *conn)
    .await
    .context("Failed to insert task into DB")?
    .last_insert_rowid();

    Ok(Task {
        id,
        name: payload.name.clone(),
        description: payload.description.clone(),
        project_id: payload.project_id,
        assigned_to: payload.assigned_to,
        parent_task_id: payload.parent_task_id,
        order: payload.order,
        task_created,
        task_started: None,
        task_completed: None,
        is_finished: false,
        human_estimated_hours: payload.human_estimated_hours,
        ai_estimated_hours: payload.ai_estimated_hours,
        actual_hours: None,
        efficiency: 0.0,
    })
}

pub async fn get_task(conn: &mut SqliteConnection, task_id: i64) -> Result<Option<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(task_id)
        .fetch_optional(&mut *conn)
        .await
        .context(format!("Failed to load task {}", task_id))
}

/// Writes back every mutable column of `task`. Returns false if the row is gone.
pub async fn update_task(conn: &mut SqliteConnection, task: &Task) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tasks SET name = ?, description = ?, assigned_to = ?, task_order = ?, task_started = ?, task_completed = ?, is_finished = ?, human_estimated_hours = ?, ai_estimated_hours = ?, actual_hours = ? WHERE id = ?",
    )
    .bind(&task.name)
    .bind(&task.description)
    .bind(task.assigned_to)
    .bind(task.order)
    .bind(task.task_started)
    .bind(task.task_completed)
    .bind(task.is_finished)
    .bind(task.human_estimated_hours)
    .bind(task.ai_estimated_hours)
    .bind(task.actual_hours)
    .bind(task.id)
    .execute(&mut *conn)
    .await
    .context(format!("Failed to update task with ID: {}", task.id))?;

    Ok(result.rows_affected() > 0)
}

/// Scans tasks in `(project_id, parent_task_id, order)` order, roots first.
///
/// With `assigned_to` set, only tasks where the account is the primary
/// assignee or in the assignment table are returned.
pub async fn scan_tasks(conn: &mut SqliteConnection, filter: &TaskFilter) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        r#"
        SELECT * FROM tasks
        WHERE (?1 IS NULL OR project_id = ?1)
          AND (?2 IS NULL
               OR assigned_to = ?2
               OR id IN (SELECT task_id FROM task_assignments WHERE account_id = ?2))
        ORDER BY project_id ASC, parent_task_id ASC NULLS FIRST, task_order ASC, id ASC
        "#,
    )
    .bind(filter.project_id)
    .bind(filter.assigned_to)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to scan tasks from DB")?;

    debug!("Scanned {} tasks with {:?}", tasks.len(), filter);
    Ok(tasks)
}

/// Number of tasks in `project_id` involving `account_id`.
pub async fn assigned_task_count(
    conn: &mut SqliteConnection,
    account_id: i64,
    project_id: i64,
) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM tasks
        WHERE project_id = ?1
          AND (assigned_to = ?2
               OR id IN (SELECT task_id FROM task_assignments WHERE account_id = ?2))
        "#,
    )
    .bind(project_id)
    .bind(account_id)
    .fetch_one(&mut *conn)
    .await
    .context(format!(
        "Failed to count tasks of account {} in project {}",
        account_id, project_id
    ))
}

/// Adds `account_id` to the auxiliary assignment set of `task_id`.
/// Returns false if the account was already in it.
pub async fn assign_account(conn: &mut SqliteConnection, task_id: i64, account_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO task_assignments (task_id, account_id, assigned_at) VALUES (?, ?, ?)",
    )
    .bind(task_id)
    .bind(account_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .context(format!(
        "Failed to assign account {} to task {}",
        account_id, task_id
    ))?;

    Ok(result.rows_affected() > 0)
}

/// The auxiliary assignment set of a task.
pub async fn task_assignees(conn: &mut SqliteConnection, task_id: i64) -> Result<Vec<i64>> {
    sqlx::query_scalar::<_, i64>(
        "SELECT account_id FROM task_assignments WHERE task_id = ? ORDER BY account_id ASC",
    )
    .bind(task_id)
    .fetch_all(&mut *conn)
    .await
    .context(format!("Failed to load assignees of task {}", task_id))
}

/// Deletes a task, every descendant, their assignment links and rollups.
/// Returns the number of tasks removed (0 if the root does not exist).
pub async fn delete_subtree(conn: &mut SqliteConnection, root_task_id: i64) -> Result<u64> {
    debug!("Attempting to delete subtree rooted at task {}", root_task_id);

    sqlx::query(&format!(
        "{} DELETE FROM task_assignments WHERE task_id IN (SELECT id FROM subtree)",
        SUBTREE_CTE
    ))
    .bind(root_task_id)
    .execute(&mut *conn)
    .await
    .context(format!("Failed to delete assignments under task {}", root_task_id))?;

    sqlx::query(&format!(
        "{} DELETE FROM task_rollups WHERE task_id IN (SELECT id FROM subtree)",
        SUBTREE_CTE
    ))
    .bind(root_task_id)
    .execute(&mut *conn)
    .await
    .context(format!("Failed to delete rollups under task {}", root_task_id))?;

    let result = sqlx::query(&format!(
        "{} DELETE FROM tasks WHERE id IN (SELECT id FROM subtree)",
        SUBTREE_CTE
    ))
    .bind(root_task_id)
    .execute(&mut *conn)
    .await
    .context(format!("Failed to delete subtree of task {}", root_task_id))?;

    let removed = result.rows_affected();
    info!("Deleted {} tasks under task ID: {}", removed, root_task_id);
    Ok(removed)
}

/// Persists the rolled-up effort and completion of every real task in a forest
/// into `task_rollups`. Task rows are left alone, so the next rollup still
/// starts from entered values only.
/// Meant to run in the same transaction as the scan that produced the forest.
pub async fn store_rollup(conn: &mut SqliteConnection, forest: &[TaskNode]) -> Result<usize> {
    let mut nodes: Vec<&TaskNode> = Vec::new();
    walk(forest, 0, &mut |_, node| {
        if !node.placeholder {
            nodes.push(node);
        }
    });

    let rolled_up_at = Utc::now();
    for node in &nodes {
        let Some(task) = node.task.as_ref() else {
            continue;
        };
        sqlx::query(
            r#"
            INSERT INTO task_rollups
                (task_id, human_estimated_hours, ai_estimated_hours, actual_hours, completed, efficiency, rolled_up_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(task_id) DO UPDATE SET
                human_estimated_hours = excluded.human_estimated_hours,
                ai_estimated_hours = excluded.ai_estimated_hours,
                actual_hours = excluded.actual_hours,
                completed = excluded.completed,
                efficiency = excluded.efficiency,
                rolled_up_at = excluded.rolled_up_at
            "#,
        )
        .bind(task.id)
        .bind(task.human_estimated_hours.unwrap_or(0.0))
        .bind(task.ai_estimated_hours.unwrap_or(0.0))
        .bind(task.actual_hours.unwrap_or(0.0))
        .bind(node.completed)
        .bind(node.efficiency)
        .bind(rolled_up_at)
        .execute(&mut *conn)
        .await
        .context(format!("Failed to store rollup of task {}", task.id))?;
    }

    info!("Stored rollup for {} tasks.", nodes.len());
    Ok(nodes.len())
}

/// The last persisted rollup of a task, if any.
pub async fn get_task_rollup(conn: &mut SqliteConnection, task_id: i64) -> Result<Option<TaskRollup>> {
    sqlx::query_as::<_, TaskRollup>("SELECT * FROM task_rollups WHERE task_id = ?")
        .bind(task_id)
        .fetch_optional(&mut *conn)
        .await
        .context(format!("Failed to load rollup of task {}", task_id))
}
