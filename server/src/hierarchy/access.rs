// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Decides which task rows an account may see in a project.

use common::{Project, Task};
use serde::Serialize;

use crate::error::{CoreError, Result};

/// How much of a project an account sees.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// The project manager: every task of the project.
    Manager,
    /// Only tasks the account is assigned to, directly or through the
    /// assignment table.
    Assignee,
}

/// Restriction applied to a task scan. An empty filter scans every project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub project_id: Option<i64>,
    pub assigned_to: Option<i64>,
}

impl TaskFilter {
    pub fn everything() -> Self {
        Self::default()
    }

    /// Every task of one project.
    pub fn project(project_id: i64) -> Self {
        Self {
            project_id: Some(project_id),
            assigned_to: None,
        }
    }

    /// Tasks involving `account_id`, across all projects or within one.
    pub fn assigned(account_id: i64, project_id: Option<i64>) -> Self {
        Self {
            project_id,
            assigned_to: Some(account_id),
        }
    }

    /// The scan matching what `account_id` may see in `project_id`.
    pub fn for_visibility(visibility: Visibility, account_id: i64, project_id: i64) -> Self {
        match visibility {
            Visibility::Manager => Self::project(project_id),
            Visibility::Assignee => Self::assigned(account_id, Some(project_id)),
        }
    }
}

/// Resolves the visibility of `account_id` on `project`.
///
/// The manager always sees the full project. Anyone else needs at least one
/// assigned task there; an account with no relationship to the project is
/// unauthorized, which is not the same as seeing an empty project.
pub fn authorize(account_id: i64, project: &Project, assigned_tasks: i64) -> Result<Visibility> {
    if project.project_manager == account_id {
        Ok(Visibility::Manager)
    } else if assigned_tasks > 0 {
        Ok(Visibility::Assignee)
    } else {
        Err(CoreError::Unauthorized {
            account_id,
            project_id: project.id,
        })
    }
}

/// Whether `account_id` is involved in `task`, given the task's auxiliary
/// assignment set.
pub fn is_involved(task: &Task, also_involved: &[i64], account_id: i64) -> bool {
    task.assigned_to == account_id || also_involved.contains(&account_id)
}

/// Requires manager visibility for write operations on the whole project.
pub fn require_manager(account_id: i64, project: &Project) -> Result<()> {
    if project.project_manager == account_id {
        Ok(())
    } else {
        Err(CoreError::Unauthorized {
            account_id,
            project_id: project.id,
        })
    }
}
