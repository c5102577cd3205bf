// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use chrono::{DateTime, TimeZone, Utc};
use common::Task;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
}

/// An unfinished task of project 1 assigned to account 1, with no effort entered.
pub fn task(id: i64, parent_task_id: Option<i64>, order: i64) -> Task {
    Task {
        id,
        name: format!("task {}", id),
        description: None,
        project_id: 1,
        assigned_to: 1,
        parent_task_id,
        order,
        task_created: t0(),
        task_started: None,
        task_completed: None,
        is_finished: false,
        human_estimated_hours: None,
        ai_estimated_hours: None,
        actual_hours: None,
        efficiency: 0.0,
    }
}
