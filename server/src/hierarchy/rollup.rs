// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Bottom-up recomputation of effort, efficiency and completion.
//!
//! Leaves keep their entered values (actual hours may be derived from the
//! start and completion timestamps). Every parent is overwritten with the sum
//! of its already-resolved children, so running the rollup twice is a no-op.
//! Nothing here touches the store: persisting the result is the caller's job.

use std::ops::AddAssign;

use chrono::{DateTime, Utc};
use common::{Project, Task};

use crate::error::{CoreError, Result};
use crate::hierarchy::tree::TaskNode;

/// Resolved effort of a subtree, in hours. Missing values count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Effort {
    pub human: f64,
    pub ai: f64,
    pub actual: f64,
}

impl AddAssign for Effort {
    fn add_assign(&mut self, other: Self) {
        self.human += other.human;
        self.ai += other.ai;
        self.actual += other.actual;
    }
}

/// Weighted mean of `(value, weight)` samples.
///
/// Returns 0.0 when the weights sum to zero (including an empty input) and
/// never panics or divides by zero.
pub fn weighted_average<I>(samples: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (total, weight) = samples
        .into_iter()
        .fold((0.0, 0.0), |(total, weight), (value, w)| {
            (total + value * w, weight + w)
        });
    if weight == 0.0 { 0.0 } else { total / weight }
}

/// Estimated over actual hours. 0.0 when no actual time is known.
pub fn leaf_efficiency(human: Option<f64>, actual: Option<f64>) -> f64 {
    match actual {
        Some(actual) if actual > 0.0 => human.unwrap_or(0.0) / actual,
        _ => 0.0,
    }
}

fn hours_between(started: DateTime<Utc>, completed: DateTime<Utc>) -> Option<f64> {
    let elapsed = completed.signed_duration_since(started);
    if elapsed < chrono::Duration::zero() {
        return None;
    }
    Some(elapsed.num_seconds() as f64 / 3600.0)
}

/// Recomputes the subtree rooted at `node` in a single post-order pass and
/// returns its resolved effort.
///
/// A parent is complete only when every child is, which makes it complete
/// exactly when every leaf below it is.
pub fn refresh(node: &mut TaskNode) -> Result<Effort> {
    if node.is_leaf() {
        return refresh_leaf(node);
    }

    let mut total = Effort::default();
    let mut completed = true;
    let mut samples = Vec::with_capacity(node.children.len());
    for child in node.children.iter_mut() {
        let effort = refresh(child)?;
        total += effort;
        completed &= child.completed;
        samples.push((child.efficiency, effort.ai));
    }

    node.completed = completed;
    node.efficiency = weighted_average(samples);
    if let Some(task) = node.task.as_mut() {
        task.human_estimated_hours = Some(total.human);
        task.ai_estimated_hours = Some(total.ai);
        task.actual_hours = Some(total.actual);
        task.is_finished = completed;
        task.efficiency = node.efficiency;
    }
    Ok(total)
}

fn refresh_leaf(node: &mut TaskNode) -> Result<Effort> {
    // Placeholders always have children, so a leaf is a real task.
    let Some(task) = node.task.as_mut() else {
        return Ok(Effort::default());
    };

    resolve_actual_hours(task)?;
    task.efficiency = leaf_efficiency(task.human_estimated_hours, task.actual_hours);

    node.completed = task.is_finished;
    node.efficiency = task.efficiency;
    Ok(Effort {
        human: task.human_estimated_hours.unwrap_or(0.0),
        ai: task.ai_estimated_hours.unwrap_or(0.0),
        actual: task.actual_hours.unwrap_or(0.0),
    })
}

fn resolve_actual_hours(task: &mut Task) -> Result<()> {
    if task.is_finished && task.task_started.is_none() && task.task_completed.is_none() {
        return Err(CoreError::integrity(
            task.id,
            "finished task has neither a start nor a completion time",
        ));
    }
    if task.actual_hours.is_some() {
        return Ok(());
    }

    match (task.task_started, task.task_completed) {
        (Some(started), Some(completed)) => {
            let hours = hours_between(started, completed).ok_or_else(|| {
                CoreError::integrity(task.id, "task completed before it started")
            })?;
            task.actual_hours = Some(hours);
        }
        _ if task.is_finished => {
            return Err(CoreError::integrity(
                task.id,
                "finished task lacks the timestamps to derive its actual hours",
            ));
        }
        _ => {}
    }
    Ok(())
}

/// Rolls up every top-level node of a project forest into the project's
/// aggregate fields. Project efficiency is weighted by each top-level task's
/// AI-estimated hours.
pub fn refresh_project(project: &mut Project, forest: &mut [TaskNode]) -> Result<Effort> {
    let mut total = Effort::default();
    let mut samples = Vec::with_capacity(forest.len());
    for node in forest.iter_mut() {
        let effort = refresh(node)?;
        total += effort;
        samples.push((node.efficiency, effort.ai));
    }

    project.human_estimated_hours = total.human;
    project.ai_estimated_hours = total.ai;
    project.actual_hours = total.actual;
    project.efficiency = weighted_average(samples);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::testing::{t0, task};
    use crate::hierarchy::tree::{build_forest, walk};
    use chrono::Duration;

    fn project() -> Project {
        Project {
            id: 1,
            name: "P".to_string(),
            description: None,
            company_id: None,
            project_manager: 1,
            project_created: t0(),
            is_finished: false,
            human_estimated_hours: 0.0,
            ai_estimated_hours: 0.0,
            actual_hours: 0.0,
            efficiency: 0.0,
        }
    }

    fn with_human(mut t: Task, hours: f64) -> Task {
        t.human_estimated_hours = Some(hours);
        t
    }

    fn finished(mut t: Task, hours: i64) -> Task {
        t.is_finished = true;
        t.task_started = Some(t0());
        t.task_completed = Some(t0() + Duration::hours(hours));
        t
    }

    /// A (1) with A1 (3) and A2 (4), and B (2).
    fn scenario_rows() -> Vec<Task> {
        vec![
            task(1, None, 0),
            with_human(task(2, None, 1), 2.0),
            with_human(task(3, Some(1), 0), 3.0),
            with_human(task(4, Some(1), 1), 5.0),
        ]
    }

    fn human(node: &TaskNode) -> Option<f64> {
        node.task.as_ref().and_then(|t| t.human_estimated_hours)
    }

    #[test]
    fn test_weighted_average() {
        assert_eq!(weighted_average([(2.0, 1.0), (0.5, 3.0)]), 0.875);
        assert_eq!(weighted_average([(4.0, 2.0)]), 4.0);
    }

    #[test]
    fn test_weighted_average_zero_weight_is_zero() {
        assert_eq!(weighted_average(Vec::new()), 0.0);
        assert_eq!(weighted_average([(3.0, 0.0), (7.0, 0.0)]), 0.0);
    }

    #[test]
    fn test_leaf_efficiency() {
        assert_eq!(leaf_efficiency(Some(4.0), Some(2.0)), 2.0);
        assert_eq!(leaf_efficiency(Some(4.0), None), 0.0);
        assert_eq!(leaf_efficiency(Some(4.0), Some(0.0)), 0.0);
        assert_eq!(leaf_efficiency(None, Some(2.0)), 0.0);
    }

    #[test]
    fn test_parent_sums_children_and_project_sums_roots() {
        let mut forest = build_forest(scenario_rows(), 16).unwrap();
        let mut project = project();

        let total = refresh_project(&mut project, &mut forest).unwrap();

        assert_eq!(human(&forest[0]), Some(8.0));
        assert_eq!(human(&forest[1]), Some(2.0));
        assert_eq!(total.human, 10.0);
        assert_eq!(project.human_estimated_hours, 10.0);
    }

    #[test]
    fn test_actual_hours_derived_from_timestamps() {
        let mut rows = scenario_rows();
        rows[2] = finished(rows[2].clone(), 2);
        let mut forest = build_forest(rows, 16).unwrap();
        let mut project = project();

        refresh_project(&mut project, &mut forest).unwrap();

        let a1 = forest[0].children[0].task.as_ref().unwrap();
        assert_eq!(a1.actual_hours, Some(2.0));
        assert_eq!(forest[0].task.as_ref().unwrap().actual_hours, Some(2.0));
        assert_eq!(forest[1].task.as_ref().unwrap().actual_hours, None);
        assert_eq!(project.actual_hours, 2.0);
    }

    #[test]
    fn test_rollup_is_idempotent() {
        let mut rows = scenario_rows();
        rows[3] = finished(rows[3].clone(), 3);
        rows[3].ai_estimated_hours = Some(4.0);
        let mut forest = build_forest(rows, 16).unwrap();
        let mut project = project();

        let first = refresh_project(&mut project, &mut forest).unwrap();
        let snapshot = forest.clone();
        let second = refresh_project(&mut project, &mut forest).unwrap();

        assert_eq!(first, second);
        assert_eq!(forest, snapshot);
    }

    #[test]
    fn test_leaf_keeps_entered_values() {
        let mut leaf = task(1, None, 0);
        leaf.human_estimated_hours = Some(4.0);
        leaf.ai_estimated_hours = Some(3.0);
        leaf.actual_hours = Some(2.0);
        leaf.task_started = Some(t0());
        let mut forest = build_forest(vec![leaf.clone()], 16).unwrap();

        refresh(&mut forest[0]).unwrap();

        let after = forest[0].task.as_ref().unwrap();
        assert_eq!(after.human_estimated_hours, leaf.human_estimated_hours);
        assert_eq!(after.ai_estimated_hours, leaf.ai_estimated_hours);
        assert_eq!(after.actual_hours, leaf.actual_hours);
        assert_eq!(after.efficiency, 2.0);
    }

    #[test]
    fn test_sum_invariant_holds_at_every_depth() {
        let rows = vec![
            task(1, None, 0),
            task(2, Some(1), 0),
            with_human(task(3, Some(1), 1), 1.5),
            task(4, Some(2), 0),
            with_human(task(5, Some(2), 1), 2.0),
            with_human(task(6, Some(4), 0), 4.0),
            with_human(task(7, Some(4), 1), 0.5),
        ];
        let mut forest = build_forest(rows, 16).unwrap();
        refresh(&mut forest[0]).unwrap();

        let mut parents = 0;
        walk(&forest, 0, &mut |_, node| {
            if node.is_leaf() {
                return;
            }
            parents += 1;
            let sum: f64 = node.children.iter().filter_map(human).sum();
            assert_eq!(human(node), Some(sum), "task {}", node.id);
        });
        assert_eq!(parents, 3);
        assert_eq!(human(&forest[0]), Some(8.0));
    }

    #[test]
    fn test_completion_follows_leaves() {
        let rows = vec![
            task(1, None, 0),
            task(2, Some(1), 0),
            finished(task(3, Some(1), 1), 1),
            finished(task(4, Some(2), 0), 1),
            finished(task(5, Some(2), 1), 1),
        ];
        let mut forest = build_forest(rows.clone(), 16).unwrap();
        refresh(&mut forest[0]).unwrap();
        assert!(forest[0].completed);
        assert!(forest[0].children[0].completed);
        assert!(forest[0].task.as_ref().unwrap().is_finished);

        // Reopen one leaf deep in the tree.
        let mut reopened = rows;
        reopened[4] = task(5, Some(2), 1);
        let mut forest = build_forest(reopened, 16).unwrap();
        refresh(&mut forest[0]).unwrap();
        assert!(!forest[0].completed);
        assert!(!forest[0].children[0].completed);
        assert!(forest[0].children[1].completed);
    }

    #[test]
    fn test_parent_efficiency_weighted_by_ai_hours() {
        let mut fast = task(2, Some(1), 0);
        fast.human_estimated_hours = Some(4.0);
        fast.actual_hours = Some(2.0);
        fast.ai_estimated_hours = Some(1.0);
        let mut slow = task(3, Some(1), 1);
        slow.human_estimated_hours = Some(1.0);
        slow.actual_hours = Some(2.0);
        slow.ai_estimated_hours = Some(3.0);
        let mut forest = build_forest(vec![task(1, None, 0), fast, slow], 16).unwrap();

        refresh(&mut forest[0]).unwrap();
        assert_eq!(forest[0].efficiency, 0.875);
    }

    #[test]
    fn test_parent_efficiency_without_ai_hours_is_zero() {
        let mut child = task(2, Some(1), 0);
        child.human_estimated_hours = Some(4.0);
        child.actual_hours = Some(2.0);
        let mut forest = build_forest(vec![task(1, None, 0), child], 16).unwrap();

        refresh(&mut forest[0]).unwrap();
        assert_eq!(forest[0].children[0].efficiency, 2.0);
        assert_eq!(forest[0].efficiency, 0.0);
    }

    #[test]
    fn test_finished_without_timestamps_is_an_error() {
        let mut bad = task(3, Some(1), 0);
        bad.is_finished = true;
        let mut forest = build_forest(vec![task(1, None, 0), bad], 16).unwrap();

        let err = refresh(&mut forest[0]).unwrap_err();
        assert!(matches!(err, CoreError::DataIntegrity { task_id: 3, .. }));
    }

    #[test]
    fn test_finished_with_recorded_actual_still_needs_a_timestamp() {
        let mut bad = task(1, None, 0);
        bad.is_finished = true;
        bad.actual_hours = Some(1.0);
        let mut forest = build_forest(vec![bad], 16).unwrap();

        assert!(refresh(&mut forest[0]).is_err());
    }

    #[test]
    fn test_finished_with_one_timestamp_is_an_error() {
        let mut bad = task(1, None, 0);
        bad.is_finished = true;
        bad.task_started = Some(t0());
        let mut forest = build_forest(vec![bad], 16).unwrap();

        assert!(refresh(&mut forest[0]).is_err());
    }

    #[test]
    fn test_completion_before_start_is_an_error() {
        let mut bad = task(1, None, 0);
        bad.task_started = Some(t0());
        bad.task_completed = Some(t0() - Duration::hours(1));
        let mut forest = build_forest(vec![bad], 16).unwrap();

        assert!(matches!(
            refresh(&mut forest[0]).unwrap_err(),
            CoreError::DataIntegrity { task_id: 1, .. }
        ));
    }

    #[test]
    fn test_placeholder_is_a_pure_container() {
        let rows = vec![
            with_human(task(4, Some(1), 1), 5.0),
            finished(with_human(task(3, Some(1), 0), 3.0), 1),
        ];
        let mut forest = build_forest(rows, 16).unwrap();
        let mut project = project();

        refresh_project(&mut project, &mut forest).unwrap();

        assert!(forest[0].placeholder);
        assert!(forest[0].task.is_none());
        assert!(!forest[0].completed);
        assert_eq!(project.human_estimated_hours, 8.0);
        assert_eq!(project.actual_hours, 1.0);
    }
}
