// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Reconstructs the ordered task forest of a project from flat task rows.
//!
//! Rows are first placed in an arena and indexed by id, so a child may appear
//! before its parent in the scan. A row whose parent is not part of the scan
//! (usually because the caller may not see it) is attached to an id-only
//! placeholder root keyed by the missing parent id.

use std::collections::HashMap;

use common::Task;
use serde::Serialize;
use tracing::warn;

use crate::error::{CoreError, Result};

/// One node of a task forest. Placeholders stand in for parents the current
/// scan does not contain and carry no task data.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TaskNode {
    pub id: i64,
    pub placeholder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    /// Rolled-up completion. Mirrors `task.is_finished` for real tasks.
    pub completed: bool,
    pub efficiency: f64,
    pub children: Vec<TaskNode>,
}

impl TaskNode {
    fn from_task(task: Task, children: Vec<TaskNode>) -> Self {
        Self {
            id: task.id,
            placeholder: false,
            completed: task.is_finished,
            efficiency: task.efficiency,
            task: Some(task),
            children,
        }
    }

    fn placeholder(id: i64, children: Vec<TaskNode>) -> Self {
        Self {
            id,
            placeholder: true,
            task: None,
            completed: false,
            efficiency: 0.0,
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A pre-order row of a flattened forest.
#[derive(Serialize, Debug)]
pub struct FlatRow<'a> {
    pub depth: usize,
    pub id: i64,
    pub placeholder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<&'a Task>,
    pub completed: bool,
    pub efficiency: f64,
}

enum Root {
    Task(usize),
    Placeholder(usize),
}

/// Builds the forest for one project's rows.
///
/// Roots keep the scan order. Siblings are sorted by ascending `order`, ties
/// keeping scan order. Duplicate ids, self-parents, parent cycles and trees
/// deeper than `max_depth` levels are data integrity errors.
pub fn build_forest(tasks: Vec<Task>, max_depth: usize) -> Result<Vec<TaskNode>> {
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(tasks.len());
    for (slot, task) in tasks.iter().enumerate() {
        if index.insert(task.id, slot).is_some() {
            return Err(CoreError::integrity(task.id, "task appears twice in one scan"));
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    let mut orphans: Vec<(i64, Vec<usize>)> = Vec::new();
    let mut orphan_groups: HashMap<i64, usize> = HashMap::new();
    let mut roots: Vec<Root> = Vec::new();

    for (slot, task) in tasks.iter().enumerate() {
        match task.parent_task_id {
            None => roots.push(Root::Task(slot)),
            Some(parent_id) if parent_id == task.id => {
                return Err(CoreError::integrity(task.id, "task is its own parent"));
            }
            Some(parent_id) => match index.get(&parent_id) {
                Some(&parent) => children[parent].push(slot),
                None => {
                    warn!(
                        "{}",
                        CoreError::AmbiguousParent {
                            task_id: task.id,
                            parent_id,
                        }
                    );
                    let group = *orphan_groups.entry(parent_id).or_insert_with(|| {
                        orphans.push((parent_id, Vec::new()));
                        roots.push(Root::Placeholder(orphans.len() - 1));
                        orphans.len() - 1
                    });
                    orphans[group].1.push(slot);
                }
            },
        }
    }

    // sort_by_key is stable, so equal orders keep scan order.
    for siblings in children.iter_mut() {
        siblings.sort_by_key(|slot| tasks[*slot].order);
    }
    for (_, siblings) in orphans.iter_mut() {
        siblings.sort_by_key(|slot| tasks[*slot].order);
    }

    let total = tasks.len();
    let mut rows: Vec<Option<Task>> = tasks.into_iter().map(Some).collect();
    let mut assembler = Assembler {
        rows: &mut rows,
        children: &children,
        max_depth,
        placed: 0,
    };

    let mut forest = Vec::with_capacity(roots.len());
    for root in roots {
        match root {
            Root::Task(slot) => forest.push(assembler.node(slot, 0)?),
            Root::Placeholder(group) => {
                let (parent_id, members) = &orphans[group];
                let nodes = members
                    .iter()
                    .map(|&slot| assembler.node(slot, 1))
                    .collect::<Result<Vec<_>>>()?;
                forest.push(TaskNode::placeholder(*parent_id, nodes));
            }
        }
    }

    if assembler.placed < total {
        // Whatever is left never hung off a root: its parent chain loops.
        if let Some(task) = rows.iter().flatten().next() {
            return Err(CoreError::integrity(task.id, "parent chain forms a cycle"));
        }
    }

    Ok(forest)
}

struct Assembler<'a> {
    rows: &'a mut Vec<Option<Task>>,
    children: &'a [Vec<usize>],
    max_depth: usize,
    placed: usize,
}

impl Assembler<'_> {
    fn node(&mut self, slot: usize, depth: usize) -> Result<TaskNode> {
        let task = self.rows[slot]
            .take()
            .ok_or_else(|| CoreError::integrity(-1, "task reached twice while building"))?;
        if depth >= self.max_depth {
            return Err(CoreError::integrity(
                task.id,
                format!("task nesting exceeds {} levels", self.max_depth),
            ));
        }
        self.placed += 1;

        let children = self.children;
        let mut nodes = Vec::with_capacity(children[slot].len());
        for &child in &children[slot] {
            nodes.push(self.node(child, depth + 1)?);
        }
        Ok(TaskNode::from_task(task, nodes))
    }
}

/// Flattens a forest in pre-order, annotating each row with its depth.
pub fn pre_order(forest: &[TaskNode]) -> Vec<FlatRow<'_>> {
    let mut rows = Vec::new();
    walk(forest, 0, &mut |depth, node| {
        rows.push(FlatRow {
            depth,
            id: node.id,
            placeholder: node.placeholder,
            task: node.task.as_ref(),
            completed: node.completed,
            efficiency: node.efficiency,
        })
    });
    rows
}

/// Visits every node in pre-order.
pub fn walk<'a, F>(nodes: &'a [TaskNode], depth: usize, visit: &mut F)
where
    F: FnMut(usize, &'a TaskNode),
{
    for node in nodes {
        visit(depth, node);
        walk(&node.children, depth + 1, visit);
    }
}

/// Finds the real (non-placeholder) node with the given task id.
pub fn find_mut(nodes: &mut [TaskNode], id: i64) -> Option<&mut TaskNode> {
    for node in nodes.iter_mut() {
        if node.id == id && !node.placeholder {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::testing::task;

    fn ids(nodes: &[TaskNode]) -> Vec<i64> {
        nodes.iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_builds_nested_forest() {
        let rows = vec![
            task(1, None, 0),
            task(2, None, 1),
            task(3, Some(1), 0),
            task(4, Some(1), 1),
            task(5, Some(3), 0),
        ];

        let forest = build_forest(rows, 16).unwrap();

        assert_eq!(ids(&forest), vec![1, 2]);
        assert_eq!(ids(&forest[0].children), vec![3, 4]);
        assert_eq!(ids(&forest[0].children[0].children), vec![5]);
        assert!(forest[1].is_leaf());
        assert!(forest.iter().all(|n| !n.placeholder));
    }

    #[test]
    fn test_siblings_sorted_by_order_with_stable_ties() {
        // Children arrive out of order; 12 and 13 share an order value.
        let rows = vec![
            task(10, None, 0),
            task(11, Some(10), 5),
            task(12, Some(10), 1),
            task(13, Some(10), 1),
            task(14, Some(10), 0),
        ];

        let forest = build_forest(rows, 16).unwrap();
        assert_eq!(ids(&forest[0].children), vec![14, 12, 13, 11]);
    }

    #[test]
    fn test_pre_order_is_order_preserving() {
        let rows = vec![
            task(1, None, 0),
            task(2, Some(1), 2),
            task(3, Some(1), 1),
            task(4, Some(3), 9),
            task(5, Some(3), 3),
        ];

        let forest = build_forest(rows, 16).unwrap();
        let flat = pre_order(&forest);

        let listed: Vec<(usize, i64)> = flat.iter().map(|r| (r.depth, r.id)).collect();
        assert_eq!(listed, vec![(0, 1), (1, 3), (2, 5), (2, 4), (1, 2)]);
    }

    #[test]
    fn test_roots_follow_scan_order() {
        let rows = vec![task(7, None, 3), task(8, None, 0), task(9, None, 1)];
        let forest = build_forest(rows, 16).unwrap();
        assert_eq!(ids(&forest), vec![7, 8, 9]);
    }

    #[test]
    fn test_child_before_parent_is_attached() {
        let rows = vec![task(2, Some(1), 0), task(1, None, 0)];
        let forest = build_forest(rows, 16).unwrap();

        assert_eq!(ids(&forest), vec![1]);
        assert_eq!(ids(&forest[0].children), vec![2]);
    }

    #[test]
    fn test_orphans_share_one_placeholder() {
        let rows = vec![
            task(21, Some(20), 1),
            task(30, None, 0),
            task(22, Some(20), 0),
        ];

        let forest = build_forest(rows, 16).unwrap();

        assert_eq!(ids(&forest), vec![20, 30]);
        let placeholder = &forest[0];
        assert!(placeholder.placeholder);
        assert!(placeholder.task.is_none());
        assert_eq!(ids(&placeholder.children), vec![22, 21]);
    }

    #[test]
    fn test_self_parent_is_rejected() {
        let err = build_forest(vec![task(4, Some(4), 0)], 16).unwrap_err();
        assert_eq!(err.code(), "data_integrity");
    }

    #[test]
    fn test_parent_cycle_is_rejected() {
        let rows = vec![task(1, None, 0), task(2, Some(3), 0), task(3, Some(2), 0)];
        let err = build_forest(rows, 16).unwrap_err();
        assert!(matches!(err, CoreError::DataIntegrity { .. }));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let err = build_forest(vec![task(1, None, 0), task(1, None, 1)], 16).unwrap_err();
        assert!(matches!(err, CoreError::DataIntegrity { task_id: 1, .. }));
    }

    #[test]
    fn test_depth_limit() {
        let rows = vec![task(1, None, 0), task(2, Some(1), 0), task(3, Some(2), 0)];

        assert!(build_forest(rows.clone(), 3).is_ok());
        let err = build_forest(rows, 2).unwrap_err();
        assert!(matches!(err, CoreError::DataIntegrity { task_id: 3, .. }));
    }

    #[test]
    fn test_find_mut_skips_placeholders() {
        let rows = vec![task(5, Some(99), 0), task(99, Some(100), 0)];
        // 99 is present, so 5 hangs off it and 99 hangs off placeholder 100.
        let mut forest = build_forest(rows, 16).unwrap();

        assert!(find_mut(&mut forest, 100).is_none());
        assert_eq!(find_mut(&mut forest, 5).map(|n| n.id), Some(5));
    }

    #[test]
    fn test_empty_scan_gives_empty_forest() {
        assert!(build_forest(Vec::new(), 16).unwrap().is_empty());
    }
}
