use std::collections::HashSet;
use crate::{TaskId, TaskRef};

/// Looks for a dependency cycle reachable from `tasks` without running anything.
///
/// Returns the offending chain of task names, ending with the task that closes
/// the cycle, e.g. `["a", "b", "a"]`.
pub fn find_cycle(tasks: &[TaskRef]) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut stack = Vec::new();

    fn dfs(
        task: &TaskRef,
        visited: &mut HashSet<TaskId>,
        stack: &mut Vec<TaskRef>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|t| t.id() == task.id()) {
            let mut chain: Vec<String> = stack[pos..].iter().map(|t| t.name().to_string()).collect();
            chain.push(task.name().to_string());
            return Some(chain);
        }
        if visited.contains(&task.id()) {
            return None;
        }

        visited.insert(task.id());
        stack.push(task.clone());

        for dep in task.dependencies() {
            if let Some(chain) = dfs(&dep, visited, stack) {
                return Some(chain);
            }
        }

        stack.pop();
        None
    }

    tasks
        .iter()
        .find_map(|task| dfs(task, &mut visited, &mut stack))
}
