use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Task;

/// One calendar day's task board for a pairing, keyed by its ISO date.
///
/// Stored field-for-field as the `dailyTasks/{date}` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    pub date: String,
    #[serde(default)]
    pub shared_tasks: Vec<Task>,
    #[serde(default)]
    pub user_tasks: BTreeMap<String, Vec<Task>>,
}

impl TaskPage {
    /// Builds the page for `date` from yesterday's page, if any.
    ///
    /// Incomplete tasks carry over verbatim (same id, same text); completed
    /// tasks are dropped. Every user id present yesterday keeps its list, and
    /// the requesting user's list exists even if it was absent yesterday.
    pub fn carried(date: &str, yesterday: Option<&TaskPage>, requesting_user: &str) -> Self {
        let mut user_tasks = BTreeMap::new();
        user_tasks.insert(requesting_user.to_string(), Vec::new());

        let mut shared_tasks = Vec::new();
        if let Some(yesterday) = yesterday {
            shared_tasks = yesterday
                .shared_tasks
                .iter()
                .filter(|task| !task.done)
                .cloned()
                .collect();
            for (uid, tasks) in &yesterday.user_tasks {
                user_tasks.insert(
                    uid.clone(),
                    tasks.iter().filter(|task| !task.done).cloned().collect(),
                );
            }
        }

        TaskPage {
            date: date.to_string(),
            shared_tasks,
            user_tasks,
        }
    }

    /// True when the page holds at least one task and every task on it,
    /// shared or personal, is done. This is the tear-off gate.
    pub fn all_done(&self) -> bool {
        let mut tasks = self
            .shared_tasks
            .iter()
            .chain(self.user_tasks.values().flatten())
            .peekable();
        tasks.peek().is_some() && tasks.all(|task| task.done)
    }

    pub fn max_task_id(&self) -> i64 {
        self.shared_tasks
            .iter()
            .chain(self.user_tasks.values().flatten())
            .map(|task| task.id)
            .max()
            .unwrap_or(0)
    }
}

/// Immutable snapshot of a page at the moment of tear-off, stored append-only
/// as a `taskHistory` document. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedPage {
    pub date: String,
    #[serde(default)]
    pub shared_tasks: Vec<Task>,
    #[serde(default)]
    pub user_tasks: BTreeMap<String, Vec<Task>>,
    pub completed_at: String,
}
