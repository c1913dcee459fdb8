use std::sync::Arc;

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{debug, warn};

use crate::error::LedgerError;
use crate::model::{ArchivedPage, ListSelector, Task, TaskPage};
use crate::store::{DocWatch, DocumentStore, OrderBy, daily_tasks_path, task_history_path};

/// One archived page together with its store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub key: String,
    pub page: ArchivedPage,
}

/// Live subscription to one day's page. Corrupt snapshots surface as a
/// missing page; `None` means the store was dropped.
pub struct PageWatch {
    inner: DocWatch,
}

impl PageWatch {
    pub async fn next(&mut self) -> Option<Option<TaskPage>> {
        let snapshot = self.inner.next().await?;
        Some(snapshot.and_then(|value| serde_json::from_value(value).ok()))
    }
}

pub fn parse_iso_date(raw: &str) -> Result<Date, LedgerError> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(raw.trim(), &format)
        .map_err(|_| LedgerError::validation_rejected("date must be YYYY-MM-DD"))
}

fn iso_date_string(date: Date) -> Result<String, LedgerError> {
    let format = format_description!("[year]-[month]-[day]");
    date.format(&format)
        .map_err(|err| LedgerError::validation_rejected(err.to_string()))
}

fn fresh_task_id(page: &TaskPage) -> i64 {
    let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
    let max = page.max_task_id();
    // same-millisecond creations (bulk restore) still get distinct ids
    if now_ms > max { now_ms } else { max + 1 }
}

fn page_from_value(value: Value) -> Result<TaskPage, LedgerError> {
    serde_json::from_value(value)
        .map_err(|err| LedgerError::storage_unavailable(format!("corrupt task page: {err}")))
}

fn archived_from_value(value: Value) -> Result<ArchivedPage, LedgerError> {
    serde_json::from_value(value)
        .map_err(|err| LedgerError::storage_unavailable(format!("corrupt archive entry: {err}")))
}

fn to_document<T: serde::Serialize>(value: &T) -> Result<Value, LedgerError> {
    serde_json::to_value(value).map_err(|err| LedgerError::storage_unavailable(err.to_string()))
}

/// Owns the lifecycle of per-day task pages for one pairing: lazy creation
/// with carry-over, task mutation, tear-off archival, and restoration.
///
/// Every write touches only the list field it changes, so concurrent edits
/// by the two partners to different lists do not clobber each other. Edits
/// to the same list are last-writer-wins; there is no merge and no lock.
pub struct TaskLedger {
    store: Arc<dyn DocumentStore>,
    pairing_id: String,
}

impl TaskLedger {
    pub fn new(store: Arc<dyn DocumentStore>, pairing_id: &str) -> Self {
        TaskLedger {
            store,
            pairing_id: pairing_id.to_string(),
        }
    }

    fn daily_path(&self) -> String {
        daily_tasks_path(&self.pairing_id)
    }

    fn history_path(&self) -> String {
        task_history_path(&self.pairing_id)
    }

    /// Returns the page for `date`, creating it on first view.
    ///
    /// Creation carries over yesterday's incomplete tasks: done tasks never
    /// reappear, incomplete ones reappear verbatim. The requesting user's
    /// personal list is guaranteed to exist on the returned page. A second
    /// call for an existing date performs no write.
    pub async fn load_or_create_page(
        &self,
        date: Date,
        requesting_user: &str,
    ) -> Result<TaskPage, LedgerError> {
        let collection = self.daily_path();
        let key = iso_date_string(date)?;

        if let Some(value) = self.store.get(&collection, &key).await? {
            return page_from_value(value);
        }

        let yesterday = match date.previous_day() {
            Some(previous) => {
                let previous_key = iso_date_string(previous)?;
                match self.store.get(&collection, &previous_key).await? {
                    Some(value) => Some(page_from_value(value)?),
                    None => None,
                }
            }
            None => None,
        };

        let page = TaskPage::carried(&key, yesterday.as_ref(), requesting_user);
        match &yesterday {
            Some(from) => debug!(date = %key, from = %from.date, "created page with carry-over"),
            None => debug!(date = %key, "created empty page"),
        }

        self.store.set(&collection, &key, to_document(&page)?).await?;
        Ok(page)
    }

    /// Appends a task to the shared list or to `acting_user`'s personal
    /// list, creating that list if absent. Whitespace-only text is rejected
    /// without a write. Persists only the changed list field.
    pub async fn add_task(
        &self,
        page: &TaskPage,
        selector: ListSelector,
        text: &str,
        acting_user: &str,
    ) -> Result<Task, LedgerError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(LedgerError::validation_rejected("task text is required"));
        }

        let task = Task {
            id: fresh_task_id(page),
            text: trimmed.to_string(),
            done: false,
        };

        let mut fields = Map::new();
        match selector {
            ListSelector::Shared => {
                let mut shared = page.shared_tasks.clone();
                shared.push(task.clone());
                fields.insert("sharedTasks".to_string(), to_document(&shared)?);
            }
            ListSelector::Personal => {
                let mut mine = page.user_tasks.get(acting_user).cloned().unwrap_or_default();
                mine.push(task.clone());
                fields.insert(format!("userTasks.{acting_user}"), to_document(&mine)?);
            }
        }

        self.store.update(&self.daily_path(), &page.date, fields).await?;
        Ok(task)
    }

    /// Flips `done` on the task matching `task_id` in the target list.
    /// Silent no-op (no write) when the task is not on the page. Personal
    /// toggles name the list owner. Persists only the affected list field.
    pub async fn toggle_task(
        &self,
        page: &TaskPage,
        selector: ListSelector,
        task_id: i64,
        owner: Option<&str>,
    ) -> Result<(), LedgerError> {
        let mut fields = Map::new();
        match selector {
            ListSelector::Shared => {
                let mut shared = page.shared_tasks.clone();
                let Some(task) = shared.iter_mut().find(|task| task.id == task_id) else {
                    return Ok(());
                };
                task.done = !task.done;
                fields.insert("sharedTasks".to_string(), to_document(&shared)?);
            }
            ListSelector::Personal => {
                let owner = owner.ok_or_else(|| {
                    LedgerError::validation_rejected("owner is required for personal tasks")
                })?;
                let Some(tasks) = page.user_tasks.get(owner) else {
                    return Ok(());
                };
                let mut tasks = tasks.clone();
                let Some(task) = tasks.iter_mut().find(|task| task.id == task_id) else {
                    return Ok(());
                };
                task.done = !task.done;
                fields.insert(format!("userTasks.{owner}"), to_document(&tasks)?);
            }
        }

        self.store.update(&self.daily_path(), &page.date, fields).await
    }

    /// Archives the page verbatim into history, then resets the live lists.
    ///
    /// Performs no all-done validation; callers gate that themselves. The
    /// two writes are ordered, not atomic: a crash in between leaves the
    /// page archived but not reset.
    pub async fn tear_off_page(&self, page: &TaskPage) -> Result<ArchivedPage, LedgerError> {
        let completed_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| LedgerError::validation_rejected(err.to_string()))?;
        let archived = ArchivedPage {
            date: page.date.clone(),
            shared_tasks: page.shared_tasks.clone(),
            user_tasks: page.user_tasks.clone(),
            completed_at,
        };

        self.store
            .add_to_collection(&self.history_path(), to_document(&archived)?)
            .await?;

        let reset_users: std::collections::BTreeMap<String, Vec<Task>> = page
            .user_tasks
            .keys()
            .map(|uid| (uid.clone(), Vec::new()))
            .collect();
        let mut fields = Map::new();
        fields.insert("sharedTasks".to_string(), to_document(&Vec::<Task>::new())?);
        fields.insert("userTasks".to_string(), to_document(&reset_users)?);

        if let Err(err) = self.store.update(&self.daily_path(), &page.date, fields).await {
            warn!(date = %page.date, error = %err, "page archived but reset failed");
            return Err(err);
        }

        debug!(date = %page.date, "tore off page");
        Ok(archived)
    }

    /// All archived pages for the pairing, newest first. Pure read.
    pub async fn list_archive(&self) -> Result<Vec<ArchiveEntry>, LedgerError> {
        let rows = self
            .store
            .query(&self.history_path(), &OrderBy::desc("completedAt"))
            .await?;
        rows.into_iter()
            .map(|(key, value)| {
                Ok(ArchiveEntry {
                    key,
                    page: archived_from_value(value)?,
                })
            })
            .collect()
    }

    /// Appends a brand-new task (fresh id, `done: false`) with the archived
    /// task's text to the current day's page. The archive entry is never
    /// touched; restoring twice yields two independent tasks. For personal
    /// restores the owner comes from the archive entry and is written even
    /// when it no longer matches a pairing member.
    ///
    /// The current day's page must already exist (callers open the day
    /// before restoring into it).
    pub async fn restore_task(
        &self,
        current_date: Date,
        archived_task: &Task,
        selector: ListSelector,
        owner: Option<&str>,
    ) -> Result<Task, LedgerError> {
        let collection = self.daily_path();
        let key = iso_date_string(current_date)?;
        let page = match self.store.get(&collection, &key).await? {
            Some(value) => page_from_value(value)?,
            None => {
                return Err(LedgerError::not_found(format!(
                    "task page {key} has not been opened"
                )));
            }
        };

        let task = Task {
            id: fresh_task_id(&page),
            text: archived_task.text.clone(),
            done: false,
        };

        let mut fields = Map::new();
        match selector {
            ListSelector::Shared => {
                let mut shared = page.shared_tasks.clone();
                shared.push(task.clone());
                fields.insert("sharedTasks".to_string(), to_document(&shared)?);
            }
            ListSelector::Personal => {
                let owner = owner.ok_or_else(|| {
                    LedgerError::validation_rejected("owner is required for personal tasks")
                })?;
                let mut tasks = page.user_tasks.get(owner).cloned().unwrap_or_default();
                tasks.push(task.clone());
                fields.insert(format!("userTasks.{owner}"), to_document(&tasks)?);
            }
        }

        self.store.update(&collection, &key, fields).await?;
        Ok(task)
    }

    /// Opens a snapshot stream for `date`'s page. Fires immediately with the
    /// current state and after every write; dropping the watch unsubscribes.
    pub fn watch_page(&self, date: Date) -> Result<PageWatch, LedgerError> {
        let key = iso_date_string(date)?;
        Ok(PageWatch {
            inner: self.store.subscribe(&self.daily_path(), &key),
        })
    }
}
