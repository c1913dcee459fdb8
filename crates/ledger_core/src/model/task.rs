use serde::{Deserialize, Serialize};

/// A single task line on a page. Ids are millisecond creation timestamps,
/// unique within their page but not across pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub text: String,
    pub done: bool,
}

/// Which list on a page an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSelector {
    Shared,
    Personal,
}
