use chrono::{DateTime, Utc};
use serde::Serialize;

/// タイムエントリーの種別。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Regular,
    Break,
}

impl EntryType {
    /// Clockify APIの`type`フィールドから種別を決定する。
    ///
    /// `BREAK`以外(`REGULAR`, `HOLIDAY`, `TIME_OFF`など)は全て通常のエントリーとして扱う。
    pub fn from_api(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("BREAK") => EntryType::Break,
            _ => EntryType::Regular,
        }
    }
}

/// 1件のタイムエントリー。
///
/// `end`が`None`の場合は計測中のエントリーを表す。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimeEntry {
    pub id: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub entry_type: EntryType,
    pub project_id: Option<String>,
    pub task_id: Option<String>,
    pub billable: bool,
    pub tags: Vec<String>,
}

impl TimeEntry {
    /// 計測中のエントリーかどうか。
    pub fn is_running(&self) -> bool {
        self.end.is_none()
    }
}

/// プロジェクト名の参照。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectRef {
    pub id: String,
    pub name: String,
}

/// タスク名の参照。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskRef {
    pub id: String,
    pub name: String,
}

/// 認証済みユーザーの情報。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockifyUser {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    /// プロフィールに設定された週の開始曜日(`MONDAY`など)。
    pub week_start: Option<String>,
}
