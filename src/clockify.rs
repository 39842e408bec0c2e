use std::env;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
#[cfg(test)]
use mockall::automock;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::datetime::parse_timestamp;
use crate::time_entry::{ClockifyUser, EntryType, ProjectRef, TaskRef, TimeEntry};

const DEFAULT_API_URL: &str = "https://api.clockify.me/api/v1";
const DEFAULT_PAGE_SIZE: usize = 1000;

/// Clockifyからデータを取得するためのtrait。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClockifyRepository: Send + Sync {
    /// 認証済みユーザーを取得する。
    async fn fetch_user(&self) -> Result<ClockifyUser>;

    /// 指定した期間のタイムエントリーを取得する。
    ///
    /// # Arguments
    ///
    /// * `user_id` - 対象のユーザーID
    /// * `start_at` - 取得するタイムエントリーの開始日時
    /// * `end_at` - 取得するタイムエントリーの終了日時
    async fn fetch_entries(
        &self,
        user_id: &str,
        start_at: &DateTime<Utc>,
        end_at: &DateTime<Utc>,
    ) -> Result<Vec<TimeEntry>>;

    /// 計測中のタイムエントリーを取得する。
    async fn fetch_live_entry(&self, user_id: &str) -> Result<Option<TimeEntry>>;

    /// プロジェクトを取得する。存在しない場合は`None`。
    async fn fetch_project(&self, project_id: &str) -> Result<Option<ProjectRef>>;

    /// タスクを取得する。存在しない場合は`None`。
    async fn fetch_task(&self, project_id: &str, task_id: &str) -> Result<Option<TaskRef>>;

    /// ユーザーの稼働スケジュールを未加工のまま取得する。
    async fn fetch_schedule(&self, user_id: &str) -> Result<Option<Value>>;
}

/// Clockify APIのタイムエントリーをデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClockifyTimeEntry {
    id: String,
    description: Option<String>,
    project_id: Option<String>,
    task_id: Option<String>,
    #[serde(default)]
    billable: bool,
    #[serde(rename = "type")]
    entry_type: Option<String>,
    time_interval: ClockifyTimeInterval,
    tag_ids: Option<Vec<String>>,
    tags: Option<Vec<ClockifyTag>>,
}

#[derive(Debug, Deserialize)]
struct ClockifyTimeInterval {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClockifyTag {
    name: String,
}

/// プロジェクトとタスクに共通の形式。
#[derive(Debug, Deserialize)]
struct ClockifyNamed {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ClockifyUserResponse {
    id: String,
    name: Option<String>,
    email: Option<String>,
    settings: Option<ClockifyUserSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClockifyUserSettings {
    week_start: Option<String>,
}

impl ClockifyTimeEntry {
    /// 共通の`TimeEntry`に変換する。
    ///
    /// 日時が解釈できないエントリーは集計に含めないため`None`を返す。
    fn into_time_entry(self) -> Option<TimeEntry> {
        let start = match self.time_interval.start.as_deref().map(parse_timestamp) {
            Some(Ok(start)) => start,
            Some(Err(err)) => {
                warn!("Skipping time entry {}: {:#}", self.id, err);
                return None;
            }
            None => {
                warn!("Skipping time entry {}: missing start", self.id);
                return None;
            }
        };
        let end = match self.time_interval.end.as_deref().map(parse_timestamp) {
            Some(Ok(end)) => Some(end),
            Some(Err(err)) => {
                warn!("Skipping time entry {}: {:#}", self.id, err);
                return None;
            }
            None => None,
        };
        let tags = match (self.tags, self.tag_ids) {
            (Some(tags), _) => tags.into_iter().map(|tag| tag.name).collect(),
            (None, Some(tag_ids)) => tag_ids,
            (None, None) => vec![],
        };

        Some(TimeEntry {
            id: self.id,
            description: self.description.unwrap_or_default(),
            start,
            end,
            entry_type: EntryType::from_api(self.entry_type.as_deref()),
            project_id: self.project_id,
            task_id: self.task_id,
            billable: self.billable,
            tags,
        })
    }
}

/// Clockify APIと通信するためのクライアント。
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> anyhow::Result<()> {
/// use clockify_progress::clockify::{ClockifyClient, ClockifyRepository};
///
/// let client = ClockifyClient::new()?;
/// let user = client.fetch_user().await?;
/// # Ok(())
/// # }
/// ```
pub struct ClockifyClient {
    client: Client,
    api_url: String,
    api_key: String,
    workspace_id: String,
    page_size: usize,
}

impl ClockifyClient {
    /// 環境変数から新しい`ClockifyClient`を返す。
    ///
    /// `CLOCKIFY_API_KEY`と`CLOCKIFY_WORKSPACE_ID`が設定されていない場合はエラーを返す。
    /// `CLOCKIFY_API_URL`が設定されている場合はそのURLを利用する。
    pub fn new() -> Result<Self> {
        let api_key = env::var("CLOCKIFY_API_KEY").context("CLOCKIFY_API_KEY must be set")?;
        let workspace_id =
            env::var("CLOCKIFY_WORKSPACE_ID").context("CLOCKIFY_WORKSPACE_ID must be set")?;
        let api_url = env::var("CLOCKIFY_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        Ok(Self::with_settings(&api_url, &api_key, &workspace_id))
    }

    /// 接続先を指定して新しい`ClockifyClient`を返す。
    pub fn with_settings(api_url: &str, api_key: &str, workspace_id: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            workspace_id: workspace_id.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// 1回のリクエストで取得するタイムエントリーの件数を変更する。
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.api_url, path))
            .header("X-Api-Key", &self.api_key)
            .header(CONTENT_TYPE, "application/json")
    }

    /// GETリクエストを送信し、レスポンスをデシリアライズする。
    async fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self
            .get(path)
            .send()
            .await
            .with_context(|| format!("Failed to send request to Clockify API at {}", path))?
            .error_for_status()
            .context("Request returned an error status")?
            .json::<T>()
            .await
            .context("Failed to deserialize response")?;

        Ok(value)
    }

    /// 存在しない場合に404を返すリソースを取得する。
    async fn read_optional_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self
            .get(path)
            .send()
            .await
            .with_context(|| format!("Failed to send request to Clockify API at {}", path))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let value = response
            .error_for_status()
            .context("Request returned an error status")?
            .json::<T>()
            .await
            .context("Failed to deserialize response")?;

        Ok(Some(value))
    }

    fn time_entries_path(&self, user_id: &str) -> String {
        format!(
            "/workspaces/{}/user/{}/time-entries",
            self.workspace_id, user_id
        )
    }
}

#[async_trait]
impl ClockifyRepository for ClockifyClient {
    async fn fetch_user(&self) -> Result<ClockifyUser> {
        let user = self
            .read_json::<ClockifyUserResponse>("/user")
            .await
            .context("Failed to get user from clockify")?;

        Ok(ClockifyUser {
            id: user.id,
            name: user.name.unwrap_or_default(),
            email: user.email,
            week_start: user.settings.and_then(|settings| settings.week_start),
        })
    }

    async fn fetch_entries(
        &self,
        user_id: &str,
        start_at: &DateTime<Utc>,
        end_at: &DateTime<Utc>,
    ) -> Result<Vec<TimeEntry>> {
        let path = self.time_entries_path(user_id);
        let start = start_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let end = end_at.to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut time_entries = vec![];
        let mut page = 1;
        loop {
            let batch = self
                .get(&path)
                .query(&[
                    ("start", start.clone()),
                    ("end", end.clone()),
                    ("page", page.to_string()),
                    ("page-size", self.page_size.to_string()),
                ])
                .send()
                .await
                .with_context(|| format!("Failed to send request to Clockify API at {}", path))?
                .error_for_status()
                .context("Request returned an error status")?
                .json::<Vec<ClockifyTimeEntry>>()
                .await
                .context("Failed to deserialize response")?;
            let batch_len = batch.len();
            time_entries.extend(
                batch
                    .into_iter()
                    .filter_map(ClockifyTimeEntry::into_time_entry),
            );

            if batch_len < self.page_size {
                break;
            }
            page += 1;
        }
        info!(
            "length of time entries between {} and {}: {}",
            start,
            end,
            time_entries.len()
        );

        Ok(time_entries)
    }

    async fn fetch_live_entry(&self, user_id: &str) -> Result<Option<TimeEntry>> {
        let entries = self
            .get(&self.time_entries_path(user_id))
            .query(&[("in-progress", "true")])
            .send()
            .await
            .context("Failed to send request for the running time entry")?
            .error_for_status()
            .context("Request returned an error status")?
            .json::<Vec<ClockifyTimeEntry>>()
            .await
            .context("Failed to deserialize response")?;

        Ok(entries
            .into_iter()
            .next()
            .and_then(ClockifyTimeEntry::into_time_entry))
    }

    async fn fetch_project(&self, project_id: &str) -> Result<Option<ProjectRef>> {
        let path = format!("/workspaces/{}/projects/{}", self.workspace_id, project_id);
        let project = self
            .read_optional_json::<ClockifyNamed>(&path)
            .await
            .with_context(|| format!("Failed to get project {}", project_id))?;

        Ok(project.map(|project| ProjectRef {
            id: project.id,
            name: project.name,
        }))
    }

    async fn fetch_task(&self, project_id: &str, task_id: &str) -> Result<Option<TaskRef>> {
        let path = format!(
            "/workspaces/{}/projects/{}/tasks/{}",
            self.workspace_id, project_id, task_id
        );
        let task = self
            .read_optional_json::<ClockifyNamed>(&path)
            .await
            .with_context(|| format!("Failed to get task {}", task_id))?;

        Ok(task.map(|task| TaskRef {
            id: task.id,
            name: task.name,
        }))
    }

    /// メンバープロフィールを取得し、失敗した場合はワークスペースの設定を利用する。
    /// どちらも取得できない場合は`None`を返す。
    async fn fetch_schedule(&self, user_id: &str) -> Result<Option<Value>> {
        let profile_path = format!(
            "/workspaces/{}/member-profile/{}",
            self.workspace_id, user_id
        );
        match self.read_json::<Value>(&profile_path).await {
            Ok(profile) => return Ok(Some(profile)),
            Err(err) => warn!(
                "Failed to get member profile, trying workspace settings: {:#}",
                err
            ),
        }

        match self
            .read_json::<Value>(&format!("/workspaces/{}", self.workspace_id))
            .await
        {
            Ok(workspace) => Ok(workspace.get("workspaceSettings").cloned()),
            Err(err) => {
                warn!("Failed to get workspace settings: {:#}", err);
                Ok(None)
            }
        }
    }
}
