use anyhow::{Context, Result};
use log::{info, warn};

use crate::clockify::ClockifyRepository;
use crate::datetime;
use crate::duration::running_seconds;
use crate::time_entry::TimeEntry;

/// 計測中のタイマーの情報。
#[derive(Clone, Debug, PartialEq)]
pub struct CurrentTimer {
    pub entry: TimeEntry,
    pub project_name: Option<String>,
    pub task_name: Option<String>,
    pub elapsed_seconds: i64,
}

pub struct TimerCommand<'a, T: ClockifyRepository> {
    clockify_client: &'a T,
}

impl<'a, T: ClockifyRepository> TimerCommand<'a, T> {
    /// 新しい`TimerCommand`を返す。
    pub fn new(clockify_client: &'a T) -> Self {
        Self { clockify_client }
    }

    /// `timer`サブコマンドの処理を行う。
    ///
    /// 計測中のタイマーがなければ`None`を返す。プロジェクト名とタスク名は取得できなくてもエラーにしない。
    pub async fn run(&self) -> Result<Option<CurrentTimer>> {
        let user = self
            .clockify_client
            .fetch_user()
            .await
            .context("Failed to retrieve the authenticated user")?;
        let Some(entry) = self
            .clockify_client
            .fetch_live_entry(&user.id)
            .await
            .context("Failed to retrieve the running time entry")?
        else {
            info!("No active timer.");
            return Ok(None);
        };

        let project_name = match entry.project_id.as_deref() {
            Some(project_id) => match self.clockify_client.fetch_project(project_id).await {
                Ok(project) => project.map(|project| project.name),
                Err(err) => {
                    warn!("Failed to retrieve project {}: {:#}", project_id, err);
                    None
                }
            },
            None => None,
        };
        let task_name = match (entry.project_id.as_deref(), entry.task_id.as_deref()) {
            (Some(project_id), Some(task_id)) => {
                match self.clockify_client.fetch_task(project_id, task_id).await {
                    Ok(task) => task.map(|task| task.name),
                    Err(err) => {
                        warn!("Failed to retrieve task {}: {:#}", task_id, err);
                        None
                    }
                }
            }
            _ => None,
        };
        let elapsed_seconds = running_seconds(&entry, datetime::now());

        Ok(Some(CurrentTimer {
            entry,
            project_name,
            task_name,
            elapsed_seconds,
        }))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use chrono::{Duration, TimeZone, Utc};

    use super::TimerCommand;
    use crate::clockify::MockClockifyRepository;
    use crate::datetime::mock_datetime;
    use crate::duration::tests::entry;
    use crate::time_entry::{ClockifyUser, EntryType, ProjectRef, TaskRef, TimeEntry};

    fn repository_with_user() -> MockClockifyRepository {
        let mut clockify = MockClockifyRepository::new();
        clockify.expect_fetch_user().returning(|| {
            Ok(ClockifyUser {
                id: "u1".to_string(),
                name: "Jane".to_string(),
                email: None,
                week_start: None,
            })
        });
        clockify
    }

    #[tokio::test]
    async fn test_no_active_timer() {
        let mut clockify = repository_with_user();
        clockify
            .expect_fetch_live_entry()
            .times(1)
            .returning(|_| Ok(None));
        clockify.expect_fetch_project().times(0);

        let result = TimerCommand::new(&clockify).run().await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_active_timer_with_project_and_task() {
        let now = Utc.with_ymd_and_hms(2024, 1, 8, 10, 0, 0).unwrap();
        mock_datetime::set_mock_time(now);
        let mut clockify = repository_with_user();
        clockify.expect_fetch_live_entry().returning(move |_| {
            Ok(Some(TimeEntry {
                project_id: Some("p1".to_string()),
                task_id: Some("k1".to_string()),
                ..entry(now - Duration::seconds(3723), None, EntryType::Regular)
            }))
        });
        clockify.expect_fetch_project().returning(|id| {
            Ok(Some(ProjectRef {
                id: id.to_string(),
                name: "Website".to_string(),
            }))
        });
        clockify.expect_fetch_task().returning(|_, id| {
            Ok(Some(TaskRef {
                id: id.to_string(),
                name: "Landing page".to_string(),
            }))
        });

        let timer = TimerCommand::new(&clockify).run().await.unwrap().unwrap();
        mock_datetime::clear_mock_time();

        assert_eq!(timer.project_name.as_deref(), Some("Website"));
        assert_eq!(timer.task_name.as_deref(), Some("Landing page"));
        assert_eq!(timer.elapsed_seconds, 3723);
    }

    #[tokio::test]
    async fn test_project_lookup_failure_is_not_fatal() {
        let mut clockify = repository_with_user();
        clockify.expect_fetch_live_entry().returning(|_| {
            let start = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap();
            Ok(Some(TimeEntry {
                project_id: Some("p1".to_string()),
                ..entry(start, None, EntryType::Regular)
            }))
        });
        clockify
            .expect_fetch_project()
            .returning(|_| Err(anyhow!("500 Internal Server Error")));
        clockify.expect_fetch_task().times(0);

        let timer = TimerCommand::new(&clockify).run().await.unwrap().unwrap();

        assert!(timer.project_name.is_none());
        assert!(timer.task_name.is_none());
    }

    #[tokio::test]
    async fn test_live_entry_failure_is_error() {
        let mut clockify = repository_with_user();
        clockify
            .expect_fetch_live_entry()
            .returning(|_| Err(anyhow!("timeout")));

        let result = TimerCommand::new(&clockify).run().await;

        assert!(result.is_err());
    }
}
