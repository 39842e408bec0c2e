use std::collections::HashMap;

use log::{debug, warn};

use crate::clockify::ClockifyRepository;
use crate::time_entry::{EntryType, ProjectRef, TimeEntry};

/// 休憩として扱うプロジェクト名の既定値。
pub const DEFAULT_BREAK_PROJECT_NAME: &str = "breaks";

/// 1回の集計の間だけ利用するプロジェクトのキャッシュ。
///
/// 取得できなかったプロジェクトも`None`として記録し、同じプロジェクトを再度問い合わせない。
pub struct ProjectCache<'a, R: ?Sized> {
    repository: &'a R,
    projects: HashMap<String, Option<ProjectRef>>,
}

impl<'a, R: ClockifyRepository + ?Sized> ProjectCache<'a, R> {
    /// 空の`ProjectCache`を返す。
    pub fn new(repository: &'a R) -> Self {
        Self {
            repository,
            projects: HashMap::new(),
        }
    }

    /// プロジェクトを取得する。キャッシュにない場合のみリポジトリに問い合わせる。
    pub async fn resolve(&mut self, project_id: &str) -> Option<&ProjectRef> {
        if !self.projects.contains_key(project_id) {
            let project = match self.repository.fetch_project(project_id).await {
                Ok(Some(project)) => Some(project),
                Ok(None) => {
                    warn!("Project {} not found", project_id);
                    None
                }
                Err(err) => {
                    warn!("Failed to retrieve project {}: {:#}", project_id, err);
                    None
                }
            };
            self.projects.insert(project_id.to_string(), project);
        }

        self.projects.get(project_id).and_then(Option::as_ref)
    }

    /// 問い合わせ済みのプロジェクト数。
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

/// 集計から除外するエントリーを判定する。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExclusionPolicy {
    break_project_name: String,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BREAK_PROJECT_NAME)
    }
}

impl ExclusionPolicy {
    /// 休憩として扱うプロジェクト名を指定して新しい`ExclusionPolicy`を返す。比較は大文字小文字を区別しない。
    pub fn new(break_project_name: &str) -> Self {
        Self {
            break_project_name: break_project_name.to_lowercase(),
        }
    }

    /// エントリーを集計から除外するかどうか。
    ///
    /// 種別が休憩のエントリー、もしくは休憩用のプロジェクトに属するエントリーを除外する。
    /// プロジェクトが取得できない場合は除外しない。
    pub async fn should_exclude<R>(&self, entry: &TimeEntry, projects: &mut ProjectCache<'_, R>) -> bool
    where
        R: ClockifyRepository + ?Sized,
    {
        if entry.entry_type == EntryType::Break {
            return true;
        }
        let Some(project_id) = entry.project_id.as_deref() else {
            return false;
        };

        let excluded = projects
            .resolve(project_id)
            .await
            .is_some_and(|project| project.name.to_lowercase() == self.break_project_name);
        if excluded {
            debug!("Excluding entry {} in break project {}", entry.id, project_id);
        }

        excluded
    }
}
