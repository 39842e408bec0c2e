use chrono::{DateTime, Utc};

use crate::clockify::ClockifyRepository;
use crate::exclusion::{ExclusionPolicy, ProjectCache};
use crate::time_entry::TimeEntry;

/// 終了済みエントリーの経過秒数。計測中のエントリーは`None`。
///
/// 終了が開始より前になっている場合は0秒とする。
pub fn closed_seconds(entry: &TimeEntry) -> Option<i64> {
    entry
        .end
        .map(|end| (end - entry.start).num_seconds().max(0))
}

/// 計測中のエントリーの`now`時点での経過秒数。
pub fn running_seconds(entry: &TimeEntry, now: DateTime<Utc>) -> i64 {
    (now - entry.start).num_seconds().max(0)
}

/// 除外対象でない終了済みエントリーの合計秒数を返す。
///
/// 計測中のエントリーは対象外。`now`に依存するため集計側で別に加算する。
pub async fn sum_durations<R>(
    entries: &[TimeEntry],
    policy: &ExclusionPolicy,
    projects: &mut ProjectCache<'_, R>,
) -> i64
where
    R: ClockifyRepository + ?Sized,
{
    let mut total = 0;
    for entry in entries {
        let Some(seconds) = closed_seconds(entry) else {
            continue;
        };
        if policy.should_exclude(entry, projects).await {
            continue;
        }
        total += seconds;
    }

    total
}

/// 秒数を`HH:MM`形式にする。
pub fn format_hhmm(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

/// 秒数を`HH:MM:SS`形式にする。
pub fn format_hhmmss(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
