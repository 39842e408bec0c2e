use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;

use crate::calendar::{day_bounds, days_since_week_start, weekday_label, WeekStart, WeekWindow};
use crate::clockify::ClockifyRepository;
use crate::duration::{format_hhmm, sum_durations};
use crate::exclusion::{ExclusionPolicy, ProjectCache};
use crate::progress::{progress, Progress};
use crate::schedule::CanonicalSchedule;
use crate::time_entry::TimeEntry;

/// 1つの期間の集計結果。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PeriodFigures {
    /// 終了済みエントリーの合計秒数。
    pub logged_seconds: i64,
    /// 計測中のエントリーを含めた合計秒数。
    pub logged_with_live_seconds: i64,
    pub expected_seconds: i64,
    pub progress: Progress,
    pub progress_with_live: Progress,
}

impl PeriodFigures {
    fn new(logged_seconds: i64, logged_with_live_seconds: i64, expected_seconds: i64) -> Self {
        Self {
            logged_seconds,
            logged_with_live_seconds,
            expected_seconds,
            progress: progress(logged_seconds, expected_seconds),
            progress_with_live: progress(logged_with_live_seconds, expected_seconds),
        }
    }

    /// 日毎の集計を合算する。
    fn sum_of(days: &[DayFigures]) -> Self {
        Self::new(
            days.iter().map(|day| day.logged_seconds).sum(),
            days.iter().map(|day| day.logged_with_live_seconds).sum(),
            days.iter().map(|day| day.expected_seconds).sum(),
        )
    }
}

/// 週の1日分の集計結果。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DayFigures {
    pub weekday: Weekday,
    pub label: &'static str,
    pub date: NaiveDate,
    pub logged_seconds: i64,
    pub logged_formatted: String,
    pub logged_with_live_seconds: i64,
    pub logged_with_live_formatted: String,
    pub expected_seconds: i64,
    pub progress: Progress,
}

/// 集計結果。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregationResult {
    pub generated_at: DateTime<Utc>,
    pub week_start: WeekStart,
    pub week: WeekWindow,
    pub days_since_week_start: usize,
    pub schedule: CanonicalSchedule,
    /// 週の集計に加算した計測中のエントリーの秒数。週の開始より前の計測分は含まない。
    /// 除外対象の場合や計測中でない場合は0。
    pub live_seconds: i64,
    pub daily: PeriodFigures,
    pub weekly: PeriodFigures,
    pub weekly_to_date: PeriodFigures,
    pub weekly_remaining: PeriodFigures,
    /// 週の開始曜日から並べた7日分の集計。
    pub breakdown: Vec<DayFigures>,
}

/// 集計に加算する計測中のエントリー。
struct CountedLive {
    start: DateTime<Utc>,
    now: DateTime<Utc>,
}

impl CountedLive {
    /// 計測中の区間のうち期間と重なる秒数を返す。
    ///
    /// 期間より前に開始したエントリーは期間の開始から数える。
    fn seconds_within(live: Option<&CountedLive>, start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
        let Some(live) = live else {
            return 0;
        };
        // `end`は期間の最後の1マイクロ秒を含む
        let until = live.now.min(end + Duration::microseconds(1));
        let from = live.start.max(start);

        (until - from).num_seconds().max(0)
    }
}

/// 期間ごとのタイムエントリーを取得し、稼働スケジュールに対する進捗を集計する。
pub struct Aggregator<'a, R: ClockifyRepository + ?Sized> {
    repository: &'a R,
    policy: &'a ExclusionPolicy,
}

impl<'a, R: ClockifyRepository + ?Sized> Aggregator<'a, R> {
    /// 新しい`Aggregator`を返す。
    ///
    /// # Arguments
    /// * `repository` - タイムエントリーとプロジェクトを取得するためのリポジトリ
    /// * `policy` - 集計から除外するエントリーの判定
    pub fn new(repository: &'a R, policy: &'a ExclusionPolicy) -> Self {
        Self { repository, policy }
    }

    /// `now`時点の日次、週次の集計を行う。
    ///
    /// 期間ごとの取得に失敗した場合、その期間は0秒として扱い、集計自体は必ず完了する。
    /// プロジェクトのキャッシュは呼び出しごとに作成し、呼び出し間で共有しない。
    ///
    /// # Arguments
    ///
    /// * `user_id` - 対象のユーザーID
    /// * `schedule` - 稼働スケジュール
    /// * `week_start` - 週の開始曜日
    /// * `live` - 計測中のエントリー
    /// * `now` - 集計の基準時刻
    pub async fn aggregate(
        &self,
        user_id: &str,
        schedule: &CanonicalSchedule,
        week_start: WeekStart,
        live: Option<&TimeEntry>,
        now: DateTime<Utc>,
    ) -> AggregationResult {
        let today = now.date_naive();
        let week = WeekWindow::containing(today, week_start);
        let elapsed = days_since_week_start(today, week_start);
        let (today_start, today_end) = day_bounds(today);
        let day_periods: Vec<_> = (0..7).map(|index| week.day_bounds(index)).collect();
        info!(
            "Week: {} ~ {}, days since week start: {}",
            week.start, week.end, elapsed
        );

        let (today_entries, week_entries, day_entries) = tokio::join!(
            self.fetch_period(user_id, today_start, today_end),
            self.fetch_period(user_id, week.start, week.end),
            join_all(
                day_periods
                    .iter()
                    .map(|(start, end)| self.fetch_period(user_id, *start, *end))
            ),
        );

        let mut projects = ProjectCache::new(self.repository);
        let counted_live = match live {
            Some(entry) if entry.is_running() => {
                if self.policy.should_exclude(entry, &mut projects).await {
                    info!("Running entry {} is excluded from totals", entry.id);
                    None
                } else {
                    Some(CountedLive {
                        start: entry.start,
                        now,
                    })
                }
            }
            _ => None,
        };

        let daily_logged = sum_durations(&today_entries, self.policy, &mut projects).await;
        let daily = PeriodFigures::new(
            daily_logged,
            daily_logged + CountedLive::seconds_within(counted_live.as_ref(), today_start, today_end),
            schedule.capacity_for(today.weekday()),
        );

        let live_seconds = CountedLive::seconds_within(counted_live.as_ref(), week.start, week.end);
        let weekly_logged = sum_durations(&week_entries, self.policy, &mut projects).await;
        let weekly = PeriodFigures::new(
            weekly_logged,
            weekly_logged + live_seconds,
            schedule.weekly_expected_seconds(),
        );

        let mut breakdown = Vec::with_capacity(7);
        for (index, (entries, (start, end))) in day_entries.iter().zip(&day_periods).enumerate() {
            let weekday = week.ordered_weekdays[index];
            let logged = sum_durations(entries, self.policy, &mut projects).await;
            let with_live = logged + CountedLive::seconds_within(counted_live.as_ref(), *start, *end);
            let expected = schedule.capacity_for(weekday);
            breakdown.push(DayFigures {
                weekday,
                label: weekday_label(weekday),
                date: week.date_of(index),
                logged_seconds: logged,
                logged_formatted: format_hhmm(logged),
                logged_with_live_seconds: with_live,
                logged_with_live_formatted: format_hhmm(with_live),
                expected_seconds: expected,
                progress: progress(logged, expected),
            });
        }

        let weekly_to_date = PeriodFigures::sum_of(&breakdown[..=elapsed]);
        let weekly_remaining = PeriodFigures::sum_of(&breakdown[elapsed + 1..]);

        AggregationResult {
            generated_at: now,
            week_start,
            week,
            days_since_week_start: elapsed,
            schedule: schedule.clone(),
            live_seconds,
            daily,
            weekly,
            weekly_to_date,
            weekly_remaining,
            breakdown,
        }
    }

    /// 期間のタイムエントリーを取得する。失敗した場合は空として扱う。
    async fn fetch_period(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<TimeEntry> {
        match self.repository.fetch_entries(user_id, &start, &end).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    "Failed to retrieve time entries between {} and {}, counting as zero: {:#}",
                    start, end, err
                );
                vec![]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc, Weekday};

    use super::{AggregationResult, Aggregator};
    use crate::calendar::WeekStart;
    use crate::clockify::MockClockifyRepository;
    use crate::duration::tests::entry;
    use crate::exclusion::ExclusionPolicy;
    use crate::schedule::CanonicalSchedule;
    use crate::time_entry::{EntryType, ProjectRef, TimeEntry};

    const HOUR: i64 = 3600;

    /// 2024-01-08は月曜日。
    fn monday(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 8, hour, minute, 0).unwrap()
    }

    fn monday_entries() -> Vec<TimeEntry> {
        vec![
            entry(monday(9, 0), Some(monday(12, 0)), EntryType::Regular),
            entry(monday(13, 0), Some(monday(17, 0)), EntryType::Regular),
            entry(monday(17, 0), Some(monday(17, 30)), EntryType::Break),
        ]
    }

    /// 期間の開始日時が含まれるエントリーだけを返すリポジトリを作成する。
    fn repository_with(entries: Vec<TimeEntry>) -> MockClockifyRepository {
        let mut repository = MockClockifyRepository::new();
        repository
            .expect_fetch_entries()
            .returning(move |_, start, end| {
                Ok(entries
                    .iter()
                    .filter(|entry| *start <= entry.start && entry.start <= *end)
                    .cloned()
                    .collect())
            });
        repository
    }

    async fn aggregate(
        repository: &MockClockifyRepository,
        week_start: WeekStart,
        live: Option<&TimeEntry>,
        now: DateTime<Utc>,
    ) -> AggregationResult {
        let policy = ExclusionPolicy::default();
        Aggregator::new(repository, &policy)
            .aggregate("u1", &CanonicalSchedule::default(), week_start, live, now)
            .await
    }

    #[tokio::test]
    async fn test_monday_with_break() {
        let repository = repository_with(monday_entries());

        let result = aggregate(&repository, WeekStart::Monday, None, monday(18, 0)).await;

        assert_eq!(result.daily.logged_seconds, 7 * HOUR);
        assert_eq!(result.daily.expected_seconds, 8 * HOUR);
        assert_eq!(result.daily.progress.percent, 87.5);
        assert_eq!(result.daily.progress.remaining_formatted, "01:00");
        assert_eq!(result.weekly.logged_seconds, 7 * HOUR);
        assert_eq!(result.weekly.expected_seconds, 40 * HOUR);
        assert_eq!(result.weekly_to_date.expected_seconds, 8 * HOUR);
        assert_eq!(result.weekly_to_date.logged_seconds, 7 * HOUR);
        assert_eq!(result.weekly_remaining.expected_seconds, 32 * HOUR);
        assert_eq!(result.weekly_remaining.logged_seconds, 0);
        assert_eq!(result.breakdown[0].logged_formatted, "07:00");
    }

    /// 記録のない日も0として7日分出力する。
    #[tokio::test]
    async fn test_breakdown_always_has_seven_days() {
        let repository = repository_with(vec![]);

        let result = aggregate(&repository, WeekStart::Sunday, None, monday(10, 0)).await;

        assert_eq!(result.breakdown.len(), 7);
        assert_eq!(result.breakdown[0].weekday, Weekday::Sun);
        assert_eq!(
            result.breakdown[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap()
        );
        assert!(result.breakdown.iter().all(|day| day.logged_seconds == 0));
        assert!(result
            .breakdown
            .iter()
            .all(|day| day.logged_formatted == "00:00"));
    }

    #[tokio::test]
    async fn test_saturday_week_start_on_wednesday() {
        let repository = repository_with(vec![]);
        let wednesday = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();

        let result = aggregate(&repository, WeekStart::Saturday, None, wednesday).await;

        assert_eq!(result.days_since_week_start, 4);
        assert_eq!(
            result.week.ordered_weekdays,
            [
                Weekday::Sat,
                Weekday::Sun,
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri
            ]
        );
        // 月火水の3日分
        assert_eq!(result.weekly_to_date.expected_seconds, 24 * HOUR);
        assert_eq!(result.weekly_remaining.expected_seconds, 16 * HOUR);
    }

    #[tokio::test]
    async fn test_saturday_has_no_daily_capacity() {
        let repository = repository_with(vec![]);
        let saturday = Utc.with_ymd_and_hms(2024, 1, 13, 10, 0, 0).unwrap();

        let result = aggregate(&repository, WeekStart::Monday, None, saturday).await;

        assert_eq!(result.daily.expected_seconds, 0);
        assert_eq!(result.daily.progress.remaining_formatted, "00:00");
        assert_eq!(result.weekly.expected_seconds, 40 * HOUR);
    }

    #[tokio::test]
    async fn test_live_entry_counts_only_with_live() {
        let repository = repository_with(monday_entries());
        let now = monday(18, 0);
        let live = entry(now - Duration::minutes(45), None, EntryType::Regular);

        let result = aggregate(&repository, WeekStart::Monday, Some(&live), now).await;

        assert_eq!(result.live_seconds, 2700);
        assert_eq!(result.daily.logged_seconds, 7 * HOUR);
        assert_eq!(result.daily.logged_with_live_seconds, 7 * HOUR + 2700);
        assert_eq!(result.weekly.logged_with_live_seconds, 7 * HOUR + 2700);
        assert_eq!(result.weekly_to_date.logged_with_live_seconds, 7 * HOUR + 2700);
        assert_eq!(result.weekly_remaining.logged_with_live_seconds, 0);
        assert_eq!(result.breakdown[0].logged_with_live_formatted, "07:45");
        assert_eq!(result.breakdown[1].logged_with_live_seconds, 0);
    }

    /// 日付をまたいで計測中のエントリーは、期間ごとに重なる分だけ数える。
    #[tokio::test]
    async fn test_live_entry_started_before_midnight() {
        let repository = repository_with(vec![]);
        let now = monday(1, 0);
        let live = entry(monday(0, 0) - Duration::hours(1), None, EntryType::Regular);

        let result = aggregate(&repository, WeekStart::Monday, Some(&live), now).await;

        assert_eq!(result.live_seconds, HOUR);
        assert_eq!(result.daily.logged_with_live_seconds, HOUR);
        assert_eq!(result.weekly.logged_with_live_seconds, HOUR);
        assert_eq!(result.weekly_to_date.logged_with_live_seconds, HOUR);
        assert_eq!(result.breakdown[0].logged_with_live_seconds, HOUR);
        assert_eq!(result.daily.logged_seconds, 0);
    }

    /// 週の途中で日付をまたいだ場合は前日と当日に分けて数える。
    #[tokio::test]
    async fn test_live_entry_split_across_days_in_week() {
        let repository = repository_with(vec![]);
        let now = monday(1, 0);
        let live = entry(monday(0, 0) - Duration::hours(1), None, EntryType::Regular);

        let result = aggregate(&repository, WeekStart::Sunday, Some(&live), now).await;

        assert_eq!(result.live_seconds, 2 * HOUR);
        assert_eq!(result.breakdown[0].logged_with_live_seconds, HOUR);
        assert_eq!(result.breakdown[1].logged_with_live_seconds, HOUR);
        assert_eq!(result.daily.logged_with_live_seconds, HOUR);
        assert_eq!(result.weekly.logged_with_live_seconds, 2 * HOUR);
        assert_eq!(result.weekly_to_date.logged_with_live_seconds, 2 * HOUR);
    }

    /// 過去の日付で集計した場合、その日より後の記録は残りの期間に数える。
    #[tokio::test]
    async fn test_weekly_remaining_counts_later_days() {
        let thursday = Utc.with_ymd_and_hms(2024, 1, 11, 10, 0, 0).unwrap();
        let mut entries = monday_entries();
        entries.push(entry(
            thursday,
            Some(thursday + Duration::hours(2)),
            EntryType::Regular,
        ));
        let repository = repository_with(entries);
        let tuesday_end = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();

        let result = aggregate(&repository, WeekStart::Monday, None, tuesday_end).await;

        assert_eq!(result.days_since_week_start, 1);
        assert_eq!(result.weekly.logged_seconds, 9 * HOUR);
        assert_eq!(result.weekly_to_date.logged_seconds, 7 * HOUR);
        assert_eq!(result.weekly_remaining.logged_seconds, 2 * HOUR);
        assert_eq!(result.weekly_remaining.expected_seconds, 24 * HOUR);
        assert_eq!(result.breakdown[3].logged_formatted, "02:00");
    }

    /// 取得済みのエントリーに計測中のエントリーが含まれていても二重に数えない。
    #[tokio::test]
    async fn test_live_entry_not_double_counted() {
        let now = monday(18, 0);
        let live = entry(now - Duration::minutes(45), None, EntryType::Regular);
        let mut entries = monday_entries();
        entries.push(live.clone());
        let repository = repository_with(entries);

        let result = aggregate(&repository, WeekStart::Monday, Some(&live), now).await;

        assert_eq!(result.daily.logged_seconds, 7 * HOUR);
        assert_eq!(result.daily.logged_with_live_seconds, 7 * HOUR + 2700);
    }

    #[tokio::test]
    async fn test_live_entry_in_break_project_is_excluded() {
        let mut repository = repository_with(vec![]);
        repository
            .expect_fetch_project()
            .times(1)
            .returning(|id| {
                Ok(Some(ProjectRef {
                    id: id.to_string(),
                    name: "Breaks".to_string(),
                }))
            });
        let now = monday(18, 0);
        let live = TimeEntry {
            project_id: Some("p-breaks".to_string()),
            ..entry(now - Duration::minutes(45), None, EntryType::Regular)
        };

        let result = aggregate(&repository, WeekStart::Monday, Some(&live), now).await;

        assert_eq!(result.live_seconds, 0);
        assert_eq!(result.daily.logged_with_live_seconds, 0);
    }

    /// 同じプロジェクトは期間をまたいでも1回しか問い合わせない。
    #[tokio::test]
    async fn test_project_cache_shared_across_periods() {
        let entries = vec![TimeEntry {
            project_id: Some("p1".to_string()),
            ..entry(monday(9, 0), Some(monday(10, 0)), EntryType::Regular)
        }];
        let mut repository = repository_with(entries);
        repository
            .expect_fetch_project()
            .times(1)
            .returning(|id| {
                Ok(Some(ProjectRef {
                    id: id.to_string(),
                    name: "Client".to_string(),
                }))
            });

        let result = aggregate(&repository, WeekStart::Monday, None, monday(18, 0)).await;

        assert_eq!(result.daily.logged_seconds, HOUR);
        assert_eq!(result.weekly.logged_seconds, HOUR);
        assert_eq!(result.breakdown[0].logged_seconds, HOUR);
    }

    /// 1日分の取得に失敗してもその日だけ0になる。
    #[tokio::test]
    async fn test_failed_period_degrades_to_zero() {
        let tuesday = Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap();
        let entries = vec![
            entry(monday(9, 0), Some(monday(10, 0)), EntryType::Regular),
            entry(
                tuesday + Duration::hours(9),
                Some(tuesday + Duration::hours(11)),
                EntryType::Regular,
            ),
        ];
        let mut repository = MockClockifyRepository::new();
        repository
            .expect_fetch_entries()
            .returning(move |_, start, end| {
                if *start == tuesday {
                    return Err(anyhow!("503 Service Unavailable"));
                }
                Ok(entries
                    .iter()
                    .filter(|entry| *start <= entry.start && entry.start <= *end)
                    .cloned()
                    .collect())
            });
        let wednesday = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();

        let result = aggregate(&repository, WeekStart::Monday, None, wednesday).await;

        assert_eq!(result.breakdown[0].logged_seconds, HOUR);
        assert_eq!(result.breakdown[1].logged_seconds, 0);
        assert_eq!(result.weekly.logged_seconds, 3 * HOUR);
        assert_eq!(result.weekly_to_date.logged_seconds, HOUR);
    }

    #[tokio::test]
    async fn test_every_fetch_fails() {
        let mut repository = MockClockifyRepository::new();
        repository
            .expect_fetch_entries()
            .returning(|_, _, _| Err(anyhow!("timeout")));

        let result = aggregate(&repository, WeekStart::Monday, None, monday(12, 0)).await;

        assert_eq!(result.daily.logged_seconds, 0);
        assert_eq!(result.weekly.logged_seconds, 0);
        assert_eq!(result.daily.expected_seconds, 8 * HOUR);
        assert_eq!(result.breakdown.len(), 7);
    }
}
