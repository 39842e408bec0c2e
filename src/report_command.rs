use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{info, warn};
use serde_json::Value;

use crate::aggregator::{AggregationResult, Aggregator};
use crate::calendar::{day_bounds, WeekStart};
use crate::clockify::ClockifyRepository;
use crate::datetime::{self, parse_date};
use crate::exclusion::{ExclusionPolicy, DEFAULT_BREAK_PROJECT_NAME};
use crate::schedule::{hours_to_seconds, CanonicalSchedule, DEFAULT_WORKING_DAYS};
use crate::time_entry::TimeEntry;

/// 日次と週次の進捗を出力するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct ReportArgs {
    #[clap(
        short = 'd',
        long = "date",
        help = "Aggregates as of the end of a past date in the format YYYY-MM-DD (UTC)",
        parse(try_from_str = parse_date),
    )]
    pub date: Option<NaiveDate>,

    #[clap(
        short = 'w',
        long = "week-start",
        help = "Overrides the week start day: MONDAY, SATURDAY or SUNDAY",
        parse(from_str = WeekStart::from_label),
    )]
    pub week_start: Option<WeekStart>,

    #[clap(
        long = "break-project",
        help = "Project name whose entries are not counted (case-insensitive)",
        default_value = DEFAULT_BREAK_PROJECT_NAME,
    )]
    pub break_project: String,

    #[clap(
        long = "default-hours",
        help = "Hours per working day used when no schedule is available",
        default_value = "8"
    )]
    pub default_hours: f64,

    #[clap(
        long = "default-days",
        help = "Comma separated working days used when no schedule is available",
        default_value = "MONDAY,TUESDAY,WEDNESDAY,THURSDAY,FRIDAY"
    )]
    pub default_days: String,

    #[clap(long = "json", help = "Prints the result as JSON")]
    pub json: bool,
}

impl Default for ReportArgs {
    fn default() -> Self {
        Self {
            date: None,
            week_start: None,
            break_project: DEFAULT_BREAK_PROJECT_NAME.to_string(),
            default_hours: 8.0,
            default_days: DEFAULT_WORKING_DAYS.join(","),
            json: false,
        }
    }
}

impl ReportArgs {
    /// スケジュールが取得できない時に利用するスケジュール。
    fn fallback_schedule(&self) -> CanonicalSchedule {
        CanonicalSchedule::uniform(
            self.default_days
                .split(',')
                .map(str::trim)
                .filter(|day| !day.is_empty()),
            hours_to_seconds(self.default_hours),
        )
    }
}

pub struct ReportCommand<'a, T: ClockifyRepository> {
    clockify_client: &'a T,
}

impl<'a, T: ClockifyRepository> ReportCommand<'a, T> {
    /// 新しい`ReportCommand`を返す。
    ///
    /// # Arguments
    /// * `clockify_client` - Clockify APIと通信するためのリポジトリ
    pub fn new(clockify_client: &'a T) -> Self {
        Self { clockify_client }
    }

    /// `report`サブコマンドの処理を行う。
    ///
    /// 現在時刻は1回だけ取得し、全ての期間の計算に利用する。
    /// 日付が指定された場合はその日の終わりを基準時刻とし、計測中のエントリーは利用しない。
    /// ユーザーの取得に失敗した場合のみエラーを返し、それ以外の失敗は既定値で集計を続ける。
    ///
    /// # Arguments
    ///
    /// * `report` - `report`サブコマンドの引数
    pub async fn run(&self, report: &ReportArgs) -> Result<AggregationResult> {
        let user = self
            .clockify_client
            .fetch_user()
            .await
            .context("Failed to retrieve the authenticated user")?;
        info!("User retrieved successfully: {}", user.id);

        let (now, live) = match report.date {
            Some(date) => (day_bounds(date).1, None),
            None => {
                let now = datetime::now();
                (now, self.live_entry(&user.id).await)
            }
        };

        let payload = match self.clockify_client.fetch_schedule(&user.id).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Failed to retrieve schedule: {:#}", err);
                None
            }
        };
        let schedule =
            CanonicalSchedule::from_payload(payload.as_ref(), &report.fallback_schedule());
        let week_start = resolve_week_start(
            report.week_start,
            user.week_start.as_deref(),
            payload.as_ref(),
        );
        info!("Start at: {}, week start: {:?}", now, week_start);

        let policy = ExclusionPolicy::new(&report.break_project);
        let result = Aggregator::new(self.clockify_client, &policy)
            .aggregate(&user.id, &schedule, week_start, live.as_ref(), now)
            .await;
        info!("Aggregation finished.");

        Ok(result)
    }

    async fn live_entry(&self, user_id: &str) -> Option<TimeEntry> {
        match self.clockify_client.fetch_live_entry(user_id).await {
            Ok(live) => live,
            Err(err) => {
                warn!("Failed to retrieve the running entry: {:#}", err);
                None
            }
        }
    }
}

/// 週の開始曜日を決定する。
///
/// 引数での指定、ユーザー設定、メンバープロフィールの順に利用し、いずれもなければ月曜日とする。
fn resolve_week_start(
    explicit: Option<WeekStart>,
    user_setting: Option<&str>,
    payload: Option<&Value>,
) -> WeekStart {
    explicit
        .or_else(|| user_setting.map(WeekStart::from_label))
        .or_else(|| {
            payload
                .and_then(|payload| payload.get("weekStart"))
                .and_then(Value::as_str)
                .map(WeekStart::from_label)
        })
        .unwrap_or_default()
}
