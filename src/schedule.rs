use std::collections::{BTreeMap, BTreeSet};

use chrono::Weekday;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::calendar::{day_label, weekday_label};

pub const SECONDS_PER_HOUR: i64 = 3600;

/// 1日あたりの稼働時間の上限。
pub const MAX_SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;

/// スケジュールが取得できない時の既定の稼働日。
pub const DEFAULT_WORKING_DAYS: [&str; 5] = ["MONDAY", "TUESDAY", "WEDNESDAY", "THURSDAY", "FRIDAY"];

/// スケジュールが取得できない時の既定の1日あたりの稼働時間。
pub const DEFAULT_HOURS_PER_DAY: f64 = 8.0;

/// 正規化した稼働スケジュール。
///
/// `working_days`に含まれる曜日は必ず`daily_capacity`に正の値を持つ。
/// 含まれない曜日の稼働時間は0として扱う。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CanonicalSchedule {
    working_days: BTreeSet<String>,
    daily_capacity: BTreeMap<String, i64>,
}

impl Default for CanonicalSchedule {
    /// 月曜日から金曜日まで1日8時間。
    fn default() -> Self {
        Self::uniform(
            DEFAULT_WORKING_DAYS,
            hours_to_seconds(DEFAULT_HOURS_PER_DAY),
        )
    }
}

impl CanonicalSchedule {
    /// 全ての稼働日が同じ稼働時間を持つスケジュールを返す。
    pub fn uniform<I, S>(days: I, seconds_per_day: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_capacities(
            days.into_iter()
                .map(|day| (day_label(day.as_ref()), seconds_per_day)),
        )
    }

    /// 曜日ごとの稼働時間からスケジュールを作る。稼働時間が0以下の曜日は稼働日に含めない。
    ///
    /// 1日の稼働時間は24時間で打ち切る。
    pub fn from_capacities<I>(capacities: I) -> Self
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        let daily_capacity: BTreeMap<String, i64> = capacities
            .into_iter()
            .filter(|(_, seconds)| *seconds > 0)
            .map(|(day, seconds)| {
                if seconds > MAX_SECONDS_PER_DAY {
                    warn!("Capacity of {} exceeds a day ({}s), clamping to 24h", day, seconds);
                }
                (day, seconds.min(MAX_SECONDS_PER_DAY))
            })
            .collect();
        let working_days = daily_capacity.keys().cloned().collect();

        Self {
            working_days,
            daily_capacity,
        }
    }

    /// スケジュールのペイロードを正規化する。
    ///
    /// ペイロードがない、もしくはどの形式にも一致しない場合は`fallback`を返す。
    pub fn from_payload(payload: Option<&Value>, fallback: &CanonicalSchedule) -> Self {
        let Some(payload) = payload else {
            info!("No schedule available, falling back to the default schedule");
            return fallback.clone();
        };

        match ScheduleSource::detect(payload) {
            Some(source) => {
                debug!("Detected schedule source: {:?}", source);
                source.normalize()
            }
            None => {
                info!("Schedule payload matched no known shape, falling back to the default schedule");
                fallback.clone()
            }
        }
    }

    pub fn working_days(&self) -> &BTreeSet<String> {
        &self.working_days
    }

    pub fn is_working_day(&self, weekday: Weekday) -> bool {
        self.working_days.contains(weekday_label(weekday))
    }

    /// 指定した曜日の稼働時間(秒)。稼働日でなければ0。
    pub fn capacity_for(&self, weekday: Weekday) -> i64 {
        self.daily_capacity
            .get(weekday_label(weekday))
            .copied()
            .unwrap_or(0)
    }

    /// 1週間の稼働時間(秒)。
    pub fn weekly_expected_seconds(&self) -> i64 {
        self.working_days
            .iter()
            .filter_map(|day| self.daily_capacity.get(day))
            .sum()
    }
}

/// 曜日ごとの設定。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekdaySetting {
    pub is_work_day: bool,
    #[serde(default)]
    pub duration: Option<String>,
}

/// 受け付けるスケジュールの形式。
#[derive(Clone, Debug, PartialEq)]
pub enum ScheduleSource {
    /// メンバープロフィールの`workCapacity`と`workingDays`。
    MemberCapacity {
        work_capacity: String,
        working_days: Vec<String>,
    },
    /// 曜日名から`{ isWorkDay, duration }`への対応。
    PerWeekday(Vec<(String, WeekdaySetting)>),
    /// ワークスペースの`daysOfWeek`と`hoursPerDay`。
    LegacyWorkspace {
        days_of_week: Vec<String>,
        hours_per_day: f64,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberCapacityPayload {
    work_capacity: String,
    working_days: WorkingDaysField,
}

/// `workingDays`は配列の場合とJSON文字列の場合がある。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkingDaysField {
    List(Vec<String>),
    Encoded(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyWorkspacePayload {
    days_of_week: Vec<String>,
    hours_per_day: f64,
}

impl ScheduleSource {
    /// ペイロードの形式を判定する。
    ///
    /// メンバープロフィール、曜日ごとの設定、ワークスペースの旧形式の順に判定し、最初に一致したものを返す。
    pub fn detect(payload: &Value) -> Option<Self> {
        Self::detect_member_capacity(payload)
            .or_else(|| Self::detect_per_weekday(payload))
            .or_else(|| Self::detect_legacy_workspace(payload))
    }

    fn detect_member_capacity(payload: &Value) -> Option<Self> {
        let member = MemberCapacityPayload::deserialize(payload).ok()?;
        let working_days = match member.working_days {
            WorkingDaysField::List(days) => days,
            WorkingDaysField::Encoded(encoded) => match serde_json::from_str(&encoded) {
                Ok(days) => days,
                Err(err) => {
                    warn!("Failed to decode workingDays {:?}: {}", encoded, err);
                    return None;
                }
            },
        };

        Some(ScheduleSource::MemberCapacity {
            work_capacity: member.work_capacity,
            working_days,
        })
    }

    fn detect_per_weekday(payload: &Value) -> Option<Self> {
        let settings: Vec<(String, WeekdaySetting)> = payload
            .as_object()?
            .iter()
            .filter_map(|(name, value)| {
                WeekdaySetting::deserialize(value)
                    .ok()
                    .map(|setting| (name.clone(), setting))
            })
            .collect();

        if settings.is_empty() {
            None
        } else {
            Some(ScheduleSource::PerWeekday(settings))
        }
    }

    fn detect_legacy_workspace(payload: &Value) -> Option<Self> {
        let legacy = LegacyWorkspacePayload::deserialize(payload).ok()?;

        Some(ScheduleSource::LegacyWorkspace {
            days_of_week: legacy.days_of_week,
            hours_per_day: legacy.hours_per_day,
        })
    }

    /// 正規化したスケジュールに変換する。
    pub fn normalize(&self) -> CanonicalSchedule {
        match self {
            ScheduleSource::MemberCapacity {
                work_capacity,
                working_days,
            } => CanonicalSchedule::uniform(working_days, parse_iso_duration(work_capacity)),
            ScheduleSource::PerWeekday(settings) => CanonicalSchedule::from_capacities(
                settings
                    .iter()
                    .filter(|(_, setting)| setting.is_work_day)
                    .map(|(name, setting)| {
                        let seconds = setting
                            .duration
                            .as_deref()
                            .map(parse_iso_duration)
                            .unwrap_or(0);
                        (day_label(name), seconds)
                    }),
            ),
            ScheduleSource::LegacyWorkspace {
                days_of_week,
                hours_per_day,
            } => CanonicalSchedule::uniform(days_of_week, hours_to_seconds(*hours_per_day)),
        }
    }
}

/// `PT7H30M`形式の期間を秒に変換する。
///
/// `PT`の後に省略可能な`<整数>H`と`<整数>M`が続く形式のみ受け付ける。
/// それ以外の文字列は0秒として扱う。
pub fn parse_iso_duration(value: &str) -> i64 {
    match try_parse_iso_duration(value) {
        Some(seconds) => seconds,
        None => {
            warn!("Malformed duration {:?}, treating as zero", value);
            0
        }
    }
}

/// `PT7H30M`形式の期間を時間単位で返す。
pub fn iso_duration_hours(value: &str) -> f64 {
    parse_iso_duration(value) as f64 / SECONDS_PER_HOUR as f64
}

fn try_parse_iso_duration(value: &str) -> Option<i64> {
    let rest = value.trim().strip_prefix("PT")?;
    let (hours, rest) = match rest.split_once('H') {
        Some((hours, rest)) => (hours.parse::<u32>().ok()?, rest),
        None => (0, rest),
    };
    let minutes = match rest {
        "" => 0,
        rest => rest.strip_suffix('M')?.parse::<u32>().ok()?,
    };

    Some(i64::from(hours) * SECONDS_PER_HOUR + i64::from(minutes) * 60)
}

/// 時間を秒に変換する。有限な正の値以外は0とし、24時間を超える値は24時間とする。
pub fn hours_to_seconds(hours: f64) -> i64 {
    if hours.is_finite() && hours > 0.0 {
        (hours * SECONDS_PER_HOUR as f64).round().min(MAX_SECONDS_PER_DAY as f64) as i64
    } else {
        0
    }
}
