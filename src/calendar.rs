use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::Serialize;

/// 月曜日から始まる曜日の並び。
const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// 週の開始曜日。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeekStart {
    #[default]
    Monday,
    Saturday,
    Sunday,
}

impl WeekStart {
    /// `MONDAY`などのラベルから開始曜日を決定する。
    ///
    /// 大文字小文字は区別しない。認識できないラベルは月曜日として扱う。
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "SATURDAY" => WeekStart::Saturday,
            "SUNDAY" => WeekStart::Sunday,
            _ => WeekStart::Monday,
        }
    }

    /// 月曜日を0とした時の開始曜日の位置。
    pub fn offset(self) -> usize {
        match self {
            WeekStart::Monday => 0,
            WeekStart::Saturday => 5,
            WeekStart::Sunday => 6,
        }
    }
}

/// 週の開始曜日から何日経過しているかを返す。値は必ず0から6の範囲に収まる。
pub fn days_since_week_start(date: NaiveDate, week_start: WeekStart) -> usize {
    (date.weekday().num_days_from_monday() as usize + 7 - week_start.offset()) % 7
}

/// 開始曜日から始まる7日分の曜日を返す。
pub fn ordered_weekdays(week_start: WeekStart) -> [Weekday; 7] {
    std::array::from_fn(|i| WEEKDAYS[(i + week_start.offset()) % 7])
}

/// 曜日の短いラベル(`Mon`など)を返す。
pub fn weekday_label(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// 任意の曜日名を短いラベルに正規化する。
///
/// `MONDAY`, `monday`, `Mon`などは`Mon`になる。曜日として認識できない名前は先頭3文字をそのまま使う。
pub fn day_label(name: &str) -> String {
    let name = name.trim();
    match name.parse::<Weekday>() {
        Ok(weekday) => weekday_label(weekday).to_string(),
        Err(_) => name.chars().take(3).collect(),
    }
}

/// UTCで指定日の00:00:00から23:59:59.999999までの範囲を返す。
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1) - Duration::microseconds(1))
}

/// 基準日を含む1週間の範囲。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WeekWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub ordered_weekdays: [Weekday; 7],
}

impl WeekWindow {
    /// `date`を含む週を返す。
    pub fn containing(date: NaiveDate, week_start: WeekStart) -> Self {
        let first_day = date - Duration::days(days_since_week_start(date, week_start) as i64);
        let (start, _) = day_bounds(first_day);
        let (_, end) = day_bounds(first_day + Duration::days(6));

        Self {
            start,
            end,
            ordered_weekdays: ordered_weekdays(week_start),
        }
    }

    /// 週の`index`日目(0始まり)の日付。
    pub fn date_of(&self, index: usize) -> NaiveDate {
        self.start.date_naive() + Duration::days(index as i64)
    }

    /// 週の`index`日目(0始まり)の範囲。
    pub fn day_bounds(&self, index: usize) -> (DateTime<Utc>, DateTime<Utc>) {
        day_bounds(self.date_of(index))
    }
}
