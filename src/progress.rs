use serde::Serialize;

use crate::duration::format_hhmm;
use crate::schedule::SECONDS_PER_HOUR;

/// 稼働時間に対する進捗。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Progress {
    /// 小数点以下1桁に丸めた達成率(%)。
    pub percent: f64,
    /// 残り時間(秒)。超過していても0未満にはならない。
    pub remaining_seconds: i64,
    /// 小数点以下2桁に丸めた残り時間(時間)。
    pub remaining_hours: f64,
    /// `HH:MM`形式の残り時間。
    pub remaining_formatted: String,
}

impl Progress {
    fn zero() -> Self {
        Self {
            percent: 0.0,
            remaining_seconds: 0,
            remaining_hours: 0.0,
            remaining_formatted: format_hhmm(0),
        }
    }
}

/// 記録時間と稼働時間から進捗を計算する。
///
/// 稼働時間が0以下の場合は全て0とする。
pub fn progress(logged_seconds: i64, expected_seconds: i64) -> Progress {
    if expected_seconds <= 0 {
        return Progress::zero();
    }

    let remaining_seconds = (expected_seconds - logged_seconds).max(0);

    Progress {
        percent: round_to(logged_seconds as f64 / expected_seconds as f64 * 100.0, 1),
        remaining_seconds,
        remaining_hours: round_to(remaining_seconds as f64 / SECONDS_PER_HOUR as f64, 2),
        remaining_formatted: format_hhmm(remaining_seconds),
    }
}

/// 指定した桁数に丸める。ちょうど半分の場合は偶数側に丸める。
fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round_ties_even() / factor
}
