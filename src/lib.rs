//! Clockifyのタイムエントリーから日次、週次の記録時間と稼働スケジュールに対する進捗を集計する。

pub mod aggregator;
pub mod calendar;
pub mod clockify;
pub mod console;
pub mod datetime;
pub mod duration;
pub mod exclusion;
pub mod logger;
pub mod progress;
pub mod report_command;
pub mod schedule;
pub mod time_entry;
pub mod timer_command;
