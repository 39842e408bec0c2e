use std::io::Write;

use anyhow::{Context, Result};

use crate::aggregator::{AggregationResult, PeriodFigures};
use crate::duration::{format_hhmm, format_hhmmss};
use crate::timer_command::CurrentTimer;

/// Consoleに集計結果を表示するためのtrait。
pub trait ConsolePresenter {
    /// 集計結果を表示する。
    ///
    /// # Arguments
    ///
    /// * `report` - 表示する集計結果
    fn show_report(&mut self, report: &AggregationResult) -> Result<()>;

    /// 計測中のタイマーを表示する。
    fn show_timer(&mut self, timer: Option<&CurrentTimer>) -> Result<()>;
}

/// 集計結果をMarkdownのlist形式で表示する。
pub struct ConsoleMarkdownList<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleMarkdownList<'a, W> {
    /// 新しい`ConsoleMarkdownList`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    fn write_period(&mut self, name: &str, period: &PeriodFigures) -> Result<()> {
        writeln!(
            self.writer,
            "- {}: {} / {} ({:.1}%, remaining {})",
            name,
            format_hhmm(period.logged_seconds),
            format_hhmm(period.expected_seconds),
            period.progress.percent,
            period.progress.remaining_formatted,
        )
        .with_context(|| format!("Failed to write period: {}", name))?;
        if period.logged_with_live_seconds != period.logged_seconds {
            writeln!(
                self.writer,
                "  - with running timer: {} ({:.1}%, remaining {})",
                format_hhmm(period.logged_with_live_seconds),
                period.progress_with_live.percent,
                period.progress_with_live.remaining_formatted,
            )
            .with_context(|| format!("Failed to write period: {}", name))?;
        }

        Ok(())
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleMarkdownList<'a, W> {
    fn show_report(&mut self, report: &AggregationResult) -> Result<()> {
        writeln!(
            self.writer,
            "## {} ~ {}",
            report.week.start.date_naive(),
            report.week.end.date_naive()
        )
        .context("Failed to write report header")?;
        self.write_period("Today", &report.daily)?;
        self.write_period("Week", &report.weekly)?;
        self.write_period("Week to date", &report.weekly_to_date)?;
        self.write_period("Week remaining", &report.weekly_remaining)?;

        writeln!(self.writer, "### Days").context("Failed to write breakdown header")?;
        for day in &report.breakdown {
            let live = if day.logged_with_live_seconds != day.logged_seconds {
                format!(" (with running timer {})", day.logged_with_live_formatted)
            } else {
                String::new()
            };
            writeln!(
                self.writer,
                "- {} {}: {}{} / {}",
                day.label,
                day.date,
                day.logged_formatted,
                live,
                format_hhmm(day.expected_seconds),
            )
            .with_context(|| format!("Failed to write day: {:?}", day))?;
        }

        Ok(())
    }

    fn show_timer(&mut self, timer: Option<&CurrentTimer>) -> Result<()> {
        let Some(timer) = timer else {
            writeln!(self.writer, "No active timer").context("Failed to write timer")?;
            return Ok(());
        };

        let project = timer.project_name.as_deref().unwrap_or("Unknown Project");
        let task = timer
            .task_name
            .as_ref()
            .map(|task| format!(" - {}", task))
            .unwrap_or_default();
        writeln!(
            self.writer,
            "- {}{}: {} ({})",
            project,
            task,
            timer.entry.description,
            format_hhmmss(timer.elapsed_seconds)
        )
        .with_context(|| format!("Failed to write timer: {:?}", timer))?;
        writeln!(
            self.writer,
            "  - started: {}",
            timer.entry.start.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .context("Failed to write timer")?;
        if timer.entry.billable {
            writeln!(self.writer, "  - billable").context("Failed to write timer")?;
        }
        if !timer.entry.tags.is_empty() {
            writeln!(self.writer, "  - tags: {}", timer.entry.tags.join(", "))
                .context("Failed to write timer")?;
        }

        Ok(())
    }
}

/// 集計結果をJSONで表示する。
pub struct ConsoleJson<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleJson<'a, W> {
    /// 新しい`ConsoleJson`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleJson<'a, W> {
    fn show_report(&mut self, report: &AggregationResult) -> Result<()> {
        serde_json::to_writer_pretty(&mut *self.writer, report)
            .context("Failed to serialize report")?;
        writeln!(self.writer).context("Failed to write report")?;

        Ok(())
    }

    fn show_timer(&mut self, timer: Option<&CurrentTimer>) -> Result<()> {
        let value = match timer {
            Some(timer) => serde_json::json!({
                "status": "active",
                "description": timer.entry.description,
                "project_id": timer.entry.project_id,
                "project_name": timer.project_name,
                "task_id": timer.entry.task_id,
                "task_name": timer.task_name,
                "start_time": timer.entry.start,
                "duration": format_hhmmss(timer.elapsed_seconds),
                "duration_seconds": timer.elapsed_seconds,
                "billable": timer.entry.billable,
                "tags": timer.entry.tags,
            }),
            None => serde_json::json!({ "status": "inactive" }),
        };
        serde_json::to_writer_pretty(&mut *self.writer, &value)
            .context("Failed to serialize timer")?;
        writeln!(self.writer).context("Failed to write timer")?;

        Ok(())
    }
}
