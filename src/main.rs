use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use clockify_progress::clockify::ClockifyClient;
use clockify_progress::console::{ConsoleJson, ConsoleMarkdownList, ConsolePresenter};
use clockify_progress::logger;
use clockify_progress::report_command::{ReportArgs, ReportCommand};
use clockify_progress::timer_command::TimerCommand;

/// Clockifyの記録時間と進捗を表示するためのCLIアプリケーション。
///
/// # Examples
/// ```text
/// $ cargo run -- report
/// $ cargo run -- report --week-start SUNDAY --json
/// $ cargo run -- timer
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(
        short = 'v',
        long = "verbose",
        global = true,
        parse(from_occurrences),
        help = "Increases log verbosity"
    )]
    verbose: u64,

    #[clap(long = "log", global = true, help = "Also writes logs to the default log file")]
    log: bool,

    #[clap(long = "log-file", global = true, help = "Also writes logs to the given file")]
    log_file: Option<PathBuf>,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// 日次、週次の記録時間と進捗を表示する
    Report(ReportArgs),
    /// 計測中のタイマーを表示する
    Timer {
        #[clap(long = "json", help = "Prints the timer as JSON")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_file = match (args.log_file, args.log) {
        (Some(path), _) => Some(path),
        (None, true) => logger::default_log_path(),
        (None, false) => None,
    };
    logger::init(args.verbose, log_file.as_deref())?;

    let client = ClockifyClient::new().context("Failed to new clockify client")?;
    let mut stdout = io::stdout();

    match args.subcommand {
        SubCommands::Report(report) => {
            let result = ReportCommand::new(&client).run(&report).await?;
            if report.json {
                ConsoleJson::new(&mut stdout).show_report(&result)?;
            } else {
                ConsoleMarkdownList::new(&mut stdout).show_report(&result)?;
            }
        }
        SubCommands::Timer { json } => {
            let timer = TimerCommand::new(&client).run().await?;
            if json {
                ConsoleJson::new(&mut stdout).show_timer(timer.as_ref())?;
            } else {
                ConsoleMarkdownList::new(&mut stdout).show_timer(timer.as_ref())?;
            }
        }
    }

    Ok(())
}
