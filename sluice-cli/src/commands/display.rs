//! Terminal rendering of runs and logs

use colored::*;
use sluice_core::domain::log::{LogEntry, LogLevel};
use sluice_core::domain::run::{Run, RunResult, RunStatus};
use sluice_core::dto::run::RunSummary;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn print_run_summary(run: &RunSummary) {
    println!("  {} Run {}", "▸".cyan(), run.id.to_string().dimmed());
    println!("    Workflow: {}", run.workflow);
    println!("    Trigger:  {}", run.trigger);
    println!("    Group:    {}", run.key.dimmed());
    println!("    Status:   {}", colorize_status(&run.status));
    if let Some(failure) = run.failure {
        println!("    Failure:  {}", failure.to_string().red());
    }
    println!(
        "    Created:  {}",
        run.requested_at.format(TIME_FORMAT).to_string().dimmed()
    );
    println!();
}

pub fn print_run_details(run: &Run) {
    println!("{}", "Run Details:".bold());
    println!("  ID:          {}", run.id.to_string().cyan());
    println!("  Workflow:    {}", run.workflow);
    println!("  Trigger:     {}", run.trigger);
    println!("  Group:       {}", run.key.to_string().dimmed());
    println!("  Status:      {}", colorize_status(&run.status));
    println!("  Requested:   {}", run.requested_at.format(TIME_FORMAT));

    if let Some(started) = run.started_at {
        println!("  Started:     {}", started.format(TIME_FORMAT));
    }

    if let Some(completed) = run.completed_at {
        println!("  Completed:   {}", completed.format(TIME_FORMAT));

        if let Some(started) = run.started_at {
            let duration = completed.signed_duration_since(started);
            println!("  Duration:    {}s", duration.num_seconds());
        }
    }

    if let Some(result) = &run.result {
        println!();
        print_result(result);
    }
}

pub fn print_result(result: &RunResult) {
    println!("{}", "Result:".bold());
    println!(
        "  Success:     {}",
        if result.is_success() {
            "✓".green()
        } else {
            "✗".red()
        }
    );

    if let Some(failure) = result.failure {
        println!("  Failure:     {}", failure);
    }

    if let Some(step) = &result.failed_step {
        println!("  Step:        {}", step);
    }

    if let Some(error) = &result.error_message {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

pub fn print_log_entry(log: &LogEntry) {
    let level = log.level.to_string();
    let level_colored = match log.level {
        LogLevel::Debug => level.dimmed(),
        LogLevel::Info => level.cyan(),
        LogLevel::Warning => level.yellow(),
        LogLevel::Error => level.red(),
    };

    println!(
        "{} [{}] {}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        log.message
    );
}

pub fn colorize_status(status: &RunStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        RunStatus::Queued => status_str.yellow(),
        RunStatus::Running => status_str.cyan(),
        RunStatus::Succeeded => status_str.green(),
        RunStatus::Failed => status_str.red(),
        RunStatus::Cancelled => status_str.dimmed(),
        RunStatus::TimedOut => status_str.red(),
    }
}
