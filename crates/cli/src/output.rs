use crate::error::CliError;
use engine_config::report::summary::SummaryReport;
use engine_core::state::ProgressSummary;
use std::path::Path;

fn report_json(reports: &[SummaryReport]) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(reports)?)
}

pub async fn write_report(reports: &[SummaryReport], path: &Path) -> Result<(), CliError> {
    let json = report_json(reports)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    Ok(())
}

pub fn print_report(reports: &[SummaryReport]) -> Result<(), CliError> {
    println!("{}", report_json(reports)?);
    Ok(())
}

pub fn print_progress_table(summary: &ProgressSummary) {
    println!("Progress for target '{}':", summary.target);
    println!("-----------------------------");
    println!("{:<16} {}", "State", summary.location);
    println!("{:<16} {}", "Completed", summary.completed);
    println!("{:<16} {}", "Failed", summary.failed);
    let updated = summary
        .updated_at
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_else(|| "n/a".to_string());
    println!("{:<16} {}", "Last update", updated);
    match &summary.finished {
        Some(marker) => println!(
            "{:<16} {} ({} succeeded)",
            "Finished",
            marker.finished_at.to_rfc3339(),
            marker.succeeded
        ),
        None => println!("{:<16} no", "Finished"),
    }
}
