use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};

use crate::domain::{Task, format_hours};

pub const CSV_HEADER: &str = "Task Name,Time Spent (hours)";

/// Exports are filed under the business day of a fixed UTC+05:30 clock; the
/// day rolls over at 05:30 local time rather than midnight.
const BUSINESS_OFFSET_SECONDS: i64 = 5 * 3600 + 30 * 60;
const BUSINESS_DAY_START_SECONDS: u32 = 5 * 3600 + 30 * 60;

pub fn render_csv(tasks: &[Task]) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    for task in tasks {
        csv.push_str(&csv_field(&task.name));
        csv.push(',');
        csv.push_str(&format_hours(task.time_spent));
        csv.push('\n');
    }
    csv
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn business_day(now: DateTime<Utc>) -> NaiveDate {
    let local = now.naive_utc() + Duration::seconds(BUSINESS_OFFSET_SECONDS);

    if local.time().num_seconds_from_midnight() < BUSINESS_DAY_START_SECONDS {
        (local - Duration::days(1)).date()
    } else {
        local.date()
    }
}

pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("task_time_log_{}.csv", business_day(now).format("%Y-%m-%d"))
}

pub fn write_export(dir: &Path, tasks: &[Task], now: DateTime<Utc>) -> Result<PathBuf, std::io::Error> {
    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir)?;
    }

    let path = dir.join(export_file_name(now));
    fs::write(&path, render_csv(tasks))?;
    tracing::info!(path = %path.display(), tasks = tasks.len(), "exported csv");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{business_day, export_file_name, render_csv, write_export};
    use crate::domain::{Task, TaskId};

    fn task(name: &str, time_spent: u64) -> Task {
        Task {
            id: TaskId(1),
            name: name.to_string(),
            time_spent,
            is_running: false,
            last_start: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn renders_hours_with_two_decimals() {
        let csv = render_csv(&[task("TaskName", 5400)]);
        assert_eq!(csv, "Task Name,Time Spent (hours)\nTaskName,1.50\n");
    }

    #[test]
    fn empty_ledger_exports_header_only() {
        assert_eq!(render_csv(&[]), "Task Name,Time Spent (hours)\n");
    }

    #[test]
    fn quotes_names_that_would_break_columns() {
        let csv = render_csv(&[task("Review, part \"two\"", 3600)]);
        assert_eq!(
            csv.lines().nth(1),
            Some("\"Review, part \"\"two\"\"\",1.00")
        );
    }

    #[test]
    fn business_day_rolls_over_at_half_past_five() {
        // 23:59 UTC is 05:29 next day at +05:30, still the previous business day.
        let before = Utc.with_ymd_and_hms(2026, 3, 9, 23, 59, 0).unwrap();
        assert_eq!(business_day(before), NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());

        // 00:00 UTC is 05:30 at +05:30.
        let at_cutoff = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(business_day(at_cutoff), NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());

        // 19:00 UTC is 00:30 next day at +05:30.
        let after_midnight = Utc.with_ymd_and_hms(2026, 3, 1, 19, 0, 0).unwrap();
        assert_eq!(business_day(after_midnight), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn file_name_uses_business_day() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(export_file_name(now), "task_time_log_2026-01-01.csv");

        let early = Utc.with_ymd_and_hms(2025, 12, 31, 20, 0, 0).unwrap();
        assert_eq!(export_file_name(early), "task_time_log_2025-12-31.csv");
    }

    #[test]
    fn writes_export_into_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let out = dir.path().join("exports");

        let path = write_export(&out, &[task("Writing", 1800)], now).expect("export");
        assert_eq!(path, out.join("task_time_log_2026-01-01.csv"));
        let written = std::fs::read_to_string(path).expect("read export");
        assert_eq!(written, "Task Name,Time Spent (hours)\nWriting,0.50\n");
    }
}
