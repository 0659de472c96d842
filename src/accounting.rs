// src/accounting.rs - print-time delta accounting across poll cycles
use std::collections::HashMap;

use chrono::NaiveDate;
use fleet_shared::{PrintTime, PrinterRecord, StatusSnapshot};
use serde::Serialize;

/// Fleet-wide print time after an accounting pass, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PrintTimeSummary {
    pub today_seconds: f64,
    pub total_seconds: f64,
}

pub fn is_printing_label(label: &str) -> bool {
    label.to_lowercase().contains("printing")
}

pub fn is_job_active_label(label: &str) -> bool {
    let lowered = label.to_lowercase();
    ["printing", "paused", "pausing", "resuming"]
        .iter()
        .any(|token| lowered.contains(token))
}

/// Apply one poll cycle's snapshots to the accounting fields of `printers`.
///
/// Must not run concurrently over the same records: each pass diffs against the previous sample,
/// so two passes over the same snapshots would count the same seconds twice.
pub fn update_print_time_totals(
    printers: &mut [PrinterRecord],
    statuses: &HashMap<i64, StatusSnapshot>,
    today: NaiveDate,
) -> PrintTimeSummary {
    let mut summary = PrintTimeSummary::default();
    for printer in printers.iter_mut() {
        let time = &mut printer.print_time;
        roll_day(time, today);
        if let Some(snapshot) = statuses.get(&printer.id) {
            apply_sample(time, snapshot);
        }
        summary.today_seconds += time.today_seconds;
        summary.total_seconds += time.total_seconds;
    }
    summary
}

/// [`update_print_time_totals`] against the local calendar date.
pub fn update_print_time_totals_now(
    printers: &mut [PrinterRecord],
    statuses: &HashMap<i64, StatusSnapshot>,
) -> PrintTimeSummary {
    update_print_time_totals(printers, statuses, chrono::Local::now().date_naive())
}

fn roll_day(time: &mut PrintTime, today: NaiveDate) {
    if time.today_date != Some(today) {
        time.today_date = Some(today);
        time.today_seconds = 0.0;
    }
}

fn apply_sample(time: &mut PrintTime, snapshot: &StatusSnapshot) {
    let elapsed = snapshot.elapsed.filter(|e| e.is_finite() && *e >= 0.0);
    let job_name = snapshot
        .job_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let printing = is_printing_label(&snapshot.label);
    let job_active = is_job_active_label(&snapshot.label);

    match elapsed {
        Some(elapsed) if printing => {
            let last_name = time.last_job_name.as_deref().filter(|n| !n.trim().is_empty());
            let delta = match time.last_elapsed {
                Some(last) if job_name == last_name && elapsed >= last => elapsed - last,
                _ => elapsed,
            };
            if delta > 0.0 {
                time.total_seconds += delta;
                time.today_seconds += delta;
            }
            remember(time, elapsed, job_name);
        }
        // paused time does not accrue; keep the anchor for when printing resumes
        Some(elapsed) if job_active => remember(time, elapsed, job_name),
        _ if job_active => {}
        _ => {
            time.last_elapsed = None;
            time.last_job_name = None;
        }
    }
}

fn remember(time: &mut PrintTime, elapsed: f64, job_name: Option<&str>) {
    time.last_elapsed = Some(elapsed);
    if let Some(name) = job_name {
        time.last_job_name = Some(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_shared::{BackendKind, Severity};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn printer(last_elapsed: Option<f64>, last_job: Option<&str>) -> PrinterRecord {
        let mut record = PrinterRecord::new(1, "Voron", BackendKind::Moonraker, "10.0.0.2", 7125);
        record.print_time = PrintTime {
            total_seconds: 1000.0,
            today_seconds: 100.0,
            today_date: Some(day(19)),
            last_elapsed,
            last_job_name: last_job.map(str::to_string),
        };
        record
    }

    fn status(label: &str, job: Option<&str>, elapsed: Option<f64>) -> HashMap<i64, StatusSnapshot> {
        let mut snapshot = StatusSnapshot::new(label, Severity::Ok);
        snapshot.job_name = job.map(str::to_string);
        snapshot.elapsed = elapsed;
        HashMap::from([(1, snapshot)])
    }

    #[test]
    fn test_same_job_continuation_adds_difference() {
        let mut printers = vec![printer(Some(120.0), Some("a.gcode"))];
        let summary = update_print_time_totals(&mut printers, &status("Printing", Some("a.gcode"), Some(150.0)), day(19));
        assert_eq!(printers[0].print_time.total_seconds, 1030.0);
        assert_eq!(printers[0].print_time.today_seconds, 130.0);
        assert_eq!(printers[0].print_time.last_elapsed, Some(150.0));
        assert_eq!(summary, PrintTimeSummary { today_seconds: 130.0, total_seconds: 1030.0 });
    }

    #[test]
    fn test_job_change_counts_fresh_session() {
        let mut printers = vec![printer(Some(500.0), Some("a.gcode"))];
        update_print_time_totals(&mut printers, &status("Printing", Some("b.gcode"), Some(10.0)), day(19));
        assert_eq!(printers[0].print_time.total_seconds, 1010.0);
        assert_eq!(printers[0].print_time.last_job_name.as_deref(), Some("b.gcode"));
    }

    #[test]
    fn test_elapsed_going_backwards_is_fresh_session() {
        let mut printers = vec![printer(Some(500.0), Some("a.gcode"))];
        update_print_time_totals(&mut printers, &status("Printing", Some("a.gcode"), Some(20.0)), day(19));
        assert_eq!(printers[0].print_time.total_seconds, 1020.0);
    }

    #[test]
    fn test_unnamed_jobs_diff_against_each_other() {
        let mut printers = vec![printer(Some(60.0), None)];
        update_print_time_totals(&mut printers, &status("Printing", None, Some(90.0)), day(19));
        assert_eq!(printers[0].print_time.total_seconds, 1030.0);
    }

    #[test]
    fn test_name_appearing_is_fresh_session() {
        let mut printers = vec![printer(Some(60.0), None)];
        update_print_time_totals(&mut printers, &status("Printing", Some("a.gcode"), Some(90.0)), day(19));
        assert_eq!(printers[0].print_time.total_seconds, 1090.0);
    }

    #[test]
    fn test_daily_rollover_resets_before_delta() {
        let mut printers = vec![printer(Some(120.0), Some("a.gcode"))];
        update_print_time_totals(&mut printers, &status("Printing", Some("a.gcode"), Some(150.0)), day(20));
        assert_eq!(printers[0].print_time.today_date, Some(day(20)));
        assert_eq!(printers[0].print_time.today_seconds, 30.0);
        assert_eq!(printers[0].print_time.total_seconds, 1030.0);
    }

    #[test]
    fn test_paused_keeps_anchor_without_accruing() {
        let mut printers = vec![printer(Some(120.0), Some("a.gcode"))];
        update_print_time_totals(&mut printers, &status("Paused", Some("a.gcode"), Some(130.0)), day(19));
        assert_eq!(printers[0].print_time.total_seconds, 1000.0);
        assert_eq!(printers[0].print_time.last_elapsed, Some(130.0));

        update_print_time_totals(&mut printers, &status("Printing", Some("a.gcode"), Some(160.0)), day(19));
        assert_eq!(printers[0].print_time.total_seconds, 1030.0);
    }

    #[test]
    fn test_idle_clears_baseline() {
        let mut printers = vec![printer(Some(120.0), Some("a.gcode"))];
        update_print_time_totals(&mut printers, &status("Complete", Some("a.gcode"), Some(3600.0)), day(19));
        assert_eq!(printers[0].print_time.last_elapsed, None);
        assert_eq!(printers[0].print_time.last_job_name, None);
        assert_eq!(printers[0].print_time.total_seconds, 1000.0);
    }

    #[test]
    fn test_missing_snapshot_only_rolls_day() {
        let mut printers = vec![printer(Some(120.0), Some("a.gcode"))];
        let summary = update_print_time_totals(&mut printers, &HashMap::new(), day(21));
        assert_eq!(printers[0].print_time.last_elapsed, Some(120.0));
        assert_eq!(summary.today_seconds, 0.0);
        assert_eq!(summary.total_seconds, 1000.0);
    }

    #[test]
    fn test_negative_elapsed_is_ignored() {
        let mut printers = vec![printer(Some(120.0), Some("a.gcode"))];
        update_print_time_totals(&mut printers, &status("Printing", Some("a.gcode"), Some(-5.0)), day(19));
        assert_eq!(printers[0].print_time.total_seconds, 1000.0);
        assert_eq!(printers[0].print_time.last_elapsed, Some(120.0));
    }

    #[test]
    fn test_label_classifiers() {
        assert!(is_printing_label("Printing"));
        assert!(!is_printing_label("Paused"));
        assert!(is_job_active_label("Resuming"));
        assert!(!is_job_active_label("Ready"));
    }
}
