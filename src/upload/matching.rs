// src/upload/matching.rs - filename matching between uploads and active jobs
use fleet_shared::StatusSnapshot;

use crate::accounting::is_job_active_label;

fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Filesystem-safe form of an uploaded filename: path stripped, anything outside
/// `[A-Za-z0-9._-]` replaced by `_`, leading and trailing `.`/`_` removed.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = basename(name.trim())
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    replaced.trim_matches(['.', '_']).to_string()
}

/// Lowercase name without directory or extension.
pub fn file_stem(name: &str) -> String {
    let base = basename(name.trim());
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };
    stem.trim().to_lowercase()
}

/// Identity of a pending upload within one printer.
pub fn pending_key(filename: &str) -> String {
    file_stem(filename)
}

/// Whether a backend's job name refers to the uploaded `filename`.
pub fn job_matches_filename(job_name: &str, filename: &str) -> bool {
    let job = job_name.trim();
    let file = filename.trim();
    if job.is_empty() || file.is_empty() {
        return false;
    }
    if job.eq_ignore_ascii_case(file) {
        return true;
    }
    let stem = file_stem(file);
    if !stem.is_empty() && stem == file_stem(job) {
        return true;
    }
    let sanitized = sanitize_filename(file);
    !sanitized.is_empty() && job == sanitized
}

/// A snapshot confirms an upload when a job is active and its name (or label) matches.
pub fn snapshot_confirms(snapshot: &StatusSnapshot, filename: &str) -> bool {
    if !is_job_active_label(&snapshot.label) {
        return false;
    }
    snapshot
        .job_name
        .as_deref()
        .is_some_and(|job| job_matches_filename(job, filename))
        || job_matches_filename(&snapshot.label, filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_shared::Severity;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Part (v2).gcode"), "My_Part__v2_.gcode");
        assert_eq!(sanitize_filename("C:\\jobs\\bracket.gcode"), "bracket.gcode");
        assert_eq!(sanitize_filename("../.hidden"), "hidden");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("gcodes/Benchy.GCODE"), "benchy");
        assert_eq!(file_stem(".profile"), ".profile");
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
    }

    #[test]
    fn test_job_matching_rules() {
        assert!(job_matches_filename("BENCHY.gcode", "benchy.gcode"));
        assert!(job_matches_filename("subdir/benchy.gcode", "Benchy.gcode"));
        assert!(job_matches_filename("benchy", "benchy.gcode"));
        assert!(job_matches_filename("My_Part__v2_.gcode", "My Part (v2).gcode"));
        assert!(!job_matches_filename("other.gcode", "benchy.gcode"));
        assert!(!job_matches_filename("", "benchy.gcode"));
    }

    #[test]
    fn test_snapshot_confirms_requires_active_job() {
        let mut snapshot = StatusSnapshot::new("Printing", Severity::Ok);
        snapshot.job_name = Some("benchy.gcode".to_string());
        assert!(snapshot_confirms(&snapshot, "Benchy.gcode"));

        snapshot.label = "Standby".to_string();
        assert!(!snapshot_confirms(&snapshot, "Benchy.gcode"));
    }
}
