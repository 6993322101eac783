//! Matching consolidated records against files already on disk.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::Result;
use crate::model::ConsolidatedRecord;
use crate::similarity::{accepts, score};

/// Display names too generic to match on.
const GENERIC_NAMES: &[&str] = &["drive file", "untitled", "file", ""];

/// A regular file in the downloads directory.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl LocalFile {
    /// Listing entry for a bare name, without touching the filesystem.
    pub fn named(dir: &Path, name: &str) -> LocalFile {
        LocalFile {
            path: dir.join(name),
            name: name.to_string(),
            size: 0,
            modified: None,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched { path: PathBuf, score: f64 },
    /// Nothing cleared the threshold. `best_score` is `None` for an empty
    /// listing.
    NoMatch { best_score: Option<f64> },
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }
}

/// Regular files directly inside `dir`, in walk order. A missing directory
/// is an empty listing.
pub fn list_directory(dir: &Path) -> Result<Vec<LocalFile>> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "downloads directory missing");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata()?;
        files.push(LocalFile {
            path: entry.path().to_path_buf(),
            name: entry.file_name().to_string_lossy().to_string(),
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }
    Ok(files)
}

/// Best local file for a record.
///
/// Candidates are ranked by score with a stable sort, so equal scores keep
/// listing order. Listing order comes from the filesystem and is not
/// otherwise specified; ties between equally named files can therefore
/// resolve differently across machines.
pub fn match_local_file(record: &ConsolidatedRecord, listing: &[LocalFile]) -> MatchOutcome {
    let mut ranked: Vec<(f64, &LocalFile)> = listing
        .iter()
        .map(|file| {
            let s = score(
                &record.display_name,
                Some(&record.identifier),
                &record.declared_types,
                &file.name,
            );
            (s, file)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    for (s, file) in ranked.iter().take(5) {
        debug!(target_name = %record.display_name, candidate = %file.name, score = s, "match candidate");
    }

    match ranked.first() {
        Some(&(best, file)) if accepts(best) => MatchOutcome::Matched {
            path: file.path.clone(),
            score: best,
        },
        Some(&(best, _)) => MatchOutcome::NoMatch { best_score: Some(best) },
        None => MatchOutcome::NoMatch { best_score: None },
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Association {
    pub name: String,
    pub path: PathBuf,
    pub score: f64,
    pub member_count: usize,
    pub declared_types: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MissingFile {
    pub name: String,
    pub identifier: String,
    pub reference: String,
    pub best_score: Option<f64>,
    pub member_count: usize,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct AssociationReport {
    pub matched: Vec<Association>,
    pub missing: Vec<MissingFile>,
    /// Records skipped for having a generic name.
    pub skipped: Vec<String>,
}

impl AssociationReport {
    /// Original links that a matched local file stands in for.
    pub fn links_covered(&self) -> usize {
        self.matched.iter().map(|a| a.member_count).sum()
    }

    pub fn links_missing(&self) -> usize {
        self.missing.iter().map(|m| m.member_count).sum()
    }
}

fn is_generic(name: &str) -> bool {
    GENERIC_NAMES.contains(&name.trim().to_lowercase().as_str())
}

/// Match every record against the listing.
pub fn verify_associations(records: &[ConsolidatedRecord], listing: &[LocalFile]) -> AssociationReport {
    let mut report = AssociationReport::default();

    for record in records {
        if is_generic(&record.display_name) {
            debug!(name = %record.display_name, "skipping generic name");
            report.skipped.push(record.display_name.clone());
            continue;
        }

        match match_local_file(record, listing) {
            MatchOutcome::Matched { path, score } => report.matched.push(Association {
                name: record.display_name.clone(),
                path,
                score,
                member_count: record.member_count,
                declared_types: record.declared_types.iter().cloned().collect(),
            }),
            MatchOutcome::NoMatch { best_score } => report.missing.push(MissingFile {
                name: record.display_name.clone(),
                identifier: record.identifier.clone(),
                reference: record.reference.clone(),
                best_score,
                member_count: record.member_count,
            }),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn record(name: &str, id: &str, types: &[&str], members: usize) -> ConsolidatedRecord {
        ConsolidatedRecord {
            signature: String::new(),
            display_name: name.to_string(),
            identifier: id.to_string(),
            reference: format!("https://drive.google.com/file/d/{}/view", id),
            original_names: vec![name.to_string()],
            all_identifiers: vec![id.to_string()],
            all_references: vec![],
            declared_types: types.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            member_count: members,
        }
    }

    fn listing(names: &[&str]) -> Vec<LocalFile> {
        names.iter().map(|n| LocalFile::named(Path::new("dl"), n)).collect()
    }

    #[test]
    fn test_picks_best_candidate() {
        let files = listing(&["Holiday photos.zip", "Chapter 1 notes.pdf", "Chapter 1 notes.docx"]);
        let outcome = match_local_file(&record("Chapter 1 notes", "Q7", &["pdf"], 1), &files);
        match outcome {
            MatchOutcome::Matched { path, score } => {
                assert_eq!(path, Path::new("dl").join("Chapter 1 notes.pdf"));
                assert!((score - 1.3).abs() < 1e-9);
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_no_match_reports_best_score() {
        let files = listing(&["zzzz.bin"]);
        let outcome = match_local_file(&record("Syllabus", "Q", &[], 1), &files);
        match outcome {
            MatchOutcome::NoMatch { best_score: Some(s) } => assert!(s <= 0.3),
            other => panic!("expected no match, got {:?}", other),
        }
        assert_eq!(
            match_local_file(&record("Syllabus", "Q", &[], 1), &[]),
            MatchOutcome::NoMatch { best_score: None }
        );
    }

    #[test]
    fn test_threshold_boundary() {
        // One shared block of 3 over 20 characters scores exactly 0.3.
        let files = listing(&["abcklmnopq"]);
        let outcome = match_local_file(&record("abcdefghij", "", &[], 1), &files);
        assert_eq!(outcome, MatchOutcome::NoMatch { best_score: Some(0.3) });

        // A shared block of 4 scores 0.4.
        let files = listing(&["abcdklmnop"]);
        assert!(match_local_file(&record("abcdefghij", "", &[], 1), &files).is_match());
    }

    #[test]
    fn test_equal_scores_keep_listing_order() {
        let files = listing(&["Report.pdf", "report.PDF"]);
        match match_local_file(&record("report", "", &[], 1), &files) {
            MatchOutcome::Matched { path, .. } => assert_eq!(path, Path::new("dl").join("Report.pdf")),
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_list_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.pdf"), b"hello").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("b.pdf"), b"x").unwrap();

        let files = list_directory(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.pdf");
        assert_eq!(files[0].size, 5);
        assert!(files[0].modified.is_some());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let files = list_directory(&dir.path().join("nope")).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_verify_associations() {
        let files = listing(&["Syllabus.docx", "Lab 2.pdf"]);
        let records = vec![
            record("Syllabus", "A", &["google docs"], 3),
            record("Untitled", "B", &[], 1),
            record("Field trip permission", "C9", &[], 2),
        ];
        let report = verify_associations(&records, &files);

        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.matched[0].name, "Syllabus");
        assert_eq!(report.skipped, ["Untitled"]);
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].identifier, "C9");
        assert_eq!(report.links_covered(), 3);
        assert_eq!(report.links_missing(), 2);
    }
}
