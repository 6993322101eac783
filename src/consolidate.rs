//! Content-based consolidation of hosted-document links.
//!
//! Links whose cleaned, normalised name and declared type set agree are one
//! logical document. Each group gets one canonical record and every member
//! reference is mapped to the canonical member's reference.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{ConsolidatedRecord, DriveLink};
use crate::normalize::normalize;

/// Service-type suffixes removed from the end of display names, in order.
const SERVICE_SUFFIXES: &[&str] = &[
    "Google Docs",
    "Google Doc",
    "Google Sheets",
    "Google Sheet",
    "Google Slides",
    "Google Slide",
    "PDF",
    "Video",
    "Document",
    "Spreadsheet",
    "Presentation",
];

const DOUBLED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "mp4", "avi", "mov"];

/// Substrings that mark a name as still carrying service noise.
const NOISY_SUBSTRINGS: &[&str] = &["google docs", "pdf", "video", "document"];
const GENERIC_NAMES: &[&str] = &["untitled", "document", "file", "sheet"];

const CLEAN_NAME_BONUS: i64 = 20;
const GENERIC_NAME_PENALTY: i64 = 50;
const MULTI_WORD_BONUS: i64 = 10;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationStats {
    pub total_original_links: usize,
    pub unique_content_groups: usize,
    pub duplicate_groups: usize,
    pub duplicates_removed: usize,
}

impl ConsolidationStats {
    /// Share of links removed as duplicates, 0 for empty input.
    pub fn reduction_percent(&self) -> f64 {
        if self.total_original_links == 0 {
            return 0.0;
        }
        self.duplicates_removed as f64 / self.total_original_links as f64 * 100.0
    }
}

/// Original reference -> canonical reference.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ReferenceMap(BTreeMap<String, String>);

impl ReferenceMap {
    pub fn get(&self, reference: &str) -> Option<&str> {
        self.0.get(reference).map(String::as_str)
    }

    pub fn insert(&mut self, original: String, canonical: String) {
        self.0.insert(original, canonical);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Point every member reference of `record` at `new_reference`, typically
    /// the location of the re-uploaded canonical copy. Returns how many
    /// entries changed.
    pub fn retarget(&mut self, record: &ConsolidatedRecord, new_reference: &str) -> usize {
        let mut changed = 0;
        for reference in &record.all_references {
            let previous = self.0.insert(reference.clone(), new_reference.to_string());
            if previous.as_deref() != Some(new_reference) {
                changed += 1;
            }
        }
        changed
    }
}

/// A duplicate group as shown in consolidation reports.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub signature: String,
    pub canonical_name: String,
    pub selected_identifier: String,
    pub duplicate_count: usize,
    pub all_identifiers: Vec<String>,
    pub original_names: Vec<String>,
    pub original_references: Vec<String>,
    pub declared_types: Vec<String>,
}

/// Display name with trailing service-type suffixes, doubled extensions and
/// trailing dots or spaces removed.
pub fn clean_display_name(name: &str) -> String {
    let mut cleaned = name.to_string();
    for suffix in SERVICE_SUFFIXES {
        if let Some(rest) = cleaned.strip_suffix(suffix) {
            cleaned = rest.trim().to_string();
        }
    }
    let deduped = dedup_extension(&cleaned);
    deduped.trim_end_matches(['.', ' ']).to_string()
}

/// "notes.pdf.pdf" and "notes.pdfpdf" become "notes.pdf".
fn dedup_extension(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower.len() != name.len() {
        return name.to_string();
    }
    for ext in DOUBLED_EXTENSIONS {
        for doubled in [format!(".{ext}.{ext}"), format!(".{ext}{ext}")] {
            if lower.ends_with(&doubled) {
                let start = name.len() - doubled.len();
                return format!("{}{}", &name[..start], &name[start..start + ext.len() + 1]);
            }
        }
    }
    name.to_string()
}

fn name_score(name: &str) -> i64 {
    let lower = name.to_lowercase();
    let mut score = name.chars().count() as i64;
    if !NOISY_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        score += CLEAN_NAME_BONUS;
    }
    if GENERIC_NAMES.contains(&lower.as_str()) {
        score -= GENERIC_NAME_PENALTY;
    }
    if name.split_whitespace().count() > 1 {
        score += MULTI_WORD_BONUS;
    }
    score
}

/// Best display name among a group's names. Ties go to the earliest name; an
/// empty winner falls back to the first original name.
pub fn select_best_name(names: &[String]) -> String {
    let mut best: Option<(i64, String)> = None;
    for name in names {
        let cleaned = clean_display_name(name);
        let score = name_score(&cleaned);
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, cleaned));
        }
    }

    match best {
        Some((_, name)) if !name.trim().is_empty() => name,
        _ => names.first().cloned().unwrap_or_default(),
    }
}

/// Equivalence key of a link: normalised cleaned name and sorted types.
pub fn signature(link: &DriveLink) -> String {
    let types: Vec<&str> = link.declared_types.iter().map(String::as_str).collect();
    format!("{}|{}", normalize(&clean_display_name(&link.display_name)), types.join(","))
}

/// Group links by content and build one canonical record per group.
/// Groups come out in order of first appearance.
pub fn consolidate(links: &[DriveLink]) -> (Vec<ConsolidatedRecord>, ReferenceMap, ConsolidationStats) {
    let mut index: AHashMap<String, usize> = AHashMap::new();
    let mut groups: Vec<(String, Vec<&DriveLink>)> = Vec::new();
    for link in links {
        let sig = signature(link);
        match index.get(&sig) {
            Some(&i) => groups[i].1.push(link),
            None => {
                index.insert(sig.clone(), groups.len());
                groups.push((sig, vec![link]));
            }
        }
    }

    let (records, mapping, stats) = build(groups, links.len());
    info!(
        links = stats.total_original_links,
        groups = stats.unique_content_groups,
        removed = stats.duplicates_removed,
        "links consolidated"
    );
    (records, mapping, stats)
}

/// Every link as its own group, for runs that skip deduplication.
pub fn identity_consolidation(links: &[DriveLink]) -> (Vec<ConsolidatedRecord>, ReferenceMap, ConsolidationStats) {
    let groups = links.iter().map(|link| (signature(link), vec![link])).collect();
    build(groups, links.len())
}

fn build(
    groups: Vec<(String, Vec<&DriveLink>)>,
    total: usize,
) -> (Vec<ConsolidatedRecord>, ReferenceMap, ConsolidationStats) {
    let mut stats = ConsolidationStats {
        total_original_links: total,
        unique_content_groups: groups.len(),
        ..ConsolidationStats::default()
    };
    let mut mapping = ReferenceMap::default();
    let mut records = Vec::with_capacity(groups.len());

    for (sig, members) in groups {
        let Some(canonical) = canonical_member(&members) else {
            continue;
        };
        if members.len() > 1 {
            stats.duplicate_groups += 1;
            stats.duplicates_removed += members.len() - 1;
            debug!(signature = %sig, members = members.len(), id = %canonical.identifier, "duplicate group");
        }

        let original_names: Vec<String> = members.iter().map(|l| l.display_name.clone()).collect();
        let declared_types: BTreeSet<String> = members
            .iter()
            .flat_map(|l| l.declared_types.iter().cloned())
            .collect();

        for member in &members {
            mapping.insert(member.reference.clone(), canonical.reference.clone());
        }

        records.push(ConsolidatedRecord {
            signature: sig,
            display_name: select_best_name(&original_names),
            identifier: canonical.identifier.clone(),
            reference: canonical.reference.clone(),
            all_identifiers: members.iter().map(|l| l.identifier.clone()).collect(),
            all_references: members.iter().map(|l| l.reference.clone()).collect(),
            original_names,
            declared_types,
            member_count: members.len(),
        });
    }

    (records, mapping, stats)
}

/// Member with the most declared types; the earliest wins ties.
fn canonical_member<'a>(members: &[&'a DriveLink]) -> Option<&'a DriveLink> {
    let mut best: Option<&'a DriveLink> = None;
    for &member in members {
        if best.map_or(true, |b| member.declared_types.len() > b.declared_types.len()) {
            best = Some(member);
        }
    }
    best
}

/// One row per group that actually had duplicates.
pub fn report_rows(records: &[ConsolidatedRecord]) -> Vec<ReportRow> {
    records
        .iter()
        .filter(|r| r.member_count > 1)
        .map(|r| ReportRow {
            signature: r.signature.clone(),
            canonical_name: r.display_name.clone(),
            selected_identifier: r.identifier.clone(),
            duplicate_count: r.member_count,
            all_identifiers: r.all_identifiers.clone(),
            original_names: r.original_names.clone(),
            original_references: r.all_references.clone(),
            declared_types: r.declared_types.iter().cloned().collect(),
        })
        .collect()
}
