//! classfeed - classroom stream snapshots to typed data, plus consolidation of
//! duplicated hosted-document links.
//!
//! The extraction side turns a saved stream page into [`StreamItem`]s,
//! buckets them by week and renders a TypeScript module. The consolidation
//! side groups content-equivalent Drive links, matches them to local files
//! and rewrites the page to point at canonical copies.

pub mod attachments;
pub mod codegen;
pub mod config;
pub mod consolidate;
pub mod content;
pub mod dates;
pub mod error;
pub mod extract;
pub mod links;
pub mod logging;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod rewrite;
pub mod similarity;
pub mod weekly;

pub use codegen::serialize;
pub use config::Config;
pub use consolidate::{consolidate, ConsolidationStats, ReferenceMap};
pub use error::{Error, ExtractError, Result};
pub use extract::{extract_records, extract_with_stats, ExtractionStats};
pub use links::discover_links;
pub use matcher::{list_directory, match_local_file, verify_associations, LocalFile, MatchOutcome};
pub use model::{
    Attachment, AttachmentKind, ConsolidatedRecord, DriveLink, ItemKind, StreamItem, WeekBucket,
};
pub use normalize::normalize;
pub use rewrite::rewrite_links;
pub use weekly::aggregate_by_week;
