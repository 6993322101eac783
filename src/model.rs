use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_AUTHOR: &str = "Unknown Author";
pub const UNTITLED_ATTACHMENT: &str = "Untitled Attachment";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    Announcement,
    Assignment,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::Announcement, ItemKind::Assignment];

    /// Enum member name in generated code.
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Announcement => "ANNOUNCEMENT",
            ItemKind::Assignment => "ASSIGNMENT",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of attachment kinds. `Link` is the fallback when no detection
/// strategy recognises the resource.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentKind {
    Pdf,
    Video,
    Document,
    Image,
    Link,
}

impl AttachmentKind {
    pub const ALL: [AttachmentKind; 5] = [
        AttachmentKind::Pdf,
        AttachmentKind::Video,
        AttachmentKind::Document,
        AttachmentKind::Image,
        AttachmentKind::Link,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::Pdf => "PDF",
            AttachmentKind::Video => "VIDEO",
            AttachmentKind::Document => "DOCUMENT",
            AttachmentKind::Image => "IMAGE",
            AttachmentKind::Link => "LINK",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub title: String,
    pub target: String,
}

/// One announcement or assignment post.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StreamItem {
    pub id: String,
    pub kind: ItemKind,
    pub author: String,
    /// Date text as found in the markup, possibly empty.
    pub date: String,
    pub deleted: bool,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WeekBucket {
    pub label: String,
    pub start: NaiveDate,
    /// Newest first.
    pub items: Vec<StreamItem>,
}

/// A hosted-document link found in the markup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DriveLink {
    pub identifier: String,
    pub reference: String,
    pub display_name: String,
    pub declared_types: BTreeSet<String>,
}

/// The representative of a group of content-equivalent links.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConsolidatedRecord {
    pub signature: String,
    pub display_name: String,
    pub identifier: String,
    /// Original reference of the member that supplied `identifier`.
    pub reference: String,
    pub original_names: Vec<String>,
    pub all_identifiers: Vec<String>,
    pub all_references: Vec<String>,
    pub declared_types: BTreeSet<String>,
    pub member_count: usize,
}
