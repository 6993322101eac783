//! TypeScript module generation.
//!
//! Output is a pure function of the buckets: no timestamps, maps iterate in
//! key order. Free text is always embedded as template literals.

use std::collections::BTreeMap;

use crate::model::{AttachmentKind, ItemKind, StreamItem, WeekBucket};

const HEADER: &str = "// Generated by classfeed. Do not edit by hand.\n\n";

const INTERFACES: &str = r#"export interface Attachment {
  type: AttachmentType;
  title: string;
  url: string;
}

export interface StreamItem {
  id: string;
  type: StreamItemType;
  author: string;
  date: string;
  is_deleted: boolean;
  content: string;
  attachments: Attachment[];
}

export interface WeeklyData {
  display_name: string;
  items: StreamItem[];
}
"#;

const ACCESSORS: &str = r#"export function get_week_data(week_key: string): WeeklyData | undefined {
  return classroom_data[week_key];
}

export function get_all_items(): StreamItem[] {
  const items: StreamItem[] = [];
  for (const key of Object.keys(classroom_data)) {
    items.push(...classroom_data[key].items);
  }
  return items;
}

export function get_items_by_type(type: StreamItemType): StreamItem[] {
  return get_all_items().filter((item) => item.type === type);
}

export function get_items_by_author(author: string): StreamItem[] {
  return get_all_items().filter((item) => item.author === author);
}

export function search_items(query: string): StreamItem[] {
  const needle = query.toLowerCase();
  return get_all_items().filter(
    (item) =>
      item.content.toLowerCase().indexOf(needle) !== -1 ||
      item.author.toLowerCase().indexOf(needle) !== -1 ||
      item.attachments.some((a) => a.title.toLowerCase().indexOf(needle) !== -1),
  );
}
"#;

/// Escape text for a template literal body. Backslashes go first so the
/// escapes added afterwards are not doubled.
pub fn escape_template(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn template(text: &str) -> String {
    format!("`{}`", escape_template(text))
}

fn quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn enum_block(name: &str, members: &[&str]) -> String {
    let mut out = format!("export enum {} {{\n", name);
    for member in members {
        out.push_str(&format!("  {0} = \"{0}\",\n", member));
    }
    out.push_str("}\n");
    out
}

fn render_item(item: &StreamItem, out: &mut String) {
    out.push_str("      {\n");
    out.push_str(&format!("        id: {},\n", template(&item.id)));
    out.push_str(&format!("        type: StreamItemType.{},\n", item.kind.as_str()));
    out.push_str(&format!("        author: {},\n", template(&item.author)));
    out.push_str(&format!("        date: {},\n", template(&item.date)));
    out.push_str(&format!("        is_deleted: {},\n", item.deleted));
    out.push_str(&format!("        content: {},\n", template(&item.body)));
    if item.attachments.is_empty() {
        out.push_str("        attachments: [],\n");
    } else {
        out.push_str("        attachments: [\n");
        for attachment in &item.attachments {
            out.push_str(&format!(
                "          {{ type: AttachmentType.{}, title: {}, url: {} }},\n",
                attachment.kind.as_str(),
                template(&attachment.title),
                template(&attachment.target),
            ));
        }
        out.push_str("        ],\n");
    }
    out.push_str("      },\n");
}

/// Render week buckets as a self-contained TypeScript module.
pub fn serialize(buckets: &BTreeMap<String, WeekBucket>) -> String {
    let item_count: usize = buckets.values().map(|b| b.items.len()).sum();
    let attachment_count: usize = buckets
        .values()
        .flat_map(|b| &b.items)
        .map(|i| i.attachments.len())
        .sum();

    let mut out = String::from(HEADER);

    let kinds: Vec<&str> = ItemKind::ALL.iter().map(|k| k.as_str()).collect();
    out.push_str(&enum_block("StreamItemType", &kinds));
    out.push('\n');
    let attachment_kinds: Vec<&str> = AttachmentKind::ALL.iter().map(|k| k.as_str()).collect();
    out.push_str(&enum_block("AttachmentType", &attachment_kinds));
    out.push('\n');
    out.push_str(INTERFACES);
    out.push('\n');

    out.push_str("export const parser_stats = {\n");
    out.push_str(&format!("  total_weeks: {},\n", buckets.len()));
    out.push_str(&format!("  total_items: {},\n", item_count));
    out.push_str(&format!("  total_attachments: {},\n", attachment_count));
    out.push_str("};\n\n");

    out.push_str("export const classroom_data: Record<string, WeeklyData> = {\n");
    for (key, bucket) in buckets {
        out.push_str(&format!("  {}: {{\n", quoted(key)));
        out.push_str(&format!("    display_name: {},\n", template(&bucket.label)));
        if bucket.items.is_empty() {
            out.push_str("    items: [],\n");
        } else {
            out.push_str("    items: [\n");
            for item in &bucket.items {
                render_item(item, &mut out);
            }
            out.push_str("    ],\n");
        }
        out.push_str("  },\n");
    }
    out.push_str("};\n\n");

    out.push_str(ACCESSORS);
    out.push('\n');

    let keys: Vec<String> = buckets.keys().map(|k| quoted(k)).collect();
    out.push_str("export const debug_info: { week_keys: string[] } = {\n");
    out.push_str(&format!("  week_keys: [{}],\n", keys.join(", ")));
    out.push_str("};\n");

    out
}
