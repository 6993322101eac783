use clap::{Parser, Subcommand};
use colored::Colorize;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use classfeed::config::Config;
use classfeed::consolidate::{self, report_rows, ConsolidationStats, ReferenceMap};
use classfeed::error::Error;
use classfeed::extract::{extract_with_stats, ExtractionStats};
use classfeed::logging::init_logging;
use classfeed::matcher::{list_directory, verify_associations};
use classfeed::model::ConsolidatedRecord;
use classfeed::{aggregate_by_week, discover_links, rewrite_links, serialize, DriveLink};

/// classfeed - Classroom stream snapshots to typed data, and Drive link consolidation
#[derive(Parser)]
#[command(name = "classfeed")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".classfeed.toml")]
    config: PathBuf,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract stream items from a saved page and generate a TypeScript module
    Parse {
        /// Saved page, or a directory of saved pages
        input: PathBuf,

        /// Output file (single page) or directory (batch)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Input file patterns for batch mode (can be repeated)
        #[arg(short, long, default_values_t = vec!["*.html".to_string(), "*.htm".to_string()])]
        pattern: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List hosted-document links and group duplicates
    Links {
        /// Saved page
        html: PathBuf,

        /// Treat every link as unique
        #[arg(long)]
        no_consolidation: bool,

        /// Write the reference mapping as JSON
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Write the consolidation report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Match consolidated links against downloaded files
    Match {
        /// Saved page
        html: PathBuf,

        /// Directory holding downloaded copies
        #[arg(short, long, default_value = "downloads")]
        downloads: PathBuf,

        /// Treat every link as unique
        #[arg(long)]
        no_consolidation: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite link targets in a saved page from a reference mapping
    Rewrite {
        /// Saved page
        html: PathBuf,

        /// Mapping JSON (original reference -> new reference)
        #[arg(short, long)]
        mapping: PathBuf,

        /// Output file (default: <stem>_updated.html next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let result = match cli.command {
        Commands::Parse { input, output, pattern, json } => {
            cmd_parse(&input, output.as_deref(), &pattern, json, &cli.config, cli.quiet)
        }
        Commands::Links { html, no_consolidation, mapping, report, json } => {
            cmd_links(&html, no_consolidation, mapping.as_deref(), report.as_deref(), json)
        }
        Commands::Match { html, downloads, no_consolidation, json } => {
            cmd_match(&html, &downloads, no_consolidation, json)
        }
        Commands::Rewrite { html, mapping, output } => {
            cmd_rewrite(&html, &mapping, output.as_deref(), cli.quiet)
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn read_file(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, content: &str) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| Error::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, content).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let content = serde_json::to_string_pretty(value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_file(path, &content)
}

fn read_mapping(path: &Path) -> Result<ReferenceMap, Error> {
    serde_json::from_str(&read_file(path)?).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Pages to process: the input itself, or every matching file below it.
fn collect_inputs(input: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, Error> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let globs = build_globset(patterns)?;
    let mut builder = WalkBuilder::new(input);
    builder.hidden(true).git_ignore(true);

    let mut files: Vec<PathBuf> = builder
        .build()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| globs.is_match(e.file_name()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

fn module_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "classroom".to_string());
    format!("{}.ts", stem)
}

/// Module path of a batch page relative to the output directory. Pages keep
/// their subdirectory so equal file names in different weeks stay apart.
fn batch_module_path(page: &Path, root: &Path) -> PathBuf {
    match page.strip_prefix(root) {
        Ok(relative) if relative.file_stem().is_some() => relative.with_file_name(module_name(relative)),
        _ => PathBuf::from(module_name(page)),
    }
}

/// Where the generated module for `page` goes. `root` is the directory a
/// batch run walked.
fn output_path(page: &Path, root: &Path, output: Option<&Path>, batch: bool) -> PathBuf {
    match (output, batch) {
        (Some(out), false) => out.to_path_buf(),
        (Some(dir), true) => dir.join(batch_module_path(page, root)),
        (None, false) => PathBuf::from(module_name(page)),
        (None, true) => Path::new("generated").join(batch_module_path(page, root)),
    }
}

#[derive(Serialize)]
struct ParseSummary {
    input: PathBuf,
    output: PathBuf,
    stats: ExtractionStats,
    weeks: usize,
    bucketed_items: usize,
}

fn cmd_parse(
    input: &Path,
    output: Option<&Path>,
    patterns: &[String],
    json: bool,
    config_path: &Path,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let config = Config::load(config_path)?;
    let batch = input.is_dir();
    let inputs = collect_inputs(input, patterns)?;

    if inputs.is_empty() {
        if !quiet && !json {
            println!("{}", "No input pages found.".yellow());
        }
        return Ok(());
    }

    let mut summaries = Vec::with_capacity(inputs.len());
    for page in &inputs {
        let html = read_file(page)?;
        let (items, stats) = extract_with_stats(&html, &config);
        let weeks = aggregate_by_week(&items, &config);
        let dest = output_path(page, input, output, batch);
        write_file(&dest, &serialize(&weeks))?;

        summaries.push(ParseSummary {
            input: page.clone(),
            output: dest,
            bucketed_items: weeks.values().map(|w| w.items.len()).sum(),
            weeks: weeks.len(),
            stats,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    for s in &summaries {
        println!("{} {}", "Parsed".cyan().bold(), s.input.display());
        println!(
            "  {} items ({} skipped), {} weeks, {} dated",
            s.stats.parsed.to_string().green(),
            s.stats.skipped,
            s.weeks,
            s.bucketed_items
        );
        if s.stats.used_fallback_selector {
            println!("  {}", "layout drift: used attribute fallback selector".yellow());
        }
        println!("  {} {}", "->".dimmed(), s.output.display());
    }
    println!(
        "\n{} {} page(s) in {:?}",
        "Done".green().bold(),
        summaries.len(),
        start.elapsed()
    );

    Ok(())
}

fn consolidate_links(
    links: &[DriveLink],
    no_consolidation: bool,
) -> (Vec<ConsolidatedRecord>, ReferenceMap, ConsolidationStats) {
    if no_consolidation {
        consolidate::identity_consolidation(links)
    } else {
        consolidate::consolidate(links)
    }
}

fn cmd_links(
    html_path: &Path,
    no_consolidation: bool,
    mapping_out: Option<&Path>,
    report_out: Option<&Path>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let html = read_file(html_path)?;
    let links = discover_links(&html);
    let (records, mapping, stats) = consolidate_links(&links, no_consolidation);

    if let Some(path) = mapping_out {
        write_json(path, &mapping)?;
    }
    if let Some(path) = report_out {
        let report = serde_json::json!({
            "stats": stats,
            "reduction_percent": stats.reduction_percent(),
            "duplicate_groups": report_rows(&records),
        });
        write_json(path, &report)?;
    }

    if json {
        let output = serde_json::json!({
            "stats": stats,
            "reduction_percent": stats.reduction_percent(),
            "records": records,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if links.is_empty() {
        println!("{}", "No hosted-document links found.".yellow());
        return Ok(());
    }

    println!(
        "{} links, {} unique documents",
        stats.total_original_links.to_string().cyan().bold(),
        stats.unique_content_groups.to_string().cyan().bold()
    );
    if stats.duplicate_groups > 0 {
        println!(
            "{} duplicate groups, {} links removed ({:.1}%)\n",
            stats.duplicate_groups.to_string().yellow().bold(),
            stats.duplicates_removed,
            stats.reduction_percent()
        );
    }

    for record in &records {
        let types: Vec<&str> = record.declared_types.iter().map(String::as_str).collect();
        let type_info = if types.is_empty() {
            String::new()
        } else {
            format!(" [{}]", types.join(", "))
        };
        let dup_info = if record.member_count > 1 {
            format!(" x{}", record.member_count).yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "{}{}{} {}",
            record.display_name.cyan(),
            type_info.dimmed(),
            dup_info,
            record.identifier.dimmed()
        );
    }

    Ok(())
}

fn cmd_match(
    html_path: &Path,
    downloads: &Path,
    no_consolidation: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let html = read_file(html_path)?;
    let links = discover_links(&html);
    let (records, _, _) = consolidate_links(&links, no_consolidation);
    let listing = list_directory(downloads)?;
    let report = verify_associations(&records, &listing);

    if json {
        let output = serde_json::json!({
            "matched": report.matched,
            "missing": report.missing,
            "skipped": report.skipped,
            "links_covered": report.links_covered(),
            "links_missing": report.links_missing(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{} {} ({} files)",
        "Matching against".cyan().bold(),
        downloads.display(),
        listing.len()
    );

    if !report.matched.is_empty() {
        println!(
            "\n{} {} associations covering {} links",
            "✓".green(),
            report.matched.len(),
            report.links_covered()
        );
        for assoc in &report.matched {
            let file = assoc
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            println!("  {:.3} {} -> {}", assoc.score, assoc.name.cyan(), file);
        }
    }

    if !report.missing.is_empty() {
        println!(
            "\n{} {} documents without a local copy ({} links)",
            "✗".red(),
            report.missing.len(),
            report.links_missing()
        );
        for missing in &report.missing {
            let best = missing
                .best_score
                .map(|s| format!("{:.3}", s))
                .unwrap_or_else(|| "-".to_string());
            println!("  {} {} {}", best.dimmed(), missing.name.yellow(), missing.identifier.dimmed());
        }
    }

    if !report.skipped.is_empty() {
        println!("\n{} {} generic names skipped", "!".yellow(), report.skipped.len());
    }

    Ok(())
}

fn default_rewrite_output(html_path: &Path) -> PathBuf {
    let stem = html_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "page".to_string());
    html_path.with_file_name(format!("{}_updated.html", stem))
}

fn cmd_rewrite(
    html_path: &Path,
    mapping_path: &Path,
    output: Option<&Path>,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let html = read_file(html_path)?;
    let mapping = read_mapping(mapping_path)?;
    let (rewritten, count) = rewrite_links(&html, &mapping);

    let dest = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_rewrite_output(html_path));
    write_file(&dest, &rewritten)?;

    if !quiet {
        println!(
            "{} {} links -> {}",
            "Rewrote".green().bold(),
            count,
            dest.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_inputs_single_file() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("stream.txt");
        fs::write(&page, "<html></html>").unwrap();

        let inputs = collect_inputs(&page, &["*.html".to_string()]).unwrap();
        assert_eq!(inputs, vec![page]);
    }

    #[test]
    fn test_collect_inputs_directory_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.html"), "").unwrap();
        fs::write(dir.path().join("a.htm"), "").unwrap();
        fs::write(dir.path().join("notes.md"), "").unwrap();
        fs::create_dir(dir.path().join("week2")).unwrap();
        fs::write(dir.path().join("week2").join("c.html"), "").unwrap();

        let patterns = vec!["*.html".to_string(), "*.htm".to_string()];
        let inputs = collect_inputs(dir.path(), &patterns).unwrap();
        let names: Vec<String> = inputs
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"a.htm".to_string()));
        assert!(names.contains(&"b.html".to_string()));
        assert!(!names.iter().any(|n| n.ends_with(".md")));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(collect_inputs(dir.path(), &["[".to_string()]).is_err());
    }

    #[test]
    fn test_output_path() {
        let root = Path::new("pages");
        let page = Path::new("pages/stream.html");
        assert_eq!(output_path(page, page, None, false), PathBuf::from("stream.ts"));
        assert_eq!(output_path(page, page, Some(Path::new("out.ts")), false), PathBuf::from("out.ts"));
        assert_eq!(output_path(page, root, Some(Path::new("gen")), true), PathBuf::from("gen/stream.ts"));
        assert_eq!(output_path(page, root, None, true), PathBuf::from("generated/stream.ts"));
    }

    #[test]
    fn test_batch_outputs_mirror_subdirectories() {
        let root = Path::new("saved");
        let first = output_path(Path::new("saved/week1/stream.html"), root, Some(Path::new("gen")), true);
        let second = output_path(Path::new("saved/week2/stream.html"), root, Some(Path::new("gen")), true);
        assert_eq!(first, PathBuf::from("gen/week1/stream.ts"));
        assert_eq!(second, PathBuf::from("gen/week2/stream.ts"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_mapping_round_trips_through_json_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.json");
        let mut mapping = ReferenceMap::default();
        mapping.insert("https://old/a".to_string(), "https://new/a".to_string());

        write_json(&path, &mapping).unwrap();
        let loaded = read_mapping(&path).unwrap();
        assert_eq!(loaded.get("https://old/a"), Some("https://new/a"));
    }

    #[test]
    fn test_malformed_mapping_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.json");
        fs::write(&path, "{ not json").unwrap();

        let err = read_mapping(&path).unwrap_err();
        assert!(matches!(err, Error::Json { .. }));
        assert!(err.to_string().contains("mapping.json"));
    }

    #[test]
    fn test_default_rewrite_output() {
        assert_eq!(
            default_rewrite_output(Path::new("saved/stream.html")),
            PathBuf::from("saved/stream_updated.html")
        );
    }

    #[test]
    fn test_write_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("deep").join("er").join("x.ts");
        write_file(&dest, "export {};").unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap(), "export {};");
    }
}
