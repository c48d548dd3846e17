//! Output files: the combined collection document, a flat CSV of enriched
//! records, a links-only dump, and per-bucket category files.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use reelmark_common::{categorize, Record, RuleSet, SessionStats};

use crate::enrichment::EnrichmentReport;

#[derive(Serialize)]
struct CombinedDocument<'a> {
    config: ConfigSection<'a>,
    stats: &'a SessionStats,
    tweets: &'a [Record],
    scraped_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigSection<'a> {
    target_domains: &'a [String],
    include_patterns: &'a [String],
}

#[derive(Serialize)]
struct LinksDocument<'a> {
    links: Vec<&'a str>,
    count: usize,
    scraped_at: DateTime<Utc>,
    domains: &'a [String],
}

/// Write the combined document: rule set, statistics, and every matched
/// record.
pub fn write_combined(
    path: &Path,
    rules: &RuleSet,
    stats: &SessionStats,
    records: &[Record],
) -> Result<()> {
    let document = CombinedDocument {
        config: ConfigSection {
            target_domains: &rules.target_domains,
            include_patterns: &rules.include_patterns,
        },
        stats,
        tweets: records,
        scraped_at: Utc::now(),
    };
    write_json(path, &document)?;
    info!(records = records.len(), path = %path.display(), "Wrote combined output");
    Ok(())
}

/// Write one CSV row per record with its enrichment fields flattened.
/// Multi-value fields are pipe-joined; text is clipped to keep rows
/// scannable.
pub fn write_csv(path: &Path, records: &[Record]) -> Result<()> {
    let mut out = String::new();
    out.push_str("id,author,text,urls,ai_titles,ai_quality,ai_type,ai_summary,tweet_url\n");

    for record in records {
        let urls = truncate_chars(&record.links.join("|"), 200);
        let (titles, quality, kind, summary) = match &record.enrichment {
            Some(enrichment) => (
                enrichment.titles.join("|"),
                enrichment.qualities.join("|"),
                enrichment.types.join("|"),
                enrichment.summary.clone(),
            ),
            None => Default::default(),
        };

        let row = [
            record.id.as_str(),
            record.author.as_str(),
            &truncate_chars(&record.text, 100),
            &urls,
            &titles,
            &quality,
            &kind,
            &summary,
            record.permalink.as_str(),
        ];
        let quoted: Vec<String> = row.iter().map(|field| csv_field(field)).collect();
        out.push_str(&quoted.join(","));
        out.push('\n');
    }

    std::fs::write(path, out)
        .with_context(|| format!("Failed to write CSV to {}", path.display()))?;
    info!(records = records.len(), path = %path.display(), "Wrote CSV");
    Ok(())
}

/// Write every distinct link seen across the records, quoted links
/// included, in first-seen order.
pub fn write_links(path: &Path, records: &[Record], domains: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for record in records {
        let quoted_links = record.quoted.iter().flat_map(|quoted| quoted.links.iter());
        for link in record.links.iter().chain(quoted_links) {
            if seen.insert(link.as_str()) {
                links.push(link.as_str());
            }
        }
    }

    let document = LinksDocument {
        count: links.len(),
        links,
        scraped_at: Utc::now(),
        domains,
    };
    write_json(path, &document)?;
    info!(links = document.count, path = %path.display(), "Wrote links");
    Ok(())
}

/// Write one JSON file per category bucket into `dir`.
pub fn write_categorized(dir: &Path, records: &[Record], rules: &RuleSet) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let categorized = categorize(records, rules);
    write_json(&dir.join("both_year_and_movie.json"), &categorized.both_year_and_movie)?;
    write_json(&dir.join("year_only.json"), &categorized.year_only)?;
    write_json(&dir.join("movie_only.json"), &categorized.movie_only)?;
    write_json(&dir.join("other.json"), &categorized.other)?;
    for (domain, bucket) in &categorized.by_domain {
        let file = format!("domain_{}.json", domain.replace('.', "_"));
        write_json(&dir.join(file), bucket)?;
    }
    info!(dir = %dir.display(), "Wrote category buckets");
    Ok(())
}

/// Write the full enrichment report document.
pub fn write_report(path: &Path, report: &EnrichmentReport) -> Result<()> {
    write_json(path, report)?;
    info!(
        processed = report.processed_count,
        failed = report.failed_count,
        path = %path.display(),
        "Wrote enrichment report"
    );
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    std::fs::write(path, body)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
