//! Content matching rules.
//!
//! `classify` is a pure function from a record and a rule set to a match
//! verdict; `categorize` and `filter_stats` are reporting views built on top
//! of it. No hidden state, so re-running on the same input always yields the
//! same answer.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::Record;

/// Four-digit year, 1900-2099. Word-bounded, so "19943" stays out.
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());
/// Whole-word "movie" or "movies", any case.
static MOVIE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bmovies?\b").unwrap());

// --- RuleSet ---

/// Matching criteria for one collection session. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    /// Domain substrings a link host must contain to count as a hit.
    pub target_domains: Vec<String>,
    /// Case-insensitive substrings checked against the record text.
    pub include_patterns: Vec<String>,
}

impl RuleSet {
    pub fn new(target_domains: Vec<String>, include_patterns: Vec<String>) -> Self {
        Self {
            target_domains,
            include_patterns,
        }
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            target_domains: [
                "transfer.it",
                "gofile.io",
                "hubcloud.fit",
                "drive.google.com",
                "mega.nz",
                "boxd.it",
            ]
            .map(String::from)
            .to_vec(),
            include_patterns: [
                "documentary",
                "film",
                "cinema",
                "35mm",
                "imax",
                "1080p",
                "remux",
                "hd",
                "uhd",
                "4k",
                "gb",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

// --- Classification ---

/// Why a record matched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Year,
    Movie,
    Keyword,
    Domain(String),
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Year => write!(f, "YEAR"),
            Category::Movie => write!(f, "MOVIE"),
            Category::Keyword => write!(f, "KEYWORD"),
            Category::Domain(domain) => write!(f, "DOMAIN:{domain}"),
        }
    }
}

/// The classifier's decision for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub matched: bool,
    pub reasons: BTreeSet<Category>,
}

/// Classify one record against the rule set. Rules are OR-combined: any
/// firing category makes the record a match. With no target domains
/// configured, domain checks are skipped entirely.
pub fn classify(record: &Record, rules: &RuleSet) -> Verdict {
    let mut reasons = BTreeSet::new();
    let text = combined_text(record);

    if YEAR_RE.is_match(&text) {
        reasons.insert(Category::Year);
    }
    if MOVIE_RE.is_match(&text) {
        reasons.insert(Category::Movie);
    }

    let lower = text.to_lowercase();
    if rules
        .include_patterns
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
    {
        reasons.insert(Category::Keyword);
    }

    for domain in &rules.target_domains {
        if all_links(record).any(|link| link_hits_domain(link, domain)) {
            reasons.insert(Category::Domain(domain.clone()));
        }
    }

    Verdict {
        matched: !reasons.is_empty(),
        reasons,
    }
}

/// Main text plus quoted text, the surface all text rules run against.
fn combined_text(record: &Record) -> String {
    match &record.quoted {
        Some(quoted) => format!("{} {}", record.text, quoted.text),
        None => record.text.clone(),
    }
}

/// Links of the record itself and of its quotation, if any.
fn all_links(record: &Record) -> impl Iterator<Item = &String> {
    record
        .links
        .iter()
        .chain(record.quoted.iter().flat_map(|quoted| quoted.links.iter()))
}

/// Host containment when the link parses as a URL; whole-string containment
/// as the fallback for bare fragments pulled out of text.
fn link_hits_domain(link: &str, domain: &str) -> bool {
    let domain = domain.to_lowercase();
    match url::Url::parse(link) {
        Ok(parsed) => parsed
            .host_str()
            .is_some_and(|host| host.to_lowercase().contains(&domain)),
        Err(_) => link.to_lowercase().contains(&domain),
    }
}

// --- Reporting views ---

/// Mutually-exclusive year/movie buckets plus overlapping domain buckets.
/// `other` holds records with no year, no movie, and no domain hit.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Categorized {
    pub both_year_and_movie: Vec<Record>,
    pub year_only: Vec<Record>,
    pub movie_only: Vec<Record>,
    pub by_domain: BTreeMap<String, Vec<Record>>,
    pub other: Vec<Record>,
}

pub fn categorize(records: &[Record], rules: &RuleSet) -> Categorized {
    let mut out = Categorized::default();
    for record in records {
        let verdict = classify(record, rules);
        let year = verdict.reasons.contains(&Category::Year);
        let movie = verdict.reasons.contains(&Category::Movie);

        let mut in_domain = false;
        for reason in &verdict.reasons {
            if let Category::Domain(domain) = reason {
                out.by_domain
                    .entry(domain.clone())
                    .or_default()
                    .push(record.clone());
                in_domain = true;
            }
        }

        match (year, movie) {
            (true, true) => out.both_year_and_movie.push(record.clone()),
            (true, false) => out.year_only.push(record.clone()),
            (false, true) => out.movie_only.push(record.clone()),
            (false, false) if !in_domain => out.other.push(record.clone()),
            _ => {}
        }
    }
    out
}

/// Summary counts over a record slice. Every link of every record is
/// inspected for domain hits, not just the first.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStats {
    pub total: usize,
    pub year: usize,
    pub movie: usize,
    pub both: usize,
    pub keyword: usize,
    pub by_domain: BTreeMap<String, usize>,
    pub matched: usize,
}

pub fn filter_stats(records: &[Record], rules: &RuleSet) -> FilterStats {
    let mut stats = FilterStats {
        total: records.len(),
        ..Default::default()
    };
    for record in records {
        let verdict = classify(record, rules);
        if verdict.matched {
            stats.matched += 1;
        }
        for reason in &verdict.reasons {
            match reason {
                Category::Year => stats.year += 1,
                Category::Movie => stats.movie += 1,
                Category::Keyword => stats.keyword += 1,
                Category::Domain(domain) => {
                    *stats.by_domain.entry(domain.clone()).or_default() += 1
                }
            }
        }
        if verdict.reasons.contains(&Category::Year) && verdict.reasons.contains(&Category::Movie)
        {
            stats.both += 1;
        }
    }
    stats
}

impl fmt::Display for FilterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Filter Stats ===")?;
        writeln!(f, "Total records:   {}", self.total)?;
        writeln!(f, "With years:      {}", self.year)?;
        writeln!(f, "With movies:     {}", self.movie)?;
        writeln!(f, "With both:       {}", self.both)?;
        writeln!(f, "With keywords:   {}", self.keyword)?;
        writeln!(f, "Matched:         {}", self.matched)?;
        writeln!(f, "Unmatched:       {}", self.total - self.matched)?;
        if !self.by_domain.is_empty() {
            writeln!(f, "\nBy domain:")?;
            for (domain, count) in &self.by_domain {
                writeln!(f, "  {domain}: {count}")?;
            }
        }
        Ok(())
    }
}
