//! Turns raw feed items into candidate records.
//!
//! Extraction never fails a whole snapshot: items without a usable id are
//! skipped, every optional field defaults to empty.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use reelmark_common::{FragmentKind, QuotedRecord, RawAnchor, RawItem, Record, ReelmarkError};

/// Collapses a space-broken scheme ("https:// mega.nz") back together.
static BROKEN_SCHEME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)https?://\s+").unwrap());

/// Quotation strategies in probe order. Later strategies are strictly more
/// speculative, so the first one yielding non-empty text wins.
const FRAGMENT_ORDER: [FragmentKind; 4] = [
    FragmentKind::NestedItem,
    FragmentKind::BlockQuote,
    FragmentKind::ListSibling,
    FragmentKind::CardWrapper,
];

/// Extract every item in a snapshot, dropping the ones without an id.
pub fn extract_records(
    items: &[RawItem],
    scanner: &LinkScanner,
    now: DateTime<Utc>,
) -> Vec<Record> {
    items
        .iter()
        .filter_map(|item| match extract_record(item, scanner, now) {
            Ok(record) => Some(record),
            Err(err) => {
                debug!(author = %item.author, error = %err, "Skipping item");
                None
            }
        })
        .collect()
}

/// Extract a single item. The only hard requirement is a permalink with a
/// recognizable status id.
pub fn extract_record(
    item: &RawItem,
    scanner: &LinkScanner,
    now: DateTime<Utc>,
) -> Result<Record, ReelmarkError> {
    let id = permalink_id(&item.permalink).ok_or_else(|| {
        ReelmarkError::Extraction(format!("no status id in permalink '{}'", item.permalink))
    })?;

    let mut links = anchor_links(&item.anchors);
    links.extend(scanner.text_links(&item.text));

    let quoted = detect_quoted(item, &id, scanner);

    Ok(Record {
        id,
        author: item.author.clone(),
        text: item.text.clone(),
        links,
        quoted,
        permalink: item.permalink.clone(),
        observed_at: now,
        is_duplicate: false,
        enrichment: None,
    })
}

/// Status id from a permalink, e.g. "https://x.com/u/status/123?s=20" -> "123".
pub fn permalink_id(permalink: &str) -> Option<String> {
    let (_, rest) = permalink.split_once("/status/")?;
    let id: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Anchor hrefs in document order, platform-internal links excluded.
/// Duplicates within one item are permitted.
fn anchor_links(anchors: &[RawAnchor]) -> Vec<String> {
    anchors
        .iter()
        .filter(|anchor| !anchor.href.is_empty() && !is_platform_link(&anchor.href))
        .map(|anchor| anchor.href.clone())
        .collect()
}

fn is_platform_link(href: &str) -> bool {
    href.contains("twitter.com") || href.contains("x.com")
}

// --- Quotation detection ---

fn detect_quoted(item: &RawItem, own_id: &str, scanner: &LinkScanner) -> Option<QuotedRecord> {
    for kind in FRAGMENT_ORDER {
        if let Some(quoted) = probe_fragment(item, kind, scanner) {
            return Some(quoted);
        }
    }
    probe_permalink_sibling(item, own_id)
}

/// Structural probe: a fragment of the given kind with non-empty text.
fn probe_fragment(
    item: &RawItem,
    kind: FragmentKind,
    scanner: &LinkScanner,
) -> Option<QuotedRecord> {
    let fragment = item.fragments.iter().find(|f| f.kind == kind)?;
    if fragment.text.trim().is_empty() {
        return None;
    }

    let mut links = anchor_links(&fragment.anchors);
    links.extend(scanner.text_links(&fragment.text));

    Some(QuotedRecord {
        author: fragment.author.clone(),
        text: fragment.text.clone(),
        links,
    })
}

/// Last-resort probe: an anchor pointing at a different status than the item
/// itself. The anchor's visible label becomes the quoted preview text, so a
/// bare unlabeled status link yields nothing.
fn probe_permalink_sibling(item: &RawItem, own_id: &str) -> Option<QuotedRecord> {
    item.anchors.iter().find_map(|anchor| {
        let id = permalink_id(&anchor.href)?;
        if id == own_id || anchor.label.trim().is_empty() {
            return None;
        }
        Some(QuotedRecord {
            author: String::new(),
            text: anchor.label.clone(),
            links: vec![anchor.href.clone()],
        })
    })
}

// --- Text link scanning ---

/// Pulls target-domain URLs out of free text: well-formed ones, ones with a
/// space-broken scheme, and bare "domain/path" mentions that get a scheme
/// prefixed. Bare mentions are only considered when no collected link for
/// that domain exists yet.
pub struct LinkScanner {
    domains: Vec<DomainPattern>,
}

struct DomainPattern {
    domain: String,
    full: Regex,
    broken: Regex,
    bare: Regex,
}

impl LinkScanner {
    pub fn new(domains: &[String]) -> Self {
        let domains = domains
            .iter()
            .map(|domain| {
                let escaped = regex::escape(domain);
                DomainPattern {
                    domain: domain.clone(),
                    full: Regex::new(&format!(r"(?i)https?://\S*{escaped}\S*")).unwrap(),
                    broken: Regex::new(&format!(r"(?i)https?://\s*{escaped}\S*")).unwrap(),
                    bare: Regex::new(&format!(r"(?i){escaped}/\S+")).unwrap(),
                }
            })
            .collect();
        Self { domains }
    }

    pub fn text_links(&self, text: &str) -> Vec<String> {
        let mut links: Vec<String> = Vec::new();
        if text.is_empty() {
            return links;
        }

        for pattern in &self.domains {
            for found in pattern.full.find_iter(text) {
                links.push(found.as_str().to_string());
            }
            for found in pattern.broken.find_iter(text) {
                links.push(BROKEN_SCHEME.replace_all(found.as_str(), "https://").into_owned());
            }
        }

        for pattern in &self.domains {
            if text.contains(&pattern.domain)
                && !links.iter().any(|link| link.contains(&pattern.domain))
            {
                for found in pattern.bare.find_iter(text) {
                    links.push(format!("https://{}", found.as_str()));
                }
            }
        }

        let mut seen = HashSet::new();
        links.retain(|link| seen.insert(link.clone()));
        links
    }
}
