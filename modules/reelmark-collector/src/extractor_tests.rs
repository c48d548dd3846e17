//! Extractor tests: raw items in, records out.

use chrono::Utc;

use reelmark_common::{FragmentKind, RawAnchor, RawFragment};

use crate::extractor::{extract_record, extract_records, permalink_id, LinkScanner};
use crate::testing::{raw_item, raw_item_with_links};

fn scanner(domains: &[&str]) -> LinkScanner {
    let domains: Vec<String> = domains.iter().map(|d| d.to_string()).collect();
    LinkScanner::new(&domains)
}

fn anchor(href: &str, label: &str) -> RawAnchor {
    RawAnchor {
        href: href.to_string(),
        label: label.to_string(),
    }
}

fn fragment(kind: FragmentKind, author: &str, text: &str) -> RawFragment {
    RawFragment {
        kind,
        author: author.to_string(),
        text: text.to_string(),
        anchors: Vec::new(),
    }
}

#[test]
fn permalink_id_takes_the_status_segment() {
    assert_eq!(
        permalink_id("https://x.com/u/status/123").as_deref(),
        Some("123")
    );
    assert_eq!(
        permalink_id("https://x.com/u/status/123?s=20").as_deref(),
        Some("123")
    );
    assert_eq!(permalink_id("https://x.com/u/with_replies"), None);
    assert_eq!(permalink_id("https://x.com/u/status/"), None);
}

#[test]
fn items_without_an_id_are_skipped() {
    let scanner = scanner(&[]);
    let mut bad = raw_item("1", "a", "hello");
    bad.permalink = "https://x.com/a".to_string();
    let items = vec![bad, raw_item("2", "b", "world")];

    let records = extract_records(&items, &scanner, Utc::now());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "2");
}

#[test]
fn platform_anchors_are_excluded_from_links() {
    let scanner = scanner(&[]);
    let item = raw_item_with_links(
        "1",
        "a",
        "",
        &["https://mega.nz/f", "https://twitter.com/other", ""],
    );
    let record = extract_record(&item, &scanner, Utc::now()).unwrap();
    assert_eq!(record.links, vec!["https://mega.nz/f".to_string()]);
}

#[test]
fn record_links_keep_anchor_order_then_text_links() {
    let scanner = scanner(&["mega.nz"]);
    let mut item = raw_item("7", "a", "also at https://mega.nz/f/2");
    item.anchors = vec![
        anchor("https://example.com/page", "ex"),
        anchor("https://mega.nz/f/1", "mega"),
    ];
    let record = extract_record(&item, &scanner, Utc::now()).unwrap();
    assert_eq!(
        record.links,
        vec![
            "https://example.com/page".to_string(),
            "https://mega.nz/f/1".to_string(),
            "https://mega.nz/f/2".to_string(),
        ]
    );
}

#[test]
fn text_scanning_repairs_broken_schemes_and_prefixes_bare_mentions() {
    let scanner = scanner(&["mega.nz", "gofile.io"]);
    let links = scanner.text_links("grab https:// mega.nz/f/abc and gofile.io/d/xyz now");
    assert_eq!(
        links,
        vec![
            "https://mega.nz/f/abc".to_string(),
            "https://gofile.io/d/xyz".to_string(),
        ]
    );
}

#[test]
fn bare_mentions_are_ignored_when_a_full_link_exists() {
    let scanner = scanner(&["mega.nz"]);
    let links = scanner.text_links("https://mega.nz/f/1 mirrored on mega.nz/f/2");
    // the full link wins; the bare mention never becomes a second URL
    assert_eq!(links, vec!["https://mega.nz/f/1".to_string()]);
}

#[test]
fn text_scanning_deduplicates_repeats() {
    let scanner = scanner(&["gofile.io"]);
    let links = scanner.text_links("https://gofile.io/d/x and again https://gofile.io/d/x");
    assert_eq!(links, vec!["https://gofile.io/d/x".to_string()]);
}

#[test]
fn quote_probes_stop_at_the_first_strategy_with_text() {
    let scanner = scanner(&[]);
    let mut item = raw_item("1", "a", "main");
    item.fragments = vec![
        fragment(FragmentKind::NestedItem, "x", "   "),
        fragment(FragmentKind::BlockQuote, "y", "quoted words"),
        fragment(FragmentKind::ListSibling, "z", "never reached"),
    ];

    let record = extract_record(&item, &scanner, Utc::now()).unwrap();
    let quoted = record.quoted.unwrap();
    assert_eq!(quoted.author, "y");
    assert_eq!(quoted.text, "quoted words");
}

#[test]
fn quoted_fragment_collects_anchor_and_text_links() {
    let scanner = scanner(&["mega.nz"]);
    let mut item = raw_item("1", "a", "main");
    let mut quote = fragment(FragmentKind::NestedItem, "b", "mirror at mega.nz/f/q");
    quote.anchors = vec![anchor("https://gofile.io/d/k", "gofile")];
    item.fragments = vec![quote];

    let record = extract_record(&item, &scanner, Utc::now()).unwrap();
    let quoted = record.quoted.unwrap();
    assert_eq!(
        quoted.links,
        vec![
            "https://gofile.io/d/k".to_string(),
            "https://mega.nz/f/q".to_string(),
        ]
    );
}

#[test]
fn permalink_sibling_is_the_last_resort_and_needs_a_label() {
    let scanner = scanner(&[]);

    let mut item = raw_item("1", "a", "main");
    item.anchors = vec![anchor("https://x.com/b/status/999", "")];
    let record = extract_record(&item, &scanner, Utc::now()).unwrap();
    assert!(record.quoted.is_none());

    let mut item = raw_item("1", "a", "main");
    item.anchors = vec![
        anchor("https://x.com/a/status/1", "self link"),
        anchor("https://x.com/b/status/999", "check this out"),
    ];
    let record = extract_record(&item, &scanner, Utc::now()).unwrap();
    let quoted = record.quoted.unwrap();
    assert_eq!(quoted.text, "check this out");
    assert_eq!(quoted.links, vec!["https://x.com/b/status/999".to_string()]);
    assert!(quoted.author.is_empty());
}

#[test]
fn structural_fragments_beat_the_permalink_heuristic() {
    let scanner = scanner(&[]);
    let mut item = raw_item("1", "a", "main");
    item.fragments = vec![fragment(FragmentKind::CardWrapper, "c", "card preview")];
    item.anchors = vec![anchor("https://x.com/b/status/999", "sibling label")];

    let record = extract_record(&item, &scanner, Utc::now()).unwrap();
    assert_eq!(record.quoted.unwrap().text, "card preview");
}
