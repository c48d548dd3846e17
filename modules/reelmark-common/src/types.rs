//! Core data types shared across the collection and enrichment pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Raw feed input ---

/// One item container as handed over by the feed driver. Everything is
/// optional except the shape itself; extraction decides what is usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    /// Permalink of the item. The record id is derived from it.
    #[serde(default)]
    pub permalink: String,
    /// Anchor elements found inside the item container, in document order.
    #[serde(default)]
    pub anchors: Vec<RawAnchor>,
    /// Candidate sub-containers for quotation detection.
    #[serde(default)]
    pub fragments: Vec<RawFragment>,
}

/// An anchor with its target and visible label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAnchor {
    pub href: String,
    #[serde(default)]
    pub label: String,
}

/// A structural fragment that might hold an embedded quotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFragment {
    pub kind: FragmentKind,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub anchors: Vec<RawAnchor>,
}

/// Where in the item container a fragment was found. Ordering matters to
/// the quotation probes: earlier kinds are structurally more reliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    /// An item container nested inside a link-role wrapper.
    NestedItem,
    /// An item container inside a block quote element.
    BlockQuote,
    /// A second item container in the same list entry.
    ListSibling,
    /// A preview-card wrapper.
    CardWrapper,
}

// --- Records ---

/// One collected item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable id taken from the permalink. Items without one are dropped
    /// before they ever reach dedup state.
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    /// Outbound links in document order. Duplicates within a record are
    /// allowed.
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted: Option<QuotedRecord>,
    #[serde(default)]
    pub permalink: String,
    pub observed_at: DateTime<Utc>,
    /// True when the id was already in session state at extraction time.
    #[serde(default)]
    pub is_duplicate: bool,
    /// Attached by the enrichment pass; never mutates the fields above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
}

/// An embedded quotation inside a record. Same shape, no id of its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotedRecord {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub links: Vec<String>,
}

// --- Enrichment ---

/// Structured fields parsed out of one model response for a matched record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub qualities: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

// --- Session statistics ---

/// Cumulative counters for one collection session. Persisted with the
/// session snapshot and carried across resumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub cycles: u32,
    /// New unique records observed, matched or not.
    pub collected: u32,
    pub matched: u32,
    pub duplicates: u32,
    /// Match counts keyed by category label, e.g. "YEAR" or "DOMAIN:mega.nz".
    #[serde(default)]
    pub by_category: BTreeMap<String, u32>,
}

impl std::fmt::Display for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Collection Session ===")?;
        writeln!(f, "Cycles run:        {}", self.cycles)?;
        writeln!(f, "Unique records:    {}", self.collected)?;
        writeln!(f, "Matched:           {}", self.matched)?;
        writeln!(f, "Duplicates seen:   {}", self.duplicates)?;
        if !self.by_category.is_empty() {
            writeln!(f, "\nBy category:")?;
            for (category, count) in &self.by_category {
                writeln!(f, "  {category}: {count}")?;
            }
        }
        Ok(())
    }
}
