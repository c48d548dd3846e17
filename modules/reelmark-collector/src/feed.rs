// Trait abstraction for the feed being walked.
//
// FeedDriver puts the page interaction behind one trait: the collector only
// ever snapshots the currently visible items, advances, and probes for the
// rate-limit banner or the end-of-feed marker.
//
// This enables deterministic testing with ScriptedFeed (no browser, no
// network) and offline runs against captured feed state via JsonlFeed.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use reelmark_common::RawItem;

#[async_trait]
pub trait FeedDriver: Send + Sync {
    /// Return the items currently visible in the feed.
    async fn snapshot(&self) -> Result<Vec<RawItem>>;

    /// Move the feed to its next state (scroll, next page).
    async fn advance(&self) -> Result<()>;

    /// Whether the feed is showing its end-of-content marker.
    async fn at_end(&self) -> bool;

    /// Whether the feed is showing a rate-limit notice.
    async fn rate_limited(&self) -> bool;
}

// --- Capture-file driver ---

/// One observed feed state: the items visible at that point plus the
/// banner flags that were showing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleFrame {
    #[serde(default)]
    pub items: Vec<RawItem>,
    #[serde(default)]
    pub rate_limited: bool,
    #[serde(default)]
    pub end: bool,
}

/// Replays a capture file of one JSON frame per line. The cursor walks the
/// frames in order; once past the last frame the feed reports itself ended.
pub struct JsonlFeed {
    frames: Vec<CycleFrame>,
    cursor: AtomicUsize,
}

impl JsonlFeed {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture file {}", path.display()))?;

        let mut frames = Vec::new();
        for (number, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CycleFrame>(line) {
                Ok(frame) => frames.push(frame),
                Err(err) => {
                    warn!(line = number + 1, error = %err, "Skipping malformed capture frame");
                }
            }
        }
        Ok(Self {
            frames,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn current(&self) -> Option<&CycleFrame> {
        self.frames.get(self.cursor.load(Ordering::Relaxed))
    }
}

#[async_trait]
impl FeedDriver for JsonlFeed {
    async fn snapshot(&self) -> Result<Vec<RawItem>> {
        Ok(self.current().map(|f| f.items.clone()).unwrap_or_default())
    }

    async fn advance(&self) -> Result<()> {
        self.cursor.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn at_end(&self) -> bool {
        match self.current() {
            Some(frame) => frame.end,
            None => true,
        }
    }

    async fn rate_limited(&self) -> bool {
        self.current().map(|f| f.rate_limited).unwrap_or(false)
    }
}
