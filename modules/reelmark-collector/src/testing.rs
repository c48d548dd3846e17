//! Test doubles for driving the collector without a browser: a scripted
//! feed that replays a fixed sequence of cycles, plus raw-item builders.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use reelmark_common::{RawAnchor, RawItem, ReelmarkError};

use crate::feed::FeedDriver;

#[derive(Default)]
struct Step {
    items: Vec<RawItem>,
    rate_limited: bool,
    end: bool,
    fail: Option<String>,
    rate_limit_error: bool,
}

/// A feed that serves pre-scripted cycles in order. Once past the last
/// step it keeps serving empty snapshots, unless built with
/// [`ScriptedFeed::end_when_exhausted`].
#[derive(Default)]
pub struct ScriptedFeed {
    steps: Vec<Step>,
    end_after_steps: bool,
    cursor: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// A normal cycle serving the given items.
    pub fn cycle(mut self, items: Vec<RawItem>) -> Self {
        self.steps.push(Step {
            items,
            ..Default::default()
        });
        self
    }

    /// A cycle where the feed shows its rate-limit notice.
    pub fn rate_limited_cycle(mut self) -> Self {
        self.steps.push(Step {
            rate_limited: true,
            ..Default::default()
        });
        self
    }

    /// A cycle whose snapshot fails with an arbitrary error. The failing
    /// step is consumed, so the next cycle proceeds normally.
    pub fn failing_cycle(mut self, message: &str) -> Self {
        self.steps.push(Step {
            fail: Some(message.to_string()),
            ..Default::default()
        });
        self
    }

    /// A cycle whose snapshot fails with a rate-limit error.
    pub fn rate_limit_error_cycle(mut self) -> Self {
        self.steps.push(Step {
            rate_limit_error: true,
            ..Default::default()
        });
        self
    }

    /// A cycle where the feed shows its end-of-content marker.
    pub fn end_cycle(mut self) -> Self {
        self.steps.push(Step {
            end: true,
            ..Default::default()
        });
        self
    }

    /// Report the end marker once every scripted step has been consumed.
    pub fn end_when_exhausted(mut self) -> Self {
        self.end_after_steps = true;
        self
    }

    fn index(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedDriver for ScriptedFeed {
    async fn snapshot(&self) -> Result<Vec<RawItem>> {
        let Some(step) = self.steps.get(self.index()) else {
            return Ok(Vec::new());
        };
        if step.rate_limit_error {
            self.cursor.fetch_add(1, Ordering::SeqCst);
            return Err(ReelmarkError::RateLimited.into());
        }
        if let Some(message) = &step.fail {
            self.cursor.fetch_add(1, Ordering::SeqCst);
            return Err(anyhow!("{message}"));
        }
        Ok(step.items.clone())
    }

    async fn advance(&self) -> Result<()> {
        self.cursor.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn at_end(&self) -> bool {
        match self.steps.get(self.index()) {
            Some(step) => step.end,
            None => self.end_after_steps,
        }
    }

    async fn rate_limited(&self) -> bool {
        self.steps
            .get(self.index())
            .map(|step| step.rate_limited)
            .unwrap_or(false)
    }
}

/// A minimal raw item whose permalink yields `id`.
pub fn raw_item(id: &str, author: &str, text: &str) -> RawItem {
    RawItem {
        author: author.to_string(),
        text: text.to_string(),
        permalink: format!("https://x.com/{author}/status/{id}"),
        anchors: Vec::new(),
        fragments: Vec::new(),
    }
}

/// [`raw_item`] plus explicit outbound anchors.
pub fn raw_item_with_links(id: &str, author: &str, text: &str, links: &[&str]) -> RawItem {
    let mut item = raw_item(id, author, text);
    item.anchors = links
        .iter()
        .map(|href| RawAnchor {
            href: href.to_string(),
            label: String::new(),
        })
        .collect();
    item
}
