//! Enrichment pass: one structured-extraction request per matched record
//! against a local Ollama model, with line-oriented parsing and per-field
//! validation of the free-form reply.

use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ollama_client::{GenerateOptions, OllamaClient};
use reelmark_common::{Enrichment, Record, ReelmarkError};

/// Attempts per record before it is reported as failed.
const MAX_ATTEMPTS: u32 = 3;
/// Sleep between attempts.
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Generic nouns the model likes to mistake for titles.
const TITLE_DENYLIST: [&str; 19] = [
    "collection",
    "post",
    "tweet",
    "video",
    "file",
    "link",
    "content",
    "archive",
    "folder",
    "directory",
    "drive",
    "share",
    "upload",
    "document",
    "library",
    "backup",
    "storage",
    "media",
    "resource",
];

/// File-host fragments that qualify a URL even without an http scheme.
const URL_HOST_FRAGMENTS: [&str; 6] =
    ["gofile", "transfer", "mega", "drive.google", "dropbox", "cloud"];

/// Resolution suffixes and rip formats a quality value must contain.
const QUALITY_TOKENS: [&str; 7] = ["p", "k", "remux", "webrip", "dvdrip", "bdrip", "vhs"];

/// Media-type tokens a type value must contain.
const TYPE_TOKENS: [&str; 8] = [
    "movie",
    "tv",
    "documentary",
    "series",
    "film",
    "show",
    "miniseries",
    "special",
];

/// Shapes that are a person rather than a title on their own: "J. Last",
/// possessives, honorific prefixes.
static PERSON_SHAPE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"^[A-Z]\.\s+[A-Z][a-z]+$", r"'s\s", r"^(Dr|Mr|Mrs|Ms|Prof|Sir)\s"]
        .iter()
        .map(|pattern| Regex::new(pattern).unwrap())
        .collect()
});

/// Two capitalized words. Too broad to reject on its own ("Breaking Bad"
/// has the same shape), so it only counts when the first word is a common
/// given name.
static FIRST_LAST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z]+\s+[A-Z][a-z]+$").unwrap());

const COMMON_GIVEN_NAMES: [&str; 40] = [
    "james", "john", "robert", "michael", "william", "david", "richard", "joseph", "thomas",
    "charles", "daniel", "matthew", "anthony", "mark", "donald", "steven", "paul", "andrew",
    "joshua", "kenneth", "kevin", "brian", "george", "peter", "frank", "martin", "mary",
    "patricia", "jennifer", "linda", "elizabeth", "barbara", "susan", "jessica", "sarah",
    "karen", "emily", "anna", "laura", "rachel",
];

/// A record the model could not be queried for, reported separately from
/// the successes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentFailure {
    #[serde(rename = "tweet_id")]
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentSummary {
    pub unique_titles: usize,
    pub unique_urls: usize,
    pub quality_formats: Vec<String>,
    pub types: Vec<String>,
    pub sample_titles: Vec<String>,
}

/// Full result of one enrichment run, written out as a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub model: String,
    pub original_file: String,
    pub processed_count: usize,
    pub failed_count: usize,
    pub time_elapsed: f64,
    pub tweets: Vec<Record>,
    pub errors: Vec<EnrichmentFailure>,
    pub summary: EnrichmentSummary,
}

/// Enrich matched records strictly one at a time, never concurrently.
/// Records whose requests exhaust all retries are excluded from the output
/// set and listed under `errors` instead.
pub async fn enrich(
    client: &OllamaClient,
    model: &str,
    original_file: &str,
    records: Vec<Record>,
    limit: Option<usize>,
) -> EnrichmentReport {
    let started = Instant::now();
    let total = limit.map_or(records.len(), |l| l.min(records.len()));

    let mut tweets = Vec::new();
    let mut errors = Vec::new();
    for (index, mut record) in records.into_iter().take(total).enumerate() {
        info!(current = index + 1, total, id = %record.id, "Enriching record");
        match request_extraction(client, model, &record).await {
            Ok(reply) => {
                record.enrichment = Some(parse_response(&reply, &record.author));
                tweets.push(record);
            }
            Err(err) => {
                warn!(id = %record.id, error = %err, "Enrichment failed");
                errors.push(EnrichmentFailure {
                    id: record.id.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    let summary = summarize(&tweets);
    EnrichmentReport {
        model: model.to_string(),
        original_file: original_file.to_string(),
        processed_count: tweets.len(),
        failed_count: errors.len(),
        time_elapsed: started.elapsed().as_secs_f64(),
        tweets,
        errors,
        summary,
    }
}

async fn request_extraction(
    client: &OllamaClient,
    model: &str,
    record: &Record,
) -> Result<String, ReelmarkError> {
    let prompt = build_prompt(record);
    let options = GenerateOptions::default();

    let mut attempt = 1;
    loop {
        match client.generate(model, &prompt, &options).await {
            Ok(reply) => return Ok(reply),
            Err(err) if attempt < MAX_ATTEMPTS => {
                warn!(id = %record.id, attempt, error = %err, "Model request failed, retrying");
                tokio::time::sleep(RETRY_BACKOFF).await;
                attempt += 1;
            }
            Err(err) => return Err(ReelmarkError::ModelRequest(err.to_string())),
        }
    }
}

/// Prompt with clearly separated sections so the model does not confuse
/// the author name with a title.
fn build_prompt(record: &Record) -> String {
    let author = if record.author.is_empty() {
        "Unknown"
    } else {
        &record.author
    };
    let quoted_text = record
        .quoted
        .as_ref()
        .map(|quoted| quoted.text.as_str())
        .unwrap_or("");

    let mut links: Vec<&str> = record.links.iter().map(String::as_str).collect();
    if let Some(quoted) = &record.quoted {
        links.extend(quoted.links.iter().map(String::as_str));
    }
    let urls = if links.is_empty() {
        "None".to_string()
    } else {
        links.join(", ")
    };

    format!(
        "Extract structured information from this post.\n\n\
         AUTHOR (SKIP THIS): {author}\n\n\
         MAIN TEXT:\n{text}\n\n\
         QUOTED TEXT:\n{quoted_text}\n\n\
         URLS IN POST:\n{urls}\n\n\
         CRITICAL: the author name is never a title. Take titles only from \
         the MAIN TEXT section.\n\n\
         Reply with these labeled lines, skipping any field you cannot find:\n\
         TITLE: [movie or TV show name, never the author]\n\
         URL: [file sharing URL]\n\
         QUALITY: [video quality or format]\n\
         TYPE: [Movie/TV/Documentary/etc]\n\
         SUMMARY: [one line description]",
        text = record.text,
    )
}

/// Parse a model reply line by line for labeled fields. List fields append
/// every valid occurrence; the summary keeps the last valid one.
pub fn parse_response(reply: &str, author: &str) -> Enrichment {
    let mut enrichment = Enrichment::default();
    for line in reply.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(value) = labeled(line, "TITLE:") {
            if is_valid_title(value, author) {
                enrichment.titles.push(value.to_string());
            }
        } else if let Some(value) = labeled(line, "URL:") {
            if is_valid_url(value) {
                enrichment.urls.push(value.to_string());
            }
        } else if let Some(value) = labeled(line, "QUALITY:") {
            if is_valid_quality(value) {
                enrichment.qualities.push(value.to_string());
            }
        } else if let Some(value) = labeled(line, "TYPE:") {
            if is_valid_type(value) {
                enrichment.types.push(value.to_string());
            }
        } else if let Some(value) = labeled(line, "SUMMARY:") {
            if is_valid_summary(value) {
                enrichment.summary = value.to_string();
            }
        }
    }
    enrichment
}

fn labeled<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    line.strip_prefix(label).map(str::trim)
}

fn is_valid_title(title: &str, author: &str) -> bool {
    let lower = title.to_lowercase();
    !title.is_empty()
        && title.len() > 2
        && lower != "none"
        && lower != author.to_lowercase()
        && !TITLE_DENYLIST.iter().any(|noun| lower.contains(noun))
        && !looks_like_person_name(title)
}

fn looks_like_person_name(text: &str) -> bool {
    if PERSON_SHAPE_RES.iter().any(|re| re.is_match(text)) {
        return true;
    }
    if FIRST_LAST_RE.is_match(text) {
        let first = text.split_whitespace().next().unwrap_or("");
        return COMMON_GIVEN_NAMES.contains(&first.to_lowercase().as_str());
    }
    false
}

fn is_valid_url(url: &str) -> bool {
    !url.is_empty()
        && (url.contains("http")
            || URL_HOST_FRAGMENTS
                .iter()
                .any(|fragment| url.contains(fragment)))
        && url.to_lowercase() != "none"
        && url.len() > 10
}

fn is_valid_quality(quality: &str) -> bool {
    let lower = quality.to_lowercase();
    !quality.is_empty() && lower != "none" && QUALITY_TOKENS.iter().any(|token| lower.contains(token))
}

fn is_valid_type(kind: &str) -> bool {
    let lower = kind.to_lowercase();
    !kind.is_empty() && lower != "none" && TYPE_TOKENS.iter().any(|token| lower.contains(token))
}

fn is_valid_summary(summary: &str) -> bool {
    !summary.is_empty() && summary.to_lowercase() != "none" && summary.len() > 5
}

fn summarize(records: &[Record]) -> EnrichmentSummary {
    let mut titles = BTreeSet::new();
    let mut urls = BTreeSet::new();
    let mut qualities = BTreeSet::new();
    let mut types = BTreeSet::new();
    for record in records {
        if let Some(enrichment) = &record.enrichment {
            titles.extend(enrichment.titles.iter().cloned());
            urls.extend(enrichment.urls.iter().cloned());
            qualities.extend(enrichment.qualities.iter().cloned());
            types.extend(enrichment.types.iter().cloned());
        }
    }
    EnrichmentSummary {
        unique_titles: titles.len(),
        unique_urls: urls.len(),
        quality_formats: qualities.into_iter().collect(),
        types: types.into_iter().collect(),
        sample_titles: titles.into_iter().take(10).collect(),
    }
}
