use crate::types::{EpisodeDraft, EpisodeMode, NewsletterItem, SourceItem};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

static NUMERIC_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(20\d{2})[-/.](\d{1,2})[-/.](\d{1,2})").expect("valid numeric date regex")
});
static CJK_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(20\d{2})年(\d{1,2})月(\d{1,2})日").expect("valid cjk date regex")
});
static MONTH_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec|january|february|march|april|june|july|august|september|october|november|december)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(20\d{2})\b",
    )
    .expect("valid month date regex")
});

const MAX_SLUG_LEN: usize = 100;

/// Groups new items into episode drafts according to the configured mode.
#[derive(Debug, Clone)]
pub struct EpisodeBuilder {
    mode: EpisodeMode,
    feed_name: String,
    default_author: Option<String>,
}

impl EpisodeBuilder {
    pub fn new(mode: EpisodeMode, feed_name: impl Into<String>) -> Self {
        Self {
            mode,
            feed_name: feed_name.into(),
            default_author: None,
        }
    }

    /// Author read out for items whose feed entry names none.
    pub fn with_default_author(mut self, author: impl Into<String>) -> Self {
        let author = author.into();
        self.default_author = Some(author).filter(|a| !a.trim().is_empty());
        self
    }

    fn author_of<'a>(&'a self, item: &'a NewsletterItem) -> Option<&'a str> {
        item.author
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .or(self.default_author.as_deref())
    }

    pub fn mode(&self) -> EpisodeMode {
        self.mode
    }

    /// Items are ordered oldest first (ties by identity key) before grouping,
    /// so the result does not depend on the order the feed listed them in.
    pub fn build(&self, mut items: Vec<SourceItem>, now: DateTime<Utc>) -> Vec<EpisodeDraft> {
        if items.is_empty() {
            return Vec::new();
        }
        items.sort_by(|a, b| {
            a.item
                .published_at
                .cmp(&b.item.published_at)
                .then_with(|| a.key.cmp(&b.key))
        });

        let drafts = match self.mode {
            EpisodeMode::Compilation => vec![self.compilation_draft(items, now)],
            EpisodeMode::Separate => items
                .into_iter()
                .map(|item| self.separate_draft(item, now))
                .collect(),
        };
        debug!("Built {} {} draft(s)", drafts.len(), self.mode);
        drafts
    }

    fn separate_draft(&self, source: SourceItem, now: DateTime<Utc>) -> EpisodeDraft {
        let sources = vec![source];
        let episode_id = episode_id(EpisodeMode::Separate, &sources);
        let source = &sources[0];
        let item = &source.item;

        let published_at = item.published_at;
        let date = effective_date(&item.title, published_at);
        let title = format!("{}: {} — {}", self.feed_name, date, item.title);
        let text = join_speech(
            &speech_header(&item.title, self.author_of(item)),
            &source.content.text,
        );
        let description_html = source.content.description_html.clone();
        let slug = format!(
            "{}-{}",
            truncate_slug(&slugify(&format!("{}-{}", date, item.title))),
            id_suffix(&episode_id)
        );

        EpisodeDraft {
            description_html,
            published_at,
            episode_id,
            mode: EpisodeMode::Separate,
            title,
            text,
            created_at: now,
            slug,
            source_items: sources,
        }
    }

    fn compilation_draft(&self, sources: Vec<SourceItem>, now: DateTime<Utc>) -> EpisodeDraft {
        let episode_id = episode_id(EpisodeMode::Compilation, &sources);

        // Sorted oldest first, so the last item is the latest one
        let latest = &sources[sources.len() - 1].item;
        let published_at = latest.published_at;
        let date = effective_date(&latest.title, published_at);

        let mut parts = Vec::with_capacity(sources.len() * 2);
        let mut paragraphs = String::new();
        let mut included = String::new();
        for (idx, source) in sources.iter().enumerate() {
            let n = idx + 1;
            let item = &source.item;
            parts.push(format!(
                "Item {}: {}",
                n,
                speech_header(&item.title, self.author_of(item))
            ));
            if !source.content.text.is_empty() {
                parts.push(source.content.text.clone());
            }

            let title = html_escape::encode_text(&item.title);
            paragraphs.push_str(&format!(
                "<p><strong>{}. {}</strong></p>{}",
                n, title, source.content.description_html
            ));
            included.push_str(&format!(
                "<li><a href=\"{}\">{}</a></li>",
                html_escape::encode_double_quoted_attribute(&item.link),
                title
            ));
        }

        EpisodeDraft {
            title: format!("{}: {}", self.feed_name, date),
            text: parts.join("\n\n"),
            description_html: format!("{}<p>Included items:</p><ul>{}</ul>", paragraphs, included),
            slug: format!("{}-{}", date, id_suffix(&episode_id)),
            episode_id,
            mode: EpisodeMode::Compilation,
            published_at,
            created_at: now,
            source_items: sources,
        }
    }
}

/// `<title>. By <author>.` with the author sentence omitted when unknown.
fn speech_header(title: &str, author: Option<&str>) -> String {
    let title = title.trim().trim_end_matches('.');
    match author.map(str::trim).filter(|a| !a.is_empty()) {
        Some(author) => format!("{}. By {}.", title, author),
        None => format!("{}.", title),
    }
}

fn join_speech(header: &str, body: &str) -> String {
    if body.is_empty() {
        header.to_string()
    } else {
        format!("{} {}", header, body)
    }
}

/// Deterministic id over the sorted `(key, fingerprint)` pairs and the mode.
/// A changed fingerprint yields a new id.
pub fn episode_id(mode: EpisodeMode, sources: &[SourceItem]) -> String {
    let mut pairs: Vec<(&str, &str)> = sources
        .iter()
        .map(|s| (s.key.as_str(), s.fingerprint.as_str()))
        .collect();
    pairs.sort_unstable();

    let mut hasher = Sha256::new();
    for (key, fingerprint) in pairs {
        hasher.update(key.as_bytes());
        hasher.update([0x1f]);
        hasher.update(fingerprint.as_bytes());
        hasher.update([0x1e]);
    }
    hasher.update(mode.as_str().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}", mode.as_str(), &digest[..16])
}

fn id_suffix(episode_id: &str) -> &str {
    let hash = episode_id.rsplit('-').next().unwrap_or(episode_id);
    &hash[..hash.len().min(8)]
}

fn effective_date(title: &str, published_at: DateTime<Utc>) -> NaiveDate {
    extract_date_from_title(title).unwrap_or_else(|| published_at.date_naive())
}

/// Finds a calendar date inside a newsletter title.
pub fn extract_date_from_title(title: &str) -> Option<NaiveDate> {
    let ymd = |y: &str, m: &str, d: &str| -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
    };

    if let Some(caps) = NUMERIC_DATE_RE.captures(title) {
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            return Some(date);
        }
    }
    if let Some(caps) = CJK_DATE_RE.captures(title) {
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            return Some(date);
        }
    }
    let caps = MONTH_DATE_RE.captures(title)?;
    let month = month_number(&caps[1])?;
    NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month, caps[2].parse().ok()?)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.to_lowercase().chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Lower-case alphanumerics separated by single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "episode".to_string()
    } else {
        slug.to_string()
    }
}

fn truncate_slug(slug: &str) -> String {
    slug.chars()
        .take(MAX_SLUG_LEN)
        .collect::<String>()
        .trim_end_matches('-')
        .to_string()
}
