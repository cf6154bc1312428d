use crate::config::CleanConfig;
use crate::types::CleanedContent;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid normalizer regex")
}

// The regex crate has no backreferences, so every dropped element gets its own pattern
static DROPPED_ELEMENTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "style", "noscript", "figure", "figcaption"]
        .iter()
        .map(|tag| re(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")))
        .chain([re(r"(?is)<img\b[^>]*>")])
        .collect()
});
static AD_CANDIDATES: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["p", "div", "section"]
        .iter()
        .map(|tag| re(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")))
        .collect()
});
static BLOCK_END_RE: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)</(?:p|div|section|article|h[1-6]|li|blockquote|ul|ol|tr|table)\s*>")
});
static BREAK_RE: Lazy<Regex> = Lazy::new(|| re(r"(?i)<br\s*/?>"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| re(r"(?s)<[^>]*>"));
static PARAGRAPH_SPLIT_RE: Lazy<Regex> = Lazy::new(|| re(r"\n[ \t\r\f\v]*\n"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| re(r"\s+"));
static BRACKET_LETTER_RE: Lazy<Regex> = Lazy::new(|| re(r"\[([A-Za-z])\]"));
static MD_IMAGE_RE: Lazy<Regex> = Lazy::new(|| re(r"!\[([^\]]*)\]\([^)]+\)"));
static MD_LINK_RE: Lazy<Regex> = Lazy::new(|| re(r"\[([^\]]+)\]\([^)]+\)"));
static MD_UNDERSCORE_RE: Lazy<Regex> = Lazy::new(|| re(r"\b_([^_]+)_\b"));
static MD_HEADING_RE: Lazy<Regex> = Lazy::new(|| re(r"^\s{0,3}#{1,6}\s+"));
static MD_QUOTE_RE: Lazy<Regex> = Lazy::new(|| re(r"^\s*>\s?"));
static BULLET_RE: Lazy<Regex> = Lazy::new(|| re(r"^\s*[-*•]\s+"));
static COLON_SPACING_RE: Lazy<Regex> = Lazy::new(|| re(r":([A-Za-z])"));
static NOISE_LINE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^\s*(?:URL\s*Source|Markdown\s*Content)\b",
        r"(?i)^\s*!?\s*Image\b",
        r"(?i)^\s*Illustration\b",
        r"(?i)^\s*(?:Publish|Published)\s*Time:\s*\d{4}-\d{2}-\d{2}",
        r"(?i)^\s*Title\s*:",
        r"(?i)^\s*Share this story\.?\s*$",
        r"(?i)^\s*Thanks to\b",
    ]
    .iter()
    .map(|p| re(p))
    .collect()
});
static NOISE_INLINE_RE: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\b(?:URL\s*Source|Markdown\s*Content)\b\s*:?\s*\S+"));
static EMOJI_RE: Lazy<Regex> = Lazy::new(|| {
    re(concat!(
        r"[\x{1F600}-\x{1F64F}",
        r"\x{1F300}-\x{1F5FF}",
        r"\x{1F680}-\x{1F6FF}",
        r"\x{1F1E0}-\x{1F1FF}",
        r"\x{2700}-\x{27BF}",
        r"\x{1F900}-\x{1F9FF}",
        r"\x{2600}-\x{26FF}]",
    ))
});

/// Turns newsletter HTML into text suitable for speech synthesis.
#[derive(Debug, Clone)]
pub struct ContentNormalizer {
    remove_emoji: bool,
    ad_keywords: Vec<String>,
}

impl ContentNormalizer {
    pub fn new(config: &CleanConfig) -> Self {
        let ad_keywords = if config.remove_ads {
            config
                .ad_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        } else {
            Vec::new()
        };
        Self {
            remove_emoji: config.remove_emoji,
            ad_keywords,
        }
    }

    pub fn clean(&self, html: &str) -> CleanedContent {
        let mut markup = html.to_string();
        for pattern in DROPPED_ELEMENTS.iter() {
            markup = pattern.replace_all(&markup, "").into_owned();
        }
        if !self.ad_keywords.is_empty() {
            markup = self.drop_ad_blocks(&markup);
        }

        let markup = BLOCK_END_RE.replace_all(&markup, "\n\n");
        let markup = BREAK_RE.replace_all(&markup, "\n");
        let stripped = TAG_RE.replace_all(&markup, "");
        let decoded = html_escape::decode_html_entities(&stripped);

        let paragraphs: Vec<String> = PARAGRAPH_SPLIT_RE
            .split(&decoded)
            .filter_map(|raw| self.clean_paragraph(raw))
            .collect();

        debug!("Normalized content into {} paragraph(s)", paragraphs.len());

        let description_html = paragraphs
            .iter()
            .map(|p| format!("<p>{}</p>", html_escape::encode_text(p)))
            .collect();
        CleanedContent {
            text: paragraphs.join("\n\n"),
            description_html,
        }
    }

    fn drop_ad_blocks(&self, markup: &str) -> String {
        let mut markup = markup.to_string();
        for pattern in AD_CANDIDATES.iter() {
            markup = pattern
                .replace_all(&markup, |caps: &Captures| {
                    let text = TAG_RE.replace_all(&caps[0], " ").to_lowercase();
                    if self.ad_keywords.iter().any(|k| text.contains(k.as_str())) {
                        debug!("Dropping sponsored block");
                        String::new()
                    } else {
                        caps[0].to_string()
                    }
                })
                .into_owned();
        }
        markup
    }

    fn clean_paragraph(&self, raw: &str) -> Option<String> {
        let text = WHITESPACE_RE.replace_all(raw, " ");
        let text = text.trim();
        let text = BRACKET_LETTER_RE.replace_all(text, "$1");
        let text = strip_markdown(&text);
        if NOISE_LINE_RES.iter().any(|p| p.is_match(&text)) {
            return None;
        }
        let text = NOISE_INLINE_RE.replace_all(&text, "");
        let text = BULLET_RE.replace(&text, "");
        let mut text = COLON_SPACING_RE.replace_all(&text, ": $1").into_owned();
        if self.remove_emoji {
            text = EMOJI_RE.replace_all(&text, "").into_owned();
        }
        let text = WHITESPACE_RE.replace_all(&text, " ").trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

fn strip_markdown(text: &str) -> String {
    let text = MD_IMAGE_RE.replace_all(text, "$1");
    let text = MD_LINK_RE.replace_all(&text, "$1");
    let text = text.replace("**", "").replace("__", "").replace('`', "");
    let text = MD_UNDERSCORE_RE.replace_all(&text, "$1");
    let text = MD_HEADING_RE.replace(&text, "");
    MD_QUOTE_RE.replace(&text, "").into_owned()
}
