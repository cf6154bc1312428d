/// Text processing utilities
pub mod text {
    const SENTENCE_ENDS: &[char] = &['.', '!', '?', '。', '！', '？', '\n'];

    /// Splits text into chunks of at most `max_chars` characters, breaking at
    /// sentence ends where possible. Sentences longer than the limit are cut
    /// at character boundaries.
    pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
        let max_chars = max_chars.max(1);
        let mut sentences = Vec::new();
        let mut start = 0;
        for (idx, ch) in text.char_indices() {
            if SENTENCE_ENDS.contains(&ch) {
                let end = idx + ch.len_utf8();
                sentences.push(text[start..end].trim());
                start = end;
            }
        }
        if start < text.len() {
            sentences.push(text[start..].trim());
        }

        let mut chunks = Vec::new();
        let mut buf = String::new();
        let mut buf_len = 0;
        for sentence in sentences.into_iter().filter(|s| !s.is_empty()) {
            let len = sentence.chars().count();
            if buf_len > 0 && buf_len + 1 + len <= max_chars {
                buf.push(' ');
                buf.push_str(sentence);
                buf_len += 1 + len;
                continue;
            }
            if buf_len > 0 {
                chunks.push(std::mem::take(&mut buf));
                buf_len = 0;
            }
            if len <= max_chars {
                buf.push_str(sentence);
                buf_len = len;
            } else {
                let chars: Vec<char> = sentence.chars().collect();
                for piece in chars.chunks(max_chars) {
                    chunks.push(piece.iter().collect());
                }
            }
        }
        if buf_len > 0 {
            chunks.push(buf);
        }
        chunks
    }

    /// Groups blank-line separated paragraphs into chunks of roughly
    /// `max_chars` characters. A single long paragraph stays whole.
    pub fn chunk_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut buf = String::new();
        for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            let candidate = buf.chars().count() + 2 + paragraph.chars().count();
            if !buf.is_empty() && candidate > max_chars {
                chunks.push(std::mem::take(&mut buf));
            }
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(paragraph);
        }
        if !buf.is_empty() {
            chunks.push(buf);
        }
        chunks
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    /// Public URL for a file published under the site root.
    pub fn build_public_url(site_link: &str, rel_path: &str) -> String {
        format!(
            "{}/{}",
            site_link.trim_end_matches('/'),
            rel_path.trim_start_matches('/')
        )
    }

    /// Validate RSS feed URL format
    pub fn is_valid_feed_url(url_str: &str) -> bool {
        if let Ok(url) = Url::parse(url_str) {
            url.scheme() == "http" || url.scheme() == "https"
        } else {
            false
        }
    }
}

/// Time utilities
pub mod time {
    /// `HH:MM:SS` as expected by `itunes:duration`.
    pub fn format_itunes_duration(total_seconds: u64) -> String {
        format!(
            "{:02}:{:02}:{:02}",
            total_seconds / 3600,
            (total_seconds % 3600) / 60,
            total_seconds % 60
        )
    }
}

/// GitHub Actions workflow annotations
pub mod ci {
    use std::env;

    pub fn in_github_actions() -> bool {
        env::var("GITHUB_ACTIONS").map(|v| v == "true").unwrap_or(false)
    }

    /// Echoes an `::error::` annotation when running inside a workflow.
    pub fn notice_error(message: &str) {
        if in_github_actions() {
            println!("::error::{}", escape(message));
        }
    }

    fn escape(message: &str) -> String {
        message
            .replace('%', "%25")
            .replace('\r', "%0D")
            .replace('\n', "%0A")
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_break_at_sentences() {
        let chunks = text::split_into_chunks("One. Two! Three? Four.", 10);
        assert_eq!(chunks, vec!["One. Two!", "Three?", "Four."]);
    }

    #[test]
    fn long_sentences_are_cut() {
        let chunks = text::split_into_chunks("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
        assert!(text::split_into_chunks("   ", 4).is_empty());
    }

    #[test]
    fn chunks_respect_multibyte_text() {
        let chunks = text::split_into_chunks("你好。世界！", 3);
        assert_eq!(chunks, vec!["你好。", "世界！"]);
    }

    #[test]
    fn paragraphs_are_grouped() {
        let chunks = text::chunk_paragraphs("aaaa\n\nbbbb\n\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "cccc"]);
    }

    #[test]
    fn public_urls_join_cleanly() {
        assert_eq!(
            url::build_public_url("https://user.github.io/pod/", "/audio/2025/10/a.mp3"),
            "https://user.github.io/pod/audio/2025/10/a.mp3"
        );
        assert!(url::is_valid_feed_url("https://www.axios.com/feeds/feed.rss"));
        assert!(!url::is_valid_feed_url("ftp://example.com/feed"));
    }

    #[test]
    fn durations_render_as_clock() {
        assert_eq!(time::format_itunes_duration(0), "00:00:00");
        assert_eq!(time::format_itunes_duration(3725), "01:02:05");
    }
}
