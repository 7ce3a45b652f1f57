//! Direct article retrieval.
//!
//! Fetches the article page itself, presenting a browser user-agent, and
//! keeps its main content: the first `<article>`, else `<main>`, else
//! `<body>`, after scripts, styles and page chrome are cut out. Markup is
//! handled lexically, like the other HTML helpers in this crate.

use super::reader::{
    read_limited_text, ContentError, ContentExtractor, ExtractedContent, BROWSER_USER_AGENT,
    MAX_CONTENT_SIZE, MAX_RETRIES, REQUEST_TIMEOUT,
};
use crate::util::{validate_link, UrlValidationError};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::time::Duration;
use url::Url;

/// Checks an article link before it is fetched.
pub type LinkCheck = fn(&str) -> Result<Url, UrlValidationError>;

/// Elements dropped wholesale before the main content is picked.
const NOISE_ELEMENTS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "iframe", "nav", "header",
    "footer", "aside", "form",
];

/// Containers tried in order for the main content.
const CONTENT_ELEMENTS: &[&str] = &["article", "main", "body"];

/// Tags that start or end a line of plain text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "hr", "li", "ul", "ol", "dd", "dt", "h1", "h2", "h3", "h4", "h5", "h6",
    "pre", "blockquote", "section", "article", "main", "table", "tr", "figure", "figcaption",
];

/// [`ContentExtractor`] that requests the article page from its own host.
pub struct PageExtractor {
    client: reqwest::Client,
    link_check: LinkCheck,
    retry_base: Duration,
}

impl PageExtractor {
    /// Links are checked with [`validate_link`], so internal hosts are refused.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            link_check: validate_link,
            retry_base: Duration::from_secs(1),
        }
    }

    /// Overrides the first retry delay (doubles on each retry).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Replaces the check applied to every article link.
    pub fn with_link_check(mut self, check: LinkCheck) -> Self {
        self.link_check = check;
        self
    }

    async fn fetch_with_retry(&self, url: &Url) -> Result<String, ContentError> {
        let mut retry_count = 0;

        loop {
            match self.fetch_once(url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && retry_count < MAX_RETRIES => {
                    let delay = self.retry_base * 2u32.pow(retry_count);
                    tracing::debug!(
                        url = %url,
                        error = %e,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying article fetch after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<String, ContentError> {
        let request = self
            .client
            .get(url.clone())
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "text/html,application/xhtml+xml");

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| ContentError::Timeout)?
            .map_err(ContentError::Network)?;

        if !response.status().is_success() {
            return Err(ContentError::HttpStatus(response.status().as_u16()));
        }

        read_limited_text(response, MAX_CONTENT_SIZE).await
    }
}

#[async_trait]
impl ContentExtractor for PageExtractor {
    async fn extract(&self, link: &str) -> Result<ExtractedContent, ContentError> {
        let url = (self.link_check)(link)?;
        let page = self.fetch_with_retry(&url).await?;

        let content = extract_main_content(&page);
        if content.text.is_empty() {
            tracing::debug!(link = %link, page_len = page.len(), "No readable text on page");
            return Err(ContentError::Empty);
        }
        Ok(content)
    }
}

/// Picks the main content of an HTML page as formatted HTML plus plain text.
pub fn extract_main_content(page: &str) -> ExtractedContent {
    let mut cleaned = remove_comments(page);
    for name in NOISE_ELEMENTS {
        cleaned = remove_elements(&cleaned, name);
    }

    let main = CONTENT_ELEMENTS
        .iter()
        .find_map(|name| inner_html(&cleaned, name).filter(|inner| !html_to_text(inner).is_empty()))
        .unwrap_or(cleaned.as_str())
        .trim();

    ExtractedContent {
        raw_html: main.to_string(),
        text: html_to_text(main),
    }
}

fn remove_comments(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        rest = match rest[start..].find("-->") {
            Some(end) => &rest[start + end + 3..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Offset of the next `prefix` (`<name` or `</name`) at or after `from`
/// that is a whole tag name.
fn find_tag(lower: &str, prefix: &str, mut from: usize) -> Option<usize> {
    while let Some(pos) = lower.get(from..)?.find(prefix) {
        let at = from + pos;
        match lower.as_bytes().get(at + prefix.len()) {
            None => return None,
            Some(b) if *b == b'>' || *b == b'/' || b.is_ascii_whitespace() => return Some(at),
            Some(_) => from = at + prefix.len(),
        }
    }
    None
}

/// Byte span of the first `name` element at or after `from`:
/// `(open tag start, content start, content end, close tag end)`.
///
/// Offsets are found in the lowercased text and are valid for the original,
/// since ASCII lowercasing keeps every byte in place. Nested elements of the
/// same name are matched by depth; an unclosed element runs to the end.
fn element_span(lower: &str, name: &str, from: usize) -> Option<(usize, usize, usize, usize)> {
    let open_prefix = format!("<{}", name);
    let close_prefix = format!("</{}", name);

    let open = find_tag(lower, &open_prefix, from)?;
    let content_start = open + lower[open..].find('>')? + 1;
    if lower[open..content_start].ends_with("/>") {
        return Some((open, content_start, content_start, content_start));
    }

    let mut depth = 1usize;
    let mut cursor = content_start;
    loop {
        let Some(close) = find_tag(lower, &close_prefix, cursor) else {
            return Some((open, content_start, lower.len(), lower.len()));
        };
        match find_tag(lower, &open_prefix, cursor) {
            Some(nested) if nested < close => {
                depth += 1;
                cursor = nested + open_prefix.len();
            }
            _ => {
                depth -= 1;
                let close_end = lower[close..]
                    .find('>')
                    .map_or(lower.len(), |i| close + i + 1);
                if depth == 0 {
                    return Some((open, content_start, close, close_end));
                }
                cursor = close_end;
            }
        }
    }
}

fn remove_elements(html: &str, name: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    while let Some((start, _, _, end)) = element_span(&lower, name, cursor) {
        out.push_str(&html[cursor..start]);
        cursor = end;
    }
    out.push_str(&html[cursor..]);
    out
}

fn inner_html<'a>(html: &'a str, name: &str) -> Option<&'a str> {
    let lower = html.to_ascii_lowercase();
    let (_, start, end, _) = element_span(&lower, name, 0)?;
    Some(&html[start..end])
}

fn is_block_tag(tag: &str) -> bool {
    let name: String = tag
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    BLOCK_ELEMENTS.contains(&name.as_str())
}

/// Plain text of an HTML fragment, one block per line.
fn html_to_text(fragment: &str) -> String {
    let mut flat = String::with_capacity(fragment.len());
    let mut rest = fragment;
    while let Some(open) = rest.find('<') {
        push_flat(&mut flat, &rest[..open]);
        let tag = &rest[open + 1..];
        match tag.find('>') {
            Some(close) => {
                if is_block_tag(&tag[..close]) {
                    flat.push('\n');
                }
                rest = &tag[close + 1..];
            }
            None => {
                push_flat(&mut flat, &rest[open..]);
                rest = "";
            }
        }
    }
    push_flat(&mut flat, rest);

    decode_entities(&flat)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Source line breaks are not text breaks; only block tags end a line.
fn push_flat(out: &mut String, chunk: &str) {
    out.extend(chunk.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&after[..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            return char::from_u32(value);
        }
    };
    Some(c)
}
