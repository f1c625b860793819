//! News page content extraction
//!
//! Fetches an article page and reduces it to a clean `(title, body)` pair.
//! The body is chosen by a tiered heuristic over the parsed element tree:
//! - Content regions (`article`, content-like `div` class or id, `main`, `section`)
//! - Every substantial `p` element
//! - Sentence-like runs of the whole document text
//!
//! Extraction never fails: fetch or parse problems produce an empty body and a
//! title derived from the URL.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::model::ExtractedPage;
use crate::rate_limit::HostPacer;

/// Longest body handed downstream, in chars
pub const MAX_BODY_CHARS: usize = 15_000;
/// A region must carry more raw markup than this to be accepted
pub const REGION_MIN_CHARS: usize = 500;
/// Paragraphs with this much raw markup or less are ignored
pub const PARAGRAPH_MIN_CHARS: usize = 30;
/// Bodies shorter than this trigger the sentence fallback
pub const SHORT_BODY_CHARS: usize = 300;
/// Sentence units must be longer than this to be kept
pub const SENTENCE_MIN_CHARS: usize = 50;

const NOISE_ELEMENTS: &[&str] = &["script", "style", "nav", "header", "footer", "aside", "iframe"];
const CONTENT_KEYWORDS: &[&str] = &[
    "content", "article", "post", "news", "materia", "texto", "entry", "body", "main",
];
const SECTION_KEYWORDS: &[&str] = &["content", "article", "post", "news", "materia"];

// Selector strings are constants; parse cannot fail.
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static ARTICLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static DIV_WITH_CLASS_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("div[class]").unwrap());
static DIV_WITH_ID_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("div[id]").unwrap());
static MAIN_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("main").unwrap());
static SECTION_WITH_CLASS_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("section[class]").unwrap());
static PARAGRAPH_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Which stage produced the body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionTier {
    /// A content region was accepted
    Region,
    /// Joined paragraphs
    Paragraphs,
    /// Sentence-like runs of the whole document
    Sentences,
    /// The page could not be fetched
    Failed,
}

impl std::fmt::Display for ExtractionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExtractionTier::Region => "region",
            ExtractionTier::Paragraphs => "paragraphs",
            ExtractionTier::Sentences => "sentences",
            ExtractionTier::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// An extracted page plus the stage that produced its body
#[derive(Debug, Clone, PartialEq)]
pub struct PageExtraction {
    pub page: ExtractedPage,
    pub tier: ExtractionTier,
}

impl PageExtraction {
    fn failed(url: &str) -> Self {
        Self {
            page: ExtractedPage {
                title: title_from_url(url),
                body: String::new(),
                source_url: url.to_string(),
            },
            tier: ExtractionTier::Failed,
        }
    }
}

/// Fetches pages and reduces them to clean text
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    client: reqwest::Client,
    max_body_bytes: usize,
    pacer: Option<HostPacer>,
}

impl ContentExtractor {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(build_headers(config)?)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client for page fetches")?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
            pacer: None,
        })
    }

    /// Space fetches to the same host through `pacer`.
    pub fn with_pacer(mut self, pacer: HostPacer) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Fetch `url` and extract its title and body.
    pub async fn extract(&self, url: &str) -> ExtractedPage {
        self.extract_with_tier(url).await.page
    }

    pub async fn extract_with_tier(&self, url: &str) -> PageExtraction {
        let extraction = match self.fetch(url).await {
            Ok(html) => extract_from_html(&html, url),
            Err(e) => {
                warn!("{}", e);
                PageExtraction::failed(url)
            }
        };

        debug!(
            "Extracted {} chars from {} (tier: {}, title: '{}')",
            extraction.page.body.chars().count(),
            url,
            extraction.tier,
            extraction.page.title
        );
        extraction
    }

    async fn fetch(&self, url: &str) -> MonitorResult<String> {
        let fetch_error = |reason: String| MonitorError::Fetch {
            url: url.to_string(),
            reason,
        };

        let parsed = url::Url::parse(url).map_err(|e| fetch_error(format!("invalid URL: {}", e)))?;
        if let (Some(pacer), Some(host)) = (&self.pacer, parsed.host_str()) {
            pacer.acquire(host).await;
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        debug!("GET {} -> {}", url, status);
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status)));
        }

        read_response_body_capped(response, self.max_body_bytes)
            .await
            .map_err(|e| fetch_error(e.to_string()))
    }
}

fn build_headers(config: &HttpConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("Invalid header name in http.headers: '{}'", name))?;
        let header_value = HeaderValue::from_str(value)
            .with_context(|| format!("Invalid value for header '{}'", name))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

/// Read a response body with a size cap to prevent memory exhaustion from
/// oversized responses. Streams chunks and stops once `max_bytes` is reached.
pub async fn read_response_body_capped(response: reqwest::Response, max_bytes: usize) -> Result<String> {
    use futures::StreamExt;

    let mut body = Vec::with_capacity(max_bytes.min(256 * 1024));
    let mut stream = response.bytes_stream();
    let mut total = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Stream read error")?;
        let remaining = max_bytes.saturating_sub(total);
        if remaining == 0 {
            debug!("HTTP response truncated at {} bytes (limit: {})", total, max_bytes);
            break;
        }
        let take = chunk.len().min(remaining);
        body.extend_from_slice(&chunk[..take]);
        total += take;
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Extract title and body from already-fetched markup.
pub fn extract_from_html(html: &str, url: &str) -> PageExtraction {
    let mut document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|title| normalize_whitespace(&element_text(title)))
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| title_from_url(url));

    strip_noise(&mut document);

    let (mut body, mut tier) = match find_content_region(&document) {
        Some(region) => (normalize_whitespace(&element_text(region)), ExtractionTier::Region),
        None => (collect_paragraphs(&document), ExtractionTier::Paragraphs),
    };

    if body.chars().count() < SHORT_BODY_CHARS {
        debug!(
            "Body from {} tier is {} chars, falling back to sentences",
            tier,
            body.chars().count()
        );
        body = sentence_fallback(&document);
        tier = ExtractionTier::Sentences;
    }

    PageExtraction {
        page: ExtractedPage {
            title,
            body: truncate_chars(&body, MAX_BODY_CHARS),
            source_url: url.to_string(),
        },
        tier,
    }
}

/// Detach scripts, styles, comments and page chrome from the tree.
fn strip_noise(document: &mut Html) {
    let noise: Vec<_> = document
        .tree
        .nodes()
        .filter(|node| match node.value() {
            Node::Comment(_) => true,
            Node::Element(element) => NOISE_ELEMENTS.contains(&element.name()),
            _ => false,
        })
        .map(|node| node.id())
        .collect();

    for id in noise {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// First element, tier by tier, whose inner markup is long enough.
///
/// Queries start at the root element: `Html::select` walks every node in the
/// arena, detached noise included.
fn find_content_region(document: &Html) -> Option<ElementRef<'_>> {
    let root = document.root_element();
    let long_enough = |element: &ElementRef| element.inner_html().chars().count() > REGION_MIN_CHARS;

    root.select(&ARTICLE_SELECTOR)
        .find(long_enough)
        .or_else(|| {
            root.select(&DIV_WITH_CLASS_SELECTOR)
                .filter(|div| attribute_has_keyword(div, "class", CONTENT_KEYWORDS))
                .find(long_enough)
        })
        .or_else(|| {
            root.select(&DIV_WITH_ID_SELECTOR)
                .filter(|div| attribute_has_keyword(div, "id", CONTENT_KEYWORDS))
                .find(long_enough)
        })
        .or_else(|| root.select(&MAIN_SELECTOR).find(long_enough))
        .or_else(|| {
            root.select(&SECTION_WITH_CLASS_SELECTOR)
                .filter(|section| attribute_has_keyword(section, "class", SECTION_KEYWORDS))
                .find(long_enough)
        })
}

fn attribute_has_keyword(element: &ElementRef, attribute: &str, keywords: &[&str]) -> bool {
    element
        .value()
        .attr(attribute)
        .map(|value| {
            let value = value.to_lowercase();
            keywords.iter().any(|keyword| value.contains(keyword))
        })
        .unwrap_or(false)
}

fn collect_paragraphs(document: &Html) -> String {
    let paragraphs: Vec<String> = document
        .root_element()
        .select(&PARAGRAPH_SELECTOR)
        .filter(|p| p.inner_html().chars().count() > PARAGRAPH_MIN_CHARS)
        .map(element_text)
        .collect();

    normalize_whitespace(&paragraphs.join(" "))
}

fn sentence_fallback(document: &Html) -> String {
    let all_text = normalize_whitespace(&element_text(document.root_element()));

    split_sentences(&all_text)
        .into_iter()
        .filter(|sentence| sentence.chars().count() > SENTENCE_MIN_CHARS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split after `.`, `!` or `?` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let end = i + c.len_utf8();
        if let Some(&(next, ws)) = chars.peek() {
            if ws.is_whitespace() {
                sentences.push(&text[start..end]);
                // Skip the whole whitespace run
                let mut resume = next;
                while let Some(&(j, w)) = chars.peek() {
                    if !w.is_whitespace() {
                        break;
                    }
                    resume = j + w.len_utf8();
                    chars.next();
                }
                start = resume;
            }
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Text nodes of `element`, separated so that tags act as word breaks.
fn element_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace runs (including non-breaking spaces) and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// Fallback title: last path segment, percent-decoded, hyphens as spaces.
pub fn title_from_url(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    let segment = path.rsplit('/').next().unwrap_or_default().replace('-', " ");

    urlencoding::decode(&segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://noticias.example.com/economia/operacao-prende-socios-da-acme";

    fn filler(len: usize) -> String {
        "Os investigadores apontam movimentações suspeitas na conta da empresa. "
            .repeat(len / 70 + 1)
            .chars()
            .take(len)
            .collect()
    }

    #[test]
    fn test_article_region_beats_paragraphs() {
        let article = filler(600);
        let html = format!(
            "<html><head><title>Operação Acme</title></head><body>\
             <p>Este parágrafo fica fora do artigo principal da página.</p>\
             <article>{}</article></body></html>",
            article
        );
        let extraction = extract_from_html(&html, URL);

        assert_eq!(extraction.tier, ExtractionTier::Region);
        assert_eq!(extraction.page.title, "Operação Acme");
        assert_eq!(extraction.page.body, normalize_whitespace(&article));
        assert!(!extraction.page.body.contains("fora do artigo"));
    }

    #[test]
    fn test_short_article_falls_back_to_paragraphs() {
        let paragraph = filler(200);
        let html = format!(
            "<html><body><article>curto</article><p>{}</p><p>{}</p><p>tiny</p></body></html>",
            paragraph, paragraph
        );
        let extraction = extract_from_html(&html, URL);

        assert_eq!(extraction.tier, ExtractionTier::Paragraphs);
        assert_eq!(
            extraction.page.body,
            normalize_whitespace(&format!("{} {}", paragraph, paragraph))
        );
    }

    #[test]
    fn test_div_class_keyword_is_case_insensitive() {
        let text = filler(550);
        let html = format!(
            "<html><body><div class=\"sidebar\">{}</div><div class=\"Materia-Corpo\">{}</div></body></html>",
            filler(520),
            text
        );
        let extraction = extract_from_html(&html, URL);

        assert_eq!(extraction.tier, ExtractionTier::Region);
        assert_eq!(extraction.page.body, normalize_whitespace(&text));
    }

    #[test]
    fn test_div_id_tier() {
        let text = filler(700);
        let html = format!("<html><body><div id=\"texto-principal\">{}</div></body></html>", text);
        let extraction = extract_from_html(&html, URL);

        assert_eq!(extraction.tier, ExtractionTier::Region);
        assert_eq!(extraction.page.body, normalize_whitespace(&text));
    }

    #[test]
    fn test_noise_is_stripped() {
        let text = filler(600);
        let html = format!(
            "<html><head><style>body {{ color: red; }}</style></head><body>\
             <article><script>var tracking = 1;</script><!-- comentário -->\
             <nav>Menu Início</nav>{}<aside>Leia também</aside></article></body></html>",
            text
        );
        let body = extract_from_html(&html, URL).page.body;

        for noise in ["tracking", "comentário", "Menu Início", "Leia também", "color"] {
            assert!(!body.contains(noise), "'{}' should have been stripped", noise);
        }
    }

    #[test]
    fn test_region_inside_header_is_ignored() {
        let menu = "Menu item navegação ".repeat(45);
        let text = filler(600);
        let html = format!(
            "<html><body><header><article>{}</article></header>\
             <div class=\"materia\">{}</div></body></html>",
            menu, text
        );
        let extraction = extract_from_html(&html, URL);

        assert_eq!(extraction.tier, ExtractionTier::Region);
        assert_eq!(extraction.page.body, normalize_whitespace(&text));
    }

    #[test]
    fn test_paragraphs_inside_page_chrome_are_ignored() {
        let paragraph = filler(200);
        let html = format!(
            "<html><body><nav><p>Menu principal do portal com links para todas as editorias.</p></nav>\
             <p>{}</p><p>{}</p>\
             <footer><p>Todos os direitos reservados ao portal e aos seus parceiros.</p></footer></body></html>",
            paragraph, paragraph
        );
        let extraction = extract_from_html(&html, URL);

        assert_eq!(extraction.tier, ExtractionTier::Paragraphs);
        assert!(!extraction.page.body.contains("Menu principal"));
        assert!(!extraction.page.body.contains("direitos reservados"));
        assert_eq!(
            extraction.page.body,
            normalize_whitespace(&format!("{} {}", paragraph, paragraph))
        );
    }

    #[test]
    fn test_character_references_are_decoded() {
        let text = format!("Sócios &amp; diretores da Acme &lt;Holding&gt; foram &quot;ouvidos&quot;&nbsp;hoje. {}", filler(400));
        let html = format!("<html><body><article>{}</article></body></html>", text);
        let body = extract_from_html(&html, URL).page.body;

        assert!(body.starts_with("Sócios & diretores da Acme <Holding> foram \"ouvidos\" hoje."), "got: {}", body);
    }

    #[test]
    fn test_only_short_text_yields_empty_body() {
        let html = "<html><body><p>Curto.</p><p>Também curto.</p><p>Ok!</p></body></html>";
        let extraction = extract_from_html(html, URL);

        assert_eq!(extraction.tier, ExtractionTier::Sentences);
        assert_eq!(extraction.page.body, "");
    }

    #[test]
    fn test_sentence_fallback_keeps_long_units() {
        let long = "A Polícia Federal deflagrou nesta manhã uma operação contra a lavagem de dinheiro.";
        let html = format!(
            "<html><body><span>Curta frase. {} Outra curta!</span></body></html>",
            long
        );
        let extraction = extract_from_html(&html, URL);

        assert_eq!(extraction.tier, ExtractionTier::Sentences);
        assert_eq!(extraction.page.body, long);
    }

    #[test]
    fn test_body_truncated_to_char_limit() {
        let html = format!("<html><body><article>{}</article></body></html>", "ç".repeat(20_000));
        let body = extract_from_html(&html, URL).page.body;
        assert_eq!(body.chars().count(), MAX_BODY_CHARS);
    }

    #[test]
    fn test_missing_or_blank_title_uses_url() {
        let html = "<html><head><title>   </title></head><body></body></html>";
        let extraction = extract_from_html(html, URL);
        assert_eq!(extraction.page.title, "operacao prende socios da acme");
    }

    #[test]
    fn test_title_from_url() {
        assert_eq!(
            title_from_url("https://g.example/noticia/s%C3%B3cios-da-acme?utm=x"),
            "sócios da acme"
        );
        assert_eq!(title_from_url("https://g.example/"), "");
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("Um. Dois!  Três? Quatro.Cinco"),
            vec!["Um.", "Dois!", "Três?", "Quatro.Cinco"]
        );
    }
}
