//! HTML parser for extracting links and page content
//!
//! Produces everything a content record needs from one page: title, meta
//! description, visible text, and the absolute links to follow.

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Title used when a page has none
pub const DEFAULT_TITLE: &str = "No Title";

/// Description used when a page has no meta description
pub const DEFAULT_DESCRIPTION: &str = "No description";

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub title: String,
    pub description: String,
    /// Visible text with whitespace collapsed
    pub text_content: String,
    /// Absolute http(s) links, in document order, without duplicates
    pub links: Vec<String>,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs and fragment-only anchors
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The base URL for resolving relative links
///
/// # Example
///
/// ```
/// use fleetcrawl::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, "Test");
/// assert_eq!(parsed.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        description: extract_description(&document)
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        text_content: extract_text(&document),
        links: extract_links(&document, base_url),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn extract_description(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[name]").ok()?;

    document
        .select(&selector)
        .filter(|element| {
            element
                .value()
                .attr("name")
                .is_some_and(|name| name.eq_ignore_ascii_case("description"))
        })
        .find_map(|element| element.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
}

/// Collects text nodes of the body, skipping scripts and styles
fn extract_text(document: &Html) -> String {
    let root = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    let mut parts = Vec::new();
    collect_text(root, &mut parts);
    collapse_whitespace(&parts.join(" "))
}

fn collect_text<'a>(element: ElementRef<'a>, parts: &mut Vec<&'a str>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => parts.push(text),
            Node::Element(el) => {
                if matches!(el.name(), "script" | "style" | "noscript" | "template") {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, parts);
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(absolute_url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                if !links.contains(&absolute_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.set_fragment(None);
    Some(absolute_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/dir/page").unwrap()
    }

    #[test]
    fn test_extract_title() {
        let html = r#"<html><head><title>  Test
            Page  </title></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.title, "Test Page");
    }

    #[test]
    fn test_defaults_when_missing() {
        let parsed = parse_html("<html><head></head><body></body></html>", &base_url());
        assert_eq!(parsed.title, DEFAULT_TITLE);
        assert_eq!(parsed.description, DEFAULT_DESCRIPTION);
        assert!(parsed.text_content.is_empty());
        assert!(parsed.links.is_empty());
    }

    #[test]
    fn test_meta_description() {
        let html = r#"<html><head><meta name="Description" content=" A page about crawling "></head></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.description, "A page about crawling");
    }

    #[test]
    fn test_text_skips_scripts_and_styles() {
        let html = r#"<html><head><title>T</title></head><body>
            <h1>Heading</h1>
            <script>var x = 1;</script>
            <style>p { color: red; }</style>
            <p>Body   text</p>
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.text_content, "Heading Body text");
    }

    #[test]
    fn test_links_resolved_and_deduplicated() {
        let html = r##"<html><body>
            <a href="/absolute">A</a>
            <a href="relative">B</a>
            <a href="https://other.org/x#frag">C</a>
            <a href="/absolute">again</a>
        </body></html>"##;
        let parsed = parse_html(html, &base_url());
        assert_eq!(
            parsed.links,
            vec![
                "https://example.com/absolute".to_string(),
                "https://example.com/dir/relative".to_string(),
                "https://other.org/x".to_string(),
            ]
        );
    }

    #[test]
    fn test_excluded_links() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">js</a>
            <a href="MAILTO:a@b.com">mail</a>
            <a href="tel:123">tel</a>
            <a href="data:text/plain,hi">data</a>
            <a href="#top">anchor</a>
            <a href="ftp://files.example.com/x">ftp</a>
            <a href="/file.zip" download>dl</a>
            <a href="">empty</a>
        </body></html>"##;
        let parsed = parse_html(html, &base_url());
        assert!(parsed.links.is_empty(), "got {:?}", parsed.links);
    }
}
