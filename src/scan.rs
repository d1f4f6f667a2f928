//! HTML scanning: a structured parse into text and link pairs, with pure
//! matching functions on top.

use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};

/// Vocabulary matched against anchors on monitored pages.
pub const BID_TERMS: &[&str] = &["bid", "tender", "rfp", "procurement"];

/// Wider vocabulary used by one-shot connection tests.
pub const TEST_TERMS: &[&str] = &[
    "bid",
    "tender",
    "rfp",
    "rfq",
    "procurement",
    "contract",
    "opportunity",
    "notice",
    "advertisement",
];

// Create static selectors to avoid recompiling them each time
static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a").expect("Failed to parse anchor selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("Failed to parse title selector"));

/// A single anchor, reduced to its visible text and raw href.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub text: String,
    pub href: String,
}

/// The pieces of a page the monitor cares about.
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub text: String,
    pub links: Vec<Link>,
}

/// Parse a document into its title, full text, and (text, href) link pairs.
/// Anchors without an href are dropped.
pub fn parse_page(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let text = document.root_element().text().collect::<Vec<_>>().join(" ");

    let links = document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            Some(Link {
                text: el.text().collect::<String>().trim().to_string(),
                href: href.to_string(),
            })
        })
        .collect();

    ParsedPage { title, text, links }
}

/// True when the keyword filter is empty, or the page text contains at least
/// one keyword (case-insensitive substring match).
pub fn keyword_gate(page_text: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let haystack = page_text.to_lowercase();
    keywords.iter().any(|k| haystack.contains(&k.to_lowercase()))
}

/// Select links whose visible text or href contains one of the given terms,
/// case-insensitive.
pub fn match_links<'a>(links: &'a [Link], terms: &[&str]) -> Vec<&'a Link> {
    links
        .iter()
        .filter(|link| {
            let text = link.text.to_lowercase();
            let href = link.href.to_lowercase();
            terms.iter().any(|t| text.contains(t) || href.contains(t))
        })
        .collect()
}

/// Resolve a possibly-relative href against the page URL. Hrefs that cannot
/// be resolved are returned as-is.
pub fn resolve_href(base: &str, href: &str) -> String {
    if href.starts_with("http") {
        return href.to_string();
    }
    Url::parse(base)
        .and_then(|base| base.join(href))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Hostname of a URL, used as the source label on results.
pub fn hostname(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}
