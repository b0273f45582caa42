//! Block text and link discovery for pages without a usable table.
//!
//! Some counties publish their lien list as a run of `<p>` or `<div>`
//! blocks, and others only link to PDF documents from a landing page.
//! [`block_texts`] returns the collapsed text of each selected block and
//! [`find_links`] collects anchors whose text or target mentions a keyword.

use reqwest::Url;
use scraper::Html;

use crate::html_table::HtmlTableExtractor;
use crate::{ScrapeError, collapse_whitespace};

/// An anchor discovered on a page, resolved to an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Visible anchor text, whitespace-collapsed.
    pub text: String,
    /// Absolute target URL.
    pub href: String,
}

/// Returns the collapsed text of every element matching `selector`,
/// skipping empty blocks.
///
/// # Errors
///
/// Returns [`ScrapeError::InvalidSelector`] if `selector` does not compile.
pub fn block_texts(html: &str, selector: &str) -> Result<Vec<String>, ScrapeError> {
    let document = Html::parse_document(html);
    let sel = HtmlTableExtractor::parse_selector(selector)?;

    Ok(document
        .select(&sel)
        .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| !text.is_empty())
        .collect())
}

/// Collects `<a href>` elements whose text or target contains any of
/// `keywords` (case-insensitive), resolved against `base_url`.
///
/// Duplicate targets are reported once, in document order. An empty
/// keyword list matches every link.
///
/// # Errors
///
/// Returns [`ScrapeError::InvalidUrl`] if `base_url` is not an absolute URL.
pub fn find_links(html: &str, base_url: &str, keywords: &[String]) -> Result<Vec<Link>, ScrapeError> {
    let base = Url::parse(base_url).map_err(|e| ScrapeError::InvalidUrl {
        url: base_url.to_owned(),
        message: e.to_string(),
    })?;
    let document = Html::parse_document(html);
    let sel = HtmlTableExtractor::parse_selector("a[href]")?;
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

    let mut links: Vec<Link> = Vec::new();
    for anchor in document.select(&sel) {
        let Some(raw_href) = anchor.value().attr("href") else {
            continue;
        };
        let text = collapse_whitespace(&anchor.text().collect::<Vec<_>>().join(" "));

        let haystack = format!("{} {}", text.to_lowercase(), raw_href.to_lowercase());
        if !keywords.is_empty() && !keywords.iter().any(|k| haystack.contains(k.as_str())) {
            continue;
        }

        let href = match base.join(raw_href.trim()) {
            Ok(url) => url.to_string(),
            Err(e) => {
                log::debug!("Skipping unresolvable link '{raw_href}': {e}");
                continue;
            }
        };

        if links.iter().any(|l| l.href == href) {
            continue;
        }
        links.push(Link { text, href });
    }

    log::debug!("Found {} matching link(s) on {base_url}", links.len());
    Ok(links)
}
