//! Minimal anchor scanner for rich-text descriptions
//!
//! Assignment descriptions embed links to API-addressable attachments as
//! `<a data-api-endpoint="...">name</a>`. This is a plain attribute scanner,
//! not an HTML parser: it only needs anchors and their attributes.

use regex::Regex;
use std::sync::OnceLock;

/// Attribute carrying the API locator of an embedded attachment
pub const ENDPOINT_ATTRIBUTE: &str = "data-api-endpoint";

/// Reference to an attachment found in a description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentLink {
    /// API locator to resolve into a file descriptor
    pub endpoint: String,
    /// Display text, used as the destination filename
    pub text: String,
}

fn anchor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").expect("anchor pattern is valid")
    })
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
            .expect("attribute pattern is valid")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"))
}

/// Value of attribute `name` (case-insensitive) inside an opening tag body
fn attribute(tag_body: &str, name: &str) -> Option<String> {
    attribute_regex().captures_iter(tag_body).find_map(|caps| {
        if !caps[1].eq_ignore_ascii_case(name) {
            return None;
        }
        caps.get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| decode_entities(m.as_str()))
    })
}

/// Decode the handful of entities that show up in names and URLs
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Visible text of an element body: tags stripped, entities decoded, trimmed
fn inner_text(body: &str) -> String {
    let stripped = tag_regex().replace_all(body, "");
    let decoded = decode_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Every anchor carrying [`ENDPOINT_ATTRIBUTE`], in document order
///
/// The name comes from the anchor text, falling back to its `title`
/// attribute. Anchors without any name are dropped.
pub fn extract_attachment_links(html: &str) -> Vec<AttachmentLink> {
    anchor_regex()
        .captures_iter(html)
        .filter_map(|caps| {
            let tag_body = &caps[1];
            let endpoint = attribute(tag_body, ENDPOINT_ATTRIBUTE).filter(|e| !e.is_empty())?;

            let text = Some(inner_text(&caps[2]))
                .filter(|t| !t.is_empty())
                .or_else(|| attribute(tag_body, "title").map(|t| t.trim().to_string()))
                .filter(|t| !t.is_empty())?;

            Some(AttachmentLink { endpoint, text })
        })
        .collect()
}
