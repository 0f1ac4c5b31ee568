//! Tolerant RSS item scanner.
//!
//! Real-world feeds are frequently not well-formed XML, so this parser never
//! validates and never fails: it scans for `<item>`/`</item>` marker pairs
//! and pulls known child elements out of each slice. Malformed regions
//! degrade to skipped items or an empty result, never an error. Upgrading to
//! a strict XML parser would change observable behavior on the malformed
//! feeds this exists to handle.

use chrono::{DateTime, Utc};

/// One normalized feed entry. Transient: produced here, consumed by the
/// ingestor, never persisted directly.
#[derive(Debug, Clone)]
pub struct ParsedItem {
    pub title: String,
    /// Empty string when the feed omits it
    pub description: String,
    pub link: String,
    pub image_url: Option<String>,
    /// Parsed from `<pubDate>`, or the wall clock at parse time as a lossy
    /// fallback
    pub published_at: DateTime<Utc>,
}

/// Extract items from raw feed text, in document order.
///
/// Pure function: re-invoking on the same input yields the same items
/// (modulo the wall-clock date fallback). Items missing a title or link are
/// dropped; everything else is best-effort.
pub fn parse_items(xml: &str) -> Vec<ParsedItem> {
    let mut items = Vec::new();
    let mut pos = 0;

    while let Some(start) = find_ci(xml, "<item", pos) {
        let after = start + "<item".len();
        // Require a tag delimiter so e.g. "<itemized>" is not an item
        if !matches!(
            xml.as_bytes().get(after),
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n')
        ) {
            pos = after;
            continue;
        }
        let Some(gt) = xml[after..].find('>') else {
            break; // truncated open tag, nothing usable follows
        };
        let body_start = after + gt + 1;
        let Some(close) = find_ci(xml, "</item", body_start) else {
            break; // unmatched item, skip the rest of the document
        };

        if let Some(item) = parse_item(&xml[body_start..close]) {
            items.push(item);
        }
        pos = close + "</item".len();
    }

    items
}

fn parse_item(body: &str) -> Option<ParsedItem> {
    // Title and link are mandatory for a usable item
    let title = decode_entities(tag_text(body, "title")?.trim());
    let link = tag_text(body, "link")?.trim().to_string();
    if title.is_empty() || link.is_empty() {
        return None;
    }

    let description = tag_text(body, "description")
        .map(|d| decode_entities(d.trim()))
        .unwrap_or_default();
    let published_at = tag_text(body, "pubDate")
        .map(|d| parse_pub_date(&d))
        .unwrap_or_else(Utc::now);

    Some(ParsedItem {
        title,
        description,
        link,
        image_url: image_url(body),
        published_at,
    })
}

/// Case-insensitive substring search for ASCII needles.
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let h = haystack.as_bytes().get(from..)?;
    let n = needle.as_bytes();
    h.windows(n.len())
        .position(|w| w.eq_ignore_ascii_case(n))
        .map(|p| p + from)
}

/// Inner text of the first `<tag ...>...</tag>` pair, CDATA unwrapped.
/// `None` when the element is absent or unterminated.
fn tag_text(body: &str, tag: &str) -> Option<String> {
    let open_pat = format!("<{}", tag);
    let close_pat = format!("</{}", tag);
    let mut pos = 0;

    loop {
        let start = find_ci(body, &open_pat, pos)?;
        let after = start + open_pat.len();
        if !matches!(
            body.as_bytes().get(after),
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') | Some(b'/')
        ) {
            // Prefix of a longer tag name, e.g. <linkText> while scanning
            // for <link>
            pos = after;
            continue;
        }
        let gt = after + body[after..].find('>')?;
        let content_start = gt + 1;
        let content_end = find_ci(body, &close_pat, content_start)?;
        return Some(unwrap_cdata(&body[content_start..content_end]).to_string());
    }
}

/// Unwrap a `<![CDATA[...]]>` block; literal text passes through so both
/// forms resolve to the same string.
fn unwrap_cdata(text: &str) -> &str {
    text.trim()
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
        .unwrap_or(text)
}

/// Image reference for an item: an image-typed `<enclosure>` wins over a
/// `<media:thumbnail>`; absent entirely is legal.
fn image_url(body: &str) -> Option<String> {
    let mut pos = 0;
    while let Some(start) = find_ci(body, "<enclosure", pos) {
        let Some(gt) = body[start..].find('>') else {
            break;
        };
        let tag = &body[start..start + gt];
        pos = start + gt + 1;

        let is_image = attr_value(tag, "type")
            .is_some_and(|t| t.to_ascii_lowercase().starts_with("image"));
        if !is_image {
            continue;
        }
        if let Some(url) = attr_value(tag, "url") {
            return Some(url.to_string());
        }
    }

    let start = find_ci(body, "<media:thumbnail", 0)?;
    let gt = body[start..].find('>')?;
    attr_value(&body[start..start + gt], "url").map(str::to_string)
}

/// Value of a quoted `name="..."` attribute within one tag's text.
fn attr_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut pos = 0;
    loop {
        let at = find_ci(tag, name, pos)?;
        pos = at + name.len();

        // Must be a whole attribute name, not a suffix of a longer one
        if at > 0 && !tag.as_bytes()[at - 1].is_ascii_whitespace() {
            continue;
        }
        let rest = tag[at + name.len()..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let quote = rest.chars().next()?;
        if quote != '"' && quote != '\'' {
            continue;
        }
        let value = &rest[1..];
        return value.find(quote).map(|end| &value[..end]);
    }
}

/// Decode the small fixed table of HTML entity escapes seen in practice.
/// Unrecognized entities pass through unchanged.
fn decode_entities(text: &str) -> String {
    const ENTITIES: [(&str, &str); 7] = [
        ("&amp;", "&"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&#x27;", "'"),
        ("&#x2F;", "/"),
    ];

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        if let Some((entity, replacement)) = ENTITIES.iter().find(|(e, _)| tail.starts_with(e)) {
            out.push_str(replacement);
            rest = &tail[entity.len()..];
        } else {
            out.push('&');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// RFC 2822 is the RSS convention, RFC 3339 shows up anyway; anything else
/// defaults to the current wall clock. A deliberate lossy fallback, not an
/// error.
fn parse_pub_date(raw: &str) -> DateTime<Utc> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
