use anyhow::Result;
use feed_rs::parser;
use sha2::{Digest, Sha256};

/// One entry of an RSS/Atom document, before it becomes a pipeline item.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    /// Stable identity: the entry id, or a hash of url and title
    pub guid: String,
    /// Empty when the entry has no title
    pub title: String,
    /// First link of the entry, empty when there is none
    pub url: String,
    /// Full content body, falling back to the summary
    pub content: String,
}

/// Parse an RSS or Atom document into entries, in document order.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEntry>> {
    let feed = parser::parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let url = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .unwrap_or_default();
            let title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .unwrap_or_default();
            let content = entry
                .content
                .and_then(|c| c.body)
                .filter(|body| !body.trim().is_empty())
                .or_else(|| entry.summary.map(|s| s.content))
                .unwrap_or_default();

            let guid = generate_guid(&entry.id, &url, &title);

            FeedEntry {
                guid,
                title,
                url,
                content,
            }
        })
        .collect();

    Ok(entries)
}

fn generate_guid(existing: &str, url: &str, title: &str) -> String {
    let trimmed = existing.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    let hash = Sha256::digest(format!("{url}|{title}").as_bytes());
    format!("{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/"><channel>
    <title>Blog</title>
    <item>
        <guid>post-1</guid>
        <title> First post </title>
        <link>https://blog.example.com/1</link>
        <description>Short summary</description>
        <content:encoded><![CDATA[<p>Full <b>body</b></p>]]></content:encoded>
    </item>
    <item>
        <title>Second</title>
        <link>https://blog.example.com/2</link>
        <description>Only a summary</description>
    </item>
    <item>
        <description>No title, no link</description>
    </item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Blog</title>
  <id>urn:blog</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <id>urn:entry:1</id>
    <title>Atom entry</title>
    <link href="https://atom.example.com/e1"/>
    <updated>2024-01-01T00:00:00Z</updated>
    <content type="html">&lt;p&gt;Atom body&lt;/p&gt;</content>
  </entry>
</feed>"#;

    #[test]
    fn test_rss_prefers_full_content() {
        let entries = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].guid, "post-1");
        assert_eq!(entries[0].title, "First post");
        assert_eq!(entries[0].url, "https://blog.example.com/1");
        assert!(entries[0].content.contains("<b>body</b>"));

        assert_eq!(entries[1].content, "Only a summary");
    }

    #[test]
    fn test_missing_title_and_link_are_empty() {
        let entries = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(entries[2].title, "");
        assert_eq!(entries[2].url, "");
        assert!(!entries[2].guid.is_empty());
    }

    #[test]
    fn test_atom_entry() {
        let entries = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Atom entry");
        assert_eq!(entries[0].url, "https://atom.example.com/e1");
        assert_eq!(entries[0].content, "<p>Atom body</p>");
    }

    #[test]
    fn test_guid_fallback_is_stable() {
        let a = generate_guid("", "https://x.test/1", "T");
        let b = generate_guid("  ", "https://x.test/1", "T");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, generate_guid("", "https://x.test/2", "T"));
    }

    #[test]
    fn test_invalid_document_is_an_error() {
        assert!(parse_feed(b"<not valid xml").is_err());
    }
}
