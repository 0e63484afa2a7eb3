use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::storage::{Database, SiteCreator, SiteSeed};
use crate::util::{host_name, validate_feed_url};

/// Maximum allowed nesting depth for OPML outline elements.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur during OPML parsing.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// File I/O error.
    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads an OPML file and returns one `user` site per feed outline.
///
/// Every site gets `star`. Outlines whose `xmlUrl` is not a public HTTP(S)
/// URL are skipped with a warning.
///
/// quick-xml (0.37) never parses `<!ENTITY>` declarations, so entity
/// expansion payloads fail as unrecognized entities instead of resolving.
pub async fn parse(path: &str, star: i64) -> Result<Vec<SiteSeed>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read OPML file: {}", path))?;
    parse_opml_content(&content, star)
}

/// Parse an OPML file and upsert its sites. Returns the number of sites written.
pub async fn import(db: &Database, path: &str, star: i64) -> Result<usize> {
    let seeds = parse(path, star).await?;
    let written = db
        .import_sites(&seeds)
        .await
        .with_context(|| format!("Failed to import sites from {}", path))?;
    tracing::info!(path = %path, found = seeds.len(), written, "OPML imported");
    Ok(written)
}

/// Parses OPML content, traversing category outlines at any depth.
pub fn parse_opml_content(content: &str, star: i64) -> Result<Vec<SiteSeed>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut sites: Vec<SiteSeed> = Vec::new();
    let mut buf = Vec::new();
    let mut depth: usize = 0;

    loop {
        let seed = match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                depth += 1;
                if depth > MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH).into());
                }
                parse_outline_attributes(&e, &reader, star)?
            }
            // Self-closing outline doesn't affect depth
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                parse_outline_attributes(&e, &reader, star)?
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                depth = depth.saturating_sub(1);
                None
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string()).into()),
            _ => None,
        };

        if let Some(seed) = seed {
            if sites.iter().any(|s| s.name == seed.name) {
                tracing::warn!(name = %seed.name, rss = %seed.rss, "Duplicate site name in OPML, skipping");
            } else {
                sites.push(seed);
            }
        }
        buf.clear();
    }

    Ok(sites)
}

fn parse_outline_attributes(
    e: &quick_xml::events::BytesStart<'_>,
    reader: &Reader<&[u8]>,
    star: i64,
) -> Result<Option<SiteSeed>> {
    let mut xml_url = None;
    let mut html_url = None;
    let mut title = None;
    let mut description = None;

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let decoder = reader.decoder();
        match attr.key.as_ref() {
            b"xmlUrl" => xml_url = Some(attr.decode_and_unescape_value(decoder)?.trim().to_string()),
            b"htmlUrl" => {
                let url_str = attr.decode_and_unescape_value(decoder)?;
                match validate_feed_url(&url_str) {
                    Ok(_) => html_url = Some(url_str.trim().to_string()),
                    Err(e) => {
                        tracing::warn!(url = %url_str, error = %e, "Ignoring invalid htmlUrl in OPML");
                    }
                }
            }
            b"title" => title = Some(attr.decode_and_unescape_value(decoder)?.trim().to_string()),
            b"text" => {
                if title.is_none() {
                    title = Some(attr.decode_and_unescape_value(decoder)?.trim().to_string())
                }
            }
            b"description" => {
                description = Some(attr.decode_and_unescape_value(decoder)?.trim().to_string())
            }
            _ => {}
        }
    }

    let Some(rss) = xml_url else {
        return Ok(None);
    };
    if let Err(e) = validate_feed_url(&rss) {
        tracing::warn!(url = %rss, error = %e, "Skipping invalid feed URL");
        return Ok(None);
    }

    let title = title.filter(|t| !t.is_empty());
    let name = site_name(title.as_deref(), &rss);
    Ok(Some(SiteSeed {
        name,
        cname: title.unwrap_or_else(|| rss.clone()),
        link: html_url.unwrap_or_default(),
        brief: description.unwrap_or_default(),
        rss,
        star,
        creator: SiteCreator::User,
    }))
}

/// Unique site key: the title slugified, falling back to the feed host.
fn site_name(title: Option<&str>, rss: &str) -> String {
    let slug = title.map(slugify).unwrap_or_default();
    if slug.is_empty() {
        slugify(&host_name(rss))
    } else {
        slug
    }
}

/// Lowercase, with every run of non-alphanumerics collapsed to one `-`.
fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_opml_content() {
        let content = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <head><title>Test Feeds</title></head>
  <body>
    <outline text="Blogs" title="Blogs">
      <outline type="rss" text="Example Blog" title="Example Blog" xmlUrl="https://example.com/feed.xml" htmlUrl="https://example.com" description="All about examples"/>
      <outline type="rss" text="No HTML" title="No HTML" xmlUrl="https://nohtml.com/rss"/>
    </outline>
  </body>
</opml>"#;

        let sites = parse_opml_content(content, 10).expect("nested outlines should parse");
        assert_eq!(sites.len(), 2);

        assert_eq!(sites[0].name, "example-blog");
        assert_eq!(sites[0].cname, "Example Blog");
        assert_eq!(sites[0].rss, "https://example.com/feed.xml");
        assert_eq!(sites[0].link, "https://example.com");
        assert_eq!(sites[0].brief, "All about examples");
        assert_eq!(sites[0].star, 10);
        assert_eq!(sites[0].creator, SiteCreator::User);

        assert_eq!(sites[1].name, "no-html");
        assert_eq!(sites[1].link, "");
    }

    #[test]
    fn test_fallback_to_text_then_host() {
        let content = r#"<?xml version="1.0"?>
<opml version="2.0">
  <body>
    <outline type="rss" text="Text Only" xmlUrl="https://textonly.com/feed"/>
    <outline type="rss" xmlUrl="https://www.NoTitle.com/feed"/>
  </body>
</opml>"#;

        let sites = parse_opml_content(content, 0).unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].cname, "Text Only");
        assert_eq!(sites[1].name, "www-notitle-com");
        assert_eq!(sites[1].cname, "https://www.NoTitle.com/feed");
    }

    #[test]
    fn test_cjk_titles_keep_their_characters() {
        assert_eq!(slugify("阮一峰的网络日志"), "阮一峰的网络日志");
        assert_eq!(slugify("  Rust -- Blog!! "), "rust-blog");
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let content = r#"<opml version="2.0"><body>
        <outline title="Same" xmlUrl="https://a.com/feed"/>
        <outline title="same" xmlUrl="https://b.com/feed"/>
    </body></opml>"#;

        let sites = parse_opml_content(content, 0).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].rss, "https://a.com/feed");
    }

    #[test]
    fn test_skip_internal_and_non_http_feeds() {
        let content = r#"<?xml version="1.0"?>
    <opml version="2.0"><body>
        <outline xmlUrl="https://valid.com/feed"/>
        <outline xmlUrl="http://192.168.1.1/feed"/>
        <outline xmlUrl="http://localhost/feed"/>
        <outline xmlUrl="file:///etc/passwd"/>
    </body></opml>"#;

        let sites = parse_opml_content(content, 0).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].rss, "https://valid.com/feed");
    }

    #[test]
    fn test_empty_and_malformed() {
        let empty = r#"<?xml version="1.0"?><opml version="2.0"><body></body></opml>"#;
        assert!(parse_opml_content(empty, 0).unwrap().is_empty());
        assert!(parse_opml_content("<not valid xml", 0).is_err());
    }

    #[test]
    fn test_entities_are_not_expanded() {
        let malicious_opml = r#"<?xml version="1.0"?>
<!DOCTYPE opml [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<opml version="2.0">
    <body>
        <outline text="&xxe;" xmlUrl="https://example.com/feed.xml"/>
    </body>
</opml>"#;

        // Either rejected or kept literal, never expanded
        if let Ok(sites) = parse_opml_content(malicious_opml, 0) {
            for site in &sites {
                assert!(!site.cname.contains("root:"), "entity expanded: {}", site.cname);
            }
        }
    }

    #[test]
    fn test_deeply_nested_opml_rejected() {
        let mut opml = String::from(r#"<?xml version="1.0"?><opml version="2.0"><body>"#);
        for _ in 0..100 {
            opml.push_str(r#"<outline text="level">"#);
        }
        for _ in 0..100 {
            opml.push_str("</outline>");
        }
        opml.push_str("</body></opml>");

        let err = parse_opml_content(&opml, 0).unwrap_err().to_string();
        assert!(err.contains("depth") && err.contains("50"), "{}", err);
    }

    #[tokio::test]
    async fn test_import_upserts_sites() {
        let dir = std::env::temp_dir().join("feedmill_opml_import_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("subs.opml");
        std::fs::write(
            &path,
            r#"<opml version="2.0"><body>
                <outline title="Alpha" xmlUrl="https://alpha.com/feed"/>
                <outline title="Beta" xmlUrl="https://beta.com/feed"/>
            </body></opml>"#,
        )
        .unwrap();

        let db = Database::open(":memory:").await.unwrap();
        let written = import(&db, path.to_str().unwrap(), 12).await.unwrap();
        assert_eq!(written, 2);

        let alpha = db.get_site_by_name("alpha").await.unwrap().unwrap();
        assert_eq!(alpha.rss, "https://alpha.com/feed");
        assert_eq!(alpha.star, 12);

        std::fs::remove_dir_all(&dir).ok();
    }
}
