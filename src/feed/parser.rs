use anyhow::Result;
use feed_rs::model::{Link, Person, Text};
use feed_rs::parser;

use crate::model::{ContentBlock, RawEntry};

/// A parsed RSS/Atom document.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<RawEntry>,
}

pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed> {
    let feed = parser::parse(bytes)?;

    let entries: Vec<RawEntry> = feed
        .entries
        .into_iter()
        .map(|entry| {
            let contents = entry
                .content
                .and_then(|c| {
                    let content_type = c.content_type.to_string();
                    c.body.map(|body| ContentBlock::new(Some(&content_type), body))
                })
                .into_iter()
                .collect();

            RawEntry {
                link: entry_link(&entry.links),
                published: entry.published,
                updated: entry.updated,
                title: entry.title.map(|t| t.content),
                description: entry.summary.map(text_block),
                contents,
                authors: names(entry.authors),
                contributors: names(entry.contributors),
            }
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content.trim().to_string()),
        entries,
    })
}

/// The entry's own page: an `alternate` (or unqualified) link, else the first one.
fn entry_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}

fn text_block(text: Text) -> ContentBlock {
    let content_type = text.content_type.to_string();
    ContentBlock::new(Some(&content_type), text.content)
}

fn names(people: Vec<Person>) -> Vec<String> {
    people.into_iter().map(|p| p.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel>
    <title> Example Channel </title>
    <link>https://example.com</link>
    <description>Example</description>
    <item>
        <title>First</title>
        <link>https://example.com/first</link>
        <description>First description</description>
        <content:encoded><![CDATA[<p>First body</p>]]></content:encoded>
        <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
        <title>Second</title>
        <link>https://example.com/second</link>
    </item>
</channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom Example</title>
    <id>urn:example:feed</id>
    <updated>2024-02-01T00:00:00Z</updated>
    <entry>
        <title>Atom entry</title>
        <id>urn:example:entry:1</id>
        <link rel="related" href="https://example.com/related"/>
        <link rel="alternate" href="https://example.com/atom-entry"/>
        <updated>2024-02-01T00:00:00Z</updated>
        <author><name>Ann</name></author>
        <author><name>Bob</name></author>
        <contributor><name>Cid</name></contributor>
        <summary>Short</summary>
    </entry>
</feed>"#;

    #[test]
    fn test_parse_rss() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Example Channel"));
        assert_eq!(feed.entries.len(), 2);

        let first = &feed.entries[0];
        assert_eq!(first.link.as_deref(), Some("https://example.com/first"));
        assert_eq!(first.title.as_deref(), Some("First"));
        assert_eq!(
            first.published,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(
            first.description.as_ref().map(|d| d.value.as_str()),
            Some("First description")
        );
        assert_eq!(first.contents.len(), 1);
        assert!(first.contents[0].value.contains("First body"));

        let second = &feed.entries[1];
        assert!(second.published.is_none());
        assert!(second.description.is_none());
        assert!(second.contents.is_empty());
    }

    #[test]
    fn test_parse_atom() {
        let feed = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(feed.entries.len(), 1);

        let entry = &feed.entries[0];
        assert_eq!(
            entry.link.as_deref(),
            Some("https://example.com/atom-entry")
        );
        assert!(entry.published.is_none());
        assert_eq!(
            entry.updated,
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(entry.authors, vec!["Ann", "Bob"]);
        assert_eq!(entry.contributors, vec!["Cid"]);
        assert_eq!(
            entry.description.as_ref().map(|d| d.value.as_str()),
            Some("Short")
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_feed(b"<not valid xml").is_err());
        assert!(parse_feed(b"<html><body>hello</body></html>").is_err());
    }

    #[test]
    fn test_entry_link_falls_back_to_first() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Podcast</title>
    <id>urn:example:podcast</id>
    <updated>2024-02-01T00:00:00Z</updated>
    <entry>
        <title>Episode</title>
        <id>urn:example:episode:1</id>
        <link rel="enclosure" href="https://example.com/episode.mp3"/>
        <updated>2024-02-01T00:00:00Z</updated>
    </entry>
    <entry>
        <title>No links</title>
        <id>urn:example:episode:2</id>
        <updated>2024-02-01T00:00:00Z</updated>
    </entry>
</feed>"#;

        let feed = parse_feed(atom.as_bytes()).unwrap();
        assert_eq!(
            feed.entries[0].link.as_deref(),
            Some("https://example.com/episode.mp3")
        );
        assert_eq!(feed.entries[1].link, None);
    }
}
