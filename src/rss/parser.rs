//! Feed document parsing.
//!
//! RSS 2.0 is read with the `rss` crate, which keeps the distinction between
//! an item that has a `<guid>` and one that does not. Anything else (Atom,
//! JSON Feed) falls back to `feed-rs`.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::rss::failure::{FailureReason, FetchFailure, FetchResult};
use crate::rss::types::{CandidateItem, UNTITLED};

/// Parse a fetched document into candidate items, in document order.
///
/// Items without a publication time get `fetched_at`. Items with neither a
/// guid nor a link are dropped. A document that is not a feed at all yields
/// `parse_error` and no items.
pub fn parse(bytes: &[u8], fetched_at: DateTime<Utc>) -> FetchResult<Vec<CandidateItem>> {
    match rss::Channel::read_from(bytes) {
        Ok(channel) => Ok(from_rss(&channel, fetched_at)),
        Err(rss_err) => {
            debug!(error = %rss_err, "not an RSS 2.0 document, trying other formats");
            let feed = feed_rs::parser::parse(bytes).map_err(|e| {
                FetchFailure::new(
                    FailureReason::ParseError,
                    format!("failed to parse feed: {e}"),
                )
            })?;
            Ok(from_feed_rs(feed, fetched_at))
        }
    }
}

fn from_rss(channel: &rss::Channel, fetched_at: DateTime<Utc>) -> Vec<CandidateItem> {
    channel
        .items()
        .iter()
        .filter_map(|item| {
            let link = non_blank(item.link());
            let guid = non_blank(item.guid().map(|g| g.value())).or_else(|| link.clone());
            let Some(guid) = guid else {
                warn!(title = ?item.title(), "dropping RSS item without guid or link");
                return None;
            };

            let published_at = item
                .pub_date()
                .and_then(parse_rfc2822)
                .or_else(|| {
                    item.dublin_core_ext()
                        .and_then(|dc| dc.dates().first())
                        .and_then(|date| parse_rfc3339(date))
                })
                .unwrap_or(fetched_at);

            Some(CandidateItem {
                title: title_or_untitled(item.title()),
                description: item.description().map(str::to_string),
                link,
                guid,
                published_at,
            })
        })
        .collect()
}

fn from_feed_rs(feed: feed_rs::model::Feed, fetched_at: DateTime<Utc>) -> Vec<CandidateItem> {
    feed.entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.links.first().map(|l| l.href.trim().to_string());
            let link = link.filter(|l| !l.is_empty());
            let guid = non_blank(Some(entry.id.as_str())).or_else(|| link.clone());
            let Some(guid) = guid else {
                warn!("dropping feed entry without id or link");
                return None;
            };

            let title = title_or_untitled(entry.title.as_ref().map(|t| t.content.as_str()));
            let description = entry
                .summary
                .map(|t| t.content)
                .or(entry.content.and_then(|c| c.body));

            Some(CandidateItem {
                title,
                description,
                link,
                guid,
                published_at: entry.published.or(entry.updated).unwrap_or(fetched_at),
            })
        })
        .collect()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn title_or_untitled(title: Option<&str>) -> String {
    non_blank(title).unwrap_or_else(|| UNTITLED.to_string())
}

fn parse_rfc2822(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
