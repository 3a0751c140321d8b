//! The cached entity: a short news article.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::cache::Cacheable;

/// Display form of a timestamp, e.g. "Thursday, September 2, 2021 3:54 PM".
const TIMESTAMP_FORMAT: &str = "%A, %B %-d, %Y %-I:%M %p";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
  pub id: i64,
  pub title: String,
  /// Human-readable publish time; see `Record::published`
  pub timestamp: String,
  pub summary: String,
  /// Image URL. Small inline payloads fit too; only the store limits the size.
  pub media: String,
}

impl Record {
  pub fn new(
    id: i64,
    title: impl Into<String>,
    published: NaiveDateTime,
    summary: impl Into<String>,
    media: impl Into<String>,
  ) -> Self {
    Self {
      id,
      title: title.into(),
      timestamp: published.format(TIMESTAMP_FORMAT).to_string(),
      summary: summary.into(),
      media: media.into(),
    }
  }

  /// Parse the display timestamp back into a comparable instant.
  pub fn published(&self) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT).ok()
  }
}

impl Cacheable for Record {
  fn cache_id(&self) -> String {
    self.id.to_string()
  }

  fn namespace() -> &'static str {
    "record"
  }

  fn index_key() -> &'static str {
    "records"
  }
}

/// Order for display: newest first, unparseable timestamps last.
pub fn sort_newest_first(records: &mut [Record]) {
  records.sort_by(|a, b| b.published().cmp(&a.published()));
}
