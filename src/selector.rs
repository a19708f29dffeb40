//! Builds provider queries and paginates through matching message IDs
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::GmailClient;
use crate::error::{AssistantError, Result};

/// Read-state filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadFilter {
    #[default]
    Any,
    UnreadOnly,
    ReadOnly,
}

/// How time bounds are rendered into the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowPrecision {
    /// `after:2024/01/31`
    #[default]
    Day,
    /// `after:1706659200`
    Second,
}

/// Recognized selection options
#[derive(Debug, Clone)]
pub struct SelectionCriteria {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub precision: WindowPrecision,
    pub include_folders: Vec<String>,
    pub exclude_folders: Vec<String>,
    pub read_filter: ReadFilter,
    pub query_fragments: Vec<String>,
    pub page_size: u32,
    /// Stop after this many IDs
    pub limit: Option<usize>,
}

impl SelectionCriteria {
    pub fn new(page_size: u32) -> Self {
        Self {
            after: None,
            before: None,
            precision: WindowPrecision::Day,
            include_folders: Vec::new(),
            exclude_folders: Vec::new(),
            read_filter: ReadFilter::Any,
            query_fragments: Vec::new(),
            page_size,
            limit: None,
        }
    }

    pub fn after(mut self, at: DateTime<Utc>) -> Self {
        self.after = Some(at);
        self
    }

    pub fn before(mut self, at: DateTime<Utc>) -> Self {
        self.before = Some(at);
        self
    }

    /// Fails with `ConfigError` when the window reaches past the calendar range
    pub fn within_last(self, window: Duration) -> Result<Self> {
        Ok(self.after(window_start(window)?))
    }

    pub fn older_than(self, age: Duration) -> Result<Self> {
        Ok(self.before(window_start(age)?))
    }

    pub fn precise(mut self) -> Self {
        self.precision = WindowPrecision::Second;
        self
    }

    pub fn in_folder(mut self, folder: &str) -> Self {
        self.include_folders.push(folder.to_string());
        self
    }

    pub fn not_in(mut self, folder: &str) -> Self {
        self.exclude_folders.push(folder.to_string());
        self
    }

    /// Exclude spam and trash
    pub fn skip_junk(self) -> Self {
        self.not_in("spam").not_in("trash")
    }

    pub fn read_filter(mut self, filter: ReadFilter) -> Self {
        self.read_filter = filter;
        self
    }

    pub fn fragment(mut self, fragment: &str) -> Self {
        self.query_fragments.push(fragment.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn render_bound(&self, at: &DateTime<Utc>) -> String {
        match self.precision {
            WindowPrecision::Day => at.format("%Y/%m/%d").to_string(),
            WindowPrecision::Second => at.timestamp().to_string(),
        }
    }

    /// Render to Gmail search syntax
    pub fn to_query(&self) -> String {
        let mut terms = Vec::new();

        if let Some(after) = &self.after {
            terms.push(format!("after:{}", self.render_bound(after)));
        }
        if let Some(before) = &self.before {
            terms.push(format!("before:{}", self.render_bound(before)));
        }
        for folder in &self.include_folders {
            terms.push(format!("in:{}", folder));
        }
        for folder in &self.exclude_folders {
            terms.push(format!("-in:{}", folder));
        }
        for fragment in &self.query_fragments {
            let fragment = fragment.trim();
            if !fragment.is_empty() {
                terms.push(fragment.to_string());
            }
        }
        match self.read_filter {
            ReadFilter::Any => {}
            ReadFilter::UnreadOnly => terms.push("is:unread".to_string()),
            ReadFilter::ReadOnly => terms.push("is:read".to_string()),
        }

        terms.join(" ")
    }
}

fn window_start(window: Duration) -> Result<DateTime<Utc>> {
    Utc::now().checked_sub_signed(window).ok_or_else(|| {
        AssistantError::ConfigError(format!(
            "A look-back of {} days is out of range",
            window.num_days()
        ))
    })
}

/// Message selector over the mailbox store
pub struct MessageSelector {
    client: Arc<dyn GmailClient>,
}

impl MessageSelector {
    pub fn new(client: Arc<dyn GmailClient>) -> Self {
        Self { client }
    }

    /// Collect every matching ID, following continuation tokens
    ///
    /// Any failure discards what was accumulated so far and surfaces as
    /// `SelectionError`; callers never act on a partial set.
    pub async fn select(&self, criteria: &SelectionCriteria) -> Result<Vec<String>> {
        let query = criteria.to_query();
        info!("Selecting messages: {}", query);

        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page_size = match criteria.limit {
                Some(limit) => {
                    let remaining = limit.saturating_sub(ids.len());
                    if remaining == 0 {
                        break;
                    }
                    criteria.page_size.min(remaining as u32)
                }
                None => criteria.page_size,
            };

            let page = match self
                .client
                .list_message_ids_page(&query, page_size, page_token.take())
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        "Selection failed after {} pages; discarding {} ids",
                        pages,
                        ids.len()
                    );
                    return Err(AssistantError::SelectionError(e.to_string()));
                }
            };

            pages += 1;
            ids.extend(page.ids);
            debug!("Page {}: {} ids accumulated", pages, ids.len());

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        if let Some(limit) = criteria.limit {
            ids.truncate(limit);
        }

        info!("Selected {} messages across {} pages", ids.len(), pages);
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_past_calendar_range_is_config_error() {
        let result = SelectionCriteria::new(50).older_than(Duration::days(i64::from(u32::MAX)));
        assert!(matches!(result, Err(AssistantError::ConfigError(_))));

        let criteria = SelectionCriteria::new(50)
            .within_last(Duration::hours(24))
            .unwrap();
        assert!(criteria.after.is_some());
    }

    #[test]
    fn test_triage_query_shape() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        let query = SelectionCriteria::new(50)
            .after(at)
            .in_folder("INBOX")
            .skip_junk()
            .read_filter(ReadFilter::UnreadOnly)
            .to_query();
        assert_eq!(query, "after:2024/03/05 in:INBOX -in:spam -in:trash is:unread");
    }

    #[test]
    fn test_precise_bound_uses_epoch_seconds() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let query = SelectionCriteria::new(100).after(at).precise().skip_junk().to_query();
        assert_eq!(query, "after:1704067200 -in:spam -in:trash");
    }

    #[test]
    fn test_fragment_and_before() {
        let at = Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap();
        let query = SelectionCriteria::new(50)
            .before(at)
            .fragment("category:primary")
            .fragment("  ")
            .to_query();
        assert_eq!(query, "before:2023/12/31 category:primary");
    }

    #[test]
    fn test_empty_criteria_is_empty_query() {
        assert_eq!(SelectionCriteria::new(500).to_query(), "");
    }
}
