//! Server-side filter setup for the bulk-mail labels

use tracing::{info, warn};

use super::CommandContext;
use crate::cli::console;
use crate::error::Result;
use crate::label_directory::LabelDirectory;
use crate::models::FilterSpec;

pub const FILTER_LABELS: [&str; 4] = [
    "Transactional",
    "Notifications",
    "Newsletters/Promotions",
    "Forums/Groups",
];

enum Criterion {
    From(&'static str),
    Subject(&'static str),
    Query(&'static str),
}

fn filter_spec(name: &str, criterion: Criterion, label: &str, skip_inbox: bool) -> FilterSpec {
    let (from, subject, query) = match criterion {
        Criterion::From(v) => (Some(v.to_string()), None, None),
        Criterion::Subject(v) => (None, Some(v.to_string()), None),
        Criterion::Query(v) => (None, None, Some(v.to_string())),
    };
    FilterSpec {
        name: name.to_string(),
        from,
        subject,
        query,
        label_name: label.to_string(),
        skip_inbox,
    }
}

/// The built-in filter set. Sender lists marked "customize" are placeholders.
pub fn default_filters() -> Vec<FilterSpec> {
    use Criterion::*;
    vec![
        filter_spec(
            "Transactional - Common Senders",
            From("amazon.com OR ebay.com OR paypal.com OR apple.com OR google.com OR microsoft.com OR uber.com OR lyft.com OR doordash.com OR grubhub.com OR netflix.com OR hulu.com OR spotify.com OR disneyplus.com"),
            "Transactional",
            false,
        ),
        filter_spec(
            "Transactional - Financial Senders",
            From("bankofamerica.com OR chase.com OR wellsfargo.com OR citibank.com OR americanexpress.com OR capitalone.com OR discover.com"),
            "Transactional",
            false,
        ),
        filter_spec(
            "Transactional - Utility/Town Senders (Customize)",
            From("eversource.com OR nationalgridus.com OR xfinity.com OR verizon.com OR townofcanton.org"),
            "Transactional",
            false,
        ),
        filter_spec(
            "Transactional - Subject Keywords",
            Subject(r#""Order Confirmation" OR "Your Receipt" OR "Shipping Update" OR "Tracking Number" OR "Your Invoice" OR "Payment Received" OR "Your bill is ready" OR "Automatic Payment" OR "Policy Document""#),
            "Transactional",
            false,
        ),
        filter_spec(
            "Notifications - Social Media Senders",
            From("facebookmail.com OR notification@twitter.com OR linkedin.com OR messages-noreply@linkedin.com OR pinterest.com OR instagram.com OR nextdoor.com"),
            "Notifications",
            true,
        ),
        filter_spec(
            "Notifications - App/Service Alerts",
            From("no-reply@slack.com OR github.com OR no-reply@google.com OR dropbox.com OR evernote.com"),
            "Notifications",
            false,
        ),
        filter_spec(
            "Notifications - Security/Account Keywords",
            Subject(r#""Security Alert" OR "New sign-in" OR "Password changed" OR "Unusual activity""#),
            "Notifications",
            false,
        ),
        filter_spec(
            "Newsletters/Promotions - Unsubscribe Keywords",
            Query(r#""unsubscribe" OR "view this email in your browser" OR "manage your preferences" OR "email preferences""#),
            "Newsletters/Promotions",
            true,
        ),
        filter_spec(
            "Newsletters/Promotions - Subject Keywords",
            Subject(r#""Special Offer" OR "Discount" OR "% off" OR "Sale Ends" OR "Weekly Ad" OR "Daily Deal" OR "Exclusive" OR "Savings""#),
            "Newsletters/Promotions",
            true,
        ),
        filter_spec(
            "Newsletters/Promotions - Placeholder Senders (Customize)",
            From("deals@bestbuy.com OR news@homedepot.com OR email@target.com OR news@yourfavoritestore.com"),
            "Newsletters/Promotions",
            true,
        ),
        filter_spec(
            "Forums/Groups - Platform Senders",
            From("googlegroups.com OR discoursemail.com OR noreply@github.com"),
            "Forums/Groups",
            true,
        ),
        filter_spec(
            "Forums/Groups - Subject Brackets",
            Subject("*[*]*"),
            "Forums/Groups",
            false,
        ),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSummary {
    pub created: usize,
    pub existing: usize,
    pub failed: usize,
    /// Filters not attempted because their label could not be resolved
    pub skipped: usize,
}

pub async fn run(ctx: &CommandContext) -> Result<FilterSummary> {
    console::info("Checking for necessary labels...");
    let resolution = LabelDirectory::new(ctx.client.clone())
        .resolve_partial(&FILTER_LABELS)
        .await?;
    if !resolution.unresolved.is_empty() {
        console::warning(&format!(
            "Could not find or create labels: {}. Filters using them will be skipped.",
            resolution.unresolved.join(", ")
        ));
    }

    let mut summary = FilterSummary::default();
    console::info("Attempting to create filters...");
    for filter in default_filters() {
        let Some(label_id) = resolution.resolved.get(&filter.label_name) else {
            warn!("Skipping filter '{}': label '{}' unresolved", filter.name, filter.label_name);
            summary.skipped += 1;
            continue;
        };

        match ctx.client.create_filter(&filter, label_id).await {
            Ok(id) => {
                info!("Created filter '{}' with ID {}", filter.name, id);
                console::success(&format!("Created filter '{}' with ID: {}", filter.name, id));
                summary.created += 1;
            }
            Err(e) if e.is_conflict() => {
                warn!("Filter '{}' already exists", filter.name);
                console::warning(&format!("Filter '{}' already exists. Skipping.", filter.name));
                summary.existing += 1;
            }
            Err(e) => {
                console::error(&format!("Error creating filter '{}': {}", filter.name, e));
                summary.failed += 1;
            }
        }
    }

    console::success(&format!(
        "Filter setup finished: {} created, {} already present, {} failed, {} skipped.",
        summary.created, summary.existing, summary.failed, summary.skipped
    ));
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters_use_known_labels() {
        let filters = default_filters();
        assert_eq!(filters.len(), 12);
        assert!(filters
            .iter()
            .all(|f| FILTER_LABELS.contains(&f.label_name.as_str())));
    }

    #[test]
    fn test_each_filter_has_one_criterion() {
        for f in default_filters() {
            let set = [f.from.is_some(), f.subject.is_some(), f.query.is_some()];
            assert_eq!(set.iter().filter(|b| **b).count(), 1, "{}", f.name);
        }
    }

    #[test]
    fn test_skip_inbox_filters() {
        let skipping: Vec<String> = default_filters()
            .into_iter()
            .filter(|f| f.skip_inbox)
            .map(|f| f.name)
            .collect();
        assert_eq!(skipping.len(), 6);
        assert!(skipping.contains(&"Notifications - Social Media Senders".to_string()));
    }
}
