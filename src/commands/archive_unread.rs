//! Archive unread: tag every unread inbox message and mark it read

use tracing::info;

use super::CommandContext;
use crate::cli::console;
use crate::error::Result;
use crate::label_directory::LabelDirectory;
use crate::mutator::{BatchLabelMutator, LabelMutationPlan};
use crate::selector::{MessageSelector, ReadFilter, SelectionCriteria};

const UNREAD_LABEL: &str = "UNREAD";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub found: usize,
    pub processed: usize,
    pub failed: usize,
    pub calls: usize,
}

/// One add and one removal per message
pub fn archive_plan(label_id: &str, ids: &[String]) -> LabelMutationPlan {
    let mut plan = LabelMutationPlan::new();
    for id in ids {
        plan.add(label_id, id);
        plan.remove(UNREAD_LABEL, id);
    }
    plan
}

pub async fn run(ctx: &CommandContext) -> Result<ArchiveSummary> {
    let settings = &ctx.config.archive;

    let label_id = LabelDirectory::new(ctx.client.clone())
        .id_for(&settings.label)
        .await?;
    info!("Using label '{}' ({})", settings.label, label_id);

    let criteria = SelectionCriteria::new(settings.page_size)
        .in_folder("inbox")
        .skip_junk()
        .read_filter(ReadFilter::UnreadOnly);
    let spinner = ctx
        .progress
        .add_spinner(&format!("Searching: {}", criteria.to_query()));
    let ids = MessageSelector::new(ctx.client.clone()).select(&criteria).await;
    spinner.finish_and_clear();
    let ids = ids?;

    if ids.is_empty() {
        console::success("No unread emails found in the inbox. Inbox zero!");
        return Ok(ArchiveSummary::default());
    }
    console::info(&format!(
        "Found {} unread emails. Applying '{}' and marking them read...",
        ids.len(),
        settings.label
    ));

    let plan = archive_plan(&label_id, &ids);
    let report = BatchLabelMutator::new(ctx.client.clone(), ctx.batch_size())
        .apply(&plan)
        .await;

    let failed = ids.iter().filter(|id| report.failed.contains(*id)).count();
    let summary = ArchiveSummary {
        found: ids.len(),
        processed: ids.len() - failed,
        failed,
        calls: report.calls,
    };

    console::success(&format!(
        "Processed {}/{} emails in {} batch calls.",
        summary.processed, summary.found, summary.calls
    ));
    if failed > 0 {
        console::warning(&format!(
            "{} emails were not updated; run again to retry them.",
            failed
        ));
    }
    Ok(summary)
}
