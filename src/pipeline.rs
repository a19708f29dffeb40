//! Generic categorize-and-label pipeline
//!
//! Selector -> Materializer -> Classifier (per message) -> Mutator -> Report.
//! Labels are resolved once before anything is selected. Every step runs
//! sequentially and verdicts keep selection order.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::classifier::{CategorySet, ClassificationRequest, ClassifierAdapter, ExtractionSchema};
use crate::client::GmailClient;
use crate::error::Result;
use crate::label_directory::LabelDirectory;
use crate::materializer::MessageMaterializer;
use crate::models::{ClassificationVerdict, MessageRecord};
use crate::mutator::{BatchLabelMutator, LabelMutationPlan, MutationReport};
use crate::report::{ClassifiedMessage, RunReport};
use crate::selector::{MessageSelector, SelectionCriteria};

/// What a command plugs into the pipeline
pub trait CategorizeJob: Send + Sync {
    /// Title used for the narrative report
    fn title(&self) -> &str;

    fn criteria(&self) -> SelectionCriteria;

    fn categories(&self) -> &CategorySet;

    fn schema(&self) -> ExtractionSchema {
        ExtractionSchema::new("category")
    }

    /// Prompt for one record
    fn request(&self, record: &MessageRecord) -> ClassificationRequest;

    /// Label applied for a category, if any
    fn target_label(&self, _category: &str) -> Option<String> {
        None
    }

    /// Verdict decided without calling the classifier
    fn precheck(&self, _record: &MessageRecord) -> Option<ClassificationVerdict> {
        None
    }
}

/// Progress notifications
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    LabelsResolved(usize),
    Selected(usize),
    Classified { subject: String, category: String },
    Skipped { id: String },
    Mutating(usize),
}

pub type PipelineObserver = Arc<dyn Fn(PipelineEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub selected: usize,
    pub labels: HashMap<String, String>,
    pub report: RunReport,
    pub mutation: MutationReport,
}

impl PipelineOutcome {
    /// Messages that failed to materialize
    pub fn skipped(&self) -> usize {
        self.selected - self.report.total()
    }
}

pub struct CategorizePipeline {
    client: Arc<dyn GmailClient>,
    classifier: ClassifierAdapter,
    batch_size: usize,
    observer: Option<PipelineObserver>,
}

impl CategorizePipeline {
    pub fn new(client: Arc<dyn GmailClient>, classifier: ClassifierAdapter, batch_size: usize) -> Self {
        Self {
            client,
            classifier,
            batch_size,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: PipelineObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn notify(&self, event: PipelineEvent) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }

    pub async fn run(&self, job: &dyn CategorizeJob) -> Result<PipelineOutcome> {
        let categories = job.categories();
        let schema = job.schema();

        // Label names for every category that carries one
        let mut label_names: Vec<String> = Vec::new();
        for category in categories.values() {
            if let Some(name) = job.target_label(category) {
                if !label_names.contains(&name) {
                    label_names.push(name);
                }
            }
        }

        let labels = if label_names.is_empty() {
            HashMap::new()
        } else {
            let mut directory = LabelDirectory::new(self.client.clone());
            directory.resolve(&label_names).await?
        };
        self.notify(PipelineEvent::LabelsResolved(labels.len()));

        let ids = MessageSelector::new(self.client.clone())
            .select(&job.criteria())
            .await?;
        self.notify(PipelineEvent::Selected(ids.len()));

        let materializer = MessageMaterializer::new(self.client.clone());
        let mut results = Vec::with_capacity(ids.len());
        let mut plan = LabelMutationPlan::new();

        for id in &ids {
            let record = match materializer.materialize(id).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("Skipping message: {}", e);
                    self.notify(PipelineEvent::Skipped { id: id.clone() });
                    continue;
                }
            };

            let verdict = match job.precheck(&record) {
                Some(verdict) => verdict,
                None => {
                    let request = job.request(&record);
                    self.classifier
                        .classify_or_default(&request, categories, &schema)
                        .await
                }
            };

            if let Some(label_id) = job
                .target_label(&verdict.category)
                .and_then(|name| labels.get(&name))
            {
                plan.add(label_id, &record.id);
            }

            debug!("{} -> {}", record.id, verdict.category);
            self.notify(PipelineEvent::Classified {
                subject: record.subject.clone(),
                category: verdict.category.clone(),
            });
            results.push(ClassifiedMessage { record, verdict });
        }

        let mutation = if plan.is_empty() {
            MutationReport::default()
        } else {
            self.notify(PipelineEvent::Mutating(plan.len()));
            BatchLabelMutator::new(self.client.clone(), self.batch_size)
                .apply(&plan)
                .await
        };

        let report = RunReport::new(job.title(), categories, results);
        info!(
            "{}: {} selected, {} classified, {} labeled",
            job.title(),
            ids.len(),
            report.total(),
            mutation.mutated.len()
        );

        Ok(PipelineOutcome {
            selected: ids.len(),
            labels,
            report,
            mutation,
        })
    }
}
