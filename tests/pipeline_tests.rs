//! Categorize pipeline and batch mutation behavior against a mocked mailbox

mod common;

use common::*;
use email_assistant::classifier::{CategorySet, ClassificationRequest, ClassifierAdapter};
use email_assistant::client::MessagePage;
use email_assistant::error::AssistantError;
use email_assistant::models::MessageRecord;
use email_assistant::mutator::{BatchLabelMutator, LabelMutationPlan};
use email_assistant::pipeline::{CategorizeJob, CategorizePipeline, PipelineEvent};
use email_assistant::selector::SelectionCriteria;
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Categories A, B, C; A and B carry labels of the same name
struct LetterJob {
    categories: CategorySet,
}

impl LetterJob {
    fn new() -> Self {
        Self {
            categories: CategorySet::new(&["A", "B", "C"], "C"),
        }
    }
}

impl CategorizeJob for LetterJob {
    fn title(&self) -> &str {
        "Letters"
    }

    fn criteria(&self) -> SelectionCriteria {
        SelectionCriteria::new(100).in_folder("inbox")
    }

    fn categories(&self) -> &CategorySet {
        &self.categories
    }

    fn request(&self, record: &MessageRecord) -> ClassificationRequest {
        ClassificationRequest {
            model: "test-model".to_string(),
            system: "classify".to_string(),
            user: record.subject.clone(),
        }
    }

    fn target_label(&self, category: &str) -> Option<String> {
        matches!(category, "A" | "B").then(|| format!("Label-{}", category))
    }
}

type Calls = Arc<Mutex<Vec<(Vec<String>, Vec<String>, Vec<String>)>>>;

fn mailbox(message_ids: &[&str]) -> (MockGmailClient, Calls) {
    let mut client = MockGmailClient::new();
    client.expect_list_labels().returning(|| {
        Ok(vec![label("L_A", "Label-A"), label("L_B", "Label-B")])
    });
    let page = single_page(message_ids);
    client
        .expect_list_message_ids_page()
        .returning(move |_, _, _| Ok(page.clone()));
    client
        .expect_get_message()
        .returning(|id| Ok(gmail_message(id, "sender@example.com", id, "body")));

    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    client
        .expect_batch_modify_labels()
        .returning(move |ids, add, remove| {
            sink.lock()
                .unwrap()
                .push((ids.to_vec(), add.to_vec(), remove.to_vec()));
            Ok(())
        });
    (client, calls)
}

fn verdicts(map: &'static [(&'static str, &'static str)]) -> MockTextClassifier {
    let mut classifier = MockTextClassifier::new();
    classifier
        .expect_complete_json()
        .returning(move |_, _, user| {
            let category = map
                .iter()
                .find(|(subject, _)| *subject == user)
                .map(|(_, c)| *c)
                .unwrap_or("C");
            Ok(json!({"category": category, "reason": "test", "confidence": 0.8}))
        });
    classifier
}

#[tokio::test]
async fn test_counts_follow_verdicts() {
    let (client, calls) = mailbox(&["m1", "m2", "m3"]);
    let classifier = verdicts(&[("m1", "A"), ("m2", "B"), ("m3", "A")]);

    let pipeline = CategorizePipeline::new(
        Arc::new(client),
        ClassifierAdapter::new(Arc::new(classifier)),
        100,
    );
    let outcome = pipeline.run(&LetterJob::new()).await.unwrap();

    assert_eq!(outcome.selected, 3);
    assert_eq!(outcome.report.count("A"), 2);
    assert_eq!(outcome.report.count("B"), 1);
    assert_eq!(outcome.report.count("C"), 0);
    assert_eq!(outcome.report.total(), 3);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls.contains(&(
        vec!["m1".to_string(), "m3".to_string()],
        vec!["L_A".to_string()],
        vec![]
    )));
    assert!(calls.contains(&(vec!["m2".to_string()], vec!["L_B".to_string()], vec![])));
    assert_eq!(outcome.mutation.mutated.len(), 3);
}

#[tokio::test]
async fn test_out_of_set_category_coerced_to_fallback() {
    let (client, calls) = mailbox(&["m1", "m2"]);
    let classifier = verdicts(&[("m1", "Zebra"), ("m2", "a")]);

    let outcome = CategorizePipeline::new(
        Arc::new(client),
        ClassifierAdapter::new(Arc::new(classifier)),
        100,
    )
    .run(&LetterJob::new())
    .await
    .unwrap();

    assert_eq!(outcome.report.count("C"), 1);
    assert_eq!(outcome.report.count("A"), 1);
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert!(outcome
        .report
        .results()
        .iter()
        .all(|r| ["A", "B", "C"].contains(&r.verdict.category.as_str())));
}

#[tokio::test]
async fn test_classifier_failure_becomes_safe_default() {
    let (client, calls) = mailbox(&["m1"]);
    let mut classifier = MockTextClassifier::new();
    classifier
        .expect_complete_json()
        .returning(|_, _, _| Err(AssistantError::ClassificationError("boom".to_string())));

    let outcome = CategorizePipeline::new(
        Arc::new(client),
        ClassifierAdapter::new(Arc::new(classifier)),
        100,
    )
    .run(&LetterJob::new())
    .await
    .unwrap();

    let result = &outcome.report.results()[0];
    assert_eq!(result.verdict.category, "C");
    assert_eq!(result.verdict.confidence, Some(0.0));
    assert!(result.verdict.reason.contains("boom"));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_is_excluded() {
    let mut client = MockGmailClient::new();
    client
        .expect_list_labels()
        .returning(|| Ok(vec![label("L_A", "Label-A"), label("L_B", "Label-B")]));
    client
        .expect_list_message_ids_page()
        .returning(|_, _, _| Ok(single_page(&["m1", "m2", "m3"])));
    client.expect_get_message().returning(|id| {
        if id == "m2" {
            Err(AssistantError::NotFound("m2".to_string()))
        } else {
            Ok(gmail_message(id, "s@example.com", id, "body"))
        }
    });
    client.expect_batch_modify_labels().returning(|_, _, _| Ok(()));

    let skipped = Arc::new(Mutex::new(Vec::new()));
    let sink = skipped.clone();
    let outcome = CategorizePipeline::new(
        Arc::new(client),
        ClassifierAdapter::new(Arc::new(verdicts(&[("m1", "A"), ("m3", "B")]))),
        100,
    )
    .with_observer(Arc::new(move |event| {
        if let PipelineEvent::Skipped { id } = event {
            sink.lock().unwrap().push(id);
        }
    }))
    .run(&LetterJob::new())
    .await
    .unwrap();

    assert_eq!(outcome.selected, 3);
    assert_eq!(outcome.report.total(), 2);
    assert_eq!(outcome.skipped(), 1);
    assert_eq!(*skipped.lock().unwrap(), vec!["m2".to_string()]);
    assert!(outcome.report.results().iter().all(|r| r.record.id != "m2"));
}

#[tokio::test]
async fn test_selection_error_discards_partial_results() {
    let mut client = MockGmailClient::new();
    client
        .expect_list_labels()
        .returning(|| Ok(vec![label("L_A", "Label-A"), label("L_B", "Label-B")]));
    client
        .expect_list_message_ids_page()
        .returning(|_, _, token| match token {
            None => Ok(MessagePage {
                ids: vec!["m1".to_string(), "m2".to_string()],
                next_page_token: Some("page-2".to_string()),
            }),
            Some(_) => Err(AssistantError::ServerError {
                status: 503,
                message: "unavailable".to_string(),
            }),
        });
    client.expect_get_message().times(0);
    client.expect_batch_modify_labels().times(0);

    let result = CategorizePipeline::new(
        Arc::new(client),
        ClassifierAdapter::new(Arc::new(MockTextClassifier::new())),
        100,
    )
    .run(&LetterJob::new())
    .await;

    assert!(matches!(result, Err(AssistantError::SelectionError(_))));
}

#[tokio::test]
async fn test_missing_labels_are_created_once() {
    let mut client = MockGmailClient::new();
    client.expect_list_labels().times(1).returning(|| Ok(vec![]));
    client
        .expect_create_label()
        .times(2)
        .returning(|name| Ok(format!("id-{}", name)));
    client
        .expect_list_message_ids_page()
        .returning(|_, _, _| Ok(single_page(&[])));

    let outcome = CategorizePipeline::new(
        Arc::new(client),
        ClassifierAdapter::new(Arc::new(MockTextClassifier::new())),
        100,
    )
    .run(&LetterJob::new())
    .await
    .unwrap();

    assert_eq!(outcome.labels.len(), 2);
    assert_eq!(outcome.labels["Label-A"], "id-Label-A");
    assert_eq!(outcome.report.total(), 0);
}

fn recording_client(fail_call: Option<usize>) -> (MockGmailClient, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let mut client = MockGmailClient::new();
    client
        .expect_batch_modify_labels()
        .returning(move |ids, add, remove| {
            let mut calls = sink.lock().unwrap();
            calls.push((ids.to_vec(), add.to_vec(), remove.to_vec()));
            if Some(calls.len()) == fail_call {
                Err(AssistantError::ServerError {
                    status: 500,
                    message: "backend".to_string(),
                })
            } else {
                Ok(())
            }
        });
    (client, calls)
}

fn plan_for(label_id: &str, message_ids: &[String]) -> LabelMutationPlan {
    let mut plan = LabelMutationPlan::new();
    for id in message_ids {
        plan.add(label_id, id);
    }
    plan
}

#[tokio::test]
async fn test_batches_respect_size_limit() {
    let (client, calls) = recording_client(None);
    let message_ids = ids(250);

    let report = BatchLabelMutator::new(Arc::new(client), 100)
        .apply(&plan_for("L1", &message_ids))
        .await;

    let sizes: Vec<usize> = calls.lock().unwrap().iter().map(|c| c.0.len()).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    assert_eq!(report.calls, 3);
    assert_eq!(report.mutated.len(), 250);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_failed_chunk_does_not_stop_later_chunks() {
    let (client, calls) = recording_client(Some(2));
    let message_ids = ids(250);

    let report = BatchLabelMutator::new(Arc::new(client), 100)
        .apply(&plan_for("L1", &message_ids))
        .await;

    assert_eq!(calls.lock().unwrap().len(), 3);
    assert_eq!(report.failed_chunks, 1);
    assert_eq!(report.failed.len(), 100);
    assert_eq!(report.mutated.len(), 150);
    assert!(report.failed.contains("msg_0100"));
    assert!(!report.mutated.contains("msg_0100"));
}

#[tokio::test]
async fn test_add_and_remove_share_each_call() {
    let (client, calls) = recording_client(Some(1));
    let message_ids = ids(150);
    let mut plan = plan_for("L1", &message_ids);
    for id in &message_ids {
        plan.remove("UNREAD", id);
    }

    let report = BatchLabelMutator::new(Arc::new(client), 100)
        .apply(&plan)
        .await;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    for (_, add, remove) in calls.iter() {
        assert_eq!(add, &vec!["L1".to_string()]);
        assert_eq!(remove, &vec!["UNREAD".to_string()]);
    }
    // the failed first chunk kept UNREAD on exactly the messages that missed L1
    assert_eq!(report.failed.len(), 100);
    assert_eq!(calls[1].0[0], "msg_0100");
    assert_eq!(report.mutated.len(), 50);
}

#[tokio::test]
async fn test_reapplying_plan_is_harmless() {
    let (client, calls) = recording_client(None);
    let mutator = BatchLabelMutator::new(Arc::new(client), 100);
    let plan = plan_for("L1", &ids(10));

    let first = mutator.apply(&plan).await;
    let second = mutator.apply(&plan).await;

    assert!(first.is_clean() && second.is_clean());
    assert_eq!(first.mutated, second.mutated);
    assert_eq!(calls.lock().unwrap().len(), 2);
}
