//! Requirements wizard: step selection, navigation and submission.

use std::sync::Arc;

use nimbus_chat::{ChatError, ChatPipeline, RequirementsWizard, StepId};
use nimbus_core::{MemoryStorage, MockApi, MockReply, NotificationLevel, SessionStore, UiHandle};
use serde_json::json;

fn wizard() -> (RequirementsWizard, UiHandle) {
    let ui = UiHandle::new();
    (RequirementsWizard::new(ui.clone()), ui)
}

fn pipeline(api: &MockApi, ui: &UiHandle) -> ChatPipeline {
    let session = Arc::new(SessionStore::new(
        Arc::new(api.clone()),
        Arc::new(MemoryStorage::new()),
        ui.clone(),
    ));
    ChatPipeline::new(Arc::new(api.clone()), session, ui.clone())
}

#[test]
fn test_trigger_classification() {
    let (wizard, _ui) = wizard();
    assert!(wizard.is_trigger("Create a serverless architecture with Lambda and DynamoDB"));
    assert!(wizard.is_trigger("spin up a kubernetes cluster"));
    assert!(!wizard.is_trigger("How much does Lambda cost?"));
    assert!(!wizard.is_trigger("build me a sandwich"));
}

#[test]
fn test_serverless_request_steps() {
    let (wizard, _ui) = wizard();
    let steps = wizard.open("Create a serverless architecture with Lambda and DynamoDB");
    for step in [StepId::Basic, StepId::Performance, StepId::Cost] {
        assert!(steps.contains(&step), "missing {}", step);
    }
}

#[test]
fn test_regulated_request_steps() {
    let (wizard, _ui) = wizard();
    let steps = wizard.open("production secure banking compliance deployment");
    for step in [StepId::Basic, StepId::Security, StepId::Compliance] {
        assert!(steps.contains(&step), "missing {}", step);
    }
}

#[test]
fn test_simplicity_overrides_advanced_keywords() {
    let (wizard, _ui) = wizard();
    let steps = wizard.open("simple development test setup with kubernetes multi-region and hipaa");
    assert!(!steps.contains(&StepId::Advanced));
    assert!(!steps.contains(&StepId::Compliance));
    assert_eq!(steps[0], StepId::Basic);
}

#[test]
fn test_basic_is_always_visible() {
    let (wizard, _ui) = wizard();
    for trigger in ["", "deploy", "simple basic test", "Build a VPC", "ünïcödé ☁"] {
        assert_eq!(wizard.open(trigger)[0], StepId::Basic);
    }
}

#[test]
fn test_open_and_close_toggle_chat_input() {
    let (wizard, ui) = wizard();
    wizard.open("Deploy a production EKS cluster");

    let snapshot = ui.snapshot();
    assert!(snapshot.wizard_open);
    assert!(!snapshot.input_enabled);
    let state = wizard.state().unwrap();
    assert_eq!(state.field_values["environment"], "production");
    assert_eq!(state.field_values["cloud_provider"], "aws");

    wizard.close();
    let snapshot = ui.snapshot();
    assert!(!snapshot.wizard_open);
    assert!(snapshot.input_enabled);
    assert!(!wizard.is_open());
}

#[test]
fn test_navigation_is_clamped_to_visible_steps() {
    let (wizard, _ui) = wizard();
    let steps = wizard.open("Create a serverless architecture with Lambda and DynamoDB");
    assert_eq!(steps, vec![StepId::Basic, StepId::Performance, StepId::Cost]);

    assert_eq!(wizard.previous().unwrap(), StepId::Basic);
    assert!((wizard.progress() - 1.0 / 3.0).abs() < f32::EPSILON);

    assert_eq!(wizard.next().unwrap(), StepId::Performance);
    assert_eq!(wizard.next().unwrap(), StepId::Cost);
    assert_eq!(wizard.next().unwrap(), StepId::Cost);
    assert_eq!(wizard.current_step(), Some(StepId::Cost));
    assert!((wizard.progress() - 1.0).abs() < f32::EPSILON);

    assert_eq!(wizard.previous().unwrap(), StepId::Performance);
}

#[test]
fn test_fields_of_hidden_steps_are_rejected() {
    let (wizard, _ui) = wizard();
    wizard.open("Create a serverless architecture with Lambda");

    wizard.set_field("monthly_budget", "500 USD").unwrap();
    assert!(matches!(
        wizard.set_field("frameworks", "HIPAA"),
        Err(ChatError::Validation(_))
    ));

    wizard.set_field("monthly_budget", "").unwrap();
    assert!(!wizard.state().unwrap().field_values.contains_key("monthly_budget"));
}

#[tokio::test]
async fn test_missing_field_blocks_submission() {
    let api = MockApi::new();
    let ui = UiHandle::new();
    let wizard = RequirementsWizard::new(ui.clone());
    let chat = pipeline(&api, &ui);

    wizard.open("Create a serverless architecture on AWS with Lambda");
    wizard.set_field("project_name", "orders").unwrap();
    wizard.set_field("environment", "staging").unwrap();
    wizard.set_field("expected_traffic", "1k rps").unwrap();
    wizard.next().unwrap();

    let err = wizard.submit(&chat).await.unwrap_err();
    match &err {
        ChatError::MissingField { step, field, .. } => {
            assert_eq!(*step, StepId::Cost);
            assert_eq!(field, "monthly_budget");
        }
        other => panic!("expected missing field, got {:?}", other),
    }

    assert_eq!(api.call_count(), 0);
    assert!(wizard.is_open());
    assert_eq!(wizard.current_step(), Some(StepId::Cost));
    let snapshot = ui.snapshot();
    assert_eq!(snapshot.notifications[0].level, NotificationLevel::Warning);
    assert!(snapshot.chat.is_empty());
}

#[tokio::test]
async fn test_valid_submission_goes_through_chat() {
    let api = MockApi::new().respond(
        "POST /agents/conversation",
        MockReply::ok(json!({"response": "Designing your serverless stack"})),
    );
    let ui = UiHandle::new();
    let wizard = RequirementsWizard::new(ui.clone());
    let chat = pipeline(&api, &ui);

    wizard.open("Create a serverless architecture on AWS with Lambda");
    wizard.set_field("project_name", "orders").unwrap();
    wizard.set_field("environment", "staging").unwrap();
    wizard.set_field("expected_traffic", "1k rps").unwrap();
    wizard.set_field("monthly_budget", "300 USD").unwrap();

    let reply = wizard.submit(&chat).await.unwrap().unwrap();
    assert_eq!(reply.text, "Designing your serverless stack");
    assert!(!wizard.is_open());
    assert!(ui.snapshot().input_enabled);

    let calls = api.calls_to("POST /agents/conversation");
    assert_eq!(calls.len(), 1);
    let message = calls[0].body.as_ref().unwrap()["message"].as_str().unwrap().to_string();
    assert!(message.contains("- Project name: orders"));
    assert!(message.contains("- Cloud provider: aws"));
    assert!(message.contains("- Monthly budget: 300 USD"));
}

#[tokio::test]
async fn test_submit_when_closed() {
    let api = MockApi::new();
    let ui = UiHandle::new();
    let wizard = RequirementsWizard::new(ui.clone());

    let err = wizard.submit(&pipeline(&api, &ui)).await.unwrap_err();
    assert!(matches!(err, ChatError::WizardClosed));
    assert_eq!(api.call_count(), 0);
}
