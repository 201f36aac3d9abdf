//! Requirements intake wizard.
//!
//! Opened by a trigger phrase in chat. The trigger text decides which steps
//! are visible (see [`StepRuleTable`]); navigation only ever moves across
//! visible steps. While the wizard is open the chat input is disabled.

use std::collections::BTreeMap;

use nimbus_core::{ChatTurn, NotificationLevel, UiHandle};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ChatError, ChatResult};
use crate::pipeline::ChatPipeline;
use crate::rules::{IntentClassifier, KeywordMatcher, StepId, StepRuleTable};

/// One input on a wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
}

const fn field(key: &'static str, label: &'static str, required: bool) -> FieldSpec {
    FieldSpec { key, label, required }
}

const BASIC_FIELDS: &[FieldSpec] = &[
    field("project_name", "Project name", true),
    field("environment", "Environment", true),
    field("cloud_provider", "Cloud provider", true),
    field("region", "Region", false),
    field("description", "Description", false),
];

const PERFORMANCE_FIELDS: &[FieldSpec] = &[
    field("expected_traffic", "Expected traffic", true),
    field("availability_target", "Availability target", false),
    field("scaling", "Scaling strategy", false),
];

const SECURITY_FIELDS: &[FieldSpec] = &[
    field("data_sensitivity", "Data sensitivity", true),
    field("encryption", "Encryption requirements", false),
    field("access_control", "Access control", false),
];

const COST_FIELDS: &[FieldSpec] = &[
    field("monthly_budget", "Monthly budget", true),
    field("cost_priority", "Cost priority", false),
];

const COMPLIANCE_FIELDS: &[FieldSpec] = &[
    field("frameworks", "Compliance frameworks", true),
    field("data_residency", "Data residency", false),
];

const ADVANCED_FIELDS: &[FieldSpec] = &[
    field("orchestration", "Orchestration", false),
    field("multi_region", "Multi-region strategy", false),
    field("notes", "Additional notes", false),
];

/// Inputs shown on `step`.
pub fn fields_for(step: StepId) -> &'static [FieldSpec] {
    match step {
        StepId::Basic => BASIC_FIELDS,
        StepId::Performance => PERFORMANCE_FIELDS,
        StepId::Security => SECURITY_FIELDS,
        StepId::Cost => COST_FIELDS,
        StepId::Compliance => COMPLIANCE_FIELDS,
        StepId::Advanced => ADVANCED_FIELDS,
    }
}

/// State of an open wizard. `current_step_index` is always a valid index
/// into `visible_steps`, which always starts with `basic`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardState {
    pub visible_steps: Vec<StepId>,
    pub current_step_index: usize,
    pub field_values: BTreeMap<String, String>,
    pub trigger: String,
}

impl WizardState {
    pub fn current_step(&self) -> StepId {
        self.visible_steps[self.current_step_index]
    }

    /// Fraction of the way through the visible steps, in `(0, 1]`.
    pub fn progress(&self) -> f32 {
        (self.current_step_index + 1) as f32 / self.visible_steps.len() as f32
    }

    fn value(&self, key: &str) -> Option<&str> {
        self.field_values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn accepts(&self, key: &str) -> bool {
        self.visible_steps
            .iter()
            .any(|step| fields_for(*step).iter().any(|f| f.key == key))
    }

    /// Check every required field on every visible step.
    pub fn validate(&self) -> ChatResult<()> {
        for step in &self.visible_steps {
            for f in fields_for(*step).iter().filter(|f| f.required) {
                if self.value(f.key).is_none() {
                    return Err(ChatError::MissingField {
                        step: *step,
                        field: f.key.to_string(),
                        label: f.label.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Aggregate all filled-in values into one chat message.
    pub fn compose_message(&self) -> String {
        let mut message = String::from("Please design infrastructure with the following requirements:\n");
        message.push_str(&format!("\nOriginal request: {}\n", self.trigger));

        for step in &self.visible_steps {
            let lines: Vec<String> = fields_for(*step)
                .iter()
                .filter_map(|f| self.value(f.key).map(|v| format!("- {}: {}", f.label, v)))
                .collect();
            if lines.is_empty() {
                continue;
            }
            message.push_str(&format!("\n{}:\n{}\n", step.title(), lines.join("\n")));
        }

        message.trim_end().to_string()
    }
}

/// Guesses used to prefill the basic step from the trigger text.
struct Prefill {
    environments: Vec<(&'static str, KeywordMatcher)>,
    providers: Vec<(&'static str, KeywordMatcher)>,
}

impl Prefill {
    fn standard() -> Self {
        Self {
            environments: vec![
                ("production", KeywordMatcher::new(&["production", "prod"])),
                ("staging", KeywordMatcher::new(&["staging", "stage", "uat"])),
                ("development", KeywordMatcher::new(&["development", "dev", "test", "sandbox"])),
            ],
            providers: vec![
                (
                    "aws",
                    KeywordMatcher::new(&["aws", "amazon", "lambda", "dynamodb", "ec2", "s3", "eks", "ecs", "rds"]),
                ),
                ("azure", KeywordMatcher::new(&["azure", "aks"])),
                ("gcp", KeywordMatcher::new(&["gcp", "google cloud", "gke"])),
            ],
        }
    }

    fn apply(&self, trigger: &str, values: &mut BTreeMap<String, String>) {
        values.insert("description".to_string(), trigger.to_string());
        let first = |candidates: &[(&'static str, KeywordMatcher)]| {
            candidates
                .iter()
                .find(|(_, matcher)| matcher.matches(trigger))
                .map(|(value, _)| value.to_string())
        };
        if let Some(environment) = first(self.environments.as_slice()) {
            values.insert("environment".to_string(), environment);
        }
        if let Some(provider) = first(self.providers.as_slice()) {
            values.insert("cloud_provider".to_string(), provider);
        }
    }
}

/// The multi-step requirements form.
pub struct RequirementsWizard {
    ui: UiHandle,
    classifier: IntentClassifier,
    rules: StepRuleTable,
    prefill: Prefill,
    state: Mutex<Option<WizardState>>,
}

impl RequirementsWizard {
    pub fn new(ui: UiHandle) -> Self {
        Self {
            ui,
            classifier: IntentClassifier::standard(),
            rules: StepRuleTable::standard(),
            prefill: Prefill::standard(),
            state: Mutex::new(None),
        }
    }

    pub fn with_rules(mut self, rules: StepRuleTable) -> Self {
        self.rules = rules;
        self
    }

    /// Whether `text` should open the wizard instead of going to chat.
    pub fn is_trigger(&self, text: &str) -> bool {
        self.classifier.is_infrastructure_request(text)
    }

    /// Open (or reopen) the wizard for `trigger`. Returns the visible steps.
    pub fn open(&self, trigger: &str) -> Vec<StepId> {
        let selection = self.rules.evaluate(trigger);
        info!(
            "Opening requirements wizard with steps {:?} (rules matched: {:?})",
            selection.visible, selection.matched_rules
        );

        let mut field_values = BTreeMap::new();
        self.prefill.apply(trigger, &mut field_values);

        *self.state.lock() = Some(WizardState {
            visible_steps: selection.visible.clone(),
            current_step_index: 0,
            field_values,
            trigger: trigger.to_string(),
        });
        self.ui.update(|ui| {
            ui.wizard_open = true;
            ui.input_enabled = false;
        });
        selection.visible
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().is_some()
    }

    pub fn state(&self) -> Option<WizardState> {
        self.state.lock().clone()
    }

    pub fn visible_steps(&self) -> Vec<StepId> {
        self.state
            .lock()
            .as_ref()
            .map(|s| s.visible_steps.clone())
            .unwrap_or_default()
    }

    pub fn current_step(&self) -> Option<StepId> {
        self.state.lock().as_ref().map(WizardState::current_step)
    }

    /// Move to the next visible step; stays on the last one.
    pub fn next(&self) -> ChatResult<StepId> {
        self.navigate(|state| {
            if state.current_step_index + 1 < state.visible_steps.len() {
                state.current_step_index += 1;
            }
        })
    }

    /// Move to the previous visible step; stays on the first one.
    pub fn previous(&self) -> ChatResult<StepId> {
        self.navigate(|state| {
            state.current_step_index = state.current_step_index.saturating_sub(1);
        })
    }

    /// Progress through the visible steps; 0 when closed.
    pub fn progress(&self) -> f32 {
        self.state.lock().as_ref().map(WizardState::progress).unwrap_or(0.0)
    }

    /// Set a field on any visible step. An empty value clears the field.
    pub fn set_field(&self, key: &str, value: impl Into<String>) -> ChatResult<()> {
        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or(ChatError::WizardClosed)?;
        if !state.accepts(key) {
            return Err(ChatError::Validation(format!(
                "Field '{}' is not part of this wizard",
                key
            )));
        }

        let value = value.into();
        if value.trim().is_empty() {
            state.field_values.remove(key);
        } else {
            state.field_values.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Close without submitting and give the chat input back.
    pub fn close(&self) {
        *self.state.lock() = None;
        self.ui.update(|ui| {
            ui.wizard_open = false;
            ui.input_enabled = true;
        });
    }

    /// Validate, close and hand the aggregated message to the chat pipeline.
    ///
    /// A missing required field is reported without any request; the wizard
    /// stays open on the step holding that field.
    pub async fn submit(&self, chat: &ChatPipeline) -> ChatResult<Option<ChatTurn>> {
        let message = {
            let mut guard = self.state.lock();
            let state = guard.as_mut().ok_or(ChatError::WizardClosed)?;
            if let Err(e) = state.validate() {
                if let ChatError::MissingField { step, .. } = &e {
                    if let Some(index) = state.visible_steps.iter().position(|s| s == step) {
                        state.current_step_index = index;
                    }
                }
                warn!("Requirements wizard incomplete: {}", e);
                drop(guard);
                self.ui.notify(NotificationLevel::Warning, e.to_string());
                return Err(e);
            }
            state.compose_message()
        };

        self.close();
        Ok(chat.submit(&message).await)
    }

    fn navigate(&self, step: impl FnOnce(&mut WizardState)) -> ChatResult<StepId> {
        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or(ChatError::WizardClosed)?;
        step(state);
        Ok(state.current_step())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(steps: Vec<StepId>) -> WizardState {
        WizardState {
            visible_steps: steps,
            current_step_index: 0,
            field_values: BTreeMap::new(),
            trigger: "Create a VPC".to_string(),
        }
    }

    #[test]
    fn test_every_step_has_fields_and_basic_has_required() {
        for step in StepId::ALL {
            assert!(!fields_for(step).is_empty());
        }
        let required: Vec<_> = BASIC_FIELDS.iter().filter(|f| f.required).map(|f| f.key).collect();
        assert_eq!(required, vec!["project_name", "environment", "cloud_provider"]);
    }

    #[test]
    fn test_validate_reports_first_missing_field() {
        let mut state = state(vec![StepId::Basic, StepId::Cost]);
        state.field_values.insert("project_name".into(), "shop".into());
        state.field_values.insert("environment".into(), "   ".into());

        match state.validate() {
            Err(ChatError::MissingField { step, field, .. }) => {
                assert_eq!(step, StepId::Basic);
                assert_eq!(field, "environment");
            }
            other => panic!("expected missing field, got {:?}", other),
        }

        state.field_values.insert("environment".into(), "production".into());
        state.field_values.insert("cloud_provider".into(), "aws".into());
        let err = state.validate().unwrap_err();
        assert_eq!(err.to_string(), "'Monthly budget' is required in the cost step");
    }

    #[test]
    fn test_compose_message_groups_by_step() {
        let mut state = state(vec![StepId::Basic, StepId::Security]);
        state.field_values.insert("project_name".into(), "vault".into());
        state.field_values.insert("data_sensitivity".into(), "PII".into());
        state.field_values.insert("notes".into(), "ignored: advanced is hidden".into());

        let message = state.compose_message();
        assert!(message.starts_with("Please design infrastructure"));
        assert!(message.contains("Original request: Create a VPC"));
        assert!(message.contains("Basic Information:\n- Project name: vault"));
        assert!(message.contains("Security:\n- Data sensitivity: PII"));
        assert!(!message.contains("ignored"));
    }

    #[test]
    fn test_prefill_from_trigger() {
        let mut values = BTreeMap::new();
        Prefill::standard().apply("Deploy a production EKS cluster", &mut values);
        assert_eq!(values["environment"], "production");
        assert_eq!(values["cloud_provider"], "aws");
        assert_eq!(values["description"], "Deploy a production EKS cluster");

        let mut values = BTreeMap::new();
        Prefill::standard().apply("Build a network", &mut values);
        assert!(!values.contains_key("environment"));
        assert!(!values.contains_key("cloud_provider"));
    }

    #[test]
    fn test_closed_wizard_rejects_edits() {
        let wizard = RequirementsWizard::new(UiHandle::new());
        assert!(matches!(wizard.next(), Err(ChatError::WizardClosed)));
        assert!(matches!(wizard.set_field("project_name", "x"), Err(ChatError::WizardClosed)));
        assert_eq!(wizard.progress(), 0.0);
        assert!(wizard.visible_steps().is_empty());
    }
}
