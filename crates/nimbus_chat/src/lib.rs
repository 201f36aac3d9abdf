//! # nimbus_chat
//!
//! Chat side of the Nimbus console.
//!
//! - **Pipeline**: conversational turns plus the `analyze → generate → execute`
//!   agent pipeline, with one cached [`ResultCard`] per agent panel
//! - **Rules**: keyword classification of infrastructure intent and the ordered
//!   rule table that picks wizard steps
//! - **Wizard**: the multi-step requirements form that feeds the pipeline
//! - **Console**: [`ConsoleContext`], which owns and wires every component
//!
//! # Example
//!
//! ```rust,no_run
//! use nimbus_chat::{ChatOutcome, ConsoleContext};
//! use nimbus_core::ConsoleConfig;
//!
//! # async fn run() -> nimbus_chat::ChatResult<()> {
//! let config = ConsoleConfig::load(std::path::Path::new("."))?;
//! let console = ConsoleContext::from_config(config)?;
//! console.init().await;
//!
//! if let ChatOutcome::WizardOpened(steps) = console.send_chat("Deploy an EKS cluster").await? {
//!     println!("wizard steps: {:?}", steps);
//! }
//! console.dispose();
//! # Ok(())
//! # }
//! ```

pub mod console;
pub mod error;
pub mod pipeline;
pub mod rules;
pub mod wizard;

pub use console::{ChatOutcome, ConsoleContext};
pub use error::{ChatError, ChatResult};
pub use pipeline::{
    Analysis, ChatEndpoint, ChatPipeline, CorrelationId, CorrelationKind, ResultCard, GENERATE_FIRST,
};
pub use rules::{IntentClassifier, KeywordMatcher, RuleEffect, StepId, StepRule, StepRuleTable, StepSelection};
pub use wizard::{fields_for, FieldSpec, RequirementsWizard, WizardState};
