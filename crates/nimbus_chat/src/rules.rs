//! Keyword rules for intent classification and wizard step selection.
//!
//! Step visibility comes from an ordered rule table. Each rule carries a
//! keyword set and an effect (enable or disable some steps). Rules are
//! evaluated in table order and, for each step, the last matching rule wins.
//! `basic` is forced on after evaluation. The standard table ends with the
//! simplicity rule, so a "simple"/"development"/"test" request always hides
//! the `advanced` and `compliance` steps.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepId {
    Basic,
    Performance,
    Security,
    Cost,
    Compliance,
    Advanced,
}

impl StepId {
    /// All steps in display order.
    pub const ALL: [StepId; 6] = [
        StepId::Basic,
        StepId::Performance,
        StepId::Security,
        StepId::Cost,
        StepId::Compliance,
        StepId::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Performance => "performance",
            Self::Security => "security",
            Self::Cost => "cost",
            Self::Compliance => "compliance",
            Self::Advanced => "advanced",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Basic => "Basic Information",
            Self::Performance => "Performance & Scale",
            Self::Security => "Security",
            Self::Cost => "Cost",
            Self::Compliance => "Compliance",
            Self::Advanced => "Advanced Options",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive, whole-word matcher over a keyword set. Multi-word
/// keywords match across any run of whitespace.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
    regex: Option<Regex>,
}

impl KeywordMatcher {
    pub fn new(keywords: &[&str]) -> Self {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| regex::escape(&k.trim().to_lowercase()).replace(' ', r"\s+"))
            .filter(|k| !k.is_empty())
            .collect();

        let regex = if alternatives.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Invalid keyword pattern {}: {}", pattern, e);
                    None
                }
            }
        };

        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            regex,
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(text))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

/// Decides whether a chat message asks for infrastructure work: it needs
/// both an action verb and an infrastructure noun.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    verbs: KeywordMatcher,
    nouns: KeywordMatcher,
}

impl IntentClassifier {
    pub fn new(verbs: &[&str], nouns: &[&str]) -> Self {
        Self {
            verbs: KeywordMatcher::new(verbs),
            nouns: KeywordMatcher::new(nouns),
        }
    }

    pub fn standard() -> Self {
        Self::new(
            &[
                "create", "build", "design", "deploy", "set up", "setup", "provision", "launch",
                "spin up",
            ],
            &[
                "infrastructure", "vpc", "lambda", "kubernetes", "k8s", "ecs", "eks", "rds", "ec2",
                "s3", "dynamodb", "terraform", "serverless", "architecture", "cluster", "database",
                "load balancer", "network", "aurora", "fargate",
            ],
        )
    }

    pub fn is_infrastructure_request(&self, text: &str) -> bool {
        self.verbs.matches(text) && self.nouns.matches(text)
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::standard()
    }
}

/// What a matching rule does to its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleEffect {
    Enable,
    Disable,
}

/// One row of the step rule table.
#[derive(Debug, Clone)]
pub struct StepRule {
    pub name: String,
    pub matcher: KeywordMatcher,
    pub effect: RuleEffect,
    pub steps: Vec<StepId>,
}

/// Outcome of evaluating a rule table against a trigger message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSelection {
    /// Enabled steps in display order; always starts with `basic`
    pub visible: Vec<StepId>,
    /// Names of the rules that matched, in evaluation order
    pub matched_rules: Vec<String>,
}

impl StepSelection {
    pub fn contains(&self, step: StepId) -> bool {
        self.visible.contains(&step)
    }
}

/// Ordered rule table; the last matching rule wins per step.
#[derive(Debug, Clone, Default)]
pub struct StepRuleTable {
    rules: Vec<StepRule>,
}

impl StepRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Later rules override earlier ones on shared steps.
    pub fn rule(mut self, name: impl Into<String>, keywords: &[&str], effect: RuleEffect, steps: &[StepId]) -> Self {
        self.rules.push(StepRule {
            name: name.into(),
            matcher: KeywordMatcher::new(keywords),
            effect,
            steps: steps.to_vec(),
        });
        self
    }

    pub fn rules(&self) -> &[StepRule] {
        &self.rules
    }

    /// The table used by the console.
    pub fn standard() -> Self {
        Self::new()
            .rule(
                "performance",
                &[
                    "performance", "scale", "scalable", "scaling", "autoscaling", "latency",
                    "throughput", "high availability", "load", "traffic", "serverless", "lambda",
                    "dynamodb", "cache", "caching", "real-time", "realtime",
                ],
                RuleEffect::Enable,
                &[StepId::Performance],
            )
            .rule(
                "security",
                &[
                    "secure", "security", "encryption", "encrypted", "production", "banking", "bank",
                    "financial", "healthcare", "pii", "iam", "private", "firewall", "waf",
                    "authentication",
                ],
                RuleEffect::Enable,
                &[StepId::Security],
            )
            .rule(
                "cost",
                &[
                    "cost", "costs", "budget", "cheap", "affordable", "serverless", "lambda",
                    "optimize", "optimise", "pricing", "spot", "savings", "pay-per-use",
                ],
                RuleEffect::Enable,
                &[StepId::Cost],
            )
            .rule(
                "compliance",
                &[
                    "compliance", "compliant", "hipaa", "pci", "pci-dss", "gdpr", "sox", "soc2",
                    "soc 2", "iso 27001", "banking", "healthcare", "audit", "regulated",
                    "regulatory", "financial",
                ],
                RuleEffect::Enable,
                &[StepId::Compliance],
            )
            .rule(
                "advanced",
                &[
                    "kubernetes", "k8s", "eks", "aks", "gke", "multi-region", "multi region",
                    "microservices", "service mesh", "istio", "custom", "advanced",
                    "disaster recovery", "hybrid", "vpc peering", "transit gateway",
                ],
                RuleEffect::Enable,
                &[StepId::Advanced],
            )
            .rule(
                "simplicity",
                &["simple", "basic", "development", "test", "prototype", "sandbox"],
                RuleEffect::Disable,
                &[StepId::Advanced, StepId::Compliance],
            )
    }

    /// Evaluate every rule against `text`.
    pub fn evaluate(&self, text: &str) -> StepSelection {
        let mut enabled: BTreeMap<StepId, bool> = StepId::ALL.iter().map(|s| (*s, false)).collect();
        let mut matched_rules = Vec::new();

        for rule in &self.rules {
            if !rule.matcher.matches(text) {
                continue;
            }
            matched_rules.push(rule.name.clone());
            for step in &rule.steps {
                enabled.insert(*step, rule.effect == RuleEffect::Enable);
            }
        }
        enabled.insert(StepId::Basic, true);

        StepSelection {
            visible: StepId::ALL.iter().copied().filter(|s| enabled[s]).collect(),
            matched_rules,
        }
    }
}
