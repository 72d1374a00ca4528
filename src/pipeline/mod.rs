//! Inbound message processing pipeline.
//!
//! Every job from the webhook flows through:
//! 1. `RulesEngine::evaluate()`: keyword rules (no LLM)
//! 2. `ClassificationPipeline::classify()`: model fallback, fails closed
//! 3. `PolicyEngine`: segment and reply policy lookup
//! 4. `MessageProcessor::process()`: guardrails, send, delivery log
//!
//! `ManualSender` covers operator-initiated sends from the admin API.

pub mod classifier;
pub mod manual;
pub mod policy;
pub mod processor;
pub mod rules;
pub mod types;

pub use classifier::{ClassificationPipeline, DraftModel, LlmDraftModel};
pub use manual::{ManualSendResult, ManualSender};
pub use policy::PolicyEngine;
pub use processor::{JobOutcome, MessageProcessor};
pub use types::{Draft, Intent, Job};
