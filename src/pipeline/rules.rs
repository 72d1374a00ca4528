//! Keyword rules: the deterministic first stage of classification.
//!
//! Rules are checked in order and the first match wins:
//! - pricing
//! - refund
//! - shipping
//! - order support
//!
//! A match yields a fixed draft that never needs approval. No match returns
//! `None` and the caller falls through to the model.

use regex::Regex;
use tracing::debug;

use crate::pipeline::types::{Draft, Intent};

pub const PRICING_CONFIDENCE: f32 = 0.91;
pub const REFUND_CONFIDENCE: f32 = 0.93;
pub const SHIPPING_CONFIDENCE: f32 = 0.90;
pub const ORDER_SUPPORT_CONFIDENCE: f32 = 0.88;

/// A keyword set mapped to a fixed draft.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub intent: Intent,
    /// Compiled alternation over the rule's keywords, matched on lower-cased text.
    pub regex: Regex,
    pub reply: String,
    pub confidence: f32,
}

impl KeywordRule {
    /// Build a rule from plain keywords (matched on word boundaries).
    pub fn new(
        intent: Intent,
        keywords: &[&str],
        reply: &str,
        confidence: f32,
    ) -> Result<Self, regex::Error> {
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(&k.to_lowercase()))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Self {
            intent,
            regex: Regex::new(&format!(r"\b(?:{alternation})\b"))?,
            reply: reply.to_string(),
            confidence,
        })
    }

    fn draft(&self) -> Draft {
        Draft {
            intent: self.intent,
            confidence: self.confidence,
            reply: self.reply.clone(),
            needs_human_approval: false,
        }
    }
}

/// Ordered keyword rules.
pub struct RulesEngine {
    rules: Vec<KeywordRule>,
}

impl RulesEngine {
    /// The built-in rule table.
    pub fn default_rules() -> Self {
        let table: [(Intent, &[&str], &str, f32); 4] = [
            (
                Intent::Pricing,
                &[
                    "price", "prices", "priced", "pricing", "cost", "costs", "how much", "rate",
                    "rates", "quote", "quotes", "quoted",
                ],
                "Thanks for asking! You can find our current prices on our website, and we're happy to put together a quote if you tell us what you need.",
                PRICING_CONFIDENCE,
            ),
            (
                Intent::Refund,
                &[
                    "refund", "refunds", "refunded", "refunding", "money back", "reimburse",
                    "reimbursed", "reimbursement", "chargeback",
                ],
                "Sorry to hear that! Please send us your order number and we'll start the refund process right away.",
                REFUND_CONFIDENCE,
            ),
            (
                Intent::Shipping,
                &[
                    "shipping", "ship", "ships", "shipped", "shipment", "shipments", "delivery",
                    "deliveries", "deliver", "delivered", "tracking", "track", "tracked",
                    "courier",
                ],
                "Orders usually ship within 1-2 business days. Once yours is on its way you'll receive a tracking link by email.",
                SHIPPING_CONFIDENCE,
            ),
            (
                Intent::OrderSupport,
                &[
                    "order", "orders", "ordered", "ordering", "purchase", "purchased", "cancel",
                    "cancelled", "canceled", "cancellation", "invoice", "receipt",
                ],
                "Happy to help with your order! Please share your order number and we'll look into it.",
                ORDER_SUPPORT_CONFIDENCE,
            ),
        ];

        let rules = table
            .into_iter()
            .filter_map(|(intent, keywords, reply, confidence)| {
                KeywordRule::new(intent, keywords, reply, confidence).ok()
            })
            .collect();
        Self { rules }
    }

    #[cfg(test)]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    #[cfg(test)]
    pub fn add_rule(&mut self, rule: KeywordRule) {
        self.rules.push(rule);
    }

    /// Evaluate text against the rules in order.
    pub fn evaluate(&self, text: &str) -> Option<Draft> {
        let normalized = text.to_lowercase();
        let rule = self.rules.iter().find(|r| r.regex.is_match(&normalized))?;
        debug!(intent = %rule.intent, confidence = rule.confidence, "Keyword rule matched");
        Some(rule.draft())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_pricing_case_insensitively() {
        let engine = RulesEngine::default_rules();
        let draft = engine.evaluate("What's the PRICE of the blue one?").unwrap();
        assert_eq!(draft.intent, Intent::Pricing);
        assert!((draft.confidence - 0.91).abs() < f32::EPSILON);
        assert!(!draft.needs_human_approval);
    }

    #[test]
    fn first_match_wins_in_priority_order() {
        let engine = RulesEngine::default_rules();
        // Mentions refund, shipping and order; refund is checked first.
        let draft = engine
            .evaluate("My order never arrived, shipping was a mess, I want a refund")
            .unwrap();
        assert_eq!(draft.intent, Intent::Refund);

        // Pricing beats everything else.
        let draft = engine.evaluate("how much does shipping cost?").unwrap();
        assert_eq!(draft.intent, Intent::Pricing);
    }

    #[test]
    fn matches_shipping_and_order_support() {
        let engine = RulesEngine::default_rules();
        assert_eq!(
            engine.evaluate("Can you track my package?").unwrap().intent,
            Intent::Shipping
        );
        assert_eq!(
            engine.evaluate("I need to cancel my purchase").unwrap().intent,
            Intent::OrderSupport
        );
    }

    #[test]
    fn all_rule_confidences_clear_the_floor() {
        let engine = RulesEngine::default_rules();
        assert_eq!(engine.rules.len(), 4);
        for rule in &engine.rules {
            assert!(rule.confidence >= 0.88);
        }
    }

    #[test]
    fn keywords_respect_word_boundaries() {
        let engine = RulesEngine::default_rules();
        // "shipshape" must not trip the shipping rule.
        assert!(engine.evaluate("Everything is shipshape, loved it").is_none());
        assert!(engine.evaluate("hello there!").is_none());
    }

    #[test]
    fn matches_inflected_keywords() {
        let engine = RulesEngine::default_rules();
        let cases = [
            ("Has my package shipped yet?", Intent::Shipping),
            ("Is it delivered?", Intent::Shipping),
            ("Was I refunded?", Intent::Refund),
            ("I ordered two last week", Intent::OrderSupport),
        ];
        for (text, intent) in cases {
            let draft = engine.evaluate(text).unwrap_or_else(|| panic!("no match for {text:?}"));
            assert_eq!(draft.intent, intent, "{text}");
        }
    }

    #[test]
    fn no_match_returns_none() {
        let engine = RulesEngine::default_rules();
        assert!(engine.evaluate("Love your latest post!").is_none());
        assert!(engine.evaluate("").is_none());
    }

    #[test]
    fn empty_rules_passes_everything() {
        let engine = RulesEngine::empty();
        assert!(engine.evaluate("what is the price?").is_none());
    }

    #[test]
    fn custom_rule_appends_after_defaults() {
        let mut engine = RulesEngine::empty();
        engine.add_rule(
            KeywordRule::new(Intent::GeneralQuestion, &["opening hours"], "We're open 9-5.", 0.9)
                .unwrap(),
        );
        let draft = engine.evaluate("What are your Opening Hours?").unwrap();
        assert_eq!(draft.intent, Intent::GeneralQuestion);
        assert_eq!(draft.reply, "We're open 9-5.");
    }
}
