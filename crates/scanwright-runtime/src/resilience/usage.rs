//! Judge usage accounting.
//!
//! Counts calls, error verdicts and tokens, globally and per judge. Shared
//! between judges through an `Arc`, so one tracker covers a whole run.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::judges::TokenUsage;

/// Accumulated usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeUsage {
    /// Classify calls, failed ones included
    pub calls: u32,

    /// Calls that ended in an `error` verdict
    pub error_verdicts: u32,

    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl JudgeUsage {
    pub fn add(&mut self, tokens: &TokenUsage, is_error: bool) {
        self.calls = self.calls.saturating_add(1);
        if is_error {
            self.error_verdicts = self.error_verdicts.saturating_add(1);
        }
        self.prompt_tokens = self.prompt_tokens.saturating_add(u64::from(tokens.prompt_tokens));
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(u64::from(tokens.completion_tokens));
        self.total_tokens = self.total_tokens.saturating_add(tokens.total());
    }
}

/// Usage tracker for one run.
#[derive(Debug, Default)]
pub struct UsageTracker {
    total: RwLock<JudgeUsage>,
    per_judge: RwLock<BTreeMap<String, JudgeUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one classify call.
    pub fn record(&self, judge: &str, tokens: &TokenUsage, is_error: bool) {
        self.total.write().add(tokens, is_error);
        self.per_judge
            .write()
            .entry(judge.to_string())
            .or_default()
            .add(tokens, is_error);
    }

    /// Usage across all judges.
    pub fn snapshot(&self) -> JudgeUsage {
        self.total.read().clone()
    }

    /// Usage of one judge.
    pub fn for_judge(&self, judge: &str) -> JudgeUsage {
        self.per_judge.read().get(judge).cloned().unwrap_or_default()
    }

    /// Per-judge usage, ordered by judge name.
    pub fn by_judge(&self) -> BTreeMap<String, JudgeUsage> {
        self.per_judge.read().clone()
    }

    pub fn reset(&self) {
        *self.total.write() = JudgeUsage::default();
        self.per_judge.write().clear();
    }
}
