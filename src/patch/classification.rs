//! Per-method classification results.
//!
//! Every method the classifier visits ends up in the [`ClassificationMap`], including the
//! ones it leaves unchanged, so recursive classification never visits a method twice.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write;

use strum::{EnumCount, EnumIter};

use crate::metadata::{module::Module, token::Token};

/// How a patched method has to be handled at runtime.
///
/// The variants are ordered by strength; merging two classifications keeps the stronger one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, EnumIter, EnumCount,
)]
pub enum MethodClassification {
    /// No runtime action needed
    #[default]
    Unchanged,
    /// The method body was rewritten in place
    IlFix,
    /// Calls to the base method have to be redirected into the patch module
    Hook,
}

impl MethodClassification {
    /// Combines two classifications of the same method
    #[must_use]
    pub fn merge(self, other: MethodClassification) -> MethodClassification {
        self.max(other)
    }

    /// True for `Hook` and `IlFix`
    #[must_use]
    pub fn touches_type(self) -> bool {
        self != MethodClassification::Unchanged
    }
}

/// Accumulated classifications of one pipeline run, keyed by patch-module method token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationMap {
    entries: BTreeMap<Token, MethodClassification>,
}

impl ClassificationMap {
    /// Records a classification, merging with an earlier one for the same method
    pub fn record(&mut self, method: Token, classification: MethodClassification) {
        self.entries
            .entry(method)
            .and_modify(|existing| *existing = existing.merge(classification))
            .or_insert(classification);
    }

    /// The classification of `method`, `Unchanged` if never recorded
    #[must_use]
    pub fn get(&self, method: Token) -> MethodClassification {
        self.entries.get(&method).copied().unwrap_or_default()
    }

    /// True if `method` was visited
    #[must_use]
    pub fn contains(&self, method: Token) -> bool {
        self.entries.contains_key(&method)
    }

    /// All visited methods in token order
    pub fn iter(&self) -> impl Iterator<Item = (Token, MethodClassification)> + '_ {
        self.entries.iter().map(|(token, kind)| (*token, *kind))
    }

    /// Number of methods with the given classification
    #[must_use]
    pub fn count(&self, classification: MethodClassification) -> usize {
        self.entries
            .values()
            .filter(|kind| **kind == classification)
            .count()
    }

    /// Number of visited methods
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no method was visited
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declaring types of every `Hook` or `IlFix` method
    #[must_use]
    pub fn touched_types(&self, module: &Module) -> BTreeSet<Token> {
        self.entries
            .iter()
            .filter(|(_, kind)| kind.touches_type())
            .filter_map(|(token, _)| module.method_owner(*token))
            .collect()
    }

    /// One line per visited method, flagged `[Changed]`, `[Hook]` and `[Fix]`
    #[must_use]
    pub fn dump(&self, module: &Module, changed: &HashSet<Token>) -> String {
        let mut out = String::new();
        for (token, kind) in self.iter() {
            let name = module
                .method_full_name(token)
                .unwrap_or_else(|_| token.to_string());
            let _ = write!(out, "{name}");
            if changed.contains(&token) {
                out.push_str(" [Changed]");
            }
            match kind {
                MethodClassification::Hook => out.push_str(" [Hook]"),
                MethodClassification::IlFix => out.push_str(" [Fix]"),
                MethodClassification::Unchanged => {}
            }
            out.push('\n');
        }
        out
    }
}
