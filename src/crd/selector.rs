//! # Pod Selector
//!
//! Declarative target predicate embedded in every experiment spec.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selects the pods an experiment applies to.
///
/// All populated constraints must hold for a pod to be selected. When `pods`
/// is populated the label, expression and field constraints are skipped and
/// exactly the listed pods are resolved.
///
/// # Example
///
/// ```yaml
/// selector:
///   namespaces: [checkout]
///   labelSelectors:
///     app: payments
///   podPhaseSelectors: [Running]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodSelectorSpec {
    /// Namespaces to select pods from. Empty means every namespace the
    /// controller is allowed to touch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    /// Equality-based label selector
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub label_selectors: BTreeMap<String, String>,
    /// Set-based label selector requirements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expression_selectors: Vec<ExpressionRequirement>,
    /// Field selector passed to the API server (e.g. `spec.nodeName`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_selectors: BTreeMap<String, String>,
    /// Annotations a pod must carry (matched client-side)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotation_selectors: BTreeMap<String, String>,
    /// Pod phases to select. Empty or `All` selects every phase.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pod_phase_selectors: Vec<String>,
    /// Explicit pods keyed by namespace
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pods: BTreeMap<String, Vec<String>>,
}

/// A single set-based label requirement
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionRequirement {
    /// Label key the requirement applies to
    pub key: String,
    /// Relationship between the key and the values
    pub operator: SelectorOperator,
    /// Values for `In` and `NotIn`; ignored otherwise
    #[serde(default)]
    pub values: Vec<String>,
}

/// Set-based selector operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl PodSelectorSpec {
    /// Whether this selector names explicit pods instead of a predicate
    pub fn has_explicit_pods(&self) -> bool {
        self.pods.values().any(|names| !names.is_empty())
    }

    /// Label selector in API server syntax, `None` when unconstrained
    ///
    /// Equality pairs come first, followed by set-based requirements:
    /// `app=web,tier in (a,b),!legacy`
    pub fn label_selector(&self) -> Option<String> {
        let mut terms: Vec<String> = self
            .label_selectors
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        terms.extend(self.expression_selectors.iter().map(|req| {
            let mut values = req.values.clone();
            values.sort();
            match req.operator {
                SelectorOperator::In => format!("{} in ({})", req.key, values.join(",")),
                SelectorOperator::NotIn => format!("{} notin ({})", req.key, values.join(",")),
                SelectorOperator::Exists => req.key.clone(),
                SelectorOperator::DoesNotExist => format!("!{}", req.key),
            }
        }));
        (!terms.is_empty()).then(|| terms.join(","))
    }

    /// Field selector in API server syntax, `None` when unconstrained
    pub fn field_selector(&self) -> Option<String> {
        (!self.field_selectors.is_empty()).then(|| {
            self.field_selectors
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",")
        })
    }

    /// Evaluate the label constraints against a label set
    pub fn matches_labels(&self, labels: &BTreeMap<String, String>) -> bool {
        let equality = self
            .label_selectors
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v));
        equality
            && self.expression_selectors.iter().all(|req| {
                let value = labels.get(&req.key);
                match req.operator {
                    SelectorOperator::In => value.is_some_and(|v| req.values.contains(v)),
                    SelectorOperator::NotIn => value.map_or(true, |v| !req.values.contains(v)),
                    SelectorOperator::Exists => value.is_some(),
                    SelectorOperator::DoesNotExist => value.is_none(),
                }
            })
    }

    /// Evaluate the annotation constraints against an annotation set
    pub fn matches_annotations(&self, annotations: &BTreeMap<String, String>) -> bool {
        self.annotation_selectors
            .iter()
            .all(|(k, v)| annotations.get(k) == Some(v))
    }

    /// Evaluate the phase constraint; `None` phase only matches an unconstrained selector
    pub fn matches_phase(&self, phase: Option<&str>) -> bool {
        if self.pod_phase_selectors.is_empty()
            || self
                .pod_phase_selectors
                .iter()
                .any(|p| p.eq_ignore_ascii_case("All"))
        {
            return true;
        }
        phase.is_some_and(|phase| self.pod_phase_selectors.iter().any(|p| p == phase))
    }
}
