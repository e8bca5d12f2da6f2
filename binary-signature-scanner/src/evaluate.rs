// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Rule evaluation. */

use {
    crate::{
        facts::FactSet,
        finding::{sort_findings, Finding},
        rules::{Rule, RuleRegistry},
    },
    rayon::prelude::*,
};

/// Evaluate a single rule, producing at most one finding.
pub fn evaluate_rule(facts: &FactSet, rule: &Rule) -> Option<Finding> {
    let evidence = rule.matcher().find(facts)?;

    Some(Finding {
        rule_id: rule.id().to_string(),
        tag: rule.tag().to_string(),
        severity: rule.severity(),
        artifact: facts.artifact().to_path_buf(),
        explanation: rule.explain(&evidence, facts.artifact()),
        evidence,
    })
}

/// Evaluate every rule in a registry against facts.
///
/// Rules are independent of each other and are evaluated in parallel.
/// The result holds at most one finding per rule id, in report order.
pub fn evaluate(facts: &FactSet, registry: &RuleRegistry) -> Vec<Finding> {
    let mut findings = registry
        .rules()
        .par_iter()
        .filter_map(|rule| evaluate_rule(facts, rule))
        .collect::<Vec<_>>();

    sort_findings(&mut findings);
    findings.dedup_by(|a, b| a.rule_id == b.rule_id);

    findings
}
