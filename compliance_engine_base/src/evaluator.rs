// src/evaluator.rs
//! JSON rule evaluation
//!
//! A rule is a JSON object with exactly one key:
//!
//! - `{"anyOf": [rule, ...]}` - Compliant on the first Compliant sub-rule
//! - `{"allOf": [rule, ...]}` - NonCompliant on the first NonCompliant sub-rule
//! - `{"not": rule}` - inverted audit of the sub-rule, even while remediating
//! - `{"<Procedure>": {"arg": "value", ...}}` - a registered procedure
//!
//! Argument values starting with `$` are replaced from the rule parameters.

use crate::bindings::ArgMap;
use crate::context::Context;
use crate::error::{Error, Result, Status};
use crate::formatters::PayloadFormatter;
use crate::indicators::IndicatorsTree;
use crate::registry::{Action, ProcedureRegistry};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Verdict plus rendered report of one rule audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditResult {
    pub status: Status,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListAction {
    AnyOf,
    AllOf,
}

impl ListAction {
    fn name(self) -> &'static str {
        match self {
            ListAction::AnyOf => "anyOf",
            ListAction::AllOf => "allOf",
        }
    }
}

pub struct Evaluator<'a> {
    rule_name: String,
    rule: &'a Value,
    parameters: &'a BTreeMap<String, String>,
    registry: &'a ProcedureRegistry,
    context: &'a dyn Context,
    indicators: IndicatorsTree,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        rule_name: impl Into<String>,
        rule: &'a Value,
        parameters: &'a BTreeMap<String, String>,
        registry: &'a ProcedureRegistry,
        context: &'a dyn Context,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            rule,
            parameters,
            registry,
            context,
            indicators: IndicatorsTree::new(),
        }
    }

    /// Audit the rule and render the findings with `formatter`
    pub fn execute_audit(&mut self, formatter: &dyn PayloadFormatter) -> Result<AuditResult> {
        let status = self.run(Action::Audit)?;
        let payload = match formatter.format(&self.indicators) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Failed to format payload: {}", e);
                format!("Failed to format payload: {}", e.message)
            }
        };
        Ok(AuditResult { status, payload })
    }

    pub fn execute_remediation(&mut self) -> Result<Status> {
        self.run(Action::Remediate)
    }

    /// Findings recorded so far
    pub fn indicators(&self) -> &IndicatorsTree {
        &self.indicators
    }

    fn run(&mut self, action: Action) -> Result<Status> {
        self.indicators = IndicatorsTree::new();
        let root = self.indicators.push(self.rule_name.clone());
        let result = self.evaluate(self.rule, action);
        if let Err(e) = &result {
            log::error!("Evaluation of '{}' failed: {}", self.rule_name, e);
        }
        let status = result?;
        self.indicators.set_status(root, status);
        self.indicators.pop(root)?;
        Ok(status)
    }

    fn evaluate(&mut self, rule: &Value, action: Action) -> Result<Status> {
        let object = rule
            .as_object()
            .ok_or_else(|| Error::invalid("Rule must be a JSON object"))?;
        let mut entries = object.iter();
        let (name, value) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            (None, _) => return Err(Error::invalid("Rule name or value is null")),
            (Some(_), Some(_)) => {
                return Err(Error::invalid("Rule object must have exactly one key"))
            }
        };

        match name.as_str() {
            "anyOf" => self.scoped(name, |this| this.evaluate_list(value, action, ListAction::AnyOf)),
            "allOf" => self.scoped(name, |this| this.evaluate_list(value, action, ListAction::AllOf)),
            "not" => self.scoped(name, |this| this.evaluate_not(value, action)),
            procedure => {
                let args = self.procedure_arguments(value)?;
                self.registry
                    .dispatch(procedure, &args, &mut self.indicators, self.context, action)
            }
        }
    }

    /// Run `body` inside a scope named after an operator
    fn scoped(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Self) -> Result<Status>,
    ) -> Result<Status> {
        let scope = self.indicators.push(name);
        let status = body(self)?;
        self.indicators.set_status(scope, status);
        self.indicators.pop(scope)?;
        Ok(status)
    }

    fn evaluate_list(&mut self, value: &Value, action: Action, list: ListAction) -> Result<Status> {
        let items = value
            .as_array()
            .ok_or_else(|| Error::invalid(format!("{} value is not an array", list.name())))?;

        for (index, item) in items.iter().enumerate() {
            let status = self.evaluate(item, action)?;
            match (list, status) {
                (ListAction::AnyOf, Status::Compliant) | (ListAction::AllOf, Status::NonCompliant) => {
                    log::debug!("{} decided at index {} with {}", list.name(), index, status);
                    return Ok(status);
                }
                _ => {}
            }
        }

        Ok(match list {
            ListAction::AnyOf => Status::NonCompliant,
            ListAction::AllOf => Status::Compliant,
        })
    }

    fn evaluate_not(&mut self, value: &Value, action: Action) -> Result<Status> {
        if !value.is_object() {
            return Err(Error::invalid("not value is not an object"));
        }
        if action != Action::Audit {
            log::info!("not used in remediation: falling back to audit mode");
        }
        Ok(self.evaluate(value, Action::Audit)?.invert())
    }

    fn procedure_arguments(&self, value: &Value) -> Result<ArgMap> {
        let object: &Map<String, Value> = value
            .as_object()
            .ok_or_else(|| Error::invalid("Procedure arguments must be a JSON object"))?;

        let mut args = ArgMap::new();
        for (key, raw) in object {
            let text = raw.as_str().ok_or_else(|| {
                Error::invalid(format!("Argument type is not a string for a key '{}'", key))
            })?;

            let resolved = match text.strip_prefix('$') {
                Some(parameter) => self
                    .parameters
                    .get(parameter)
                    .cloned()
                    .ok_or_else(|| Error::invalid(format!("Unknown parameter '{}'", text)))?,
                None => text.to_string(),
            };
            args.insert(key.clone(), resolved);
        }
        Ok(args)
    }
}
