// src/formatters.rs
//! Report renderers for an [`IndicatorsTree`]
//!
//! All formatters are pure functions of the tree: identical trees always
//! render to identical text.

use crate::error::{Error, Result, Status};
use crate::indicators::{IndicatorsTree, Node};
use serde_json::{json, Value};
use std::fmt::Write;

/// Upper bound of sub-scopes and indicators rendered per scope by the nested list
const MAX_NODE_INDICATORS: usize = 5;

/// Renders an indicators tree into a report payload
pub trait PayloadFormatter {
    fn format(&self, tree: &IndicatorsTree) -> Result<String>;
}

fn root(tree: &IndicatorsTree) -> Result<&Node> {
    tree.root_node()
        .ok_or_else(|| Error::invalid("Indicators tree has no root scope"))
}

fn glyph(status: Status) -> &'static str {
    match status {
        Status::Compliant => "✅ ",
        Status::NonCompliant => "❌ ",
    }
}

// ============================================================================
// Compact list
// ============================================================================

/// One `[Status] message` line per indicator, scopes in encounter order
#[derive(Debug, Default, Clone, Copy)]
pub struct CompactListFormatter;

impl CompactListFormatter {
    fn format_node(tree: &IndicatorsTree, node: &Node, out: &mut String) {
        for indicator in &node.indicators {
            let _ = writeln!(out, "[{}] {}", indicator.status, indicator.message);
        }
        for child in tree.children(node) {
            Self::format_node(tree, child, out);
        }
    }
}

impl PayloadFormatter for CompactListFormatter {
    fn format(&self, tree: &IndicatorsTree) -> Result<String> {
        let mut out = String::new();
        Self::format_node(tree, root(tree)?, &mut out);
        Ok(out)
    }
}

// ============================================================================
// Nested list
// ============================================================================

/// Scope headers with tab-indented findings beneath
#[derive(Debug, Default, Clone, Copy)]
pub struct NestedListFormatter;

impl NestedListFormatter {
    fn format_node(tree: &IndicatorsTree, node: &Node, out: &mut String, depth: usize) {
        let indent = "\t".repeat(depth);

        for child in tree.children(node).take(MAX_NODE_INDICATORS) {
            let _ = writeln!(out, "{}{}{}", indent, glyph(child.status), child.procedure_name);
            Self::format_node(tree, child, out, depth + 1);
        }

        for indicator in node.indicators.iter().take(MAX_NODE_INDICATORS) {
            let _ = writeln!(out, "{}{}{}", indent, glyph(indicator.status), indicator.message);
        }
    }
}

impl PayloadFormatter for NestedListFormatter {
    fn format(&self, tree: &IndicatorsTree) -> Result<String> {
        let node = root(tree)?;
        let mut out = format!("{}{}\n", glyph(node.status), node.procedure_name);
        Self::format_node(tree, node, &mut out, 1);
        Ok(out)
    }
}

// ============================================================================
// JSON
// ============================================================================

/// Pretty-printed JSON array of scopes and indicators
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl JsonFormatter {
    fn format_node(tree: &IndicatorsTree, node: &Node) -> Vec<Value> {
        let mut items: Vec<Value> = tree
            .children(node)
            .map(|child| {
                json!({
                    "procedure": child.procedure_name,
                    "status": child.status.as_str(),
                    "indicators": Self::format_node(tree, child),
                })
            })
            .collect();

        items.extend(node.indicators.iter().map(|indicator| {
            json!({
                "message": indicator.message,
                "status": indicator.status.as_str(),
            })
        }));

        items
    }
}

impl PayloadFormatter for JsonFormatter {
    fn format(&self, tree: &IndicatorsTree) -> Result<String> {
        let value = Value::Array(Self::format_node(tree, root(tree)?));
        serde_json::to_string_pretty(&value)
            .map_err(|e| Error::invalid(format!("Failed to serialize report: {}", e)))
    }
}

// ============================================================================
// Debug
// ============================================================================

/// Single-line boolean trace of a rule evaluation
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugFormatter;

impl DebugFormatter {
    fn format_node(tree: &IndicatorsTree, node: &Node, out: &mut String) {
        match node.procedure_name.as_str() {
            "anyOf" | "allOf" => {
                let _ = write!(out, "{{ {}: [", node.procedure_name);
                for (i, child) in tree.children(node).enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    Self::format_node(tree, child, out);
                }
                out.push_str("]} == ");
            }
            "not" => {
                out.push_str("{ not: ");
                if let Some(child) = tree.children(node).next() {
                    Self::format_node(tree, child, out);
                }
                out.push_str("} == ");
            }
            _ => {
                let messages: Vec<&str> = node
                    .indicators
                    .iter()
                    .map(|i| i.message.as_str())
                    .collect();
                let _ = write!(out, "{{ {}: {} }} == ", node.procedure_name, messages.join(", "));
            }
        }

        out.push_str(if node.status.is_compliant() { "TRUE" } else { "FALSE" });
    }
}

impl PayloadFormatter for DebugFormatter {
    fn format(&self, tree: &IndicatorsTree) -> Result<String> {
        let root_node = root(tree)?;
        let first = tree
            .children(root_node)
            .next()
            .ok_or_else(|| Error::invalid("No children found"))?;

        let mut out = String::new();
        Self::format_node(tree, first, &mut out);
        Ok(out)
    }
}

// ============================================================================
// Last incompliance
// ============================================================================

/// The most recent finding of the deepest last scope, or `Audit passed`
#[derive(Debug, Default, Clone, Copy)]
pub struct LastIncomplianceFormatter;

impl LastIncomplianceFormatter {
    fn last_message(tree: &IndicatorsTree, node: &Node) -> String {
        if let Some(child) = tree.children(node).last() {
            return Self::last_message(tree, child);
        }

        match node.indicators.last() {
            Some(indicator) => indicator.message.clone(),
            None => format!("No indicators found for {}", node.procedure_name),
        }
    }
}

impl PayloadFormatter for LastIncomplianceFormatter {
    fn format(&self, tree: &IndicatorsTree) -> Result<String> {
        let node = root(tree)?;
        if node.status.is_compliant() {
            return Ok("Audit passed".to_string());
        }
        Ok(Self::last_message(tree, node))
    }
}

/// Look up a formatter by its short name
pub fn formatter_by_name(name: &str) -> Result<Box<dyn PayloadFormatter>> {
    match name {
        "compact" => Ok(Box::new(CompactListFormatter)),
        "nested" => Ok(Box::new(NestedListFormatter)),
        "json" => Ok(Box::new(JsonFormatter)),
        "debug" => Ok(Box::new(DebugFormatter)),
        "last" => Ok(Box::new(LastIncomplianceFormatter)),
        other => Err(Error::invalid(format!("Unknown formatter '{}'", other))),
    }
}
