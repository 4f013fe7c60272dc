// src/registry.rs
//! Procedure registry and dispatcher
//!
//! Procedures are registered once at startup as typed `(audit, remediate)`
//! function pairs over their parameter struct. The registry erases the
//! parameter type so every procedure can be dispatched by name from a raw
//! argument map.

use crate::bindings::{self, ArgMap, Bindings};
use crate::context::Context;
use crate::error::{Error, Result, Status, EEXIST, EINVAL, ENOENT};
use crate::indicators::{IndicatorsTree, ScopeId};
use std::collections::HashMap;

/// Whether a procedure only inspects or also repairs the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Audit,
    Remediate,
}

/// Signature shared by audit and remediate functions
pub type ProcedureFn<P> = fn(&P, &mut IndicatorsTree, ScopeId, &dyn Context) -> Result<Status>;

/// Type-erased registration
trait RegisteredProcedure: Send + Sync {
    fn parameters(&self) -> &'static [&'static str];

    fn has_audit(&self) -> bool;

    fn has_remediation(&self) -> bool;

    fn run(
        &self,
        name: &str,
        action: Action,
        args: &ArgMap,
        indicators: &mut IndicatorsTree,
        context: &dyn Context,
    ) -> Result<Status>;
}

struct Procedure<P> {
    audit: Option<ProcedureFn<P>>,
    remediate: Option<ProcedureFn<P>>,
}

impl<P: Bindings + 'static> RegisteredProcedure for Procedure<P> {
    fn parameters(&self) -> &'static [&'static str] {
        P::FIELDS
    }

    fn has_audit(&self) -> bool {
        self.audit.is_some()
    }

    fn has_remediation(&self) -> bool {
        self.remediate.is_some()
    }

    fn run(
        &self,
        name: &str,
        action: Action,
        args: &ArgMap,
        indicators: &mut IndicatorsTree,
        context: &dyn Context,
    ) -> Result<Status> {
        let function = match action {
            Action::Audit => self.audit.ok_or_else(|| {
                Error::invalid(format!("No audit function registered for '{}'", name))
            })?,
            Action::Remediate => self.remediate.ok_or_else(|| {
                Error::invalid(format!("No remediation function registered for '{}'", name))
            })?,
        };

        let params: P = bindings::bind(args).map_err(|e| {
            log::warn!("Binding parameters of '{}' failed: {}", name, e);
            e
        })?;

        let scope = indicators.push(name);
        let result = function(&params, indicators, scope, context);
        if let Ok(status) = &result {
            indicators.set_status(scope, *status);
        }
        indicators.pop(scope)?;
        result
    }
}

/// Name-indexed table of procedures
pub struct ProcedureRegistry {
    procedures: HashMap<String, Box<dyn RegisteredProcedure>>,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        Self {
            procedures: HashMap::new(),
        }
    }

    /// Register a procedure; names must be unique and at least one function given
    pub fn register<P: Bindings + 'static>(
        &mut self,
        name: &str,
        audit: Option<ProcedureFn<P>>,
        remediate: Option<ProcedureFn<P>>,
    ) -> Result<()> {
        if audit.is_none() && remediate.is_none() {
            return Err(Error::invalid(format!(
                "Procedure '{}' has neither an audit nor a remediate function",
                name
            )));
        }
        if self.procedures.contains_key(name) {
            return Err(Error::new(
                format!("Procedure '{}' is already registered", name),
                EEXIST,
            ));
        }
        if name.is_empty() || name == "anyOf" || name == "allOf" || name == "not" {
            return Err(Error::new(
                format!("'{}' is not a valid procedure name", name),
                EINVAL,
            ));
        }

        self.procedures
            .insert(name.to_string(), Box::new(Procedure { audit, remediate }));
        Ok(())
    }

    /// Bind `args` and run the named procedure in a fresh scope of `indicators`.
    ///
    /// Unknown names fail with `ENOENT`; remediating a procedure without a
    /// remediate function fails instead of falling back to audit, and
    /// auditing a remediation-only procedure fails the same way. Binding
    /// errors are returned before the procedure or the context is touched.
    pub fn dispatch(
        &self,
        name: &str,
        args: &ArgMap,
        indicators: &mut IndicatorsTree,
        context: &dyn Context,
        action: Action,
    ) -> Result<Status> {
        let procedure = self.procedures.get(name).ok_or_else(|| {
            log::error!("Unknown function '{}'", name);
            Error::new(format!("Unknown function '{}'", name), ENOENT)
        })?;

        log::debug!("Dispatching {:?} of '{}'", action, name);
        procedure.run(name, action, args, indicators, context)
    }

    pub fn has_procedure(&self, name: &str) -> bool {
        self.procedures.contains_key(name)
    }

    pub fn has_audit(&self, name: &str) -> bool {
        self.procedures
            .get(name)
            .map(|p| p.has_audit())
            .unwrap_or(false)
    }

    pub fn has_remediation(&self, name: &str) -> bool {
        self.procedures
            .get(name)
            .map(|p| p.has_remediation())
            .unwrap_or(false)
    }

    /// Parameter names accepted by a procedure
    pub fn parameters_of(&self, name: &str) -> Option<&'static [&'static str]> {
        self.procedures.get(name).map(|p| p.parameters())
    }

    /// All registered names, sorted
    pub fn list_procedures(&self) -> Vec<String> {
        let mut names: Vec<String> = self.procedures.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_statistics(&self) -> RegistryStatistics {
        let total_procedures = self.procedures.len();
        let with_remediation = self
            .procedures
            .values()
            .filter(|p| p.has_remediation())
            .count();
        RegistryStatistics {
            total_procedures,
            with_remediation,
            audit_only: total_procedures - with_remediation,
        }
    }
}

impl Default for ProcedureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStatistics {
    pub total_procedures: usize,
    pub with_remediation: usize,
    pub audit_only: usize,
}

/// Fluent construction of a [`ProcedureRegistry`]
pub struct RegistryBuilder {
    registry: ProcedureRegistry,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            registry: ProcedureRegistry::new(),
        }
    }

    pub fn audit<P: Bindings + 'static>(mut self, name: &str, audit: ProcedureFn<P>) -> Result<Self> {
        self.registry.register(name, Some(audit), None)?;
        Ok(self)
    }

    pub fn remediate<P: Bindings + 'static>(
        mut self,
        name: &str,
        remediate: ProcedureFn<P>,
    ) -> Result<Self> {
        self.registry.register(name, None, Some(remediate))?;
        Ok(self)
    }

    pub fn audit_and_remediate<P: Bindings + 'static>(
        mut self,
        name: &str,
        audit: ProcedureFn<P>,
        remediate: ProcedureFn<P>,
    ) -> Result<Self> {
        self.registry.register(name, Some(audit), Some(remediate))?;
        Ok(self)
    }

    pub fn build(self) -> ProcedureRegistry {
        self.registry
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{arg_map, Arguments};
    use crate::context::MockContext;
    use crate::formatters::{CompactListFormatter, PayloadFormatter};

    struct ProbeParams {
        command: String,
    }

    impl Bindings for ProbeParams {
        const FIELDS: &'static [&'static str] = &["command"];

        fn bind(args: &Arguments<'_>) -> Result<Self> {
            Ok(Self {
                command: args.required("command")?,
            })
        }
    }

    fn audit_probe(
        params: &ProbeParams,
        indicators: &mut IndicatorsTree,
        scope: ScopeId,
        context: &dyn Context,
    ) -> Result<Status> {
        match context.execute_command(&params.command) {
            Ok(_) => Ok(indicators.compliant(scope, format!("'{}' succeeded", params.command))),
            Err(e) => Ok(indicators.non_compliant(scope, e.message)),
        }
    }

    fn remediate_probe(
        _params: &ProbeParams,
        indicators: &mut IndicatorsTree,
        scope: ScopeId,
        _context: &dyn Context,
    ) -> Result<Status> {
        Ok(indicators.compliant(scope, "remediated"))
    }

    fn registry() -> ProcedureRegistry {
        RegistryBuilder::new()
            .audit_and_remediate("Probe", audit_probe, remediate_probe)
            .unwrap()
            .audit("ProbeAuditOnly", audit_probe)
            .unwrap()
            .remediate("ProbeRemediateOnly", remediate_probe)
            .unwrap()
            .build()
    }

    #[test]
    fn test_unknown_procedure_is_enoent() {
        let context = MockContext::new();
        let mut tree = IndicatorsTree::new();
        for name in ["", "Missing", "probe", "anyOf"] {
            let err = registry()
                .dispatch(name, &ArgMap::new(), &mut tree, &context, Action::Audit)
                .unwrap_err();
            assert_eq!(err.code, ENOENT, "{}", name);
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn test_dispatch_records_scope_and_status() {
        let context = MockContext::new().with_command("true", "");
        let mut tree = IndicatorsTree::new();
        let status = registry()
            .dispatch("Probe", &arg_map([("command", "true")]), &mut tree, &context, Action::Audit)
            .unwrap();

        assert_eq!(status, Status::Compliant);
        let root = tree.root_node().unwrap();
        assert_eq!(root.procedure_name, "Probe");
        assert_eq!(root.status, Status::Compliant);
        assert_eq!(
            CompactListFormatter.format(&tree).unwrap(),
            "[Compliant] 'true' succeeded\n"
        );
    }

    #[test]
    fn test_binding_failure_never_touches_context() {
        let context = MockContext::new();
        let mut tree = IndicatorsTree::new();
        let err = registry()
            .dispatch("Probe", &ArgMap::new(), &mut tree, &context, Action::Audit)
            .unwrap_err();

        assert_eq!(err.code, EINVAL);
        assert!(context.executed_commands().is_empty());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_remediate_without_function_is_error() {
        let context = MockContext::new().with_command("true", "");
        let mut tree = IndicatorsTree::new();
        let err = registry()
            .dispatch(
                "ProbeAuditOnly",
                &arg_map([("command", "true")]),
                &mut tree,
                &context,
                Action::Remediate,
            )
            .unwrap_err();

        assert!(err.message.contains("No remediation function"));
        assert!(context.executed_commands().is_empty());

        let status = registry()
            .dispatch("Probe", &arg_map([("command", "true")]), &mut tree, &context, Action::Remediate)
            .unwrap();
        assert_eq!(status, Status::Compliant);
    }

    #[test]
    fn test_audit_without_function_is_error() {
        let context = MockContext::new();
        let mut tree = IndicatorsTree::new();
        let err = registry()
            .dispatch(
                "ProbeRemediateOnly",
                &arg_map([("command", "true")]),
                &mut tree,
                &context,
                Action::Audit,
            )
            .unwrap_err();
        assert_eq!(err.code, EINVAL);
        assert_eq!(err.message, "No audit function registered for 'ProbeRemediateOnly'");
        assert!(!registry().has_audit("ProbeRemediateOnly"));
        assert!(registry().has_remediation("ProbeRemediateOnly"));

        let status = registry()
            .dispatch(
                "ProbeRemediateOnly",
                &arg_map([("command", "true")]),
                &mut tree,
                &context,
                Action::Remediate,
            )
            .unwrap();
        assert_eq!(status, Status::Compliant);
    }

    #[test]
    fn test_duplicate_and_reserved_names_rejected() {
        let err = RegistryBuilder::new()
            .audit("Probe", audit_probe)
            .unwrap()
            .audit("Probe", audit_probe)
            .err()
            .unwrap();
        assert_eq!(err.code, EEXIST);

        assert!(RegistryBuilder::new().audit("allOf", audit_probe).is_err());
    }

    #[test]
    fn test_statistics_and_listing() {
        let registry = registry();
        let stats = registry.get_statistics();
        assert_eq!(stats.total_procedures, 3);
        assert_eq!(stats.with_remediation, 2);
        assert_eq!(stats.audit_only, 1);
        assert_eq!(
            registry.list_procedures(),
            vec!["Probe", "ProbeAuditOnly", "ProbeRemediateOnly"]
        );
        assert_eq!(registry.parameters_of("Probe"), Some(&["command"][..]));
        assert!(registry.has_remediation("Probe"));
        assert!(!registry.has_remediation("ProbeAuditOnly"));
    }
}
