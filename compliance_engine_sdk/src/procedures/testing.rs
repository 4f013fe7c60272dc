//! Fixed-outcome procedures for exercising rules end to end

use compliance_engine_base::bindings::{Arguments, Bindings};
use compliance_engine_base::context::Context;
use compliance_engine_base::error::{Result, Status};
use compliance_engine_base::indicators::{IndicatorsTree, ScopeId};

pub struct TestingProcedureParams {
    /// Indicator to record; nothing is recorded when absent
    pub message: Option<String>,
}

impl Bindings for TestingProcedureParams {
    const FIELDS: &'static [&'static str] = &["message"];

    fn bind(args: &Arguments<'_>) -> Result<Self> {
        Ok(Self {
            message: args.optional("message")?,
        })
    }
}

fn outcome(
    params: &TestingProcedureParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    status: Status,
) -> Result<Status> {
    if let Some(message) = &params.message {
        indicators.add_indicator(scope, message.clone(), status);
    }
    Ok(status)
}

pub fn audit_success(
    params: &TestingProcedureParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    _context: &dyn Context,
) -> Result<Status> {
    outcome(params, indicators, scope, Status::Compliant)
}

pub fn audit_failure(
    params: &TestingProcedureParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    _context: &dyn Context,
) -> Result<Status> {
    outcome(params, indicators, scope, Status::NonCompliant)
}

pub fn remediation_success(
    params: &TestingProcedureParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    _context: &dyn Context,
) -> Result<Status> {
    outcome(params, indicators, scope, Status::Compliant)
}

pub fn remediation_failure(
    params: &TestingProcedureParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    _context: &dyn Context,
) -> Result<Status> {
    outcome(params, indicators, scope, Status::NonCompliant)
}
