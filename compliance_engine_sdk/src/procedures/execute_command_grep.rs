//! Grep the output of an allow-listed inspection command
//!
//! Builds `command [| awk "..."] | grep -P|-E -- "regex"` and runs it through
//! the context. A non-matching grep turns into a NonCompliant finding.

use compliance_engine_base::bindings::{Arguments, Bindings, FromArg};
use compliance_engine_base::context::Context;
use compliance_engine_base::error::{Error, Result, Status};
use compliance_engine_base::indicators::{IndicatorsTree, ScopeId};

/// Command lines the procedure may run
pub const ALLOWED_COMMANDS: &[&str] = &[
    "nft list ruleset",
    "nft list chain",
    "nft list tables",
    "ip6tables -L -n",
    "ip6tables -L INPUT -v -n",
    "ip6tables -L OUTPUT -v -n",
    "iptables -L -n",
    "iptables -L INPUT -v -n",
    "iptables -L OUTPUT -v -n",
    "uname",
];

/// A command line from [`ALLOWED_COMMANDS`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedCommand(String);

impl AllowedCommand {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromArg for AllowedCommand {
    fn from_arg(value: &str) -> Result<Self> {
        if ALLOWED_COMMANDS.contains(&value) {
            Ok(AllowedCommand(value.to_string()))
        } else {
            Err(Error::invalid(format!("Command {} is not allowed", value)))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexType {
    Perl,
    Extended,
}

compliance_engine_base::map_enum!(RegexType {
    "P" => RegexType::Perl,
    "E" => RegexType::Extended,
});

impl RegexType {
    fn grep_flag(self) -> &'static str {
        match self {
            RegexType::Perl => "-P",
            RegexType::Extended => "-E",
        }
    }
}

pub struct ExecuteCommandGrepParams {
    pub command: AllowedCommand,
    pub awk: Option<String>,
    pub regex: String,
    pub regex_type: RegexType,
}

impl Bindings for ExecuteCommandGrepParams {
    const FIELDS: &'static [&'static str] = &["command", "awk", "regex", "type"];

    fn bind(args: &Arguments<'_>) -> Result<Self> {
        Ok(Self {
            command: args.required("command")?,
            awk: args.optional("awk")?,
            regex: args.required("regex")?,
            regex_type: args.optional_or("type", RegexType::Perl)?,
        })
    }
}

/// Escape for use inside a double-quoted shell word
pub fn escape_for_shell(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '`' | '$') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn build_pipeline(params: &ExecuteCommandGrepParams) -> String {
    let mut pipeline = params.command.as_str().to_string();
    if let Some(awk) = params.awk.as_deref().filter(|a| !a.is_empty()) {
        pipeline.push_str(&format!(" | awk \"{}\" ", escape_for_shell(awk)));
    }
    pipeline.push_str(&format!(
        " | grep {} -- \"{}\" || (echo -n 'No match found'; exit 1)",
        params.regex_type.grep_flag(),
        escape_for_shell(&params.regex)
    ));
    pipeline
}

pub fn audit_execute_command_grep(
    params: &ExecuteCommandGrepParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    context: &dyn Context,
) -> Result<Status> {
    let pipeline = build_pipeline(params);
    log::debug!("Running '{}'", pipeline);

    match context.execute_command(&pipeline) {
        Ok(_) => Ok(indicators.compliant(
            scope,
            format!(
                "Output of command '{}' matches regex '{}'",
                params.command.as_str(),
                escape_for_shell(&params.regex)
            ),
        )),
        Err(e) => Ok(indicators.non_compliant(scope, e.message)),
    }
}
