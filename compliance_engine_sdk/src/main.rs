//! # Compliance Engine CLI
//!
//! ```bash
//! # Audit a single procedure
//! compliance-engine audit --procedure EnsureSysctl --arg sysctlName=net.ipv4.ip_forward --arg value=^0$
//!
//! # Remediate a JSON rule with parameters
//! compliance-engine remediate --rule shadow.json --param mask=0137
//!
//! # Machine-readable report
//! compliance-engine audit --rule shadow.json --format json
//! ```

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use compliance_engine_base::config::EngineConfig;
use compliance_engine_base::context::SystemContext;
use compliance_engine_base::evaluator::Evaluator;
use compliance_engine_base::formatters::{formatter_by_name, PayloadFormatter};
use compliance_engine_base::report::{AuditReport, Outcome};
use compliance_engine_base::{Error, Result, Status};
use compliance_engine_sdk::commands::create_linux_command_executor;
use compliance_engine_sdk::create_procedure_registry;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const EXIT_COMPLIANT: u8 = 0;
const EXIT_NON_COMPLIANT: u8 = 1;
const EXIT_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "compliance-engine", version)]
#[command(about = "Audit and remediate host configuration against compliance rules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the host without changing it
    Audit(RunArgs),

    /// Bring the host into compliance
    Remediate(RunArgs),

    /// List registered procedures and their parameters
    List,
}

#[derive(Args)]
struct RunArgs {
    /// Procedure to run directly
    #[arg(long, conflicts_with = "rule", required_unless_present = "rule")]
    procedure: Option<String>,

    /// Procedure argument as key=value
    #[arg(long = "arg", value_parser = parse_key_value, requires = "procedure")]
    args: Vec<(String, String)>,

    /// JSON rule file
    #[arg(long)]
    rule: Option<PathBuf>,

    /// Rule parameter as key=value, referenced as $key inside the rule
    #[arg(long = "param", value_parser = parse_key_value)]
    params: Vec<(String, String)>,

    /// Output format: compact, nested, json, debug or last
    #[arg(long, default_value = "compact")]
    format: String,
}

fn parse_key_value(text: &str) -> std::result::Result<(String, String), String> {
    text.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", text))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path).map_err(|e| Error::invalid(e.to_string()))?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Rule name and JSON body for a run
fn load_rule(args: &RunArgs) -> Result<(String, Value)> {
    if let Some(procedure) = &args.procedure {
        let arguments: Map<String, Value> = args
            .args
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let mut rule = Map::new();
        rule.insert(procedure.clone(), Value::Object(arguments));
        return Ok((procedure.clone(), Value::Object(rule)));
    }

    let path = args
        .rule
        .as_deref()
        .ok_or_else(|| Error::invalid("Either --procedure or --rule is required"))?;
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::from(e).context(format!("Failed to read rule '{}'", path.display())))?;
    let rule: Value = serde_json::from_str(&text).map_err(|e| {
        Error::invalid(format!("Failed to parse rule '{}': {}", path.display(), e))
    })?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "rule".to_string());
    Ok((name, rule))
}

fn exit_code(status: Status) -> ExitCode {
    match status {
        Status::Compliant => ExitCode::from(EXIT_COMPLIANT),
        Status::NonCompliant => ExitCode::from(EXIT_NON_COMPLIANT),
    }
}

fn run(cli: &Cli, args: &RunArgs, remediate: bool) -> Result<ExitCode> {
    let started = Utc::now();
    let config = load_config(cli.config.as_deref())?;
    let json_report = args.format == "json";
    let formatter: Box<dyn PayloadFormatter> = formatter_by_name(&args.format)?;

    let registry = create_procedure_registry()?;
    let executor = create_linux_command_executor(config.command_timeout());
    let context = SystemContext::new(executor, config);

    let (rule_name, rule) = load_rule(args)?;
    let parameters: BTreeMap<String, String> = args.params.iter().cloned().collect();
    let action = if remediate { "remediate" } else { "audit" };
    log::info!("Starting {} of '{}'", action, rule_name);

    let mut evaluator = Evaluator::new(rule_name.clone(), &rule, &parameters, &registry, &context);
    let outcome = if remediate {
        evaluator.execute_remediation().and_then(|status| {
            let payload = formatter.format(evaluator.indicators())?;
            Ok((status, payload))
        })
    } else {
        evaluator
            .execute_audit(formatter.as_ref())
            .map(|result| (result.status, result.payload))
    };

    if json_report {
        let outcome = match &outcome {
            Ok((status, payload)) => Outcome::Completed {
                status: *status,
                payload: payload.clone(),
            },
            Err(e) => Outcome::Error {
                message: e.message.clone(),
                code: e.code,
            },
        };
        let report = AuditReport::new(rule_name, action, started, outcome);
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| Error::invalid(format!("Failed to serialize report: {}", e)))?;
        println!("{}", text);
        return Ok(match report.status() {
            Some(status) => exit_code(status),
            None => ExitCode::from(EXIT_ERROR),
        });
    }

    let (status, payload) = outcome?;
    print!("{}", payload);
    if !payload.ends_with('\n') {
        println!();
    }
    println!("{}", status);
    Ok(exit_code(status))
}

fn list() -> Result<ExitCode> {
    let registry = create_procedure_registry()?;
    for name in registry.list_procedures() {
        let parameters = registry.parameters_of(&name).unwrap_or_default().join(", ");
        let kind = match (registry.has_audit(&name), registry.has_remediation(&name)) {
            (true, true) => "audit+remediate",
            (false, true) => "remediate",
            _ => "audit",
        };
        println!("{:<36} {:<16} {}", name, kind, parameters);
    }
    Ok(ExitCode::from(EXIT_COMPLIANT))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Commands::Audit(args) => run(&cli, args, false),
        Commands::Remediate(args) => run(&cli, args, true),
        Commands::List => list(),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {} (code {})", e.message, e.code);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_procedure_rule_from_arguments() {
        let cli = Cli::parse_from([
            "compliance-engine",
            "audit",
            "--procedure",
            "EnsureSysctl",
            "--arg",
            "sysctlName=net.ipv4.ip_forward",
            "--arg",
            "value=^0$",
        ]);
        let args = match &cli.command {
            Commands::Audit(args) => args,
            _ => panic!("Expected audit subcommand"),
        };
        let (name, rule) = load_rule(args).unwrap();
        assert_eq!(name, "EnsureSysctl");
        assert_eq!(
            rule,
            serde_json::json!({"EnsureSysctl": {"sysctlName": "net.ipv4.ip_forward", "value": "^0$"}})
        );
    }

    #[test]
    fn test_rule_file_and_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forwarding.json");
        std::fs::write(&path, r#"{"not": {"AuditFailure": {}}}"#).unwrap();

        let cli = Cli::parse_from([
            "compliance-engine",
            "remediate",
            "--rule",
            path.to_str().unwrap(),
            "--param",
            "mask=0137",
            "--format",
            "nested",
        ]);
        let args = match &cli.command {
            Commands::Remediate(args) => args,
            _ => panic!("Expected remediate subcommand"),
        };
        let (name, rule) = load_rule(args).unwrap();
        assert_eq!(name, "forwarding");
        assert!(rule.get("not").is_some());
        assert_eq!(args.params, vec![("mask".to_string(), "0137".to_string())]);
    }

    #[test]
    fn test_key_value_parsing() {
        assert_eq!(
            parse_key_value("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn test_procedure_and_rule_conflict() {
        let result = Cli::try_parse_from([
            "compliance-engine",
            "audit",
            "--procedure",
            "AuditSuccess",
            "--rule",
            "x.json",
        ]);
        assert!(result.is_err());
    }
}
