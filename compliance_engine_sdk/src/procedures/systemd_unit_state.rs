//! Match `systemctl show` properties of a unit against patterns

use compliance_engine_base::bindings::{Arguments, Bindings};
use compliance_engine_base::context::Context;
use compliance_engine_base::error::{Error, Result, Status};
use compliance_engine_base::indicators::{IndicatorsTree, ScopeId};
use compliance_engine_base::pattern::Pattern;

/// Properties that may be matched, in query order
pub const PROPERTIES: &[&str] = &["ActiveState", "LoadState", "UnitFileState", "Unit"];

pub struct SystemdUnitStateParams {
    pub unit_name: String,
    /// `(property, pattern)` for each property given, in [`PROPERTIES`] order
    pub properties: Vec<(&'static str, Pattern)>,
}

impl Bindings for SystemdUnitStateParams {
    const FIELDS: &'static [&'static str] = &["unitName", "ActiveState", "LoadState", "UnitFileState", "Unit"];

    fn bind(args: &Arguments<'_>) -> Result<Self> {
        let unit_name: String = args.required("unitName")?;
        if !is_valid_unit_name(&unit_name) {
            return Err(Error::invalid(format!("Invalid unit name '{}'", unit_name)));
        }

        let mut properties = Vec::new();
        for property in PROPERTIES {
            if let Some(pattern) = args.optional::<Pattern>(property)? {
                properties.push((*property, pattern));
            }
        }
        if properties.is_empty() {
            return Err(Error::invalid(format!(
                "None of '{}' parameters are present",
                PROPERTIES.join(" ")
            )));
        }

        Ok(Self { unit_name, properties })
    }
}

/// Unit names are limited to the characters systemd accepts, so they are
/// safe to place on a shell command line unquoted
fn is_valid_unit_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_' | '.' | '\\' | '@'))
}

pub fn systemctl_command(params: &SystemdUnitStateParams) -> String {
    let mut command = String::from("systemctl show");
    for (property, _) in &params.properties {
        command.push_str(" -p ");
        command.push_str(property);
    }
    command.push(' ');
    command.push_str(&params.unit_name);
    command
}

pub fn audit_systemd_unit_state(
    params: &SystemdUnitStateParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    context: &dyn Context,
) -> Result<Status> {
    let unit = &params.unit_name;
    let output = match context.execute_command(&systemctl_command(params)) {
        Ok(output) => output,
        Err(e) => {
            log::error!("systemctl show failed for '{}': {}", unit, e);
            return Ok(indicators.non_compliant(
                scope,
                format!("Failed to execute systemctl command {}", e.message),
            ));
        }
    };

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let (name, value) = match line.split_once('=') {
            Some(pair) => pair,
            None => {
                return Ok(indicators.non_compliant(
                    scope,
                    format!("invalid systemctl output, missing '=' in output '{}'", line),
                ))
            }
        };

        let pattern = match params.properties.iter().find(|(p, _)| *p == name) {
            Some((_, pattern)) => pattern,
            None => {
                return Ok(indicators.non_compliant(
                    scope,
                    format!("Unexpected property '{}' in systemctl output", name),
                ))
            }
        };

        if !pattern.full_match(value) {
            log::debug!("Unit '{}' {}='{}' does not match '{}'", unit, name, value, pattern);
            return Ok(indicators.non_compliant(
                scope,
                format!(
                    "Failed to match systemctl unit name '{}' field '{}' value '{}' with pattern '{}'",
                    unit, name, value, pattern
                ),
            ));
        }
        indicators.compliant(
            scope,
            format!(
                "Successfully matched systemctl unit name '{}' field '{}' value '{}' with pattern '{}'",
                unit, name, value, pattern
            ),
        );
    }

    Ok(Status::Compliant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliance_engine_base::bindings::{arg_map, bind};
    use compliance_engine_base::error::{EINVAL, EIO};
    use compliance_engine_base::context::MockContext;

    fn params(args: &[(&str, &str)]) -> SystemdUnitStateParams {
        bind(&arg_map(args.iter().copied())).unwrap()
    }

    fn audit(params: &SystemdUnitStateParams, context: &MockContext) -> (Status, Vec<String>) {
        let mut tree = IndicatorsTree::new();
        let scope = tree.push("SystemdUnitState");
        let status = audit_systemd_unit_state(params, &mut tree, scope, context).unwrap();
        let messages = tree
            .node(scope)
            .unwrap()
            .indicators
            .iter()
            .map(|i| i.message.clone())
            .collect();
        (status, messages)
    }

    #[test]
    fn test_command_lists_requested_properties() {
        let p = params(&[
            ("unitName", "sshd.service"),
            ("UnitFileState", "enabled"),
            ("ActiveState", "active"),
        ]);
        assert_eq!(
            systemctl_command(&p),
            "systemctl show -p ActiveState -p UnitFileState sshd.service"
        );
    }

    #[test]
    fn test_properties_full_match() {
        let p = params(&[("unitName", "sshd.service"), ("ActiveState", "active|reloading")]);
        let context = MockContext::new()
            .with_command("systemctl show -p ActiveState sshd.service", "ActiveState=active\n");
        let (status, messages) = audit(&p, &context);
        assert_eq!(status, Status::Compliant);
        assert_eq!(
            messages,
            vec!["Successfully matched systemctl unit name 'sshd.service' field 'ActiveState' value 'active' with pattern 'active|reloading'"]
        );

        let context = MockContext::new()
            .with_command("systemctl show -p ActiveState sshd.service", "ActiveState=inactive\n");
        let (status, messages) = audit(&p, &context);
        assert_eq!(status, Status::NonCompliant);
        assert!(messages[0].starts_with("Failed to match systemctl unit name 'sshd.service'"));
    }

    #[test]
    fn test_malformed_output_and_command_failure() {
        let p = params(&[("unitName", "cups.service"), ("LoadState", "masked")]);

        let context = MockContext::new()
            .with_command("systemctl show -p LoadState cups.service", "garbage\n");
        let (status, messages) = audit(&p, &context);
        assert_eq!(status, Status::NonCompliant);
        assert!(messages[0].contains("missing '='"));

        let context = MockContext::new().with_failing_command(
            "systemctl show -p LoadState cups.service",
            Error::new("exit code 1", EIO),
        );
        let (status, messages) = audit(&p, &context);
        assert_eq!(status, Status::NonCompliant);
        assert_eq!(messages, vec!["Failed to execute systemctl command exit code 1"]);
    }

    #[test]
    fn test_unit_name_with_shell_syntax_rejected() {
        for unit in ["x; touch /tmp/marker", "sshd.service && id", "$(id)", "a b", "-H host", ""] {
            let err = bind::<SystemdUnitStateParams>(&arg_map([
                ("unitName", unit),
                ("ActiveState", "active"),
            ]))
            .err()
            .unwrap();
            assert_eq!(err.code, EINVAL, "unit name {:?}", unit);
        }

        let p = params(&[("unitName", "getty@tty1.service"), ("ActiveState", "active")]);
        assert_eq!(systemctl_command(&p), "systemctl show -p ActiveState getty@tty1.service");
    }

    #[test]
    fn test_at_least_one_property_required() {
        let err = bind::<SystemdUnitStateParams>(&arg_map([("unitName", "sshd.service")]))
            .err()
            .unwrap();
        assert_eq!(err.code, EINVAL);
        assert_eq!(
            err.message,
            "None of 'ActiveState LoadState UnitFileState Unit' parameters are present"
        );
    }
}
