//! Uniqueness of one column in a delimited file, e.g. user names in /etc/passwd

use compliance_engine_base::bindings::{Arguments, Bindings};
use compliance_engine_base::context::Context;
use compliance_engine_base::error::{Error, Result, Status, ENOENT};
use compliance_engine_base::indicators::{IndicatorsTree, ScopeId};
use std::collections::BTreeSet;

pub struct EnsureNoDuplicateEntriesExistParams {
    pub filename: String,
    pub delimiter: char,
    /// Zero-based column index
    pub column: usize,
    /// What the entries are called in the report, `entries` by default
    pub context: Option<String>,
}

impl Bindings for EnsureNoDuplicateEntriesExistParams {
    const FIELDS: &'static [&'static str] = &["filename", "delimiter", "column", "context"];

    fn bind(args: &Arguments<'_>) -> Result<Self> {
        Ok(Self {
            filename: args.required("filename")?,
            delimiter: args.required("delimiter")?,
            column: args.required("column")?,
            context: args.optional("context")?,
        })
    }
}

pub fn audit_ensure_no_duplicate_entries_exist(
    params: &EnsureNoDuplicateEntriesExistParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    context: &dyn Context,
) -> Result<Status> {
    let contents = context.get_file_contents(&params.filename).map_err(|e| {
        log::error!("Failed to read '{}': {}", params.filename, e);
        Error::new(format!("Failed to open file: {}", params.filename), ENOENT)
    })?;

    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for line in contents.lines().filter(|l| !l.is_empty()) {
        let entry = line
            .split(params.delimiter)
            .nth(params.column)
            .ok_or_else(|| Error::invalid("Column index out of bounds"))?;
        if !seen.insert(entry) {
            duplicates.insert(entry);
        }
    }

    if duplicates.is_empty() {
        let entries = params.context.as_deref().unwrap_or("entries");
        return Ok(indicators.compliant(
            scope,
            format!("No duplicate {} found in {}", entries, params.filename),
        ));
    }

    for entry in duplicates {
        indicators.non_compliant(scope, format!("Duplicate entry: '{}'", entry));
    }
    Ok(Status::NonCompliant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliance_engine_base::bindings::{arg_map, bind};
    use compliance_engine_base::context::MockContext;
    use compliance_engine_base::error::EINVAL;
    use compliance_engine_base::formatters::{CompactListFormatter, PayloadFormatter};

    fn audit(args: &[(&str, &str)], context: &MockContext) -> (Result<Status>, String) {
        let params: EnsureNoDuplicateEntriesExistParams = bind(&arg_map(args.iter().copied())).unwrap();
        let mut tree = IndicatorsTree::new();
        let scope = tree.push("EnsureNoDuplicateEntriesExist");
        let result = audit_ensure_no_duplicate_entries_exist(&params, &mut tree, scope, context);
        tree.pop(scope).unwrap();
        (result, CompactListFormatter.format(&tree).unwrap())
    }

    #[test]
    fn test_duplicates_reported_once_each() {
        let context = MockContext::new().with_file(
            "/etc/group",
            "root:x:0:\nwheel:x:10:\nroot:x:100:\nwheel:x:11:\nroot:x:101:\n",
        );
        let (status, report) = audit(
            &[("filename", "/etc/group"), ("delimiter", ":"), ("column", "0")],
            &context,
        );
        assert_eq!(status.unwrap(), Status::NonCompliant);
        assert_eq!(
            report,
            "[NonCompliant] Duplicate entry: 'root'\n[NonCompliant] Duplicate entry: 'wheel'\n"
        );
    }

    #[test]
    fn test_unique_column() {
        let context = MockContext::new().with_file("/etc/group", "root:x:0:\nwheel:x:10:\n");
        let (status, report) = audit(
            &[
                ("filename", "/etc/group"),
                ("delimiter", ":"),
                ("column", "2"),
                ("context", "GIDs"),
            ],
            &context,
        );
        assert_eq!(status.unwrap(), Status::Compliant);
        assert_eq!(report, "[Compliant] No duplicate GIDs found in /etc/group\n");
    }

    #[test]
    fn test_errors() {
        let context = MockContext::new().with_file("/etc/group", "root:x:0:\n");
        let (result, _) = audit(
            &[("filename", "/etc/group"), ("delimiter", ":"), ("column", "7")],
            &context,
        );
        assert_eq!(result.unwrap_err().code, EINVAL);

        let (result, _) = audit(
            &[("filename", "/etc/missing"), ("delimiter", ":"), ("column", "0")],
            &context,
        );
        assert_eq!(result.unwrap_err().code, ENOENT);

        let err = bind::<EnsureNoDuplicateEntriesExistParams>(&arg_map([
            ("filename", "/etc/group"),
            ("delimiter", "::"),
            ("column", "0"),
        ]))
        .err()
        .unwrap();
        assert_eq!(err.code, EINVAL);

        let err = bind::<EnsureNoDuplicateEntriesExistParams>(&arg_map([
            ("filename", "/etc/group"),
            ("delimiter", ":"),
            ("column", "-1"),
        ]))
        .err()
        .unwrap();
        assert_eq!(err.code, EINVAL);
    }
}
