//! Line-oriented regex search across the files of one directory
//!
//! Each file whose name matches `filenamePattern` is scanned line by line.
//! A file matches when some line matches `matchPattern` and, if given,
//! `statePattern` matches the first capture group of that line (or the whole
//! match when the pattern has no group). The per-file outcomes are then
//! folded into a verdict according to `behavior`, following the OVAL
//! existence enumeration.

use compliance_engine_base::bindings::{enum_label, Arguments, Bindings};
use compliance_engine_base::context::{Context, EntryKind};
use compliance_engine_base::error::{Error, Result, Status};
use compliance_engine_base::indicators::{IndicatorsTree, ScopeId};
use compliance_engine_base::pattern::Pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Match,
}

compliance_engine_base::map_enum!(Operation {
    "pattern match" => Operation::Match,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    AllExist,
    AnyExist,
    AtLeastOneExists,
    NoneExist,
    OnlyOneExists,
}

compliance_engine_base::map_enum!(Behavior {
    "all_exist" => Behavior::AllExist,
    "any_exist" => Behavior::AnyExist,
    "at_least_one_exists" => Behavior::AtLeastOneExists,
    "none_exist" => Behavior::NoneExist,
    "only_one_exists" => Behavior::OnlyOneExists,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreCase {
    Both,
    MatchPattern,
    StatePattern,
}

compliance_engine_base::map_enum!(IgnoreCase {
    "matchPattern statePattern" => IgnoreCase::Both,
    "matchPattern" => IgnoreCase::MatchPattern,
    "statePattern" => IgnoreCase::StatePattern,
});

fn compile(source: &str, ignore_case: bool) -> Result<Pattern> {
    if ignore_case {
        Pattern::make_case_insensitive(source)
    } else {
        Pattern::make(source)
    }
}

pub struct FileRegexMatchParams {
    pub path: String,
    pub filename_pattern: Pattern,
    pub match_operation: Operation,
    pub match_pattern: Pattern,
    pub state_operation: Operation,
    pub state_pattern: Option<Pattern>,
    pub ignore_case: Option<IgnoreCase>,
    pub behavior: Behavior,
}

impl Bindings for FileRegexMatchParams {
    const FIELDS: &'static [&'static str] = &[
        "path",
        "filenamePattern",
        "matchOperation",
        "matchPattern",
        "stateOperation",
        "statePattern",
        "ignoreCase",
        "behavior",
    ];

    fn bind(args: &Arguments<'_>) -> Result<Self> {
        let ignore_case: Option<IgnoreCase> = args.optional("ignoreCase")?;
        let (match_icase, state_icase) = match ignore_case {
            None => (false, false),
            Some(IgnoreCase::Both) => (true, true),
            Some(IgnoreCase::MatchPattern) => (true, false),
            Some(IgnoreCase::StatePattern) => (false, true),
        };

        let match_source: String = args.required("matchPattern")?;
        let match_pattern = compile(&match_source, match_icase)
            .map_err(|e| e.context("Failed to parse parameter 'matchPattern'"))?;
        let state_pattern = args
            .optional::<String>("statePattern")?
            .map(|source| compile(&source, state_icase))
            .transpose()
            .map_err(|e| e.context("Failed to parse parameter 'statePattern'"))?;

        Ok(Self {
            path: args.required("path")?,
            filename_pattern: args.required("filenamePattern")?,
            match_operation: args.optional_or("matchOperation", Operation::Match)?,
            match_pattern,
            state_operation: args.optional_or("stateOperation", Operation::Match)?,
            state_pattern,
            ignore_case,
            behavior: args.optional_or("behavior", Behavior::AllExist)?,
        })
    }
}

/// Whether any line of `contents` satisfies the match and state patterns
fn multiline_match(contents: &str, params: &FileRegexMatchParams) -> bool {
    contents.lines().any(|line| {
        match (params.match_pattern.capture(line), &params.state_pattern) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(value), Some(state)) => state.is_match(value),
        }
    })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counts {
    files: usize,
    matches: usize,
    mismatches: usize,
    errors: usize,
}

fn pattern_error() -> Error {
    Error::invalid("Error occurred during pattern matching")
}

fn verdict(
    behavior: Behavior,
    counts: Counts,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
) -> Result<Status> {
    let Counts {
        files,
        matches,
        mismatches,
        errors,
    } = counts;

    match behavior {
        Behavior::AllExist => {
            if mismatches > 0 {
                return Ok(indicators.non_compliant(scope, "At least one file did not match the pattern"));
            }
            if errors > 0 {
                return Err(pattern_error());
            }
            if matches > 0 {
                Ok(indicators.compliant(scope, format!("All {} files matched the pattern", files)))
            } else {
                Ok(indicators.non_compliant(
                    scope,
                    format!(
                        "Expected all files to match, but only {} out of {} matched",
                        matches, files
                    ),
                ))
            }
        }
        Behavior::AnyExist => {
            if matches == 0 && errors > 0 {
                return Err(pattern_error());
            }
            Ok(indicators.compliant(scope, format!("Found {} matches", matches)))
        }
        Behavior::AtLeastOneExists => {
            if matches > 0 {
                return Ok(indicators.compliant(
                    scope,
                    format!("At least one file matched, found {} matches", matches),
                ));
            }
            if errors > 0 {
                return Err(pattern_error());
            }
            Ok(indicators.non_compliant(scope, "Expected at least one file to match, but none did"))
        }
        Behavior::NoneExist => {
            if matches > 0 {
                return Ok(indicators.non_compliant(
                    scope,
                    format!("Expected no files to match, but {} matched", matches),
                ));
            }
            if errors > 0 {
                return Err(pattern_error());
            }
            Ok(indicators.compliant(scope, "No files matched the pattern"))
        }
        Behavior::OnlyOneExists => {
            if matches == 1 && errors == 0 {
                return Ok(indicators.compliant(scope, "Exactly one file matched the pattern"));
            }
            if matches > 1 {
                return Ok(indicators.non_compliant(
                    scope,
                    format!("Expected only one file to match, but {} matched", matches),
                ));
            }
            if errors > 0 {
                return Err(pattern_error());
            }
            Ok(indicators.non_compliant(scope, "Expected exactly one file to match, but none did"))
        }
    }
}

pub fn audit_file_regex_match(
    params: &FileRegexMatchParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    context: &dyn Context,
) -> Result<Status> {
    let entries = match context.list_directory(&params.path, false) {
        Ok(entries) => entries,
        Err(e) if params.behavior == Behavior::NoneExist => {
            log::debug!(
                "Directory '{}' unreadable ({}), compliant for {}",
                params.path,
                e,
                enum_label(params.behavior)
            );
            return Ok(Status::Compliant);
        }
        Err(e) => {
            return Ok(indicators.non_compliant(
                scope,
                format!("Failed to open directory '{}': {}", params.path, e.message),
            ))
        }
    };

    let mut counts = Counts::default();
    for entry in entries.iter().filter(|e| {
        matches!(e.kind, EntryKind::File | EntryKind::Symlink) && params.filename_pattern.full_match(&e.name)
    }) {
        counts.files += 1;
        match context.get_file_contents(&entry.path) {
            Ok(contents) if multiline_match(&contents, params) => counts.matches += 1,
            Ok(_) => counts.mismatches += 1,
            Err(e) => {
                log::warn!("Failed to read '{}': {}", entry.path, e);
                counts.errors += 1;
            }
        }
    }

    log::debug!(
        "FileRegexMatch {} in '{}': {} files, {} matches, {} mismatches, {} errors",
        enum_label(params.behavior),
        params.path,
        counts.files,
        counts.matches,
        counts.mismatches,
        counts.errors
    );
    verdict(params.behavior, counts, indicators, scope)
}
