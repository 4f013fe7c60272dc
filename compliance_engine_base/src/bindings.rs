// src/bindings.rs
//! Parameter binding: string-keyed argument maps to typed parameter structs
//!
//! Every procedure parameter struct implements [`Bindings`]: a static list of
//! accepted field names plus a `bind` function that pulls each field out of
//! an [`Arguments`] view with the matching [`FromArg`] conversion. [`bind`]
//! checks the argument names against the field list first, so a procedure
//! body only ever sees fully validated parameters.

use crate::error::{Error, Result};
use crate::pattern::Pattern;
use std::collections::BTreeMap;
use std::fmt;

/// Raw procedure arguments: parameter name to unparsed value
pub type ArgMap = BTreeMap<String, String>;

/// Static binding metadata for a parameter struct
pub trait Bindings: Sized {
    /// Every parameter name the struct accepts
    const FIELDS: &'static [&'static str];

    fn bind(args: &Arguments<'_>) -> Result<Self>;
}

/// Conversion from a raw argument string
pub trait FromArg: Sized {
    fn from_arg(value: &str) -> Result<Self>;
}

/// Read-only view over the argument map handed to [`Bindings::bind`]
pub struct Arguments<'a> {
    args: &'a ArgMap,
}

impl<'a> Arguments<'a> {
    pub fn new(args: &'a ArgMap) -> Self {
        Self { args }
    }

    pub fn raw(&self, name: &str) -> Option<&'a str> {
        self.args.get(name).map(String::as_str)
    }

    /// A parameter that must be present and non-empty
    pub fn required<T: FromArg>(&self, name: &str) -> Result<T> {
        match self.raw(name) {
            None => Err(Error::invalid(format!("Missing required '{}' parameter", name))),
            Some("") => Err(Error::invalid(format!(
                "Empty value for required '{}' parameter",
                name
            ))),
            Some(value) => parse_field(name, value),
        }
    }

    /// A parameter that may be absent
    pub fn optional<T: FromArg>(&self, name: &str) -> Result<Option<T>> {
        self.raw(name).map(|value| parse_field(name, value)).transpose()
    }

    /// A parameter that falls back to `default` when absent
    pub fn optional_or<T: FromArg>(&self, name: &str, default: T) -> Result<T> {
        Ok(self.optional(name)?.unwrap_or(default))
    }
}

fn parse_field<T: FromArg>(name: &str, value: &str) -> Result<T> {
    T::from_arg(value).map_err(|e| e.context(format!("Failed to parse parameter '{}'", name)))
}

/// Bind `args` onto `T`, rejecting unknown and surplus arguments
pub fn bind<T: Bindings>(args: &ArgMap) -> Result<T> {
    if args.len() > T::FIELDS.len() {
        return Err(Error::invalid("Too many arguments provided"));
    }

    if let Some(unknown) = args.keys().find(|k| !T::FIELDS.contains(&k.as_str())) {
        return Err(Error::invalid(format!("Unknown parameter '{}'", unknown)));
    }

    T::bind(&Arguments::new(args))
}

/// Build an [`ArgMap`] from string pairs
pub fn arg_map<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> ArgMap {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Bindings for procedures that take no parameters
impl Bindings for () {
    const FIELDS: &'static [&'static str] = &[];

    fn bind(_args: &Arguments<'_>) -> Result<Self> {
        Ok(())
    }
}

// ============================================================================
// Field parsers
// ============================================================================

impl FromArg for String {
    fn from_arg(value: &str) -> Result<Self> {
        Ok(value.to_string())
    }
}

macro_rules! impl_from_arg_int {
    ($($ty:ty),+) => {
        $(
            impl FromArg for $ty {
                fn from_arg(value: &str) -> Result<Self> {
                    value
                        .trim()
                        .parse::<$ty>()
                        .map_err(|e| Error::invalid(format!("Invalid integer value '{}': {}", value, e)))
                }
            }
        )+
    };
}

impl_from_arg_int!(i32, i64, u32, u64, usize);

impl FromArg for bool {
    fn from_arg(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(Error::invalid(format!("Invalid boolean value '{}'", value))),
        }
    }
}

impl FromArg for char {
    fn from_arg(value: &str) -> Result<Self> {
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(Error::invalid(format!(
                "Expected a single character, got '{}'",
                value
            ))),
        }
    }
}

impl FromArg for Pattern {
    fn from_arg(value: &str) -> Result<Self> {
        Pattern::make(value)
    }
}

/// Octal permission bits such as `0644`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(pub u32);

impl FromArg for FileMode {
    fn from_arg(value: &str) -> Result<Self> {
        let mode = u32::from_str_radix(value.trim(), 8)
            .map_err(|_| Error::invalid(format!("Invalid octal mode '{}'", value)))?;
        if mode > 0o7777 {
            return Err(Error::invalid(format!("Mode '{}' is out of range", value)));
        }
        Ok(FileMode(mode))
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03o}", self.0)
    }
}

/// A list of values separated by `SEP`, e.g. `root|admin`
#[derive(Debug, Clone, PartialEq)]
pub struct Separated<T, const SEP: char> {
    pub items: Vec<T>,
}

impl<T, const SEP: char> Separated<T, SEP> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }
}

impl<T: FromArg, const SEP: char> FromArg for Separated<T, SEP> {
    fn from_arg(value: &str) -> Result<Self> {
        let items = value
            .split(SEP)
            .map(T::from_arg)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Static label table for an enumeration parameter
pub trait MapEnum: Sized + Copy + 'static {
    fn labels() -> &'static [(&'static str, Self)];
}

/// Look up `value` in the label table of `T`
pub fn parse_enum<T: MapEnum>(value: &str) -> Result<T> {
    T::labels()
        .iter()
        .find(|(label, _)| *label == value)
        .map(|(_, variant)| *variant)
        .ok_or_else(|| {
            Error::invalid(format!(
                "Invalid value '{}' for enumeration parameter",
                value
            ))
        })
}

/// Label of `variant` in the table of `T`
pub fn enum_label<T: MapEnum + PartialEq>(variant: T) -> &'static str {
    T::labels()
        .iter()
        .find(|(_, v)| *v == variant)
        .map(|(label, _)| *label)
        .unwrap_or("<unknown>")
}

/// Implement [`MapEnum`] and [`FromArg`] for an enum from a label table
#[macro_export]
macro_rules! map_enum {
    ($ty:ty { $($label:expr => $variant:expr),+ $(,)? }) => {
        impl $crate::bindings::MapEnum for $ty {
            fn labels() -> &'static [(&'static str, Self)] {
                &[$(($label, $variant)),+]
            }
        }

        impl $crate::bindings::FromArg for $ty {
            fn from_arg(value: &str) -> $crate::error::Result<Self> {
                $crate::bindings::parse_enum(value)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EINVAL;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Behavior {
        AllExist,
        NoneExist,
    }

    crate::map_enum!(Behavior {
        "all_exist" => Behavior::AllExist,
        "none_exist" => Behavior::NoneExist,
    });

    #[derive(Debug)]
    struct SampleParams {
        path: String,
        count: Option<i32>,
        recurse: bool,
        mode: Option<FileMode>,
        owner: Option<Separated<Pattern, '|'>>,
        behavior: Behavior,
    }

    impl Bindings for SampleParams {
        const FIELDS: &'static [&'static str] =
            &["path", "count", "recurse", "mode", "owner", "behavior"];

        fn bind(args: &Arguments<'_>) -> Result<Self> {
            Ok(Self {
                path: args.required("path")?,
                count: args.optional("count")?,
                recurse: args.optional_or("recurse", true)?,
                mode: args.optional("mode")?,
                owner: args.optional("owner")?,
                behavior: args.optional_or("behavior", Behavior::AllExist)?,
            })
        }
    }

    #[test]
    fn test_bind_all_kinds() {
        let args = arg_map([
            ("path", "/etc"),
            ("count", "3"),
            ("recurse", "No"),
            ("mode", "0644"),
            ("owner", "root|adm"),
            ("behavior", "none_exist"),
        ]);
        let params: SampleParams = bind(&args).unwrap();
        assert_eq!(params.path, "/etc");
        assert_eq!(params.count, Some(3));
        assert!(!params.recurse);
        assert_eq!(params.mode, Some(FileMode(0o644)));
        let owners: Vec<_> = params.owner.unwrap().iter().map(|p| p.source().to_string()).collect();
        assert_eq!(owners, vec!["root", "adm"]);
        assert_eq!(params.behavior, Behavior::NoneExist);
    }

    #[test]
    fn test_optional_defaults() {
        let params: SampleParams = bind(&arg_map([("path", "/etc")])).unwrap();
        assert_eq!(params.count, None);
        assert!(params.recurse);
        assert_eq!(params.behavior, Behavior::AllExist);
        assert!(params.owner.is_none());
    }

    #[test]
    fn test_missing_required() {
        let err = bind::<SampleParams>(&arg_map([("count", "1")])).unwrap_err();
        assert_eq!(err.code, EINVAL);
        assert_eq!(err.message, "Missing required 'path' parameter");

        let err = bind::<SampleParams>(&arg_map([("path", "")])).unwrap_err();
        assert!(err.message.contains("'path'"));
    }

    #[test]
    fn test_unknown_and_surplus_arguments() {
        let err = bind::<SampleParams>(&arg_map([("path", "/"), ("color", "red")])).unwrap_err();
        assert_eq!(err.message, "Unknown parameter 'color'");

        let err = bind::<()>(&arg_map([("x", "1")])).unwrap_err();
        assert_eq!(err.message, "Too many arguments provided");
    }

    #[test]
    fn test_invalid_values_name_the_field() {
        let err = bind::<SampleParams>(&arg_map([("path", "/"), ("count", "many")])).unwrap_err();
        assert!(err.message.starts_with("Failed to parse parameter 'count'"));

        let err = bind::<SampleParams>(&arg_map([("path", "/"), ("behavior", "some")])).unwrap_err();
        assert!(err.message.contains("Invalid value 'some' for enumeration parameter"));

        let err = bind::<SampleParams>(&arg_map([("path", "/"), ("mode", "0989")])).unwrap_err();
        assert!(err.message.contains("Invalid octal mode"));
    }

    #[test]
    fn test_malformed_pattern_is_binding_error() {
        let err = bind::<SampleParams>(&arg_map([("path", "/"), ("owner", "root|(")])).unwrap_err();
        assert_eq!(err.code, EINVAL);
        assert!(err.message.contains("Failed to compile regex '('"));
    }

    #[test]
    fn test_scalar_parsers() {
        assert!(bool::from_arg("YES").unwrap());
        assert!(bool::from_arg("maybe").is_err());
        assert_eq!(char::from_arg(":").unwrap(), ':');
        assert!(char::from_arg("::").is_err());
        assert_eq!(FileMode(0o40).to_string(), "040");
        assert_eq!(enum_label(Behavior::NoneExist), "none_exist");
    }
}
