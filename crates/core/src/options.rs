//! Engine options: an ordered name -> value mapping.
//!
//! Order is preserved because the engine's argument parser resolves
//! duplicate-adjacent flags positionally; reordering a user's options is
//! observable behavior.

use indexmap::IndexMap;

use crate::error::TaskError;

/// Ordered engine parameters as supplied by the caller.
pub type TaskOptions = IndexMap<String, String>;

/// Validate option names before they are turned into command-line flags.
///
/// Names must be non-empty and restricted to `[A-Za-z0-9_-]` so a crafted
/// option can never smuggle extra arguments into the engine invocation.
pub fn validate_options(options: &TaskOptions) -> Result<(), TaskError> {
    for name in options.keys() {
        if name.is_empty() {
            return Err(TaskError::Configuration(
                "Option names must not be empty".to_string(),
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(TaskError::Configuration(format!(
                "Invalid option name '{name}': only alphanumerics, '-' and '_' are allowed"
            )));
        }
    }
    Ok(())
}

/// Expand options into `--name value` argument pairs, preserving order.
///
/// A value of `"true"` produces a bare flag; any other value is passed
/// through verbatim as the flag's argument.
pub fn to_engine_args(options: &TaskOptions) -> Vec<String> {
    let mut args = Vec::with_capacity(options.len() * 2);
    for (name, value) in options {
        args.push(format!("--{name}"));
        if value != "true" {
            args.push(value.clone());
        }
    }
    args
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> TaskOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn valid_names_pass() {
        let opts = options(&[("feature-quality", "high"), ("min_num_features", "8000")]);
        assert!(validate_options(&opts).is_ok());
    }

    #[test]
    fn empty_name_rejected() {
        let opts = options(&[("", "high")]);
        assert!(validate_options(&opts).is_err());
    }

    #[test]
    fn shell_metacharacters_rejected() {
        let opts = options(&[("quality; rm -rf /", "high")]);
        assert!(validate_options(&opts).is_err());
    }

    #[test]
    fn args_preserve_insertion_order() {
        let opts = options(&[("zeta", "1"), ("alpha", "2")]);
        assert_eq!(
            to_engine_args(&opts),
            vec!["--zeta", "1", "--alpha", "2"]
        );
    }

    #[test]
    fn boolean_values_become_bare_flags() {
        let opts = options(&[("fast-orthophoto", "true"), ("crop", "3")]);
        assert_eq!(
            to_engine_args(&opts),
            vec!["--fast-orthophoto", "--crop", "3"]
        );
    }
}
