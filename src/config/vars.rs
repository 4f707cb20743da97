//! Environment variable interpolation for config files.
//!
//! Supports the following syntax:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # escape
        |
        \$\{
            ([A-Za-z_][A-Za-z0-9_]*)   # 1: name
            (?:
                (:?-)                  # 2: :- or -
                ([^}]*)                # 3: default
            )?
        \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # 4: unbraced name
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Every missing or rejected variable, so all of them are reported at once.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| substitute(caps, &mut errors))
        .into_owned();

    InterpolationResult { text, errors }
}

fn substitute(caps: &Captures, errors: &mut Vec<String>) -> String {
    let full_match = &caps[0];
    if full_match == "$$" {
        return "$".to_string();
    }

    let name = caps
        .get(1)
        .or_else(|| caps.get(4))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let colon_default = caps.get(2).is_some_and(|m| m.as_str() == ":-");
    let default = caps.get(3).map(|m| m.as_str());

    match env::var(name) {
        // Values may not smuggle extra YAML lines into the document.
        Ok(value) if value.contains('\n') || value.contains('\r') => {
            errors.push(format!(
                "environment variable '{name}' contains newlines, which is not allowed"
            ));
            full_match.to_string()
        }
        Ok(value) if value.is_empty() && colon_default => default.unwrap_or_default().to_string(),
        Ok(value) => value,
        Err(_) => match default {
            Some(default) => default.to_string(),
            None => {
                errors.push(format!("environment variable '{name}' is not set"));
                full_match.to_string()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sets variables for one test and puts the previous values back on drop.
    struct ScopedEnv {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl ScopedEnv {
        fn set(vars: &[(&'static str, Option<&str>)]) -> Self {
            let saved = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();
            for (key, value) in vars {
                apply(key, *value);
            }
            Self { saved }
        }
    }

    impl Drop for ScopedEnv {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                apply(key, value.as_deref());
            }
        }
    }

    fn apply(key: &str, value: Option<&str>) {
        // SAFETY: each test owns distinct DRIFT_TEST_* names, so no other
        // thread reads these variables concurrently.
        unsafe {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }

    #[test]
    fn test_basic_and_braced_substitution() {
        let _env = ScopedEnv::set(&[("DRIFT_TEST_MASTER", Some("disco://m1"))]);
        let result = interpolate("a: $DRIFT_TEST_MASTER\nb: ${DRIFT_TEST_MASTER}");
        assert!(result.is_ok());
        assert_eq!(result.text, "a: disco://m1\nb: disco://m1");
    }

    #[test]
    fn test_missing_variables_accumulate() {
        let _env = ScopedEnv::set(&[("DRIFT_TEST_MISS1", None), ("DRIFT_TEST_MISS2", None)]);
        let result = interpolate("a: $DRIFT_TEST_MISS1, b: ${DRIFT_TEST_MISS2}");
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("DRIFT_TEST_MISS1"));
        assert!(result.errors[1].contains("not set"));
    }

    #[test]
    fn test_defaults() {
        let _env = ScopedEnv::set(&[("DRIFT_TEST_UNSET", None), ("DRIFT_TEST_EMPTY", Some(""))]);
        assert_eq!(interpolate("${DRIFT_TEST_UNSET:-x}").text, "x");
        assert_eq!(interpolate("${DRIFT_TEST_UNSET-x}").text, "x");
        assert_eq!(interpolate("${DRIFT_TEST_EMPTY:-x}").text, "x");
        assert_eq!(interpolate("${DRIFT_TEST_EMPTY-x}").text, "");
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("tag_prefix: \"$$incoming:\"");
        assert!(result.is_ok());
        assert_eq!(result.text, "tag_prefix: \"$incoming:\"");
    }

    #[test]
    fn test_newline_injection_blocked() {
        let _env = ScopedEnv::set(&[("DRIFT_TEST_INJECT", Some("a\nprint_config: true"))]);
        let result = interpolate("tag_prefix: $DRIFT_TEST_INJECT");
        assert!(!result.is_ok());
        assert!(result.errors[0].contains("newlines"));
    }

    #[test]
    fn test_no_interpolation_needed() {
        let result = interpolate("print_config: false");
        assert!(result.is_ok());
        assert_eq!(result.text, "print_config: false");
    }
}
