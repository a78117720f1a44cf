use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `{{ env.NAME }}` with an optional `| default("...")` tail
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\)\s*)?\}\}"#)
        .expect("placeholder pattern is valid")
});

/// Substitute environment placeholders in raw config text
///
/// Comment lines are left untouched so that disabled entries may reference
/// variables that are not set.
pub(crate) fn expand(raw: &str) -> Result<String, String> {
    let mut lines = Vec::new();

    for line in raw.split('\n') {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
        } else {
            lines.push(expand_line(line)?);
        }
    }

    Ok(lines.join("\n"))
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut failure = None;

    let replaced = PLACEHOLDER.replace_all(line, |caps: &Captures<'_>| {
        let key = &caps[1];
        let fallback = caps.get(2).map(|m| m.as_str());

        match resolve(key, fallback) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(replaced.into_owned()),
    }
}

fn resolve(key: &str, fallback: Option<&str>) -> Result<String, String> {
    let Some(name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(format!("unsupported placeholder `{key}`, expected `env.NAME`"));
    };

    match (std::env::var(name), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(fallback)) => Ok(fallback.to_owned()),
        (Err(_), None) => Err(format!("environment variable `{name}` is not set")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "[server]\nhealth_path = \"/health\"\n";
        assert_eq!(expand(input).unwrap(), input);
    }

    #[test]
    fn substitutes_set_variable() {
        temp_env::with_var("CONDUIT_TEST_KEY", Some("sk-123"), || {
            let out = expand("api_key = \"{{ env.CONDUIT_TEST_KEY }}\"").unwrap();
            assert_eq!(out, "api_key = \"sk-123\"");
        });
    }

    #[test]
    fn unset_variable_without_default_fails() {
        temp_env::with_var_unset("CONDUIT_TEST_ABSENT", || {
            let err = expand("api_key = \"{{ env.CONDUIT_TEST_ABSENT }}\"").unwrap_err();
            assert!(err.contains("CONDUIT_TEST_ABSENT"));
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        let input = "model = \"{{ env.CONDUIT_TEST_MODEL | default(\"gpt-4o-mini\") }}\"";

        temp_env::with_var_unset("CONDUIT_TEST_MODEL", || {
            assert_eq!(expand(input).unwrap(), "model = \"gpt-4o-mini\"");
        });

        temp_env::with_var("CONDUIT_TEST_MODEL", Some("gpt-4o"), || {
            assert_eq!(expand(input).unwrap(), "model = \"gpt-4o\"");
        });
    }

    #[test]
    fn comments_are_not_expanded() {
        temp_env::with_var_unset("CONDUIT_TEST_ABSENT", || {
            let input = "  # api_key = \"{{ env.CONDUIT_TEST_ABSENT }}\"";
            assert_eq!(expand(input).unwrap(), input);
        });
    }

    #[test]
    fn rejects_non_env_scope() {
        let err = expand("key = \"{{ vault.TOKEN }}\"").unwrap_err();
        assert!(err.contains("vault.TOKEN"));
    }
}
