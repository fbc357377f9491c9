//! `${VAR}` / `${VAR:-default}` expansion for configuration values.

use crate::ConfigError;

/// Expands variable references in `input` using `lookup`.
///
/// A `$` that does not open a `${` reference is kept verbatim. A reference to
/// a variable that `lookup` cannot resolve and that carries no default is an
/// error.
pub(crate) fn expand<F>(input: &str, lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(ConfigError::Validation(format!(
                "unterminated variable reference in `{input}`"
            )));
        };
        let reference = &after[..end];
        let (name, default) = match reference.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (reference, None),
        };
        if name.is_empty() {
            return Err(ConfigError::Validation(format!(
                "empty variable reference in `{input}`"
            )));
        }

        // `:-` substitutes the default for unset and empty variables alike.
        match (lookup(name), default) {
            (Some(value), Some(default)) if value.is_empty() => out.push_str(default),
            (Some(value), _) => out.push_str(&value),
            (None, Some(default)) => out.push_str(default),
            (None, None) => return Err(ConfigError::MissingVariable(name.to_owned())),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars() -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&str, &str> =
            HashMap::from_iter([("MATH_HTTP_PORT", "8000"), ("EMPTY", "")]);
        move |name| map.get(name).map(|v| (*v).to_owned())
    }

    #[test]
    fn expands_set_variables_and_defaults() {
        let lookup = vars();
        assert_eq!(expand("--port=${MATH_HTTP_PORT}", &lookup).unwrap(), "--port=8000");
        assert_eq!(expand("${SEARCH_HTTP_PORT:-8001}", &lookup).unwrap(), "8001");
        assert_eq!(expand("${EMPTY:-fallback}", &lookup).unwrap(), "fallback");
        assert_eq!(expand("[${EMPTY}]", &lookup).unwrap(), "[]");
        assert_eq!(expand("cost: $5", &lookup).unwrap(), "cost: $5");
    }

    #[test]
    fn missing_variable_without_default_is_an_error() {
        let lookup = vars();
        let err = expand("${ALPACA_HTTP_PORT}", &lookup).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable(name) if name == "ALPACA_HTTP_PORT"));
    }

    #[test]
    fn unterminated_reference_is_rejected() {
        let lookup = vars();
        assert!(expand("${MATH_HTTP_PORT", &lookup).is_err());
    }
}
