use crate::error::{ConfigError, ConfigResult};

/// Replace every `${NAME}` in `s` with the value of the environment variable.
///
/// Unlike a shell, an unset variable is an error rather than an empty string.
pub fn resolve_env(s: &str) -> ConfigResult<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ConfigError::UnterminatedVar(s.to_string()))?;
        let name = &after[..end];
        let value =
            std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_resolve_env() {
        std::env::set_var("SLOTSTREAM_TEST_VAR", "hello");

        assert_eq!(resolve_env("${SLOTSTREAM_TEST_VAR}").unwrap(), "hello");
        assert_eq!(
            resolve_env("prefix_${SLOTSTREAM_TEST_VAR}_suffix").unwrap(),
            "prefix_hello_suffix"
        );
        assert_eq!(
            resolve_env("${SLOTSTREAM_TEST_VAR}${SLOTSTREAM_TEST_VAR}").unwrap(),
            "hellohello"
        );
        assert_eq!(resolve_env("no_vars").unwrap(), "no_vars");

        std::env::remove_var("SLOTSTREAM_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_resolve_env_missing_var() {
        std::env::remove_var("SLOTSTREAM_UNSET_VAR");
        assert!(matches!(
            resolve_env("${SLOTSTREAM_UNSET_VAR}"),
            Err(ConfigError::MissingEnvVar(name)) if name == "SLOTSTREAM_UNSET_VAR"
        ));
    }

    #[test]
    fn test_resolve_env_unterminated() {
        assert!(matches!(
            resolve_env("abc${OOPS"),
            Err(ConfigError::UnterminatedVar(_))
        ));
    }
}
