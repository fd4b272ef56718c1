//! Credential placeholders and their resolution.
//!
//! Credential fields of a location may contain `{{NAME}}` placeholders. They
//! are substituted from a [`CredentialSource`] right before a sync, never
//! earlier, so cache-only reads work without any secrets configured.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CacheError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
});

/// A secret string. `Debug` and `Display` never print the value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Username and optional password taken from a location's userinfo.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub username: String,
    pub password: Option<Secret>,
}

/// Source of values for `{{NAME}}` placeholders.
pub trait CredentialSource: Send + Sync {
    /// Look up the value for a placeholder name.
    fn lookup(&self, name: &str) -> Option<Secret>;
}

impl CredentialSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<Secret> {
        self.get(name).map(Secret::new)
    }
}

/// A credential source with no values.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn lookup(&self, _name: &str) -> Option<Secret> {
        None
    }
}

/// Reads placeholder values from environment variables.
///
/// With a prefix of `SRCCACHE_`, `{{PASSWORD}}` resolves from
/// `$SRCCACHE_PASSWORD`.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    prefix: String,
}

impl EnvCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl CredentialSource for EnvCredentials {
    fn lookup(&self, name: &str) -> Option<Secret> {
        std::env::var(format!("{}{}", self.prefix, name))
            .ok()
            .map(Secret::new)
    }
}

/// Check that every `{{`/`}}` in `value` belongs to a well-formed placeholder.
///
/// Returns a human-readable reason on failure.
pub fn check_template(value: &str) -> Result<(), String> {
    let stripped = PLACEHOLDER.replace_all(value, "");
    if stripped.contains("{{") || stripped.contains("}}") {
        return Err(format!(
            "malformed credential placeholder in `{}`",
            redact_template(value)
        ));
    }
    Ok(())
}

/// Names of all placeholders referenced by `value`, in order of appearance.
pub fn placeholder_names(value: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(value)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Whether `value` contains at least one placeholder.
pub fn is_templated(value: &str) -> bool {
    PLACEHOLDER.is_match(value)
}

/// Substitute every placeholder in `value` from `source`.
pub fn substitute(value: &str, source: &dyn CredentialSource) -> Result<String, CacheError> {
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(value) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let secret = source
            .lookup(name.as_str())
            .ok_or_else(|| CacheError::CredentialResolution {
                placeholder: name.as_str().to_string(),
            })?;
        out.push_str(&value[last..whole.start()]);
        out.push_str(secret.expose());
        last = whole.end();
    }
    out.push_str(&value[last..]);
    Ok(out)
}

/// Resolve placeholders in a set of credentials.
pub fn resolve_credentials(
    credentials: &Credentials,
    source: &dyn CredentialSource,
) -> Result<Credentials, CacheError> {
    Ok(Credentials {
        username: substitute(&credentials.username, source)?,
        password: credentials
            .password
            .as_ref()
            .map(|p| substitute(p.expose(), source).map(Secret::new))
            .transpose()?,
    })
}

// Placeholder names are not secret, literal text around them might be.
fn redact_template(value: &str) -> String {
    if is_templated(value) {
        value.to_string()
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> HashMap<String, String> {
        HashMap::from([
            ("USERNAME".to_string(), "alice".to_string()),
            ("PASSWORD".to_string(), "s3cr3t".to_string()),
        ])
    }

    #[test]
    fn test_substitute_placeholders() {
        let source = source();
        assert_eq!(substitute("{{USERNAME}}", &source).unwrap(), "alice");
        assert_eq!(
            substitute("pre-{{ PASSWORD }}-post", &source).unwrap(),
            "pre-s3cr3t-post"
        );
        assert_eq!(substitute("plain", &source).unwrap(), "plain");
    }

    #[test]
    fn test_substitute_missing_placeholder() {
        let err = substitute("{{TOKEN}}", &source()).unwrap_err();
        match err {
            CacheError::CredentialResolution { placeholder } => assert_eq!(placeholder, "TOKEN"),
            other => panic!("Expected CredentialResolution, got {:?}", other),
        }
    }

    #[test]
    fn test_check_template() {
        assert!(check_template("{{USERNAME}}").is_ok());
        assert!(check_template("plain").is_ok());
        assert!(check_template("{{USERNAME").is_err());
        assert!(check_template("{{1BAD}}").is_err());
        assert!(check_template("USER}}").is_err());
    }

    #[test]
    fn test_placeholder_names() {
        assert_eq!(
            placeholder_names("{{A}}:{{ B_2 }}"),
            vec!["A", "B_2"]
        );
        assert!(placeholder_names("none").is_empty());
    }

    #[test]
    fn test_resolve_credentials() {
        let creds = Credentials {
            username: "{{USERNAME}}".to_string(),
            password: Some(Secret::new("{{PASSWORD}}")),
        };
        let resolved = resolve_credentials(&creds, &source()).unwrap();
        assert_eq!(resolved.username, "alice");
        assert_eq!(resolved.password.unwrap().expose(), "s3cr3t");
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));
        assert!(!format!("{}", secret).contains("hunter2"));
    }

    #[test]
    fn test_no_credentials() {
        assert!(NoCredentials.lookup("ANY").is_none());
        assert!(matches!(
            substitute("{{ANY}}", &NoCredentials),
            Err(CacheError::CredentialResolution { .. })
        ));
    }
}
