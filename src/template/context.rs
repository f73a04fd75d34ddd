//! Render context
//!
//! Builds the context for the first-boot template from a values file and the
//! generated machine identity.

use crate::ProvisionError;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// Timezone used when the values file does not name one
pub const DEFAULT_TIMEZONE: &str = "Etc/UTC";

static ENV_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^${}]*)\}").expect("valid env reference pattern"));

/// One account to create on first boot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub sudo: bool,
    #[serde(default)]
    pub password: Option<String>,
    pub github_username: String,
}

impl UserRecord {
    pub fn new(username: impl Into<String>, github_username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            github_username: github_username.into(),
            ..Default::default()
        }
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Variables available to templates
///
/// Keys other than the known ones are kept and passed to templates as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderContext {
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default)]
    pub ddns_host: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RenderContext {
    /// Parse a values document without substitution
    pub fn from_yaml(yaml: &str) -> Result<Self, ProvisionError> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Build from an already parsed values document
    pub fn from_value(value: Value) -> Result<Self, ProvisionError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Mapping(_) => Ok(serde_yaml::from_value(value)?),
            _ => Err(ProvisionError::Config(
                "values document must be a mapping".to_string(),
            )),
        }
    }

    /// Load a values file, replacing `${NAME}` references first
    ///
    /// `vars` is consulted before the process environment, keyed by the
    /// lowercase reference name.
    pub async fn load(
        path: impl AsRef<Path>,
        vars: &HashMap<String, String>,
    ) -> Result<Self, ProvisionError> {
        let path = path.as_ref();
        debug!("Loading values from {}", path.display());

        let content = tokio::fs::read_to_string(path).await?;
        let value: Value = serde_yaml::from_str(&content)?;
        let value = substitute_env(value, vars, &|name| std::env::var(name).ok());

        Self::from_value(value)
    }

    /// Fill in the machine identity where the values file left it unset
    pub fn with_identity(mut self, machine_id: &str, ddns_host: &str) -> Self {
        if self.machine_id.as_deref().is_none_or(str::is_empty) {
            self.machine_id = Some(machine_id.to_string());
        }
        if self.ddns_host.as_deref().is_none_or(str::is_empty) {
            self.ddns_host = Some(ddns_host.to_string());
        }
        self
    }

    /// Timezone, falling back to [`DEFAULT_TIMEZONE`]
    pub fn timezone_or_default(&self) -> &str {
        self.timezone
            .as_deref()
            .filter(|tz| !tz.is_empty())
            .unwrap_or(DEFAULT_TIMEZONE)
    }

    /// Convert to a template value
    pub fn to_value(&self) -> minijinja::Value {
        minijinja::Value::from_serialize(self)
    }
}

/// Replace `${NAME}` references in every string scalar
///
/// Lookup order: `vars` by lowercase name, then `lookup` by the name as
/// written. References that resolve to nothing or to an empty string stay
/// in place. Mapping keys are not touched.
pub fn substitute_env(
    value: Value,
    vars: &HashMap<String, String>,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_str(&s, vars, lookup)),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| substitute_env(item, vars, lookup))
                .collect(),
        ),
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (k, substitute_env(v, vars, lookup)))
                .collect(),
        ),
        Value::Tagged(mut tagged) => {
            tagged.value = substitute_env(tagged.value, vars, lookup);
            Value::Tagged(tagged)
        }
        other => other,
    }
}

fn substitute_str(
    s: &str,
    vars: &HashMap<String, String>,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> String {
    ENV_REFERENCE
        .replace_all(s, |caps: &Captures| {
            let name = &caps[1];
            vars.get(&name.to_lowercase())
                .cloned()
                .or_else(|| lookup(name))
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_values() {
        let yaml = r#"
timezone: Europe/Copenhagen
users:
  - username: alice
    sudo: true
    github_username: alice-gh
  - username: bob
    password: "$6$salt$hash"
    github_username: bobby
site: lab
"#;
        let ctx = RenderContext::from_yaml(yaml).unwrap();
        assert_eq!(ctx.timezone.as_deref(), Some("Europe/Copenhagen"));
        assert_eq!(ctx.users.len(), 2);
        assert!(ctx.users[0].sudo);
        assert!(ctx.users[0].password.is_none());
        assert!(!ctx.users[1].sudo);
        assert_eq!(ctx.users[1].password.as_deref(), Some("$6$salt$hash"));
        assert_eq!(ctx.extra.get("site"), Some(&Value::from("lab")));
    }

    #[test]
    fn test_empty_values() {
        let ctx = RenderContext::from_yaml("").unwrap();
        assert!(ctx.users.is_empty());
        assert_eq!(ctx.timezone_or_default(), DEFAULT_TIMEZONE);
    }

    #[test]
    fn test_non_mapping_values_rejected() {
        assert!(RenderContext::from_yaml("- a\n- b\n").is_err());
    }

    #[test]
    fn test_with_identity_keeps_explicit_values() {
        let ctx = RenderContext {
            machine_id: Some("fixed".to_string()),
            ..Default::default()
        }
        .with_identity("rpi4-abcdefgh", "rpi4-abcdefgh.mac.corpdk.com");

        assert_eq!(ctx.machine_id.as_deref(), Some("fixed"));
        assert_eq!(
            ctx.ddns_host.as_deref(),
            Some("rpi4-abcdefgh.mac.corpdk.com")
        );
    }

    #[test]
    fn test_substitute_prefers_vars() {
        let mut vars = HashMap::new();
        vars.insert("machine_id".to_string(), "rpi4-abcdefgh".to_string());
        let lookup = |name: &str| (name == "MACHINE_ID").then(|| "from-env".to_string());

        let value = Value::from("host-${MACHINE_ID}");
        let out = substitute_env(value, &vars, &lookup);
        assert_eq!(out, Value::from("host-rpi4-abcdefgh"));
    }

    #[test]
    fn test_substitute_falls_back_to_env() {
        let lookup = |name: &str| (name == "TZ_NAME").then(|| "Europe/Copenhagen".to_string());
        let out = substitute_env(Value::from("${TZ_NAME}"), &HashMap::new(), &lookup);
        assert_eq!(out, Value::from("Europe/Copenhagen"));
    }

    #[test]
    fn test_substitute_leaves_unresolved() {
        let out = substitute_env(Value::from("a ${MISSING} b"), &HashMap::new(), &no_env);
        assert_eq!(out, Value::from("a ${MISSING} b"));

        let lookup = |_: &str| Some(String::new());
        let out = substitute_env(Value::from("${EMPTY}"), &HashMap::new(), &lookup);
        assert_eq!(out, Value::from("${EMPTY}"));
    }

    #[test]
    fn test_substitute_nested() {
        let yaml = r#"
users:
  - username: ${ADMIN}
    github_username: ${ADMIN}
    sudo: true
${ADMIN}: key-untouched
"#;
        let mut vars = HashMap::new();
        vars.insert("admin".to_string(), "dave".to_string());

        let value: Value = serde_yaml::from_str(yaml).unwrap();
        let ctx = RenderContext::from_value(substitute_env(value, &vars, &no_env)).unwrap();

        assert_eq!(ctx.users[0].username, "dave");
        assert_eq!(ctx.users[0].github_username, "dave");
        assert!(ctx.users[0].sudo);
        assert!(ctx.extra.contains_key("${ADMIN}"));
    }

    #[test]
    fn test_context_value_exposes_extra_keys() {
        let ctx = RenderContext::from_yaml("site: lab\n").unwrap();
        let value = ctx.to_value();
        assert_eq!(value.get_attr("site").unwrap().as_str(), Some("lab"));
    }
}
