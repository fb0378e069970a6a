use crate::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub fn default_concurrency() -> usize {
    15
}

/// Run-wide switches shared read-only by every worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub debug: bool,
    pub concurrency: usize,
    /// Emit URL-decoded query strings instead of the encoded form.
    pub decoded_params: bool,
    /// Concatenate onto the original value instead of replacing it.
    pub append_mode: bool,
    /// Emit even when a regex rule left the value unchanged.
    pub include_unaltered: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            debug: false,
            concurrency: default_concurrency(),
            decoded_params: false,
            append_mode: false,
            include_unaltered: false,
        }
    }
}

/// A rule as written in a rule file, before its pattern is compiled.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub regex: String,
    pub replacement: String,
    #[serde(default)]
    pub append: bool,
}

/// Contents of a rule file.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: BTreeMap<String, RuleSpec>,
    #[serde(default)]
    pub injections: Option<Vec<String>>,
}

impl RuleFile {
    /// Loads a rule file, picking the format from the extension: `.json` is
    /// JSON, `.yaml`/`.yml` is YAML, anything else is TOML.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadRuleFile {
            path: path.to_path_buf(),
            source,
        })?;

        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let parsed = match ext.as_str() {
            "json" => serde_json::from_str(&content).map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
            _ => toml::from_str(&content).map_err(|e| e.to_string()),
        };

        parsed.map_err(|message| ConfigError::ParseRuleFile {
            path: path.to_path_buf(),
            message,
        })
    }
}

/// A compiled match/replace rule.
#[derive(Debug, Clone)]
pub struct MatchReplaceRule {
    pub name: String,
    pub pattern: Regex,
    /// Replacement template; `$1` and `${name}` refer to capture groups.
    pub replacement: String,
    pub append: bool,
}

impl MatchReplaceRule {
    pub fn compile(
        name: impl Into<String>,
        regex: &str,
        replacement: impl Into<String>,
        append: bool,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let pattern = Regex::new(regex).map_err(|source| ConfigError::InvalidPattern {
            rule: name.clone(),
            source,
        })?;
        Ok(Self {
            name,
            pattern,
            replacement: replacement.into(),
            append,
        })
    }

    pub fn from_spec(name: &str, spec: &RuleSpec) -> Result<Self, ConfigError> {
        Self::compile(name, &spec.regex, spec.replacement.as_str(), spec.append)
    }

    pub fn apply(&self, value: &str) -> String {
        self.pattern
            .replace_all(value, self.replacement.as_str())
            .into_owned()
    }
}

/// Everything the engine needs for one run, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub options: RunOptions,
    /// Match/replace rules in registration order.
    pub rules: Vec<MatchReplaceRule>,
    pub injections: Vec<String>,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Any registered rule switches the whole run to regex replacement.
    pub fn uses_regex_rules(&self) -> bool {
        !self.rules.is_empty()
    }
}

/// Collects flag-level and file-level settings into an [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    options: RunOptions,
    match_regex: Option<String>,
    replacement: Option<String>,
    raw_injections: Option<String>,
    rule_file: Option<RuleFile>,
}

impl EngineConfigBuilder {
    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn match_regex(mut self, regex: Option<String>) -> Self {
        self.match_regex = regex.filter(|r| !r.is_empty());
        self
    }

    pub fn replacement(mut self, replacement: Option<String>) -> Self {
        self.replacement = replacement.filter(|r| !r.is_empty());
        self
    }

    /// Comma separated payloads, as given on the command line.
    pub fn raw_injections(mut self, raw: Option<String>) -> Self {
        self.raw_injections = raw.filter(|r| !r.is_empty());
        self
    }

    pub fn rule_file(mut self, file: Option<RuleFile>) -> Self {
        self.rule_file = file;
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        if self.options.concurrency == 0 {
            return Err(ConfigError::NoWorkers);
        }

        let mut rules = Vec::new();
        match (self.match_regex, self.replacement) {
            (Some(regex), Some(replacement)) => {
                rules.push(MatchReplaceRule::compile("cli", &regex, replacement, false)?);
            }
            (None, None) => {}
            _ => return Err(ConfigError::IncompleteMatchReplace),
        }

        let mut file_injections = None;
        if let Some(file) = self.rule_file {
            for (name, spec) in &file.rules {
                rules.push(MatchReplaceRule::from_spec(name, spec)?);
            }
            file_injections = file.injections;
        }

        let injections = match self.raw_injections {
            Some(raw) => raw.split(',').map(str::to_string).collect(),
            None => file_injections.unwrap_or_default(),
        };

        Ok(EngineConfig {
            options: self.options,
            rules,
            injections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_rule_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("create temp rule file");
        file.write_all(content.as_bytes()).expect("write rule file");
        file
    }

    #[test]
    fn rule_apply_expands_capture_groups() {
        let rule = MatchReplaceRule::compile("r", r"^(\d+)$", "${1}0", false).unwrap();
        assert_eq!(rule.apply("42"), "420");
        assert_eq!(rule.apply("abc"), "abc");
    }

    #[test]
    fn rule_compile_reports_bad_pattern() {
        let err = MatchReplaceRule::compile("broken", "(", "x", false).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidPattern { ref rule, .. } if rule == "broken"),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn builder_splits_injections() {
        let config = EngineConfig::builder()
            .raw_injections(Some("'\"><x>, {{7*7}}".to_string()))
            .build()
            .unwrap();
        assert_eq!(config.injections, vec!["'\"><x>", " {{7*7}}"]);
        assert!(!config.uses_regex_rules());
    }

    #[test]
    fn builder_requires_match_and_replace_together() {
        let err = EngineConfig::builder()
            .match_regex(Some("^1$".to_string()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::IncompleteMatchReplace));

        let err = EngineConfig::builder()
            .replacement(Some("2".to_string()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::IncompleteMatchReplace));
    }

    #[test]
    fn builder_rejects_zero_workers() {
        let options = RunOptions {
            concurrency: 0,
            ..RunOptions::default()
        };
        let err = EngineConfig::builder().options(options).build().unwrap_err();
        assert!(matches!(err, ConfigError::NoWorkers));
    }

    #[test]
    fn builder_registers_cli_rule_before_file_rules() {
        let file: RuleFile = toml::from_str(
            r#"
            [rules.zeta]
            regex = "z"
            replacement = "Z"

            [rules.alpha]
            regex = "a"
            replacement = "A"
            append = true
            "#,
        )
        .unwrap();

        let config = EngineConfig::builder()
            .match_regex(Some("^1$".to_string()))
            .replacement(Some("2".to_string()))
            .rule_file(Some(file))
            .build()
            .unwrap();

        let names: Vec<&str> = config.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["cli", "alpha", "zeta"]);
        assert!(config.rules[1].append);
        assert!(!config.rules[2].append);
        assert!(config.uses_regex_rules());
    }

    #[test]
    fn builder_prefers_flag_injections_over_file() {
        let file = RuleFile {
            rules: BTreeMap::new(),
            injections: Some(vec!["from-file".to_string()]),
        };
        let config = EngineConfig::builder()
            .rule_file(Some(file.clone()))
            .build()
            .unwrap();
        assert_eq!(config.injections, vec!["from-file"]);

        let config = EngineConfig::builder()
            .raw_injections(Some("from-flag".to_string()))
            .rule_file(Some(file))
            .build()
            .unwrap();
        assert_eq!(config.injections, vec!["from-flag"]);
    }

    #[test]
    fn load_toml_rule_file() {
        let file = write_rule_file(
            ".toml",
            r#"
            injections = ["XSS"]

            [rules."open.redirect"]
            regex = "^https?://.*"
            replacement = "https://evil.test/"
            "#,
        );
        let loaded = RuleFile::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.injections, Some(vec!["XSS".to_string()]));
        let rule = loaded.rules.get("open.redirect").expect("dotted rule name kept");
        assert_eq!(rule.replacement, "https://evil.test/");
        assert!(!rule.append);
    }

    #[test]
    fn load_json_rule_file() {
        let file = write_rule_file(
            ".json",
            r#"{ "rules": { "num": { "regex": "\\d+", "replacement": "-1", "append": true } } }"#,
        );
        let loaded = RuleFile::load_from_file(file.path()).unwrap();
        assert!(loaded.rules["num"].append);
        assert_eq!(loaded.injections, None);
    }

    #[test]
    fn load_yaml_rule_file() {
        let file = write_rule_file(
            ".yaml",
            "rules:\n  sqli:\n    regex: \"^[0-9]+$\"\n    replacement: \"'\"\n    append: true\ninjections:\n  - XSS\n  - \"{{7*7}}\"\n",
        );
        let loaded = RuleFile::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.rules["sqli"].regex, "^[0-9]+$");
        assert_eq!(loaded.rules["sqli"].replacement, "'");
        assert!(loaded.rules["sqli"].append);
        assert_eq!(
            loaded.injections,
            Some(vec!["XSS".to_string(), "{{7*7}}".to_string()])
        );
    }

    #[test]
    fn load_yml_extension_is_yaml() {
        let file = write_rule_file(".YML", "rules:\n  x:\n    regex: a\n    replacement: b\n");
        let loaded = RuleFile::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.rules["x"].replacement, "b");
        assert!(!loaded.rules["x"].append);
    }

    #[test]
    fn load_yaml_rejects_unknown_keys() {
        let file = write_rule_file(".yml", "rules: {}\nbogus: 1\n");
        let err = RuleFile::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseRuleFile { .. }), "unexpected error: {err:?}");
    }

    #[test]
    fn load_rejects_unknown_keys() {
        let file = write_rule_file(".toml", "[rules.x]\nregex = \"a\"\nreplacement = \"b\"\nbogus = 1\n");
        let err = RuleFile::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseRuleFile { .. }), "unexpected error: {err:?}");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = RuleFile::load_from_file(Path::new("/nonexistent/qsinject-rules.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadRuleFile { .. }));
    }

    #[test]
    fn bad_pattern_in_file_is_fatal() {
        let file: RuleFile = toml::from_str("[rules.bad]\nregex = \"[\"\nreplacement = \"x\"\n").unwrap();
        let err = EngineConfig::builder().rule_file(Some(file)).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref rule, .. } if rule == "bad"));
    }
}
