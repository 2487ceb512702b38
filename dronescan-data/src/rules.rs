/*!
Network-name (SSID) pattern rules

A rule document maps a label (e.g. `dji`) to a list of regular expressions. Every
pattern is compiled case-insensitively and searched anywhere in the broadcast name.
*/

use std::path::Path;

use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};

use crate::error::SignatureError;

/// Labels in document order, each with its raw pattern strings
pub type RuleDocument = Vec<(String, Vec<String>)>;

/// Turns the text of a rule document into labeled pattern strings
pub trait RuleDocumentParser: Send + Sync {
    /// Name of the parser, for logging
    fn name(&self) -> &'static str;

    fn parse(&self, text: &str) -> Result<RuleDocument, SignatureError>;
}

/// The parser used when nothing else is asked for.
///
/// YAML when the `yaml` feature is built in, the line-based reader otherwise.
pub fn default_rule_parser() -> Box<dyn RuleDocumentParser> {
    #[cfg(feature = "yaml")]
    {
        Box::new(YamlRuleParser)
    }
    #[cfg(not(feature = "yaml"))]
    {
        Box::new(LineRuleParser)
    }
}

/// Full YAML reader backed by `serde_yaml`
#[cfg(feature = "yaml")]
pub struct YamlRuleParser;

#[cfg(feature = "yaml")]
impl RuleDocumentParser for YamlRuleParser {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn parse(&self, text: &str) -> Result<RuleDocument, SignatureError> {
        use serde_yaml::Value;

        let value: Value =
            serde_yaml::from_str(text).map_err(|e| SignatureError::Document(e.to_string()))?;

        let mapping = match value {
            Value::Null => return Ok(Vec::new()),
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(SignatureError::Document(
                    "top level must map labels to pattern lists".to_string(),
                ));
            }
        };

        let mut document = RuleDocument::new();
        for (key, patterns) in mapping {
            let label = match key {
                Value::String(label) => label,
                other => {
                    warn!("Ignoring rule group with non-string label {:?}", other);
                    continue;
                }
            };
            let patterns = match patterns {
                Value::Null => Vec::new(),
                Value::String(single) => vec![single],
                Value::Sequence(items) => items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s),
                        Value::Number(n) => Some(n.to_string()),
                        other => {
                            warn!("Ignoring non-string pattern {:?} for '{}'", other, label);
                            None
                        }
                    })
                    .collect(),
                other => {
                    warn!("Ignoring rule group '{}': expected a list, got {:?}", label, other);
                    continue;
                }
            };
            document.push((label, patterns));
        }
        Ok(document)
    }
}

/// Minimal reader for `label:` / `- pattern` documents.
///
/// Understands label lines, list items (bare, single- or double-quoted) that belong
/// to the most recent label, `#` comments and blank lines. Nothing else.
pub struct LineRuleParser;

impl RuleDocumentParser for LineRuleParser {
    fn name(&self) -> &'static str {
        "line"
    }

    fn parse(&self, text: &str) -> Result<RuleDocument, SignatureError> {
        let mut document = RuleDocument::new();
        let mut current: Option<usize> = None;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(item) = line.strip_prefix('-') {
                if let Some(idx) = current {
                    document[idx].1.push(unquote(item.trim()).to_string());
                }
            } else if let Some((label, _)) = line.split_once(':') {
                let label = label.trim();
                current = Some(match document.iter().position(|(l, _)| l == label) {
                    Some(idx) => {
                        document[idx].1.clear();
                        idx
                    }
                    None => {
                        document.push((label.to_string(), Vec::new()));
                        document.len() - 1
                    }
                });
            }
        }

        Ok(document)
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// One label and its compiled patterns
#[derive(Debug, Clone)]
pub struct PatternGroup {
    pub label: String,
    pub patterns: Vec<Regex>,
}

/// Compiled name-pattern rules, immutable once built
#[derive(Debug, Clone, Default)]
pub struct NamePatterns {
    groups: Vec<PatternGroup>,
}

impl NamePatterns {
    /// Load and compile a rule document.
    ///
    /// A missing file, an unreadable file or a document that does not parse all
    /// produce an empty rule set; only the last two are worth a warning.
    pub fn load(path: &Path, parser: &dyn RuleDocumentParser) -> Self {
        if !path.exists() {
            debug!("Name rules {:?} not present, no SSID rules loaded", path);
            return Self::default();
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "{}",
                    SignatureError::Io {
                        path: path.to_path_buf(),
                        source: e
                    }
                );
                return Self::default();
            }
        };

        match parser.parse(&String::from_utf8_lossy(&bytes)) {
            Ok(document) => {
                let rules = Self::compile(document);
                info!(
                    "Loaded {} SSID patterns in {} groups from {:?} ({} parser)",
                    rules.pattern_count(),
                    rules.groups.len(),
                    path,
                    parser.name()
                );
                rules
            }
            Err(e) => {
                warn!("Ignoring name rules {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Compile every pattern case-insensitively, dropping the ones that fail.
    pub fn compile(document: RuleDocument) -> Self {
        let mut groups: Vec<PatternGroup> = Vec::new();

        for (label, sources) in document {
            let mut patterns = Vec::with_capacity(sources.len());
            for source in sources {
                match RegexBuilder::new(&source).case_insensitive(true).build() {
                    Ok(re) => patterns.push(re),
                    Err(e) => warn!("Bad regex for '{}': {} ({})", label, source, e),
                }
            }
            if patterns.is_empty() {
                continue;
            }
            match groups.iter_mut().find(|g| g.label == label) {
                Some(group) => group.patterns.extend(patterns),
                None => groups.push(PatternGroup { label, patterns }),
            }
        }

        Self { groups }
    }

    /// Labels with at least one pattern found in `name`, in document order
    pub fn matching_labels(&self, name: &str) -> Vec<String> {
        self.groups
            .iter()
            .filter(|g| g.patterns.iter().any(|re| re.is_match(name)))
            .map(|g| g.label.clone())
            .collect()
    }

    pub fn groups(&self) -> &[PatternGroup] {
        &self.groups
    }

    pub fn pattern_count(&self) -> usize {
        self.groups.iter().map(|g| g.patterns.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
