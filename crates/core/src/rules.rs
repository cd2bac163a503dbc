use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ProberError, Result};
use crate::model::rule::RuleDefinition;

#[derive(Debug, Default, Deserialize)]
struct RulesFile {
    #[serde(default, rename = "rule")]
    rules: Vec<RuleDefinition>,
}

pub fn load_rules(path: &Path) -> Result<Vec<RuleDefinition>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| ProberError::Io(format!("failed reading {}: {e}", path.display())))?;
    parse_rules(&raw)
        .map_err(|e| ProberError::Config(format!("failed parsing {}: {e}", path.display())))
}

pub fn parse_rules(raw: &str) -> Result<Vec<RuleDefinition>> {
    let parsed: RulesFile =
        toml::from_str(raw).map_err(|e| ProberError::Parse(format!("invalid rules: {e}")))?;

    let mut seen = HashSet::new();
    for rule in &parsed.rules {
        if !seen.insert(rule.id) {
            return Err(ProberError::Parse(format!("duplicate rule id {}", rule.id)));
        }
        if rule.step <= 0 {
            return Err(ProberError::Parse(format!(
                "rule {} must have a positive step",
                rule.id
            )));
        }
    }
    Ok(parsed.rules)
}
