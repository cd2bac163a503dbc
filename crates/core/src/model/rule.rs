use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleDefinition {
    pub id: i64,
    pub nid: i64,
    #[serde(default)]
    pub name: String,
    pub collect_type: String,
    #[serde(default)]
    pub plugin: Option<String>,
    pub step: i64,
    #[serde(default)]
    pub tags: String,
    pub updated_at: i64,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RuleDefinition {
    pub fn plugin_name(&self) -> &str {
        self.plugin.as_deref().unwrap_or(&self.collect_type)
    }

    pub fn accumulator_name(&self) -> String {
        format!("{}-{}", self.collect_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> RuleDefinition {
        RuleDefinition {
            id: 3,
            nid: 7,
            name: "local".into(),
            collect_type: "static".into(),
            plugin: None,
            step: 60,
            tags: String::new(),
            updated_at: 1,
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn plugin_name_defaults_to_collect_type() {
        let mut def = definition();
        assert_eq!(def.plugin_name(), "static");
        def.plugin = Some("demo".into());
        assert_eq!(def.plugin_name(), "demo");
    }

    #[test]
    fn accumulator_name_joins_type_and_id() {
        assert_eq!(definition().accumulator_name(), "static-3");
    }
}
