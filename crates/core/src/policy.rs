use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{ProberError, Result};
use crate::expr::{Expression, Formula};
use crate::model::metric::CounterType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    #[default]
    Whitelist,
    Blacklist,
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whitelist => f.write_str("whitelist"),
            Self::Blacklist => f.write_str("blacklist"),
        }
    }
}

impl FromStr for PolicyMode {
    type Err = ProberError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "whitelist" => Ok(Self::Whitelist),
            "blacklist" => Ok(Self::Blacklist),
            _ => Err(ProberError::Parse(format!("unknown policy mode: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MetricDecl {
    #[serde(rename = "type", default)]
    pub counter_type: CounterType,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct ExprMetric {
    pub name: String,
    pub counter_type: CounterType,
    pub comment: String,
    pub expr: Arc<dyn Expression>,
}

impl ExprMetric {
    pub fn new(
        name: impl Into<String>,
        counter_type: CounterType,
        expr: impl Expression + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            counter_type,
            comment: String::new(),
            expr: Arc::new(expr),
        }
    }

    pub fn formula(
        name: impl Into<String>,
        counter_type: CounterType,
        source: &str,
    ) -> Result<Self> {
        Ok(Self::new(name, counter_type, Formula::parse(source)?))
    }
}

#[derive(Debug, Clone)]
pub struct PluginPolicy {
    pub name: String,
    pub mode: PolicyMode,
    pub metrics: BTreeMap<String, MetricDecl>,
    pub expr_metrics: Vec<ExprMetric>,
}

impl PluginPolicy {
    pub fn new(name: impl Into<String>, mode: PolicyMode) -> Self {
        Self {
            name: name.into(),
            mode,
            metrics: BTreeMap::new(),
            expr_metrics: Vec::new(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, counter_type: CounterType) -> Self {
        self.metrics.insert(
            name.into(),
            MetricDecl {
                counter_type,
                comment: String::new(),
            },
        );
        self
    }

    pub fn with_expr_metric(mut self, metric: ExprMetric) -> Self {
        self.expr_metrics.push(metric);
        self
    }

    pub fn publishes_nothing(&self) -> bool {
        self.mode == PolicyMode::Whitelist && self.metrics.is_empty()
    }
}

pub trait PolicyResolver: Send + Sync {
    fn resolve(&self, plugin: &str) -> Option<Arc<PluginPolicy>>;
}

#[derive(Debug, Default)]
pub struct PolicyRegistry {
    policies: RwLock<HashMap<String, Arc<PluginPolicy>>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let registry = Self::new();
        registry.replace(load_policies(path)?);
        Ok(registry)
    }

    pub fn insert(&self, policy: PluginPolicy) {
        self.policies
            .write()
            .expect("policy registry lock poisoned")
            .insert(policy.name.clone(), Arc::new(policy));
    }

    /// Swaps the whole policy set at once; readers see either the old set or
    /// the new one.
    pub fn replace(&self, policies: Vec<PluginPolicy>) {
        let next = policies
            .into_iter()
            .map(|p| (p.name.clone(), Arc::new(p)))
            .collect::<HashMap<_, _>>();
        *self.policies.write().expect("policy registry lock poisoned") = next;
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .policies
            .read()
            .expect("policy registry lock poisoned")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.policies
            .read()
            .expect("policy registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PolicyResolver for PolicyRegistry {
    fn resolve(&self, plugin: &str) -> Option<Arc<PluginPolicy>> {
        self.policies
            .read()
            .expect("policy registry lock poisoned")
            .get(plugin)
            .cloned()
    }
}

#[derive(Debug, Default, Deserialize)]
struct PoliciesFile {
    #[serde(default)]
    plugins: BTreeMap<String, RawPolicy>,
}

#[derive(Debug, Deserialize)]
struct RawPolicy {
    #[serde(default)]
    mode: PolicyMode,
    #[serde(default)]
    metrics: BTreeMap<String, MetricDecl>,
    #[serde(default)]
    expr_metrics: Vec<RawExprMetric>,
}

#[derive(Debug, Deserialize)]
struct RawExprMetric {
    name: String,
    #[serde(rename = "type", default)]
    counter_type: CounterType,
    expr: String,
    #[serde(default)]
    comment: String,
}

pub fn load_policies(path: &Path) -> Result<Vec<PluginPolicy>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| ProberError::Io(format!("failed reading {}: {e}", path.display())))?;
    parse_policies(&raw)
        .map_err(|e| ProberError::Config(format!("failed parsing {}: {e}", path.display())))
}

pub fn parse_policies(raw: &str) -> Result<Vec<PluginPolicy>> {
    let parsed: PoliciesFile =
        toml::from_str(raw).map_err(|e| ProberError::Parse(format!("invalid policies: {e}")))?;

    parsed
        .plugins
        .into_iter()
        .map(|(name, raw)| -> Result<PluginPolicy> {
            let expr_metrics = raw
                .expr_metrics
                .into_iter()
                .map(|m| -> Result<ExprMetric> {
                    let formula = Formula::parse(&m.expr).map_err(|e| {
                        ProberError::Parse(format!("plugin {name} expression {}: {e}", m.name))
                    })?;
                    Ok(ExprMetric {
                        name: m.name,
                        counter_type: m.counter_type,
                        comment: m.comment,
                        expr: Arc::new(formula),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(PluginPolicy {
                name,
                mode: raw.mode,
                metrics: raw.metrics,
                expr_metrics,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICIES: &str = r#"
[plugins.mysql]
mode = "blacklist"

[plugins.mysql.metrics]
"mysql.queries" = { type = "COUNTER", comment = "total queries" }

[[plugins.mysql.expr_metrics]]
name = "mysql.hit_ratio"
type = "GAUGE"
expr = "mysql.hits / mysql.reads"

[plugins.demo]
mode = "whitelist"
"#;

    #[test]
    fn parses_policy_file() {
        let policies = parse_policies(POLICIES).unwrap();
        assert_eq!(policies.len(), 2);

        let mysql = policies.iter().find(|p| p.name == "mysql").unwrap();
        assert_eq!(mysql.mode, PolicyMode::Blacklist);
        assert_eq!(
            mysql.metrics["mysql.queries"].counter_type,
            CounterType::Counter
        );
        assert_eq!(mysql.expr_metrics.len(), 1);
        assert_eq!(mysql.expr_metrics[0].name, "mysql.hit_ratio");

        let demo = policies.iter().find(|p| p.name == "demo").unwrap();
        assert!(demo.publishes_nothing());
    }

    #[test]
    fn bad_expression_fails_load() {
        let raw = r#"
[plugins.x]
mode = "whitelist"
[[plugins.x.expr_metrics]]
name = "broken"
expr = "a +"
"#;
        assert!(matches!(parse_policies(raw), Err(ProberError::Parse(_))));
    }

    #[test]
    fn registry_replace_swaps_whole_set() {
        let registry = PolicyRegistry::new();
        registry.insert(PluginPolicy::new("a", PolicyMode::Whitelist));
        assert!(registry.resolve("a").is_some());

        registry.replace(vec![PluginPolicy::new("b", PolicyMode::Blacklist)]);
        assert!(registry.resolve("a").is_none());
        assert_eq!(registry.names(), vec!["b".to_string()]);
    }

    #[test]
    fn mode_parse() {
        assert_eq!(
            PolicyMode::from_str("BlackList").unwrap(),
            PolicyMode::Blacklist
        );
        assert!(PolicyMode::from_str("greylist").is_err());
    }
}
