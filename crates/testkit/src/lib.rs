use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use prober_core::accumulator::Accumulator;
use prober_core::error::{ProberError, Result};
use prober_core::model::metric::{CounterType, MetricPoint, TagMap};
use prober_core::model::rule::RuleDefinition;
use prober_core::policy::{PluginPolicy, PolicyMode, PolicyRegistry};
use prober_core::sampler::{Collector, Sampler};
use serde_json::json;

pub const FAKE_TYPE: &str = "fake";

pub fn definition(id: i64, tags: &str, updated_at: i64) -> RuleDefinition {
    RuleDefinition {
        id,
        nid: 42,
        name: format!("fake rule {id}"),
        collect_type: FAKE_TYPE.to_string(),
        plugin: Some("demo".to_string()),
        step: 60,
        tags: tags.to_string(),
        updated_at,
        data: json!({ "points": { "cpu.busy": 10.0, "mem.used": 512.0 } }),
    }
}

pub fn broken_definition(id: i64, tags: &str, updated_at: i64) -> RuleDefinition {
    RuleDefinition {
        data: json!({ "fail": true }),
        ..definition(id, tags, updated_at)
    }
}

pub fn point(metric: &str, value: f64, ts: i64) -> MetricPoint {
    MetricPoint::gauge(metric, value, ts)
}

pub fn tagged_point(metric: &str, value: f64, ts: i64, tags: &[(&str, &str)]) -> MetricPoint {
    let tags = tags
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<TagMap>();
    MetricPoint::gauge(metric, value, ts).with_tags(tags)
}

pub fn policies(policies: Vec<PluginPolicy>) -> Arc<PolicyRegistry> {
    let registry = PolicyRegistry::new();
    registry.replace(policies);
    Arc::new(registry)
}

pub fn whitelist(plugin: &str, metrics: &[(&str, CounterType)]) -> PluginPolicy {
    with_metrics(PluginPolicy::new(plugin, PolicyMode::Whitelist), metrics)
}

pub fn blacklist(plugin: &str, metrics: &[(&str, CounterType)]) -> PluginPolicy {
    with_metrics(PluginPolicy::new(plugin, PolicyMode::Blacklist), metrics)
}

fn with_metrics(policy: PluginPolicy, metrics: &[(&str, CounterType)]) -> PluginPolicy {
    metrics
        .iter()
        .fold(policy, |p, (name, ct)| p.with_metric(*name, *ct))
}

#[derive(Clone, Default)]
pub struct FakeCollector {
    materialized: Arc<AtomicUsize>,
}

impl FakeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn materialized(&self) -> usize {
        self.materialized.load(Ordering::SeqCst)
    }
}

impl Collector for FakeCollector {
    fn collect_type(&self) -> &str {
        FAKE_TYPE
    }

    fn materialize(&self, rule: &RuleDefinition) -> Result<Arc<dyn Sampler>> {
        if rule.data.get("fail").and_then(|v| v.as_bool()) == Some(true) {
            return Err(ProberError::SamplerConfig(format!(
                "rule {} asked to fail",
                rule.id
            )));
        }
        let points = rule
            .data
            .get("points")
            .and_then(|v| v.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        self.materialized.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSampler {
            generation: rule.updated_at,
            points,
        }))
    }
}

pub struct FakeSampler {
    pub generation: i64,
    pub points: Vec<(String, f64)>,
}

impl Sampler for FakeSampler {
    fn gather(&self, acc: &Accumulator) -> Result<()> {
        let mut tags = TagMap::new();
        tags.insert("sampler_gen".to_string(), self.generation.to_string());
        for (metric, value) in &self.points {
            acc.add_gauge(metric, *value, &tags);
        }
        Ok(())
    }
}
