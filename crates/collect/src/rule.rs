use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use prober_core::accumulator::{Accumulator, SharedBatch};
use prober_core::error::{ProberError, Result};
use prober_core::model::metric::{CounterType, MetricPoint, TagMap, group_by_name};
use prober_core::model::rule::RuleDefinition;
use prober_core::policy::{PolicyMode, PolicyResolver};
use prober_core::sampler::{CollectorRegistry, Sampler};
use prober_core::tags::parse_tags;
use prober_core::time::unix_now;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct RuleContext {
    pub collectors: Arc<dyn CollectorRegistry>,
    pub policies: Arc<dyn PolicyResolver>,
}

impl RuleContext {
    pub fn new(
        collectors: Arc<dyn CollectorRegistry>,
        policies: Arc<dyn PolicyResolver>,
    ) -> Self {
        Self {
            collectors,
            policies,
        }
    }
}

#[derive(Clone)]
pub struct RuleView {
    pub definition: Arc<RuleDefinition>,
    pub tags: Arc<TagMap>,
    pub sampler: Arc<dyn Sampler>,
    pub accumulator: Accumulator,
}

pub struct CollectRule {
    id: i64,
    ctx: RuleContext,
    state: RwLock<RuleView>,
}

impl CollectRule {
    pub fn new(definition: RuleDefinition, ctx: RuleContext) -> Result<Self> {
        let sampler = ctx.collectors.materialize(&definition)?;
        let tags = parse_tags(&definition.tags)?;
        let accumulator = Accumulator::new(
            definition.accumulator_name(),
            tags.clone(),
            SharedBatch::default(),
        );

        Ok(Self {
            id: definition.id,
            ctx,
            state: RwLock::new(RuleView {
                definition: Arc::new(definition),
                tags: Arc::new(tags),
                sampler,
                accumulator,
            }),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn view(&self) -> RuleView {
        self.read_state().clone()
    }

    pub fn definition(&self) -> Arc<RuleDefinition> {
        Arc::clone(&self.read_state().definition)
    }

    pub fn updated_at(&self) -> i64 {
        self.read_state().definition.updated_at
    }

    pub fn tags(&self) -> Arc<TagMap> {
        Arc::clone(&self.read_state().tags)
    }

    pub fn sampler(&self) -> Arc<dyn Sampler> {
        Arc::clone(&self.read_state().sampler)
    }

    pub fn reset(&self) {
        self.reset_at(unix_now());
    }

    pub fn reset_at(&self, timestamp: i64) {
        let state = self.write_state();
        state.accumulator.reset(timestamp);
    }

    pub fn metrics(&self) -> Vec<MetricPoint> {
        let state = self.read_state();
        state.accumulator.snapshot()
    }

    /// Runs the current sampler against the current accumulator. The lock is
    /// released before sampling so a slow sampler never blocks `update`.
    pub fn collect(&self) -> Result<()> {
        let (sampler, accumulator) = {
            let state = self.read_state();
            (Arc::clone(&state.sampler), state.accumulator.clone())
        };
        sampler
            .gather(&accumulator)
            .inspect_err(|e| accumulator.add_error(e))
    }

    pub fn prepare_metrics(&self) -> Vec<MetricPoint> {
        let state = self.read_state();
        let batch = state.accumulator.read();
        let Some(first) = batch.points.first() else {
            return Vec::new();
        };

        let definition = &state.definition;
        let plugin = definition.plugin_name();
        let Some(policy) = self.ctx.policies.resolve(plugin) else {
            debug!(rule_id = self.id, plugin, "no policy registered, publishing nothing");
            return Vec::new();
        };
        if policy.publishes_nothing() {
            return Vec::new();
        }

        let ts = first.timestamp;
        let nid = definition.nid.to_string();
        let groups = group_by_name(&batch.points);
        let mut out = Vec::with_capacity(policy.expr_metrics.len() + batch.points.len());

        for metric in &policy.expr_metrics {
            let value = match metric.expr.evaluate(&groups) {
                Ok(v) => v,
                Err(e) => {
                    debug!(
                        rule_id = self.id,
                        metric = %metric.name,
                        error = %e,
                        "skipping derived metric"
                    );
                    continue;
                }
            };
            out.push(MetricPoint {
                nid: nid.clone(),
                metric: metric.name.clone(),
                timestamp: ts,
                step: definition.step,
                counter_type: metric.counter_type,
                tags_map: (*state.tags).clone(),
                value,
                value_untyped: value,
            });
        }

        for (name, points) in &groups {
            let counter_type = match policy.metrics.get(*name) {
                Some(decl) => decl.counter_type,
                None if policy.mode == PolicyMode::Whitelist => continue,
                None => CounterType::Gauge,
            };
            for point in points {
                out.push(MetricPoint {
                    nid: nid.clone(),
                    metric: (*name).to_string(),
                    timestamp: ts,
                    step: definition.step,
                    counter_type,
                    tags_map: point.tags_map.clone(),
                    value: point.value,
                    value_untyped: point.value_untyped,
                });
            }
        }

        out
    }

    pub fn update(&self, definition: RuleDefinition) -> Result<()> {
        if definition.id != self.id {
            return Err(ProberError::Internal(format!(
                "rule {} cannot take definition of rule {}",
                self.id, definition.id
            )));
        }
        if self.updated_at() == definition.updated_at {
            return Ok(());
        }

        debug!(
            rule_id = self.id,
            collect_type = %definition.collect_type,
            updated_at = definition.updated_at,
            "updating collect rule"
        );

        let sampler = match self.ctx.collectors.materialize(&definition) {
            Ok(sampler) => Some(sampler),
            Err(e) => {
                warn!(
                    rule_id = self.id,
                    collect_type = %definition.collect_type,
                    error = %e,
                    "failed to rebuild sampler, keeping previous one"
                );
                None
            }
        };
        let tags = parse_tags(&definition.tags)?;

        let mut state = self.write_state();
        if state.definition.updated_at == definition.updated_at {
            return Ok(());
        }
        let accumulator = Accumulator::new(
            definition.accumulator_name(),
            tags.clone(),
            Arc::clone(state.accumulator.batch()),
        );
        let sampler = sampler.unwrap_or_else(|| Arc::clone(&state.sampler));
        *state = RuleView {
            definition: Arc::new(definition),
            tags: Arc::new(tags),
            sampler,
            accumulator,
        };
        Ok(())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RuleView> {
        self.state.read().expect("collect rule lock poisoned")
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RuleView> {
        self.state.write().expect("collect rule lock poisoned")
    }
}
