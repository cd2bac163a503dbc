use std::collections::HashMap;
use std::sync::Arc;

use crate::accumulator::Accumulator;
use crate::error::{ProberError, Result};
use crate::model::rule::RuleDefinition;

pub trait Sampler: Send + Sync {
    fn gather(&self, acc: &Accumulator) -> Result<()>;
}

pub trait Collector: Send + Sync {
    fn collect_type(&self) -> &str;

    fn materialize(&self, rule: &RuleDefinition) -> Result<Arc<dyn Sampler>>;
}

pub trait CollectorRegistry: Send + Sync {
    fn collector(&self, collect_type: &str) -> Option<Arc<dyn Collector>>;

    fn materialize(&self, rule: &RuleDefinition) -> Result<Arc<dyn Sampler>> {
        let collector = self
            .collector(&rule.collect_type)
            .ok_or_else(|| ProberError::UnknownCollector(rule.collect_type.clone()))?;
        collector.materialize(rule)
    }
}

#[derive(Clone, Default)]
pub struct Collectors {
    by_type: HashMap<String, Arc<dyn Collector>>,
}

impl Collectors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, collector: impl Collector + 'static) -> Self {
        self.register(collector);
        self
    }

    pub fn register(&mut self, collector: impl Collector + 'static) {
        self.by_type
            .insert(collector.collect_type().to_string(), Arc::new(collector));
    }

    pub fn types(&self) -> Vec<&str> {
        let mut types = self.by_type.keys().map(String::as_str).collect::<Vec<_>>();
        types.sort_unstable();
        types
    }
}

impl CollectorRegistry for Collectors {
    fn collector(&self, collect_type: &str) -> Option<Arc<dyn Collector>> {
        self.by_type.get(collect_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Sampler for Noop {
        fn gather(&self, _acc: &Accumulator) -> Result<()> {
            Ok(())
        }
    }

    struct NoopCollector;

    impl Collector for NoopCollector {
        fn collect_type(&self) -> &str {
            "noop"
        }

        fn materialize(&self, _rule: &RuleDefinition) -> Result<Arc<dyn Sampler>> {
            Ok(Arc::new(Noop))
        }
    }

    fn rule(collect_type: &str) -> RuleDefinition {
        RuleDefinition {
            id: 1,
            nid: 1,
            name: String::new(),
            collect_type: collect_type.to_string(),
            plugin: None,
            step: 10,
            tags: String::new(),
            updated_at: 1,
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn materializes_registered_type() {
        let collectors = Collectors::new().with(NoopCollector);
        assert!(collectors.materialize(&rule("noop")).is_ok());
        assert_eq!(collectors.types(), vec!["noop"]);
    }

    #[test]
    fn unknown_type_is_unknown_collector() {
        let collectors = Collectors::new();
        assert!(matches!(
            collectors.materialize(&rule("snmp")),
            Err(ProberError::UnknownCollector(t)) if t == "snmp"
        ));
    }
}
