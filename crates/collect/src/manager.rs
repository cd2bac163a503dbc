use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use prober_core::model::rule::RuleDefinition;
use tracing::{info, warn};

use crate::rule::{CollectRule, RuleContext};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
}

pub struct RuleManager {
    ctx: RuleContext,
    rules: RwLock<HashMap<i64, Arc<CollectRule>>>,
}

impl RuleManager {
    pub fn new(ctx: RuleContext) -> Self {
        Self {
            ctx,
            rules: RwLock::new(HashMap::new()),
        }
    }

    pub fn sync(&self, definitions: Vec<RuleDefinition>) -> SyncReport {
        let mut report = SyncReport::default();
        let current = self.rules.read().expect("rule manager lock poisoned").clone();
        let wanted = definitions.iter().map(|d| d.id).collect::<HashSet<_>>();
        let mut created = Vec::new();

        for definition in definitions {
            let id = definition.id;
            match current.get(&id) {
                Some(rule) => {
                    if rule.updated_at() == definition.updated_at {
                        report.unchanged += 1;
                        continue;
                    }
                    match rule.update(definition) {
                        Ok(()) => report.updated += 1,
                        Err(e) => {
                            warn!(rule_id = id, error = %e, "failed to update collect rule");
                            report.failed += 1;
                        }
                    }
                }
                None => match CollectRule::new(definition, self.ctx.clone()) {
                    Ok(rule) => created.push(Arc::new(rule)),
                    Err(e) => {
                        warn!(rule_id = id, error = %e, "failed to create collect rule");
                        report.failed += 1;
                    }
                },
            }
        }

        let mut rules = self.rules.write().expect("rule manager lock poisoned");
        let before = rules.len();
        rules.retain(|id, _| wanted.contains(id));
        report.removed = before - rules.len();
        for rule in created {
            if rules.insert(rule.id(), rule).is_none() {
                report.added += 1;
            }
        }

        if report != SyncReport::default() {
            info!(
                added = report.added,
                updated = report.updated,
                removed = report.removed,
                failed = report.failed,
                total = rules.len(),
                "collect rules synced"
            );
        }
        report
    }

    pub fn get(&self, id: i64) -> Option<Arc<CollectRule>> {
        self.rules
            .read()
            .expect("rule manager lock poisoned")
            .get(&id)
            .cloned()
    }

    pub fn rules(&self) -> Vec<Arc<CollectRule>> {
        let mut rules = self
            .rules
            .read()
            .expect("rule manager lock poisoned")
            .values()
            .cloned()
            .collect::<Vec<_>>();
        rules.sort_by_key(|r| r.id());
        rules
    }

    pub fn len(&self) -> usize {
        self.rules.read().expect("rule manager lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use prober_core::sampler::Collectors;
    use testkit::{FakeCollector, broken_definition, definition, policies};

    use super::*;

    fn manager() -> RuleManager {
        RuleManager::new(RuleContext::new(
            Arc::new(Collectors::new().with(FakeCollector::new())),
            policies(vec![]),
        ))
    }

    #[test]
    fn sync_adds_updates_and_removes() {
        let manager = manager();
        let report = manager.sync(vec![definition(1, "", 1), definition(2, "", 1)]);
        assert_eq!(report.added, 2);
        assert_eq!(manager.len(), 2);

        let report = manager.sync(vec![definition(1, "env=dev", 2)]);
        assert_eq!(
            report,
            SyncReport {
                updated: 1,
                removed: 1,
                ..SyncReport::default()
            }
        );
        assert!(manager.get(2).is_none());
        assert_eq!(manager.get(1).unwrap().tags()["env"], "dev");
    }

    #[test]
    fn sync_keeps_rule_identity_across_updates() {
        let manager = manager();
        manager.sync(vec![definition(1, "", 1)]);
        let before = manager.get(1).unwrap();

        let report = manager.sync(vec![definition(1, "", 1)]);
        assert_eq!(report.unchanged, 1);
        manager.sync(vec![definition(1, "env=dev", 2)]);
        assert!(Arc::ptr_eq(&before, &manager.get(1).unwrap()));
    }

    #[test]
    fn sync_counts_failures_without_stopping() {
        let manager = manager();
        let report = manager.sync(vec![
            broken_definition(1, "", 1),
            definition(2, "bad", 1),
            definition(3, "", 1),
        ]);
        assert_eq!(report.failed, 2);
        assert_eq!(report.added, 1);
        assert_eq!(
            manager.rules().iter().map(|r| r.id()).collect::<Vec<_>>(),
            vec![3]
        );
    }
}
