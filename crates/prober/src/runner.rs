use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use prober_collect::{RuleContext, RuleManager, SyncReport, builtin_collectors};
use prober_core::config::Config;
use prober_core::error::Result;
use prober_core::model::metric::MetricPoint;
use prober_core::policy::{PolicyRegistry, load_policies};
use prober_core::rules::load_rules;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct Runner {
    manager: RuleManager,
    policies: Arc<PolicyRegistry>,
    rules_path: PathBuf,
    policies_path: PathBuf,
}

impl Runner {
    pub fn load(cfg: &Config) -> Result<Self> {
        let policies = Arc::new(PolicyRegistry::load(&cfg.policies_path)?);
        let ctx = RuleContext::new(Arc::new(builtin_collectors()), policies.clone());
        let manager = RuleManager::new(ctx);
        manager.sync(load_rules(&cfg.rules_path)?);

        info!(
            rules = manager.len(),
            policies = policies.len(),
            "prober loaded"
        );

        Ok(Self {
            manager,
            policies,
            rules_path: cfg.rules_path.clone(),
            policies_path: cfg.policies_path.clone(),
        })
    }

    pub fn manager(&self) -> &RuleManager {
        &self.manager
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    /// Both files must parse before either is applied.
    pub fn reload(&self) -> Result<SyncReport> {
        let policies = load_policies(&self.policies_path)?;
        let rules = load_rules(&self.rules_path)?;
        self.policies.replace(policies);
        Ok(self.manager.sync(rules))
    }

    pub fn run_cycle(&self) -> Vec<MetricPoint> {
        let mut published = Vec::new();
        for rule in self.manager.rules() {
            rule.reset();
            let sampled = rule.collect().is_ok();
            let points = rule.prepare_metrics();
            debug!(
                rule_id = rule.id(),
                sampled,
                raw = rule.metrics().len(),
                published = points.len(),
                "cycle finished"
            );
            published.extend(points);
        }
        published
    }

    pub async fn run<F>(
        &self,
        collect_interval: Duration,
        reload_interval: Duration,
        mut sink: F,
        shutdown: impl Future<Output = ()>,
    ) where
        F: FnMut(&[MetricPoint]),
    {
        let mut collect = tokio::time::interval(collect_interval);
        collect.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reload = tokio::time::interval(reload_interval);
        reload.set_missed_tick_behavior(MissedTickBehavior::Delay);
        reload.tick().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = collect.tick() => {
                    let points = self.run_cycle();
                    sink(&points);
                }
                _ = reload.tick() => {
                    if let Err(e) = self.reload() {
                        warn!(error = %e, "reload failed, keeping current rules and policies");
                    }
                }
                _ = &mut shutdown => {
                    info!("shutting down");
                    break;
                }
            }
        }
    }
}
