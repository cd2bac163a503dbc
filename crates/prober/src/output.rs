use chrono::{DateTime, SecondsFormat};
use prober_collect::RuleManager;
use prober_core::model::metric::MetricPoint;
use prober_core::policy::{PolicyRegistry, PolicyResolver};
use prober_core::tags::format_tags;

pub fn print_points(points: &[MetricPoint], json: bool) -> anyhow::Result<()> {
    if json {
        for point in points {
            println!("{}", serde_json::to_string(point)?);
        }
    } else {
        print_points_human(points);
    }
    Ok(())
}

pub fn print_points_human(points: &[MetricPoint]) {
    for p in points {
        let ts = DateTime::from_timestamp(p.timestamp, 0)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| p.timestamp.to_string());
        println!(
            "{ts} nid={} {} {} {} step={} {}",
            p.nid,
            p.metric,
            p.value,
            p.counter_type,
            p.step,
            format_tags(&p.tags_map)
        );
    }
}

pub fn print_check_human(manager: &RuleManager, policies: &PolicyRegistry) {
    println!("rules={}", manager.len());
    for rule in manager.rules() {
        let def = rule.definition();
        let plugin = def.plugin_name();
        let policy = match policies.resolve(plugin) {
            Some(p) => format!(
                "{} metrics={} exprs={}",
                p.mode,
                p.metrics.len(),
                p.expr_metrics.len()
            ),
            None => "missing".to_string(),
        };
        println!(
            "  rule={} type={} plugin={} step={} tags={} policy={}",
            def.id,
            def.collect_type,
            plugin,
            def.step,
            format_tags(&rule.tags()),
            policy
        );
    }
    println!("policies={}", policies.names().join(","));
}
