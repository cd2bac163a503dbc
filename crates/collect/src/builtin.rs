use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use prober_core::accumulator::Accumulator;
use prober_core::error::{ProberError, Result};
use prober_core::model::metric::TagMap;
use prober_core::model::rule::RuleDefinition;
use prober_core::sampler::{Collector, Collectors, Sampler};
use serde::Deserialize;

pub fn builtin_collectors() -> Collectors {
    Collectors::new()
        .with(StaticCollector)
        .with(LoadavgCollector)
}

fn params<T: for<'de> Deserialize<'de>>(rule: &RuleDefinition) -> Result<T> {
    serde_json::from_value(rule.data.clone()).map_err(|e| {
        ProberError::SamplerConfig(format!(
            "rule {} ({}) has invalid data: {e}",
            rule.id, rule.collect_type
        ))
    })
}

pub struct StaticCollector;

#[derive(Debug, Deserialize)]
struct StaticParams {
    metrics: BTreeMap<String, f64>,
    #[serde(default)]
    counters: BTreeMap<String, f64>,
}

struct StaticSampler {
    gauges: Vec<(String, f64)>,
    counters: Vec<(String, f64)>,
}

impl Collector for StaticCollector {
    fn collect_type(&self) -> &str {
        "static"
    }

    fn materialize(&self, rule: &RuleDefinition) -> Result<Arc<dyn Sampler>> {
        let p: StaticParams = params(rule)?;
        if p.metrics.is_empty() && p.counters.is_empty() {
            return Err(ProberError::SamplerConfig(format!(
                "rule {} declares no static metrics",
                rule.id
            )));
        }
        Ok(Arc::new(StaticSampler {
            gauges: p.metrics.into_iter().collect(),
            counters: p.counters.into_iter().collect(),
        }))
    }
}

impl Sampler for StaticSampler {
    fn gather(&self, acc: &Accumulator) -> Result<()> {
        let tags = TagMap::new();
        for (metric, value) in &self.gauges {
            acc.add_gauge(metric, *value, &tags);
        }
        for (metric, value) in &self.counters {
            acc.add_counter(metric, *value, &tags);
        }
        Ok(())
    }
}

pub struct LoadavgCollector;

#[derive(Debug, Default, Deserialize)]
struct LoadavgParams {
    path: Option<PathBuf>,
}

struct LoadavgSampler {
    path: PathBuf,
}

impl Collector for LoadavgCollector {
    fn collect_type(&self) -> &str {
        "loadavg"
    }

    fn materialize(&self, rule: &RuleDefinition) -> Result<Arc<dyn Sampler>> {
        let p: LoadavgParams = if rule.data.is_null() {
            LoadavgParams::default()
        } else {
            params(rule)?
        };
        Ok(Arc::new(LoadavgSampler {
            path: p.path.unwrap_or_else(|| PathBuf::from("/proc/loadavg")),
        }))
    }
}

impl Sampler for LoadavgSampler {
    fn gather(&self, acc: &Accumulator) -> Result<()> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            ProberError::Sample(format!("failed reading {}: {e}", self.path.display()))
        })?;
        let loads = parse_loadavg(&raw)?;
        acc.add_fields(
            "load",
            &[("1min", loads[0]), ("5min", loads[1]), ("15min", loads[2])],
            &TagMap::new(),
        );
        Ok(())
    }
}

fn parse_loadavg(raw: &str) -> Result<[f64; 3]> {
    let mut out = [0.0; 3];
    let mut fields = raw.split_whitespace();
    for slot in &mut out {
        let field = fields
            .next()
            .ok_or_else(|| ProberError::Sample(format!("short loadavg line: {raw}")))?;
        *slot = field
            .parse()
            .map_err(|e| ProberError::Sample(format!("bad loadavg value {field}: {e}")))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use prober_core::accumulator::SharedBatch;
    use prober_core::model::metric::CounterType;
    use prober_core::sampler::CollectorRegistry;
    use serde_json::json;

    use super::*;

    fn rule(collect_type: &str, data: serde_json::Value) -> RuleDefinition {
        RuleDefinition {
            id: 9,
            nid: 1,
            name: String::new(),
            collect_type: collect_type.to_string(),
            plugin: None,
            step: 10,
            tags: String::new(),
            updated_at: 1,
            data,
        }
    }

    fn accumulator() -> Accumulator {
        Accumulator::new("test", TagMap::new(), SharedBatch::default())
    }

    #[test]
    fn static_emits_gauges_and_counters() {
        let sampler = builtin_collectors()
            .materialize(&rule(
                "static",
                json!({ "metrics": { "cpu.busy": 10.0 }, "counters": { "net.in": 7.0 } }),
            ))
            .unwrap();
        let acc = accumulator();
        sampler.gather(&acc).unwrap();

        let points = acc.snapshot();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].metric, "cpu.busy");
        assert_eq!(points[1].counter_type, CounterType::Counter);
    }

    #[test]
    fn static_rejects_bad_data() {
        let collectors = builtin_collectors();
        assert!(matches!(
            collectors.materialize(&rule("static", json!({ "metrics": "nope" }))),
            Err(ProberError::SamplerConfig(_))
        ));
        assert!(matches!(
            collectors.materialize(&rule("static", json!({ "metrics": {} }))),
            Err(ProberError::SamplerConfig(_))
        ));
    }

    #[test]
    fn loadavg_reads_file() {
        let mut file = tempfile_loadavg("0.52 0.58 0.59 1/467 12345\n");
        file.flush().unwrap();
        let sampler = builtin_collectors()
            .materialize(&rule("loadavg", json!({ "path": file.path() })))
            .unwrap();
        let acc = accumulator();
        sampler.gather(&acc).unwrap();

        let names = acc
            .snapshot()
            .into_iter()
            .map(|p| p.metric)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["load.1min", "load.5min", "load.15min"]);
    }

    #[test]
    fn loadavg_missing_file_is_sample_error() {
        let sampler = builtin_collectors()
            .materialize(&rule("loadavg", json!({ "path": "/definitely/not/here" })))
            .unwrap();
        assert!(matches!(
            sampler.gather(&accumulator()),
            Err(ProberError::Sample(_))
        ));
    }

    #[test]
    fn parse_loadavg_rejects_short_lines() {
        assert!(parse_loadavg("0.1 0.2").is_err());
        assert_eq!(parse_loadavg("1 2 3").unwrap(), [1.0, 2.0, 3.0]);
    }

    fn tempfile_loadavg(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }
}
