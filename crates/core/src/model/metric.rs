use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProberError, Result};

pub type TagMap = BTreeMap<String, String>;

/// Points of one batch keyed by metric name. Every point sharing a name is
/// kept, in arrival order.
pub type MetricGroups<'a> = BTreeMap<&'a str, Vec<&'a MetricPoint>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CounterType {
    #[default]
    Gauge,
    Counter,
    Subtract,
}

impl CounterType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "GAUGE",
            Self::Counter => "COUNTER",
            Self::Subtract => "SUBTRACT",
        }
    }
}

impl fmt::Display for CounterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterType {
    type Err = ProberError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GAUGE" => Ok(Self::Gauge),
            "COUNTER" => Ok(Self::Counter),
            "SUBTRACT" => Ok(Self::Subtract),
            _ => Err(ProberError::Parse(format!("unknown counter type: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricPoint {
    pub nid: String,
    pub metric: String,
    pub timestamp: i64,
    pub step: i64,
    pub counter_type: CounterType,
    pub tags_map: TagMap,
    pub value: f64,
    pub value_untyped: f64,
}

impl MetricPoint {
    pub fn gauge(metric: impl Into<String>, value: f64, timestamp: i64) -> Self {
        Self {
            nid: String::new(),
            metric: metric.into(),
            timestamp,
            step: 0,
            counter_type: CounterType::Gauge,
            tags_map: TagMap::new(),
            value,
            value_untyped: value,
        }
    }

    pub fn with_tags(mut self, tags: TagMap) -> Self {
        self.tags_map = tags;
        self
    }
}

pub fn group_by_name(points: &[MetricPoint]) -> MetricGroups<'_> {
    let mut groups = MetricGroups::new();
    for point in points {
        groups.entry(point.metric.as_str()).or_default().push(point);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_type_parse() {
        assert_eq!(CounterType::from_str("gauge").unwrap(), CounterType::Gauge);
        assert_eq!(
            CounterType::from_str("COUNTER").unwrap(),
            CounterType::Counter
        );
        assert!(CounterType::from_str("histogram").is_err());
    }

    #[test]
    fn counter_type_serializes_upper_case() {
        let json = serde_json::to_string(&CounterType::Subtract).unwrap();
        assert_eq!(json, "\"SUBTRACT\"");
    }

    #[test]
    fn grouping_keeps_every_duplicate() {
        let points = vec![
            MetricPoint::gauge("disk.used", 1.0, 10),
            MetricPoint::gauge("cpu.busy", 2.0, 10),
            MetricPoint::gauge("disk.used", 3.0, 10),
        ];
        let groups = group_by_name(&points);
        assert_eq!(groups.len(), 2);
        let disk: Vec<f64> = groups["disk.used"].iter().map(|p| p.value).collect();
        assert_eq!(disk, vec![1.0, 3.0]);
    }
}
