use std::sync::{Arc, RwLock, RwLockReadGuard};

use tracing::warn;

use crate::error::ProberError;
use crate::model::metric::{CounterType, MetricPoint, TagMap};
use crate::time::unix_now;

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub timestamp: i64,
    pub points: Vec<MetricPoint>,
}

impl Default for Batch {
    fn default() -> Self {
        Self {
            timestamp: unix_now(),
            points: Vec::new(),
        }
    }
}

pub type SharedBatch = Arc<RwLock<Batch>>;

#[derive(Debug, Clone)]
pub struct Accumulator {
    name: String,
    tags: Arc<TagMap>,
    batch: SharedBatch,
}

impl Accumulator {
    pub fn new(name: impl Into<String>, tags: TagMap, batch: SharedBatch) -> Self {
        Self {
            name: name.into(),
            tags: Arc::new(tags),
            batch,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    pub fn batch(&self) -> &SharedBatch {
        &self.batch
    }

    pub fn shares_batch_with(&self, other: &Accumulator) -> bool {
        Arc::ptr_eq(&self.batch, &other.batch)
    }

    pub fn reset(&self, timestamp: i64) {
        let mut batch = self.write();
        batch.points.clear();
        batch.timestamp = timestamp;
    }

    pub fn append(&self, points: impl IntoIterator<Item = MetricPoint>) {
        self.write().points.extend(points);
    }

    pub fn add_gauge(&self, metric: &str, value: f64, tags: &TagMap) {
        self.add(metric, value, CounterType::Gauge, tags);
    }

    pub fn add_counter(&self, metric: &str, value: f64, tags: &TagMap) {
        self.add(metric, value, CounterType::Counter, tags);
    }

    pub fn add_fields(&self, measurement: &str, fields: &[(&str, f64)], tags: &TagMap) {
        let mut batch = self.write();
        let timestamp = batch.timestamp;
        for (field, value) in fields {
            let metric = if measurement.is_empty() {
                (*field).to_string()
            } else {
                format!("{measurement}.{field}")
            };
            batch
                .points
                .push(self.point(metric, *value, CounterType::Gauge, tags, timestamp));
        }
    }

    pub fn add_error(&self, err: &ProberError) {
        warn!(accumulator = %self.name, error = %err, "sampler reported error");
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Batch> {
        self.batch.read().expect("accumulator lock poisoned")
    }

    pub fn snapshot(&self) -> Vec<MetricPoint> {
        self.read().points.clone()
    }

    pub fn len(&self) -> usize {
        self.read().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.read().points.capacity()
    }

    fn add(&self, metric: &str, value: f64, counter_type: CounterType, tags: &TagMap) {
        let mut batch = self.write();
        let timestamp = batch.timestamp;
        let point = self.point(metric.to_string(), value, counter_type, tags, timestamp);
        batch.points.push(point);
    }

    fn point(
        &self,
        metric: String,
        value: f64,
        counter_type: CounterType,
        tags: &TagMap,
        timestamp: i64,
    ) -> MetricPoint {
        let mut tags_map = (*self.tags).clone();
        tags_map.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        MetricPoint {
            nid: String::new(),
            metric,
            timestamp,
            step: 0,
            counter_type,
            tags_map,
            value,
            value_untyped: value,
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Batch> {
        self.batch.write().expect("accumulator lock poisoned")
    }
}
