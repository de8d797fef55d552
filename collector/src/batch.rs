//! Resumable batch processing over a master list of work items.
//!
//! The checkpoint is loaded once, diffed against the master list by code and
//! extended chunk by chunk. It is persisted after every chunk, so a restart
//! resumes at the first item of the chunk that was in flight.

use crate::aggregate::Aggregator;
use crate::connectors::ClimateLookup;
use crate::model::{BatchSummary, Enrichment, WorkItem};
use crate::store::CheckpointStore;
use async_trait::async_trait;
use collector_core::Result;
use metrics::counter;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Produces the enrichment for one work item. Failures are reported inside
/// the returned `Enrichment`, never as errors.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, item: &WorkItem) -> Enrichment;
}

/// Master-list items whose code is not yet in the checkpoint, in master-list order.
pub fn unprocessed(master: &[WorkItem], done: &[WorkItem]) -> Vec<WorkItem> {
    let done: HashSet<&str> = done.iter().map(|item| item.code.as_str()).collect();
    master
        .iter()
        .filter(|item| !done.contains(item.code.as_str()))
        .cloned()
        .collect()
}

pub struct BatchProcessor {
    processor: Arc<dyn ItemProcessor>,
    store: Arc<dyn CheckpointStore>,
    chunk_size: usize,
}

impl BatchProcessor {
    pub fn new(
        processor: Arc<dyn ItemProcessor>,
        store: Arc<dyn CheckpointStore>,
        chunk_size: usize,
    ) -> Self {
        Self {
            processor,
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    #[instrument(skip_all, fields(run_id = %Uuid::new_v4(), mode = self.processor.name()))]
    pub async fn run(&self, master: &[WorkItem]) -> Result<BatchSummary> {
        let started = Instant::now();

        let mut checkpoint = self.store.load().await?;
        let pending = unprocessed(master, &checkpoint);

        let mut summary = BatchSummary {
            total: master.len(),
            already_processed: master.len() - pending.len(),
            ..BatchSummary::default()
        };

        info!(
            total = summary.total,
            already_processed = summary.already_processed,
            pending = pending.len(),
            "Loaded checkpoint"
        );

        if pending.is_empty() {
            info!("All items are already processed");
            return Ok(summary);
        }

        let chunks = pending.len().div_ceil(self.chunk_size);
        for (index, chunk) in pending.chunks(self.chunk_size).enumerate() {
            for item in chunk {
                debug!(code = %item.code, name = %item.name, "Processing item");
                let enrichment = self.processor.process(item).await;
                if enrichment.has_failures() {
                    summary.with_failures += 1;
                    warn!(code = %item.code, "Item recorded with failures");
                }

                let mut item = item.clone();
                enrichment.apply(&mut item);
                checkpoint.push(item);
                summary.processed += 1;
                counter!("collector_batch_items_total").increment(1);
            }

            // A failed write must stop the run: the next chunk would build on unsaved state.
            self.store.save(&checkpoint).await?;
            summary.chunks_persisted += 1;

            info!(
                chunk = index + 1,
                chunks,
                processed = summary.processed,
                checkpoint_size = checkpoint.len(),
                "Chunk persisted"
            );
        }

        info!(
            processed = summary.processed,
            with_failures = summary.with_failures,
            chunks = summary.chunks_persisted,
            elapsed_secs = started.elapsed().as_secs(),
            "Batch completed"
        );

        Ok(summary)
    }
}

/// Adds `elevation`, `timezone` and monthly `climate` normals for the item's coordinates.
pub struct ClimateProcessor {
    climate: Arc<dyn ClimateLookup>,
}

impl ClimateProcessor {
    pub fn new(climate: Arc<dyn ClimateLookup>) -> Self {
        Self { climate }
    }
}

#[async_trait]
impl ItemProcessor for ClimateProcessor {
    fn name(&self) -> &'static str {
        "climate"
    }

    async fn process(&self, item: &WorkItem) -> Enrichment {
        let at = item.coordinates();
        let mut enrichment = Enrichment::default();

        match self.climate.location_meta(at).await {
            Ok(meta) => {
                enrichment.set("elevation", json!(meta.elevation));
                enrichment.set("timezone", json!(meta.timezone));
            }
            Err(e) => {
                warn!(code = %item.code, error = %e, "Forecast lookup failed");
                enrichment.fail("elevation");
                enrichment.fail("timezone");
            }
        }

        match self.climate.monthly_climate(at).await {
            Ok(months) => enrichment.set("climate", json!(months)),
            Err(e) => {
                warn!(code = %item.code, error = %e, "Climate lookup failed");
                enrichment.fail("climate");
            }
        }

        enrichment
    }
}

/// Runs the full aggregation for each item and merges the record's sections into it.
pub struct AggregateProcessor {
    aggregator: Arc<Aggregator>,
}

impl AggregateProcessor {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }
}

#[async_trait]
impl ItemProcessor for AggregateProcessor {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    async fn process(&self, item: &WorkItem) -> Enrichment {
        let mut enrichment = Enrichment::default();

        let record = match self.aggregator.aggregate(&item.name, item.country()).await {
            Ok(record) => record,
            Err(e) => {
                warn!(code = %item.code, error = %e, "Aggregation aborted");
                enrichment.error(e.to_string());
                return enrichment;
            }
        };

        for (section, value) in record.sections {
            enrichment.set(&section, value);
        }
        for error in &record.errors {
            // nested failures such as `geography.elevation` stay in `errors` only
            if !error.section.contains('.') {
                enrichment.fail(&error.section);
            }
        }
        if !record.errors.is_empty() {
            enrichment.set("errors", json!(record.errors));
        }

        enrichment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::open_meteo::{LocationMeta, MonthlyClimate};
    use crate::model::Coordinates;
    use crate::testing::{hit, sections, Behavior, FakeElevation, FakeGeocoder, FakeSection};
    use collector_core::config::AggregateConfig;
    use collector_core::Error;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Checkpoint store kept in memory; can be told to fail a given save.
    #[derive(Default)]
    struct MemoryStore {
        items: Mutex<Vec<WorkItem>>,
        saves: Mutex<Vec<usize>>,
        fail_on_save: Mutex<Option<usize>>,
    }

    impl MemoryStore {
        fn with(items: Vec<WorkItem>) -> Self {
            Self {
                items: Mutex::new(items),
                ..Default::default()
            }
        }

        fn codes(&self) -> Vec<String> {
            self.items.lock().unwrap().iter().map(|i| i.code.clone()).collect()
        }

        fn save_sizes(&self) -> Vec<usize> {
            self.saves.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CheckpointStore for MemoryStore {
        async fn load(&self) -> Result<Vec<WorkItem>> {
            Ok(self.items.lock().unwrap().clone())
        }

        async fn save(&self, items: &[WorkItem]) -> Result<()> {
            let attempt = self.saves.lock().unwrap().len() + 1;
            if *self.fail_on_save.lock().unwrap() == Some(attempt) {
                *self.fail_on_save.lock().unwrap() = None;
                return Err(Error::Persistence {
                    path: "memory".into(),
                    details: "disk full".into(),
                });
            }
            self.saves.lock().unwrap().push(items.len());
            *self.items.lock().unwrap() = items.to_vec();
            Ok(())
        }
    }

    /// Records every processed code; fails items whose code is listed.
    #[derive(Default)]
    struct RecordingProcessor {
        seen: Mutex<Vec<String>>,
        failing: Vec<&'static str>,
    }

    #[async_trait]
    impl ItemProcessor for RecordingProcessor {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn process(&self, item: &WorkItem) -> Enrichment {
            self.seen.lock().unwrap().push(item.code.clone());
            let mut enrichment = Enrichment::default();
            if self.failing.iter().any(|code| *code == item.code) {
                enrichment.fail("climate");
            } else {
                enrichment.set("timezone", json!("UTC"));
            }
            enrichment
        }
    }

    fn items(codes: &[&str]) -> Vec<WorkItem> {
        codes
            .iter()
            .map(|code| WorkItem::new(*code, format!("Airport {code}"), 1.0, 2.0))
            .collect()
    }

    fn batch(
        processor: &Arc<RecordingProcessor>,
        store: &Arc<MemoryStore>,
        chunk_size: usize,
    ) -> BatchProcessor {
        let processor: Arc<dyn ItemProcessor> = processor.clone();
        let store: Arc<dyn CheckpointStore> = store.clone();
        BatchProcessor::new(processor, store, chunk_size)
    }

    #[test]
    fn diff_keeps_master_order() {
        let master = items(&["A", "B", "C", "D"]);
        let done = items(&["C", "A"]);
        let pending: Vec<String> = unprocessed(&master, &done).into_iter().map(|i| i.code).collect();
        assert_eq!(pending, vec!["B", "D"]);
    }

    #[test]
    fn diff_skips_already_processed() {
        let pending = unprocessed(&items(&["A", "B"]), &items(&["A"]));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].code, "B");
    }

    #[tokio::test]
    async fn persists_once_per_chunk() {
        let processor = Arc::new(RecordingProcessor::default());
        let store = Arc::new(MemoryStore::default());

        let summary = batch(&processor, &store, 1).run(&items(&["A", "B"])).await.unwrap();

        assert_eq!(store.codes(), vec!["A", "B"]);
        assert_eq!(store.save_sizes(), vec![1, 2]);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.chunks_persisted, 2);
    }

    #[tokio::test]
    async fn last_chunk_may_be_short() {
        let processor = Arc::new(RecordingProcessor::default());
        let store = Arc::new(MemoryStore::default());

        batch(&processor, &store, 10)
            .run(&items(&["A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L"]))
            .await
            .unwrap();

        assert_eq!(store.save_sizes(), vec![10, 12]);
    }

    #[tokio::test]
    async fn rerun_after_full_run_is_a_no_op() {
        let processor = Arc::new(RecordingProcessor::default());
        let store = Arc::new(MemoryStore::default());
        let master = items(&["A", "B", "C"]);
        batch(&processor, &store, 2).run(&master).await.unwrap();

        let summary = batch(&processor, &store, 2).run(&master).await.unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.already_processed, 3);
        assert_eq!(store.save_sizes().len(), 2);
        assert_eq!(processor.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failures_are_recorded_not_thrown() {
        let processor = Arc::new(RecordingProcessor {
            failing: vec!["B"],
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::default());

        let summary = batch(&processor, &store, 10).run(&items(&["A", "B"])).await.unwrap();

        assert_eq!(summary.with_failures, 1);
        let saved = store.items.lock().unwrap().clone();
        assert_eq!(saved[1].extra.get("climate"), Some(&serde_json::Value::Null));
        assert_eq!(saved[0].extra.get("timezone"), Some(&json!("UTC")));
    }

    #[tokio::test]
    async fn resumes_at_interrupted_chunk_after_persist_failure() {
        let master = items(&["A", "B", "C", "D", "E"]);
        let store = Arc::new(MemoryStore::default());
        *store.fail_on_save.lock().unwrap() = Some(2);

        let first = Arc::new(RecordingProcessor::default());
        let err = batch(&first, &store, 2).run(&master).await.unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        // the third chunk never started
        assert_eq!(*first.seen.lock().unwrap(), vec!["A", "B", "C", "D"]);
        assert_eq!(store.codes(), vec!["A", "B"]);

        let second = Arc::new(RecordingProcessor::default());
        let summary = batch(&second, &store, 2).run(&master).await.unwrap();

        assert_eq!(*second.seen.lock().unwrap(), vec!["C", "D", "E"]);
        assert_eq!(summary.already_processed, 2);
        assert_eq!(store.codes(), vec!["A", "B", "C", "D", "E"]);
    }

    #[tokio::test]
    async fn checkpoint_entries_outside_master_are_kept() {
        let store = Arc::new(MemoryStore::with(items(&["Z"])));
        let processor = Arc::new(RecordingProcessor::default());

        batch(&processor, &store, 5).run(&items(&["A"])).await.unwrap();

        assert_eq!(store.codes(), vec!["Z", "A"]);
    }

    struct FakeClimate {
        meta_fails: bool,
        climate_fails: bool,
    }

    #[async_trait]
    impl ClimateLookup for FakeClimate {
        async fn location_meta(&self, _at: Coordinates) -> Result<LocationMeta> {
            if self.meta_fails {
                return Err(Error::Internal("HTTP 429 Too Many Requests".into()));
            }
            Ok(LocationMeta {
                elevation: Some(112.0),
                timezone: Some("Europe/Vilnius".into()),
            })
        }

        async fn monthly_climate(&self, _at: Coordinates) -> Result<Vec<MonthlyClimate>> {
            if self.climate_fails {
                return Err(Error::Internal("connection reset".into()));
            }
            Ok(vec![MonthlyClimate { month: 1, avg_temp: Some(-4.2), total_precip: 41.0 }])
        }
    }

    async fn enrich(processor: &dyn ItemProcessor, item: &WorkItem) -> (WorkItem, bool) {
        let enrichment = processor.process(item).await;
        let failed = enrichment.has_failures();
        let mut item = item.clone();
        enrichment.apply(&mut item);
        (item, failed)
    }

    fn vilnius() -> WorkItem {
        let mut item = WorkItem::new("VNO", "Vilnius", 54.63, 25.28);
        item.extra.insert("country".into(), json!("Lithuania"));
        item
    }

    fn aggregate_processor(
        geocoder: FakeGeocoder,
        elevation: FakeElevation,
        fakes: Vec<Arc<FakeSection>>,
    ) -> AggregateProcessor {
        AggregateProcessor::new(Arc::new(Aggregator::new(
            Arc::new(geocoder),
            Arc::new(elevation),
            sections(fakes),
            &AggregateConfig { max_concurrency: 2, deadline_secs: 60, tourism_enabled: false },
        )))
    }

    #[tokio::test]
    async fn climate_mode_writes_lookups() {
        let processor = ClimateProcessor::new(Arc::new(FakeClimate {
            meta_fails: false,
            climate_fails: false,
        }));

        let (item, failed) = enrich(&processor, &vilnius()).await;

        assert!(!failed);
        assert_eq!(item.extra["elevation"], json!(112.0));
        assert_eq!(item.extra["timezone"], json!("Europe/Vilnius"));
        assert_eq!(item.extra["climate"][0]["month"], json!(1));
        assert_eq!(item.extra["country"], json!("Lithuania"));
    }

    #[tokio::test]
    async fn climate_mode_nulls_every_failed_key() {
        let processor = ClimateProcessor::new(Arc::new(FakeClimate {
            meta_fails: true,
            climate_fails: true,
        }));

        let (item, failed) = enrich(&processor, &vilnius()).await;

        assert!(failed);
        for key in ["elevation", "timezone", "climate"] {
            assert_eq!(item.extra.get(key), Some(&serde_json::Value::Null), "{key}");
        }
    }

    #[tokio::test]
    async fn aggregate_mode_merges_sections_and_nulls_failed_ones() {
        let processor = aggregate_processor(
            FakeGeocoder::found(hit(None, Some("LT"))),
            FakeElevation { fail: true, ..Default::default() },
            vec![
                FakeSection::new("weather", Behavior::Value(json!({"temp": 4.5}))),
                FakeSection::new("economy", Behavior::Fail),
            ],
        );

        let (item, failed) = enrich(&processor, &vilnius()).await;

        assert!(failed);
        assert_eq!(item.extra["weather"], json!({"temp": 4.5}));
        assert_eq!(item.extra["economy"], serde_json::Value::Null);
        assert!(item.extra["geography"].is_object());
        assert!(!item.extra.contains_key("geography.elevation"));
        let sections: Vec<&str> = item.extra["errors"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["section"].as_str())
            .collect();
        assert_eq!(sections, vec!["geography.elevation", "economy"]);
    }

    #[tokio::test]
    async fn aggregate_mode_records_geocoding_failure_as_error_key() {
        let weather = FakeSection::new("weather", Behavior::Value(json!({})));
        let processor = aggregate_processor(
            FakeGeocoder::failing(),
            FakeElevation::default(),
            vec![weather.clone()],
        );

        let (item, failed) = enrich(&processor, &vilnius()).await;

        assert!(failed);
        assert!(item.extra["error"].as_str().unwrap().contains("Vilnius"));
        assert!(!item.extra.contains_key("weather"));
        assert_eq!(weather.calls(), 0);
    }

    #[tokio::test]
    async fn aggregate_mode_runs_through_batch() {
        let processor: Arc<dyn ItemProcessor> = Arc::new(aggregate_processor(
            FakeGeocoder::found(hit(Some("112"), Some("LT"))),
            FakeElevation::default(),
            vec![FakeSection::new("weather", Behavior::Value(json!({"temp": 1.0})))],
        ));
        let store = Arc::new(MemoryStore::default());
        let checkpoint: Arc<dyn CheckpointStore> = store.clone();

        let summary = BatchProcessor::new(processor, checkpoint, 1)
            .run(&items(&["VNO", "KUN"]))
            .await
            .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.with_failures, 0);
        let saved = store.items.lock().unwrap().clone();
        assert!(saved.iter().all(|item| item.extra["weather"] == json!({"temp": 1.0})));
    }

    proptest! {
        #[test]
        fn diff_partitions_master_list(
            codes in prop::collection::btree_set("[A-Z]{3}", 0..40),
            done_mask in prop::collection::vec(any::<bool>(), 40),
        ) {
            let codes: Vec<&str> = codes.iter().map(String::as_str).collect();
            let master = items(&codes);
            let done: Vec<WorkItem> = master
                .iter()
                .zip(&done_mask)
                .filter(|(_, done)| **done)
                .map(|(item, _)| item.clone())
                .collect();

            let pending = unprocessed(&master, &done);

            prop_assert_eq!(pending.len() + done.len(), master.len());
            prop_assert!(pending.iter().all(|p| !done.iter().any(|d| d.code == p.code)));
            let positions: Vec<usize> = pending
                .iter()
                .map(|p| master.iter().position(|m| m.code == p.code).unwrap())
                .collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn second_run_processes_nothing(
            codes in prop::collection::btree_set("[A-Z]{2}", 1..25),
            chunk_size in 1usize..7,
        ) {
            let codes: Vec<&str> = codes.iter().map(String::as_str).collect();
            let master = items(&codes);
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

            let (first, second) = runtime.block_on(async {
                let store = Arc::new(MemoryStore::default());
                let processor = Arc::new(RecordingProcessor::default());
                let first = batch(&processor, &store, chunk_size).run(&master).await.unwrap();
                let second = batch(&processor, &store, chunk_size).run(&master).await.unwrap();
                (first, second)
            });

            prop_assert_eq!(first.processed, master.len());
            prop_assert_eq!(first.chunks_persisted, master.len().div_ceil(chunk_size));
            prop_assert_eq!(second.processed, 0);
            prop_assert_eq!(second.chunks_persisted, 0);
        }
    }
}
