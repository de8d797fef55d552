use crate::aggregate::Aggregator;
use crate::batch::{AggregateProcessor, BatchProcessor, ClimateProcessor, ItemProcessor};
use crate::connectors::{
    default_sections, nominatim::NominatimGeocoder, open_elevation::OpenElevation,
    open_meteo::OpenMeteoClimate,
};
use crate::model::BatchSummary;
use crate::store::{self, CheckpointStore, JsonFileStore};
use clap::ValueEnum;
use collector_core::{Config, Result, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

/// What the batch run adds to each master-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BatchMode {
    /// Elevation, timezone and monthly climate normals
    Climate,
    /// The full multi-source record
    Aggregate,
}

pub struct App {
    config: Config,
    transport: Arc<Transport>,
    aggregator: Arc<Aggregator>,
}

impl App {
    #[instrument(skip(config))]
    pub fn new(config: Config) -> Result<Self> {
        info!("Initializing application");

        let transport = Arc::new(Transport::new(&config.http)?);

        let aggregator = Arc::new(Aggregator::new(
            Arc::new(NominatimGeocoder::new(Arc::clone(&transport))),
            Arc::new(OpenElevation::new(Arc::clone(&transport))),
            default_sections(&transport, config.aggregate.tourism_enabled),
            &config.aggregate,
        ));

        Ok(Self {
            config,
            transport,
            aggregator,
        })
    }

    /// Aggregates one place and writes the record under the output directory.
    pub async fn run_fetch(&self, place: &str, country: &str) -> Result<PathBuf> {
        let record = self.aggregator.aggregate(place, Some(country)).await?;
        let path = store::save_record(&record, &self.config.output.dir).await?;
        info!(path = %path.display(), errors = record.errors.len(), "Record saved");
        Ok(path)
    }

    pub async fn run_batch(&self, mode: BatchMode) -> Result<BatchSummary> {
        let batch = &self.config.batch;
        let master = store::load_master_list(&batch.master_list).await?;

        let processor: Arc<dyn ItemProcessor> = match mode {
            BatchMode::Climate => Arc::new(ClimateProcessor::new(Arc::new(OpenMeteoClimate::new(
                Arc::clone(&self.transport),
            )))),
            BatchMode::Aggregate => Arc::new(AggregateProcessor::new(Arc::clone(&self.aggregator))),
        };
        let checkpoint: Arc<dyn CheckpointStore> = Arc::new(JsonFileStore::new(&batch.checkpoint));

        info!(
            master = %batch.master_list.display(),
            checkpoint = %batch.checkpoint.display(),
            chunk_size = batch.chunk_size,
            ?mode,
            "Starting batch"
        );

        BatchProcessor::new(processor, checkpoint, batch.chunk_size)
            .run(&master)
            .await
    }
}
