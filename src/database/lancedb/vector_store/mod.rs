
use super::{Distance, PointPayload, ScoredPoint, SearchResult};
use crate::{RagError, Result, config::Config};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use futures::TryStreamExt;
use lancedb::{
    Connection, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const DISTANCE_METADATA_KEY: &str = "distance";

/// A named LanceDB collection of fixed-dimension points
#[derive(Clone)]
pub struct VectorStore {
    connection: Connection,
    collection: String,
    dimension: usize,
    distance: Distance,
}

impl VectorStore {
    /// Connect to the store described by the configuration and make sure the
    /// collection exists
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(
            &config.vector_store_uri(),
            &config.vector_store.collection,
            config.embedding.dimension,
            config.vector_store.distance,
        )
        .await
    }

    /// Connect to `uri` and ensure `collection` exists with the given shape
    #[inline]
    pub async fn open(
        uri: &str,
        collection: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<Self> {
        debug!("Connecting to LanceDB at: {}", uri);

        // Plain paths are local directories that may not exist yet
        if !uri.contains("://") {
            std::fs::create_dir_all(uri).map_err(|e| {
                RagError::StoreUnavailable(format!(
                    "Failed to create vector database directory {}: {}",
                    uri, e
                ))
            })?;
        }

        let connection = lancedb::connect(uri).execute().await.map_err(|e| {
            error!("Failed to connect to LanceDB: {}", e);
            RagError::StoreUnavailable(format!("Failed to connect to {}: {}", uri, e))
        })?;

        let store = Self {
            connection,
            collection: collection.to_string(),
            dimension,
            distance,
        };
        store.ensure_collection().await?;

        info!(
            "Vector store ready: collection {} ({} dimensions, {})",
            collection, dimension, distance
        );
        Ok(store)
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn distance(&self) -> Distance {
        self.distance
    }

    fn schema(&self) -> Arc<Schema> {
        let metadata = HashMap::from([(
            DISTANCE_METADATA_KEY.to_string(),
            self.distance.as_str().to_string(),
        )]);

        Arc::new(Schema::new_with_metadata(
            vec![
                Field::new("id", DataType::Utf8, false),
                Field::new(
                    "vector",
                    DataType::FixedSizeList(
                        Arc::new(Field::new("item", DataType::Float32, true)),
                        self.dimension as i32,
                    ),
                    false,
                ),
                Field::new("source", DataType::Utf8, false),
                Field::new("text", DataType::Utf8, false),
            ],
            metadata,
        ))
    }

    async fn collection_exists(&self) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to list collections: {}", e)))?;
        Ok(names.contains(&self.collection))
    }

    async fn open_collection(&self) -> Result<Table> {
        self.connection
            .open_table(&self.collection)
            .execute()
            .await
            .map_err(|e| {
                RagError::StoreUnavailable(format!(
                    "Failed to open collection {}: {}",
                    self.collection, e
                ))
            })
    }

    /// Create the collection if it is missing.
    ///
    /// An existing collection is accepted only when its vector dimension and
    /// recorded metric match this store.
    #[inline]
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.collection_exists().await? {
            return self.verify_collection().await;
        }

        debug!("Creating collection: {}", self.collection);
        let created = self
            .connection
            .create_empty_table(&self.collection, self.schema())
            .execute()
            .await;

        let Err(e) = created else {
            info!("Created collection: {}", self.collection);
            return Ok(());
        };

        // Another caller may have created it between the check and the create
        if self.collection_exists().await.unwrap_or(false) {
            debug!("Collection appeared concurrently: {}", e);
            return self.verify_collection().await;
        }

        Err(RagError::StoreUnavailable(format!(
            "Failed to create collection {}: {}",
            self.collection, e
        )))
    }

    async fn verify_collection(&self) -> Result<()> {
        let table = self.open_collection().await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to read schema: {}", e)))?;

        let existing_dimension = schema
            .field_with_name("vector")
            .ok()
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => Some(*size as usize),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::StoreUnavailable(format!(
                    "Collection {} has no fixed-size vector column",
                    self.collection
                ))
            })?;

        if existing_dimension != self.dimension {
            return Err(RagError::StoreUnavailable(format!(
                "Collection {} has {} dimensions, expected {}",
                self.collection, existing_dimension, self.dimension
            )));
        }

        let recorded = schema.metadata().get(DISTANCE_METADATA_KEY);
        if let Some(existing) = recorded.filter(|name| name.as_str() != self.distance.as_str()) {
            return Err(RagError::StoreUnavailable(format!(
                "Collection {} uses {} distance, expected {}",
                self.collection, existing, self.distance
            )));
        }

        debug!("Collection {} already exists", self.collection);
        Ok(())
    }

    /// Insert or replace points by id.
    ///
    /// The three slices are parallel: entry `i` of each describes one point.
    #[inline]
    pub async fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        payloads: &[PointPayload],
    ) -> Result<()> {
        if ids.len() != vectors.len() || ids.len() != payloads.len() {
            return Err(RagError::InvalidRequest(format!(
                "Mismatched upsert lengths: {} ids, {} vectors, {} payloads",
                ids.len(),
                vectors.len(),
                payloads.len()
            )));
        }
        if ids.is_empty() {
            debug!("Nothing to upsert");
            return Ok(());
        }
        if let Some(vector) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::Config(format!(
                "Vector has {} dimensions, collection {} expects {}",
                vector.len(),
                self.collection,
                self.dimension
            )));
        }

        debug!("Upserting {} points into {}", ids.len(), self.collection);

        let batch = self.create_record_batch(ids, vectors, payloads)?;
        let table = self.open_collection().await?;

        let schema = batch.schema();
        let reader: Box<dyn RecordBatchReader + Send> = Box::new(RecordBatchIterator::new(
            std::iter::once(Ok(batch)),
            schema,
        ));

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(reader)
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to upsert points: {}", e)))?;

        info!("Upserted {} points into {}", ids.len(), self.collection);
        Ok(())
    }

    fn create_record_batch(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        payloads: &[PointPayload],
    ) -> Result<RecordBatch> {
        let flat: Vec<f32> = vectors.iter().flatten().copied().collect();
        let vector_array = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimension as i32,
            Arc::new(Float32Array::from(flat)),
            None,
        )
        .map_err(|e| RagError::StoreUnavailable(format!("Failed to build vector array: {}", e)))?;

        let id_array = StringArray::from_iter_values(ids);
        let source_array = StringArray::from_iter_values(payloads.iter().map(|p| &p.source));
        let text_array = StringArray::from_iter_values(payloads.iter().map(|p| &p.text));

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(id_array),
                Arc::new(vector_array),
                Arc::new(source_array),
                Arc::new(text_array),
            ],
        )
        .map_err(|e| RagError::StoreUnavailable(format!("Failed to build record batch: {}", e)))
    }

    /// Return up to `top_k` stored points nearest to `query_vector`, best first
    #[inline]
    pub async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<ScoredPoint>> {
        if query_vector.len() != self.dimension {
            return Err(RagError::Config(format!(
                "Query vector has {} dimensions, collection {} expects {}",
                query_vector.len(),
                self.collection,
                self.dimension
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let table = self.open_collection().await?;
        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to count points: {}", e)))?;
        if rows == 0 {
            debug!("Collection {} is empty, skipping search", self.collection);
            return Ok(Vec::new());
        }

        debug!("Searching {} for {} nearest points", self.collection, top_k);

        let results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to create search: {}", e)))?
            .column("vector")
            .distance_type(self.distance.to_lance())
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to execute search: {}", e)))?;

        let mut points = parse_search_results_stream(results).await?;
        points.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        points.truncate(top_k);

        debug!("Search returned {} points", points.len());
        Ok(points)
    }

    /// Search and keep only the chunk texts and their distinct sources
    #[inline]
    pub async fn search_contexts(&self, query_vector: &[f32], top_k: usize) -> Result<SearchResult> {
        let points = self.search(query_vector, top_k).await?;
        Ok(SearchResult::from_points(&points))
    }

    /// Drop and recreate the collection. Failures are logged and reported as
    /// `false`.
    #[inline]
    pub async fn reset_collection(&self) -> bool {
        let result = async {
            self.drop_collection_if_exists().await?;
            self.ensure_collection().await
        }
        .await;

        match result {
            Ok(()) => {
                info!("Reset collection: {}", self.collection);
                true
            }
            Err(e) => {
                error!("Failed to reset collection {}: {}", self.collection, e);
                false
            }
        }
    }

    async fn drop_collection_if_exists(&self) -> Result<()> {
        if !self.collection_exists().await? {
            return Ok(());
        }
        self.connection
            .drop_table(&self.collection)
            .await
            .map_err(|e| {
                RagError::StoreUnavailable(format!(
                    "Failed to drop collection {}: {}",
                    self.collection, e
                ))
            })
    }

    /// Number of stored points; a missing collection counts as empty
    #[inline]
    pub async fn count(&self) -> Result<u64> {
        if !self.collection_exists().await? {
            warn!("Collection {} does not exist", self.collection);
            return Ok(0);
        }

        let table = self.open_collection().await?;
        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to count points: {}", e)))?;
        Ok(rows as u64)
    }
}

async fn parse_search_results_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<ScoredPoint>> {
    let mut points = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| RagError::StoreUnavailable(format!("Failed to read result stream: {}", e)))?
    {
        points.extend(parse_search_batch(&batch)?);
    }

    Ok(points)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::StoreUnavailable(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::StoreUnavailable(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredPoint>> {
    let ids = string_column(batch, "id")?;
    let sources = string_column(batch, "source")?;
    let texts = string_column(batch, "text")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let points = (0..batch.num_rows())
        .map(|row| {
            let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });
            ScoredPoint {
                id: ids.value(row).to_string(),
                payload: PointPayload {
                    source: sources.value(row).to_string(),
                    text: texts.value(row).to_string(),
                },
                distance,
                score: 1.0 - distance,
            }
        })
        .collect();

    Ok(points)
}
