//! Duplicate removal for MongoDB collections
//!
//! Finds groups of documents sharing identical values across a key-field set
//! and deletes all but one document per group. Groups are computed fresh from
//! a server-side aggregation on every run, so a partially-completed run is
//! recovered by simply running again.

use bson::{doc, Bson, Document as BsonDocument};
use mongodb::options::{AggregateOptions, DeleteManyModel, FindOneOptions, WriteModel};
use mongodb::{Collection, Database};
use mongosweep_common::{Result, SweepError};

use crate::validation::validate_key_fields;

/// A key-set value is duplicated once more than this many documents carry it.
const DUPLICATE_THRESHOLD: i32 = 1;

/// Builder for a duplicate-removal pass over one collection
///
/// The key fields must be covered by an index or the per-group survivor
/// lookups will not complete in acceptable time; this is a caller obligation
/// and is not enforced here. Running the pass deletes data.
///
/// # Example
///
/// ```ignore
/// use mongosweep::Dedup;
///
/// // (symbol, day) should be unique across the ticks collection
/// Dedup::new("ticks", ["symbol", "day"])
///     .batch_size(1024)
///     .run(&db)
///     .await?;
/// ```
pub struct Dedup {
    collection_name: String,
    keys: Vec<String>,
    filter: Option<BsonDocument>,
    batch_size: Option<usize>,
}

impl Dedup {
    /// Create a new duplicate-removal builder
    pub fn new<I, S>(collection_name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collection_name: collection_name.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            filter: None,
            batch_size: None,
        }
    }

    /// Restrict the pass to documents matching `filter`
    ///
    /// Documents outside the filter are never grouped or deleted, even when
    /// they share a key-set value with a document inside it.
    pub fn filter(mut self, filter: BsonDocument) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Buffer deletes and flush them `batch_size` at a time
    ///
    /// Each full batch goes to the server as a single bulk-write round trip;
    /// without a batch size every duplicate group costs its own delete call.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Get the collection name
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Get the key fields
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Get the restricting filter
    pub fn get_filter(&self) -> Option<&BsonDocument> {
        self.filter.as_ref()
    }

    /// Get the batch size
    pub fn get_batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    /// Run the pass against `db`, deleting every duplicate except one
    /// survivor per group
    ///
    /// Failures from the underlying collection operations propagate
    /// unmodified; a failure mid-run leaves the deletions of earlier groups
    /// applied. Re-running recomputes the remaining groups.
    pub async fn run(self, db: &Database) -> Result<()> {
        self.validate()?;

        let collection: Collection<BsonDocument> = db.collection(&self.collection_name);

        // The collection may be too large to aggregate in memory, so let the
        // server spill intermediate group state to disk.
        let options = AggregateOptions::builder().allow_disk_use(true).build();
        let mut groups = collection
            .aggregate(self.pipeline())
            .with_options(options)
            .await?;

        let mut buffer: Vec<WriteModel> = Vec::new();
        let mut removed: u64 = 0;

        while groups.advance().await? {
            let group = groups.deserialize_current()?;
            let key_values = group.get_document("_id")?.clone();
            let condition = group_condition(self.filter.as_ref(), key_values);

            let Some(condition) = delete_condition(&collection, condition).await? else {
                continue;
            };

            match self.batch_size {
                Some(batch) => {
                    buffer.push(WriteModel::DeleteMany(
                        DeleteManyModel::builder()
                            .namespace(collection.namespace())
                            .filter(condition)
                            .build(),
                    ));
                    if buffer.len() >= batch {
                        removed += flush(db, &mut buffer).await?;
                    }
                }
                None => {
                    let result = collection.delete_many(condition).await?;
                    removed += result.deleted_count;
                }
            }
        }

        // Groups left in a partial final batch still have to go out.
        if !buffer.is_empty() {
            removed += flush(db, &mut buffer).await?;
        }

        tracing::info!(
            collection = self.collection_name.as_str(),
            removed = removed,
            "Removed duplicate documents"
        );
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_key_fields(&self.keys)?;
        if self.batch_size == Some(0) {
            return Err(SweepError::Validation(
                "Batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Grouping pipeline: optional caller filter, then group by the key-field
    /// projection with a member count, then keep only groups above the
    /// duplicate threshold
    fn pipeline(&self) -> Vec<BsonDocument> {
        let mut group_id = BsonDocument::new();
        for key in &self.keys {
            group_id.insert(key.as_str(), format!("${}", key));
        }

        let mut pipeline = Vec::with_capacity(3);
        if let Some(filter) = &self.filter {
            pipeline.push(doc! { "$match": filter.clone() });
        }
        pipeline.push(doc! {
            "$group": {
                "_id": group_id,
                "total": { "$sum": 1 }
            }
        });
        pipeline.push(doc! { "$match": { "total": { "$gt": DUPLICATE_THRESHOLD } } });
        pipeline
    }
}

/// Remove duplicates from `collection_name` keyed on `keys`, with no
/// restricting filter and one delete call per duplicate group
pub async fn remove_duplicates<I, S>(db: &Database, collection_name: &str, keys: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Dedup::new(collection_name, keys).run(db).await
}

/// Equality over the group's key values, kept inside the caller filter so
/// documents outside it can never match for survivor lookup or deletion
fn group_condition(filter: Option<&BsonDocument>, key_values: BsonDocument) -> BsonDocument {
    match filter {
        // $and instead of a field merge: the filter may constrain the same
        // fields the key set projects.
        Some(filter) => doc! { "$and": [filter.clone(), key_values] },
        None => key_values,
    }
}

/// Turn a group condition into the delete condition for that group: the same
/// match plus an exclusion for the designated survivor
///
/// Returns `None` when no document matches the condition anymore, which can
/// only happen when the collection is mutated while the scan is running; the
/// group is recomputed on the next run.
async fn delete_condition(
    collection: &Collection<BsonDocument>,
    condition: BsonDocument,
) -> Result<Option<BsonDocument>> {
    let options = FindOneOptions::builder()
        .projection(doc! { "_id": 1 })
        .build();
    let survivor = collection
        .find_one(condition.clone())
        .with_options(options)
        .await?;

    let Some(survivor) = survivor else {
        tracing::warn!(
            condition = ?condition,
            "Duplicate group vanished before a survivor could be chosen"
        );
        return Ok(None);
    };

    let survivor_id = survivor.get("_id").cloned().ok_or_else(|| {
        SweepError::MongoDB("Survivor lookup returned a document without _id".to_string())
    })?;

    Ok(Some(exclude_survivor(condition, survivor_id)))
}

/// Group condition plus `_id != survivor`
fn exclude_survivor(mut condition: BsonDocument, survivor_id: Bson) -> BsonDocument {
    condition.insert("_id", doc! { "$ne": survivor_id });
    condition
}

/// Send the buffered delete operations in one bulk-write round trip
async fn flush(db: &Database, buffer: &mut Vec<WriteModel>) -> Result<u64> {
    let models = std::mem::take(buffer);
    let result = db.client().bulk_write(models).await?;
    Ok(result.deleted_count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    #[test]
    fn test_dedup_new() {
        let dedup = Dedup::new("ticks", ["symbol", "day"]);
        assert_eq!(dedup.collection_name(), "ticks");
        assert_eq!(dedup.keys(), ["symbol", "day"]);
        assert!(dedup.get_filter().is_none());
        assert!(dedup.get_batch_size().is_none());
    }

    #[test]
    fn test_dedup_chaining() {
        let filter = doc! { "day": { "$gte": "2018-01-01" } };
        let dedup = Dedup::new("ticks", ["symbol", "day"])
            .filter(filter.clone())
            .batch_size(1024);
        assert_eq!(dedup.get_filter(), Some(&filter));
        assert_eq!(dedup.get_batch_size(), Some(1024));
    }

    #[test]
    fn test_pipeline_without_filter() {
        let pipeline = Dedup::new("ticks", ["symbol", "day"]).pipeline();
        assert_eq!(pipeline.len(), 2);
        assert_eq!(
            pipeline[0],
            doc! {
                "$group": {
                    "_id": { "symbol": "$symbol", "day": "$day" },
                    "total": { "$sum": 1 }
                }
            }
        );
        assert_eq!(pipeline[1], doc! { "$match": { "total": { "$gt": 1 } } });
    }

    #[test]
    fn test_pipeline_with_filter() {
        let filter = doc! { "active": true };
        let pipeline = Dedup::new("users", ["email"])
            .filter(filter.clone())
            .pipeline();
        assert_eq!(pipeline.len(), 3);
        assert_eq!(pipeline[0], doc! { "$match": filter });
        assert_eq!(
            pipeline[1],
            doc! {
                "$group": {
                    "_id": { "email": "$email" },
                    "total": { "$sum": 1 }
                }
            }
        );
    }

    #[test]
    fn test_group_condition_without_filter() {
        let condition = group_condition(None, doc! { "a": 1, "b": 1 });
        assert_eq!(condition, doc! { "a": 1, "b": 1 });
    }

    #[test]
    fn test_group_condition_with_filter() {
        let filter = doc! { "src": "batch" };
        let condition = group_condition(Some(&filter), doc! { "a": 1 });
        assert_eq!(
            condition,
            doc! { "$and": [ { "src": "batch" }, { "a": 1 } ] }
        );
    }

    #[test]
    fn test_exclude_survivor() {
        let survivor = ObjectId::new();
        let condition = exclude_survivor(doc! { "a": 1, "b": 1 }, Bson::ObjectId(survivor));
        assert_eq!(
            condition,
            doc! { "a": 1, "b": 1, "_id": { "$ne": survivor } }
        );
    }

    #[test]
    fn test_exclude_survivor_non_objectid() {
        // _id is caller-assigned here; nothing requires an ObjectId
        let condition = exclude_survivor(doc! { "a": 1 }, Bson::String("custom-id".to_string()));
        assert_eq!(condition, doc! { "a": 1, "_id": { "$ne": "custom-id" } });
    }

    #[test]
    fn test_validate_rejects_empty_keys() {
        let keys: [&str; 0] = [];
        let dedup = Dedup::new("ticks", keys);
        assert!(matches!(dedup.validate(), Err(SweepError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let dedup = Dedup::new("ticks", ["symbol"]).batch_size(0);
        assert!(matches!(dedup.validate(), Err(SweepError::Validation(_))));
    }

    #[test]
    fn test_validate_accepts_plain_builder() {
        assert!(Dedup::new("ticks", ["symbol"]).validate().is_ok());
        assert!(Dedup::new("ticks", ["symbol"])
            .batch_size(1)
            .validate()
            .is_ok());
    }
}
