//! Bulk upsert of document lists keyed by a field subset

use std::collections::HashSet;

use bson::{doc, Document as BsonDocument};
use mongodb::options::{UpdateOneModel, WriteModel};
use mongodb::{Collection, Database};
use mongosweep_common::{Result, SweepError};
use serde::Serialize;

use crate::validation::validate_key_fields;

/// Upsert a list of items into `collection_name`, matched on `update_keys`
///
/// The input list is de-duplicated by full-value equality before writing, and
/// every distinct item becomes one `$set` update matched on its `update_keys`
/// values. All updates go to the server in a single bulk-write call. With
/// `upsert` set, items with no existing match are inserted.
///
/// # Errors
/// Fails with a missing-key error when an item lacks one of the declared
/// `update_keys` fields.
///
/// # Example
///
/// ```ignore
/// use mongosweep::update_documents;
///
/// // refresh a list of user records, matched by name
/// update_documents(&db, "users", &users, &["name"], true).await?;
/// ```
pub async fn update_documents<T: Serialize>(
    db: &Database,
    collection_name: &str,
    items: &[T],
    update_keys: &[&str],
    upsert: bool,
) -> Result<()> {
    validate_key_fields(update_keys)?;

    let mut documents = Vec::with_capacity(items.len());
    for item in items {
        documents.push(bson::to_document(item)?);
    }
    let documents = dedup_documents(documents)?;

    let collection: Collection<BsonDocument> = db.collection(collection_name);
    let mut models = Vec::with_capacity(documents.len());
    for document in documents {
        let filter = update_filter(&document, update_keys)?;
        models.push(WriteModel::UpdateOne(
            UpdateOneModel::builder()
                .namespace(collection.namespace())
                .filter(filter)
                .update(doc! { "$set": document })
                .upsert(upsert)
                .build(),
        ));
    }

    if models.is_empty() {
        return Ok(());
    }

    let result = db.client().bulk_write(models).await?;
    tracing::debug!(
        collection = collection_name,
        matched = result.matched_count,
        modified = result.modified_count,
        upserted = result.upserted_count,
        "Updated document list"
    );
    Ok(())
}

/// Drop exact duplicates from the input list, keeping first occurrences
///
/// Equality is over the serialized document, so field order is significant.
fn dedup_documents(documents: Vec<BsonDocument>) -> Result<Vec<BsonDocument>> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(documents.len());
    for document in documents {
        if seen.insert(bson::to_vec(&document)?) {
            unique.push(document);
        }
    }
    Ok(unique)
}

/// Match condition for one item: the projection of `update_keys` onto it
fn update_filter(document: &BsonDocument, update_keys: &[&str]) -> Result<BsonDocument> {
    let mut filter = BsonDocument::new();
    for key in update_keys {
        let value = document
            .get(*key)
            .cloned()
            .ok_or_else(|| SweepError::MissingKey((*key).to_string()))?;
        filter.insert(*key, value);
    }
    Ok(filter)
}
