//! The `_catalog` bucket
//!
//! One entry per collection: key is the collection name, value its
//! [`CollectionMeta`] as JSON. Catalog writes happen in the same transaction
//! as the bucket changes they describe.

use docstore_core::{Bucket, Error, Path, Result, Transaction};

use crate::collection::CollectionMeta;

/// Root bucket holding collection metadata
pub const CATALOG_BUCKET: &str = "_catalog";

pub(crate) fn path() -> Path {
    Path::new(CATALOG_BUCKET)
}

fn bucket(tx: &dyn Transaction) -> Result<Box<dyn Bucket>> {
    tx.bucket(&path())?
        .ok_or_else(|| Error::not_found(format!("catalog bucket '{}'", CATALOG_BUCKET)))
}

pub(crate) fn exists(tx: &dyn Transaction) -> Result<bool> {
    Ok(tx.bucket(&path())?.is_some())
}

pub(crate) fn init(tx: &dyn Transaction) -> Result<()> {
    tx.create_bucket_if_not_exists(&path()).map(|_| ())
}

/// Every stored collection, in name order; empty without a catalog
pub(crate) fn load(tx: &dyn Transaction) -> Result<Vec<CollectionMeta>> {
    let Some(catalog) = tx.bucket(&path())? else {
        return Ok(Vec::new());
    };
    let mut metas = Vec::new();
    catalog.for_each(&mut |name, value| {
        let Some(value) = value else {
            return Ok(());
        };
        let meta: CollectionMeta = serde_json::from_slice(value).map_err(|e| {
            Error::Corruption(format!(
                "catalog entry '{}': {}",
                String::from_utf8_lossy(name),
                e
            ))
        })?;
        metas.push(meta);
        Ok(())
    })?;
    Ok(metas)
}

pub(crate) fn contains(tx: &dyn Transaction, name: &str) -> Result<bool> {
    Ok(bucket(tx)?.get(name.as_bytes())?.is_some())
}

pub(crate) fn save(tx: &dyn Transaction, meta: &CollectionMeta) -> Result<()> {
    let value = serde_json::to_vec(meta).map_err(|e| Error::Codec(e.to_string()))?;
    bucket(tx)?.put(meta.name.as_bytes(), &value)
}

pub(crate) fn remove(tx: &dyn Transaction, name: &str) -> Result<()> {
    bucket(tx)?.delete(name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::StorageExt;
    use docstore_storage::MemoryStore;
    use std::collections::BTreeMap;

    fn meta(name: &str) -> CollectionMeta {
        CollectionMeta {
            name: name.to_string(),
            path: Path::new(name),
            codec: "json".to_string(),
            key_len: 16,
            indexes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_load_without_catalog_is_empty() {
        let store = MemoryStore::new("t");
        assert!(store.read(|tx| load(tx)).unwrap().is_empty());
        assert!(!store.read(|tx| exists(tx)).unwrap());
    }

    #[test]
    fn test_store_load_remove() {
        let store = MemoryStore::new("t");
        store
            .write(|tx| {
                init(tx)?;
                save(tx, &meta("b"))?;
                save(tx, &meta("a"))
            })
            .unwrap();

        let names: Vec<String> = store
            .read(|tx| load(tx))
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        store.write(|tx| remove(tx, "a")).unwrap();
        assert!(!store.read(|tx| contains(tx, "a")).unwrap());
        assert!(store.read(|tx| contains(tx, "b")).unwrap());
    }

    #[test]
    fn test_garbage_entry_is_corruption() {
        let store = MemoryStore::new("t");
        store
            .write(|tx| {
                init(tx)?;
                tx.bucket(&path())?
                    .ok_or_else(|| Error::not_found("catalog"))?
                    .put(b"x", b"not json")
            })
            .unwrap();
        assert!(matches!(store.read(|tx| load(tx)), Err(Error::Corruption(_))));
    }
}
