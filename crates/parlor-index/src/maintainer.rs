//! Keeps index buckets consistent with primary records.
//!
//! All operations take the caller's transaction so index writes commit (or
//! abort) together with the primary entry they were derived from.

use std::collections::BTreeMap;

use parlor_schema::{FieldDescriptor, TypeDescriptor};
use parlor_types::{Object, Value};
use redb::{ReadTransaction, ReadableTable, TableHandle, UntypedTableHandle, WriteTransaction};
use tracing::{debug, trace, warn};

use crate::bucket::{index_bucket_name, index_key, index_table, primary_table, type_index_prefix};
use crate::error::{IndexError, IndexResult};

/// Index bucket name -> (index key -> primary key), for every non-empty
/// index bucket of one type.
pub type IndexSnapshot = BTreeMap<String, BTreeMap<String, String>>;

/// Index maintenance over a redb transaction.
pub struct IndexMaintainer;

impl IndexMaintainer {
    /// Write an index entry for every indexed value present in `obj`.
    ///
    /// `path` is the bucket path of `desc`: the type name at the top level,
    /// `Type.field` (and so on) for structured fields. Returns the number of
    /// entries written.
    pub fn apply(
        tx: &WriteTransaction,
        path: &str,
        desc: &TypeDescriptor,
        pk: &str,
        obj: &Object,
    ) -> IndexResult<usize> {
        let mut written = 0;
        walk(path, desc, obj, &mut |bucket, field, value| {
            let key = index_key(field, value, pk);
            let mut table = tx.open_table(index_table(bucket))?;
            if field.is_unique() {
                let existing = table.get(key.as_str())?.map(|g| g.value().to_string());
                if let Some(existing) = existing.filter(|existing| existing != pk) {
                    debug!(bucket, key = %key, %existing, attempted = pk, "unique key violation");
                    return Err(IndexError::ConstraintViolation {
                        bucket: bucket.to_string(),
                        key,
                        existing,
                        attempted: pk.to_string(),
                    });
                }
            }
            table.insert(key.as_str(), pk)?;
            trace!(bucket, key = %key, pk, "index entry written");
            written += 1;
            Ok(())
        })?;
        Ok(written)
    }

    /// Remove the entries [`apply`](Self::apply) would write for `obj`.
    ///
    /// A unique entry is only removed while it still maps to `pk`. Returns
    /// the number of entries removed.
    pub fn remove(
        tx: &WriteTransaction,
        path: &str,
        desc: &TypeDescriptor,
        pk: &str,
        obj: &Object,
    ) -> IndexResult<usize> {
        let mut removed = 0;
        walk(path, desc, obj, &mut |bucket, field, value| {
            let key = index_key(field, value, pk);
            let mut table = tx.open_table(index_table(bucket))?;
            if field.is_unique() {
                let owned = table.get(key.as_str())?.is_some_and(|g| g.value() == pk);
                if !owned {
                    return Ok(());
                }
            }
            if table.remove(key.as_str())?.is_some() {
                trace!(bucket, key = %key, pk, "index entry removed");
                removed += 1;
            }
            Ok(())
        })?;
        Ok(removed)
    }

    /// Delete every index bucket of `type_name`, nested paths included.
    /// Returns the number of buckets deleted.
    pub fn drop_indexes(tx: &WriteTransaction, type_name: &str) -> IndexResult<usize> {
        let prefix = type_index_prefix(type_name);
        let doomed: Vec<UntypedTableHandle> = tx
            .list_tables()?
            .filter(|handle| handle.name().starts_with(&prefix))
            .collect();
        let count = doomed.len();
        for handle in doomed {
            let name = handle.name().to_string();
            tx.delete_table(handle)?;
            debug!(bucket = %name, "index bucket dropped");
        }
        Ok(count)
    }

    /// Drop all index buckets of `desc` and re-derive them from the primary
    /// bucket. Returns the number of records re-indexed.
    pub fn rebuild(tx: &WriteTransaction, desc: &TypeDescriptor) -> IndexResult<usize> {
        let dropped = Self::drop_indexes(tx, desc.name())?;
        if !desc.is_struct() || !table_exists(tx, desc.name())? {
            debug!(type_name = desc.name(), dropped, "nothing to re-index");
            return Ok(0);
        }

        let records = {
            let table = tx.open_table(primary_table(desc.name()))?;
            let records = table
                .iter()?
                .map(|entry| entry.map(|(k, v)| (k.value().to_string(), v.value().to_vec())))
                .collect::<Result<Vec<_>, _>>()?;
            records
        };

        let mut entries = 0;
        for (pk, bytes) in &records {
            let corrupt = |reason: String| IndexError::Format {
                bucket: desc.name().to_string(),
                key: pk.clone(),
                reason,
            };
            let value = Value::from_bytes(bytes).map_err(|e| corrupt(e.to_string()))?;
            let Value::Object(obj) = value else {
                return Err(corrupt(format!("expected an object, found {}", value.kind_name())));
            };
            entries += Self::apply(tx, desc.name(), desc, pk, &obj)?;
        }
        debug!(
            type_name = desc.name(),
            dropped,
            records = records.len(),
            entries,
            "indexes rebuilt"
        );
        Ok(records.len())
    }

    /// Read the current contents of every non-empty index bucket of
    /// `type_name`.
    pub fn snapshot(tx: &ReadTransaction, type_name: &str) -> IndexResult<IndexSnapshot> {
        let prefix = type_index_prefix(type_name);
        let names: Vec<String> = tx
            .list_tables()?
            .map(|handle| handle.name().to_string())
            .filter(|name| name.starts_with(&prefix))
            .collect();

        let mut snapshot = IndexSnapshot::new();
        for name in names {
            let table = tx.open_table(index_table(&name))?;
            let entries = table
                .iter()?
                .map(|entry| entry.map(|(k, v)| (k.value().to_string(), v.value().to_string())))
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            if !entries.is_empty() {
                snapshot.insert(name, entries);
            }
        }
        Ok(snapshot)
    }
}

/// Whether a bucket named `name` exists, without creating it.
pub fn table_exists(tx: &WriteTransaction, name: &str) -> IndexResult<bool> {
    Ok(tx.list_tables()?.any(|handle| handle.name() == name))
}

/// Visit every (bucket, field, value) triple that `obj` contributes to the
/// indexes of `desc`, descending into structured fields.
fn walk<F>(path: &str, desc: &TypeDescriptor, obj: &Object, visit: &mut F) -> IndexResult<()>
where
    F: FnMut(&str, &FieldDescriptor, &str) -> IndexResult<()>,
{
    for field in desc.fields() {
        let Some(value) = obj.get(&field.accessor).filter(|v| !v.is_absent()) else {
            continue;
        };

        if field.is_indexed() {
            let bucket = index_bucket_name(path, &field.name);
            for key in indexable_values(value) {
                visit(&bucket, field, &key)?;
            }
            if matches!(value, Value::Object(_) | Value::Bytes(_)) {
                warn!(bucket = %bucket, kind = value.kind_name(), "value cannot be indexed");
            }
        }

        let Some(elem) = field.kind.elem() else {
            continue;
        };
        let elem = elem.get()?;
        if !elem.is_struct() {
            continue;
        }
        let child = format!("{path}.{}", field.name);
        match value {
            Value::Object(inner) => walk(&child, elem, inner, visit)?,
            Value::Seq(items) => {
                for item in items {
                    if let Value::Object(inner) = item {
                        walk(&child, elem, inner, visit)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// String forms under which a stored value is indexed. Sequences of
/// scalars contribute one entry per element.
fn indexable_values(value: &Value) -> Vec<String> {
    match value {
        Value::Str(s) => vec![s.clone()],
        Value::Int(n) => vec![n.to_string()],
        Value::Float(f) => vec![f.to_string()],
        Value::Seq(items) => items
            .iter()
            .filter(|item| !matches!(item, Value::Seq(_)))
            .flat_map(indexable_values)
            .collect(),
        Value::Bytes(_) | Value::Object(_) | Value::Absent => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use parlor_schema::{SchemaBuilder, SchemaRegistry, SchemaResult, Shape, Storable, TypeRef};
    use redb::Database;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Member {
        name: String,
        rank: i32,
    }

    impl Storable for Member {
        fn type_name() -> &'static str {
            "Member"
        }

        fn describe(schema: &mut SchemaBuilder<'_>) -> SchemaResult<Shape> {
            Ok(Shape::Struct(vec![
                schema.string("name").indexed(),
                schema.int_sized("rank", 32),
            ]))
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Team {
        login: String,
        tags: Vec<String>,
        rating: i64,
        captain: Member,
        members: Vec<Member>,
    }

    impl Storable for Team {
        fn type_name() -> &'static str {
            "Team"
        }

        fn describe(schema: &mut SchemaBuilder<'_>) -> SchemaResult<Shape> {
            Ok(Shape::Struct(vec![
                schema.string("login").unique().case_insensitive(),
                schema.array::<String>("tags")?.indexed(),
                schema.int("rating").indexed(),
                schema.nested::<Member>("captain")?,
                schema.array::<Member>("members")?,
            ]))
        }
    }

    fn setup() -> (TempDir, Database, TypeRef) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(dir.path().join("index.redb")).unwrap();
        let registry = SchemaRegistry::new();
        let team = registry.describe::<Team>().unwrap();
        (dir, db, team)
    }

    fn member(name: &str) -> Value {
        let mut obj = Object::new();
        obj.insert("name".into(), Value::from(name));
        obj.insert("rank".into(), Value::Int(1));
        Value::Object(obj)
    }

    fn team(login: &str, tags: &[&str], rating: i64, members: &[&str]) -> Object {
        let mut obj = Object::new();
        obj.insert("login".into(), Value::from(login));
        obj.insert(
            "tags".into(),
            Value::Seq(tags.iter().map(|t| Value::from(*t)).collect()),
        );
        obj.insert("rating".into(), Value::Int(rating));
        obj.insert("captain".into(), member(members.first().copied().unwrap_or("nobody")));
        obj.insert(
            "members".into(),
            Value::Seq(members.iter().map(|m| member(m)).collect()),
        );
        obj
    }

    fn apply(db: &Database, desc: &TypeDescriptor, pk: &str, obj: &Object) -> IndexResult<usize> {
        let tx = db.begin_write()?;
        let written = IndexMaintainer::apply(&tx, desc.name(), desc, pk, obj)?;
        tx.commit()?;
        Ok(written)
    }

    fn snapshot(db: &Database) -> IndexSnapshot {
        let tx = db.begin_read().unwrap();
        IndexMaintainer::snapshot(&tx, "Team").unwrap()
    }

    // ---------------------------------------------------------------
    // apply
    // ---------------------------------------------------------------

    #[test]
    fn apply_writes_every_indexed_value() {
        let (_dir, db, handle) = setup();
        let desc = handle.get().unwrap();
        let written = apply(&db, desc, "t1", &team("Alpha", &["red", "blue"], 7, &["ann", "bob"])).unwrap();
        // login + 2 tags + rating + captain.name + 2 member names
        assert_eq!(written, 7);

        let snap = snapshot(&db);
        assert_eq!(snap["idx_Team.login"]["alpha"], "t1");
        assert_eq!(snap["idx_Team.tags"].len(), 2);
        assert!(snap["idx_Team.tags"].contains_key("red->t1"));
        assert!(snap["idx_Team.rating"].contains_key("7->t1"));
        assert!(snap["idx_Team.captain.name"].contains_key("ann->t1"));
        assert_eq!(
            snap["idx_Team.members.name"].keys().collect::<Vec<_>>(),
            vec!["ann->t1", "bob->t1"]
        );
    }

    #[test]
    fn unique_index_rejects_a_second_owner() {
        let (_dir, db, handle) = setup();
        let desc = handle.get().unwrap();
        apply(&db, desc, "t1", &team("Alpha", &[], 1, &[])).unwrap();

        let err = apply(&db, desc, "t2", &team("ALPHA", &[], 2, &[])).unwrap_err();
        match err {
            IndexError::ConstraintViolation { bucket, key, existing, attempted } => {
                assert_eq!(bucket, "idx_Team.login");
                assert_eq!(key, "alpha");
                assert_eq!(existing, "t1");
                assert_eq!(attempted, "t2");
            }
            other => panic!("expected a constraint violation, got {other}"),
        }

        // The aborted transaction left nothing behind for t2.
        let snap = snapshot(&db);
        assert!(snap["idx_Team.rating"].contains_key("1->t1"));
        assert!(!snap["idx_Team.rating"].contains_key("2->t2"));
    }

    #[test]
    fn reapplying_for_the_same_owner_is_allowed() {
        let (_dir, db, handle) = setup();
        let desc = handle.get().unwrap();
        let obj = team("Alpha", &["x"], 1, &[]);
        apply(&db, desc, "t1", &obj).unwrap();
        apply(&db, desc, "t1", &obj).unwrap();
        assert_eq!(snapshot(&db)["idx_Team.login"].len(), 1);
    }

    // ---------------------------------------------------------------
    // remove
    // ---------------------------------------------------------------

    #[test]
    fn remove_is_the_inverse_of_apply() {
        let (_dir, db, handle) = setup();
        let desc = handle.get().unwrap();
        let keep = team("Keep", &["red"], 3, &["ann"]);
        let gone = team("Gone", &["red", "green"], 3, &["bob", "cy"]);
        apply(&db, desc, "k", &keep).unwrap();
        let before = snapshot(&db);
        apply(&db, desc, "g", &gone).unwrap();

        let tx = db.begin_write().unwrap();
        let removed = IndexMaintainer::remove(&tx, "Team", desc, "g", &gone).unwrap();
        tx.commit().unwrap();

        assert_eq!(removed, 7);
        assert_eq!(snapshot(&db), before);
    }

    #[test]
    fn remove_leaves_unique_entries_of_other_owners() {
        let (_dir, db, handle) = setup();
        let desc = handle.get().unwrap();
        let obj = team("Alpha", &[], 1, &[]);
        apply(&db, desc, "t1", &obj).unwrap();

        let tx = db.begin_write().unwrap();
        IndexMaintainer::remove(&tx, "Team", desc, "t2", &obj).unwrap();
        tx.commit().unwrap();

        assert_eq!(snapshot(&db)["idx_Team.login"]["alpha"], "t1");
    }

    // ---------------------------------------------------------------
    // drop / rebuild
    // ---------------------------------------------------------------

    fn store_primary(db: &Database, pk: &str, obj: &Object) {
        let tx = db.begin_write().unwrap();
        {
            let mut table = tx.open_table(primary_table("Team")).unwrap();
            let bytes = Value::Object(obj.clone()).to_bytes().unwrap();
            table.insert(pk, bytes.as_slice()).unwrap();
        }
        tx.commit().unwrap();
    }

    #[test]
    fn drop_removes_only_the_types_buckets() {
        let (_dir, db, handle) = setup();
        let desc = handle.get().unwrap();
        apply(&db, desc, "t1", &team("Alpha", &["x"], 1, &["ann"])).unwrap();

        let tx = db.begin_write().unwrap();
        {
            let mut other = tx.open_table(index_table("idx_Teammate.name")).unwrap();
            other.insert("ann->m1", "m1").unwrap();
        }
        let dropped = IndexMaintainer::drop_indexes(&tx, "Team").unwrap();
        tx.commit().unwrap();

        assert_eq!(dropped, 5);
        assert!(snapshot(&db).is_empty());
        let tx = db.begin_read().unwrap();
        assert_eq!(IndexMaintainer::snapshot(&tx, "Teammate").unwrap().len(), 1);
    }

    #[test]
    fn rebuild_converges_from_a_damaged_index() {
        let (_dir, db, handle) = setup();
        let desc = handle.get().unwrap();
        let records = [
            ("t1", team("Alpha", &["red"], 1, &["ann"])),
            ("t2", team("Beta", &["red", "blue"], 2, &["bob"])),
        ];
        for (pk, obj) in &records {
            store_primary(&db, pk, obj);
            apply(&db, desc, pk, obj).unwrap();
        }
        let healthy = snapshot(&db);

        // Damage: a stale entry plus a missing one.
        let tx = db.begin_write().unwrap();
        {
            let mut tags = tx.open_table(index_table("idx_Team.tags")).unwrap();
            tags.insert("stale->t9", "t9").unwrap();
            tags.remove("blue->t2").unwrap();
        }
        tx.commit().unwrap();
        assert_ne!(snapshot(&db), healthy);

        let tx = db.begin_write().unwrap();
        let count = IndexMaintainer::rebuild(&tx, desc).unwrap();
        tx.commit().unwrap();
        assert_eq!(count, 2);
        assert_eq!(snapshot(&db), healthy);

        // Idempotent.
        let tx = db.begin_write().unwrap();
        IndexMaintainer::rebuild(&tx, desc).unwrap();
        tx.commit().unwrap();
        assert_eq!(snapshot(&db), healthy);
    }

    #[test]
    fn rebuild_without_records_does_not_create_the_bucket() {
        let (_dir, db, handle) = setup();
        let tx = db.begin_write().unwrap();
        assert_eq!(IndexMaintainer::rebuild(&tx, handle.get().unwrap()).unwrap(), 0);
        assert!(!table_exists(&tx, "Team").unwrap());
        tx.commit().unwrap();
    }

    #[test]
    fn rebuild_reports_corrupt_records() {
        let (_dir, db, handle) = setup();
        let tx = db.begin_write().unwrap();
        {
            let mut table = tx.open_table(primary_table("Team")).unwrap();
            table.insert("bad", b"not json".as_slice()).unwrap();
        }
        let err = IndexMaintainer::rebuild(&tx, handle.get().unwrap()).unwrap_err();
        assert!(matches!(err, IndexError::Format { ref key, .. } if key == "bad"));
    }

    #[test]
    fn indexable_values_flatten_scalar_sequences() {
        let value = Value::Seq(vec![Value::from("a"), Value::Int(2), Value::Float(1.5)]);
        assert_eq!(indexable_values(&value), vec!["a", "2", "1.5"]);
        assert!(indexable_values(&Value::Bytes(vec![1])).is_empty());
    }
}
