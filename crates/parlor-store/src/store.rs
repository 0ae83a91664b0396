//! The persistent store engine.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parlor_codec::ObjectCodec;
use parlor_index::{
    index_table, primary_table, table_exists, IndexMaintainer, IndexSnapshot, INDEX_PREFIX,
    NON_UNIQUE_DELIMITER,
};
use parlor_schema::{SchemaRegistry, Storable, TypeDescriptor, TypeRef};
use parlor_types::{Filter, Object, Value};
use redb::{
    Builder, Database, ReadOnlyTable, ReadTransaction, ReadableTable, TableDefinition, TableError,
    TableHandle, WriteTransaction,
};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::query::QueryPlan;

/// Schema-driven document store over a redb database.
///
/// Each record type lives in its own primary bucket, keyed by the caller's
/// primary key and holding the record's generic form as a JSON document.
/// Secondary indexes are kept consistent with the primary bucket: every
/// mutation runs in exactly one write transaction that covers both.
///
/// The store is `Send + Sync`; share it behind an `Arc`. Writers are
/// serialized by redb, readers see a consistent snapshot.
pub struct Store {
    db: Database,
    registry: Arc<SchemaRegistry>,
    config: StoreConfig,
    path: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("durability", &self.config.durability)
            .field("types", &self.registry.len())
            .finish()
    }
}

impl Store {
    /// Open (or create) the database described by `config`, with a fresh
    /// schema registry.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        Self::with_registry(config, Arc::new(SchemaRegistry::new()))
    }

    /// Open the database at `path` with default settings.
    pub fn open_path(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open(StoreConfig::new(path))
    }

    /// Open the database described by `config`, sharing `registry`.
    pub fn with_registry(config: StoreConfig, registry: Arc<SchemaRegistry>) -> StoreResult<Self> {
        let path = config.resolved_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut builder = Builder::new();
        if let Some(size) = config.cache_size {
            builder.set_cache_size(size);
        }
        let db = builder.create(&path).map_err(|err| {
            warn!(path = %path.display(), error = %err, "cannot open database");
            err
        })?;
        debug!(path = %path.display(), durability = ?config.durability, "store opened");

        Ok(Self {
            db,
            registry,
            config,
            path,
        })
    }

    /// Path of the open database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Descriptor of `T`, registering it on first use.
    pub fn describe<T: Storable>(&self) -> StoreResult<TypeRef> {
        Ok(self.registry.describe::<T>()?)
    }

    // ---------------------------------------------------------------
    // Record lifecycle
    // ---------------------------------------------------------------

    /// Store `record` under `key`, replacing any previous record.
    pub fn create<T: Storable>(&self, key: &str, record: &T) -> StoreResult<()> {
        self.put("create", key, record)
    }

    /// Store `record` under `key`. Index entries derived from the previous
    /// record are removed in the same transaction.
    pub fn update<T: Storable>(&self, key: &str, record: &T) -> StoreResult<()> {
        self.put("update", key, record)
    }

    fn put<T: Storable>(&self, op: &'static str, key: &str, record: &T) -> StoreResult<()> {
        let handle = self.describe::<T>()?;
        let desc = handle.get()?;
        let value = ObjectCodec::encode(desc, record)?;
        let document = value.to_bytes()?;

        let tx = self.begin_write()?;
        let previous = read_document(&tx, desc.name(), key)?;
        let removed = match previous.as_deref().and_then(|bytes| previous_object(desc, key, bytes)) {
            Some(old) => IndexMaintainer::remove(&tx, desc.name(), desc, key, &old)?,
            None => 0,
        };
        let written = match &value {
            Value::Object(obj) => IndexMaintainer::apply(&tx, desc.name(), desc, key, obj)?,
            _ => 0,
        };
        {
            let mut table = tx.open_table(primary_table(desc.name()))?;
            table.insert(key, document.as_slice())?;
        }
        tx.commit()?;

        debug!(
            op,
            type_name = desc.name(),
            key,
            replaced = previous.is_some(),
            removed,
            written,
            "record stored"
        );
        Ok(())
    }

    /// Fetch the record stored under `key`.
    pub fn get<T: Storable>(&self, key: &str) -> StoreResult<Option<T>> {
        let handle = self.describe::<T>()?;
        let desc = handle.get()?;
        let tx = self.db.begin_read()?;
        let Some(table) = open_read(&tx, primary_table(desc.name()))? else {
            return Ok(None);
        };
        let Some(guard) = table.get(key)? else {
            return Ok(None);
        };
        let value = parse_document(desc.name(), key, guard.value())?;
        Ok(Some(ObjectCodec::decode(desc, &value)?))
    }

    /// Records matching `filter`.
    ///
    /// An indexed filter field is resolved through its index bucket; any
    /// other filter decodes every record of the type. Each record appears at
    /// most once, and a non-zero `limit` caps the result length. Order is
    /// key order of the bucket scanned.
    pub fn list<T: Storable>(&self, filter: &Filter) -> StoreResult<Vec<T>> {
        let handle = self.describe::<T>()?;
        let desc = handle.get()?;
        let plan = QueryPlan::for_filter(desc, filter)?;
        let limit = (filter.limit > 0).then_some(filter.limit);
        let reached_limit = |out: &Vec<T>| limit.is_some_and(|limit| out.len() >= limit);

        let tx = self.db.begin_read()?;
        let Some(primary) = open_read(&tx, primary_table(desc.name()))? else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        if plan.is_full_scan() {
            for entry in primary.iter()? {
                if reached_limit(&out) {
                    break;
                }
                let (key, doc) = entry?;
                let value = parse_document(desc.name(), key.value(), doc.value())?;
                out.push(ObjectCodec::decode(desc, &value)?);
            }
        } else {
            let mut seen = HashSet::new();
            for pk in index_lookup(&tx, &plan)? {
                if reached_limit(&out) {
                    break;
                }
                if !seen.insert(pk.clone()) {
                    continue;
                }
                let Some(doc) = primary.get(pk.as_str())? else {
                    warn!(type_name = desc.name(), key = %pk, "index entry without record");
                    continue;
                };
                let value = parse_document(desc.name(), &pk, doc.value())?;
                out.push(ObjectCodec::decode(desc, &value)?);
            }
        }

        debug!(type_name = desc.name(), plan = ?plan, found = out.len(), "list");
        Ok(out)
    }

    /// Delete the record of type `T` stored under `key`. Returns whether a
    /// record existed.
    pub fn delete<T: Storable>(&self, key: &str) -> StoreResult<bool> {
        let handle = self.describe::<T>()?;
        self.delete_with(handle.get()?, key)
    }

    /// Delete by registered type name, for callers that only know the
    /// bucket.
    pub fn delete_record(&self, type_name: &str, key: &str) -> StoreResult<bool> {
        let handle = self
            .registry
            .by_name(type_name)
            .ok_or_else(|| StoreError::UnknownType(type_name.to_string()))?;
        self.delete_with(handle.get()?, key)
    }

    fn delete_with(&self, desc: &TypeDescriptor, key: &str) -> StoreResult<bool> {
        let tx = self.begin_write()?;
        if !table_exists(&tx, desc.name())? {
            return Ok(false);
        }
        let Some(previous) = read_document(&tx, desc.name(), key)? else {
            return Ok(false);
        };
        let removed = match previous_object(desc, key, &previous) {
            Some(old) => IndexMaintainer::remove(&tx, desc.name(), desc, key, &old)?,
            None => 0,
        };
        {
            let mut table = tx.open_table(primary_table(desc.name()))?;
            table.remove(key)?;
        }
        tx.commit()?;

        debug!(type_name = desc.name(), key, removed, "record deleted");
        Ok(true)
    }

    // ---------------------------------------------------------------
    // Index administration
    // ---------------------------------------------------------------

    /// Re-derive every index of `T` from its primary bucket. Returns the
    /// number of records re-indexed.
    pub fn rebuild_indexes<T: Storable>(&self) -> StoreResult<usize> {
        let handle = self.describe::<T>()?;
        let desc = handle.get()?;
        let tx = self.begin_write()?;
        let count = IndexMaintainer::rebuild(&tx, desc)?;
        tx.commit()?;
        info!(type_name = desc.name(), records = count, "indexes rebuilt");
        Ok(count)
    }

    /// Rebuild the indexes of every type registered so far.
    pub fn rebuild_all(&self) -> StoreResult<usize> {
        let mut total = 0;
        for name in self.registry.names() {
            let Some(handle) = self.registry.by_name(name) else {
                continue;
            };
            let desc = handle.get()?;
            if !desc.is_struct() {
                continue;
            }
            let tx = self.begin_write()?;
            total += IndexMaintainer::rebuild(&tx, desc)?;
            tx.commit()?;
        }
        info!(records = total, "all indexes rebuilt");
        Ok(total)
    }

    /// Delete every index bucket of `T`. Returns the number of buckets
    /// deleted.
    pub fn drop_indexes<T: Storable>(&self) -> StoreResult<usize> {
        let handle = self.describe::<T>()?;
        let desc = handle.get()?;
        let tx = self.begin_write()?;
        let dropped = IndexMaintainer::drop_indexes(&tx, desc.name())?;
        tx.commit()?;
        Ok(dropped)
    }

    /// Current contents of the index buckets of `T`.
    pub fn index_entries<T: Storable>(&self) -> StoreResult<IndexSnapshot> {
        let handle = self.describe::<T>()?;
        let tx = self.db.begin_read()?;
        Ok(IndexMaintainer::snapshot(&tx, handle.get()?.name())?)
    }

    // ---------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------

    /// Names of every bucket in the database, sorted.
    pub fn buckets(&self) -> StoreResult<Vec<String>> {
        let tx = self.db.begin_read()?;
        let mut names: Vec<String> = tx
            .list_tables()?
            .map(|handle| handle.name().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Raw (key, value) pairs of any bucket. Primary documents are returned
    /// as text; a missing bucket has no entries.
    pub fn raw_entries(&self, bucket: &str) -> StoreResult<Vec<(String, String)>> {
        let tx = self.db.begin_read()?;
        let mut out = Vec::new();
        if bucket.starts_with(INDEX_PREFIX) {
            let Some(table) = open_read(&tx, index_table(bucket))? else {
                return Ok(out);
            };
            for entry in table.iter()? {
                let (key, pk) = entry?;
                out.push((key.value().to_string(), pk.value().to_string()));
            }
        } else {
            let Some(table) = open_read(&tx, primary_table(bucket))? else {
                return Ok(out);
            };
            for entry in table.iter()? {
                let (key, doc) = entry?;
                out.push((
                    key.value().to_string(),
                    String::from_utf8_lossy(doc.value()).into_owned(),
                ));
            }
        }
        Ok(out)
    }

    /// Number of records of type `T`.
    pub fn len<T: Storable>(&self) -> StoreResult<usize> {
        let handle = self.describe::<T>()?;
        let tx = self.db.begin_read()?;
        let Some(table) = open_read(&tx, primary_table(handle.get()?.name()))? else {
            return Ok(0);
        };
        let mut count = 0;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    fn begin_write(&self) -> StoreResult<WriteTransaction> {
        let mut tx = self.db.begin_write()?;
        tx.set_durability(self.config.durability.into());
        Ok(tx)
    }
}

/// Open a table for reading; a table that was never written reads as
/// missing.
fn open_read<K, V>(
    tx: &ReadTransaction,
    definition: TableDefinition<'_, K, V>,
) -> StoreResult<Option<ReadOnlyTable<K, V>>>
where
    K: redb::Key + 'static,
    V: redb::Value + 'static,
{
    match tx.open_table(definition) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn read_document(tx: &WriteTransaction, bucket: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
    let table = tx.open_table(primary_table(bucket))?;
    let document = table.get(key)?.map(|guard| guard.value().to_vec());
    Ok(document)
}

fn parse_document(bucket: &str, key: &str, bytes: &[u8]) -> StoreResult<Value> {
    Value::from_bytes(bytes).map_err(|err| StoreError::Corrupt {
        bucket: bucket.to_string(),
        key: key.to_string(),
        reason: err.to_string(),
    })
}

/// The previous record's generic form, when its index entries can be
/// derived from it.
fn previous_object(desc: &TypeDescriptor, key: &str, bytes: &[u8]) -> Option<Object> {
    if !desc.is_struct() {
        return None;
    }
    match Value::from_bytes(bytes) {
        Ok(Value::Object(obj)) => Some(obj),
        Ok(other) => {
            warn!(type_name = desc.name(), key, kind = other.kind_name(), "previous record is not an object");
            None
        }
        Err(err) => {
            warn!(type_name = desc.name(), key, error = %err, "previous record unreadable; rebuild indexes");
            None
        }
    }
}

/// Primary keys referenced by an index plan, in index key order.
fn index_lookup(tx: &ReadTransaction, plan: &QueryPlan) -> StoreResult<Vec<String>> {
    let mut pks = Vec::new();
    match plan {
        QueryPlan::FullScan => {}
        QueryPlan::Exact { bucket, key } => {
            let Some(index) = open_read(tx, index_table(bucket))? else {
                return Ok(pks);
            };
            if let Some(pk) = index.get(key.as_str())? {
                pks.push(pk.value().to_string());
            }
        }
        QueryPlan::Prefix { bucket, prefix } => {
            let Some(index) = open_read(tx, index_table(bucket))? else {
                return Ok(pks);
            };
            for entry in index.range(prefix.as_str()..)? {
                let (key, pk) = entry?;
                if !key.value().starts_with(prefix.as_str()) {
                    break;
                }
                pks.push(pk.value().to_string());
            }
        }
        QueryPlan::Matching { bucket, value } => {
            let Some(index) = open_read(tx, index_table(bucket))? else {
                return Ok(pks);
            };
            let prefix = format!("{value}{NON_UNIQUE_DELIMITER}");
            for entry in index.range(prefix.as_str()..)? {
                let (key, pk) = entry?;
                let Some(owner) = key.value().strip_prefix(prefix.as_str()) else {
                    break;
                };
                // `value->x->pk` belongs to the value `value->x`.
                if owner == pk.value() {
                    pks.push(pk.value().to_string());
                }
            }
        }
    }
    Ok(pks)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use parlor_schema::{SchemaBuilder, SchemaResult, Shape};
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    use super::*;
    use crate::config::DurabilityMode;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Settings {
        mode: String,
        rounds: i32,
    }

    impl Storable for Settings {
        fn type_name() -> &'static str {
            "Settings"
        }

        fn describe(schema: &mut SchemaBuilder<'_>) -> SchemaResult<Shape> {
            Ok(Shape::Struct(vec![
                schema.string("mode").indexed(),
                schema.int_sized("rounds", 32),
            ]))
        }
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Gamer {
        login: String,
        city: String,
        tags: Vec<String>,
        level: i64,
        score: f64,
        active: bool,
        settings: Settings,
        note: Option<String>,
    }

    impl Storable for Gamer {
        fn type_name() -> &'static str {
            "Gamer"
        }

        fn describe(schema: &mut SchemaBuilder<'_>) -> SchemaResult<Shape> {
            Ok(Shape::Struct(vec![
                schema.string("login").unique().case_insensitive(),
                schema.string("city").indexed(),
                schema.array::<String>("tags")?.indexed(),
                schema.int("level").indexed(),
                schema.float("score"),
                schema.boolean("active").indexed(),
                schema.nested::<Settings>("settings")?,
                schema.pointer::<String>("note")?,
            ]))
        }
    }

    fn gamer(login: &str, city: &str, tags: &[&str]) -> Gamer {
        Gamer {
            login: login.into(),
            city: city.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            level: 1,
            score: 0.5,
            active: true,
            settings: Settings {
                mode: "classic".into(),
                rounds: 3,
            },
            note: None,
        }
    }

    fn open() -> (TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("store")).with_durability(DurabilityMode::None);
        let store = Store::open(config).unwrap();
        (dir, store)
    }

    fn logins(gamers: &[Gamer]) -> BTreeSet<String> {
        gamers.iter().map(|g| g.login.clone()).collect()
    }

    /// Index state must match what a rebuild derives from the primary data.
    fn assert_indexes_consistent(store: &Store) {
        let live = store.index_entries::<Gamer>().unwrap();
        store.rebuild_indexes::<Gamer>().unwrap();
        assert_eq!(live, store.index_entries::<Gamer>().unwrap());
    }

    // ---------------------------------------------------------------
    // create / get
    // ---------------------------------------------------------------

    #[test]
    fn create_then_get() {
        let (_dir, store) = open();
        let mut alice = gamer("Alice", "Oslo", &["red"]);
        alice.note = Some("hi".into());
        store.create("a", &alice).unwrap();

        assert_eq!(store.get::<Gamer>("a").unwrap(), Some(alice));
        assert_eq!(store.get::<Gamer>("missing").unwrap(), None);
        assert_eq!(store.len::<Gamer>().unwrap(), 1);
        assert!(store.path().ends_with("store.redb"));
    }

    #[test]
    fn empty_database_reads_as_empty() {
        let (_dir, store) = open();
        assert_eq!(store.get::<Gamer>("a").unwrap(), None);
        assert!(store.list::<Gamer>(&Filter::all()).unwrap().is_empty());
        assert!(store.list::<Gamer>(&Filter::by("city", "Oslo")).unwrap().is_empty());
        assert_eq!(store.len::<Gamer>().unwrap(), 0);
        assert!(!store.delete::<Gamer>("a").unwrap());
        assert!(store.buckets().unwrap().is_empty());
    }

    #[test]
    fn scalar_records() {
        let (_dir, store) = open();
        store.create("motd", &"welcome".to_string()).unwrap();
        assert_eq!(store.get::<String>("motd").unwrap().as_deref(), Some("welcome"));
        assert_eq!(store.list::<String>(&Filter::all()).unwrap(), vec!["welcome".to_string()]);
        assert!(store.delete_record("string", "motd").unwrap());
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("durable");
        {
            let store = Store::open_path(&path).unwrap();
            store.create("a", &gamer("Alice", "Oslo", &[])).unwrap();
        }
        let store = Store::open_path(&path).unwrap();
        assert_eq!(store.get::<Gamer>("a").unwrap().unwrap().login, "Alice");
        let found = store.list::<Gamer>(&Filter::by("login", "alice")).unwrap();
        assert_eq!(found.len(), 1);
    }

    // ---------------------------------------------------------------
    // Unique and case-insensitive indexes
    // ---------------------------------------------------------------

    #[test]
    fn unique_index_is_exclusive() {
        let (_dir, store) = open();
        store.create("a", &gamer("Alice", "Oslo", &[])).unwrap();

        let err = store.create("b", &gamer("ALICE", "Rome", &[])).unwrap_err();
        assert!(err.is_constraint_violation(), "{err}");

        // Nothing from the failed write is visible.
        assert_eq!(store.get::<Gamer>("b").unwrap(), None);
        assert!(store.list::<Gamer>(&Filter::by("city", "Rome")).unwrap().is_empty());
        let found = store.list::<Gamer>(&Filter::by("login", "alice")).unwrap();
        assert_eq!(logins(&found), BTreeSet::from(["Alice".to_string()]));
        assert_indexes_consistent(&store);
    }

    #[test]
    fn case_insensitive_lookup() {
        let (_dir, store) = open();
        store.create("a", &gamer("Alice", "Oslo", &[])).unwrap();
        store.create("b", &gamer("Alfred", "Oslo", &[])).unwrap();

        for mask in ["alice", "ALICE", "aLiCe"] {
            let found = store.list::<Gamer>(&Filter::by("login", mask)).unwrap();
            assert_eq!(logins(&found), BTreeSet::from(["Alice".to_string()]), "mask {mask}");
        }
        let found = store.list::<Gamer>(&Filter::seek("login", "AL")).unwrap();
        assert_eq!(found.len(), 2);
        assert!(store.list::<Gamer>(&Filter::by("login", "al")).unwrap().is_empty());
    }

    // ---------------------------------------------------------------
    // Non-unique indexes and list
    // ---------------------------------------------------------------

    #[test]
    fn non_unique_exact_match_does_not_leak_prefixes() {
        let (_dir, store) = open();
        store.create("a", &gamer("A", "Oslo", &[])).unwrap();
        store.create("b", &gamer("B", "Oslo-East", &[])).unwrap();
        // Shares the `Oslo->` key prefix with the entries of "Oslo".
        store.create("c", &gamer("C", "Oslo->East", &[])).unwrap();

        let exact = store.list::<Gamer>(&Filter::by("city", "Oslo")).unwrap();
        assert_eq!(logins(&exact), BTreeSet::from(["A".to_string()]));
        let delimited = store.list::<Gamer>(&Filter::by("city", "Oslo->East")).unwrap();
        assert_eq!(logins(&delimited), BTreeSet::from(["C".to_string()]));
        let seek = store.list::<Gamer>(&Filter::seek("city", "Oslo")).unwrap();
        assert_eq!(seek.len(), 3);
    }

    #[test]
    fn unencodable_records_leave_the_store_unchanged() {
        let (_dir, store) = open();
        store.create("a", &gamer("A", "Oslo", &[])).unwrap();
        let before = store.index_entries::<Gamer>().unwrap();

        let mut broken = gamer("N", "Bergen", &["red"]);
        broken.score = f64::NAN;
        let err = store.create("n", &broken).unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)), "{err}");

        let mut replaced = gamer("A", "Bergen", &[]);
        replaced.score = f64::INFINITY;
        assert!(store.update("a", &replaced).is_err());

        assert!(store.get::<Gamer>("n").unwrap().is_none());
        assert_eq!(store.get::<Gamer>("a").unwrap().unwrap().city, "Oslo");
        assert_eq!(store.list::<Gamer>(&Filter::all()).unwrap().len(), 1);
        assert_eq!(store.index_entries::<Gamer>().unwrap(), before);
    }

    #[test]
    fn array_elements_are_indexed_individually() {
        let (_dir, store) = open();
        store.create("a", &gamer("A", "Oslo", &["red", "blue"])).unwrap();
        store.create("b", &gamer("B", "Oslo", &["blue"])).unwrap();

        let blue = store.list::<Gamer>(&Filter::by("tags", "blue")).unwrap();
        assert_eq!(blue.len(), 2);
        let red = store.list::<Gamer>(&Filter::by("tags", "red")).unwrap();
        assert_eq!(logins(&red), BTreeSet::from(["A".to_string()]));
    }

    #[test]
    fn duplicate_array_values_list_the_record_once() {
        let (_dir, store) = open();
        store.create("a", &gamer("A", "Oslo", &["red", "rose"])).unwrap();
        let found = store.list::<Gamer>(&Filter::seek("tags", "r")).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn integers_and_booleans_are_indexed() {
        let (_dir, store) = open();
        let mut veteran = gamer("V", "Oslo", &[]);
        veteran.level = 42;
        veteran.active = false;
        store.create("v", &veteran).unwrap();
        store.create("n", &gamer("N", "Oslo", &[])).unwrap();

        let found = store.list::<Gamer>(&Filter::by("level", "42")).unwrap();
        assert_eq!(logins(&found), BTreeSet::from(["V".to_string()]));
        let inactive = store.list::<Gamer>(&Filter::by("active", "0")).unwrap();
        assert_eq!(logins(&inactive), BTreeSet::from(["V".to_string()]));
    }

    #[test]
    fn nested_field_filter() {
        let (_dir, store) = open();
        let mut duel = gamer("D", "Oslo", &[]);
        duel.settings.mode = "duel".into();
        store.create("d", &duel).unwrap();
        store.create("c", &gamer("C", "Oslo", &[])).unwrap();

        let found = store.list::<Gamer>(&Filter::by("settings.mode", "duel")).unwrap();
        assert_eq!(found, vec![duel]);
    }

    #[test]
    fn full_scan_and_limit() {
        let (_dir, store) = open();
        for (key, login) in [("1", "a"), ("2", "b"), ("3", "c")] {
            store.create(key, &gamer(login, "Oslo", &[])).unwrap();
        }
        assert_eq!(store.list::<Gamer>(&Filter::all()).unwrap().len(), 3);
        assert_eq!(store.list::<Gamer>(&Filter::all().with_limit(2)).unwrap().len(), 2);
        assert_eq!(
            store.list::<Gamer>(&Filter::by("city", "Oslo").with_limit(1)).unwrap().len(),
            1
        );
        // An unindexed field scans everything.
        assert_eq!(store.list::<Gamer>(&Filter::by("score", "x")).unwrap().len(), 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn non_unique_enumeration_ignores_insertion_order(
            order in Just(vec!["A", "B", "C"]).prop_shuffle()
        ) {
            let (_dir, store) = open();
            store.create("z", &gamer("Z", "Rome", &[])).unwrap();
            for login in &order {
                store.create(&login.to_lowercase(), &gamer(login, "Oslo", &[])).unwrap();
            }
            let found = store.list::<Gamer>(&Filter::seek("city", "Oslo")).unwrap();
            let expected: BTreeSet<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
            prop_assert_eq!(found.len(), 3);
            prop_assert_eq!(logins(&found), expected);
        }
    }

    // ---------------------------------------------------------------
    // update / delete
    // ---------------------------------------------------------------

    #[test]
    fn update_leaves_no_stale_entries() {
        let (_dir, store) = open();
        store.create("a", &gamer("Alice", "Oslo", &["red"])).unwrap();

        let mut moved = gamer("Alicia", "Bergen", &["blue"]);
        moved.settings.mode = "duel".into();
        store.update("a", &moved).unwrap();

        assert!(store.list::<Gamer>(&Filter::by("city", "Oslo")).unwrap().is_empty());
        assert!(store.list::<Gamer>(&Filter::by("tags", "red")).unwrap().is_empty());
        assert!(store.list::<Gamer>(&Filter::by("settings.mode", "classic")).unwrap().is_empty());
        assert_eq!(store.list::<Gamer>(&Filter::by("city", "Bergen")).unwrap(), vec![moved]);

        // The old unique value is free again.
        store.create("b", &gamer("Alice", "Oslo", &[])).unwrap();
        assert_indexes_consistent(&store);
    }

    #[test]
    fn create_over_existing_key_is_an_upsert() {
        let (_dir, store) = open();
        store.create("a", &gamer("Alice", "Oslo", &[])).unwrap();
        store.create("a", &gamer("Alice", "Rome", &[])).unwrap();
        assert_eq!(store.len::<Gamer>().unwrap(), 1);
        assert!(store.list::<Gamer>(&Filter::by("city", "Oslo")).unwrap().is_empty());
        assert_indexes_consistent(&store);
    }

    #[test]
    fn delete_removes_index_traces() {
        let (_dir, store) = open();
        store.create("a", &gamer("Alice", "Oslo", &["red"])).unwrap();
        store.create("b", &gamer("Bob", "Oslo", &["red"])).unwrap();

        assert!(store.delete::<Gamer>("a").unwrap());
        assert!(!store.delete::<Gamer>("a").unwrap());
        assert_eq!(store.get::<Gamer>("a").unwrap(), None);
        let found = store.list::<Gamer>(&Filter::by("tags", "red")).unwrap();
        assert_eq!(logins(&found), BTreeSet::from(["Bob".to_string()]));
        assert!(store.list::<Gamer>(&Filter::by("login", "alice")).unwrap().is_empty());
        assert_indexes_consistent(&store);

        assert!(store.delete_record("Gamer", "b").unwrap());
        assert!(store.index_entries::<Gamer>().unwrap().is_empty());
    }

    #[test]
    fn delete_record_requires_a_registered_type() {
        let (_dir, store) = open();
        let err = store.delete_record("Ghost", "a").unwrap_err();
        assert!(matches!(err, StoreError::UnknownType(ref name) if name == "Ghost"));
    }

    // ---------------------------------------------------------------
    // Index administration
    // ---------------------------------------------------------------

    #[test]
    fn rebuild_converges_after_dropping_indexes() {
        let (_dir, store) = open();
        store.create("a", &gamer("Alice", "Oslo", &["red", "blue"])).unwrap();
        store.create("b", &gamer("Bob", "Rome", &["red"])).unwrap();
        let healthy = store.index_entries::<Gamer>().unwrap();
        assert!(healthy.contains_key("idx_Gamer.settings.mode"));

        assert_eq!(store.drop_indexes::<Gamer>().unwrap(), healthy.len());
        assert!(store.index_entries::<Gamer>().unwrap().is_empty());
        assert!(store.list::<Gamer>(&Filter::by("city", "Oslo")).unwrap().is_empty());

        assert_eq!(store.rebuild_indexes::<Gamer>().unwrap(), 2);
        assert_eq!(store.index_entries::<Gamer>().unwrap(), healthy);
        assert_eq!(store.list::<Gamer>(&Filter::by("city", "Oslo")).unwrap().len(), 1);

        assert_eq!(store.rebuild_all().unwrap(), 2);
        assert_eq!(store.index_entries::<Gamer>().unwrap(), healthy);
    }

    #[test]
    fn inspection() {
        let (_dir, store) = open();
        store.create("a", &gamer("Alice", "Oslo", &[])).unwrap();

        let buckets = store.buckets().unwrap();
        assert!(buckets.contains(&"Gamer".to_string()));
        assert!(buckets.contains(&"idx_Gamer.login".to_string()));

        let primary = store.raw_entries("Gamer").unwrap();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].0, "a");
        assert!(primary[0].1.contains("\"login\":\"Alice\""));

        let index = store.raw_entries("idx_Gamer.city").unwrap();
        assert_eq!(index, vec![("Oslo->a".to_string(), "a".to_string())]);
        assert!(store.raw_entries("nothing").unwrap().is_empty());
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let (_dir, store) = open();
        std::thread::scope(|scope| {
            for t in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..10 {
                        let login = format!("p{t}-{i}");
                        store.create(&login, &gamer(&login, "Oslo", &[])).unwrap();
                        store.list::<Gamer>(&Filter::by("city", "Oslo")).unwrap();
                    }
                });
            }
        });
        assert_eq!(store.len::<Gamer>().unwrap(), 40);
        assert_eq!(store.list::<Gamer>(&Filter::by("city", "Oslo")).unwrap().len(), 40);
        assert_indexes_consistent(&store);
    }
}
