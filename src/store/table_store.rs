//! In-memory SQLite table store.
//!
//! Each ingestion writes into a namespace: every table it creates is named
//! `{namespace}_{logical}`, where the logical name is the sanitized record
//! type tag. Rows are streamed into `staging_` tables in batches and each
//! staging table replaces its final table in a single transaction once the
//! record stream ends, so readers never observe a half-written table.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use uuid::Uuid;

use super::sql_guard::{self, TableMap};
use super::{QueryFailure, StoreError};
use crate::telemetry::{Record, Scalar};

/// Rows buffered per type before they are written.
pub const DEFAULT_BATCH_ROWS: usize = 5_000;

const NAMESPACE_PREFIX: &str = "log_";
const STAGING_PREFIX: &str = "staging_";

/// SQLite VM instructions between cancellation checks.
const PROGRESS_OPS: i32 = 1_000;

/// Shared flag that interrupts a running query when set.
pub type CancelFlag = Arc<AtomicBool>;

/// Identifier prefixed to every table of one ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    pub fn generate() -> Self {
        Self(format!("{}{}", NAMESPACE_PREFIX, Uuid::new_v4().simple()))
    }

    /// Accepts `log_` followed by ASCII alphanumerics, so that one
    /// namespace's table prefix can never be a prefix of another's.
    pub fn parse(id: &str) -> Result<Self, StoreError> {
        let valid = id
            .strip_prefix(NAMESPACE_PREFIX)
            .map(|rest| {
                !rest.is_empty()
                    && rest.len() <= 64
                    && rest.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .unwrap_or(false);
        if !valid {
            return Err(StoreError::InvalidNamespace(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn physical_name(&self, logical: &str) -> String {
        format!("{}_{}", self.0, logical)
    }

    fn table_prefix(&self) -> String {
        format!("{}_", self.0)
    }

    fn staging_prefix(&self) -> String {
        format!("{}{}_", STAGING_PREFIX, self.0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_identifier(tag: &str) -> String {
    let clean: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if clean.is_empty() {
        "_".to_string()
    } else {
        clean
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column_def(name: &str, sql_type: &str) -> String {
    format!("{} {}", quote(name), sql_type).trim_end().to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedTable {
    pub table: String,
    pub error: String,
}

/// Summary of one ingestion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub records_decoded: u64,
    pub rows_stored: u64,
    /// Logical names, in order of first appearance
    pub tables_created: Vec<String>,
    pub failed_tables: Vec<FailedTable>,
}

/// Result rows of a guarded query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
    /// More rows were available than the caller asked for.
    pub truncated: bool,
}

/// One record type being written during an ingestion.
struct StagedTable {
    logical: String,
    staging: String,
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    pending: Vec<Vec<(String, Scalar)>>,
    rows: u64,
    created: bool,
    failed: Option<String>,
}

impl StagedTable {
    fn new(logical: String, namespace: &Namespace) -> Self {
        let staging = format!("{}{}", namespace.staging_prefix(), logical);
        Self {
            logical,
            staging,
            columns: Vec::new(),
            column_index: HashMap::new(),
            pending: Vec::new(),
            rows: 0,
            created: false,
            failed: None,
        }
    }

    /// Write buffered rows, widening the table first if new fields appeared.
    fn flush(&mut self, conn: &mut Connection) -> rusqlite::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let existing = self.columns.len();
        let mut added: Vec<(String, &'static str)> = Vec::new();
        for row in &self.pending {
            for (name, value) in row {
                let key = name.to_lowercase();
                match self.column_index.get(&key) {
                    Some(&i) if i >= existing => {
                        let slot = &mut added[i - existing];
                        if slot.1.is_empty() {
                            slot.1 = value.sql_type();
                        }
                    }
                    Some(_) => {}
                    None => {
                        self.column_index.insert(key, self.columns.len());
                        self.columns.push(name.clone());
                        added.push((name.clone(), value.sql_type()));
                    }
                }
            }
        }

        let tx = conn.transaction()?;
        if !self.created {
            let defs: Vec<String> = added.iter().map(|(n, t)| column_def(n, t)).collect();
            tx.execute(
                &format!("CREATE TABLE {} ({})", quote(&self.staging), defs.join(", ")),
                [],
            )?;
        } else {
            for (name, sql_type) in &added {
                tx.execute(
                    &format!(
                        "ALTER TABLE {} ADD COLUMN {}",
                        quote(&self.staging),
                        column_def(name, sql_type)
                    ),
                    [],
                )?;
            }
        }

        let mut inserted = 0u64;
        for row in self.pending.drain(..) {
            let mut seen = HashSet::with_capacity(row.len());
            let mut names = Vec::with_capacity(row.len());
            let mut values = Vec::with_capacity(row.len());
            for (name, value) in &row {
                let Some(&i) = self.column_index.get(&name.to_lowercase()) else {
                    continue;
                };
                if seen.insert(i) {
                    names.push(quote(&self.columns[i]));
                    values.push(value);
                }
            }
            let placeholders: Vec<String> =
                (1..=names.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(&self.staging),
                names.join(", "),
                placeholders.join(", ")
            );
            let mut stmt = tx.prepare_cached(&sql)?;
            stmt.execute(params_from_iter(values))?;
            inserted += 1;
        }
        tx.commit()?;

        self.created = true;
        self.rows += inserted;
        Ok(())
    }

    /// Atomically replace the final table with the staging table.
    fn finalize(&self, conn: &mut Connection, physical: &str) -> rusqlite::Result<()> {
        let tx = conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", quote(physical)), [])?;
        tx.execute(
            &format!(
                "ALTER TABLE {} RENAME TO {}",
                quote(&self.staging),
                quote(physical)
            ),
            [],
        )?;
        tx.commit()
    }

    fn fail(&mut self, conn: &Connection, err: rusqlite::Error) {
        tracing::warn!(table = %self.logical, error = %err, "Failed to store table, omitting it");
        self.failed = Some(err.to_string());
        self.pending.clear();
        if let Err(e) = conn.execute(&format!("DROP TABLE IF EXISTS {}", quote(&self.staging)), []) {
            tracing::warn!(table = %self.staging, error = %e, "Failed to drop staging table");
        }
    }
}

fn tables_with_prefix(conn: &Connection, prefix: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND substr(name, 1, ?1) = ?2 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![prefix.len() as i64, prefix], |row| row.get::<_, String>(0))?;
    rows.collect()
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let rows = stmt.query_map([table], |row| row.get::<_, String>(0))?;
    rows.collect()
}

fn run_query(conn: &Connection, sql: &str, max_rows: usize) -> Result<QueryRows, QueryFailure> {
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(QueryFailure::NotReadOnly(
            "statement would modify the database".to_string(),
        ));
    }
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next()? {
        if out.len() >= max_rows {
            truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(Scalar::from(row.get_ref(i)?));
        }
        out.push(values);
    }

    Ok(QueryRows {
        columns,
        rows: out,
        truncated,
    })
}

/// Relational store shared by every session of the process.
pub struct TableStore {
    conn: Mutex<Connection>,
    batch_rows: usize,
}

impl TableStore {
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            batch_rows: DEFAULT_BATCH_ROWS,
        })
    }

    pub fn with_batch_rows(mut self, batch_rows: usize) -> Self {
        self.batch_rows = batch_rows.max(1);
        self
    }

    /// Establish a namespace for `id`. No tables are created yet.
    pub fn begin_namespace(&self, id: &str) -> Result<Namespace, StoreError> {
        let namespace = Namespace::parse(id)?;
        tracing::debug!(namespace = %namespace, "Began namespace");
        Ok(namespace)
    }

    /// Group `records` by type and create or replace one table per type.
    ///
    /// At most `batch_rows` rows per type are held in memory. A type whose
    /// table cannot be written is reported in `failed_tables` and the rest of
    /// the ingestion continues.
    pub fn ingest<I>(&self, namespace: &Namespace, records: I) -> Result<IngestReport, StoreError>
    where
        I: IntoIterator<Item = Record>,
    {
        // Staging leftovers from an interrupted ingestion under this namespace.
        {
            let conn = self.conn.lock();
            for name in tables_with_prefix(&conn, &namespace.staging_prefix())? {
                conn.execute(&format!("DROP TABLE IF EXISTS {}", quote(&name)), [])?;
            }
        }

        let mut report = IngestReport::default();
        let mut staged: HashMap<String, StagedTable> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for record in records {
            report.records_decoded += 1;
            if record.fields.is_empty() {
                continue;
            }

            let logical = sanitize_identifier(&record.type_tag);
            // SQLite table names are case-insensitive
            let key = logical.to_lowercase();
            let table = staged.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                StagedTable::new(logical, namespace)
            });
            if table.failed.is_some() {
                continue;
            }

            table.pending.push(record.fields);
            if table.pending.len() >= self.batch_rows {
                let mut conn = self.conn.lock();
                if let Err(e) = table.flush(&mut conn) {
                    table.fail(&conn, e);
                }
            }
        }

        let mut conn = self.conn.lock();
        for key in &order {
            let Some(table) = staged.get_mut(key) else {
                continue;
            };
            if table.failed.is_none() {
                if let Err(e) = table.flush(&mut conn) {
                    table.fail(&conn, e);
                }
            }
            if table.failed.is_none() {
                let physical = namespace.physical_name(&table.logical);
                match table.finalize(&mut conn, &physical) {
                    Ok(()) => {
                        tracing::debug!(
                            table = %physical,
                            rows = table.rows,
                            columns = table.columns.len(),
                            "Created table"
                        );
                        report.tables_created.push(table.logical.clone());
                        report.rows_stored += table.rows;
                    }
                    Err(e) => table.fail(&conn, e),
                }
            }
            if let Some(error) = &table.failed {
                report.failed_tables.push(FailedTable {
                    table: table.logical.clone(),
                    error: error.clone(),
                });
            }
        }

        tracing::info!(
            namespace = %namespace,
            records = report.records_decoded,
            tables = report.tables_created.len(),
            rows = report.rows_stored,
            failed = report.failed_tables.len(),
            "Ingestion finished"
        );
        Ok(report)
    }

    /// Remove every table of `namespace`. Dropping an empty or unknown
    /// namespace is a no-op. Returns the number of tables removed.
    pub fn drop_namespace(&self, namespace: &Namespace) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let mut names = tables_with_prefix(&conn, &namespace.table_prefix())?;
        names.extend(tables_with_prefix(&conn, &namespace.staging_prefix())?);
        if names.is_empty() {
            return Ok(0);
        }

        let tx = conn.transaction()?;
        for name in &names {
            tx.execute(&format!("DROP TABLE IF EXISTS {}", quote(name)), [])?;
        }
        tx.commit()?;

        tracing::info!(namespace = %namespace, tables = names.len(), "Dropped namespace");
        Ok(names.len())
    }

    /// Logical table names of `namespace` with their columns in order.
    pub fn list_schema(
        &self,
        namespace: &Namespace,
    ) -> Result<BTreeMap<String, Vec<String>>, StoreError> {
        let conn = self.conn.lock();
        let prefix = namespace.table_prefix();
        let mut schema = BTreeMap::new();
        for name in tables_with_prefix(&conn, &prefix)? {
            let columns = table_columns(&conn, &name)?;
            schema.insert(name[prefix.len()..].to_string(), columns);
        }
        Ok(schema)
    }

    /// Namespaces that currently own at least one table.
    pub fn namespaces(&self) -> Result<Vec<Namespace>, StoreError> {
        let conn = self.conn.lock();
        let mut found: Vec<Namespace> = Vec::new();
        for name in tables_with_prefix(&conn, NAMESPACE_PREFIX)? {
            let rest = &name[NAMESPACE_PREFIX.len()..];
            let Some((id, _)) = rest.split_once('_') else {
                continue;
            };
            if let Ok(ns) = Namespace::parse(&format!("{}{}", NAMESPACE_PREFIX, id)) {
                if !found.contains(&ns) {
                    found.push(ns);
                }
            }
        }
        Ok(found)
    }

    /// Run one read-only statement written against logical table names.
    ///
    /// At most `max_rows` rows are returned. Setting `cancel` interrupts the
    /// statement at the next progress check.
    pub fn query(
        &self,
        namespace: &Namespace,
        sql: &str,
        max_rows: usize,
        cancel: &CancelFlag,
    ) -> Result<QueryRows, QueryFailure> {
        let conn = self.conn.lock();
        let prefix = namespace.table_prefix();
        let tables: TableMap = tables_with_prefix(&conn, &prefix)?
            .into_iter()
            .map(|name| (name[prefix.len()..].to_lowercase(), name))
            .collect();

        let rewritten = sql_guard::prepare(sql, &tables)?;
        tracing::debug!(namespace = %namespace, sql = %rewritten, "Executing query");

        let flag = Arc::clone(cancel);
        conn.progress_handler(PROGRESS_OPS, Some(move || flag.load(Ordering::Relaxed)));
        let result = run_query(&conn, &rewritten, max_rows);
        conn.progress_handler(0, None::<fn() -> bool>);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::test_support::{DataFlashWriter, Field};
    use proptest::prelude::*;
    use std::io::Cursor;

    fn record(tag: &str, fields: &[(&str, Scalar)]) -> Record {
        let mut r = Record::new(tag);
        for (name, value) in fields {
            r.push(*name, value.clone());
        }
        r
    }

    fn alt_gps_records() -> Vec<Record> {
        vec![
            record("ALT", &[("alt", Scalar::Int(10))]),
            record("GPS", &[("fix", Scalar::Int(3))]),
            record("ALT", &[("alt", Scalar::Int(12))]),
        ]
    }

    fn no_cancel() -> CancelFlag {
        Arc::new(AtomicBool::new(false))
    }

    fn count(store: &TableStore, ns: &Namespace, table: &str) -> i64 {
        let rows = store
            .query(ns, &format!("SELECT COUNT(*) FROM {}", table), 10, &no_cancel())
            .unwrap();
        match rows.rows[0][0] {
            Scalar::Int(n) => n,
            ref other => panic!("unexpected {:?}", other),
        }
    }

    mod namespace {
        use super::*;

        #[test]
        fn test_generate_is_valid() {
            let ns = Namespace::generate();
            assert!(Namespace::parse(ns.as_str()).is_ok());
            assert_eq!(ns.physical_name("GPS"), format!("{}_GPS", ns));
        }

        #[test]
        fn test_parse_rejects_nested_prefixes() {
            assert!(Namespace::parse("log_a_b").is_err());
            assert!(Namespace::parse("log_").is_err());
            assert!(Namespace::parse("abc").is_err());
            assert!(Namespace::parse("log_x\"; DROP").is_err());
        }

        #[test]
        fn test_sanitize_identifier() {
            assert_eq!(sanitize_identifier("GPS_STATUS"), "GPS_STATUS");
            assert_eq!(sanitize_identifier("vehicle-gps.0"), "vehicle_gps_0");
            assert_eq!(sanitize_identifier(""), "_");
        }
    }

    mod ingest {
        use super::*;

        #[test]
        fn test_alt_and_gps_tables_do_not_mix_columns() {
            let store = TableStore::open_in_memory().unwrap();
            let ns = Namespace::generate();
            let report = store.ingest(&ns, alt_gps_records()).unwrap();

            assert_eq!(report.tables_created, vec!["ALT", "GPS"]);
            assert_eq!(report.rows_stored, 3);
            assert!(report.failed_tables.is_empty());

            let schema = store.list_schema(&ns).unwrap();
            assert_eq!(schema["ALT"], vec!["alt"]);
            assert_eq!(schema["GPS"], vec!["fix"]);
            assert_eq!(count(&store, &ns, "ALT"), 2);
            assert_eq!(count(&store, &ns, "GPS"), 1);
        }

        #[test]
        fn test_column_union_with_nulls_across_batches() {
            let store = TableStore::open_in_memory().unwrap().with_batch_rows(1);
            let ns = Namespace::generate();
            let records = vec![
                record("BAT", &[("volt", Scalar::Float(12.1))]),
                record("BAT", &[("volt", Scalar::Float(12.0)), ("curr", Scalar::Float(3.5))]),
                record("BAT", &[("mode", Scalar::Text("ok".into()))]),
            ];
            store.ingest(&ns, records).unwrap();

            let schema = store.list_schema(&ns).unwrap();
            assert_eq!(schema["BAT"], vec!["volt", "curr", "mode"]);

            let rows = store
                .query(&ns, "SELECT volt, curr, mode FROM BAT", 10, &no_cancel())
                .unwrap();
            assert_eq!(rows.rows[0], vec![Scalar::Float(12.1), Scalar::Null, Scalar::Null]);
            assert_eq!(rows.rows[2][2], Scalar::Text("ok".into()));
        }

        #[test]
        fn test_reingest_replaces_tables() {
            let store = TableStore::open_in_memory().unwrap();
            let ns = Namespace::generate();
            store.ingest(&ns, alt_gps_records()).unwrap();
            store
                .ingest(&ns, vec![record("ALT", &[("alt", Scalar::Int(99))])])
                .unwrap();

            assert_eq!(count(&store, &ns, "ALT"), 1);
            // Types absent from the second stream keep their previous table.
            assert_eq!(count(&store, &ns, "GPS"), 1);
        }

        #[test]
        fn test_case_variants_share_a_table() {
            let store = TableStore::open_in_memory().unwrap();
            let ns = Namespace::generate();
            let report = store
                .ingest(
                    &ns,
                    vec![
                        record("gps", &[("fix", Scalar::Int(1))]),
                        record("GPS", &[("Fix", Scalar::Int(2))]),
                    ],
                )
                .unwrap();
            assert_eq!(report.tables_created, vec!["gps"]);
            assert_eq!(count(&store, &ns, "GPS"), 2);
        }

        #[test]
        fn test_failed_type_is_omitted() {
            let store = TableStore::open_in_memory().unwrap();
            let ns = Namespace::generate();
            // More columns than SQLite allows in one table.
            let mut wide = Record::new("WIDE");
            for i in 0..2100 {
                wide.push(format!("c{}", i), Scalar::Int(i));
            }
            let report = store
                .ingest(&ns, vec![wide, record("GPS", &[("fix", Scalar::Int(3))])])
                .unwrap();

            assert_eq!(report.tables_created, vec!["GPS"]);
            assert_eq!(report.failed_tables.len(), 1);
            assert_eq!(report.failed_tables[0].table, "WIDE");
            assert!(!store.list_schema(&ns).unwrap().contains_key("WIDE"));
        }

        #[test]
        fn test_empty_records_are_not_stored() {
            let store = TableStore::open_in_memory().unwrap();
            let ns = Namespace::generate();
            let report = store.ingest(&ns, vec![Record::new("EMPTY")]).unwrap();
            assert_eq!(report.records_decoded, 1);
            assert!(report.tables_created.is_empty());
        }
    }

    mod dropping {
        use super::*;

        #[test]
        fn test_drop_then_list_is_empty() {
            let store = TableStore::open_in_memory().unwrap();
            let ns = Namespace::generate();
            store.ingest(&ns, alt_gps_records()).unwrap();

            assert_eq!(store.drop_namespace(&ns).unwrap(), 2);
            assert!(store.list_schema(&ns).unwrap().is_empty());
        }

        #[test]
        fn test_drop_is_idempotent() {
            let store = TableStore::open_in_memory().unwrap();
            let ns = Namespace::generate();
            store.ingest(&ns, alt_gps_records()).unwrap();

            store.drop_namespace(&ns).unwrap();
            assert_eq!(store.drop_namespace(&ns).unwrap(), 0);
            assert!(store.list_schema(&ns).unwrap().is_empty());
        }

        #[test]
        fn test_drop_leaves_other_namespaces() {
            let store = TableStore::open_in_memory().unwrap();
            let a = Namespace::generate();
            let b = Namespace::generate();
            store.ingest(&a, alt_gps_records()).unwrap();
            store.ingest(&b, alt_gps_records()).unwrap();
            assert_eq!(store.namespaces().unwrap().len(), 2);

            store.drop_namespace(&a).unwrap();
            assert_eq!(store.namespaces().unwrap(), vec![b.clone()]);
            assert_eq!(store.list_schema(&b).unwrap().len(), 2);
        }
    }

    mod query {
        use super::*;

        #[test]
        fn test_max_alt() {
            let store = TableStore::open_in_memory().unwrap();
            let ns = Namespace::generate();
            store.ingest(&ns, alt_gps_records()).unwrap();

            let rows = store
                .query(&ns, "SELECT MAX(alt) FROM ALT", 10, &no_cancel())
                .unwrap();
            assert_eq!(rows.columns, vec!["MAX(alt)"]);
            assert_eq!(rows.rows, vec![vec![Scalar::Int(12)]]);
            assert!(!rows.truncated);
        }

        #[test]
        fn test_rows_are_capped() {
            let store = TableStore::open_in_memory().unwrap();
            let ns = Namespace::generate();
            let records = (0..20).map(|i| record("ALT", &[("alt", Scalar::Int(i))]));
            store.ingest(&ns, records).unwrap();

            let rows = store
                .query(&ns, "SELECT alt FROM ALT ORDER BY alt", 5, &no_cancel())
                .unwrap();
            assert_eq!(rows.rows.len(), 5);
            assert!(rows.truncated);
        }

        #[test]
        fn test_other_namespace_is_invisible() {
            let store = TableStore::open_in_memory().unwrap();
            let a = Namespace::generate();
            let b = Namespace::generate();
            store.ingest(&a, alt_gps_records()).unwrap();

            let err = store
                .query(&b, "SELECT * FROM ALT", 10, &no_cancel())
                .unwrap_err();
            assert_eq!(err, QueryFailure::UnknownTable("ALT".to_string()));
        }

        #[test]
        fn test_engine_error_text_is_kept() {
            let store = TableStore::open_in_memory().unwrap();
            let ns = Namespace::generate();
            store.ingest(&ns, alt_gps_records()).unwrap();

            let err = store
                .query(&ns, "SELECT nonexistent FROM ALT", 10, &no_cancel())
                .unwrap_err();
            match err {
                QueryFailure::Engine(msg) => assert!(msg.contains("nonexistent")),
                other => panic!("unexpected {:?}", other),
            }
        }

        #[test]
        fn test_cancelled_query_is_interrupted() {
            let store = TableStore::open_in_memory().unwrap();
            let ns = Namespace::generate();
            store.ingest(&ns, alt_gps_records()).unwrap();

            let cancel: CancelFlag = Arc::new(AtomicBool::new(true));
            let err = store
                .query(
                    &ns,
                    "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) \
                     SELECT COUNT(*) FROM n, ALT",
                    10,
                    &cancel,
                )
                .unwrap_err();
            assert_eq!(err, QueryFailure::Interrupted);

            // Handler is removed afterwards.
            assert!(store
                .query(&ns, "SELECT COUNT(*) FROM ALT", 10, &no_cancel())
                .is_ok());
        }
    }

    proptest! {
        #[test]
        fn prop_one_table_per_type_and_one_row_per_frame(
            frames in prop::collection::vec(
                (0u8..4, any::<i32>(), prop::collection::vec(0u8..0x80, 0..4)),
                1..60,
            )
        ) {
            let mut w = DataFlashWriter::new();
            for t in 0..4u8 {
                w.define(130 + t, &format!("T{}", t), "Qi", "TimeUS,value");
            }
            for (i, (t, value, garbage)) in frames.iter().enumerate() {
                w.write(130 + t, &[Field::I(i as i64), Field::I(*value as i64)]);
                w.raw(garbage);
            }

            let store = TableStore::open_in_memory().unwrap().with_batch_rows(7);
            let ns = Namespace::generate();
            let stream = crate::telemetry::decode(Cursor::new(w.finish())).unwrap();
            let report = store.ingest(&ns, stream).unwrap();

            let used: HashSet<u8> = frames.iter().map(|(t, _, _)| *t).collect();
            // FMT frames are records too: one type, one row per definition.
            let expected_tables = used.len() + 1;
            let expected_rows = frames.len() as u64 + 4;

            let schema = store.list_schema(&ns).unwrap();
            prop_assert_eq!(schema.len(), expected_tables);
            prop_assert_eq!(report.rows_stored, expected_rows);

            let total: i64 = schema.keys().map(|t| count(&store, &ns, t)).sum();
            prop_assert_eq!(total as u64, expected_rows);
        }
    }
}
