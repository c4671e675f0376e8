//! Shared helpers for the conformance suite

#![allow(dead_code)]

use docstore::{Database, DatabaseConfig, DatabaseFlags, Document, PutRequest, RevisionFlags};
use std::sync::Once;
use tempfile::TempDir;

static INIT_TRACING: Once = Once::new();

/// Route engine logs through the test harness (`RUST_LOG` filters)
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Revision ID given to every fixture document
pub const REV_ID: &str = "1-abcd";
/// Body given to every live fixture document
pub const BODY: &str = "{\"name\":\"value\"}";

/// A database plus the directory keeping it alive
pub struct TestDb {
    pub dir: TempDir,
    pub config: DatabaseConfig,
    pub db: Database,
}

impl TestDb {
    pub fn path(&self) -> std::path::PathBuf {
        self.dir.path().join("conformance.db")
    }

    /// Close and open again with the same configuration
    pub fn reopen(&mut self) {
        self.db.close().unwrap();
        self.db = Database::open(self.path(), &self.config).unwrap();
    }
}

fn open_variant(bundled: bool) -> TestDb {
    let dir = TempDir::new().unwrap();
    let mut flags = DatabaseFlags::CREATE;
    if bundled {
        flags |= DatabaseFlags::BUNDLED;
    }
    let config = DatabaseConfig::with_flags(flags);
    let db = Database::open(dir.path().join("conformance.db"), &config).unwrap();
    TestDb { dir, config, db }
}

/// Run `test` once against a single-file database and once against a bundle
pub fn run_test_variants(test: impl Fn(&mut TestDb)) {
    init_tracing();
    for bundled in [false, true] {
        let mut t = open_variant(bundled);
        test(&mut t);
    }
}

/// Create a document with the fixture revision ID in its own transaction
pub fn create_rev(db: &Database, doc_id: &str, body: &str, flags: RevisionFlags) -> Document {
    let mut request = PutRequest::new(doc_id).rev_id(REV_ID).flags(flags);
    if !flags.contains(RevisionFlags::DELETED) {
        request = request.body(body);
    }
    db.transaction(|db| db.put_document(&request)).unwrap()
}

/// `doc-001` through `doc-099`, plus the deleted `doc-005DEL`
pub fn setup_all_docs(db: &Database) {
    for i in 1..100 {
        create_rev(db, &doc_id(i), BODY, RevisionFlags::empty());
    }
    create_rev(db, "doc-005DEL", "", RevisionFlags::DELETED);
}

pub fn doc_id(i: u64) -> String {
    format!("doc-{:03}", i)
}
