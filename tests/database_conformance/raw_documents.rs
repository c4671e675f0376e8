//! Raw key/value stores

use crate::test_utils::*;
use docstore::ErrorCode;

#[test]
fn test_create_raw_doc() {
    run_test_variants(|t| {
        let db = &t.db;
        db.begin_transaction().unwrap();
        db.raw_put("test", "key", "meta", BODY).unwrap();
        db.end_transaction(true).unwrap();

        let doc = db.raw_get("test", "key").unwrap();
        assert_eq!(doc.key, "key");
        assert_eq!(doc.meta, "meta");
        assert_eq!(doc.body, BODY);

        let err = db.raw_get("test", "bogus").unwrap_err();
        assert!(err.is(ErrorCode::NotFound));
    });
}

#[test]
fn test_raw_delete_and_reopen() {
    run_test_variants(|t| {
        t.db.transaction(|db| {
            db.raw_put("test", "keep", "", "1")?;
            db.raw_put("test", "drop", "", "2")
        })
        .unwrap();
        t.db.transaction(|db| db.raw_delete("test", "drop")).unwrap();

        t.reopen();
        assert_eq!(t.db.raw_get("test", "keep").unwrap().body, "1");
        assert!(t.db.raw_get("test", "drop").unwrap_err().is(ErrorCode::NotFound));
    });
}
