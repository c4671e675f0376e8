//! Nested transactions

use crate::test_utils::*;
use docstore::{ErrorCode, PutRequest};

#[test]
fn test_transaction_nesting() {
    run_test_variants(|t| {
        let db = &t.db;
        assert_eq!(db.document_count().unwrap(), 0);
        assert!(!db.is_in_transaction());

        db.begin_transaction().unwrap();
        assert!(db.is_in_transaction());
        db.begin_transaction().unwrap();
        assert!(db.is_in_transaction());
        db.end_transaction(true).unwrap();
        assert!(db.is_in_transaction());
        db.end_transaction(true).unwrap();
        assert!(!db.is_in_transaction());
    });
}

#[test]
fn test_outermost_abort_discards_inner_commit() {
    run_test_variants(|t| {
        let db = &t.db;
        db.begin_transaction().unwrap();
        db.begin_transaction().unwrap();
        db.put_document(&PutRequest::new("inner").body(BODY)).unwrap();
        db.end_transaction(true).unwrap();
        db.end_transaction(false).unwrap();

        assert!(db.get_document("inner").unwrap_err().is(ErrorCode::NotFound));
        assert_eq!(db.last_sequence().unwrap(), 0);
    });
}

#[test]
fn test_end_without_begin() {
    run_test_variants(|t| {
        let err = t.db.end_transaction(true).unwrap_err();
        assert!(err.is(ErrorCode::NotInTransaction));
    });
}

#[test]
fn test_close_with_open_transaction() {
    run_test_variants(|t| {
        t.db.begin_transaction().unwrap();
        assert!(t.db.close().unwrap_err().is(ErrorCode::TransactionNotClosed));
        t.db.end_transaction(false).unwrap();
        t.db.close().unwrap();
    });
}
