//! Expiration scheduling and purge

use crate::test_utils::*;
use docstore::{unix_now, RevisionFlags, CANCEL_EXPIRATION};

fn count_expired(e: &mut docstore::ExpiryEnumerator, skip: &str) -> usize {
    let mut count = 0;
    while e.advance().unwrap() {
        assert_ne!(e.doc_id().unwrap(), skip);
        count += 1;
    }
    count
}

#[test]
fn test_expired() {
    run_test_variants(|t| {
        let db = &t.db;
        let doc_id = "expire_me";
        create_rev(db, doc_id, BODY, RevisionFlags::empty());
        db.set_expiration(doc_id, unix_now() + 1).unwrap();

        let expire = unix_now() + 2;
        // Setting the same value twice is fine
        db.set_expiration(doc_id, expire).unwrap();
        db.set_expiration(doc_id, expire).unwrap();

        let doc_id2 = "expire_me_too";
        create_rev(db, doc_id2, BODY, RevisionFlags::empty());
        db.set_expiration(doc_id2, expire).unwrap();

        let doc_id3 = "dont_expire_me";
        create_rev(db, doc_id3, BODY, RevisionFlags::empty());

        let later = expire + 1;
        let mut e = db.enumerate_expired_at(later).unwrap();
        assert_eq!(count_expired(&mut e, doc_id3), 2);
        e.close();

        assert_eq!(db.get_expiration(doc_id).unwrap(), expire);
        assert_eq!(db.get_expiration(doc_id2).unwrap(), expire);
        assert_eq!(db.get_expiration(doc_id3).unwrap(), 0);
        assert_eq!(db.next_expiration().unwrap(), expire);

        let mut e = db.enumerate_expired_at(later).unwrap();
        assert_eq!(count_expired(&mut e, doc_id3), 2);
        assert_eq!(e.purge_expired().unwrap(), 2);
        e.close();

        let mut e = db.enumerate_expired_at(later).unwrap();
        assert_eq!(count_expired(&mut e, doc_id3), 0);
        assert_eq!(e.purge_expired().unwrap(), 0);

        // Only the expirations are cleared; the documents remain
        assert!(db.get_document(doc_id).is_ok());
        assert!(db.get_document(doc_id2).is_ok());
        assert!(db.get_document(doc_id3).is_ok());
        assert_eq!(db.get_expiration(doc_id).unwrap(), 0);
        assert_eq!(db.get_expiration(doc_id2).unwrap(), 0);
        assert_eq!(db.next_expiration().unwrap(), 0);
    });
}

#[test]
fn test_cancel_expire() {
    run_test_variants(|t| {
        let db = &t.db;
        let doc_id = "expire_me";
        create_rev(db, doc_id, BODY, RevisionFlags::empty());
        let expire = unix_now() + 2;
        db.set_expiration(doc_id, expire).unwrap();
        db.set_expiration(doc_id, CANCEL_EXPIRATION).unwrap();

        let mut e = db.enumerate_expired_at(expire + 1).unwrap();
        assert_eq!(count_expired(&mut e, ""), 0);
        assert_eq!(e.purge_expired().unwrap(), 0);
        assert!(db.get_document(doc_id).is_ok());
    });
}

#[test]
fn test_past_expiration_uses_clock() {
    run_test_variants(|t| {
        let db = &t.db;
        create_rev(db, "stale", BODY, RevisionFlags::empty());
        db.set_expiration("stale", unix_now() - 60).unwrap();

        let mut e = db.enumerate_expired().unwrap();
        assert_eq!(e.len(), 1);
        assert_eq!(e.purge_expired().unwrap(), 1);
        assert!(db.get_document("stale").is_ok());
        assert_eq!(db.get_expiration("stale").unwrap(), 0);
        assert_eq!(db.enumerate_expired().unwrap().len(), 0);
    });
}

#[test]
fn test_expiration_survives_reopen() {
    run_test_variants(|t| {
        create_rev(&t.db, "doc", BODY, RevisionFlags::empty());
        t.db.set_expiration("doc", 4_000_000_000).unwrap();
        t.reopen();
        assert_eq!(t.db.get_expiration("doc").unwrap(), 4_000_000_000);
        assert_eq!(t.db.next_expiration().unwrap(), 4_000_000_000);
    });
}
