//! Document counts, sequences and the persisted UUID pair

use crate::test_utils::*;
use docstore::{DatabaseUuids, RevisionFlags};

fn assert_conformant(uuids: &DatabaseUuids) {
    for id in [&uuids.public, &uuids.private] {
        let bytes = id.as_bytes();
        assert_eq!(bytes[6] & 0xF0, 0x40, "version nibble");
        assert_eq!(bytes[8] & 0xC0, 0x80, "variant bits");
    }
}

#[test]
fn test_database_info() {
    run_test_variants(|t| {
        assert_eq!(t.db.document_count().unwrap(), 0);
        assert_eq!(t.db.last_sequence().unwrap(), 0);

        let uuids = t.db.get_uuids().unwrap();
        assert_ne!(uuids.public, uuids.private);
        assert_conformant(&uuids);

        t.reopen();
        assert_eq!(t.db.get_uuids().unwrap(), uuids);
    });
}

#[test]
fn test_counts_follow_writes() {
    run_test_variants(|t| {
        setup_all_docs(&t.db);
        assert_eq!(t.db.document_count().unwrap(), 99);
        assert_eq!(t.db.last_sequence().unwrap(), 100);

        t.reopen();
        assert_eq!(t.db.document_count().unwrap(), 99);
        assert_eq!(t.db.last_sequence().unwrap(), 100);

        create_rev(&t.db, "doc-100", BODY, RevisionFlags::empty());
        assert_eq!(t.db.last_sequence().unwrap(), 101);
    });
}
