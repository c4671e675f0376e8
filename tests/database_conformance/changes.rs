//! Change feeds

use crate::test_utils::*;
use docstore::{EnumeratorFlags, EnumeratorOptions, PutRequest, RevisionFlags};

#[test]
fn test_changes() {
    run_test_variants(|t| {
        let db = &t.db;
        for i in 1..100 {
            create_rev(db, &doc_id(i), BODY, RevisionFlags::empty());
        }
        let options = EnumeratorOptions::default().without(EnumeratorFlags::INCLUDE_BODIES);

        // Since start
        let mut e = db.enumerate_changes(0, &options).unwrap();
        let mut seq = 1;
        while let Some(doc) = e.next_document().unwrap() {
            assert_eq!(doc.selected_revision().unwrap().sequence(), seq);
            assert_eq!(doc.doc_id(), doc_id(seq).as_str());
            seq += 1;
        }
        assert_eq!(seq, 100);

        // Since 6
        let mut e = db.enumerate_changes(6, &options).unwrap();
        let mut seq = 7;
        while let Some(doc) = e.next_document().unwrap() {
            assert_eq!(doc.selected_revision().unwrap().sequence(), seq);
            assert_eq!(doc.doc_id(), doc_id(seq).as_str());
            seq += 1;
        }
        assert_eq!(seq, 100);
    });
}

#[test]
fn test_updated_document_moves_to_end() {
    run_test_variants(|t| {
        let db = &t.db;
        for i in 1..=3 {
            create_rev(db, &doc_id(i), BODY, RevisionFlags::empty());
        }
        db.transaction(|db| {
            db.put_document(
                &PutRequest::new("doc-001")
                    .parent_rev_id(REV_ID)
                    .body("{}"),
            )
        })
        .unwrap();

        let ids: Vec<_> = db
            .enumerate_changes(0, &EnumeratorOptions::default())
            .unwrap()
            .map(|doc| {
                let doc = doc.unwrap();
                (doc.doc_id().to_vec(), doc.sequence())
            })
            .collect();
        assert_eq!(
            ids,
            [
                (b"doc-002".to_vec(), 2),
                (b"doc-003".to_vec(), 3),
                (b"doc-001".to_vec(), 4),
            ]
        );
    });
}
