//! All-docs and some-docs enumeration

use crate::test_utils::*;
use docstore::{DocumentFlags, EnumeratorFlags, EnumeratorOptions, Slice};

#[test]
fn test_all_docs() {
    run_test_variants(|t| {
        let db = &t.db;
        setup_all_docs(db);
        assert_eq!(db.document_count().unwrap(), 99);

        // No start or end ID
        let options = EnumeratorOptions::default().without(EnumeratorFlags::INCLUDE_BODIES);
        let mut e = db
            .enumerate_all_docs(Slice::NULL, Slice::NULL, &options)
            .unwrap();
        let mut i = 1;
        while e.advance().unwrap() {
            let mut doc = e.get_document().unwrap();
            assert_eq!(doc.doc_id(), doc_id(i).as_str());
            assert_eq!(doc.rev_id().unwrap().as_str(), REV_ID);
            let selected = doc.selected_revision().unwrap();
            assert_eq!(selected.rev_id().as_str(), REV_ID);
            assert_eq!(selected.sequence(), i);
            assert!(doc.body().is_none());
            doc.load_body().unwrap();
            assert_eq!(doc.body().unwrap(), BODY);

            let info = e.get_info().unwrap();
            assert_eq!(info.doc_id, doc_id(i).as_str());
            assert_eq!(info.rev_id.unwrap().as_str(), REV_ID);
            i += 1;
        }
        assert_eq!(i, 100);

        // Start and end ID
        let mut e = db
            .enumerate_all_docs("doc-007", "doc-090", &EnumeratorOptions::default())
            .unwrap();
        let mut i = 7;
        while e.advance().unwrap() {
            assert_eq!(e.get_document().unwrap().doc_id(), doc_id(i).as_str());
            i += 1;
        }
        assert_eq!(i, 91);

        // Some docs, by ID
        let options = EnumeratorOptions::default().with(EnumeratorFlags::INCLUDE_DELETED);
        let ids = ["doc-042", "doc-007", "bogus", "doc-001"];
        let mut e = db.enumerate_some_docs(ids, &options).unwrap();
        let mut i = 0;
        while e.advance().unwrap() {
            let doc = e.get_document().unwrap();
            assert_eq!(doc.doc_id(), ids[i]);
            assert_eq!(doc.sequence() != 0, i != 2);
            i += 1;
        }
        assert_eq!(i, 4);
    });
}

#[test]
fn test_all_docs_include_deleted() {
    run_test_variants(|t| {
        setup_all_docs(&t.db);
        let options = EnumeratorOptions::default().with(EnumeratorFlags::INCLUDE_DELETED);
        let ids: Vec<String> = t
            .db
            .enumerate_all_docs("doc-004", "doc-007", &options)
            .unwrap()
            .map(|doc| doc.unwrap().doc_id().as_slice().to_string_lossy().into_owned())
            .collect();
        assert_eq!(ids, ["doc-004", "doc-005", "doc-005DEL", "doc-006", "doc-007"]);
    });
}

#[test]
fn test_all_docs_info() {
    run_test_variants(|t| {
        setup_all_docs(&t.db);
        let mut e = t
            .db
            .enumerate_all_docs(Slice::NULL, Slice::NULL, &EnumeratorOptions::default())
            .unwrap();
        let mut i = 1;
        while e.advance().unwrap() {
            let info = e.get_info().unwrap();
            assert_eq!(info.doc_id, doc_id(i).as_str());
            assert_eq!(info.rev_id.unwrap().as_str(), REV_ID);
            assert_eq!(info.sequence, i);
            assert_eq!(info.flags, DocumentFlags::EXISTS);
            i += 1;
        }
        assert_eq!(i, 100);
    });
}

#[test]
fn test_all_docs_descending_with_skip() {
    run_test_variants(|t| {
        setup_all_docs(&t.db);
        let options = EnumeratorOptions::default()
            .with(EnumeratorFlags::DESCENDING)
            .skip(2);
        let first: Vec<_> = t
            .db
            .enumerate_all_docs("", "", &options)
            .unwrap()
            .take(2)
            .map(|doc| doc.unwrap().sequence())
            .collect();
        assert_eq!(first, [97, 96]);
    });
}
