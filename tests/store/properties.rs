use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use stdnet_rust::{
    fields_of, Cursor, FieldError, RecordId, RecordStore, StoreError, TransactionError,
};

use crate::support::{fields, Blog};

#[test]
fn put_lookup_delete_walkthrough() {
    let blog = Blog::new();

    let id = blog.store.put("users", None, fields(&[("name", "a")])).unwrap();
    assert_eq!(id, RecordId(1));
    assert_eq!(
        blog.store.lookup("users", "name", "a").unwrap(),
        BTreeSet::from([RecordId(1)])
    );

    assert_eq!(blog.store.delete("users", id).unwrap(), 1);
    assert_eq!(
        blog.store.get("users", id).unwrap_err(),
        StoreError::NotFound {
            table: "users".into(),
            id
        }
    );
    assert!(blog.store.lookup("users", "name", "a").unwrap().is_empty());
}

#[test]
fn index_follows_put_overwrite_and_delete() {
    let blog = Blog::new();

    let id = blog
        .users
        .save(None, fields(&[("name", "ann"), ("email", "ann@x")]), true)
        .unwrap();
    assert_eq!(blog.users.lookup("email", "ann@x").unwrap(), BTreeSet::from([id]));

    blog.users
        .save(Some(id), fields(&[("name", "ann"), ("email", "ann@y")]), true)
        .unwrap();
    assert!(blog.users.lookup("email", "ann@x").unwrap().is_empty());
    assert_eq!(blog.users.lookup("email", "ann@y").unwrap(), BTreeSet::from([id]));

    blog.store.delete("users", id).unwrap();
    assert!(blog.users.lookup("email", "ann@y").unwrap().is_empty());
    assert!(blog.users.lookup("name", "ann").unwrap().is_empty());
}

#[test]
fn unset_values_are_not_indexed() {
    let blog = Blog::new();
    blog.users.save(None, fields(&[("name", "ann")]), true).unwrap();
    blog.users
        .save(None, fields(&[("name", "bob"), ("email", "")]), true)
        .unwrap();

    assert!(blog.users.lookup("email", "").unwrap().is_empty());
    assert_eq!(blog.store.index_entries("users").unwrap(), 2);
}

#[test]
fn get_returns_saved_fields() {
    let blog = Blog::new();
    let saved = fields(&[("name", "ann"), ("role", "admin")]);

    let fresh = blog.users.save(None, saved.clone(), true).unwrap();
    assert_eq!(blog.users.get(fresh).unwrap().fields, saved);

    let chosen = blog.users.save(Some(RecordId(77)), saved.clone(), true).unwrap();
    assert_eq!(chosen, RecordId(77));
    assert_eq!(blog.users.get(chosen).unwrap().fields, saved);
}

#[test]
fn defaults_fill_missing_values() {
    let blog = Blog::new();
    let id = blog.users.save(None, fields(&[("name", "ann")]), true).unwrap();
    assert_eq!(blog.users.get(id).unwrap().get("role"), Some("member"));
    assert_eq!(blog.users.get(id).unwrap().get("email"), None);
}

#[test]
fn empty_required_field_never_reaches_the_store() {
    let blog = Blog::new();

    let err = blog.users.save(None, fields(&[("name", "")]), true).unwrap_err();
    assert_eq!(
        err,
        StoreError::Field(FieldError::Required {
            table: "users".into(),
            field: "name".into()
        })
    );

    let err = blog
        .users
        .save(None, fields(&[("name", "ann"), ("age", "3")]), true)
        .unwrap_err();
    assert!(matches!(err, StoreError::Field(FieldError::Unknown { .. })));

    assert_eq!(blog.users.count().unwrap(), 0);
    assert_eq!(blog.users.pending(), 0);
}

#[derive(Serialize)]
struct NewUser {
    name: String,
    email: Option<String>,
    role: &'static str,
}

#[test]
fn serde_structs_save_through_fields_of() {
    let blog = Blog::new();
    let user = NewUser {
        name: "ann".into(),
        email: None,
        role: "admin",
    };

    let id = blog.users.save(None, fields_of(&user).unwrap(), true).unwrap();
    let stored = blog.users.get(id).unwrap();
    assert_eq!(stored.fields, fields(&[("name", "ann"), ("role", "admin")]));
    assert_eq!(blog.users.meta().to_dict(&stored), stored.fields);
}

#[test]
fn commit_applies_all_staged_operations() {
    let blog = Blog::new();
    let keep = blog.store.put("users", None, fields(&[("name", "keep")])).unwrap();

    let mut cursor = Cursor::new(blog.store.clone());
    for name in ["a", "b", "c"] {
        let f = fields(&[("name", name)]);
        let indexes = blog.users.meta().index_pairs(&f);
        cursor.stage_put("users", None, f, indexes).unwrap();
    }
    cursor.stage_delete("users", keep).unwrap();

    assert_eq!(cursor.commit().unwrap(), 4);
    assert_eq!(blog.users.count().unwrap(), 3);
    assert!(!blog.store.contains("users", keep).unwrap());
}

#[test]
fn interrupted_commit_applies_nothing_at_any_point() {
    for cut in 0..4 {
        let blog = Blog::new();
        let keep = blog.store.put("users", None, fields(&[("name", "keep")])).unwrap();

        let mut cursor = Cursor::new(blog.store.clone());
        for name in ["a", "b", "c"] {
            let f = fields(&[("name", name)]);
            let indexes = blog.users.meta().index_pairs(&f);
            cursor.stage_put("users", None, f, indexes).unwrap();
        }
        cursor.stage_delete("users", keep).unwrap();

        blog.store.faults().fail_after(cut);
        let err = cursor.commit().unwrap_err();
        assert!(matches!(
            err,
            StoreError::Transaction(TransactionError::Aborted { applied, .. }) if applied == cut
        ));

        assert_eq!(blog.store.ids("users").unwrap(), vec![keep]);
        assert_eq!(
            blog.store.lookup("users", "name", "keep").unwrap(),
            BTreeSet::from([keep])
        );
        assert_eq!(blog.store.index_entries("users").unwrap(), 1);
    }
}

#[test]
fn dry_run_counts_and_flush_empties() {
    let blog = Blog::new();
    let ann = blog.users.save(None, fields(&[("name", "ann")]), true).unwrap();
    let post = blog
        .posts
        .save(None, fields(&[("author", &ann.to_string())]), true)
        .unwrap();
    blog.comments
        .save(None, fields(&[("post", &post.to_string())]), true)
        .unwrap();

    let expected = BTreeMap::from([
        ("comments".to_string(), 1),
        ("posts".to_string(), 1),
        ("users".to_string(), 1),
    ]);
    assert_eq!(blog.users.count_pending_flush().unwrap(), expected);
    assert_eq!(blog.users.count_pending_flush().unwrap(), expected);

    assert_eq!(blog.users.flush().unwrap(), 3);
    for table in ["users", "posts", "comments"] {
        assert_eq!(blog.store.len(table).unwrap(), 0);
        assert_eq!(blog.store.index_entries(table).unwrap(), 0);
    }
    assert_eq!(
        blog.users.count_pending_flush().unwrap().values().sum::<usize>(),
        0
    );
}

#[test]
fn index_pairs_are_checked_against_fields() {
    let blog = Blog::new();

    let err = blog
        .users
        .add_object(
            None,
            fields(&[("name", "a")]),
            vec![("name".into(), Some("b".into()))],
            true,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Field(FieldError::IndexMismatch { .. })));

    let err = blog
        .users
        .add_object(
            None,
            fields(&[("name", "a"), ("role", "admin")]),
            vec![("role".into(), Some("admin".into()))],
            true,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Field(FieldError::NotIndexed { .. })));

    let id = blog
        .users
        .add_object(
            None,
            fields(&[("name", "a")]),
            vec![("name".into(), Some("a".into()))],
            true,
        )
        .unwrap();
    blog.store.rebuild_indexes("users").unwrap();
    assert_eq!(blog.users.lookup("name", "a").unwrap(), BTreeSet::from([id]));
    assert!(blog.users.lookup("name", "b").unwrap().is_empty());
    assert!(blog.users.filter("name", "b").unwrap().is_empty());
}
