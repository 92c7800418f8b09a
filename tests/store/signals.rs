use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use stdnet_rust::{CommitSignal, DeleteSignal, POST_COMMIT, POST_DELETE};

use crate::support::{fields, Blog};

fn collect(blog: &Blog, event: &str) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    blog.users.signals().on(event, move |payload: String| {
        sink.lock().unwrap().push(payload);
    });
    seen
}

#[test]
fn commit_emits_post_commit() {
    let blog = Blog::new();
    let seen = collect(&blog, POST_COMMIT);

    blog.users.save(None, fields(&[("name", "a")]), false).unwrap();
    blog.users.save(None, fields(&[("name", "b")]), false).unwrap();
    blog.users.commit().unwrap();
    // nothing pending, nothing emitted
    blog.users.commit().unwrap();

    // EventEmitter is async, give it time
    thread::sleep(Duration::from_millis(50));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let signal: CommitSignal = serde_json::from_str(&seen[0]).unwrap();
    assert_eq!(
        signal,
        CommitSignal {
            table: "users".into(),
            applied: 2
        }
    );
}

#[test]
fn cascade_emits_post_delete_per_record() {
    let blog = Blog::new();
    let seen = collect(&blog, POST_DELETE);

    let ann = blog.users.save(None, fields(&[("name", "ann")]), true).unwrap();
    blog.posts
        .save(None, fields(&[("author", &ann.to_string())]), true)
        .unwrap();
    blog.users.delete_object(ann, &mut Vec::new()).unwrap();

    thread::sleep(Duration::from_millis(50));
    let mut tables: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|payload| serde_json::from_str::<DeleteSignal>(payload).unwrap().table)
        .collect();
    tables.sort();
    assert_eq!(tables, vec!["posts", "users"]);
}
