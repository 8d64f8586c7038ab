//! Behavioural tests shared by every [`TreeStore`] backend.
//!
//! Each case is a plain function over `&dyn TreeStore`; `all_backends!`
//! instantiates it once per backend configuration.

use std::thread;

use proptest::prelude::*;
use tempfile::TempDir;

use super::*;

type Fixture = (Box<dyn TreeStore>, Option<TempDir>);

fn memory_forest() -> Fixture {
    (Box::new(ForestStore::in_memory()), None)
}

fn file_forest() -> Fixture {
    let dir = TempDir::new().expect("failed to create temp dir");
    let store = ForestStore::open(dir.path().join("services.json")).expect("failed to open store");
    (Box::new(store), Some(dir))
}

fn memory_sqlite() -> Fixture {
    let store = SqliteTreeStore::in_memory().expect("failed to open in-memory db");
    (Box::new(store), None)
}

fn file_sqlite() -> Fixture {
    let dir = TempDir::new().expect("failed to create temp dir");
    let store = SqliteTreeStore::open(dir.path().join("services.db")).expect("failed to open db");
    (Box::new(store), Some(dir))
}

fn p(raw: &str) -> ServicePath {
    ServicePath::parse(raw)
}

fn create_all(store: &dyn TreeStore, paths: &[&str]) {
    for path in paths {
        store
            .create(&p(path))
            .unwrap_or_else(|e| panic!("create {path}: {e}"));
    }
}

fn create_then_exists(store: &dyn TreeStore) {
    store.create(&p("app1")).unwrap();
    assert!(store.exists(&p("app1")).unwrap());
    assert!(matches!(
        store.create(&p("app1")),
        Err(StoreError::AlreadyExists { .. })
    ));
}

fn create_requires_parent(store: &dyn TreeStore) {
    assert!(matches!(
        store.create(&p("nonexistent/child")),
        Err(StoreError::ParentMissing { .. })
    ));
    assert!(!store.exists(&p("nonexistent")).unwrap());
    assert!(!store.exists(&p("nonexistent/child")).unwrap());
}

fn empty_path_is_rejected(store: &dyn TreeStore) {
    let empty = ServicePath::default();
    assert!(!store.exists(&empty).unwrap());
    assert!(matches!(store.create(&empty), Err(StoreError::EmptyPath)));
    assert!(matches!(store.delete(&empty), Err(StoreError::EmptyPath)));
    assert!(matches!(store.increment(&empty), Err(StoreError::EmptyPath)));
    assert!(matches!(
        store.rename(&empty, "x"),
        Err(StoreError::EmptyPath)
    ));
    assert!(matches!(
        store.subtree(&empty),
        Err(StoreError::NotFound { .. })
    ));
}

fn counter_starts_at_zero(store: &dyn TreeStore) {
    create_all(store, &["app1", "app1/category1"]);
    assert_eq!(store.counter(&p("app1")).unwrap(), 0);
    assert_eq!(store.counter(&p("app1/category1")).unwrap(), 0);
    assert!(matches!(
        store.counter(&p("app1/missing")),
        Err(StoreError::NotFound { .. })
    ));
}

fn increment_propagates_to_ancestors(store: &dyn TreeStore) {
    create_all(store, &["app1", "app1/cat1", "app1/cat1/sub1"]);
    store.increment(&p("app1/cat1/sub1")).unwrap();
    store.increment(&p("app1/cat1/sub1")).unwrap();

    assert_eq!(store.counter(&p("app1")).unwrap(), 2);
    assert_eq!(store.counter(&p("app1/cat1")).unwrap(), 2);
    assert_eq!(store.counter(&p("app1/cat1/sub1")).unwrap(), 2);
}

fn increment_leaves_siblings_alone(store: &dyn TreeStore) {
    create_all(store, &["a", "a/b", "a/b/c", "a/b/d", "a/e", "f"]);
    store.increment(&p("a/b/c")).unwrap();

    assert_eq!(store.counter(&p("a")).unwrap(), 1);
    assert_eq!(store.counter(&p("a/b")).unwrap(), 1);
    assert_eq!(store.counter(&p("a/b/c")).unwrap(), 1);
    assert_eq!(store.counter(&p("a/b/d")).unwrap(), 0);
    assert_eq!(store.counter(&p("a/e")).unwrap(), 0);
    assert_eq!(store.counter(&p("f")).unwrap(), 0);
}

fn increment_unknown_leaf_changes_nothing(store: &dyn TreeStore) {
    create_all(store, &["a", "a/b"]);
    assert!(matches!(
        store.increment(&p("a/b/ghost")),
        Err(StoreError::NotFound { .. })
    ));
    assert_eq!(store.counter(&p("a")).unwrap(), 0);
    assert_eq!(store.counter(&p("a/b")).unwrap(), 0);
}

fn delete_cascades(store: &dyn TreeStore) {
    create_all(store, &["p", "p/q", "p/q/r"]);
    store.delete(&p("p")).unwrap();
    assert!(!store.exists(&p("p")).unwrap());
    assert!(!store.exists(&p("p/q")).unwrap());
    assert!(!store.exists(&p("p/q/r")).unwrap());
    assert!(matches!(
        store.delete(&p("p")),
        Err(StoreError::NotFound { .. })
    ));
}

fn delete_spares_prefix_named_sibling(store: &dyn TreeStore) {
    create_all(store, &["app1", "app1/x", "app10", "app10/x"]);
    store.delete(&p("app1")).unwrap();

    assert!(!store.exists(&p("app1")).unwrap());
    assert!(!store.exists(&p("app1/x")).unwrap());
    assert!(store.exists(&p("app10")).unwrap());
    assert!(store.exists(&p("app10/x")).unwrap());
}

fn delete_nested_keeps_parent(store: &dyn TreeStore) {
    create_all(store, &["app1", "app1/category2", "app1/other"]);
    store.increment(&p("app1/category2")).unwrap();
    store.delete(&p("app1/category2")).unwrap();

    assert!(store.exists(&p("app1")).unwrap());
    assert!(store.exists(&p("app1/other")).unwrap());
    // Time already propagated to the parent stays there.
    assert_eq!(store.counter(&p("app1")).unwrap(), 1);
}

fn rename_root(store: &dyn TreeStore) {
    store.create(&p("r")).unwrap();
    store.rename(&p("r"), "s").unwrap();
    assert!(!store.exists(&p("r")).unwrap());
    assert!(store.exists(&p("s")).unwrap());
    assert_eq!(store.counter(&p("s")).unwrap(), 0);
}

fn rename_preserves_counter_and_children(store: &dyn TreeStore) {
    create_all(store, &["app1", "app1/cat1", "app1/cat1/sub1", "app1/cat1/sub2"]);
    store.increment(&p("app1/cat1/sub1")).unwrap();
    let before = store.subtree(&p("app1/cat1")).unwrap();

    store.rename(&p("app1/cat1"), "cat2").unwrap();

    assert!(matches!(
        store.subtree(&p("app1/cat1")),
        Err(StoreError::NotFound { .. })
    ));
    let after = store.subtree(&p("app1/cat2")).unwrap();
    assert_eq!(after.service, "cat2");
    assert_eq!(after.time, before.time);
    assert_eq!(after.children, before.children);
    assert_eq!(store.counter(&p("app1/cat2/sub1")).unwrap(), 1);
    assert!(!store.exists(&p("app1/cat1/sub1")).unwrap());
}

fn rename_onto_sibling_conflicts(store: &dyn TreeStore) {
    create_all(store, &["a", "a/x", "a/y"]);
    assert!(matches!(
        store.rename(&p("a/x"), "y"),
        Err(StoreError::AlreadyExists { .. })
    ));
    assert!(store.exists(&p("a/x")).unwrap());
    assert!(store.exists(&p("a/y")).unwrap());
}

fn rename_to_same_name_is_noop(store: &dyn TreeStore) {
    create_all(store, &["a", "a/x"]);
    store.rename(&p("a/x"), "x").unwrap();
    assert!(store.exists(&p("a/x")).unwrap());
}

fn rename_failures(store: &dyn TreeStore) {
    store.create(&p("a")).unwrap();
    assert!(matches!(store.rename(&p("a"), ""), Err(StoreError::EmptyName)));
    assert!(matches!(
        store.rename(&p("missing"), "x"),
        Err(StoreError::NotFound { .. })
    ));
}

fn subtree_lists_children(store: &dyn TreeStore) {
    create_all(store, &["x", "x/y", "x/z"]);
    let tree = store.subtree(&p("x")).unwrap();
    assert_eq!(tree.service, "x");
    let mut names: Vec<&str> = tree.children.iter().map(|c| c.service.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["y", "z"]);
}

fn full_tree_nests_roots(store: &dyn TreeStore) {
    assert!(store.full_tree().unwrap().is_empty());
    create_all(store, &["b", "a", "a/c", "a/c/d"]);
    store.increment(&p("a/c/d")).unwrap();

    let roots = store.full_tree().unwrap();
    assert_eq!(roots.len(), 2);
    let a = roots.iter().find(|n| n.service == "a").unwrap();
    assert_eq!(a.time, 1);
    let d = a.child("c").and_then(|c| c.child("d")).unwrap();
    assert_eq!(d.time, 1);
    assert!(d.children.is_empty());
}

fn concurrent_increments_stay_consistent(store: &dyn TreeStore) {
    create_all(store, &["root", "root/left", "root/right"]);
    thread::scope(|scope| {
        for leaf in ["root/left", "root/right"] {
            scope.spawn(move || {
                for _ in 0..50 {
                    store.increment(&p(leaf)).unwrap();
                }
            });
        }
    });
    assert_eq!(store.counter(&p("root")).unwrap(), 100);
    assert_eq!(store.counter(&p("root/left")).unwrap(), 50);
    assert_eq!(store.counter(&p("root/right")).unwrap(), 50);
}

macro_rules! backend_suite {
    ($backend:ident; $($case:ident),* $(,)?) => {
        mod $backend {
            $(
                #[test]
                fn $case() {
                    let (store, _dir) = super::$backend();
                    super::$case(store.as_ref());
                }
            )*
        }
    };
}

macro_rules! all_backends {
    ($($backend:ident),*) => {
        $(
            backend_suite!(
                $backend;
                create_then_exists,
                create_requires_parent,
                empty_path_is_rejected,
                counter_starts_at_zero,
                increment_propagates_to_ancestors,
                increment_leaves_siblings_alone,
                increment_unknown_leaf_changes_nothing,
                delete_cascades,
                delete_spares_prefix_named_sibling,
                delete_nested_keeps_parent,
                rename_root,
                rename_preserves_counter_and_children,
                rename_onto_sibling_conflicts,
                rename_to_same_name_is_noop,
                rename_failures,
                subtree_lists_children,
                full_tree_nests_roots,
                concurrent_increments_stay_consistent,
            );
        )*
    };
}

all_backends!(memory_forest, file_forest, memory_sqlite, file_sqlite);

#[test]
fn forest_snapshot_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("services.json");
    {
        let store = ForestStore::open(&path).unwrap();
        create_all(&store, &["app", "app/api"]);
        store.increment(&p("app/api")).unwrap();
        store.rename(&p("app"), "svc").unwrap();
    }

    let reopened = ForestStore::open(&path).unwrap();
    assert_eq!(reopened.counter(&p("svc")).unwrap(), 1);
    assert_eq!(reopened.counter(&p("svc/api")).unwrap(), 1);
    assert!(!reopened.exists(&p("app")).unwrap());
}

#[test]
fn sqlite_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("services.db");
    {
        let store = SqliteTreeStore::open(&path).unwrap();
        create_all(&store, &["app", "app/api", "gone"]);
        store.increment(&p("app/api")).unwrap();
        store.delete(&p("gone")).unwrap();
    }

    let reopened = SqliteTreeStore::open(&path).unwrap();
    assert_eq!(reopened.counter(&p("app")).unwrap(), 1);
    assert_eq!(reopened.counter(&p("app/api")).unwrap(), 1);
    assert!(!reopened.exists(&p("gone")).unwrap());
}

#[test]
fn failed_snapshot_write_leaves_memory_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("services.json");
    let store = ForestStore::open(&path).unwrap();
    store.create(&p("kept")).unwrap();

    // Removing the parent directory makes the next temp file creation fail.
    std::fs::remove_dir_all(dir.path()).unwrap();
    assert!(store.create(&p("lost")).is_err());
    assert!(store.exists(&p("kept")).unwrap());
    assert!(!store.exists(&p("lost")).unwrap());
}

#[test]
fn service_node_serializes_time_as_string() {
    let node = ServiceNode {
        service: "app".into(),
        time: 42,
        children: Vec::new(),
    };
    let json = serde_json::to_value(&node).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"service": "app", "time": "42", "children": []})
    );
    let back: ServiceNode = serde_json::from_value(json).unwrap();
    assert_eq!(back, node);
}

#[test]
fn store_error_fault_classification() {
    assert!(!StoreError::EmptyPath.is_fault());
    assert!(!StoreError::not_found(&p("a")).is_fault());
    assert!(StoreError::Corrupt("x".into()).is_fault());
    assert!(StoreError::Io(std::io::Error::other("disk")).is_fault());
}

/// Paths over a tiny alphabet so that prefix-named siblings (`a`, `a1`,
/// `a10`) show up often.
fn arb_path() -> impl Strategy<Value = Vec<&'static str>> {
    prop::collection::vec(prop::sample::select(vec!["a", "a1", "a10", "b"]), 1..4)
}

fn populate(store: &dyn TreeStore, paths: &[Vec<&str>]) -> Vec<ServicePath> {
    let mut created = Vec::new();
    for path in paths {
        for prefix in ServicePath::new(path.iter().copied()).prefixes() {
            if store.create(&prefix).is_ok() {
                created.push(prefix);
            }
        }
    }
    created
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn delete_removes_exactly_the_subtree(
        paths in prop::collection::vec(arb_path(), 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        for (store, _dir) in [memory_forest(), memory_sqlite()] {
            let created = populate(store.as_ref(), &paths);
            let target = pick.get(&created).clone();
            store.delete(&target).unwrap();
            for path in &created {
                prop_assert_eq!(store.exists(path).unwrap(), !path.starts_with(&target));
            }
        }
    }

    #[test]
    fn increment_touches_exactly_the_ancestor_chain(
        paths in prop::collection::vec(arb_path(), 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        for (store, _dir) in [memory_forest(), memory_sqlite()] {
            let created = populate(store.as_ref(), &paths);
            let target = pick.get(&created).clone();
            store.increment(&target).unwrap();
            for path in &created {
                let expected = u64::from(target.starts_with(path));
                prop_assert_eq!(store.counter(path).unwrap(), expected);
            }
        }
    }
}
