use chrono::{Duration, Utc};
use stc_core::profile::default_index_configs;
use stc_core::types::{Bookmark, SearchMetric};
use stc_store::{MetaStore, StoreError, METRICS_RETENTION};
use tempfile::TempDir;

#[test]
fn metrics_keep_only_most_recent_hundred() {
    let store = MetaStore::in_memory().unwrap();
    for i in 0..150 {
        store.add_search_metric(&SearchMetric::new(f64::from(i))).unwrap();
        assert!(store.search_metric_count().unwrap() <= METRICS_RETENTION);
    }
    assert_eq!(store.search_metric_count().unwrap(), 100);

    let recent = store.recent_search_metrics(200).unwrap();
    assert_eq!(recent.len(), 100);
    let spent: Vec<f64> = recent.iter().map(|m| m.spent).collect();
    let expected: Vec<f64> = (50..150).rev().map(f64::from).collect();
    assert_eq!(spent, expected, "newest first, oldest fifty evicted");

    // mean of 149, 148, 147
    assert_eq!(store.average_spent(3).unwrap(), Some(148.0));
    assert_eq!(store.average_spent(101).unwrap(), None);
}

#[test]
fn bookmark_add_has_delete() {
    let store = MetaStore::in_memory().unwrap();
    assert!(!store.has_bookmark("nexus_science", "black holes").unwrap());

    store.add_bookmark(&Bookmark::new("nexus_science", "black holes")).unwrap();
    assert!(store.has_bookmark("nexus_science", "black holes").unwrap());
    assert!(!store.has_bookmark("nexus_free", "black holes").unwrap());

    assert!(store.delete_bookmark("nexus_science", "black holes").unwrap());
    assert!(!store.has_bookmark("nexus_science", "black holes").unwrap());
    assert!(!store.delete_bookmark("nexus_science", "black holes").unwrap());
}

#[test]
fn bookmarks_list_newest_first_and_upsert_by_key() {
    let store = MetaStore::in_memory().unwrap();
    let now = Utc::now();
    let mut old = Bookmark::new("nexus_science", "old");
    old.created_at = now - Duration::hours(2);
    let mut new = Bookmark::new("nexus_science", "new");
    new.created_at = now;
    store.add_bookmark(&old).unwrap();
    store.add_bookmark(&new).unwrap();
    store.add_bookmark(&old).unwrap();

    let queries: Vec<_> = store.list_bookmarks().unwrap().into_iter().map(|b| b.query).collect();
    assert_eq!(queries, ["new", "old"]);
}

#[test]
fn index_config_names_are_unique() {
    let store = MetaStore::in_memory().unwrap();
    let configs = default_index_configs("http://localhost/data");
    store.save_index_config(&configs[0]).unwrap();
    let err = store.save_index_config(&configs[0]).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(name) if name == "nexus_free"));

    let loaded = store.get_index_config("nexus_free").unwrap().unwrap();
    assert_eq!(loaded, configs[0]);
    assert!(store.get_index_config("nexus_media").unwrap().is_none());
}

#[test]
fn defaults_install_once_and_enable_toggle_persists() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("meta.redb");
    let configs = default_index_configs("http://localhost/data");
    {
        let store = MetaStore::open(&path).unwrap();
        assert_eq!(store.install_default_index_configs(&configs).unwrap(), 3);
        assert_eq!(store.install_default_index_configs(&configs).unwrap(), 0);
        store.set_index_enabled("nexus_media", true).unwrap();
        assert!(store.delete_index_config("nexus_free").unwrap());
    }

    let store = MetaStore::open(&path).unwrap();
    let names: Vec<_> = store.list_index_configs().unwrap().into_iter().map(|c| c.index_name).collect();
    assert_eq!(names, ["nexus_media", "nexus_science"]);
    assert!(store.get_index_config("nexus_media").unwrap().unwrap().index_properties.is_enabled);
    assert_eq!(store.install_default_index_configs(&configs).unwrap(), 1);

    let missing = store.set_index_enabled("nexus_unknown", true).unwrap_err();
    assert!(matches!(missing, StoreError::NotFound(_)));
}
