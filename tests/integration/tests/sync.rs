//! Repeated scans, deletions and failure handling.

use dirsync_core::{ErrorKind, RawEntry, SyncMode};

use crate::common::{Harness, river_source, target};

#[tokio::test]
async fn second_scan_changes_nothing() {
    let harness = Harness::fixture();
    let config = river_source().build().unwrap();

    let first = harness.scan(&config).await;
    assert_eq!(first.changed(), 5);

    let second = harness.scan(&config).await;
    assert!(second.is_success());
    assert_eq!(second.changed(), 0);
    assert_eq!(second.deleted, 0);
    assert_eq!(second.unchanged, 5);
}

#[tokio::test]
async fn removed_entry_is_deleted() {
    let harness = Harness::fixture();
    let config = river_source().build().unwrap();
    harness.scan(&config).await;

    assert!(harness.directory.remove("uid=christopher,ou=users,ou=system"));
    let outcome = harness.scan(&config).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.deleted, 1);
    assert_eq!(outcome.changed(), 0);
    assert!(harness.memory().get(&target(), "christopher").is_none());
    assert_eq!(harness.memory().count(&target()), 4);
}

#[tokio::test]
async fn modified_entry_is_updated() {
    let harness = Harness::fixture();
    let config = river_source().build().unwrap();
    harness.scan(&config).await;

    harness.directory.add(
        RawEntry::new("uid=john,ou=users,ou=system")
            .with_attr("objectClass", ["uidObject", "person", "top"])
            .with_attr("uid", ["john"])
            .with_attr("cn", ["John Woo Yu-Sen"])
            .with_attr("sn", ["john"]),
    );
    let outcome = harness.scan(&config).await;

    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.unchanged, 4);
    assert_eq!(harness.memory().match_field(&target(), "name", "yu").len(), 1);
}

#[tokio::test]
async fn append_only_never_deletes() {
    let harness = Harness::fixture();
    let config = river_source().sync_mode(SyncMode::AppendOnly).build().unwrap();
    harness.scan(&config).await;

    harness.directory.remove("uid=christopher,ou=users,ou=system");
    let outcome = harness.scan(&config).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.deleted, 0);
    assert_eq!(harness.memory().count(&target()), 5);
}

#[tokio::test]
async fn wrong_credentials_fail_the_scan() {
    let harness = Harness::fixture();
    let config = river_source()
        .credentials("uid=admin,ou=system", "wrong")
        .build()
        .unwrap();

    let outcome = harness.scan(&config).await;
    assert_eq!(outcome.status.error_kind(), Some(ErrorKind::SourceUnreachable));
    assert_eq!(harness.memory().count(&target()), 0);
}

#[tokio::test]
async fn missing_base_dn_is_a_configuration_error() {
    let harness = Harness::fixture();
    let config = river_source().base_dn("ou=nowhere").build().unwrap();

    let outcome = harness.scan(&config).await;
    assert_eq!(outcome.status.error_kind(), Some(ErrorKind::Configuration));
}

#[tokio::test]
async fn index_outage_fails_without_losing_documents() {
    let harness = Harness::fixture();
    let config = river_source().build().unwrap();
    harness.scan(&config).await;

    harness.index.set_down(true);
    harness.directory.remove("uid=john,ou=users,ou=system");
    let outcome = harness.scan(&config).await;
    assert_eq!(outcome.status.error_kind(), Some(ErrorKind::IndexUnreachable));
    assert_eq!(harness.memory().count(&target()), 5);

    harness.index.set_down(false);
    let outcome = harness.scan(&config).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.deleted, 1);
}
