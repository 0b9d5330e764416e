//! Directory-to-index scenarios against the fixture directory.

use dirsync_core::{FailureKind, RawEntry, ScanStatus};

use crate::common::{Harness, river_source, sorted, target};

#[tokio::test]
async fn river_indexes_five_people() {
    let harness = Harness::fixture();
    let config = river_source().build().unwrap();

    let outcome = harness.scan(&config).await;
    assert_eq!(outcome.status, ScanStatus::Succeeded);
    assert_eq!(outcome.created, 5);
    assert!(outcome.failures.is_empty());

    let index = harness.memory();
    let target = target();
    assert_eq!(index.count(&target), 5);
    assert_eq!(index.match_field(&target, "groups", "uidObject").len(), 3);
    assert_eq!(index.match_field(&target, "_id", "clint"), vec!["clint"]);
    assert_eq!(index.match_field(&target, "name", "clint").len(), 1);
    assert_eq!(index.query_string(&target, "woo"), vec!["john"]);
    assert!(index.get(&target, "christopher").is_some());
    assert!(index.get(&target, "john").is_some());
}

#[tokio::test]
async fn containers_and_referrals_are_never_indexed() {
    let harness = Harness::fixture();
    let config = river_source().filter("(objectClass=*)").build().unwrap();

    let outcome = harness.scan(&config).await;
    assert!(outcome.is_success(), "{:?}", outcome.status);
    // ou=system, ou=users, ou=Computers and the referral
    assert_eq!(outcome.skipped, 4);
    assert_eq!(outcome.entries_seen, 9);
    assert_eq!(
        harness.memory().ids(&target()),
        sorted(&["Person", "administrator", "christopher", "clint", "john"])
    );
}

#[tokio::test]
async fn page_size_does_not_change_the_result() {
    let mut results = Vec::new();
    for page_size in [1, 2, 3, 500] {
        let harness = Harness::fixture();
        let config = river_source()
            .filter("(objectClass=*)")
            .page_size(page_size)
            .build()
            .unwrap();

        let outcome = harness.scan(&config).await;
        assert!(outcome.is_success(), "page size {page_size}: {:?}", outcome.status);
        assert_eq!(outcome.created, 5);
        results.push(harness.memory().ids(&target()));
    }

    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn strict_scan_converges_to_the_directory() {
    let harness = Harness::fixture();
    let config = river_source().build().unwrap();
    harness.scan(&config).await;

    harness.directory.remove("uid=john,ou=users,ou=system");
    harness.directory.remove("cn=The Person,ou=system");
    harness.directory.add(
        RawEntry::new("uid=sergio,ou=users,ou=system")
            .with_attr("objectClass", ["uidObject", "person", "top"])
            .with_attr("uid", ["sergio"])
            .with_attr("cn", ["Sergio Leone"])
            .with_attr("sn", ["sergio"]),
    );
    // A subtree below a person, reachable through the filter.
    harness.directory.add(
        RawEntry::new("ou=Films,uid=sergio,ou=users,ou=system")
            .with_attr("objectClass", ["organizationalUnit", "person"])
            .with_attr("sn", ["films"]),
    );

    let outcome = harness.scan(&config).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.deleted, 2);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(
        harness.memory().ids(&target()),
        sorted(&["administrator", "christopher", "clint", "sergio"])
    );
}

#[tokio::test]
async fn entry_without_identifier_is_isolated() {
    let harness = Harness::fixture();
    harness.directory.remove("uid=admin,ou=system");
    harness.directory.add(
        RawEntry::new("uid=nobody,ou=users,ou=system")
            .with_attr("objectClass", ["person", "top"])
            .with_attr("uid", ["nobody"])
            .with_attr("cn", ["Nobody"]),
    );
    let config = river_source().build().unwrap();

    let outcome = harness.scan(&config).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures_of(FailureKind::MissingIdentifier), 1);
    assert_eq!(
        outcome.failures[0].dn.as_deref(),
        Some("uid=nobody,ou=users,ou=system")
    );
    assert_eq!(outcome.upserts(), 4);
    assert_eq!(harness.memory().count(&target()), 4);
}
