//! Common test utilities and fixtures.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dirsync_core::{
    DocumentIndex, IndexTarget, ItemResult, MappedDocument, SourceConfig, SourceConfigBuilder,
    SyncError, SyncOutcome, SyncResult,
};
use dirsync_engine::SyncEngine;
use dirsync_index::MemoryIndex;
use dirsync_ldap::LdifDirectory;
use tokio_util::sync::CancellationToken;

/// Bind DN of the fixture's administrator.
pub const ADMIN_DN: &str = "uid=admin,ou=system";

/// Password of the fixture's administrator.
pub const ADMIN_PASSWORD: &str = "secret";

/// Index and document kind used by the scenarios.
pub const INDEX: &str = "ldapserver0";
pub const KIND: &str = "person";

/// Directory content: five people, one organizational unit below a person
/// and one referral.
pub const FIXTURE_LDIF: &str = "\
version: 1

dn: ou=system
objectClass: organizationalUnit
objectClass: top
ou: system

dn: uid=admin,ou=system
objectClass: person
objectClass: top
uid: admin
sn: administrator
cn: system administrator

dn: cn=The Person,ou=system
objectClass: person
objectClass: top
sn: Person
cn: The Person
description: this is a person

dn: ou=users,ou=system
objectClass: organizationalUnit
objectClass: top
ou: users

dn: uid=john,ou=users,ou=system
objectClass: uidObject
objectClass: person
objectClass: top
uid: john
cn: John Woo
sn: john

dn: uid=christopher,ou=users,ou=system
objectClass: uidObject
objectClass: person
objectClass: top
uid: christopher
cn: Christopher Nolan
sn: christopher

dn: uid=clint,ou=users,ou=system
objectClass: uidObject
objectClass: person
objectClass: top
uid: clint
cn: Clint Eastwood
sn: clint

dn: ou=Computers,uid=clint,ou=users,ou=system
objectClass: organizationalUnit
objectClass: top
ou: Computers

dn: uid=clintref,ou=users,ou=system
objectClass: uidObject
objectClass: referral
objectClass: top
uid: clintref
ref: ldap://localhost:10389/uid=clint,ou=users,ou=system
";

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "dirsync_engine=debug".to_string()),
        )
        .with_test_writer()
        .try_init();
}

/// Loads the fixture directory, requiring the administrator's credentials.
pub fn fixture_directory() -> LdifDirectory {
    LdifDirectory::from_ldif(FIXTURE_LDIF)
        .expect("fixture LDIF parses")
        .with_credentials(ADMIN_DN, ADMIN_PASSWORD)
}

/// A source configured like the classic person river: `sn` is the document
/// identifier, `cn` becomes `name` and `objectClass` becomes `groups`.
pub fn river_source() -> SourceConfigBuilder {
    SourceConfig::builder()
        .id(INDEX)
        .host("localhost")
        .port(9389)
        .credentials(ADMIN_DN, ADMIN_PASSWORD)
        .base_dn("ou=system")
        .filter("(objectClass=person)")
        .attributes(["sn", "cn", "objectClass"])
        .fields(["_id", "name", "groups"])
        .target(INDEX, KIND)
}

/// The scenarios' index target.
pub fn target() -> IndexTarget {
    IndexTarget::new(INDEX, KIND)
}

/// Sorted identifiers.
pub fn sorted(ids: &[&str]) -> Vec<String> {
    let mut ids: Vec<String> = ids.iter().map(|s| (*s).to_string()).collect();
    ids.sort();
    ids
}

/// Engine wired to a directory and an index, with scan helpers.
pub struct Harness {
    pub directory: LdifDirectory,
    pub index: Arc<OutageIndex>,
    pub engine: SyncEngine,
}

impl Harness {
    pub fn new(directory: LdifDirectory) -> Self {
        init_tracing();
        let index = Arc::new(OutageIndex::default());
        let engine = SyncEngine::new(Arc::new(directory.clone()), index.clone());
        Self {
            directory,
            index,
            engine,
        }
    }

    pub fn fixture() -> Self {
        Self::new(fixture_directory())
    }

    pub async fn scan(&self, config: &SourceConfig) -> SyncOutcome {
        self.engine.run_scan(config, &CancellationToken::new()).await
    }

    pub fn memory(&self) -> &MemoryIndex {
        &self.index.inner
    }
}

/// In-memory index that can be switched into an outage.
#[derive(Default)]
pub struct OutageIndex {
    pub inner: MemoryIndex,
    down: AtomicBool,
}

impl OutageIndex {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> SyncResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(SyncError::index_unreachable("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentIndex for OutageIndex {
    async fn bulk_upsert(
        &self,
        target: &IndexTarget,
        documents: &[MappedDocument],
    ) -> SyncResult<Vec<ItemResult>> {
        self.check()?;
        self.inner.bulk_upsert(target, documents).await
    }

    async fn bulk_delete(
        &self,
        target: &IndexTarget,
        ids: &[String],
    ) -> SyncResult<Vec<ItemResult>> {
        self.check()?;
        self.inner.bulk_delete(target, ids).await
    }

    async fn list_document_ids(&self, target: &IndexTarget) -> SyncResult<HashSet<String>> {
        self.check()?;
        self.inner.list_document_ids(target).await
    }
}
