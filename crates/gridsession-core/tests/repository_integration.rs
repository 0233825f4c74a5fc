//! Repository behaviour across store topologies.

use std::sync::Arc;
use std::time::Duration;

use gridsession_config::{GridSessionConfig, SessionConfig, StoreConfig};
use gridsession_core::{
    Authentication, ClientStore, Error, KeyValueStore, PeerStore, PRINCIPAL_NAME_INDEX_NAME,
    SECURITY_CONTEXT_ATTRIBUTE, SecurityContext, Session, SessionRepository, StoreBackend,
    StoreError, Topology, create_store,
};

fn peer_repository() -> SessionRepository {
    SessionRepository::builder()
        .store(Arc::new(
            PeerStore::new("ClusteredSessions").with_index(PRINCIPAL_NAME_INDEX_NAME),
        ))
        .build()
        .unwrap()
}

fn authenticate(session: &Session, name: &str) {
    session.set_attribute(
        SECURITY_CONTEXT_ATTRIBUTE,
        SecurityContext::authenticated(Authentication::new(name).with_authority("ROLE_USER")),
    );
}

#[test]
fn test_find_by_principal_name_splits_by_owner() {
    let repo = peer_repository();
    let mut rob = Vec::new();
    let mut jblum = Vec::new();

    for i in 0..5 {
        let session = repo.create_session();
        if i % 2 == 0 {
            session.set_principal_name("robWinch");
            rob.push(session.id().to_string());
        } else {
            session.set_principal_name("jblum");
            jblum.push(session.id().to_string());
        }
        repo.save(&session).unwrap();
    }

    let found = repo.find_by_principal_name("robWinch").unwrap();
    assert_eq!(found.len(), 3);
    for id in &rob {
        assert!(found.contains_key(id));
    }

    let found = repo.find_by_principal_name("jblum").unwrap();
    assert_eq!(found.len(), 2);
    for id in &jblum {
        assert_eq!(found[id].principal_name().as_deref(), Some("jblum"));
    }

    assert!(repo.find_by_principal_name("nobody").unwrap().is_empty());
}

#[test]
fn test_changing_security_context_moves_session_between_principals() {
    let repo = peer_repository();
    let session = repo.create_session();
    authenticate(&session, "alice");
    repo.save(&session).unwrap();
    assert!(repo.find_by_principal_name("alice").unwrap().contains_key(session.id()));

    let loaded = repo.get_session(session.id()).unwrap().unwrap();
    authenticate(&loaded, "bob");
    repo.save(&loaded).unwrap();

    assert!(repo.find_by_principal_name("alice").unwrap().is_empty());
    let bob = repo.find_by_principal_name("bob").unwrap();
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[session.id()].principal_name().as_deref(), Some("bob"));
}

#[test]
fn test_saved_changes_replicate_through_deltas() {
    let repo = peer_repository();
    let session = repo.create_session();
    session.set_attribute("booleanAttribute", true);
    session.set_attribute("stringAttribute", "test");
    repo.save(&session).unwrap();

    let loaded = repo.get_session(session.id()).unwrap().unwrap();
    loaded.set_attribute("stringAttribute", "changed");
    loaded.remove_attribute("booleanAttribute");
    loaded.set_max_inactive_interval_secs(600);
    repo.save(&loaded).unwrap();
    assert!(!loaded.has_delta());

    let reloaded = repo.get_session(session.id()).unwrap().unwrap();
    assert_eq!(reloaded.attribute_names().into_iter().collect::<Vec<_>>(), vec!["stringAttribute"]);
    assert_eq!(
        reloaded.get_attribute("stringAttribute").and_then(|v| v.as_text().map(String::from)),
        Some("changed".to_string())
    );
    assert_eq!(reloaded.max_inactive_interval_secs(), 600);
}

#[test]
fn test_expired_session_reads_as_missing_and_is_removed() {
    let repo = peer_repository();
    let session = repo.create_session();
    session.set_principal_name("jblum");
    session.set_last_accessed_time(0);
    repo.save(&session).unwrap();

    assert!(repo.find_by_principal_name("jblum").unwrap().is_empty());
    assert!(repo.get_session(session.id()).unwrap().is_none());
    assert!(repo.store().get(session.id()).unwrap().is_none());
}

#[test]
fn test_session_without_expiry_survives_old_access_time() {
    let repo = peer_repository();
    repo.set_max_inactive_interval_secs(-1);
    let session = repo.create_session();
    session.set_last_accessed_time(0);
    repo.save(&session).unwrap();

    assert!(repo.get_session(session.id()).unwrap().is_some());
}

#[test]
fn test_idle_entries_expire_from_peer_store() {
    let store = Arc::new(PeerStore::new("ClusteredSessions").with_idle_timeout(Some(Duration::from_millis(20))));
    let repo = SessionRepository::builder().store(store.clone()).build().unwrap();

    let session = repo.create_session();
    repo.save(&session).unwrap();
    std::thread::sleep(Duration::from_millis(40));
    store.expire_idle_entries();

    assert!(repo.get_session(session.id()).unwrap().is_none());
}

#[test]
fn test_client_topology_shares_server_data() {
    let config = GridSessionConfig {
        session: Some(SessionConfig {
            max_inactive_interval_secs: 300,
        }),
        ..GridSessionConfig::default()
    };
    let server = create_store(&config, None).unwrap();

    let client_config = GridSessionConfig {
        store: Some(StoreConfig {
            topology: Topology::Client,
            ..StoreConfig::default()
        }),
        ..config.clone()
    };
    let client = create_store(&client_config, Some(server.as_store())).unwrap();
    assert!(matches!(client, StoreBackend::Client(_)));

    let server_repo = SessionRepository::builder_from_config(&config)
        .store(server.as_store())
        .build()
        .unwrap();
    let client_repo = SessionRepository::builder_from_config(&client_config)
        .store(client.as_store())
        .build()
        .unwrap();

    let session = client_repo.create_session();
    assert_eq!(session.max_inactive_interval_secs(), 300);
    session.set_principal_name("jblum");
    client_repo.save(&session).unwrap();

    assert!(server_repo.get_session(session.id()).unwrap().is_some());
    assert_eq!(client_repo.find_by_principal_name("jblum").unwrap().len(), 1);
}

#[test]
fn test_disconnected_client_errors_propagate() {
    let server = Arc::new(PeerStore::new("ClusteredSessions"));
    let client = Arc::new(ClientStore::new(server, true));
    let repo = SessionRepository::builder().store(client.clone()).build().unwrap();
    let session = repo.create_session();
    repo.save(&session).unwrap();

    client.disconnect();

    let err = repo.get_session(session.id()).unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Disconnected(_))));
    assert!(matches!(repo.save(&session), Err(Error::Store(_))));
    assert!(matches!(repo.delete(session.id()), Err(Error::Store(_))));
    assert!(matches!(repo.find_by_principal_name("x"), Err(Error::Store(_))));
}

#[test]
fn test_builder_without_store_fails_fast() {
    let err = SessionRepository::builder()
        .max_inactive_interval_secs(60)
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
}

#[test]
fn test_concurrent_saves_on_distinct_sessions() {
    let repo = Arc::new(peer_repository());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let repo = Arc::clone(&repo);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    let session = repo.create_session();
                    session.set_principal_name(format!("user-{t}"));
                    repo.save(&session).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for t in 0..4 {
        assert_eq!(repo.find_by_principal_name(&format!("user-{t}")).unwrap().len(), 25);
    }
}

#[test]
fn test_repository_store_is_shared_trait_object() {
    let repo = peer_repository();
    let store: &Arc<dyn KeyValueStore> = repo.store();
    assert_eq!(store.name(), "ClusteredSessions");
}
