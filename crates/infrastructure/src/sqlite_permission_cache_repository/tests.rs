use chrono::{TimeZone, Utc};

use guardian_application::{ClusterRepository, PermissionCacheRepository};
use guardian_core::ClusterId;
use guardian_domain::{
    ClusterConfig, ClusterConfigInput, ClusterType, CredentialMode, PermissionKind, RemoteUser,
    TablePermission,
};

use crate::SqliteCacheStore;

async fn store_with_cluster(name: &str) -> (SqliteCacheStore, ClusterId) {
    let Ok(store) = SqliteCacheStore::in_memory().await else {
        panic!("in-memory store should open");
    };

    let cluster = ClusterConfig::new(ClusterConfigInput {
        name: name.to_owned(),
        host: "warehouse.internal".to_owned(),
        port: 5439,
        database: "dev".to_owned(),
        cluster_type: ClusterType::Provisioned,
        region: "us-east-1".to_owned(),
        credential: CredentialMode::default(),
    });
    let Ok(cluster) = cluster else {
        panic!("valid cluster");
    };
    let Ok(saved) = store.cluster_repository().insert_cluster(&cluster).await else {
        panic!("insert should succeed");
    };
    let Some(id) = saved.id() else {
        panic!("saved cluster should have an id");
    };

    (store, id)
}

fn user(username: &str) -> RemoteUser {
    RemoteUser {
        username: username.to_owned(),
        user_id: 100,
        is_superuser: username == "admin",
        can_create_db: false,
        can_create_user: false,
        valid_until: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).single(),
    }
}

fn grant(username: &str, table: &str, permission: PermissionKind) -> TablePermission {
    TablePermission {
        username: username.to_owned(),
        schema_name: "sales".to_owned(),
        table_name: table.to_owned(),
        permission,
    }
}

#[tokio::test]
async fn replacing_a_snapshot_drops_prior_rows() {
    let (store, cluster_id) = store_with_cluster("Primary").await;
    let repository = store.permission_cache_repository();

    let first = repository
        .replace_snapshot(
            cluster_id,
            &[user("old_user")],
            &[grant("old_user", "orders", PermissionKind::Select)],
        )
        .await;
    assert!(first.is_ok());

    let second = repository
        .replace_snapshot(
            cluster_id,
            &[user("bob"), user("admin")],
            &[
                grant("bob", "orders", PermissionKind::Insert),
                grant("admin", "orders", PermissionKind::Delete),
            ],
        )
        .await;
    assert!(second.is_ok());

    let users = repository.cached_users(cluster_id).await.unwrap_or_default();
    let usernames: Vec<&str> = users.iter().map(|user| user.username.as_str()).collect();
    assert_eq!(usernames, vec!["admin", "bob"]);
    assert_eq!(users[0], user("admin"));

    let permissions = repository
        .cached_permissions(cluster_id)
        .await
        .unwrap_or_default();
    assert_eq!(
        permissions,
        vec![
            grant("admin", "orders", PermissionKind::Delete),
            grant("bob", "orders", PermissionKind::Insert),
        ]
    );
    assert_eq!(repository.cached_user_count(cluster_id).await.ok(), Some(2));
    assert_eq!(
        repository.cached_permission_count(cluster_id).await.ok(),
        Some(2)
    );
}

#[tokio::test]
async fn failed_replacement_keeps_previous_snapshot() {
    let (store, cluster_id) = store_with_cluster("Primary").await;
    let repository = store.permission_cache_repository();

    assert!(
        repository
            .replace_snapshot(cluster_id, &[user("alice")], &[])
            .await
            .is_ok()
    );

    let dropped = sqlx::query("DROP TABLE cached_permissions")
        .execute(&store.pool())
        .await;
    assert!(dropped.is_ok());

    let replaced = repository
        .replace_snapshot(cluster_id, &[user("mallory")], &[])
        .await;
    assert!(replaced.is_err());

    let users = repository.cached_users(cluster_id).await.unwrap_or_default();
    assert_eq!(users, vec![user("alice")]);
}

#[tokio::test]
async fn deleting_a_cluster_cascades_its_snapshot() {
    let (store, cluster_id) = store_with_cluster("Primary").await;
    let repository = store.permission_cache_repository();

    assert!(
        repository
            .replace_snapshot(
                cluster_id,
                &[user("alice")],
                &[grant("alice", "orders", PermissionKind::Update)],
            )
            .await
            .is_ok()
    );
    assert!(
        store
            .cluster_repository()
            .delete_cluster(cluster_id)
            .await
            .is_ok()
    );

    assert_eq!(repository.cached_user_count(cluster_id).await.ok(), Some(0));
    assert_eq!(
        repository.cached_permission_count(cluster_id).await.ok(),
        Some(0)
    );
}

#[tokio::test]
async fn snapshots_are_partitioned_by_cluster() {
    let (store, first) = store_with_cluster("First").await;
    let cluster = ClusterConfig::new(ClusterConfigInput {
        name: "Second".to_owned(),
        host: "second.internal".to_owned(),
        port: 5439,
        database: "dev".to_owned(),
        cluster_type: ClusterType::Provisioned,
        region: "us-east-1".to_owned(),
        credential: CredentialMode::default(),
    });
    let Ok(cluster) = cluster else {
        panic!("valid cluster");
    };
    let Ok(Some(second)) = store
        .cluster_repository()
        .insert_cluster(&cluster)
        .await
        .map(|saved| saved.id())
    else {
        panic!("second cluster should be saved");
    };

    let repository = store.permission_cache_repository();
    assert!(
        repository
            .replace_snapshot(first, &[user("alice")], &[])
            .await
            .is_ok()
    );
    assert!(
        repository
            .replace_snapshot(second, &[user("bob"), user("carol")], &[])
            .await
            .is_ok()
    );

    assert_eq!(repository.cached_user_count(first).await.ok(), Some(1));
    assert_eq!(repository.cached_user_count(second).await.ok(), Some(2));
}
