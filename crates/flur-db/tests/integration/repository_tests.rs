use flur_core::AppError;
use flur_core::models::{AuditEvent, NewEvidence};
use flur_core::traits::{AuditLog, EvidenceStore, ParcelEngine, ProfileStore};
use flur_db::{Database, PgAuditLog, PgEvidenceStore, PgParcelEngine, PgProfileStore};
use uuid::Uuid;

use crate::integration::common::setup_test_db;

fn evidence(external_id: &str, region_id: Uuid, content_hash: Option<&str>) -> NewEvidence {
    NewEvidence {
        external_id: external_id.to_string(),
        title: "Aufstellungsbeschluss Solarpark".to_string(),
        doc_type: "Paper".to_string(),
        published_date: Some("2024-05-02".to_string()),
        url: Some(format!("https://ris.musterstadt.de/{external_id}")),
        region_id,
        relevant: true,
        risk_score: 80,
        summary: "Herr [PER] hat den Antrag gestellt.".to_string(),
        content_hash: content_hash.map(str::to_string),
    }
}

#[tokio::test]
async fn profiles_round_trip_with_extra_columns() {
    let (pool, _container) = setup_test_db().await;
    let profiles = PgProfileStore::new(pool.clone());

    let created = profiles
        .create(
            "Musterstadt",
            Some("https://ris.musterstadt.de/bi/"),
            Some("https://oparl.musterstadt.de/system"),
        )
        .await
        .unwrap();
    assert_eq!(created.name, "Musterstadt");
    assert!(created.active);
    assert!(created.last_scout_at.is_none());

    sqlx::query("UPDATE scout_profiles SET state = 'Hessen' WHERE id = $1")
        .bind(created.id)
        .execute(&pool)
        .await
        .unwrap();

    let active = profiles.active_profiles().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, created.id);
    assert_eq!(
        active[0].oparl_url.as_deref(),
        Some("https://oparl.musterstadt.de/system")
    );
    assert_eq!(active[0].extra["state"], "Hessen");
}

#[tokio::test]
async fn inactive_profiles_are_hidden_and_scouting_is_stamped() {
    let (pool, _container) = setup_test_db().await;
    let profiles = PgProfileStore::new(pool);

    let keep = profiles
        .create("Musterstadt", Some("https://ris.musterstadt.de/bi/"), None)
        .await
        .unwrap();
    let paused = profiles
        .create("Beispielheim", Some("https://www.beispielheim.de/"), None)
        .await
        .unwrap();
    profiles.set_active(paused.id, false).await.unwrap();

    let active = profiles.active_profiles().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, keep.id);

    profiles.mark_scouted(keep.id).await.unwrap();
    let stamped = profiles.get(keep.id).await.unwrap().unwrap();
    assert!(stamped.last_scout_at.is_some());

    assert!(profiles.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn evidence_upserts_on_external_id() {
    let (pool, _container) = setup_test_db().await;
    let db = Database::from_pool(pool);
    let profile = db
        .profiles()
        .create("Musterstadt", Some("https://ris.musterstadt.de/bi/"), None)
        .await
        .unwrap();
    let store: PgEvidenceStore = db.evidence();

    let hash = "a".repeat(64);
    assert!(!store.content_hash_exists(&hash).await.unwrap());

    store
        .upsert(&evidence("paper-4711", profile.id, Some(&hash)))
        .await
        .unwrap();
    assert!(store.content_hash_exists(&hash).await.unwrap());

    let mut updated = evidence("paper-4711", profile.id, None);
    updated.risk_score = 90;
    store.upsert(&updated).await.unwrap();
    assert_eq!(store.count_for_region(profile.id).await.unwrap(), 1);

    let (risk, stored_hash): (i32, Option<String>) = sqlx::query_as(
        "SELECT risk_score, content_hash FROM evidence_docs WHERE external_id = 'paper-4711'",
    )
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(risk, 90);
    // A later upsert without a binary keeps the known hash.
    assert_eq!(stored_hash.as_deref(), Some(hash.as_str()));
}

#[tokio::test]
async fn evidence_for_unknown_region_is_rejected() {
    let (pool, _container) = setup_test_db().await;
    let store = PgEvidenceStore::new(pool);

    let err = store
        .upsert(&evidence("paper-1", Uuid::new_v4(), None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DatabaseError(_)));
}

#[tokio::test]
async fn audit_log_is_hash_chained() {
    let (pool, _container) = setup_test_db().await;
    let audit = PgAuditLog::new(pool);

    for i in 0..3 {
        audit
            .record(&AuditEvent {
                action: "pii_redaction".to_string(),
                resource: "evidence_docs/paper-4711".to_string(),
                actor_id: Some("worker-1".to_string()),
                details: serde_json::json!({"redaction_count": i}),
            })
            .await
            .unwrap();
    }

    let rows = audit
        .for_resource("evidence_docs/paper-4711")
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].prev_hash, "0".repeat(64));
    assert_eq!(rows[1].prev_hash, rows[0].curr_hash);
    assert_eq!(rows[2].prev_hash, rows[1].curr_hash);
    assert!(rows.iter().all(|r| r.curr_hash.len() == 64));
    assert_ne!(rows[0].curr_hash, rows[1].curr_hash);

    assert_eq!(audit.verify_chain().await.unwrap(), None);
}

#[tokio::test]
async fn audit_log_is_append_only() {
    let (pool, _container) = setup_test_db().await;
    let audit = PgAuditLog::new(pool.clone());

    audit
        .record(&AuditEvent {
            action: "pii_redaction".to_string(),
            resource: "evidence_docs/paper-1".to_string(),
            actor_id: None,
            details: serde_json::json!({}),
        })
        .await
        .unwrap();

    let update = sqlx::query("UPDATE audit_logs SET action = 'tampered'")
        .execute(&pool)
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM audit_logs").execute(&pool).await;
    assert!(delete.is_err());
}

#[tokio::test]
async fn parcel_engine_follows_installed_function() {
    let (pool, _container) = setup_test_db().await;

    let missing = PgParcelEngine::detect(&pool).await.unwrap();
    assert!(!missing.is_available());
    let err = missing.compute_virtual_parcel(50.1, 8.6).await.unwrap_err();
    assert!(matches!(err, AppError::ConfigError(_)));

    sqlx::query(
        r#"
        CREATE FUNCTION calculate_virtual_parcel(lat double precision, lon double precision)
        RETURNS jsonb LANGUAGE sql IMMUTABLE
        AS $$ SELECT jsonb_build_object('lat', lat, 'lon', lon, 'area_m2', 1200) $$
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let engine = Database::from_pool(pool).parcel_engine().await.unwrap();
    assert!(engine.is_available());
    let parcel = engine.compute_virtual_parcel(50.1, 8.6).await.unwrap();
    assert_eq!(parcel["area_m2"], 1200);
    assert_eq!(parcel["lat"], 50.1);
}
