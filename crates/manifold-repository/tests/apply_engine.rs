//! Apply engine integration tests.
//!
//! Exercise the batch and internal entry points against an in-memory store:
//! event-log round trips, per-transformer atomicity, lock enforcement and
//! replay.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use manifold_repository::*;
use manifold_state::*;

fn test_repo() -> Repository {
    Repository::new(StateStore::open_in_memory().unwrap())
}

fn auth() -> Authentication {
    Authentication::new("alice", "alice@example.com")
}

fn create_env(name: &str, upstream: Option<&str>, group: Option<&str>) -> Transformer {
    CreateEnvironment {
        environment: name.to_string(),
        config: EnvironmentConfig {
            upstream: upstream.map(|u| Upstream::Environment { name: u.to_string() }),
            argocd: None,
            environment_group: group.map(str::to_string),
        },
        authentication: auth(),
    }
    .into()
}

fn create_release(app: &str, version: u64, envs: &[&str]) -> Transformer {
    CreateApplicationVersion {
        application: app.to_string(),
        version,
        manifests: envs
            .iter()
            .map(|env| (env.to_string(), format!("{app} v{version} on {env}")))
            .collect(),
        team: None,
        source_commit_id: String::new(),
        source_author: String::new(),
        source_message: String::new(),
        source_repo_url: String::new(),
        display_version: String::new(),
        authentication: auth(),
    }
    .into()
}

fn deploy_with(env: &str, app: &str, version: u64, lock_behaviour: LockBehaviour) -> Transformer {
    DeployApplicationVersion {
        environment: env.to_string(),
        application: app.to_string(),
        version,
        lock_behaviour,
        source_train: None,
        author: None,
        authentication: auth(),
    }
    .into()
}

fn deploy(env: &str, app: &str, version: u64) -> Transformer {
    deploy_with(env, app, version, LockBehaviour::Fail)
}

fn env_lock(env: &str, lock_id: &str) -> Transformer {
    CreateEnvironmentLock {
        environment: env.to_string(),
        lock_id: lock_id.to_string(),
        message: "release freeze".to_string(),
        authentication: auth(),
    }
    .into()
}

fn delete_env_lock(env: &str, lock_id: &str) -> Transformer {
    DeleteEnvironmentLock {
        environment: env.to_string(),
        lock_id: lock_id.to_string(),
        authentication: auth(),
    }
    .into()
}

fn deployed_version(repo: &Repository, env: &str, app: &str) -> Option<u64> {
    repo.store()
        .begin_read()
        .unwrap()
        .deployment(env, app)
        .unwrap()
        .map(|d| d.version)
}

fn event_count(repo: &Repository) -> usize {
    repo.history(0).unwrap().len()
}

/// Every variant, in an order where each one succeeds.
fn every_variant() -> Vec<Transformer> {
    let environment = "dev".to_string();
    let lock_id = "l1".to_string();
    let message = "maintenance".to_string();

    vec![
        CreateEnvironment {
            environment: "dev".to_string(),
            config: EnvironmentConfig {
                upstream: Some(Upstream::Latest),
                argocd: Some(ArgoCdConfig {
                    destination: SyncDestination {
                        name: "in-cluster".to_string(),
                        server: "https://kubernetes.default.svc".to_string(),
                        namespace: Some("dev".to_string()),
                    },
                    sync_windows: vec![SyncWindow {
                        kind: SyncWindowKind::Deny,
                        schedule: "0 22 * * *".to_string(),
                        duration: "8h".to_string(),
                        applications: vec!["myapp".to_string()],
                    }],
                    application_annotations: BTreeMap::from([(
                        "notifications".to_string(),
                        "slack".to_string(),
                    )]),
                }),
                environment_group: Some("dev-group".to_string()),
            },
            authentication: auth(),
        }
        .into(),
        create_env("staging", Some("dev"), None),
        CreateApplicationVersion {
            application: "myapp".to_string(),
            version: 1,
            manifests: BTreeMap::from([
                ("dev".to_string(), "kind: Deployment # dev".to_string()),
                ("staging".to_string(), "kind: Deployment # staging".to_string()),
            ]),
            team: Some("payments".to_string()),
            source_commit_id: "cafe1234".to_string(),
            source_author: "bob@example.com".to_string(),
            source_message: "Add health endpoint".to_string(),
            source_repo_url: "https://git.example.com/myapp".to_string(),
            display_version: "1.0.0".to_string(),
            authentication: auth(),
        }
        .into(),
        DeployApplicationVersion {
            environment: "dev".to_string(),
            application: "myapp".to_string(),
            version: 1,
            lock_behaviour: LockBehaviour::Ignore,
            source_train: None,
            author: Some("bob@example.com".to_string()),
            authentication: auth(),
        }
        .into(),
        CreateEnvironmentLock {
            environment: environment.clone(),
            lock_id: lock_id.clone(),
            message: message.clone(),
            authentication: auth(),
        }
        .into(),
        DeleteEnvironmentLock {
            environment: environment.clone(),
            lock_id: lock_id.clone(),
            authentication: auth(),
        }
        .into(),
        CreateEnvironmentTeamLock {
            environment: environment.clone(),
            team: "payments".to_string(),
            lock_id: lock_id.clone(),
            message: message.clone(),
            authentication: auth(),
        }
        .into(),
        DeleteEnvironmentTeamLock {
            environment: environment.clone(),
            team: "payments".to_string(),
            lock_id: lock_id.clone(),
            authentication: auth(),
        }
        .into(),
        CreateEnvironmentGroupLock {
            environment_group: "dev-group".to_string(),
            lock_id: lock_id.clone(),
            message: message.clone(),
            authentication: auth(),
        }
        .into(),
        DeleteEnvironmentGroupLock {
            environment_group: "dev-group".to_string(),
            lock_id: lock_id.clone(),
            authentication: auth(),
        }
        .into(),
        CreateEnvironmentApplicationLock {
            environment: environment.clone(),
            application: "myapp".to_string(),
            lock_id: lock_id.clone(),
            message,
            authentication: auth(),
        }
        .into(),
        DeleteEnvironmentApplicationLock {
            environment,
            application: "myapp".to_string(),
            lock_id,
            authentication: auth(),
        }
        .into(),
        ReleaseTrain {
            target: "staging".to_string(),
            team: Some("payments".to_string()),
            authentication: auth(),
        }
        .into(),
        DeleteEnvFromApp {
            application: "myapp".to_string(),
            environment: "staging".to_string(),
            authentication: auth(),
        }
        .into(),
        CreateUndeployApplicationVersion {
            application: "myapp".to_string(),
            authentication: auth(),
        }
        .into(),
        UndeployApplication {
            application: "myapp".to_string(),
            authentication: auth(),
        }
        .into(),
    ]
}

// ── Round trip ────────────────────────────────────────────────────

#[test]
fn every_variant_round_trips_through_the_event_log() {
    let repo = test_repo();
    let mut seen = HashSet::new();

    for transformer in every_variant() {
        let mut writer = repo.store().begin_write().unwrap();
        let applied = repo
            .apply_transformers_internal(&mut writer, &transformer)
            .unwrap_or_else(|e| panic!("{:?} failed: {e}", transformer.event_type()));
        writer.commit().unwrap();

        let row = repo.latest_event().unwrap().unwrap();
        assert_eq!(row, applied.event);
        assert_eq!(row.event_type, transformer.event_type().as_str());
        assert_eq!(esl::decode_row(&row).unwrap(), transformer);
        seen.insert(transformer.event_type());
    }

    assert_eq!(seen.len(), EventType::ALL.len());
}

// ── Atomicity ─────────────────────────────────────────────────────

#[test]
fn failed_internal_apply_leaves_no_trace_in_the_transaction() {
    let repo = test_repo();
    repo.apply(vec![create_env("dev", None, None), create_release("myapp", 1, &["dev"])])
        .unwrap();

    let mut writer = repo.store().begin_write().unwrap();
    let err = repo
        .apply_transformers_internal(&mut writer, &deploy("dev", "myapp", 7))
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Validation(_)));
    // The caller's transaction is still usable and unchanged.
    assert_eq!(writer.latest_event().unwrap().unwrap().sequence, 2);
    assert!(writer.deployment("dev", "myapp").unwrap().is_none());
    writer.commit().unwrap();

    assert_eq!(event_count(&repo), 2);
}

#[test]
fn batch_stops_at_the_failing_transformer() {
    let repo = test_repo();
    let err = repo
        .apply(vec![
            create_env("dev", None, None),
            create_release("myapp", 1, &["dev"]),
            deploy("prod", "myapp", 1),
            deploy("dev", "myapp", 1),
        ])
        .unwrap_err();

    match &err {
        RepositoryError::Transformer {
            index, event_type, ..
        } => {
            assert_eq!(*index, 2);
            assert_eq!(*event_type, EventType::DeployApplicationVersion);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(err.root(), RepositoryError::Validation(_)));
    // Earlier transformers stay committed, later ones never ran.
    assert_eq!(event_count(&repo), 2);
    assert_eq!(deployed_version(&repo, "dev", "myapp"), None);
}

#[test]
fn deadline_aborts_before_the_next_transformer() {
    let repo = test_repo();
    let err = repo
        .apply_until(Some(Instant::now()), vec![create_env("dev", None, None)])
        .unwrap_err();
    assert!(matches!(err, RepositoryError::DeadlineExceeded { applied: 0 }));
    assert!(err.is_retryable());
    assert_eq!(event_count(&repo), 0);
}

#[test]
fn sequences_have_no_gaps() {
    let repo = test_repo();
    repo.apply(vec![
        create_env("dev", None, None),
        create_release("myapp", 1, &["dev"]),
    ])
    .unwrap();
    // A failure in between consumes no sequence number.
    repo.apply(vec![create_release("myapp", 1, &["dev"])]).unwrap_err();
    repo.apply(vec![deploy("dev", "myapp", 1), env_lock("dev", "l1")])
        .unwrap();

    let sequences: Vec<u64> = repo.history(0).unwrap().iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
    let tail: Vec<u64> = repo.history(2).unwrap().iter().map(|r| r.sequence).collect();
    assert_eq!(tail, vec![3, 4]);
}

// ── Locks ─────────────────────────────────────────────────────────

#[test]
fn environment_lock_blocks_deploy_until_deleted() {
    let repo = test_repo();
    repo.apply(vec![
        create_env("dev", None, None),
        create_release("myapp", 1, &["dev"]),
        create_release("myapp", 2, &["dev"]),
        deploy("dev", "myapp", 1),
        env_lock("dev", "L1"),
    ])
    .unwrap();
    let before = event_count(&repo);

    let err = repo.apply(vec![deploy("dev", "myapp", 2)]).unwrap_err();
    match err.root() {
        RepositoryError::Locked { locks } => {
            assert_eq!(locks.len(), 1);
            assert_eq!(locks[0].lock.lock_id, "L1");
            assert_eq!(locks[0].lock.message, "release freeze");
        }
        other => panic!("expected Locked, got {other}"),
    }
    assert_eq!(deployed_version(&repo, "dev", "myapp"), Some(1));
    assert_eq!(event_count(&repo), before);

    repo.apply(vec![delete_env_lock("dev", "L1"), deploy("dev", "myapp", 2)])
        .unwrap();
    assert_eq!(deployed_version(&repo, "dev", "myapp"), Some(2));
    let reader = repo.store().begin_read().unwrap();
    assert_eq!(reader.manifest("dev", "myapp").unwrap().as_deref(), Some("myapp v2 on dev"));
}

#[test]
fn every_scope_contributes_blocking_locks() {
    let repo = test_repo();
    repo.apply(vec![
        create_env("de-1", None, Some("prod")),
        CreateApplicationVersion {
            application: "myapp".to_string(),
            version: 1,
            manifests: BTreeMap::from([("de-1".to_string(), "m".to_string())]),
            team: Some("payments".to_string()),
            source_commit_id: String::new(),
            source_author: String::new(),
            source_message: String::new(),
            source_repo_url: String::new(),
            display_version: String::new(),
            authentication: auth(),
        }
        .into(),
        CreateEnvironmentGroupLock {
            environment_group: "prod".to_string(),
            lock_id: "g".to_string(),
            message: String::new(),
            authentication: auth(),
        }
        .into(),
        env_lock("de-1", "e"),
        CreateEnvironmentTeamLock {
            environment: "de-1".to_string(),
            team: "payments".to_string(),
            lock_id: "t".to_string(),
            message: String::new(),
            authentication: auth(),
        }
        .into(),
        CreateEnvironmentApplicationLock {
            environment: "de-1".to_string(),
            application: "myapp".to_string(),
            lock_id: "a".to_string(),
            message: String::new(),
            authentication: auth(),
        }
        .into(),
    ])
    .unwrap();

    let err = repo.apply(vec![deploy("de-1", "myapp", 1)]).unwrap_err();
    let RepositoryError::Locked { locks } = err.root() else {
        panic!("expected Locked, got {err}");
    };
    let ids: Vec<&str> = locks.iter().map(|l| l.lock.lock_id.as_str()).collect();
    assert_eq!(ids, vec!["g", "e", "t", "a"]);
}

#[test]
fn lock_deletion_is_idempotent() {
    let repo = test_repo();
    repo.apply(vec![create_env("dev", None, None), env_lock("dev", "L1")])
        .unwrap();

    let applied = repo
        .apply(vec![delete_env_lock("dev", "L1"), delete_env_lock("dev", "L1")])
        .unwrap();
    assert_eq!(applied[0].changes.len(), 1);
    assert!(applied[1].changes.is_empty());

    let scope = LockScope::Environment {
        environment: "dev".to_string(),
    };
    assert!(repo.store().begin_read().unwrap().locks(&scope).unwrap().is_empty());
}

#[test]
fn lock_ids_may_contain_slashes() {
    let repo = test_repo();
    repo.apply(vec![
        create_env("dev", None, None),
        create_env("dev-2", None, None),
        create_release("myapp", 1, &["dev", "dev-2"]),
        env_lock("dev", "release/2024-10"),
    ])
    .unwrap();

    match repo.apply(vec![deploy("dev", "myapp", 1)]).unwrap_err().root() {
        RepositoryError::Locked { locks } => {
            assert_eq!(locks.len(), 1);
            assert_eq!(locks[0].lock.lock_id, "release/2024-10");
        }
        other => panic!("expected locked, got {other}"),
    }
    // The lock stays on its own environment.
    repo.apply(vec![deploy("dev-2", "myapp", 1)]).unwrap();

    let applied = repo
        .apply(vec![delete_env_lock("dev", "release/2024-10"), deploy("dev", "myapp", 1)])
        .unwrap();
    assert_eq!(applied[0].changes.len(), 1);
    assert_eq!(deployed_version(&repo, "dev", "myapp"), Some(1));
}

#[test]
fn recreating_a_lock_overwrites_its_message() {
    let repo = test_repo();
    repo.apply(vec![create_env("dev", None, None), env_lock("dev", "L1")])
        .unwrap();
    repo.apply(vec![
        CreateEnvironmentLock {
            environment: "dev".to_string(),
            lock_id: "L1".to_string(),
            message: "extended freeze".to_string(),
            authentication: Authentication::new("bob", "bob@example.com"),
        }
        .into(),
    ])
    .unwrap();

    let scope = LockScope::Environment {
        environment: "dev".to_string(),
    };
    let locks = repo.store().begin_read().unwrap().locks(&scope).unwrap();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].message, "extended freeze");
    assert_eq!(locks[0].created_by.name, "bob");
}

#[test]
fn record_behaviour_queues_then_deploy_clears_queue() {
    let repo = test_repo();
    repo.apply(vec![
        create_env("dev", None, None),
        create_release("myapp", 1, &["dev"]),
        env_lock("dev", "L1"),
    ])
    .unwrap();

    let applied = repo
        .apply(vec![deploy_with("dev", "myapp", 1, LockBehaviour::Record)])
        .unwrap();
    assert!(matches!(applied[0].changes[0], StateChange::Queued { version: 1, .. }));
    let reader = repo.store().begin_read().unwrap();
    assert!(reader.queued("dev", "myapp").unwrap().is_some());
    assert!(reader.deployment("dev", "myapp").unwrap().is_none());
    drop(reader);

    repo.apply(vec![delete_env_lock("dev", "L1"), deploy("dev", "myapp", 1)])
        .unwrap();
    let reader = repo.store().begin_read().unwrap();
    assert!(reader.queued("dev", "myapp").unwrap().is_none());
    assert_eq!(reader.deployment("dev", "myapp").unwrap().unwrap().version, 1);
}

#[test]
fn ignore_behaviour_bypasses_locks() {
    let repo = test_repo();
    repo.apply(vec![
        create_env("dev", None, None),
        create_release("myapp", 1, &["dev"]),
        env_lock("dev", "L1"),
        deploy_with("dev", "myapp", 1, LockBehaviour::Ignore),
    ])
    .unwrap();
    assert_eq!(deployed_version(&repo, "dev", "myapp"), Some(1));
}

// ── Validation ────────────────────────────────────────────────────

fn validation_error(repo: &Repository, transformer: Transformer) -> String {
    match repo.apply(vec![transformer]).unwrap_err().root() {
        RepositoryError::Validation(msg) => msg.clone(),
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn preconditions_are_enforced() {
    let repo = test_repo();
    repo.apply(vec![
        create_env("dev", None, Some("dev-group")),
        create_release("myapp", 1, &["dev"]),
    ])
    .unwrap();

    assert!(validation_error(&repo, create_env("qa", Some("qa"), None)).contains("own upstream"));
    assert!(validation_error(&repo, create_env("QA", None, None)).contains("invalid environment name"));
    assert!(validation_error(&repo, create_release("myapp", 0, &["dev"])).contains("greater than 0"));
    assert!(validation_error(&repo, create_release("myapp", 1, &["dev"])).contains("already exists"));
    assert!(validation_error(&repo, create_release("other", 1, &["prod"])).contains("unknown environment"));
    assert!(validation_error(&repo, env_lock("prod", "L1")).contains("unknown environment"));
    assert!(validation_error(&repo, env_lock("dev", "")).contains("must not be empty"));
    assert!(
        validation_error(
            &repo,
            CreateEnvironmentGroupLock {
                environment_group: "nobody".to_string(),
                lock_id: "L1".to_string(),
                message: String::new(),
                authentication: auth(),
            }
            .into()
        )
        .contains("has no environments")
    );
    assert!(validation_error(&repo, deploy("dev", "myapp", 2)).contains("does not exist"));
    assert_eq!(event_count(&repo), 2);
}

#[test]
fn recreating_an_environment_updates_its_config() {
    let repo = test_repo();
    repo.apply(vec![
        create_env("dev", None, None),
        create_env("staging", None, None),
        create_env("staging", Some("dev"), Some("pre")),
    ])
    .unwrap();
    let env = repo.store().begin_read().unwrap().environment("staging").unwrap().unwrap();
    assert_eq!(env.config.environment_group.as_deref(), Some("pre"));
    assert_eq!(
        env.config.upstream,
        Some(Upstream::Environment {
            name: "dev".to_string()
        })
    );
}

// ── Removal ───────────────────────────────────────────────────────

#[test]
fn delete_env_from_app_is_idempotent() {
    let repo = test_repo();
    repo.apply(vec![
        create_env("dev", None, None),
        create_env("staging", None, None),
        create_release("myapp", 1, &["dev", "staging"]),
        deploy("dev", "myapp", 1),
        deploy("staging", "myapp", 1),
    ])
    .unwrap();

    let remove = || -> Transformer {
        DeleteEnvFromApp {
            application: "myapp".to_string(),
            environment: "staging".to_string(),
            authentication: auth(),
        }
        .into()
    };
    let applied = repo.apply(vec![remove(), remove()]).unwrap();
    assert_eq!(applied[0].changes.len(), 1);
    assert!(applied[1].changes.is_empty());

    let reader = repo.store().begin_read().unwrap();
    assert!(reader.manifest("staging", "myapp").unwrap().is_none());
    assert!(reader.manifest("dev", "myapp").unwrap().is_some());
    let release = reader.release("myapp", 1).unwrap().unwrap();
    assert!(!release.manifests.contains_key("staging"));
}

#[test]
fn undeploy_lifecycle() {
    let repo = test_repo();
    repo.apply(vec![
        create_env("dev", None, None),
        create_env("staging", None, None),
        create_release("myapp", 1, &["dev", "staging"]),
        deploy("dev", "myapp", 1),
        deploy("staging", "myapp", 1),
        CreateEnvironmentApplicationLock {
            environment: "staging".to_string(),
            application: "myapp".to_string(),
            lock_id: "hold".to_string(),
            message: String::new(),
            authentication: auth(),
        }
        .into(),
    ])
    .unwrap();

    let undeploy = || -> Transformer {
        UndeployApplication {
            application: "myapp".to_string(),
            authentication: auth(),
        }
        .into()
    };

    // No undeploy version yet; the lock on staging reports first.
    assert!(matches!(
        repo.apply(vec![undeploy()]).unwrap_err().root(),
        RepositoryError::Locked { .. }
    ));

    let applied = repo
        .apply(vec![
            CreateUndeployApplicationVersion {
                application: "myapp".to_string(),
                authentication: auth(),
            }
            .into(),
        ])
        .unwrap();
    assert!(applied[0].description.contains("locked: staging"));
    assert_eq!(deployed_version(&repo, "dev", "myapp"), Some(2));
    assert_eq!(deployed_version(&repo, "staging", "myapp"), Some(1));

    repo.apply(vec![
        DeleteEnvironmentApplicationLock {
            environment: "staging".to_string(),
            application: "myapp".to_string(),
            lock_id: "hold".to_string(),
            authentication: auth(),
        }
        .into(),
    ])
    .unwrap();
    // staging still runs v1.
    assert!(validation_error(&repo, undeploy()).contains("still runs v1 on staging"));

    repo.apply(vec![deploy("staging", "myapp", 2), undeploy()]).unwrap();
    let reader = repo.store().begin_read().unwrap();
    assert!(reader.application("myapp").unwrap().is_none());
    assert!(reader.releases("myapp").unwrap().is_empty());
    assert!(reader.deployments_of("myapp").unwrap().is_empty());
}

#[test]
fn undeploy_version_after_the_last_version_is_rejected() {
    let repo = test_repo();
    repo.apply(vec![
        create_env("dev", None, None),
        create_release("myapp", u64::MAX, &["dev"]),
    ])
    .unwrap();

    let message = validation_error(
        &repo,
        CreateUndeployApplicationVersion {
            application: "myapp".to_string(),
            authentication: auth(),
        }
        .into(),
    );
    assert!(message.contains("no version left"));

    let reader = repo.store().begin_read().unwrap();
    let versions: Vec<_> = reader.releases("myapp").unwrap().iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![u64::MAX]);
    assert_eq!(event_count(&repo), 2);
}

// ── Replay ────────────────────────────────────────────────────────

#[test]
fn replay_reproduces_state() {
    let source = test_repo();
    source
        .apply(vec![
            create_env("dev", None, None),
            create_env("staging", Some("dev"), None),
            create_release("myapp", 1, &["dev", "staging"]),
            create_release("other", 1, &["dev", "staging"]),
            deploy("dev", "myapp", 1),
            deploy("dev", "other", 1),
            CreateEnvironmentApplicationLock {
                environment: "staging".to_string(),
                application: "other".to_string(),
                lock_id: "hold".to_string(),
                message: String::new(),
                authentication: auth(),
            }
            .into(),
            ReleaseTrain {
                target: "staging".to_string(),
                team: None,
                authentication: auth(),
            }
            .into(),
        ])
        .unwrap();

    let history = source.history(0).unwrap();
    let target = test_repo();
    let applied = target.replay(&history).unwrap();
    assert_eq!(applied, history.len() - 1);

    let summary = |repo: &Repository| {
        let reader = repo.store().begin_read().unwrap();
        reader
            .environments()
            .unwrap()
            .into_iter()
            .flat_map(|env| reader.deployments_on(&env.name).unwrap())
            .map(|d| (d.environment, d.application, d.version, d.manifest, d.source_train))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&source), summary(&target));
    assert_eq!(deployed_version(&target, "staging", "myapp"), Some(1));
    assert_eq!(deployed_version(&target, "staging", "other"), None);
}

#[test]
fn replay_rejects_unknown_events() {
    let repo = test_repo();
    let rows = vec![EslEventRow {
        sequence: 1,
        event_type: "RenameEnvironment".to_string(),
        event_json: "{}".to_string(),
        timestamp: 0,
    }];
    let err = repo.replay(&rows).unwrap_err();
    assert!(matches!(err, RepositoryError::Decode(EslError::UnknownEventType(_))));
    assert_eq!(event_count(&repo), 0);
}
