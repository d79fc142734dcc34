//! ---
//! rsl_section: "15-testing-qa-runbook"
//! rsl_subsection: "integration-tests"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "End-to-end lifecycle scenarios against fake collaborators."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use chrono::NaiveDate;
use rsl_common::{AppConfig, Platform};
use rsl_core::{
    ComputeManager, DeployRequest, ErrorKind, HealthState, LifecycleError, ProvisionStage, Quota,
    ScriptedConfirmer, StageAction, StaticConfirmer, StorageManager, TeardownOptions,
    VolumeDisposition,
};
use rsl_inventory::{InventoryBackend, JournalOutcome, StationFilter, StationRecord, StationStatus};
use rsl_testharness::{Fixture, FIXTURE_POOL_BYTES};

fn quota(text: &str) -> Quota {
    text.parse().unwrap()
}

fn request(id: u32, name: &str, suffix: u32) -> DeployRequest {
    DeployRequest::new(name, Platform::Azuracast, quota("100G"))
        .with_id(id)
        .with_address_suffix(suffix)
}

fn seed(fixture: &Fixture, id: u32) {
    let record = StationRecord::new(
        id,
        Platform::Libretime,
        &format!("seed{id}"),
        format!("10.0.{}.{}", id / 256, id % 256),
        "",
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
    )
    .unwrap();
    fixture.inventory.upsert(&record).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn deploy_registers_active_station_at_derived_address() {
    let fixture = Fixture::new().unwrap();
    let req = DeployRequest::new("main", Platform::Azuracast, quota("500G"))
        .with_id(340)
        .with_address_suffix(140);

    let report = fixture.orchestrator.deploy(req).await.unwrap();

    assert_eq!(report.record.id, 340);
    assert_eq!(report.record.hostname, "azuracast-main");
    assert_eq!(report.record.address, "192.168.2.140");
    assert_eq!(report.record.status, StationStatus::Active);
    assert!(report.warnings.is_empty());
    assert_eq!(
        report.stages.last().map(|outcome| outcome.stage),
        Some(ProvisionStage::Registered)
    );

    assert_eq!(fixture.inventory.get(340).unwrap(), report.record);
    let volume = fixture.storage.volume("tank/radio/azuracast-main").unwrap();
    assert_eq!(volume.spec.quota.bytes(), 500 << 30);
    assert_eq!(volume.spec.compression, "lz4");
    let unit = fixture.compute.unit(340).unwrap();
    assert_eq!(unit.state, HealthState::Running);
    assert_eq!(unit.bootstraps, 1);
    assert_eq!(unit.mounts.len(), 1);
    let spec = unit.spec.unwrap();
    assert_eq!(spec.swap_mb, spec.memory_mb / 4);
    assert!(fixture.azuracast.is_installed(340));
    assert!(fixture.libretime.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn deploy_without_id_takes_first_free_id() {
    let fixture = Fixture::new().unwrap();
    seed(&fixture, 100);
    fixture.compute.add_unmanaged(101);

    let req = DeployRequest::new("night", Platform::Libretime, quota("50G"));
    let report = fixture.orchestrator.deploy(req).await.unwrap();

    assert_eq!(report.record.id, 102);
    assert_eq!(report.record.address, "192.168.2.102");
    assert_eq!(report.record.hostname, "libretime-night");
    assert!(fixture.libretime.is_installed(102));
}

#[tokio::test(flavor = "multi_thread")]
async fn allocation_skips_store_and_live_ids() {
    let fixture = Fixture::new().unwrap();
    for id in [100, 101, 102] {
        seed(&fixture, id);
    }
    fixture.compute.add_unmanaged(103);

    let id = fixture
        .orchestrator
        .allocator()
        .find_available_id(100, 105)
        .await
        .unwrap();
    assert_eq!(id, 104);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_range_is_reported() {
    let mut config = AppConfig::default();
    config.allocation.range_start = 300;
    config.allocation.range_end = 301;
    let fixture = Fixture::with_config(config).unwrap();
    seed(&fixture, 300);
    seed(&fixture, 301);

    let err = fixture.orchestrator.next_id().await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::RangeExhausted {
            start: 300,
            end: 301
        }
    ));

    let err = fixture
        .orchestrator
        .deploy(DeployRequest::new("late", Platform::Azuracast, quota("10G")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RangeExhausted);
    assert!(fixture.compute.ids().is_empty());
    let journal = fixture.journal.entries().unwrap();
    assert!(journal.iter().all(|entry| entry.station_id != 0));
}

#[tokio::test(flavor = "multi_thread")]
async fn icecast_is_rejected_before_any_external_call() {
    let fixture = Fixture::new().unwrap();
    let req = DeployRequest::new("relay", Platform::Icecast, quota("10G")).with_id(200);

    let err = fixture.orchestrator.deploy(req).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(fixture.compute.calls().is_empty());
    assert_eq!(fixture.inventory.count(StationFilter::All).unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_name_fails_validation() {
    let fixture = Fixture::new().unwrap();
    let err = fixture
        .orchestrator
        .deploy(request(200, "Main Studio", 20))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(fixture.compute.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn claimed_id_address_and_hostname_conflict() {
    let fixture = Fixture::new().unwrap();
    fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap();

    let same_id = fixture
        .orchestrator
        .deploy(request(340, "other", 141))
        .await
        .unwrap_err();
    assert_eq!(same_id.kind(), ErrorKind::Conflict);

    let same_address = fixture
        .orchestrator
        .deploy(request(341, "other", 140))
        .await
        .unwrap_err();
    assert_eq!(same_address.kind(), ErrorKind::Conflict);
    assert!(same_address.to_string().contains("192.168.2.140"));

    let same_hostname = fixture
        .orchestrator
        .deploy(request(342, "main", 142))
        .await
        .unwrap_err();
    assert_eq!(same_hostname.kind(), ErrorKind::Conflict);

    assert_eq!(fixture.compute.ids(), vec![340]);
    assert_eq!(fixture.inventory.count(StationFilter::All).unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn live_unit_without_record_conflicts() {
    let fixture = Fixture::new().unwrap();
    fixture.compute.add_unmanaged(250);

    let err = fixture
        .orchestrator
        .deploy(request(250, "ghost", 50))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(fixture.storage.volume("tank/radio/azuracast-ghost").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn pool_problems_are_resource_errors() {
    let fixture = Fixture::new().unwrap();
    let too_big = DeployRequest::new("huge", Platform::Azuracast, Quota::from_bytes(FIXTURE_POOL_BYTES + 1))
        .with_id(200)
        .with_address_suffix(20);
    let err = fixture.orchestrator.deploy(too_big).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resource);

    fixture.storage.set_healthy(false);
    let err = fixture
        .orchestrator
        .deploy(request(201, "small", 21))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert!(fixture.compute.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_stage_leaves_artifacts_and_resume_converges() {
    let fixture = Fixture::new().unwrap();
    fixture.azuracast.failures.fail("install", 340);

    let err = fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap_err();
    match &err {
        LifecycleError::ExternalTool { stage, .. } => assert_eq!(stage, "platform_installed"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(fixture.inventory.find(340).unwrap().is_none());
    assert!(fixture.compute.unit(340).is_some());
    assert!(fixture.storage.volume("tank/radio/azuracast-main").is_some());

    let failed = fixture.journal.entries_for(340, 1).unwrap();
    assert_eq!(failed[0].outcome, JournalOutcome::Failed);
    assert_eq!(failed[0].stage.as_deref(), Some("platform_installed"));

    let plain_retry = fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap_err();
    assert_eq!(plain_retry.kind(), ErrorKind::Conflict);

    fixture.azuracast.failures.heal("install", 340);
    let report = fixture
        .orchestrator
        .deploy(request(340, "main", 140).resuming())
        .await
        .unwrap();

    assert_eq!(report.record.status, StationStatus::Active);
    assert_eq!(fixture.compute.call_count("create", 340), 1);
    assert_eq!(fixture.compute.call_count("start", 340), 1);
    let skipped: Vec<ProvisionStage> = report
        .stages
        .iter()
        .filter(|outcome| outcome.action == StageAction::Skipped)
        .map(|outcome| outcome.stage)
        .collect();
    assert_eq!(
        skipped,
        vec![
            ProvisionStage::StorageProvisioned,
            ProvisionStage::ComputeProvisioned,
            ProvisionStage::ComputeRunning,
        ]
    );
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(fixture.inventory.count(StationFilter::All).unwrap(), 1);
    assert_eq!(fixture.compute.unit(340).unwrap().mounts.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_rejects_a_changed_address() {
    let fixture = Fixture::new().unwrap();
    let deployed = fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap();

    let err = fixture
        .orchestrator
        .deploy(request(340, "main", 141).resuming())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let record = fixture.inventory.find(340).unwrap().unwrap();
    assert_eq!(record.address, deployed.record.address);
    let unit = fixture.compute.unit(340).unwrap().spec.unwrap();
    assert_eq!(unit.address, record.address);
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_of_partial_deploy_checks_the_live_address() {
    let fixture = Fixture::new().unwrap();
    fixture.azuracast.failures.fail("install", 340);
    fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap_err();
    fixture.azuracast.failures.heal("install", 340);

    let err = fixture
        .orchestrator
        .deploy(request(340, "main", 141).resuming())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("192.168.2.140"));
    assert!(fixture.inventory.find(340).unwrap().is_none());
    assert_eq!(fixture.compute.call_count("create", 340), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_boot_is_a_warning_not_a_failure() {
    let fixture = Fixture::new().unwrap();
    fixture.compute.never_boot(340);

    let report = fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("did not report running"));
    assert_eq!(report.record.status, StationStatus::Active);
}

#[tokio::test(flavor = "multi_thread")]
async fn teardown_keeps_volume_by_default() {
    let fixture = Fixture::new().unwrap();
    fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap();
    let pool = fixture.config.storage.pool.clone();
    let free_before = fixture.storage.pool_free_capacity(&pool).await.unwrap();

    let confirmer = ScriptedConfirmer::new([true]);
    let report = fixture
        .orchestrator
        .teardown(340, TeardownOptions::default(), &confirmer)
        .await
        .unwrap();

    assert!(report.compute_destroyed);
    assert!(matches!(report.volume, VolumeDisposition::Preserved { .. }));
    assert!(fixture.inventory.find(340).unwrap().is_none());
    assert!(!fixture.compute.exists(340).await.unwrap());
    assert_eq!(
        fixture.storage.pool_free_capacity(&pool).await.unwrap(),
        free_before
    );
    let prompts = confirmer.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("azuracast-main"));
    assert!(prompts[0].contains("192.168.2.140"));
    assert_eq!(fixture.compute.call_count("stop", 340), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn purge_asks_twice_and_frees_the_pool() {
    let fixture = Fixture::new().unwrap();
    fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap();
    let pool = fixture.config.storage.pool.clone();

    let confirmer = ScriptedConfirmer::new([true, true]);
    let options = TeardownOptions {
        purge_data: true,
        force: false,
    };
    let report = fixture
        .orchestrator
        .teardown(340, options, &confirmer)
        .await
        .unwrap();

    assert_eq!(
        report.volume,
        VolumeDisposition::Destroyed {
            dataset: "tank/radio/azuracast-main".to_owned()
        }
    );
    assert_eq!(confirmer.prompts().len(), 2);
    assert_eq!(
        fixture.storage.pool_free_capacity(&pool).await.unwrap(),
        FIXTURE_POOL_BYTES
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn declined_purge_keeps_volume_but_still_deregisters() {
    let fixture = Fixture::new().unwrap();
    fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap();

    let confirmer = ScriptedConfirmer::new([true, false]);
    let options = TeardownOptions {
        purge_data: true,
        force: false,
    };
    let report = fixture
        .orchestrator
        .teardown(340, options, &confirmer)
        .await
        .unwrap();

    assert!(matches!(report.volume, VolumeDisposition::Preserved { .. }));
    assert!(fixture.storage.volume("tank/radio/azuracast-main").is_some());
    assert!(fixture.inventory.find(340).unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn declined_teardown_changes_nothing() {
    let fixture = Fixture::new().unwrap();
    fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap();
    let before = std::fs::read(&fixture.config.inventory.path).unwrap();

    let err = fixture
        .orchestrator
        .teardown(340, TeardownOptions::default(), &StaticConfirmer(false))
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::ConfirmationDeclined));
    assert_eq!(std::fs::read(&fixture.config.inventory.path).unwrap(), before);
    assert!(fixture.compute.exists(340).await.unwrap());
    assert_eq!(fixture.compute.call_count("stop", 340), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn teardown_of_unknown_station_is_not_found() {
    let fixture = Fixture::new().unwrap();
    let err = fixture
        .orchestrator
        .teardown(999, TeardownOptions::default(), &StaticConfirmer(true))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test(flavor = "multi_thread")]
async fn status_follows_health_except_in_maintenance() {
    let fixture = Fixture::new().unwrap();
    fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap();

    fixture.compute.set_state(340, HealthState::Stopped);
    let report = fixture.orchestrator.status(340).await.unwrap();
    assert!(report.changed());
    assert_eq!(report.current, StationStatus::Stopped);
    assert_eq!(
        fixture.inventory.get(340).unwrap().status,
        StationStatus::Stopped
    );

    fixture
        .orchestrator
        .set_status(340, StationStatus::Maintenance)
        .unwrap();
    fixture.compute.set_state(340, HealthState::Running);
    let report = fixture.orchestrator.status(340).await.unwrap();
    assert!(!report.changed());
    assert_eq!(report.current, StationStatus::Maintenance);

    fixture
        .orchestrator
        .set_status(340, StationStatus::Active)
        .unwrap();
    fixture.compute.vanish(340);
    let report = fixture.orchestrator.status(340).await.unwrap();
    assert_eq!(report.health, HealthState::Unknown);
    assert_eq!(report.current, StationStatus::Error);
}

#[tokio::test(flavor = "multi_thread")]
async fn info_includes_paths_and_recent_journal() {
    let fixture = Fixture::new().unwrap();
    fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap();

    let info = fixture.orchestrator.info(340, 3).await.unwrap();
    assert_eq!(info.dataset_path, "tank/radio/azuracast-main");
    assert_eq!(info.health, HealthState::Running);
    assert_eq!(info.journal.len(), 3);
    assert_eq!(
        info.journal.last().and_then(|entry| entry.stage.as_deref()),
        Some("registered")
    );

    let logs = fixture.orchestrator.logs(340, 5).await.unwrap();
    assert_eq!(logs.lines().count(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn full_backup_reports_each_step() {
    let fixture = Fixture::new().unwrap();
    fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap();
    fixture
        .storage
        .failures
        .fail("snapshot", "tank/radio/azuracast-main");

    let report = fixture
        .orchestrator
        .backup(340, "full".parse().unwrap())
        .await
        .unwrap();

    assert_eq!(report.steps.len(), 3);
    assert!(!report.is_complete());
    assert_eq!(report.failed_steps().count(), 1);
    assert!(report.failure_summary().contains("injected failure"));
    assert_eq!(fixture.compute.unit(340).unwrap().backups, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn back_to_back_full_backups_get_distinct_snapshots() {
    let fixture = Fixture::new().unwrap();
    fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap();

    for _ in 0..3 {
        let report = fixture
            .orchestrator
            .backup(340, "full".parse().unwrap())
            .await
            .unwrap();
        assert!(report.is_complete(), "{}", report.failure_summary());
    }

    let snapshots = fixture
        .storage
        .volume("tank/radio/azuracast-main")
        .unwrap()
        .snapshots;
    assert_eq!(snapshots.len(), 3);
    assert!(snapshots.iter().all(|name| name.starts_with("backup-")));
}

#[tokio::test(flavor = "multi_thread")]
async fn restore_requires_existing_snapshot() {
    let fixture = Fixture::new().unwrap();
    fixture
        .orchestrator
        .deploy(request(340, "main", 140))
        .await
        .unwrap();

    let err = fixture
        .orchestrator
        .restore(340, "nightly", true, &StaticConfirmer(true))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(fixture.compute.call_count("stop", 340), 0);

    fixture
        .storage
        .add_snapshot("tank/radio/azuracast-main", "nightly");
    fixture
        .storage
        .add_snapshot("tank/radio/azuracast-main", "later");
    fixture
        .orchestrator
        .restore(340, "nightly", false, &StaticConfirmer(true))
        .await
        .unwrap();

    let volume = fixture.storage.volume("tank/radio/azuracast-main").unwrap();
    assert_eq!(volume.rolled_back_to.as_deref(), Some("nightly"));
    assert_eq!(volume.snapshots, vec!["nightly".to_owned()]);
    assert_eq!(fixture.compute.call_count("stop", 340), 1);
    assert_eq!(fixture.compute.unit(340).unwrap().state, HealthState::Running);
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_and_reconcile_find_orphans() {
    let fixture = Fixture::new().unwrap();
    for (id, name) in [(101, "one"), (102, "two"), (103, "three"), (104, "four")] {
        fixture
            .orchestrator
            .deploy(request(id, name, id - 100 + 10))
            .await
            .unwrap();
    }
    fixture.compute.vanish(102);
    fixture.compute.vanish(104);

    let report = fixture.orchestrator.validate_inventory().await.unwrap();
    assert_eq!(report.records_checked, 4);
    assert_eq!(report.orphans().collect::<Vec<_>>(), vec![102, 104]);

    let removed = fixture.orchestrator.reconcile_inventory().await.unwrap();
    let removed_ids: Vec<u32> = removed.iter().map(|record| record.id).collect();
    assert_eq!(removed_ids, vec![102, 104]);

    let remaining: Vec<u32> = fixture
        .orchestrator
        .list(StationFilter::All)
        .unwrap()
        .iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(remaining, vec![101, 103]);
    assert!(fixture.orchestrator.validate_inventory().await.unwrap().is_clean());
}

#[tokio::test(flavor = "multi_thread")]
async fn compute_lookup_failure_aborts_reconcile() {
    let fixture = Fixture::new().unwrap();
    fixture
        .orchestrator
        .deploy(request(101, "one", 11))
        .await
        .unwrap();
    fixture.compute.failures.fail("exists", 101);

    let err = fixture.orchestrator.reconcile_inventory().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalTool);
    assert_eq!(fixture.inventory.count(StationFilter::All).unwrap(), 1);
}
