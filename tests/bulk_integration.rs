//! ---
//! rsl_section: "15-testing-qa-runbook"
//! rsl_subsection: "integration-tests"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Bulk operation scenarios against fake collaborators."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use rsl_common::{AppConfig, Platform};
use rsl_core::{
    new_registry, AssumeYes, BackupMode, BulkExecutor, BulkOperation, Confirmer, DeployRequest,
    ErrorKind, HealthState, LifecycleError, LifecycleMetrics, ScriptedConfirmer, StaticConfirmer,
};
use rsl_inventory::{InventoryBackend, StationFilter, StationStatus};
use rsl_testharness::Fixture;

async fn deploy_fleet(fixture: &Fixture, ids: &[u32]) {
    for &id in ids {
        let platform = if id % 2 == 0 {
            Platform::Azuracast
        } else {
            Platform::Libretime
        };
        let req = DeployRequest::new(format!("station{id}"), platform, "20G".parse().unwrap())
            .with_id(id)
            .with_address_suffix(id - 100);
        fixture.orchestrator.deploy(req).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failures_are_isolated_and_attributed() {
    let fixture = Fixture::new().unwrap();
    let ids = [101, 102, 103, 104, 105, 106];
    deploy_fleet(&fixture, &ids).await;
    fixture.azuracast.failures.fail("update", 102);
    fixture.libretime.failures.fail("update", 105);

    let executor = BulkExecutor::new(fixture.orchestrator.clone(), 3);
    let report = executor
        .run(StationFilter::All, BulkOperation::Update, &StaticConfirmer(false))
        .await
        .unwrap();

    assert_eq!(report.total(), ids.len());
    assert_eq!(report.succeeded, 4);
    assert_eq!(report.failed, 2);
    assert_eq!(report.failed_ids(), vec![102, 105]);
    let order: Vec<u32> = report.outcomes.iter().map(|outcome| outcome.id).collect();
    assert_eq!(order, ids.to_vec());
    for outcome in report.outcomes.iter().filter(|outcome| !outcome.succeeded) {
        assert_eq!(outcome.error_kind, Some(ErrorKind::ExternalTool));
        assert!(outcome.message.contains("injected failure"));
    }
    for id in [101, 103, 104, 106] {
        let installer = if id % 2 == 0 {
            &fixture.azuracast
        } else {
            &fixture.libretime
        };
        assert_eq!(installer.call_count("update", id), 1);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn platform_filter_limits_targets() {
    let fixture = Fixture::new().unwrap();
    deploy_fleet(&fixture, &[101, 102, 103, 104]).await;

    let executor = BulkExecutor::from_config(fixture.orchestrator.clone());
    let report = executor
        .run(
            StationFilter::Platform(Platform::Libretime),
            BulkOperation::Backup {
                mode: BackupMode::Compute,
            },
            &StaticConfirmer(false),
        )
        .await
        .unwrap();

    let targeted: Vec<u32> = report.outcomes.iter().map(|outcome| outcome.id).collect();
    assert_eq!(targeted, vec![101, 103]);
    assert!(report.is_success());
    assert_eq!(fixture.compute.unit(102).unwrap().backups, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn incomplete_backup_counts_as_failure() {
    let fixture = Fixture::new().unwrap();
    deploy_fleet(&fixture, &[101, 102]).await;
    fixture.libretime.failures.fail("backup", 101);

    let executor = BulkExecutor::new(fixture.orchestrator.clone(), 2);
    let report = executor
        .run(
            StationFilter::All,
            BulkOperation::Backup {
                mode: BackupMode::Application,
            },
            &StaticConfirmer(false),
        )
        .await
        .unwrap();

    assert_eq!(report.failed_ids(), vec![101]);
    assert_eq!(report.succeeded, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn bulk_status_syncs_every_record() {
    let fixture = Fixture::new().unwrap();
    deploy_fleet(&fixture, &[101, 102, 103]).await;
    fixture.compute.set_state(102, HealthState::Stopped);
    fixture.compute.vanish(103);

    let executor = BulkExecutor::new(fixture.orchestrator.clone(), 2);
    let report = executor
        .run(StationFilter::All, BulkOperation::Status, &StaticConfirmer(false))
        .await
        .unwrap();

    assert!(report.is_success());
    let statuses: Vec<StationStatus> = fixture
        .inventory
        .list(StationFilter::All)
        .unwrap()
        .iter()
        .map(|record| record.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            StationStatus::Active,
            StationStatus::Stopped,
            StationStatus::Error
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn declined_purge_all_touches_nothing() {
    let fixture = Fixture::new().unwrap();
    deploy_fleet(&fixture, &[101, 102, 103]).await;
    let confirmer = ScriptedConfirmer::new([false]);

    let executor = BulkExecutor::from_config(fixture.orchestrator.clone());
    let err = executor
        .run(
            StationFilter::All,
            BulkOperation::Remove { purge_data: true },
            &confirmer,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::ConfirmationDeclined));
    assert_eq!(fixture.inventory.count(StationFilter::All).unwrap(), 3);
    assert_eq!(fixture.compute.ids(), vec![101, 102, 103]);
    let prompts = confirmer.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("PURGE"));
    assert!(prompts[0].contains("azuracast-station102"));
}

#[tokio::test(flavor = "multi_thread")]
async fn confirmed_purge_all_removes_everything() {
    let fixture = Fixture::new().unwrap();
    deploy_fleet(&fixture, &[101, 102, 103]).await;
    fixture.compute.vanish(102);

    let executor = BulkExecutor::new(fixture.orchestrator.clone(), 2);
    let report = executor
        .run(
            StationFilter::All,
            BulkOperation::Remove { purge_data: true },
            &ScriptedConfirmer::new([true]),
        )
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.operation, "purge");
    assert_eq!(fixture.inventory.count(StationFilter::All).unwrap(), 0);
    assert!(fixture.compute.ids().is_empty());
    assert!(fixture
        .storage
        .volume("tank/radio/libretime-station101")
        .is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn assume_yes_without_the_word_does_not_purge() {
    let fixture = Fixture::new().unwrap();
    deploy_fleet(&fixture, &[101, 102]).await;
    let executor = BulkExecutor::from_config(fixture.orchestrator.clone());
    let purge = BulkOperation::Remove { purge_data: true };

    let unattended: Vec<Box<dyn Confirmer>> = vec![
        Box::new(StaticConfirmer(true)),
        Box::new(AssumeYes::new(None)),
        Box::new(AssumeYes::new(Some("yes".to_owned()))),
    ];
    for confirmer in unattended {
        let err = executor
            .run(StationFilter::All, purge, confirmer.as_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::ConfirmationDeclined));
    }
    assert_eq!(fixture.inventory.count(StationFilter::All).unwrap(), 2);
    assert_eq!(fixture.compute.ids(), vec![101, 102]);
    assert!(fixture
        .storage
        .volume("tank/radio/libretime-station101")
        .is_some());

    let report = executor
        .run(
            StationFilter::All,
            purge,
            &AssumeYes::new(Some("PURGE".to_owned())),
        )
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(fixture.inventory.count(StationFilter::All).unwrap(), 0);
    assert!(fixture
        .storage
        .volume("tank/radio/libretime-station101")
        .is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_target_set_skips_confirmation() {
    let fixture = Fixture::new().unwrap();
    let confirmer = ScriptedConfirmer::new(Vec::new());

    let report = BulkExecutor::from_config(fixture.orchestrator.clone())
        .run(
            StationFilter::All,
            BulkOperation::Remove { purge_data: false },
            &confirmer,
        )
        .await
        .unwrap();

    assert_eq!(report.total(), 0);
    assert!(confirmer.prompts().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn metrics_count_bulk_outcomes() {
    let fixture = Fixture::with_config(AppConfig::default()).unwrap();
    let metrics = LifecycleMetrics::new(new_registry()).unwrap();
    let orchestrator = fixture.orchestrator.clone().with_metrics(metrics.clone());
    for id in [101, 102] {
        let req = DeployRequest::new(format!("station{id}"), Platform::Azuracast, "20G".parse().unwrap())
            .with_id(id)
            .with_address_suffix(id - 100);
        orchestrator.deploy(req).await.unwrap();
    }
    fixture.azuracast.failures.fail("update", 101);

    BulkExecutor::new(orchestrator, 1)
        .run(StationFilter::All, BulkOperation::Update, &StaticConfirmer(false))
        .await
        .unwrap();

    let text = metrics.render().unwrap();
    let line = |needle: &str| {
        text.lines()
            .find(|line| line.starts_with("rsl_bulk_station_outcomes_total") && line.contains(needle))
            .map(|line| line.to_owned())
    };
    assert!(line("outcome=\"success\"").unwrap().ends_with(" 1"));
    assert!(line("outcome=\"failure\"").unwrap().ends_with(" 1"));
    assert!(text.contains("rsl_deployments_total"));
}
