use super::*;
use crate::constants::{PATCH_KEY, VERSION_KEY};
use crate::core::UpdateError;
use crate::notify::NotificationAction;
use crate::signal::SignalChannel;
use crate::test_utils::{FakeCatalog, InstallFixture, RecordingNotifier, RecordingSignal};
use crate::updater::version::marker_path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const PATCH_FILES: &[(&str, &str)] = &[
    ("version.nrocinunerrad", "2.0\n"),
    ("bin/daemon_plus", "daemon 2.0"),
];

struct Harness {
    install: InstallFixture,
    catalog: Arc<FakeCatalog>,
    notifier: Arc<RecordingNotifier>,
    signal: Arc<RecordingSignal>,
    coordinator: Arc<UpdateCoordinator>,
}

impl Harness {
    fn new(installed: &str, published: &str) -> Self {
        Self::with_install(InstallFixture::with_version(installed), published)
    }

    fn with_install(install: InstallFixture, published: &str) -> Self {
        let catalog = Arc::new(FakeCatalog::published(published, PATCH_FILES));
        let notifier = Arc::new(RecordingNotifier::default());
        let signal = Arc::new(RecordingSignal::watching(marker_path(install.path())));
        let coordinator = Arc::new(
            UpdateCoordinator::new(
                catalog.clone(),
                signal.clone(),
                notifier.clone(),
                install.path(),
            )
            .with_grace_delay(Duration::ZERO)
            .with_product_name("Touch+ software"),
        );
        Self {
            install,
            catalog,
            notifier,
            signal,
            coordinator,
        }
    }

    fn enabled(self) -> Self {
        self.coordinator.set_enabled(true);
        self
    }

    async fn wait_for(&self, what: &str, predicate: impl Fn(&UpdateState) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !predicate(&self.coordinator.state()) {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn prompts(&self) -> usize {
        self.notifier
            .notifications()
            .iter()
            .filter(|n| n.action == Some(NotificationAction::ConfirmUpdate))
            .count()
    }
}

#[tokio::test]
async fn test_check_is_ignored_while_patching() {
    let h = Harness::new("1.0", "2.0");
    h.catalog.hold_download();

    let patch = {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move { coordinator.patch("2.0").await })
    };
    h.wait_for("download", UpdateState::is_patching).await;

    let notifications = h.notifier.notifications().len();
    let calls = h.catalog.calls();
    let state = h.coordinator.state();

    for manual in [true, false] {
        let outcome = h.coordinator.check_for_update(manual).await;
        assert!(matches!(outcome, CheckOutcome::Skipped(SkipReason::Patching)));
    }

    assert_eq!(h.notifier.notifications().len(), notifications);
    assert_eq!(h.catalog.calls(), calls);
    assert_eq!(h.coordinator.state(), state);
    assert!(!h.coordinator.status().manual_invoke);

    h.catalog.release_download();
    let outcome = patch.await.unwrap().unwrap();
    assert!(outcome.is_installed());
}

#[tokio::test]
async fn test_second_check_is_dropped_while_checking() {
    let h = Harness::new("1.0", "1.0").enabled();
    h.catalog.hold_list();

    let first = {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move { coordinator.check_for_update(false).await })
    };
    h.wait_for("check", UpdateState::is_checking).await;
    while h.catalog.list_calls() == 0 {
        tokio::task::yield_now().await;
    }

    for manual in [true, false] {
        let outcome = h.coordinator.check_for_update(manual).await;
        assert!(matches!(outcome, CheckOutcome::Skipped(SkipReason::AlreadyChecking)));
        assert_eq!(h.coordinator.state(), UpdateState::Checking { pending: None });
    }
    assert_eq!(h.catalog.list_calls(), 1);
    // The dropped manual request still announced itself.
    assert_eq!(h.notifier.count_titled("Checking for updates"), 1);

    h.catalog.release_list();
    let outcome = first.await.unwrap();
    assert!(matches!(outcome, CheckOutcome::UpToDate { .. }));
    assert_eq!(h.coordinator.state(), UpdateState::Idle);
    assert_eq!(h.catalog.list_calls(), 1);
}

#[tokio::test]
async fn test_manual_check_patches_without_confirmation() {
    let h = Harness::new("1.0", "2.0");

    let outcome = h.coordinator.check_for_update(true).await;

    match outcome {
        CheckOutcome::Patched(PatchOutcome::Installed { version, files }) => {
            assert_eq!(version, "2.0");
            assert_eq!(files, 2);
        }
        other => panic!("expected an installed patch, got {other:?}"),
    }
    assert_eq!(h.prompts(), 0);
    assert_eq!(
        h.notifier.titles(),
        vec![
            "Checking for updates",
            "Downloading update",
            "Installing update",
            "Update finished",
        ]
    );
    assert_eq!(h.notifier.notifications()[3].body, "Current version: 2.0");
    assert_eq!(h.install.installed_version().as_deref(), Some("2.0"));
    assert_eq!(h.install.read("bin/daemon_plus").as_deref(), Some("daemon 2.0"));
}

#[tokio::test]
async fn test_manual_check_up_to_date() {
    let h = Harness::new("1.0", "1.0");

    let outcome = h.coordinator.check_for_update(true).await;

    assert!(matches!(outcome, CheckOutcome::UpToDate { ref version } if version == "1.0"));
    assert_eq!(h.notifier.count_titled("is up to date"), 1);
    let notice = &h.notifier.notifications()[1];
    assert_eq!(notice.title, "Touch+ software is up to date");
    assert_eq!(notice.body, "Current version: 1.0");

    let status = h.coordinator.status();
    assert!(!status.manual_invoke);
    assert!(!status.state.is_checking());
    assert_eq!(h.catalog.download_calls(), 0);
}

#[tokio::test]
async fn test_automatic_check_up_to_date_is_silent() {
    let h = Harness::new("1.0", "1.0").enabled();

    let outcome = h.coordinator.check_for_update(false).await;

    assert!(matches!(outcome, CheckOutcome::UpToDate { .. }));
    assert!(h.notifier.is_empty());
}

#[tokio::test]
async fn test_automatic_check_prompts_and_waits_for_confirmation() {
    let h = Harness::new("1.0", "2.0").enabled();

    let outcome = h.coordinator.check_for_update(false).await;

    assert!(matches!(
        outcome,
        CheckOutcome::AwaitingConfirmation { ref target_version } if target_version == "2.0"
    ));
    assert_eq!(h.prompts(), 1);
    assert_eq!(h.notifier.notifications().len(), 1);
    assert_eq!(
        h.notifier.titles()[0],
        "A new version of Touch+ software is available"
    );
    assert_eq!(h.catalog.download_calls(), 0);
    assert_eq!(h.install.installed_version().as_deref(), Some("1.0"));
    assert_eq!(
        h.coordinator.state(),
        UpdateState::AwaitingConfirmation {
            target_version: "2.0".to_string()
        }
    );

    let outcome = h.coordinator.confirm_update().await.unwrap();
    assert!(outcome.is_installed());
    assert_eq!(h.catalog.download_calls(), 1);
    assert_eq!(h.install.installed_version().as_deref(), Some("2.0"));
}

#[tokio::test]
async fn test_duplicate_confirmation_has_no_effect() {
    let h = Harness::new("1.0", "2.0").enabled();
    h.coordinator.check_for_update(false).await;
    h.catalog.hold_download();

    let first = {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move { coordinator.confirm_update().await })
    };
    h.wait_for("download", UpdateState::is_patching).await;

    let notifications = h.notifier.notifications().len();
    assert_eq!(
        h.coordinator.confirm_update().await.unwrap_err(),
        Rejection::AlreadyPatching
    );
    assert_eq!(h.notifier.notifications().len(), notifications);

    h.catalog.release_download();
    assert!(first.await.unwrap().unwrap().is_installed());

    // Once the cycle is over there is nothing left to confirm.
    assert_eq!(
        h.coordinator.confirm_update().await.unwrap_err(),
        Rejection::NothingToConfirm
    );
    assert_eq!(h.catalog.download_calls(), 1);
    assert_eq!(h.signal.sent().len(), 1);
}

#[tokio::test]
async fn test_new_check_replaces_pending_prompt() {
    let h = Harness::new("1.0", "2.0").enabled();
    h.coordinator.check_for_update(false).await;

    h.catalog.put(VERSION_KEY, b"3.0".to_vec());
    let outcome = h.coordinator.check_for_update(false).await;

    assert!(matches!(
        outcome,
        CheckOutcome::AwaitingConfirmation { ref target_version } if target_version == "3.0"
    ));
    assert_eq!(h.prompts(), 2);
    assert_eq!(h.coordinator.state().target_version(), Some("3.0"));
}

#[tokio::test]
async fn test_failed_recheck_keeps_pending_prompt() {
    let h = Harness::new("1.0", "2.0").enabled();
    h.coordinator.check_for_update(false).await;
    h.catalog.fail_list(true);

    let outcome = h.coordinator.check_for_update(false).await;
    assert!(matches!(outcome, CheckOutcome::Failed(UpdateError::CatalogList(_))));
    assert_eq!(
        h.coordinator.state(),
        UpdateState::AwaitingConfirmation {
            target_version: "2.0".to_string()
        }
    );

    let outcome = h.coordinator.confirm_update().await.unwrap();
    assert!(outcome.is_installed());
    assert_eq!(h.install.installed_version().as_deref(), Some("2.0"));
    assert_eq!(h.prompts(), 1);
}

#[tokio::test]
async fn test_recheck_without_descriptor_keeps_pending_prompt() {
    let h = Harness::new("1.0", "2.0").enabled();
    h.coordinator.check_for_update(false).await;
    h.catalog.remove(VERSION_KEY);

    let outcome = h.coordinator.check_for_update(false).await;

    assert!(matches!(outcome, CheckOutcome::NoDescriptor));
    assert_eq!(h.coordinator.state().target_version(), Some("2.0"));
    assert!(h.coordinator.confirm_update().await.unwrap().is_installed());
}

#[tokio::test]
async fn test_confirm_while_recheck_in_flight() {
    let h = Harness::new("1.0", "2.0").enabled();
    h.coordinator.check_for_update(false).await;
    h.catalog.hold_list();

    let recheck = {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move { coordinator.check_for_update(false).await })
    };
    h.wait_for("check", UpdateState::is_checking).await;

    let outcome = h.coordinator.confirm_update().await.unwrap();
    assert!(outcome.is_installed());

    h.catalog.release_list();
    assert!(matches!(
        recheck.await.unwrap(),
        CheckOutcome::Skipped(SkipReason::Patching)
    ));
    assert_eq!(h.coordinator.state(), UpdateState::Idle);
    assert_eq!(h.catalog.download_calls(), 1);
    assert_eq!(h.prompts(), 1);
    assert_eq!(h.install.installed_version().as_deref(), Some("2.0"));
}

#[tokio::test]
async fn test_download_failure_after_manual_check() {
    let h = Harness::new("1.0", "2.0");
    h.catalog.fail_download(true);

    let outcome = h.coordinator.check_for_update(true).await;

    match outcome {
        CheckOutcome::Patched(PatchOutcome::DownloadFailed(error)) => {
            assert!(matches!(error, UpdateError::CatalogDownload { .. }));
            assert!(error.is_network());
        }
        other => panic!("expected a download failure, got {other:?}"),
    }
    assert!(outcome_is_idle(&h));
    assert_eq!(h.notifier.count_titled("Update failed"), 1);
    assert!(!h.coordinator.status().manual_invoke);
    assert_eq!(h.install.installed_version().as_deref(), Some("1.0"));
    assert!(h.signal.sent().is_empty());
    assert_eq!(h.install.entries(), vec!["version.nrocinunerrad"]);
}

fn outcome_is_idle(h: &Harness) -> bool {
    h.coordinator.state() == UpdateState::Idle
}

#[tokio::test]
async fn test_download_failure_after_confirmation_is_silent() {
    let h = Harness::new("1.0", "2.0").enabled();
    h.coordinator.check_for_update(false).await;
    h.catalog.fail_download(true);

    let outcome = h.coordinator.confirm_update().await.unwrap();

    assert!(matches!(outcome, PatchOutcome::DownloadFailed(_)));
    assert_eq!(h.notifier.count_titled("Update failed"), 0);
    assert!(outcome_is_idle(&h));
}

#[tokio::test]
async fn test_successful_cycle_signals_companion_before_extracting() {
    let h = Harness::new("1.0", "2.0");
    let archive = h.install.path().join("patch.zip");

    let outcome = h.coordinator.patch("2.0").await.unwrap();
    assert!(outcome.is_installed());

    let sent = h.signal.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target, "daemon_plus");
    assert_eq!(sent[0].signal, "exit");
    assert_eq!(sent[0].payload, "");
    assert_eq!(sent[0].snapshot.as_deref(), Some("1.0\n"));

    assert_eq!(h.install.installed_version().as_deref(), Some("2.0"));
    assert!(!archive.exists());
    assert!(!h.coordinator.shutdown_blocker().is_blocked());
    assert!(outcome_is_idle(&h));
    assert!(!h.coordinator.status().manual_invoke);
}

struct GuardRecorder {
    blocker: ShutdownBlocker,
    blocked_at_send: Mutex<Option<bool>>,
}

impl SignalChannel for GuardRecorder {
    fn send(&self, _target: &str, _signal: &str, _payload: &str) {
        *self.blocked_at_send.lock().unwrap() = Some(self.blocker.is_blocked());
    }
}

#[tokio::test]
async fn test_exit_is_blocked_during_install_and_grace_delay_observed() {
    let install = InstallFixture::with_version("1.0");
    let blocker = ShutdownBlocker::new();
    let recorder = Arc::new(GuardRecorder {
        blocker: blocker.clone(),
        blocked_at_send: Mutex::new(None),
    });
    let coordinator = UpdateCoordinator::new(
        Arc::new(FakeCatalog::published("2.0", PATCH_FILES)),
        recorder.clone(),
        Arc::new(RecordingNotifier::default()),
        install.path(),
    )
    .with_shutdown_blocker(blocker.clone())
    .with_companion("menu_plus")
    .with_grace_delay(Duration::from_millis(50));

    let started = Instant::now();
    assert!(coordinator.patch("2.0").await.unwrap().is_installed());

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(*recorder.blocked_at_send.lock().unwrap(), Some(true));
    assert!(!blocker.is_blocked());
}

#[tokio::test]
async fn test_disabled_automatic_checks_never_touch_catalog() {
    let h = Harness::new("1.0", "2.0");

    for _ in 0..3 {
        let outcome = h.coordinator.check_for_update(false).await;
        assert!(matches!(outcome, CheckOutcome::Skipped(SkipReason::Disabled)));
    }

    assert_eq!(h.catalog.calls(), 0);
    assert!(h.notifier.is_empty());
    assert!(outcome_is_idle(&h));
}

#[tokio::test]
async fn test_manual_check_runs_while_disabled() {
    let h = Harness::new("1.0", "1.0");
    assert!(!h.coordinator.is_enabled());

    let outcome = h.coordinator.check_for_update(true).await;
    assert!(matches!(outcome, CheckOutcome::UpToDate { .. }));
    assert_eq!(h.catalog.list_calls(), 1);
}

#[tokio::test]
async fn test_list_failure_manual_and_automatic() {
    let h = Harness::new("1.0", "2.0").enabled();
    h.catalog.fail_list(true);

    let outcome = h.coordinator.check_for_update(false).await;
    assert!(matches!(outcome, CheckOutcome::Failed(UpdateError::CatalogList(_))));
    assert!(h.notifier.is_empty());
    assert!(outcome_is_idle(&h));

    let outcome = h.coordinator.check_for_update(true).await;
    assert!(matches!(outcome, CheckOutcome::Failed(UpdateError::CatalogList(_))));
    assert_eq!(
        h.notifier.titles(),
        vec!["Checking for updates", "Update failed"]
    );
    assert_eq!(
        h.notifier.notifications()[1].body,
        "please check your internet connection"
    );
    assert!(h.coordinator.status().manual_invoke);
    assert!(outcome_is_idle(&h));

    // The raised flag makes the next automatic check behave as the manual
    // request it stands in for.
    h.catalog.fail_list(false);
    let outcome = h.coordinator.check_for_update(false).await;
    assert!(matches!(
        outcome,
        CheckOutcome::Patched(PatchOutcome::Installed { ref version, .. }) if version == "2.0"
    ));
    assert_eq!(h.prompts(), 0);
    assert!(!h.coordinator.status().manual_invoke);
}

#[tokio::test]
async fn test_read_failure_manual() {
    let h = Harness::new("1.0", "2.0");
    h.catalog.fail_read(true);

    let outcome = h.coordinator.check_for_update(true).await;

    assert!(matches!(outcome, CheckOutcome::Failed(UpdateError::CatalogRead { .. })));
    assert_eq!(h.notifier.count_titled("Update failed"), 1);
    assert!(h.coordinator.status().manual_invoke);
    assert_eq!(h.catalog.download_calls(), 0);
}

#[tokio::test]
async fn test_missing_descriptor_is_quiet() {
    let h = Harness::new("1.0", "2.0");
    h.catalog.remove(VERSION_KEY);

    let outcome = h.coordinator.check_for_update(true).await;

    assert!(matches!(outcome, CheckOutcome::NoDescriptor));
    assert_eq!(h.notifier.titles(), vec!["Checking for updates"]);
    assert_eq!(h.catalog.read_calls(), 0);
    assert!(outcome_is_idle(&h));
    // No terminal outcome was reported, so the manual flag stays raised.
    assert!(h.coordinator.status().manual_invoke);
}

#[tokio::test]
async fn test_missing_marker_fails_check() {
    let h = Harness::with_install(InstallFixture::without_marker(), "2.0");

    let outcome = h.coordinator.check_for_update(true).await;

    assert!(matches!(outcome, CheckOutcome::Failed(UpdateError::VersionMarker { .. })));
    assert_eq!(h.notifier.count_titled("Update failed"), 1);
    assert_eq!(h.catalog.download_calls(), 0);
    assert!(outcome_is_idle(&h));
}

#[tokio::test]
async fn test_descriptor_line_ending_ignored() {
    let h = Harness::new("1.0", "1.0\r\n");

    let outcome = h.coordinator.check_for_update(true).await;
    assert!(matches!(outcome, CheckOutcome::UpToDate { .. }));
}

#[tokio::test]
async fn test_extraction_failure_recovers() {
    let h = Harness::new("1.0", "2.0");
    h.catalog.put(PATCH_KEY, b"not a zip archive".to_vec());

    let outcome = h.coordinator.check_for_update(true).await;

    match &outcome {
        CheckOutcome::Patched(PatchOutcome::InstallFailed(error)) => {
            assert!(matches!(error, UpdateError::Extraction { .. }));
            assert!(error.is_install_phase());
        }
        other => panic!("expected an install failure, got {other:?}"),
    }
    assert!(outcome.is_failure());
    assert!(outcome_is_idle(&h));
    assert!(!h.coordinator.shutdown_blocker().is_blocked());
    assert!(!h.coordinator.status().manual_invoke);
    assert_eq!(h.notifier.titles().last().map(String::as_str), Some("Update failed"));
    assert_eq!(h.signal.sent().len(), 1);
    assert!(!h.install.path().join("patch.zip").exists());
    assert_eq!(h.install.installed_version().as_deref(), Some("1.0"));

    // The coordinator is usable again.
    h.catalog.put(PATCH_KEY, crate::test_utils::zip_bytes(PATCH_FILES));
    assert!(h.coordinator.patch("2.0").await.unwrap().is_installed());
}

#[tokio::test]
async fn test_patch_rejected_while_checking() {
    let h = Harness::new("1.0", "2.0");
    h.catalog.hold_list();

    let check = {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move { coordinator.check_for_update(true).await })
    };
    h.wait_for("check", UpdateState::is_checking).await;

    assert_eq!(
        h.coordinator.patch("2.0").await.unwrap_err(),
        Rejection::AlreadyChecking
    );
    assert_eq!(
        h.coordinator.confirm_update().await.unwrap_err(),
        Rejection::NothingToConfirm
    );

    h.catalog.release_list();
    assert!(matches!(
        check.await.unwrap(),
        CheckOutcome::Patched(PatchOutcome::Installed { .. })
    ));
    assert_eq!(h.catalog.download_calls(), 1);
}

#[tokio::test]
async fn test_progress_reported_and_cleared() {
    let h = Harness::new("1.0", "2.0");

    h.coordinator.patch("2.0").await.unwrap();

    let events = h.notifier.progress_events();
    assert!(!events.is_empty());
    let (loaded, total) = *events.last().unwrap();
    assert_eq!(Some(loaded), total);
    assert_eq!(h.notifier.clears(), 1);
}

#[tokio::test]
async fn test_set_enabled_and_status() {
    let h = Harness::new("1.0", "1.0");

    let status = h.coordinator.status();
    assert_eq!(status.state, UpdateState::Idle);
    assert!(!status.enabled);
    assert_eq!(status.install_path, h.install.path());

    h.coordinator.set_enabled(true);
    assert!(h.coordinator.status().enabled);
    assert!(matches!(
        h.coordinator.check_for_update(false).await,
        CheckOutcome::UpToDate { .. }
    ));

    h.coordinator.set_enabled(false);
    assert!(matches!(
        h.coordinator.check_for_update(false).await,
        CheckOutcome::Skipped(SkipReason::Disabled)
    ));
}
