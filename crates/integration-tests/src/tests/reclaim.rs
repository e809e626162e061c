//! Reclaim passes against real directory trees.

use overlay_gc::{LivenessSet, Outcome, Reclaimer, SkipReason, run_pass};

use crate::fixture::{FaultyFs, StaticOracle, TestOverlay, UnavailableOracle};
use crate::integration_test;

const MB: u64 = 1024 * 1024;

integration_test!(test_mixed_live_orphan_and_unreadable, || {
    let overlay = TestOverlay::new()?;
    overlay.add_layer("A", 10)?;
    overlay.add_layer("B", 100 * MB)?;
    overlay.add_layer("C", 10)?;

    let mut fs = FaultyFs::new(overlay.open()?);
    fs.unreadable.insert("C".to_string());

    let report = run_pass(
        &StaticOracle::of(&["A"]),
        &fs,
        &overlay.config(),
        false,
    )?;

    assert_eq!(overlay.entries()?, vec!["A", "C", "l"]);

    let skipped: Vec<_> = report.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].identifier, "C");
    assert_eq!(
        skipped[0].outcome,
        Outcome::Skipped(SkipReason::PermissionDenied)
    );

    let log = std::fs::read_to_string(overlay.audit_log())?;
    assert_eq!(log, "B (100MB)\n");
    Ok(())
});

integration_test!(test_oracle_failure_makes_no_changes, || {
    let overlay = TestOverlay::new()?;
    overlay.add_layer("X", 10)?;
    overlay.add_layer("Y", 10)?;
    let before = overlay.entries()?;

    let fs = FaultyFs::new(overlay.open()?);
    let err = run_pass(&UnavailableOracle, &fs, &overlay.config(), false).unwrap_err();

    assert!(err.is_oracle_failure());
    assert_eq!(fs.removals(), 0);
    assert_eq!(overlay.entries()?, before);
    assert!(!overlay.audit_log().exists());
    Ok(())
});

integration_test!(test_empty_liveness_deletes_everything_unprotected, || {
    let overlay = TestOverlay::new()?;
    overlay.add_layer("X", 3 * MB)?;
    overlay.add_layer("Y", 0)?;

    let fs = overlay.open()?;
    let report = run_pass(
        &StaticOracle(LivenessSet::new()),
        &fs,
        &overlay.config(),
        false,
    )?;

    assert_eq!(report.deleted().count(), 2);
    assert_eq!(overlay.entries()?, vec!["l"]);
    let log = std::fs::read_to_string(overlay.audit_log())?;
    assert_eq!(log.lines().count(), 2);
    assert_eq!(log, "X (3MB)\nY (0B)\n");
    Ok(())
});

integration_test!(test_reclaim_is_idempotent, || {
    let overlay = TestOverlay::new()?;
    overlay.add_layer("live", 1)?;
    overlay.add_layer("live-init", 1)?;
    overlay.add_layer("stale", 1)?;
    let oracle = StaticOracle::of(&["live", "live-init"]);
    let fs = overlay.open()?;

    let first = run_pass(&oracle, &fs, &overlay.config(), false)?;
    assert_eq!(first.deleted().count(), 1);

    let second = run_pass(&oracle, &fs, &overlay.config(), false)?;
    assert_eq!(second.deleted().count(), 0);
    assert!(second.records.is_empty());
    assert_eq!(overlay.entries()?, vec!["l", "live", "live-init"]);
    Ok(())
});

integration_test!(test_live_directories_survive_every_snapshot, || {
    let ids = ["a", "b", "c", "d"];
    let snapshots: [&[&str]; 5] = [&[], &["a"], &["b", "d"], &["a", "b", "c"], &ids];

    for live in snapshots {
        let overlay = TestOverlay::new()?;
        for id in ids {
            overlay.add_layer(id, 1)?;
        }

        let fs = overlay.open()?;
        run_pass(&StaticOracle::of(live), &fs, &overlay.config(), false)?;

        let remaining = overlay.entries()?;
        for id in ids {
            let kept = remaining.iter().any(|e| e == id);
            assert_eq!(kept, live.contains(&id), "layer {} with live set {:?}", id, live);
        }
    }
    Ok(())
});

integration_test!(test_busy_directory_does_not_stop_pass, || {
    let overlay = TestOverlay::new()?;
    overlay.add_layer("busy", 5)?;
    overlay.add_layer("next", 5)?;

    let mut fs = FaultyFs::new(overlay.open()?);
    fs.busy.insert("busy".to_string());

    let report = Reclaimer::new(&fs, vec!["l".to_string()]).reclaim(&LivenessSet::new())?;

    assert_eq!(fs.removals(), 2);
    assert_eq!(report.failed().count(), 1);
    assert_eq!(report.deleted().count(), 1);
    assert_eq!(overlay.entries()?, vec!["busy", "l"]);
    Ok(())
});

integration_test!(test_link_directory_is_protected, || {
    let overlay = TestOverlay::new()?;
    std::os::unix::fs::symlink(
        "../layer/diff",
        overlay.root_path().join("l/ABCDEFGHIJKLMNOPQRSTUVWXYZ"),
    )?;

    let fs = overlay.open()?;
    let report = run_pass(
        &StaticOracle(LivenessSet::new()),
        &fs,
        &overlay.config(),
        false,
    )?;

    assert_eq!(report.protected, 1);
    assert!(report.records.is_empty());
    assert!(overlay.root_path().join("l/ABCDEFGHIJKLMNOPQRSTUVWXYZ").is_symlink());
    Ok(())
});

integration_test!(test_nested_trees_are_removed_whole, || {
    let overlay = TestOverlay::new()?;
    let layer = overlay.add_layer("deep", 1)?;
    std::fs::create_dir_all(layer.join("diff/usr/lib/x/y/z"))?;
    std::fs::write(layer.join("diff/usr/lib/x/y/z/file"), b"12345")?;
    let outside = overlay.root_path().with_file_name("outside");
    std::fs::write(&outside, b"keep me")?;
    std::os::unix::fs::symlink(&outside, layer.join("diff/usr/outside"))?;

    let fs = overlay.open()?;
    let report = Reclaimer::new(&fs, vec![]).reclaim(&LivenessSet::new())?;

    let deleted: Vec<_> = report.deleted().collect();
    let deleted_ids: Vec<&str> = deleted.iter().map(|r| r.identifier.as_str()).collect();
    assert!(deleted_ids.contains(&"deep"));
    assert!(!layer.exists());
    assert_eq!(std::fs::read(&outside)?, b"keep me");
    Ok(())
});
