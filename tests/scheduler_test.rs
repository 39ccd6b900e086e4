//! Integration tests for planning and executing derivative builds.

mod common;

use assert_matches::assert_matches;
use common::{small_config, write_bytes, write_rgba_png, write_source};
use panoforge::config::{Config, PacketFormSetting, TierSpec};
use panoforge::manifest::ManifestBuilder;
use panoforge::scheduler::{
    DerivativeScheduler, FailureKind, MemorySink, OutputState, RunContext, RunEvent, SourceStatus,
};
use panoforge_jpeg::read_packet;
use std::sync::Arc;

#[test]
fn concrete_scenario_tiers_carry_their_own_width() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "A/b c.jpg", 4096, 2048);

    let config = Config {
        tiers: vec![
            TierSpec::new("4K", 4096, 2048, 90),
            TierSpec::new("2K", 2048, 1024, 85),
        ],
        ..Config::default()
    };
    let scheduler = DerivativeScheduler::new(dir.path(), &config);
    let report = scheduler.run(&RunContext::default()).unwrap();

    assert!(!report.has_failures(), "{:?}", report.failures);
    assert_eq!(report.count(SourceStatus::Success), 1);

    let out = dir.path().join("_BUILD");
    let four_k = read_packet(&out.join("4K/A-b-c.jpg")).unwrap().unwrap();
    let two_k = read_packet(&out.join("2K/A-b-c.jpg")).unwrap().unwrap();
    assert_eq!((four_k.full_width, four_k.full_height), (4096, 2048));
    assert_eq!((two_k.full_width, two_k.full_height), (2048, 1024));
    assert_eq!(two_k.cropped_width, 2048);
    assert_eq!(two_k.cropped_left, 0);
    assert!(two_k.use_panorama_viewer);

    let thumb = read_packet(&out.join("thumbnails/A-b-c.jpg")).unwrap().unwrap();
    assert_eq!((thumb.full_width, thumb.full_height), (512, 256));

    let record = &report.records[0];
    assert_eq!(record.relative_path, "A/b c.jpg");
    let paths: Vec<_> = record
        .derivatives
        .iter()
        .map(|d| d.output_path.as_str())
        .collect();
    assert_eq!(paths, ["_BUILD/4K/A-b-c.jpg", "_BUILD/2K/A-b-c.jpg"]);
    assert_eq!(
        record.thumbnail.as_ref().unwrap().path,
        "_BUILD/thumbnails/A-b-c.jpg"
    );
}

#[test]
fn second_run_is_a_no_op_with_identical_manifest() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "Trips/one.jpg", 256, 128);
    write_source(dir.path(), "Trips/two.png", 200, 100);
    write_source(dir.path(), "root.jpg", 128, 64);

    let config = small_config();
    let scheduler = DerivativeScheduler::new(dir.path(), &config);
    let builder = ManifestBuilder::new(&config);

    let first = scheduler.run(&RunContext::default()).unwrap();
    let first_manifest = serde_json::to_string_pretty(&builder.build(&first.records)).unwrap();
    assert_eq!(first.counters.derivatives_written, 6);
    assert_eq!(first.counters.thumbnails_written, 3);

    let sink = Arc::new(MemorySink::new());
    let ctx = RunContext::new(sink.clone());
    let work = scheduler.plan(&ctx).unwrap();
    assert!(work.is_empty());
    assert_eq!(work.pending(), 0);

    let second = scheduler.execute(work, &ctx);
    let second_manifest = serde_json::to_string_pretty(&builder.build(&second.records)).unwrap();
    assert_eq!(first_manifest, second_manifest);
    assert_eq!(second.counters.derivatives_written, 0);
    assert_eq!(second.counters.thumbnails_written, 0);
    assert_eq!(second.counters.derivatives_reused, 6);
    assert!(!sink.events().iter().any(|e| matches!(
        e,
        RunEvent::DerivativeWritten { .. } | RunEvent::ThumbnailWritten { .. }
    )));
}

#[test]
fn deleted_output_is_regenerated_alone() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "pano.jpg", 256, 128);

    let scheduler = DerivativeScheduler::new(dir.path(), &small_config());
    scheduler.run(&RunContext::default()).unwrap();

    std::fs::remove_file(dir.path().join("_BUILD/S/pano.jpg")).unwrap();
    let work = scheduler.plan(&RunContext::default()).unwrap();
    assert_eq!(work.pending(), 1);
    assert_matches!(work.sources[0].tiers[0].state, OutputState::Present { .. });
    assert_matches!(work.sources[0].tiers[1].state, OutputState::Missing);

    let report = scheduler.execute(work, &RunContext::default());
    assert_eq!(report.counters.derivatives_written, 1);
    assert_eq!(report.counters.derivatives_reused, 1);
    assert_eq!(report.records[0].derivatives.len(), 2);
}

#[test]
fn unreadable_source_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "good.jpg", 256, 128);
    write_bytes(dir.path(), "bad.jpg", b"\xFF\xD8 this is not really a jpeg");

    let scheduler = DerivativeScheduler::new(dir.path(), &small_config());
    let report = scheduler.run(&RunContext::default()).unwrap();

    assert_eq!(report.count(SourceStatus::Success), 1);
    assert_eq!(report.count(SourceStatus::DecodeFailure), 1);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].relative_path, "good.jpg");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::DecodeFailure);
    assert_eq!(report.failures[0].relative_path, "bad.jpg");
    assert!(!dir.path().join("_BUILD/S/bad.jpg").exists());
}

#[test]
fn skipped_directories_are_not_sources() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "Trips/keep.jpg", 128, 64);
    write_source(dir.path(), "Trips/cache/ignored.jpg", 128, 64);
    write_source(dir.path(), "tiles_diffused/ignored.jpg", 128, 64);

    let scheduler = DerivativeScheduler::new(dir.path(), &small_config());
    scheduler.run(&RunContext::default()).unwrap();

    // Outputs from the first run live under _BUILD and must not be picked up
    let work = scheduler.plan(&RunContext::default()).unwrap();
    let sources: Vec<_> = work
        .sources
        .iter()
        .map(|s| s.source.relative_path.as_str())
        .collect();
    assert_eq!(sources, ["Trips/keep.jpg"]);
}

#[test]
fn narrow_source_gets_only_a_thumbnail() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "small.jpg", 60, 30);

    let scheduler = DerivativeScheduler::new(dir.path(), &small_config());
    let report = scheduler.run(&RunContext::default()).unwrap();

    let record = &report.records[0];
    assert!(record.derivatives.is_empty());
    let thumb = record.thumbnail.as_ref().unwrap();
    assert_eq!((thumb.width, thumb.height), (60, 30));
    assert_eq!(report.count(SourceStatus::Success), 1);
}

#[test]
fn alpha_source_is_flattened() {
    let dir = tempfile::tempdir().unwrap();
    write_rgba_png(dir.path(), "glass.png", 128, 64);

    let scheduler = DerivativeScheduler::new(dir.path(), &small_config());
    let report = scheduler.run(&RunContext::default()).unwrap();
    assert!(!report.has_failures(), "{:?}", report.failures);
    assert_eq!(report.records[0].source.color_mode, "RGBA");

    let out = image::open(dir.path().join("_BUILD/M/glass.jpg")).unwrap();
    assert_eq!(out.color(), image::ColorType::Rgb8);
    assert_eq!((out.width(), out.height()), (128, 64));
}

#[test]
fn element_form_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "pano.jpg", 128, 64);

    let config = Config {
        packet_form: PacketFormSetting::Element,
        ..small_config()
    };
    let scheduler = DerivativeScheduler::new(dir.path(), &config);
    let report = scheduler.run(&RunContext::default()).unwrap();
    assert_eq!(report.count(SourceStatus::Success), 1);

    let bytes = std::fs::read(dir.path().join("_BUILD/M/pano.jpg")).unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("<GPano:FullPanoWidthPixels>128</GPano:FullPanoWidthPixels>"));
    let packet = read_packet(&dir.path().join("_BUILD/M/pano.jpg"))
        .unwrap()
        .unwrap();
    assert_eq!(packet.full_width, 128);
}

#[test]
fn worker_pool_matches_sequential_run() {
    let sequential = tempfile::tempdir().unwrap();
    let parallel = tempfile::tempdir().unwrap();
    for dir in [sequential.path(), parallel.path()] {
        for i in 0..6 {
            write_source(dir, &format!("Set{}/pano{}.jpg", i % 2, i), 256, 128);
        }
    }

    let config = small_config();
    let builder = ManifestBuilder::new(&config);

    let seq = DerivativeScheduler::new(sequential.path(), &config)
        .run(&RunContext::default())
        .unwrap();

    let par_config = Config {
        workers: 3,
        ..config.clone()
    };
    let par = DerivativeScheduler::new(parallel.path(), &par_config)
        .run(&RunContext::default())
        .unwrap();

    assert_eq!(par.counters.derivatives_written, 12);
    assert_eq!(
        serde_json::to_value(builder.build(&seq.records)).unwrap(),
        serde_json::to_value(builder.build(&par.records)).unwrap()
    );
    let order: Vec<_> = par.records.iter().map(|r| r.relative_path.as_str()).collect();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);
}

#[test]
fn crop_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "tall.jpg", 128, 128);

    let config = Config {
        crop_to_equirectangular: false,
        ..small_config()
    };
    let sink = Arc::new(MemorySink::new());
    let ctx = RunContext::new(sink.clone());
    let report = DerivativeScheduler::new(dir.path(), &config)
        .run(&ctx)
        .unwrap();

    assert_eq!(report.counters.crops, 0);
    let thumb = report.records[0].thumbnail.as_ref().unwrap();
    assert_eq!((thumb.width, thumb.height), (128, 128));
    let out = image::open(dir.path().join("_BUILD/M/tall.jpg")).unwrap();
    assert_eq!((out.width(), out.height()), (128, 64));
}
