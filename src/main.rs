mod cli;

use panoforge::{
    config,
    manifest::{write_manifest, ManifestBuilder},
    scheduler::{DerivativeScheduler, RunContext, RunReport, SourceStatus, WorkList},
};
use panoforge_jpeg::{codec, PacketForm, PanoramaPacket, SegmentIndex};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "panoforge=trace,panoforge_jpeg=trace,panoforge_common=debug".to_string()
        } else {
            "panoforge=info,panoforge_jpeg=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Build {
            root,
            output,
            compact,
            no_metadata,
            flat,
            dry_run,
            workers,
        } => {
            let options = BuildOptions {
                output,
                pretty: !compact,
                no_metadata,
                flat,
                dry_run,
                workers,
            };
            build(&root, cli.config.as_deref(), &options)
        }
        Commands::Plan { root, json } => plan(&root, cli.config.as_deref(), json),
        Commands::Tag {
            file,
            width,
            height,
            form,
        } => tag(&file, width, height, form.as_deref(), cli.config.as_deref()),
        Commands::Inspect { file, json } => inspect(&file, json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("panoforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

struct BuildOptions {
    output: Option<PathBuf>,
    pretty: bool,
    no_metadata: bool,
    flat: bool,
    dry_run: bool,
    workers: Option<usize>,
}

fn build(root: &Path, config_path: Option<&Path>, options: &BuildOptions) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(workers) = options.workers {
        config.workers = workers;
    }
    config::validate_config(&config)?;

    let scheduler = DerivativeScheduler::new(root, &config);
    let ctx = RunContext::default();
    let work = scheduler.plan(&ctx)?;

    if options.dry_run {
        print_plan(&work);
        println!("\n[DRY RUN] Would generate {} outputs", work.pending());
        return Ok(());
    }

    let report = scheduler.execute(work, &ctx);

    let manifest_path = options
        .output
        .clone()
        .unwrap_or_else(|| root.join(&config.manifest));
    let builder = ManifestBuilder::new(&config)
        .include_metadata(config.include_metadata && !options.no_metadata);
    if options.flat {
        write_manifest(&manifest_path, &builder.build_flat(&report.records), options.pretty)?;
    } else {
        write_manifest(&manifest_path, &builder.build(&report.records), options.pretty)?;
    }

    print_summary(&report);
    println!("Manifest: {}", manifest_path.display());
    Ok(())
}

fn plan(root: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let scheduler = DerivativeScheduler::new(root, &config);
    let work = scheduler.plan(&RunContext::default())?;

    if json {
        let sources: Vec<_> = work
            .pending_sources()
            .map(|s| {
                serde_json::json!({
                    "relativePath": s.source.relative_path,
                    "contentId": s.source.content_id,
                    "tiers": s.tiers.iter()
                        .filter(|t| t.state.is_missing())
                        .map(|t| t.tier.id.as_str())
                        .collect::<Vec<_>>(),
                    "thumbnail": s.thumbnail.state.is_missing(),
                })
            })
            .collect();
        let doc = serde_json::json!({
            "pending": work.pending(),
            "sources": sources,
            "excluded": work.excluded,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print_plan(&work);
    }
    Ok(())
}

fn print_plan(work: &WorkList) {
    println!(
        "Sources: {} ({} with missing outputs)",
        work.sources.len(),
        work.pending_sources().count()
    );
    for source in work.pending_sources() {
        let tiers: Vec<&str> = source
            .tiers
            .iter()
            .filter(|t| t.state.is_missing())
            .map(|t| t.tier.id.as_str())
            .collect();
        print!("  {} [{}]", source.source.relative_path, tiers.join(", "));
        if source.thumbnail.state.is_missing() {
            print!(" + thumbnail");
        }
        println!();
    }
    for failure in &work.excluded {
        println!("  ✗ {} ({}): {}", failure.relative_path, failure.kind, failure.message);
    }
}

fn print_summary(report: &RunReport) {
    let c = &report.counters;
    println!("\nProcessed {} sources", report.outcomes.len());
    println!(
        "  Written: {} derivatives, {} thumbnails",
        c.derivatives_written, c.thumbnails_written
    );
    println!("  Reused: {} derivatives", c.derivatives_reused);
    if c.crops > 0 {
        println!("  Cropped to 2:1: {}", c.crops);
    }
    println!(
        "  Status: {} ok, {} decode failures, {} partial, {} unverified",
        report.count(SourceStatus::Success),
        report.count(SourceStatus::DecodeFailure),
        report.count(SourceStatus::PartialTierFailure),
        report.count(SourceStatus::VerificationFailure),
    );

    if report.has_failures() {
        println!("\nFailures:");
        for failure in &report.failures {
            let target = failure.tier_id.as_deref().unwrap_or("source");
            println!(
                "  ✗ {} [{}] {}: {}",
                failure.relative_path, target, failure.kind, failure.message
            );
        }
    }
}

fn tag(
    file: &Path,
    width: Option<u32>,
    height: Option<u32>,
    form: Option<&str>,
    config_path: Option<&Path>,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let form = match form {
        Some(f) => f.parse::<PacketForm>()?,
        None => config::load_config_or_default(config_path)?.packet_form.into(),
    };

    let (width, height) = match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (w, h) => {
            let (iw, ih) = image::image_dimensions(file)
                .with_context(|| format!("Failed to read image size: {:?}", file))?;
            (w.unwrap_or(iw), h.unwrap_or(ih))
        }
    };

    let packet = PanoramaPacket::equirectangular(width, height);
    codec::embed_file(file, &packet.to_bytes(form))
        .with_context(|| format!("Failed to tag {:?}", file))?;
    codec::verify_file(file, &packet)?;

    println!("✓ Tagged {} ({}x{}, {} form)", file.display(), width, height, form);
    Ok(())
}

fn inspect(file: &Path, json: bool) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
    let index = SegmentIndex::parse(&data)?;
    let packets = codec::find_packets(&data)?;
    let decoded = match packets.as_slice() {
        [segment] => Some(PanoramaPacket::parse(codec::packet_bytes(segment, &data))),
        _ => None,
    };

    if json {
        let segments: Vec<_> = index
            .segments
            .iter()
            .map(|s| {
                serde_json::json!({
                    "marker": s.marker.to_string(),
                    "offset": s.offset,
                    "length": s.length,
                    "panoramaPacket": codec::is_packet_segment(s, &data),
                })
            })
            .collect();
        let packet = match &decoded {
            Some(Ok(p)) => serde_json::json!({
                "projectionType": p.projection_type,
                "usePanoramaViewer": p.use_panorama_viewer,
                "croppedWidth": p.cropped_width,
                "croppedHeight": p.cropped_height,
                "fullWidth": p.full_width,
                "fullHeight": p.full_height,
                "croppedLeft": p.cropped_left,
                "croppedTop": p.cropped_top,
            }),
            Some(Err(e)) => serde_json::json!({ "error": e.to_string() }),
            None => serde_json::Value::Null,
        };
        let doc = serde_json::json!({
            "file": file.display().to_string(),
            "size": data.len(),
            "scanOffset": index.scan_offset,
            "segments": segments,
            "packetCount": packets.len(),
            "packet": packet,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Size: {} bytes", data.len());
    println!("\nSegments: {}", index.segments.len());
    for (i, segment) in index.segments.iter().enumerate() {
        print!(
            "  [{}] {:<5} offset {:>8}  length {:>5}",
            i, segment.marker, segment.offset, segment.length
        );
        if codec::is_packet_segment(segment, &data) {
            print!("  [panorama packet]");
        }
        println!();
    }
    println!("Scan data at offset {}", index.scan_offset);

    match (packets.len(), decoded) {
        (0, _) => println!("\nNo panorama packet"),
        (_, Some(Ok(p))) => {
            println!("\nPanorama packet:");
            println!("  Projection: {}", p.projection_type);
            println!("  Use panorama viewer: {}", p.use_panorama_viewer);
            println!("  Full: {}x{}", p.full_width, p.full_height);
            println!(
                "  Cropped: {}x{} at ({}, {})",
                p.cropped_width, p.cropped_height, p.cropped_left, p.cropped_top
            );
        }
        (_, Some(Err(e))) => println!("\nPanorama packet present but invalid: {}", e),
        (n, None) => println!("\n{} panorama packets present (expected one)", n),
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            config::validate_config(&config)?;
            config
        }
    };

    println!("✓ Configuration is valid");
    println!("  Output dir: {}", config.output_dir.display());
    println!("  Manifest: {}", config.manifest.display());
    println!("  Packet form: {}", PacketForm::from(config.packet_form));
    println!("  Crop to 2:1: {}", config.crop_to_equirectangular);
    println!("  Workers: {}", config.workers);
    println!("  Tiers: {}", config.tiers.len());
    for tier in &config.tiers {
        print!(
            "    {} {}x{} q{}",
            tier.id, tier.width, tier.height, tier.quality
        );
        if tier.default {
            print!(" [default]");
        }
        println!();
    }
    println!(
        "  Thumbnail: {}x{} q{}",
        config.thumbnail.max_width, config.thumbnail.max_height, config.thumbnail.quality
    );

    Ok(())
}
