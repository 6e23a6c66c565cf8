use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use muse_contracts::campaign::{
    AccessTier, AspectRatio, GenerationRequest, ImageResolution, ImageState, Platform, Post, Tone,
};
use muse_contracts::events::EventLog;
use muse_contracts::manifest::{
    load_manifest, write_manifest, CampaignManifest, ManifestPost, MANIFEST_FILE_NAME,
};
use muse_engine::export::{clipboard_text, write_post_image};
use muse_engine::host::{resolve_access_tier, EnvHostCapabilities};
use muse_engine::{Campaign, CampaignSession, ContentOrchestrator, EngineConfig, ImageEdits};

#[derive(Debug, Parser)]
#[command(name = "muse-rs", version, about = "Social campaign generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Campaign(CampaignArgs),
    Regenerate(RegenerateArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TierArg {
    Standard,
    Pro,
    /// Pro when a paid key is configured.
    Auto,
}

#[derive(Debug, Parser)]
struct CampaignArgs {
    #[arg(long)]
    idea: String,
    #[arg(long, default_value = "Professional")]
    tone: Tone,
    #[arg(long, value_enum, default_value_t = TierArg::Auto)]
    tier: TierArg,
    #[arg(long, default_value = "1K")]
    resolution: ImageResolution,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct RegenerateArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    platform: Platform,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    aspect_ratio: Option<AspectRatio>,
    /// Defaults to the resolution recorded in the manifest.
    #[arg(long)]
    resolution: Option<ImageResolution>,
    /// Defaults to the tier recorded in the manifest.
    #[arg(long, value_enum)]
    tier: Option<TierArg>,
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("muse-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Campaign(args) => run_campaign(args),
        Command::Regenerate(args) => run_regenerate(args),
    }
}

fn resolve_tier(tier: TierArg) -> AccessTier {
    match tier {
        TierArg::Standard => AccessTier::Standard,
        TierArg::Pro => AccessTier::Pro,
        TierArg::Auto => resolve_access_tier(Some(&EnvHostCapabilities::from_env())),
    }
}

fn events_path(out: &Path, events: Option<PathBuf>) -> PathBuf {
    events.unwrap_or_else(|| out.join("events.jsonl"))
}

fn orchestrator(out: &Path, events: Option<PathBuf>) -> Result<ContentOrchestrator> {
    let config = EngineConfig::from_env();
    tracing::debug!(?config, "engine config");
    let orchestrator = ContentOrchestrator::from_config(&config)
        .context("failed to build HTTP client")?
        .with_events(EventLog::to_path(events_path(out, events)));
    Ok(orchestrator)
}

fn run_campaign(args: CampaignArgs) -> Result<i32> {
    let tier = resolve_tier(args.tier);
    let request = GenerationRequest::new(args.idea.clone(), args.tone, tier);
    if !request.has_usable_idea() {
        bail!("--idea must not be empty");
    }
    let engine = orchestrator(&args.out, args.events)?;
    tracing::info!(tier = %tier, tone = %args.tone, "generating campaign");

    let campaign = engine.generate_campaign(&request)?;
    for post in campaign.posts() {
        print_post(post);
    }

    engine
        .dispatch_image_requests(&campaign, args.resolution, tier)
        .wait();
    let resolved = engine
        .session()
        .snapshot()
        .filter(|current| current.id == campaign.id)
        .context("campaign was replaced before its images finished")?;

    let mut manifest =
        CampaignManifest::new(campaign.id, &request.idea, request.tone, tier, args.resolution);
    let mut failed = 0;
    for post in resolved.posts() {
        if post.image_state == ImageState::Failed {
            failed += 1;
        }
        manifest.upsert(manifest_entry(&args.out, post)?);
    }
    let manifest_path = args.out.join(MANIFEST_FILE_NAME);
    write_manifest(&manifest_path, &manifest)?;
    println!("Campaign written to {}", manifest_path.display());
    Ok(if failed == 0 { 0 } else { 2 })
}

fn run_regenerate(args: RegenerateArgs) -> Result<i32> {
    let manifest_path = args.out.join(MANIFEST_FILE_NAME);
    let mut manifest = load_manifest(&manifest_path)?;
    if manifest.post(args.platform).is_none() {
        bail!("{} has no {} post", manifest_path.display(), args.platform);
    }
    let tier = args.tier.map(resolve_tier).unwrap_or(manifest.access_tier);
    let resolution = args.resolution.unwrap_or(manifest.resolution);

    let session = CampaignSession::new();
    session.replace(Campaign::new(
        manifest.campaign_id,
        manifest.posts.iter().map(|entry| entry.post.clone()),
    ));
    let engine = orchestrator(&args.out, args.events)?.with_session(session);
    let edits = ImageEdits {
        prompt: args.prompt.filter(|prompt| !prompt.trim().is_empty()),
        aspect_ratio: args.aspect_ratio,
    };

    let result = engine.regenerate_image(manifest.campaign_id, args.platform, &edits, resolution, tier);
    let post = match &result {
        Ok(post) => post.clone(),
        Err(_) => engine
            .session()
            .post(args.platform)
            .context("regenerated post disappeared from the session")?,
    };
    replace_manifest_entry(&args.out, &mut manifest, &post)?;
    write_manifest(&manifest_path, &manifest)?;
    result?;
    print_post(&post);
    Ok(0)
}

/// Deletes the image file the manifest recorded for `post.platform`, then
/// writes the new image (if any) and its row.
fn replace_manifest_entry(out: &Path, manifest: &mut CampaignManifest, post: &Post) -> Result<()> {
    let previous = manifest
        .post(post.platform)
        .and_then(|entry| entry.image_file.clone());
    if let Some(name) = previous {
        // Only bare file names inside `out` are ours to remove.
        if Path::new(&name).file_name() == Some(OsStr::new(&name)) {
            let path = out.join(&name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to remove {}", path.display()))
                }
            }
        }
    }
    manifest.upsert(manifest_entry(out, post)?);
    Ok(())
}

/// Writes the post's image (if any) and builds its manifest row.
fn manifest_entry(out: &Path, post: &Post) -> Result<ManifestPost> {
    let (image_file, image_mime) = match post.image.as_ref() {
        Some(image) => {
            let path = write_post_image(out, post)?;
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string);
            (name, Some(image.mime_type.clone()))
        }
        None => (None, None),
    };
    Ok(ManifestPost {
        post: post.clone(),
        image_file,
        image_mime,
    })
}

fn print_post(post: &Post) {
    println!("== {} [{}] ==", post.platform, post.aspect_ratio);
    println!("{}", clipboard_text(post));
    println!("image prompt: {}", post.image_prompt);
    println!("image: {:?}", post.image_state);
    println!();
}

#[cfg(test)]
mod tests {
    use muse_contracts::campaign::{CampaignId, GeneratedImage, PlatformDraft};

    use super::*;

    fn post(platform: Platform) -> Post {
        Post::from_draft(
            platform,
            PlatformDraft {
                content: "Launch day.".to_string(),
                image_prompt: "rocket".to_string(),
                hashtags: None,
            },
        )
    }

    #[test]
    fn campaign_args_parse_with_defaults() {
        let cli = Cli::try_parse_from(["muse-rs", "campaign", "--idea", "new API", "--out", "runs/a"])
            .unwrap();
        match cli.command {
            Command::Campaign(args) => {
                assert_eq!(args.idea, "new API");
                assert_eq!(args.tone, Tone::Professional);
                assert_eq!(args.tier, TierArg::Auto);
                assert_eq!(args.resolution, ImageResolution::OneK);
                assert_eq!(args.events, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn regenerate_args_parse_typed_values() {
        let cli = Cli::try_parse_from([
            "muse-rs",
            "regenerate",
            "--out",
            "runs/a",
            "--platform",
            "instagram",
            "--aspect-ratio",
            "9:16",
            "--resolution",
            "4K",
            "--tier",
            "pro",
        ])
        .unwrap();
        match cli.command {
            Command::Regenerate(args) => {
                assert_eq!(args.platform, Platform::Instagram);
                assert_eq!(args.aspect_ratio, Some(AspectRatio::Portrait9x16));
                assert_eq!(args.resolution, Some(ImageResolution::FourK));
                assert_eq!(args.tier, Some(TierArg::Pro));
                assert_eq!(args.prompt, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_tier_is_rejected() {
        assert!(Cli::try_parse_from([
            "muse-rs", "campaign", "--idea", "x", "--out", "o", "--tier", "gold"
        ])
        .is_err());
    }

    #[test]
    fn explicit_tiers_skip_probe() {
        assert_eq!(resolve_tier(TierArg::Standard), AccessTier::Standard);
        assert_eq!(resolve_tier(TierArg::Pro), AccessTier::Pro);
    }

    #[test]
    fn events_default_into_out_dir() {
        let out = Path::new("runs/a");
        assert_eq!(events_path(out, None), out.join("events.jsonl"));
        assert_eq!(
            events_path(out, Some(PathBuf::from("/tmp/e.jsonl"))),
            PathBuf::from("/tmp/e.jsonl")
        );
    }

    #[test]
    fn manifest_entry_writes_ready_images_only() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut ready = post(Platform::Twitter);
        ready.image_state = ImageState::Ready;
        ready.image = Some(GeneratedImage::new("image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0]));

        let entry = manifest_entry(dir.path(), &ready)?;
        assert_eq!(entry.image_file.as_deref(), Some("Twitter-image.jpg"));
        assert_eq!(entry.image_mime.as_deref(), Some("image/jpeg"));
        assert!(dir.path().join("Twitter-image.jpg").exists());

        let pending = manifest_entry(dir.path(), &post(Platform::LinkedIn))?;
        assert_eq!(pending.image_file, None);
        assert_eq!(pending.image_mime, None);
        Ok(())
    }

    fn manifest_with(out: &Path, post: &Post) -> anyhow::Result<CampaignManifest> {
        let mut manifest = CampaignManifest::new(
            CampaignId::new(),
            "new API",
            Tone::Professional,
            AccessTier::Standard,
            ImageResolution::OneK,
        );
        manifest.upsert(manifest_entry(out, post)?);
        Ok(manifest)
    }

    #[test]
    fn replacing_entry_removes_image_with_old_extension() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut jpeg = post(Platform::Instagram);
        jpeg.image_state = ImageState::Ready;
        jpeg.image = Some(GeneratedImage::new("image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0]));
        let mut manifest = manifest_with(dir.path(), &jpeg)?;
        assert!(dir.path().join("Instagram-image.jpg").exists());

        let mut png = post(Platform::Instagram);
        png.image_state = ImageState::Ready;
        png.image = Some(GeneratedImage::new(
            "image/png",
            vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
        ));
        replace_manifest_entry(dir.path(), &mut manifest, &png)?;

        assert!(!dir.path().join("Instagram-image.jpg").exists());
        assert!(dir.path().join("Instagram-image.png").exists());
        let entry = manifest.post(Platform::Instagram).unwrap();
        assert_eq!(entry.image_file.as_deref(), Some("Instagram-image.png"));
        assert_eq!(manifest.posts.len(), 1);
        Ok(())
    }

    #[test]
    fn failed_regeneration_drops_old_image_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut ready = post(Platform::Twitter);
        ready.image_state = ImageState::Ready;
        ready.image = Some(GeneratedImage::new("image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0]));
        let mut manifest = manifest_with(dir.path(), &ready)?;

        let mut failed = post(Platform::Twitter);
        failed.image_state = ImageState::Failed;
        replace_manifest_entry(dir.path(), &mut manifest, &failed)?;

        assert!(!dir.path().join("Twitter-image.jpg").exists());
        let entry = manifest.post(Platform::Twitter).unwrap();
        assert_eq!(entry.image_file, None);
        assert_eq!(entry.post.image_state, ImageState::Failed);
        Ok(())
    }

    #[test]
    fn recorded_paths_outside_out_dir_are_left_alone() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let out = root.path().join("run");
        fs::create_dir_all(&out)?;
        fs::write(root.path().join("keep.png"), b"x")?;
        let mut manifest = manifest_with(&out, &post(Platform::LinkedIn))?;
        manifest.posts[0].image_file = Some("../keep.png".to_string());

        replace_manifest_entry(&out, &mut manifest, &post(Platform::LinkedIn))?;
        assert!(root.path().join("keep.png").exists());
        Ok(())
    }
}
