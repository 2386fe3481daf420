use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use retint_contracts::detect::{filter_labels, Region, DEFAULT_MIN_CONFIDENCE};
use retint_contracts::dimensions::{select_dimensions, supported_sizes, OutputSize};
use retint_contracts::events::EventWriter;
use retint_engine::orchestrator::{run_multi_step, run_single_pass, ChainPlan, TintPlan};
use retint_engine::providers::{
    DetectionProvider, DryrunInpaintProvider, HttpDetectionProvider, HttpInpaintProvider,
    InpaintProvider,
};
use retint_engine::synthesize_mask;

#[derive(Debug, Parser)]
#[command(name = "retint", version, about = "Detection-guided inpainting pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Detect labeled regions in an image and print the filtered list.
    Detect(DetectArgs),
    /// Rasterize region boxes into a binary edit-mask PNG.
    Mask(MaskArgs),
    /// Recolor all masked regions with a single model call.
    Tint(TintArgs),
    /// Recolor regions one at a time, chaining each output into the next step.
    Chain(ChainArgs),
    /// List the supported output sizes, or pick one for a source size.
    Sizes(SizesArgs),
}

#[derive(Debug, Parser)]
struct DetectArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long, default_value_t = DEFAULT_MIN_CONFIDENCE)]
    min_confidence: f64,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct MaskArgs {
    #[arg(long)]
    image: PathBuf,
    /// JSON file holding the filtered region list.
    #[arg(long)]
    regions: PathBuf,
    /// Paint only the region at this index instead of all of them.
    #[arg(long)]
    only: Option<usize>,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct TintArgs {
    #[arg(long)]
    image: PathBuf,
    /// Edit-mask PNG; synthesized from --regions when omitted.
    #[arg(long)]
    mask: Option<PathBuf>,
    #[arg(long)]
    regions: Option<PathBuf>,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    negative: Option<String>,
    #[arg(long, default_value_t = 0)]
    seed: i64,
    #[arg(long, default_value_t = 8.0)]
    cfg_scale: f64,
    /// Use the offline provider instead of the configured endpoint.
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ChainArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    regions: PathBuf,
    #[arg(long)]
    negative: Option<String>,
    #[arg(long, default_value_t = 0)]
    seed: i64,
    #[arg(long, default_value_t = 8.0)]
    cfg_scale: f64,
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct SizesArgs {
    #[arg(long, requires = "height")]
    width: Option<u32>,
    #[arg(long, requires = "width")]
    height: Option<u32>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("retint error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Detect(args) => run_detect(args),
        Command::Mask(args) => run_mask(args),
        Command::Tint(args) => run_tint(args),
        Command::Chain(args) => run_chain(args),
        Command::Sizes(args) => run_sizes(args),
    }
}

fn run_detect(args: DetectArgs) -> Result<i32> {
    let image = read_file(&args.image)?;
    let Some(provider) = HttpDetectionProvider::from_env() else {
        bail!("RETINT_DETECT_URL is not set");
    };
    let labels = provider.detect(&image, args.min_confidence)?;
    let regions = filter_labels(&labels, args.min_confidence);
    let rendered = serde_json::to_string_pretty(&regions)?;
    match &args.out {
        Some(path) => {
            fs::write(path, &rendered)
                .with_context(|| format!("failed writing {}", path.display()))?;
            println!("{} region(s) written to {}", regions.len(), path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(0)
}

fn run_mask(args: MaskArgs) -> Result<i32> {
    let image = read_file(&args.image)?;
    let regions = load_regions(&args.regions)?;
    let mask = synthesize_mask(&image, &regions, args.only)?;
    fs::write(&args.out, mask.to_png_bytes()?)
        .with_context(|| format!("failed writing {}", args.out.display()))?;
    println!(
        "mask {}x{} ({} edit pixels) written to {}",
        mask.width(),
        mask.height(),
        mask.edit_pixel_count(),
        args.out.display()
    );
    Ok(0)
}

fn run_tint(args: TintArgs) -> Result<i32> {
    let image = read_file(&args.image)?;
    let size = output_size_for(&image)?;
    let mask = match (&args.mask, &args.regions) {
        (Some(path), _) => read_file(path)?,
        (None, Some(path)) => {
            let regions = load_regions(path)?;
            synthesize_mask(&image, &regions, None)?.to_png_bytes()?
        }
        (None, None) => bail!("either --mask or --regions is required"),
    };

    let mut plan = TintPlan::new(image, mask, size);
    if let Some(prompt) = args.prompt {
        plan.prompt = prompt;
    }
    if let Some(negative) = args.negative {
        plan.negative_text = negative;
    }
    plan.seed = args.seed;
    plan.cfg_scale = args.cfg_scale;

    let provider = inpaint_provider(args.dryrun)?;
    let events = event_writer(args.events.as_deref());
    let output = run_single_pass(provider.as_ref(), events.as_ref(), &plan)?;
    fs::write(&args.out, &output)
        .with_context(|| format!("failed writing {}", args.out.display()))?;
    println!("tinted image written to {}", args.out.display());
    Ok(0)
}

fn run_chain(args: ChainArgs) -> Result<i32> {
    let image = read_file(&args.image)?;
    let size = output_size_for(&image)?;
    let regions = load_regions(&args.regions)?;

    let mut plan = ChainPlan::new(image, regions, size);
    if let Some(negative) = args.negative {
        plan.negative_text = negative;
    }
    plan.seed = args.seed;
    plan.cfg_scale = args.cfg_scale;

    let provider = inpaint_provider(args.dryrun)?;
    let events = event_writer(args.events.as_deref());
    let outcome = run_multi_step(provider.as_ref(), events.as_ref(), &plan);

    for failure in &outcome.failures {
        eprintln!(
            "step {} ({}) failed: {}",
            failure.step, failure.label, failure.error
        );
    }
    fs::write(&args.out, &outcome.image)
        .with_context(|| format!("failed writing {}", args.out.display()))?;
    println!(
        "chain complete: {} edited, {} failed, {} skipped; image written to {}",
        outcome.applied.len(),
        outcome.failures.len(),
        outcome.skipped,
        args.out.display()
    );
    Ok(0)
}

fn run_sizes(args: SizesArgs) -> Result<i32> {
    match (args.width, args.height) {
        (Some(width), Some(height)) => {
            let size = select_dimensions(width, height);
            println!("{}", format_size(&size));
        }
        _ => {
            for size in supported_sizes().values() {
                println!("{}", format_size(size));
            }
        }
    }
    Ok(0)
}

fn format_size(size: &OutputSize) -> String {
    format!("{:>5}  {}x{}", size.name, size.width, size.height)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed reading {}", path.display()))
}

fn load_regions(path: &Path) -> Result<Vec<Region>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid region list", path.display()))
}

fn output_size_for(image: &[u8]) -> Result<OutputSize> {
    use image::GenericImageView;

    let decoded = image::load_from_memory(image).context("failed to decode source image")?;
    Ok(select_dimensions(decoded.width(), decoded.height()))
}

fn inpaint_provider(dryrun: bool) -> Result<Box<dyn InpaintProvider>> {
    if dryrun {
        return Ok(Box::new(DryrunInpaintProvider));
    }
    match HttpInpaintProvider::from_env() {
        Some(provider) => Ok(Box::new(provider)),
        None => bail!("RETINT_TINT_URL is not set (or pass --dryrun)"),
    }
}

fn event_writer(path: Option<&Path>) -> Option<EventWriter> {
    path.map(|path| EventWriter::new(path, format!("tint-{}", uuid::Uuid::new_v4())))
}
