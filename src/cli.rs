// ============================================================================
// RedactFE CLI — headless batch redaction via command-line arguments
// ============================================================================
//
// Usage examples:
//   redactfe -i scan.png --rect 40,60,220,90 -o redacted.png
//   redactfe -i id.jpg --ellipse 10,10,80,120 --stroke 0,200,300,200 --brush 12
//   redactfe -i "shots/*.png" --detect --seed 7 --output-dir out/ --format jpeg
//
// Every shape is replayed as a pointer gesture on a 1:1 view, so the result
// is exactly what drawing it interactively would commit.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::io::SaveFormat;
use crate::ops::detect::PlaceholderDetector;
use crate::session::{Session, Tool};
use crate::settings::RedactSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// RedactFE headless redaction tool.
///
/// Blur rectangles, ellipses and brush strokes out of images without a GUI.
#[derive(Parser, Debug)]
#[command(
    name = "redactfe",
    about = "RedactFE headless batch redaction",
    long_about = "Blur regions of image files and write the redacted result.\n\
                  Accepts PNG, JPEG, GIF, BMP and WEBP input; writes PNG, JPEG,\n\
                  BMP or WEBP.\n\n\
                  Example:\n  \
                  redactfe -i scan.png --rect 40,60,220,90 -o redacted.png\n  \
                  redactfe -i \"*.jpg\" --detect --output-dir out/ --format png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "scans/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    /// For batch input use --output-dir instead.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here with the original stem and the target format's extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Rectangle to redact, as two corners. Repeatable.
    #[arg(long = "rect", value_name = "X1,Y1,X2,Y2", value_parser = parse_quad)]
    pub rects: Vec<[f32; 4]>,

    /// Ellipse to redact, inscribed in the box spanning two corners. Repeatable.
    #[arg(long = "ellipse", value_name = "X1,Y1,X2,Y2", value_parser = parse_quad)]
    pub ellipses: Vec<[f32; 4]>,

    /// Brush stroke from one point to another. Repeatable.
    #[arg(long = "stroke", value_name = "X1,Y1,X2,Y2", value_parser = parse_quad)]
    pub strokes: Vec<[f32; 4]>,

    /// Single brush dab. Repeatable.
    #[arg(long = "dot", value_name = "X,Y", value_parser = parse_pair)]
    pub dots: Vec<[f32; 2]>,

    /// Brush diameter in pixels (overrides the saved setting).
    #[arg(long, value_name = "PX")]
    pub brush: Option<f32>,

    /// Run the placeholder sensitive-region detector.
    #[arg(long)]
    pub detect: bool,

    /// Seed for --detect, for reproducible output.
    #[arg(long, requires = "detect")]
    pub seed: Option<u64>,

    /// Total blur strength (overrides the saved setting).
    #[arg(long, value_name = "SIGMA")]
    pub intensity: Option<f32>,

    /// Number of blur passes (overrides the saved setting).
    #[arg(long, value_name = "N")]
    pub passes: Option<u32>,

    /// Single-pass blur at full intensity.
    #[arg(long)]
    pub low_quality: bool,

    /// Print per-file timing information and debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Saved settings with this run's overrides applied.
    pub fn effective_settings(&self, mut settings: RedactSettings) -> RedactSettings {
        if let Some(b) = self.brush.filter(|b| b.is_finite() && *b > 0.0) {
            settings.brush_size = b;
        }
        if let Some(i) = self.intensity.filter(|i| i.is_finite() && *i >= 0.0) {
            settings.blur_intensity = i;
        }
        if let Some(p) = self.passes {
            settings.blur_passes = p.max(1);
        }
        if self.low_quality {
            settings.high_quality = false;
        }
        settings
    }

    fn has_work(&self) -> bool {
        self.detect
            || !self.rects.is_empty()
            || !self.ellipses.is_empty()
            || !self.strokes.is_empty()
            || !self.dots.is_empty()
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    if run_batch(args, RedactSettings::load()) { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Process every input with `saved` as the base settings. Returns `true`
/// when all files succeeded.
pub fn run_batch(args: CliArgs, saved: RedactSettings) -> bool {
    // Resolve glob patterns / literal paths → concrete PathBufs
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return false;
    }

    // Multiple inputs require --output-dir, not --output
    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return false;
    }

    if !args.has_work() {
        warn!("no shapes given and --detect not set; images are re-encoded unchanged");
    }

    let save_format = parse_format(args.format.as_deref(), args.output.as_deref());
    let settings = args.effective_settings(saved);

    // Create output directory if specified
    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return false;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), save_format)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &args, &settings, save_format) {
            Ok(commits) => {
                info!(input = %input_path.display(), output = %output_path.display(), commits, "redacted");
                if args.verbose || multi {
                    println!(
                        "  → {} ({} edits, {:.0}ms)",
                        output_path.display(),
                        commits,
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                error!(input = %input_path.display(), error = %e, "redaction failed");
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    !any_failure
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

/// Load, replay every requested edit, export. Returns the number of edits
/// that changed the mask.
fn run_one(
    input: &Path,
    output: &Path,
    args: &CliArgs,
    settings: &RedactSettings,
    format: SaveFormat,
) -> Result<usize> {
    // -- Step 1: Load ----------------------------------------------------
    let mut session = Session::new(settings.clone());
    let dims = session.open_path(input)?;
    session.set_view(dims, 1.0, 0.0, 0.0);

    // -- Step 2: Replay edits as gestures --------------------------------
    let mut commits = apply_edits(&mut session, args);
    if args.detect {
        let detector = PlaceholderDetector { seed: args.seed };
        if session.detect_sensitive(&detector) > 0 {
            commits += 1;
        }
    }

    // -- Step 3: Export --------------------------------------------------
    let image = session.export()?;
    crate::io::encode_and_write(&image, output, format, args.quality)?;
    Ok(commits)
}

/// Drive each shape through the pointer protocol. Returns committed edits.
pub fn apply_edits(session: &mut Session, args: &CliArgs) -> usize {
    let mut commits = 0;
    for &quad in &args.rects {
        commits += replay(session, Tool::Rectangle, quad);
    }
    for &quad in &args.ellipses {
        commits += replay(session, Tool::Ellipse, quad);
    }
    for &quad in &args.strokes {
        commits += replay(session, Tool::Brush, quad);
    }
    for &[x, y] in &args.dots {
        commits += replay(session, Tool::Brush, [x, y, x, y]);
    }
    commits
}

fn replay(session: &mut Session, tool: Tool, [x1, y1, x2, y2]: [f32; 4]) -> usize {
    session.set_tool(tool);
    session.pointer_down(x1, y1);
    usize::from(session.pointer_up(x2, y2))
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_floats<const N: usize>(s: &str) -> std::result::Result<[f32; N], String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != N {
        return Err(format!("expected {N} comma-separated numbers, got '{s}'"));
    }
    let mut out = [0.0f32; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("'{}' is not a number", part.trim()))?;
    }
    Ok(out)
}

fn parse_quad(s: &str) -> std::result::Result<[f32; 4], String> {
    parse_floats::<4>(s)
}

fn parse_pair(s: &str) -> std::result::Result<[f32; 2], String> {
    parse_floats::<2>(s)
}

/// Turn `-i` arguments into input files, in order and without duplicates.
///
/// An argument naming an existing path is taken as-is, so a bad file still
/// gets a per-file error. Anything else is a glob whose matches count only
/// when they are files with an accepted image extension.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut inputs: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let literal = PathBuf::from(pattern);
        let candidates: Vec<PathBuf> = if literal.exists() {
            vec![literal]
        } else {
            match glob::glob(pattern) {
                Ok(paths) => paths.flatten().filter(|p| is_redactable(p)).collect(),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "invalid glob pattern");
                    continue;
                }
            }
        };

        if candidates.is_empty() {
            warn!(pattern = %pattern, "no input images matched");
        }
        for path in candidates {
            if !inputs.contains(&path) {
                inputs.push(path);
            }
        }
    }

    inputs
}

fn is_redactable(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(crate::io::is_supported_extension)
}

/// Choose the [`SaveFormat`] from the `--format` string or infer it from the
/// output file extension. Defaults to PNG when neither is known.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> SaveFormat {
    if let Some(f) = format_arg {
        return SaveFormat::from_extension(f).unwrap_or_default();
    }
    output.map(SaveFormat::for_path).unwrap_or_default()
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, `<stem>_redacted.<ext>`
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_redacted.{}", stem, ext)))
}
