//! 显微图像批处理命令行.
//!
//! ```bash
//! # 逐通道背景扣除 + 降噪
//! cargo run --release --bin fiji -- preprocess <INPUT_DIR> <OUTPUT_DIR>
//!
//! # 按 ROI 测量并导出 Results.csv
//! cargo run --release --bin fiji -- post-roi <IMAGE_DIR> <ROI_DIR> <OUTPUT_DIR>
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oct_berry::consts::fiji as defaults;
use oct_berry::fiji::{run_post_roi, run_preprocess, PostRoiParams, PreprocessParams};
use std::path::PathBuf;
use std::time::Duration;
use utils::sep;

#[derive(Parser)]
#[command(author, version, about = "Batch micrograph preprocessing and ROI measurement")]
struct Cli {
    /// Worker threads (default: all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Per-channel rolling-ball background subtraction, median and gaussian filtering
    Preprocess {
        /// Directory of multi-channel images
        input_dir: PathBuf,

        /// Output directory
        output_dir: PathBuf,

        /// Only files ending with this are processed
        #[arg(long, default_value = defaults::IMAGE_EXT)]
        ext: String,

        /// Rolling ball radius in pixels
        #[arg(long, default_value_t = defaults::ROLLING_BALL_RADIUS)]
        radius: f64,

        /// Median filter radius in pixels
        #[arg(long, default_value_t = defaults::MEDIAN_RADIUS)]
        median_radius: f64,

        /// Gaussian blur sigma in pixels
        #[arg(long, default_value_t = defaults::GAUSSIAN_SIGMA)]
        sigma: f64,

        /// Wait before opening each file, in milliseconds
        #[arg(long, default_value_t = defaults::SETTLE_DELAY.as_millis() as u64)]
        settle_ms: u64,
    },

    /// Clear outside the ROIs, threshold with Otsu and measure every ROI
    PostRoi {
        /// Directory of images
        image_dir: PathBuf,

        /// Directory of ImageJ ROI zip archives
        roi_dir: PathBuf,

        /// Output directory
        output_dir: PathBuf,

        /// Only files ending with this are processed
        #[arg(long, default_value = defaults::IMAGE_EXT)]
        ext: String,

        /// ROI archive name suffix (case-insensitive)
        #[arg(long, default_value = defaults::ROI_SUFFIX)]
        roi_suffix: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::init_logger(cli.verbose)?;
    utils::init_threads(cli.threads)?;

    match cli.command {
        Command::Preprocess {
            input_dir,
            output_dir,
            ext,
            radius,
            median_radius,
            sigma,
            settle_ms,
        } => {
            let params = PreprocessParams {
                input_dir,
                output_dir,
                ext,
                rolling_ball_radius: radius,
                median_radius,
                gaussian_sigma: sigma,
                settle_delay: Duration::from_millis(settle_ms),
            };
            let report = run_preprocess(&params)
                .with_context(|| format!("cannot preprocess {}", params.input_dir.display()))?;
            sep();
            println!(
                "processed: {}, failed: {}",
                report.processed.len(),
                report.failed.len()
            );
            for name in &report.failed {
                println!("  failed: {name}");
            }
        }
        Command::PostRoi {
            image_dir,
            roi_dir,
            output_dir,
            ext,
            roi_suffix,
        } => {
            let params = PostRoiParams {
                image_dir,
                ext,
                roi_dir,
                roi_suffix,
                output_dir,
            };
            let table = run_post_roi(&params)
                .with_context(|| format!("cannot measure {}", params.image_dir.display()))?;
            sep();
            println!("measured {} roi(s)", table.len());
        }
    }
    Ok(())
}
