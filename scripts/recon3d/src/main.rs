//! OCT 3D 重建与可视化命令行.
//!
//! ```bash
//! # 下载示例数据 (已存在的文件会被跳过)
//! cargo run --release --bin recon3d -- fetch
//!
//! # 生成体掩膜及诊断图
//! cargo run --release --bin recon3d -- prepare
//!
//! # 渲染: 交互视图或旋转动画
//! cargo run --release --bin recon3d -- visualize --interactive
//! cargo run --release --bin recon3d -- visualize --animation
//! ```

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use oct_berry::consts::{dirs, fetch};
use oct_berry::dataset::{fetch_examples, Fetch, FetchReport, HttpFetcher};
use oct_berry::mask::prepare_to_dir;
use oct_berry::render::{load_render_volume, render_animation, run_interactive};
use oct_berry::prelude::*;
use std::path::{Path, PathBuf};
use utils::{loader, sep};

#[derive(Parser)]
#[command(author, version, about = "OCT 3D reconstruction and visualisation")]
struct Cli {
    /// Directory holding the example volumes
    #[arg(long, env = dirs::EXAMPLE_DIR_ENV, default_value = dirs::EXAMPLE_DIR)]
    example_dir: PathBuf,

    /// Directory receiving masks, diagnostics and renders
    #[arg(long, env = dirs::RESULT_DIR_ENV, default_value = dirs::RESULT_DIR)]
    result_dir: PathBuf,

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
    /// Download the example volumes
    Fetch,

    /// Build the volumetric tissue mask
    Prepare,

    /// Render the masked volume
    #[command(group(ArgGroup::new("mode").required(true).args(["interactive", "animation"])))]
    Visualize {
        /// Render a view and rotate/zoom it from the terminal
        #[arg(long)]
        interactive: bool,

        /// Render a turntable animation
        #[arg(long)]
        animation: bool,
    },
}

fn run_fetch(cli: &Cli) -> Result<()> {
    let fetcher = HttpFetcher::new().context("cannot build http client")?;
    fetch_into(&cli.example_dir, &fetch::EXAMPLES, &fetcher)?;
    Ok(())
}

/// 下载到 `dir`. 单个文件失败只记录警告, 仅目录无法创建时返回错误.
fn fetch_into<F: Fetch + ?Sized>(
    dir: &Path,
    entries: &[(&str, &str)],
    fetcher: &F,
) -> Result<FetchReport> {
    let report = fetch_examples(dir, entries, fetcher)
        .with_context(|| format!("cannot prepare {}", dir.display()))?;
    sep();
    println!(
        "downloaded: {}, skipped: {}, failed: {}",
        report.downloaded.len(),
        report.skipped.len(),
        report.failed.len()
    );
    if !report.failed.is_empty() {
        log::warn!("failed to download {}", report.failed.join(", "));
    }
    Ok(report)
}

fn run_prepare(cli: &Cli) -> Result<()> {
    let input = loader::oct_example(&cli.example_dir);
    let prepared = prepare_to_dir(&input, &cli.result_dir, &MaskParams::default())
        .with_context(|| format!("cannot prepare {}", input.display()))?;
    sep();
    println!(
        "mask: {} of {} voxels, top view: {} of {} columns",
        prepared.mask.count(),
        prepared.mask.data().len(),
        prepared.top_view_mask.iter().filter(|&&m| m).count(),
        prepared.top_view_mask.len()
    );
    println!("saved to {}", loader::mask_file(&cli.result_dir).display());
    Ok(())
}

fn run_visualize(cli: &Cli, interactive: bool) -> Result<()> {
    let params = RenderParams::default();
    let input = loader::modulus_example(&cli.example_dir);
    let volume = load_render_volume(&input, &cli.result_dir, &params)?;
    let renderer = Renderer::new(volume, params.opacity)?;

    if interactive {
        let stdin = std::io::stdin();
        let renders = run_interactive(
            &renderer,
            &cli.result_dir,
            stdin.lock(),
            std::io::stdout().lock(),
        )?;
        log::info!("rendered {renders} view(s)");
    } else if let Some(video) = render_animation(&renderer, &cli.result_dir)? {
        sep();
        println!("animation: {}", video.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::init_logger(cli.verbose)?;
    utils::init_threads(cli.threads)?;

    let missing = loader::missing_examples(&cli.example_dir);
    if !matches!(cli.command, Command::Fetch) && !missing.is_empty() {
        log::warn!(
            "missing example file(s) in {}: {}; run `recon3d fetch` first",
            cli.example_dir.display(),
            missing.join(", ")
        );
    }

    match cli.command {
        Command::Fetch => run_fetch(&cli),
        Command::Prepare => run_prepare(&cli),
        Command::Visualize { interactive, .. } => run_visualize(&cli, interactive),
    }
}
