//! 多通道显微图像批量预处理: 逐通道滚球背景扣除, 然后中值滤波与高斯模糊.

use super::filters::{gaussian_blur, median};
use super::rolling_ball::subtract_background;
use super::tiff_io::{read_channels, write_plane};
use super::{create_dir, list_images, FijiError};
use crate::consts::fiji as defaults;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 预处理参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreprocessParams {
    /// 输入目录.
    pub input_dir: PathBuf,

    /// 输出目录, 其下会创建两个子目录.
    pub output_dir: PathBuf,

    /// 只处理以此结尾的文件.
    pub ext: String,

    /// 滚球半径.
    pub rolling_ball_radius: f64,

    /// 中值滤波半径.
    pub median_radius: f64,

    /// 高斯模糊 σ.
    pub gaussian_sigma: f64,

    /// 打开每个文件前的等待时间.
    pub settle_delay: Duration,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            ext: defaults::IMAGE_EXT.to_string(),
            rolling_ball_radius: defaults::ROLLING_BALL_RADIUS,
            median_radius: defaults::MEDIAN_RADIUS,
            gaussian_sigma: defaults::GAUSSIAN_SIGMA,
            settle_delay: defaults::SETTLE_DELAY,
        }
    }
}

/// 一次批处理的结果.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreprocessReport {
    /// 成功处理的文件 (去掉扩展名), 及其通道数.
    pub processed: Vec<(String, usize)>,

    /// 失败的文件名.
    pub failed: Vec<String>,
}

/// 处理单个文件, 返回通道数.
fn preprocess_file(
    path: &Path,
    base: &str,
    params: &PreprocessParams,
    bg_dir: &Path,
    filtered_dir: &Path,
) -> Result<usize, FijiError> {
    let channels = read_channels(path)?;
    for (i, channel) in channels.iter().enumerate() {
        let c = i + 1;
        log::debug!("{base}: channel {c}/{}", channels.len());

        let subtracted = subtract_background(channel, params.rolling_ball_radius)?;
        write_plane(&bg_dir.join(format!("{base}_Ch-{c}_bg-sub.tif")), &subtracted)?;

        let filtered = median(&subtracted, params.median_radius);
        let filtered = gaussian_blur(&filtered, params.gaussian_sigma);
        write_plane(&filtered_dir.join(format!("{base}_Ch-{c}_filtered.tif")), &filtered)?;
    }
    Ok(channels.len())
}

/// 批量预处理 `params.input_dir` 下的全部图像.
///
/// 输出目录无法创建或输入目录无法读取时返回错误; 单个文件的失败只会被记录并跳过.
pub fn run_preprocess(params: &PreprocessParams) -> Result<PreprocessReport, FijiError> {
    let bg_dir = params.output_dir.join(defaults::BG_SUB_DIR);
    let filtered_dir = params.output_dir.join(defaults::FILTERED_DIR);
    create_dir(&bg_dir)?;
    create_dir(&filtered_dir)?;

    let files = list_images(&params.input_dir, &params.ext)?;
    log::info!(
        "preprocessing {} file(s) from {}",
        files.len(),
        params.input_dir.display()
    );

    let mut report = PreprocessReport::default();
    for (name, path) in files {
        let base = name.replace(&params.ext, "");
        if !params.settle_delay.is_zero() {
            std::thread::sleep(params.settle_delay);
        }
        log::info!("processing {name}");
        match preprocess_file(&path, &base, params, &bg_dir, &filtered_dir) {
            Ok(channels) => report.processed.push((base, channels)),
            Err(e) => {
                log::error!("failed to process {name}: {e}");
                report.failed.push(name);
            }
        }
    }
    log::info!(
        "preprocess done: {} ok, {} failed",
        report.processed.len(),
        report.failed.len()
    );
    Ok(report)
}
