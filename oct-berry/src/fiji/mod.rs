//! 多通道显微图像批处理, 语义对齐 Fiji/ImageJ 的同名命令.
//!
//! - [`preprocess`]: 逐通道滚球背景扣除、中值滤波、高斯模糊.
//! - [`post_roi`]: 按文件名匹配 ROI 压缩包, 清除 ROI 之外的像素, Otsu 二值化, 逐 ROI 测量并导出 CSV.

mod filters;
mod matching;
mod measure;
mod plane;
mod rolling_ball;
mod roi;
mod tiff_io;

pub mod post_roi;
pub mod preprocess;

use crate::{Idx2d, ShapeMismatch};
use itertools::Itertools;
use std::path::{Path, PathBuf};

pub use filters::{circular_kernel, gaussian_blur, gaussian_kernel, median};
pub use matching::RoiIndex;
pub use measure::{Measurement, ResultsTable};
pub use plane::{BitDepth, Plane};
pub use post_roi::{otsu_binary, run_post_roi, PostRoiParams};
pub use preprocess::{run_preprocess, PreprocessParams, PreprocessReport};
pub use rolling_ball::{rolling_ball_background, subtract_background, RollingBall};
pub use roi::{Roi, RoiError, RoiSet, RoiShape};
pub use tiff_io::{read_channels, write_plane, TiffIoError};

/// 批处理错误.
#[derive(Debug, thiserror::Error)]
pub enum FijiError {
    /// 目录读写失败.
    #[error("i/o error at `{path}`: {source}")]
    Io {
        /// 路径.
        path: PathBuf,

        /// 底层错误.
        source: std::io::Error,
    },

    /// TIFF 读写失败.
    #[error(transparent)]
    Tiff(#[from] TiffIoError),

    /// ROI 读取失败.
    #[error(transparent)]
    Roi(#[from] RoiError),

    /// 图像与掩膜形状不一致.
    #[error(transparent)]
    Shape(#[from] ShapeMismatch<Idx2d>),

    /// 结果表写入失败.
    #[error("cannot write results: {0}")]
    Csv(#[from] csv::Error),
}

/// 创建目录 (含父目录).
pub(crate) fn create_dir(dir: &Path) -> Result<(), FijiError> {
    std::fs::create_dir_all(dir).map_err(|source| FijiError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// `dir` 下名称以 `ext` 结尾的普通文件, 按文件名排序, 返回 `(文件名, 路径)`.
pub fn list_images(dir: &Path, ext: &str) -> Result<Vec<(String, PathBuf)>, FijiError> {
    let io_err = |source: std::io::Error| FijiError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(ext) {
            files.push((name, entry.path()));
        }
    }
    Ok(files.into_iter().sorted().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_images_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.tif", "a.tif", "c.TIF", "d.tiff", "e.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("f.tif")).unwrap();
        let names: Vec<_> = list_images(dir.path(), ".tif")
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, ["a.tif", "b.tif"]);
        assert!(list_images(&dir.path().join("missing"), ".tif").is_err());
    }
}
