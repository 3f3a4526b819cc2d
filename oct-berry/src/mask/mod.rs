//! 体掩膜生成流程.
//!
//! 1. 对原始体数据做 3D 高斯平滑;
//! 2. 沿深度方向求最大强度投影;
//! 3. 以 Chan–Vese 分割投影得到顶视掩膜, 再用圆盘结构元去孔洞/去孤岛;
//! 4. 每列最大值所在深度即为组织的 "天花板", 掩膜外置为底部, 平滑后再次将掩膜外置为底部;
//! 5. 从天花板到底部展开为 3D 体掩膜.

use crate::consts::prepare::*;
use crate::data::{CeilingPlot, ImgWriteVis, OctVolume, ShapeMismatch, TopViewPlot, VolumeMask};
use crate::dataset::OpenArchiveError;
use crate::filter::gaussian_filter;
use crate::morph::{remove_holes_and_islands, Footprint};
use crate::segment::{ChanVese, ChanVeseOutput, ChanVeseParams};
use ndarray::{Array2, ArrayView2, Zip};
use std::path::{Path, PathBuf};

/// 体掩膜生成错误.
#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    /// 读写 npz 失败.
    #[error(transparent)]
    Archive(#[from] OpenArchiveError),

    /// 保存诊断图失败.
    #[error("failed to save plot `{path}`: {source}")]
    Plot {
        /// 诊断图路径.
        path: PathBuf,

        /// 底层错误.
        source: image::ImageError,
    },

    /// 创建结果目录失败.
    #[error("failed to create `{path}`: {source}")]
    Io {
        /// 目录路径.
        path: PathBuf,

        /// 底层错误.
        source: std::io::Error,
    },

    /// 顶视掩膜与体数据列平面形状不一致.
    #[error("top view mask {found:?} does not match columns {expected:?}")]
    TopViewShape {
        /// 体数据列平面形状.
        expected: (usize, usize),

        /// 顶视掩膜形状.
        found: (usize, usize),
    },

    /// 体掩膜与体数据形状不一致.
    #[error(transparent)]
    Shape(#[from] ShapeMismatch),
}

/// 体掩膜生成参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaskParams {
    /// 原始体数据的高斯平滑标准差.
    pub volume_sigma: f64,

    /// 天花板高度图的高斯平滑标准差.
    pub ceiling_sigma: f64,

    /// 去孔洞/去孤岛的圆盘半径.
    pub footprint_radius: usize,

    /// 顶视分割参数.
    pub chan_vese: ChanVeseParams,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            volume_sigma: VOLUME_SIGMA,
            ceiling_sigma: CEILING_SIGMA,
            footprint_radius: FOOTPRINT_RADIUS,
            chan_vese: ChanVeseParams::default(),
        }
    }
}

/// 体掩膜生成的全部中间结果.
#[derive(Clone, Debug)]
pub struct Prepared {
    /// 平滑后体数据的最大强度投影.
    pub projection: Array2<f32>,

    /// Chan–Vese 的完整输出 (清理前).
    pub segmentation: ChanVeseOutput,

    /// 清理后的顶视掩膜.
    pub top_view_mask: Array2<bool>,

    /// 天花板高度图, 值域 `0..=depth`.
    pub ceiling: Array2<usize>,

    /// 3D 体掩膜.
    pub mask: VolumeMask,
}

/// 由最大强度投影求顶视掩膜: Chan–Vese 分割后闭运算去孔洞, 开运算去孤岛.
///
/// 同时返回 Chan–Vese 的完整输出.
pub fn top_view_mask(
    projection: ArrayView2<f32>,
    params: &MaskParams,
) -> (Array2<bool>, ChanVeseOutput) {
    log::info!("Applying Chan-Vese algorithm");
    let output = ChanVese::new(params.chan_vese).segment(projection);
    log::debug!(
        "Chan-Vese stopped after {} iterations",
        output.iterations
    );

    log::info!("Removing holes and islands from the mask");
    let footprint = Footprint::disk(params.footprint_radius);
    let cleaned = remove_holes_and_islands(output.segmentation.view(), &footprint);
    (cleaned, output)
}

/// 求天花板高度图.
///
/// 每列取最大值所在深度 (并列取首个); 顶视掩膜外置为 `depth`; 以 `sigma` 高斯平滑并截断为整数
/// (限制在 `0..=depth`); 最后再次将顶视掩膜外置为 `depth`.
pub fn ceiling(
    volume: &OctVolume,
    top_view: ArrayView2<bool>,
    sigma: f64,
) -> Result<Array2<usize>, PrepareError> {
    let expected = volume.column_shape();
    if top_view.dim() != expected {
        return Err(PrepareError::TopViewShape {
            expected,
            found: top_view.dim(),
        });
    }

    let depth = volume.depth();
    let mut ceiling = volume.argmax_depth();
    set_background(&mut ceiling, top_view, depth);

    let mut smooth = ceiling.mapv(|c| c as f64);
    gaussian_filter(&mut smooth, sigma);
    Zip::from(&mut ceiling).and(&smooth).for_each(|c, &s| {
        *c = if s.is_finite() && s > 0.0 {
            (s as usize).min(depth)
        } else {
            0
        };
    });

    set_background(&mut ceiling, top_view, depth);
    Ok(ceiling)
}

/// 顶视掩膜外的列置为 `depth`.
fn set_background(ceiling: &mut Array2<usize>, top_view: ArrayView2<bool>, depth: usize) {
    Zip::from(ceiling).and(top_view).for_each(|c, &m| {
        if !m {
            *c = depth;
        }
    });
}

/// 对 (原始) 体数据执行完整的体掩膜生成流程. 体数据会被就地平滑.
pub fn prepare(mut volume: OctVolume, params: &MaskParams) -> Result<Prepared, PrepareError> {
    log::info!("Applying gaussian filter (SD={})", params.volume_sigma);
    volume.smooth(params.volume_sigma);

    log::info!("Creating max intensity projection");
    let projection = volume.max_projection();
    let (top_view_mask, segmentation) = top_view_mask(projection.view(), params);

    log::info!("Finding the ceiling of the volumetric mask");
    let ceiling = ceiling(&volume, top_view_mask.view(), params.ceiling_sigma)?;

    log::info!("Setting volumetric mask values based on the found ceiling");
    let mask = VolumeMask::from_ceiling(&ceiling, volume.depth());
    debug_assert_eq!(mask.shape(), volume.shape());

    Ok(Prepared {
        projection,
        segmentation,
        top_view_mask,
        ceiling,
        mask,
    })
}

/// 读取 `input` 中字段 `content` 的体数据, 执行 [`prepare`], 并将诊断图与体掩膜写入 `result_dir`.
///
/// `result_dir` 不存在时会被创建.
pub fn prepare_to_dir(
    input: &Path,
    result_dir: &Path,
    params: &MaskParams,
) -> Result<Prepared, PrepareError> {
    std::fs::create_dir_all(result_dir).map_err(|source| PrepareError::Io {
        path: result_dir.to_path_buf(),
        source,
    })?;

    log::info!("Loading example file {}", input.display());
    let volume = OctVolume::open(input, CONTENT_KEY)?;
    log::info!("Loaded volume of shape {:?}", volume.shape());
    let depth = volume.depth();
    let prepared = prepare(volume, params)?;

    let plot_path = result_dir.join(TOP_VIEW_PLOT);
    TopViewPlot {
        projection: prepared.projection.view(),
        mask: prepared.top_view_mask.view(),
    }
    .save(&plot_path)
    .map_err(|source| PrepareError::Plot {
        path: plot_path.clone(),
        source,
    })?;
    log::info!("Visualisation of the top view mask generated at {}", plot_path.display());

    let plot_path = result_dir.join(CEILING_PLOT);
    CeilingPlot {
        ceiling: prepared.ceiling.view(),
        depth,
    }
    .save(&plot_path)
    .map_err(|source| PrepareError::Plot {
        path: plot_path.clone(),
        source,
    })?;
    log::info!(
        "Visualisation of the volumetric mask ceiling generated at {}",
        plot_path.display()
    );

    let mask_path = result_dir.join(MASK_FILE);
    log::info!("Saving the volumetric mask to {}", mask_path.display());
    prepared.mask.save(&mask_path, MASK_KEY)?;
    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn no_smoothing() -> MaskParams {
        MaskParams {
            volume_sigma: 0.0,
            ceiling_sigma: 0.0,
            footprint_radius: 0,
            chan_vese: ChanVeseParams {
                mu: 0.0,
                ..Default::default()
            },
        }
    }

    /// 常数体数据: 原始天花板 (argmax) 处处为 0.
    #[test]
    fn test_constant_volume_ceiling() {
        let volume = OctVolume::new(Array3::from_elem((5, 4, 3), 1.0));
        let top = Array2::from_elem((4, 3), true);
        let c = ceiling(&volume, top.view(), 0.0).unwrap();
        assert!(c.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_ceiling_background_and_smoothing() {
        let mut volume = OctVolume::new(Array3::zeros((10, 1, 4)));
        for y in 0..4 {
            volume[(2 * y, 0, y)] = 1.0;
        }
        let top = array![[true, true, true, false]];
        let c = ceiling(&volume, top.view(), 0.0).unwrap();
        assert_eq!(c, array![[0, 2, 4, 10]]);

        // 平滑后掩膜外的列仍然是底部; 掩膜内的值不超过底部.
        let c = ceiling(&volume, top.view(), 1.0).unwrap();
        assert_eq!(c[(0, 3)], 10);
        assert!(c.iter().all(|&v| v <= 10));

        let wrong = Array2::from_elem((2, 2), true);
        assert!(matches!(
            ceiling(&volume, wrong.view(), 0.0),
            Err(PrepareError::TopViewShape { .. })
        ));
    }

    /// 3x3 截面, 深度 5, 仅在列 (1, 1) 深度 2 处有亮点: 体掩膜只覆盖该列深度 2 及以下.
    #[test]
    fn test_single_bright_voxel() {
        let mut data = Array3::<f32>::zeros((5, 3, 3));
        data[(2, 1, 1)] = 10.0;
        let prepared = prepare(OctVolume::new(data), &no_smoothing()).unwrap();

        let expect_top = Array2::from_shape_fn((3, 3), |p| p == (1, 1));
        assert_eq!(prepared.top_view_mask, expect_top);
        for ((d, x, y), &m) in prepared.mask.data().indexed_iter() {
            assert_eq!(m, (x, y) == (1, 1) && d >= 2, "at {:?}", (d, x, y));
        }
    }
}
