use std::fmt;
use std::ops::{Index, IndexMut, Range};
use std::path::Path;

use ndarray::{Array2, Array3, ArrayView1, ArrayView3, Axis, Zip};

use crate::dataset::{NpzArchive, OpenArchiveError};
use crate::filter::gaussian_filter;
use crate::{Idx2d, Idx3d};

pub mod colormap;
mod save;
mod window;

pub use save::{CeilingPlot, ImgWriteVis, TopViewPlot};
pub use window::IntensityWindow;

/// 两个数组形状不一致. 默认为 3D 形状, 平面图像使用 `ShapeMismatch<Idx2d>`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("shape mismatch: expected {expected:?}, found {found:?}")]
pub struct ShapeMismatch<I: fmt::Debug = Idx3d> {
    /// 期望形状.
    pub expected: I,

    /// 实际形状.
    pub found: I,
}

/// 3D OCT 体数据. 按照 `(depth, x, y)` 索引, 值以 `f32` 保存.
///
/// 第一维为深度方向: 索引越大越 "深", 组织表面位于某个较小的深度索引处.
/// 每个 `(x, y)` 对应一条沿深度方向的 "列".
#[derive(Debug, Clone, PartialEq)]
pub struct OctVolume {
    data: Array3<f32>,
}

impl Index<Idx3d> for OctVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for OctVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl From<Array3<f32>> for OctVolume {
    #[inline]
    fn from(data: Array3<f32>) -> Self {
        Self::new(data)
    }
}

impl OctVolume {
    /// 直接由 `(depth, x, y)` 数组创建.
    #[inline]
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }

    /// 从 npz 文件 `path` 中读取字段 `key` 对应的 3D 数组.
    ///
    /// 任意数值类型都会被转换为 `f32`.
    pub fn open<P: AsRef<Path>>(path: P, key: &str) -> Result<Self, OpenArchiveError> {
        let archive = NpzArchive::open(path)?;
        Ok(Self::new(archive.volume_by_name(key)?))
    }

    /// 形状 `(depth, x, y)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 深度方向体素个数.
    #[inline]
    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// 顶视 (列) 平面的形状 `(x, y)`.
    #[inline]
    pub fn column_shape(&self) -> Idx2d {
        let (_, x, y) = self.shape();
        (x, y)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 有限值中的最小值与最大值. 不存在有限值时返回 `None`.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let (lo, hi) = self
            .data
            .iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        (lo <= hi).then_some((lo, hi))
    }

    /// 就地高斯平滑. `sigma <= 0` 时不做处理.
    pub fn smooth(&mut self, sigma: f64) {
        gaussian_filter(&mut self.data, sigma);
    }

    /// 沿深度方向的最大强度投影, 形状为 `(x, y)`.
    pub fn max_projection(&self) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros(self.column_shape());
        zip_for_each!(
            Zip::from(&mut out).and(self.data.lanes(Axis(0))),
            |o: &mut f32, lane: ArrayView1<f32>| {
                *o = lane.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            }
        );
        out
    }

    /// 每一列沿深度方向最大值所在的 (首个) 索引, 形状为 `(x, y)`.
    ///
    /// 常数列的结果为 0.
    pub fn argmax_depth(&self) -> Array2<usize> {
        let mut out = Array2::<usize>::zeros(self.column_shape());
        zip_for_each!(
            Zip::from(&mut out).and(self.data.lanes(Axis(0))),
            |o: &mut usize, lane: ArrayView1<f32>| {
                let mut best = 0usize;
                let mut best_v = f32::NEG_INFINITY;
                for (i, &v) in lane.iter().enumerate() {
                    if v > best_v {
                        best_v = v;
                        best = i;
                    }
                }
                *o = best;
            }
        );
        out
    }

    /// 截断数值范围: 大于 `high` 的值置为 `high`, 小于 `low` 的值置为 `fill`.
    pub fn clamp(&mut self, low: f32, high: f32, fill: f32) {
        self.data.mapv_inplace(|v| {
            if v > high {
                high
            } else if v < low {
                fill
            } else {
                v
            }
        });
    }

    /// 将体掩膜之外的体素置为 `fill`.
    ///
    /// 若形状不一致则返回 `Err`, 且不修改数据.
    pub fn apply_mask(&mut self, mask: &VolumeMask, fill: f32) -> Result<(), ShapeMismatch> {
        if mask.shape() != self.shape() {
            return Err(ShapeMismatch {
                expected: self.shape(),
                found: mask.shape(),
            });
        }
        Zip::from(&mut self.data)
            .and(mask.data())
            .for_each(|v, &m| {
                if !m {
                    *v = fill;
                }
            });
        Ok(())
    }
}

/// 3D 布尔体掩膜, 与 [`OctVolume`] 同形. `true` 代表组织.
#[derive(Clone, PartialEq, Eq)]
pub struct VolumeMask {
    data: Array3<bool>,
}

impl fmt::Debug for VolumeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeMask")
            .field("shape", &self.shape())
            .field("count", &self.count())
            .finish()
    }
}

impl Index<Idx3d> for VolumeMask {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl VolumeMask {
    /// 直接由 `(depth, x, y)` 布尔数组创建.
    #[inline]
    pub fn new(data: Array3<bool>) -> Self {
        Self { data }
    }

    /// 由天花板高度图展开为体掩膜.
    ///
    /// 对于每一列 `(x, y)`, 深度索引 `ceiling[(x, y)]..depth` 为 `true`, 其余为 `false`.
    /// 因此当 `ceiling[(x, y)] >= depth` 时该列全为 `false`.
    pub fn from_ceiling(ceiling: &Array2<usize>, depth: usize) -> Self {
        let (nx, ny) = ceiling.dim();
        let mut data = Array3::from_elem((depth, nx, ny), false);
        zip_for_each!(
            Zip::from(data.lanes_mut(Axis(0))).and(ceiling),
            |mut lane: ndarray::ArrayViewMut1<bool>, &c: &usize| {
                lane.iter_mut().skip(c).for_each(|v| *v = true);
            }
        );
        Self { data }
    }

    /// 从 npz 文件 `path` 中读取字段 `key` 对应的布尔体掩膜.
    pub fn open<P: AsRef<Path>>(path: P, key: &str) -> Result<Self, OpenArchiveError> {
        let archive = NpzArchive::open(path)?;
        Ok(Self::new(archive.mask_by_name(key)?))
    }

    /// 以压缩 npz 格式保存到 `path`, 字段名为 `key`.
    pub fn save<P: AsRef<Path>>(&self, path: P, key: &str) -> Result<(), OpenArchiveError> {
        NpzArchive::write_mask(path, key, &self.data)
    }

    /// 形状 `(depth, x, y)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, bool> {
        self.data.view()
    }

    /// 组织体素个数.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// 列 `(x, y)` 中为 `true` 的深度索引范围.
    ///
    /// 若该列不是 "从某深度到底部" 的连续后缀, 或全为 `false`, 返回 `None`.
    pub fn column_suffix(&self, (x, y): Idx2d) -> Option<Range<usize>> {
        let col = self.data.slice(ndarray::s![.., x, y]);
        let depth = col.len();
        let start = col.iter().position(|v| *v)?;
        col.iter()
            .skip(start)
            .all(|v| *v)
            .then_some(start..depth)
    }
}
