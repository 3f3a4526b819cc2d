#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供 OCT 3D 体数据的组织掩膜生成、体渲染, 以及多通道显微图像
//! 批处理 (背景扣除、降噪、ROI 测量) 的基础算法.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 体数据统一按照 `(depth, x, y)` 索引, 第一维是 OCT 的深度方向 (A-scan 方向).
//!   二维图像统一按照 `(h, w)` 索引.
//! 2. 数值核心 (高斯滤波、形态学、Chan–Vese、滚球背景等) 由本库自行实现,
//!   其语义分别对齐 scipy / scikit-image / ImageJ 的对应实现.
//!
//! # 开发计划
//!
//! ### 示例数据下载 ✅
//!
//! 已存在的文件不会触发任何网络请求. 单个文件失败不影响其余文件.
//!
//! 实现位于 `oct-berry/src/dataset/fetch.rs`.
//!
//! ### npz 体数据读写 ✅
//!
//! 支持任意数值类型的 3D 数组读取 (统一转换为 `f32`), 以及布尔体掩膜的压缩写入.
//!
//! 实现位于 `oct-berry/src/dataset/npz_database.rs`.
//!
//! ### 高斯滤波 & 二值形态学 ✅
//!
//! 任意维度可分离高斯滤波 (reflect 边界), 圆盘结构元的膨胀/腐蚀/开闭运算.
//!
//! 实现位于 `oct-berry/src/filter` 与 `oct-berry/src/morph.rs`.
//!
//! ### Chan–Vese 分割 & Otsu 阈值 ✅
//!
//! 实现位于 `oct-berry/src/segment`.
//!
//! ### 体掩膜生成流程 ✅
//!
//! 最大强度投影 -> 顶视掩膜 -> 去孔洞/去孤岛 -> 天花板高度图 -> 3D 体掩膜.
//!
//! 实现位于 `oct-berry/src/mask`.
//!
//! ### 最大强度投影体渲染 ✅
//!
//! 正交相机光线投射, jet 色图与不透明度斜坡. 支持交互视图与旋转动画帧序列.
//!
//! 实现位于 `oct-berry/src/render`.
//!
//! ### 显微图像批处理 ✅
//!
//! 1. 多通道 TIFF 读写. ✅
//! 2. 滚球背景扣除、圆形中值滤波、高斯模糊. ✅
//! 3. ImageJ ROI zip 解析、ROI 掩膜、Otsu 二值化与逐 ROI 测量. ✅
//! 4. 结果表导出 CSV. ✅
//!
//! 实现位于 `oct-berry/src/fiji`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 根据 `rayon` feature 选择并行或串行地执行 `ndarray::Zip::for_each`.
macro_rules! zip_for_each {
    ($zip: expr, $op: expr) => {{
        #[cfg(feature = "rayon")]
        {
            $zip.par_for_each($op)
        }
        #[cfg(not(feature = "rayon"))]
        {
            $zip.for_each($op)
        }
    }};
}

/// 3D OCT 体数据与体掩膜的基础数据结构.
mod data;

pub use data::{
    colormap, CeilingPlot, ImgWriteVis, IntensityWindow, OctVolume, ShapeMismatch, TopViewPlot,
    VolumeMask,
};

pub mod consts;

pub mod dataset;

pub mod filter;

pub mod morph;

pub mod segment;

pub mod mask;

pub mod render;

pub mod fiji;

pub mod prelude;
