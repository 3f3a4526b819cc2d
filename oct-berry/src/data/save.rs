//! 二维诊断图像的持久化存储.

use super::colormap::viridis_rgb8;
use super::IntensityWindow;
use crate::consts::gray::*;
use image::{GrayImage, ImageResult, Luma, Rgb, RgbImage};
use ndarray::{Array2, ArrayView2};
use std::path::Path;

/// 拼图中相邻面板之间的间隔 (像素).
const GAP: u32 = 8;

/// 颜色条宽度 (像素).
const COLOR_BAR_WIDTH: u32 = 24;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// `ImgWriteVis` trait 的意图是, 图像将以 "可视化友好" 的方式保存, 而不是 "as is" 的方式.
/// 这意味着, 对于布尔掩膜, 前景/背景会映射为白色/黑色; 对于浮点强度图,
/// 会用覆盖全部有限值的 [`IntensityWindow`] 规范化.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

fn mask_to_gray(mask: ArrayView2<bool>) -> GrayImage {
    let (height, width) = mask.dim();
    let mut buf = GrayImage::new(width as u32, height as u32);
    for ((h, w), &m) in mask.indexed_iter() {
        let pix = if m { BINARY_FOREGROUND } else { BINARY_BACKGROUND };
        buf.put_pixel(w as u32, h as u32, Luma([pix]));
    }
    buf
}

fn intensity_to_gray(data: ArrayView2<f32>, window: Option<IntensityWindow>) -> GrayImage {
    let (height, width) = data.dim();
    let mut buf = GrayImage::new(width as u32, height as u32);
    let Some(window) = window.or_else(|| IntensityWindow::covering(data.iter())) else {
        return buf;
    };
    for ((h, w), &v) in data.indexed_iter() {
        let gray = window.eval(v).unwrap_or(BLACK);
        buf.put_pixel(w as u32, h as u32, Luma([gray]));
    }
    buf
}

macro_rules! impl_mask_vis {
    ($($mask: ty),+) => {
        $(
            /// 前景为白色, 背景为黑色.
            impl ImgWriteVis for $mask {
                fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    mask_to_gray(self.view()).save(path)
                }
            }
        )+
    };
}

macro_rules! impl_intensity_vis {
    ($($img: ty),+) => {
        $(
            /// 以覆盖全部有限值的窗口线性映射为灰度. 非有限值为黑色.
            impl ImgWriteVis for $img {
                fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    intensity_to_gray(self.view(), None).save(path)
                }
            }
        )+
    };
}

impl_mask_vis!(Array2<bool>, ArrayView2<'_, bool>);
impl_intensity_vis!(Array2<f32>, ArrayView2<'_, f32>);

/// 顶视掩膜诊断图: 左侧为最大强度投影 (窗口为 `[0, max]`), 右侧为顶视掩膜.
#[derive(Copy, Clone, Debug)]
pub struct TopViewPlot<'a> {
    /// 最大强度投影.
    pub projection: ArrayView2<'a, f32>,

    /// 顶视掩膜, 与投影同形.
    pub mask: ArrayView2<'a, bool>,
}

impl ImgWriteVis for TopViewPlot<'_> {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let max = self
            .projection
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f32::NEG_INFINITY, f32::max);
        let left = intensity_to_gray(self.projection, IntensityWindow::from_bounds(0.0, max));
        let right = mask_to_gray(self.mask);
        let width = left.width() + GAP + right.width();
        let height = left.height().max(right.height());
        let mut buf = RgbImage::from_pixel(width, height, Rgb([WHITE; 3]));
        for (x, y, &Luma([g])) in left.enumerate_pixels() {
            buf.put_pixel(x, y, Rgb([g; 3]));
        }
        let offset = left.width() + GAP;
        for (x, y, &Luma([g])) in right.enumerate_pixels() {
            buf.put_pixel(offset + x, y, Rgb([g; 3]));
        }
        buf.save(path)
    }
}

/// 天花板高度图诊断图: 以 `|ceiling - depth|` (组织表面距离底部的深度) 着色,
/// 右侧附带颜色条 (上端为最大值).
#[derive(Copy, Clone, Debug)]
pub struct CeilingPlot<'a> {
    /// 天花板高度图.
    pub ceiling: ArrayView2<'a, usize>,

    /// 体数据深度.
    pub depth: usize,
}

impl ImgWriteVis for CeilingPlot<'_> {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.ceiling.dim();
        let inverted = self.ceiling.mapv(|c| c.abs_diff(self.depth));
        let max = inverted.iter().copied().max().unwrap_or(0).max(1) as f32;

        let total_width = width as u32 + GAP + COLOR_BAR_WIDTH;
        let mut buf = RgbImage::from_pixel(total_width, height as u32, Rgb([WHITE; 3]));
        for ((h, w), &v) in inverted.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, viridis_rgb8(v as f32 / max));
        }

        let bar_x = width as u32 + GAP;
        let denom = height.saturating_sub(1).max(1) as f32;
        for h in 0..height as u32 {
            let color = viridis_rgb8(1.0 - h as f32 / denom);
            for x in bar_x..total_width {
                buf.put_pixel(x, h, color);
            }
        }
        buf.save(path)
    }
}
