//! 传递函数: 标量 -> 颜色与不透明度.

use crate::colormap::jet;
use image::Rgb;

/// jet 色图 + 分段线性不透明度斜坡.
///
/// 不透明度控制点在 `[min, max]` 上等距分布; 合成到黑色背景上, 即颜色乘以不透明度.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransferFunction {
    min: f32,
    max: f32,
    opacity: [f32; 4],
}

impl TransferFunction {
    /// 以标量范围 `[min, max]` 与不透明度控制点创建.
    ///
    /// `min > max` 或存在非有限值时返回 `None`.
    pub fn new(min: f32, max: f32, opacity: [f32; 4]) -> Option<Self> {
        if !(min.is_finite() && max.is_finite()) || min > max {
            return None;
        }
        Some(Self {
            min,
            max,
            opacity: opacity.map(|a| a.clamp(0.0, 1.0)),
        })
    }

    /// 标量范围.
    #[inline]
    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    /// 归一化到 `[0, 1]`. 范围退化时返回 0.
    #[inline]
    pub fn normalize(&self, v: f32) -> f32 {
        if self.max > self.min {
            ((v - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// 归一化标量 `t` 处的不透明度.
    pub fn alpha(&self, t: f32) -> f32 {
        let segments = (self.opacity.len() - 1) as f32;
        let pos = t.clamp(0.0, 1.0) * segments;
        let i = (pos.floor() as usize).min(self.opacity.len() - 2);
        let frac = pos - i as f32;
        self.opacity[i] + (self.opacity[i + 1] - self.opacity[i]) * frac
    }

    /// 标量 `v` 合成到黑色背景后的像素颜色.
    pub fn shade(&self, v: f32) -> Rgb<u8> {
        let t = self.normalize(v);
        let alpha = self.alpha(t);
        Rgb(jet(t).map(|c| (c * alpha * 255.0).round().clamp(0.0, 255.0) as u8))
    }
}
