//! 单通道二维图像.

use ndarray::{Array2, ArrayView2};
use std::ops::{Index, IndexMut};

use crate::{Idx2d, ShapeMismatch};

/// 图像存储位深.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BitDepth {
    /// 8-bit 无符号整数.
    U8,

    /// 16-bit 无符号整数.
    U16,

    /// 32-bit 浮点.
    F32,
}

impl BitDepth {
    /// 整数位深的最大值. 浮点返回 `None`.
    #[inline]
    pub fn max_value(self) -> Option<f32> {
        match self {
            Self::U8 => Some(u8::MAX as f32),
            Self::U16 => Some(u16::MAX as f32),
            Self::F32 => None,
        }
    }

    /// 是否为整数位深?
    #[inline]
    pub fn is_integer(self) -> bool {
        self != Self::F32
    }

    /// 把任意浮点值转换为该位深可存储的值: 整数位深四舍五入并截断到可表示范围.
    #[inline]
    pub fn quantize(self, v: f32) -> f32 {
        match self.max_value() {
            Some(_) if v.is_nan() => 0.0,
            Some(max) => num::clamp(v.round(), 0.0, max),
            None => v,
        }
    }
}

/// 单通道二维图像, 按照 `(h, w)` 索引, 值以 `f32` 保存, 同时记录其存储位深.
///
/// 对整数位深, 所有值应当已经是可表示的整数; 修改像素后可调用 [`Plane::quantize`] 恢复该性质.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    data: Array2<f32>,
    depth: BitDepth,
}

impl Index<Idx2d> for Plane {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for Plane {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl Plane {
    /// 创建. 对整数位深, 数据会被量化.
    pub fn new(data: Array2<f32>, depth: BitDepth) -> Self {
        let mut plane = Self { data, depth };
        plane.quantize();
        plane
    }

    /// 全零图像.
    pub fn zeros((h, w): Idx2d, depth: BitDepth) -> Self {
        Self {
            data: Array2::zeros((h, w)),
            depth,
        }
    }

    /// 形状 `(h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 位深.
    #[inline]
    pub fn bit_depth(&self) -> BitDepth {
        self.depth
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    /// 按照位深重新量化全部像素.
    pub fn quantize(&mut self) {
        let depth = self.depth;
        if depth.is_integer() {
            self.data.mapv_inplace(|v| depth.quantize(v));
        }
    }

    /// 以同样位深替换数据 (会被量化).
    pub fn with_data(&self, data: Array2<f32>) -> Self {
        Self::new(data, self.depth)
    }

    fn check_shape(&self, found: Idx2d) -> Result<(), ShapeMismatch<Idx2d>> {
        if self.shape() != found {
            return Err(ShapeMismatch {
                expected: self.shape(),
                found,
            });
        }
        Ok(())
    }

    /// ImageJ "Subtract create": 逐像素 `self - other`, 整数位深截断到 `>= 0`.
    pub fn subtract(&self, other: &Plane) -> Result<Plane, ShapeMismatch<Idx2d>> {
        self.check_shape(other.shape())?;
        Ok(self.with_data(&self.data - &other.data))
    }

    /// 将 `keep` 为 `false` 的像素置为 0.
    pub fn clear_outside(&mut self, keep: ArrayView2<bool>) -> Result<(), ShapeMismatch<Idx2d>> {
        self.check_shape(keep.dim())?;
        ndarray::Zip::from(&mut self.data)
            .and(keep)
            .for_each(|v, &k| {
                if !k {
                    *v = 0.0;
                }
            });
        Ok(())
    }
}
