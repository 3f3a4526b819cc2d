//! ImageJ "Subtract Background" 的滚球算法 (暗背景, 不使用抛物面).
//!
//! 背景的计算分为四步:
//! 1. 3x3 均值预平滑 (先沿 x, 再沿 y, 边缘复制);
//! 2. 按块最小值缩小 (缩小倍数由半径决定);
//! 3. 在缩小的图像下方 "滚动" 小球, 即以球面为结构函数的灰度开运算;
//! 4. 双线性插值放大回原尺寸.
//!
//! 预平滑可能使背景高于原图, 因此最后将背景截断为不超过原图.

use super::plane::Plane;
use crate::{Idx2d, ShapeMismatch};
use ndarray::{Array2, ArrayView2, Axis};

/// 滚球. 半径较大时会先缩小图像, 球也按同样的倍数缩小.
#[derive(Clone, Debug, PartialEq)]
pub struct RollingBall {
    radius: f64,
    shrink_factor: usize,
    half_width: usize,
    /// `width * width` 的球面高度, 行主序.
    z: Vec<f32>,
}

impl RollingBall {
    /// 构建半径为 `radius` 的滚球.
    pub fn new(radius: f64) -> Self {
        let (shrink_factor, arc_trim_per) = match radius {
            r if r <= 10.0 => (1usize, 24usize),
            r if r <= 30.0 => (2, 24),
            r if r <= 100.0 => (4, 32),
            _ => (8, 40),
        };
        let small_radius = (radius / shrink_factor as f64).max(1.0);
        let r2 = small_radius * small_radius;
        let x_trim = ((arc_trim_per as f64 * small_radius) as i64 / 100) as f64;
        let half_width = (small_radius - x_trim).round().max(0.0) as usize;
        let width = 2 * half_width + 1;
        let hw = half_width as f64;

        let mut z = Vec::with_capacity(width * width);
        for y in 0..width {
            for x in 0..width {
                let (dx, dy) = (x as f64 - hw, y as f64 - hw);
                let t = r2 - dx * dx - dy * dy;
                z.push(if t > 0.0 { t.sqrt() as f32 } else { 0.0 });
            }
        }
        Self {
            radius,
            shrink_factor,
            half_width,
            z,
        }
    }

    /// 半径.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// 图像缩小倍数.
    #[inline]
    pub fn shrink_factor(&self) -> usize {
        self.shrink_factor
    }

    /// 球的宽度 (像素), 总是奇数.
    #[inline]
    pub fn width(&self) -> usize {
        2 * self.half_width + 1
    }

    /// 相对球心偏移 `(dy, dx)` 处的球面高度. 偏移的绝对值不得超过半宽.
    #[inline]
    fn height_at(&self, dy: isize, dx: isize) -> f32 {
        let hw = self.half_width as isize;
        self.z[((dy + hw) as usize) * self.width() + (dx + hw) as usize]
    }

    /// 以球面为结构函数的灰度开运算. 球心可以位于图像外, 此时只考虑图像内的部分.
    fn roll(&self, img: ArrayView2<f32>) -> Array2<f32> {
        let (h, w) = img.dim();
        let r = self.half_width as isize;
        let (hi, wi) = (h as isize, w as isize);
        let mut out = Array2::from_elem((h, w), f32::MIN);

        for cy in -r..hi + r {
            let (y0, y1) = ((cy - r).max(0), (cy + r).min(hi - 1));
            for cx in -r..wi + r {
                let (x0, x1) = ((cx - r).max(0), (cx + r).min(wi - 1));
                if y0 > y1 || x0 > x1 {
                    continue;
                }

                let mut z = f32::MAX;
                for y in y0..=y1 {
                    for x in x0..=x1 {
                        let reduced = img[(y as usize, x as usize)] - self.height_at(y - cy, x - cx);
                        if reduced < z {
                            z = reduced;
                        }
                    }
                }
                for y in y0..=y1 {
                    for x in x0..=x1 {
                        let added = z + self.height_at(y - cy, x - cx);
                        let o = &mut out[(y as usize, x as usize)];
                        if added > *o {
                            *o = added;
                        }
                    }
                }
            }
        }
        out
    }
}

/// 沿 `axis` 做 3 点均值, 边缘复制.
fn mean3_along(img: &mut Array2<f32>, axis: Axis) {
    for mut lane in img.lanes_mut(axis) {
        let n = lane.len();
        if n == 0 {
            continue;
        }
        let mut v3 = lane[0];
        let mut v2 = v3;
        for i in 0..n {
            let v1 = v2;
            v2 = v3;
            if i + 1 < n {
                v3 = lane[i + 1];
            }
            lane[i] = (v1 + v2 + v3) * 0.333_333_33;
        }
    }
}

/// 3x3 均值平滑.
fn presmooth(img: &mut Array2<f32>) {
    mean3_along(img, Axis(1));
    mean3_along(img, Axis(0));
}

/// 以 `factor x factor` 块的最小值缩小. 边缘不完整的块只统计图像内的像素.
fn shrink(img: ArrayView2<f32>, factor: usize) -> Array2<f32> {
    let (h, w) = img.dim();
    let (sh, sw) = ((h + factor - 1) / factor, (w + factor - 1) / factor);
    Array2::from_shape_fn((sh, sw), |(sy, sx)| {
        let ys = sy * factor..((sy + 1) * factor).min(h);
        let mut min = f32::MAX;
        for y in ys {
            for x in sx * factor..((sx + 1) * factor).min(w) {
                min = min.min(img[(y, x)]);
            }
        }
        min
    })
}

/// 放大时每个原图坐标对应的小图索引 `i` 与权重 (`i` 的权重为 `w`, `i + 1` 的权重为 `1 - w`).
fn interpolation_table(len: usize, small_len: usize, factor: usize) -> Vec<(usize, usize, f32)> {
    let factor_i = factor as i64;
    (0..len)
        .map(|i| {
            let mut idx = (i as i64 - factor_i / 2) / factor_i;
            if idx >= small_len as i64 - 1 {
                idx = small_len as i64 - 2;
            }
            let idx = idx.max(0) as usize;
            let next = (idx + 1).min(small_len - 1);
            let distance = (i as f32 + 0.5) / factor as f32 - (idx as f32 + 0.5);
            (idx, next, 1.0 - distance)
        })
        .collect()
}

/// 双线性插值放大到 `(h, w)`.
fn enlarge(small: ArrayView2<f32>, (h, w): (usize, usize), factor: usize) -> Array2<f32> {
    let (sh, sw) = small.dim();
    let xs = interpolation_table(w, sw, factor);
    let ys = interpolation_table(h, sh, factor);
    let rows = Array2::from_shape_fn((sh, w), |(sy, x)| {
        let (i, j, wt) = xs[x];
        small[(sy, i)] * wt + small[(sy, j)] * (1.0 - wt)
    });
    Array2::from_shape_fn((h, w), |(y, x)| {
        let (i, j, wt) = ys[y];
        rows[(i, x)] * wt + rows[(j, x)] * (1.0 - wt)
    })
}

/// 求滚球背景 (ImageJ "create background"), 结果按图像位深量化.
pub fn rolling_ball_background(plane: &Plane, radius: f64) -> Plane {
    let (h, w) = plane.shape();
    if h == 0 || w == 0 {
        return plane.clone();
    }
    let ball = RollingBall::new(radius);
    let factor = ball.shrink_factor();

    let mut smoothed = plane.data().to_owned();
    presmooth(&mut smoothed);

    let mut background = if factor > 1 {
        let small = shrink(smoothed.view(), factor);
        let rolled = ball.roll(small.view());
        enlarge(rolled.view(), (h, w), factor)
    } else {
        ball.roll(smoothed.view())
    };

    ndarray::Zip::from(&mut background)
        .and(plane.data())
        .for_each(|b, &v| {
            if *b > v {
                *b = v;
            }
        });
    plane.with_data(background)
}

/// 扣除滚球背景: `plane - background`, 整数位深截断到 `>= 0`.
pub fn subtract_background(plane: &Plane, radius: f64) -> Result<Plane, ShapeMismatch<Idx2d>> {
    let background = rolling_ball_background(plane, radius);
    plane.subtract(&background)
}
