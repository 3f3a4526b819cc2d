//! 二维二值形态学操作.
//!
//! 结构元以 "每行半宽" 的方式保存: 第 `dy` 行覆盖 `[-half_width, +half_width]`.
//! 因此每次膨胀/腐蚀只需对每行做一次前缀和, 复杂度为 `O(H * W * (2r + 1))`.
//!
//! 图像范围外的邻居一律忽略: 膨胀不会从边界外 "长入" 前景, 腐蚀也不会从边界外 "侵蚀" 前景.

use ndarray::{Array2, ArrayView2, Axis};

/// 关于中心对称, 且每行连续的结构元.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Footprint {
    /// 第 `i` 个元素对应行偏移 `i - radius` 的半宽.
    half_widths: Vec<usize>,
}

impl Footprint {
    /// 半径为 `radius` 的圆盘, 包含所有满足 `dx² + dy² <= radius²` 的整数偏移.
    ///
    /// 半径为 0 时仅包含中心点, 此时所有形态学操作都是恒等变换.
    pub fn disk(radius: usize) -> Self {
        let r2 = radius * radius;
        let half_widths = (0..=2 * radius)
            .map(|i| {
                let dy = i.abs_diff(radius);
                let rest = r2 - dy * dy;
                let mut dx = (rest as f64).sqrt() as usize;
                // 修正浮点误差.
                while dx * dx > rest {
                    dx -= 1;
                }
                while (dx + 1) * (dx + 1) <= rest {
                    dx += 1;
                }
                dx
            })
            .collect();
        Self { half_widths }
    }

    /// 结构元的行半径.
    #[inline]
    pub fn radius(&self) -> usize {
        self.half_widths.len() / 2
    }

    /// 结构元包含的偏移个数.
    pub fn size(&self) -> usize {
        self.half_widths.iter().map(|w| 2 * w + 1).sum()
    }

    /// 结构元是否包含偏移 `(dy, dx)`?
    pub fn contains(&self, dy: isize, dx: isize) -> bool {
        let r = self.radius() as isize;
        if dy < -r || dy > r {
            return false;
        }
        dx.unsigned_abs() <= self.half_widths[(dy + r) as usize]
    }
}

/// 逐行前缀和. 第 `h` 行的 `prefix[w]` 是该行 `[0, w)` 中前景像素的个数.
fn row_prefix_counts(mask: ArrayView2<bool>) -> Array2<u32> {
    let (h, w) = mask.dim();
    let mut prefix = Array2::<u32>::zeros((h, w + 1));
    for (row, mut out) in mask.axis_iter(Axis(0)).zip(prefix.axis_iter_mut(Axis(0))) {
        let mut acc = 0u32;
        for (i, &v) in row.iter().enumerate() {
            acc += v as u32;
            out[i + 1] = acc;
        }
    }
    prefix
}

/// 计算每个像素在结构元覆盖的 (图像内) 邻域中, 前景个数与邻居个数.
/// `accept(foreground, total)` 决定输出像素.
fn rank_op<F>(mask: ArrayView2<bool>, footprint: &Footprint, accept: F) -> Array2<bool>
where
    F: Fn(u32, u32) -> bool,
{
    let (h, w) = mask.dim();
    let prefix = row_prefix_counts(mask);
    let r = footprint.radius() as isize;
    Array2::from_shape_fn((h, w), |(y, x)| {
        let mut fg = 0u32;
        let mut total = 0u32;
        for (i, &hw) in footprint.half_widths.iter().enumerate() {
            let yy = y as isize + i as isize - r;
            if yy < 0 || yy >= h as isize {
                continue;
            }
            let lo = x.saturating_sub(hw);
            let hi = (x + hw + 1).min(w);
            let row = yy as usize;
            fg += prefix[(row, hi)] - prefix[(row, lo)];
            total += (hi - lo) as u32;
        }
        accept(fg, total)
    })
}

/// 二值膨胀: 邻域内存在前景即为前景.
pub fn dilation(mask: ArrayView2<bool>, footprint: &Footprint) -> Array2<bool> {
    rank_op(mask, footprint, |fg, _| fg > 0)
}

/// 二值腐蚀: 邻域内全部为前景才为前景.
pub fn erosion(mask: ArrayView2<bool>, footprint: &Footprint) -> Array2<bool> {
    rank_op(mask, footprint, |fg, total| fg == total)
}

/// 闭运算 (膨胀 -> 腐蚀), 用于填补小孔洞.
pub fn closing(mask: ArrayView2<bool>, footprint: &Footprint) -> Array2<bool> {
    erosion(dilation(mask, footprint).view(), footprint)
}

/// 开运算 (腐蚀 -> 膨胀), 用于去除小孤岛.
pub fn opening(mask: ArrayView2<bool>, footprint: &Footprint) -> Array2<bool> {
    dilation(erosion(mask, footprint).view(), footprint)
}

/// 先去孔洞, 再去孤岛.
pub fn remove_holes_and_islands(mask: ArrayView2<bool>, footprint: &Footprint) -> Array2<bool> {
    opening(closing(mask, footprint).view(), footprint)
}
