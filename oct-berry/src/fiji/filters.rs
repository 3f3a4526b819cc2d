//! ImageJ 风格的平面滤波: 圆形邻域中值滤波与高斯模糊.
//!
//! 两者的边界处理均为复制边缘像素, 整数位深的结果四舍五入.

use super::plane::{BitDepth, Plane};
use ndarray::{Array2, ArrayView1, ArrayViewMut1, Axis, Zip};
use ordered_float::OrderedFloat;

/// 半径为 `radius` 的圆形邻域, 以每一行 `(dy, dx_max)` 表示, 该行包含 `-dx_max..=dx_max`.
///
/// 与 ImageJ `RankFilters` 的核形状一致, 例如半径 2 时共 21 个像素.
pub fn circular_kernel(radius: f64) -> Vec<(isize, isize)> {
    let radius = match radius {
        r if (1.5..1.75).contains(&r) => 1.75,
        r if (2.5..2.85).contains(&r) => 2.85,
        r => r.max(0.0),
    };
    let r2 = (radius * radius) as i64 + 1;
    let k_radius = ((r2 as f64) + 1e-10).sqrt() as i64;
    (-k_radius..=k_radius)
        .map(|dy| {
            let dx = if dy == 0 {
                k_radius
            } else {
                ((r2 - dy * dy) as f64 + 1e-10).sqrt() as i64
            };
            (dy as isize, dx as isize)
        })
        .collect()
}

#[inline]
fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// 圆形邻域中值滤波.
pub fn median(plane: &Plane, radius: f64) -> Plane {
    let (h, w) = plane.shape();
    if h == 0 || w == 0 {
        return plane.clone();
    }
    let kernel = circular_kernel(radius);
    let n = kernel.iter().map(|&(_, dx)| (2 * dx + 1) as usize).sum::<usize>();
    let src = plane.data();

    let mut out = Array2::<f32>::zeros((h, w));
    zip_for_each!(Zip::indexed(&mut out), |(y, x), o: &mut f32| {
        let mut values: Vec<OrderedFloat<f32>> = Vec::with_capacity(n);
        for &(dy, dx_max) in &kernel {
            let yy = clamp_index(y as isize + dy, h);
            for dx in -dx_max..=dx_max {
                let xx = clamp_index(x as isize + dx, w);
                values.push(OrderedFloat(src[(yy, xx)]));
            }
        }
        let mid = values.len() / 2;
        let (_, m, _) = values.select_nth_unstable(mid);
        *o = m.0;
    });
    plane.with_data(out)
}

/// ImageJ 的核截断精度: 8-bit 图像较粗, 其余较细.
#[inline]
fn kernel_accuracy(depth: BitDepth) -> f64 {
    match depth {
        BitDepth::U8 => 0.002,
        _ => 0.0002,
    }
}

/// 单侧归一化的高斯核 `k[0..radius]`, 完整核为 `k[radius-1], ..., k[0], ..., k[radius-1]`.
///
/// `max_radius` 为所在方向的长度 (不足 50 时按 50 计).
pub fn gaussian_kernel(sigma: f64, accuracy: f64, max_radius: usize) -> Vec<f32> {
    let max_radius = max_radius.max(50);
    let k_radius = ((sigma * (-2.0 * accuracy.ln()).sqrt()).ceil() as usize + 1).min(max_radius);
    let mut kernel: Vec<f32> = (0..k_radius)
        .map(|i| (-0.5 * (i * i) as f64 / sigma / sigma).exp() as f32)
        .collect();

    // 尾部改为抛物线, 使核平滑地降到 0.
    if k_radius < max_radius && k_radius > 3 {
        let mut sqrt_slope = f64::MAX;
        let mut r = k_radius;
        while r > k_radius / 2 {
            r -= 1;
            let a = f64::from(kernel[r]).sqrt() / (k_radius - r) as f64;
            if a < sqrt_slope {
                sqrt_slope = a;
            } else {
                break;
            }
        }
        for r1 in r + 2..k_radius {
            let d = (k_radius - r1) as f64;
            kernel[r1] = (d * d * sqrt_slope * sqrt_slope) as f32;
        }
    }

    let sum = if k_radius < max_radius {
        f64::from(kernel[0]) + kernel[1..].iter().map(|&k| 2.0 * f64::from(k)).sum::<f64>()
    } else {
        sigma * (2.0 * std::f64::consts::PI).sqrt()
    };
    kernel.iter().map(|&k| (f64::from(k) / sum) as f32).collect()
}

fn convolve_lane(src: ArrayView1<f32>, mut dst: ArrayViewMut1<f32>, kernel: &[f32]) {
    let n = src.len();
    for i in 0..n {
        let mut acc = src[i] * kernel[0];
        for (k, &weight) in kernel.iter().enumerate().skip(1) {
            let k = k as isize;
            let left = src[clamp_index(i as isize - k, n)];
            let right = src[clamp_index(i as isize + k, n)];
            acc += weight * (left + right);
        }
        dst[i] = acc;
    }
}

fn blur_along(data: &Array2<f32>, axis: Axis, sigma: f64, accuracy: f64) -> Array2<f32> {
    let kernel = gaussian_kernel(sigma, accuracy, data.len_of(axis));
    let mut out = Array2::zeros(data.dim());
    for (src, dst) in data.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        convolve_lane(src, dst, &kernel);
    }
    out
}

/// ImageJ "Gaussian Blur" (σ 以像素计, x 与 y 相同).
///
/// `sigma <= 0` 时原样返回.
pub fn gaussian_blur(plane: &Plane, sigma: f64) -> Plane {
    let (h, w) = plane.shape();
    if sigma <= 0.0 || h == 0 || w == 0 {
        return plane.clone();
    }
    let accuracy = kernel_accuracy(plane.bit_depth());
    let data = plane.data().to_owned();
    let blurred = blur_along(&data, Axis(1), sigma, accuracy);
    let blurred = blur_along(&blurred, Axis(0), sigma, accuracy);
    plane.with_data(blurred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn kernel_size(radius: f64) -> usize {
        circular_kernel(radius)
            .iter()
            .map(|&(_, dx)| (2 * dx + 1) as usize)
            .sum()
    }

    #[test]
    fn test_circular_kernel() {
        assert_eq!(kernel_size(0.5), 5);
        assert_eq!(kernel_size(1.0), 9);
        assert_eq!(kernel_size(2.0), 21);
        assert_eq!(circular_kernel(2.0), vec![(-2, 1), (-1, 2), (0, 2), (1, 2), (2, 1)]);
    }

    #[test]
    fn test_median_removes_outlier() {
        let mut data = Array2::zeros((7, 7));
        data[(3, 3)] = 255.0;
        let plane = Plane::new(data, BitDepth::U8);
        let filtered = median(&plane, 2.0);
        assert!(filtered.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_median_keeps_ramp() {
        let data = Array2::from_shape_fn((6, 9), |(_, x)| (x * 10) as f32);
        let plane = Plane::new(data, BitDepth::U16);
        let filtered = median(&plane, 2.0);
        for y in 0..6 {
            for x in 2..7 {
                assert_eq!(filtered[(y, x)], plane[(y, x)]);
            }
        }
        // 左边缘复制后 21 个值中有 13 个为 0.
        assert_eq!(filtered[(3, 0)], 0.0);
    }

    #[test]
    fn test_gaussian_kernel() {
        let k = gaussian_kernel(0.5, 0.0002, 100);
        assert_eq!(k.len(), 4);
        let total = k[0] + 2.0 * k[1..].iter().sum::<f32>();
        assert!((total - 1.0).abs() < 1e-6);
        assert!((k[0] - 0.786_56).abs() < 1e-4);
        assert_eq!(gaussian_kernel(0.5, 0.002, 100).len(), 3);
    }

    #[test]
    fn test_gaussian_blur() {
        let plane = Plane::new(Array2::from_elem((5, 8), 1234.0), BitDepth::U16);
        assert_eq!(gaussian_blur(&plane, 0.5), plane);
        assert_eq!(gaussian_blur(&plane, 0.0), plane);

        let mut data = Array2::zeros((9, 9));
        data[(4, 4)] = 1.0;
        let impulse = Plane::new(data, BitDepth::F32);
        let blurred = gaussian_blur(&impulse, 0.5);
        assert!((blurred.data().sum() - 1.0).abs() < 1e-5);
        assert!((blurred[(4, 4)] - 0.786_56 * 0.786_56).abs() < 1e-3);
        assert!((blurred[(3, 4)] - blurred[(4, 5)]).abs() < 1e-7);
        assert_eq!(blurred[(0, 0)], 0.0);

        let small = Plane::new(array![[0.0, 100.0]], BitDepth::U8);
        let b = gaussian_blur(&small, 0.5);
        assert!(b[(0, 0)] > 0.0 && b[(0, 1)] < 100.0);
    }
}
