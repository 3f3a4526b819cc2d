//! Otsu 全局阈值.

use ndarray::ArrayView2;

/// 256 级灰度直方图, 以及每一级对应的原始取值下界与宽度.
#[derive(Clone, Debug)]
pub struct Histogram {
    /// 各级计数.
    pub counts: [u64; 256],

    /// 第 0 级的下界.
    pub min: f32,

    /// 每一级的宽度. 对 8-bit 图像为 1.
    pub bin_width: f32,
}

impl Histogram {
    /// 第 `level` 级的上界 (包含). 大于它的值属于更高级.
    #[inline]
    pub fn upper_bound(&self, level: usize) -> f32 {
        self.min + self.bin_width * (level + 1) as f32
    }
}

/// 统计 `data` 中有限值的直方图.
///
/// 若 `integral_u8` 为 `true`, 则按照 `0..=255` 逐级统计 (8-bit 图像); 否则将
/// `[min, max]` 等分为 256 级.
pub fn histogram(data: ArrayView2<f32>, integral_u8: bool) -> Histogram {
    let mut counts = [0u64; 256];
    if integral_u8 {
        for &v in data.iter().filter(|v| v.is_finite()) {
            counts[v.clamp(0.0, 255.0).round() as usize] += 1;
        }
        // 使 `upper_bound(k) = k + 0.5`, 即取值 `<= k` 的像素属于第 `k` 级及以下.
        return Histogram {
            counts,
            min: -0.5,
            bin_width: 1.0,
        };
    }

    let (min, max) = data
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if min > max {
        return Histogram {
            counts,
            min: 0.0,
            bin_width: 1.0,
        };
    }
    let bin_width = if max > min { (max - min) / 256.0 } else { 1.0 };
    for &v in data.iter().filter(|v| v.is_finite()) {
        let level = (((v - min) / bin_width) as usize).min(255);
        counts[level] += 1;
    }
    Histogram {
        counts,
        min,
        bin_width,
    }
}

/// 在直方图上求 Otsu 阈值级 `k`: 级 `<= k` 为背景, 级 `> k` 为前景.
///
/// 最大化类间方差; 与 ImageJ Auto Threshold 一致, 若存在多个最大值取最后一个.
/// 空直方图返回 0.
pub fn otsu_level(counts: &[u64]) -> usize {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return 0;
    }
    let total = total as f64;
    let sum_all: f64 = counts
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut best = 0usize;
    let mut best_var = f64::NEG_INFINITY;
    let mut w0 = 0.0;
    let mut sum0 = 0.0;
    for (k, &c) in counts.iter().enumerate() {
        w0 += c as f64;
        sum0 += k as f64 * c as f64;
        let w1 = total - w0;
        if w0 == 0.0 || w1 == 0.0 {
            continue;
        }
        let mu0 = sum0 / w0;
        let mu1 = (sum_all - sum0) / w1;
        let var = w0 * w1 * (mu0 - mu1) * (mu0 - mu1);
        if var >= best_var {
            best_var = var;
            best = k;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_bimodal() {
        let mut counts = [0u64; 256];
        counts[20] = 100;
        counts[21] = 50;
        counts[200] = 80;
        counts[201] = 40;
        let k = otsu_level(&counts);
        assert!((21..200).contains(&k), "k = {k}");
    }

    /// 两峰之间的空级构成方差平台, 取平台的最后一级.
    #[test]
    fn test_plateau_takes_last() {
        let mut counts = [0u64; 256];
        counts[20] = 10;
        counts[200] = 10;
        assert_eq!(otsu_level(&counts), 199);
    }

    #[test]
    fn test_degenerate() {
        assert_eq!(otsu_level(&[0u64; 256]), 0);
        let mut counts = [0u64; 256];
        counts[7] = 10;
        assert_eq!(otsu_level(&counts), 0);
    }

    #[test]
    fn test_histogram_float_range() {
        let img = Array2::from_shape_fn((4, 4), |(h, _)| if h < 2 { 0.0f32 } else { 1000.0 });
        let hist = histogram(img.view(), false);
        assert_eq!(hist.counts[0], 8);
        assert_eq!(hist.counts[255], 8);
        let k = otsu_level(&hist.counts);
        assert!(hist.upper_bound(k) < 1000.0);
        assert!(hist.upper_bound(k) > 0.0);
    }

    #[test]
    fn test_histogram_u8() {
        let img = Array2::from_shape_fn((2, 2), |(h, w)| (h * 2 + w) as f32 * 10.0);
        let hist = histogram(img.view(), true);
        assert_eq!(hist.counts[30], 1);
        assert_eq!(hist.upper_bound(30), 30.5);
    }
}
