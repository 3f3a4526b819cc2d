use ndarray::{ArrayBase, ArrayViewMut1, Axis, DataMut, Dimension, Zip};

/// 高斯核截断倍数.
pub const TRUNCATE: f64 = 4.0;

/// 可参与滤波的元素类型. 运算内部统一以 `f64` 累加.
pub trait FilterElem: Copy + Send + Sync {
    /// 转换为 `f64`.
    fn to_f64(self) -> f64;

    /// 由 `f64` 转换而来.
    fn from_f64(v: f64) -> Self;
}

impl FilterElem for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl FilterElem for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
}

/// 构造归一化的一维高斯核, 长度为 `2 * radius + 1`, 其中 `radius = int(truncate * sigma + 0.5)`.
///
/// 若 `sigma <= 0`, 返回单位核 `[1.0]`.
pub fn gaussian_kernel(sigma: f64, truncate: f64) -> Vec<f64> {
    if sigma <= 0.0 || !sigma.is_finite() {
        return vec![1.0];
    }
    let radius = (truncate * sigma + 0.5) as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x * x) as f64 / (sigma * sigma)).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// reflect 模式下, 将任意 (可能越界的) 索引 `i` 映射到 `0..n` 之中.
///
/// `n` 必须大于 0.
#[inline]
pub fn reflect_index(i: isize, n: usize) -> usize {
    debug_assert!(n > 0);
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * n;
    let m = i.rem_euclid(period);
    if m >= n {
        (period - 1 - m) as usize
    } else {
        m as usize
    }
}

/// 对一条一维数据就地做相关运算.
fn correlate_lane<A: FilterElem>(mut lane: ArrayViewMut1<A>, kernel: &[f64], scratch: &mut Vec<f64>) {
    let n = lane.len();
    if n == 0 {
        return;
    }
    let radius = (kernel.len() / 2) as isize;
    scratch.clear();
    scratch.extend(lane.iter().map(|v| v.to_f64()));

    for (i, out) in lane.iter_mut().enumerate() {
        let i = i as isize;
        let acc: f64 = kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * scratch[reflect_index(i + k as isize - radius, n)])
            .sum();
        *out = A::from_f64(acc);
    }
}

/// 对任意维度数组就地做各向同性高斯滤波.
///
/// `sigma <= 0` 时不做任何处理. 开启 `rayon` feature 时, 每一维上的所有一维数据并行处理.
pub fn gaussian_filter<A, S, D>(data: &mut ArrayBase<S, D>, sigma: f64)
where
    A: FilterElem,
    S: DataMut<Elem = A>,
    D: Dimension,
{
    let kernel = gaussian_kernel(sigma, TRUNCATE);
    if kernel.len() == 1 {
        return;
    }
    for axis in 0..data.ndim() {
        if data.len_of(Axis(axis)) <= 1 {
            continue;
        }
        let kernel = kernel.as_slice();
        zip_for_each!(Zip::from(data.lanes_mut(Axis(axis))), |lane| {
            let mut scratch = Vec::with_capacity(lane.len());
            correlate_lane(lane, kernel, &mut scratch);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array3};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_kernel_normalized_and_symmetric() {
        let k = gaussian_kernel(1.5, TRUNCATE);
        // int(4 * 1.5 + 0.5) = 6
        assert_eq!(k.len(), 13);
        assert!(f64_eq(k.iter().sum(), 1.0));
        for i in 0..k.len() / 2 {
            assert!(f64_eq(k[i], k[k.len() - 1 - i]));
        }
        assert_eq!(gaussian_kernel(0.0, TRUNCATE), vec![1.0]);
    }

    #[test]
    fn test_reflect_index() {
        // d c b a | a b c d | d c b a
        let n = 4;
        let got: Vec<usize> = (-4..8).map(|i| reflect_index(i, n)).collect();
        assert_eq!(got, vec![3, 2, 1, 0, 0, 1, 2, 3, 3, 2, 1, 0]);
        assert_eq!(reflect_index(-7, 1), 0);
    }

    /// 常数数组滤波后保持不变 (reflect 边界不引入能量损失).
    #[test]
    fn test_constant_is_invariant() {
        let mut a = Array3::<f32>::from_elem((5, 6, 7), 3.25);
        gaussian_filter(&mut a, 2.0);
        assert!(a.iter().all(|v| (v - 3.25).abs() < 1e-5));
    }

    #[test]
    fn test_zero_sigma_is_identity() {
        let mut a = array![[1.0f64, 5.0], [2.0, 7.0]];
        let b = a.clone();
        gaussian_filter(&mut a, 0.0);
        assert_eq!(a, b);
    }

    /// 一维脉冲的响应即为 (截断的) 高斯核, 且总和守恒.
    #[test]
    fn test_impulse_response() {
        let mut a = Array1::<f64>::zeros(21);
        a[10] = 1.0;
        gaussian_filter(&mut a, 1.0);
        let k = gaussian_kernel(1.0, TRUNCATE);
        for (i, w) in k.iter().enumerate() {
            assert!(f64_eq(a[10 - 4 + i], *w));
        }
        assert!(f64_eq(a.sum(), 1.0));
    }
}
