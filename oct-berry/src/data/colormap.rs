//! 伪彩色色图.

use image::Rgb;
use once_cell::sync::Lazy;

/// 色图查找表的级数.
const LEVELS: usize = 256;

#[inline]
fn unit(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// MATLAB/matplotlib 风格的 jet 色图, `t` 取值 `[0, 1]` (超出部分截断).
///
/// 返回 `[0, 1]` 浮点 RGB.
pub fn jet(t: f32) -> [f32; 3] {
    let t = unit(t);
    [
        unit(1.5 - (4.0 * t - 3.0).abs()),
        unit(1.5 - (4.0 * t - 2.0).abs()),
        unit(1.5 - (4.0 * t - 1.0).abs()),
    ]
}

/// viridis 色图锚点, 等距分布于 `[0, 1]`.
const VIRIDIS_ANCHORS: [[f32; 3]; 9] = [
    [0.267, 0.005, 0.329],
    [0.283, 0.141, 0.458],
    [0.254, 0.265, 0.530],
    [0.207, 0.372, 0.553],
    [0.164, 0.471, 0.558],
    [0.128, 0.567, 0.551],
    [0.135, 0.659, 0.518],
    [0.478, 0.821, 0.318],
    [0.993, 0.906, 0.144],
];

/// viridis 色图 (锚点线性插值), `t` 取值 `[0, 1]` (超出部分截断).
pub fn viridis(t: f32) -> [f32; 3] {
    let t = unit(t) * (VIRIDIS_ANCHORS.len() - 1) as f32;
    let i = (t.floor() as usize).min(VIRIDIS_ANCHORS.len() - 2);
    let frac = t - i as f32;
    let (a, b) = (VIRIDIS_ANCHORS[i], VIRIDIS_ANCHORS[i + 1]);
    [0, 1, 2].map(|c| a[c] + (b[c] - a[c]) * frac)
}

static VIRIDIS_LUT: Lazy<Vec<Rgb<u8>>> = Lazy::new(|| {
    (0..LEVELS)
        .map(|i| to_rgb8(viridis(i as f32 / (LEVELS - 1) as f32)))
        .collect()
});

/// 把 `[0, 1]` 浮点 RGB 转换为 8-bit 像素.
#[inline]
pub fn to_rgb8(c: [f32; 3]) -> Rgb<u8> {
    Rgb(c.map(|v| (unit(v) * 255.0).round() as u8))
}

/// 查表版本的 viridis, 用于逐像素着色.
#[inline]
pub fn viridis_rgb8(t: f32) -> Rgb<u8> {
    let i = (unit(t) * (LEVELS - 1) as f32).round() as usize;
    VIRIDIS_LUT[i]
}
