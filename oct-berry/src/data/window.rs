/// 强度窗口, 包含窗位 (level) 和窗宽 (width), 用于把任意范围的浮点强度映射为 8-bit 灰度.
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntensityWindow {
    level: f32,
    width: f32,
}

impl IntensityWindow {
    /// 构建强度窗口.
    ///
    /// `level` 必须有限, `width` 必须为正且有限, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<IntensityWindow> {
        if level.is_finite() && width.is_finite() && width > 0.0 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 以 `[lower, upper]` 构建窗口.
    ///
    /// 若 `lower == upper`, 窗宽取 1, 以免全图被映射为同一个端点.
    pub fn from_bounds(lower: f32, upper: f32) -> Option<IntensityWindow> {
        if lower > upper {
            return None;
        }
        let width = if upper > lower { upper - lower } else { 1.0 };
        Self::new(lower + width / 2.0, width)
    }

    /// 覆盖 `data` 中全部有限值的窗口. 不存在有限值时返回 `None`.
    pub fn covering<'a, I>(data: I) -> Option<IntensityWindow>
    where
        I: IntoIterator<Item = &'a f32>,
    {
        let (lo, hi) = data
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Self::from_bounds(lo, hi)
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 求在当前窗口下, `v` 对应的 `[0, 1]` 归一化值.
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn normalize(&self, v: f32) -> Option<f32> {
        if !v.is_finite() {
            return None;
        }
        Some(((v - self.lower_bound()) / self.width).clamp(0.0, 1.0))
    }

    /// 求在当前窗口下, `v` 对应的灰度图像素整数值 (0 <= value <= 255).
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, v: f32) -> Option<u8> {
        // 255, not 256.
        self.normalize(v).map(|t| (t * 255.0) as u8)
    }
}
