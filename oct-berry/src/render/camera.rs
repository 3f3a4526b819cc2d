//! 正交相机.
//!
//! 世界坐标即体素索引坐标 `(depth, x, y)`, 原点平移到体数据中心.
//! 初始视角: 屏幕向上为 `-depth` (组织表面朝上), 屏幕向右为 `+x`, 相机位于 `+y` 一侧.

use crate::consts::render::ELEVATION;
use glam::DVec3;

const UP: DVec3 = DVec3::new(-1.0, 0.0, 0.0);
const RIGHT: DVec3 = DVec3::new(0.0, 1.0, 0.0);
const BACK: DVec3 = DVec3::new(0.0, 0.0, 1.0);

/// 仰角上限 (度). 避免视线与向上方向重合.
const MAX_ELEVATION: f64 = 89.0;

/// 正交相机. 方位角绕屏幕向上方向旋转, 仰角绕屏幕向右方向旋转, 均以度为单位.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Camera {
    /// 方位角 (度).
    pub azimuth: f64,

    /// 仰角 (度), 限制在 `[-89, 89]`.
    pub elevation: f64,

    /// 缩放. 为 1 时体数据对角线恰好填满画面较短边.
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(ELEVATION, 1.0)
    }
}

/// 相机的正交基, 分量顺序为 `(depth, x, y)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Basis {
    /// 屏幕向右.
    pub right: DVec3,

    /// 屏幕向上.
    pub up: DVec3,

    /// 从焦点指向相机. 视线方向为其反方向.
    pub back: DVec3,
}

impl Camera {
    /// 以给定仰角与缩放, 方位角 0 创建.
    pub fn new(elevation: f64, zoom: f64) -> Self {
        let mut cam = Self {
            azimuth: 0.0,
            elevation: 0.0,
            zoom: 1.0,
        };
        cam.elevate(elevation);
        cam.zoom_by(zoom);
        cam
    }

    /// 方位角增加 `degrees`, 结果归一化到 `[0, 360)`.
    pub fn rotate(&mut self, degrees: f64) {
        self.azimuth = (self.azimuth + degrees).rem_euclid(360.0);
    }

    /// 仰角增加 `degrees`, 结果限制在 `[-89, 89]`.
    pub fn elevate(&mut self, degrees: f64) {
        self.elevation = (self.elevation + degrees).clamp(-MAX_ELEVATION, MAX_ELEVATION);
    }

    /// 缩放乘以 `factor`. 非正或非有限的 `factor` 被忽略.
    pub fn zoom_by(&mut self, factor: f64) {
        if factor.is_finite() && factor > 0.0 {
            self.zoom *= factor;
        }
    }

    /// 当前视角下的正交基.
    pub fn basis(&self) -> Basis {
        let (sa, ca) = self.azimuth.to_radians().sin_cos();
        let (se, ce) = self.elevation.to_radians().sin_cos();
        let horizontal = ca * BACK + sa * RIGHT;
        let back = ce * horizontal + se * UP;
        let right = ca * RIGHT - sa * BACK;
        let up = back.cross(right);
        Basis { right, up, back }
    }
}
