//! 最大强度投影 (MIP) 体渲染.
//!
//! 正交相机沿视线方向对体数据做光线投射, 取每条光线上的最大值, 再经传递函数着色.
//! 支持两种输出: 交互视图 (终端命令驱动, 每次重新渲染 `view.png`) 与旋转动画
//! (PNG 帧序列, 可用 `ffmpeg` 编码为 mp4).

use crate::consts::prepare::{CONTENT_KEY, MASK_FILE, MASK_KEY};
use crate::consts::render::*;
use crate::data::{OctVolume, ShapeMismatch, VolumeMask};
use crate::dataset::OpenArchiveError;
use glam::DVec3;
use image::{Rgb, RgbImage};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command as Process;

mod camera;
mod transfer;

pub use camera::{Basis, Camera};
pub use transfer::TransferFunction;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, ParallelIterator};
        use rayon::slice::ParallelSliceMut;
    }
}

/// 体渲染错误.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// 结果目录不存在, 即尚未生成体掩膜.
    #[error("result folder `{0}` does not exist. Run prepare first!")]
    MissingResults(PathBuf),

    /// 读取 npz 失败.
    #[error(transparent)]
    Archive(#[from] OpenArchiveError),

    /// 体掩膜与体数据形状不一致.
    #[error(transparent)]
    Shape(#[from] ShapeMismatch),

    /// 体数据中不存在有限值, 无法建立传递函数.
    #[error("volume contains no finite value")]
    EmptyRange,

    /// 保存图像失败.
    #[error("failed to save image `{path}`: {source}")]
    Image {
        /// 图像路径.
        path: PathBuf,

        /// 底层错误.
        source: image::ImageError,
    },

    /// 其他 I/O 错误.
    #[error("i/o error at `{path}`: {source}")]
    Io {
        /// 出错的路径.
        path: PathBuf,

        /// 底层错误.
        source: std::io::Error,
    },

    /// `ffmpeg` 以非零状态退出.
    #[error("ffmpeg exited with {0}")]
    Encode(std::process::ExitStatus),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> RenderError {
    let path = path.to_path_buf();
    move |source| RenderError::Io { path, source }
}

/// 渲染前的数据预处理参数与传递函数参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderParams {
    /// 截断上限.
    pub clamp_high: f32,

    /// 截断下限. 小于它的值被置为 `fill`.
    pub clamp_low: f32,

    /// 低于下限或位于体掩膜之外的体素的填充值.
    pub fill: f32,

    /// 高斯模糊标准差.
    pub sigma: f64,

    /// 不透明度斜坡.
    pub opacity: [f32; 4],
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            clamp_high: CLAMP_HIGH,
            clamp_low: CLAMP_LOW,
            fill: FILL,
            sigma: SIGMA,
            opacity: OPACITY,
        }
    }
}

/// 截断数值范围, 将体掩膜外的体素置为填充值, 再做高斯模糊.
pub fn prepare_render_volume(
    mut volume: OctVolume,
    mask: &VolumeMask,
    params: &RenderParams,
) -> Result<OctVolume, RenderError> {
    log::info!("Limiting the data range");
    volume.clamp(params.clamp_low, params.clamp_high, params.fill);
    log::info!("Applying the volumetric mask");
    volume.apply_mask(mask, params.fill)?;
    log::info!("Applying gaussian filter (SD={})", params.sigma);
    volume.smooth(params.sigma);
    Ok(volume)
}

/// 读取 `data_path` 的体数据与 `result_dir` 中的体掩膜, 并完成渲染前预处理.
///
/// `result_dir` 不存在时返回 [`RenderError::MissingResults`].
pub fn load_render_volume(
    data_path: &Path,
    result_dir: &Path,
    params: &RenderParams,
) -> Result<OctVolume, RenderError> {
    if !result_dir.is_dir() {
        return Err(RenderError::MissingResults(result_dir.to_path_buf()));
    }
    log::info!("Loading example file {}", data_path.display());
    let volume = OctVolume::open(data_path, CONTENT_KEY)?;
    let mask_path = result_dir.join(MASK_FILE);
    log::info!("Loading volumetric mask file {}", mask_path.display());
    let mask = VolumeMask::open(&mask_path, MASK_KEY)?;
    prepare_render_volume(volume, &mask, params)
}

/// MIP 渲染器.
#[derive(Debug, Clone)]
pub struct Renderer {
    volume: OctVolume,
    transfer: TransferFunction,
}

impl Renderer {
    /// 以 (已预处理的) 体数据创建. 传递函数的标量范围取体数据的有限值范围.
    pub fn new(volume: OctVolume, opacity: [f32; 4]) -> Result<Self, RenderError> {
        let (min, max) = volume.min_max().ok_or(RenderError::EmptyRange)?;
        let transfer = TransferFunction::new(min, max, opacity).ok_or(RenderError::EmptyRange)?;
        Ok(Self { volume, transfer })
    }

    /// 传递函数.
    #[inline]
    pub fn transfer(&self) -> &TransferFunction {
        &self.transfer
    }

    /// 体数据.
    #[inline]
    pub fn volume(&self) -> &OctVolume {
        &self.volume
    }

    /// 以 `camera` 渲染 `width x height` 的图像. 未命中体数据的像素为黑色.
    pub fn render(&self, camera: &Camera, (width, height): (u32, u32)) -> RgbImage {
        let mut img = RgbImage::new(width, height);
        if width == 0 || height == 0 {
            return img;
        }
        let caster = RayCaster::new(&self.volume, camera, (width, height));
        let row_len = width as usize * 3;
        let shade_row = |(py, row): (usize, &mut [u8])| {
            for (px, pixel) in row.chunks_exact_mut(3).enumerate() {
                if let Some(v) = caster.max_along(px, py) {
                    let Rgb(c) = self.transfer.shade(v);
                    pixel.copy_from_slice(&c);
                }
            }
        };

        #[cfg(feature = "rayon")]
        img.par_chunks_mut(row_len).enumerate().for_each(shade_row);
        #[cfg(not(feature = "rayon"))]
        img.chunks_mut(row_len).enumerate().for_each(shade_row);
        img
    }

    /// 渲染并保存到 `path`.
    pub fn render_to(
        &self,
        camera: &Camera,
        size: (u32, u32),
        path: &Path,
    ) -> Result<(), RenderError> {
        self.render(camera, size)
            .save(path)
            .map_err(|source| RenderError::Image {
                path: path.to_path_buf(),
                source,
            })
    }

    /// 渲染旋转动画帧序列: 首帧之后每帧方位角增加 `AZIMUTH_STEP` 度, 共 `frames` 帧.
    ///
    /// 帧保存为 `frame_dir/frame_%04d.png`, 返回全部帧的路径.
    pub fn render_frames(
        &self,
        mut camera: Camera,
        size: (u32, u32),
        frames: usize,
        frame_dir: &Path,
    ) -> Result<Vec<PathBuf>, RenderError> {
        std::fs::create_dir_all(frame_dir).map_err(io_error(frame_dir))?;
        let mut paths = Vec::with_capacity(frames);
        for i in 0..frames {
            if i > 0 {
                camera.rotate(AZIMUTH_STEP);
            }
            let path = frame_dir.join(format!("frame_{i:04}.png"));
            self.render_to(&camera, size, &path)?;
            log::debug!("Rendered frame {} / {frames}", i + 1);
            paths.push(path);
        }
        Ok(paths)
    }
}

/// 一次渲染中所有光线共享的几何量.
struct RayCaster<'a> {
    volume: &'a OctVolume,
    basis: Basis,
    /// 体数据中心 (体素索引坐标).
    center: DVec3,
    /// 各轴体素数.
    extent: DVec3,
    /// 每像素对应的世界长度.
    scale: f64,
    /// 光线起点到中心沿视线方向的距离.
    reach: f64,
    size: (f64, f64),
}

impl<'a> RayCaster<'a> {
    fn new(volume: &'a OctVolume, camera: &Camera, (width, height): (u32, u32)) -> Self {
        let (d, x, y) = volume.shape();
        let extent = DVec3::new(d as f64, x as f64, y as f64);
        let diag = extent.length().max(1.0);
        let scale = diag / (width.min(height) as f64 * camera.zoom);
        Self {
            volume,
            basis: camera.basis(),
            center: (extent - 1.0) / 2.0,
            extent,
            scale,
            reach: diag,
            size: (width as f64, height as f64),
        }
    }

    /// 像素 `(px, py)` 对应光线上的最大值. 光线未穿过体数据时返回 `None`.
    fn max_along(&self, px: usize, py: usize) -> Option<f32> {
        let Basis { right, up, back } = self.basis;
        let sx = (px as f64 + 0.5 - self.size.0 / 2.0) * self.scale;
        let sy = (self.size.1 / 2.0 - py as f64 - 0.5) * self.scale;
        let origin = self.center + sx * right + sy * up + self.reach * back;
        let dir = -back;
        let (t0, t1) = clip_to_box(origin, dir, self.extent)?;

        let data = self.volume.data();
        let mut best = f32::NEG_INFINITY;
        let mut t = t0;
        while t <= t1 {
            let p = (origin + t * dir).round();
            if p.cmpge(DVec3::ZERO).all() && p.cmplt(self.extent).all() {
                let v = data[(p.x as usize, p.y as usize, p.z as usize)];
                if v > best {
                    best = v;
                }
            }
            t += 1.0;
        }
        best.is_finite().then_some(best)
    }
}

/// 光线 `origin + t * dir` 与体素盒 `[-0.5, n - 0.5]^3` 的相交区间 `[t0, t1]`.
fn clip_to_box(origin: DVec3, dir: DVec3, extent: DVec3) -> Option<(f64, f64)> {
    if extent.min_element() <= 0.0 {
        return None;
    }
    let (lo, hi) = (DVec3::splat(-0.5), extent - 0.5);
    let mut t0 = f64::NEG_INFINITY;
    let mut t1 = f64::INFINITY;
    for i in 0..3 {
        if dir[i].abs() < 1e-12 {
            if origin[i] < lo[i] || origin[i] > hi[i] {
                return None;
            }
            continue;
        }
        let a = (lo[i] - origin[i]) / dir[i];
        let b = (hi[i] - origin[i]) / dir[i];
        t0 = t0.max(a.min(b));
        t1 = t1.min(a.max(b));
    }
    (t0 <= t1).then_some((t0, t1))
}

/// 用 `ffmpeg` 将 `frame_dir/frame_%04d.png` 编码为 `output` (H.264, yuv420p).
///
/// 找不到 `ffmpeg` 时返回 `Ok(false)`, 帧序列保持原样; 编码成功返回 `Ok(true)`.
pub fn encode_mp4(frame_dir: &Path, output: &Path, fps: u32) -> Result<bool, RenderError> {
    let pattern = frame_dir.join("frame_%04d.png");
    let status = Process::new("ffmpeg")
        .arg("-y")
        .args(["-loglevel", "error"])
        .arg("-framerate")
        .arg(fps.to_string())
        .arg("-i")
        .arg(&pattern)
        .args(["-pix_fmt", "yuv420p"])
        .arg(output)
        .status();
    match status {
        Ok(s) if s.success() => Ok(true),
        Ok(s) => Err(RenderError::Encode(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(output)(e)),
    }
}

/// 渲染旋转动画: 首帧仰角 15 度, 缩放 2; 之后 179 帧每帧方位角 +2 度.
///
/// 帧写入 `result_dir/animation_frames`, 随后尝试编码为 `result_dir/animation.mp4`.
/// 返回视频路径; 若无法编码则返回 `None`.
pub fn render_animation(
    renderer: &Renderer,
    result_dir: &Path,
) -> Result<Option<PathBuf>, RenderError> {
    log::info!("Rendering an animation");
    let frame_dir = result_dir.join(FRAME_DIR);
    let camera = Camera::new(ELEVATION, ANIMATION_ZOOM);
    renderer.render_frames(camera, ANIMATION_SIZE, ANIMATION_FRAMES, &frame_dir)?;

    let output = result_dir.join(ANIMATION_FILE);
    if encode_mp4(&frame_dir, &output, FPS)? {
        log::info!("Animation saved to {}", output.display());
        Ok(Some(output))
    } else {
        log::warn!(
            "ffmpeg not found, frames are kept in {}",
            frame_dir.display()
        );
        Ok(None)
    }
}

/// 交互视图命令.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ViewCommand {
    /// 方位角 -10 度.
    Left,
    /// 方位角 +10 度.
    Right,
    /// 仰角 +10 度.
    Up,
    /// 仰角 -10 度.
    Down,
    /// 放大 1.1 倍.
    ZoomIn,
    /// 缩小 1.1 倍.
    ZoomOut,
    /// 恢复初始视角.
    Reset,
    /// 退出.
    Quit,
}

/// 交互视图每次旋转的角度 (度).
const VIEW_STEP: f64 = 10.0;

/// 交互视图每次缩放的倍数.
const VIEW_ZOOM: f64 = 1.1;

impl ViewCommand {
    /// 解析一行输入. 无法识别时返回 `None`.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "a" => Some(Self::Left),
            "d" => Some(Self::Right),
            "w" => Some(Self::Up),
            "s" => Some(Self::Down),
            "+" | "=" => Some(Self::ZoomIn),
            "-" => Some(Self::ZoomOut),
            "r" => Some(Self::Reset),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }

    /// 作用于相机. `initial` 为重置目标.
    pub fn apply(self, camera: &mut Camera, initial: &Camera) {
        match self {
            Self::Left => camera.rotate(-VIEW_STEP),
            Self::Right => camera.rotate(VIEW_STEP),
            Self::Up => camera.elevate(VIEW_STEP),
            Self::Down => camera.elevate(-VIEW_STEP),
            Self::ZoomIn => camera.zoom_by(VIEW_ZOOM),
            Self::ZoomOut => camera.zoom_by(1.0 / VIEW_ZOOM),
            Self::Reset => *camera = *initial,
            Self::Quit => {}
        }
    }
}

/// 交互视图帮助信息.
pub const VIEW_HELP: &str = "commands: a/d rotate, w/s tilt, +/- zoom, r reset, q quit";

/// 交互视图: 渲染 `result_dir/view.png`, 然后从 `input` 逐行读取命令并重新渲染, 直到退出或输入结束.
///
/// 返回渲染次数.
pub fn run_interactive<R: BufRead, W: Write>(
    renderer: &Renderer,
    result_dir: &Path,
    input: R,
    mut output: W,
) -> Result<usize, RenderError> {
    log::info!("Show volume");
    let path = result_dir.join(VIEW_FILE);
    let initial = Camera::new(ELEVATION, INTERACTIVE_ZOOM);
    let mut camera = initial;
    let prompt_err = io_error(&path);

    renderer.render_to(&camera, INTERACTIVE_SIZE, &path)?;
    let mut renders = 1;
    writeln!(output, "view written to {}\n{VIEW_HELP}", path.display()).map_err(prompt_err)?;

    for line in input.lines() {
        let line = line.map_err(io_error(&path))?;
        let Some(cmd) = ViewCommand::parse(&line) else {
            if !line.trim().is_empty() {
                writeln!(output, "{VIEW_HELP}").map_err(io_error(&path))?;
            }
            continue;
        };
        if cmd == ViewCommand::Quit {
            break;
        }
        cmd.apply(&mut camera, &initial);
        renderer.render_to(&camera, INTERACTIVE_SIZE, &path)?;
        renders += 1;
        writeln!(
            output,
            "azimuth {:.0}, elevation {:.0}, zoom {:.2}",
            camera.azimuth, camera.elevation, camera.zoom
        )
        .map_err(io_error(&path))?;
    }
    Ok(renders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn cube_with_hot_voxel() -> OctVolume {
        let mut data = Array3::<f32>::zeros((9, 9, 9));
        data[(4, 4, 4)] = 10.0;
        OctVolume::new(data)
    }

    #[test]
    fn test_prepare_render_volume() {
        let mut data = Array3::<f32>::from_elem((2, 2, 2), 5.0);
        data[(0, 0, 0)] = 50.0;
        data[(0, 0, 1)] = -3.0;
        let mut mask = Array3::from_elem((2, 2, 2), true);
        mask[(1, 1, 1)] = false;
        let params = RenderParams {
            sigma: 0.0,
            ..Default::default()
        };
        let v = prepare_render_volume(OctVolume::new(data), &VolumeMask::new(mask), &params)
            .unwrap();
        assert_eq!(v[(0, 0, 0)], 20.0);
        assert_eq!(v[(0, 0, 1)], -1.0);
        assert_eq!(v[(1, 1, 1)], -1.0);
        assert_eq!(v[(1, 0, 0)], 5.0);

        let wrong = VolumeMask::new(Array3::from_elem((1, 2, 2), true));
        let r = prepare_render_volume(v, &wrong, &params);
        assert!(matches!(r, Err(RenderError::Shape(_))));
    }

    #[test]
    fn test_missing_results_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let r = load_render_volume(
            &tmp.path().join("data.npz"),
            &tmp.path().join("results"),
            &RenderParams::default(),
        );
        assert!(matches!(r, Err(RenderError::MissingResults(_))));
    }

    /// 正对中心体素的像素呈现最大值颜色; 画面角落未命中体数据, 为黑色.
    #[test]
    fn test_render_hits_center() {
        let renderer = Renderer::new(cube_with_hot_voxel(), OPACITY).unwrap();
        for camera in [Camera::new(0.0, 1.0), Camera::new(15.0, 1.0)] {
            let img = renderer.render(&camera, (31, 31));
            let hot = renderer.transfer().shade(10.0);
            assert_eq!(img.get_pixel(15, 15), &hot);
            assert_eq!(img.get_pixel(0, 0), &Rgb([0, 0, 0]));
        }
    }

    #[test]
    fn test_clip_to_box() {
        let extent = DVec3::splat(3.0);
        let r = clip_to_box(DVec3::new(-5.0, 1.0, 1.0), DVec3::X, extent).unwrap();
        assert_eq!(r, (4.5, 7.5));
        assert!(clip_to_box(DVec3::new(-5.0, 9.0, 1.0), DVec3::X, extent).is_none());
        // 斜向穿过角点附近.
        let dir = DVec3::ONE.normalize();
        let (t0, t1) = clip_to_box(DVec3::splat(-2.5), dir, extent).unwrap();
        assert!((t0 - 2.0 * 3f64.sqrt()).abs() < 1e-9);
        assert!((t1 - 5.0 * 3f64.sqrt()).abs() < 1e-9);
        assert!(clip_to_box(DVec3::ZERO, DVec3::X, DVec3::new(0.0, 3.0, 3.0)).is_none());
    }

    #[test]
    fn test_frames_and_interactive() {
        let tmp = tempfile::tempdir().unwrap();
        let renderer = Renderer::new(cube_with_hot_voxel(), OPACITY).unwrap();
        let frames = renderer
            .render_frames(Camera::default(), (8, 6), 3, &tmp.path().join("frames"))
            .unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames[2].ends_with("frame_0002.png"));
        assert!(frames.iter().all(|p| p.is_file()));

        let input = "a\nbogus\n+\nq\nd\n".as_bytes();
        let mut out = Vec::new();
        let renders = run_interactive(&renderer, tmp.path(), input, &mut out).unwrap();
        assert_eq!(renders, 3);
        assert!(tmp.path().join(VIEW_FILE).is_file());
    }

    #[test]
    fn test_view_commands() {
        let initial = Camera::new(ELEVATION, INTERACTIVE_ZOOM);
        let mut cam = initial;
        ViewCommand::parse("d").unwrap().apply(&mut cam, &initial);
        ViewCommand::parse(" w ").unwrap().apply(&mut cam, &initial);
        assert_eq!(cam.azimuth, 10.0);
        assert_eq!(cam.elevation, 25.0);
        ViewCommand::parse("r").unwrap().apply(&mut cam, &initial);
        assert_eq!(cam, initial);
        assert_eq!(ViewCommand::parse("x"), None);
    }
}
