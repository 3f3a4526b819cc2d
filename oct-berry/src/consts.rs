//! 通用常量.

/// 单通道颜色.
pub mod gray {
    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 二值图像中, 背景的像素值.
    pub const BINARY_BACKGROUND: u8 = BLACK;

    /// 二值图像中, 前景 (目标) 的像素值.
    pub const BINARY_FOREGROUND: u8 = WHITE;
}

/// 本地目录约定.
pub mod dirs {
    /// 示例数据的默认存放目录 (相对当前工作目录).
    pub const EXAMPLE_DIR: &str = "3D_Reconstruction_Visualization/example_data";

    /// 结果目录 (相对当前工作目录).
    pub const RESULT_DIR: &str = "results";

    /// 指定示例数据目录的环境变量.
    pub const EXAMPLE_DIR_ENV: &str = "OCT_EXAMPLE_DIR";

    /// 指定结果目录的环境变量.
    pub const RESULT_DIR_ENV: &str = "OCT_RESULT_DIR";
}

/// 示例数据下载.
pub mod fetch {
    /// figshare 文件下载端点. 文件 id 直接拼接在其后.
    pub const ENDPOINT: &str = "https://api.figshare.com/v2/file/download/";

    /// OCT 信噪比体数据 (用于生成体掩膜).
    pub const OCT_EXAMPLE: &str = "oct_snr_lin.npz";

    /// 切线模量体数据 (用于渲染).
    pub const MODULUS_EXAMPLE: &str = "tangent_modulus_xyz.npz";

    /// 示例文件名 -> 远端文件 id.
    pub const EXAMPLES: [(&str, &str); 2] =
        [(OCT_EXAMPLE, "57374797"), (MODULUS_EXAMPLE, "57374800")];

    /// 单次下载的超时秒数.
    pub const TIMEOUT_SECS: u64 = 300;
}

/// 体掩膜生成.
pub mod prepare {
    /// 原始 npz 中体数据的字段名.
    pub const CONTENT_KEY: &str = "content";

    /// 体掩膜 npz 中体掩膜的字段名.
    pub const MASK_KEY: &str = "volumetric_mask";

    /// 体掩膜文件名.
    pub const MASK_FILE: &str = "mask.npz";

    /// 顶视掩膜诊断图文件名.
    pub const TOP_VIEW_PLOT: &str = "top_view_mask.png";

    /// 天花板高度图诊断图文件名.
    pub const CEILING_PLOT: &str = "volumetric_mask_ceiling.png";

    /// 原始体数据的高斯平滑标准差.
    pub const VOLUME_SIGMA: f64 = 8.0;

    /// 天花板高度图的高斯平滑标准差.
    pub const CEILING_SIGMA: f64 = 8.0;

    /// 去孔洞/去孤岛所用圆盘结构元半径.
    pub const FOOTPRINT_RADIUS: usize = 15;

    /// Chan–Vese 长度项权重.
    pub const CV_MU: f64 = 0.8;

    /// Chan–Vese 内部区域权重.
    pub const CV_LAMBDA1: f64 = 1.0;

    /// Chan–Vese 外部区域权重.
    pub const CV_LAMBDA2: f64 = 1.0;

    /// Chan–Vese 收敛阈值 (水平集变化量的均方根).
    pub const CV_TOL: f64 = 1e-3;

    /// Chan–Vese 最大迭代次数.
    pub const CV_MAX_ITER: usize = 200;

    /// Chan–Vese 时间步长.
    pub const CV_DT: f64 = 0.5;

    /// Chan–Vese 棋盘初始化的方格边长.
    pub const CV_CHECKERBOARD_SQUARE: f64 = 5.0;
}

/// 体渲染.
pub mod render {
    /// 体数据截断上限. 大于它的值被置为它.
    pub const CLAMP_HIGH: f32 = 20.0;

    /// 体数据截断下限. 小于它的值被置为 [`FILL`].
    pub const CLAMP_LOW: f32 = 0.0;

    /// 低于下限或者位于体掩膜之外的体素的填充值.
    pub const FILL: f32 = -1.0;

    /// 渲染前的高斯模糊标准差.
    pub const SIGMA: f64 = 4.0;

    /// 不透明度斜坡, 在标量范围内等距分布.
    pub const OPACITY: [f32; 4] = [0.1, 0.3, 0.9, 1.0];

    /// 初始仰角 (度).
    pub const ELEVATION: f64 = 15.0;

    /// 交互视图缩放.
    pub const INTERACTIVE_ZOOM: f64 = 1.8;

    /// 动画缩放.
    pub const ANIMATION_ZOOM: f64 = 2.0;

    /// 动画每帧方位角增量 (度).
    pub const AZIMUTH_STEP: f64 = 2.0;

    /// 动画总帧数 (首帧 + 179 步).
    pub const ANIMATION_FRAMES: usize = 180;

    /// 交互视图尺寸 (宽, 高).
    pub const INTERACTIVE_SIZE: (u32, u32) = (1200, 800);

    /// 动画帧尺寸 (宽, 高).
    pub const ANIMATION_SIZE: (u32, u32) = (1920, 1088);

    /// 动画帧率.
    pub const FPS: u32 = 24;

    /// 交互视图输出文件名.
    pub const VIEW_FILE: &str = "view.png";

    /// 动画文件名.
    pub const ANIMATION_FILE: &str = "animation.mp4";

    /// 动画帧目录名.
    pub const FRAME_DIR: &str = "animation_frames";
}

/// 显微图像批处理.
pub mod fiji {
    use std::time::Duration;

    /// 默认输入图像扩展名.
    pub const IMAGE_EXT: &str = ".tif";

    /// 默认滚球半径 (像素).
    pub const ROLLING_BALL_RADIUS: f64 = 50.0;

    /// 默认中值滤波半径 (像素).
    pub const MEDIAN_RADIUS: f64 = 2.0;

    /// 默认高斯模糊标准差 (像素).
    pub const GAUSSIAN_SIGMA: f64 = 0.5;

    /// 打开每个文件前的等待时间. 慢速存储上立即读取偶尔会失败.
    pub const SETTLE_DELAY: Duration = Duration::from_secs(3);

    /// 背景扣除结果目录.
    pub const BG_SUB_DIR: &str = "1_background_subtracted";

    /// 滤波结果目录.
    pub const FILTERED_DIR: &str = "2_filtered";

    /// 默认 ROI 压缩包后缀.
    pub const ROI_SUFFIX: &str = "_roiset.zip";

    /// ROI 区域图像目录.
    pub const CL_ROI_DIR: &str = "CL_ROI";

    /// 二值图像目录.
    pub const CL_BINARY_DIR: &str = "CL_binary";

    /// 结果表文件名.
    pub const RESULTS_FILE: &str = "Results.csv";

    /// 结果表小数位数.
    pub const DECIMALS: usize = 3;
}
