//! 体掩膜生成与渲染的端到端测试: npz 输入 -> 掩膜与诊断图 -> 重新加载 -> 渲染.

use ndarray::Array3;
use ndarray_npy::NpzWriter;
use oct_berry::consts::prepare::{CEILING_PLOT, CONTENT_KEY, MASK_FILE, MASK_KEY, TOP_VIEW_PLOT};
use oct_berry::mask::prepare_to_dir;
use oct_berry::prelude::*;
use oct_berry::render::{load_render_volume, RenderError};
use std::fs::File;
use std::path::Path;

fn write_volume(path: &Path, data: &Array3<f64>) {
    let mut npz = NpzWriter::new(File::create(path).unwrap());
    npz.add_array(CONTENT_KEY, data).unwrap();
    npz.finish().unwrap();
}

fn no_smoothing() -> MaskParams {
    MaskParams {
        volume_sigma: 0.0,
        ceiling_sigma: 0.0,
        footprint_radius: 0,
        chan_vese: ChanVeseParams {
            mu: 0.0,
            ..Default::default()
        },
    }
}

#[test]
fn test_prepare_then_render() {
    let _ = simple_logger::SimpleLogger::new().init();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("volume.npz");
    let results = dir.path().join("results");

    // 深度 5, 顶视 3x3; 中心柱在深度 2 处最亮.
    let mut data = Array3::<f64>::zeros((5, 3, 3));
    data[(2, 1, 1)] = 10.0;
    write_volume(&input, &data);

    // 结果目录尚不存在, 渲染应当失败.
    let err = load_render_volume(&input, &results, &RenderParams::default()).unwrap_err();
    assert!(matches!(err, RenderError::MissingResults(_)));

    let prepared = prepare_to_dir(&input, &results, &no_smoothing()).unwrap();
    assert_eq!(prepared.mask.count(), 3);
    for name in [TOP_VIEW_PLOT, CEILING_PLOT, MASK_FILE] {
        assert!(results.join(name).is_file(), "{name} missing");
    }

    let mask = VolumeMask::open(results.join(MASK_FILE), MASK_KEY).unwrap();
    for ((d, x, y), &m) in mask.data().indexed_iter() {
        assert_eq!(m, (x, y) == (1, 1) && d >= 2, "at {:?}", (d, x, y));
    }

    let params = RenderParams {
        sigma: 0.0,
        ..Default::default()
    };
    let volume = load_render_volume(&input, &results, &params).unwrap();
    // 掩膜外的体素被置为填充值.
    assert_eq!(volume[(0, 0, 0)], params.fill);
    assert_eq!(volume[(2, 1, 1)], 10.0);

    let renderer = Renderer::new(volume, params.opacity).unwrap();
    let view = results.join("view.png");
    renderer
        .render_to(&Camera::new(15.0, 1.0), (64, 48), &view)
        .unwrap();
    let image = image::open(&view).unwrap().to_rgb8();
    assert_eq!(image.dimensions(), (64, 48));
    assert!(image.pixels().any(|p| p.0 != [0, 0, 0]));
}
