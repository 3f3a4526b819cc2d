//! 命令行工具依赖的通用组件.

use log::LevelFilter;
use simple_logger::SimpleLogger;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 简单分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) -> std::io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// `-v` 的个数 -> 日志级别. 默认 `Info`.
pub fn verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// 初始化全局日志. 环境变量 `RUST_LOG` 优先于 `verbose`.
pub fn init_logger(verbose: u8) -> Result<(), log::SetLoggerError> {
    SimpleLogger::new()
        .with_level(verbosity(verbose))
        .env()
        .init()
}

/// 设置 rayon 全局线程池大小; `None` 时使用 [`cpus`].
pub fn init_threads(threads: Option<usize>) -> Result<usize, rayon::ThreadPoolBuildError> {
    let n = threads.filter(|&n| n > 0).unwrap_or_else(cpus);
    rayon::ThreadPoolBuilder::new().num_threads(n).build_global()?;
    log::debug!("using {n} worker thread(s)");
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sep_to() {
        let mut buf = Vec::new();
        sep_to(&mut buf).unwrap();
        assert_eq!(buf.len(), SEP.len() + 1);
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(verbosity(0), LevelFilter::Info);
        assert_eq!(verbosity(1), LevelFilter::Debug);
        assert_eq!(verbosity(9), LevelFilter::Trace);
        assert!(cpus() >= 1);
    }
}
