//! 示例数据下载.
//!
//! 下载是幂等的: 本地已存在的文件不会触发任何网络请求. 单个文件失败只记录日志,
//! 不影响其余文件.

use crate::consts::fetch::{ENDPOINT, TIMEOUT_SECS};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 下载错误.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// 构建 HTTP 客户端失败.
    #[error("failed to create http client: {0}")]
    Client(reqwest::Error),

    /// 请求失败, 或服务端返回非成功状态码.
    #[error("request for `{url}` failed: {source}")]
    Request {
        /// 请求地址.
        url: String,

        /// 底层错误.
        source: reqwest::Error,
    },

    /// 本地 I/O 错误.
    #[error("i/o error at `{path}`: {source}")]
    Io {
        /// 出错的路径.
        path: PathBuf,

        /// 底层错误.
        source: std::io::Error,
    },
}

/// 按远端文件 id 获取文件内容.
///
/// 抽象出网络层, 以便在测试中替换.
pub trait Fetch {
    /// 获取 `file_id` 对应文件的全部字节.
    fn fetch(&self, file_id: &str) -> Result<Vec<u8>, FetchError>;
}

/// 基于 `reqwest` 阻塞客户端的 HTTP 下载器. 请求地址为 `endpoint + file_id`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpFetcher {
    /// 以默认端点与默认超时创建.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_endpoint(ENDPOINT, Duration::from_secs(TIMEOUT_SECS))
    }

    /// 以指定端点与超时创建.
    pub fn with_endpoint(endpoint: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, file_id: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}{}", self.endpoint, file_id);
        let wrap = |source| FetchError::Request {
            url: url.clone(),
            source,
        };
        let bytes = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
            .map_err(wrap)?;
        Ok(bytes.to_vec())
    }
}

/// 一次批量下载的结果.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// 本次下载成功的文件名.
    pub downloaded: Vec<String>,

    /// 本地已存在而跳过的文件名.
    pub skipped: Vec<String>,

    /// 下载失败的文件名.
    pub failed: Vec<String>,
}

/// 将 `entries` (文件名, 远端 id) 中本地缺失的文件下载到 `dir`.
///
/// `dir` 不存在时会被创建; 仅当创建失败时返回 `Err`.
pub fn fetch_examples<F: Fetch + ?Sized>(
    dir: &Path,
    entries: &[(&str, &str)],
    fetcher: &F,
) -> Result<FetchReport, FetchError> {
    fs::create_dir_all(dir).map_err(|source| FetchError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut report = FetchReport::default();
    for &(filename, file_id) in entries {
        let path = dir.join(filename);
        if path.is_file() {
            log::info!("{filename} already exists, skipping download");
            report.skipped.push(filename.to_string());
            continue;
        }

        log::info!("Downloading {filename}...");
        match fetcher.fetch(file_id).and_then(|bytes| write_atomic(&path, &bytes)) {
            Ok(()) => {
                log::info!("Successfully downloaded {filename}");
                report.downloaded.push(filename.to_string());
            }
            Err(e) => {
                log::warn!("Error downloading {filename}: {e}");
                report.failed.push(filename.to_string());
            }
        }
    }
    Ok(report)
}

/// 先写入临时文件再重命名, 避免留下不完整的文件.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    let tmp = path.with_extension("part");
    let io_err = |p: &Path| {
        let path = p.to_path_buf();
        move |source: std::io::Error| FetchError::Io { path, source }
    };
    fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))
}
