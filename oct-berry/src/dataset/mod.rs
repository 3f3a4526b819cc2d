//! 数据集操作: 示例数据下载与 npz 归档读写.

mod fetch;
mod npz_database;

pub use fetch::{fetch_examples, Fetch, FetchError, FetchReport, HttpFetcher};
pub use npz_database::{NpzArchive, OpenArchiveError};
