use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::segment::IndexKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// 向量编码错误，只影响当前这一次操作
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("编码宽度不匹配: 期望 {expected} 位, 实际 {actual} 位")]
    WidthMismatch { expected: usize, actual: usize },
    #[error("特征类型与索引类型不匹配: {0}")]
    KindMismatch(&'static str),
    #[error("向量中包含非有限数值")]
    NonFinite,
}

/// 索引内部错误
///
/// 这些错误属于防御性检查，正常运行时不应出现
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error("向量维度不匹配: 期望 {expected}, 实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("向量类型不匹配: 索引为 {expected:?}")]
    KindMismatch { expected: IndexKind },
    #[error("分段 {seq} 已满 ({capacity})")]
    Capacity { seq: u32, capacity: usize },
    #[error("索引锁已中毒")]
    Poisoned,
}

/// 启动时加载分片失败，任何情况下都不会跳过分片
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("读取 {path} 失败: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("文件 {path} 已损坏: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("分段 {path} 维度为 {actual}, 期望 {expected}")]
    DimensionMismatch { path: PathBuf, expected: usize, actual: usize },
    #[error("分段 {path} 类型为 {actual:?}, 期望 {expected:?}")]
    KindMismatch { path: PathBuf, expected: IndexKind, actual: IndexKind },
    #[error("{prefix} 缺少分段 {seq}")]
    MissingSegment { prefix: String, seq: u32 },
    #[error("{prefix} 路径数量为 {paths}, 但向量总数为 {vectors}")]
    PathCountMismatch { prefix: String, paths: usize, vectors: usize },
}

/// 外部特征提取失败，作用域为单次查询
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("无法读取图片 {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("特征提取器不可用: {0}")]
    Unavailable(String),
    #[error("特征提取结果异常: {0}")]
    Malformed(String),
    #[error("特征提取超时")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),
    #[error("序列化错误: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<opencv::Error> for ExtractionError {
    fn from(e: opencv::Error) -> Self {
        ExtractionError::Malformed(e.to_string())
    }
}
