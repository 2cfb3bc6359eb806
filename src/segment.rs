use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::Vector;
use crate::error::{IndexError, LoadError};
use crate::hamming::{hamming, inner_product};
use crate::neighbor::{Neighbor, TopK};
use crate::utils::write_atomic;

const SEGMENT_MAGIC: [u8; 4] = *b"DVSG";
const SEGMENT_VERSION: u32 = 1;

/// 索引类型，决定距离计算方式和序列化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// 二进制编码，`bits` 为编码位数
    Binary { bits: usize },
    /// 已归一化的浮点向量，`dim` 为维度
    Float { dim: usize },
}

/// 相似度度量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// 汉明距离，越小越好
    Hamming,
    /// 内积，越大越好
    InnerProduct,
}

impl IndexKind {
    pub fn dimension(&self) -> usize {
        match *self {
            IndexKind::Binary { bits } => bits,
            IndexKind::Float { dim } => dim,
        }
    }

    pub fn metric(&self) -> Metric {
        match self {
            IndexKind::Binary { .. } => Metric::Hamming,
            IndexKind::Float { .. } => Metric::InnerProduct,
        }
    }

    /// 单个向量占用的字节数
    pub fn vector_bytes(&self) -> usize {
        match *self {
            IndexKind::Binary { bits } => bits.div_ceil(8),
            IndexKind::Float { dim } => dim * size_of::<f32>(),
        }
    }

    /// 将搜索得分转换为 0~100 的相似度百分比
    pub fn similarity_pct(&self, score: f32) -> f64 {
        let pct = match *self {
            IndexKind::Binary { bits } => (1. - score as f64 / bits as f64) * 100.,
            IndexKind::Float { .. } => score as f64 * 100.,
        };
        pct.clamp(0., 100.)
    }

    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Binary { .. } => "binary",
            IndexKind::Float { .. } => "float",
        }
    }
}

#[derive(Debug, Clone)]
enum Storage {
    /// 连续存放的二进制编码
    Binary(Vec<u8>),
    /// 连续存放的浮点向量
    Float(Vec<f32>),
}

/// 有容量上限的向量容器，段内搜索为精确的暴力扫描
#[derive(Debug, Clone)]
pub struct IndexSegment {
    kind: IndexKind,
    seq: u32,
    capacity: usize,
    count: usize,
    storage: Storage,
    /// 内存中的内容与磁盘不一致
    dirty: bool,
}

/// 分段文件的内容
#[derive(Serialize, Deserialize)]
struct SegmentFile {
    magic: [u8; 4],
    version: u32,
    kind: IndexKind,
    seq: u32,
    count: u64,
    data: Vec<u8>,
}

impl IndexSegment {
    pub fn new(kind: IndexKind, seq: u32, capacity: usize) -> Self {
        let storage = match kind {
            IndexKind::Binary { .. } => Storage::Binary(vec![]),
            IndexKind::Float { .. } => Storage::Float(vec![]),
        };
        Self { kind, seq, capacity, count: 0, storage, dirty: true }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 追加一个向量
    pub fn add(&mut self, vector: &Vector) -> Result<(), IndexError> {
        self.validate(vector)?;
        if self.is_full() {
            return Err(IndexError::Capacity { seq: self.seq, capacity: self.capacity });
        }
        match (&mut self.storage, vector) {
            (Storage::Binary(codes), Vector::Binary(code)) => codes.extend_from_slice(code.as_bytes()),
            (Storage::Float(values), Vector::Dense(v)) => values.extend_from_slice(v.as_slice()),
            _ => unreachable!("kind checked above"),
        }
        self.count += 1;
        self.dirty = true;
        Ok(())
    }

    /// 暴力搜索最好的 k 个向量，返回 (得分, 局部下标)
    ///
    /// 二进制向量得分为汉明距离，浮点向量得分为内积，相同得分时先插入的在前
    pub fn search(&self, query: &Vector, k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.validate(query)?;
        let k = k.min(self.count);
        if k == 0 {
            return Ok(vec![]);
        }
        let mut topk = TopK::new(self.kind.metric(), k);
        match (&self.storage, query) {
            (Storage::Binary(codes), Vector::Binary(q)) => {
                let q = q.as_bytes();
                for (i, code) in codes.chunks_exact(q.len()).enumerate() {
                    topk.push(Neighbor { score: hamming(q, code) as f32, index: i as u64 });
                }
            }
            (Storage::Float(values), Vector::Dense(q)) => {
                let q = q.as_slice();
                for (i, v) in values.chunks_exact(q.len()).enumerate() {
                    topk.push(Neighbor { score: inner_product(q, v), index: i as u64 });
                }
            }
            _ => unreachable!("kind checked above"),
        }
        Ok(topk.into_sorted_vec())
    }

    /// 检查向量类型和维度是否与分段一致
    pub fn validate(&self, vector: &Vector) -> Result<(), IndexError> {
        let matches_kind = matches!(
            (self.kind, vector),
            (IndexKind::Binary { .. }, Vector::Binary(_)) | (IndexKind::Float { .. }, Vector::Dense(_))
        );
        if !matches_kind {
            return Err(IndexError::KindMismatch { expected: self.kind });
        }
        if vector.width() != self.kind.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.kind.dimension(),
                actual: vector.width(),
            });
        }
        Ok(())
    }

    /// 写入文件，先写临时文件再重命名
    pub fn save(&mut self, path: impl AsRef<Path>) -> crate::Result<()> {
        let data = match &self.storage {
            Storage::Binary(codes) => codes.clone(),
            Storage::Float(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        };
        let file = SegmentFile {
            magic: SEGMENT_MAGIC,
            version: SEGMENT_VERSION,
            kind: self.kind,
            seq: self.seq,
            count: self.count as u64,
            data,
        };
        write_atomic(path, &bincode::serialize(&file)?)?;
        self.dirty = false;
        Ok(())
    }

    /// 从文件加载，类型或维度与期望不一致时报错
    pub fn load(
        path: impl AsRef<Path>,
        expected: IndexKind,
        capacity: usize,
    ) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let corrupt = |reason: String| LoadError::Corrupt { path: path.to_path_buf(), reason };

        let reader = File::open(path)
            .map(BufReader::new)
            .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
        let file: SegmentFile =
            bincode::deserialize_from(reader).map_err(|e| corrupt(e.to_string()))?;

        if file.magic != SEGMENT_MAGIC {
            return Err(corrupt("文件头不匹配".to_string()));
        }
        if file.version != SEGMENT_VERSION {
            return Err(corrupt(format!("不支持的版本 {}", file.version)));
        }
        if std::mem::discriminant(&file.kind) != std::mem::discriminant(&expected) {
            return Err(LoadError::KindMismatch {
                path: path.to_path_buf(),
                expected,
                actual: file.kind,
            });
        }
        if file.kind.dimension() != expected.dimension() {
            return Err(LoadError::DimensionMismatch {
                path: path.to_path_buf(),
                expected: expected.dimension(),
                actual: file.kind.dimension(),
            });
        }

        let count = file.count as usize;
        if file.data.len() != count * expected.vector_bytes() {
            return Err(corrupt(format!(
                "数据长度 {} 与向量数量 {count} 不符",
                file.data.len()
            )));
        }

        let storage = match expected {
            IndexKind::Binary { .. } => Storage::Binary(file.data),
            IndexKind::Float { .. } => Storage::Float(
                file.data
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            ),
        };

        Ok(Self { kind: expected, seq: file.seq, capacity, count, storage, dirty: false })
    }
}
