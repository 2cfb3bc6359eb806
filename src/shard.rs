use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, info};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;

use crate::codec::Vector;
use crate::error::{IndexError, LoadError};
use crate::neighbor::{Neighbor, TopK};
use crate::segment::{IndexKind, IndexSegment};
use crate::utils::write_atomic;

/// 单个信号的分片配置
#[derive(Debug, Clone)]
pub struct ShardConfig {
    /// 分段文件所在目录
    pub dir: PathBuf,
    /// 文件名前缀，如 `phash`、`dino`
    pub prefix: String,
    pub kind: IndexKind,
    /// 单个分段的最大向量数量
    pub max_vectors: usize,
    /// 分段写满封存时立即写盘
    pub persist_on_seal: bool,
}

impl ShardConfig {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            kind,
            max_vectors: 1_000_000,
            persist_on_seal: true,
        }
    }

    pub fn max_vectors(mut self, max_vectors: usize) -> Self {
        self.max_vectors = max_vectors.max(1);
        self
    }

    pub fn persist_on_seal(mut self, persist_on_seal: bool) -> Self {
        self.persist_on_seal = persist_on_seal;
        self
    }

    /// 返回指定序号的分段文件路径
    pub fn segment_path(&self, seq: u32) -> PathBuf {
        self.dir.join(format!("{}_{}.seg", self.prefix, seq))
    }

    /// 返回路径列表文件的路径
    pub fn paths_path(&self) -> PathBuf {
        self.dir.join(format!("{}_paths.bin", self.prefix))
    }
}

/// 分片统计信息
#[derive(Debug, Clone, Serialize)]
pub struct ShardStats {
    pub prefix: String,
    pub kind: &'static str,
    pub dimension: usize,
    pub segments: Vec<usize>,
    pub total_vectors: usize,
    pub total_paths: usize,
}

/// 由若干磁盘分段组成的逻辑索引
///
/// 对外表现为一个不断增长的索引：第 N 个添加的向量全局下标为 N - 1，
/// 与 `paths` 中来源标识的位置一一对应。只有序号最大的分段可以写入。
pub struct ShardManager {
    config: ShardConfig,
    /// 按序号升序排列，最后一个为活动分段
    segments: Vec<IndexSegment>,
    paths: Vec<String>,
}

impl ShardManager {
    /// 创建一个空的分片，不读取磁盘
    pub fn create(config: ShardConfig) -> Self {
        let segment = IndexSegment::new(config.kind, 0, config.max_vectors);
        Self { config, segments: vec![segment], paths: vec![] }
    }

    /// 从磁盘加载所有分段和路径列表，不存在时初始化为空
    ///
    /// 任何一个分段无法读取、维度不符或序号不连续都会导致加载失败
    pub fn load(config: ShardConfig) -> Result<Self, LoadError> {
        fs::create_dir_all(&config.dir)
            .map_err(|source| LoadError::Io { path: config.dir.clone(), source })?;

        let files = discover_segments(&config.dir, &config.prefix)?;
        let mut segments = Vec::with_capacity(files.len());
        for (expected_seq, (seq, path)) in files.into_iter().enumerate() {
            if seq != expected_seq as u32 {
                return Err(LoadError::MissingSegment {
                    prefix: config.prefix.clone(),
                    seq: expected_seq as u32,
                });
            }
            debug!("加载分段: {}", path.display());
            let segment = IndexSegment::load(&path, config.kind, config.max_vectors)?;
            if segment.seq() != seq {
                return Err(LoadError::Corrupt {
                    path,
                    reason: format!("文件内序号为 {}", segment.seq()),
                });
            }
            info!("分段 {}_{}: {} 个向量", config.prefix, seq, segment.len());
            segments.push(segment);
        }

        let paths = load_paths(&config.paths_path())?;
        let vectors = segments.iter().map(IndexSegment::len).sum::<usize>();
        if vectors != paths.len() {
            return Err(LoadError::PathCountMismatch {
                prefix: config.prefix.clone(),
                paths: paths.len(),
                vectors,
            });
        }

        if segments.is_empty() {
            info!("{} 没有已保存的分段，创建分段 0", config.prefix);
            segments.push(IndexSegment::new(config.kind, 0, config.max_vectors));
        }

        info!("{} 初始化完成: {} 个分段共 {} 个向量", config.prefix, segments.len(), vectors);
        Ok(Self { config, segments, paths })
    }

    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    pub fn kind(&self) -> IndexKind {
        self.config.kind
    }

    pub fn segments(&self) -> &[IndexSegment] {
        &self.segments
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn total_vectors(&self) -> usize {
        self.segments.iter().map(IndexSegment::len).sum()
    }

    /// 返回全局下标对应的来源标识
    pub fn source(&self, global_index: u64) -> Option<&str> {
        self.paths.get(global_index as usize).map(String::as_str)
    }

    /// 将全局下标转换为 (分段序号, 局部下标)
    pub fn locate(&self, global_index: u64) -> Option<(u32, usize)> {
        let global_index = global_index as usize;
        let mut offset = 0;
        for segment in &self.segments {
            if global_index < offset + segment.len() {
                return Some((segment.seq(), global_index - offset));
            }
            offset += segment.len();
        }
        None
    }

    /// 检查向量是否可以写入本分片
    pub fn validate(&self, vector: &Vector) -> Result<(), IndexError> {
        self.active().validate(vector)
    }

    /// 添加一个向量，返回它的全局下标
    ///
    /// 活动分段已满时先封存它并创建新的分段
    pub fn add(&mut self, vector: &Vector, source_id: &str) -> crate::Result<u64> {
        self.validate(vector)?;
        if self.active().is_full() {
            self.rotate()?;
        }
        let global_index = self.paths.len() as u64;
        self.active_mut().add(vector)?;
        self.paths.push(source_id.to_string());
        Ok(global_index)
    }

    /// 封存活动分段并创建新的活动分段
    fn rotate(&mut self) -> crate::Result<()> {
        let seq = self.active().seq();
        info!("分段 {}_{} 已满 ({} 个向量)，创建新分段", self.config.prefix, seq, self.active().len());
        if self.config.persist_on_seal {
            // 路径列表与封存的分段一起写入，磁盘上的数据始终可以加载
            fs::create_dir_all(&self.config.dir)?;
            let path = self.config.segment_path(seq);
            self.active_mut().save(path)?;
            self.write_paths()?;
        }
        self.segments.push(IndexSegment::new(self.config.kind, seq + 1, self.config.max_vectors));
        Ok(())
    }

    /// 在所有分段中搜索，返回全局最好的 k 个结果 (得分, 全局下标)
    pub fn search(&self, query: &Vector, k: usize) -> Result<Vec<Neighbor>, IndexError> {
        let per_segment = self
            .segments
            .par_iter()
            .map(|segment| segment.search(query, k))
            .collect::<Result<Vec<_>, _>>()?;

        let mut topk = TopK::new(self.config.kind.metric(), k);
        let mut offset = 0u64;
        for (segment, neighbors) in self.segments.iter().zip(per_segment) {
            topk.extend(
                neighbors
                    .into_iter()
                    .map(|n| Neighbor { score: n.score, index: offset + n.index }),
            );
            offset += segment.len() as u64;
        }
        Ok(topk.into_sorted_vec())
    }

    /// 将未保存的分段（通常只有活动分段）和路径列表写入磁盘
    pub fn persist(&mut self) -> crate::Result<()> {
        fs::create_dir_all(&self.config.dir)?;
        for segment in self.segments.iter_mut().filter(|s| s.is_dirty()) {
            let path = self.config.segment_path(segment.seq());
            segment.save(&path)?;
            debug!("已保存分段: {}", path.display());
        }
        self.write_paths()?;
        debug!("{} 已持久化，共 {} 条路径", self.config.prefix, self.paths.len());
        Ok(())
    }

    fn write_paths(&self) -> crate::Result<()> {
        write_atomic(self.config.paths_path(), &bincode::serialize(&self.paths)?)?;
        Ok(())
    }

    pub fn stats(&self) -> ShardStats {
        ShardStats {
            prefix: self.config.prefix.clone(),
            kind: self.config.kind.name(),
            dimension: self.config.kind.dimension(),
            segments: self.segments.iter().map(IndexSegment::len).collect(),
            total_vectors: self.total_vectors(),
            total_paths: self.paths.len(),
        }
    }

    fn active(&self) -> &IndexSegment {
        // segments 在构造时至少有一个元素，之后只增不减
        &self.segments[self.segments.len() - 1]
    }

    fn active_mut(&mut self) -> &mut IndexSegment {
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }
}

/// 查找目录下属于 `prefix` 的分段文件，按序号升序返回
fn discover_segments(dir: &Path, prefix: &str) -> Result<Vec<(u32, PathBuf)>, LoadError> {
    let io_err = |source: io::Error| LoadError::Io { path: dir.to_path_buf(), source };
    let re = Regex::new(&format!(r"^{}_(\d+)\.seg$", regex::escape(prefix)))
        .map_err(|e| LoadError::Corrupt { path: dir.to_path_buf(), reason: e.to_string() })?;

    let mut files = vec![];
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(seq) = re.captures(name).and_then(|c| c[1].parse::<u32>().ok()) else {
            continue;
        };
        files.push((seq, path));
    }
    files.sort();
    Ok(files)
}

fn load_paths(path: &Path) -> Result<Vec<String>, LoadError> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let reader = File::open(path)
        .map(BufReader::new)
        .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
    bincode::deserialize_from(reader)
        .map_err(|e| LoadError::Corrupt { path: path.to_path_buf(), reason: e.to_string() })
}
