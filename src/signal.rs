use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, warn};
use serde::Serialize;

use crate::codec::{Vector, VectorCodec};
use crate::error::{IndexError, Result};
use crate::extract::Extractor;
use crate::shard::{ShardConfig, ShardManager, ShardStats};
use crate::store::ImageStore;
use crate::utils::round2;

/// 判定为匹配的阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    /// 汉明距离不大于该值
    MaxDistance(u32),
    /// 内积（余弦相似度）不小于该值
    MinSimilarity(f32),
}

impl Threshold {
    pub fn accepts(&self, score: f32) -> bool {
        match *self {
            Threshold::MaxDistance(max) => score <= max as f32,
            Threshold::MinSimilarity(min) => score >= min,
        }
    }
}

/// 单个信号的配置
#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub name: String,
    pub shard: ShardConfig,
    pub threshold: Threshold,
    /// 入库时是否同时添加几何变换后的特征
    pub augment: bool,
}

/// 单个信号的检查结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalMatch {
    pub is_match: bool,
    /// 0~100
    pub similarity: f64,
    /// 最相似图片的来源标识
    pub matched_source: Option<String>,
    #[serde(skip)]
    pub matched_path: Option<PathBuf>,
}

impl SignalMatch {
    pub fn none() -> Self {
        Self::default()
    }
}

/// 一种相似度信号：特征提取器 + 分片索引 + 阈值
pub struct SignalEngine {
    name: String,
    codec: VectorCodec,
    threshold: Threshold,
    augment: bool,
    extractor: Box<dyn Extractor>,
    shard: RwLock<ShardManager>,
    store: Arc<ImageStore>,
}

impl SignalEngine {
    pub fn new(
        config: SignalConfig,
        shard: ShardManager,
        extractor: Box<dyn Extractor>,
        store: Arc<ImageStore>,
    ) -> Self {
        Self {
            name: config.name,
            codec: VectorCodec::new(config.shard.kind),
            threshold: config.threshold,
            augment: config.augment,
            extractor,
            shard: RwLock::new(shard),
            store,
        }
    }

    /// 从磁盘加载索引并创建信号
    pub fn open(
        config: SignalConfig,
        extractor: Box<dyn Extractor>,
        store: Arc<ImageStore>,
    ) -> Result<Self> {
        let shard = ShardManager::load(config.shard.clone())?;
        Ok(Self::new(config, shard, extractor, store))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// 检查图片是否与已入库的图片相似
    pub fn check(&self, image: &Path) -> Result<SignalMatch> {
        let raw = self.extractor.extract(image)?;
        let vector = self.codec.encode(&raw)?;
        Ok(self.check_vector(&vector)?)
    }

    /// 使用已经编码好的向量检查
    pub fn check_vector(&self, vector: &Vector) -> Result<SignalMatch, IndexError> {
        let shard = self.read()?;
        let Some(best) = shard.search(vector, 1)?.into_iter().next() else {
            return Ok(SignalMatch::none());
        };

        let similarity = round2(shard.kind().similarity_pct(best.score));
        let is_match = self.threshold.accepts(best.score);
        debug!("{}: 最佳得分 {} (#{}), 相似度 {similarity:.2}%", self.name, best.score, best.index);

        let Some(source) = shard.source(best.index) else {
            warn!("{}: 全局下标 {} 没有对应的来源", self.name, best.index);
            return Ok(SignalMatch::none());
        };
        let Some(path) = self.store.resolve(source) else {
            warn!("{}: 索引中的图片已不存在: {source}", self.name);
            return Ok(SignalMatch::none());
        };

        Ok(SignalMatch {
            is_match,
            similarity,
            matched_source: Some(source.to_string()),
            matched_path: Some(path),
        })
    }

    /// 计算入库所需的全部向量
    pub fn encode(&self, image: &Path) -> Result<Vec<Vector>> {
        let raws = match self.augment {
            true => self.extractor.extract_augmented(image)?,
            false => vec![self.extractor.extract(image)?],
        };
        let vectors = raws.iter().map(|raw| self.codec.encode(raw)).collect::<Result<_, _>>()?;
        Ok(vectors)
    }

    /// 将一组向量添加到索引，全部映射到同一个来源标识
    pub fn add(&self, vectors: &[Vector], source_id: &str) -> Result<()> {
        let mut shard = self.write()?;
        // 先全部校验，避免只写入一部分
        for vector in vectors {
            shard.validate(vector)?;
        }
        for vector in vectors {
            shard.add(vector, source_id)?;
        }
        Ok(())
    }

    pub fn persist(&self) -> Result<()> {
        self.write()?.persist()
    }

    pub fn stats(&self) -> Result<ShardStats> {
        Ok(self.read()?.stats())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ShardManager>, IndexError> {
        self.shard.read().map_err(|_| IndexError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ShardManager>, IndexError> {
        self.shard.write().map_err(|_| IndexError::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::codec::RawFeature;
    use crate::error::ExtractionError;
    use crate::segment::IndexKind;

    fn engine(dir: &Path, threshold: Threshold) -> SignalEngine {
        let kind = IndexKind::Binary { bits: 64 };
        let config = SignalConfig {
            name: "phash".to_string(),
            shard: ShardConfig::new(dir.join("indices"), "phash", kind),
            threshold,
            augment: false,
        };
        let extractor = |_: &Path| -> Result<RawFeature, ExtractionError> {
            Ok(RawFeature::Packed(vec![0; 8]))
        };
        let store = Arc::new(ImageStore::new(dir));
        SignalEngine::new(config.clone(), ShardManager::create(config.shard), Box::new(extractor), store)
    }

    fn code_with_distance(engine: &SignalEngine, distance: usize) -> Vector {
        let mut bits = vec![false; 64];
        bits.iter_mut().take(distance).for_each(|b| *b = true);
        engine.codec.encode_binary_hash(&bits).unwrap()
    }

    #[test]
    fn test_threshold_boundary() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.png"), b"a").unwrap();
        let engine = engine(dir.path(), Threshold::MaxDistance(4));

        engine.add(&[code_with_distance(&engine, 4)], "a.png").unwrap();
        let result = engine.check(Path::new("query.png")).unwrap();
        assert!(result.is_match);
        assert_eq!(result.similarity, 93.75);
        assert_eq!(result.matched_source.as_deref(), Some("a.png"));

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.png"), b"a").unwrap();
        let engine2 = self::engine(dir.path(), Threshold::MaxDistance(4));
        engine2.add(&[code_with_distance(&engine2, 5)], "a.png").unwrap();
        let result = engine2.check(Path::new("query.png")).unwrap();
        assert!(!result.is_match);
        assert_eq!(result.similarity, 92.19);
    }

    #[test]
    fn test_empty_index() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path(), Threshold::MaxDistance(4));
        assert_eq!(engine.check(Path::new("query.png")).unwrap(), SignalMatch::none());
    }

    #[test]
    fn test_stale_entry_is_no_match() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path(), Threshold::MaxDistance(4));
        engine.add(&[code_with_distance(&engine, 0)], "deleted.png").unwrap();
        let result = engine.check(Path::new("query.png")).unwrap();
        assert!(!result.is_match);
        assert_eq!(result.matched_source, None);
        assert_eq!(result.similarity, 0.);
    }

    #[test]
    fn test_threshold_accepts() {
        assert!(Threshold::MinSimilarity(0.55).accepts(0.55));
        assert!(!Threshold::MinSimilarity(0.55).accepts(0.549));
        assert!(Threshold::MaxDistance(0).accepts(0.));
        assert!(!Threshold::MaxDistance(0).accepts(1.));
    }
}
