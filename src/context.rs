use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use crate::embed::NpySidecar;
use crate::error::Result;
use crate::extract::{Extractor, StructureProbe, Verifier};
use crate::pipeline::{Decision, DecisionPipeline, PipelineConfig};
use crate::segment::IndexKind;
use crate::shard::{ShardConfig, ShardStats};
use crate::signal::{SignalConfig, SignalEngine, Threshold};
use crate::store::ImageStore;
use crate::vision::{HashAlgorithm, HistogramVerifier, ImageHasher, OrbProbe};

/// 二进制哈希信号的参数
#[derive(Debug, Clone)]
pub struct HashSignal {
    pub name: String,
    pub bits: usize,
    /// 允许的最大汉明距离
    pub max_distance: u32,
}

/// 浮点嵌入信号的参数
#[derive(Debug, Clone)]
pub struct DenseSignal {
    pub name: String,
    pub dim: usize,
    /// 最小余弦相似度
    pub min_similarity: f32,
}

#[derive(Debug, Clone)]
pub struct DejaViewConfig {
    /// 分段文件目录
    pub index_dir: PathBuf,
    /// 图片存储根目录
    pub image_root: PathBuf,
    pub max_vectors: usize,
    pub persist_on_seal: bool,
    pub phash: HashSignal,
    pub whash: HashSignal,
    pub primary: DenseSignal,
    pub secondary: DenseSignal,
    pub pipeline: PipelineConfig,
    /// 是否启用二次校验
    pub verify: bool,
}

impl DejaViewConfig {
    pub fn new(index_dir: impl Into<PathBuf>, image_root: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            image_root: image_root.into(),
            max_vectors: 1_000_000,
            persist_on_seal: true,
            phash: HashSignal { name: "phash".to_string(), bits: 64, max_distance: 4 },
            whash: HashSignal { name: "whash".to_string(), bits: 64, max_distance: 4 },
            primary: DenseSignal { name: "dino".to_string(), dim: 768, min_similarity: 0.55 },
            secondary: DenseSignal { name: "clip".to_string(), dim: 768, min_similarity: 0.59 },
            pipeline: PipelineConfig::default(),
            verify: false,
        }
    }

    fn shard(&self, name: &str, kind: IndexKind) -> ShardConfig {
        ShardConfig::new(&self.index_dir, name, kind)
            .max_vectors(self.max_vectors)
            .persist_on_seal(self.persist_on_seal)
    }

    fn hash_signal(&self, signal: &HashSignal) -> SignalConfig {
        SignalConfig {
            name: signal.name.clone(),
            shard: self.shard(&signal.name, IndexKind::Binary { bits: signal.bits }),
            threshold: Threshold::MaxDistance(signal.max_distance),
            augment: true,
        }
    }

    fn dense_signal(&self, signal: &DenseSignal) -> SignalConfig {
        SignalConfig {
            name: signal.name.clone(),
            shard: self.shard(&signal.name, IndexKind::Float { dim: signal.dim }),
            threshold: Threshold::MinSimilarity(signal.min_similarity),
            augment: false,
        }
    }
}

/// 各信号使用的外部协作者
pub struct Collaborators {
    pub phash: Box<dyn Extractor>,
    pub whash: Box<dyn Extractor>,
    pub primary: Box<dyn Extractor>,
    pub secondary: Box<dyn Extractor>,
    pub probe: Box<dyn StructureProbe>,
    pub verifier: Option<Box<dyn Verifier>>,
}

impl Collaborators {
    /// OpenCV 哈希和特征点，嵌入向量从 `.npy` 文件读取
    pub fn opencv(config: &DejaViewConfig) -> Self {
        Self {
            phash: Box::new(ImageHasher::new(HashAlgorithm::PHash)),
            whash: Box::new(ImageHasher::new(HashAlgorithm::WHash)),
            primary: Box::new(NpySidecar::new(&config.primary.name)),
            secondary: Box::new(NpySidecar::new(&config.secondary.name)),
            probe: Box::new(OrbProbe),
            verifier: match config.verify {
                true => Some(Box::new(HistogramVerifier::default()) as Box<dyn Verifier>),
                false => None,
            },
        }
    }
}

/// 整个系统的上下文，启动时创建一次，退出前调用 [`DejaView::shutdown`]
pub struct DejaView {
    pipeline: DecisionPipeline,
    store: Arc<ImageStore>,
}

impl DejaView {
    /// 使用默认的协作者打开
    pub fn open(config: &DejaViewConfig) -> Result<Self> {
        Self::open_with(config, Collaborators::opencv(config))
    }

    pub fn open_with(config: &DejaViewConfig, collaborators: Collaborators) -> Result<Self> {
        let store = Arc::new(ImageStore::new(&config.image_root));
        let open = |signal: SignalConfig, extractor: Box<dyn Extractor>| -> Result<Arc<SignalEngine>> {
            Ok(Arc::new(SignalEngine::open(signal, extractor, store.clone())?))
        };

        let phash = open(config.hash_signal(&config.phash), collaborators.phash)?;
        let whash = open(config.hash_signal(&config.whash), collaborators.whash)?;
        let primary = open(config.dense_signal(&config.primary), collaborators.primary)?;
        let secondary = open(config.dense_signal(&config.secondary), collaborators.secondary)?;

        let pipeline = DecisionPipeline::new(
            config.pipeline.clone(),
            phash,
            whash,
            primary,
            secondary,
            collaborators.probe,
            collaborators.verifier,
            store.clone(),
        );
        info!("DejaView 已加载: {}", config.index_dir.display());
        Ok(Self { pipeline, store })
    }

    pub fn pipeline(&self) -> &DecisionPipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn check(&self, image: &Path) -> Decision {
        self.pipeline.check(image)
    }

    pub fn submit(&self, image: &Path, file_name: &str) -> Decision {
        self.pipeline.submit(image, file_name)
    }

    pub fn stats(&self) -> Result<Vec<ShardStats>> {
        self.pipeline.signals().iter().map(|s| s.stats()).collect()
    }

    /// 写入所有未保存的数据
    pub fn shutdown(self) -> Result<()> {
        self.pipeline.persist()?;
        info!("DejaView 已关闭");
        Ok(())
    }
}
