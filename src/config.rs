use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;
use crate::context::{DejaViewConfig, DenseSignal, HashSignal};
use crate::pipeline::PipelineConfig;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "dejaview", "dejaview").expect("failed to get project dir");
    ConfDir { path: proj_dirs.data_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap()
}

#[derive(Parser, Debug, Clone)]
pub struct IndexOptions {
    /// 单个分段的最大向量数量，写满后创建新的分段
    #[arg(long, value_name = "N", default_value_t = 1_000_000)]
    pub max_vectors: usize,
    /// 分段写满时不立即写盘，等到下次持久化
    #[arg(long)]
    pub no_persist_on_seal: bool,
    /// pHash 位数
    #[arg(long, value_name = "BITS", default_value_t = 64)]
    pub phash_bits: usize,
    /// wHash 位数
    #[arg(long, value_name = "BITS", default_value_t = 64)]
    pub whash_bits: usize,
    /// 主嵌入信号名，同时也是 `.npy` 特征文件的后缀
    #[arg(long, value_name = "NAME", default_value = "dino")]
    pub primary_name: String,
    /// 主嵌入维度
    #[arg(long, value_name = "DIM", default_value_t = 768)]
    pub primary_dim: usize,
    /// 次嵌入信号名
    #[arg(long, value_name = "NAME", default_value = "clip")]
    pub secondary_name: String,
    /// 次嵌入维度
    #[arg(long, value_name = "DIM", default_value_t = 768)]
    pub secondary_dim: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct ThresholdOptions {
    /// pHash 允许的最大汉明距离
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub phash_threshold: u32,
    /// wHash 允许的最大汉明距离
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub whash_threshold: u32,
    /// 主嵌入的最小余弦相似度
    #[arg(long, value_name = "SIM", default_value_t = 0.55)]
    pub primary_threshold: f32,
    /// 次嵌入的最小余弦相似度
    #[arg(long, value_name = "SIM", default_value_t = 0.59)]
    pub secondary_threshold: f32,
    /// 两种哈希相似度都超过该百分比时直接判定为相似
    #[arg(long, value_name = "PCT", default_value_t = 92.)]
    pub fast_accept: f64,
    /// 主嵌入相似度低于该百分比时直接判定为唯一
    #[arg(long, value_name = "PCT", default_value_t = 20.)]
    pub primary_floor: f64,
    /// 最少 ORB 特征点，低于该值的图片会被拒绝
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub min_features: usize,
    /// 启用直方图二次校验
    #[arg(long)]
    pub verify: bool,
    /// 二次校验分数达到该值时判定为重复
    #[arg(long, value_name = "SCORE", default_value_t = 0.8)]
    pub verify_threshold: f64,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "dejaview", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// dejaview 数据目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 添加图片到索引
    Add(AddCommand),
    /// 检查图片是否与已有图片重复
    Check(CheckCommand),
    /// 检查图片，如果是新图片则保存并入库
    Submit(SubmitCommand),
    /// 显示索引统计信息
    Stats(StatsCommand),
    /// 启动 HTTP 服务
    Server(ServerCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回分段文件目录
    pub fn indices(&self) -> PathBuf {
        self.path.join("indices")
    }

    /// 返回图片存储根目录
    pub fn images(&self) -> PathBuf {
        self.path.join("images")
    }

    /// 返回上传图片目录
    pub fn uploads(&self) -> PathBuf {
        self.images().join("uploads")
    }

    /// 组合命令行参数，生成运行配置
    pub fn dejaview_config(&self, index: &IndexOptions, threshold: &ThresholdOptions) -> DejaViewConfig {
        DejaViewConfig {
            max_vectors: index.max_vectors,
            persist_on_seal: !index.no_persist_on_seal,
            phash: HashSignal {
                name: "phash".to_string(),
                bits: index.phash_bits,
                max_distance: threshold.phash_threshold,
            },
            whash: HashSignal {
                name: "whash".to_string(),
                bits: index.whash_bits,
                max_distance: threshold.whash_threshold,
            },
            primary: DenseSignal {
                name: index.primary_name.clone(),
                dim: index.primary_dim,
                min_similarity: threshold.primary_threshold,
            },
            secondary: DenseSignal {
                name: index.secondary_name.clone(),
                dim: index.secondary_dim,
                min_similarity: threshold.secondary_threshold,
            },
            pipeline: PipelineConfig {
                fast_accept: threshold.fast_accept,
                primary_floor: threshold.primary_floor,
                min_features: threshold.min_features,
                verify_threshold: threshold.verify_threshold,
            },
            verify: threshold.verify,
            ..DejaViewConfig::new(self.indices(), self.images())
        }
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// 每行一个结果
    Table,
    /// JSON 格式
    Json,
}
