//! 多信号级联判定
//!
//! 检查顺序固定：结构检查 -> 两种哈希 -> 主嵌入 -> 次嵌入，满足条件即提前返回。

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::codec::Vector;
use crate::error::Result;
use crate::extract::{StructureProbe, Verifier};
use crate::metrics;
use crate::signal::{SignalEngine, SignalMatch};
use crate::store::ImageStore;
use crate::utils::{round2, timed};

/// 判定状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Status {
    Unique,
    Similar,
    Duplicate,
    Rejected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unique => "Unique",
            Status::Similar => "Similar",
            Status::Duplicate => "Duplicate",
            Status::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次检查的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Decision {
    pub status: Status,
    /// 0~100
    pub similarity_percentage: f64,
    /// 匹配到的图片来源标识
    pub matched_source: Option<String>,
    /// 给出判定的信号名；Rejected 时为拒绝原因
    pub method: Option<String>,
    /// 二次校验分数，0~1
    pub verification: Option<f64>,
    pub error: Option<String>,
    /// 提交成功后图片在存储中的来源标识
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_source: Option<String>,
}

impl Decision {
    pub fn unique() -> Self {
        Self {
            status: Status::Unique,
            similarity_percentage: 0.,
            matched_source: None,
            method: None,
            verification: None,
            error: None,
            stored_source: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self { status: Status::Rejected, method: Some(reason.into()), ..Self::unique() }
    }

    fn similar(method: String, similarity: f64, matched: &SignalMatch) -> Self {
        Self {
            status: Status::Similar,
            similarity_percentage: similarity,
            matched_source: matched.matched_source.clone(),
            method: Some(method),
            ..Self::unique()
        }
    }

    /// 带错误信息的 Unique 结果
    pub fn failed(error: impl ToString) -> Self {
        Self { error: Some(error.to_string()), ..Self::unique() }
    }
}

/// 级联判定的阈值
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 两种哈希相似度都大于该值时直接判定为相似，单位为百分比
    pub fast_accept: f64,
    /// 主嵌入相似度低于该值时直接判定为唯一，单位为百分比
    pub primary_floor: f64,
    /// 结构特征数量下限
    pub min_features: usize,
    /// 二次校验分数不小于该值时判定为重复
    pub verify_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { fast_accept: 92., primary_floor: 20., min_features: 3, verify_threshold: 0.8 }
    }
}

/// 级联判定器
///
/// 不持有任何持久化状态，只引用构造时传入的信号。
pub struct DecisionPipeline {
    config: PipelineConfig,
    hash_a: Arc<SignalEngine>,
    hash_b: Arc<SignalEngine>,
    primary: Arc<SignalEngine>,
    secondary: Arc<SignalEngine>,
    probe: Box<dyn StructureProbe>,
    verifier: Option<Box<dyn Verifier>>,
    store: Arc<ImageStore>,
}

impl DecisionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        hash_a: Arc<SignalEngine>,
        hash_b: Arc<SignalEngine>,
        primary: Arc<SignalEngine>,
        secondary: Arc<SignalEngine>,
        probe: Box<dyn StructureProbe>,
        verifier: Option<Box<dyn Verifier>>,
        store: Arc<ImageStore>,
    ) -> Self {
        Self { config, hash_a, hash_b, primary, secondary, probe, verifier, store }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// 按检查顺序返回所有信号
    pub fn signals(&self) -> [&SignalEngine; 4] {
        [self.hash_a.as_ref(), self.hash_b.as_ref(), self.primary.as_ref(), self.secondary.as_ref()]
    }

    /// 检查一张图片，总是返回一个完整的结果
    pub fn check(&self, image: &Path) -> Decision {
        let (decision, elapsed) = timed(|| match self.evaluate(image) {
            Ok(decision) => decision,
            Err(e) => {
                error!("检查 {} 失败: {e}", image.display());
                Decision::failed(e)
            }
        });
        debug!("{}: {} ({:?}), 耗时 {elapsed:.2?}", image.display(), decision.status, decision.method);
        metrics::observe_decision(
            decision.status.as_str(),
            decision.method.as_deref(),
            decision.similarity_percentage,
            elapsed,
        );
        decision
    }

    fn evaluate(&self, image: &Path) -> Result<Decision> {
        let features = self.probe.feature_count(image)?;
        if features < self.config.min_features {
            info!("{}: 特征点数量 {features} 过少", image.display());
            return Ok(Decision::rejected("insufficient_features"));
        }

        let a = self.hash_a.check(image)?;
        let b = self.hash_b.check(image)?;
        // 两种哈希都必须在各自的阈值内，相似度再与快速通过线比较
        let fast = |m: &SignalMatch| m.is_match && m.similarity > self.config.fast_accept;
        if fast(&a) && fast(&b) {
            let method = format!("{} & {}", self.hash_a.name(), self.hash_b.name());
            let similarity = round2((a.similarity + b.similarity) / 2.);
            return Ok(self.confirm(image, method, similarity, &a));
        }

        let primary = self.primary.check(image)?;
        if primary.is_match {
            let method = self.primary.name().to_string();
            return Ok(self.confirm(image, method, primary.similarity, &primary));
        }
        if primary.similarity < self.config.primary_floor {
            debug!("{}: {} 相似度 {:.2}% 低于下限", image.display(), self.primary.name(), primary.similarity);
            return Ok(Decision::unique());
        }

        let secondary = self.secondary.check(image)?;
        if secondary.is_match {
            let method = self.secondary.name().to_string();
            return Ok(self.confirm(image, method, secondary.similarity, &secondary));
        }
        Ok(Decision::unique())
    }

    /// 生成相似结果，必要时进行二次校验并升级为重复
    fn confirm(&self, image: &Path, method: String, similarity: f64, matched: &SignalMatch) -> Decision {
        let mut decision = Decision::similar(method, similarity, matched);

        if let (Some(verifier), Some(candidate)) = (&self.verifier, &matched.matched_path) {
            match verifier.verify(image, candidate) {
                Ok(score) => decision.verification = Some(score),
                Err(e) => warn!("二次校验 {} 失败: {e}", candidate.display()),
            }
        }

        let verified = decision.verification.is_some_and(|v| v >= self.config.verify_threshold);
        if similarity >= 100. || verified {
            decision.status = Status::Duplicate;
        }
        decision
    }

    /// 计算图片在所有信号下的向量并写入索引，但不持久化
    ///
    /// 所有特征提取完成后才会修改索引，提取失败时索引保持不变。
    pub fn index(&self, image: &Path, source_id: &str) -> Result<()> {
        let encoded = self
            .signals()
            .into_iter()
            .map(|signal| -> Result<_> { Ok((signal, signal.encode(image)?)) })
            .collect::<Result<Vec<(&SignalEngine, Vec<Vector>)>>>()?;

        for (signal, vectors) in &encoded {
            signal.add(vectors, source_id)?;
        }
        debug!("已添加 {} -> {source_id}", image.display());
        Ok(())
    }

    /// 将图片加入索引并持久化
    pub fn ingest(&self, image: &Path, source_id: &str) -> bool {
        let result = self.index(image, source_id).and_then(|_| self.persist());
        metrics::inc_ingest(result.is_ok());
        match result {
            Ok(()) => true,
            Err(e) => {
                error!("添加 {} 失败: {e}", image.display());
                false
            }
        }
    }

    /// 检查上传的图片，只有唯一的图片会被保存并加入索引
    pub fn submit(&self, image: &Path, file_name: &str) -> Decision {
        let mut decision = self.check(image);
        if decision.status != Status::Unique || decision.error.is_some() {
            return decision;
        }

        match self.store.store_upload(image, file_name) {
            Ok(source_id) => {
                if self.ingest(image, &source_id) {
                    info!("新图片已入库: {source_id}");
                    decision.stored_source = Some(source_id);
                } else {
                    decision.error = Some(format!("无法将 {source_id} 加入索引"));
                }
            }
            Err(e) => {
                error!("保存上传图片失败: {e}");
                decision.error = Some(e.to_string());
            }
        }
        decision
    }

    /// 持久化所有信号的索引
    pub fn persist(&self) -> Result<()> {
        for signal in self.signals() {
            signal.persist()?;
        }
        Ok(())
    }
}
