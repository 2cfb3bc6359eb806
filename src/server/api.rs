use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum_typed_multipart::TypedMultipart;
use log::{info, warn};
use tokio::task::{block_in_place, spawn_blocking};
use tokio::time::timeout;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::pipeline::Decision;
use crate::shard::ShardStats;

/// 检查一张图片是否与已有图片重复
#[utoipa::path(
    post,
    path = "/check",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = Decision),
    )
)]
pub async fn check_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<UploadRequest>,
) -> Result<Json<Decision>> {
    let upload = save_upload(&state, &data).await?;
    info!("正在检查上传图片: {}", upload.file_name);

    let decision = run_with_timeout(&state, upload, |state, upload| state.dejaview.check(&upload.path)).await;
    Ok(Json(decision))
}

/// 检查一张图片，如果是新图片则保存并入库
///
/// 超时返回 Rejected 时后台任务仍在运行，图片之后仍可能被保存并入库，
/// 因此重试可能得到与这次上传自身重复的结果。
#[utoipa::path(
    post,
    path = "/submit",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = Decision),
    )
)]
pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<UploadRequest>,
) -> Result<Json<Decision>> {
    let upload = save_upload(&state, &data).await?;
    info!("收到上传图片: {}", upload.file_name);

    let decision = run_with_timeout(&state, upload, |state, upload| {
        state.dejaview.submit(&upload.path, &upload.file_name)
    })
    .await;
    Ok(Json(decision))
}

/// 获取索引统计信息
#[utoipa::path(get, path = "/stats")]
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ShardStats>>> {
    let stats = block_in_place(|| state.dejaview.stats())?;
    Ok(Json(stats))
}

/// Prometheus 指标
#[utoipa::path(get, path = "/metrics")]
pub async fn metrics_handler() -> String {
    crate::metrics::gather_text()
}

/// 保存在临时目录中的上传内容
struct SavedUpload {
    path: PathBuf,
    file_name: String,
    /// 随图片上传的嵌入向量文件
    sidecars: Vec<PathBuf>,
}

impl SavedUpload {
    fn remove(&self) {
        for path in std::iter::once(&self.path).chain(&self.sidecars) {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("无法删除临时文件 {}: {e}", path.display());
            }
        }
    }
}

/// 将上传的图片写入临时文件，嵌入向量写在旁边作为特征文件
async fn save_upload(state: &AppState, data: &UploadRequest) -> Result<SavedUpload> {
    let file_name = data.file.metadata.file_name.clone().unwrap_or_default();
    let path = state.tmp_path(Some(&file_name));
    tokio::fs::write(&path, &data.file.contents).await?;

    let mut sidecars = vec![];
    for (sidecar, field) in state.sidecars.iter().zip([&data.primary, &data.secondary]) {
        if let Some(field) = field {
            let sidecar_path = sidecar.sidecar_path(&path);
            tokio::fs::write(&sidecar_path, &field.contents).await?;
            sidecars.push(sidecar_path);
        }
    }
    Ok(SavedUpload { path, file_name, sidecars })
}

/// 在阻塞线程中运行判定，超时返回 Rejected
///
/// 超时后后台任务不会被取消，已经开始的入库会正常完成，临时文件由任务自己删除。
/// 此时结果未知，返回的 Rejected 会在 error 中注明。
async fn run_with_timeout<F>(state: &Arc<AppState>, upload: SavedUpload, f: F) -> Decision
where
    F: FnOnce(&AppState, &SavedUpload) -> Decision + Send + 'static,
{
    let limit = state.timeout;
    let state = state.clone();
    let task = spawn_blocking(move || {
        let decision = f(state.as_ref(), &upload);
        upload.remove();
        decision
    });
    match timeout(limit, task).await {
        Ok(Ok(decision)) => decision,
        Ok(Err(e)) => Decision::failed(e),
        Err(_) => {
            warn!("图片检查超时");
            Decision {
                error: Some("处理超时，后台任务仍可能完成入库".to_string()),
                ..Decision::rejected("timeout")
            }
        }
    }
}
