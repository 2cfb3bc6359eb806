use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::DejaView;
use crate::embed::NpySidecar;

/// 应用状态
pub struct AppState {
    pub dejaview: DejaView,
    /// 上传图片的临时目录
    pub tmp_dir: PathBuf,
    /// 单次检查的超时时间
    pub timeout: Duration,
    /// 主嵌入和次嵌入的特征文件
    pub sidecars: [NpySidecar; 2],
    counter: AtomicU64,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(dejaview: DejaView, tmp_dir: PathBuf, timeout: Duration) -> io::Result<Arc<Self>> {
        fs::create_dir_all(&tmp_dir)?;
        let [_, _, primary, secondary] = dejaview.pipeline().signals();
        let sidecars = [NpySidecar::new(primary.name()), NpySidecar::new(secondary.name())];
        Ok(Arc::new(AppState { dejaview, tmp_dir, timeout, sidecars, counter: AtomicU64::new(0) }))
    }

    /// 为上传的文件分配一个不会冲突的临时路径
    pub fn tmp_path(&self, file_name: Option<&str>) -> PathBuf {
        let ext = file_name
            .and_then(|name| Path::new(name).extension())
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "bin".to_string());
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        self.tmp_dir.join(format!("upload-{}-{id}.{ext}", std::process::id()))
    }
}
