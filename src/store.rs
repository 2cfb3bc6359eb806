use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::debug;

/// 图片存储约定
///
/// 入库时记录的来源标识一律为相对于 `root` 的路径（使用 `/` 分隔），
/// 不在 `root` 下的图片记录绝对路径。查询时只需要 `root.join(id)` 即可定位文件，
/// 不需要任何猜测。
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    uploads: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let uploads = root.join("uploads");
        Self { root, uploads }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads(&self) -> &Path {
        &self.uploads
    }

    /// 计算图片的来源标识
    pub fn source_id(&self, image: &Path) -> String {
        let absolute = std::path::absolute(image).unwrap_or_else(|_| image.to_path_buf());
        let root = std::path::absolute(&self.root).unwrap_or_else(|_| self.root.clone());
        match absolute.strip_prefix(&root) {
            Ok(relative) => relative
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => absolute.to_string_lossy().into_owned(),
        }
    }

    /// 将来源标识解析为文件路径，文件不存在时返回 None
    pub fn resolve(&self, source_id: &str) -> Option<PathBuf> {
        let path = self.root.join(source_id);
        path.is_file().then_some(path)
    }

    /// 按内容哈希保存一张上传的图片，返回它的来源标识
    ///
    /// 相同内容的图片只会保存一份
    pub fn store_upload(&self, image: &Path, file_name: &str) -> io::Result<String> {
        let data = fs::read(image)?;
        let hash = blake3::hash(&data);
        let ext = Path::new(file_name)
            .extension()
            .or_else(|| image.extension())
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "bin".to_string());
        let name = format!("{}.{}", hash.to_hex(), ext);

        fs::create_dir_all(&self.uploads)?;
        let dest = self.uploads.join(&name);
        if !dest.exists() {
            fs::write(&dest, &data)?;
            debug!("保存上传图片: {}", dest.display());
        }
        Ok(self.source_id(&dest))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_source_id_relative_to_root() {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::new(dir.path());
        let image = dir.path().join("batch_1").join("cat.png");
        assert_eq!(store.source_id(&image), "batch_1/cat.png");

        let outside = Path::new("/somewhere/else/dog.jpg");
        assert_eq!(store.source_id(outside), "/somewhere/else/dog.jpg");
    }

    #[test]
    fn test_resolve_missing() {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::new(dir.path());
        fs::write(dir.path().join("a.png"), b"x").unwrap();
        assert_eq!(store.resolve("a.png"), Some(dir.path().join("a.png")));
        assert_eq!(store.resolve("b.png"), None);
    }

    #[test]
    fn test_store_upload_content_addressed() {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::new(dir.path().join("images"));
        let tmp = dir.path().join("upload.tmp");
        fs::write(&tmp, b"image bytes").unwrap();

        let id1 = store.store_upload(&tmp, "Photo.JPG").unwrap();
        let id2 = store.store_upload(&tmp, "other.JPG").unwrap();
        assert_eq!(id1, id2);
        assert!(id1.starts_with("uploads/"));
        assert!(id1.ends_with(".jpg"));
        assert!(store.resolve(&id1).is_some());
    }
}
