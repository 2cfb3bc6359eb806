use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use utoipa::ToSchema;

/// 上传请求
#[derive(TryFromMultipart)]
pub struct UploadRequest {
    pub file: FieldData<Bytes>,
    /// 主嵌入向量，`.npy` 格式
    pub primary: Option<FieldData<Bytes>>,
    /// 次嵌入向量，`.npy` 格式
    pub secondary: Option<FieldData<Bytes>>,
}

/// 上传表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct UploadForm {
    /// 上传的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// 外部编码器生成的主嵌入向量 (`.npy`)，缺少时主嵌入检查会失败
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub primary: Option<String>,
    /// 外部编码器生成的次嵌入向量 (`.npy`)
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub secondary: Option<String>,
}
