use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use axum::extract::Multipart;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024; // 10MB
pub const MAX_DOCUMENT_SIZE: usize = 20 * 1024 * 1024; // 20MB

pub struct FileService {
    client: Client,
    bucket: String,
    public_url: Option<String>,
}

/// A single file pulled out of a multipart body.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Document,
}

impl UploadKind {
    fn accepts(self, content_type: &str) -> bool {
        match self {
            UploadKind::Image => validate_image_content_type(content_type),
            UploadKind::Document => validate_document_content_type(content_type),
        }
    }

    fn max_size(self) -> usize {
        match self {
            UploadKind::Image => MAX_IMAGE_SIZE,
            UploadKind::Document => MAX_DOCUMENT_SIZE,
        }
    }
}

impl FileService {
    pub async fn new(config: &Config) -> AppResult<Self> {
        let credentials = Credentials::new(
            &config.minio_access_key,
            &config.minio_secret_key,
            None,
            None,
            "society-backend",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("us-east-1"))
            .endpoint_url(&config.minio_endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.minio_bucket.clone(),
            public_url: config.minio_public_url.clone(),
        })
    }

    pub async fn upload_file(&self, folder: &str, file: UploadedFile) -> AppResult<String> {
        let key = object_key(folder, &file.file_name);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(file.data))
            .content_type(&file.content_type)
            .send()
            .await
            .map_err(|e| AppError::File(e.to_string()))?;

        let url = match &self.public_url {
            Some(base_url) => format!("{}/{}/{}", base_url, self.bucket, key),
            None => format!("/{}/{}", self.bucket, key),
        };

        tracing::debug!(%url, "file uploaded");
        Ok(url)
    }

    /// Removes a previously uploaded object. Failures are logged, not returned.
    pub async fn delete_by_url(&self, url: &str) {
        let Some(key) = self.key_from_url(url) else {
            return;
        };
        if let Err(e) = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            tracing::warn!(%key, error = %e, "failed to delete replaced file");
        }
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        let prefix = format!("/{}/", self.bucket);
        url.find(&prefix)
            .map(|pos| url[pos + prefix.len()..].to_string())
    }
}

fn object_key(folder: &str, file_name: &str) -> String {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!("{}/{}.{}", folder, Uuid::new_v4(), extension)
}

/// Reads the named part of a multipart body, checking its type and size.
pub async fn read_upload(
    multipart: &mut Multipart,
    field_name: &str,
    kind: UploadKind,
) -> AppResult<UploadedFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let content_type = field
            .content_type()
            .ok_or_else(|| AppError::File("Content-Type is missing".to_string()))?
            .to_string();

        if !kind.accepts(&content_type) {
            return Err(AppError::File(format!("Unsupported file type: {}", content_type)));
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        if data.len() > kind.max_size() {
            return Err(AppError::File("File is too large".to_string()));
        }

        return Ok(UploadedFile {
            file_name,
            content_type,
            data: data.to_vec(),
        });
    }

    Err(AppError::field(field_name, "No file was submitted"))
}

pub fn validate_image_content_type(content_type: &str) -> bool {
    matches!(
        content_type,
        "image/jpeg" | "image/png" | "image/gif" | "image/webp"
    )
}

pub fn validate_document_content_type(content_type: &str) -> bool {
    matches!(
        content_type,
        "application/pdf"
            | "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "image/jpeg"
            | "image/png"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert!(validate_image_content_type("image/png"));
        assert!(!validate_image_content_type("application/pdf"));
        assert!(validate_document_content_type("application/pdf"));
        assert!(!validate_document_content_type("text/html"));
    }

    #[test]
    fn test_object_key_extension() {
        assert!(object_key("complaints", "leak.JPG").ends_with(".jpg"));
        assert!(object_key("notices", "agenda").ends_with(".bin"));
        assert!(object_key("visitors", "x.p/ng").ends_with(".bin"));
        assert!(object_key("visitors", "a.png").starts_with("visitors/"));
    }

    #[test]
    fn test_key_from_url() {
        let mut config = Config::for_tests("secret");
        config.minio_public_url = Some("https://cdn.example.com".to_string());
        let service = tokio_test::block_on(FileService::new(&config)).unwrap();

        assert_eq!(
            service.key_from_url("https://cdn.example.com/society/notices/a.pdf"),
            Some("notices/a.pdf".to_string())
        );
        assert_eq!(
            service.key_from_url("/society/visitors/b.png"),
            Some("visitors/b.png".to_string())
        );
        assert_eq!(service.key_from_url("https://elsewhere.com/other/c.png"), None);
    }
}
