// lidar-control-objectstore/src/lib.rs
// ============================================================================
// Crate: lidar-control-objectstore
// Description: S3-compatible ObjectStore adapter.
// Purpose: A blocking façade over aws-sdk-s3, backed by an internally owned
//          Tokio runtime, so the rest of this sync-leaning codebase never
//          needs to be async to talk to object storage.
// Dependencies: aws-config, aws-sdk-s3, base64, md5, lidar-control-core
// ============================================================================

//! ## Overview
//! Multipart upload is used above [`MULTIPART_THRESHOLD_BYTES`], in chunks of
//! [`MULTIPART_CHUNK_BYTES`], each sent with an explicit `Content-MD5` header
//! computed over that chunk; the collected `(part_number, etag)` pairs are
//! submitted to `CompleteMultipartUpload`, and any failure triggers
//! `AbortMultipartUpload` so no abandoned parts linger in the bucket.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::types::CompletedMultipartUpload;
use aws_sdk_s3::types::CompletedPart;
use aws_sdk_s3::primitives::ByteStream;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use lidar_control_core::interfaces::HeadResult;
use lidar_control_core::interfaces::ObjectRef;
use lidar_control_core::interfaces::ObjectStore;
use lidar_control_core::interfaces::ObjectStoreError;
use lidar_control_core::interfaces::PutResult;
use tokio::runtime::Runtime;

/// Uploads at or above this size use multipart upload.
pub const MULTIPART_THRESHOLD_BYTES: u64 = 8 * 1024 * 1024;
/// Size of each multipart chunk.
pub const MULTIPART_CHUNK_BYTES: u64 = 10 * 1024 * 1024;

/// Connection parameters for [`S3ObjectStore`].
#[derive(Debug, Clone)]
pub struct S3ObjectStoreConfig {
    /// Endpoint URL (S3-compatible, non-AWS endpoints supported).
    pub endpoint: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Default bucket; individual calls still take an explicit [`ObjectRef`].
    pub bucket: String,
    /// Region.
    pub region: String,
    /// Force path-style addressing, required by most non-AWS S3-compatible
    /// endpoints.
    pub force_path_style: bool,
}

/// S3-compatible [`ObjectStore`] implementation.
pub struct S3ObjectStore {
    client: Client,
    runtime: Option<Arc<Runtime>>,
}

impl Drop for S3ObjectStore {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = std::thread::spawn(move || drop(runtime));
        }
    }
}

impl S3ObjectStore {
    /// Builds a new store, spinning up its own multi-thread Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Fatal`] if the runtime fails to start.
    pub fn new(config: S3ObjectStoreConfig) -> Result<Self, ObjectStoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| ObjectStoreError::Fatal(err.to_string()))?;
        let credentials = aws_sdk_s3::config::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "lidar-control-objectstore",
        );
        let shared_config = runtime.block_on(async {
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .endpoint_url(&config.endpoint)
                .credentials_provider(credentials)
                .load()
                .await
        });
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        Ok(Self { client, runtime: Some(Arc::new(runtime)) })
    }

    fn rt(&self) -> Result<&Runtime, ObjectStoreError> {
        self.runtime
            .as_deref()
            .ok_or_else(|| ObjectStoreError::Fatal("object store closed".to_string()))
    }
}

fn classify_sdk_err<E: std::fmt::Display, R>(err: &SdkError<E, R>) -> ObjectStoreError {
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            ObjectStoreError::Transient(err.to_string())
        }
        _ => ObjectStoreError::Fatal(err.to_string()),
    }
}

fn strip_quotes(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

impl ObjectStore for S3ObjectStore {
    fn put_object(&self, object: &ObjectRef, local_path: &Path) -> Result<PutResult, ObjectStoreError> {
        let size_bytes = fs::metadata(local_path).map_err(|err| ObjectStoreError::Io(err.to_string()))?.len();
        let content_md5 = compute_file_md5_base64(local_path)?;
        let body = self
            .rt()?
            .block_on(ByteStream::from_path(local_path))
            .map_err(|err| ObjectStoreError::Io(err.to_string()))?;
        let (bucket, key) = (object.bucket.clone(), object.key.clone());
        let client = self.client.clone();
        let etag = self.rt()?.block_on(async move {
            let output = client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(body)
                .content_md5(content_md5)
                .send()
                .await
                .map_err(|err| classify_sdk_err(&err))?;
            Ok::<_, ObjectStoreError>(output.e_tag().unwrap_or_default().to_string())
        })?;
        Ok(PutResult { etag: strip_quotes(&etag), size_bytes: size_bytes as i64 })
    }

    fn put_bytes(&self, object: &ObjectRef, body: &[u8], content_type: &str) -> Result<PutResult, ObjectStoreError> {
        let content_md5 = BASE64.encode(md5::compute(body).0);
        let size_bytes = body.len() as i64;
        let (bucket, key, content_type) = (object.bucket.clone(), object.key.clone(), content_type.to_string());
        let client = self.client.clone();
        let body = body.to_vec();
        let etag = self.rt()?.block_on(async move {
            let output = client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from(body))
                .content_type(content_type)
                .content_md5(content_md5)
                .send()
                .await
                .map_err(|err| classify_sdk_err(&err))?;
            Ok::<_, ObjectStoreError>(output.e_tag().unwrap_or_default().to_string())
        })?;
        Ok(PutResult { etag: strip_quotes(&etag), size_bytes })
    }

    fn upload_file(&self, object: &ObjectRef, local_path: &Path) -> Result<PutResult, ObjectStoreError> {
        let size_bytes = fs::metadata(local_path).map_err(|err| ObjectStoreError::Io(err.to_string()))?.len();
        if size_bytes < MULTIPART_THRESHOLD_BYTES {
            return self.put_object(object, local_path);
        }
        self.multipart_upload(object, local_path, size_bytes)
    }

    fn get_bytes(&self, object: &ObjectRef) -> Result<Vec<u8>, ObjectStoreError> {
        let (bucket, key) = (object.bucket.clone(), object.key.clone());
        let client = self.client.clone();
        self.rt()?.block_on(async move {
            let output = client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|err| classify_sdk_err(&err))?;
            let bytes = output.body.collect().await.map_err(|err| ObjectStoreError::Io(err.to_string()))?;
            Ok(bytes.into_bytes().to_vec())
        })
    }

    fn download_file(&self, object: &ObjectRef, local_path: &Path) -> Result<(), ObjectStoreError> {
        let bytes = self.get_bytes(object)?;
        fs::write(local_path, bytes).map_err(|err| ObjectStoreError::Io(err.to_string()))
    }

    fn head_object(&self, object: &ObjectRef) -> Result<HeadResult, ObjectStoreError> {
        let (bucket, key) = (object.bucket.clone(), object.key.clone());
        let client = self.client.clone();
        self.rt()?.block_on(async move {
            match client.head_object().bucket(bucket).key(key).send().await {
                Ok(output) => Ok(HeadResult {
                    etag: output.e_tag().map(strip_quotes),
                    size_bytes: output.content_length(),
                }),
                Err(SdkError::ServiceError(service_err)) if service_err.err().is_not_found() => {
                    Ok(HeadResult::default())
                }
                Err(err) => Err(classify_sdk_err(&err)),
            }
        })
    }
}

impl S3ObjectStore {
    fn multipart_upload(
        &self,
        object: &ObjectRef,
        local_path: &Path,
        size_bytes: u64,
    ) -> Result<PutResult, ObjectStoreError> {
        let (bucket, key) = (object.bucket.clone(), object.key.clone());
        let client = self.client.clone();
        let upload_id = self.rt()?.block_on({
            let client = client.clone();
            let (bucket, key) = (bucket.clone(), key.clone());
            async move {
                let created = client
                    .create_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|err| classify_sdk_err(&err))?;
                created
                    .upload_id()
                    .map(str::to_string)
                    .ok_or_else(|| ObjectStoreError::Fatal("no upload_id returned".to_string()))
            }
        })?;

        match self.upload_parts(&bucket, &key, &upload_id, local_path, size_bytes) {
            Ok(completed_parts) => {
                let etag = self.rt()?.block_on({
                    let client = client.clone();
                    let (bucket, key, upload_id) = (bucket.clone(), key.clone(), upload_id.clone());
                    async move {
                        let completed = CompletedMultipartUpload::builder()
                            .set_parts(Some(completed_parts))
                            .build();
                        let output = client
                            .complete_multipart_upload()
                            .bucket(bucket)
                            .key(key)
                            .upload_id(upload_id)
                            .multipart_upload(completed)
                            .send()
                            .await
                            .map_err(|err| classify_sdk_err(&err))?;
                        Ok::<_, ObjectStoreError>(output.e_tag().unwrap_or_default().to_string())
                    }
                })?;
                Ok(PutResult { etag: strip_quotes(&etag), size_bytes: size_bytes as i64 })
            }
            Err(err) => {
                let _ = self.rt()?.block_on(
                    client.abort_multipart_upload().bucket(&bucket).key(&key).upload_id(&upload_id).send(),
                );
                Err(err)
            }
        }
    }

    fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        local_path: &Path,
        size_bytes: u64,
    ) -> Result<Vec<CompletedPart>, ObjectStoreError> {
        let mut file = fs::File::open(local_path).map_err(|err| ObjectStoreError::Io(err.to_string()))?;
        let mut parts = Vec::new();
        let mut part_number: i32 = 1;
        let mut remaining = size_bytes;
        while remaining > 0 {
            let chunk_len = remaining.min(MULTIPART_CHUNK_BYTES) as usize;
            let mut buffer = vec![0u8; chunk_len];
            file.read_exact(&mut buffer).map_err(|err| ObjectStoreError::Io(err.to_string()))?;
            let content_md5 = BASE64.encode(md5::compute(&buffer).0);
            let client = self.client.clone();
            let (bucket, key, upload_id) = (bucket.to_string(), key.to_string(), upload_id.to_string());
            let etag = self.rt()?.block_on(async move {
                let output = client
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(buffer))
                    .content_md5(content_md5)
                    .send()
                    .await
                    .map_err(|err| classify_sdk_err(&err))?;
                Ok::<_, ObjectStoreError>(output.e_tag().unwrap_or_default().to_string())
            })?;
            parts.push(CompletedPart::builder().e_tag(etag).part_number(part_number).build());
            remaining -= chunk_len as u64;
            part_number += 1;
        }
        Ok(parts)
    }
}

fn compute_file_md5_base64(path: &Path) -> Result<String, ObjectStoreError> {
    let mut file = fs::File::open(path).map_err(|err| ObjectStoreError::Io(err.to_string()))?;
    let mut context = md5::Context::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer).map_err(|err| ObjectStoreError::Io(err.to_string()))?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(BASE64.encode(context.compute().0))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
    use super::*;

    #[test]
    fn strip_quotes_removes_surrounding_quotes() {
        assert_eq!(strip_quotes("\"abc123\""), "abc123");
        assert_eq!(strip_quotes("abc123"), "abc123");
    }

    #[test]
    fn multipart_threshold_and_chunk_meet_the_minimum() {
        assert!(MULTIPART_THRESHOLD_BYTES >= 8 * 1024 * 1024);
        assert!(MULTIPART_CHUNK_BYTES >= 10 * 1024 * 1024);
    }

    #[test]
    fn compute_file_md5_base64_is_deterministic() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        std::io::Write::write_all(&mut file, b"hello world").expect("write");
        let first = compute_file_md5_base64(file.path()).expect("md5");
        let second = compute_file_md5_base64(file.path()).expect("md5");
        assert_eq!(first, second);
    }
}
