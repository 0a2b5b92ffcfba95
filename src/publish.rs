//! Uploads the export artifacts to S3.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info};

pub const DEFAULT_PREFIX: &str = "analytics/";

/// Artifacts in `dir` eligible for upload, sorted by file name.
pub fn artifacts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_artifact = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("parquet") | Some("json")
        );
        if path.is_file() && is_artifact {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Object key for `file_name` under `prefix`, with `.gz` when compressed.
pub fn object_key(prefix: &str, file_name: &str, gzip: bool) -> String {
    let mut key = String::from(prefix);
    if !key.is_empty() && !key.ends_with('/') {
        key.push('/');
    }
    key.push_str(file_name);
    if gzip {
        key.push_str(".gz");
    }
    key
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Returns `contents`, gzip-compressed when `gzip` is set.
pub fn encode_body(contents: Vec<u8>, gzip: bool) -> Result<Vec<u8>> {
    if !gzip {
        return Ok(contents);
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&contents)?;
    Ok(encoder.finish()?)
}

/// Uploads every artifact in `dir` to `bucket` under `prefix`.
///
/// Returns the number of objects written.
#[tracing::instrument(skip(client), fields(dir = %dir.display()))]
pub async fn upload_artifacts(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    prefix: &str,
    dir: &Path,
    gzip: bool,
) -> Result<usize> {
    let paths = artifacts(dir)?;
    if paths.is_empty() {
        anyhow::bail!("no artifacts in {}; run the transform stage first", dir.display());
    }

    for path in &paths {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("non UTF-8 artifact name: {}", path.display()))?;
        let key = object_key(prefix, file_name, gzip);
        let body = encode_body(std::fs::read(path)?, gzip)?;

        let mut request = client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(content_type(path));
        if gzip {
            request = request.content_encoding("gzip");
        }
        request
            .send()
            .await
            .with_context(|| format!("uploading s3://{bucket}/{key}"))?;

        debug!(key = %key, "Artifact uploaded");
    }

    info!(uploaded = paths.len(), bucket, prefix, "S3 upload complete");
    Ok(paths.len())
}

/// Loads AWS configuration from the environment and uploads the artifacts.
pub async fn publish(bucket: &str, prefix: &str, dir: &Path, gzip: bool) -> Result<usize> {
    let config = aws_config::load_from_env().await;
    let client = aws_sdk_s3::Client::new(&config);
    upload_artifacts(&client, bucket, prefix, dir, gzip).await
}
