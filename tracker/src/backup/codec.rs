//! Artifact serialization: JSON + gzip, run on the blocking pool.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::debug;

use super::artifact::{SnapshotArtifact, SnapshotMetadata};
use crate::constants::snapshot::FORMAT_VERSION;
use crate::errors::ArtifactError;

pub async fn encode(artifact: Arc<SnapshotArtifact>, level: u32) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || encode_blocking(&artifact, level))
        .await
        .context("Artifact encoding task panicked")?
}

pub async fn decode(bytes: Vec<u8>) -> Result<SnapshotArtifact> {
    let artifact = tokio::task::spawn_blocking(move || decode_blocking(&bytes))
        .await
        .context("Artifact decoding task panicked")??;
    Ok(artifact)
}

pub fn encode_blocking(artifact: &SnapshotArtifact, level: u32) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(artifact).context("Failed to serialize snapshot artifact")?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    debug!(
        "Encoded artifact: {} bytes of JSON, {} bytes compressed",
        json.len(),
        compressed.len()
    );
    Ok(compressed)
}

/// Decompress and parse an artifact, checking its structure before use
pub fn decode_blocking(bytes: &[u8]) -> Result<SnapshotArtifact, ArtifactError> {
    let mut json = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut json)
        .map_err(|e| ArtifactError::Decode {
            reason: format!("gzip: {}", e),
        })?;

    let document: Value = serde_json::from_slice(&json).map_err(|e| ArtifactError::Decode {
        reason: e.to_string(),
    })?;

    let Value::Object(mut root) = document else {
        return Err(ArtifactError::Decode {
            reason: "document root is not an object".to_string(),
        });
    };

    let metadata = match root.remove("metadata") {
        None | Some(Value::Null) => return Err(ArtifactError::MissingMetadata),
        Some(value) => serde_json::from_value::<SnapshotMetadata>(value).map_err(|e| {
            ArtifactError::Decode {
                reason: format!("metadata: {}", e),
            }
        })?,
    };

    if metadata.version > FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            found: metadata.version,
            supported: FORMAT_VERSION,
        });
    }

    let data = match root.remove("data") {
        None | Some(Value::Null) => Default::default(),
        Some(value) => serde_json::from_value(value).map_err(|e| ArtifactError::Decode {
            reason: format!("data: {}", e),
        })?,
    };

    Ok(SnapshotArtifact { metadata, data })
}
