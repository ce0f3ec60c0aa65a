//! Cloudinary-compatible object storage
//!
//! Uploads use the signed upload API: parameters are sorted, joined as
//! `k=v&k=v`, suffixed with the API secret and hashed with SHA-256.
//! Folder sweeps use the admin API with basic auth.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{
    folder_path, key_prefix, unique_name, validate_organizing_key, ObjectStorage, ResourceKind,
    StorageError, StoredObject,
};
use crate::config::CloudStorageSettings;
use crate::validation::{extension_of, Category};

/// Upload API response (only the fields we use)
#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

/// Destroy API response
#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

/// Object storage backed by a Cloudinary account
#[derive(Clone)]
pub struct CloudStorage {
    client: reqwest::Client,
    settings: CloudStorageSettings,
    api_base: String,
    timeout: Duration,
}

impl CloudStorage {
    pub fn new(
        settings: CloudStorageSettings,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        if !settings.is_valid() {
            return Err(StorageError::Config(
                "Cloud storage credentials are not configured".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .user_agent("CodeSafe")
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Cloud storage configured: cloud={}, api_key={}...",
            settings.cloud_name,
            settings.api_key_prefix()
        );

        Ok(Self {
            client,
            settings,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base, self.settings.cloud_name, path)
    }

    fn timestamp() -> String {
        chrono::Utc::now().timestamp().to_string()
    }

    async fn destroy(&self, object_id: &str, kind: ResourceKind) -> Result<String, StorageError> {
        let timestamp = Self::timestamp();
        let signature = sign(
            &[("public_id", object_id), ("timestamp", &timestamp)],
            &self.settings.api_secret,
        );

        let params = [
            ("public_id", object_id),
            ("timestamp", timestamp.as_str()),
            ("api_key", self.settings.api_key.as_str()),
            ("signature", signature.as_str()),
            ("signature_algorithm", "sha256"),
        ];

        let response = self
            .client
            .post(self.endpoint(&format!("{}/destroy", kind.as_str())))
            .form(&params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Upload(format!(
                "Destroy returned {}: {}",
                status, body
            )));
        }

        let body: DestroyResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Upload(format!("Failed to parse destroy response: {}", e)))?;

        Ok(body.result)
    }

    async fn delete_prefix(&self, prefix: &str, kind: ResourceKind) -> Result<(), StorageError> {
        let response = self
            .client
            .delete(self.endpoint(&format!("resources/{}/upload", kind.as_str())))
            .basic_auth(&self.settings.api_key, Some(&self.settings.api_secret))
            .query(&[("prefix", prefix)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?;

        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(StorageError::Upload(format!(
                "Prefix delete returned {}",
                response.status()
            )))
        }
    }
}

#[async_trait]
impl ObjectStorage for CloudStorage {
    async fn upload(
        &self,
        data: &[u8],
        category: Category,
        organizing_key: &str,
        file_name: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_organizing_key(organizing_key)?;

        let kind = ResourceKind::for_category(category);
        let folder = folder_path(organizing_key, category);

        // Raw resources keep their extension in the public id
        let stored_name = match (kind, extension_of(file_name)) {
            (ResourceKind::Raw, Some(ext)) => format!("{}.{}", unique_name(file_name), ext),
            _ => unique_name(file_name),
        };

        let timestamp = Self::timestamp();
        let signature = sign(
            &[
                ("folder", folder.as_str()),
                ("overwrite", "false"),
                ("public_id", stored_name.as_str()),
                ("timestamp", timestamp.as_str()),
            ],
            &self.settings.api_secret,
        );

        let file_part = reqwest::multipart::Part::bytes(data.to_vec()).file_name(file_name.to_string());

        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("api_key", self.settings.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder.clone())
            .text("public_id", stored_name.clone())
            .text("overwrite", "false")
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        tracing::info!(
            "Uploading {} ({} bytes) to {} as {}",
            file_name,
            data.len(),
            folder,
            kind
        );

        let response = self
            .client
            .post(self.endpoint(&format!("{}/upload", kind.as_str())))
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Upload(format!(
                "Upload API returned {}: {}",
                status, body
            )));
        }

        let result: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Upload(format!("Failed to parse upload response: {}", e)))?;

        tracing::info!("Upload successful: {}", result.public_id);

        Ok(StoredObject {
            url: result.secure_url,
            object_id: result.public_id,
            stored_name,
            resource_kind: kind,
        })
    }

    async fn delete(&self, object_id: &str, kind: ResourceKind) -> bool {
        match self.destroy(object_id, kind).await {
            Ok(result) if result == "ok" || result == "not found" => {
                tracing::debug!("Deleted remote object {}: {}", object_id, result);
                true
            }
            Ok(result) => {
                tracing::warn!("Unexpected destroy result for {}: {}", object_id, result);
                false
            }
            Err(e) => {
                tracing::error!("Failed to delete remote object {}: {}", object_id, e);
                false
            }
        }
    }

    async fn delete_folder(&self, organizing_key: &str) -> bool {
        if validate_organizing_key(organizing_key).is_err() {
            return false;
        }

        let prefix = key_prefix(organizing_key);
        let mut all_ok = true;

        for kind in ResourceKind::ALL {
            if let Err(e) = self.delete_prefix(&prefix, kind).await {
                tracing::warn!("Failed to sweep {} resources under {}: {}", kind, prefix, e);
                all_ok = false;
            }
        }

        all_ok
    }

    fn name(&self) -> &'static str {
        "cloud"
    }
}

fn request_error(e: reqwest::Error) -> StorageError {
    if e.is_timeout() {
        StorageError::Timeout(e.to_string())
    } else {
        StorageError::Upload(e.to_string())
    }
}

/// Request signature: sha256 hex of sorted `k=v` pairs joined by `&`, then the secret
fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_order_independent() {
        let a = sign(&[("timestamp", "1700000000"), ("folder", "codesafe/x")], "secret");
        let b = sign(&[("folder", "codesafe/x"), ("timestamp", "1700000000")], "secret");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_signature_matches_manual_hash() {
        let expected = {
            let mut hasher = Sha256::new();
            hasher.update(b"public_id=abc&timestamp=42secret");
            hex::encode(hasher.finalize())
        };

        assert_eq!(sign(&[("timestamp", "42"), ("public_id", "abc")], "secret"), expected);
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let params = [("timestamp", "42")];
        assert_ne!(sign(&params, "one"), sign(&params, "two"));
    }

    #[test]
    fn test_requires_credentials() {
        let result = CloudStorage::new(
            CloudStorageSettings::default(),
            "https://api.example.com/v1_1",
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(StorageError::Config(_))));
    }
}
