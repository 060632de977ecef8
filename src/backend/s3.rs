//! The real object store: `aws-sdk-s3` against an actual bucket.
//!
//! The teacher has no S3 integration of its own — its only object-store
//! client is the hand-rolled Backblaze B2 REST wrapper in the `b2`
//! sub-crate (auth handshake, narrow `get`/`put`/`delete`/`list` surface,
//! `thiserror`-based error enum). This module keeps that narrow-surface
//! shape but is grounded on the real `aws-sdk-s3` usage seen in
//! `dandi-s3invsync` and `nidor1998-s3sync` (both depend on `aws-config`
//! with `behavior-version-latest` + `rustls`, plus `aws-sdk-s3` directly,
//! rather than a hand-rolled REST client — S3 has no need for one).

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{Client, primitives::ByteStream, types::StorageClass as S3StorageClass};
use camino::Utf8Path;

use super::{ObjectStore, StorageClass, Verifier};

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Builds a client from the ambient environment (credentials, region)
    /// the way `aws-config`'s `behavior-version-latest` loader is meant to
    /// be used: no explicit keys in our configuration file, since §9's
    /// "global mutable state" note pushes account/region metadata out to
    /// the environment/config the SDK already knows how to read.
    pub async fn connect(bucket: String) -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);
        Ok(Self { client, bucket })
    }

    fn to_sdk_class(class: StorageClass) -> S3StorageClass {
        match class {
            StorageClass::DeepArchive => S3StorageClass::DeepArchive,
            StorageClass::Standard => S3StorageClass::Standard,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        key: &str,
        local_path: &Utf8Path,
        storage_class: StorageClass,
    ) -> Result<Option<Verifier>> {
        let body = ByteStream::from_path(local_path.as_std_path())
            .await
            .with_context(|| format!("couldn't open {local_path} for upload"))?;

        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .storage_class(Self::to_sdk_class(storage_class))
            .body(body)
            .send()
            .await
            .with_context(|| format!("PutObject failed for {key}"))?;

        Ok(output.e_tag().map(|tag| Verifier(tag.to_string())))
    }

    async fn head_verifier(&self, key: &str) -> Result<Option<Verifier>> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("HeadObject failed for {key}"))?;
        Ok(output.e_tag().map(|tag| Verifier(tag.to_string())))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;
        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation_token.take() {
                req = req.continuation_token(token);
            }
            let output = req
                .send()
                .await
                .with_context(|| format!("ListObjectsV2 failed for prefix {prefix}"))?;

            for obj in output.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }

            if output.is_truncated().unwrap_or(false) {
                continuation_token = output.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(keys)
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<()> {
        use aws_sdk_s3::types::{Delete, ObjectIdentifier};

        anyhow::ensure!(
            keys.len() <= super::DELETE_BATCH_LIMIT,
            "delete_batch called with more than {} keys",
            super::DELETE_BATCH_LIMIT
        );

        let objects: Result<Vec<ObjectIdentifier>, _> = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect();
        let objects = objects.context("couldn't build delete request")?;

        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(Delete::builder().set_objects(Some(objects)).build()?)
            .send()
            .await
            .context("DeleteObjects failed")?;
        Ok(())
    }
}
