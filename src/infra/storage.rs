use anyhow::{anyhow, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use url::Url;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    bucket: String,
    public_base: Url,
}

impl ObjectStorage {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(config.s3_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.s3_endpoint.clone())
            .force_path_style(true);
        if let Some(provider) = shared_config.credentials_provider() {
            s3_builder = s3_builder.credentials_provider(provider);
        }
        let s3_config = s3_builder.build();

        let client = Client::from_conf(s3_config);
        let public_base = Url::parse(config.media_base_url())
            .map_err(|err| anyhow!("invalid media endpoint: {}", err))?;

        Ok(Self {
            client,
            bucket: config.s3_bucket.clone(),
            public_base,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Creates the bucket when it does not exist yet.
    pub async fn ensure_bucket(&self) -> Result<()> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }

        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await?;
        tracing::info!(bucket = %self.bucket, "created media bucket");
        Ok(())
    }

    pub async fn put_object(&self, key: &str, content_type: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await?;
        Ok(())
    }

    pub async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    pub async fn object_exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().map_or(false, |err| err.is_not_found()) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Path-style public URL for `key`: `<base>/<bucket>/<key>`.
    pub fn public_url(&self, key: &str) -> String {
        object_url(&self.public_base, &self.bucket, key)
    }
}

fn object_url(base: &Url, bucket: &str, key: &str) -> String {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(bucket);
        for part in key.split('/') {
            segments.push(part);
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_url_is_path_style() {
        let base = Url::parse("http://localhost:4566").unwrap();
        assert_eq!(
            object_url(&base, "media", "posts/abc/1.png"),
            "http://localhost:4566/media/posts/abc/1.png"
        );
    }

    #[test]
    fn object_url_keeps_base_path() {
        let base = Url::parse("https://cdn.example.com/static/").unwrap();
        assert_eq!(
            object_url(&base, "media", "posts/x.gif"),
            "https://cdn.example.com/static/media/posts/x.gif"
        );
    }
}
