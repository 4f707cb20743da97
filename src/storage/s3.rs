//! S3 storage backend.

use object_store::aws::AmazonS3Builder;
use object_store::{ObjectStore, RetryConfig};
use std::sync::Arc;

pub(super) fn construct(
    bucket: &str,
    region: Option<&str>,
) -> Result<Arc<dyn ObjectStore>, object_store::Error> {
    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_retry(RetryConfig::default());

    if let Some(region) = region {
        builder = builder.with_region(region);
    }

    Ok(Arc::new(builder.build()?))
}
