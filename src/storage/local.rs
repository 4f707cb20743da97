//! Local filesystem backend: each bucket is a directory under the root.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use std::path::Path;
use std::sync::Arc;

pub(super) fn construct(
    root: &Path,
    bucket: &str,
) -> Result<Arc<dyn ObjectStore>, object_store::Error> {
    Ok(Arc::new(LocalFileSystem::new_with_prefix(root.join(bucket))?))
}
