//! Object store access for pipeline sources.
//!
//! Sources live either in a local directory or under a prefix of an S3 bucket. Both are
//! exposed through the same [`ObjectStore`] interface so the readers never branch on where
//! the bytes come from.

use std::sync::Arc;

use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, prefix::PrefixStore};

pub mod ext;
pub mod url;

use self::url::{StoreProvider, StoreUrl};

/// Creates an object store rooted at the given location.
///
/// Keys passed to the returned store are relative to the location: the directory for local
/// sources, the URL's path prefix for S3 sources.
///
/// S3 credentials and region are taken from the `AWS_*` environment variables
/// (e.g. `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_REGION`, `AWS_ENDPOINT`).
pub fn new(url: &StoreUrl) -> Result<Arc<dyn ObjectStore>, ObjectStoreCreationError> {
    let creation_error = |source: object_store::Error| ObjectStoreCreationError {
        url: url.to_string(),
        source,
    };

    match url.provider() {
        StoreProvider::AmazonS3 => {
            let store = AmazonS3Builder::from_env()
                .with_url(url.as_str())
                .build()
                .map_err(creation_error)?;
            let prefix = url
                .prefix()
                .map_err(|err| creation_error(object_store::Error::from(err)))?;

            if prefix.as_ref().is_empty() {
                Ok(Arc::new(store))
            } else {
                Ok(Arc::new(PrefixStore::new(store, prefix)))
            }
        }
        StoreProvider::Local => {
            let dir = url.to_file_path().map_err(|()| {
                creation_error(object_store::Error::Generic {
                    store: "LocalFileSystem",
                    source: format!("not a local directory url: {url}").into(),
                })
            })?;
            let store = LocalFileSystem::new_with_prefix(dir).map_err(creation_error)?;
            Ok(Arc::new(store))
        }
    }
}

/// Failed to create object store instance.
///
/// The location itself was valid but the backend could not be initialised. Typical causes
/// are missing or malformed `AWS_*` configuration for S3 locations.
#[derive(Debug, thiserror::Error)]
#[error("failed to create object store for {url}")]
pub struct ObjectStoreCreationError {
    url: String,
    #[source]
    source: object_store::Error,
}
