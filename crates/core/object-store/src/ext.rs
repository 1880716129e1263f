//! Extension trait for ObjectStore.

use std::future::Future;

use bytes::Bytes;
use object_store::{ObjectStore, path::Path};

/// Whole-object reads on top of any [`ObjectStore`].
pub trait ObjectStoreExt {
    /// Reads the entire contents of an object as `Bytes`.
    fn get_bytes(&self, location: Path) -> impl Future<Output = Result<Bytes, GetObjectError>>;

    /// Reads the entire contents of an object and decodes it as UTF-8 text.
    fn get_text(&self, location: Path) -> impl Future<Output = Result<String, GetObjectError>>;
}

impl<T> ObjectStoreExt for T
where
    T: ObjectStore + ?Sized,
{
    async fn get_bytes(&self, location: Path) -> Result<Bytes, GetObjectError> {
        let result = self.get(&location).await.map_err(|err| match err {
            object_store::Error::NotFound { .. } => GetObjectError::NotFound {
                path: location.to_string(),
                source: err,
            },
            err => GetObjectError::Get {
                path: location.to_string(),
                source: err,
            },
        })?;

        result.bytes().await.map_err(|err| GetObjectError::Read {
            path: location.to_string(),
            source: err,
        })
    }

    async fn get_text(&self, location: Path) -> Result<String, GetObjectError> {
        let bytes = self.get_bytes(location.clone()).await?;
        String::from_utf8(bytes.to_vec()).map_err(|err| GetObjectError::NotUtf8 {
            path: location.to_string(),
            source: err,
        })
    }
}

/// Error type for whole-object reads.
#[derive(Debug, thiserror::Error)]
pub enum GetObjectError {
    /// The object does not exist.
    #[error("object not found: {path}")]
    NotFound {
        path: String,
        #[source]
        source: object_store::Error,
    },

    /// The store refused or failed the request (permissions, network, authentication).
    #[error("failed to get object: {path}")]
    Get {
        path: String,
        #[source]
        source: object_store::Error,
    },

    /// The request started but the body could not be read to the end.
    #[error("failed to read object bytes: {path}")]
    Read {
        path: String,
        #[source]
        source: object_store::Error,
    },

    /// The contents are not valid UTF-8 text.
    #[error("object is not an utf8 text file: {path}")]
    NotUtf8 {
        path: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

impl GetObjectError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GetObjectError::NotFound { .. })
    }
}
