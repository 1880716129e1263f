//! Validated source locations for object stores.

use std::path::PathBuf;

use fs_err as fs;
use object_store::path::Path;
use url::Url;

/// A validated URL pointing at a directory-like location in a supported object store.
///
/// Built either from an `s3://bucket[/prefix]` URL or from a local filesystem path, which is
/// canonicalized into a `file://` URL.
#[derive(Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct StoreUrl(Url);

impl StoreUrl {
    /// Creates a new [`StoreUrl`] from a string that can be either a URL or filesystem path.
    pub fn new(location: impl Into<String>) -> Result<Self, StoreUrlError> {
        let location = location.into();

        // If the location fails to parse as a URL, we assume it's a filesystem path.
        Self::try_from_url(&location).or_else(|_| Self::try_from_filesystem_path(&location))
    }

    fn try_from_url(url: &str) -> Result<Self, StoreUrlError> {
        let inner = Url::parse(url).map_err(StoreUrlError::UrlParseError)?;
        let _: StoreProvider = inner.scheme().parse()?;
        Ok(Self(inner))
    }

    /// The path must exist, it is canonicalized to an absolute path.
    fn try_from_filesystem_path(location: &str) -> Result<Self, StoreUrlError> {
        let path = PathBuf::from(location);
        let canonical_path = fs::canonicalize(&path)
            .map_err(|err| StoreUrlError::InvalidFilesystemPath { path, source: err })?;

        let url = Url::from_directory_path(&canonical_path).map_err(|_| {
            StoreUrlError::InvalidFilesystemPath {
                path: canonical_path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "absolute path could not be resolved",
                ),
            }
        })?;

        Ok(Self(url))
    }

    /// Returns the [`StoreProvider`] of the URL.
    pub fn provider(&self) -> StoreProvider {
        if StoreProvider::is_amazon_s3(self.0.scheme()) {
            StoreProvider::AmazonS3
        } else {
            StoreProvider::Local
        }
    }

    /// The bucket-relative prefix, without leading or trailing delimiters.
    ///
    /// Always empty for local filesystem URLs, whose path is the store root itself.
    pub fn prefix(&self) -> Result<Path, object_store::path::Error> {
        match self.provider() {
            StoreProvider::AmazonS3 => Path::from_url_path(self.0.path()),
            StoreProvider::Local => Ok(Path::default()),
        }
    }
}

impl std::ops::Deref for StoreUrl {
    type Target = Url;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::str::FromStr for StoreUrl {
    type Err = StoreUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for StoreUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Debug for StoreUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// Object store providers that sources can be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreProvider {
    /// Local filesystem (`file://` or a plain path)
    Local,

    /// Amazon S3 (`s3://`, `s3a://`)
    AmazonS3,
}

impl StoreProvider {
    #[inline]
    fn is_amazon_s3(scheme: &str) -> bool {
        scheme.eq_ignore_ascii_case("s3") || scheme.eq_ignore_ascii_case("s3a")
    }

    #[inline]
    fn is_local_filesystem(scheme: &str) -> bool {
        scheme.eq_ignore_ascii_case("file")
    }
}

impl std::str::FromStr for StoreProvider {
    type Err = StoreUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if StoreProvider::is_local_filesystem(s) => Ok(StoreProvider::Local),
            s if StoreProvider::is_amazon_s3(s) => Ok(StoreProvider::AmazonS3),
            _ => Err(StoreUrlError::UnsupportedScheme {
                scheme: s.to_string(),
            }),
        }
    }
}

/// Error type for invalid source locations.
///
/// Valid locations are `s3://` / `s3a://` URLs, `file://` URLs and existing filesystem paths.
/// S3-compatible stores behind a custom HTTP endpoint use the `s3://` scheme together with
/// the `AWS_ENDPOINT` environment variable.
#[derive(Debug, thiserror::Error)]
pub enum StoreUrlError {
    /// URL string has invalid syntax and cannot be parsed
    #[error(transparent)]
    UrlParseError(url::ParseError),

    /// URL scheme does not correspond to a supported object store
    #[error("unsupported object store scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    /// Filesystem path does not exist or cannot be accessed
    ///
    /// Local sources are canonicalized up front, so the directory must exist before the
    /// pipeline starts.
    #[error("invalid filesystem path: {path}")]
    InvalidFilesystemPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_supported_schemes() {
        //* When
        let file = "file".parse::<StoreProvider>();
        let s3 = "S3".parse::<StoreProvider>();
        let s3a = "s3a".parse::<StoreProvider>();

        //* Then
        assert_eq!(file.expect("file scheme should parse"), StoreProvider::Local);
        assert_eq!(s3.expect("s3 scheme should parse"), StoreProvider::AmazonS3);
        assert_eq!(s3a.expect("s3a scheme should parse"), StoreProvider::AmazonS3);
    }

    #[test]
    fn parse_unsupported_schemes() {
        for scheme in ["http", "https", "gs", "memory"] {
            //* When
            let result = scheme.parse::<StoreProvider>();

            //* Then
            assert!(
                matches!(result, Err(StoreUrlError::UnsupportedScheme { .. })),
                "scheme {scheme} should be rejected"
            );
        }
    }

    #[test]
    fn s3_url_exposes_bucket_and_prefix() {
        //* Given
        let location = "s3://fullstackdata2023/nay-krit/lemonfarm/";

        //* When
        let url = StoreUrl::new(location).expect("s3 url should be accepted");

        //* Then
        assert_eq!(url.provider(), StoreProvider::AmazonS3);
        assert_eq!(url.host_str(), Some("fullstackdata2023"));
        assert_eq!(
            url.prefix().expect("prefix should parse").as_ref(),
            "nay-krit/lemonfarm"
        );
    }

    #[test]
    fn s3_url_without_path_has_empty_prefix() {
        //* When
        let url = StoreUrl::new("s3://bucket").expect("s3 url should be accepted");

        //* Then
        assert!(url.prefix().expect("prefix should parse").as_ref().is_empty());
    }

    #[test]
    fn existing_directory_becomes_file_url() {
        //* Given
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let path = dir.path().to_str().expect("temp path should be utf8");

        //* When
        let url = StoreUrl::new(path).expect("existing directory should be accepted");

        //* Then
        assert_eq!(url.provider(), StoreProvider::Local);
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with('/'));
    }

    #[test]
    fn missing_directory_is_rejected() {
        //* When
        let result = StoreUrl::new("/this/path/does/not/exist/hopefully");

        //* Then
        assert!(matches!(
            result,
            Err(StoreUrlError::InvalidFilesystemPath { .. })
        ));
    }
}
