use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::APP_CACHE_DIR_NAME;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("model {0} not found locally and downloads are disabled")]
    Offline(String),
}

/// Progress callback: `(bytes_downloaded, total_bytes)`, `total_bytes` is 0
/// when the server sends no Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// A downloadable model file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub url: String,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Locates model files: user cache, then an optional bundled directory,
/// then a download into the cache.
pub struct ModelResolver {
    cache_dir: PathBuf,
    bundled_dir: Option<PathBuf>,
    allow_download: bool,
    progress: Option<ProgressFn>,
}

impl ModelResolver {
    /// Resolver rooted at the platform cache directory.
    pub fn new() -> Result<Self, ModelResolveError> {
        Ok(Self::with_cache_dir(model_cache_dir()?))
    }

    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            bundled_dir: None,
            allow_download: true,
            progress: None,
        }
    }

    pub fn bundled_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundled_dir = Some(dir.into());
        self
    }

    pub fn offline(mut self) -> Self {
        self.allow_download = false;
        self
    }

    pub fn on_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn resolve(&self, spec: &ModelSpec) -> Result<PathBuf, ModelResolveError> {
        let cached = self.cache_dir.join(&spec.name);
        if cached.exists() {
            log::debug!("Model {} found in cache", spec.name);
            return Ok(cached);
        }

        if let Some(bundled) = self
            .bundled_dir
            .as_ref()
            .map(|dir| dir.join(&spec.name))
            .filter(|path| path.exists())
        {
            log::debug!("Model {} found at {}", spec.name, bundled.display());
            return Ok(bundled);
        }

        if !self.allow_download {
            return Err(ModelResolveError::Offline(spec.name.clone()));
        }

        fs::create_dir_all(&self.cache_dir).map_err(ModelResolveError::CacheDir)?;
        log::info!("Downloading model {} from {}", spec.name, spec.url);
        download(&spec.url, &cached, self.progress.as_ref())?;
        Ok(cached)
    }
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/FaceMask/models/`
/// - Linux: `$XDG_CACHE_HOME/FaceMask/models/` or `~/.cache/FaceMask/models/`
/// - Windows: `%LOCALAPPDATA%/FaceMask/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();

    base.map(|d| d.join(APP_CACHE_DIR_NAME).join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

/// Streams `url` into `<dest>.part` and renames on success; the partial file
/// is removed on any failure.
fn download(url: &str, dest: &Path, progress: Option<&ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");
    let result = stream_to(url, dest, &temp_path, progress);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn stream_to(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<&ProgressFn>,
) -> Result<(), ModelResolveError> {
    let download_err = |source| ModelResolveError::Download {
        url: url.to_string(),
        source,
    };
    let write_err = |path: &Path, source| ModelResolveError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(download_err)?;
    let total = response.content_length().unwrap_or(0);

    let mut file = fs::File::create(temp_path).map_err(|e| write_err(temp_path, e))?;
    let mut buf = vec![0u8; 1024 * 1024];
    let mut downloaded: u64 = 0;
    loop {
        let n = response
            .read(&mut buf)
            .map_err(|e| write_err(temp_path, e))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .map_err(|e| write_err(temp_path, e))?;
        downloaded += n as u64;
        if let Some(cb) = progress {
            cb(downloaded, total);
        }
    }
    file.flush().map_err(|e| write_err(temp_path, e))?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|e| write_err(dest, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec(name: &str) -> ModelSpec {
        ModelSpec::new(name, "http://invalid.nonexistent.example.com/model")
    }

    #[test]
    fn test_resolve_prefers_cache() {
        let cache = TempDir::new().unwrap();
        let bundled = TempDir::new().unwrap();
        fs::write(cache.path().join("m.onnx"), b"cached").unwrap();
        fs::write(bundled.path().join("m.onnx"), b"bundled").unwrap();

        let resolver = ModelResolver::with_cache_dir(cache.path()).bundled_dir(bundled.path());
        let path = resolver.resolve(&spec("m.onnx")).unwrap();
        assert_eq!(path, cache.path().join("m.onnx"));
    }

    #[test]
    fn test_resolve_falls_back_to_bundled() {
        let cache = TempDir::new().unwrap();
        let bundled = TempDir::new().unwrap();
        fs::write(bundled.path().join("m.onnx"), b"bundled").unwrap();

        let resolver = ModelResolver::with_cache_dir(cache.path()).bundled_dir(bundled.path());
        let path = resolver.resolve(&spec("m.onnx")).unwrap();
        assert_eq!(path, bundled.path().join("m.onnx"));
    }

    #[test]
    fn test_offline_resolver_does_not_download() {
        let cache = TempDir::new().unwrap();
        let resolver = ModelResolver::with_cache_dir(cache.path()).offline();
        let err = resolver.resolve(&spec("missing.onnx")).unwrap_err();
        assert!(matches!(err, ModelResolveError::Offline(ref name) if name == "missing.onnx"));
    }

    #[test]
    fn test_cache_dir_is_app_specific() {
        let path = model_cache_dir().unwrap();
        assert!(path.to_string_lossy().contains(APP_CACHE_DIR_NAME));
        assert!(path.ends_with("models"));
    }

    #[test]
    fn test_failed_download_leaves_no_files() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let result = download("http://invalid.nonexistent.example.com/model", &dest, None);
        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}
