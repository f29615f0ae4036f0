use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use url::Url;

/// Location of the text recognition model.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelSource {
    /// Fetch over HTTP(S) and keep a copy in the model cache.
    Download(Url),

    /// Read from a local file.
    File(PathBuf),
}

impl ModelSource {
    /// Return the model source given by a `--rec-model` style option, or
    /// `default_url` if the option was not set.
    pub fn from_option(path: Option<&str>, default_url: &str) -> anyhow::Result<ModelSource> {
        match path {
            Some(path) => Ok(ModelSource::File(path.into())),
            None => Url::parse(default_url)
                .map(ModelSource::Download)
                .with_context(|| format!("invalid model URL \"{}\"", default_url)),
        }
    }

    /// Return the local path of the model, downloading it first if needed.
    fn local_path(&self) -> anyhow::Result<PathBuf> {
        match self {
            ModelSource::File(path) => Ok(path.clone()),
            ModelSource::Download(url) => {
                let path = cache_path(url)?;
                if path.exists() {
                    tracing::debug!(path = %path.display(), "using cached model");
                } else {
                    download(url, &path)?;
                }
                Ok(path)
            }
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Download(url) => write!(f, "{}", url),
            ModelSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Return the file name in the last segment of `url`'s path.
fn url_filename(url: &Url) -> Option<&str> {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
}

/// Return the path under `~/.cache/scantext` where the model at `url` is
/// cached.
fn cache_path(url: &Url) -> anyhow::Result<PathBuf> {
    let filename = url_filename(url).ok_or(anyhow!("URL \"{}\" does not name a file", url))?;

    let home = home::home_dir().ok_or(anyhow!("Failed to determine home directory"))?;
    let cache_dir = home.join(".cache").join("scantext");
    fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Failed to create cache dir \"{}\"", cache_dir.display()))?;

    Ok(cache_dir.join(filename))
}

/// Stream the body of `url` into `dest`.
///
/// The body is written to a `.part` file next to `dest`, which is renamed to
/// `dest` once complete.
fn download(url: &Url, dest: &Path) -> anyhow::Result<()> {
    eprintln!("Downloading {}...", url);

    let partial = dest.with_extension("part");
    let mut body = ureq::get(url.as_str()).call()?.into_body().into_reader();
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("Failed to create \"{}\"", partial.display()))?;
    io::copy(&mut body, &mut file)?;
    fs::rename(&partial, dest)?;

    Ok(())
}

/// Load the model from `source`.
pub fn load_model(source: &ModelSource) -> anyhow::Result<rten::Model> {
    let path = source.local_path()?;
    scantext::load_model(&path)
}
