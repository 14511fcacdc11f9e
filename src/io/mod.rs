//! Mesh loading for the view-factor engine.
//!
//! The engine only needs facets in file order; how a [`MeshSource`] is
//! resolved is up to the [`GeometryLoader`] in use.

pub mod stl;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::GeometryError;
use crate::geom::triangles::Facet;

pub use stl::{StlFormat, parse_stl, read_stl, write_stl};

/// Where a mesh comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshSource {
    /// Local file.
    Path(PathBuf),
    /// Remote resource, fetched over HTTP(S).
    Url(String),
    /// Mesh already held in memory.
    Bytes { name: String, data: Vec<u8> },
}

impl MeshSource {
    /// Interprets a job or CLI identifier: anything with a scheme is a URL.
    pub fn parse(identifier: &str) -> Self {
        if identifier.contains("://") {
            MeshSource::Url(identifier.to_string())
        } else {
            MeshSource::Path(PathBuf::from(identifier))
        }
    }
}

impl fmt::Display for MeshSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshSource::Path(p) => write!(f, "{}", p.display()),
            MeshSource::Url(u) => f.write_str(u),
            MeshSource::Bytes { name, data } => write!(f, "{name} ({} bytes)", data.len()),
        }
    }
}

/// Turns a mesh source into raw facets.
pub trait GeometryLoader: Send {
    fn load(&self, source: &MeshSource) -> Result<Vec<Facet>, GeometryError>;
}

/// Time allowed for downloading one remote mesh.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Loads STL meshes from files, HTTP(S) URLs or memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct StlLoader;

impl GeometryLoader for StlLoader {
    fn load(&self, source: &MeshSource) -> Result<Vec<Facet>, GeometryError> {
        match source {
            MeshSource::Path(path) => read_stl(path),
            MeshSource::Bytes { data, .. } => parse_stl(data),
            MeshSource::Url(url) => parse_stl(&fetch(url)?),
        }
    }
}

/// Downloads the body of `url`. Anything but a 2xx response is an error.
fn fetch(url: &str) -> Result<Vec<u8>, GeometryError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(GeometryError::UnsupportedSource(url.to_string()));
    }
    let failed = |error: io::Error| GeometryError::Io {
        source_name: url.to_string(),
        error,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| failed(io::Error::other(e)))?;
    let response = client
        .get(url)
        .send()
        .map_err(|e| failed(io::Error::other(e)))?;
    let status = response.status();
    if !status.is_success() {
        return Err(failed(io::Error::other(format!("HTTP {status}"))));
    }
    let body = response.bytes().map_err(|e| failed(io::Error::other(e)))?;
    log::debug!("fetched {} bytes from {url}", body.len());
    Ok(body.to_vec())
}
