//! STL file format I/O.
//!
//! STL (STereoLithography) stores a flat list of triangles with normals. The
//! reader keeps facets in file order and does not deduplicate vertices, since
//! the view-factor engine works per triangle.

use crate::error::GeometryError;
use crate::geom::triangles::Facet;
use crate::{Point, Vector};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// STL file format variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StlFormat {
    /// ASCII text format (human-readable, larger file size)
    Ascii,
    /// Binary format (compact, faster to read/write)
    Binary,
}

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

/// Reads all facets of an STL file.
pub fn read_stl(path: &Path) -> Result<Vec<Facet>, GeometryError> {
    let data = std::fs::read(path).map_err(|error| GeometryError::Io {
        source_name: path.display().to_string(),
        error,
    })?;
    parse_stl(&data)
}

/// Parses an in-memory STL, detecting ASCII vs binary.
pub fn parse_stl(data: &[u8]) -> Result<Vec<Facet>, GeometryError> {
    match detect_format(data) {
        StlFormat::Ascii => parse_ascii(data),
        StlFormat::Binary => parse_binary(data),
    }
}

/// Binary files may also start with "solid" in their header, so an exact
/// binary size match wins over the keyword check.
fn detect_format(data: &[u8]) -> StlFormat {
    if data.len() >= HEADER_LEN + 4 {
        let declared = u32::from_le_bytes([data[80], data[81], data[82], data[83]]) as usize;
        if data.len() == HEADER_LEN + 4 + declared * FACET_LEN {
            return StlFormat::Binary;
        }
    }
    let head = String::from_utf8_lossy(&data[..data.len().min(512)]);
    if head.trim_start().starts_with("solid") && (head.contains("facet") || head.contains("endsolid"))
    {
        StlFormat::Ascii
    } else {
        StlFormat::Binary
    }
}

fn parse_ascii(data: &[u8]) -> Result<Vec<Facet>, GeometryError> {
    let text = std::str::from_utf8(data).map_err(|e| GeometryError::Malformed {
        index: 0,
        reason: format!("ASCII STL is not valid UTF-8: {e}"),
    })?;

    let mut facets = Vec::new();
    let mut opened = 0_usize;
    let mut normal: Option<Vector> = None;
    let mut vertices: Vec<Point> = Vec::with_capacity(3);

    for line in text.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("facet") => {
                let index = facets.len();
                if normal.is_some() {
                    return Err(malformed(index, "facet opened before previous endfacet"));
                }
                opened += 1;
                if parts.next() != Some("normal") {
                    return Err(malformed(index, "expected `facet normal`"));
                }
                let [dx, dy, dz] = parse_triplet(parts, index)?;
                normal = Some(Vector::new(dx, dy, dz));
                vertices.clear();
            }
            Some("vertex") => {
                let index = facets.len();
                if normal.is_none() {
                    return Err(malformed(index, "vertex outside of a facet"));
                }
                let [x, y, z] = parse_triplet(parts, index)?;
                vertices.push(Point::new(x, y, z));
            }
            Some("endfacet") => {
                let index = facets.len();
                let Some(n) = normal.take() else {
                    return Err(malformed(index, "endfacet without facet"));
                };
                if vertices.len() != 3 {
                    return Err(malformed(
                        index,
                        &format!("expected 3 vertices, found {}", vertices.len()),
                    ));
                }
                facets.push(Facet::new(n, vertices[0], vertices[1], vertices[2]));
            }
            _ => {}
        }
    }

    if opened != facets.len() {
        return Err(GeometryError::FacetCount {
            declared: opened,
            parsed: facets.len(),
        });
    }
    Ok(facets)
}

fn parse_triplet<'a>(
    mut parts: impl Iterator<Item = &'a str>,
    index: usize,
) -> Result<[f64; 3], GeometryError> {
    let mut out = [0.; 3];
    for slot in out.iter_mut() {
        let token = parts
            .next()
            .ok_or_else(|| malformed(index, "expected 3 coordinates"))?;
        *slot = token
            .parse()
            .map_err(|_| malformed(index, &format!("invalid number `{token}`")))?;
    }
    Ok(out)
}

fn malformed(index: usize, reason: &str) -> GeometryError {
    GeometryError::Malformed {
        index,
        reason: reason.to_string(),
    }
}

fn parse_binary(data: &[u8]) -> Result<Vec<Facet>, GeometryError> {
    if data.len() < HEADER_LEN + 4 {
        return Err(GeometryError::Truncated(format!(
            "binary STL needs at least {} bytes, got {}",
            HEADER_LEN + 4,
            data.len()
        )));
    }
    let declared = u32::from_le_bytes([data[80], data[81], data[82], data[83]]) as usize;
    let body = &data[HEADER_LEN + 4..];
    let available = body.len() / FACET_LEN;
    if available != declared || body.len() % FACET_LEN != 0 {
        return Err(GeometryError::FacetCount {
            declared,
            parsed: available,
        });
    }

    let facets = body
        .chunks_exact(FACET_LEN)
        .map(|chunk| {
            let f = |k: usize| {
                let o = 4 * k;
                f32::from_le_bytes([chunk[o], chunk[o + 1], chunk[o + 2], chunk[o + 3]]) as f64
            };
            Facet::new(
                Vector::new(f(0), f(1), f(2)),
                Point::new(f(3), f(4), f(5)),
                Point::new(f(6), f(7), f(8)),
                Point::new(f(9), f(10), f(11)),
            )
        })
        .collect();
    Ok(facets)
}

/// Writes facets to an STL file.
pub fn write_stl(
    path: &Path,
    facets: &[Facet],
    name: &str,
    format: StlFormat,
) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    match format {
        StlFormat::Ascii => write_stl_ascii(&mut writer, facets, name)?,
        StlFormat::Binary => write_stl_binary(&mut writer, facets, name)?,
    }
    writer.flush()
}

fn write_stl_ascii<W: Write>(writer: &mut W, facets: &[Facet], name: &str) -> std::io::Result<()> {
    writeln!(writer, "solid {}", name)?;
    for facet in facets {
        let n = facet.normal;
        writeln!(writer, "  facet normal {} {} {}", n.dx, n.dy, n.dz)?;
        writeln!(writer, "    outer loop")?;
        for p in &facet.vertices {
            writeln!(writer, "      vertex {} {} {}", p.x, p.y, p.z)?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }
    writeln!(writer, "endsolid {}", name)?;
    Ok(())
}

fn write_stl_binary<W: Write>(writer: &mut W, facets: &[Facet], name: &str) -> std::io::Result<()> {
    // 80-byte header
    let mut header = [0u8; HEADER_LEN];
    let header_str = format!("binary STL - {}", name);
    let bytes = header_str.as_bytes();
    let len = bytes.len().min(HEADER_LEN);
    header[..len].copy_from_slice(&bytes[..len]);
    writer.write_all(&header)?;

    writer.write_all(&(facets.len() as u32).to_le_bytes())?;

    for facet in facets {
        let n = facet.normal;
        for c in [n.dx, n.dy, n.dz] {
            writer.write_all(&(c as f32).to_le_bytes())?;
        }
        for p in &facet.vertices {
            for c in [p.x, p.y, p.z] {
                writer.write_all(&(c as f32).to_le_bytes())?;
            }
        }
        // Attribute byte count (unused, set to 0)
        writer.write_all(&0u16.to_le_bytes())?;
    }
    Ok(())
}
