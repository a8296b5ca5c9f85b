//! Ascii PLY point-list I/O.
//!
//! The reference scan is a plain point list: vertex positions plus optional
//! per-vertex color, which is ignored on read. Only the ascii variant is
//! supported; that is what the scan exporter produces.

use std::fs;
use std::path::Path;

use percept_core::{PointCloud, Pt3, Real};

#[derive(thiserror::Error, Debug)]
pub enum PlyError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed ply: {0}")]
    Malformed(String),
    #[error("unsupported ply format '{0}' (only 'ascii 1.0')")]
    UnsupportedFormat(String),
}

/// Read a point cloud from an ascii PLY file.
pub fn read_ply(path: impl AsRef<Path>) -> Result<PointCloud, PlyError> {
    let raw = fs::read_to_string(path)?;
    let mut lines = raw.lines();

    if lines.next().map(str::trim) != Some("ply") {
        return Err(PlyError::Malformed("missing 'ply' magic".into()));
    }

    let mut vertex_count: Option<usize> = None;
    // (x, y, z) property indices within the vertex element.
    let mut coord_idx = [None::<usize>; 3];
    let mut property_count = 0usize;
    let mut in_vertex_element = false;

    for line in lines.by_ref() {
        let line = line.trim();
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("format") => {
                let rest = line.strip_prefix("format").unwrap_or("").trim();
                if rest != "ascii 1.0" {
                    return Err(PlyError::UnsupportedFormat(rest.to_owned()));
                }
            }
            Some("comment") => {}
            Some("element") => {
                let name = tokens.next().unwrap_or("");
                let count = tokens
                    .next()
                    .and_then(|c| c.parse::<usize>().ok())
                    .ok_or_else(|| PlyError::Malformed(format!("bad element line '{line}'")))?;
                if name == "vertex" {
                    if vertex_count.is_some() {
                        return Err(PlyError::Malformed("duplicate vertex element".into()));
                    }
                    vertex_count = Some(count);
                    in_vertex_element = true;
                } else {
                    in_vertex_element = false;
                    if count > 0 {
                        return Err(PlyError::Malformed(format!(
                            "unsupported non-vertex element '{name}'"
                        )));
                    }
                }
            }
            Some("property") => {
                if in_vertex_element {
                    let name = tokens.nth(1).unwrap_or("");
                    match name {
                        "x" => coord_idx[0] = Some(property_count),
                        "y" => coord_idx[1] = Some(property_count),
                        "z" => coord_idx[2] = Some(property_count),
                        _ => {}
                    }
                    property_count += 1;
                }
            }
            Some("end_header") => break,
            Some(other) => {
                return Err(PlyError::Malformed(format!("unexpected header line '{other}'")))
            }
            None => {}
        }
    }

    let vertex_count =
        vertex_count.ok_or_else(|| PlyError::Malformed("no vertex element".into()))?;
    let [Some(xi), Some(yi), Some(zi)] = coord_idx else {
        return Err(PlyError::Malformed("vertex element lacks x/y/z".into()));
    };

    let mut points = Vec::with_capacity(vertex_count);
    for line in lines.take(vertex_count) {
        let values: Vec<Real> = line
            .split_whitespace()
            .map(|t| t.parse::<Real>())
            .collect::<Result<_, _>>()
            .map_err(|e| PlyError::Malformed(format!("bad vertex line '{line}': {e}")))?;
        if values.len() != property_count {
            return Err(PlyError::Malformed(format!(
                "vertex line has {} values, expected {property_count}",
                values.len()
            )));
        }
        points.push(Pt3::new(values[xi], values[yi], values[zi]));
    }
    if points.len() != vertex_count {
        return Err(PlyError::Malformed(format!(
            "expected {vertex_count} vertices, found {}",
            points.len()
        )));
    }

    Ok(PointCloud::from_points(points))
}

/// Write a point cloud as an ascii PLY file (positions only).
pub fn write_ply(cloud: &PointCloud, path: impl AsRef<Path>) -> Result<(), PlyError> {
    let mut out = String::new();
    out.push_str("ply\nformat ascii 1.0\n");
    out.push_str(&format!("element vertex {}\n", cloud.len()));
    out.push_str("property float x\nproperty float y\nproperty float z\nend_header\n");
    for p in &cloud.points {
        out.push_str(&format!("{} {} {}\n", p.x, p.y, p.z));
    }
    fs::write(path, out)?;
    Ok(())
}
