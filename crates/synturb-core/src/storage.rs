//! Field persistence: raw little-endian component planes plus a JSON
//! provenance manifest.
//!
//! A stored field is a directory holding `manifest.json` and one
//! `<name><i>.bin` file per component. The manifest records everything
//! needed to rebuild an identical `Field`: construction config, element
//! type tag, optional CFL factor and the generation parameters. Reading
//! validates the type tag and element counts before touching any plane.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FieldError;
use crate::field::{Field, FieldConfig};
use crate::scalar::Real;

/// Provenance record stored next to the binary planes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    /// Element type tag, "f32" or "f64".
    pub dtype: String,
    pub config: FieldConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfl: Option<f64>,
    #[serde(default)]
    pub note: String,
    /// Generation parameters, stored as free-form JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Write the field's component planes and manifest into `dir`.
pub fn write_field<T: Real>(
    field: &Field<T>,
    dir: &Path,
    cfl: Option<f64>,
    note: &str,
    params: Option<serde_json::Value>,
) -> Result<(), FieldError> {
    fs::create_dir_all(dir)?;
    let manifest = Manifest {
        name: field.name().to_string(),
        dtype: T::DTYPE.to_string(),
        config: field.config().clone(),
        cfl,
        note: note.to_string(),
        params,
    };
    let file = File::create(dir.join("manifest.json"))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &manifest)?;
    for (i, plane) in field.res().iter().enumerate() {
        let mut bytes = Vec::with_capacity(plane.len() * T::BYTES);
        for v in plane {
            v.write_le(&mut bytes);
        }
        let mut out = BufWriter::new(File::create(component_path(dir, field.name(), i))?);
        out.write_all(&bytes)?;
    }
    Ok(())
}

pub fn read_manifest(dir: &Path) -> Result<Manifest, FieldError> {
    let file = File::open(dir.join("manifest.json"))?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

/// Rebuild a field from a stored directory.
///
/// Fails with a typed error when the stored element type or plane sizes do
/// not match what the manifest's config implies.
pub fn read_field<T: Real>(dir: &Path) -> Result<(Field<T>, Manifest), FieldError> {
    let manifest = read_manifest(dir)?;
    if manifest.dtype != T::DTYPE {
        return Err(FieldError::DtypeMismatch {
            expected: T::DTYPE,
            found: manifest.dtype.clone(),
        });
    }
    let mut field = Field::new(manifest.name.clone(), manifest.config.clone())?;
    let expected = field.grid().real_len();
    let components = field.components();
    for i in 0..components {
        let mut bytes = Vec::new();
        File::open(component_path(dir, &manifest.name, i))?.read_to_end(&mut bytes)?;
        if bytes.len() != expected * T::BYTES {
            return Err(FieldError::ShapeMismatch {
                expected,
                found: bytes.len() / T::BYTES,
            });
        }
        let plane = &mut field.res_mut()[i];
        for (v, chunk) in plane.iter_mut().zip(bytes.chunks_exact(T::BYTES)) {
            *v = T::read_le(chunk);
        }
    }
    Ok((field, manifest))
}

fn component_path(dir: &Path, name: &str, i: usize) -> std::path::PathBuf {
    dir.join(format!("{name}{i}.bin"))
}
