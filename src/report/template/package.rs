//! Reading and rewriting zipped office packages part by part.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::TemplateError;

/// Copy the package at `source` to `target`, letting `transform` replace the
/// contents of individual parts.
///
/// `transform` receives the part name and bytes and returns `Some(new_bytes)`
/// to replace the part. The target is written through a temporary file in
/// the same directory, so a failure never leaves a half-written output, and
/// `source` is only read. Returns the number of replaced parts.
pub fn rewrite_package<F>(source: &Path, target: &Path, mut transform: F) -> Result<usize, TemplateError>
where
    F: FnMut(&str, &[u8]) -> Result<Option<Vec<u8>>, TemplateError>,
{
    let mut archive = ZipArchive::new(File::open(source)?)?;

    let target_dir = target
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(target_dir)?;

    let mut replaced = 0;
    {
        let mut writer = ZipWriter::new(temp.as_file_mut());

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();

            if entry.is_dir() {
                writer.add_directory(name, part_options())?;
                continue;
            }

            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;

            writer.start_file(name.as_str(), part_options())?;
            match transform(&name, &bytes)? {
                Some(updated) => {
                    writer.write_all(&updated)?;
                    replaced += 1;
                }
                None => writer.write_all(&bytes)?,
            }
        }

        writer.finish()?;
    }

    temp.persist(target).map_err(|e| TemplateError::Io(e.error))?;
    Ok(replaced)
}

fn part_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Names of all parts in the package, in archive order.
pub fn part_names(path: &Path) -> Result<Vec<String>, TemplateError> {
    let archive = ZipArchive::new(File::open(path)?)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// Contents of one part, if present.
pub fn read_part(path: &Path, part: &str) -> Result<Option<Vec<u8>>, TemplateError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut entry = match archive.by_name(part) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}
