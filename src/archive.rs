use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::{DriverError, Result};

/// Zips everything under `source_dir` into `archive_path`.
///
/// Entry names are relative to `source_dir` with `/` separators. When the
/// archive lives inside `source_dir` it is left out of itself. The zip is
/// written next to `archive_path` first and renamed into place, so a failed
/// run leaves any previous archive untouched. Returns the number of files
/// written.
pub fn archive_directory(source_dir: &Path, archive_path: &Path) -> Result<usize> {
    let partial_path = partial_path(archive_path);
    let written = write_archive(source_dir, archive_path, &partial_path).and_then(|files| {
        fs::rename(&partial_path, archive_path)
            .map_err(|e| DriverError::file_system(archive_path, "replace archive", e))?;
        Ok(files)
    });
    if written.is_err() && partial_path.exists() {
        if let Err(e) = fs::remove_file(&partial_path) {
            tracing::debug!(path = %partial_path.display(), error = %e, "could not remove partial archive");
        }
    }
    written
}

fn partial_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_archive(source_dir: &Path, archive_path: &Path, partial_path: &Path) -> Result<usize> {
    let file = File::create(partial_path)
        .map_err(|e| DriverError::file_system(partial_path, "create archive", e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let with_path = |source| DriverError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };

    let mut files = 0;
    for entry in WalkDir::new(source_dir)
        .min_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        if path == archive_path || path == partial_path {
            continue;
        }
        let name = entry_name(source_dir, path);

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)
                .map_err(with_path)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options).map_err(with_path)?;
            let mut input = File::open(path)
                .map_err(|e| DriverError::file_system(path, "read archive entry", e))?;
            io::copy(&mut input, &mut zip)
                .map_err(|e| DriverError::file_system(path, "write archive entry", e))?;
            files += 1;
        }
    }

    zip.finish().map_err(with_path)?;
    Ok(files)
}

fn entry_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Archives `source_dir`, printing the outcome instead of propagating it.
///
/// A failed archive never changes the result of the batch that produced the
/// files, so the error is only reported.
pub fn archive_best_effort(source_dir: &Path, archive_path: &Path) -> Option<PathBuf> {
    println!(
        "正在將 {} 壓縮至 {} ...",
        source_dir.display(),
        archive_path.display()
    );
    match archive_directory(source_dir, archive_path) {
        Ok(files) => {
            println!("✓ 壓縮完成: {} ({} files)", archive_path.display(), files);
            Some(archive_path.to_path_buf())
        }
        Err(e) => {
            println!("✗ 壓縮失敗: {}", e);
            tracing::warn!(error = ?e, "archive step failed");
            None
        }
    }
}
