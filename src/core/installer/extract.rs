use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, warn};

use crate::core::error::{ManagerError, ManagerResult};

/// Archive formats release assets ship in, picked by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else {
            None
        }
    }
}

/// Extract `archive` into `dest`, returning the number of files written.
/// Entries that would land outside `dest` are skipped.
pub fn extract(archive: &Path, kind: ArchiveKind, dest: &Path) -> ManagerResult<usize> {
    std::fs::create_dir_all(dest).map_err(|e| ManagerError::io(dest, e))?;
    match kind {
        ArchiveKind::Zip => extract_zip(archive, dest),
        ArchiveKind::TarGz => extract_tar_gz(archive, dest),
    }
}

fn extract_zip(zip_path: &Path, dest: &Path) -> ManagerResult<usize> {
    let zip_file = File::open(zip_path).map_err(|e| ManagerError::io(zip_path, e))?;
    let mut archive = zip::ZipArchive::new(zip_file)?;
    let mut written = 0;

    for index in 0..archive.len() {
        let mut zipped = archive.by_index(index)?;
        let Some(rel_path) = zipped.enclosed_name() else {
            warn!("Skipping unsafe zip entry {:?}", zipped.name());
            continue;
        };

        let out_path: PathBuf = dest.join(rel_path);
        if zipped.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| ManagerError::io(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ManagerError::io(parent, e))?;
        }

        let mut out = File::create(&out_path).map_err(|e| ManagerError::io(&out_path, e))?;
        std::io::copy(&mut zipped, &mut out).map_err(|e| ManagerError::io(&out_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = zipped.unix_mode() {
                let _ =
                    std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }

        debug!("Extracted {:?}", out_path);
        written += 1;
    }

    Ok(written)
}

fn extract_tar_gz(tar_path: &Path, dest: &Path) -> ManagerResult<usize> {
    let file = File::open(tar_path).map_err(|e| ManagerError::io(tar_path, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_mtime(false);
    archive.set_unpack_xattrs(false);

    let mut written = 0;
    let entries = archive.entries().map_err(|e| ManagerError::io(tar_path, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| ManagerError::io(tar_path, e))?;
        let name = entry
            .path()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();
        let is_file = entry.header().entry_type().is_file();

        // `unpack_in` refuses paths escaping `dest` and reports false.
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| ManagerError::io(dest.join(&name), e))?;
        if !unpacked {
            warn!("Skipping unsafe tar entry {:?}", name);
            continue;
        }
        if is_file {
            debug!("Extracted {:?}", name);
            written += 1;
        }
    }

    Ok(written)
}
