pub mod codec;

use std::path::{Path, PathBuf};

use tracing::info;

pub use codec::{encode, parse, ExportError, ExportedProfile, ModSection};

use crate::core::error::{ManagerError, ManagerResult};
use crate::core::profile::{Profile, ProfileStore};

pub const EXTENSION: &str = "negative";

/// Write `name` to `output_dir` as a `.negative` file and return its path.
pub async fn export_profile(
    profiles: &ProfileStore,
    name: &str,
    output_dir: &Path,
    file_name: Option<&str>,
) -> ManagerResult<PathBuf> {
    let profile = profiles.get_info(name).await?;

    if !output_dir.is_dir() {
        return Err(ManagerError::io(
            output_dir,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "output directory does not exist",
            ),
        ));
    }

    let icon = Some(profile.descriptor.icon).filter(|icon| !icon.is_empty());
    let bytes = encode(&ExportedProfile::new(profile.name, icon));

    let path = output_dir.join(export_file_name(name, file_name));
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| ManagerError::io(&path, e))?;

    info!("Exported profile '{}' to {:?} ({} bytes)", name, path, bytes.len());
    Ok(path)
}

/// Create a profile from a `.negative` file.
pub async fn import_profile(profiles: &ProfileStore, file: &Path) -> ManagerResult<Profile> {
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|e| ManagerError::io(file, e))?;
    let exported = parse(&bytes)?;

    let profile = profiles
        .create_with_icon(&exported.name, exported.icon)
        .await?;
    info!("Imported profile '{}' from {:?}", profile.name, file);
    Ok(profile)
}

fn export_file_name(name: &str, file_name: Option<&str>) -> String {
    let suffix = format!(".{EXTENSION}");
    match file_name {
        Some(custom) if custom.ends_with(&suffix) => custom.to_string(),
        Some(custom) => format!("{custom}{suffix}"),
        None => format!("{name}-export{suffix}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::model::DEFAULT_ICON;

    #[test]
    fn file_names() {
        assert_eq!(export_file_name("Cryptid", None), "Cryptid-export.negative");
        assert_eq!(export_file_name("Cryptid", Some("share")), "share.negative");
        assert_eq!(
            export_file_name("Cryptid", Some("share.negative")),
            "share.negative"
        );
    }

    #[tokio::test]
    async fn export_then_import_into_another_store() {
        let root = tempfile::tempdir().unwrap();
        let source = ProfileStore::new(root.path().join("a"));
        source
            .create_with_icon("Cryptid", Some("data:image/png;base64,QUJD".into()))
            .await
            .unwrap();

        let out = root.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        let file = export_profile(&source, "Cryptid", &out, None).await.unwrap();
        assert_eq!(file, out.join("Cryptid-export.negative"));

        let target = ProfileStore::new(root.path().join("b"));
        let imported = import_profile(&target, &file).await.unwrap();
        assert_eq!(imported.name, "Cryptid");
        assert_eq!(imported.descriptor.icon, "data:image/png;base64,QUJD");
        assert_eq!(imported.descriptor.time_played, 0);
        assert!(imported.mods().is_empty());
    }

    #[tokio::test]
    async fn import_clash_and_corruption() {
        let root = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(root.path().join("profiles"));
        store.create("Default").await.unwrap();

        let file = export_profile(&store, "Default", root.path(), Some("d"))
            .await
            .unwrap();
        let err = import_profile(&store, &file).await.unwrap_err();
        assert!(matches!(err, ManagerError::ProfileAlreadyExists(_)));

        let mut bytes = std::fs::read(&file).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&file, bytes).unwrap();
        let err = import_profile(&store, &file).await.unwrap_err();
        assert!(matches!(
            err,
            ManagerError::InvalidExport(ExportError::ChecksumMismatch)
        ));
    }

    #[tokio::test]
    async fn default_icon_survives_export() {
        let root = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(root.path().join("profiles"));
        store.create("Plain").await.unwrap();

        let file = export_profile(&store, "Plain", root.path(), None).await.unwrap();
        let parsed = parse(&std::fs::read(file).unwrap()).unwrap();
        assert_eq!(parsed.icon.as_deref(), Some(DEFAULT_ICON));
    }

    #[tokio::test]
    async fn missing_output_directory_fails() {
        let root = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(root.path().join("profiles"));
        store.create("Plain").await.unwrap();

        let err = export_profile(&store, "Plain", &root.path().join("nope"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::Io { .. }));
    }
}
