//! Single-member extraction from a release tar.
//!
//! Release tars bundle the data file with terms-of-use PDFs and readmes;
//! only `{release}.txt.gz` is needed.

use std::path::Path;

use bird_targets_config::DatasetFiles;

use crate::{DatasetError, StepOutcome, partial_path, skip_if_exists};

/// Extracts `files.archive_member()` from `files.tar` to `files.txt_gz`.
///
/// # Errors
///
/// Returns [`DatasetError::MissingInput`] if the tar has not been
/// downloaded, [`DatasetError::MemberNotFound`] if the archive lacks the
/// data file, or an I/O error.
pub fn extract(files: &DatasetFiles) -> Result<StepOutcome, DatasetError> {
    if let Some(skipped) = skip_if_exists(&files.txt_gz, "Extracted file") {
        return Ok(skipped);
    }
    if !files.tar.exists() {
        return Err(DatasetError::MissingInput {
            what: "Tar file",
            path: files.tar.clone(),
            step: "download",
        });
    }

    log::info!("Extracting {} from {}", files.archive_member(), files.tar.display());
    let bytes = extract_member(&files.tar, &files.archive_member(), &files.txt_gz)?;
    log::info!(
        "Extracted {bytes} bytes and renamed to {}",
        files.txt_gz.display()
    );

    Ok(StepOutcome::Done)
}

/// Copies the archive entry whose path (or file name) is `member` to
/// `dest`, returning its size.
///
/// The entry is written next to `dest` first and renamed into place, so
/// an interrupted extraction leaves no file at `dest`.
///
/// # Errors
///
/// Returns [`DatasetError::MemberNotFound`] or an I/O error.
pub fn extract_member(archive: &Path, member: &str, dest: &Path) -> Result<u64, DatasetError> {
    let file = std::fs::File::open(archive).map_err(|e| DatasetError::io(archive, e))?;
    let mut tar = tar::Archive::new(file);

    let entries = tar.entries().map_err(|e| DatasetError::io(archive, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| DatasetError::io(archive, e))?;
        let path = entry.path().map_err(|e| DatasetError::io(archive, e))?;

        let matches = path.to_str() == Some(member)
            || path.file_name().and_then(|n| n.to_str()) == Some(member);
        if !matches {
            continue;
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
        }
        let tmp = partial_path(dest);
        let mut out = std::fs::File::create(&tmp).map_err(|e| DatasetError::io(&tmp, e))?;
        let size = std::io::copy(&mut entry, &mut out).map_err(|e| DatasetError::io(&tmp, e))?;
        drop(out);
        std::fs::rename(&tmp, dest).map_err(|e| DatasetError::io(dest, e))?;

        return Ok(size);
    }

    Err(DatasetError::MemberNotFound {
        archive: archive.to_path_buf(),
        member: member.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use bird_targets_config::{DatasetPaths, OutputPaths, Release};

    use super::*;

    fn build_tar(path: &Path, members: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.finish().unwrap();
    }

    #[test]
    fn extracts_and_renames_data_member() {
        let dir = std::env::temp_dir().join(format!("bird_targets_extract_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let output = OutputPaths::from_base(&dir);
        let paths = DatasetPaths::for_release(Release::new(2025, 12).unwrap(), &output);
        fs::create_dir_all(&paths.datasets_dir).unwrap();

        build_tar(
            &paths.species.tar,
            &[
                ("terms_of_use.pdf", b"%PDF"),
                ("ebd_relDec-2025/ebd_relDec-2025.txt.gz", b"gzip bytes"),
            ],
        );

        assert_eq!(extract(&paths.species).unwrap(), StepOutcome::Done);
        assert_eq!(fs::read(&paths.species.txt_gz).unwrap(), b"gzip bytes");
        assert!(!partial_path(&paths.species.txt_gz).exists());

        assert_eq!(extract(&paths.species).unwrap(), StepOutcome::Skipped);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_member_and_missing_tar() {
        let dir = std::env::temp_dir().join(format!("bird_targets_extract_missing_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let output = OutputPaths::from_base(&dir);
        let paths = DatasetPaths::for_release(Release::new(2025, 12).unwrap(), &output);
        fs::create_dir_all(&paths.datasets_dir).unwrap();

        assert!(matches!(
            extract(&paths.sampling),
            Err(DatasetError::MissingInput { step: "download", .. })
        ));

        build_tar(&paths.sampling.tar, &[("readme.txt", b"hello")]);
        assert!(matches!(
            extract(&paths.sampling),
            Err(DatasetError::MemberNotFound { .. })
        ));

        let _ = fs::remove_dir_all(&dir);
    }
}
