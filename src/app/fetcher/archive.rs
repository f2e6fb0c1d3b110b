//! Archive extraction into the staging workspace

use std::io::{Cursor, Read};

use tracing::{debug, warn};
use zip::ZipArchive;

use crate::app::workspace::Workspace;
use crate::constants::limits::MAX_ARCHIVE_ENTRY_BYTES;
use crate::errors::{FetchError, FetchResult};

/// Unpack every file in a zip archive into the workspace
///
/// Directory structure inside the archive is flattened: each entry is staged
/// under its bare file name. Directory entries and entries whose names would
/// escape the archive root are skipped. Returns the staged names in archive order.
///
/// # Errors
///
/// `FetchError::MalformedArchive` if the bytes are not a readable zip or an
/// entry inflates past `MAX_ARCHIVE_ENTRY_BYTES`, `FetchError::EmptyArchive`
/// if it holds no files, or a workspace error if a file cannot be staged.
pub fn extract_archive(bytes: &[u8], workspace: &dyn Workspace) -> FetchResult<Vec<String>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut staged = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let Some(name) = entry
            .enclosed_name()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
        else {
            warn!("Skipping archive entry with unsafe name: {}", entry.name());
            continue;
        };

        // Header sizes are untrusted; grow the buffer from what actually inflates
        let mut contents = Vec::new();
        (&mut entry)
            .take(MAX_ARCHIVE_ENTRY_BYTES + 1)
            .read_to_end(&mut contents)
            .map_err(|e| FetchError::MalformedArchive {
                reason: format!("failed to inflate {}: {}", name, e),
            })?;
        if contents.len() as u64 > MAX_ARCHIVE_ENTRY_BYTES {
            return Err(FetchError::MalformedArchive {
                reason: format!(
                    "{} inflates past {} bytes",
                    name, MAX_ARCHIVE_ENTRY_BYTES
                ),
            });
        }

        workspace.add(&name, &contents)?;
        debug!("Staged {} ({} bytes)", name, contents.len());
        staged.push(name);
    }

    if staged.is_empty() {
        return Err(FetchError::EmptyArchive);
    }
    Ok(staged)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::app::workspace::MemoryWorkspace;
    use std::io::Write;
    use zip::write::FileOptions;

    /// Build a zip archive from (name, contents) pairs
    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, FileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, FileOptions::default()).unwrap();
                writer.write_all(contents).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_flattens_entries() {
        let bytes = build_zip(&[
            ("tile/", b""),
            ("tile/abc1234567dem.img", b"raster"),
            ("tile/abc1234567dem.img.aux.xml", b"<xml/>"),
        ]);
        let workspace = MemoryWorkspace::new();

        let staged = extract_archive(&bytes, &workspace).unwrap();
        assert_eq!(
            staged,
            vec!["abc1234567dem.img".to_string(), "abc1234567dem.img.aux.xml".to_string()]
        );
        assert_eq!(workspace.read("abc1234567dem.img").unwrap(), b"raster");
    }

    #[test]
    fn test_garbage_is_malformed() {
        let workspace = MemoryWorkspace::new();
        let err = extract_archive(b"<html>Access Denied</html>", &workspace).unwrap_err();
        assert!(matches!(err, FetchError::MalformedArchive { .. }));
        assert_eq!(err.kind(), "archive");
        assert!(workspace.is_empty());
    }

    /// Rewrite a single-entry stored zip so its central directory claims a
    /// zip64 uncompressed size of `claimed` bytes
    fn with_claimed_size(bytes: &[u8], claimed: u64) -> Vec<u8> {
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at =
            |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

        let eocd = bytes.len() - 22;
        let cd_offset = u32_at(eocd + 16) as usize;
        let name_len = u16_at(26) as usize;
        let name = &bytes[30..30 + name_len];

        let mut out = bytes[..cd_offset].to_vec();
        let central_start = out.len();
        out.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes()); // made by
        out.extend_from_slice(&45u16.to_le_bytes()); // needed
        out.extend_from_slice(&bytes[6..18]); // flags, method, time, date, crc
        out.extend_from_slice(&bytes[18..22]); // compressed size
        out.extend_from_slice(&u32::MAX.to_le_bytes()); // see zip64 extra
        out.extend_from_slice(&(name_len as u16).to_le_bytes());
        out.extend_from_slice(&12u16.to_le_bytes()); // extra length
        out.extend_from_slice(&[0; 6]); // comment, disk, internal attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // local header offset
        out.extend_from_slice(name);
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&claimed.to_le_bytes());
        let central_len = out.len() - central_start;

        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&(central_len as u32).to_le_bytes());
        out.extend_from_slice(&(central_start as u32).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    /// Single-entry stored zip whose directory overstates the entry size
    pub(crate) fn zip_claiming_size(name: &str, contents: &[u8], claimed: u64) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let stored = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file(name, stored).unwrap();
        writer.write_all(contents).unwrap();
        let honest = writer.finish().unwrap().into_inner();
        with_claimed_size(&honest, claimed)
    }

    #[test]
    fn test_declared_size_is_not_trusted() {
        let lying = zip_claiming_size("abc1234567dem.img", b"raster", 1 << 40);
        let workspace = MemoryWorkspace::new();
        let staged = extract_archive(&lying, &workspace).unwrap();
        assert_eq!(staged, vec!["abc1234567dem.img".to_string()]);
        assert_eq!(workspace.read("abc1234567dem.img").unwrap(), b"raster");
    }

    #[test]
    fn test_archive_without_files_is_empty() {
        let bytes = build_zip(&[("only_a_dir/", b"")]);
        let workspace = MemoryWorkspace::new();
        assert!(matches!(
            extract_archive(&bytes, &workspace),
            Err(FetchError::EmptyArchive)
        ));
    }
}
