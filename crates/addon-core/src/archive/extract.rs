// # Archive Extractor
//
// Unpacks a cached release zip into `<cache>/<destination name>/`.
//
// ## Path Safety
//
// Every entry name is resolved lexically against the destination root
// before anything is written. `..` that climbs above the root, absolute
// names and names resolving to the root itself fail the whole archive with
// `SecurityViolation`. Because all names are checked up front, a rejected
// archive leaves nothing behind.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Script the game loads from an add-on's directory
pub const ENTRY_POINT: &str = "main.lua";

/// Extracts release archives into the cache directory
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    cache_dir: PathBuf,
}

/// One validated archive entry
struct PlannedEntry {
    index: usize,
    target: PathBuf,
    is_dir: bool,
}

impl ArchiveExtractor {
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    /// Cache workspace for `name`
    pub fn workspace(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }

    /// Path a release archive for `name` is downloaded to
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.zip", name))
    }

    /// Unpack `archive` into the workspace for `destination`
    ///
    /// # Returns
    ///
    /// - `Ok(PathBuf)`: The workspace directory
    /// - `Err(Error::SecurityViolation)`: An entry escapes the workspace
    /// - `Err(Error::MalformedArchive)`: The zip cannot be read
    /// - `Err(Error::Filesystem)`: Writing the workspace failed
    pub fn extract(&self, archive: &Path, destination: &str) -> Result<PathBuf> {
        validate_addon_name(destination)?;
        let root = self.workspace(destination);

        let file = File::open(archive).map_err(|e| {
            Error::filesystem(format!("Failed to open {}: {}", archive.display(), e))
        })?;
        let mut zip = zip::ZipArchive::new(file)?;

        let mut plan = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let entry = zip.by_index_raw(index)?;
            let relative = resolve_entry(entry.name())?;
            plan.push(PlannedEntry {
                index,
                target: root.join(relative),
                is_dir: entry.is_dir(),
            });
        }

        fs::create_dir_all(&root).map_err(|e| {
            Error::filesystem(format!("Failed to create {}: {}", root.display(), e))
        })?;

        for planned in &plan {
            if planned.is_dir {
                fs::create_dir_all(&planned.target).map_err(|e| {
                    Error::filesystem(format!(
                        "Failed to create {}: {}",
                        planned.target.display(),
                        e
                    ))
                })?;
                continue;
            }

            if let Some(parent) = planned.target.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::filesystem(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }

            let mut entry = zip.by_index(planned.index)?;
            let mut out = File::create(&planned.target).map_err(|e| {
                Error::filesystem(format!(
                    "Failed to create {}: {}",
                    planned.target.display(),
                    e
                ))
            })?;
            io::copy(&mut entry, &mut out).map_err(|e| {
                Error::filesystem(format!(
                    "Failed to write {}: {}",
                    planned.target.display(),
                    e
                ))
            })?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;

                let mode = mode & 0o777;
                if mode != 0 {
                    fs::set_permissions(&planned.target, fs::Permissions::from_mode(mode))
                        .map_err(|e| {
                            Error::filesystem(format!(
                                "Failed to set permissions on {}: {}",
                                planned.target.display(),
                                e
                            ))
                        })?;
                }
            }
        }

        tracing::debug!(
            "Extracted {} entries from {} into {}",
            plan.len(),
            archive.display(),
            root.display()
        );
        Ok(root)
    }
}

/// Check that `archive` looks like an add-on without extracting it
///
/// The archive must have a single top-level directory holding
/// [`ENTRY_POINT`]. Entry names are resolved with the same rules as
/// [`ArchiveExtractor::extract`].
///
/// # Returns
///
/// - `Ok(())`: The archive holds one root directory with `main.lua`
/// - `Err(Error::MalformedArchive)`: No single root, or no `main.lua` in it
/// - `Err(Error::SecurityViolation)`: An entry escapes the archive root
pub fn validate_addon_archive(archive: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| {
        Error::filesystem(format!("Failed to open {}: {}", archive.display(), e))
    })?;
    let mut zip = zip::ZipArchive::new(file)?;

    let mut root: Option<PathBuf> = None;
    let mut has_entry_point = false;

    for index in 0..zip.len() {
        let entry = zip.by_index_raw(index)?;
        let relative = resolve_entry(entry.name())?;
        let mut components = relative.components();
        let Some(top) = components.next() else { continue };
        let top = PathBuf::from(top.as_os_str());

        match &root {
            Some(existing) if *existing != top => {
                return Err(Error::malformed_archive(format!(
                    "{} has more than one top-level entry",
                    archive.display()
                )));
            }
            Some(_) => {}
            None => root = Some(top),
        }

        let rest = components.as_path();
        if !entry.is_dir() && rest == Path::new(ENTRY_POINT) {
            has_entry_point = true;
        }
    }

    if !has_entry_point {
        return Err(Error::malformed_archive(format!(
            "{} does not contain a {} in its root directory",
            archive.display(),
            ENTRY_POINT
        )));
    }

    Ok(())
}

/// Resolve an entry name to a path strictly inside the extraction root
fn resolve_entry(name: &str) -> Result<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut parts = Vec::new();

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(Error::security_violation(format!(
                        "illegal file path in archive: {}",
                        name
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::security_violation(format!(
                    "absolute path in archive: {}",
                    name
                )));
            }
        }
    }

    if parts.is_empty() {
        return Err(Error::security_violation(format!(
            "archive entry resolves to the extraction root: {}",
            name
        )));
    }

    Ok(parts.into_iter().collect())
}

/// Reject add-on names that are not a single plain path component
///
/// Names become directory and file names under the add-on and cache
/// directories.
pub fn validate_addon_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains('\\') => Ok(()),
        _ => Err(Error::security_violation(format!(
            "invalid add-on name: {:?}",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, Option<&str>)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default().unix_permissions(0o644);
        for (name, content) in entries {
            match content {
                Some(bytes) => {
                    zip.start_file(*name, options).unwrap();
                    zip.write_all(bytes.as_bytes()).unwrap();
                }
                None => {
                    zip.add_directory(*name, options).unwrap();
                }
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extracts_into_workspace() {
        let dir = tempdir().unwrap();
        let extractor = ArchiveExtractor::new(dir.path());
        let archive = extractor.archive_path("Raid_Frames");
        write_zip(
            &archive,
            &[
                ("raid-frames-abc123/", None),
                ("raid-frames-abc123/main.lua", Some("print('hi')")),
                ("raid-frames-abc123/ui/frame.lua", Some("-- frame")),
            ],
        );

        let workspace = extractor.extract(&archive, "Raid_Frames").unwrap();
        assert_eq!(workspace, dir.path().join("Raid_Frames"));
        assert_eq!(
            fs::read_to_string(workspace.join("raid-frames-abc123/main.lua")).unwrap(),
            "print('hi')"
        );
        assert!(workspace.join("raid-frames-abc123/ui/frame.lua").is_file());
    }

    #[test]
    fn test_addon_archive_needs_main_lua_in_root() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("Tool.zip");

        write_zip(
            &archive,
            &[("tool/", None), ("tool/main.lua", Some("x")), ("tool/ui/a.lua", Some("a"))],
        );
        assert!(validate_addon_archive(&archive).is_ok());

        write_zip(&archive, &[("tool/", None), ("tool/readme.txt", Some("x"))]);
        let err = validate_addon_archive(&archive).unwrap_err();
        assert!(matches!(err, Error::MalformedArchive(_)), "got {:?}", err);

        write_zip(&archive, &[("tool/", None), ("tool/ui/main.lua", Some("x"))]);
        assert!(matches!(
            validate_addon_archive(&archive),
            Err(Error::MalformedArchive(_))
        ));

        write_zip(&archive, &[("main.lua", Some("loose"))]);
        assert!(matches!(
            validate_addon_archive(&archive),
            Err(Error::MalformedArchive(_))
        ));

        write_zip(
            &archive,
            &[("tool/main.lua", Some("x")), ("other/main.lua", Some("y"))],
        );
        assert!(matches!(
            validate_addon_archive(&archive),
            Err(Error::MalformedArchive(_))
        ));
    }

    #[test]
    fn test_traversal_entry_is_rejected_without_writes() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        fs::create_dir(&cache).unwrap();
        let extractor = ArchiveExtractor::new(&cache);
        let archive = extractor.archive_path("Evil");
        write_zip(
            &archive,
            &[
                ("evil-1/", None),
                ("evil-1/main.lua", Some("ok")),
                ("../../evil", Some("pwned")),
            ],
        );

        let err = extractor.extract(&archive, "Evil").unwrap_err();
        assert!(matches!(err, Error::SecurityViolation(_)), "got {:?}", err);

        assert!(!dir.path().join("evil").exists());
        assert!(!cache.join("evil").exists());
        assert!(!extractor.workspace("Evil").exists(), "nothing written");
    }

    #[test]
    fn test_corrupt_archive_is_malformed() {
        let dir = tempdir().unwrap();
        let extractor = ArchiveExtractor::new(dir.path());
        let archive = extractor.archive_path("Broken");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let err = extractor.extract(&archive, "Broken").unwrap_err();
        assert!(matches!(err, Error::MalformedArchive(_)), "got {:?}", err);
    }

    #[test]
    fn test_destination_name_must_be_plain() {
        let dir = tempdir().unwrap();
        let extractor = ArchiveExtractor::new(dir.path());
        let archive = extractor.archive_path("x");
        write_zip(&archive, &[("x/", None)]);

        assert!(matches!(
            extractor.extract(&archive, "../outside"),
            Err(Error::SecurityViolation(_))
        ));
    }

    #[test]
    fn test_resolve_entry() {
        assert_eq!(resolve_entry("a/b/../c").unwrap(), PathBuf::from("a/c"));
        assert_eq!(resolve_entry("./a").unwrap(), PathBuf::from("a"));
        assert!(resolve_entry("a/../../b").is_err());
        assert!(resolve_entry("/etc/passwd").is_err());
        assert!(resolve_entry("..\\..\\evil").is_err());
        assert!(resolve_entry("a/..").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_bits_applied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let extractor = ArchiveExtractor::new(dir.path());
        let archive = extractor.archive_path("Tool");

        let file = File::create(&archive).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file(
            "tool-1/run.sh",
            SimpleFileOptions::default().unix_permissions(0o755),
        )
        .unwrap();
        zip.write_all(b"#!/bin/sh\n").unwrap();
        zip.finish().unwrap();

        let workspace = extractor.extract(&archive, "Tool").unwrap();
        let mode = fs::metadata(workspace.join("tool-1/run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
