use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

/// Render a relative path with `/` separators, as ignore patterns expect.
pub(crate) fn to_slash_path(path_rel: &Path) -> String {
    path_rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(v) => Some(v.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Drop `.` components; reject absolute paths and `..`.
pub(crate) fn normalize_relative_path(path: &Path) -> Option<PathBuf> {
    let mut path_out = PathBuf::new();
    for part in path.components() {
        match part {
            Component::Normal(v) => path_out.push(v),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(path_out)
}

/// `py` -> `.py`; `.py` stays.
pub(crate) fn normalize_suffix(value: &str) -> String {
    let value = value.trim();
    if value.starts_with('.') {
        value.to_string()
    } else {
        format!(".{value}")
    }
}

pub(crate) fn has_allowed_suffix(name_file: &str, suffixes_allowed: &[String]) -> bool {
    suffixes_allowed.iter().any(|v| name_file.ends_with(v.as_str()))
}

fn _is_relative_to_base(path: &Path, base: &Path) -> bool {
    path.starts_with(base)
}

pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    // not created yet: resolve the parent so that `dst/../x` style inputs compare sanely
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name())
        && !parent.as_os_str().is_empty()
        && let Ok(resolved_parent) = fs::canonicalize(parent)
    {
        return resolved_parent.join(name);
    }
    absolutize_path(path)
}

fn absolutize_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

/// `true` when `path_inner` equals or lies below `path_outer` (both normalized).
pub(crate) fn is_within(path_inner: &Path, path_outer: &Path) -> bool {
    _is_relative_to_base(&normalize_path(path_inner), &normalize_path(path_outer))
}

/// Refuse destinations that escape the target root or traverse a symlink.
pub(crate) fn validate_destination_path_safety(
    path_dst_item: &Path,
    path_dir_dst_root: &Path,
) -> Result<(), String> {
    let path_dir_dst_root_abs = absolutize_path(path_dir_dst_root);
    let path_dst_item_abs = absolutize_path(path_dst_item);

    let path_rel = path_dst_item_abs
        .strip_prefix(&path_dir_dst_root_abs)
        .map_err(|_| {
            format!(
                "Unsafe destination path escapes destination root: {} (root={})",
                path_dst_item.display(),
                path_dir_dst_root.display()
            )
        })?;
    if normalize_relative_path(path_rel).is_none() {
        return Err(format!(
            "Unsafe destination path escapes destination root: {} (root={})",
            path_dst_item.display(),
            path_dir_dst_root.display()
        ));
    }

    let mut path_cursor = path_dir_dst_root_abs.clone();
    for part_rel in path_rel.components() {
        path_cursor.push(part_rel.as_os_str());
        match fs::symlink_metadata(&path_cursor) {
            Ok(meta_cursor) => {
                if meta_cursor.file_type().is_symlink() {
                    return Err(format!(
                        "Unsafe destination path traverses symlink component: {}",
                        path_cursor.display()
                    ));
                }
            }
            // nothing deeper can exist either
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => {
                return Err(format!(
                    "Failed to inspect destination path component {} ({e})",
                    path_cursor.display()
                ));
            }
        }
    }

    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FileCopy

/// Copy one file so that readers never observe a partial destination.
///
/// Bytes go to a temporary file next to `path_file_dst`; permissions, times
/// (and on Linux extended attributes) are applied to it, then it is moved into
/// place without replacing an existing file.
pub(crate) fn copy_file_atomic(path_file_src: &Path, path_file_dst: &Path) -> io::Result<()> {
    let mut file_src = fs::File::open(path_file_src)?;
    let stat_src = file_src.metadata()?;
    if !stat_src.is_file() {
        return Err(io::Error::other(format!(
            "Source is no longer a regular file: {}",
            path_file_src.display()
        )));
    }

    let path_dir_parent = path_file_dst
        .parent()
        .filter(|v| !v.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut file_tmp = tempfile::Builder::new()
        .prefix(".remapkit-")
        .suffix(".part")
        .tempfile_in(path_dir_parent)?;

    io::copy(&mut file_src, file_tmp.as_file_mut())?;
    apply_metadata(path_file_src, &stat_src, file_tmp.path())?;

    file_tmp
        .persist_noclobber(path_file_dst)
        .map_err(|e| e.error)?;
    Ok(())
}

fn apply_metadata(
    path_file_src: &Path,
    stat_src: &fs::Metadata,
    path_file_tmp: &Path,
) -> io::Result<()> {
    use filetime::{FileTime, set_file_times};

    fs::set_permissions(path_file_tmp, stat_src.permissions())?;

    let file_time_access = FileTime::from_last_access_time(stat_src);
    let file_time_modify = FileTime::from_last_modification_time(stat_src);
    set_file_times(path_file_tmp, file_time_access, file_time_modify)?;

    #[cfg(target_os = "linux")]
    copy_xattrs_linux(path_file_src, path_file_tmp);
    #[cfg(not(target_os = "linux"))]
    let _ = path_file_src;
    Ok(())
}

#[cfg(target_os = "linux")]
fn copy_xattrs_linux(path_file_src: &Path, path_file_dst: &Path) {
    let iter_xattr_names = match xattr::list(path_file_src) {
        Ok(v) => v,
        Err(_) => return,
    };

    for name in iter_xattr_names {
        let Some(raw_value) = xattr::get(path_file_src, &name).ok().flatten() else {
            continue;
        };
        let _ = xattr::set(path_file_dst, &name, &raw_value);
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Workers

pub(crate) fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    use super::{
        copy_file_atomic, normalize_relative_path, normalize_suffix, to_slash_path,
        validate_destination_path_safety,
    };

    #[test]
    fn normalize_relative_path_rejects_escape() {
        assert_eq!(
            normalize_relative_path(Path::new("./a/./b")),
            Some(PathBuf::from("a/b"))
        );
        assert_eq!(normalize_relative_path(Path::new("")), Some(PathBuf::new()));
        assert_eq!(normalize_relative_path(Path::new("a/../b")), None);
        assert_eq!(normalize_relative_path(Path::new("/etc/passwd")), None);
    }

    #[test]
    fn slash_path_and_suffix_helpers() {
        assert_eq!(to_slash_path(Path::new("a/b/c.txt")), "a/b/c.txt");
        assert_eq!(normalize_suffix("py"), ".py");
        assert_eq!(normalize_suffix(" .md "), ".md");
    }

    #[test]
    fn copy_file_atomic_preserves_bytes_and_mtime_without_clobber() {
        use filetime::{FileTime, set_file_mtime};

        let tmp = TempDir::new().expect("tempdir");
        let path_src = tmp.path().join("src.bin");
        let path_dst = tmp.path().join("dst.bin");
        std::fs::write(&path_src, b"\x00\x01payload").expect("write src");
        set_file_mtime(&path_src, FileTime::from_unix_time(1_700_000_020, 0)).expect("mtime");

        copy_file_atomic(&path_src, &path_dst).expect("copy");
        assert_eq!(std::fs::read(&path_dst).expect("read dst"), b"\x00\x01payload");
        let stat_dst = std::fs::metadata(&path_dst).expect("dst metadata");
        assert_eq!(
            FileTime::from_last_modification_time(&stat_dst),
            FileTime::from_unix_time(1_700_000_020, 0)
        );

        assert!(copy_file_atomic(&path_src, &path_dst).is_err());
        let l_leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(l_leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn destination_safety_blocks_symlink_component() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().expect("tempdir");
        let dst = tmp.path().join("dst");
        let outside = tmp.path().join("outside");
        std::fs::create_dir_all(&dst).expect("create dst");
        std::fs::create_dir_all(&outside).expect("create outside");
        symlink(&outside, dst.join("escape")).expect("symlink");

        assert!(validate_destination_path_safety(&dst.join("escape/f.txt"), &dst).is_err());
        assert!(validate_destination_path_safety(&dst.join("fine/f.txt"), &dst).is_ok());
        assert!(validate_destination_path_safety(&tmp.path().join("x.txt"), &dst).is_err());
    }
}
