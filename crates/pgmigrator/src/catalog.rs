//! Turns a directory of migration artifacts into an ordered list of
//! candidate versions with their payload paths.
//!
//! Supported file names:
//! - `20220507.init.up.sql` / `20220507.init.down.sql`
//! - `20220507.up.sql` / `20220507.down.sql` (no suffix)

use crate::error::{MigratorError, OrmResult};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

pub const UP_SUFFIX: &str = ".up.sql";
pub const DOWN_SUFFIX: &str = ".down.sql";
const FILE_MODE: u32 = 0o644;

/// A disk migration whose up payload exists and whose down payload has
/// been confirmed present (see [`pair_check`]).
#[derive(Debug, Clone)]
pub struct MigrationTask {
    pub version: i64,
    pub up_path: PathBuf,
    pub down_path: PathBuf,
}

/// Parse the version out of a migration file's basename: the leading
/// dot-separated segment, interpreted as a decimal integer. Any segment
/// that does not parse in full (non-digits, overflow, empty) yields
/// version `0`, which can never match a real migration.
fn version_of(file_name: &str) -> i64 {
    file_name
        .split('.')
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(0)
}

/// List non-directory entries in `dir` whose name ends with `suffix`,
/// ordered by version ascending. Entries whose basename doesn't parse to
/// a positive version are silently dropped.
pub fn list(dir: impl AsRef<Path>, suffix: &str) -> OrmResult<Vec<(i64, PathBuf)>> {
    let dir = dir.as_ref();
    let metadata = std::fs::metadata(dir).map_err(|_| {
        MigratorError::IsNotDir(dir.display().to_string())
    })?;
    if !metadata.is_dir() {
        return Err(MigratorError::IsNotDir(dir.display().to_string()));
    }

    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !name.ends_with(suffix) {
            continue;
        }
        let version = version_of(name);
        if version == 0 {
            continue;
        }
        out.push((version, path));
    }
    out.sort_by_key(|(v, _)| *v);
    Ok(out)
}

/// For every up file, confirm its down sibling exists on disk. The down
/// name is the up name with [`UP_SUFFIX`] substring-replaced by
/// [`DOWN_SUFFIX`]. Fails on the first missing pair — this is a total
/// pre-execution check, run before any task begins executing.
pub fn pair_check(up_files: Vec<(i64, PathBuf)>) -> OrmResult<Vec<MigrationTask>> {
    let mut tasks = Vec::with_capacity(up_files.len());
    for (version, up_path) in up_files {
        let up_str = up_path.to_string_lossy();
        let down_str = up_str.replacen(UP_SUFFIX, DOWN_SUFFIX, 1);
        let down_path = PathBuf::from(down_str.as_ref());
        if !down_path.is_file() {
            return Err(MigratorError::DownMigrationIsNotExist(
                up_path.display().to_string(),
            ));
        }
        tasks.push(MigrationTask {
            version,
            up_path,
            down_path,
        });
    }
    Ok(tasks)
}

/// Replace spaces with `_`, then strip every byte outside `[A-Za-z0-9_]`.
pub fn sanitize(suffix: &str) -> String {
    suffix
        .replace(' ', "_")
        .bytes()
        .filter(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .map(|b| b as char)
        .collect()
}

static CREATE_PAIR_LOCK: Mutex<()> = Mutex::new(());

/// Generate a fresh `(up_path, down_path)` pair named
/// `YYYYMMDDhhmmss<ms>[.<sanitized-suffix>]`, creating both files empty
/// with mode `0o644`. Retries (sleeping 1ms) while either target already
/// exists, guaranteeing forward progress even when multiple calls land in
/// the same wall-clock second. Serialized within the process since the
/// uniqueness guarantee depends on millisecond-precision timestamps.
pub fn create_pair(dir: impl AsRef<Path>, suffix: &str) -> OrmResult<(PathBuf, PathBuf)> {
    let dir = dir.as_ref();
    let metadata = std::fs::metadata(dir).map_err(|_| MigratorError::IsNotDir(dir.display().to_string()))?;
    if !metadata.is_dir() {
        return Err(MigratorError::IsNotDir(dir.display().to_string()));
    }

    let _guard = CREATE_PAIR_LOCK.lock().unwrap();
    let sanitized = sanitize(suffix);

    loop {
        let now = chrono::Utc::now();
        let millis = now.timestamp_subsec_nanos() / 1_000_000;
        let prefix = if sanitized.is_empty() {
            format!("{}{:03}", now.format("%Y%m%d%H%M%S"), millis)
        } else {
            format!("{}{:03}.{}", now.format("%Y%m%d%H%M%S"), millis, sanitized)
        };

        let up_path = dir.join(format!("{prefix}{UP_SUFFIX}"));
        let down_path = dir.join(format!("{prefix}{DOWN_SUFFIX}"));

        if up_path.exists() || down_path.exists() {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }

        write_empty(&up_path)?;
        write_empty(&down_path)?;
        return Ok((up_path, down_path));
    }
}

fn write_empty(path: &Path) -> OrmResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, b"")?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("pgmigrator-{name}-{nonce}"));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    #[test]
    fn version_of_parses_leading_segment() {
        assert_eq!(version_of("20220507.init.up.sql"), 20220507);
        assert_eq!(version_of("20220507.up.sql"), 20220507);
        assert_eq!(version_of("not_a_migration.sql"), 0);
        assert_eq!(version_of("0.up.sql"), 0);
        assert_eq!(version_of("-5.up.sql"), 0);
    }

    #[test]
    fn sanitize_strips_non_ascii_and_keeps_underscores() {
        assert_eq!(
            sanitize("suffix тут русский текст suffix"),
            "suffix____suffix"
        );
    }

    #[test]
    fn list_orders_by_version_ascending() {
        let dir = temp_dir("list");
        std::fs::write(dir.join("3.up.sql"), "").unwrap();
        std::fs::write(dir.join("1.up.sql"), "").unwrap();
        std::fs::write(dir.join("2.up.sql"), "").unwrap();
        std::fs::write(dir.join("garbage.txt"), "").unwrap();

        let found = list(&dir, UP_SUFFIX).expect("list");
        let versions: Vec<i64> = found.iter().map(|(v, _)| *v).collect();
        assert_eq!(versions, vec![1, 2, 3]);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn list_rejects_non_directory() {
        let dir = temp_dir("notdir");
        let file = dir.join("x.up.sql");
        std::fs::write(&file, "").unwrap();
        let err = list(&file, UP_SUFFIX).expect_err("must fail");
        assert!(matches!(err, MigratorError::IsNotDir(_)));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn pair_check_fails_on_missing_down() {
        let dir = temp_dir("pair");
        std::fs::write(dir.join("1.up.sql"), "").unwrap();
        let ups = list(&dir, UP_SUFFIX).unwrap();
        let err = pair_check(ups).expect_err("must fail");
        assert!(matches!(err, MigratorError::DownMigrationIsNotExist(_)));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn pair_check_succeeds_with_both_files() {
        let dir = temp_dir("pair-ok");
        std::fs::write(dir.join("1.up.sql"), "create table t();").unwrap();
        std::fs::write(dir.join("1.down.sql"), "drop table t;").unwrap();
        let ups = list(&dir, UP_SUFFIX).unwrap();
        let tasks = pair_check(ups).expect("pair_check");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].version, 1);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn create_pair_produces_parseable_distinct_names() {
        let dir = temp_dir("create");
        let (up1, down1) = create_pair(&dir, "suffix тут русский текст suffix").expect("create");
        assert!(up1.exists());
        assert!(down1.exists());
        assert!(up1.to_string_lossy().contains("suffix____suffix.up.sql"));
        assert!(down1.to_string_lossy().contains("suffix____suffix.down.sql"));

        let (up2, _down2) = create_pair(&dir, "suffix тут русский текст suffix").expect("create");
        assert_ne!(up1, up2);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn concurrent_create_pair_calls_produce_distinct_files() {
        let dir = temp_dir("concurrent-create");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dir = dir.clone();
                std::thread::spawn(move || create_pair(&dir, "init").expect("create"))
            })
            .collect();

        let mut ups = Vec::new();
        for h in handles {
            let (up, _down) = h.join().expect("thread");
            ups.push(up);
        }
        let unique: std::collections::HashSet<_> = ups.iter().collect();
        assert_eq!(unique.len(), ups.len());

        std::fs::remove_dir_all(dir).unwrap();
    }
}
