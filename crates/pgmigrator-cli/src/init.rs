//! `pgmigrator init`: scaffold a default config file, refusing to
//! overwrite an existing one.

use crate::cli::InitArgs;
use std::path::Path;

pub fn run(args: InitArgs) -> anyhow::Result<()> {
    write_template(&args.config)
}

fn write_template(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("refusing to overwrite existing file: {}", path.display());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("failed to create directory {}: {e}", parent.display())
            })?;
        }
    }

    let content = r#"
[migrator]
dsn = "${DATABASE_URL}"
path = "./migrations"
type = "sql" # sql | go
table = "dbmigrator_version"
"#
    .trim_start_matches('\n');

    std::fs::write(path, content)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;

    println!("New config file '{}' has been created", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::InitArgs;

    #[test]
    fn refuses_to_overwrite() {
        let dir = std::env::temp_dir().join(format!(
            "pgmigrator-cli-init-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(".pgmigrator.toml");
        std::fs::write(&path, "").unwrap();

        let err = run(InitArgs { config: path.clone() }).unwrap_err();
        assert!(err.to_string().contains("refusing to overwrite"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
