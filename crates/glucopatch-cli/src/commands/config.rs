//! Config command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use glucopatch_cli::config::Config;

use crate::cli::ConfigAction;
use crate::style;
use crate::util::write_output;

pub fn cmd_config(
    action: ConfigAction,
    explicit: Option<&Path>,
    output: Option<&PathBuf>,
    no_color: bool,
) -> Result<()> {
    let path = Config::resolve_path(explicit);

    match action {
        ConfigAction::Path => write_output(output, &format!("{}\n", path.display())),
        ConfigAction::Show => {
            let config = Config::load(Some(&path));
            let body = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            let source = if path.exists() {
                format!("# {}\n", path.display())
            } else {
                format!("# {} (not found, showing defaults)\n", path.display())
            };
            write_output(output, &format!("{}{}", source, body))
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save(&path)?;
            eprintln!(
                "{}",
                style::format_success(
                    &format!("Wrote default config to {}", path.display()),
                    no_color
                )
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("glucopatch").join("config.toml");

        cmd_config(ConfigAction::Init { force: false }, Some(&path), None, true).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_readings = 10\n").unwrap();

        let err = cmd_config(ConfigAction::Init { force: false }, Some(&path), None, true)
            .unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(Config::load_from(&path).unwrap().max_readings, Some(10));

        cmd_config(ConfigAction::Init { force: true }, Some(&path), None, true).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().max_readings, None);
    }

    #[test]
    fn test_show_and_path_write_to_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "scan_timeout_secs = 9\n").unwrap();
        let out = dir.path().join("out.txt");

        cmd_config(ConfigAction::Show, Some(&path), Some(&out), true).unwrap();
        let shown = std::fs::read_to_string(&out).unwrap();
        assert!(shown.starts_with(&format!("# {}\n", path.display())));
        assert!(shown.contains("scan_timeout_secs = 9"));

        cmd_config(ConfigAction::Path, Some(&path), Some(&out), true).unwrap();
        assert_eq!(
            std::fs::read_to_string(&out).unwrap().trim_end(),
            path.display().to_string()
        );
    }
}
