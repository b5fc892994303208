use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const INCLUDES_DIR_NAME: &str = "includes";
pub const STATE_DIR_NAME: &str = ".sitetool";
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub site_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub site_root: PathBuf,
    pub includes_dir: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "site_root={} ({})\nincludes_dir={}\nstate_dir={}\nconfig_path={} ({})",
            normalize_for_display(&self.site_root),
            self.root_source.as_str(),
            normalize_for_display(&self.includes_dir),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub site_root_exists: bool,
    pub includes_exists: bool,
    pub state_dir_exists: bool,
    pub config_exists: bool,
    pub warnings: Vec<String>,
}

pub fn resolve_paths(overrides: &PathOverrides) -> Result<ResolvedPaths> {
    let cwd = env::current_dir().context("failed to read current directory")?;
    resolve_paths_with_lookup(&cwd, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    cwd: &Path,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (site_root, root_source) = if let Some(path) = overrides.site_root.as_deref() {
        (absolutize(path, cwd), ValueSource::Flag)
    } else if let Some(value) = lookup_env("SITETOOL_SITE_ROOT")
        && !value.trim().is_empty()
    {
        (absolutize(Path::new(value.trim()), cwd), ValueSource::Env)
    } else {
        (cwd.to_path_buf(), ValueSource::Default)
    };

    let state_dir = site_root.join(STATE_DIR_NAME);
    let includes_dir = site_root.join(INCLUDES_DIR_NAME);
    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, cwd), ValueSource::Flag)
    } else if let Some(value) = lookup_env("SITETOOL_CONFIG")
        && !value.trim().is_empty()
    {
        (absolutize(Path::new(value.trim()), cwd), ValueSource::Env)
    } else {
        (state_dir.join(CONFIG_FILENAME), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        site_root,
        includes_dir,
        state_dir,
        config_path,
        root_source,
        config_source,
    })
}

pub fn inspect_runtime(paths: &ResolvedPaths) -> RuntimeStatus {
    let site_root_exists = paths.site_root.is_dir();
    let includes_exists = paths.includes_dir.is_dir();
    let state_dir_exists = paths.state_dir.is_dir();
    let config_exists = paths.config_path.is_file();

    let mut warnings = Vec::new();
    if !site_root_exists {
        warnings.push(format!(
            "site root does not exist: {}",
            normalize_for_display(&paths.site_root)
        ));
    }
    if !config_exists {
        warnings.push(format!(
            "no config file at {}; built-in defaults apply",
            normalize_for_display(&paths.config_path)
        ));
    }

    RuntimeStatus {
        site_root_exists,
        includes_exists,
        state_dir_exists,
        config_exists,
        warnings,
    }
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{PathOverrides, ValueSource, resolve_paths_with_lookup};

    #[test]
    fn flag_override_wins_over_env() {
        let paths = resolve_paths_with_lookup(
            Path::new("/work"),
            &PathOverrides {
                site_root: Some(PathBuf::from("/srv/site")),
                config: None,
            },
            |_| Some("/elsewhere".to_string()),
        )
        .expect("resolve");
        assert_eq!(paths.site_root, PathBuf::from("/srv/site"));
        assert_eq!(paths.root_source, ValueSource::Flag);
        assert_eq!(paths.includes_dir, PathBuf::from("/srv/site/includes"));
    }

    #[test]
    fn env_override_used_when_no_flag() {
        let paths = resolve_paths_with_lookup(
            Path::new("/work"),
            &PathOverrides::default(),
            |key| (key == "SITETOOL_SITE_ROOT").then(|| "/srv/mirror".to_string()),
        )
        .expect("resolve");
        assert_eq!(paths.site_root, PathBuf::from("/srv/mirror"));
        assert_eq!(paths.root_source, ValueSource::Env);
        assert_eq!(
            paths.config_path,
            PathBuf::from("/srv/mirror/.sitetool/config.toml")
        );
        assert_eq!(paths.config_source, ValueSource::Default);
    }

    #[test]
    fn defaults_to_cwd() {
        let paths =
            resolve_paths_with_lookup(Path::new("/work"), &PathOverrides::default(), |_| None)
                .expect("resolve");
        assert_eq!(paths.site_root, PathBuf::from("/work"));
        assert_eq!(paths.root_source, ValueSource::Default);
    }

    #[test]
    fn relative_flag_is_anchored_to_cwd() {
        let paths = resolve_paths_with_lookup(
            Path::new("/work"),
            &PathOverrides {
                site_root: Some(PathBuf::from("mirror/site")),
                config: None,
            },
            |_| None,
        )
        .expect("resolve");
        assert_eq!(paths.site_root, PathBuf::from("/work/mirror/site"));
    }
}
