use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::command::{PackageCommands, RunSpec};
use crate::error::{CoreError, Result};

/// Config file names probed by [`find_config`], in priority order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["config.yml", "config.yaml"];

/// Package name → commands to run when that package is published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    pub packages: BTreeMap<String, PackageCommands>,
}

impl Config {
    /// Read and parse a YAML config file. An empty document is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Err(CoreError::EmptyConfig);
        }
        let packages: Option<BTreeMap<String, PackageCommands>> =
            serde_yaml::from_str(data).map_err(CoreError::ConfigParse)?;
        match packages {
            Some(packages) if !packages.is_empty() => Ok(Self { packages }),
            _ => Err(CoreError::EmptyConfig),
        }
    }

    /// The run spec configured for `package`, if any.
    pub fn commands_for(&self, package: &str) -> Option<RunSpec> {
        self.packages.get(package).map(PackageCommands::run_spec)
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }
}

impl FromIterator<(String, PackageCommands)> for Config {
    fn from_iter<I: IntoIterator<Item = (String, PackageCommands)>>(iter: I) -> Self {
        Self {
            packages: iter.into_iter().collect(),
        }
    }
}

/// Look for `config.yml`, then `config.yaml`, in `dir`.
pub fn find_config(dir: &Path) -> Result<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or(CoreError::ConfigNotFound)
}
