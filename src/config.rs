use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot open toml file: {1}")]
    Open(#[source] std::io::Error, PathBuf),
    #[error("cannot create toml file: {1}")]
    Create(#[source] std::io::Error, PathBuf),
    #[error("cannot read toml file: {1}")]
    Read(#[source] std::io::Error, PathBuf),
    #[error("cannot write toml file: {1}")]
    Write(#[source] std::io::Error, PathBuf),
    #[error("cannot deserialize builder from toml")]
    Load(#[from] toml::de::Error),
    #[error("cannot serialize builder into toml")]
    Save(#[from] toml::ser::Error),
}

/// Builders that can be saved to and restored from a toml file
pub trait TomlConfig: Serialize + DeserializeOwned {
    /// First line written to the file, as a toml comment
    const HEADER: &'static str;

    /// Loads the builder from a toml file
    fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let mut file =
            File::open(&path).map_err(|e| ConfigError::Open(e, path.as_ref().to_path_buf()))?;
        let mut toml = String::new();
        file.read_to_string(&mut toml)
            .map_err(|e| ConfigError::Read(e, path.as_ref().to_path_buf()))?;
        let builder: Self = toml::from_str(&toml)?;
        log::debug!("loaded {} from {:?}", Self::HEADER, path.as_ref());
        Ok(builder)
    }
    /// Saves the builder into a toml file
    fn save<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)?;
        let mut file =
            File::create(&path).map_err(|e| ConfigError::Create(e, path.as_ref().to_path_buf()))?;
        write!(file, "# {}\n\n{}", Self::HEADER, toml)
            .map_err(|e| ConfigError::Write(e, path.as_ref().to_path_buf()))?;
        Ok(())
    }
}
