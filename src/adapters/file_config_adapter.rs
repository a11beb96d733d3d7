//! INI file configuration adapter.

use crate::domain::error::StockcastError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StockcastError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| StockcastError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, StockcastError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| StockcastError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn invalid(section: &str, key: &str, reason: String) -> StockcastError {
        StockcastError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, StockcastError> {
        self.config
            .getint(section, key)
            .map(|v| v.unwrap_or(default))
            .map_err(|reason| Self::invalid(section, key, reason))
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, StockcastError> {
        self.config
            .getfloat(section, key)
            .map(|v| v.unwrap_or(default))
            .map_err(|reason| Self::invalid(section, key, reason))
    }
}
