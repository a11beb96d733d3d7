//! Configuration access port.

use crate::domain::error::StockcastError;

/// Typed lookups over `[section] key = value` settings. Numeric getters
/// return `default` when the key is absent and `ConfigInvalid` when it is
/// present but unparsable.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, StockcastError>;
    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, StockcastError>;
}
