pub mod config;
pub mod poll;
pub mod toggle;

use std::path::Path;

use seedharvest_core::HarvestConfig;

/// Load a config file, or the defaults when no path is given.
pub fn load_config(path: Option<&str>) -> std::io::Result<HarvestConfig> {
    match path {
        Some(p) => HarvestConfig::load(Path::new(p)),
        None => Ok(HarvestConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_path_gives_defaults() {
        assert_eq!(load_config(None).unwrap(), HarvestConfig::default());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config(Some("/nonexistent/seedharvest.json")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
