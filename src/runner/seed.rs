//! Seed discovery.
//!
//! Seeds are plain SQL files under the seed directory, run in file-name
//! order after a successful migration. A namespace selects a subdirectory.

use std::path::PathBuf;

use crate::config::Config;
use crate::error::Result;
use crate::scanner::{MigrationCandidate, Scanner};

use super::SeedParams;

fn seed_dir(config: &Config, params: &SeedParams) -> PathBuf {
    match &params.namespace {
        Some(ns) => ns
            .split(['/', '\\', ':'])
            .filter(|part| !part.is_empty() && *part != "..")
            .fold(config.seeds.path.clone(), |dir, part| dir.join(part)),
        None => config.seeds.path.clone(),
    }
}

pub(super) fn display_name(config: &Config, params: &SeedParams) -> String {
    seed_dir(config, params).display().to_string()
}

pub(super) fn discover(
    config: &Config,
    scanner: &Scanner,
    params: &SeedParams,
) -> Result<Vec<MigrationCandidate>> {
    Ok(scanner.scan(&seed_dir(config, params), &[])?.candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_namespace_maps_to_subdirectory() {
        let mut config = Config::default();
        config.seeds.path = PathBuf::from("/app/seeds");

        let root = SeedParams { namespace: None };
        assert_eq!(seed_dir(&config, &root), Path::new("/app/seeds"));

        let nested = SeedParams {
            namespace: Some("Demo\\Users".to_string()),
        };
        assert_eq!(seed_dir(&config, &nested), Path::new("/app/seeds/Demo/Users"));

        let escaping = SeedParams {
            namespace: Some("../../etc".to_string()),
        };
        assert_eq!(seed_dir(&config, &escaping), Path::new("/app/seeds/etc"));
    }
}
