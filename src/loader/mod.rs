//! City list loader. The list is the one input whose absence is fatal:
//! without cities there is nothing to scrape.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

/// Read the city list CSV (a `ville` column, one city per row).
pub fn load_city_list(path: &Path) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Could not open city list {:?}", path))?;

    let ville_idx = rdr
        .headers()?
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case("ville"))
        .with_context(|| format!("No `ville` column in {:?}", path))?;

    let mut cities = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if let Some(city) = record.get(ville_idx) {
            let city = city.trim();
            if !city.is_empty() {
                cities.push(city.to_string());
            }
        }
    }

    if cities.is_empty() {
        bail!("City list {:?} is empty", path);
    }

    info!("Loaded {} cities from {:?}", cities.len(), path);
    Ok(cities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", name, std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_cities_in_order() {
        let path = write_temp("villes-list", "ville\nParis\nLe Havre\n Lyon \n");
        let cities = load_city_list(&path).unwrap();
        assert_eq!(cities, vec!["Paris", "Le Havre", "Lyon"]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_list_is_fatal() {
        let path = write_temp("villes-empty", "ville\n");
        assert!(load_city_list(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
