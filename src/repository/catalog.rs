// src/repository/catalog.rs

//! Catalog merging
//!
//! Folds package lists from any number of sources into one entry per name.
//! On a name clash the strictly newer version wins; on equal versions the
//! package folded first stays.

use crate::packages::Package;
use std::collections::BTreeMap;
use tracing::debug;

/// Fold one package into a name-keyed catalog
pub fn merge_into(catalog: &mut BTreeMap<String, Package>, pkg: Package) {
    let keep_existing = catalog
        .get(pkg.name())
        .is_some_and(|existing| pkg.version() <= existing.version());

    if keep_existing {
        debug!("Ignoring {} {}: not newer than catalog entry", pkg.name(), pkg.version());
        return;
    }

    catalog.insert(pkg.name().to_string(), pkg);
}

/// Merge package lists into a deduplicated list sorted by name
pub fn merge<I, S>(sources: I) -> Vec<Package>
where
    I: IntoIterator<Item = S>,
    S: IntoIterator<Item = Package>,
{
    let mut catalog = BTreeMap::new();
    for source in sources {
        for pkg in source {
            merge_into(&mut catalog, pkg);
        }
    }
    catalog.into_values().collect()
}
