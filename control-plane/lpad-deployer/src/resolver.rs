use std::collections::HashMap;
use std::sync::Arc;

use lpad_models::{
    CatalogEntry, CatalogKind, ChartCoordinate, normalize_version,
};
use tracing::{debug, instrument};

use crate::chart::IndexFetcher;
use crate::errors::ResolveError;

/// When repository-style catalogs are checked against their index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolvePolicy {
    /// Trust the request; the chart locator validates during preflight.
    #[default]
    Deferred,
    /// Fetch the index and reject unknown packages or versions up front.
    Eager,
}

/// Maps (catalog, package, version) to an installable chart coordinate.
pub struct ChartResolver {
    catalogs: HashMap<String, CatalogEntry>,
    policy: ResolvePolicy,
    fetcher: Arc<dyn IndexFetcher>,
}

impl ChartResolver {
    pub fn new(
        catalogs: Vec<CatalogEntry>,
        policy: ResolvePolicy,
        fetcher: Arc<dyn IndexFetcher>,
    ) -> Self {
        Self {
            catalogs: catalogs.into_iter().map(|c| (c.id.clone(), c)).collect(),
            policy,
            fetcher,
        }
    }

    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        catalog_id: &str,
        package: &str,
        version: Option<&str>,
    ) -> Result<ChartCoordinate, ResolveError> {
        let catalog = self
            .catalogs
            .get(catalog_id)
            .ok_or_else(|| ResolveError::CatalogNotFound(catalog_id.to_string()))?;
        let not_found = || ResolveError::PackageNotFound {
            catalog: catalog_id.to_string(),
            package: package.to_string(),
        };
        if catalog.is_excluded(package) {
            return Err(not_found());
        }
        let requested = version.unwrap_or("latest").to_string();
        let version = normalize_version(version);

        let coord = match catalog.kind {
            CatalogKind::Oci => {
                let pkg = catalog.find_package(package).ok_or_else(not_found)?;
                // Registry catalogs list exact versions; there is no "latest".
                let listed = version
                    .as_deref()
                    .is_some_and(|v| pkg.versions.iter().any(|known| known == v));
                if !listed {
                    return Err(ResolveError::VersionNotFound {
                        catalog: catalog_id.to_string(),
                        package: package.to_string(),
                        version: requested,
                    });
                }
                ChartCoordinate::registry(
                    &format!("{}/{package}", catalog.base_location()),
                    version,
                )
            }
            CatalogKind::Helm => {
                if self.policy == ResolvePolicy::Eager {
                    self.check_index(catalog, package, version.as_deref())
                        .await?;
                }
                ChartCoordinate::repository(
                    catalog.base_location(),
                    package,
                    version,
                )
            }
        };
        debug!(chart = %coord, "resolved package");
        Ok(coord)
    }

    async fn check_index(
        &self,
        catalog: &CatalogEntry,
        package: &str,
        version: Option<&str>,
    ) -> Result<(), ResolveError> {
        let index = self
            .fetcher
            .fetch_index(catalog.base_location())
            .await
            .map_err(|e| ResolveError::IndexFetch(e.to_string()))?;
        if !index.has_chart(package) {
            return Err(ResolveError::PackageNotFound {
                catalog: catalog.id.clone(),
                package: package.to_string(),
            });
        }
        if let Some(v) = version {
            if index.find(package, v).is_none() {
                return Err(ResolveError::VersionNotFound {
                    catalog: catalog.id.clone(),
                    package: package.to_string(),
                    version: v.to_string(),
                });
            }
        }
        Ok(())
    }
}
