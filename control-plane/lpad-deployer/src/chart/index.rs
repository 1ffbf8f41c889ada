use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use lpad_models::{CatalogEntry, CatalogKind};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::RepoError;

/// A chart repository `index.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoIndex {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub entries: HashMap<String, Vec<IndexedChart>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedChart {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
}

impl RepoIndex {
    pub fn parse(raw: &str) -> Result<Self, RepoError> {
        serde_yaml::from_str(raw).map_err(|e| RepoError::Parse(e.to_string()))
    }

    pub fn has_chart(&self, chart: &str) -> bool {
        self.entries.get(chart).is_some_and(|v| !v.is_empty())
    }

    pub fn find(&self, chart: &str, version: &str) -> Option<&IndexedChart> {
        self.entries
            .get(chart)?
            .iter()
            .find(|c| c.version == version)
    }

    /// Highest stable version of `chart`, preferring non-deprecated
    /// releases. Pre-releases are only picked when nothing else is
    /// published.
    pub fn latest(&self, chart: &str) -> Option<&IndexedChart> {
        let versions = self.entries.get(chart)?;
        newest(versions, |c| !c.deprecated && !c.is_prerelease())
            .or_else(|| newest(versions, |c| !c.is_prerelease()))
            .or_else(|| newest(versions, |_| true))
    }
}

fn newest(
    versions: &[IndexedChart],
    keep: impl Fn(&IndexedChart) -> bool,
) -> Option<&IndexedChart> {
    versions
        .iter()
        .filter(|c| keep(c))
        .max_by(|a, b| compare_versions(&a.version, &b.version))
}

impl IndexedChart {
    pub fn is_prerelease(&self) -> bool {
        let v = self.version.split('+').next().unwrap_or(&self.version);
        v.contains('-')
    }

    /// First archive URL, made absolute against the repository location.
    pub fn archive_url(&self, repo_url: &str) -> Option<String> {
        let url = self.urls.first()?;
        if url.starts_with("http://") || url.starts_with("https://") {
            Some(url.clone())
        } else {
            Some(format!("{}/{}", repo_url.trim_end_matches('/'), url))
        }
    }
}

/// Orders dotted versions numerically where possible (`1.10.0` > `1.9.2`),
/// with a release outranking its pre-releases.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn split(v: &str) -> (Vec<&str>, Option<&str>) {
        let v = v.trim_start_matches('v');
        let v = v.split('+').next().unwrap_or(v);
        match v.split_once('-') {
            Some((core, pre)) => (core.split('.').collect(), Some(pre)),
            None => (v.split('.').collect(), None),
        }
    }

    let (core_a, pre_a) = split(a);
    let (core_b, pre_b) = split(b);
    for i in 0..core_a.len().max(core_b.len()) {
        let pa = core_a.get(i).copied().unwrap_or("0");
        let pb = core_b.get(i).copied().unwrap_or("0");
        let ord = match (pa.parse::<u64>(), pb.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => pa.cmp(pb),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    match (pre_a, pre_b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => compare_identifiers(x, y),
    }
}

/// Dot-separated identifiers, numeric ones compared as numbers.
fn compare_identifiers(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                (Ok(_), Err(_)) => Ordering::Less,
                (Err(_), Ok(_)) => Ordering::Greater,
                (Err(_), Err(_)) => x.cmp(y),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

fn same_origin(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => {
            a.scheme() == b.scheme()
                && a.host_str() == b.host_str()
                && a.port_or_known_default() == b.port_or_known_default()
        }
        _ => false,
    }
}

/// Access to repository-style chart sources.
#[async_trait]
pub trait IndexFetcher: Send + Sync {
    async fn fetch_index(&self, repo_url: &str) -> Result<RepoIndex, RepoError>;

    async fn fetch_archive(
        &self,
        repo_url: &str,
        url: &str,
    ) -> Result<Vec<u8>, RepoError>;
}

#[derive(Debug, Clone)]
struct RepoAccess {
    client: Client,
    username: Option<String>,
    password: Option<String>,
}

/// reqwest-backed fetcher. Repositories configured as catalogs get their
/// own client carrying the catalog's TLS settings and basic auth.
#[derive(Debug, Clone)]
pub struct HttpIndexFetcher {
    default: Client,
    repos: HashMap<String, RepoAccess>,
}

impl HttpIndexFetcher {
    pub fn new(catalogs: &[CatalogEntry]) -> Self {
        let mut repos = HashMap::new();
        for cat in catalogs.iter().filter(|c| c.kind == CatalogKind::Helm) {
            let mut builder = Client::builder()
                .user_agent(concat!("lpad-deployer/", env!("CARGO_PKG_VERSION")))
                .danger_accept_invalid_certs(cat.skip_tls_verify);
            if let Some(ca_file) = cat.ca_file.as_deref() {
                match std::fs::read(ca_file)
                    .map_err(|e| e.to_string())
                    .and_then(|pem| {
                        reqwest::Certificate::from_pem(&pem)
                            .map_err(|e| e.to_string())
                    }) {
                    Ok(cert) => builder = builder.add_root_certificate(cert),
                    Err(e) => {
                        warn!(catalog = %cat.id, ca_file, error = %e, "ignoring unreadable CA file")
                    }
                }
            }
            let client = match builder.build() {
                Ok(c) => c,
                Err(e) => {
                    warn!(catalog = %cat.id, error = %e, "falling back to default HTTP client");
                    Client::new()
                }
            };
            repos.insert(
                cat.base_location().to_string(),
                RepoAccess {
                    client,
                    username: cat.username.clone(),
                    password: cat.password.clone(),
                },
            );
        }
        Self {
            default: Client::new(),
            repos,
        }
    }

    /// Catalog credentials only go to the catalog's own origin; archives
    /// hosted elsewhere are fetched anonymously.
    fn request(&self, repo_url: &str, url: &str) -> reqwest::RequestBuilder {
        match self.repos.get(repo_url.trim_end_matches('/')) {
            Some(access) => {
                let req = access.client.get(url);
                match access.username.as_deref() {
                    Some(user) if same_origin(repo_url, url) => {
                        req.basic_auth(user, access.password.as_deref())
                    }
                    Some(_) => {
                        debug!(%url, "archive outside repository origin; sending no credentials");
                        req
                    }
                    None => req,
                }
            }
            None => self.default.get(url),
        }
    }

    async fn get_bytes(
        &self,
        repo_url: &str,
        url: &str,
    ) -> Result<Vec<u8>, RepoError> {
        let http_err = |e: reqwest::Error| RepoError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let response = self.request(repo_url, url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RepoError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await.map_err(http_err)?.to_vec())
    }
}

#[async_trait]
impl IndexFetcher for HttpIndexFetcher {
    async fn fetch_index(&self, repo_url: &str) -> Result<RepoIndex, RepoError> {
        let url = format!("{}/index.yaml", repo_url.trim_end_matches('/'));
        debug!(%url, "fetching repository index");
        let body = self.get_bytes(repo_url, &url).await?;
        let raw = String::from_utf8_lossy(&body);
        RepoIndex::parse(&raw)
    }

    async fn fetch_archive(
        &self,
        repo_url: &str,
        url: &str,
    ) -> Result<Vec<u8>, RepoError> {
        debug!(%url, "downloading chart archive");
        self.get_bytes(repo_url, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const INDEX: &str = r#"
apiVersion: v1
entries:
  postgresql:
    - name: postgresql
      version: 12.10.0
      urls: [charts/postgresql-12.10.0.tgz]
    - name: postgresql
      version: 12.9.1
      urls: [https://mirror.example.org/postgresql-12.9.1.tgz]
    - name: postgresql
      version: 13.0.0-rc.1
      urls: [charts/postgresql-13.0.0-rc.1.tgz]
"#;

    #[test]
    fn picks_latest_numerically() {
        let index = RepoIndex::parse(INDEX).unwrap();
        assert_eq!(index.latest("postgresql").unwrap().version, "12.10.0");
        assert!(index.find("postgresql", "9.9.9").is_none());
        assert!(!index.has_chart("redis"));
    }

    #[test]
    fn prereleases_only_when_nothing_stable() {
        let index = RepoIndex::parse(
            r#"
entries:
  nightly:
    - { name: nightly, version: 2.0.0-beta.2, urls: [a.tgz] }
    - { name: nightly, version: 2.0.0-beta.10, urls: [b.tgz] }
  legacy:
    - { name: legacy, version: 1.4.0, deprecated: true, urls: [c.tgz] }
    - { name: legacy, version: 1.5.0-rc.1, urls: [d.tgz] }
"#,
        )
        .unwrap();
        assert_eq!(index.latest("nightly").unwrap().version, "2.0.0-beta.10");
        assert_eq!(index.latest("legacy").unwrap().version, "1.4.0");
    }

    #[test]
    fn origin_matching() {
        assert!(same_origin(
            "https://charts.example.org/stable",
            "https://charts.example.org:443/charts/a.tgz"
        ));
        assert!(!same_origin(
            "https://charts.example.org",
            "https://mirror.example.org/a.tgz"
        ));
        assert!(!same_origin("http://127.0.0.1:8080", "http://127.0.0.1:8081/a.tgz"));
    }

    #[test]
    fn archive_urls_are_joined_to_repo() {
        let index = RepoIndex::parse(INDEX).unwrap();
        let latest = index.latest("postgresql").unwrap();
        assert_eq!(
            latest.archive_url("https://charts.example.org/").unwrap(),
            "https://charts.example.org/charts/postgresql-12.10.0.tgz"
        );
        let mirrored = index.find("postgresql", "12.9.1").unwrap();
        assert_eq!(
            mirrored.archive_url("https://charts.example.org").unwrap(),
            "https://mirror.example.org/postgresql-12.9.1.tgz"
        );
    }

    #[test]
    fn version_ordering() {
        assert_eq!(compare_versions("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("v2.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.0-rc.1", "1.0.0"), Ordering::Less);
        assert_eq!(
            compare_versions("1.0.0-rc.10", "1.0.0-rc.9"),
            Ordering::Greater
        );
    }

    #[tokio::test]
    async fn fetches_index_with_catalog_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX))
            .expect(1)
            .mount(&server)
            .await;

        let catalog: CatalogEntry = serde_json::from_value(serde_json::json!({
            "id": "private",
            "type": "helm",
            "location": format!("{}/", server.uri()),
            "username": "svc",
            "password": "secret",
        }))
        .unwrap();
        let fetcher = HttpIndexFetcher::new(&[catalog]);
        let index = fetcher.fetch_index(&server.uri()).await.unwrap();
        assert!(index.has_chart("postgresql"));
    }

    #[tokio::test]
    async fn mirrored_archive_gets_no_credentials() {
        let repo = MockServer::start().await;
        let mirror = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/demo-0.1.0.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tgz".to_vec()))
            .expect(1)
            .mount(&mirror)
            .await;

        let catalog: CatalogEntry = serde_json::from_value(serde_json::json!({
            "id": "private",
            "type": "helm",
            "location": repo.uri(),
            "username": "svc",
            "password": "secret",
        }))
        .unwrap();
        let fetcher = HttpIndexFetcher::new(&[catalog]);
        let bytes = fetcher
            .fetch_archive(&repo.uri(), &format!("{}/demo-0.1.0.tgz", mirror.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"tgz");

        let requests = mirror.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpIndexFetcher::new(&[]);
        let err = fetcher.fetch_index(&server.uri()).await.unwrap_err();
        assert!(matches!(err, RepoError::Status { status: 404, .. }));
    }
}
