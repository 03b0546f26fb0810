//! Keystone v3 password authentication and service catalog selection.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CloudConfig;
use crate::provider::ProviderError;

use super::wire::error_message;
use super::{HTTP_CLIENT, Service};

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

#[derive(Serialize)]
struct AuthBody<'a> {
    auth: Auth<'a>,
}

#[derive(Serialize)]
struct Auth<'a> {
    identity: Identity<'a>,
    scope: Scope<'a>,
}

#[derive(Serialize)]
struct Identity<'a> {
    methods: [&'static str; 1],
    password: PasswordMethod<'a>,
}

#[derive(Serialize)]
struct PasswordMethod<'a> {
    user: User<'a>,
}

#[derive(Serialize)]
struct User<'a> {
    name: &'a str,
    domain: Domain<'a>,
    password: &'a str,
}

#[derive(Serialize)]
struct Scope<'a> {
    project: Project<'a>,
}

#[derive(Serialize)]
struct Project<'a> {
    name: &'a str,
    domain: Domain<'a>,
}

#[derive(Serialize)]
struct Domain<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

/// One service in the Keystone catalog.
#[derive(Clone, Debug, Deserialize)]
pub(super) struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Clone, Debug, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

/// Base URLs of the services used by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct Endpoints {
    pub(super) compute: String,
    pub(super) network: String,
    pub(super) volume: String,
    pub(super) image: String,
}

impl Endpoints {
    pub(super) fn base(&self, service: Service) -> &str {
        match service {
            Service::Compute => &self.compute,
            Service::Network => &self.network,
            Service::Volume => &self.volume,
            Service::Image => &self.image,
        }
    }
}

/// Scoped token plus the endpoints it unlocks.
#[derive(Clone, Debug)]
pub(super) struct Session {
    pub(super) token: String,
    pub(super) endpoints: Endpoints,
}

/// Requests a project-scoped token with the configured password
/// credentials.
pub(super) async fn authenticate(config: &CloudConfig) -> Result<Session, ProviderError> {
    let url = format!("{}/auth/tokens", config.auth_url.trim_end_matches('/'));
    let body = AuthBody {
        auth: Auth {
            identity: Identity {
                methods: ["password"],
                password: PasswordMethod {
                    user: User {
                        name: &config.username,
                        domain: Domain {
                            name: &config.user_domain_name,
                        },
                        password: &config.password,
                    },
                },
            },
            scope: Scope {
                project: Project {
                    name: &config.project_name,
                    domain: Domain {
                        name: &config.project_domain_name,
                    },
                },
            },
        },
    };

    debug!(auth_url = %config.auth_url, user = %config.username, "requesting token");
    let response = HTTP_CLIENT
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|err| ProviderError::backend(err.to_string()))?;

    let status = response.status();
    let token = response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);
    let bytes = response
        .bytes()
        .await
        .map_err(|err| ProviderError::backend(err.to_string()))?;

    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ProviderError::Auth {
            message: error_message(&bytes),
        });
    }
    if !status.is_success() {
        return Err(ProviderError::Backend {
            status: Some(status.as_u16()),
            message: error_message(&bytes),
        });
    }
    let token = token.ok_or_else(|| ProviderError::Auth {
        message: format!("identity service returned no {SUBJECT_TOKEN_HEADER} header"),
    })?;
    let parsed: TokenEnvelope =
        serde_json::from_slice(&bytes).map_err(|err| ProviderError::backend(err.to_string()))?;

    let endpoints = resolve_endpoints(
        &parsed.token.catalog,
        &config.interface,
        config.region_name.as_deref(),
    )?;
    info!(project = %config.project_name, "authenticated with identity service");
    Ok(Session { token, endpoints })
}

fn resolve_endpoints(
    catalog: &[CatalogEntry],
    interface: &str,
    region: Option<&str>,
) -> Result<Endpoints, ProviderError> {
    let pick = |service: Service| {
        select_endpoint(catalog, service.catalog_types(), interface, region).ok_or_else(|| {
            ProviderError::Auth {
                message: format!(
                    "service catalog has no {interface} endpoint for {}",
                    service.as_str()
                ),
            }
        })
    };
    Ok(Endpoints {
        compute: pick(Service::Compute)?,
        network: pick(Service::Network)?,
        volume: pick(Service::Volume)?,
        image: pick(Service::Image)?,
    })
}

/// Picks the first endpoint whose service type is in `types`, whose
/// interface matches, and whose region matches when one is requested.
/// Trailing slashes are removed.
pub(super) fn select_endpoint(
    catalog: &[CatalogEntry],
    types: &[&str],
    interface: &str,
    region: Option<&str>,
) -> Option<String> {
    types.iter().find_map(|wanted| {
        catalog
            .iter()
            .filter(|entry| entry.service_type == *wanted)
            .flat_map(|entry| entry.endpoints.iter())
            .find(|endpoint| {
                endpoint.interface == interface
                    && region.is_none_or(|name| {
                        endpoint.region.as_deref() == Some(name)
                            || endpoint.region_id.as_deref() == Some(name)
                    })
            })
            .map(|endpoint| endpoint.url.trim_end_matches('/').to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn catalog() -> Vec<CatalogEntry> {
        serde_json::from_value(json!([
            {"type": "compute", "endpoints": [
                {"interface": "internal", "region": "RegionOne", "url": "http://nova.internal:8774/v2.1"},
                {"interface": "public", "region": "RegionOne", "url": "http://nova:8774/v2.1/"},
                {"interface": "public", "region": "RegionTwo", "url": "http://nova-two:8774/v2.1"}
            ]},
            {"type": "block-storage", "endpoints": [
                {"interface": "public", "region": "RegionOne", "url": "http://cinder:8776/v3/p1"}
            ]},
            {"type": "volumev3", "endpoints": [
                {"interface": "public", "region": "RegionOne", "url": "http://cinder-v3:8776/v3/p1"}
            ]},
            {"type": "network", "endpoints": [
                {"interface": "public", "region_id": "RegionOne", "url": "http://neutron:9696"}
            ]},
            {"type": "image", "endpoints": [
                {"interface": "public", "region": "RegionOne", "url": "http://glance:9292"}
            ]}
        ]))
        .expect("parse catalog")
    }

    #[rstest]
    #[case(&["compute"], "public", None, Some("http://nova:8774/v2.1"))]
    #[case(&["compute"], "public", Some("RegionTwo"), Some("http://nova-two:8774/v2.1"))]
    #[case(&["compute"], "internal", None, Some("http://nova.internal:8774/v2.1"))]
    #[case(&["compute"], "admin", None, None)]
    #[case(&["volumev3", "block-storage"], "public", None, Some("http://cinder-v3:8776/v3/p1"))]
    #[case(&["network"], "public", Some("RegionOne"), Some("http://neutron:9696"))]
    fn selects_endpoint(
        catalog: Vec<CatalogEntry>,
        #[case] types: &[&str],
        #[case] interface: &str,
        #[case] region: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(
            select_endpoint(&catalog, types, interface, region).as_deref(),
            expected
        );
    }

    #[rstest]
    fn resolves_every_service(catalog: Vec<CatalogEntry>) {
        let endpoints = resolve_endpoints(&catalog, "public", Some("RegionOne"))
            .expect("all services present");
        assert_eq!(endpoints.base(Service::Image), "http://glance:9292");
        assert_eq!(endpoints.base(Service::Volume), "http://cinder-v3:8776/v3/p1");
    }

    #[rstest]
    fn missing_service_is_an_auth_error(catalog: Vec<CatalogEntry>) {
        let err = resolve_endpoints(&catalog, "public", Some("RegionThree"))
            .expect_err("no endpoints in RegionThree");
        assert!(matches!(err, ProviderError::Auth { .. }));
    }

    #[test]
    fn auth_body_matches_keystone_shape() {
        let body = AuthBody {
            auth: Auth {
                identity: Identity {
                    methods: ["password"],
                    password: PasswordMethod {
                        user: User {
                            name: "admin",
                            domain: Domain { name: "default" },
                            password: "secret",
                        },
                    },
                },
                scope: Scope {
                    project: Project {
                        name: "admin",
                        domain: Domain { name: "default" },
                    },
                },
            },
        };
        let value = serde_json::to_value(&body).expect("serialise auth body");
        assert_eq!(value["auth"]["identity"]["methods"], json!(["password"]));
        assert_eq!(
            value["auth"]["identity"]["password"]["user"]["domain"]["name"],
            "default"
        );
        assert_eq!(value["auth"]["scope"]["project"]["name"], "admin");
    }
}
