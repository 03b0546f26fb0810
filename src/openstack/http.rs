//! Authenticated JSON requests against catalog endpoints.

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::provider::ProviderError;

use super::wire::{Paged, error_message, next_marker};
use super::{COMPUTE_MICROVERSION, HTTP_CLIENT, OpenStackProvider, Service};

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const REQUEST_ID_HEADER: &str = "X-OpenStack-Request-ID";

struct ApiResponse {
    status: u16,
    body: Vec<u8>,
}

impl ApiResponse {
    const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    fn into_error(self) -> ProviderError {
        ProviderError::Backend {
            status: Some(self.status),
            message: error_message(&self.body),
        }
    }

    fn parse<T: DeserializeOwned>(&self) -> Result<T, ProviderError> {
        serde_json::from_slice(&self.body).map_err(|err| ProviderError::Backend {
            status: Some(self.status),
            message: format!("unexpected response body: {err}"),
        })
    }
}

fn to_body<B: Serialize>(body: &B) -> Result<Value, ProviderError> {
    serde_json::to_value(body).map_err(|err| ProviderError::Validation {
        message: err.to_string(),
    })
}

impl OpenStackProvider {
    async fn execute(
        &self,
        service: Service,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<ApiResponse, ProviderError> {
        let mut session = self.session().await?;
        let mut retried = false;
        loop {
            let url = format!("{}{path}", session.endpoints.base(service));
            let request_id = format!("req-{}", Uuid::new_v4());
            debug!(%method, %url, request_id = %request_id, "calling {}", service.as_str());

            let mut request = HTTP_CLIENT
                .request(method.clone(), &url)
                .header(AUTH_TOKEN_HEADER, &session.token)
                .header(REQUEST_ID_HEADER, &request_id);
            if service == Service::Compute {
                request = request
                    .header(
                        "OpenStack-API-Version",
                        format!("compute {COMPUTE_MICROVERSION}"),
                    )
                    .header("X-OpenStack-Nova-API-Version", COMPUTE_MICROVERSION);
            }
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(json) = body {
                request = request.json(json);
            }

            let response = request
                .send()
                .await
                .map_err(|err| ProviderError::backend(err.to_string()))?;
            let status = response.status().as_u16();
            let bytes = response
                .bytes()
                .await
                .map_err(|err| ProviderError::backend(err.to_string()))?;

            if status == 401 && !retried {
                warn!(service = service.as_str(), "token rejected, re-authenticating");
                session = self.refresh_session().await?;
                retried = true;
                continue;
            }
            return Ok(ApiResponse {
                status,
                body: bytes.to_vec(),
            });
        }
    }

    pub(super) async fn get_json<T: DeserializeOwned>(
        &self,
        service: Service,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let response = self
            .execute(service, Method::GET, path, query, None)
            .await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        response.parse()
    }

    /// Reads every page of a list endpoint, following the `next` link marker
    /// until a page comes back empty or without one.
    pub(super) async fn get_all<E: Paged>(
        &self,
        service: Service,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<E::Item>, ProviderError> {
        let mut items = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut page_query = query.to_vec();
            if let Some(current) = marker.as_deref() {
                page_query.push(("marker", current));
            }
            let page: E = self.get_json(service, path, &page_query).await?;
            let (batch, links) = page.into_page();
            let last_page = batch.is_empty();
            items.extend(batch);
            match next_marker(&links) {
                Some(next) if !last_page && marker.as_deref() != Some(next.as_str()) => {
                    debug!(path, marker = %next, "following next page");
                    marker = Some(next);
                }
                _ => return Ok(items),
            }
        }
    }

    /// Like [`Self::get_json`], but maps 404 to `None`.
    pub(super) async fn get_optional<T: DeserializeOwned>(
        &self,
        service: Service,
        path: &str,
    ) -> Result<Option<T>, ProviderError> {
        let response = self.execute(service, Method::GET, path, &[], None).await?;
        if response.status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(response.into_error());
        }
        response.parse().map(Some)
    }

    pub(super) async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        service: Service,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let json = to_body(body)?;
        let response = self
            .execute(service, method, path, &[], Some(&json))
            .await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        response.parse()
    }

    /// Sends a request whose response body is ignored, such as server
    /// actions and router interface updates.
    pub(super) async fn send_action<B: Serialize>(
        &self,
        service: Service,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<(), ProviderError> {
        let json = to_body(body)?;
        let response = self
            .execute(service, method, path, &[], Some(&json))
            .await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        Ok(())
    }

    /// Deletes a resource. A 404 counts as already deleted.
    pub(super) async fn delete(&self, service: Service, path: &str) -> Result<(), ProviderError> {
        let response = self
            .execute(service, Method::DELETE, path, &[], None)
            .await?;
        if response.status == 404 {
            debug!(path, "resource already gone");
            return Ok(());
        }
        if !response.is_success() {
            return Err(response.into_error());
        }
        Ok(())
    }
}

/// Reports whether `value` looks like a resource identifier rather than a
/// name, so lookups can try a direct fetch first.
pub(super) fn looks_like_id(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("3f1c2a7e-8b0d-4c55-9f0e-2d6c1b7a9e10", true)]
    #[case("3f1c2a7e8b0d4c559f0e2d6c1b7a9e10", true)]
    #[case("web-1", false)]
    #[case("m1.small", false)]
    fn recognises_identifiers(#[case] value: &str, #[case] expected: bool) {
        assert_eq!(looks_like_id(value), expected);
    }

    #[test]
    fn backend_error_keeps_status_and_message() {
        let response = ApiResponse {
            status: 409,
            body: br#"{"conflictingRequest": {"message": "Cannot 'resize' instance"}}"#.to_vec(),
        };
        assert!(!response.is_success());
        assert_eq!(
            response.into_error(),
            ProviderError::Backend {
                status: Some(409),
                message: String::from("Cannot 'resize' instance"),
            }
        );
    }
}
