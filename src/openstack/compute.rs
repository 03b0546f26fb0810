//! Nova and Glance calls behind [`ComputeApi`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::debug;

use crate::provider::{
    ComputeApi, Flavor, Image, ProviderError, ProviderFuture, ResourceKind, Server, ServerCreate,
    VolumeAttachment,
};

use super::http::looks_like_id;
use super::wire::{
    AttachmentEnvelope, CreateImageResponse, CreateServer, CreateServerBody, CreatedServerEnvelope,
    FlavorsEnvelope, ImagesEnvelope, NamedRef, ServerEnvelope, ServersEnvelope, WireImage,
};
use super::{OpenStackProvider, Service};

fn networks_field(request: &ServerCreate) -> Value {
    if request.networks.is_empty() {
        return Value::String(String::from("auto"));
    }
    Value::Array(
        request
            .networks
            .iter()
            .map(|network| json!({ "uuid": network.network_id }))
            .collect(),
    )
}

impl OpenStackProvider {
    async fn server_by_id(&self, id: &str) -> Result<Option<Server>, ProviderError> {
        let envelope: Option<ServerEnvelope> = self
            .get_optional(Service::Compute, &format!("/servers/{id}"))
            .await?;
        Ok(envelope.map(|found| Server::from(found.server)))
    }

    async fn server_by_name(&self, name: &str) -> Result<Option<Server>, ProviderError> {
        if looks_like_id(name)
            && let Some(server) = self.server_by_id(name).await?
        {
            return Ok(Some(server));
        }
        // Nova treats the name filter as a regular expression, so the
        // match is narrowed to exact names here.
        let envelope: ServersEnvelope = self
            .get_json(Service::Compute, "/servers/detail", &[("name", name)])
            .await?;
        Ok(envelope
            .servers
            .into_iter()
            .map(Server::from)
            .find(|server| server.name == name))
    }

    async fn boot_server(&self, request: &ServerCreate) -> Result<Server, ProviderError> {
        let body = CreateServerBody {
            server: CreateServer {
                name: &request.name,
                image_ref: &request.image_id,
                flavor_ref: &request.flavor_id,
                networks: networks_field(request),
                security_groups: request
                    .security_groups
                    .iter()
                    .map(|name| NamedRef { name })
                    .collect(),
                key_name: request.key_name.as_deref(),
                user_data: request
                    .user_data
                    .as_deref()
                    .map(|script| STANDARD.encode(script)),
            },
        };
        let created: CreatedServerEnvelope = self
            .send_json(Service::Compute, Method::POST, "/servers", &body)
            .await?;
        debug!(server = %request.name, id = %created.server.id, "server accepted");
        self.server_by_id(&created.server.id)
            .await?
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Server, created.server.id))
    }

    async fn flavor_by_key(&self, key: &str) -> Result<Option<Flavor>, ProviderError> {
        let envelope: FlavorsEnvelope = self
            .get_json(Service::Compute, "/flavors", &[])
            .await?;
        Ok(envelope
            .flavors
            .into_iter()
            .map(Flavor::from)
            .find(|flavor| flavor.name == key || flavor.id == key))
    }

    async fn image_by_key(&self, key: &str) -> Result<Option<Image>, ProviderError> {
        if looks_like_id(key) {
            let found: Option<WireImage> = self
                .get_optional(Service::Image, &format!("/v2/images/{key}"))
                .await?;
            if let Some(image) = found {
                return Ok(Some(Image::from(image)));
            }
        }
        let envelope: ImagesEnvelope = self
            .get_json(Service::Image, "/v2/images", &[("name", key)])
            .await?;
        Ok(envelope.images.into_iter().map(Image::from).next())
    }

    async fn server_action(&self, id: &str, action: Value) -> Result<(), ProviderError> {
        self.send_action(
            Service::Compute,
            Method::POST,
            &format!("/servers/{id}/action"),
            &action,
        )
        .await
    }
}

impl ComputeApi for OpenStackProvider {
    fn find_server<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Server>> {
        Box::pin(self.server_by_name(name))
    }

    fn get_server<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, Option<Server>> {
        Box::pin(self.server_by_id(id))
    }

    fn list_servers(&self) -> ProviderFuture<'_, Vec<Server>> {
        Box::pin(async move {
            let servers = self
                .get_all::<ServersEnvelope>(Service::Compute, "/servers/detail", &[])
                .await?;
            Ok(servers.into_iter().map(Server::from).collect())
        })
    }

    fn create_server<'a>(&'a self, request: &'a ServerCreate) -> ProviderFuture<'a, Server> {
        Box::pin(self.boot_server(request))
    }

    fn delete_server<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.delete(Service::Compute, &format!("/servers/{id}")).await })
    }

    fn resize_server<'a>(&'a self, id: &'a str, flavor_id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.server_action(id, json!({ "resize": { "flavorRef": flavor_id } })))
    }

    fn confirm_resize<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.server_action(id, json!({ "confirmResize": null })))
    }

    fn create_server_image<'a>(
        &'a self,
        id: &'a str,
        image_name: &'a str,
    ) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            let response: CreateImageResponse = self
                .send_json(
                    Service::Compute,
                    Method::POST,
                    &format!("/servers/{id}/action"),
                    &json!({ "createImage": { "name": image_name } }),
                )
                .await?;
            Ok(response.image_id)
        })
    }

    fn attach_volume<'a>(
        &'a self,
        server_id: &'a str,
        volume_id: &'a str,
    ) -> ProviderFuture<'a, VolumeAttachment> {
        Box::pin(async move {
            let envelope: AttachmentEnvelope = self
                .send_json(
                    Service::Compute,
                    Method::POST,
                    &format!("/servers/{server_id}/os-volume_attachments"),
                    &json!({ "volumeAttachment": { "volumeId": volume_id } }),
                )
                .await?;
            Ok(VolumeAttachment::from(envelope.attachment))
        })
    }

    fn find_flavor<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Flavor>> {
        Box::pin(self.flavor_by_key(name))
    }

    fn find_image<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Image>> {
        Box::pin(self.image_by_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ServerNetwork;

    fn request(networks: Vec<ServerNetwork>) -> ServerCreate {
        ServerCreate {
            name: String::from("web-1"),
            image_id: String::from("img-1"),
            flavor_id: String::from("flv-1"),
            networks,
            security_groups: Vec::new(),
            key_name: None,
            user_data: None,
        }
    }

    #[test]
    fn empty_network_list_requests_auto_allocation() {
        assert_eq!(networks_field(&request(Vec::new())), json!("auto"));
    }

    #[test]
    fn networks_are_passed_by_uuid() {
        let networks = vec![
            ServerNetwork {
                network_id: String::from("net-a"),
            },
            ServerNetwork {
                network_id: String::from("net-b"),
            },
        ];
        assert_eq!(
            networks_field(&request(networks)),
            json!([{ "uuid": "net-a" }, { "uuid": "net-b" }])
        );
    }
}
