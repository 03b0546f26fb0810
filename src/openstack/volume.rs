//! Cinder calls behind [`VolumeApi`].

use reqwest::Method;
use serde_json::json;

use crate::provider::{ProviderError, ProviderFuture, Volume, VolumeApi, VolumeCreate};

use super::http::looks_like_id;
use super::wire::{VolumeEnvelope, VolumesEnvelope};
use super::{OpenStackProvider, Service};

impl OpenStackProvider {
    async fn volume_by_id(&self, id: &str) -> Result<Option<Volume>, ProviderError> {
        let envelope: Option<VolumeEnvelope> = self
            .get_optional(Service::Volume, &format!("/volumes/{id}"))
            .await?;
        Ok(envelope.map(|found| Volume::from(found.volume)))
    }

    async fn volume_by_key(&self, key: &str) -> Result<Option<Volume>, ProviderError> {
        if looks_like_id(key)
            && let Some(volume) = self.volume_by_id(key).await?
        {
            return Ok(Some(volume));
        }
        let envelope: VolumesEnvelope = self
            .get_json(Service::Volume, "/volumes/detail", &[("name", key)])
            .await?;
        Ok(envelope
            .volumes
            .into_iter()
            .map(Volume::from)
            .find(|volume| volume.name.as_deref() == Some(key)))
    }
}

impl VolumeApi for OpenStackProvider {
    fn create_volume<'a>(&'a self, request: &'a VolumeCreate) -> ProviderFuture<'a, Volume> {
        Box::pin(async move {
            let body = json!({
                "volume": {
                    "name": request.name,
                    "size": request.size_gib,
                    "description": request.description,
                }
            });
            let envelope: VolumeEnvelope = self
                .send_json(Service::Volume, Method::POST, "/volumes", &body)
                .await?;
            Ok(Volume::from(envelope.volume))
        })
    }

    fn get_volume<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, Option<Volume>> {
        Box::pin(self.volume_by_id(id))
    }

    fn find_volume<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Volume>> {
        Box::pin(self.volume_by_key(name))
    }

    fn list_volumes(&self) -> ProviderFuture<'_, Vec<Volume>> {
        Box::pin(async move {
            let volumes = self
                .get_all::<VolumesEnvelope>(Service::Volume, "/volumes/detail", &[])
                .await?;
            Ok(volumes.into_iter().map(Volume::from).collect())
        })
    }

    fn delete_volume<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.delete(Service::Volume, &format!("/volumes/{id}")).await })
    }
}
