//! Declarative instance descriptions submitted to launches.

use thiserror::Error;

/// Image used when a spec does not name one.
pub const DEFAULT_IMAGE: &str = "cirros-0.5.2-x86_64-disk";

/// Flavor used when a spec does not name one.
pub const DEFAULT_FLAVOR: &str = "m1.small";

/// Network reference carried by an [`InstanceSpec`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkRef {
    /// Resolved by name at launch; unresolved names are skipped.
    Name(String),
    /// Used verbatim.
    Id(String),
}

/// Everything needed to launch one server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpec {
    /// Server name.
    pub name: String,
    /// Image name or identifier.
    pub image: String,
    /// Flavor name or identifier.
    pub flavor: String,
    /// Networks to attach.
    pub networks: Vec<NetworkRef>,
    /// Security group name.
    pub security_group: Option<String>,
    /// Key pair name.
    pub key_name: Option<String>,
    /// Boot script supplied by the caller.
    pub user_data: Option<String>,
    /// Whether the telemetry collector may be injected when no boot script
    /// is supplied.
    pub telemetry: bool,
}

/// Errors raised while building an [`InstanceSpec`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SpecError {
    /// Raised when a required field is empty after trimming.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

impl InstanceSpec {
    /// Starts a builder seeded with the default image and flavor.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> InstanceSpecBuilder {
        InstanceSpecBuilder::new(name)
    }

    /// Validates the spec.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::Validation`] naming the first empty field.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.is_empty() {
            return Err(SpecError::Validation(String::from("name")));
        }
        if self.image.is_empty() {
            return Err(SpecError::Validation(String::from("image")));
        }
        if self.flavor.is_empty() {
            return Err(SpecError::Validation(String::from("flavor")));
        }
        if self.networks.iter().any(|network| match network {
            NetworkRef::Name(value) | NetworkRef::Id(value) => value.is_empty(),
        }) {
            return Err(SpecError::Validation(String::from("network")));
        }
        if self
            .user_data
            .as_ref()
            .is_some_and(|script| script.trim().is_empty())
        {
            return Err(SpecError::Validation(String::from("user_data")));
        }
        Ok(())
    }
}

/// Builder for [`InstanceSpec`] that trims inputs and validates on build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpecBuilder {
    name: String,
    image: String,
    flavor: String,
    networks: Vec<NetworkRef>,
    security_group: Option<String>,
    key_name: Option<String>,
    user_data: Option<String>,
    telemetry: bool,
}

impl InstanceSpecBuilder {
    /// Creates a builder for a server called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: String::from(DEFAULT_IMAGE),
            flavor: String::from(DEFAULT_FLAVOR),
            networks: Vec::new(),
            security_group: None,
            key_name: None,
            user_data: None,
            telemetry: true,
        }
    }

    /// Sets the image.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.image = value.into();
        self
    }

    /// Sets the flavor.
    #[must_use]
    pub fn flavor(mut self, value: impl Into<String>) -> Self {
        self.flavor = value.into();
        self
    }

    /// Adds a network resolved by name at launch.
    #[must_use]
    pub fn network(mut self, name: impl Into<String>) -> Self {
        self.networks.push(NetworkRef::Name(name.into()));
        self
    }

    /// Adds a network by identifier.
    #[must_use]
    pub fn network_id(mut self, id: impl Into<String>) -> Self {
        self.networks.push(NetworkRef::Id(id.into()));
        self
    }

    /// Sets the optional security group.
    #[must_use]
    pub fn security_group(mut self, value: Option<String>) -> Self {
        self.security_group = value;
        self
    }

    /// Sets the optional key pair.
    #[must_use]
    pub fn key_name(mut self, value: Option<String>) -> Self {
        self.key_name = value;
        self
    }

    /// Sets the optional boot script. The script is kept verbatim.
    #[must_use]
    pub fn user_data(mut self, value: Option<String>) -> Self {
        self.user_data = value;
        self
    }

    /// Enables or disables telemetry collector injection.
    #[must_use]
    pub const fn telemetry(mut self, enabled: bool) -> Self {
        self.telemetry = enabled;
        self
    }

    /// Builds and validates the [`InstanceSpec`].
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::Validation`] when any required field is empty.
    pub fn build(self) -> Result<InstanceSpec, SpecError> {
        let spec = InstanceSpec {
            name: self.name.trim().to_owned(),
            image: self.image.trim().to_owned(),
            flavor: self.flavor.trim().to_owned(),
            networks: self
                .networks
                .into_iter()
                .map(|network| match network {
                    NetworkRef::Name(value) => NetworkRef::Name(value.trim().to_owned()),
                    NetworkRef::Id(value) => NetworkRef::Id(value.trim().to_owned()),
                })
                .collect(),
            security_group: trimmed(self.security_group),
            key_name: trimmed(self.key_name),
            user_data: self.user_data,
            telemetry: self.telemetry,
        };
        spec.validate()?;
        Ok(spec)
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_owned())
        .filter(|raw| !raw.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn builder_applies_defaults() {
        let spec = InstanceSpec::builder("web-1")
            .build()
            .expect("defaults should be valid");
        assert_eq!(spec.image, DEFAULT_IMAGE);
        assert_eq!(spec.flavor, DEFAULT_FLAVOR);
        assert!(spec.networks.is_empty());
        assert!(spec.telemetry);
    }

    #[rstest]
    #[case::name(InstanceSpec::builder("  "), "name")]
    #[case::image(InstanceSpec::builder("web-1").image(" "), "image")]
    #[case::flavor(InstanceSpec::builder("web-1").flavor(""), "flavor")]
    #[case::network(InstanceSpec::builder("web-1").network(" "), "network")]
    #[case::user_data(
        InstanceSpec::builder("web-1").user_data(Some(String::from("\n  "))),
        "user_data"
    )]
    fn builder_rejects_blank_fields(#[case] builder: InstanceSpecBuilder, #[case] field: &str) {
        let err = builder.build().expect_err("blank field should fail");
        assert_eq!(err, SpecError::Validation(field.to_owned()));
    }

    #[test]
    fn builder_trims_and_drops_blank_optionals() {
        let spec = InstanceSpec::builder(" web-1 ")
            .network(" app-net ")
            .network_id("net-7")
            .security_group(Some(String::from("  ")))
            .key_name(Some(String::from(" ops ")))
            .build()
            .expect("spec should build");
        assert_eq!(spec.name, "web-1");
        assert_eq!(
            spec.networks,
            vec![
                NetworkRef::Name(String::from("app-net")),
                NetworkRef::Id(String::from("net-7")),
            ]
        );
        assert_eq!(spec.security_group, None);
        assert_eq!(spec.key_name.as_deref(), Some("ops"));
    }
}
