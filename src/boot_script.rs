//! Boot script resolution and telemetry collector generation.
//!
//! Boot scripts can be provided inline or via a file path. When neither is
//! given and a license key is configured, launches fall back to
//! [`collector_user_data`], which installs the NRDOT host collector.

use std::borrow::Cow;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use shell_escape::unix::escape;
use thiserror::Error;

use crate::config::TelemetryConfig;

/// Errors raised while resolving a boot script.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum BootScriptError {
    /// Raised when both inline and file sources are provided.
    #[error("boot script cannot be provided both inline and via file")]
    BothProvided,
    /// Raised when an inline payload is empty or only whitespace.
    #[error("boot script must not be empty")]
    InlineEmpty,
    /// Raised when a file path is empty or only whitespace.
    #[error("boot script file path must not be empty")]
    FilePathEmpty,
    /// Raised when a file resolves to empty or only whitespace.
    #[error("boot script file must not be empty")]
    FileEmpty,
    /// Raised when reading the file source fails.
    #[error("failed to read boot script file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Resolves a boot script from either an inline value or a file.
///
/// The sources are mutually exclusive. Emptiness checks ignore surrounding
/// whitespace, but the returned payload is kept verbatim.
///
/// # Errors
///
/// Returns [`BootScriptError`] when the inputs are invalid or the file cannot
/// be read.
pub fn resolve_boot_script(
    inline: Option<&str>,
    file: Option<&str>,
) -> Result<Option<String>, BootScriptError> {
    if inline.is_some() && file.is_some() {
        return Err(BootScriptError::BothProvided);
    }

    if let Some(payload) = inline {
        if payload.trim().is_empty() {
            return Err(BootScriptError::InlineEmpty);
        }
        return Ok(Some(payload.to_owned()));
    }

    let Some(path) = file else {
        return Ok(None);
    };
    if path.trim().is_empty() {
        return Err(BootScriptError::FilePathEmpty);
    }

    let expanded = expand_tilde(path);
    let content =
        read_to_string_ambient(&expanded).map_err(|message| BootScriptError::FileRead {
            path: expanded.clone(),
            message,
        })?;
    if content.trim().is_empty() {
        return Err(BootScriptError::FileEmpty);
    }
    Ok(Some(content))
}

/// Expands a leading `~/` to the current user's home directory.
///
/// # Examples
///
/// ```
/// # use stackfleet::boot_script::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/boot.sh"), format!("{home}/boot.sh"));
/// assert_eq!(expand_tilde("/srv/boot.sh"), "/srv/boot.sh");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}

fn quote(value: &str) -> Cow<'_, str> {
    escape(Cow::Borrowed(value))
}

/// Renders a shell boot script that installs and starts the NRDOT host
/// collector, tagging telemetry with `hostname`.
///
/// Interpolated values are shell-escaped and only reach the environment file
/// through variable expansion.
#[must_use]
pub fn collector_user_data(
    hostname: &str,
    license_key: &str,
    telemetry: &TelemetryConfig,
) -> String {
    let version = quote(&telemetry.collector_version);
    let key = quote(license_key);
    let endpoint = quote(&telemetry.otlp_endpoint);
    let host = quote(hostname);
    format!(
        r#"#!/bin/bash
export NRDOT_VERSION={version}
export NEW_RELIC_LICENSE_KEY={key}
OTLP_ENDPOINT={endpoint}
HOST_ID={host}

apt-get update || yum update -y
apt-get install -y wget ca-certificates || yum install -y wget ca-certificates

ARCH=$(uname -m)
case $ARCH in
    x86_64) ARCH="amd64" ;;
    aarch64) ARCH="arm64" ;;
esac

RELEASES="https://github.com/newrelic/nrdot-collector-releases/releases/download/v${{NRDOT_VERSION}}"
if command -v apt-get >/dev/null; then
    PKG="nrdot-collector-host_${{NRDOT_VERSION}}_linux_${{ARCH}}.deb"
    wget -q -O "/tmp/${{PKG}}" "${{RELEASES}}/${{PKG}}"
    dpkg -i "/tmp/${{PKG}}" || apt-get install -f -y
else
    PKG="nrdot-collector-host_${{NRDOT_VERSION}}_linux_${{ARCH}}.rpm"
    wget -q -O "/tmp/${{PKG}}" "${{RELEASES}}/${{PKG}}"
    rpm -i "/tmp/${{PKG}}" || yum install -y "/tmp/${{PKG}}"
fi

mkdir -p /etc/nrdot-collector-host
cat > /etc/nrdot-collector-host/nrdot-collector-host.env << EOF
NEW_RELIC_LICENSE_KEY=${{NEW_RELIC_LICENSE_KEY}}
OTEL_EXPORTER_OTLP_ENDPOINT=${{OTLP_ENDPOINT}}
OTEL_RESOURCE_ATTRIBUTES="service.name=openstack-vm,environment=production,host.id=${{HOST_ID}},cloud.provider=openstack"
NEW_RELIC_MEMORY_LIMIT_MIB=100
EOF

sed -i '/\[Service\]/a EnvironmentFile=/etc/nrdot-collector-host/nrdot-collector-host.env' \
    /lib/systemd/system/nrdot-collector-host.service

systemctl daemon-reload
systemctl enable nrdot-collector-host
systemctl start nrdot-collector-host

echo "NRDOT collector installed and started on ${{HOST_ID}}"
"#
    )
}
