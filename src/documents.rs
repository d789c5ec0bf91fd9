// SPDX-License-Identifier: GPL-3.0-only

//! Exporting chosen files to sandboxed applications through the document portal.

use std::{
    ffi::OsString,
    os::{
        fd::{AsFd, OwnedFd},
        unix::ffi::{OsStrExt, OsStringExt},
    },
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use futures::future::BoxFuture;
use rustix::fs::{Mode, OFlags};
use zbus::zvariant;

#[zbus::proxy(
    interface = "org.freedesktop.portal.Documents",
    default_service = "org.freedesktop.portal.Documents",
    default_path = "/org/freedesktop/portal/documents"
)]
pub trait Documents {
    fn get_mount_point(&self) -> zbus::Result<Vec<u8>>;

    fn add(
        &self,
        o_path_fd: zvariant::Fd<'_>,
        reuse_existing: bool,
        persistent: bool,
    ) -> zbus::Result<String>;

    fn add_named(
        &self,
        o_path_parent_fd: zvariant::Fd<'_>,
        filename: &[u8],
        reuse_existing: bool,
        persistent: bool,
    ) -> zbus::Result<String>;

    fn grant_permissions(
        &self,
        doc_id: &str,
        app_id: &str,
        permissions: &[&str],
    ) -> zbus::Result<()>;
}

/// The mount point comes back as a NUL-terminated byte string.
pub fn mount_point_from_bytes(mut bytes: Vec<u8>) -> Option<PathBuf> {
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    if bytes.is_empty() {
        return None;
    }
    Some(PathBuf::from(OsString::from_vec(bytes)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    GrantPermissions,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::GrantPermissions => "grant-permissions",
        }
    }

    pub fn for_write_access(allow_write: bool) -> Vec<Self> {
        let mut permissions = vec![Self::Read];
        if allow_write {
            permissions.push(Self::Write);
        }
        permissions.push(Self::GrantPermissions);
        permissions
    }
}

/// The calls made to the document portal, as a seam for tests.
pub trait DocumentBroker: Send + Sync {
    fn add<'a>(&'a self, fd: OwnedFd) -> BoxFuture<'a, zbus::Result<String>>;

    fn add_named<'a>(
        &'a self,
        parent_fd: OwnedFd,
        filename: &'a [u8],
    ) -> BoxFuture<'a, zbus::Result<String>>;

    fn grant_permissions<'a>(
        &'a self,
        doc_id: &'a str,
        app_id: &'a str,
        permissions: &'a [Permission],
    ) -> BoxFuture<'a, zbus::Result<()>>;
}

impl DocumentBroker for DocumentsProxy<'static> {
    fn add<'a>(&'a self, fd: OwnedFd) -> BoxFuture<'a, zbus::Result<String>> {
        Box::pin(async move { DocumentsProxy::add(self, fd.as_fd().into(), true, true).await })
    }

    fn add_named<'a>(
        &'a self,
        parent_fd: OwnedFd,
        filename: &'a [u8],
    ) -> BoxFuture<'a, zbus::Result<String>> {
        Box::pin(async move {
            // Sent as a bytestring, which is expected to carry its terminator
            let mut filename = filename.to_vec();
            filename.push(0);
            DocumentsProxy::add_named(self, parent_fd.as_fd().into(), &filename, true, true).await
        })
    }

    fn grant_permissions<'a>(
        &'a self,
        doc_id: &'a str,
        app_id: &'a str,
        permissions: &'a [Permission],
    ) -> BoxFuture<'a, zbus::Result<()>> {
        Box::pin(async move {
            let permissions: Vec<&str> = permissions.iter().map(|p| p.as_str()).collect();
            DocumentsProxy::grant_permissions(self, doc_id, app_id, &permissions).await
        })
    }
}

/// Who a URI is converted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertTarget {
    /// Empty for unconfined callers
    pub app_id: String,
    pub save: bool,
    pub allow_write: bool,
}

/// Turn a URI chosen by the user into one the target application can open from inside its
/// sandbox. Unconfined callers get the URI back untouched.
pub async fn convert(
    broker: &dyn DocumentBroker,
    mount_point: Option<&Path>,
    target: &ConvertTarget,
    uri: &str,
) -> anyhow::Result<String> {
    if target.app_id.is_empty() {
        return Ok(uri.to_string());
    }

    let path = url::Url::parse(uri)
        .with_context(|| format!("invalid URI {uri}"))?
        .to_file_path()
        .map_err(|()| anyhow!("{uri} is not a local file"))?;
    let basename = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?
        .to_owned();
    let mount_point = mount_point.context("document portal mount point is unknown")?;

    // A file being saved may not exist yet, so its directory is exported instead
    let open_path = if target.save {
        path.parent()
            .with_context(|| format!("{} has no parent", path.display()))?
    } else {
        path.as_path()
    };
    let fd = rustix::fs::open(open_path, OFlags::PATH | OFlags::CLOEXEC, Mode::empty())
        .with_context(|| format!("failed to open {}", open_path.display()))?;

    let doc_id = if target.save {
        broker.add_named(fd, basename.as_bytes()).await
    } else {
        broker.add(fd).await
    }
    .context("failed to add document")?;

    let permissions = Permission::for_write_access(target.allow_write);
    broker
        .grant_permissions(&doc_id, &target.app_id, &permissions)
        .await
        .with_context(|| format!("failed to grant permissions on {doc_id}"))?;

    let doc_path = mount_point.join(&doc_id).join(&basename);
    let url = url::Url::from_file_path(&doc_path)
        .map_err(|()| anyhow!("invalid document path {}", doc_path.display()))?;
    Ok(url.into())
}
