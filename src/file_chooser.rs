// SPDX-License-Identifier: GPL-3.0-only

use std::{
    collections::HashMap, ffi::OsString, os::unix::ffi::OsStringExt, path::PathBuf, sync::Arc,
};

use zbus::{
    fdo,
    object_server::SignalEmitter,
    zvariant::{self, ObjectPath, OwnedObjectPath},
};

use crate::{
    config,
    dialog::{FileDialog, Filter},
    portal::Portal,
    registry::Interface,
    request::ChooserKind,
    response::BusResponseSink,
};

#[derive(zvariant::DeserializeDict, zvariant::Type, Clone, Debug, Default)]
#[zvariant(signature = "a{sv}")]
pub struct FileChooserOptions {
    cancel_label: Option<String>,
    accept_label: Option<String>,
    filters: Option<Vec<Filter>>,
    current_name: Option<String>,
    current_folder: Option<Vec<u8>>,
    current_file: Option<Vec<u8>>,
}

// Paths are passed as NUL-terminated byte strings
fn path_from_bytes(mut bytes: Vec<u8>) -> Option<PathBuf> {
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    (!bytes.is_empty()).then(|| PathBuf::from(OsString::from_vec(bytes)))
}

impl FileChooserOptions {
    pub fn into_dialog(
        self,
        kind: ChooserKind,
        title: &str,
        parent_window: &str,
        config: &config::file_chooser::FileChooser,
    ) -> FileDialog {
        let default_accept = if kind.is_save() {
            &config.save_label
        } else {
            &config.accept_label
        };
        FileDialog {
            kind,
            title: title.to_string(),
            parent_window: parent_window.to_string(),
            accept_label: self.accept_label.unwrap_or_else(|| default_accept.clone()),
            cancel_label: self
                .cancel_label
                .unwrap_or_else(|| config.cancel_label.clone()),
            filters: self.filters.unwrap_or_default(),
            current_name: self.current_name.filter(|name| !name.is_empty()),
            current_folder: self.current_folder.and_then(path_from_bytes),
            current_file: self.current_file.and_then(path_from_bytes),
            read_only: !kind.is_save() && config.open_read_only,
        }
    }
}

#[derive(zbus::DBusError, Debug)]
#[zbus(prefix = "org.freedesktop.Flatpak.Error")]
pub enum PortalError {
    #[zbus(error)]
    ZBus(zbus::Error),
    NotFound(String),
}

pub struct FileChooser {
    portal: Arc<Portal>,
}

impl FileChooser {
    pub fn new(portal: Arc<Portal>) -> Self {
        Self { portal }
    }

    #[allow(clippy::too_many_arguments)]
    async fn open(
        &self,
        connection: &zbus::Connection,
        sender: &str,
        app_id: &str,
        parent_window: &str,
        title: &str,
        options: FileChooserOptions,
        kind: ChooserKind,
    ) -> fdo::Result<OwnedObjectPath> {
        log::debug!("{kind:?} from {sender} for {app_id:?}: {options:?}");
        let dialog = options.into_dialog(
            kind,
            title,
            parent_window,
            &self.portal.config.file_chooser,
        );
        let sink = Arc::new(BusResponseSink::new(connection.clone()));
        let handle = self
            .portal
            .open_file_chooser(sink, sender, app_id, kind, dialog)
            .await
            .map_err(|err| {
                log::error!("failed to open file chooser: {err:#}");
                fdo::Error::Failed(format!("{err:#}"))
            })?;
        OwnedObjectPath::try_from(handle).map_err(|err| fdo::Error::Failed(err.to_string()))
    }
}

#[zbus::interface(name = "org.freedesktop.impl.portal.FileChooser")]
impl FileChooser {
    async fn open_file(
        &self,
        #[zbus(connection)] connection: &zbus::Connection,
        sender: &str,
        app_id: &str,
        parent_window: &str,
        title: &str,
        options: FileChooserOptions,
    ) -> fdo::Result<OwnedObjectPath> {
        self.open(
            connection,
            sender,
            app_id,
            parent_window,
            title,
            options,
            ChooserKind::OpenSingle,
        )
        .await
    }

    async fn open_files(
        &self,
        #[zbus(connection)] connection: &zbus::Connection,
        sender: &str,
        app_id: &str,
        parent_window: &str,
        title: &str,
        options: FileChooserOptions,
    ) -> fdo::Result<OwnedObjectPath> {
        self.open(
            connection,
            sender,
            app_id,
            parent_window,
            title,
            options,
            ChooserKind::OpenMultiple,
        )
        .await
    }

    async fn save_file(
        &self,
        #[zbus(connection)] connection: &zbus::Connection,
        sender: &str,
        app_id: &str,
        parent_window: &str,
        title: &str,
        options: FileChooserOptions,
    ) -> fdo::Result<OwnedObjectPath> {
        self.open(
            connection,
            sender,
            app_id,
            parent_window,
            title,
            options,
            ChooserKind::Save,
        )
        .await
    }

    async fn close(
        &self,
        _sender: &str,
        app_id: &str,
        handle: ObjectPath<'_>,
    ) -> Result<(), PortalError> {
        if self
            .portal
            .close(app_id, handle.as_str(), Interface::FileChooser)
            .await
        {
            Ok(())
        } else {
            Err(PortalError::NotFound("No such handle".to_string()))
        }
    }

    #[zbus(signal)]
    pub async fn open_file_response(
        emitter: &SignalEmitter<'_>,
        sender: &str,
        handle: &ObjectPath<'_>,
        response: u32,
        uri: &str,
        options: HashMap<&str, zvariant::Value<'_>>,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn save_file_response(
        emitter: &SignalEmitter<'_>,
        sender: &str,
        handle: &ObjectPath<'_>,
        response: u32,
        uri: &str,
        options: HashMap<&str, zvariant::Value<'_>>,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn open_files_response(
        emitter: &SignalEmitter<'_>,
        sender: &str,
        handle: &ObjectPath<'_>,
        response: u32,
        uris: &[String],
        options: HashMap<&str, zvariant::Value<'_>>,
    ) -> zbus::Result<()>;
}
