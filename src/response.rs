// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;

use futures::future::BoxFuture;
use zbus::{
    names::BusName,
    object_server::SignalEmitter,
    zvariant::{self, ObjectPath},
};

use crate::{
    DBUS_PATH, PORTAL_FRONTEND_NAME,
    file_chooser::FileChooser,
    request::{FileRequest, ResponseCode},
};

/// The signal answering a file chooser request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    OpenFile {
        sender: String,
        handle: String,
        code: ResponseCode,
        uri: String,
    },
    SaveFile {
        sender: String,
        handle: String,
        code: ResponseCode,
        uri: String,
    },
    OpenFiles {
        sender: String,
        handle: String,
        code: ResponseCode,
        uris: Vec<String>,
    },
}

impl Response {
    /// Single-URI requests answer with the first converted URI, or an empty string.
    pub fn build(handle: &str, request: &FileRequest) -> Self {
        let sender = request.sender().to_string();
        let handle = handle.to_string();
        let code = request.response_code();
        let first = || request.uris().first().cloned().unwrap_or_default();
        let kind = request.kind();
        if kind.is_multiple() {
            Self::OpenFiles {
                sender,
                handle,
                code,
                uris: request.uris().to_vec(),
            }
        } else if kind.is_save() {
            Self::SaveFile {
                sender,
                handle,
                code,
                uri: first(),
            }
        } else {
            Self::OpenFile {
                sender,
                handle,
                code,
                uri: first(),
            }
        }
    }

    pub fn handle(&self) -> &str {
        match self {
            Self::OpenFile { handle, .. }
            | Self::SaveFile { handle, .. }
            | Self::OpenFiles { handle, .. } => handle,
        }
    }
}

/// Where finished requests are reported.
pub trait ResponseSink: Send + Sync {
    fn emit(&self, response: Response) -> BoxFuture<'_, zbus::Result<()>>;
}

/// Emits response signals on the connection the requests came in on.
pub struct BusResponseSink {
    connection: zbus::Connection,
}

impl BusResponseSink {
    pub fn new(connection: zbus::Connection) -> Self {
        Self { connection }
    }
}

impl ResponseSink for BusResponseSink {
    fn emit(&self, response: Response) -> BoxFuture<'_, zbus::Result<()>> {
        Box::pin(async move {
            let destination = BusName::try_from(PORTAL_FRONTEND_NAME)?;
            let emitter = SignalEmitter::new(&self.connection, DBUS_PATH)?
                .set_destination(destination);
            match response {
                Response::OpenFile {
                    sender,
                    handle,
                    code,
                    uri,
                } => {
                    let handle = ObjectPath::try_from(handle.as_str())?;
                    FileChooser::open_file_response(
                        &emitter,
                        &sender,
                        &handle,
                        code.into(),
                        &uri,
                        HashMap::<&str, zvariant::Value<'_>>::new(),
                    )
                    .await
                }
                Response::SaveFile {
                    sender,
                    handle,
                    code,
                    uri,
                } => {
                    let handle = ObjectPath::try_from(handle.as_str())?;
                    FileChooser::save_file_response(
                        &emitter,
                        &sender,
                        &handle,
                        code.into(),
                        &uri,
                        HashMap::<&str, zvariant::Value<'_>>::new(),
                    )
                    .await
                }
                Response::OpenFiles {
                    sender,
                    handle,
                    code,
                    uris,
                } => {
                    let handle = ObjectPath::try_from(handle.as_str())?;
                    FileChooser::open_files_response(
                        &emitter,
                        &sender,
                        &handle,
                        code.into(),
                        &uris,
                        HashMap::<&str, zvariant::Value<'_>>::new(),
                    )
                    .await
                }
            }
        })
    }
}
