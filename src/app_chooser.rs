// SPDX-License-Identifier: GPL-3.0-only

use std::{borrow::Cow, collections::HashMap, sync::Arc};

use freedesktop_desktop_entry::{DesktopEntry, get_languages_from_env};
use tokio::sync::oneshot;
use zbus::{fdo, zvariant};

use crate::{
    apps,
    dialog::{AppPrompt, DialogGuard},
    portal::Portal,
    registry::Pending,
    request,
};

/// An application chooser waiting for the user.
#[derive(Debug)]
pub struct AppRequest {
    app_id: String,
    sender: String,
    uri: String,
    _dialog: DialogGuard,
    _closed: oneshot::Sender<()>,
}

impl AppRequest {
    pub fn new(
        app_id: &str,
        sender: &str,
        uri: &str,
        dialog: DialogGuard,
        closed: oneshot::Sender<()>,
    ) -> Self {
        Self {
            app_id: app_id.to_string(),
            sender: sender.to_string(),
            uri: uri.to_string(),
            _dialog: dialog,
            _closed: closed,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

pub struct AppChooser {
    portal: Arc<Portal>,
}

impl AppChooser {
    pub fn new(portal: Arc<Portal>) -> Self {
        Self { portal }
    }
}

#[zbus::interface(name = "org.freedesktop.impl.portal.AppChooser")]
impl AppChooser {
    /// Ask the user which application should open `uri`. Returns as soon as the chooser is
    /// shown; the chosen application is launched later.
    #[zbus(name = "OpenURI")]
    async fn open_uri(
        &self,
        sender: &str,
        app_id: &str,
        parent_window: &str,
        uri: &str,
        _options: HashMap<&str, zvariant::Value<'_>>,
    ) -> fdo::Result<()> {
        let locales = get_languages_from_env();
        let entries = apps::load_desktop_entries(&locales).await;
        let content_type = apps::content_type_for_uri(uri);
        let default = apps::default_application(&content_type).await;
        let choices = apps::handlers_for(&entries, &content_type, default.as_deref(), &locales);
        log::debug!(
            "{sender} ({app_id:?}) opening {uri} as {content_type}, {} candidates",
            choices.len()
        );

        let app_name = (!app_id.is_empty()).then(|| {
            apps::get_desktop_entry(&entries, app_id)
                .and_then(|entry| entry.name(&locales).map(Cow::into_owned))
                .unwrap_or_else(|| app_id.to_string())
        });
        let prompt = AppPrompt {
            title: self.portal.config.app_chooser.title.clone(),
            parent_window: parent_window.to_string(),
            text: apps::prompt_text(app_name.as_deref(), uri),
            choices,
        };

        let dialog = self
            .portal
            .frontend
            .choose_application(prompt)
            .map_err(|err| {
                log::error!("failed to show application chooser: {err:#}");
                fdo::Error::Failed(format!("{err:#}"))
            })?;
        let (closed_tx, closed_rx) = oneshot::channel();
        let request = AppRequest::new(app_id, sender, uri, dialog.guard, closed_tx);
        let handle = self
            .portal
            .registry
            .lock()
            .await
            .register(Pending::AppChooser(request));

        tokio::spawn(choose(
            self.portal.clone(),
            handle,
            dialog.decision,
            closed_rx,
            entries,
            locales,
        ));
        Ok(())
    }
}

async fn choose(
    portal: Arc<Portal>,
    handle: String,
    decision: oneshot::Receiver<Option<String>>,
    mut closed: oneshot::Receiver<()>,
    entries: Vec<DesktopEntry>,
    locales: Vec<String>,
) {
    let choice = tokio::select! {
        biased;
        _ = &mut closed => return,
        choice = decision => choice.ok().flatten(),
    };

    let request = {
        let mut registry = portal.registry.lock().await;
        if !request::still_open(&mut closed) {
            return;
        }
        let Some(Pending::AppChooser(request)) = registry.unregister(&handle) else {
            return;
        };
        request
    };
    let Some(id) = choice else {
        log::debug!("no application chosen for {}", request.uri());
        return;
    };
    let Some(entry) = apps::get_desktop_entry(&entries, &id) else {
        log::warn!("chosen application {id} has no desktop entry");
        return;
    };
    if let Err(err) = apps::launch(entry, request.uri(), &locales) {
        log::error!("failed to launch {id} for {}: {err:#}", request.sender);
    }
}
