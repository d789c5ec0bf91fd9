// SPDX-License-Identifier: GPL-3.0-only

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use zbus::fdo::{DBusProxy, RequestNameFlags, RequestNameReply};

pub use chooser_portal_config as config;

mod app_chooser;
mod apps;
mod dialog;
mod documents;
mod file_chooser;
mod portal;
mod registry;
mod request;
mod response;
#[cfg(test)]
mod testing;
mod zenity;

use crate::{app_chooser::AppChooser, file_chooser::FileChooser, portal::Portal};

static DBUS_PATH: &str = "/org/freedesktop/portal/desktop";
/// Responses are addressed to the portal frontend
static PORTAL_FRONTEND_NAME: &str = "org.freedesktop.portal.Desktop";

const PORTAL_RESPONSE_SUCCESS: u32 = 0;
const PORTAL_RESPONSE_CANCELLED: u32 = 1;
const PORTAL_RESPONSE_OTHER: u32 = 2;

#[derive(Parser, Debug)]
#[command(version, about = "File and application chooser portal backend")]
struct Args {
    /// Print debug information
    #[arg(short, long)]
    verbose: bool,
    /// Replace a running instance
    #[arg(short, long)]
    replace: bool,
    /// Read the configuration from this file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config = config::Config::load(args.config.as_deref());
    run(config, args.replace).await
}

async fn run(config: config::Config, replace: bool) -> anyhow::Result<()> {
    let connection = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;

    let documents = documents::DocumentsProxy::new(&connection).await?;
    let mount_point = match &config.document_mount_point {
        Some(path) => Some(path.clone()),
        None => match documents.get_mount_point().await {
            Ok(bytes) => documents::mount_point_from_bytes(bytes),
            Err(err) => {
                log::warn!("failed to get document portal mount point: {err}");
                None
            }
        },
    };
    log::debug!("document portal mounted at {mount_point:?}");

    let bus_name = config.bus_name.clone();
    let frontend = Arc::new(zenity::Zenity::new(config.dialog_program.clone()));
    let portal = Portal::new(Arc::new(documents), frontend, mount_point, config);

    let object_server = connection.object_server();
    object_server
        .at(DBUS_PATH, FileChooser::new(portal.clone()))
        .await
        .context("failed to export file chooser")?;
    object_server
        .at(DBUS_PATH, AppChooser::new(portal))
        .await
        .context("failed to export app chooser")?;

    let dbus = DBusProxy::new(&connection).await?;
    let mut name_lost = dbus.receive_name_lost().await?;

    let mut flags = RequestNameFlags::AllowReplacement | RequestNameFlags::DoNotQueue;
    if replace {
        flags |= RequestNameFlags::ReplaceExisting;
    }
    let reply = connection
        .request_name_with_flags(bus_name.as_str(), flags)
        .await
        .with_context(|| format!("failed to request {bus_name}"))?;
    match reply {
        RequestNameReply::PrimaryOwner | RequestNameReply::AlreadyOwner => {
            log::debug!("acquired {bus_name}");
        }
        reply => anyhow::bail!("could not acquire {bus_name}: {reply:?}"),
    }

    let lost = async {
        while let Some(signal) = name_lost.next().await {
            if signal
                .args()
                .is_ok_and(|args| args.name().as_str() == bus_name)
            {
                break;
            }
        }
    };
    tokio::select! {
        _ = lost => log::info!("{bus_name} was replaced, exiting"),
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for ctrl-c")?;
            log::debug!("interrupted, exiting");
        }
    }
    Ok(())
}
