// SPDX-License-Identifier: GPL-3.0-only

//! State shared by the exported interfaces.

use std::{path::PathBuf, sync::Arc};

use tokio::sync::{Mutex, oneshot};

use crate::{
    config::Config,
    dialog::{FileDialog, Frontend},
    documents::DocumentBroker,
    registry::{Interface, Pending, Registry},
    request::{self, ChooserKind, FileRequest},
    response::ResponseSink,
};

pub struct Portal {
    pub registry: Arc<Mutex<Registry>>,
    pub broker: Arc<dyn DocumentBroker>,
    pub frontend: Arc<dyn Frontend>,
    pub mount_point: Option<PathBuf>,
    pub config: Config,
}

impl Portal {
    pub fn new(
        broker: Arc<dyn DocumentBroker>,
        frontend: Arc<dyn Frontend>,
        mount_point: Option<PathBuf>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(Mutex::new(Registry::new())),
            broker,
            frontend,
            mount_point,
            config,
        })
    }

    /// Show a file chooser and start driving it. The handle is returned before the user
    /// has done anything.
    pub async fn open_file_chooser(
        self: &Arc<Self>,
        sink: Arc<dyn ResponseSink>,
        sender: &str,
        app_id: &str,
        kind: ChooserKind,
        dialog: FileDialog,
    ) -> anyhow::Result<String> {
        let dialog = self.frontend.open_file_dialog(dialog)?;
        let (closed_tx, closed_rx) = oneshot::channel();
        let request = FileRequest::new(app_id, sender, kind, dialog.guard, closed_tx);

        let handle = {
            let mut registry = self.registry.lock().await;
            let handle = registry.register(Pending::FileChooser(request));
            log::debug!(
                "{kind:?} file chooser {handle} for {app_id:?}, {} outstanding",
                registry.len()
            );
            handle
        };

        tokio::spawn(request::drive(
            self.clone(),
            sink,
            handle.clone(),
            dialog.decision,
            closed_rx,
        ));
        Ok(handle)
    }

    /// Close a request on behalf of `app_id`. Returns whether there was anything to close.
    pub async fn close(&self, app_id: &str, handle: &str, interface: Interface) -> bool {
        let mut registry = self.registry.lock().await;
        match registry.close(handle, app_id, interface) {
            Some(pending) => {
                log::debug!("closing {handle} for {app_id:?}");
                // Tears the dialog down and wakes whoever is driving the request. Dropped under
                // the lock so drivers never see the handle gone while their request lives.
                drop(pending);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        dialog::FileDecision,
        documents::Permission,
        request::{ResponseCode, State},
        response::Response,
        testing::{self, BrokerCall, FakeBroker, FakeFrontend, RecordingSink, SENDER},
    };

    struct Fixture {
        frontend: Arc<FakeFrontend>,
        broker: Arc<FakeBroker>,
        portal: Arc<Portal>,
        sink: Arc<RecordingSink>,
        responses: mpsc::UnboundedReceiver<Response>,
    }

    impl Fixture {
        fn new(broker: FakeBroker) -> Self {
            let frontend = Arc::new(FakeFrontend::default());
            let broker = Arc::new(broker);
            let portal = testing::portal(frontend.clone(), broker.clone());
            let (sink, responses) = RecordingSink::channel();
            Self {
                frontend,
                broker,
                portal,
                sink,
                responses,
            }
        }

        async fn open(&self, app_id: &str, kind: ChooserKind) -> String {
            let dialog = crate::file_chooser::FileChooserOptions::default().into_dialog(
                kind,
                "Pick",
                "",
                &self.portal.config.file_chooser,
            );
            self.portal
                .open_file_chooser(self.sink.clone(), SENDER, app_id, kind, dialog)
                .await
                .unwrap()
        }

        async fn settle(&self) {
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
        }
    }

    fn file_uri(path: &Path) -> String {
        url::Url::from_file_path(path).unwrap().to_string()
    }

    fn write_files(dir: &Path, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, name).unwrap();
                file_uri(&path)
            })
            .collect()
    }

    #[tokio::test]
    async fn unconfined_open_files_pass_through() {
        let mut fx = Fixture::new(FakeBroker::default());
        let handle = fx.open("", ChooserKind::OpenMultiple).await;
        assert!(handle.starts_with("/org/freedesktop/portal/desktop/"));
        assert_eq!(fx.frontend.dialogs()[0].accept_label, "_Open");

        let uris = vec!["file:///home/u/b.txt".to_string(), "file:///home/u/a.txt".to_string()];
        assert!(fx.frontend.decide(
            0,
            FileDecision::Accept {
                uris: uris.clone(),
                writable: true,
            }
        ));

        assert_eq!(
            fx.responses.recv().await.unwrap(),
            Response::OpenFiles {
                sender: SENDER.into(),
                handle,
                code: ResponseCode::Success,
                uris,
            }
        );
        assert!(fx.broker.calls().is_empty());
        assert_eq!(fx.frontend.released(), 1);
        assert!(fx.portal.registry.lock().await.is_empty());
    }

    #[tokio::test]
    async fn confined_save_adds_named_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new(FakeBroker::default());
        let handle = fx.open("org.example.App", ChooserKind::Save).await;
        assert_eq!(fx.frontend.dialogs()[0].accept_label, "_Save");

        fx.frontend.decide(
            0,
            FileDecision::Accept {
                uris: vec![file_uri(&dir.path().join("newfile.txt"))],
                writable: true,
            },
        );

        assert_eq!(
            fx.responses.recv().await.unwrap(),
            Response::SaveFile {
                sender: SENDER.into(),
                handle,
                code: ResponseCode::Success,
                uri: format!("file://{}/doc0/newfile.txt", testing::MOUNT_POINT),
            }
        );
        assert_eq!(
            fx.broker.calls(),
            [
                BrokerCall::AddNamed("newfile.txt".into()),
                BrokerCall::Grant {
                    doc_id: "doc0".into(),
                    app_id: "org.example.App".into(),
                    permissions: vec![
                        Permission::Read,
                        Permission::Write,
                        Permission::GrantPermissions
                    ],
                },
            ]
        );
    }

    #[tokio::test]
    async fn dismissed_dialog_reports_other() {
        let mut fx = Fixture::new(FakeBroker::default());
        fx.open("org.example.App", ChooserKind::OpenSingle).await;
        fx.frontend.decide(0, FileDecision::Dismiss);

        let response = fx.responses.recv().await.unwrap();
        assert!(matches!(
            response,
            Response::OpenFile { code: ResponseCode::Other, ref uri, .. } if uri.is_empty()
        ));
        assert!(fx.broker.calls().is_empty());
    }

    #[tokio::test]
    async fn abandoned_dialog_reports_other() {
        let mut fx = Fixture::new(FakeBroker::default());
        fx.open("", ChooserKind::OpenMultiple).await;
        fx.frontend.abandon(0);

        let response = fx.responses.recv().await.unwrap();
        assert!(matches!(
            response,
            Response::OpenFiles { code: ResponseCode::Other, ref uris, .. } if uris.is_empty()
        ));
        assert_eq!(fx.frontend.released(), 1);
    }

    #[tokio::test]
    async fn cancelled_multiple_is_an_empty_list() {
        let mut fx = Fixture::new(FakeBroker::default());
        fx.open("org.example.App", ChooserKind::OpenMultiple).await;
        fx.frontend.decide(0, FileDecision::Cancel);

        let response = fx.responses.recv().await.unwrap();
        assert!(matches!(
            response,
            Response::OpenFiles { code: ResponseCode::Cancelled, ref uris, .. } if uris.is_empty()
        ));
    }

    #[tokio::test]
    async fn close_twice_releases_once() {
        let mut fx = Fixture::new(FakeBroker::default());
        let handle = fx.open("org.example.App", ChooserKind::OpenSingle).await;

        assert!(fx.portal.close("org.example.App", &handle, Interface::FileChooser).await);
        assert!(!fx.portal.close("org.example.App", &handle, Interface::FileChooser).await);
        assert_eq!(fx.frontend.released(), 1);

        fx.settle().await;
        assert!(!fx.frontend.decide(0, FileDecision::Cancel));
        fx.settle().await;
        assert!(fx.responses.try_recv().is_err());
        assert_eq!(fx.frontend.released(), 1);
    }

    #[tokio::test]
    async fn cross_app_close_is_refused() {
        let mut fx = Fixture::new(FakeBroker::default());
        let handle = fx.open("org.example.App", ChooserKind::OpenSingle).await;

        assert!(!fx.portal.close("org.example.Other", &handle, Interface::FileChooser).await);
        assert!(!fx.portal.close("", &handle, Interface::AppChooser).await);
        assert_eq!(fx.frontend.released(), 0);

        fx.frontend.decide(0, FileDecision::Cancel);
        let response = fx.responses.recv().await.unwrap();
        assert_eq!(response.handle(), handle);
    }

    #[tokio::test]
    async fn failed_conversions_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["a", "b", "c"];
        for name in names {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        let mut fx = Fixture::new(FakeBroker::failing_at(1));
        fx.open("org.example.App", ChooserKind::OpenMultiple).await;
        fx.frontend.decide(
            0,
            FileDecision::Accept {
                uris: names.iter().map(|n| file_uri(&dir.path().join(n))).collect(),
                writable: false,
            },
        );

        let Response::OpenFiles { code, uris, .. } = fx.responses.recv().await.unwrap() else {
            panic!("expected OpenFiles");
        };
        assert_eq!(code, ResponseCode::Success);
        assert_eq!(
            uris,
            [
                format!("file://{}/doc0/a", testing::MOUNT_POINT),
                format!("file://{}/doc2/c", testing::MOUNT_POINT),
            ]
        );
    }

    #[tokio::test]
    async fn nothing_converted_reports_other() {
        let mut fx = Fixture::new(FakeBroker::default());
        fx.open("org.example.App", ChooserKind::OpenSingle).await;
        fx.frontend.decide(
            0,
            FileDecision::Accept {
                uris: vec!["file:///does/not/exist".into()],
                writable: true,
            },
        );

        let response = fx.responses.recv().await.unwrap();
        assert!(matches!(
            response,
            Response::OpenFile { code: ResponseCode::Other, ref uri, .. } if uri.is_empty()
        ));
    }

    #[tokio::test]
    async fn frontend_failure_registers_nothing() {
        let frontend = Arc::new(FakeFrontend::failing());
        let portal = testing::portal(frontend, Arc::default());
        let (sink, _responses) = RecordingSink::channel();
        let dialog = crate::file_chooser::FileChooserOptions::default().into_dialog(
            ChooserKind::OpenSingle,
            "Pick",
            "",
            &portal.config.file_chooser,
        );

        let result = portal
            .open_file_chooser(sink, SENDER, "", ChooserKind::OpenSingle, dialog)
            .await;
        assert!(result.is_err());
        assert!(portal.registry.lock().await.is_empty());
    }

    #[tokio::test]
    async fn close_during_conversion_stops_the_request() {
        let dir = tempfile::tempdir().unwrap();
        let (broker, gate) = FakeBroker::gated();
        let mut fx = Fixture::new(broker);
        let handle = fx.open("org.example.App", ChooserKind::OpenMultiple).await;
        fx.frontend.decide(
            0,
            FileDecision::Accept {
                uris: write_files(dir.path(), &["a", "b"]),
                writable: true,
            },
        );
        fx.settle().await;
        // Held by the broker on the first file
        assert_eq!(
            fx.portal
                .registry
                .lock()
                .await
                .file_request_mut(&handle)
                .unwrap()
                .state(),
            State::Converting
        );

        assert!(fx.portal.close("org.example.App", &handle, Interface::FileChooser).await);
        assert_eq!(fx.frontend.released(), 1);
        gate.notify_one();
        fx.settle().await;

        assert!(fx.responses.try_recv().is_err());
        assert_eq!(fx.frontend.released(), 1);
        assert!(fx.portal.registry.lock().await.is_empty());
        let adds = fx
            .broker
            .calls()
            .into_iter()
            .filter(|call| *call == BrokerCall::Add)
            .count();
        assert_eq!(adds, 1);
    }

    #[tokio::test]
    async fn late_step_leaves_reused_handle_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (broker, gate) = FakeBroker::gated();
        let mut fx = Fixture::new(broker);
        let handle = fx.open("org.example.App", ChooserKind::OpenMultiple).await;
        fx.frontend.decide(
            0,
            FileDecision::Accept {
                uris: write_files(dir.path(), &["a", "b"]),
                writable: true,
            },
        );
        fx.settle().await;

        assert!(fx.portal.close("org.example.App", &handle, Interface::FileChooser).await);
        let newcomer = testing::file_request("org.example.App", ChooserKind::OpenMultiple);
        fx.portal
            .registry
            .lock()
            .await
            .insert(&handle, Pending::FileChooser(newcomer));
        gate.notify_one();
        fx.settle().await;

        assert!(fx.responses.try_recv().is_err());
        let mut registry = fx.portal.registry.lock().await;
        let newcomer = registry.file_request_mut(&handle).unwrap();
        assert_eq!(newcomer.state(), State::Open);
        assert!(newcomer.uris().is_empty());
    }

    #[tokio::test]
    async fn concurrent_requests_take_turns_converting() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new(FakeBroker::default());
        fx.open("org.example.First", ChooserKind::OpenMultiple).await;
        fx.open("org.example.Second", ChooserKind::OpenMultiple).await;
        fx.frontend.decide(
            0,
            FileDecision::Accept {
                uris: write_files(dir.path(), &["a", "b", "c"]),
                writable: false,
            },
        );
        fx.frontend.decide(
            1,
            FileDecision::Accept {
                uris: write_files(dir.path(), &["d", "e", "f"]),
                writable: false,
            },
        );

        for _ in 0..2 {
            let Response::OpenFiles { code, uris, .. } = fx.responses.recv().await.unwrap() else {
                panic!("expected OpenFiles");
            };
            assert_eq!(code, ResponseCode::Success);
            assert_eq!(uris.len(), 3);
        }

        let granted: Vec<String> = fx
            .broker
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Grant { app_id, .. } => Some(app_id),
                _ => None,
            })
            .collect();
        assert_eq!(
            granted,
            [
                "org.example.First",
                "org.example.Second",
                "org.example.First",
                "org.example.Second",
                "org.example.First",
                "org.example.Second",
            ]
        );
    }
}
