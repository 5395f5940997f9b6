// Download engine: metadata first, so the observer can size its bar, then
// the content stream straight into the local file.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use reqwest::Method;
use tracing::debug;

use crate::api::{check_found, Client};
use crate::error::{Error, Result};
use crate::items::normalize_item_path;
use crate::progress::ProgressReader;
use crate::signal::TransferInfo;

impl Client {
    /// Download the remote file `source` into the local folder
    /// `target_folder`, returning the path written.
    pub fn download(&self, source: &str, target_folder: &Path) -> Result<PathBuf> {
        let source = normalize_item_path(source)?;
        let name = match source.rsplit('/').next() {
            Some(name) if !name.is_empty() && name != "." && name != ".." => name.to_string(),
            _ => return Err(Error::NotAFile),
        };

        // Size is unknown until the metadata arrives.
        let guard = self.signals().begin(None);
        let item = self.info(&source)?;
        if item.is_folder() {
            return Err(Error::NotAFile);
        }
        let signals = guard.signals().clone();
        signals.start(Some(TransferInfo {
            name: item.name.clone(),
            size: item.size,
        }));

        let response = self
            .authed(Method::GET, &self.item_action_url(&source, "content"))?
            .send()?;
        let response = check_found(response, &source)?;

        let target = target_folder.join(&name);
        debug!(source = %source, target = %target.display(), size = item.size, "downloading");
        let mut out = File::create(&target).map_err(|e| Error::io(&target, e))?;
        let mut reader = ProgressReader::cumulative(response, 0, move |total| signals.progress(total));
        io::copy(&mut reader, &mut out).map_err(|e| Error::io(&target, e))?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Endpoints;
    use crate::config::Config;
    use crate::signal::{Signals, TransferSignal};
    use mockito::Matcher;

    fn client(base: &str) -> Client {
        let mut config = Config::from_json(r#"{"root": "/drive/root"}"#).unwrap();
        config.credentials.access_token = "token".into();
        Client::with_endpoints(config, Endpoints::local(base)).unwrap()
    }

    #[test]
    fn streams_content_to_local_file() {
        let body: Vec<u8> = (0..50_000u32).map(|i| (i % 256) as u8).collect();
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1.0/me/drive/root:/docs/data.bin")
            .with_status(200)
            .with_body(r#"{"name": "data.bin", "size": 50000, "file": {}}"#)
            .create();
        let content = server
            .mock("GET", "/v1.0/me/drive/root:/docs/data.bin:/content")
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_body(body.clone())
            .create();

        let dir = tempfile::tempdir().unwrap();
        let (signals, rx) = Signals::channel();
        let mut c = client(&server.url());
        c.set_signals(signals);
        let written = c.download("/docs/data.bin", dir.path()).unwrap();
        content.assert();

        assert_eq!(written, dir.path().join("data.bin"));
        assert_eq!(std::fs::read(&written).unwrap(), body);

        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got[0], TransferSignal::Start(None));
        assert_eq!(
            got[1],
            TransferSignal::Start(Some(TransferInfo {
                name: "data.bin".into(),
                size: 50_000
            }))
        );
        assert_eq!(got.last(), Some(&TransferSignal::Finish));
        assert!(got.contains(&TransferSignal::Progress(50_000)));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn transfer_stays_silent_at_default_log_level() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1.0/me/drive/root:/a.txt")
            .with_status(200)
            .with_body(r#"{"name": "a.txt", "size": 3, "file": {}}"#)
            .create();
        server
            .mock("GET", "/v1.0/me/drive/root:/a.txt:/content")
            .with_status(200)
            .with_body("abc")
            .create();

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();

        let dir = tempfile::tempdir().unwrap();
        let c = client(&server.url());
        tracing::subscriber::with_default(subscriber, || c.download("/a.txt", dir.path()).unwrap());

        assert!(logs.0.lock().unwrap().is_empty());
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"abc");
    }

    #[test]
    fn metadata_404_writes_nothing() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/v1.0/me/drive/root:/gone.txt").with_status(404).create();
        let content = server.mock("GET", "/v1.0/me/drive/root:/gone.txt:/content").expect(0).create();

        let dir = tempfile::tempdir().unwrap();
        let (signals, rx) = Signals::channel();
        let mut c = client(&server.url());
        c.set_signals(signals);

        let err = c.download("/gone.txt", dir.path()).unwrap_err();
        assert!(err.is_not_found());
        content.assert();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![TransferSignal::Start(None), TransferSignal::Finish]
        );
    }

    #[test]
    fn content_404_is_not_found() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1.0/me/drive/root:/a.txt")
            .with_status(200)
            .with_body(r#"{"name": "a.txt", "size": 3, "file": {}}"#)
            .create();
        server
            .mock("GET", "/v1.0/me/drive/root:/a.txt:/content")
            .with_status(404)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let err = client(&server.url()).download("a.txt", dir.path()).unwrap_err();
        assert!(err.is_not_found());
        assert!(!dir.path().join("a.txt").exists());
    }

    #[test]
    fn content_error_is_decoded() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1.0/me/drive/root:/a.txt")
            .with_status(200)
            .with_body(r#"{"name": "a.txt", "size": 3, "file": {}}"#)
            .create();
        server
            .mock("GET", "/v1.0/me/drive/root:/a.txt:/content")
            .with_status(503)
            .with_body(r#"{"error": {"code": "serviceNotAvailable", "message": "try later"}}"#)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let err = client(&server.url()).download("/a.txt", dir.path()).unwrap_err();
        assert!(matches!(err, Error::Api { status: 503, .. }));
    }

    #[test]
    fn folders_and_bad_paths_are_rejected() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1.0/me/drive/root:/docs")
            .with_status(200)
            .with_body(r#"{"name": "docs", "folder": {"childCount": 2}}"#)
            .create();
        let any_content = server.mock("GET", Matcher::Regex(":/content$".into())).expect(0).create();

        let dir = tempfile::tempdir().unwrap();
        let c = client(&server.url());
        assert!(matches!(c.download("/docs", dir.path()), Err(Error::NotAFile)));
        assert!(matches!(c.download("./docs/a.txt", dir.path()), Err(Error::InvalidPath(_))));
        assert!(matches!(c.download("/", dir.path()), Err(Error::NotAFile)));
        any_content.assert();
    }
}
