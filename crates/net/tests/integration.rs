//! Integration tests for net crate

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use stackbuild_errors::{Error, NetworkError};
    use stackbuild_events::{channel, AppEvent, DownloadEvent, EventSender};
    use stackbuild_net::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_download_file() {
        let server = MockServer::start();
        let (tx, mut rx) = channel();

        let content = b"fake tarball content";
        let mock = server.mock(|when, then| {
            when.method(GET).path("/zlib-1.3.tar.gz");
            then.status(200)
                .header("content-length", content.len().to_string())
                .body(content);
        });

        let temp = tempdir().unwrap();
        let dest = temp.path().join("downloads").join("zlib-1.3.tar.gz");
        let client = NetClient::with_defaults().unwrap();
        let url = server.url("/zlib-1.3.tar.gz");

        let result = download_file(&client, &url, &dest, "zlib", &Some(tx))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(result.size, content.len() as u64);
        assert_eq!(result.path, dest);

        let downloaded = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(downloaded, content);
        assert!(!temp.path().join("downloads/zlib-1.3.tar.gz.part").exists());

        let mut saw_start = false;
        let mut saw_complete = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                AppEvent::Download(DownloadEvent::Started { stage, .. }) => {
                    assert_eq!(stage, "zlib");
                    saw_start = true;
                }
                AppEvent::Download(DownloadEvent::Completed { final_size, .. }) => {
                    assert_eq!(final_size, content.len() as u64);
                    saw_complete = true;
                }
                _ => {}
            }
        }
        assert!(saw_start);
        assert!(saw_complete);
    }

    #[tokio::test]
    async fn test_download_http_error_leaves_no_file() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/missing.tar.gz");
            then.status(404);
        });

        let temp = tempdir().unwrap();
        let dest = temp.path().join("missing.tar.gz");
        let client = NetClient::with_defaults().unwrap();
        let url = server.url("/missing.tar.gz");

        let result = download_file(&client, &url, &dest, "missing", &None::<EventSender>).await;

        // Attempted exactly once
        mock.assert_hits(1);
        assert!(matches!(
            result,
            Err(Error::Network(NetworkError::HttpError { status: 404, .. }))
        ));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let temp = tempdir().unwrap();
        let client = NetClient::with_defaults().unwrap();
        let result = download_file(
            &client,
            "not a url",
            &temp.path().join("x"),
            "x",
            &None::<EventSender>,
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::Network(NetworkError::InvalidUrl(_)))
        ));
    }
}
