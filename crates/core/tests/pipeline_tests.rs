//! End-to-end pipeline tests against a local stub HTTP server.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clipmark_core::*;

const ARTICLE_BODY: &str = "The collector pulled this article out of the page body. It has several sentences \
    of real prose so it comfortably clears both the region threshold and the content sufficiency threshold used \
    by the escalation policy. A second sentence pads it out further, and a third one settles the matter beyond \
    doubt. Articles this long never trigger a rendered retry. One more sentence keeps the character count well \
    clear of every configured minimum in these tests.";

fn article_page() -> String {
    format!(
        r#"<html><head><title>Stub Article</title></head><body>
            <nav><a href="/">Home</a></nav>
            <article><h1>Stub Article</h1><p>{}</p></article>
        </body></html>"#,
        ARTICLE_BODY
    )
}

/// Serves a fixed HTML body on an ephemeral port, counting hits.
async fn spawn_stub(body: String) -> (String, Arc<AtomicUsize>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_inner = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            hits_inner.fetch_add(1, Ordering::SeqCst);
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: text/html; charset=utf-8\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    (format!("http://{}/article", addr), hits)
}

fn run<F: std::future::Future + Send + 'static>(fut: F) -> F::Output
where
    F::Output: Send,
{
    std::thread::spawn(move || tokio::runtime::Runtime::new().unwrap().block_on(fut))
        .join()
        .unwrap()
}

#[test]
fn test_clip_lightweight_end_to_end() {
    let result = run(async {
        let (url, _) = spawn_stub(article_page()).await;
        let pipeline = ClipPipeline::new(PipelineConfig::default());
        pipeline
            .clip(&url, &ClipOptions { download_images: false, ..Default::default() })
            .await
    })
    .unwrap();

    assert_eq!(result.extracted.title, "Stub Article");
    assert_eq!(result.fetch_mode, FetchMode::Lightweight);
    assert!(result.extracted.plain_text.contains("pulled this article"));
    assert!(!result.extracted.content.contains("<nav"));
    assert!(result.url.ends_with("/article"));
}

#[test]
fn test_clip_fetches_exactly_once_for_sufficient_content() {
    let hits = run(async {
        let (url, hits) = spawn_stub(article_page()).await;
        let pipeline = ClipPipeline::new(PipelineConfig::default());
        pipeline
            .clip(&url, &ClipOptions { download_images: false, ..Default::default() })
            .await
            .unwrap();
        hits.load(Ordering::SeqCst)
    });

    assert_eq!(hits, 1);
}

#[test]
fn test_thin_content_without_browser_stays_lightweight() {
    // No browser handle configured: a thin result must come back as-is
    // rather than erroring or looping.
    let result = run(async {
        let (url, hits) = spawn_stub("<html><head><title>Thin</title></head><body><p>js shell</p></body></html>".to_string()).await;
        let pipeline = ClipPipeline::new(PipelineConfig::default());
        let result = pipeline
            .clip(&url, &ClipOptions { download_images: false, ..Default::default() })
            .await
            .unwrap();
        (result, hits.load(Ordering::SeqCst))
    });

    let (clipped, hits) = result;
    assert_eq!(clipped.extracted.title, "Thin");
    assert_eq!(clipped.fetch_mode, FetchMode::Lightweight);
    assert_eq!(hits, 1);
}

#[test]
fn test_http_error_surfaces_without_browser() {
    let result = run(async {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        let pipeline = ClipPipeline::new(PipelineConfig::default());
        pipeline
            .clip(
                &format!("http://{}/missing", addr),
                &ClipOptions { download_images: false, ..Default::default() },
            )
            .await
    });

    match result {
        Err(ClipError::HttpStatus { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected HttpStatus error, got {:?}", other.map(|r| r.url)),
    }
}

#[test]
fn test_connection_refused_surfaces_as_network_error() {
    let result = run(async {
        let pipeline = ClipPipeline::new(PipelineConfig::default());
        // Bind-then-drop guarantees a closed port.
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        pipeline
            .clip(
                &format!("http://127.0.0.1:{}/gone", port),
                &ClipOptions { download_images: false, ..Default::default() },
            )
            .await
    });

    assert!(matches!(result, Err(ClipError::Network(_))));
}

#[test]
fn test_image_localization_end_to_end() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store_dir = tmp.path().to_path_buf();

    let store_path = store_dir.clone();
    let (result, hash) = run(async move {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // One server for both the page and the image it references.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let page = format!(
            r#"<html><head><title>Pics</title></head><body><article>
                <p>{}</p><img src="/static/photo.png" alt="a photo">
            </article></body></html>"#,
            ARTICLE_BODY
        );

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let page = page.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let response = if request.starts_with("GET /static/photo.png") {
                        let body: &[u8] = b"\x89PNG fake image bytes";
                        let mut r = format!(
                            "HTTP/1.1 200 OK\r\ncontent-type: image/png\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                            body.len()
                        )
                        .into_bytes();
                        r.extend_from_slice(body);
                        r
                    } else {
                        format!(
                            "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                            page.len(),
                            page
                        )
                        .into_bytes()
                    };
                    let _ = socket.write_all(&response).await;
                });
            }
        });

        let image_url = format!("http://{}/static/photo.png", addr);
        let store = ImageStore::new(&store_path).unwrap();
        let pipeline = ClipPipeline::new(PipelineConfig::default()).with_image_store(store);
        let result = pipeline
            .clip(&format!("http://{}/article", addr), &ClipOptions::default())
            .await
            .unwrap();
        (result, images::hash_url(&image_url))
    });

    assert_eq!(result.image_count, 1);
    assert_eq!(result.downloaded_image_count, 1);

    let image = &result.extracted.images[0];
    assert!(image.downloaded);
    assert_eq!(image.content_hash, hash);
    assert_eq!(image.content_type.as_deref(), Some("image/png"));

    // Invariant: a non-null localPath names an existing file of sizeBytes length
    let path = image.local_path.as_ref().unwrap();
    let metadata = std::fs::metadata(path).unwrap();
    assert_eq!(metadata.len(), image.size_bytes);

    assert!(result.extracted.content.contains(&format!("/images/{}.png", hash)));
    assert!(result.extracted.content.contains("data-original-src"));
}

#[test]
fn test_oversized_image_is_rejected_without_storing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store_dir = tmp.path().to_path_buf();

    let store_path = store_dir.clone();
    let result = run(async move {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let page = format!(
            r#"<html><head><title>Big</title></head><body><article>
                <p>{}</p><img src="/huge.jpg" alt="too big">
            </article></body></html>"#,
            ARTICLE_BODY
        );

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let page = page.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let response = if request.starts_with("GET /huge.jpg") {
                        // Declared 6 MB: the client must abandon the download
                        "HTTP/1.1 200 OK\r\ncontent-type: image/jpeg\r\ncontent-length: 6291456\r\nconnection: close\r\n\r\n"
                            .to_string()
                            .into_bytes()
                    } else {
                        format!(
                            "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                            page.len(),
                            page
                        )
                        .into_bytes()
                    };
                    let _ = socket.write_all(&response).await;
                });
            }
        });

        let store = ImageStore::new(&store_path).unwrap();
        let pipeline = ClipPipeline::new(PipelineConfig::default()).with_image_store(store);
        pipeline
            .clip(&format!("http://{}/article", addr), &ClipOptions::default())
            .await
            .unwrap()
    });

    assert_eq!(result.image_count, 1);
    assert_eq!(result.downloaded_image_count, 0);
    assert!(!result.extracted.images[0].downloaded);
    assert!(result.extracted.images[0].local_path.is_none());
    assert!(result.extracted.content.contains("data-download-failed"));
    // No file was written
    assert_eq!(std::fs::read_dir(&store_dir).unwrap().count(), 0);
}

#[test]
fn test_unsupported_content_type_is_rejected() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store_dir = tmp.path().to_path_buf();

    let store_path = store_dir.clone();
    let result = run(async move {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let page = format!(
            r#"<html><head><title>Wrong type</title></head><body><article>
                <p>{}</p><img src="/thing.bmp" alt="bitmap">
            </article></body></html>"#,
            ARTICLE_BODY
        );

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let page = page.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let response = if request.starts_with("GET /thing.bmp") {
                        let body: &[u8] = b"BM fake bitmap";
                        let mut r = format!(
                            "HTTP/1.1 200 OK\r\ncontent-type: image/bmp\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                            body.len()
                        )
                        .into_bytes();
                        r.extend_from_slice(body);
                        r
                    } else {
                        format!(
                            "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                            page.len(),
                            page
                        )
                        .into_bytes()
                    };
                    let _ = socket.write_all(&response).await;
                });
            }
        });

        let store = ImageStore::new(&store_path).unwrap();
        let pipeline = ClipPipeline::new(PipelineConfig::default()).with_image_store(store);
        pipeline
            .clip(&format!("http://{}/article", addr), &ClipOptions::default())
            .await
            .unwrap()
    });

    assert_eq!(result.downloaded_image_count, 0);
    assert_eq!(std::fs::read_dir(&store_dir).unwrap().count(), 0);
}

#[test]
fn test_clip_twice_yields_identical_extraction() {
    let (first, second) = run(async {
        let (url, _) = spawn_stub(article_page()).await;
        let pipeline = ClipPipeline::new(PipelineConfig::default());
        let options = ClipOptions { download_images: false, ..Default::default() };
        let first = pipeline.clip(&url, &options).await.unwrap();
        let second = pipeline.clip(&url, &options).await.unwrap();
        (first, second)
    });

    assert_eq!(first.extracted.content, second.extracted.content);
    assert_eq!(first.extracted.plain_text, second.extracted.plain_text);
    assert_eq!(first.extracted.structured_text, second.extracted.structured_text);
}

/// Test renderer: counts invocations and serves a fixed page.
struct FakeRenderer {
    calls: AtomicUsize,
    fail: bool,
}

impl FakeRenderer {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), fail })
    }
}

#[async_trait::async_trait]
impl Renderer for FakeRenderer {
    async fn fetch_rendered(&self, url: &url::Url, _load_images: bool) -> clipmark_core::Result<FetchResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClipError::Timeout { seconds: 45 });
        }
        Ok(FetchResult {
            html: format!(
                "<html><head><title>Rendered</title></head><body><article><p>{}</p></article></body></html>",
                ARTICLE_BODY
            ),
            final_url: url.clone(),
            status: 200,
            content_type: Some("text/html".to_string()),
            mode: FetchMode::Rendered,
        })
    }
}

#[test]
fn test_thin_content_escalates_exactly_once() {
    let renderer = FakeRenderer::new(false);
    let renderer_for_pipeline = renderer.clone();

    let (result, page_hits) = run(async move {
        let (url, hits) = spawn_stub(
            "<html><head><title>Shell</title></head><body><p>js shell</p></body></html>".to_string(),
        )
        .await;
        let pipeline = ClipPipeline::new(PipelineConfig::default()).with_renderer(renderer_for_pipeline);
        let result = pipeline
            .clip(&url, &ClipOptions { download_images: false, ..Default::default() })
            .await
            .unwrap();
        (result, hits.load(Ordering::SeqCst))
    });

    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(page_hits, 1);
    assert_eq!(result.fetch_mode, FetchMode::Rendered);
    assert_eq!(result.extracted.title, "Rendered");
}

#[test]
fn test_fetch_error_escalates_exactly_once() {
    let renderer = FakeRenderer::new(false);
    let renderer_for_pipeline = renderer.clone();

    let result = run(async move {
        // Closed port: the lightweight fetch fails outright
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let pipeline = ClipPipeline::new(PipelineConfig::default()).with_renderer(renderer_for_pipeline);
        pipeline
            .clip(
                &format!("http://127.0.0.1:{}/gone", port),
                &ClipOptions { download_images: false, ..Default::default() },
            )
            .await
            .unwrap()
    });

    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.fetch_mode, FetchMode::Rendered);
}

#[test]
fn test_sufficient_content_never_escalates() {
    let renderer = FakeRenderer::new(false);
    let renderer_for_pipeline = renderer.clone();

    run(async move {
        let (url, _) = spawn_stub(article_page()).await;
        let pipeline = ClipPipeline::new(PipelineConfig::default()).with_renderer(renderer_for_pipeline);
        pipeline
            .clip(&url, &ClipOptions { download_images: false, ..Default::default() })
            .await
            .unwrap()
    });

    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_failed_escalation_keeps_lightweight_result() {
    let renderer = FakeRenderer::new(true);
    let renderer_for_pipeline = renderer.clone();

    let result = run(async move {
        let (url, _) =
            spawn_stub("<html><head><title>Shell</title></head><body><p>js shell</p></body></html>".to_string()).await;
        let pipeline = ClipPipeline::new(PipelineConfig::default()).with_renderer(renderer_for_pipeline);
        pipeline
            .clip(&url, &ClipOptions { download_images: false, ..Default::default() })
            .await
            .unwrap()
    });

    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.fetch_mode, FetchMode::Lightweight);
    assert_eq!(result.extracted.title, "Shell");
}

#[test]
fn test_disable_preference_never_escalates() {
    let renderer = FakeRenderer::new(false);
    let renderer_for_pipeline = renderer.clone();

    run(async move {
        let (url, _) =
            spawn_stub("<html><head><title>Shell</title></head><body><p>js shell</p></body></html>".to_string()).await;
        let pipeline = ClipPipeline::new(PipelineConfig::default()).with_renderer(renderer_for_pipeline);
        pipeline
            .clip(
                &url,
                &ClipOptions { render: RenderPreference::Disable, download_images: false },
            )
            .await
            .unwrap()
    });

    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_ingest_entry_point_is_independent() {
    // No server, no pipeline: pasted content goes straight through
    let result = ingest(b"# Pasted note\n\nWith a [link](https://example.org).", None).unwrap();
    assert_eq!(result.detected_format, Format::Markdown);
    assert!(result.sanitized_html.contains("<h1>Pasted note</h1>"));
    assert!(result.sanitized_html.contains(r#"<a href="https://example.org">link</a>"#));
}
