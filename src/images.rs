//! Image resolution for one chapter.

use futures::future::join_all;
use tracing::instrument;
use wpd_generate::ChapterImages;
use wpd_normalize::ChapterTree;
use wpd_source::SourceClient;

/// Fetches every image of `chapter` in tree order.
///
/// Sources are split into batches of `batch_size`. Members of a batch are
/// fetched concurrently, batches strictly one after another. A failed fetch
/// leaves `None` at its position and never fails the chapter.
#[instrument(skip_all, fields(chapter = chapter.id, images = chapter.image_count()))]
pub async fn resolve_images(client: &SourceClient, chapter: &ChapterTree, batch_size: usize) -> ChapterImages {
    let sources: Vec<&str> = chapter.images().map(|image| image.src.as_str()).collect();
    let mut resolved = Vec::with_capacity(sources.len());
    for batch in sources.chunks(batch_size.max(1)) {
        let fetched = join_all(batch.iter().map(|src| async move {
            match client.fetch_image(src, false).await {
                Ok(bytes) if !bytes.is_empty() => Some(bytes),
                Ok(_) => {
                    tracing::warn!(src, "Image was empty, omitting");
                    None
                },
                Err(err) => {
                    tracing::warn!(src, error = %*err, "Image unavailable, omitting");
                    None
                },
            }
        }))
        .await;
        resolved.extend(fetched);
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use wpd_config::SourceConfig;
    use wpd_source::mock::{MockReply, MockTransport};

    fn chapter(count: usize) -> ChapterTree {
        let html: String = (0..count).map(|i| format!("<p><img src=\"https://img.test/{i}.jpg\"></p>")).collect();
        wpd_normalize::normalize(1, "Images", &html)
    }

    fn client(transport: &Arc<MockTransport>) -> SourceClient {
        let config = SourceConfig { retry_ceiling_secs: 0, ..Default::default() };
        SourceClient::new(transport.clone(), None, &config)
    }

    #[tokio::test(start_paused = true)]
    async fn batches_bound_concurrency_and_keep_order() {
        let transport = Arc::new(MockTransport::new().with_latency(Duration::from_millis(100)));
        for i in 0..7 {
            transport.set_route(format!("https://img.test/{i}.jpg"), MockReply::ok(vec![i as u8 + 1]));
        }
        let images = resolve_images(&client(&transport), &chapter(7), 3).await;
        let expected: Vec<_> = (0..7).map(|i| Some(vec![i as u8 + 1])).collect();
        assert_eq!(images, expected);
        assert_eq!(transport.max_in_flight(), 3);
        assert_eq!(transport.total_calls(), 7);
    }

    #[tokio::test]
    async fn failures_are_absorbed() {
        let transport = Arc::new(MockTransport::new());
        transport.set_route("https://img.test/0.jpg", MockReply::ok(b"zero".to_vec()));
        transport.set_route("https://img.test/1.jpg", MockReply::Fail);
        transport.set_route("https://img.test/2.jpg", MockReply::ok(b"two".to_vec()));
        let images = resolve_images(&client(&transport), &chapter(3), 3).await;
        assert_eq!(images, vec![Some(b"zero".to_vec()), None, Some(b"two".to_vec())]);
    }

    #[tokio::test]
    async fn chapter_without_images() {
        let transport = Arc::new(MockTransport::new());
        assert!(resolve_images(&client(&transport), &chapter(0), 3).await.is_empty());
        assert_eq!(transport.total_calls(), 0);
    }
}
