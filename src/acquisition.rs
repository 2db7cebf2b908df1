//! Acquisition pipeline: model query, reply normalization, then image scraping
//! for every resolved plant.

use std::sync::Arc;

use futures::future::BoxFuture;
use log::{debug, info, warn};
use tokio::sync::Semaphore;

use crate::image_scraper::{ImageProvider, ImageSource};
use crate::model_client::{ModelQueryError, PlantFactSource};
use crate::normalizer::{self, ModelReply};
use crate::plant::PlantRecord;

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error(transparent)]
    Model(#[from] ModelQueryError),
    #[error("unrecognized model reply: {0}")]
    UnrecognizedReply(String),
    #[error("model reply listed no plants")]
    NotFound,
    #[error("acquisition interrupted: {0}")]
    Interrupted(String),
}

/// Resolves a species name into enriched candidate records. Failures of any
/// kind surface as an empty list.
pub trait PlantLookup: Send + Sync {
    fn resolve<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Vec<PlantRecord>>;
}

pub struct AcquisitionPipeline<F, I> {
    facts: Arc<F>,
    images: I,
    image_provider: ImageProvider,
    permits: Semaphore,
}

impl<F, I> AcquisitionPipeline<F, I>
where
    F: PlantFactSource + 'static,
    I: ImageSource,
{
    /// At most `max_concurrent` pipelines run at once; later callers queue.
    pub fn new(facts: F, images: I, image_provider: ImageProvider, max_concurrent: usize) -> Self {
        Self {
            facts: Arc::new(facts),
            images,
            image_provider,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub async fn try_resolve(&self, name: &str) -> Result<Vec<PlantRecord>, AcquisitionError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|err| AcquisitionError::Interrupted(err.to_string()))?;
        debug!("Acquisition[{name}]: admitted");

        let facts = Arc::clone(&self.facts);
        let names = name.to_string();
        let raw = tokio::task::spawn_blocking(move || facts.query(&names))
            .await
            .map_err(|err| AcquisitionError::Interrupted(err.to_string()))??;

        let mut records = match normalizer::normalize(&raw) {
            ModelReply::Unrecognized(reason) => {
                return Err(AcquisitionError::UnrecognizedReply(reason))
            }
            reply => reply.into_records(),
        };
        if records.is_empty() {
            return Err(AcquisitionError::NotFound);
        }

        for record in &mut records {
            record.candidate_images = self
                .images
                .fetch_images(self.image_provider, &record.common_name)
                .await;
        }
        info!(
            "Acquisition[{name}]: resolved {} plant(s) via {}",
            records.len(),
            self.image_provider.label()
        );
        Ok(records)
    }
}

impl<F, I> PlantLookup for AcquisitionPipeline<F, I>
where
    F: PlantFactSource + 'static,
    I: ImageSource,
{
    fn resolve<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Vec<PlantRecord>> {
        Box::pin(async move {
            match self.try_resolve(name).await {
                Ok(records) => records,
                Err(err) => {
                    warn!("Acquisition[{name}]: nothing found: {err}");
                    Vec::new()
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use super::{AcquisitionError, AcquisitionPipeline, PlantLookup};
    use crate::image_scraper::{ImageProvider, ImageSource};
    use crate::model_client::{ModelQueryError, PlantFactSource};

    struct CannedFacts {
        reply: Result<String, u16>,
        queries: Mutex<Vec<String>>,
    }

    impl CannedFacts {
        fn replying(raw: &str) -> Self {
            Self {
                reply: Ok(raw.to_string()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    impl PlantFactSource for CannedFacts {
        fn query(&self, names: &str) -> Result<String, ModelQueryError> {
            self.queries
                .lock()
                .expect("queries lock poisoned")
                .push(names.to_string());
            self.reply
                .clone()
                .map_err(|status| ModelQueryError::UpstreamStatus {
                    status,
                    body: "quota exceeded".to_string(),
                })
        }
    }

    /// Tracks how many queries overlap.
    #[derive(Default)]
    struct SlowFacts {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl PlantFactSource for SlowFacts {
        fn query(&self, names: &str) -> Result<String, ModelQueryError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!(r#"{{"cnname":"{names}"}}"#))
        }
    }

    #[derive(Default)]
    struct RecordingImages {
        requests: Mutex<Vec<(ImageProvider, String)>>,
    }

    impl ImageSource for RecordingImages {
        fn fetch_images(
            &self,
            provider: ImageProvider,
            query: &str,
        ) -> impl Future<Output = Vec<String>> + Send {
            self.requests
                .lock()
                .expect("requests lock poisoned")
                .push((provider, query.to_string()));
            let images = vec![format!("https://img.example/{}/{query}.jpg", provider.label())];
            async move { images }
        }
    }

    impl ImageSource for Arc<RecordingImages> {
        fn fetch_images(
            &self,
            provider: ImageProvider,
            query: &str,
        ) -> impl Future<Output = Vec<String>> + Send {
            self.as_ref().fetch_images(provider, query)
        }
    }

    #[tokio::test]
    async fn test_resolve_attaches_images_to_every_record() {
        let images = Arc::new(RecordingImages::default());
        let pipeline = AcquisitionPipeline::new(
            CannedFacts::replying(
                r#"[{"cnname":"绿萝","category":"多年生 藤本"},{"cnname":"芦荟"}]"#,
            ),
            Arc::clone(&images),
            ImageProvider::Baidu,
            2,
        );

        let records = pipeline.resolve("绿萝 芦荟").await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].category, "多年生藤本");
        assert_eq!(
            records[0].candidate_images,
            vec!["https://img.example/baidu/绿萝.jpg"]
        );
        assert_eq!(
            records[1].candidate_images,
            vec!["https://img.example/baidu/芦荟.jpg"]
        );
        assert!(records.iter().all(|record| record.category_class.is_none()));

        let requests = images.requests.lock().expect("requests lock poisoned");
        assert_eq!(
            *requests,
            vec![
                (ImageProvider::Baidu, "绿萝".to_string()),
                (ImageProvider::Baidu, "芦荟".to_string()),
            ]
        );
        let queries = pipeline.facts.queries.lock().expect("queries lock poisoned");
        assert_eq!(*queries, vec!["绿萝 芦荟".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_wraps_single_object_reply() {
        let pipeline = AcquisitionPipeline::new(
            CannedFacts::replying(r#"{"cnname":"吊兰","enname":"Chlorophytum comosum"}"#),
            RecordingImages::default(),
            ImageProvider::Garden,
            1,
        );

        let records = pipeline.resolve("吊兰").await;
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].candidate_images,
            vec!["https://img.example/garden/吊兰.jpg"]
        );
    }

    #[tokio::test]
    async fn test_model_failure_is_typed_and_collapses_to_empty() {
        let images = Arc::new(RecordingImages::default());
        let pipeline = AcquisitionPipeline::new(
            CannedFacts::failing(429),
            Arc::clone(&images),
            ImageProvider::Baidu,
            2,
        );

        let result = pipeline.try_resolve("绿萝").await;
        assert!(matches!(
            result,
            Err(AcquisitionError::Model(ModelQueryError::UpstreamStatus { status: 429, .. }))
        ));
        assert!(pipeline.resolve("绿萝").await.is_empty());
        assert!(images
            .requests
            .lock()
            .expect("requests lock poisoned")
            .is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_and_empty_replies_are_distinguished() {
        let prose = AcquisitionPipeline::new(
            CannedFacts::replying("抱歉, 我不认识这种植物"),
            RecordingImages::default(),
            ImageProvider::Baidu,
            1,
        );
        assert!(matches!(
            prose.try_resolve("未知").await,
            Err(AcquisitionError::UnrecognizedReply(_))
        ));

        let empty = AcquisitionPipeline::new(
            CannedFacts::replying("[]"),
            RecordingImages::default(),
            ImageProvider::Baidu,
            1,
        );
        assert!(matches!(
            empty.try_resolve("未知").await,
            Err(AcquisitionError::NotFound)
        ));
        assert!(empty.resolve("未知").await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pipelines_respect_limit() {
        let pipeline = AcquisitionPipeline::new(
            SlowFacts::default(),
            RecordingImages::default(),
            ImageProvider::Baidu,
            2,
        );

        let names: Vec<String> = (0..6).map(|index| format!("植物{index}")).collect();
        let results =
            futures::future::join_all(names.iter().map(|name| pipeline.resolve(name))).await;

        assert!(results.iter().all(|records| records.len() == 1));
        let peak = pipeline.facts.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak={peak}");
    }
}
