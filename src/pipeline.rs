//! # Pipeline State Machine
//!
//! Una istanza per tipo di media. Coordina probe, request builder, servizio
//! remoto e response interpreter, e tiene l'unica sessione viva.
//!
//! ## Comandi:
//! - `select(file)`: valida il MIME dichiarato, fa il probe, passa a `Selected`
//! - `submit(mode, form)`: solo da `Selected`; passa a `Processing`, invia la
//!   richiesta, poi `Result` (successo) o di nuovo `Selected` (errore)
//! - `reset()`: da qualsiasi fase, scarta tutto e torna a `Idle`
//! - `compare()` / `open_comparison()` / `close_comparison()`: vista prima/dopo
//! - `download()` / `save_result(dir)`: payload + nome suggerito
//!
//! ## Concorrenza:
//! Lo stato sta dietro un `tokio::sync::Mutex` che non viene mai tenuto
//! attraverso un `.await` su probe o rete. Ogni reset e ogni selezione
//! confermata incrementano un contatore di generazione: una risposta che
//! arriva con una generazione diversa da quella catturata all'invio viene
//! scartata, così un reset-then-reselect non riceve mai un risultato vecchio.
//!
//! Una seconda `submit` mentre la pipeline è in `Processing` è un no-op.
//!
//! ## Adapter di presentazione:
//! Il core non conosce elementi grafici. L'adapter inietta un
//! `PipelineObserver` e riceve cambi di fase, errori e risultati.
//! Le notifiche partono con il lock ancora acquisito, nello stesso ordine
//! delle transizioni: l'observer è sincrono e non deve richiamare la pipeline.

use crate::comparison::ComparisonView;
use crate::error::ConvertError;
use crate::media::{MediaFile, MediaKind, MediaMetadata, OperationMode, ProcessedResult};
use crate::preview::{ComparisonPreviews, PreviewHandle};
use crate::probe::MetadataProbe;
use crate::request::{FormValues, RequestBuilder};
use crate::response::ResponseInterpreter;
use crate::service::ProcessingService;
use crate::session::{Phase, PipelineSession, SessionOutcome, SessionSnapshot};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Kind-specific behaviour of a pipeline
pub trait KindPolicy: Send + Sync + 'static {
    const KIND: MediaKind;

    /// Shown when a file of the wrong kind is selected
    fn validation_message() -> &'static str;

    fn accepts(file: &MediaFile) -> bool {
        file.mime().starts_with(Self::KIND.mime_prefix())
    }
}

#[derive(Debug)]
pub struct Image;

#[derive(Debug)]
pub struct Video;

impl KindPolicy for Image {
    const KIND: MediaKind = MediaKind::Image;

    fn validation_message() -> &'static str {
        "Please select a valid image file"
    }
}

impl KindPolicy for Video {
    const KIND: MediaKind = MediaKind::Video;

    fn validation_message() -> &'static str {
        "Please select a valid video file"
    }
}

pub type ImagePipeline = PipelineState<Image>;
pub type VideoPipeline = PipelineState<Video>;

/// Callback surface implemented by the presentation adapter
pub trait PipelineObserver: Send + Sync {
    fn phase_changed(&self, _kind: MediaKind, _phase: Phase) {}

    fn error_reported(&self, _kind: MediaKind, _message: &str) {}

    fn result_ready(&self, _kind: MediaKind, _processed: &MediaMetadata, _suggested_filename: &str) {}
}

/// Observer that ignores every notification
#[derive(Debug, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// What happened to a `submit` call that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The result is ready and the pipeline is in `Result`
    Completed,
    /// The pipeline was not in `Selected`; nothing was sent
    Ignored,
    /// The pipeline was reset or reselected while the request was in flight
    Discarded,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    session: Option<PipelineSession>,
    generation: u64,
    last_error: Option<String>,
}

/// Result of one exchange, before it is applied to the session
struct Exchange {
    result: ProcessedResult,
    processed: MediaMetadata,
    preview: Option<PreviewHandle>,
}

/// One conversion pipeline, parameterized over the media kind
pub struct PipelineState<K: KindPolicy> {
    inner: Arc<Mutex<Inner>>,
    probe: MetadataProbe,
    service: Arc<dyn ProcessingService>,
    observer: Arc<dyn PipelineObserver>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: KindPolicy> Clone for PipelineState<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            probe: self.probe.clone(),
            service: Arc::clone(&self.service),
            observer: Arc::clone(&self.observer),
            _kind: PhantomData,
        }
    }
}

impl<K: KindPolicy> PipelineState<K> {
    pub fn new(
        probe: MetadataProbe,
        service: Arc<dyn ProcessingService>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Idle,
                session: None,
                generation: 0,
                last_error: None,
            })),
            probe,
            service,
            observer,
            _kind: PhantomData,
        }
    }

    pub fn kind(&self) -> MediaKind {
        K::KIND
    }

    pub async fn phase(&self) -> Phase {
        self.inner.lock().await.phase
    }

    /// Message currently shown to the user, if any
    pub async fn last_error(&self) -> Option<String> {
        self.inner.lock().await.last_error.clone()
    }

    pub async fn original(&self) -> Option<MediaMetadata> {
        let inner = self.inner.lock().await;
        inner.session.as_ref().map(|s| s.original.clone())
    }

    pub async fn processed(&self) -> Option<MediaMetadata> {
        let inner = self.inner.lock().await;
        inner.session.as_ref().and_then(|s| s.processed().cloned())
    }

    /// Path of the processed payload's display handle
    pub async fn result_preview(&self) -> Option<PathBuf> {
        let inner = self.inner.lock().await;
        inner
            .session
            .as_ref()
            .and_then(|s| s.outcome.as_ref())
            .and_then(|o| o.preview.as_ref())
            .map(PreviewHandle::to_path_buf)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        let session = inner.session.as_ref();
        SessionSnapshot {
            phase: inner.phase,
            file_name: session.map(|s| s.file.name().to_string()),
            original: session.map(|s| s.original.clone()),
            processed: session.and_then(|s| s.processed().cloned()),
            suggested_filename: session
                .and_then(|s| s.result())
                .map(|r| r.suggested_filename.clone()),
            last_error: inner.last_error.clone(),
        }
    }

    /// Select a file, replacing any previous session.
    ///
    /// Fails with `Validation` when the declared MIME type belongs to the
    /// other pipeline (state is left untouched), `Busy` while a request is in
    /// flight, and `Superseded` when a reset or newer selection landed while
    /// this file was being probed.
    pub async fn select(&self, file: MediaFile) -> Result<MediaMetadata, ConvertError> {
        if !K::accepts(&file) {
            warn!("Rejected {} ({}) for the {} pipeline", file.name(), file.mime(), K::KIND);
            let err = ConvertError::Validation(K::validation_message().to_string());
            self.report_error(&err).await;
            return Err(err);
        }

        let generation = {
            let inner = self.inner.lock().await;
            if inner.phase == Phase::Processing {
                return Err(ConvertError::Busy);
            }
            inner.generation
        };

        let original = self.probe.probe(K::KIND, &file).await;

        let previous = {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                debug!("Selection of {} superseded while probing", file.name());
                return Err(ConvertError::Superseded);
            }
            if inner.phase == Phase::Processing {
                return Err(ConvertError::Busy);
            }

            info!("📁 Selected {} ({} bytes) for {}", file.name(), original.size_bytes, K::KIND);
            inner.generation += 1;
            inner.phase = Phase::Selected;
            inner.last_error = None;
            let previous = inner
                .session
                .replace(PipelineSession::new(file, original.clone()));
            self.observer.phase_changed(K::KIND, Phase::Selected);
            previous
        };
        // Releases the previous session's previews outside the lock
        drop(previous);

        Ok(original)
    }

    /// Submit the selected file for processing.
    ///
    /// Only valid from `Selected`; any other phase returns `Ignored`. On a
    /// service or transport failure the pipeline goes back to `Selected`
    /// with the original file and metadata intact, and the error is returned.
    pub async fn submit(&self, mode: OperationMode, form: &FormValues) -> Result<SubmitOutcome, ConvertError> {
        let (request, file, generation) = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            if !inner.phase.can_submit() {
                debug!("Ignoring submit for {} pipeline in phase {}", K::KIND, inner.phase);
                return Ok(SubmitOutcome::Ignored);
            }
            let Some(session) = inner.session.as_mut() else {
                return Ok(SubmitOutcome::Ignored);
            };

            let request = RequestBuilder::build(K::KIND, mode, form);
            session.request = Some(request.clone());
            let file = session.file.clone();
            inner.phase = Phase::Processing;
            inner.last_error = None;
            self.observer.phase_changed(K::KIND, Phase::Processing);
            (request, file, inner.generation)
        };
        info!("⚙️  {} {} -> {}", mode, file.name(), request.target_format);

        let exchange = self.exchange(&request, &file).await;

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.generation != generation || inner.phase != Phase::Processing {
            debug!("Discarding stale {} response for {}", K::KIND, file.name());
            return Ok(SubmitOutcome::Discarded);
        }

        match exchange {
            Ok(completed) => {
                let Some(session) = inner.session.as_mut() else {
                    inner.phase = Phase::Idle;
                    return Ok(SubmitOutcome::Discarded);
                };
                let processed = completed.processed.clone();
                let filename = completed.result.suggested_filename.clone();
                session.outcome = Some(SessionOutcome {
                    processed: completed.processed,
                    result: completed.result,
                    preview: completed.preview,
                });
                inner.phase = Phase::Result;

                info!("✅ {} ready ({} bytes)", filename, processed.size_bytes);
                self.observer.phase_changed(K::KIND, Phase::Result);
                self.observer.result_ready(K::KIND, &processed, &filename);
                Ok(SubmitOutcome::Completed)
            }
            Err(err) => {
                let message = err.user_message();
                inner.phase = Phase::Selected;
                inner.last_error = Some(message.clone());

                warn!("❌ {} processing failed: {}", K::KIND, err);
                self.observer.phase_changed(K::KIND, Phase::Selected);
                self.observer.error_reported(K::KIND, &message);
                Err(err)
            }
        }
    }

    async fn exchange(
        &self,
        request: &crate::media::OperationRequest,
        file: &MediaFile,
    ) -> Result<Exchange, ConvertError> {
        let response = self.service.process(request, file).await?;
        let result = ResponseInterpreter::interpret(K::KIND, response)?;
        debug!("📥 Received {} ({} bytes)", result.suggested_filename, result.size());

        // The requested target format is authoritative over the probed one
        let result_file = result.as_media_file(K::KIND, &request.target_format);
        let processed = self
            .probe
            .probe(K::KIND, &result_file)
            .await
            .with_format(&request.target_format);

        let preview = match PreviewHandle::create(&result_file).await {
            Ok(preview) => Some(preview),
            Err(e) => {
                warn!("Could not create preview for {}: {}", result.suggested_filename, e);
                None
            }
        };

        Ok(Exchange {
            result,
            processed,
            preview,
        })
    }

    /// Discard file, metadata, result and previews; back to `Idle`
    pub async fn reset(&self) {
        let previous = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.phase = Phase::Idle;
            inner.last_error = None;
            debug!("🔄 {} pipeline reset", K::KIND);
            self.observer.phase_changed(K::KIND, Phase::Idle);
            inner.session.take()
        };
        drop(previous);
    }

    /// Before/after metrics for the completed session
    pub async fn compare(&self) -> Result<ComparisonView, ConvertError> {
        let inner = self.inner.lock().await;
        inner
            .session
            .as_ref()
            .and_then(PipelineSession::compare)
            .filter(|_| inner.phase == Phase::Result)
            .ok_or(ConvertError::InvalidPhase {
                expected: Phase::Result,
                actual: inner.phase,
            })
    }

    /// Open the comparison overlay: metrics plus side-by-side previews.
    ///
    /// Previews from a previous overlay are released first.
    pub async fn open_comparison(&self) -> Result<(ComparisonView, PathBuf, PathBuf), ConvertError> {
        let (view, original_file, processed_file, generation) = {
            let mut inner = self.inner.lock().await;
            let phase = inner.phase;
            let generation = inner.generation;
            let session = inner
                .session
                .as_mut()
                .filter(|_| phase == Phase::Result)
                .ok_or(ConvertError::InvalidPhase {
                    expected: Phase::Result,
                    actual: phase,
                })?;
            let (Some(view), Some(outcome)) = (session.compare(), session.outcome.as_ref()) else {
                return Err(ConvertError::InvalidPhase {
                    expected: Phase::Result,
                    actual: phase,
                });
            };
            let processed_file = outcome
                .result
                .as_media_file(K::KIND, &outcome.processed.format);
            let original_file = session.file.clone();
            drop(session.comparison.take());
            (view, original_file, processed_file, generation)
        };

        let previews = ComparisonPreviews {
            original: PreviewHandle::create(&original_file).await?,
            processed: PreviewHandle::create(&processed_file).await?,
        };
        let paths = (previews.original.to_path_buf(), previews.processed.to_path_buf());

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.phase != Phase::Result {
            return Err(ConvertError::Superseded);
        }
        if let Some(session) = inner.session.as_mut() {
            session.comparison = Some(previews);
        }
        Ok((view, paths.0, paths.1))
    }

    /// Close the comparison overlay, releasing its previews
    pub async fn close_comparison(&self) {
        let previews = {
            let mut inner = self.inner.lock().await;
            inner.session.as_mut().and_then(|s| s.comparison.take())
        };
        drop(previews);
    }

    /// Payload and suggested filename of the completed session
    pub async fn download(&self) -> Result<(Arc<[u8]>, String), ConvertError> {
        let inner = self.inner.lock().await;
        inner
            .session
            .as_ref()
            .and_then(PipelineSession::result)
            .filter(|_| inner.phase == Phase::Result)
            .map(|r| (Arc::clone(&r.payload), r.suggested_filename.clone()))
            .ok_or(ConvertError::InvalidPhase {
                expected: Phase::Result,
                actual: inner.phase,
            })
    }

    /// Write the result into `dir` under its suggested name
    pub async fn save_result(&self, dir: &Path) -> Result<PathBuf, ConvertError> {
        let (payload, filename) = self.download().await?;
        // Only the final component of a server-supplied name is trusted
        let filename = Path::new(&filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| K::KIND.default_filename().into());

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, &payload[..]).await?;
        info!("💾 Saved {}", path.display());
        Ok(path)
    }

    async fn report_error(&self, err: &ConvertError) {
        let message = err.user_message();
        let mut inner = self.inner.lock().await;
        inner.last_error = Some(message.clone());
        self.observer.error_reported(K::KIND, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ServiceResponse;
    use async_trait::async_trait;
    use image::{ImageBuffer, ImageOutputFormat, Rgb};
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION};
    use reqwest::StatusCode;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, Rgb([200, 10, 10]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    fn ok_response(filename: &str, body: Vec<u8>) -> ServiceResponse {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)).unwrap(),
        );
        ServiceResponse::new(StatusCode::OK, headers, body)
    }

    fn error_response(status: u16, body: &str) -> ServiceResponse {
        ServiceResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            body.as_bytes().to_vec(),
        )
    }

    /// Replies with a fixed exchange, optionally waiting for a release signal
    struct ScriptedService {
        reply: StdMutex<Option<Result<ServiceResponse, String>>>,
        calls: AtomicUsize,
        seen: StdMutex<Vec<crate::media::OperationRequest>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedService {
        fn new(reply: Result<ServiceResponse, String>) -> Self {
            Self {
                reply: StdMutex::new(Some(reply)),
                calls: AtomicUsize::new(0),
                seen: StdMutex::new(Vec::new()),
                gate: None,
            }
        }

        fn gated(reply: Result<ServiceResponse, String>, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(reply)
            }
        }
    }

    #[async_trait]
    impl ProcessingService for ScriptedService {
        async fn process(
            &self,
            request: &crate::media::OperationRequest,
            _file: &MediaFile,
        ) -> Result<ServiceResponse, ConvertError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let reply = self.reply.lock().unwrap().clone();
            match reply {
                Some(Ok(response)) => Ok(response),
                Some(Err(message)) => Err(ConvertError::Processing(message)),
                None => Err(ConvertError::Processing("no reply scripted".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        phases: StdMutex<Vec<Phase>>,
        errors: StdMutex<Vec<String>>,
        results: StdMutex<Vec<String>>,
    }

    impl PipelineObserver for RecordingObserver {
        fn phase_changed(&self, _kind: MediaKind, phase: Phase) {
            self.phases.lock().unwrap().push(phase);
        }

        fn error_reported(&self, _kind: MediaKind, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }

        fn result_ready(&self, _kind: MediaKind, _processed: &MediaMetadata, suggested_filename: &str) {
            self.results.lock().unwrap().push(suggested_filename.to_string());
        }
    }

    fn image_pipeline(service: Arc<ScriptedService>) -> (ImagePipeline, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = ImagePipeline::new(MetadataProbe::default(), service, observer.clone());
        (pipeline, observer)
    }

    fn photo(width: u32, height: u32) -> MediaFile {
        MediaFile::new("photo.png", "image/png", png_bytes(width, height))
    }

    async fn wait_for_phase<K: KindPolicy>(pipeline: &PipelineState<K>, phase: Phase) {
        for _ in 0..200 {
            if pipeline.phase().await == phase {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("pipeline never reached {}", phase);
    }

    #[tokio::test]
    async fn test_convert_scenario_reaches_result() {
        let service = Arc::new(ScriptedService::new(Ok(ok_response("photo.webp", png_bytes(40, 30)))));
        let (pipeline, observer) = image_pipeline(service.clone());
        let file = photo(80, 60);
        let original_size = file.size();

        let original = pipeline.select(file).await.unwrap();
        assert_eq!(original.format, "PNG");
        assert_eq!(original.size_bytes, original_size);
        assert_eq!(original.dimensions(), Some((80, 60)));
        assert_eq!(pipeline.phase().await, Phase::Selected);

        let outcome = pipeline
            .submit(OperationMode::Convert, &FormValues::convert("webp", 80))
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Completed);
        assert_eq!(pipeline.phase().await, Phase::Result);

        let processed = pipeline.processed().await.unwrap();
        assert_eq!(processed.format, "WEBP");
        assert_eq!(processed.dimensions(), Some((40, 30)));

        let sent = service.seen.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].route(), "/api/image/convert");
        assert_eq!(sent[0].parameters["quality"], "80");

        let (payload, filename) = pipeline.download().await.unwrap();
        assert_eq!(filename, "photo.webp");
        assert_eq!(payload.len() as u64, processed.size_bytes);

        assert_eq!(
            *observer.phases.lock().unwrap(),
            vec![Phase::Selected, Phase::Processing, Phase::Result]
        );
        assert_eq!(*observer.results.lock().unwrap(), vec!["photo.webp".to_string()]);
    }

    #[tokio::test]
    async fn test_service_rejection_reverts_to_selected() {
        let service = Arc::new(ScriptedService::new(Ok(error_response(
            422,
            r#"{"detail":"size target too small"}"#,
        ))));
        let (pipeline, observer) = image_pipeline(service);
        let original = pipeline.select(photo(16, 16)).await.unwrap();

        let err = pipeline
            .submit(OperationMode::Compress, &FormValues::compress("jpg", 100))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "size target too small");
        assert_eq!(pipeline.phase().await, Phase::Selected);
        assert_eq!(pipeline.last_error().await.as_deref(), Some("size target too small"));
        assert_eq!(pipeline.original().await, Some(original));
        assert_eq!(pipeline.processed().await, None);
        assert_eq!(*observer.errors.lock().unwrap(), vec!["size target too small".to_string()]);
    }

    #[tokio::test]
    async fn test_transport_failure_allows_retry() {
        let service = Arc::new(ScriptedService::new(Err("connection refused".to_string())));
        let (pipeline, _) = image_pipeline(service.clone());
        assert_ok!(pipeline.select(photo(4, 4)).await);

        let form = FormValues::convert("png", 90);
        assert_err!(pipeline.submit(OperationMode::Convert, &form).await);
        assert_eq!(pipeline.phase().await, Phase::Selected);

        *service.reply.lock().unwrap() = Some(Ok(ok_response("photo.png", png_bytes(4, 4))));
        let outcome = pipeline.submit(OperationMode::Convert, &form).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Completed);
        assert_eq!(pipeline.last_error().await, None);
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wrong_kind_never_selects() {
        let service = Arc::new(ScriptedService::new(Err("unused".to_string())));
        let (pipeline, observer) = image_pipeline(service);

        let clip = MediaFile::new("clip.mp4", "video/mp4", vec![0u8; 32]);
        let err = pipeline.select(clip).await.unwrap_err();
        assert!(matches!(err, ConvertError::Validation(_)));
        assert_eq!(err.to_string(), "Please select a valid image file");
        assert_eq!(pipeline.phase().await, Phase::Idle);
        assert!(pipeline.original().await.is_none());
        assert!(observer.phases.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_outside_selected_is_ignored() {
        let service = Arc::new(ScriptedService::new(Ok(ok_response("x.png", png_bytes(2, 2)))));
        let (pipeline, _) = image_pipeline(service.clone());
        let form = FormValues::convert("png", 50);

        assert_eq!(
            pipeline.submit(OperationMode::Convert, &form).await.unwrap(),
            SubmitOutcome::Ignored
        );

        pipeline.select(photo(2, 2)).await.unwrap();
        pipeline.submit(OperationMode::Convert, &form).await.unwrap();
        assert_eq!(pipeline.phase().await, Phase::Result);
        assert_eq!(
            pipeline.submit(OperationMode::Convert, &form).await.unwrap(),
            SubmitOutcome::Ignored
        );
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_submit_while_processing_is_noop() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(ScriptedService::gated(
            Ok(ok_response("photo.webp", png_bytes(2, 2))),
            gate.clone(),
        ));
        let (pipeline, _) = image_pipeline(service.clone());
        pipeline.select(photo(2, 2)).await.unwrap();

        let form = FormValues::convert("webp", 70);
        let first = {
            let pipeline = pipeline.clone();
            let form = form.clone();
            tokio::spawn(async move { pipeline.submit(OperationMode::Convert, &form).await })
        };
        wait_for_phase(&pipeline, Phase::Processing).await;

        let second = pipeline.submit(OperationMode::Convert, &form).await.unwrap();
        assert_eq!(second, SubmitOutcome::Ignored);
        assert!(matches!(pipeline.select(photo(3, 3)).await, Err(ConvertError::Busy)));

        gate.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), SubmitOutcome::Completed);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_during_processing_discards_response() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(ScriptedService::gated(
            Ok(ok_response("old.webp", png_bytes(2, 2))),
            gate.clone(),
        ));
        let (pipeline, observer) = image_pipeline(service);
        pipeline.select(photo(2, 2)).await.unwrap();

        let in_flight = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .submit(OperationMode::Convert, &FormValues::convert("webp", 70))
                    .await
            })
        };
        wait_for_phase(&pipeline, Phase::Processing).await;

        pipeline.reset().await;
        let fresh = pipeline.select(photo(9, 9)).await.unwrap();
        gate.notify_one();

        assert_eq!(in_flight.await.unwrap().unwrap(), SubmitOutcome::Discarded);
        assert_eq!(pipeline.phase().await, Phase::Selected);
        assert_eq!(pipeline.original().await, Some(fresh));
        assert_eq!(pipeline.processed().await, None);

        // The dropped response produces no notification
        assert_eq!(
            *observer.phases.lock().unwrap(),
            vec![Phase::Selected, Phase::Processing, Phase::Idle, Phase::Selected]
        );
        assert!(observer.results.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_observer_ends_on_current_phase_under_contention() {
        for _ in 0..50 {
            let service = Arc::new(ScriptedService::new(Ok(ok_response("photo.png", png_bytes(2, 2)))));
            let (pipeline, observer) = image_pipeline(service);
            pipeline.select(photo(2, 2)).await.unwrap();

            let submitting = {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    pipeline
                        .submit(OperationMode::Convert, &FormValues::convert("png", 70))
                        .await
                })
            };
            let resetting = {
                let pipeline = pipeline.clone();
                tokio::spawn(async move { pipeline.reset().await })
            };
            submitting.await.unwrap().unwrap();
            resetting.await.unwrap();

            let last_seen = observer.phases.lock().unwrap().last().copied();
            assert_eq!(last_seen, Some(pipeline.phase().await));
        }
    }

    /// Stand-in for ffprobe that stalls on `.mov` inputs and always fails
    #[cfg(unix)]
    fn stalling_ffprobe(dir: &Path) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("stalling-ffprobe");
        let script = "#!/bin/sh\n\
            for arg in \"$@\"; do last=\"$arg\"; done\n\
            case \"$last\" in *.mov) sleep 1 ;; esac\n\
            exit 1\n";
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    fn stalling_video_pipeline(dir: &Path) -> (VideoPipeline, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = VideoPipeline::new(
            MetadataProbe::new(stalling_ffprobe(dir), Duration::from_secs(10)),
            Arc::new(ScriptedService::new(Err("unused".to_string()))),
            observer.clone(),
        );
        (pipeline, observer)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reset_while_probing_supersedes_selection() {
        let dir = tempfile::TempDir::new().unwrap();
        let (pipeline, observer) = stalling_video_pipeline(dir.path());

        let selecting = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .select(MediaFile::new("slow.mov", "video/quicktime", vec![0u8; 16]))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;
        pipeline.reset().await;

        assert!(matches!(selecting.await.unwrap(), Err(ConvertError::Superseded)));
        assert_eq!(pipeline.phase().await, Phase::Idle);
        assert!(pipeline.snapshot().await.file_name.is_none());
        assert_eq!(*observer.phases.lock().unwrap(), vec![Phase::Idle]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_overlapping_selects_keep_first_commit() {
        let dir = tempfile::TempDir::new().unwrap();
        let (pipeline, observer) = stalling_video_pipeline(dir.path());

        let slow = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .select(MediaFile::new("slow.mov", "video/quicktime", vec![0u8; 16]))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;

        let fast = pipeline
            .select(MediaFile::new("fast.mp4", "video/mp4", vec![0u8; 32]))
            .await
            .unwrap();
        assert_eq!(fast.format, "MP4");

        assert!(matches!(slow.await.unwrap(), Err(ConvertError::Superseded)));
        let snapshot = pipeline.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Selected);
        assert_eq!(snapshot.file_name.as_deref(), Some("fast.mp4"));
        assert_eq!(snapshot.original, Some(fast));
        assert_eq!(*observer.phases.lock().unwrap(), vec![Phase::Selected]);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let service = Arc::new(ScriptedService::new(Ok(ok_response("photo.webp", png_bytes(5, 5)))));
        let (pipeline, _) = image_pipeline(service);
        pipeline.select(photo(5, 5)).await.unwrap();
        pipeline
            .submit(OperationMode::Convert, &FormValues::convert("webp", 80))
            .await
            .unwrap();
        let preview = pipeline.result_preview().await.unwrap();
        assert!(preview.exists());
        let (_, original_preview, processed_preview) = pipeline.open_comparison().await.unwrap();
        assert!(original_preview.exists() && processed_preview.exists());

        pipeline.reset().await;
        let snapshot = pipeline.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Idle);
        assert!(snapshot.file_name.is_none());
        assert!(snapshot.original.is_none());
        assert!(snapshot.processed.is_none());
        assert!(snapshot.suggested_filename.is_none());
        assert!(!preview.exists());
        assert!(!original_preview.exists());
        assert!(!processed_preview.exists());
        assert!(pipeline.compare().await.is_err());

        let original = pipeline.select(photo(7, 3)).await.unwrap();
        assert_eq!(original.dimensions(), Some((7, 3)));
        assert_eq!(pipeline.phase().await, Phase::Selected);
        assert_eq!(pipeline.processed().await, None);
    }

    #[tokio::test]
    async fn test_comparison_overlay_lifecycle() {
        let service = Arc::new(ScriptedService::new(Ok(ok_response("photo.webp", png_bytes(10, 10)))));
        let (pipeline, _) = image_pipeline(service);
        assert!(matches!(
            pipeline.open_comparison().await,
            Err(ConvertError::InvalidPhase { actual: Phase::Idle, .. })
        ));

        pipeline.select(photo(20, 20)).await.unwrap();
        pipeline
            .submit(OperationMode::Convert, &FormValues::convert("webp", 80))
            .await
            .unwrap();

        let view = pipeline.compare().await.unwrap();
        assert_eq!(view.processed.format, "WEBP");
        assert_eq!(view.original.dimensions, Some((20, 20)));

        let (_, first_original, first_processed) = pipeline.open_comparison().await.unwrap();
        let (_, second_original, _) = pipeline.open_comparison().await.unwrap();
        assert!(!first_original.exists());
        assert!(!first_processed.exists());
        assert!(second_original.exists());

        pipeline.close_comparison().await;
        assert!(!second_original.exists());
        assert_eq!(pipeline.phase().await, Phase::Result);
    }

    #[tokio::test]
    async fn test_save_result_uses_final_component() {
        let service = Arc::new(ScriptedService::new(Ok(ok_response("../../evil.webp", vec![1, 2, 3]))));
        let (pipeline, _) = image_pipeline(service);
        pipeline.select(photo(2, 2)).await.unwrap();
        pipeline
            .submit(OperationMode::Convert, &FormValues::convert("webp", 80))
            .await
            .unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let path = pipeline.save_result(dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("evil.webp"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), vec![1, 2, 3]);

        // Undecodable payload still reports the requested format
        let processed = pipeline.processed().await.unwrap();
        assert_eq!(processed.format, "WEBP");
        assert_eq!(processed.dimensions(), None);
    }

    #[tokio::test]
    async fn test_video_pipeline_routes_and_validates() {
        let service = Arc::new(ScriptedService::new(Ok(error_response(500, "oops"))));
        let pipeline = VideoPipeline::new(
            MetadataProbe::new("definitely-not-ffprobe-7f3a", Duration::from_secs(2)),
            service.clone(),
            Arc::new(NoopObserver),
        );

        let err = pipeline.select(photo(2, 2)).await.unwrap_err();
        assert_eq!(err.to_string(), "Please select a valid video file");

        let original = pipeline
            .select(MediaFile::new("clip.mp4", "video/mp4", vec![0u8; 64]))
            .await
            .unwrap();
        assert_eq!(original.format, "MP4");
        assert_eq!(original.duration_seconds, None);

        let form = FormValues::compress("webm", 5).with_codec("libvpx-vp9");
        let err = pipeline.submit(OperationMode::Compress, &form).await.unwrap_err();
        assert_eq!(err.to_string(), "Processing failed");

        let sent = service.seen.lock().unwrap().clone();
        assert_eq!(sent[0].route(), "/api/video/compress");
        assert_eq!(sent[0].parameters["target_size_mb"], "5");
        assert_eq!(sent[0].parameters["codec"], "libvpx-vp9");
    }
}
