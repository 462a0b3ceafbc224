use std::future::Future;
use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, watch};
use tracing::{Instrument as _, debug, info, info_span, warn};

use crate::chunking::ChunkingStrategy;
use crate::command::{CommandKind, CommandRequest};
use crate::errors::{ProviderError, RelayError};
use crate::model::{ProviderId, RelayOptions};
use crate::prompt::TemplateRegistry;
use crate::provider::{FragmentStream, LlmProvider, ProviderReply, ProviderRequest};
use crate::registry::ProviderRegistry;
use crate::session::Session;
use crate::stream::StreamEvent;

/// Handle used to request cancellation of a running relay.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// A consumer that is still reading sees `end{success:false}`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Relays AI commands to providers and turns their output into [`StreamEvent`]s.
///
/// Cheap to clone; every request runs on its own spawned task.
#[derive(Clone)]
pub struct Relay {
    registry: ProviderRegistry,
    templates: Arc<TemplateRegistry>,
    options: RelayOptions,
}

impl Relay {
    pub fn new(registry: ProviderRegistry, templates: TemplateRegistry, options: RelayOptions) -> Self {
        Self {
            registry,
            templates: Arc::new(templates),
            options,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Validates the request and starts relaying it.
    ///
    /// Every error returned here happens before `start` is emitted. Once a
    /// [`RelayStream`] is returned the outcome is reported in-band by the
    /// final `end` event.
    pub fn start(
        &self,
        session: Option<&Session>,
        request: CommandRequest,
    ) -> Result<RelayStream, RelayError> {
        Ok(self.prepare(session, request)?.spawn())
    }

    /// Runs every pre-stream check and builds the provider request without
    /// contacting the provider.
    pub fn prepare(
        &self,
        session: Option<&Session>,
        request: CommandRequest,
    ) -> Result<PreparedRelay, RelayError> {
        let session = session
            .ok_or_else(|| RelayError::Authentication("a valid session is required".into()))?;
        request.validate()?;
        let provider = self.registry.resolve(request.provider.as_ref())?;
        let prompt = self.templates.assemble(&request)?;

        let provider_request = ProviderRequest {
            request_id: uuid::Uuid::new_v4(),
            model: provider.default_model().to_string(),
            prompt,
            params: provider.generation_params().for_command(request.command),
        };
        Ok(PreparedRelay {
            provider,
            request: provider_request,
            command: request.command,
            user_id: session.user_id.clone(),
            options: self.options.clone(),
        })
    }
}

/// A validated request that has not been sent anywhere yet.
pub struct PreparedRelay {
    provider: Arc<dyn LlmProvider>,
    request: ProviderRequest,
    command: CommandKind,
    user_id: String,
    options: RelayOptions,
}

impl PreparedRelay {
    pub fn request_id(&self) -> uuid::Uuid {
        self.request.request_id
    }

    pub fn provider(&self) -> ProviderId {
        self.provider.id()
    }

    /// Spawns the relay task. `start` is the first event on the returned stream.
    pub fn spawn(self) -> RelayStream {
        let request_id = self.request.request_id;
        let provider_id = self.provider.id();
        info!(
            request_id = %request_id,
            user_id = %self.user_id,
            command = %self.command,
            provider = %provider_id,
            model = %self.request.model,
            "starting relay"
        );

        let (tx, rx) = mpsc::channel(self.options.stream_buffer_capacity.max(1));
        let (abort_tx, abort_rx) = watch::channel(false);
        let span = info_span!("relay", request_id = %request_id, provider = %provider_id, command = %self.command);
        let task = RelayTask {
            provider: self.provider,
            request: self.request,
            command: self.command,
            options: self.options,
            tx,
            abort_rx,
            delivered: 0,
        };
        tokio::spawn(task.run().instrument(span));

        RelayStream {
            request_id,
            provider: provider_id,
            rx,
            abort_handle: AbortHandle { tx: abort_tx },
            saw_terminal: false,
        }
    }
}

/// Consumer side of one relay invocation.
///
/// Dropping it cancels the relay.
pub struct RelayStream {
    request_id: uuid::Uuid,
    provider: ProviderId,
    rx: mpsc::Receiver<StreamEvent>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl RelayStream {
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Returns the next event, or `None` once `end` has been delivered.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.saw_terminal {
            return None;
        }
        let event = self.rx.recv().await;
        if event.as_ref().is_some_and(StreamEvent::is_terminal) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains the stream and returns every event in order.
    pub async fn collect(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    /// Hands the raw receiver to a transport layer (for example an SSE body).
    pub fn into_receiver(self) -> mpsc::Receiver<StreamEvent> {
        self.rx
    }
}

enum AttemptOutcome {
    Finished,
    Failed(ProviderError),
    Cancelled,
}

struct RelayTask {
    provider: Arc<dyn LlmProvider>,
    request: ProviderRequest,
    command: CommandKind,
    options: RelayOptions,
    tx: mpsc::Sender<StreamEvent>,
    abort_rx: watch::Receiver<bool>,
    /// `data` events handed to the consumer so far.
    delivered: usize,
}

impl RelayTask {
    async fn run(mut self) {
        if !self.deliver(StreamEvent::Start { command: self.command }).await {
            debug!("consumer left before start");
            return;
        }

        let policy = self.options.retry.clone();
        let mut attempt = 0_u32;
        let failure = loop {
            match self.attempt(attempt).await {
                AttemptOutcome::Finished => break None,
                AttemptOutcome::Cancelled => {
                    self.finish_cancelled().await;
                    return;
                }
                AttemptOutcome::Failed(err)
                    if err.is_retryable() && self.delivered == 0 && policy.can_retry(attempt) =>
                {
                    let delay = policy.backoff_duration(attempt);
                    let retry_after = match &err {
                        ProviderError::RateLimited { retry_after, .. } => *retry_after,
                        _ => None,
                    };
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        retry_after_s = retry_after.map(|d| d.as_secs()),
                        "provider rate limited; backing off"
                    );
                    let slept =
                        guarded(&self.tx, &mut self.abort_rx, tokio::time::sleep(delay)).await;
                    if slept.is_none() {
                        self.finish_cancelled().await;
                        return;
                    }
                    attempt += 1;
                }
                AttemptOutcome::Failed(err) => break Some(err),
            }
        };

        let end = match failure {
            None => {
                info!(attempts = attempt + 1, data_events = self.delivered, "relay completed");
                StreamEvent::success()
            }
            Some(err) => {
                warn!(attempts = attempt + 1, data_events = self.delivered, error = %err, "relay failed");
                StreamEvent::failure(end_message(&err, attempt))
            }
        };
        self.deliver(end).await;
    }

    async fn attempt(&mut self, attempt: u32) -> AttemptOutcome {
        debug!(attempt, "calling provider");
        let timeout = self.options.attempt_timeout;
        let call = tokio::time::timeout(timeout, self.provider.complete(self.request.clone()));
        let reply = match guarded(&self.tx, &mut self.abort_rx, call).await {
            None => return AttemptOutcome::Cancelled,
            Some(Err(_elapsed)) => return AttemptOutcome::Failed(self.timed_out()),
            Some(Ok(Err(err))) => return AttemptOutcome::Failed(err),
            Some(Ok(Ok(reply))) => reply,
        };

        match reply {
            ProviderReply::Complete(text) => {
                let chunking = self.provider.chunking();
                self.relay_complete(&text, chunking).await
            }
            ProviderReply::Stream(stream) => self.relay_stream(stream).await,
        }
    }

    async fn relay_complete(&mut self, text: &str, chunking: ChunkingStrategy) -> AttemptOutcome {
        for piece in chunking.split(text) {
            if !self.emit(StreamEvent::data(piece)).await {
                return AttemptOutcome::Cancelled;
            }
            self.delivered += 1;
        }
        AttemptOutcome::Finished
    }

    async fn relay_stream(&mut self, mut stream: FragmentStream) -> AttemptOutcome {
        let timeout = self.options.attempt_timeout;
        loop {
            let next = tokio::time::timeout(timeout, stream.next());
            match guarded(&self.tx, &mut self.abort_rx, next).await {
                None => return AttemptOutcome::Cancelled,
                Some(Err(_elapsed)) => return AttemptOutcome::Failed(self.timed_out()),
                Some(Ok(None)) => return AttemptOutcome::Finished,
                Some(Ok(Some(Err(err)))) => return AttemptOutcome::Failed(err),
                Some(Ok(Some(Ok(fragment)))) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    if !self.emit(StreamEvent::data(fragment)).await {
                        return AttemptOutcome::Cancelled;
                    }
                    self.delivered += 1;
                }
            }
        }
    }

    fn timed_out(&self) -> ProviderError {
        ProviderError::Timeout {
            provider: self.provider.id(),
            after: self.options.attempt_timeout,
        }
    }

    /// Sends a `data` event unless the consumer is gone or the relay was aborted.
    async fn emit(&mut self, event: StreamEvent) -> bool {
        matches!(
            guarded(&self.tx, &mut self.abort_rx, self.tx.send(event)).await,
            Some(Ok(()))
        )
    }

    /// Sends an event that must reach a consumer who is still reading,
    /// aborted or not. Waits for buffer space.
    async fn deliver(&self, event: StreamEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    async fn finish_cancelled(&self) {
        if self.tx.is_closed() {
            info!(data_events = self.delivered, "consumer disconnected; relay stopped");
            return;
        }
        info!(data_events = self.delivered, "relay aborted");
        self.deliver(StreamEvent::failure("request cancelled")).await;
    }
}

/// Runs `fut` unless the consumer disconnects or an abort is requested first.
async fn guarded<F: Future>(
    tx: &mpsc::Sender<StreamEvent>,
    abort_rx: &mut watch::Receiver<bool>,
    fut: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = tx.closed() => None,
        _ = aborted(abort_rx) => None,
        out = fut => Some(out),
    }
}

async fn aborted(abort_rx: &mut watch::Receiver<bool>) {
    let sender_gone = abort_rx.wait_for(|requested| *requested).await.is_err();
    if sender_gone {
        // every AbortHandle is gone; only a disconnect can stop us now
        std::future::pending::<()>().await;
    }
}

fn end_message(err: &ProviderError, retries: u32) -> String {
    match err {
        ProviderError::RateLimited { provider, .. } if retries > 0 => format!(
            "{provider} is rate limiting requests (gave up after {} attempts); try again later",
            retries + 1
        ),
        ProviderError::RateLimited { provider, .. } => {
            format!("{provider} is rate limiting requests; try again later")
        }
        ProviderError::Authentication { provider, .. } => {
            format!("{provider} rejected the server's credentials")
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FileContext;
    use crate::model::{FIX_TEMPERATURE, GenerationParams};
    use crate::policy::RetryPolicy;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    enum Step {
        Fail(ProviderError),
        Complete(&'static str),
        Fragments(Vec<Result<&'static str, ProviderError>>),
        Hang,
    }

    /// Plays back scripted replies and records when and how it was called.
    struct ScriptedProvider {
        chunking: ChunkingStrategy,
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<(Instant, ProviderRequest)>>,
    }

    impl ScriptedProvider {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                chunking: ChunkingStrategy::fixed_size(5),
                steps: Mutex::new(steps.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.calls.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        fn id(&self) -> ProviderId {
            ProviderId::new("gemini")
        }

        fn default_model(&self) -> &str {
            "scripted-1"
        }

        fn generation_params(&self) -> GenerationParams {
            GenerationParams::default()
        }

        fn chunking(&self) -> ChunkingStrategy {
            self.chunking
        }

        async fn complete(&self, req: ProviderRequest) -> Result<ProviderReply, ProviderError> {
            self.calls.lock().unwrap().push((Instant::now(), req));
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Fail(err)) => Err(err),
                Some(Step::Complete(text)) => Ok(ProviderReply::Complete(text.to_string())),
                Some(Step::Fragments(items)) => {
                    let items: Vec<Result<String, ProviderError>> =
                        items.into_iter().map(|r| r.map(str::to_string)).collect();
                    Ok(ProviderReply::Stream(Box::pin(stream::iter(items))))
                }
                Some(Step::Hang) | None => std::future::pending().await,
            }
        }
    }

    fn rate_limited() -> ProviderError {
        ProviderError::rate_limited("gemini", "HTTP 429: quota", None)
    }

    fn session() -> Session {
        Session::new("user-1", "token-1", chrono::Utc::now() + chrono::Duration::hours(1))
    }

    fn relay_with(provider: Arc<ScriptedProvider>, options: RelayOptions) -> Relay {
        let registry = ProviderRegistry::builder()
            .register_provider(provider)
            .build()
            .expect("registry");
        Relay::new(
            registry,
            TemplateRegistry::with_defaults().expect("templates"),
            options,
        )
    }

    fn relay(provider: Arc<ScriptedProvider>) -> Relay {
        relay_with(provider, RelayOptions::default())
    }

    fn explain() -> CommandRequest {
        CommandRequest::new(CommandKind::Explain, "what does this do?")
    }

    fn data_text(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Data { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Reads the raw channel the way the SSE body does, until the task lets go.
    async fn drain(stream: RelayStream) -> Vec<StreamEvent> {
        let mut rx = stream.into_receiver();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn assert_well_formed(events: &[StreamEvent]) {
        assert!(matches!(events.first(), Some(StreamEvent::Start { .. })));
        assert!(events.last().is_some_and(StreamEvent::is_terminal));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, StreamEvent::Start { .. }))
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn streamed_fragments_are_forwarded_in_order() {
        let provider = ScriptedProvider::new(vec![Step::Fragments(vec![
            Ok("fn "),
            Ok(""),
            Ok("main"),
            Ok("() {}"),
        ])]);
        let stream = relay(provider.clone())
            .start(Some(&session()), explain())
            .unwrap();
        let events = drain(stream).await;

        assert_well_formed(&events);
        assert_eq!(
            events,
            vec![
                StreamEvent::Start {
                    command: CommandKind::Explain
                },
                StreamEvent::data("fn "),
                StreamEvent::data("main"),
                StreamEvent::data("() {}"),
                StreamEvent::success(),
            ]
        );
        assert_eq!(provider.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn complete_reply_is_chunked_and_reassembles() {
        let text = "fn add(a: i32, b: i32) -> i32 { a + b }";
        let provider = ScriptedProvider::new(vec![Step::Complete(text)]);
        let stream = relay(provider)
            .start(Some(&session()), explain())
            .unwrap();
        let events = drain(stream).await;

        assert_well_formed(&events);
        let pieces = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Data { .. }))
            .count();
        assert_eq!(pieces, text.chars().count().div_ceil(5));
        assert_eq!(data_text(&events), text);
        assert_eq!(events.last(), Some(&StreamEvent::success()));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_back_off_exponentially_then_succeed() {
        let provider = ScriptedProvider::new(vec![
            Step::Fail(rate_limited()),
            Step::Fail(rate_limited()),
            Step::Complete("done"),
        ]);
        let started = Instant::now();
        let events = relay(provider.clone())
            .start(Some(&session()), explain())
            .unwrap()
            .collect()
            .await;

        assert_well_formed(&events);
        assert_eq!(
            events,
            vec![
                StreamEvent::Start {
                    command: CommandKind::Explain
                },
                StreamEvent::data("done"),
                StreamEvent::success(),
            ]
        );
        let offsets: Vec<Duration> = provider
            .call_times()
            .into_iter()
            .map(|at| at - started)
            .collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_millis(2_000),
                Duration::from_millis(6_000)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_make_max_retries_plus_one_attempts() {
        let provider = ScriptedProvider::new((0..10).map(|_| Step::Fail(rate_limited())).collect());
        let events = relay(provider.clone())
            .start(Some(&session()), explain())
            .unwrap()
            .collect()
            .await;

        assert_well_formed(&events);
        assert_eq!(provider.call_times().len(), 4);
        assert_eq!(events.len(), 2);
        match events.last() {
            Some(StreamEvent::End {
                success: false,
                error: Some(message),
            }) => assert!(message.contains("rate limiting")),
            other => panic!("unexpected terminal event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fix_with_one_rate_limit_waits_initial_delay_once() {
        let provider = ScriptedProvider::new(vec![Step::Fail(rate_limited()), Step::Complete("Fixed.")]);
        let request = CommandRequest::new(CommandKind::Fix, "null ref bug").with_context(FileContext {
            file_content: Some("let x = None; x.unwrap();".into()),
            language: Some("rust".into()),
            ..Default::default()
        });
        let started = Instant::now();
        let events = relay(provider.clone())
            .start(Some(&session()), request)
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            events.first(),
            Some(&StreamEvent::Start {
                command: CommandKind::Fix
            })
        );
        assert_eq!(data_text(&events), "Fixed.");
        assert_eq!(events.last(), Some(&StreamEvent::success()));
        let times = provider.call_times();
        assert_eq!(times.len(), 2);
        assert_eq!(times[1] - started, Duration::from_millis(2_000));

        for request in provider.requests() {
            assert_eq!(request.params.temperature, FIX_TEMPERATURE);
            assert_eq!(request.model, "scripted-1");
            assert!(request.prompt.user.contains("null ref bug"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn authentication_failure_is_not_retried() {
        let provider = ScriptedProvider::new(vec![
            Step::Fail(ProviderError::authentication("gemini", "API key not valid")),
            Step::Complete("unreachable"),
        ]);
        let events = relay(provider.clone())
            .start(Some(&session()), explain())
            .unwrap()
            .collect()
            .await;

        assert_eq!(provider.call_times().len(), 1);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::End { success: false, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn mid_stream_failure_keeps_delivered_data() {
        let provider = ScriptedProvider::new(vec![
            Step::Fragments(vec![
                Ok("partial "),
                Err(ProviderError::transport("gemini", "connection reset")),
            ]),
            Step::Complete("unreachable"),
        ]);
        let events = relay(provider.clone())
            .start(Some(&session()), explain())
            .unwrap()
            .collect()
            .await;

        assert_well_formed(&events);
        assert_eq!(data_text(&events), "partial ");
        assert!(matches!(
            events.last(),
            Some(StreamEvent::End { success: false, error: Some(m) }) if m.contains("connection reset")
        ));
        assert_eq!(provider.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_after_data_is_terminal() {
        let provider = ScriptedProvider::new(vec![
            Step::Fragments(vec![Ok("half"), Err(rate_limited())]),
            Step::Complete("unreachable"),
        ]);
        let events = relay(provider.clone())
            .start(Some(&session()), explain())
            .unwrap()
            .collect()
            .await;

        assert_eq!(provider.call_times().len(), 1);
        assert_eq!(data_text(&events), "half");
        assert!(matches!(
            events.last(),
            Some(StreamEvent::End { success: false, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_provider_times_out_without_retry() {
        let provider = ScriptedProvider::new(vec![Step::Hang, Step::Complete("unreachable")]);
        let options = RelayOptions {
            attempt_timeout: Duration::from_secs(5),
            ..RelayOptions::default()
        };
        let started = Instant::now();
        let events = relay_with(provider.clone(), options)
            .start(Some(&session()), explain())
            .unwrap()
            .collect()
            .await;

        assert_eq!(Instant::now() - started, Duration::from_secs(5));
        assert_eq!(provider.call_times().len(), 1);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::End { success: false, error: Some(m) }) if m.contains("5s")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_stream_stops_the_backoff() {
        let provider = ScriptedProvider::new(vec![
            Step::Fail(rate_limited()),
            Step::Complete("never requested"),
        ]);
        let mut stream = relay(provider.clone())
            .start(Some(&session()), explain())
            .unwrap();
        assert!(matches!(
            stream.next_event().await,
            Some(StreamEvent::Start { .. })
        ));
        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(stream);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_handle_ends_the_stream() {
        let provider = ScriptedProvider::new(vec![Step::Hang]);
        let mut stream = relay(provider)
            .start(Some(&session()), explain())
            .unwrap();
        let abort = stream.abort_handle();
        assert!(matches!(
            stream.next_event().await,
            Some(StreamEvent::Start { .. })
        ));
        abort.abort();

        assert_eq!(
            stream.next_event().await,
            Some(StreamEvent::failure("request cancelled"))
        );
        assert_eq!(stream.next_event().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_with_a_full_buffer_still_delivers_end() {
        let provider = ScriptedProvider::new(vec![Step::Complete("abcdefghijklmnopqrstuvwxyz")]);
        let options = RelayOptions {
            stream_buffer_capacity: 1,
            ..RelayOptions::default()
        };
        let stream = relay_with(provider, options)
            .start(Some(&session()), explain())
            .unwrap();
        stream.abort_handle().abort();

        let events = drain(stream).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Start {
                    command: CommandKind::Explain
                },
                StreamEvent::failure("request cancelled"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abort_while_end_is_waiting_keeps_that_end() {
        let provider = ScriptedProvider::new(vec![Step::Complete("abc")]);
        let options = RelayOptions {
            stream_buffer_capacity: 2,
            ..RelayOptions::default()
        };
        let stream = relay_with(provider, options)
            .start(Some(&session()), explain())
            .unwrap();
        // start and data fill the buffer; the task is now parked on `end`
        tokio::time::sleep(Duration::from_millis(1)).await;
        stream.abort_handle().abort();

        let events = drain(stream).await;
        assert_well_formed(&events);
        assert_eq!(
            events,
            vec![
                StreamEvent::Start {
                    command: CommandKind::Explain
                },
                StreamEvent::data("abc"),
                StreamEvent::success(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn prepare_does_not_contact_the_provider() {
        let provider = ScriptedProvider::new(vec![Step::Complete("ok")]);
        let prepared = relay(provider.clone())
            .prepare(Some(&session()), explain())
            .unwrap();
        assert_eq!(prepared.provider(), ProviderId::new("gemini"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(provider.call_times().is_empty());

        let request_id = prepared.request_id();
        let stream = prepared.spawn();
        assert_eq!(stream.request_id(), request_id);
        assert_eq!(data_text(&drain(stream).await), "ok");
        assert_eq!(provider.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pre_stream_errors_are_returned_before_start() {
        let provider = ScriptedProvider::new(vec![]);
        let relay = relay(provider.clone());

        assert!(matches!(
            relay.start(None, explain()).err(),
            Some(RelayError::Authentication(_))
        ));
        assert!(matches!(
            relay
                .start(Some(&session()), CommandRequest::new(CommandKind::Generate, " "))
                .err(),
            Some(RelayError::Validation(_))
        ));
        assert!(matches!(
            relay
                .start(Some(&session()), explain().with_provider("claude"))
                .err(),
            Some(RelayError::Validation(_))
        ));
        assert!(provider.call_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_configuration_is_reported_before_start() {
        let relay = Relay::new(
            ProviderRegistry::builder().build().unwrap(),
            TemplateRegistry::with_defaults().unwrap(),
            RelayOptions::default(),
        );
        assert!(matches!(
            relay.start(Some(&session()), explain()).err(),
            Some(RelayError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn no_retry_policy_fails_on_first_rate_limit() {
        let provider = ScriptedProvider::new(vec![Step::Fail(rate_limited()), Step::Complete("x")]);
        let options = RelayOptions {
            retry: RetryPolicy::none(),
            ..RelayOptions::default()
        };
        let events = relay_with(provider.clone(), options)
            .start(Some(&session()), explain())
            .unwrap()
            .collect()
            .await;
        assert_eq!(provider.call_times().len(), 1);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::End { success: false, .. })
        ));
    }
}
