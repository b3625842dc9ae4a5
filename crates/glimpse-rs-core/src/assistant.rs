//! Conversation orchestration: memory recall, prompt assembly, streamed answers
//! and memory management behind one facade.

use crate::conversation::{
    ConversationPhase, ConversationState, ConversationStore, InMemoryConversationStore,
};
use crate::embedding::{EmbeddingClient, GeminiEmbeddingClient};
use crate::error::GlimpseCoreError;
use crate::generation::{GeminiGenerationClient, GenerationClient, GenerationRequest};
use crate::prompt;
use crate::stream::decode_stream;
use directories::BaseDirs;
use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::StreamExt;
use glimpse_rs_config::GlimpseConfig;
use glimpse_rs_memory::{MemoryId, MemoryRecord, MemoryStore, RecallOptions, ScoredMemory};
use glimpse_rs_protocol::{
    AskRequest, ConversationKey, EventMsg, EventPayload, EventSink, MemorySummary, Request,
    RequestEnvelope, RequestId, Turn, TurnId,
};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

const ASK_STREAM_BUFFER: usize = 512;
/// Shown to the user when no API credential is configured.
pub const MISSING_API_KEY_MESSAGE: &str =
    "API Key not set. Please set it in the extension options.";

/// Final result of a successful ask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskOutcome {
    /// Concatenation of every streamed delta.
    pub answer: String,
    /// Number of saved memories injected into the prompt.
    pub memories_used: usize,
}

/// Streaming handle for a single ask.
pub struct AskStream {
    pub key: ConversationKey,
    pub turn_id: TurnId,
    /// Events for this ask, ending with `AnswerCompleted` or `AnswerFailed`.
    pub events: ReceiverStream<EventMsg>,
    handle: JoinHandle<Result<AskOutcome, GlimpseCoreError>>,
}

impl AskStream {
    /// Await completion of the ask and return its outcome.
    ///
    /// Undelivered events are discarded; drain `events` first to observe them.
    pub async fn finish(self) -> Result<AskOutcome, GlimpseCoreError> {
        let AskStream { events, handle, .. } = self;
        drop(events);
        handle
            .await
            .map_err(|err| GlimpseCoreError::Executor(err.to_string()))?
    }

    /// Relay every event to `sink`, tagged with `request_id`, then finish.
    pub async fn forward(
        mut self,
        request_id: Option<RequestId>,
        sink: &dyn EventSink,
    ) -> Result<AskOutcome, GlimpseCoreError> {
        while let Some(mut event) = self.events.next().await {
            event.request_id = request_id;
            sink.emit(event);
        }
        self.finish().await
    }
}

/// Emits events of one ask to its stream and to the assistant-wide sink.
#[derive(Clone)]
struct AskEmitter {
    sender: mpsc::Sender<EventMsg>,
    primary: Option<Arc<dyn EventSink>>,
    turn_id: TurnId,
}

impl AskEmitter {
    async fn emit(&self, payload: EventPayload) {
        let event = EventMsg::new(None, payload);
        if let Some(primary) = &self.primary {
            primary.emit(event.clone());
        }
        // A dropped receiver only means nobody is listening anymore.
        let _ = self.sender.send(event).await;
    }

    async fn delta(&self, delta: String) {
        self.emit(EventPayload::AnswerDelta {
            turn_id: self.turn_id,
            delta,
        })
        .await;
    }
}

/// Builder wiring an `Assistant` from config plus optional overrides.
pub struct AssistantBuilder {
    config: GlimpseConfig,
    memory: Option<Arc<MemoryStore>>,
    conversations: Option<Arc<dyn ConversationStore>>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
    generator: Option<Arc<dyn GenerationClient>>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl AssistantBuilder {
    /// Use a specific memory store instead of the configured file store.
    pub fn memory_store(mut self, memory: Arc<MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Use a specific conversation store.
    pub fn conversation_store(mut self, conversations: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(conversations);
        self
    }

    /// Use a specific embedding client instead of the remote one.
    pub fn embedding_client(mut self, embedder: Arc<dyn EmbeddingClient>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use a specific generation client instead of the remote one.
    pub fn generation_client(mut self, generator: Arc<dyn GenerationClient>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Also deliver every ask event to this sink.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Assistant, GlimpseCoreError> {
        let config = self.config;
        config
            .validate()
            .map_err(|err| GlimpseCoreError::Configuration(err.to_string()))?;

        let memory = if !config.memory.enabled {
            info!("memory disabled by config");
            None
        } else if let Some(memory) = self.memory {
            Some(memory)
        } else {
            let root = resolve_memory_root(config.memory.path.as_ref())?;
            info!("initializing memory store (root={})", root.display());
            Some(Arc::new(MemoryStore::open(root)?))
        };

        let api_key = config.resolve_api_key();
        if api_key.is_none() && (self.embedder.is_none() || self.generator.is_none()) {
            warn!("no API key configured; remote calls will fail until one is set");
        }
        let embedder = match (self.embedder, api_key.as_deref()) {
            (Some(embedder), _) => Some(embedder),
            (None, Some(key)) => Some(Arc::new(GeminiEmbeddingClient::new(&config.embedding, key)?)
                as Arc<dyn EmbeddingClient>),
            (None, None) => None,
        };
        let generator = match (self.generator, api_key.as_deref()) {
            (Some(generator), _) => Some(generator),
            (None, Some(key)) => Some(
                Arc::new(GeminiGenerationClient::new(&config.generation, key)?)
                    as Arc<dyn GenerationClient>,
            ),
            (None, None) => None,
        };

        debug!(
            "assistant wired (memory={}, embedder={}, generator={})",
            memory.is_some(),
            embedder.is_some(),
            generator.is_some()
        );
        Ok(Assistant {
            config: Arc::new(config),
            memory,
            conversations: self
                .conversations
                .unwrap_or_else(|| Arc::new(InMemoryConversationStore::new())),
            embedder,
            generator,
            key_queues: Arc::new(Mutex::new(HashMap::new())),
            event_sink: self.event_sink,
        })
    }
}

/// Question answering over page context with personal memory.
#[derive(Clone)]
pub struct Assistant {
    config: Arc<GlimpseConfig>,
    memory: Option<Arc<MemoryStore>>,
    conversations: Arc<dyn ConversationStore>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
    generator: Option<Arc<dyn GenerationClient>>,
    /// Turn id and completion signal of the most recent ask per key.
    key_queues: Arc<Mutex<HashMap<ConversationKey, (TurnId, oneshot::Receiver<()>)>>>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl Assistant {
    pub fn builder(config: GlimpseConfig) -> AssistantBuilder {
        AssistantBuilder {
            config,
            memory: None,
            conversations: None,
            embedder: None,
            generator: None,
            event_sink: None,
        }
    }

    /// Effective configuration.
    pub fn config(&self) -> &GlimpseConfig {
        &self.config
    }

    /// Answer a question, streaming deltas as events.
    ///
    /// Asks on the same key run one at a time in arrival order; asks on
    /// different keys run concurrently.
    pub async fn ask(&self, request: AskRequest) -> Result<AskStream, GlimpseCoreError> {
        if request.question.trim().is_empty() {
            return Err(GlimpseCoreError::InvalidRequest(
                "question must not be empty".to_string(),
            ));
        }
        let turn_id = Uuid::new_v4();
        info!(
            "ask received (key={}, turn_id={}, question_len={}, context_len={}, new_search={})",
            request.key,
            turn_id,
            request.question.len(),
            request.page_context.len(),
            request.is_new_search
        );
        let (sender, receiver) = mpsc::channel(ASK_STREAM_BUFFER);
        let emitter = AskEmitter {
            sender,
            primary: self.event_sink.clone(),
            turn_id,
        };
        let key = request.key.clone();
        let (done, previous) = self.enqueue(&key, turn_id);
        let assistant = self.clone();
        let handle = tokio::spawn(async move {
            emitter
                .emit(EventPayload::AnswerStarted {
                    key: request.key.clone(),
                    turn_id,
                })
                .await;
            if let Some(previous) = previous {
                // Resolves once the earlier ask on this key has finished.
                let _ = previous.await;
            }
            let result = assistant.answer(&request, &emitter).await;
            match &result {
                Ok(outcome) => {
                    info!(
                        "ask completed (key={}, turn_id={}, answer_len={}, memories_used={})",
                        request.key,
                        turn_id,
                        outcome.answer.len(),
                        outcome.memories_used
                    );
                    emitter
                        .emit(EventPayload::AnswerCompleted { turn_id })
                        .await;
                }
                Err(err) => {
                    error!(
                        "ask failed (key={}, turn_id={}, err={})",
                        request.key, turn_id, err
                    );
                    emitter.delta(error_delta(err)).await;
                    emitter
                        .emit(EventPayload::AnswerFailed {
                            turn_id,
                            message: err.to_string(),
                        })
                        .await;
                }
            }
            assistant.dequeue(&request.key, turn_id);
            drop(done);
            result
        });

        Ok(AskStream {
            key,
            turn_id,
            events: ReceiverStream::new(receiver),
            handle,
        })
    }

    async fn answer(
        &self,
        request: &AskRequest,
        emitter: &AskEmitter,
    ) -> Result<AskOutcome, GlimpseCoreError> {
        let generator = self
            .generator
            .clone()
            .ok_or_else(|| GlimpseCoreError::Configuration(MISSING_API_KEY_MESSAGE.to_string()))?;
        let key = request.key.as_str();
        if request.is_new_search || self.conversations.get(key).is_none() {
            self.conversations.reset(key);
        }
        let history = self
            .conversations
            .get(key)
            .map(|state| state.turns)
            .unwrap_or_default();
        let first_turn = history.is_empty();

        self.conversations
            .set_phase(key, ConversationPhase::AwaitingMemory);
        let memories = if first_turn {
            self.recall(&request.question).await
        } else {
            Vec::new()
        };
        let prompt_text = if first_turn {
            prompt::first_turn_prompt(
                &request.question,
                &request.page_context,
                &memories,
                self.config.prompt.context_chars,
            )
        } else {
            request.question.clone()
        };

        let mut turns = history;
        turns.push(Turn::user(prompt_text));
        let generation = GenerationRequest::from_config(turns, &self.config.generation);
        self.conversations
            .set_phase(key, ConversationPhase::AwaitingModel);

        let timeout_secs = self.config.generation.request_timeout_secs;
        let streamed = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.stream_answer(generator, generation, key, emitter),
        )
        .await
        .unwrap_or(Err(GlimpseCoreError::Timeout(timeout_secs)));

        self.conversations
            .append_turn(key, Turn::user(request.question.clone()));
        self.conversations.set_phase(key, ConversationPhase::Idle);

        Ok(AskOutcome {
            answer: streamed?,
            memories_used: memories.len(),
        })
    }

    async fn stream_answer(
        &self,
        generator: Arc<dyn GenerationClient>,
        request: GenerationRequest,
        key: &str,
        emitter: &AskEmitter,
    ) -> Result<String, GlimpseCoreError> {
        let bytes = generator.stream_generate(request).await?;
        self.conversations.set_phase(key, ConversationPhase::Streaming);
        let mut deltas = pin!(decode_stream(bytes));
        let mut answer = String::new();
        while let Some(delta) = deltas.next().await {
            let delta = delta?;
            answer.push_str(&delta);
            emitter.delta(delta).await;
        }
        Ok(answer)
    }

    /// Best-effort lookup of memories relevant to `question`.
    async fn recall(&self, question: &str) -> Vec<ScoredMemory> {
        let (Some(memory), Some(embedder)) = (&self.memory, &self.embedder) else {
            return Vec::new();
        };
        let timeout_secs = self.config.embedding.request_timeout_secs;
        let embedding = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            embedder.embed(question),
        )
        .await
        {
            Ok(Ok(embedding)) => embedding,
            Ok(Err(err)) => {
                warn!("memory lookup skipped, embedding failed (err={})", err);
                return Vec::new();
            }
            Err(_) => {
                warn!(
                    "memory lookup skipped, embedding timed out (timeout_secs={})",
                    timeout_secs
                );
                return Vec::new();
            }
        };
        let options = RecallOptions::new(self.config.memory.recall_k, self.config.memory.min_score);
        let memories = memory.query_by_embedding(&embedding, options).await;
        debug!("memory lookup finished (matched={})", memories.len());
        memories
    }

    /// Embed and persist a snippet.
    pub async fn save(&self, text: &str, source_url: &str) -> Result<MemoryId, GlimpseCoreError> {
        let memory = self.memory_store()?;
        if text.trim().is_empty() {
            return Err(GlimpseCoreError::InvalidRequest(
                "memory text must not be empty".to_string(),
            ));
        }
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| GlimpseCoreError::Configuration(MISSING_API_KEY_MESSAGE.to_string()))?;
        let embedding = embedder.embed(text).await?;
        Ok(memory.insert(text, embedding, source_url).await?)
    }

    /// Every saved memory, newest first. Empty when memory is disabled.
    pub async fn list_memories(&self) -> Vec<MemoryRecord> {
        match &self.memory {
            Some(memory) => memory.list_all().await,
            None => Vec::new(),
        }
    }

    /// Delete a saved memory; unknown ids return `false`.
    pub async fn delete_memory(&self, id: MemoryId) -> Result<bool, GlimpseCoreError> {
        Ok(self.memory_store()?.delete(id).await?)
    }

    /// Snapshot of a conversation.
    pub fn conversation(&self, key: &str) -> Option<ConversationState> {
        self.conversations.get(key)
    }

    /// Drop the history of a conversation; returns whether it existed.
    pub fn end_conversation(&self, key: &str) -> bool {
        self.conversations.destroy(key)
    }

    /// Execute an inbound request and report its results to `sink`.
    pub async fn handle(&self, envelope: RequestEnvelope, sink: &dyn EventSink) {
        let request_id = envelope.id;
        debug!("handling request (request_id={})", request_id);
        match envelope.payload {
            Request::Ask(ask) => self.handle_ask(request_id, ask, sink).await,
            Request::Save { text, source_url } => {
                let payload = match self.save(&text, &source_url).await {
                    Ok(id) => EventPayload::MemorySaved { id },
                    Err(err) => {
                        warn!("memory save failed (request_id={}, err={})", request_id, err);
                        EventPayload::MemorySaveFailed {
                            message: err.to_string(),
                        }
                    }
                };
                sink.emit(EventMsg::new(Some(request_id), payload));
            }
            Request::ListMemories => {
                let memories = self
                    .list_memories()
                    .await
                    .into_iter()
                    .map(summarize)
                    .collect();
                sink.emit(EventMsg::new(
                    Some(request_id),
                    EventPayload::MemoryList { memories },
                ));
            }
            Request::DeleteMemory { id } => {
                let payload = match self.delete_memory(id).await {
                    Ok(removed) => EventPayload::MemoryDeleted { id, removed },
                    Err(err) => EventPayload::Error {
                        message: err.to_string(),
                    },
                };
                sink.emit(EventMsg::new(Some(request_id), payload));
            }
            Request::EndConversation { key } => {
                let existed = self.end_conversation(&key);
                sink.emit(EventMsg::new(
                    Some(request_id),
                    EventPayload::ConversationEnded { key, existed },
                ));
            }
        }
    }

    /// Admit a request in arrival order and return the future that completes it.
    ///
    /// An ask takes its place in the per-key queue before this returns, so
    /// callers that run the returned futures concurrently keep the order in
    /// which they admitted them.
    pub async fn admit(
        &self,
        envelope: RequestEnvelope,
        sink: Arc<dyn EventSink>,
    ) -> BoxFuture<'static, ()> {
        match envelope {
            RequestEnvelope {
                id,
                payload: Request::Ask(ask),
                ..
            } => match self.ask(ask).await {
                Ok(stream) => async move {
                    if let Err(err) = stream.forward(Some(id), sink.as_ref()).await {
                        debug!("ask ended with error (request_id={}, err={})", id, err);
                    }
                }
                .boxed(),
                Err(err) => {
                    sink.emit(EventMsg::new(
                        Some(id),
                        EventPayload::Error {
                            message: err.to_string(),
                        },
                    ));
                    future::ready(()).boxed()
                }
            },
            envelope => {
                let assistant = self.clone();
                async move { assistant.handle(envelope, sink.as_ref()).await }.boxed()
            }
        }
    }

    async fn handle_ask(&self, request_id: RequestId, ask: AskRequest, sink: &dyn EventSink) {
        let stream = match self.ask(ask).await {
            Ok(stream) => stream,
            Err(err) => {
                sink.emit(EventMsg::new(
                    Some(request_id),
                    EventPayload::Error {
                        message: err.to_string(),
                    },
                ));
                return;
            }
        };
        if let Err(err) = stream.forward(Some(request_id), sink).await {
            debug!("ask ended with error (request_id={}, err={})", request_id, err);
        }
    }

    fn memory_store(&self) -> Result<&Arc<MemoryStore>, GlimpseCoreError> {
        self.memory
            .as_ref()
            .ok_or_else(|| GlimpseCoreError::Configuration("memory is disabled".to_string()))
    }

    /// Join the per-key queue: returns this ask's completion signal and the
    /// signal of the ask it must wait for.
    fn enqueue(
        &self,
        key: &str,
        turn_id: TurnId,
    ) -> (oneshot::Sender<()>, Option<oneshot::Receiver<()>>) {
        let (done, finished) = oneshot::channel();
        let previous = self
            .key_queues
            .lock()
            .insert(key.to_string(), (turn_id, finished));
        (done, previous.map(|(_, receiver)| receiver))
    }

    /// Leave the per-key queue; the entry stays while a later ask waits on it.
    fn dequeue(&self, key: &str, turn_id: TurnId) {
        let mut queues = self.key_queues.lock();
        if queues.get(key).is_some_and(|(last, _)| *last == turn_id) {
            queues.remove(key);
        }
    }
}

/// User-visible text appended to the answer when an ask fails.
fn error_delta(err: &GlimpseCoreError) -> String {
    match err {
        GlimpseCoreError::Configuration(message) => format!("Error: {message}"),
        other => format!("\n\n**Error:** {other}"),
    }
}

fn summarize(record: MemoryRecord) -> MemorySummary {
    MemorySummary {
        id: record.id,
        text: record.text,
        source_url: record.source_url,
        created_at: record.created_at,
    }
}

/// Resolve the memory root from config or default to `~/.glimpse/memory`.
fn resolve_memory_root(path: Option<&String>) -> Result<PathBuf, GlimpseCoreError> {
    if let Some(path) = path {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            debug!("using absolute memory root: {}", path.display());
            return Ok(path);
        }
        let cwd = std::env::current_dir()?;
        debug!(
            "resolving memory root relative to cwd: {}",
            cwd.join(&path).display()
        );
        return Ok(cwd.join(path));
    }
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".glimpse").join("memory"))
        .ok_or_else(|| {
            GlimpseCoreError::Configuration("unable to resolve home directory".to_string())
        })
}
