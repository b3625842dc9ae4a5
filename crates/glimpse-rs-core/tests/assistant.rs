//! Assistant integration tests with stub embedding and generation clients.

use futures_util::StreamExt;
use glimpse_rs_config::GlimpseConfig;
use glimpse_rs_core::{
    AskStream, Assistant, ConversationPhase, EmbeddingClient, GenerationClient, GlimpseCoreError,
};
use glimpse_rs_memory::MemoryStore;
use glimpse_rs_protocol::{AskRequest, EventPayload, Request, RequestEnvelope, Turn};
use glimpse_rs_test_utils::{
    FailingGenerationClient, PendingEmbeddingClient, RecordingEventSink,
    ScriptedGenerationClient, StubEmbeddingClient, sse_data_line,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const PROMPT_HEAD: &str =
    "Based on the following page content, please answer this question concisely:\n\n";

/// Unit vector whose cosine with `[1, 0]` equals `score`.
fn at_score(score: f32) -> Vec<f32> {
    vec![score, (1.0 - score * score).sqrt()]
}

fn test_config() -> GlimpseConfig {
    GlimpseConfig::builder().api_key("test-key").build()
}

fn build(
    generator: Arc<dyn GenerationClient>,
    embedder: Arc<dyn EmbeddingClient>,
) -> (Assistant, Arc<MemoryStore>) {
    let memory = Arc::new(MemoryStore::in_memory());
    let assistant = Assistant::builder(test_config())
        .memory_store(memory.clone())
        .generation_client(generator)
        .embedding_client(embedder)
        .build()
        .expect("assistant");
    (assistant, memory)
}

fn ask(key: &str, question: &str, context: &str, is_new_search: bool) -> AskRequest {
    AskRequest {
        key: key.to_string(),
        question: question.to_string(),
        page_context: context.to_string(),
        is_new_search,
    }
}

async fn drain(stream: &mut AskStream) -> Vec<EventPayload> {
    let mut payloads = Vec::new();
    while let Some(event) = stream.events.next().await {
        payloads.push(event.payload);
    }
    payloads
}

fn deltas(payloads: &[EventPayload]) -> Vec<String> {
    payloads
        .iter()
        .filter_map(|payload| match payload {
            EventPayload::AnswerDelta { delta, .. } => Some(delta.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn relevant_memory_is_injected_and_weak_one_is_not() {
    let generator = ScriptedGenerationClient::from_deltas(&["Blue."]);
    let embedder = StubEmbeddingClient::new()
        .with("The sky is blue", at_score(0.75))
        .with("Grass is green", at_score(0.55))
        .with("What color is the sky?", vec![1.0, 0.0]);
    let (assistant, memory) = build(Arc::new(generator.clone()), Arc::new(embedder));

    assistant
        .save("The sky is blue", "https://sky.example")
        .await
        .expect("save sky");
    assistant
        .save("Grass is green", "https://grass.example")
        .await
        .expect("save grass");
    assert_eq!(memory.len().await, 2);

    let mut stream = assistant
        .ask(ask("tab-1", "What color is the sky?", "Weather page", true))
        .await
        .expect("ask");
    drain(&mut stream).await;
    let outcome = stream.finish().await.expect("outcome");
    assert_eq!(outcome.answer, "Blue.");
    assert_eq!(outcome.memories_used, 1);

    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].turns,
        vec![Turn::user(format!(
            "{PROMPT_HEAD}Question: What color is the sky?\n\n\
             Relevant notes from your memory:\n\
             - [saved from https://sky.example] The sky is blue\n\n\
             Page Context:\nWeather page"
        ))]
    );
}

#[tokio::test]
async fn deltas_arrive_in_order_between_start_and_completion() {
    let generator = ScriptedGenerationClient::from_deltas(&["The ", "answer ", "is 42."]);
    let (assistant, _) = build(
        Arc::new(generator),
        Arc::new(StubEmbeddingClient::with_fallback(vec![1.0, 0.0])),
    );
    let mut stream = assistant
        .ask(ask("tab-1", "What is it?", "ctx", false))
        .await
        .expect("ask");
    let turn_id = stream.turn_id;
    let payloads = drain(&mut stream).await;

    assert_eq!(
        payloads.first(),
        Some(&EventPayload::AnswerStarted {
            key: "tab-1".to_string(),
            turn_id
        })
    );
    assert_eq!(deltas(&payloads), vec!["The ", "answer ", "is 42."]);
    assert_eq!(
        payloads.last(),
        Some(&EventPayload::AnswerCompleted { turn_id })
    );
    let outcome = stream.finish().await.expect("outcome");
    assert_eq!(outcome.answer, "The answer is 42.");
    assert_eq!(outcome.memories_used, 0);
    assert_eq!(
        assistant.conversation("tab-1").expect("state").phase,
        ConversationPhase::Idle
    );
}

#[tokio::test]
async fn follow_up_history_records_only_user_questions() {
    let generator = ScriptedGenerationClient::from_deltas(&["ok"]);
    let (assistant, _) = build(
        Arc::new(generator.clone()),
        Arc::new(StubEmbeddingClient::with_fallback(vec![1.0, 0.0])),
    );

    for (question, new_search) in [("First question", true), ("And then?", false)] {
        let stream = assistant
            .ask(ask("tab-1", question, "Long page", new_search))
            .await
            .expect("ask");
        stream.finish().await.expect("outcome");
    }

    let requests = generator.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].turns,
        vec![Turn::user("First question"), Turn::user("And then?")]
    );
    assert_eq!(
        assistant.conversation("tab-1").expect("state").turns,
        vec![Turn::user("First question"), Turn::user("And then?")]
    );
}

#[tokio::test]
async fn new_search_discards_previous_turns() {
    let generator = ScriptedGenerationClient::from_deltas(&["ok"]);
    let (assistant, _) = build(
        Arc::new(generator.clone()),
        Arc::new(StubEmbeddingClient::with_fallback(vec![1.0, 0.0])),
    );
    for (question, new_search) in [("one", true), ("two", false), ("three", true)] {
        let stream = assistant
            .ask(ask("tab-1", question, "ctx", new_search))
            .await
            .expect("ask");
        stream.finish().await.expect("outcome");
    }

    let requests = generator.requests();
    assert_eq!(
        requests[2].turns,
        vec![Turn::user(format!(
            "{PROMPT_HEAD}Question: three\n\nPage Context:\nctx"
        ))]
    );
    assert_eq!(
        assistant.conversation("tab-1").expect("state").turns,
        vec![Turn::user("three")]
    );
}

#[tokio::test]
async fn missing_api_key_reports_configuration_error_without_network() {
    let mut config = GlimpseConfig::default();
    config.credentials.api_key = None;
    config.credentials.api_key_env = Some("GLIMPSE_TEST_KEY_NEVER_SET_51C2".to_string());
    let assistant = Assistant::builder(config)
        .memory_store(Arc::new(MemoryStore::in_memory()))
        .build()
        .expect("assistant");

    let mut stream = assistant
        .ask(ask("tab-1", "Anything?", "ctx", true))
        .await
        .expect("ask");
    let turn_id = stream.turn_id;
    let payloads = drain(&mut stream).await;
    assert_eq!(
        deltas(&payloads),
        vec!["Error: API Key not set. Please set it in the extension options."]
    );
    assert_eq!(
        payloads.last(),
        Some(&EventPayload::AnswerFailed {
            turn_id,
            message: "API Key not set. Please set it in the extension options.".to_string()
        })
    );
    let err = stream.finish().await.unwrap_err();
    assert!(matches!(err, GlimpseCoreError::Configuration(_)));
    assert_eq!(assistant.conversation("tab-1"), None);

    let err = assistant.save("note", "u").await.unwrap_err();
    assert!(matches!(err, GlimpseCoreError::Configuration(_)));
}

#[tokio::test]
async fn generation_failure_becomes_final_error_delta() {
    let generator = FailingGenerationClient::new(400, "API key not valid. Please pass a valid API key.");
    let (assistant, _) = build(
        Arc::new(generator.clone()),
        Arc::new(StubEmbeddingClient::with_fallback(vec![1.0, 0.0])),
    );
    let mut stream = assistant
        .ask(ask("tab-1", "Why?", "ctx", true))
        .await
        .expect("ask");
    let payloads = drain(&mut stream).await;
    assert_eq!(
        deltas(&payloads),
        vec![
            "\n\n**Error:** API call failed with status 400: API key not valid. Please pass a valid API key."
        ]
    );
    assert!(matches!(
        payloads.last(),
        Some(EventPayload::AnswerFailed { .. })
    ));
    let err = stream.finish().await.unwrap_err();
    assert!(matches!(err, GlimpseCoreError::Network { status: 400, .. }));
    assert_eq!(generator.calls(), 1);
    assert_eq!(
        assistant.conversation("tab-1").expect("state").turns,
        vec![Turn::user("Why?")]
    );
}

#[tokio::test]
async fn mid_stream_failure_keeps_partial_answer() {
    let generator = ScriptedGenerationClient::from_chunks(vec![
        sse_data_line("Partial").into_bytes(),
    ])
    .then_fail("connection reset");
    let (assistant, _) = build(
        Arc::new(generator),
        Arc::new(StubEmbeddingClient::with_fallback(vec![1.0, 0.0])),
    );
    let mut stream = assistant
        .ask(ask("tab-1", "Why?", "ctx", true))
        .await
        .expect("ask");
    let payloads = drain(&mut stream).await;
    assert_eq!(
        deltas(&payloads),
        vec![
            "Partial".to_string(),
            "\n\n**Error:** transport error: connection reset".to_string()
        ]
    );
    assert!(stream.finish().await.is_err());
}

#[tokio::test]
async fn slow_generation_times_out() {
    let generator = ScriptedGenerationClient::from_deltas(&["late"])
        .with_delay(Duration::from_secs(5));
    let memory = Arc::new(MemoryStore::in_memory());
    let mut config = test_config();
    config.generation.request_timeout_secs = 1;
    let assistant = Assistant::builder(config)
        .memory_store(memory)
        .generation_client(Arc::new(generator))
        .embedding_client(Arc::new(StubEmbeddingClient::with_fallback(vec![1.0])))
        .build()
        .expect("assistant");

    let mut stream = assistant
        .ask(ask("tab-1", "Still there?", "ctx", true))
        .await
        .expect("ask");
    let payloads = drain(&mut stream).await;
    assert_eq!(
        deltas(&payloads),
        vec!["\n\n**Error:** request timed out after 1s"]
    );
    let err = stream.finish().await.unwrap_err();
    assert!(matches!(err, GlimpseCoreError::Timeout(1)));
}

#[tokio::test]
async fn failed_memory_lookup_does_not_fail_the_ask() {
    let generator = ScriptedGenerationClient::from_deltas(&["fine"]);
    let embedder = StubEmbeddingClient::new().with("saved note", vec![1.0, 0.0]);
    let (assistant, _) = build(Arc::new(generator.clone()), Arc::new(embedder.clone()));
    assistant.save("saved note", "u").await.expect("save");

    let stream = assistant
        .ask(ask("tab-1", "unembeddable question", "ctx", true))
        .await
        .expect("ask");
    let outcome = stream.finish().await.expect("outcome");
    assert_eq!(outcome.answer, "fine");
    assert_eq!(outcome.memories_used, 0);
    assert_eq!(
        embedder.calls(),
        vec!["saved note".to_string(), "unembeddable question".to_string()]
    );
}

#[tokio::test]
async fn stalled_embedding_answers_without_memories() {
    let generator = ScriptedGenerationClient::from_deltas(&["fine"]);
    let embedder = PendingEmbeddingClient::new();
    let mut config = test_config();
    config.embedding.request_timeout_secs = 1;
    let assistant = Assistant::builder(config)
        .memory_store(Arc::new(MemoryStore::in_memory()))
        .generation_client(Arc::new(generator.clone()))
        .embedding_client(Arc::new(embedder.clone()))
        .build()
        .expect("assistant");

    let first = assistant
        .ask(ask("tab-1", "Anything saved?", "ctx", true))
        .await
        .expect("ask");
    let outcome = tokio::time::timeout(Duration::from_secs(5), first.finish())
        .await
        .expect("ask finished")
        .expect("outcome");
    assert_eq!(outcome.answer, "fine");
    assert_eq!(outcome.memories_used, 0);
    assert_eq!(embedder.calls(), 1);
    assert_eq!(generator.requests().len(), 1);

    let follow_up = assistant
        .ask(ask("tab-1", "And then?", "", false))
        .await
        .expect("ask");
    tokio::time::timeout(Duration::from_secs(5), follow_up.finish())
        .await
        .expect("follow-up finished")
        .expect("outcome");
}

#[tokio::test]
async fn terminal_event_precedes_next_ask_on_same_key() {
    let generator = ScriptedGenerationClient::from_deltas(&["a", "b"])
        .with_delay(Duration::from_millis(20));
    let sink = RecordingEventSink::new();
    let assistant = Assistant::builder(test_config())
        .memory_store(Arc::new(MemoryStore::in_memory()))
        .generation_client(Arc::new(generator))
        .embedding_client(Arc::new(StubEmbeddingClient::with_fallback(vec![1.0, 0.0])))
        .event_sink(Arc::new(sink.clone()))
        .build()
        .expect("assistant");

    let first = assistant
        .ask(ask("tab-1", "first", "ctx", true))
        .await
        .expect("first");
    let second = assistant
        .ask(ask("tab-1", "second", "ctx", false))
        .await
        .expect("second");
    let (first_turn, second_turn) = (first.turn_id, second.turn_id);
    let (first, second) = tokio::join!(first.finish(), second.finish());
    first.expect("first outcome");
    second.expect("second outcome");

    let payloads = sink.payloads();
    let first_completed = payloads
        .iter()
        .position(|payload| {
            matches!(payload, EventPayload::AnswerCompleted { turn_id } if *turn_id == first_turn)
        })
        .expect("first completed");
    let second_delta = payloads
        .iter()
        .position(|payload| {
            matches!(payload, EventPayload::AnswerDelta { turn_id, .. } if *turn_id == second_turn)
        })
        .expect("second delta");
    assert!(first_completed < second_delta, "{payloads:?}");
}

#[tokio::test]
async fn asks_on_one_key_run_in_arrival_order() {
    let generator = ScriptedGenerationClient::from_deltas(&["a", "b"])
        .with_delay(Duration::from_millis(20));
    let (assistant, _) = build(
        Arc::new(generator.clone()),
        Arc::new(StubEmbeddingClient::with_fallback(vec![1.0, 0.0])),
    );
    let first = assistant
        .ask(ask("tab-1", "first", "ctx", true))
        .await
        .expect("first");
    let second = assistant
        .ask(ask("tab-1", "second", "ctx", false))
        .await
        .expect("second");
    let (first, second) = tokio::join!(first.finish(), second.finish());
    first.expect("first outcome");
    second.expect("second outcome");

    let requests = generator.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].turns,
        vec![Turn::user("first"), Turn::user("second")]
    );
    assert_eq!(
        assistant.conversation("tab-1").expect("state").turns,
        vec![Turn::user("first"), Turn::user("second")]
    );
}

#[tokio::test]
async fn admitted_asks_keep_admission_order_when_run_out_of_order() {
    let generator = ScriptedGenerationClient::from_deltas(&["ok"])
        .with_delay(Duration::from_millis(10));
    let (assistant, _) = build(
        Arc::new(generator.clone()),
        Arc::new(StubEmbeddingClient::with_fallback(vec![1.0, 0.0])),
    );
    let sink = Arc::new(RecordingEventSink::new());
    let first = assistant
        .admit(
            RequestEnvelope::new(Request::Ask(ask("tab-1", "first", "ctx", true))),
            sink.clone(),
        )
        .await;
    let second = assistant
        .admit(
            RequestEnvelope::new(Request::Ask(ask("tab-1", "second", "ctx", false))),
            sink.clone(),
        )
        .await;

    let second = tokio::spawn(second);
    tokio::task::yield_now().await;
    let first = tokio::spawn(first);
    first.await.expect("first");
    second.await.expect("second");

    assert_eq!(
        assistant.conversation("tab-1").expect("state").turns,
        vec![Turn::user("first"), Turn::user("second")]
    );
    assert_eq!(
        generator.requests()[1].turns,
        vec![Turn::user("first"), Turn::user("second")]
    );
}

#[tokio::test]
async fn empty_question_is_rejected() {
    let (assistant, _) = build(
        Arc::new(ScriptedGenerationClient::from_deltas(&["x"])),
        Arc::new(StubEmbeddingClient::with_fallback(vec![1.0])),
    );
    let err = match assistant.ask(ask("tab-1", "   ", "ctx", true)).await {
        Ok(_) => panic!("blank question accepted"),
        Err(err) => err,
    };
    assert!(matches!(err, GlimpseCoreError::InvalidRequest(_)));
}

#[tokio::test]
async fn memory_management_operations() {
    let embedder = StubEmbeddingClient::with_fallback(vec![0.6, 0.8]);
    let (assistant, _) = build(
        Arc::new(ScriptedGenerationClient::from_deltas(&["x"])),
        Arc::new(embedder),
    );
    let older = assistant.save("older", "https://a.example").await.expect("save");
    let newer = assistant.save("newer", "https://b.example").await.expect("save");

    let ids: Vec<_> = assistant
        .list_memories()
        .await
        .iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(ids, vec![newer, older]);
    assert!(!assistant.delete_memory(newer + 10_000).await.expect("delete"));
    assert!(assistant.delete_memory(older).await.expect("delete"));
    assert_eq!(assistant.list_memories().await.len(), 1);

    let err = assistant.save("  ", "u").await.unwrap_err();
    assert!(matches!(err, GlimpseCoreError::InvalidRequest(_)));
}

#[tokio::test]
async fn handle_dispatches_requests_to_sink() {
    let embedder = StubEmbeddingClient::with_fallback(vec![1.0, 0.0]);
    let (assistant, _) = build(
        Arc::new(ScriptedGenerationClient::from_deltas(&["Hi"])),
        Arc::new(embedder),
    );
    let sink = RecordingEventSink::new();

    assistant
        .handle(
            RequestEnvelope::new(Request::Save {
                text: "note".to_string(),
                source_url: "https://n.example".to_string(),
            }),
            &sink,
        )
        .await;
    let saved_id = match sink.payloads().last() {
        Some(EventPayload::MemorySaved { id }) => *id,
        other => panic!("unexpected payload: {other:?}"),
    };

    let ask_envelope = RequestEnvelope::new(Request::Ask(ask("tab-9", "Hello?", "ctx", true)));
    let ask_id = ask_envelope.id;
    assistant.handle(ask_envelope, &sink).await;
    assert_eq!(sink.answer_text(), "Hi");
    assert!(
        sink.events()
            .iter()
            .filter(|event| matches!(
                event.payload,
                EventPayload::AnswerStarted { .. }
                    | EventPayload::AnswerDelta { .. }
                    | EventPayload::AnswerCompleted { .. }
            ))
            .all(|event| event.request_id == Some(ask_id))
    );

    assistant
        .handle(RequestEnvelope::new(Request::ListMemories), &sink)
        .await;
    match sink.payloads().last() {
        Some(EventPayload::MemoryList { memories }) => {
            assert_eq!(memories.len(), 1);
            assert_eq!(memories[0].id, saved_id);
            assert_eq!(memories[0].source_url, "https://n.example");
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    assistant
        .handle(
            RequestEnvelope::new(Request::DeleteMemory { id: saved_id }),
            &sink,
        )
        .await;
    assert_eq!(
        sink.payloads().last(),
        Some(&EventPayload::MemoryDeleted {
            id: saved_id,
            removed: true
        })
    );

    assistant
        .handle(
            RequestEnvelope::new(Request::EndConversation {
                key: "tab-9".to_string(),
            }),
            &sink,
        )
        .await;
    assert_eq!(
        sink.payloads().last(),
        Some(&EventPayload::ConversationEnded {
            key: "tab-9".to_string(),
            existed: true
        })
    );
    assert_eq!(assistant.conversation("tab-9"), None);
}

#[tokio::test]
async fn handle_reports_failed_save() {
    let (assistant, _) = build(
        Arc::new(ScriptedGenerationClient::from_deltas(&["x"])),
        Arc::new(StubEmbeddingClient::new()),
    );
    let sink = RecordingEventSink::new();
    assistant
        .handle(
            RequestEnvelope::new(Request::Save {
                text: "unknown".to_string(),
                source_url: String::new(),
            }),
            &sink,
        )
        .await;
    assert!(matches!(
        sink.payloads().as_slice(),
        [EventPayload::MemorySaveFailed { .. }]
    ));
}
