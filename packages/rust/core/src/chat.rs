//! Conversation sessions: rank, assemble, generate, remember.

use serde::Serialize;
use tracing::{info, instrument, warn};

use kbchat_ingest::Corpus;
use kbchat_ranker::Ranker;
use kbchat_shared::{ChatTurn, KbChatError, KnowledgeDocument, Result};

use crate::context::InstructionTemplate;
use crate::generation::{GenerationBackend, GenerationRequest, GroundingReference};

/// Shown in place of an answer when the backend call fails.
pub const FALLBACK_REPLY: &str = "시스템 오류가 발생했습니다. 잠시 후 다시 시도해주세요.";

/// Shown when the backend answers with no text.
pub const EMPTY_REPLY: &str = "죄송합니다. 답변을 생성하지 못했습니다.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyOutcome {
    Answered,
    Failed,
}

/// What one turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub text: String,
    /// Documents used as context, most relevant first.
    pub documents: Vec<KnowledgeDocument>,
    pub grounding: Vec<GroundingReference>,
    pub outcome: ReplyOutcome,
}

/// One conversation with a generation backend.
///
/// History holds completed exchanges only; a failed turn leaves it unchanged.
#[derive(Debug)]
pub struct ChatSession<B> {
    backend: B,
    ranker: Ranker,
    template: InstructionTemplate,
    history: Vec<ChatTurn>,
}

impl<B: GenerationBackend> ChatSession<B> {
    pub fn new(backend: B, ranker: Ranker, template: InstructionTemplate) -> Self {
        Self {
            backend,
            ranker,
            template,
            history: Vec::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Answer one message against a corpus snapshot.
    ///
    /// Backend failures become a [`ReplyOutcome::Failed`] reply carrying
    /// [`FALLBACK_REPLY`]. Missing credentials are returned as an error so the
    /// caller can tell the operator which variable to set.
    #[instrument(skip_all, fields(backend = self.backend.name(), corpus = corpus.len()))]
    pub async fn send(&mut self, corpus: &Corpus, message: &str) -> Result<ChatReply> {
        if message.trim().is_empty() {
            return Err(KbChatError::validation("message must not be empty"));
        }

        let ranked = self.ranker.rank(message, corpus.documents());
        let system_instruction = self.template.render(&ranked);
        let documents: Vec<KnowledgeDocument> = ranked.into_iter().cloned().collect();

        let request = GenerationRequest {
            system_instruction,
            history: self.history.clone(),
            message: message.to_string(),
        };

        match self.backend.generate(&request).await {
            Ok(response) => {
                let text = if response.text.trim().is_empty() {
                    EMPTY_REPLY.to_string()
                } else {
                    response.text
                };

                self.history.push(ChatTurn::user(message));
                self.history.push(ChatTurn::model(text.clone()));

                info!(
                    documents = documents.len(),
                    grounding = response.grounding.len(),
                    history = self.history.len(),
                    "turn answered"
                );
                Ok(ChatReply {
                    text,
                    documents,
                    grounding: response.grounding,
                    outcome: ReplyOutcome::Answered,
                })
            }
            Err(e) if e.is_missing_credentials() => Err(e),
            Err(e) => {
                warn!(error = %e, "generation failed");
                Ok(ChatReply {
                    text: FALLBACK_REPLY.to_string(),
                    documents: Vec::new(),
                    grounding: Vec::new(),
                    outcome: ReplyOutcome::Failed,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use kbchat_ingest::{RawSource, build_corpus};
    use kbchat_shared::{IngestMode, Role};

    use super::*;
    use crate::context::NO_RECORDS_MARKER;
    use crate::generation::GenerationResponse;

    /// Replays scripted results and records every request.
    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<GenerationResponse>>>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedBackend {
        fn with(replies: Vec<Result<GenerationResponse>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::default(),
            }
        }

        fn requests(&self) -> Vec<GenerationRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(GenerationResponse::default()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn answer(text: &str) -> Result<GenerationResponse> {
        Ok(GenerationResponse {
            text: text.into(),
            grounding: vec![GroundingReference {
                title: Some("example.com".into()),
                uri: "https://example.com".into(),
            }],
        })
    }

    fn corpus() -> Corpus {
        build_corpus(
            vec![
                RawSource::new("2512_a.json", r#"{"content": "호핑 가격은 2000페소"}"#),
                RawSource::new("2401_b.json", r#"{"content": "호핑 준비물 리스트"}"#),
            ],
            IngestMode::Merged,
        )
    }

    fn session(backend: ScriptedBackend) -> ChatSession<ScriptedBackend> {
        ChatSession::new(backend, Ranker::default(), InstructionTemplate::builtin())
    }

    #[tokio::test]
    async fn test_answered_turn_carries_context_and_history() {
        let mut chat = session(ScriptedBackend::with(vec![answer("2000페소예요")]));
        let corpus = corpus();

        let reply = chat.send(&corpus, "가격").await.unwrap();

        assert_eq!(reply.outcome, ReplyOutcome::Answered);
        assert_eq!(reply.text, "2000페소예요");
        assert_eq!(reply.documents.len(), 1);
        assert_eq!(reply.documents[0].id, "2512_a.json");
        assert_eq!(reply.grounding.len(), 1);

        let requests = chat.backend().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].message, "가격");
        assert!(requests[0].history.is_empty());
        assert!(requests[0].system_instruction.contains("호핑 가격은 2000페소"));
        assert!(!requests[0].system_instruction.contains("준비물 리스트"));

        let roles: Vec<_> = chat.history().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Model]);
    }

    #[tokio::test]
    async fn test_second_turn_sends_prior_exchange() {
        let mut chat = session(ScriptedBackend::with(vec![answer("첫 답"), answer("둘째 답")]));
        let corpus = corpus();

        chat.send(&corpus, "호핑 가격").await.unwrap();
        chat.send(&corpus, "준비물은?").await.unwrap();

        let requests = chat.backend().requests();
        let history: Vec<_> = requests[1].history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(history, vec!["호핑 가격", "첫 답"]);
        assert_eq!(chat.history().len(), 4);
    }

    #[tokio::test]
    async fn test_unmatched_query_uses_no_records_marker() {
        let mut chat = session(ScriptedBackend::with(vec![answer("모르겠어요")]));

        let reply = chat.send(&corpus(), "weather tomorrow").await.unwrap();

        assert!(reply.documents.is_empty());
        let requests = chat.backend().requests();
        assert!(requests[0].system_instruction.contains(NO_RECORDS_MARKER));
    }

    #[tokio::test]
    async fn test_backend_failure_yields_fallback_and_keeps_history() {
        let mut chat = session(ScriptedBackend::with(vec![
            answer("첫 답"),
            Err(KbChatError::Generation("HTTP 503".into())),
        ]));
        let corpus = corpus();

        chat.send(&corpus, "가격").await.unwrap();
        let reply = chat.send(&corpus, "준비물").await.unwrap();

        assert_eq!(reply.outcome, ReplyOutcome::Failed);
        assert_eq!(reply.text, FALLBACK_REPLY);
        assert!(reply.documents.is_empty());
        assert_eq!(chat.history().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_answer_is_replaced() {
        let mut chat = session(ScriptedBackend::with(vec![answer("  ")]));

        let reply = chat.send(&corpus(), "가격").await.unwrap();

        assert_eq!(reply.outcome, ReplyOutcome::Answered);
        assert_eq!(reply.text, EMPTY_REPLY);
        assert_eq!(chat.history()[1].text, EMPTY_REPLY);
    }

    #[tokio::test]
    async fn test_missing_credentials_propagate() {
        let mut chat = session(ScriptedBackend::with(vec![Err(
            KbChatError::MissingCredentials {
                env_var: "GEMINI_API_KEY".into(),
            },
        )]));

        let err = chat.send(&corpus(), "가격").await.unwrap_err();

        assert!(err.is_missing_credentials());
        assert!(chat.history().is_empty());
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected_without_calling_backend() {
        let mut chat = session(ScriptedBackend::default());

        assert!(chat.send(&corpus(), "   ").await.is_err());
        assert!(chat.backend().requests().is_empty());
    }

    #[tokio::test]
    async fn test_fixture_corpus_round_trip_through_gemini() {
        use std::path::Path;

        use kbchat_ingest::load_corpus;
        use kbchat_shared::GenerationConfig;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        use crate::generation::GeminiClient;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "1인 2000페소예요."}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let corpus = load_corpus(Path::new("../../../fixtures/data"), IngestMode::Merged)
            .expect("load fixtures");
        let client = GeminiClient::new(GenerationConfig {
            base_url: format!("{}/v1beta", server.uri()),
            ..Default::default()
        })
        .unwrap()
        .with_api_key("test-key");
        let mut chat = ChatSession::new(client, Ranker::default(), InstructionTemplate::builtin());

        let reply = chat.send(&corpus, "호핑 가격 얼마").await.unwrap();

        assert_eq!(reply.outcome, ReplyOutcome::Answered);
        assert_eq!(reply.text, "1인 2000페소예요.");
        let ids: Vec<_> = reply.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], "hopping-price");
        assert_eq!(ids[1], "2501_packing_list.json");

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        let instruction = body["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
        assert!(instruction.contains("Title: 썬마호핑 가격 정리"));
        assert!(!instruction.contains("세부 맛집 모음"));
    }

    #[tokio::test]
    async fn test_empty_corpus_still_answers() {
        let mut chat = session(ScriptedBackend::with(vec![answer("검색 결과로 답변")]));

        let reply = chat.send(&Corpus::default(), "가격").await.unwrap();

        assert_eq!(reply.outcome, ReplyOutcome::Answered);
        assert!(reply.documents.is_empty());
    }
}
