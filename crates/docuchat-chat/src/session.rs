//! Conversation session: the message log and the request/response cycle.
//!
//! A turn appends the user message immediately, asks the backend, reveals the
//! answer through the [`StreamingController`] and appends the assistant
//! message once the reveal completes. Only one turn is in flight at a time.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use docuchat_core::config::{ChatConfig, StreamingConfig};
use docuchat_core::{EventBus, Message, MessageId, Role, SessionEvent};

use crate::backend::{
    AnsweringBackend, ChatRequest, HistoryEntry, ImageChatRequest, ImageUpload,
};
use crate::error::ChatError;
use crate::language::SharedLanguage;
use crate::prompt::PromptTemplateStore;
use crate::streaming::{RevealFrame, StreamingController};

/// Suggestions offered before the first question is asked.
pub const STARTER_QUESTIONS: &[&str] = &[
    "Summarize the key findings from all documents",
    "What are the main compliance requirements?",
    "Compare the different approaches mentioned",
    "Extract all important dates and deadlines",
];

/// How a submitted turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Both messages of the turn are in the log.
    Answered { user: MessageId, assistant: MessageId },
    /// The reveal was cancelled; only the user message was kept.
    Cancelled { user: MessageId },
}

/// Point-in-time view of a session for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub input: String,
    /// Visible prefix of the answer being revealed.
    pub reveal_text: Option<String>,
    pub in_flight: bool,
    pub last_error: Option<String>,
    /// File name of the attached image, if any.
    pub attached_image: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    messages: Vec<Message>,
    last_id: u64,
    in_flight: bool,
    input: String,
    reveal_text: Option<String>,
    last_error: Option<String>,
    attached_image: Option<ImageUpload>,
}

impl SessionState {
    fn next_id(&mut self) -> MessageId {
        self.last_id += 1;
        MessageId(self.last_id)
    }

    fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .map(|m| HistoryEntry {
                role: m.role.into(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }
}

/// Releases the in-flight flag however the turn ends, including when the
/// submitting future is dropped.
struct TurnGuard<'a> {
    session: &'a ConversationSession,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.session.streaming.cancel();
        let mut state = self.session.lock();
        state.in_flight = false;
        state.reveal_text = None;
    }
}

/// Owns the ordered message log of one project conversation.
pub struct ConversationSession {
    project_id: i64,
    project_name: String,
    backend: Arc<dyn AnsweringBackend>,
    streaming: StreamingController,
    prompt: Arc<PromptTemplateStore>,
    language: SharedLanguage,
    events: EventBus,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("project_id", &self.project_id)
            .field("project_name", &self.project_name)
            .field("language", &self.language.get())
            .finish_non_exhaustive()
    }
}

impl ConversationSession {
    pub fn new(
        chat: &ChatConfig,
        streaming: &StreamingConfig,
        backend: Arc<dyn AnsweringBackend>,
        prompt: Arc<PromptTemplateStore>,
        language: SharedLanguage,
        events: EventBus,
    ) -> Self {
        let session = Self {
            project_id: chat.project_id,
            project_name: chat.project_name.clone(),
            backend,
            streaming: StreamingController::new(streaming),
            prompt,
            language,
            events,
            state: Mutex::new(SessionState::default()),
        };
        if chat.greeting {
            session.seed_greeting();
        }
        session
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn seed_greeting(&self) {
        let text = format!(
            "Hello! I'm ready to help you analyze the documents in \"{}\". You can ask me \
             questions about the content, request summaries, or explore specific topics. \
             What would you like to know?",
            self.project_name
        );
        let id = {
            let mut state = self.lock();
            let id = state.next_id();
            state.messages.push(Message::assistant(id, text));
            id
        };
        self.announce(id, Role::Assistant);
    }

    fn announce(&self, id: MessageId, role: Role) {
        self.events
            .publish(SessionEvent::MessageAppended { id, role });
    }

    fn fail_turn(&self, err: ChatError) -> ChatError {
        tracing::warn!(project_id = self.project_id, error = %err, "Turn failed");
        let reason = err.to_string();
        self.lock().last_error = Some(reason.clone());
        self.events.publish(SessionEvent::TurnFailed { reason });
        err
    }

    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Ask a question about the project's documents.
    ///
    /// The user message is in the log before this first suspends. History
    /// sent to the backend is the log as it was before that message.
    pub async fn submit_question(&self, text: &str) -> Result<TurnOutcome, ChatError> {
        let language = self.language.get();
        let prompt_template = self.prompt.resolve(&language);

        let (user_id, request) = {
            let mut state = self.lock();
            if text.trim().is_empty() {
                tracing::debug!("Empty question ignored");
                return Err(ChatError::EmptyQuestion);
            }
            if state.in_flight {
                tracing::debug!("Question ignored while a turn is in flight");
                return Err(ChatError::SubmissionInFlight);
            }
            state.in_flight = true;
            state.last_error = None;

            let history = state.history();
            let id = state.next_id();
            state.messages.push(Message::user(id, text));
            state.input.clear();
            (
                id,
                ChatRequest {
                    project_id: self.project_id,
                    question: text.to_string(),
                    history,
                    language,
                    prompt_template,
                },
            )
        };
        let _guard = TurnGuard { session: self };
        self.announce(user_id, Role::User);

        tracing::info!(
            project_id = self.project_id,
            message = %user_id,
            history_len = request.history.len(),
            language = %request.language,
            "Question dispatched"
        );
        let answer = match self.backend.ask(&request).await {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail_turn(e)),
        };

        let total_chars = answer.answer.chars().count();
        let mut stream = self.streaming.reveal(answer.answer.clone());
        let mut completed = false;
        while let Some(frame) = stream.next().await {
            match frame {
                RevealFrame::Partial(text) => {
                    let visible_chars = text.chars().count();
                    self.lock().reveal_text = Some(text);
                    self.events.publish(SessionEvent::RevealProgress {
                        visible_chars,
                        total_chars,
                    });
                }
                RevealFrame::Complete(_) => {
                    completed = true;
                    break;
                }
            }
        }

        if !completed {
            tracing::info!(message = %user_id, "Answer reveal cancelled");
            return Ok(TurnOutcome::Cancelled { user: user_id });
        }

        let assistant_id = {
            let mut state = self.lock();
            let id = state.next_id();
            let mut message = Message::assistant(id, answer.answer).with_sources(answer.sources);
            if let Some(followups) = answer.followups {
                message = message.with_followups(followups);
            }
            state.messages.push(message);
            state.reveal_text = None;
            id
        };
        self.announce(assistant_id, Role::Assistant);
        tracing::info!(message = %assistant_id, chars = total_chars, "Answer received");

        Ok(TurnOutcome::Answered {
            user: user_id,
            assistant: assistant_id,
        })
    }

    /// Submit the pending input as a question.
    pub async fn submit_input(&self) -> Result<TurnOutcome, ChatError> {
        let text = self.input();
        self.submit_question(&text).await
    }

    /// Ask about the attached image.
    ///
    /// On success the user and assistant messages are appended together and
    /// the attachment is cleared. On failure nothing is appended and the
    /// attachment is kept for a retry.
    pub async fn submit_image(&self) -> Result<TurnOutcome, ChatError> {
        let language = self.language.get();
        let prompt_template = self.prompt.resolve(&language);

        let request = {
            let mut state = self.lock();
            let Some(image) = state.attached_image.clone() else {
                tracing::debug!("Image submission without an attachment ignored");
                return Err(ChatError::MissingImage);
            };
            if state.in_flight {
                tracing::debug!("Image ignored while a turn is in flight");
                return Err(ChatError::SubmissionInFlight);
            }
            state.in_flight = true;
            state.last_error = None;
            ImageChatRequest {
                project_id: self.project_id,
                image,
                language,
                prompt_template,
                history: state.history(),
            }
        };
        let _guard = TurnGuard { session: self };

        tracing::info!(
            project_id = self.project_id,
            image = %request.image.file_name,
            history_len = request.history.len(),
            "Image question dispatched"
        );
        let answer = match self.backend.ask_image(&request).await {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail_turn(e)),
        };

        let (user_id, assistant_id) = {
            let mut state = self.lock();
            let reference = answer
                .image_url
                .clone()
                .unwrap_or_else(|| request.image.file_name.clone());
            let user_id = state.next_id();
            state
                .messages
                .push(Message::user(user_id, "").with_image(reference));
            let assistant_id = state.next_id();
            state.messages.push(
                Message::assistant(assistant_id, answer.answer)
                    .with_sources(answer.sources)
                    .with_ocr_text(answer.ocr_text),
            );
            // An image attached while this turn was in flight stays attached.
            if state.attached_image.as_ref() == Some(&request.image) {
                state.attached_image = None;
            }
            (user_id, assistant_id)
        };
        self.announce(user_id, Role::User);
        self.announce(assistant_id, Role::Assistant);
        tracing::info!(message = %assistant_id, "Image answer received");

        Ok(TurnOutcome::Answered {
            user: user_id,
            assistant: assistant_id,
        })
    }

    /// Stop the answer reveal in progress. Returns whether one was running.
    pub fn cancel_reveal(&self) -> bool {
        self.streaming.cancel()
    }

    /// Put a suggested question into the input without sending it.
    pub fn select_followup(&self, text: &str) {
        self.set_input(text);
    }

    pub fn set_input(&self, text: impl Into<String>) {
        self.lock().input = text.into();
    }

    pub fn input(&self) -> String {
        self.lock().input.clone()
    }

    pub fn attach_image(&self, image: ImageUpload) {
        tracing::debug!(image = %image.file_name, bytes = image.bytes.len(), "Image attached");
        self.lock().attached_image = Some(image);
    }

    pub fn detach_image(&self) -> Option<ImageUpload> {
        self.lock().attached_image.take()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.lock().messages.iter().find(|m| m.id == id).cloned()
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Starter questions, offered only until the first question is asked.
    pub fn starter_questions(&self) -> &'static [&'static str] {
        if self.lock().has_user_message() {
            &[]
        } else {
            STARTER_QUESTIONS
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            messages: state.messages.clone(),
            input: state.input.clone(),
            reveal_text: state.reveal_text.clone(),
            in_flight: state.in_flight,
            last_error: state.last_error.clone(),
            attached_image: state.attached_image.as_ref().map(|i| i.file_name.clone()),
        }
    }

    /// Copy captured transcripts into the pending input.
    pub fn watch_transcripts(
        self: &Arc<Self>,
        mut rx: broadcast::Receiver<SessionEvent>,
    ) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = rx.recv().await;
                let Some(session) = weak.upgrade() else {
                    break;
                };
                match event {
                    Ok(SessionEvent::TranscriptCaptured { text }) => {
                        tracing::debug!(len = text.len(), "Transcript moved to input");
                        session.set_input(text);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Session listener lagged behind events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use docuchat_core::SourceRef;

    use crate::backend::{ChatAnswer, ImageAnswer};
    use crate::prompt::default_template;

    #[derive(Default)]
    struct FakeBackend {
        answers: Mutex<VecDeque<Result<ChatAnswer, ChatError>>>,
        image_answers: Mutex<VecDeque<Result<ImageAnswer, ChatError>>>,
        requests: Mutex<Vec<ChatRequest>>,
        image_requests: Mutex<Vec<ImageChatRequest>>,
        delay: Option<Duration>,
    }

    impl FakeBackend {
        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn answer(&self, answer: Result<ChatAnswer, ChatError>) {
            self.answers.lock().unwrap().push_back(answer);
        }

        fn image_answer(&self, answer: Result<ImageAnswer, ChatError>) {
            self.image_answers.lock().unwrap().push_back(answer);
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AnsweringBackend for FakeBackend {
        async fn ask(&self, request: &ChatRequest) -> Result<ChatAnswer, ChatError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.answers.lock().unwrap().pop_front();
            next.unwrap_or_else(|| {
                Ok(ChatAnswer {
                    answer: "ok".to_string(),
                    ..ChatAnswer::default()
                })
            })
        }

        async fn ask_image(&self, request: &ImageChatRequest) -> Result<ImageAnswer, ChatError> {
            self.image_requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.image_answers.lock().unwrap().pop_front();
            next.unwrap_or_else(|| {
                Ok(ImageAnswer {
                    answer: "an image".to_string(),
                    ..ImageAnswer::default()
                })
            })
        }
    }

    fn session_with(backend: Arc<FakeBackend>, chat: ChatConfig) -> (Arc<ConversationSession>, EventBus) {
        let events = EventBus::new();
        let session = ConversationSession::new(
            &chat,
            &StreamingConfig::default(),
            backend,
            Arc::new(PromptTemplateStore::new()),
            SharedLanguage::default(),
            events.clone(),
        );
        (Arc::new(session), events)
    }

    fn project(id: i64) -> ChatConfig {
        ChatConfig {
            project_id: id,
            ..ChatConfig::default()
        }
    }

    async fn settle(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_question_request_body() {
        let backend = Arc::new(FakeBackend::default());
        let (session, _) = session_with(Arc::clone(&backend), project(7));

        session.submit_question("What are the deadlines?").await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        let body = serde_json::to_value(&requests[0]).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "project_id": 7,
                "question": "What are the deadlines?",
                "history": [],
                "language": "en",
                "prompt_template": default_template("en"),
            })
        );
        assert!(requests[0].prompt_template.contains("en"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_turns_alternate_with_increasing_ids() {
        let backend = Arc::new(FakeBackend::default());
        let (session, _) = session_with(Arc::clone(&backend), project(1));

        let first = session.submit_question("one").await.unwrap();
        let second = session.submit_question("two").await.unwrap();
        assert_eq!(
            first,
            TurnOutcome::Answered {
                user: MessageId(1),
                assistant: MessageId(2)
            }
        );
        assert_eq!(
            second,
            TurnOutcome::Answered {
                user: MessageId(3),
                assistant: MessageId(4)
            }
        );

        let messages = session.messages();
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert!(messages.windows(2).all(|w| w[0].id < w[1].id));

        // Second request carries the first turn, not the new question
        let history = &backend.requests()[1].history;
        let wire = serde_json::to_value(history).unwrap();
        assert_eq!(
            wire,
            serde_json::json!([
                {"role": "user", "content": "one"},
                {"role": "ai", "content": "ok"},
            ])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_question_is_rejected_locally() {
        let backend = Arc::new(FakeBackend::default());
        let (session, _) = session_with(Arc::clone(&backend), project(1));

        let err = session.submit_question("   \n").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyQuestion));
        assert!(err.is_rejection());
        assert!(session.messages().is_empty());
        assert!(backend.requests().is_empty());
        assert!(!session.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submission_while_in_flight_is_ignored() {
        let backend = Arc::new(FakeBackend::slow(Duration::from_secs(1)));
        let (session, _) = session_with(Arc::clone(&backend), project(1));

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.submit_question("first").await })
        };
        settle(1).await;

        assert!(session.is_in_flight());
        let err = session.submit_question("second").await.unwrap_err();
        assert!(matches!(err, ChatError::SubmissionInFlight));
        assert_eq!(session.messages().len(), 1);
        assert_eq!(backend.requests().len(), 1);

        first.await.unwrap().unwrap();
        assert_eq!(session.messages().len(), 2);
        assert!(!session.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_keeps_only_user_message() {
        let backend = Arc::new(FakeBackend::default());
        backend.answer(Err(ChatError::Transport("HTTP 502".to_string())));
        let (session, events) = session_with(Arc::clone(&backend), project(1));
        let mut rx = events.subscribe();

        let err = session.submit_question("hello?").await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
        assert!(!err.is_rejection());

        let messages = session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert!(!session.is_in_flight());
        assert_eq!(session.last_error().as_deref(), Some("transport error: HTTP 502"));

        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SessionEvent::TurnFailed { .. }) {
                saw_failure = true;
            }
        }
        assert!(saw_failure);

        // A retry is possible and clears the error
        session.submit_question("hello?").await.unwrap();
        assert_eq!(session.messages().len(), 3);
        assert!(session.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_carries_sources_and_followups() {
        let backend = Arc::new(FakeBackend::default());
        backend.answer(Ok(ChatAnswer {
            answer: "Filing is due March 3.".to_string(),
            sources: vec![SourceRef {
                document_name: "Policy.pdf".to_string(),
                page_number: Some(12),
            }],
            followups: Some(vec!["What if I miss it?".to_string()]),
        }));
        let (session, _) = session_with(Arc::clone(&backend), project(1));

        session.submit_question("When is filing due?").await.unwrap();

        let assistant = session.message(MessageId(2)).unwrap();
        assert_eq!(assistant.content, "Filing is due March 3.");
        assert_eq!(assistant.sources[0].to_string(), "Policy.pdf (p.12)");
        assert_eq!(
            assistant.followups,
            Some(vec!["What if I miss it?".to_string()])
        );
        assert!(assistant.ocr_text.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_template_and_language_are_sent() {
        let backend = Arc::new(FakeBackend::default());
        let events = EventBus::new();
        let prompt = Arc::new(PromptTemplateStore::new());
        let language = SharedLanguage::new("de");
        let session = ConversationSession::new(
            &project(3),
            &StreamingConfig::default(),
            Arc::clone(&backend) as Arc<dyn AnsweringBackend>,
            Arc::clone(&prompt),
            language.clone(),
            events,
        );

        session.submit_question("a").await.unwrap();
        prompt.set_template("Only {question}");
        language.set("ja").unwrap();
        session.submit_question("b").await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests[0].language, "de");
        assert_eq!(requests[0].prompt_template, default_template("de"));
        assert_eq!(requests[1].language, "ja");
        assert_eq!(requests[1].prompt_template, "Only {question}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_progress_then_cancel() {
        let backend = Arc::new(FakeBackend::default());
        backend.answer(Ok(ChatAnswer {
            answer: "This answer is long enough to be cancelled mid reveal.".to_string(),
            ..ChatAnswer::default()
        }));
        let (session, events) = session_with(Arc::clone(&backend), project(1));
        let mut rx = events.subscribe();

        let turn = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.submit_question("go").await })
        };
        settle(65).await;

        let snapshot = session.snapshot();
        assert!(snapshot.in_flight);
        assert_eq!(snapshot.reveal_text.as_deref(), Some("This answe"));

        assert!(session.cancel_reveal());
        let outcome = turn.await.unwrap().unwrap();
        assert_eq!(outcome, TurnOutcome::Cancelled { user: MessageId(1) });

        let snapshot = session.snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert!(snapshot.reveal_text.is_none());
        assert!(!snapshot.in_flight);

        let mut progress = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::RevealProgress { visible_chars, total_chars } = event {
                assert_eq!(total_chars, 54);
                progress.push(visible_chars);
            }
        }
        assert_eq!(progress, vec![5, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_appended_events_in_order() {
        let backend = Arc::new(FakeBackend::default());
        let (session, events) = session_with(Arc::clone(&backend), project(1));
        let mut rx = events.subscribe();

        session.submit_question("q").await.unwrap();

        let mut appended = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::MessageAppended { id, role } = event {
                appended.push((id, role));
            }
        }
        assert_eq!(
            appended,
            vec![(MessageId(1), Role::User), (MessageId(2), Role::Assistant)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_requires_attachment() {
        let backend = Arc::new(FakeBackend::default());
        let (session, _) = session_with(Arc::clone(&backend), project(1));

        let err = session.submit_image().await.unwrap_err();
        assert!(matches!(err, ChatError::MissingImage));
        assert!(err.is_rejection());
        assert!(backend.image_requests.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_success_appends_pair() {
        let backend = Arc::new(FakeBackend::default());
        backend.image_answer(Ok(ImageAnswer {
            answer: "A bar chart of revenue.".to_string(),
            ocr_text: Some("Q3 Revenue".to_string()),
            sources: vec![],
            image_url: Some("/static/chat_images/abc.png".to_string()),
        }));
        let (session, _) = session_with(Arc::clone(&backend), project(5));
        session.submit_question("context first").await.unwrap();

        session.attach_image(ImageUpload::new("chart.png", vec![1, 2, 3]));
        assert_eq!(session.snapshot().attached_image.as_deref(), Some("chart.png"));

        let outcome = session.submit_image().await.unwrap();
        assert_eq!(
            outcome,
            TurnOutcome::Answered {
                user: MessageId(3),
                assistant: MessageId(4)
            }
        );

        let messages = session.messages();
        let user = &messages[2];
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "");
        assert_eq!(user.attached_image.as_deref(), Some("/static/chat_images/abc.png"));
        let assistant = &messages[3];
        assert_eq!(assistant.content, "A bar chart of revenue.");
        assert_eq!(assistant.ocr_text.as_deref(), Some("Q3 Revenue"));
        assert!(session.snapshot().attached_image.is_none());

        let sent = backend.image_requests.lock().unwrap()[0].clone();
        assert_eq!(sent.project_id, 5);
        assert_eq!(sent.history.len(), 2);
        assert_eq!(sent.image.bytes, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_without_url_references_file_name() {
        let backend = Arc::new(FakeBackend::default());
        let (session, _) = session_with(Arc::clone(&backend), project(1));

        session.attach_image(ImageUpload::new("scan.jpg", vec![0]));
        session.submit_image().await.unwrap();
        assert_eq!(
            session.messages()[0].attached_image.as_deref(),
            Some("scan.jpg")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_failure_appends_nothing_and_keeps_attachment() {
        let backend = Arc::new(FakeBackend::default());
        backend.image_answer(Err(ChatError::Timeout));
        let (session, _) = session_with(Arc::clone(&backend), project(1));

        session.attach_image(ImageUpload::new("scan.jpg", vec![0]));
        let err = session.submit_image().await.unwrap_err();
        assert!(matches!(err, ChatError::Timeout));
        assert!(session.messages().is_empty());
        assert_eq!(session.snapshot().attached_image.as_deref(), Some("scan.jpg"));
        assert!(session.last_error().is_some());
        assert!(!session.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_attached_mid_turn_survives_completion() {
        let backend = Arc::new(FakeBackend::slow(Duration::from_secs(1)));
        let (session, _) = session_with(Arc::clone(&backend), project(1));

        session.attach_image(ImageUpload::new("a.png", vec![1]));
        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.submit_image().await })
        };
        settle(1).await;

        session.attach_image(ImageUpload::new("b.png", vec![2]));
        let err = session.submit_image().await.unwrap_err();
        assert!(matches!(err, ChatError::SubmissionInFlight));

        first.await.unwrap().unwrap();
        assert_eq!(session.messages()[0].attached_image.as_deref(), Some("a.png"));
        assert_eq!(session.snapshot().attached_image.as_deref(), Some("b.png"));
        assert_eq!(backend.image_requests.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_followup_fills_input_without_sending() {
        let backend = Arc::new(FakeBackend::default());
        let (session, _) = session_with(Arc::clone(&backend), project(1));

        session.select_followup("What are the penalties?");
        assert_eq!(session.input(), "What are the penalties?");
        assert!(backend.requests().is_empty());

        session.submit_input().await.unwrap();
        assert_eq!(backend.requests()[0].question, "What are the penalties?");
        assert_eq!(session.input(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_input_is_kept() {
        let backend = Arc::new(FakeBackend::slow(Duration::from_secs(1)));
        let (session, _) = session_with(Arc::clone(&backend), project(1));

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.submit_question("first").await })
        };
        settle(1).await;

        session.set_input("draft");
        assert!(session.submit_input().await.is_err());
        assert_eq!(session.input(), "draft");
        first.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_starter_questions_until_first_question() {
        let backend = Arc::new(FakeBackend::default());
        let (session, _) = session_with(Arc::clone(&backend), project(1));

        assert_eq!(session.starter_questions().len(), 4);
        session.submit_question("anything").await.unwrap();
        assert!(session.starter_questions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_greeting_seeds_log() {
        let backend = Arc::new(FakeBackend::default());
        let chat = ChatConfig {
            project_id: 2,
            project_name: "Contracts".to_string(),
            greeting: true,
        };
        let (session, _) = session_with(Arc::clone(&backend), chat);

        let messages = session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Assistant);
        assert!(messages[0].content.contains("\"Contracts\""));
        assert_eq!(session.starter_questions().len(), 4);

        session.submit_question("q").await.unwrap();
        let history = &backend.requests()[0].history;
        assert_eq!(history.len(), 1);
        assert_eq!(session.messages()[1].id, MessageId(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transcript_event_fills_input() {
        let backend = Arc::new(FakeBackend::default());
        let (session, events) = session_with(Arc::clone(&backend), project(1));
        let listener = session.watch_transcripts(events.subscribe());

        events.publish(SessionEvent::TranscriptCaptured {
            text: "summarize the contract".to_string(),
        });
        settle(1).await;

        assert_eq!(session.input(), "summarize the contract");
        assert!(backend.requests().is_empty());
        listener.abort();
    }
}
