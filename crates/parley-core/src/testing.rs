//! In-memory fakes shared by the unit tests in this crate.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use parley_types::chat::{Chat, ChatMessage, LogEntry};
use parley_types::error::{AttachmentError, DeliveryError, ModelError, RepositoryError};
use parley_types::model::{ModelRequest, ModelResponse};
use parley_types::subscription::{Payment, Subscription, SubscriptionPlan, SubscriptionStatus};
use parley_types::user::{User, UserRole};

use crate::attachment::TextExtractor;
use crate::model::provider::{FragmentStream, ModelProvider};
use crate::repository::{ChatRepository, SubscriptionRepository, UserRepository};
use crate::transport::{ChatRef, MessageRef, Transport};

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MemoryUserRepo {
    users: Arc<Mutex<HashMap<i64, User>>>,
    logs: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self {
            users: Arc::new(Mutex::new(HashMap::new())),
            logs: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl UserRepository for MemoryUserRepo {
    async fn upsert_user(&self, id: i64, name: &str) -> Result<User, RepositoryError> {
        let mut users = self.users.lock().unwrap();
        let user = users.entry(id).or_insert_with(|| User {
            id,
            name: name.to_string(),
            role: UserRole::User,
            current_chat_id: None,
        });
        user.name = name.to_string();
        Ok(user.clone())
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.users.lock().unwrap().values().cloned().collect())
    }

    async fn set_current_chat(
        &self,
        user_id: i64,
        chat_id: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&user_id).ok_or(RepositoryError::NotFound)?;
        user.current_chat_id = chat_id;
        Ok(())
    }

    async fn delete_user(&self, user_id: i64) -> Result<(), RepositoryError> {
        self.users.lock().unwrap().remove(&user_id);
        Ok(())
    }

    async fn write_log(&self, entry: &LogEntry) -> Result<(), RepositoryError> {
        self.logs.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryChatRepo {
    chats: Arc<Mutex<Vec<Chat>>>,
    messages: Arc<Mutex<Vec<ChatMessage>>>,
}

impl MemoryChatRepo {
    pub fn new() -> Self {
        Self {
            chats: Arc::new(Mutex::new(Vec::new())),
            messages: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ChatRepository for MemoryChatRepo {
    async fn create_chat(&self, chat: &Chat) -> Result<(), RepositoryError> {
        self.chats.lock().unwrap().push(chat.clone());
        Ok(())
    }

    async fn get_chat(&self, chat_id: &Uuid, user_id: i64) -> Result<Option<Chat>, RepositoryError> {
        Ok(self
            .chats
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == *chat_id && c.user_id == user_id)
            .cloned())
    }

    async fn list_chats(&self, user_id: i64) -> Result<Vec<Chat>, RepositoryError> {
        let mut chats: Vec<Chat> = self
            .chats
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        chats.sort_by_key(|c| c.created_at);
        Ok(chats)
    }

    async fn delete_chat(&self, user_id: i64, chat_id: &Uuid) -> Result<(), RepositoryError> {
        self.chats
            .lock()
            .unwrap()
            .retain(|c| !(c.id == *chat_id && c.user_id == user_id));
        self.messages.lock().unwrap().retain(|m| m.chat_id != *chat_id);
        Ok(())
    }

    async fn save_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn get_history(&self, chat_id: &Uuid) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut messages: Vec<ChatMessage> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == *chat_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn count_messages(&self, chat_id: &Uuid) -> Result<u64, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == *chat_id)
            .count() as u64)
    }
}

#[derive(Clone)]
pub struct MemorySubscriptionRepo {
    plans: Arc<Mutex<Vec<SubscriptionPlan>>>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    payments: Arc<Mutex<Vec<Payment>>>,
}

impl MemorySubscriptionRepo {
    pub fn new() -> Self {
        Self {
            plans: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            payments: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl SubscriptionRepository for MemorySubscriptionRepo {
    async fn create_plan(&self, plan: &SubscriptionPlan) -> Result<(), RepositoryError> {
        self.plans.lock().unwrap().push(plan.clone());
        Ok(())
    }

    async fn get_plan(&self, plan_id: &Uuid) -> Result<Option<SubscriptionPlan>, RepositoryError> {
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == *plan_id)
            .cloned())
    }

    async fn get_plan_by_name(
        &self,
        name: &str,
    ) -> Result<Option<SubscriptionPlan>, RepositoryError> {
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn list_plans(&self) -> Result<Vec<SubscriptionPlan>, RepositoryError> {
        Ok(self.plans.lock().unwrap().clone())
    }

    async fn update_plan(&self, plan: &SubscriptionPlan) -> Result<(), RepositoryError> {
        let mut plans = self.plans.lock().unwrap();
        let slot = plans
            .iter_mut()
            .find(|p| p.id == plan.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = plan.clone();
        Ok(())
    }

    async fn delete_plan(&self, plan_id: &Uuid) -> Result<(), RepositoryError> {
        self.plans.lock().unwrap().retain(|p| p.id != *plan_id);
        Ok(())
    }

    async fn create_subscription(&self, subscription: &Subscription) -> Result<(), RepositoryError> {
        self.subscriptions.lock().unwrap().push(subscription.clone());
        Ok(())
    }

    async fn list_subscriptions(&self, user_id: i64) -> Result<Vec<Subscription>, RepositoryError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_subscription_status(
        &self,
        subscription_id: &Uuid,
        status: SubscriptionStatus,
    ) -> Result<(), RepositoryError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let slot = subscriptions
            .iter_mut()
            .find(|s| s.id == *subscription_id)
            .ok_or(RepositoryError::NotFound)?;
        slot.status = status;
        Ok(())
    }

    async fn create_payment(&self, payment: &Payment) -> Result<(), RepositoryError> {
        self.payments.lock().unwrap().push(payment.clone());
        Ok(())
    }

    async fn list_payments(&self, subscription_id: &Uuid) -> Result<Vec<Payment>, RepositoryError> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.subscription_id == *subscription_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeTransportInner {
    sent: Mutex<Vec<(i64, String)>>,
    edits: Mutex<Vec<(i64, String)>>,
    photos: Mutex<Vec<Vec<u8>>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    next_message_id: AtomicI64,
    fail_edits: AtomicBool,
}

/// Records everything it is asked to deliver.
#[derive(Clone, Default)]
pub struct FakeTransport {
    inner: Arc<FakeTransportInner>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage bytes to be "downloaded" for a file id.
    pub fn stage_file(&self, file_id: &str, bytes: Vec<u8>) {
        self.inner
            .files
            .lock()
            .unwrap()
            .insert(file_id.to_string(), bytes);
    }

    /// Make every subsequent edit fail with a delivery error.
    pub fn fail_edits(&self) {
        self.inner.fail_edits.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<(i64, String)> {
        self.inner.edits.lock().unwrap().clone()
    }

    pub fn photos(&self) -> Vec<Vec<u8>> {
        self.inner.photos.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    async fn send(&self, chat: ChatRef, text: &str) -> Result<MessageRef, DeliveryError> {
        self.inner
            .sent
            .lock()
            .unwrap()
            .push((chat.0, text.to_string()));
        let id = self.inner.next_message_id.fetch_add(1, Ordering::SeqCst);
        Ok(MessageRef(id))
    }

    async fn send_photo(&self, chat: ChatRef, image: &[u8]) -> Result<MessageRef, DeliveryError> {
        let _ = chat;
        self.inner.photos.lock().unwrap().push(image.to_vec());
        let id = self.inner.next_message_id.fetch_add(1, Ordering::SeqCst);
        Ok(MessageRef(id))
    }

    async fn edit(
        &self,
        _chat: ChatRef,
        message: MessageRef,
        text: &str,
    ) -> Result<(), DeliveryError> {
        if self.inner.fail_edits.load(Ordering::SeqCst) {
            return Err(DeliveryError::Edit("rate limited".to_string()));
        }
        self.inner
            .edits
            .lock()
            .unwrap()
            .push((message.0, text.to_string()));
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64, DeliveryError> {
        let bytes = self
            .inner
            .files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| DeliveryError::Download(format!("unknown file id '{file_id}'")))?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| DeliveryError::Download(e.to_string()))?;
        Ok(bytes.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Text extraction
// ---------------------------------------------------------------------------

enum StubBehavior {
    Ok(String),
    Fail(fn() -> AttachmentError),
    Panic,
}

/// Canned text extractor.
pub struct StubExtractor {
    behavior: StubBehavior,
}

impl StubExtractor {
    pub fn ok(text: &str) -> Self {
        Self {
            behavior: StubBehavior::Ok(text.to_string()),
        }
    }

    pub fn failing(error: AttachmentError) -> Self {
        // Stored as a constructor so the error can be produced per call.
        let make: fn() -> AttachmentError = match error {
            AttachmentError::Decoding => || AttachmentError::Decoding,
            AttachmentError::WordRead => || AttachmentError::WordRead,
            AttachmentError::PdfRead => || AttachmentError::PdfRead,
            _ => || AttachmentError::Unexpected("stubbed failure".to_string()),
        };
        Self {
            behavior: StubBehavior::Fail(make),
        }
    }

    /// Panics if extraction is ever reached -- for tests asserting that
    /// validation rejects the file first.
    pub fn panicking() -> Self {
        Self {
            behavior: StubBehavior::Panic,
        }
    }
}

impl TextExtractor for StubExtractor {
    async fn extract(&self, _path: &Path, _extension: &str) -> Result<String, AttachmentError> {
        match &self.behavior {
            StubBehavior::Ok(text) => Ok(text.clone()),
            StubBehavior::Fail(make) => Err(make()),
            StubBehavior::Panic => panic!("extraction must not run"),
        }
    }
}

// ---------------------------------------------------------------------------
// Model provider
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Script {
    Fragments(Vec<String>),
    FailAfter(Vec<String>),
}

struct ScriptedInner {
    script: Script,
    requests: Mutex<Vec<ModelRequest>>,
}

/// Replays a scripted response and records every request it receives.
#[derive(Clone)]
pub struct ScriptedProvider {
    inner: Arc<ScriptedInner>,
}

impl ScriptedProvider {
    pub fn with_fragments(fragments: &[&str]) -> Self {
        Self {
            inner: Arc::new(ScriptedInner {
                script: Script::Fragments(fragments.iter().map(|s| s.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Yields `fragments`, then an invocation error.
    pub fn failing_after(fragments: &[&str]) -> Self {
        Self {
            inner: Arc::new(ScriptedInner {
                script: Script::FailAfter(fragments.iter().map(|s| s.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    fn record(&self, request: &ModelRequest) {
        self.inner.requests.lock().unwrap().push(request.clone());
    }
}

impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        self.record(request);
        match &self.inner.script {
            Script::Fragments(fragments) => Ok(ModelResponse {
                content: fragments.concat(),
                model: request.model.clone(),
            }),
            Script::FailAfter(_) => Err(ModelError::Invocation("scripted failure".to_string())),
        }
    }

    fn stream(&self, request: ModelRequest) -> FragmentStream {
        self.record(&request);
        let items: Vec<Result<String, ModelError>> = match &self.inner.script {
            Script::Fragments(fragments) => fragments.iter().cloned().map(Ok).collect(),
            Script::FailAfter(fragments) => fragments
                .iter()
                .cloned()
                .map(Ok)
                .chain(std::iter::once(Err(ModelError::Stream(
                    "scripted stream failure".to_string(),
                ))))
                .collect(),
        };
        Box::pin(futures_util::stream::iter(items))
    }
}
