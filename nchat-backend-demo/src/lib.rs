//! Reference `Protocol` implementation backed by an in-process loopback
//! transport instead of a real network.
//!
//! Exists for two reasons: it gives the UI Model something concrete to
//! drive in integration tests, and it is the template a real backend crate
//! (Telegram, WhatsApp, Signal, …) follows to plug into [`nchat_core::Protocol`].

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use nchat_core::{
    ChatInfo, ChatMessage, ContactInfo, DownloadFileAction, FeatureSet, ProfileService,
    Protocol, ProtocolError, ProtocolFeature, Reactions, Request, Service, ServiceHandler, UserId,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DEMO_CHAT_ID: &str = "demo-chat";
const DEMO_PEER_ID: &str = "demo-peer";
const SELF_ID: &str = "demo-self";

/// A backend with no real network: requests are served by an internal task
/// that answers deterministically, suitable for tests and as a worked
/// example of the `Protocol` contract.
pub struct LoopbackProtocol {
    profile_id: String,
    features: FeatureSet,
    handler: Option<ServiceHandler>,
    request_tx: Option<mpsc::UnboundedSender<Request>>,
    worker: Option<JoinHandle<()>>,
    sequence: Arc<AtomicU64>,
}

impl LoopbackProtocol {
    pub fn new(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            features: FeatureSet::empty()
                .with(ProtocolFeature::AutoGetChatsOnLogin)
                .with(ProtocolFeature::TypingTimeout),
            handler: None,
            request_tx: None,
            worker: None,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl Protocol for LoopbackProtocol {
    fn profile_id(&self) -> &str {
        &self.profile_id
    }

    fn profile_display_name(&self) -> String {
        "Demo Account".to_string()
    }

    fn has_feature(&self, feature: ProtocolFeature) -> bool {
        self.features.has(feature)
    }

    fn self_id(&self) -> UserId {
        UserId::new(SELF_ID)
    }

    async fn setup_profile(&mut self, _profiles_dir: &Path) -> Result<String, ProtocolError> {
        Ok(self.profile_id.clone())
    }

    async fn load_profile(&mut self, _dir: &Path, profile_id: &str) -> Result<(), ProtocolError> {
        self.profile_id = profile_id.to_string();
        Ok(())
    }

    async fn close_profile(&mut self) {
        self.logout().await;
    }

    async fn login(&mut self) -> Result<(), ProtocolError> {
        let Some(handler) = self.handler.clone() else {
            return Err(ProtocolError::LoginFailed("no message handler registered".to_string()));
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<Request>();
        self.request_tx = Some(tx);

        let profile_id = self.profile_id.clone();
        let sequence = self.sequence.clone();
        let features = self.features;

        let worker = tokio::spawn(async move {
            let emit = |service: Service| {
                handler(ProfileService {
                    profile_id: profile_id.clone().into(),
                    service,
                });
            };

            emit(Service::Connect { success: true });

            while let Some(request) = rx.recv().await {
                handle_request(request, &emit, &sequence, features);
            }
        });
        self.worker = Some(worker);

        Ok(())
    }

    async fn logout(&mut self) {
        self.request_tx = None;
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }

    async fn send_request(&self, request: Request) {
        if let Some(tx) = &self.request_tx {
            let _ = tx.send(request);
        }
    }

    fn set_message_handler(&mut self, handler: ServiceHandler) {
        self.handler = Some(handler);
    }
}

fn handle_request(
    request: Request,
    emit: &impl Fn(Service),
    sequence: &AtomicU64,
    features: FeatureSet,
) {
    match request {
        Request::GetContacts => {
            emit(Service::NewContacts {
                contacts: vec![
                    ContactInfo {
                        id: UserId::new(SELF_ID),
                        name: "Me".to_string(),
                        phone: String::new(),
                        is_self: true,
                        is_alias: false,
                    },
                    ContactInfo {
                        id: UserId::new(DEMO_PEER_ID),
                        name: "Demo Peer".to_string(),
                        phone: String::new(),
                        is_self: false,
                        is_alias: false,
                    },
                ],
                full_sync: true,
            });
        }
        Request::GetChats { .. } => {
            emit(Service::NewChats {
                chats: vec![ChatInfo::new(nchat_core::ChatId::new(DEMO_CHAT_ID))],
            });
        }
        Request::GetMessages { chat_id, from_msg_id: _, limit: _ } => {
            // The loopback backend has no real history; it always answers
            // with an empty page, which is a legitimate (not erroneous)
            // response per `SPEC_FULL.md` §7 ("cache miss: not an error").
            emit(Service::NewMessages {
                chat_id,
                messages: Vec::new(),
                from_msg_id: nchat_core::MsgId::new(""),
                cached: false,
                sequence: sequence.fetch_add(1, Ordering::SeqCst),
            });
        }
        Request::SendMessage { chat_id, message } => {
            emit(Service::SendMessage {
                chat_id: chat_id.clone(),
                message: message.clone(),
                success: true,
            });
            // Echo the message back as if the peer replied, proving the
            // temporary-id-to-real-id reconciliation path end to end.
            let mut echoed = message;
            echoed.is_outgoing = false;
            echoed.sender_id = UserId::new(DEMO_PEER_ID);
            echoed.reactions = Reactions::default();
            emit(Service::NewMessages {
                chat_id,
                messages: vec![echoed],
                from_msg_id: nchat_core::MsgId::new(""),
                cached: false,
                sequence: sequence.fetch_add(1, Ordering::SeqCst),
            });
        }
        Request::MarkMessageRead { chat_id, msg_id, .. } => {
            emit(Service::MarkMessageRead { chat_id, msg_id, success: true });
        }
        Request::DeleteMessage { chat_id, msg_id } => {
            emit(Service::DeleteMessage { chat_id, msg_id, success: true });
        }
        Request::DeleteChat { chat_id } => {
            emit(Service::DeleteChat { chat_id, success: true });
        }
        Request::SendTyping { chat_id, is_typing } => {
            emit(Service::SendTyping { chat_id, is_typing, success: true });
            if features.has(ProtocolFeature::TypingTimeout) {
                emit(Service::ReceiveTyping {
                    chat_id: nchat_core::ChatId::new(DEMO_CHAT_ID),
                    user_id: UserId::new(DEMO_PEER_ID),
                    is_typing,
                });
            }
        }
        Request::SetStatus { is_online } => {
            emit(Service::SetStatus { is_online, success: true });
        }
        Request::CreateChat { .. } => {
            emit(Service::CreateChat { chat_id: nchat_core::ChatId::new(DEMO_CHAT_ID), success: true });
        }
        Request::SetCurrentChat { .. } | Request::GetStatus { .. } | Request::GetMessage { .. } => {
            // Purely informational on this backend; no notification needed.
        }
        Request::DownloadFile { chat_id, msg_id, file_id, action: _ } => {
            emit(Service::NewMessageFile {
                chat_id,
                msg_id,
                file_id,
                file_path: "/tmp/demo-download".to_string(),
            });
            let _ = DownloadFileAction::None;
        }
        Request::SendReaction { chat_id, msg_id, emoji } => {
            let mut reactions = Reactions::default();
            reactions.sender_emojis.insert(SELF_ID.to_string(), emoji.clone());
            *reactions.emoji_counts.entry(emoji).or_insert(0) += 1;
            emit(Service::NewMessageReactions { chat_id, msg_id, reactions });
        }
        Request::GetAvailableReactions { chat_id } => {
            emit(Service::AvailableReactions {
                chat_id,
                emojis: vec!["👍".to_string(), "❤️".to_string(), "😂".to_string()],
            });
        }
        Request::FindMessage { chat_id, query: _ } => {
            emit(Service::FindMessage { chat_id, msg_id: None });
        }
        Request::EditMessage { chat_id, msg_id, message } => {
            emit(Service::SendMessage { chat_id, message, success: true });
            let _ = msg_id;
        }
        Request::Reinit => {
            emit(Service::Connect { success: true });
        }
        Request::ProtocolUiControl { .. } => {
            // The Model's denial acknowledgment; this demo backend never
            // actually requests the terminal, so there is nothing to react
            // to beyond logging.
            tracing::debug!("protocol ui control denial acknowledged");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn collecting_handler() -> (ServiceHandler, Arc<Mutex<Vec<Service>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let handler: ServiceHandler = Arc::new(move |ps: ProfileService| {
            sink.lock().unwrap().push(ps.service);
        });
        (handler, received)
    }

    #[tokio::test]
    async fn login_emits_connect() {
        let mut backend = LoopbackProtocol::new("demo_1");
        let (handler, received) = collecting_handler();
        backend.set_message_handler(handler);
        backend.login().await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let messages = received.lock().unwrap();
        assert!(matches!(messages[0], Service::Connect { success: true }));
    }

    #[tokio::test]
    async fn send_message_echoes_back_as_incoming() {
        let mut backend = LoopbackProtocol::new("demo_2");
        let (handler, received) = collecting_handler();
        backend.set_message_handler(handler);
        backend.login().await.unwrap();

        let message = ChatMessage {
            id: nchat_core::MsgId::new("tmp-1"),
            sender_id: UserId::new(SELF_ID),
            text: "hi".to_string(),
            quoted_id: None,
            quoted_text: None,
            quoted_sender: None,
            file_info: None,
            link: None,
            reactions: Reactions::default(),
            time_sent: 1,
            is_outgoing: true,
            is_read: true,
            has_mention: false,
        };
        backend
            .send_request(Request::SendMessage { chat_id: nchat_core::ChatId::new(DEMO_CHAT_ID), message })
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let messages = received.lock().unwrap();
        assert!(messages.iter().any(|m| matches!(m, Service::NewMessages { messages, .. } if !messages.is_empty())));
    }

    #[test]
    fn new_backend_advertises_typing_timeout() {
        let backend = LoopbackProtocol::new("demo_3");
        assert!(backend.has_feature(ProtocolFeature::TypingTimeout));
        assert!(!backend.has_feature(ProtocolFeature::LimitedReactions));
    }
}
