use std::sync::Arc;

use application::{
    ChatHub, ConversationService, GroupService, MessageService, UserService,
};
use config::HistoryConfig;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ChatHub>,
    pub user_service: Arc<UserService>,
    pub conversation_service: Arc<ConversationService>,
    pub group_service: Arc<GroupService>,
    pub message_service: Arc<MessageService>,
    pub jwt_service: Arc<JwtService>,
    pub history: HistoryConfig,
}
