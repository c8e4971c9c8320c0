//! 实时事件契约
//!
//! 入站与出站事件的线上形状。事件名与载荷字段沿用既有客户端
//! 协议（camelCase），由 serde 标签化枚举承载。

use serde::{Deserialize, Serialize};

use domain::{
    ConversationId, LastMessage, MessageId, MessageStatus, Timestamp, UserId,
};

use crate::shape::{ShapedConversation, ShapedMessage};

/// 客户端 → 服务端事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// 订阅会话房间，载荷为会话 id
    #[serde(rename = "conversation:join")]
    ConversationJoin(ConversationId),

    #[serde(rename = "message:send", rename_all = "camelCase")]
    MessageSend {
        conversation_id: ConversationId,
        text: String,
        #[serde(default)]
        reply_to_id: Option<MessageId>,
    },

    #[serde(rename = "message:edit", rename_all = "camelCase")]
    MessageEdit {
        conversation_id: ConversationId,
        message_id: MessageId,
        text: String,
    },

    #[serde(rename = "message:delete", rename_all = "camelCase")]
    MessageDelete {
        conversation_id: ConversationId,
        message_id: MessageId,
    },

    /// 会话被查看，载荷为会话 id
    #[serde(rename = "conversation:seen")]
    ConversationSeen(ConversationId),

    #[serde(rename = "typing:start", rename_all = "camelCase")]
    TypingStart { conversation_id: ConversationId },

    #[serde(rename = "typing:stop", rename_all = "camelCase")]
    TypingStop { conversation_id: ConversationId },
}

/// 服务端 → 客户端事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// 连接建立时一次性下发的在线用户快照
    #[serde(rename = "presence:onlineUsers", rename_all = "camelCase")]
    OnlineUsers { user_ids: Vec<UserId> },

    #[serde(rename = "presence:update", rename_all = "camelCase")]
    PresenceUpdate {
        user_id: UserId,
        is_online: bool,
        last_seen: Option<Timestamp>,
    },

    #[serde(rename = "message:new")]
    MessageNew(ShapedMessage),

    #[serde(rename = "message:updated", rename_all = "camelCase")]
    MessageUpdated {
        id: MessageId,
        conversation_id: ConversationId,
        text: String,
        status: MessageStatus,
        is_edited: bool,
        edited_at: Option<Timestamp>,
        is_deleted: bool,
        deleted_at: Option<Timestamp>,
        last_message: Option<LastMessage>,
        updated_at: Option<Timestamp>,
    },

    #[serde(rename = "message:deleted", rename_all = "camelCase")]
    MessageDeleted {
        id: MessageId,
        conversation_id: ConversationId,
        is_deleted: bool,
        deleted_at: Option<Timestamp>,
        last_message: Option<LastMessage>,
        updated_at: Option<Timestamp>,
    },

    /// 发送者自己的设备刷新侧边栏
    #[serde(rename = "conversation:update", rename_all = "camelCase")]
    ConversationUpdate {
        conversation_id: ConversationId,
        last_message: Option<LastMessage>,
        updated_at: Timestamp,
    },

    /// 给尚未订阅会话房间的成员的整份会话推送
    #[serde(rename = "conversation:new")]
    ConversationNew(ShapedConversation),

    #[serde(rename = "conversation:seen", rename_all = "camelCase")]
    ConversationSeen {
        conversation_id: ConversationId,
        seen_by: UserId,
    },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing {
        conversation_id: ConversationId,
        user_id: UserId,
        is_typing: bool,
    },

    /// 发送因屏蔽被拒绝，仅回给发送方
    #[serde(rename = "message:blocked", rename_all = "camelCase")]
    MessageBlocked {
        conversation_id: ConversationId,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn client_events_use_protocol_names() {
        let conversation = ConversationId::new(Uuid::new_v4());
        let raw = json!({
            "event": "message:send",
            "data": {
                "conversationId": conversation,
                "text": "hi"
            }
        });

        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::MessageSend {
                conversation_id: conversation,
                text: "hi".into(),
                reply_to_id: None,
            }
        );
    }

    #[test]
    fn join_payload_is_a_bare_conversation_id() {
        let conversation = ConversationId::new(Uuid::new_v4());
        let raw = json!({
            "event": "conversation:join",
            "data": conversation
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event, ClientEvent::ConversationJoin(conversation));
    }

    #[test]
    fn server_events_serialize_camel_case() {
        let user = UserId::generate();
        let event = ServerEvent::PresenceUpdate {
            user_id: user,
            is_online: true,
            last_seen: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "presence:update");
        assert_eq!(value["data"]["userId"], serde_json::to_value(user).unwrap());
        assert_eq!(value["data"]["isOnline"], true);
    }

    #[test]
    fn typing_events_roundtrip() {
        let conversation = ConversationId::generate();
        let raw = json!({
            "event": "typing:start",
            "data": { "conversationId": conversation }
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::TypingStart {
                conversation_id: conversation
            }
        );
    }
}
