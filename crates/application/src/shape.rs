//! 出站数据形状
//!
//! REST 读路径和实时推送路径共用这些命名结构，保证同一资源在
//! 两条通道上的线上形状逐字段一致。已删除消息的正文在这里遮蔽。

use serde::{Deserialize, Serialize};

use domain::{
    Conversation, ConversationId, LastMessage, Message, MessageId, MessageKind, MessageStatus,
    Timestamp, UserId, UserProfile,
};

/// 用户摘要（连接时快照的展示字段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub last_seen: Option<Timestamp>,
}

impl UserSummary {
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            id: profile.id,
            username: profile.username.as_str().to_owned(),
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
            last_seen: profile.last_seen,
        }
    }
}

/// 被回复消息的轻量预览
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub id: MessageId,
    pub text: String,
    pub is_deleted: bool,
    pub sender: Option<UserSummary>,
}

/// 表情反应的聚合视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionView {
    pub emoji: String,
    pub count: usize,
    pub reacted_by_me: bool,
}

/// 完整的消息出站形状
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapedMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub created_at: Timestamp,
    pub status: MessageStatus,
    pub is_edited: bool,
    pub edited_at: Option<Timestamp>,
    pub is_deleted: bool,
    pub deleted_at: Option<Timestamp>,
    pub reply_to: Option<ReplyPreview>,
    pub sender: UserSummary,
    pub reactions: Vec<ReactionView>,
    pub star_count: usize,
    pub starred_by_me: bool,
}

/// 完整的会话出站形状
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapedConversation {
    pub id: ConversationId,
    pub is_group: bool,
    /// 群组名，或一对一会话中对方的展示名
    pub name: String,
    pub avatar_url: String,
    pub participants: Vec<UserSummary>,
    pub other_participant: Option<UserSummary>,
    pub last_message: Option<LastMessage>,
    pub updated_at: Timestamp,
    pub unread_count: u64,
    pub created_by: Option<UserId>,
    pub admins: Vec<UserId>,
    pub invite_code: Option<String>,
}

/// 遮蔽已删除消息的正文
fn masked_text(message: &Message) -> String {
    if message.is_deleted {
        String::new()
    } else {
        message.text.clone()
    }
}

/// 为被回复的消息构造预览
pub fn shape_reply_preview(message: &Message, sender: Option<UserSummary>) -> ReplyPreview {
    ReplyPreview {
        id: message.id,
        text: masked_text(message),
        is_deleted: message.is_deleted,
        sender,
    }
}

/// 为单条消息构造出站形状。
/// `viewer` 为 None 时（广播场景）reactedByMe / starredByMe 恒为 false。
pub fn shape_message(
    message: &Message,
    sender: UserSummary,
    reply_to: Option<ReplyPreview>,
    viewer: Option<UserId>,
) -> ShapedMessage {
    let reactions = message
        .reactions
        .iter()
        .map(|r| ReactionView {
            emoji: r.emoji.clone(),
            count: r.users.len(),
            reacted_by_me: viewer.map(|v| r.users.contains(&v)).unwrap_or(false),
        })
        .collect();
    ShapedMessage {
        id: message.id,
        conversation_id: message.conversation_id,
        text: masked_text(message),
        kind: message.kind,
        created_at: message.created_at,
        status: message.status,
        is_edited: message.is_edited,
        edited_at: message.edited_at,
        is_deleted: message.is_deleted,
        deleted_at: message.deleted_at,
        reply_to,
        sender,
        reactions,
        star_count: message.starred_by.len(),
        starred_by_me: viewer
            .map(|v| message.is_starred_by(v))
            .unwrap_or(false),
    }
}

/// 以 viewer 的视角为会话构造出站形状。
/// 一对一会话的名称和头像解析为对方的展示字段。
pub fn shape_conversation(
    conversation: &Conversation,
    profiles: &[UserProfile],
    viewer: UserId,
    unread_count: u64,
) -> ShapedConversation {
    let participants: Vec<UserSummary> = conversation
        .participants
        .iter()
        .filter_map(|id| profiles.iter().find(|p| p.id == *id))
        .map(UserSummary::from_profile)
        .collect();

    let other_participant = if conversation.is_group {
        None
    } else {
        participants.iter().find(|p| p.id != viewer).cloned()
    };

    let name = if conversation.is_group {
        conversation
            .name
            .clone()
            .unwrap_or_else(|| "New group".to_owned())
    } else {
        other_participant
            .as_ref()
            .map(|p| {
                if p.display_name.is_empty() {
                    p.username.clone()
                } else {
                    p.display_name.clone()
                }
            })
            .unwrap_or_default()
    };

    let avatar_url = if conversation.is_group {
        conversation.avatar_url.clone().unwrap_or_default()
    } else {
        other_participant
            .as_ref()
            .and_then(|p| p.avatar_url.clone())
            .unwrap_or_default()
    };

    ShapedConversation {
        id: conversation.id,
        is_group: conversation.is_group,
        name,
        avatar_url,
        participants,
        other_participant,
        last_message: conversation.last_message.clone(),
        updated_at: conversation.updated_at,
        unread_count,
        created_by: conversation.created_by,
        admins: conversation.admins.clone(),
        invite_code: conversation.invite_code.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{MessageText, Username};

    fn profile(name: &str) -> UserProfile {
        UserProfile::new(
            UserId::generate(),
            Username::parse(name).unwrap(),
            name.to_uppercase(),
            Some(format!("https://cdn.example/{name}.png")),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn deleted_text_is_masked() {
        let sender = profile("alice");
        let mut msg = Message::new_text(
            MessageId::generate(),
            ConversationId::generate(),
            sender.id,
            MessageText::parse("secret").unwrap(),
            None,
            Utc::now(),
        );
        msg.soft_delete(Utc::now()).unwrap();

        let shaped = shape_message(&msg, UserSummary::from_profile(&sender), None, None);
        assert!(shaped.is_deleted);
        assert_eq!(shaped.text, "");

        let preview = shape_reply_preview(&msg, None);
        assert_eq!(preview.text, "");
        assert!(preview.is_deleted);
    }

    #[test]
    fn viewer_flags_reflect_reactions_and_stars() {
        let sender = profile("alice");
        let viewer = UserId::generate();
        let mut msg = Message::new_text(
            MessageId::generate(),
            ConversationId::generate(),
            sender.id,
            MessageText::parse("hi").unwrap(),
            None,
            Utc::now(),
        );
        msg.toggle_reaction(viewer, "👍");
        msg.toggle_star(viewer);

        let shaped = shape_message(
            &msg,
            UserSummary::from_profile(&sender),
            None,
            Some(viewer),
        );
        assert_eq!(shaped.reactions.len(), 1);
        assert!(shaped.reactions[0].reacted_by_me);
        assert_eq!(shaped.star_count, 1);
        assert!(shaped.starred_by_me);

        // 广播视角没有 viewer，个人标记为 false
        let broadcast = shape_message(&msg, UserSummary::from_profile(&sender), None, None);
        assert!(!broadcast.reactions[0].reacted_by_me);
        assert!(!broadcast.starred_by_me);
    }

    #[test]
    fn direct_conversation_resolves_name_from_other_side() {
        let alice = profile("alice");
        let bob = profile("bob");
        let conv = Conversation::direct(ConversationId::generate(), alice.id, bob.id, Utc::now())
            .unwrap();
        let profiles = vec![alice.clone(), bob.clone()];

        let for_alice = shape_conversation(&conv, &profiles, alice.id, 0);
        assert_eq!(for_alice.name, "BOB");
        assert_eq!(for_alice.other_participant.as_ref().unwrap().id, bob.id);
        assert_eq!(for_alice.avatar_url, "https://cdn.example/bob.png");

        let for_bob = shape_conversation(&conv, &profiles, bob.id, 3);
        assert_eq!(for_bob.name, "ALICE");
        assert_eq!(for_bob.unread_count, 3);
    }

    #[test]
    fn group_conversation_uses_its_own_name() {
        let alice = profile("alice");
        let bob = profile("bob");
        let conv = Conversation::group(
            ConversationId::generate(),
            alice.id,
            vec![bob.id],
            "team",
            Some("code123".into()),
            Utc::now(),
        )
        .unwrap();
        let profiles = vec![alice.clone(), bob];

        let shaped = shape_conversation(&conv, &profiles, alice.id, 0);
        assert_eq!(shaped.name, "team");
        assert!(shaped.other_participant.is_none());
        assert_eq!(shaped.created_by, Some(alice.id));
        assert_eq!(shaped.invite_code.as_deref(), Some("code123"));
    }
}
