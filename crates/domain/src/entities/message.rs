//! 消息实体
//!
//! 消息状态机（sent → delivered → seen）单调推进，绝不回退。
//! 删除是软删除：正文保留，由读取侧负责遮蔽。

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ConversationId, MessageId, MessageText, Timestamp, UserId};

/// 消息投递状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Seen,
}

/// 消息类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    System,
}

/// 群组系统消息的子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMessageKind {
    GroupCreated,
    GroupRenamed,
    GroupAvatarChanged,
    MemberAdded,
    MemberRemoved,
    MemberLeft,
    AdminPromoted,
    AdminDemoted,
}

/// 系统消息附加信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDetail {
    pub kind: SystemMessageKind,
    /// 触发该系统消息的用户
    pub actor: UserId,
}

/// 单个表情的聚合反应，users 内成员唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub users: Vec<UserId>,
}

/// 消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub text: String,
    pub kind: MessageKind,
    pub system_detail: Option<SystemDetail>,
    pub status: MessageStatus,
    /// 已读此消息的用户集合，只增不减，不会包含发送者自身
    pub seen_by: Vec<UserId>,
    pub reply_to: Option<MessageId>,
    pub is_edited: bool,
    pub edited_at: Option<Timestamp>,
    pub is_deleted: bool,
    pub deleted_at: Option<Timestamp>,
    pub reactions: Vec<Reaction>,
    pub starred_by: Vec<UserId>,
    pub created_at: Timestamp,
}

impl Message {
    /// 创建普通文本消息，初始状态为 sent
    pub fn new_text(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        text: MessageText,
        reply_to: Option<MessageId>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id,
            text: text.into_string(),
            kind: MessageKind::Text,
            system_detail: None,
            status: MessageStatus::Sent,
            seen_by: Vec::new(),
            reply_to,
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            reactions: Vec::new(),
            starred_by: Vec::new(),
            created_at,
        }
    }

    /// 创建群组系统消息
    pub fn new_system(
        id: MessageId,
        conversation_id: ConversationId,
        actor: UserId,
        text: impl Into<String>,
        kind: SystemMessageKind,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id: actor,
            text: text.into(),
            kind: MessageKind::System,
            system_detail: Some(SystemDetail { kind, actor }),
            status: MessageStatus::Sent,
            seen_by: Vec::new(),
            reply_to: None,
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            reactions: Vec::new(),
            starred_by: Vec::new(),
            created_at,
        }
    }

    /// 单调推进投递状态，回退方向的调用是空操作。
    /// 返回状态是否发生了变化。
    pub fn advance_status(&mut self, next: MessageStatus) -> bool {
        if next > self.status {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// 由 viewer 标记已读。发送者查看自己的消息不产生任何效果；
    /// 重复标记是幂等的。
    pub fn mark_seen_by(&mut self, viewer: UserId) -> bool {
        if viewer == self.sender_id {
            return false;
        }
        let advanced = self.advance_status(MessageStatus::Seen);
        let added = if self.seen_by.contains(&viewer) {
            false
        } else {
            self.seen_by.push(viewer);
            true
        };
        advanced || added
    }

    /// 编辑正文。已删除的消息不可编辑。
    pub fn edit(&mut self, text: MessageText, at: Timestamp) -> Result<(), DomainError> {
        if self.is_deleted {
            return Err(DomainError::OperationNotAllowed);
        }
        self.text = text.into_string();
        self.is_edited = true;
        self.edited_at = Some(at);
        Ok(())
    }

    /// 软删除。重复删除返回错误，正文保留由读取侧遮蔽。
    pub fn soft_delete(&mut self, at: Timestamp) -> Result<(), DomainError> {
        if self.is_deleted {
            return Err(DomainError::OperationNotAllowed);
        }
        self.is_deleted = true;
        self.deleted_at = Some(at);
        Ok(())
    }

    /// 切换某个用户对某个表情的反应。
    /// 同一用户重复切换两次会恢复原状；用户集合为空的表情条目被移除。
    pub fn toggle_reaction(&mut self, user: UserId, emoji: &str) {
        match self.reactions.iter_mut().find(|r| r.emoji == emoji) {
            Some(entry) => {
                if entry.users.contains(&user) {
                    entry.users.retain(|u| *u != user);
                } else {
                    entry.users.push(user);
                }
            }
            None => self.reactions.push(Reaction {
                emoji: emoji.to_owned(),
                users: vec![user],
            }),
        }
        self.reactions.retain(|r| !r.users.is_empty());
    }

    /// 切换收藏标记，返回切换后是否处于收藏状态
    pub fn toggle_star(&mut self, user: UserId) -> bool {
        if self.starred_by.contains(&user) {
            self.starred_by.retain(|u| *u != user);
            false
        } else {
            self.starred_by.push(user);
            true
        }
    }

    pub fn is_starred_by(&self, user: UserId) -> bool {
        self.starred_by.contains(&user)
    }

    pub fn is_visible(&self) -> bool {
        !self.is_deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn text_message(sender: UserId) -> Message {
        Message::new_text(
            MessageId::generate(),
            ConversationId::generate(),
            sender,
            MessageText::parse("hello").unwrap(),
            None,
            Utc::now(),
        )
    }

    #[test]
    fn status_never_regresses() {
        let mut msg = text_message(UserId::generate());
        assert_eq!(msg.status, MessageStatus::Sent);

        assert!(msg.advance_status(MessageStatus::Delivered));
        assert!(msg.advance_status(MessageStatus::Seen));

        // 回退方向全部是空操作
        assert!(!msg.advance_status(MessageStatus::Delivered));
        assert!(!msg.advance_status(MessageStatus::Sent));
        assert_eq!(msg.status, MessageStatus::Seen);
    }

    #[test]
    fn sender_is_excluded_from_seen_path() {
        let sender = UserId::generate();
        let mut msg = text_message(sender);

        assert!(!msg.mark_seen_by(sender));
        assert_eq!(msg.status, MessageStatus::Sent);
        assert!(msg.seen_by.is_empty());

        let viewer = UserId::generate();
        assert!(msg.mark_seen_by(viewer));
        assert_eq!(msg.status, MessageStatus::Seen);
        assert_eq!(msg.seen_by, vec![viewer]);

        // 幂等
        assert!(!msg.mark_seen_by(viewer));
        assert_eq!(msg.seen_by.len(), 1);
    }

    #[test]
    fn edit_after_delete_is_rejected() {
        let mut msg = text_message(UserId::generate());
        msg.soft_delete(Utc::now()).unwrap();

        let result = msg.edit(MessageText::parse("changed").unwrap(), Utc::now());
        assert_eq!(result, Err(DomainError::OperationNotAllowed));
        assert_eq!(msg.text, "hello");
        assert!(!msg.is_edited);
    }

    #[test]
    fn double_delete_is_rejected() {
        let mut msg = text_message(UserId::generate());
        msg.soft_delete(Utc::now()).unwrap();
        assert!(msg.soft_delete(Utc::now()).is_err());
    }

    #[test]
    fn reaction_toggle_is_idempotent_in_pairs() {
        let mut msg = text_message(UserId::generate());
        let user = UserId::generate();

        msg.toggle_reaction(user, "👍");
        assert_eq!(msg.reactions.len(), 1);
        assert_eq!(msg.reactions[0].users, vec![user]);

        // 第二次切换恢复原状，空条目被移除
        msg.toggle_reaction(user, "👍");
        assert!(msg.reactions.is_empty());
    }

    #[test]
    fn reaction_users_stay_unique() {
        let mut msg = text_message(UserId::generate());
        let a = UserId::generate();
        let b = UserId::generate();

        msg.toggle_reaction(a, "🔥");
        msg.toggle_reaction(b, "🔥");
        assert_eq!(msg.reactions.len(), 1);
        assert_eq!(msg.reactions[0].users.len(), 2);

        msg.toggle_reaction(a, "🔥");
        assert_eq!(msg.reactions[0].users, vec![b]);
    }

    #[test]
    fn star_toggle_roundtrip() {
        let mut msg = text_message(UserId::generate());
        let user = UserId::generate();

        assert!(msg.toggle_star(user));
        assert!(msg.is_starred_by(user));
        assert!(!msg.toggle_star(user));
        assert!(!msg.is_starred_by(user));
    }
}
