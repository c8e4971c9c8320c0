//! 会话实体
//!
//! 一对一会话由无序用户对唯一确定；群组会话携带名称、管理员和邀请码。
//! `last_message` 是冗余快照，`read_by` 为每个成员维护读取游标。

use serde::{Deserialize, Serialize};

use crate::entities::message::MessageStatus;
use crate::errors::DomainError;
use crate::value_objects::{ConversationId, MessageId, Timestamp, UserId};

/// 会话内最后一条消息的冗余快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub message_id: MessageId,
    pub text: String,
    pub sender: UserId,
    pub created_at: Timestamp,
    pub status: MessageStatus,
    pub is_edited: bool,
    pub is_deleted: bool,
}

/// 成员读取游标，每个用户至多一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user: UserId,
    pub last_read_at: Timestamp,
}

/// 会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub is_group: bool,
    /// 群组名称，一对一会话为 None
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    /// 群组创建者，始终是成员；一对一会话为 None
    pub created_by: Option<UserId>,
    /// 群组管理员，成员的子集，创建者始终在内
    pub admins: Vec<UserId>,
    pub invite_code: Option<String>,
    pub participants: Vec<UserId>,
    pub last_message: Option<LastMessage>,
    pub read_by: Vec<ReadReceipt>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Conversation {
    /// 创建一对一会话，创建者的读取游标立即建立
    pub fn direct(
        id: ConversationId,
        creator: UserId,
        other: UserId,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        if creator == other {
            return Err(DomainError::invalid_argument(
                "participants",
                "cannot start a conversation with yourself",
            ));
        }
        Ok(Self {
            id,
            is_group: false,
            name: None,
            avatar_url: None,
            created_by: None,
            admins: Vec::new(),
            invite_code: None,
            participants: vec![creator, other],
            last_message: None,
            read_by: vec![ReadReceipt {
                user: creator,
                last_read_at: now,
            }],
            created_at: now,
            updated_at: now,
        })
    }

    /// 创建群组会话，创建者进入成员和管理员列表
    pub fn group(
        id: ConversationId,
        creator: UserId,
        mut members: Vec<UserId>,
        name: impl Into<String>,
        invite_code: Option<String>,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(DomainError::invalid_argument("name", "cannot be empty"));
        }
        members.retain(|m| *m != creator);
        members.sort();
        members.dedup();
        let mut participants = vec![creator];
        participants.extend(members);
        Ok(Self {
            id,
            is_group: true,
            name: Some(name),
            avatar_url: None,
            created_by: Some(creator),
            admins: vec![creator],
            invite_code,
            participants,
            last_message: None,
            read_by: vec![ReadReceipt {
                user: creator,
                last_read_at: now,
            }],
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_participant(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    /// 一对一会话中的另一方
    pub fn other_participant(&self, me: UserId) -> Option<UserId> {
        if self.is_group {
            return None;
        }
        self.participants.iter().copied().find(|p| *p != me)
    }

    /// 无序用户对作为一对一会话的唯一键
    pub fn direct_key(a: UserId, b: UserId) -> (UserId, UserId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// 更新或插入成员的读取游标（upsert 语义，每用户至多一条）
    pub fn upsert_read_cursor(&mut self, user: UserId, at: Timestamp) {
        match self.read_by.iter_mut().find(|r| r.user == user) {
            Some(entry) => entry.last_read_at = at,
            None => self.read_by.push(ReadReceipt {
                user,
                last_read_at: at,
            }),
        }
    }

    pub fn read_cursor(&self, user: UserId) -> Option<Timestamp> {
        self.read_by
            .iter()
            .find(|r| r.user == user)
            .map(|r| r.last_read_at)
    }

    pub fn set_last_message(&mut self, snapshot: Option<LastMessage>, now: Timestamp) {
        self.last_message = snapshot;
        self.updated_at = now;
    }

    pub fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
    }

    /// 添加群组成员，已存在时为空操作
    pub fn add_member(&mut self, user: UserId) -> Result<bool, DomainError> {
        if !self.is_group {
            return Err(DomainError::NotAGroup);
        }
        if self.participants.contains(&user) {
            return Ok(false);
        }
        self.participants.push(user);
        Ok(true)
    }

    /// 移除群组成员，同时撤销其管理员身份。创建者不可移除。
    pub fn remove_member(&mut self, user: UserId) -> Result<bool, DomainError> {
        if !self.is_group {
            return Err(DomainError::NotAGroup);
        }
        if self.created_by == Some(user) {
            return Err(DomainError::CreatorImmutable);
        }
        if !self.participants.contains(&user) {
            return Ok(false);
        }
        self.participants.retain(|p| *p != user);
        self.admins.retain(|a| *a != user);
        self.read_by.retain(|r| r.user != user);
        Ok(true)
    }

    /// 提升成员为管理员
    pub fn promote_admin(&mut self, user: UserId) -> Result<bool, DomainError> {
        if !self.is_group {
            return Err(DomainError::NotAGroup);
        }
        if !self.participants.contains(&user) {
            return Err(DomainError::NotParticipant);
        }
        if self.admins.contains(&user) {
            return Ok(false);
        }
        self.admins.push(user);
        Ok(true)
    }

    /// 撤销管理员。创建者不可被降权。
    pub fn demote_admin(&mut self, user: UserId) -> Result<bool, DomainError> {
        if !self.is_group {
            return Err(DomainError::NotAGroup);
        }
        if self.created_by == Some(user) {
            return Err(DomainError::CreatorImmutable);
        }
        if !self.admins.contains(&user) {
            return Ok(false);
        }
        self.admins.retain(|a| *a != user);
        Ok(true)
    }
}
