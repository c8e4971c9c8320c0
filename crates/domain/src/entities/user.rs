//! 用户档案实体
//!
//! 连接认证时快照其中的展示字段；屏蔽列表支撑一对一会话的发送管控。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{Timestamp, UserId, Username};

/// 用户档案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: Username,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bio: String,
    /// 此用户屏蔽的其他用户
    pub blocked_users: HashSet<UserId>,
    /// 最后一次全部连接断开的时间，在线时为 None 或历史值
    pub last_seen: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl UserProfile {
    pub fn new(
        id: UserId,
        username: Username,
        display_name: impl Into<String>,
        avatar_url: Option<String>,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        let display_name = display_name.into().trim().to_owned();
        if display_name.is_empty() {
            return Err(DomainError::invalid_argument(
                "display_name",
                "cannot be empty",
            ));
        }
        Ok(Self {
            id,
            username,
            display_name,
            avatar_url,
            bio: String::new(),
            blocked_users: HashSet::new(),
            last_seen: None,
            created_at,
        })
    }

    /// 屏蔽另一个用户，重复屏蔽是幂等的
    pub fn block(&mut self, target: UserId) -> Result<(), DomainError> {
        if target == self.id {
            return Err(DomainError::invalid_argument(
                "target",
                "cannot block yourself",
            ));
        }
        self.blocked_users.insert(target);
        Ok(())
    }

    /// 取消屏蔽，未屏蔽时为空操作
    pub fn unblock(&mut self, target: UserId) {
        self.blocked_users.remove(&target);
    }

    pub fn has_blocked(&self, target: UserId) -> bool {
        self.blocked_users.contains(&target)
    }

    pub fn stamp_last_seen(&mut self, at: Timestamp) {
        self.last_seen = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn profile(name: &str) -> UserProfile {
        UserProfile::new(
            UserId::new(Uuid::new_v4()),
            Username::parse(name).unwrap(),
            name.to_uppercase(),
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn block_and_unblock_are_idempotent() {
        let mut alice = profile("alice");
        let bob = UserId::new(Uuid::new_v4());

        alice.block(bob).unwrap();
        alice.block(bob).unwrap();
        assert!(alice.has_blocked(bob));
        assert_eq!(alice.blocked_users.len(), 1);

        alice.unblock(bob);
        alice.unblock(bob);
        assert!(!alice.has_blocked(bob));
    }

    #[test]
    fn cannot_block_self() {
        let mut alice = profile("alice");
        assert!(alice.block(alice.id).is_err());
    }

    #[test]
    fn empty_display_name_is_rejected() {
        let result = UserProfile::new(
            UserId::new(Uuid::new_v4()),
            Username::parse("alice").unwrap(),
            "   ",
            None,
            Utc::now(),
        );
        assert!(result.is_err());
    }
}
