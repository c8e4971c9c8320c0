//! 成员与屏蔽策略闸门
//!
//! 回答"此用户此刻是否可以在此会话中行动"。成员检查是纯内存判断；
//! 屏蔽检查在每次发送时重新读取双方档案——挂起点之后不信任旧状态。
//! 群组会话完全豁免屏蔽检查；屏蔽只拦截发送，不拦截加入和查看。

use std::sync::Arc;

use domain::{Conversation, UserId, UserRepository};

use crate::error::ApplicationResult;

/// 一对一会话双向屏蔽状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStatus {
    pub blocked_by_me: bool,
    pub blocked_by_other: bool,
}

impl BlockStatus {
    pub fn is_blocked(&self) -> bool {
        self.blocked_by_me || self.blocked_by_other
    }

    /// 发送被拒时反馈给发送方的文案
    pub fn reason(&self) -> &'static str {
        if self.blocked_by_me {
            "You blocked this user."
        } else {
            "You are blocked by this user."
        }
    }
}

/// 策略闸门
pub struct PolicyGate {
    users: Arc<dyn UserRepository>,
}

impl PolicyGate {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// 成员检查：用户是否在会话的成员列表中
    pub fn can_act(&self, conversation: &Conversation, user: UserId) -> bool {
        conversation.is_participant(user)
    }

    /// 双向屏蔽检查，两侧档案均为新鲜读取
    pub async fn block_status(
        &self,
        me: UserId,
        other: UserId,
    ) -> ApplicationResult<BlockStatus> {
        let profiles = self.users.find_many(&[me, other]).await?;
        let mine = profiles.iter().find(|p| p.id == me);
        let theirs = profiles.iter().find(|p| p.id == other);

        let blocked_by_me = mine.map(|p| p.has_blocked(other)).unwrap_or(false);
        let blocked_by_other = theirs.map(|p| p.has_blocked(me)).unwrap_or(false);

        Ok(BlockStatus {
            blocked_by_me,
            blocked_by_other,
        })
    }

    /// 发送前的组合检查：群组永不屏蔽，一对一查双向屏蔽
    pub async fn send_block(
        &self,
        conversation: &Conversation,
        sender: UserId,
    ) -> ApplicationResult<Option<BlockStatus>> {
        if conversation.is_group {
            return Ok(None);
        }
        let Some(other) = conversation.other_participant(sender) else {
            return Ok(None);
        };
        let status = self.block_status(sender, other).await?;
        if status.is_blocked() {
            Ok(Some(status))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryUserRepository;
    use chrono::Utc;
    use domain::{Conversation, ConversationId, UserProfile, Username};

    async fn seeded_users() -> (Arc<MemoryUserRepository>, UserId, UserId) {
        let repo = Arc::new(MemoryUserRepository::new());
        let a = UserProfile::new(
            UserId::generate(),
            Username::parse("alice").unwrap(),
            "Alice",
            None,
            Utc::now(),
        )
        .unwrap();
        let b = UserProfile::new(
            UserId::generate(),
            Username::parse("bob").unwrap(),
            "Bob",
            None,
            Utc::now(),
        )
        .unwrap();
        let (a_id, b_id) = (a.id, b.id);
        repo.create(a).await.unwrap();
        repo.create(b).await.unwrap();
        (repo, a_id, b_id)
    }

    #[tokio::test]
    async fn participant_check_is_strict() {
        let (repo, a, b) = seeded_users().await;
        let gate = PolicyGate::new(repo);
        let conv = Conversation::direct(ConversationId::generate(), a, b, Utc::now()).unwrap();

        assert!(gate.can_act(&conv, a));
        assert!(gate.can_act(&conv, b));
        assert!(!gate.can_act(&conv, UserId::generate()));
    }

    #[tokio::test]
    async fn block_is_directional_but_either_side_blocks_send() {
        let (repo, a, b) = seeded_users().await;

        let mut alice = repo.find_by_id(a).await.unwrap().unwrap();
        alice.block(b).unwrap();
        repo.update(alice).await.unwrap();

        let gate = PolicyGate::new(repo);

        let from_a = gate.block_status(a, b).await.unwrap();
        assert!(from_a.blocked_by_me);
        assert!(!from_a.blocked_by_other);
        assert_eq!(from_a.reason(), "You blocked this user.");

        let from_b = gate.block_status(b, a).await.unwrap();
        assert!(!from_b.blocked_by_me);
        assert!(from_b.blocked_by_other);
        assert_eq!(from_b.reason(), "You are blocked by this user.");
    }

    #[tokio::test]
    async fn groups_are_exempt_from_block_checks() {
        let (repo, a, b) = seeded_users().await;

        let mut alice = repo.find_by_id(a).await.unwrap().unwrap();
        alice.block(b).unwrap();
        repo.update(alice).await.unwrap();

        let gate = PolicyGate::new(repo);
        let group = Conversation::group(
            ConversationId::generate(),
            a,
            vec![b],
            "team",
            None,
            Utc::now(),
        )
        .unwrap();

        assert!(gate.send_block(&group, b).await.unwrap().is_none());
        assert!(gate.send_block(&group, a).await.unwrap().is_none());
    }
}
