//! 用户会话计数
//!
//! 每个已认证用户维护一个存活连接计数；多端共享同一会话。
//! 0→1 和 1→0 的跳变由枢纽解释为上线/下线，这里只负责计数本身。

use std::collections::HashMap;

use tokio::sync::RwLock;

use domain::UserId;

/// 在线会话存储：用户 id → 存活连接数，缺省即 0
#[derive(Default)]
pub struct SessionStore {
    counts: RwLock<HashMap<UserId, u32>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条新连接，返回该用户当前的连接数
    pub async fn connect(&self, user: UserId) -> u32 {
        let mut counts = self.counts.write().await;
        let count = counts.entry(user).or_insert(0);
        *count += 1;
        *count
    }

    /// 记录一条连接断开，返回该用户剩余的连接数。
    /// 计数归零时条目被移除；对不存在的用户调用保持为 0。
    pub async fn disconnect(&self, user: UserId) -> u32 {
        let mut counts = self.counts.write().await;
        match counts.get_mut(&user) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            Some(_) => {
                counts.remove(&user);
                0
            }
            None => 0,
        }
    }

    /// 当前在线（连接数 ≥ 1）的用户列表
    pub async fn online_users(&self) -> Vec<UserId> {
        let counts = self.counts.read().await;
        counts.keys().copied().collect()
    }

    pub async fn is_online(&self, user: UserId) -> bool {
        let counts = self.counts.read().await;
        counts.contains_key(&user)
    }
}
