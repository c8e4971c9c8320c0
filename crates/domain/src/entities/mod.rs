//! 领域实体定义
//!
//! 包含系统的核心实体：用户档案、会话、消息、举报。

pub mod conversation;
pub mod message;
pub mod report;
pub mod user;

// 重新导出核心实体
pub use conversation::{Conversation, LastMessage, ReadReceipt};
pub use message::{Message, MessageKind, MessageStatus, Reaction, SystemDetail, SystemMessageKind};
pub use report::Report;
pub use user::UserProfile;
