//! 应用层实现。
//!
//! 实时核心（会话计数、策略闸门、会话目录、事件枢纽、投递引擎）
//! 以及围绕领域模型的用例服务都在这一层。REST 读路径和实时推送
//! 路径共用同一套出站数据形状，保证线上负载一致。

pub mod delivery;
pub mod directory;
pub mod error;
pub mod events;
pub mod hub;
pub mod memory;
pub mod policy;
pub mod services;
pub mod session;
pub mod shape;

pub use delivery::DeliveryEngine;
pub use directory::{last_message_snapshot, ConversationDirectory};
pub use error::ApplicationError;
pub use events::{ClientEvent, ServerEvent};
pub use hub::{ChatHub, ConnectionIdentity, HubDependencies};
pub use memory::{
    MemoryConversationRepository, MemoryMessageRepository, MemoryReportRepository,
    MemoryUserRepository,
};
pub use policy::{BlockStatus, PolicyGate};
pub use services::{
    ConversationService, ConversationServiceDependencies, CreateGroupRequest, CreateUserRequest,
    GroupService, GroupServiceDependencies, MessagePage, MessageService,
    MessageServiceDependencies, ReactionUpdate, ReadReceiptsView, ReportRequest, StarUpdate,
    UpdateAdminsRequest, UpdateGroupRequest, UpdateMembersRequest, UserService,
    UserServiceDependencies,
};
pub use session::SessionStore;
pub use shape::{
    shape_conversation, shape_message, shape_reply_preview, ReactionView, ReplyPreview,
    ShapedConversation, ShapedMessage, UserSummary,
};
