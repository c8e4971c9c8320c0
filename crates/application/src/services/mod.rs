mod conversation_service;
mod group_service;
mod message_service;
mod user_service;

pub use conversation_service::{ConversationService, ConversationServiceDependencies};
pub use group_service::{
    CreateGroupRequest, GroupService, GroupServiceDependencies, UpdateAdminsRequest,
    UpdateGroupRequest, UpdateMembersRequest,
};
pub use message_service::{
    MessagePage, MessageService, MessageServiceDependencies, ReactionUpdate, ReadReceiptsView,
    StarUpdate,
};
pub use user_service::{
    CreateUserRequest, ReportRequest, UserService, UserServiceDependencies,
};
