//! 聊天服务核心领域模型
//!
//! 包含用户档案、会话、消息等核心实体，以及仓储接口和相关业务规则。

pub mod entities;
pub mod errors;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use repositories::*;
pub use value_objects::*;
