//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP 请求委托给应用层的用例服务，
//! 将 WebSocket 连接接入实时事件枢纽。

mod auth;
mod error;
mod routes;
mod state;
mod websocket;

pub use auth::{Claims, JwtService};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
