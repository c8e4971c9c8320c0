//! 主应用程序入口
//!
//! 启动 Axum Web API 服务，并把 WebSocket 层接入实时事件枢纽。

use std::sync::Arc;

use application::{
    ChatHub, ConversationService, ConversationServiceDependencies, GroupService,
    GroupServiceDependencies, HubDependencies, MemoryConversationRepository,
    MemoryMessageRepository, MemoryReportRepository, MemoryUserRepository, MessageService,
    MessageServiceDependencies, UserService, UserServiceDependencies,
};
use config::AppConfig;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate()?;

    // 单进程内存存储作为记录源
    let users = Arc::new(MemoryUserRepository::new());
    let conversations = Arc::new(MemoryConversationRepository::new());
    let messages = Arc::new(MemoryMessageRepository::new());
    let reports = Arc::new(MemoryReportRepository::new());

    // 实时事件枢纽
    let hub = Arc::new(ChatHub::new(HubDependencies {
        users: users.clone(),
        conversations: conversations.clone(),
        messages: messages.clone(),
    }));

    // 应用层服务
    let user_service = Arc::new(UserService::new(UserServiceDependencies {
        users: users.clone(),
        messages: messages.clone(),
        reports,
    }));
    let conversation_service = Arc::new(ConversationService::new(
        ConversationServiceDependencies {
            conversations: conversations.clone(),
            messages: messages.clone(),
            users: users.clone(),
        },
    ));
    let group_service = Arc::new(GroupService::new(GroupServiceDependencies {
        conversations: conversations.clone(),
        messages: messages.clone(),
        users: users.clone(),
    }));
    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        messages,
        conversations,
        users,
    }));

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState {
        hub,
        user_service,
        conversation_service,
        group_service,
        message_service,
        jwt_service,
        history: config.history.clone(),
    };

    // 启动 Web 服务器
    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("聊天服务启动在 http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
