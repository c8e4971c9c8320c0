#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use application::{
    ChatHub, ConversationService, ConversationServiceDependencies, GroupService,
    GroupServiceDependencies, HubDependencies, MemoryConversationRepository,
    MemoryMessageRepository, MemoryReportRepository, MemoryUserRepository, MessageService,
    MessageServiceDependencies, UserService, UserServiceDependencies,
};
use config::{HistoryConfig, JwtConfig};
use web_api::{router, AppState, JwtService};

pub const TEST_JWT_SECRET: &str = "integration-test-secret-key-32-chars!";

/// 用内存仓储装配完整路由
pub fn build_router() -> Router {
    let users = Arc::new(MemoryUserRepository::new());
    let conversations = Arc::new(MemoryConversationRepository::new());
    let messages = Arc::new(MemoryMessageRepository::new());
    let reports = Arc::new(MemoryReportRepository::new());

    let hub = Arc::new(ChatHub::new(HubDependencies {
        users: users.clone(),
        conversations: conversations.clone(),
        messages: messages.clone(),
    }));

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
    let jwt_service = Arc::new(JwtService::new(JwtConfig {
        secret: TEST_JWT_SECRET.into(),
        expiration_hours: 1,
    }));

    let state = AppState {
        hub,
        user_service,
        conversation_service,
        group_service,
        message_service,
        jwt_service,
        history: HistoryConfig {
            default_page_size: 30,
            max_page_size: 100,
        },
    };
    router(state)
}

/// 启动测试服务器，返回监听地址
pub async fn spawn_server() -> std::net::SocketAddr {
    let router = build_router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service()).await.ok();
    });
    addr
}

/// 注册用户并签发 token，返回 (user_id, token)
pub async fn register_user(
    client: &Client,
    base: &str,
    username: &str,
    display_name: &str,
) -> (Uuid, String) {
    let user = client
        .post(format!("{base}/api/users"))
        .json(&json!({
            "username": username,
            "displayName": display_name
        }))
        .send()
        .await
        .expect("create user")
        .json::<Value>()
        .await
        .expect("user json");
    let user_id = user["id"].as_str().unwrap().parse::<Uuid>().unwrap();

    let login = client
        .post(format!("{base}/api/auth/token"))
        .json(&json!({ "userId": user_id }))
        .send()
        .await
        .expect("issue token")
        .json::<Value>()
        .await
        .expect("token json");
    let token = login["token"].as_str().unwrap().to_owned();
    (user_id, token)
}

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 建立已认证的 WebSocket 连接
pub async fn connect_ws(addr: std::net::SocketAddr, token: &str) -> WsClient {
    let url = format!("ws://{addr}/ws?token={token}");
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("ws connect");
    ws
}

/// 读取下一条 JSON 事件，超时视为测试失败
pub async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("等待事件超时")
            .expect("连接已关闭")
            .expect("帧读取失败");
        if let tokio_tungstenite::tungstenite::Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("事件应为合法 JSON");
        }
    }
}

/// 持续读取事件直到命中指定事件名
pub async fn wait_for_event(ws: &mut WsClient, event: &str) -> Value {
    for _ in 0..20 {
        let value = next_event(ws).await;
        if value["event"] == event {
            return value;
        }
    }
    panic!("未等到事件 {event}");
}
