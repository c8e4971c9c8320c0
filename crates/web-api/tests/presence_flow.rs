mod support;

use reqwest::Client;

use support::{connect_ws, next_event, register_user, spawn_server, wait_for_event};

#[tokio::test]
async fn presence_follows_multi_device_edge_transitions() {
    let addr = spawn_server().await;
    let base = format!("http://{addr}");
    let client = Client::new();

    let (alice_id, alice_token) = register_user(&client, &base, "alice", "Alice").await;
    let (_bob_id, bob_token) = register_user(&client, &base, "bob", "Bob").await;

    // bob 作为观察者先上线
    let mut ws_bob = connect_ws(addr, &bob_token).await;
    let snapshot = next_event(&mut ws_bob).await;
    assert_eq!(snapshot["event"], "presence:onlineUsers");

    // alice 第一台设备上线：观察者收到上线广播
    let mut ws_alice_1 = connect_ws(addr, &alice_token).await;
    let snapshot = next_event(&mut ws_alice_1).await;
    let online: Vec<String> = snapshot["data"]["userIds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_owned())
        .collect();
    assert!(online.contains(&alice_id.to_string()), "快照应包含自己");

    let update = wait_for_event(&mut ws_bob, "presence:update").await;
    assert_eq!(update["data"]["userId"], alice_id.to_string());
    assert_eq!(update["data"]["isOnline"], true);
    assert!(update["data"]["lastSeen"].is_null());

    // 第二台设备上线：不产生新的上线广播
    let ws_alice_2 = connect_ws(addr, &alice_token).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // 第一台设备下线：alice 仍在线，不广播下线
    drop(ws_alice_1);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // 最后一台设备下线：广播下线并携带 lastSeen
    drop(ws_alice_2);
    let update = wait_for_event(&mut ws_bob, "presence:update").await;
    assert_eq!(update["data"]["userId"], alice_id.to_string());
    assert_eq!(
        update["data"]["isOnline"], false,
        "中间的设备增减不应产生广播，下一条必须直接是下线"
    );
    assert!(
        update["data"]["lastSeen"].is_string(),
        "下线广播应带 lastSeen 时间戳"
    );
}

#[tokio::test]
async fn upgrade_without_valid_token_is_refused() {
    let addr = spawn_server().await;

    let url = format!("ws://{addr}/ws?token=garbage");
    let result = tokio_tungstenite::connect_async(url).await;
    assert!(result.is_err(), "非法 token 的升级请求应被拒绝");

    let url = format!("ws://{addr}/ws");
    let result = tokio_tungstenite::connect_async(url).await;
    assert!(result.is_err(), "缺少 token 的升级请求应被拒绝");
}
