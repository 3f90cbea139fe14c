use std::time::Duration;
use trucktech_browser::{
    BrowserEngine, BrowserLauncher, FileSessionStore, PageDriver, PageElement, SessionStore,
};
use trucktech_core::BrowserConfig;

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_browser_engine_launch() {
    let engine = BrowserEngine::launch(&BrowserConfig::default()).await;
    assert!(engine.is_ok(), "Failed to launch browser engine");
    let engine = engine.unwrap();
    assert!(!engine.is_interactive());
    engine.shutdown().await.expect("shutdown");
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed and network access
async fn test_navigation_and_query() {
    let engine = BrowserEngine::launch(&BrowserConfig::default()).await.unwrap();
    let page = engine.open_page(None).await.unwrap();

    page.navigate("https://example.com").await.expect("navigate");
    page.wait_for_load_settled(Duration::from_secs(10))
        .await
        .expect("settle");

    let heading = page.query_selector("h1").await.unwrap().expect("h1 present");
    assert!(heading.text().await.unwrap().contains("Example"));
    assert!(page.has_exact_text("Example Domain").await.unwrap());
    assert!(page.query_selector("#does-not-exist").await.unwrap().is_none());

    page.close().await.expect("close page");
    engine.shutdown().await.expect("shutdown");
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed and network access
async fn test_session_state_round_trip() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("session.json");

    let engine = BrowserEngine::launch(&BrowserConfig::default()).await.unwrap();
    let page = engine.open_page(None).await.unwrap();
    page.navigate("https://example.com").await.unwrap();
    let state = page.session_state().await.unwrap();
    page.close().await.unwrap();

    FileSessionStore.save(&path, &state).await.unwrap();
    let restored = FileSessionStore.load(&path).await.unwrap().unwrap_or_default();

    let page = engine.open_page(Some(&restored)).await.unwrap();
    page.close().await.unwrap();
    engine.shutdown().await.unwrap();
}
