use std::sync::Arc;
use std::time::Duration;

use cf_clearance::{
    BypassConfig, BypassManager, BypassResult, BypassStrategy, Challenge, CookieStore,
    FlareSolverrClient, FlareSolverrConfig, FlareSolverrStrategy, InMemoryCookieStore,
};

#[tokio::test]
#[ignore = "Requires a running FlareSolverr instance and network access"]
async fn solves_through_local_flaresolverr() {
    let endpoint = std::env::var("FLARESOLVERR_URL")
        .unwrap_or_else(|_| "http://localhost:8191/v1".to_string());
    let target =
        std::env::var("CF_TARGET_URL").unwrap_or_else(|_| "https://nowsecure.nl/".to_string());

    let client = FlareSolverrClient::new(FlareSolverrConfig::new(endpoint)).expect("client");
    assert!(client.is_available().await, "FlareSolverr is not reachable");

    let store = Arc::new(InMemoryCookieStore::new());
    let strategy: Arc<dyn BypassStrategy> = Arc::new(FlareSolverrStrategy::new(Arc::new(client)));
    let manager = BypassManager::new(store.clone(), vec![strategy]);
    let config = BypassConfig::default().with_timeout(Duration::from_secs(90));

    let result = manager
        .bypass_challenge(&target, &Challenge::js(None), &config)
        .await
        .expect("valid input");

    match result {
        BypassResult::Success(cookie) => {
            println!("clearance for {} valid for {:?}", cookie.domain(), cookie.remaining_ttl());
            assert!(store.get_clearance_cookie(&target).is_some());
        }
        BypassResult::NotNeeded => println!("{target} served without a challenge"),
        other => panic!("bypass failed: {other:?}"),
    }
}
