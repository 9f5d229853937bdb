//! Tests for the latest-wins artisan jobs loader.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use atelier::session::{Role, Session, SessionUser};
use atelier::types::ArtisanJobsQuery;
use atelier::{Atelier, MarketError, Marketplace, RetryConfig};

async fn market(server: &MockServer) -> Arc<Marketplace> {
    let market = Atelier::builder()
        .base_url(server.uri())
        .retry(RetryConfig::disabled())
        .build()
        .unwrap();
    market
        .login(Session::new(
            "tok",
            SessionUser {
                id: "a-1".into(),
                role: Role::Artisan,
                name: None,
            },
        ))
        .await
        .unwrap();
    Arc::new(market)
}

fn jobs(ids: &[u32]) -> serde_json::Value {
    json!(ids
        .iter()
        .map(|id| json!({"id": id, "title": format!("job {id}"), "status": "open"}))
        .collect::<Vec<_>>())
}

async fn wait_until_loading(market: &Marketplace) {
    for _ in 0..100 {
        if market.artisan_jobs().is_loading() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("load never started");
}

#[tokio::test]
async fn results_are_cached_per_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/JobListing/available"))
        .and(query_param("subcategoryIds", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jobs(&[1, 2])))
        .expect(2)
        .mount(&server)
        .await;

    let market = market(&server).await;
    let query = ArtisanJobsQuery::new().subcategories(["3"]);

    let first = market.artisan_jobs().available(&query).await.unwrap();
    let second = market.artisan_jobs().available(&query).await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(Arc::ptr_eq(&first, &second));

    market.artisan_jobs().refresh(&query).await.unwrap();
    assert!(!market.artisan_jobs().is_loading());
}

#[tokio::test]
async fn newer_load_supersedes_older_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/JobListing/available"))
        .and(query_param("subcategoryIds", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jobs(&[1]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/JobListing/available"))
        .and(query_param("subcategoryIds", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jobs(&[2, 3])))
        .mount(&server)
        .await;

    let market = market(&server).await;

    let older = {
        let market = Arc::clone(&market);
        tokio::spawn(async move {
            market
                .artisan_jobs()
                .available(&ArtisanJobsQuery::new().subcategories(["1"]))
                .await
        })
    };
    wait_until_loading(&market).await;

    let newer = market
        .artisan_jobs()
        .available(&ArtisanJobsQuery::new().subcategories(["2"]))
        .await
        .unwrap();
    assert_eq!(newer.len(), 2);

    let older = older.await.unwrap();
    assert!(matches!(older, Err(MarketError::Cancelled)), "got {older:?}");
}

#[tokio::test]
async fn cancel_aborts_the_load_in_progress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/JobListing/available"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jobs(&[1]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let market = market(&server).await;
    let load = {
        let market = Arc::clone(&market);
        tokio::spawn(async move {
            market
                .artisan_jobs()
                .available(&ArtisanJobsQuery::new())
                .await
        })
    };
    wait_until_loading(&market).await;

    assert!(market.artisan_jobs().cancel());
    assert!(matches!(load.await.unwrap(), Err(MarketError::Cancelled)));
    assert!(!market.artisan_jobs().cancel(), "nothing left to cancel");
}

#[tokio::test]
async fn requires_a_session() {
    let server = MockServer::start().await;
    let market = Atelier::builder().base_url(server.uri()).build().unwrap();

    let err = market
        .artisan_jobs()
        .available(&ArtisanJobsQuery::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::NotAuthenticated));
}

#[tokio::test]
async fn cancelled_load_still_caches_its_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/JobListing/available"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jobs(&[4]))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let market = market(&server).await;
    let load = {
        let market = Arc::clone(&market);
        tokio::spawn(async move {
            market
                .artisan_jobs()
                .available(&ArtisanJobsQuery::new())
                .await
        })
    };
    wait_until_loading(&market).await;
    market.artisan_jobs().cancel();
    assert!(matches!(load.await.unwrap(), Err(MarketError::Cancelled)));

    // The request was not cancelled; once it lands it answers from cache.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let jobs = market
        .artisan_jobs()
        .available(&ArtisanJobsQuery::new())
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
}

#[tokio::test]
async fn hand_built_query_shares_the_cache_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/JobListing/available"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jobs(&[1])))
        .expect(1)
        .mount(&server)
        .await;

    let market = market(&server).await;
    market
        .artisan_jobs()
        .available(&ArtisanJobsQuery::new().subcategories(["1", "2"]))
        .await
        .unwrap();

    let by_hand = ArtisanJobsQuery {
        subcategory_ids: vec!["2".into(), "1".into(), "1".into()],
        ..ArtisanJobsQuery::default()
    };
    let jobs = market.artisan_jobs().available(&by_hand).await.unwrap();
    assert_eq!(jobs.len(), 1);
}
