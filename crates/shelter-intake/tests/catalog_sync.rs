use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shelter_intake::config::PublishingConfig;
use shelter_intake::workflows::profiles::integrations::{
    CatalogCredentials, CatalogGateway, CatalogListing, CatalogTransport, IntegrationError,
    MatchpfoteClient, TransportResponse,
};
use shelter_intake::workflows::profiles::{ActorId, Profile, ProfileDraft, ProfileId};
use tokio::time::Instant;

/// Replays canned statuses and remembers when each call arrived.
struct ScriptedTransport {
    statuses: Mutex<Vec<u16>>,
    calls: Mutex<Vec<(Instant, CatalogListing)>>,
}

impl ScriptedTransport {
    fn new(mut statuses: Vec<u16>) -> Self {
        statuses.reverse();
        Self {
            statuses: Mutex::new(statuses),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_times(&self) -> Vec<Instant> {
        let guard = self.calls.lock().expect("calls mutex");
        guard.iter().map(|(at, _)| *at).collect()
    }

    fn listings(&self) -> Vec<CatalogListing> {
        let guard = self.calls.lock().expect("calls mutex");
        guard.iter().map(|(_, listing)| listing.clone()).collect()
    }
}

#[async_trait]
impl CatalogTransport for ScriptedTransport {
    async fn upsert(
        &self,
        _credentials: &CatalogCredentials,
        listing: &CatalogListing,
    ) -> Result<TransportResponse, IntegrationError> {
        self.calls
            .lock()
            .expect("calls mutex")
            .push((Instant::now(), listing.clone()));
        let status = self.statuses.lock().expect("status mutex").pop().unwrap_or(200);
        Ok(TransportResponse {
            status,
            retry_after: None,
            body: String::new(),
        })
    }
}

fn credentials() -> Option<CatalogCredentials> {
    Some(CatalogCredentials {
        api_url: "https://registry.test/api".to_string(),
        api_key: "secret".to_string(),
    })
}

fn publishing() -> PublishingConfig {
    PublishingConfig {
        public_base_url: "https://tierheim.test/tiere/".to_string(),
        media_base_url: "https://cdn.tierheim.test/".to_string(),
    }
}

fn profile(id: &str) -> Profile {
    let draft = ProfileDraft {
        name: "Milo".to_string(),
        category: "Katze".to_string(),
        desc_short: "Ruhiger Kater, sucht eine Wohnung mit Balkon.".to_string(),
        location: "Tierheim Köln".to_string(),
        gallery: vec!["milo/1.jpg".to_string(), "/milo/2.jpg".to_string()],
        size: Some(" 28 ".to_string()),
        seeking_home_since: Some("2022".to_string()),
        ..ProfileDraft::default()
    };
    Profile::from_draft(
        ProfileId(id.to_string()),
        draft,
        &ActorId("author-1".to_string()),
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(),
    )
}

#[test]
fn listing_uses_public_urls() {
    let listing = CatalogListing::from_profile(&profile("p-9"), &publishing());

    assert_eq!(listing.profile_url, "https://tierheim.test/tiere/p-9");
    assert_eq!(
        listing.images,
        vec![
            "https://cdn.tierheim.test/milo/1.jpg".to_string(),
            "https://cdn.tierheim.test/milo/2.jpg".to_string(),
        ]
    );
    assert_eq!(listing.size_cm, Some(28));
    assert_eq!(listing.seeking_home_since, Some(2022));

    let payload = serde_json::to_value(&listing).expect("listing serializes");
    assert_eq!(payload["externalId"], "p-9");
    assert!(payload.get("birthDate").is_none());
}

#[tokio::test(start_paused = true)]
async fn rate_limited_sync_gives_up_after_three_attempts() {
    let client = MatchpfoteClient::new(
        credentials(),
        ScriptedTransport::new(vec![429, 429, 429, 200]),
        publishing(),
    );
    let started = Instant::now();

    let result = client.send(&profile("p-1")).await;

    match result {
        Err(IntegrationError::RetriesExhausted {
            integration,
            attempts,
            ..
        }) => {
            assert_eq!(integration, "matchpfote");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert_eq!(client.transport().call_times().len(), 3);
    // two default Retry-After waits
    assert!(started.elapsed() >= Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn recovers_after_a_rate_limited_attempt() {
    let client = MatchpfoteClient::new(
        credentials(),
        ScriptedTransport::new(vec![429, 201]),
        publishing(),
    );

    let synced = client.send(&profile("p-2")).await.expect("sync succeeds");

    assert!(synced);
    let listings = client.transport().listings();
    assert_eq!(listings.len(), 2);
    assert_eq!(listings[1].external_id, "p-2");
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_not_retried() {
    let client = MatchpfoteClient::new(
        credentials(),
        ScriptedTransport::new(vec![422]),
        publishing(),
    );

    let result = client.send(&profile("p-3")).await;

    assert!(matches!(
        result,
        Err(IntegrationError::Http { status: 422, .. })
    ));
    assert_eq!(client.transport().call_times().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_syncs_are_spaced_by_the_pacer() {
    let client = MatchpfoteClient::new(credentials(), ScriptedTransport::new(Vec::new()), publishing());
    let first = profile("p-4");
    let second = profile("p-5");
    let third = profile("p-6");

    let (a, b, c) = tokio::join!(
        client.send(&first),
        client.send(&second),
        client.send(&third)
    );
    assert!(a.expect("first") && b.expect("second") && c.expect("third"));

    let times = client.transport().call_times();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(600));
    }
}

#[tokio::test]
async fn missing_credentials_soft_fail() {
    let client = MatchpfoteClient::new(None, ScriptedTransport::new(Vec::new()), publishing());

    let synced = client.send(&profile("p-7")).await.expect("no error");

    assert!(!synced);
    assert!(client.transport().call_times().is_empty());
}
