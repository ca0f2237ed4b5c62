use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use topfilms::{
    CrawlConfig, CrawlCoordinator, CrawlOutcome, DedupStore, DropReason, EnrichedRecord, HttpClient,
    MemoryMovieStore, RocksMovieStore, StoreConfig, StoreError, StoredMovie, UpsertOutcome,
};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

fn entry(rank: usize, id: &str, title: &str, rating: &str) -> String {
    format!(
        r#"<li class="ipc-metadata-list-summary-item">
             <div class="ipc-title"><a class="ipc-title-link-wrapper" href="/title/{id}/?ref_=sr_t_{rank}">
               <h3 class="ipc-title__text">{rank}. {title}</h3></a></div>
             <div><span class="dli-title-metadata-item">2023</span><span class="dli-title-metadata-item">2h 1m</span></div>
             <span class="ipc-rating-star--rating">{rating}</span>
           </li>"#
    )
}

fn list_page(entries: &[String]) -> String {
    format!(r#"<html><body><ul class="ipc-metadata-list">{}</ul></body></html>"#, entries.concat())
}

fn detail_page(director: &str) -> String {
    format!(
        r#"<html><body><ul>
             <li class="ipc-metadata-list__item"><span class="ipc-metadata-list-item__label">Director</span>
               <div><a class="ipc-metadata-list-item__list-content-item--link" href="/name/nm1/">{director}</a></div></li>
             <li class="ipc-metadata-list__item"><span class="ipc-metadata-list-item__label">Writers</span>
               <div><a class="ipc-metadata-list-item__list-content-item--link" href="/name/nm2/">Someone Else</a></div></li>
           </ul></body></html>"#
    )
}

fn config(server: &MockServer, quota: usize) -> CrawlConfig {
    CrawlConfig {
        start_year: 2023,
        year_span: 1,
        quota,
        concurrency: 4,
        dispatch_delay: Duration::ZERO,
        timeout: Duration::from_secs(5),
        base_url: server.uri(),
        ..CrawlConfig::default()
    }
}

async fn mount_year_2023(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search/title/"))
        .and(query_param("release_date", "2023-01-01,2023-12-31"))
        .respond_with(html(list_page(&[
            entry(1, "tt0000001", "The Best One", "9.1"),
            entry(2, "tt0000002", "Merely Fine", "7.0"),
        ])))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/title/tt0000001/"))
        .respond_with(html(detail_page("X")))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/title/tt0000002/"))
        .respond_with(html(detail_page("Y")))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn crawls_one_year_end_to_end() {
    let server = MockServer::start().await;
    mount_year_2023(&server).await;

    let config = config(&server, 10);
    let client = HttpClient::new(&config).unwrap();
    let coordinator = CrawlCoordinator::new(config, client, MemoryMovieStore::new()).unwrap();

    let report = coordinator.run().await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.persisted, 1);
    assert_eq!(report.lists_fetched, 1);
    assert_eq!(report.details_fetched, 1);
    assert_eq!(report.dropped(DropReason::RatingBelowThreshold), 1);

    let store = coordinator.store();
    assert_eq!(store.count().unwrap(), 1);
    let url = format!("{}/title/tt0000001/", server.uri());
    assert_eq!(
        store.get(&url).unwrap(),
        Some(StoredMovie {
            title: "The Best One".into(),
            year: Some("2023".into()),
            rating: 9.1,
            director: "X".into(),
            url: url.clone(),
        })
    );
}

#[tokio::test]
async fn rerun_against_rocksdb_updates_in_place() {
    let server = MockServer::start().await;
    Mock::given(path("/search/title/"))
        .respond_with(html(list_page(&[entry(1, "tt0000001", "The Best One", "9.1")])))
        .mount(&server)
        .await;
    Mock::given(path("/title/tt0000001/"))
        .respond_with(html(detail_page("X")))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store_config = StoreConfig {
        uri: dir.path().join("movies.db"),
        ..StoreConfig::default()
    };

    for expected in [UpsertOutcome::Inserted, UpsertOutcome::Updated] {
        let config = config(&server, 10);
        let client = HttpClient::new(&config).unwrap();
        let store = RocksMovieStore::open(&store_config).unwrap();
        let coordinator = CrawlCoordinator::new(config, client, store).unwrap();

        let report = coordinator.run().await.unwrap();

        assert_eq!(report.persisted, 1);
        match expected {
            UpsertOutcome::Inserted => assert_eq!((report.inserted, report.updated), (1, 0)),
            UpsertOutcome::Updated => assert_eq!((report.inserted, report.updated), (0, 1)),
        }
        assert_eq!(coordinator.store().count().unwrap(), 1);
    }
}

/// Accepts a fixed number of writes, then behaves as if the database went away.
struct FlakyStore {
    inner: MemoryMovieStore,
    writes_left: AtomicUsize,
}

impl DedupStore for FlakyStore {
    fn ensure_unique_key(&self, field: &str) -> Result<(), StoreError> {
        self.inner.ensure_unique_key(field)
    }

    fn upsert(&self, record: &EnrichedRecord) -> Result<UpsertOutcome, StoreError> {
        let granted = self
            .writes_left
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if !granted {
            return Err(StoreError::ConnectionUnavailable("connection refused".into()));
        }
        self.inner.upsert(record)
    }

    fn get(&self, url: &str) -> Result<Option<StoredMovie>, StoreError> {
        self.inner.get(url)
    }

    fn count(&self) -> Result<usize, StoreError> {
        self.inner.count()
    }

    fn top_by_rating(&self, n: usize) -> Result<Vec<StoredMovie>, StoreError> {
        self.inner.top_by_rating(n)
    }

    fn wipe(&self) -> Result<usize, StoreError> {
        self.inner.wipe()
    }
}

#[tokio::test]
async fn losing_the_store_aborts_and_keeps_committed_rows() {
    let server = MockServer::start().await;
    let entries: Vec<String> = (1..=6)
        .map(|i| entry(i, &format!("tt000000{i}"), &format!("Film {i}"), "8.9"))
        .collect();
    Mock::given(path("/search/title/"))
        .respond_with(html(list_page(&entries)))
        .mount(&server)
        .await;
    Mock::given(path_regex(r"^/title/tt\d+/$"))
        .respond_with(html(detail_page("X")))
        .mount(&server)
        .await;

    let config = config(&server, 100);
    let client = HttpClient::new(&config).unwrap();
    let store = FlakyStore {
        inner: MemoryMovieStore::new(),
        writes_left: AtomicUsize::new(2),
    };
    let coordinator = CrawlCoordinator::new(config, client, store).unwrap();

    let report = coordinator.run().await.unwrap();

    assert!(report.is_aborted());
    assert!(matches!(&report.outcome, CrawlOutcome::Aborted { reason } if reason.contains("connection refused")));
    assert_eq!(report.persisted, 2);
    assert_eq!(coordinator.store().count().unwrap(), 2);
    assert_eq!(report.dropped(DropReason::StoreUnavailable), 1);
}
