//! End-to-end runs across a Domus/Filter link.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rhythm_domus::{
    ClientConfig, DomusHost, InMemoryPosts, InMemorySessionStore, InMemoryTakes, PostSource,
    PostSourceError, SandboxClient, SessionScope, SessionStore, StaticMiscData, StreamAccess,
    Take,
};
use rhythm_runtime::{
    FilterConfig, FilterDomain, Phase, RhythmLoader, ScriptLoader, TimingConfig,
};
use rhythm_sandbox::{CapabilityHost, Decision, Rhythm, RhythmContext, SandboxError};
use rhythm_transport::{link, Domain, Endpoint, EndpointConfig, MessageHandler, MessageType};
use rhythm_types::{
    Author, ErrorCode, KindredMap, Post, PostQuery, RhythmSource, SortRequest, SortType,
    StreamRef, UserRef,
};
use serde_json::{json, Map};
use tokio::sync::mpsc;

fn general() -> StreamRef {
    StreamRef::new("cobalt.example", "ada", "general", "1")
}

fn secret() -> StreamRef {
    StreamRef::new("cobalt.example", "cy", "secret", "1")
}

/// Posts 1, 2, 3 come back in that order (newest first).
fn fixture_posts() -> Vec<Post> {
    vec![
        Post::new(1, 300, Author::new("cobalt.example", "bo"), general()).with_title("one"),
        Post::new(2, 200, Author::new("cobalt.example", "cy"), general()).with_title("two"),
        Post::new(3, 100, Author::new("cobalt.example", "di"), general()).with_title("three"),
    ]
}

struct CountingPosts {
    inner: InMemoryPosts,
    calls: AtomicUsize,
}

#[async_trait]
impl PostSource for CountingPosts {
    async fn get_posts(
        &self,
        query: &PostQuery,
        requester: &UserRef,
    ) -> Result<Vec<Post>, PostSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_posts(query, requester).await
    }
}

struct Harness {
    client: SandboxClient,
    filter: FilterDomain,
    posts: Arc<CountingPosts>,
    store: Arc<InMemorySessionStore>,
}

impl Harness {
    async fn start(config: FilterConfig) -> Self {
        Self::start_with(config, None).await
    }

    async fn start_with(config: FilterConfig, loader: Option<Arc<dyn RhythmLoader>>) -> Self {
        let posts = Arc::new(CountingPosts {
            inner: InMemoryPosts::new()
                .with_stream(general(), StreamAccess::Public)
                .with_stream(secret(), StreamAccess::Private)
                .with_posts(fixture_posts()),
            calls: AtomicUsize::new(0),
        });
        let takes = Arc::new(InMemoryTakes::new(vec![Take {
            post_id: 3,
            user: "cobalt.example/bo".into(),
            field_id: 0,
            value: 1,
        }]));
        let store = Arc::new(InMemorySessionStore::new());
        let misc = Arc::new(StaticMiscData::new().with_entry("mem://weights", json!({ "factor": 10 })));
        let host = Arc::new(DomusHost::new(posts.clone(), takes, store.clone(), misc));

        let (domus_end, filter_end) = link(
            Domain::new("domus.cobalt.example"),
            Domain::new("filter.cobalt.example"),
            64,
        );
        let client = SandboxClient::connect(domus_end, host, ClientConfig::default());
        let filter = match loader {
            Some(loader) => FilterDomain::start_with_loader(filter_end, config, loader).await,
            None => FilterDomain::start(filter_end, config).await,
        }
        .expect("filter domain starts");
        client.await_ready().await.expect("handshake completes");

        Self {
            client,
            filter,
            posts,
            store,
        }
    }

    async fn with_kindred(config: FilterConfig) -> Self {
        let harness = Self::start(config).await;
        let mut kindred = KindredMap::new();
        kindred.insert("cobalt.example/bo", 2);
        kindred.insert("cobalt.example/di", 3);
        assert!(harness.client.send_kindred(&kindred).await.unwrap());
        harness
    }

    fn fetches(&self) -> usize {
        self.posts.calls.load(Ordering::SeqCst)
    }
}

fn config() -> FilterConfig {
    FilterConfig {
        timing: TimingConfig {
            kindred_timeout_ms: 2_000,
            item_timeout_ms: 1_000,
        },
        ..FilterConfig::default()
    }
}

fn request(source: &str) -> SortRequest {
    SortRequest {
        sort_type: SortType::Stream,
        rhythm: RhythmSource {
            domain: "cobalt.example".into(),
            username: "ada".into(),
            name: "under-test".into(),
            version: "1".into(),
            source: source.into(),
        },
        target_streams: vec![general()],
        posts_from_ts: None,
        posts_to_ts: None,
        top_parent_post_id: None,
        client_params: Map::new(),
        requesting_domain: "cobalt.example".into(),
        user: UserRef::new("cobalt.example", "ada"),
    }
}

fn ids(posts: &[Post]) -> Vec<u64> {
    posts.iter().map(|p| p.id).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scores_skips_and_orders_descending() {
    let h = Harness::with_kindred(config()).await;
    let result = h
        .client
        .run(&request(
            r#"
            fn main(post) {
                if post.id == 1 { set_sort(5); }
                else if post.id == 2 { skip(); }
                else if post.id == 3 { set_sort(9); }
            }
            "#,
        ))
        .await
        .unwrap();

    assert_eq!(ids(&result.posts), vec![3, 1]);
    assert_eq!(result.posts[0].sort, Some(9.0));
    assert_eq!(result.posts[1].sort, Some(5.0));
    assert_eq!(result.sort_type, SortType::Stream);
    assert_eq!(h.filter.controller().phase(), Phase::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn main_sees_every_post_once_in_fetch_order() {
    let h = Harness::with_kindred(config()).await;
    let req = request(
        r#"
        fn init() { this.seen = []; }
        fn main(post) { this.seen.push(post.id); set_sort(1); }
        fn finalize(posts) { store_data(this.seen); }
        "#,
    );
    let result = h.client.run(&req).await.unwrap();

    assert_eq!(ids(&result.posts), vec![1, 2, 3]);
    let scope = SessionScope {
        user: req.user.full_username(),
        rhythm: req.rhythm.identity(),
    };
    assert_eq!(h.store.load(&scope).await.unwrap().as_deref(), Some("[1,2,3]"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failure_in_main_reports_the_post() {
    let h = Harness::with_kindred(config()).await;
    let err = h
        .client
        .run(&request(
            r#"fn main(post) { if post.id == 2 { throw "bad post"; } set_sort(1); }"#,
        ))
        .await
        .unwrap_err();

    assert!(err.is(ErrorCode::RhythmMain));
    assert_eq!(err.data["post_id"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overlapping_run_is_rejected_and_leaves_the_first_untouched() {
    let h = Harness::start(config()).await;
    let mut phase = h.filter.phase();

    let ada = request(
        r#"
        fn main(post) { set_sort(post.id); }
        fn finalize(posts) { store_data("ada was here"); }
        "#,
    );
    let mut eve = request(r#"fn init() { store_data("eve was here"); } fn main(post) { }"#);
    eve.user = UserRef::new("cobalt.example", "eve");

    let first = h.client.run(&ada);
    let second = async {
        tokio::time::timeout(
            Duration::from_secs(2),
            phase.wait_for(|p| *p == Phase::AwaitingKindred),
        )
        .await
        .unwrap()
        .unwrap();

        let scoped = h.client.run(&eve).await.unwrap_err();
        let unscoped = h
            .client
            .run_payload(serde_json::to_value(&eve).unwrap())
            .await
            .unwrap_err();

        let mut kindred = KindredMap::new();
        kindred.insert("cobalt.example/bo", 1);
        h.client.send_kindred(&kindred).await.unwrap();
        (scoped, unscoped)
    };

    let (first, (scoped, unscoped)) = tokio::join!(first, second);
    assert!(scoped.is(ErrorCode::Busy));
    assert!(unscoped.is(ErrorCode::Busy));
    assert_eq!(ids(&first.unwrap().posts), vec![3, 2, 1]);

    let scope = |req: &SortRequest| SessionScope {
        user: req.user.full_username(),
        rhythm: req.rhythm.identity(),
    };
    assert_eq!(
        h.store.load(&scope(&ada)).await.unwrap().as_deref(),
        Some("ada was here")
    );
    assert_eq!(h.store.load(&scope(&eve)).await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn posts_are_not_fetched_before_kindred_arrives() {
    let h = Harness::start(config()).await;

    let run = async { h.client.run(&request("fn main(post) { set_sort(1); }")).await };
    let push = async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.fetches(), 0);
        assert_eq!(h.filter.controller().phase(), Phase::AwaitingKindred);
        h.client.send_kindred(&KindredMap::new()).await.unwrap();
    };

    let (result, ()) = tokio::join!(run, push);
    assert_eq!(result.unwrap().posts.len(), 3);
    assert_eq!(h.fetches(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_kindred_times_out() {
    let mut cfg = config();
    cfg.timing.kindred_timeout_ms = 100;
    let h = Harness::start(cfg).await;

    let err = h.client.run(&request("fn main(post) { }")).await.unwrap_err();
    assert!(err.is(ErrorCode::KindredTimeout));
    assert_eq!(h.fetches(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn optional_hooks_default_to_pass_through() {
    let h = Harness::with_kindred(config()).await;
    let result = h
        .client
        .run(&request("fn main(post) { set_sort(10 - post.id); }"))
        .await
        .unwrap();
    assert_eq!(ids(&result.posts), vec![1, 2, 3]);
    assert_eq!(h.fetches(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn finalize_can_replace_the_collection() {
    let h = Harness::with_kindred(config()).await;
    let result = h
        .client
        .run(&request(
            r#"
            fn main(post) { set_sort(1); }
            fn finalize(posts) {
                let kept = [];
                for p in posts { if p.id != 1 { p.sort = p.id * 1.5; kept.push(p); } }
                kept
            }
            "#,
        ))
        .await
        .unwrap();
    assert_eq!(ids(&result.posts), vec![3, 2]);
    assert_eq!(result.posts[0].sort, Some(4.5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn load_and_init_failures_have_their_own_codes() {
    let h = Harness::with_kindred(config()).await;

    let cases = [
        ("fn main(post) {", ErrorCode::RhythmEvalException),
        ("fn helper() { 1 }", ErrorCode::MainMissing),
        (r#"fn init() { throw "no"; } fn main(post) { }"#, ErrorCode::RhythmInit),
        ("fn main(post) { set_sort(1); } fn finalize(posts) { 7 }", ErrorCode::RhythmFinal),
    ];
    for (source, code) in cases {
        let err = h.client.run(&request(source)).await.unwrap_err();
        assert!(err.is(code), "{source}: got {}", err.code);
    }
    assert_eq!(h.fetches(), 1, "only the finalize case reaches the fetch");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_payload_is_rejected_before_anything_runs() {
    let h = Harness::with_kindred(config()).await;
    let err = h
        .client
        .run_payload(json!({ "sort_type": "stream", "target_streams": "general" }))
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::RunRhythmInvalid));
    assert_eq!(h.fetches(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn capability_misuse_reports_the_capability_code() {
    let h = Harness::with_kindred(config()).await;

    let err = h
        .client
        .run(&request(r#"fn main(post) { set_sort("high"); }"#))
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::SetSortValueInvalid));

    let err = h
        .client
        .run(&request(r#"fn init() { set_post_quantity(-1); } fn main(post) { }"#))
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::SetPostQuantityValueInvalid));

    let err = h
        .client
        .run(&request(r#"fn init() { get_misc_data("mem://nothing"); } fn main(post) { }"#))
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::GetMiscDataFailed));
    assert_eq!(err.data["source"]["code"], "domus_misc_data");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn capabilities_reach_domus_data() {
    let h = Harness::with_kindred(config()).await;
    let result = h
        .client
        .run(&request(
            r#"
            fn init() {
                set_post_quantity(2);
                this.factor = get_misc_data("mem://weights").factor;
            }
            fn main(post) {
                let takes = fetch_takes(0);
                let author = post.author.domain + "/" + post.author.username;
                set_sort(kindred(author) * this.factor + takes.len());
            }
            "#,
        ))
        .await
        .unwrap();

    // Quantity 2 keeps posts 1 and 2; bo has kindred 2, cy has none.
    assert_eq!(ids(&result.posts), vec![1, 2]);
    assert_eq!(result.posts[0].sort, Some(20.0));
    assert_eq!(result.posts[1].sort, Some(0.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stored_data_survives_between_runs() {
    let h = Harness::with_kindred(config()).await;
    let source = r#"
        fn init() {
            let previous = get_stored_data();
            this.runs = if type_of(previous) == "()" { 1 } else { parse_int(previous) + 1 };
            store_data(this.runs.to_string());
        }
        fn main(post) { set_sort(this.runs); }
    "#;

    h.client.run(&request(source)).await.unwrap();
    let result = h.client.run(&request(source)).await.unwrap();
    assert_eq!(result.posts[0].sort, Some(2.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_main_hits_the_item_budget() {
    let mut cfg = config();
    cfg.timing.item_timeout_ms = 50;
    cfg.limits.max_operations = 0;
    let h = Harness::with_kindred(cfg).await;

    let err = h
        .client
        .run(&request("fn main(post) { loop { } }"))
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::RhythmTimeout));
    assert_eq!(err.data["post_id"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn data_source_errors_are_translated() {
    let h = Harness::with_kindred(config()).await;

    let mut req = request("fn main(post) { }");
    req.target_streams = vec![secret()];
    let err = h.client.run(&req).await.unwrap_err();
    assert!(err.is(ErrorCode::SortRequestPrivate));

    req.target_streams = vec![StreamRef::new("cobalt.example", "ada", "gone", "1")];
    let err = h.client.run(&req).await.unwrap_err();
    assert!(err.is(ErrorCode::SortRequestStream));
}

struct PanickingRhythm;

impl Rhythm for PanickingRhythm {
    fn init(&self) -> Result<(), SandboxError> {
        Ok(())
    }

    fn main(&self, post: &Post) -> Result<Decision, SandboxError> {
        if post.id == 2 {
            panic!("rhythm blew up");
        }
        Ok(Decision::Scored(1.0))
    }

    fn finalize(&self, posts: Vec<Post>) -> Result<Vec<Post>, SandboxError> {
        Ok(posts)
    }
}

struct PanickingLoader;

impl RhythmLoader for PanickingLoader {
    fn load(
        &self,
        _source: &RhythmSource,
        _context: Arc<RhythmContext>,
        _host: Arc<dyn CapabilityHost>,
    ) -> Result<Arc<dyn Rhythm>, SandboxError> {
        Ok(Arc::new(PanickingRhythm))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panic_becomes_an_error_notification() {
    let h = Harness::start_with(config(), Some(Arc::new(PanickingLoader))).await;
    h.client.send_kindred(&KindredMap::new()).await.unwrap();

    let err = h.client.run(&request("ignored")).await.unwrap_err();
    assert!(err.is(ErrorCode::Internal));

    let mut faults = Vec::new();
    for _ in 0..50 {
        faults = h.client.host().faults().await;
        if !faults.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].report.data["message"], "rhythm blew up");
    assert_eq!(faults[0].report.data["post_id"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kindred_is_accepted_once() {
    let h = Harness::with_kindred(config()).await;
    assert!(!h.client.send_kindred(&KindredMap::new()).await.unwrap());

    let err = h
        .client
        .endpoint()
        .request(
            rhythm_transport::MessageType::ReceiveKindredData,
            json!({ "kindred": { "cobalt.example/bo": "lots" } }),
            None,
        )
        .await
        .unwrap_err()
        .into_report();
    assert!(err.is(ErrorCode::KindredInvalid));
}

struct CountingLoader {
    inner: ScriptLoader,
    loads: Arc<AtomicUsize>,
}

impl RhythmLoader for CountingLoader {
    fn load(
        &self,
        source: &RhythmSource,
        context: Arc<RhythmContext>,
        host: Arc<dyn CapabilityHost>,
    ) -> Result<Arc<dyn Rhythm>, SandboxError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(source, context, host)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nothing_runs_until_domus_acknowledges_readiness() {
    let (mut domus_end, filter_end) = link(
        Domain::new("domus.cobalt.example"),
        Domain::new("filter.cobalt.example"),
        64,
    );

    // A Domus side that swallows `DomainReady` and never acknowledges it.
    let (forward, filtered) = mpsc::channel(64);
    let mut raw = std::mem::replace(&mut domus_end.inbound, filtered);
    tokio::spawn(async move {
        while let Some(envelope) = raw.recv().await {
            if envelope.message_type == MessageType::DomainReady {
                continue;
            }
            if forward.send(envelope).await.is_err() {
                break;
            }
        }
    });

    let posts = Arc::new(CountingPosts {
        inner: InMemoryPosts::new()
            .with_stream(general(), StreamAccess::Public)
            .with_posts(fixture_posts()),
        calls: AtomicUsize::new(0),
    });
    let host = Arc::new(DomusHost::new(
        posts.clone(),
        Arc::new(InMemoryTakes::new(Vec::new())),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(StaticMiscData::new()),
    ));
    let (domus, inbound) = Endpoint::from_link(domus_end, EndpointConfig::default());
    let handler: Arc<dyn MessageHandler> = host.clone();
    domus.spawn_dispatch(inbound, handler);

    let mut cfg = config();
    cfg.endpoint.handshake_window_ms = 300;
    let loads = Arc::new(AtomicUsize::new(0));
    let loader = Arc::new(CountingLoader {
        inner: ScriptLoader::from_config(&cfg),
        loads: loads.clone(),
    });
    let filter = tokio::spawn(FilterDomain::start_with_loader(filter_end, cfg, loader));

    let req = request("fn main(post) { set_sort(1); }");
    host.begin_session(req.user.clone(), req.rhythm.identity()).await;
    let wait = Some(Duration::from_secs(2));
    let (kindred, run) = tokio::join!(
        domus.request(
            MessageType::ReceiveKindredData,
            json!({ "kindred": {} }),
            wait
        ),
        domus.request(MessageType::RunRhythm, serde_json::to_value(&req).unwrap(), wait),
    );

    assert!(kindred
        .unwrap_err()
        .into_report()
        .is(ErrorCode::TransportHandshakeTimeout));
    assert!(run
        .unwrap_err()
        .into_report()
        .is(ErrorCode::TransportHandshakeTimeout));
    assert!(filter.await.unwrap().is_err());
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert_eq!(posts.calls.load(Ordering::SeqCst), 0);
}
