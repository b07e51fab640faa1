use forge_sdk::{
    forge_sdk_test::{MockGenerateResult, MockLanguageModel},
    Citation, LanguageModelError, ModelResponse, Part, Tool,
};
use forge_workbench::{FeedPhase, FeedPoller, FeedStatus, FetchFailureHint, DEFAULT_POLL_PERIOD};
use std::{sync::Arc, time::Duration};

const HOUR: Duration = Duration::from_secs(3600);

fn snapshot_response(price: f64) -> ModelResponse {
    ModelResponse {
        content: vec![Part::text(format!(
            "{{\"currentPrice\": {price}, \"changePercent\": 1.5, \
             \"history\": [{{\"date\": \"2024-05-01\", \"price\": {price}}}]}}"
        ))],
        ..Default::default()
    }
    .with_citations(vec![Citation::new(
        "Quote",
        "https://finance.example.com/quote",
    )])
}

fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        content: vec![Part::text(text)],
        ..Default::default()
    }
}

fn price(status: &FeedStatus) -> Option<f64> {
    status.snapshot.as_ref().map(|snapshot| snapshot.current_price)
}

async fn wait_for(poller: &FeedPoller, predicate: impl FnMut(&FeedStatus) -> bool) -> FeedStatus {
    let mut receiver = poller.subscribe();
    let status = receiver.wait_for(predicate).await.unwrap();
    status.clone()
}

async fn settle_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn initial_fetch_populates_snapshot() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(snapshot_response(187.25));
    let mut poller = FeedPoller::new(model.clone(), HOUR);

    poller.set_subject("  aapl ");
    assert!(poller.status().is_loading());
    assert!(poller.is_running());

    let status = wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;

    assert_eq!(status.subject.as_deref(), Some("AAPL"));
    assert_eq!(price(&status), Some(187.25));
    assert_eq!(
        status.snapshot.unwrap().source_url.as_deref(),
        Some("https://finance.example.com/quote")
    );

    let input = &model.tracked_generate_inputs()[0];
    assert_eq!(input.tools, Some(vec![Tool::GoogleSearch]));
    assert_eq!(input.response_format, None);
}

#[tokio::test]
async fn late_refresh_for_old_subject_is_discarded() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(snapshot_response(100.0));
    let (gate, responder) = MockGenerateResult::deferred();
    model.enqueue_generate(gate);
    model.enqueue_generate(snapshot_response(200.0));
    let mut poller = FeedPoller::new(model.clone(), HOUR);

    poller.set_subject("AAA");
    wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;

    poller.refresh_now();
    let status = wait_for(&poller, FeedStatus::is_stale).await;
    assert_eq!(price(&status), Some(100.0));

    poller.set_subject("BBB");
    let status = poller.status();
    assert_eq!(status.subject.as_deref(), Some("BBB"));
    assert!(status.is_loading());
    assert_eq!(status.snapshot, None);

    let status = wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;
    assert_eq!(price(&status), Some(200.0));

    responder.respond(snapshot_response(999.0));
    settle_until(|| poller.discarded_results() == 1).await;

    let status = poller.status();
    assert_eq!(status.subject.as_deref(), Some("BBB"));
    assert_eq!(status.phase, FeedPhase::Ready);
    assert_eq!(price(&status), Some(200.0));
}

#[tokio::test]
async fn late_initial_result_for_old_subject_is_discarded() {
    let model = Arc::new(MockLanguageModel::new());
    let (gate, responder) = MockGenerateResult::deferred();
    model.enqueue_generate(gate);
    model.enqueue_generate(snapshot_response(50.0));
    let mut poller = FeedPoller::new(model.clone(), HOUR);

    poller.set_subject("OLD");
    settle_until(|| model.generate_call_count() == 1).await;
    poller.set_subject("NEW");
    wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;

    responder.respond(snapshot_response(1.0));
    settle_until(|| poller.discarded_results() == 1).await;

    let status = poller.status();
    assert_eq!(status.subject.as_deref(), Some("NEW"));
    assert_eq!(price(&status), Some(50.0));
}

#[tokio::test]
async fn refresh_failure_keeps_previous_snapshot() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(snapshot_response(42.0));
    model.enqueue_generate(LanguageModelError::Invariant("google", "quota".into()));
    let mut poller = FeedPoller::new(model.clone(), HOUR);

    poller.set_subject("MSFT");
    wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;

    poller.refresh_now();
    settle_until(|| model.generate_call_count() == 2).await;

    let status = wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;
    assert_eq!(status.error(), None);
    assert_eq!(price(&status), Some(42.0));
}

#[tokio::test]
async fn prose_reply_for_unknown_symbol_fails_as_malformed() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(text_response(
        "I could not find any market data for ZZZ999.",
    ));
    let mut poller = FeedPoller::new(model, HOUR);

    poller.set_subject("ZZZ999");
    let status = wait_for(&poller, |status| status.error().is_some()).await;

    assert_eq!(status.snapshot, None);
    assert_eq!(status.error().unwrap().hint(), FetchFailureHint::Malformed);
}

#[tokio::test]
async fn empty_history_fails_as_empty_dataset() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(text_response("{\"history\": []}"));
    let mut poller = FeedPoller::new(model, HOUR);

    poller.set_subject("ZZZ999");
    let status = wait_for(&poller, |status| status.error().is_some()).await;

    assert_eq!(
        status.error().unwrap().hint(),
        FetchFailureHint::EmptyDataset
    );
}

#[tokio::test]
async fn blank_subject_stops_polling() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(snapshot_response(10.0));
    let mut poller = FeedPoller::new(model, HOUR);

    poller.set_subject("IBM");
    wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;
    poller.set_subject("   ");

    let status = poller.status();
    assert!(!poller.is_running());
    assert_eq!(status.phase, FeedPhase::Idle);
    assert_eq!(status.subject, None);
    assert_eq!(status.snapshot, None);
}

#[tokio::test(start_paused = true)]
async fn timer_refresh_shows_stale_snapshot_until_reply() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(snapshot_response(100.0));
    let (gate, responder) = MockGenerateResult::deferred();
    model.enqueue_generate(gate);
    let mut poller = FeedPoller::new(model.clone(), Duration::from_secs(15));

    poller.set_subject("AAA");
    wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;
    assert_eq!(model.generate_call_count(), 1);

    tokio::time::advance(Duration::from_secs(15)).await;
    let status = wait_for(&poller, FeedStatus::is_stale).await;
    assert_eq!(price(&status), Some(100.0));

    responder.respond(snapshot_response(110.0));
    let status = wait_for(&poller, |status| {
        status.phase == FeedPhase::Ready && price(status) == Some(110.0)
    })
    .await;
    assert_eq!(status.error(), None);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_timer() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(snapshot_response(1.0));
    let mut poller = FeedPoller::new(model.clone(), Duration::from_secs(15));

    poller.set_subject("AAA");
    wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;
    poller.stop();

    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(model.generate_call_count(), 1);
    assert_eq!(poller.status().phase, FeedPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn dropping_poller_cancels_timer() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(snapshot_response(1.0));
    let mut poller = FeedPoller::new(model.clone(), Duration::from_secs(15));

    poller.set_subject("AAA");
    wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;
    drop(poller);

    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(model.generate_call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_period_falls_back_to_default() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(snapshot_response(1.0));
    model.enqueue_generate(snapshot_response(2.0));
    let mut poller = FeedPoller::new(model.clone(), Duration::ZERO);
    assert_eq!(poller.period(), DEFAULT_POLL_PERIOD);

    poller.set_subject("AAA");
    wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;

    tokio::time::advance(DEFAULT_POLL_PERIOD).await;
    let status = wait_for(&poller, |status| price(status) == Some(2.0)).await;

    assert!(poller.is_running());
    assert_eq!(status.phase, FeedPhase::Ready);
    assert_eq!(model.generate_call_count(), 2);
}

#[tokio::test]
async fn stays_stale_while_another_refresh_is_outstanding() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(snapshot_response(100.0));
    let (first, first_responder) = MockGenerateResult::deferred();
    let (second, second_responder) = MockGenerateResult::deferred();
    model.enqueue_generate(first);
    model.enqueue_generate(second);
    let mut poller = FeedPoller::new(model.clone(), HOUR);

    poller.set_subject("AAA");
    wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;

    poller.refresh_now();
    poller.refresh_now();
    settle_until(|| model.generate_call_count() == 3).await;
    assert!(poller.status().is_stale());

    first_responder.fail(LanguageModelError::Invariant("google", "quota".into()));
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    let status = poller.status();
    assert!(status.is_stale());
    assert_eq!(price(&status), Some(100.0));

    second_responder.respond(snapshot_response(105.0));
    let status = wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;
    assert_eq!(price(&status), Some(105.0));
}

#[tokio::test]
async fn older_refresh_landing_last_is_counted_as_discarded() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(snapshot_response(100.0));
    let (older, older_responder) = MockGenerateResult::deferred();
    let (newer, newer_responder) = MockGenerateResult::deferred();
    model.enqueue_generate(older);
    model.enqueue_generate(newer);
    let mut poller = FeedPoller::new(model.clone(), HOUR);

    poller.set_subject("AAA");
    wait_for(&poller, |status| status.phase == FeedPhase::Ready).await;

    poller.refresh_now();
    settle_until(|| model.generate_call_count() == 2).await;
    poller.refresh_now();
    settle_until(|| model.generate_call_count() == 3).await;

    newer_responder.respond(snapshot_response(120.0));
    let status = wait_for(&poller, |status| price(status) == Some(120.0)).await;
    assert!(status.is_stale());

    older_responder.respond(snapshot_response(110.0));
    settle_until(|| poller.discarded_results() == 1).await;

    let status = poller.status();
    assert_eq!(status.phase, FeedPhase::Ready);
    assert_eq!(price(&status), Some(120.0));
}
