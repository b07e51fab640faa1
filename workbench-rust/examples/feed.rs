use forge_workbench::FeedPhase;
use std::env;

mod common;

#[tokio::main]
async fn main() {
    common::init_tracing();

    let subject = env::args().nth(1).unwrap_or_else(|| "GOOG".to_string());

    let workbench = common::workbench();
    let mut poller = workbench.feed_poller();
    let mut updates = poller.subscribe();
    poller.set_subject(&subject);

    while updates.changed().await.is_ok() {
        let status = updates.borrow_and_update().clone();
        match (&status.phase, &status.snapshot) {
            (FeedPhase::Loading, _) => println!("loading {subject}..."),
            (FeedPhase::Refreshing, Some(snapshot)) => {
                println!("{} (refreshing)", snapshot.current_price);
            }
            (FeedPhase::Ready, Some(snapshot)) => println!(
                "{} {:+.2}% over {} points, source: {}",
                snapshot.current_price,
                snapshot.change_percent,
                snapshot.history.len(),
                snapshot.source_url.as_deref().unwrap_or("n/a")
            ),
            (FeedPhase::Failed(error), _) => {
                println!("{error}\n{}", error.hint().hint());
            }
            _ => {}
        }
    }
}
