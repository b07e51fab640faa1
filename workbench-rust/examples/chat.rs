use forge_workbench::{Artifact, TurnRole};
use std::io::{self, BufRead, Write};

mod common;

#[tokio::main]
async fn main() {
    common::init_tracing();

    let artifact = Artifact {
        title: "Calendar Event".into(),
        prompt: "Return a JSON object with title (string, required), start and end \
                 (ISO 8601 date-time strings, required) and attendees (array of email \
                 strings, optional)."
            .into(),
        ..Default::default()
    };

    let workbench = common::workbench();
    let mut session = workbench.conversation(Some(&artifact));
    let mut updates = session.subscribe();

    // Echo the transcript as it grows, fragment by fragment.
    tokio::spawn(async move {
        let mut printed = 0;
        while updates.changed().await.is_ok() {
            let turns = updates.borrow_and_update().clone();
            let Some(last) = turns.last() else {
                printed = 0;
                continue;
            };
            if last.role == TurnRole::Assistant {
                print!("{}", &last.text[printed.min(last.text.len())..]);
                printed = last.text.len();
                io::stdout().flush().ok();
            } else {
                printed = 0;
            }
        }
    });

    let stdin = io::stdin();
    print!("> ");
    io::stdout().flush().ok();
    for line in stdin.lock().lines() {
        let line = line.expect("failed to read stdin");
        session.send(&line).await;
        print!("\n> ");
        io::stdout().flush().ok();
    }
}
