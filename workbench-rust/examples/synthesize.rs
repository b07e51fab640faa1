use std::env;

mod common;

#[tokio::main]
async fn main() {
    common::init_tracing();

    let query = env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let query = if query.trim().is_empty() {
        "schema.org Recipe".to_string()
    } else {
        query
    };

    let workbench = common::workbench();
    let artifact = workbench
        .synthesizer()
        .synthesize(&query)
        .await
        .expect("synthesis failed");

    println!("# {}\n\n{}\n", artifact.title, artifact.description);
    println!("## Prompt\n\n{}\n", artifact.prompt);
    println!("## Example\n\n{}\n", artifact.example);
    println!("## Sources");
    for source in &artifact.sources {
        println!("- {} <{}>", source.title, source.uri);
    }

    let mut audit = workbench.audit(&artifact);
    println!("\n## Validation\n\n{}", audit.validate().await);

    match audit.derive().await {
        Ok(schema) => println!("\n## Derived schema\n\n{schema}"),
        Err(error) => println!("\nSchema derivation failed: {error}"),
    }
}
