//! Standalone MTConnect document dump tool
//!
//! Fetches one `current` document and prints every available data item in
//! traversal order, grouped by category.
//!
//! Usage:
//!   dump_current <agent_url> [--namespace <uri>]
//!
//! Example:
//!   dump_current http://mtconnect.mazakcorp.com:5609/current

use mtconnect_stream::{extract, Category, DocumentSource, HttpSource};
use std::env;
use std::time::Duration;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <agent_url> [--namespace <uri>]", args[0]);
        std::process::exit(1);
    }

    let url = &args[1];
    let namespace = args
        .iter()
        .position(|a| a == "--namespace")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str);

    let source = match HttpSource::new(Duration::from_secs(5)) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let document = match source.fetch(url) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let extraction = match extract(&document, namespace) {
        Ok(extraction) => extraction,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("Namespace: {}", extraction.namespace.as_deref().unwrap_or("(none)"));
    println!("Created:   {}", extraction.creation_time.as_deref().unwrap_or("(unknown)"));
    for warning in &extraction.warnings {
        println!("Warning:   {}", warning);
    }

    for category in Category::ALL {
        let items: Vec<_> = extraction
            .signals
            .iter()
            .filter(|s| s.category == category)
            .collect();

        println!("\n=== {} ({}) ===", category, items.len());
        for item in items {
            println!(
                "  {:<50} {:<20} = {}",
                item.identity.display_label, item.element_name, item.value
            );
        }
    }
}
