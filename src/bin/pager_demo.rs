//! Simple CLI for poking at a paged storage database.
//!
//! Usage:
//!   pager_demo <db_path> append <text>
//!   pager_demo <db_path> insert <page_id> <text>
//!   pager_demo <db_path> get <page_id> <slot_id>
//!   pager_demo <db_path> stats

use paged_storage::{Config, PageId, PageStore, SlottedPage};
use std::env;
use std::process::exit;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: pager_demo <db_path> <command> [args...]");
        eprintln!("Commands:");
        eprintln!("  append <text>            - Store a record on a fresh page");
        eprintln!("  insert <page_id> <text>  - Store a record on an existing page");
        eprintln!("  get <page_id> <slot_id>  - Read a record back");
        eprintln!("  stats                    - Show database statistics");
        exit(1);
    }

    let db_path = &args[1];
    let command = &args[2];

    let store = match PageStore::open(Config::new(db_path)) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("ERROR: Failed to open database: {}", e);
            exit(1);
        }
    };

    match command.as_str() {
        "append" => {
            if args.len() < 4 {
                eprintln!("Usage: pager_demo <db_path> append <text>");
                exit(1);
            }
            let record = args[3].as_bytes();

            let result = store.buffer_pool().new_page().and_then(|guard| {
                let page_id = guard.page_id();
                let slot_id = {
                    let mut page = guard.write();
                    let mut slotted = SlottedPage::new(&mut page);
                    slotted.insert(record)?
                };
                guard.unpin(true)?;
                Ok((page_id, slot_id))
            });

            match result {
                Ok((page_id, slot_id)) => println!("page: {} slot: {}", page_id, slot_id),
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    exit(1);
                }
            }
        }

        "insert" => {
            if args.len() < 5 {
                eprintln!("Usage: pager_demo <db_path> insert <page_id> <text>");
                exit(1);
            }
            let page_id = parse_u64(&args[3], "page_id");
            let record = args[4].as_bytes();

            let result = store
                .buffer_pool()
                .fetch_page(PageId::new(page_id))
                .and_then(|guard| {
                    let slot_id = {
                        let mut page = guard.write();
                        let mut slotted = SlottedPage::new(&mut page);
                        slotted.insert(record)?
                    };
                    guard.unpin(true)?;
                    Ok(slot_id)
                });

            match result {
                Ok(slot_id) => println!("slot: {}", slot_id),
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    exit(1);
                }
            }
        }

        "get" => {
            if args.len() < 5 {
                eprintln!("Usage: pager_demo <db_path> get <page_id> <slot_id>");
                exit(1);
            }
            let page_id = parse_u64(&args[3], "page_id");
            let slot_id = parse_u64(&args[4], "slot_id") as u16;

            let result = store
                .buffer_pool()
                .fetch_page(PageId::new(page_id))
                .and_then(|guard| {
                    let record = {
                        let mut page = guard.write();
                        let slotted = SlottedPage::new(&mut page);
                        slotted.get(slot_id)?.to_vec()
                    };
                    guard.unpin(false)?;
                    Ok(record)
                });

            match result {
                Ok(record) => match String::from_utf8(record) {
                    Ok(text) => println!("{}", text),
                    Err(_) => println!("<binary data>"),
                },
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    exit(1);
                }
            }
        }

        "stats" => match serde_json::to_string_pretty(&store.stats()) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                exit(1);
            }
        },

        _ => {
            eprintln!("Unknown command: {}", command);
            exit(1);
        }
    }

    // Ensure data is persisted
    if let Err(e) = store.close() {
        eprintln!("Warning: Failed to close database: {}", e);
    }
}

fn parse_u64(arg: &str, name: &str) -> u64 {
    match arg.parse() {
        Ok(value) => value,
        Err(_) => {
            eprintln!("ERROR: Invalid {}: {}", name, arg);
            exit(1);
        }
    }
}
