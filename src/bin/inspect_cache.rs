use std::path::PathBuf;

use triage::cache::{CacheStore, FileStore};
use triage::config::AppDefaults;
use triage::list::build_groups;
use triage::types::Message;

/// Print the message cache grouped by sender, the way the list shows it.
fn main() -> anyhow::Result<()> {
    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => AppDefaults::load()?.cache_path,
    };

    let cache = CacheStore::load(FileStore::new(&path));
    println!("{} ({} cached messages)", path.display(), cache.len());

    let groups = build_groups(cache.records().map(Message::from_record));
    for group in &groups {
        println!("{}", group.label());
        for item in &group.items {
            println!("{}", item.label());
        }
    }

    Ok(())
}
