#![allow(dead_code)]

use operator::{MemoryPage, Registry, Session, Timings};
use std::sync::Arc;

pub const PAGE_URL: &str = "https://my.xestro.com/Dashboard/Patient";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// In-memory page plus a session bound to the built-in profile.
pub async fn session_for(html: &str) -> (Arc<MemoryPage>, Session) {
    init_tracing();
    let page = Arc::new(MemoryPage::from_html(PAGE_URL, html));
    let registry = Registry::builtin().expect("built-in registry");
    let session = Session::new(page.clone(), registry, Timings::default());
    session
        .sync_profile()
        .await
        .expect("profile sync")
        .expect("page address selects a profile");
    (page, session)
}

pub fn body(inner: &str) -> String {
    format!("<html><head><title>Xestro</title></head><body>{inner}</body></html>")
}
