//! In-process media fetcher for orchestrator scenarios.
//!
//! Serves a fixed playlist, writes a small file per fetched item and fails
//! selected items with a configurable message until they are repaired.

use std::collections::HashMap;
use std::sync::Mutex;

use plget_core::fetcher::{FetchProgress, FetchRequest, MediaFetcher, PlaylistEntry, PlaylistInfo};

pub const ITEM_BYTES: usize = 1024;

type Hook = Box<dyn Fn(&FetchRequest) + Send + Sync>;

pub struct FakeFetcher {
    entries: Vec<PlaylistEntry>,
    broken: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
    before_fetch: Option<Hook>,
}

pub fn item_url(item_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={item_id}")
}

impl FakeFetcher {
    pub fn new(items: &[&str]) -> Self {
        Self {
            entries: items
                .iter()
                .map(|id| PlaylistEntry {
                    item_id: id.to_string(),
                    source_url: item_url(id),
                    title: format!("Video {id}"),
                })
                .collect(),
            broken: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            before_fetch: None,
        }
    }

    /// Every fetch of `item_id` fails with `message` until `repair` is called.
    pub fn failing(self, item_id: &str, message: &str) -> Self {
        self.broken
            .lock()
            .unwrap()
            .insert(item_url(item_id), message.to_string());
        self
    }

    /// Run `hook` at the start of every fetch.
    pub fn before_fetch(mut self, hook: impl Fn(&FetchRequest) + Send + Sync + 'static) -> Self {
        self.before_fetch = Some(Box::new(hook));
        self
    }

    pub fn repair(&self, item_id: &str) {
        self.broken.lock().unwrap().remove(&item_url(item_id));
    }

    pub fn calls_for(&self, item_id: &str) -> usize {
        let url = item_url(item_id);
        self.calls.lock().unwrap().iter().filter(|c| **c == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl MediaFetcher for FakeFetcher {
    fn extract_playlist(&self, _url: &str) -> anyhow::Result<PlaylistInfo> {
        Ok(PlaylistInfo {
            title: "Integration playlist".to_string(),
            description: Some("fixture".to_string()),
            entries: self.entries.clone(),
        })
    }

    fn fetch(
        &self,
        request: &FetchRequest,
        on_progress: &mut dyn FnMut(&str, FetchProgress),
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(request.source_url.clone());
        if let Some(hook) = &self.before_fetch {
            hook(request);
        }
        if let Some(message) = self.broken.lock().unwrap().get(&request.source_url) {
            anyhow::bail!("{message}");
        }
        for downloaded in [ITEM_BYTES / 2, ITEM_BYTES] {
            on_progress(
                &request.job_id,
                FetchProgress {
                    downloaded_bytes: downloaded as u64,
                    total_bytes: Some(ITEM_BYTES as u64),
                    speed: Some(4096.0),
                    eta_secs: Some(0),
                },
            );
        }
        std::fs::write(&request.destination, vec![7u8; ITEM_BYTES])?;
        Ok(())
    }
}
