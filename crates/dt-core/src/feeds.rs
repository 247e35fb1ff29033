//! Threat-intelligence feed refresh.

use crate::logging::{event_names, Stage};
use crate::pipeline::log_module_failure;
use crate::plugin::{Feed, PluginRegistry};
use dt_common::{ModuleError, ModuleResult, ResultAggregate};
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Refreshes every enabled feed and records where its data lives.
pub struct FeedRunner<'a> {
    registry: &'a PluginRegistry,
}

impl<'a> FeedRunner<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self { registry }
    }

    /// Replace `results.feeds` with the paths of the feeds that ran.
    pub fn run(&self, results: &mut ResultAggregate) {
        results.feeds.clear();

        for descriptor in self.registry.feeds() {
            let name = descriptor.name();
            if !descriptor.enabled() {
                debug!(stage = %Stage::Feeds, feed = name, "feed disabled");
                continue;
            }

            let mut feed = match descriptor.instantiate() {
                Ok(feed) => feed,
                Err(e) => {
                    error!(stage = %Stage::Feeds, feed = name, error = %e, "failed to load feed");
                    continue;
                }
            };

            match refresh(feed.as_mut()) {
                Ok(path) => {
                    info!(stage = %Stage::Feeds, event = event_names::FEED_UPDATED, feed = name, path = %path.display(), "feed ready");
                    results.feeds.insert(name.to_string(), path);
                }
                Err(e) => log_module_failure(Stage::Feeds, name, &e),
            }
        }
    }
}

/// Update, optionally modify, then run one feed.
fn refresh(feed: &mut dyn Feed) -> ModuleResult<PathBuf> {
    if feed.update()? {
        let modified = match feed.modify() {
            Ok(()) => true,
            Err(ModuleError::NotImplemented) => false,
            Err(e) => return Err(e),
        };
        feed.run(modified)?;
    }
    Ok(feed.feed_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeFeed, FeedProbe};
    use dt_common::CATEGORY_FILE;

    #[test]
    fn test_feed_paths_recorded() {
        let probe = FeedProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(FakeFeed::new("bad_ips", "/feeds/bad_ips.json").updating().with_modify().descriptor(&probe));
        registry.register(FakeFeed::new("stale", "/feeds/stale.json").descriptor(&probe));
        let mut results = ResultAggregate::new(CATEGORY_FILE);
        results.feeds.insert("old".into(), "/feeds/old".into());

        FeedRunner::new(&registry).run(&mut results);
        assert_eq!(results.feeds.len(), 2);
        assert_eq!(results.feeds["bad_ips"], PathBuf::from("/feeds/bad_ips.json"));
        assert!(!results.feeds.contains_key("old"));
        assert_eq!(probe.runs(), [("bad_ips".to_string(), true)]);
    }

    #[test]
    fn test_modify_not_implemented_runs_unmodified() {
        let probe = FeedProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(FakeFeed::new("tor", "/feeds/tor").updating().descriptor(&probe));
        let mut results = ResultAggregate::new(CATEGORY_FILE);

        FeedRunner::new(&registry).run(&mut results);
        assert_eq!(probe.runs(), [("tor".to_string(), false)]);
        assert!(results.feeds.contains_key("tor"));
    }

    #[test]
    fn test_failures_and_disabled_feeds_skipped() {
        let probe = FeedProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(FakeFeed::new("broken", "/feeds/b").updating().failing_modify().descriptor(&probe));
        registry.register(FakeFeed::new("off", "/feeds/off").descriptor(&probe).with_enabled(false));
        let mut results = ResultAggregate::new(CATEGORY_FILE);

        FeedRunner::new(&registry).run(&mut results);
        assert!(results.feeds.is_empty());
        assert!(probe.runs().is_empty());
    }
}
