//! Render cache integration tests
//!
//! `cargo test -p fragkit-core --test render_cache`

use fragkit_core::{DependencyWatcher, RenderCache, RenderRequest};
use fragkit_foundation::{CacheConfig, Params};
use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_button_hit_miss_and_file_change() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("button.html");
    std::fs::write(&template, "<button>{{ text }}</button>").unwrap();

    let cache = RenderCache::new(CacheConfig::default()).unwrap();
    let request = RenderRequest::new("button")
        .with_param("text", "Go")
        .with_file(&template);

    let calls = Cell::new(0);
    let render_fn = |_: &str, params: &Params| -> anyhow::Result<String> {
        calls.set(calls.get() + 1);
        let source = std::fs::read_to_string(&template)?;
        let text = match params.get("text") {
            Some(fragkit_foundation::ParamValue::Str(t)) => t.clone(),
            _ => String::new(),
        };
        Ok(source.replace("{{ text }}", &text))
    };

    // First call renders
    let first = cache.render(&request, render_fn).unwrap();
    assert_eq!(&*first.text, "<button>Go</button>");
    assert_eq!(calls.get(), 1);

    // Same params, same file: cached
    let second = cache.render(&request, render_fn).unwrap();
    assert!(second.from_cache);
    assert_eq!(second.text, first.text);
    assert_eq!(calls.get(), 1);

    // File bytes change: new fingerprint, render again
    std::fs::write(&template, "<button class=\"primary\">{{ text }}</button>").unwrap();
    let third = cache.render(&request, render_fn).unwrap();
    assert_eq!(calls.get(), 2);
    assert!(!third.from_cache);
    assert_ne!(third.fingerprint, first.fingerprint);
    assert_ne!(third.text, first.text);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.entry_count, 2);
    assert!(stats.components_cached.contains("button"));
}

#[test]
fn test_param_order_shares_entry() {
    let cache = RenderCache::default();
    let calls = Cell::new(0);
    let render_fn = |_: &str, _: &Params| -> anyhow::Result<String> {
        calls.set(calls.get() + 1);
        Ok("card".into())
    };

    let a = RenderRequest::new("card").with_param("title", "T").with_param("n", 1);
    let b = RenderRequest::new("card").with_param("n", 1).with_param("title", "T");

    cache.render(&a, render_fn).unwrap();
    assert!(cache.render(&b, render_fn).unwrap().from_cache);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_oversized_render_returned_but_not_cached() {
    let cache = RenderCache::new(CacheConfig {
        budget_bytes: 16,
        ..CacheConfig::default()
    })
    .unwrap();
    let big = "x".repeat(64);

    let out = cache
        .render_cached("big", &Params::new(), &[], |_, _| Ok::<_, anyhow::Error>(big.clone()))
        .unwrap();
    assert_eq!(out.len(), 64);
    assert!(cache.store().is_empty());
    assert_eq!(cache.stats().rejections, 1);
}

#[test]
fn test_scoped_invalidation_keeps_other_components() {
    let cache = RenderCache::default();
    for component in ["a", "b"] {
        for variant in 0..3 {
            let request = RenderRequest::new(component).with_param("variant", variant);
            cache
                .render(&request, |name, _| Ok::<_, anyhow::Error>(format!("{name}{variant}")))
                .unwrap();
        }
    }

    assert_eq!(cache.invalidate_component("a"), 3);
    for variant in 0..3 {
        let request = RenderRequest::new("b").with_param("variant", variant);
        let out = cache
            .render(&request, |_, _| Err::<String, _>(anyhow::anyhow!("should be cached")))
            .unwrap();
        assert!(out.from_cache);
    }
    assert!(!cache.stats().components_cached.contains("a"));
}

#[test]
fn test_watcher_loop_on_tokio_test_runtime() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("t.html");
    std::fs::write(&template, "v1").unwrap();

    let cache = RenderCache::default();
    cache
        .render_cached("t", &Params::new(), &[template.clone()], |_, _| {
            Ok::<_, anyhow::Error>("v1".into())
        })
        .unwrap();

    let watcher = Arc::new(DependencyWatcher::new(cache.clone()));
    watcher.register("t", [&template]);

    tokio_test::block_on(async {
        let handle = Arc::clone(&watcher).spawn(Duration::from_millis(5));
        std::fs::write(&template, "v2").unwrap();
        for _ in 0..200 {
            if cache.store().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.stop().await;
    });

    assert!(cache.store().is_empty());
}
