//! Loads run in parallel on the bundler's task pool. The plugin must give the
//! same answers under concurrency and stop promptly when the build aborts.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use astro_build_pages::{
    BuildAbort, Handled, ModuleResolver, PageMetadata, PageRegistry, PagesConfig, PagesError,
    PagesPlugin, ResolvedModule,
};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolves `.astro` specifiers after yielding once, counting calls.
#[derive(Default)]
struct YieldingResolver {
    calls: AtomicUsize,
}

impl ModuleResolver for YieldingResolver {
    fn resolve(
        &self,
        specifier: &str,
    ) -> impl Future<Output = Result<Option<ResolvedModule>, PagesError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let found = specifier
            .ends_with(".astro")
            .then(|| ResolvedModule::new(specifier.to_string()));
        async move {
            tokio::task::yield_now().await;
            Ok(found)
        }
    }
}

/// Never finishes resolving until notified.
struct BlockedResolver {
    release: Arc<Notify>,
    started: Arc<Notify>,
}

impl ModuleResolver for BlockedResolver {
    fn resolve(
        &self,
        specifier: &str,
    ) -> impl Future<Output = Result<Option<ResolvedModule>, PagesError>> + Send {
        let release = Arc::clone(&self.release);
        let started = Arc::clone(&self.started);
        let resolved = ResolvedModule::new(specifier.to_string());
        async move {
            started.notify_one();
            release.notified().await;
            Ok(Some(resolved))
        }
    }
}

fn many_pages(count: usize) -> PageRegistry {
    PageRegistry::from_pages((0..count).map(|i| {
        let specifier = if i % 5 == 0 {
            format!("./src/pages/p{i}.missing")
        } else {
            format!("./src/pages/p{i}.astro")
        };
        (format!("/p{i}"), PageMetadata::new(specifier))
    }))
    .unwrap()
}

// ===========================================================================
// Parallel loads
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_loads_match_sequential() {
    let plugin = Arc::new(
        PagesPlugin::new(many_pages(100), PagesConfig::default(), YieldingResolver::default())
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..100 {
        let plugin = Arc::clone(&plugin);
        handles.push(tokio::spawn(async move {
            let id = format!("\0@astro-page:/p{i}");
            (i, plugin.load_virtual_module(&id).await)
        }));
    }

    let mut found = 0;
    for handle in handles {
        let (i, result) = handle.await.unwrap();
        let result = result.unwrap();
        let id = format!("\0@astro-page:/p{i}");
        let sequential = plugin.load_virtual_module(&id).await.unwrap();
        assert_eq!(result, sequential, "page {i}");
        if i % 5 == 0 {
            assert_eq!(result, Handled::NotMine);
        } else {
            found += 1;
        }
    }
    assert_eq!(found, 80);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_resolution_per_parallel_load() {
    let resolver = Arc::new(YieldingResolver::default());
    let plugin = Arc::new(
        PagesPlugin::new(many_pages(40), PagesConfig::default(), Arc::clone(&resolver)).unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..40 {
        let plugin = Arc::clone(&plugin);
        handles.push(tokio::spawn(async move {
            plugin
                .load_virtual_module(&format!("\0@astro-page:/p{i}"))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 40);
    assert_eq!(plugin.registry().len(), 40);
}

#[tokio::test]
async fn resolver_counts_one_call_per_load() {
    let resolver = Arc::new(YieldingResolver::default());
    let plugin =
        PagesPlugin::new(many_pages(10), PagesConfig::default(), Arc::clone(&resolver)).unwrap();
    for i in 0..10 {
        plugin
            .load_virtual_module(&format!("\0@astro-page:/p{i}"))
            .await
            .unwrap();
    }
    // Foreign and unregistered ids never reach the resolver.
    plugin.load_virtual_module("\0@astro-page:/nope").await.unwrap();
    plugin.load_virtual_module("/src/pages/p1.astro").await.unwrap();
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 10);
}

// ===========================================================================
// Abort
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abort_cancels_in_flight_load() {
    let release = Arc::new(Notify::new());
    let started = Arc::new(Notify::new());
    let abort = BuildAbort::new();
    let plugin = Arc::new(
        PagesPlugin::new(
            many_pages(2),
            PagesConfig::default(),
            BlockedResolver {
                release: Arc::clone(&release),
                started: Arc::clone(&started),
            },
        )
        .unwrap()
        .with_abort(abort.clone()),
    );

    let task = {
        let plugin = Arc::clone(&plugin);
        tokio::spawn(async move { plugin.load_virtual_module("\0@astro-page:/p1").await })
    };

    started.notified().await;
    abort.abort();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, PagesError::Aborted));
}

#[tokio::test]
async fn released_resolver_completes_without_abort() {
    let release = Arc::new(Notify::new());
    let started = Arc::new(Notify::new());
    let plugin = PagesPlugin::new(
        many_pages(2),
        PagesConfig::default(),
        BlockedResolver {
            release: Arc::clone(&release),
            started: Arc::clone(&started),
        },
    )
    .unwrap();

    // A stored permit lets the resolver finish immediately.
    release.notify_one();
    let result = plugin.load_virtual_module("\0@astro-page:/p1").await.unwrap();
    assert!(result.is_found());
}
