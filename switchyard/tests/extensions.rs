//! Integration tests for extension resolution wired to the exchange layer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use switchyard::prelude::*;
use switchyard::{
    BuiltinExtensions, DuplicatePolicy, EXCHANGER_KEY, MemoryNetwork, RegistryConfig,
    StandardExchanger, WrapperPredicate,
};

struct Echo;

#[async_trait::async_trait]
impl ExchangeHandler for Echo {
    async fn reply(&self, _channel: &ExchangeChannel, request: Request) -> Result<Bytes, HandlerError> {
        Ok(request.payload)
    }
}

/// Exchanger decorator counting how often it is asked to bind.
struct Counting {
    inner: Arc<dyn Exchanger>,
    binds: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Exchanger for Counting {
    async fn bind(
        &self,
        url: &Url,
        handler: Arc<dyn ExchangeHandler>,
    ) -> Result<ExchangeServer, ExchangeError> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        self.inner.bind(url, handler).await
    }

    async fn connect(
        &self,
        url: &Url,
        handler: Arc<dyn ExchangeHandler>,
    ) -> Result<ExchangeClient, ExchangeError> {
        self.inner.connect(url, handler).await
    }
}

fn counting(binds: &Arc<AtomicUsize>) -> WrapperDescriptor<dyn Exchanger> {
    let binds = Arc::clone(binds);
    WrapperDescriptor::new(move |inner: Arc<dyn Exchanger>| {
        Arc::new(Counting {
            inner,
            binds: Arc::clone(&binds),
        }) as Arc<dyn Exchanger>
    })
}

#[tokio::test]
async fn test_default_exchanger_is_singleton() {
    let registry = switchyard::default_registry().expect("registry");
    let by_default = registry.resolve_default::<dyn Exchanger>().expect("default");
    let by_name = registry
        .resolve::<dyn Exchanger>(StandardExchanger::NAME)
        .expect("named");
    assert!(Arc::ptr_eq(&by_default, &by_name));
    assert_eq!(
        registry.loaded_extensions::<dyn Exchanger>(),
        vec![StandardExchanger::NAME.to_string()]
    );
}

#[tokio::test]
async fn test_wrapper_decorates_adaptive_calls() {
    let registry = switchyard::default_registry().expect("registry");
    let binds = Arc::new(AtomicUsize::new(0));
    registry.register_wrapper(counting(&binds));

    let exchanger = AdaptiveExchanger::new(Arc::clone(&registry));
    let url = Url::new("exchange", "wrapped", 1);
    let _server = exchanger.bind(&url, Arc::new(Echo)).await.expect("bind");
    let client = exchanger.connect(&url, Arc::new(Echo)).await.expect("connect");

    let response = client
        .request(Bytes::from_static(b"x"), Duration::from_secs(5))
        .expect("request")
        .await;
    assert_eq!(response.status, Status::Ok);
    assert_eq!(binds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_wrapper_predicate_skips_excluded_names() {
    let registry = switchyard::default_registry().expect("registry");
    let network = Arc::new(MemoryNetwork::new());
    let transporter = Arc::new(switchyard::MemoryTransporter::new(network));
    registry
        .register::<dyn Exchanger, _>("direct", move || {
            Arc::new(StandardExchanger::new(transporter.clone())) as Arc<dyn Exchanger>
        })
        .expect("register");

    let binds = Arc::new(AtomicUsize::new(0));
    registry.register_wrapper(
        counting(&binds).with_predicate(WrapperPredicate::all().excluding(["direct"])),
    );

    let exchanger = AdaptiveExchanger::new(Arc::clone(&registry));
    let _standard = exchanger
        .bind(&Url::new("exchange", "p", 1), Arc::new(Echo))
        .await
        .expect("bind standard");
    let _direct = exchanger
        .bind(
            &Url::new("exchange", "p", 2).with_parameter(EXCHANGER_KEY, "direct"),
            Arc::new(Echo),
        )
        .await
        .expect("bind direct");

    assert_eq!(binds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_set_default_changes_unselected_calls() {
    let network = Arc::new(MemoryNetwork::new());
    let registry = Arc::new(ExtensionRegistry::new());
    registry
        .load(&BuiltinExtensions::with_network(&registry, Arc::clone(&network)))
        .expect("builtins");

    let other_network = Arc::new(MemoryNetwork::new());
    let transporter = Arc::new(switchyard::MemoryTransporter::new(Arc::clone(&other_network)));
    registry
        .register::<dyn Exchanger, _>("other", move || {
            Arc::new(StandardExchanger::new(transporter.clone())) as Arc<dyn Exchanger>
        })
        .expect("register");
    registry.set_default::<dyn Exchanger>("other").expect("set default");

    let exchanger = AdaptiveExchanger::new(registry);
    let _server = exchanger
        .bind(&Url::new("exchange", "d", 1), Arc::new(Echo))
        .await
        .expect("bind");

    assert!(network.bound_addresses().is_empty());
    assert_eq!(other_network.bound_addresses(), vec!["d:1".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_resolution() {
    let registry = Arc::new(ExtensionRegistry::new());
    let built = Arc::new(AtomicUsize::new(0));
    let network = Arc::new(MemoryNetwork::new());
    {
        let built = Arc::clone(&built);
        registry
            .register::<dyn Exchanger, _>("standard", move || {
                built.fetch_add(1, Ordering::SeqCst);
                let transporter = Arc::new(switchyard::MemoryTransporter::new(Arc::clone(&network)));
                Arc::new(StandardExchanger::new(transporter)) as Arc<dyn Exchanger>
            })
            .expect("register");
    }

    let tasks = (0..32).map(|_| {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.resolve_default::<dyn Exchanger>().expect("resolve") })
    });
    let resolved: Vec<Arc<dyn Exchanger>> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task"))
        .collect();

    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert!(resolved.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[test]
fn test_strict_registry_rejects_builtin_override() {
    let registry =
        switchyard::default_registry_with_config(RegistryConfig::strict()).expect("registry");
    assert_eq!(registry.config().duplicate_policy, DuplicatePolicy::Reject);

    let err = registry
        .load(&BuiltinExtensions::new(&registry))
        .err()
        .expect("duplicate");
    assert!(matches!(err, ExtensionError::DuplicateName { .. }));
}
