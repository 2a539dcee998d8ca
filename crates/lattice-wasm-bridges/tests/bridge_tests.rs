//! Integration tests driving every bridge against real guest modules
//! assembled from WAT.

use std::sync::Arc;

use parking_lot::Mutex;

use lattice_wasm_bridges::model::{
    Invocation, InstancesChangedListener, Invoker, NotifyListener, ServiceInstance, Url,
};
use lattice_wasm_bridges::{
    WasmChannel, WasmDynamicConfiguration, WasmFilter, WasmLoadBalance, WasmProtocol,
    WasmRegistry, WasmRouter, WasmServiceDiscovery,
};
use lattice_wasm_runtime::{WasmError, WasmLoader, WasmResult};

fn load(name: &str, wat: &str) -> WasmResult<WasmLoader> {
    let bytes = wat::parse_str(wat).map_err(|e| WasmError::InvalidArgument(e.to_string()))?;
    WasmLoader::from_bytes(name, bytes)
}

fn candidates() -> Vec<Invoker> {
    vec![
        Invoker::new("prov-a", Url::new("10.0.0.1:20880/demo")),
        Invoker::new("prov-b", Url::new("10.0.0.2:20880/demo")),
    ]
}

fn consumer_url() -> Url {
    Url::new("consumer://10.0.0.9/demo").with_parameter("tag", "canary")
}

#[test]
fn test_load_balance_selects_by_returned_index() -> WasmResult<()> {
    // The guest always signals index 1: the second invoker wins.
    const WAT: &str = r#"
    (module
      (memory (export "memory") 1)
      (func (export "doSelect") (param i64) (result i32)
        i32.const 1))
    "#;
    let balancer = WasmLoadBalance::new(load("SecondPicker", WAT)?);

    let invokers = candidates();
    let picked = balancer.select(&invokers, &consumer_url(), &Invocation::new("demo", "greet"))?;
    assert_eq!(picked.id, "prov-b");
    Ok(())
}

#[test]
fn test_load_balance_out_of_range_index_is_invalid() -> WasmResult<()> {
    const WAT: &str = r#"
    (module
      (memory (export "memory") 1)
      (func (export "doSelect") (param i64) (result i32)
        i32.const 9))
    "#;
    let balancer = WasmLoadBalance::new(load("WildPicker", WAT)?);

    let invokers = candidates();
    match balancer.select(&invokers, &consumer_url(), &Invocation::new("demo", "greet")) {
        Err(WasmError::InvalidGuestResult { module, .. }) => {
            assert_eq!(module, "WildPicker.wasm");
            Ok(())
        }
        other => panic!("expected InvalidGuestResult, got {:?}", other.map(|i| i.id.clone())),
    }
}

#[test]
fn test_load_balance_rejects_empty_candidates() -> WasmResult<()> {
    const WAT: &str = r#"
    (module
      (memory (export "memory") 1)
      (func (export "doSelect") (param i64) (result i32)
        i32.const 0))
    "#;
    let balancer = WasmLoadBalance::new(load("Picker", WAT)?);

    match balancer.select(&[], &consumer_url(), &Invocation::new("demo", "greet")) {
        Err(WasmError::InvalidArgument(_)) => Ok(()),
        other => panic!("expected InvalidArgument, got {:?}", other.map(|i| i.id.clone())),
    }
}

#[test]
fn test_router_missing_route_export_is_fatal() -> WasmResult<()> {
    const WAT: &str = r#"
    (module
      (memory (export "memory") 1)
      (func (export "notify") (param i64)))
    "#;
    let router = WasmRouter::new(load("NoRoute", WAT)?);

    let invokers = candidates();
    match router.route(&invokers, &consumer_url(), &Invocation::new("demo", "greet")) {
        Err(WasmError::MissingExport { function, module }) => {
            assert_eq!(function, "route");
            assert_eq!(module, "NoRoute.wasm");
            Ok(())
        }
        other => panic!("expected MissingExport, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_router_filters_by_index_list() -> WasmResult<()> {
    // The guest answers "1,0": both candidates survive, reordered.
    const WAT: &str = r#"
    (module
      (import "lattice" "put_result" (func $put (param i64 i64 i32) (result i32)))
      (memory (export "memory") 1)
      (data (i32.const 0) "1,0")
      (func (export "route") (param $h i64)
        local.get $h
        i64.const 0
        i32.const 3
        call $put
        drop))
    "#;
    let router = WasmRouter::new(load("Reverser", WAT)?);

    let invokers = candidates();
    let result = router.route(&invokers, &consumer_url(), &Invocation::new("demo", "greet"))?;
    let ids: Vec<&str> = result.invokers.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["prov-b", "prov-a"]);
    Ok(())
}

#[test]
fn test_router_without_answer_keeps_candidates() -> WasmResult<()> {
    const WAT: &str = r#"
    (module
      (memory (export "memory") 1)
      (func (export "route") (param i64)))
    "#;
    let router = WasmRouter::new(load("PassThrough", WAT)?);

    let invokers = candidates();
    let result = router.route(&invokers, &consumer_url(), &Invocation::new("demo", "greet"))?;
    assert_eq!(result.invokers, invokers);

    // notify and stop are optional hooks; their absence is a no-op.
    router.notify(&invokers)?;
    router.stop()?;
    Ok(())
}

struct RecordingNotify {
    urls: Mutex<Vec<Url>>,
}

impl NotifyListener for RecordingNotify {
    fn notify(&self, urls: Vec<Url>) {
        *self.urls.lock() = urls;
    }
}

#[test]
fn test_registry_contract_roundtrip() -> WasmResult<()> {
    const WAT: &str = r#"
    (module
      (import "lattice" "put_result" (func $put (param i64 i64 i32) (result i32)))
      (memory (export "memory") 1)
      (data (i32.const 0) "registered")
      (data (i32.const 16) "unregistered")
      (data (i32.const 32) "10.0.0.1:20880,10.0.0.2:20880")
      (func (export "doRegister") (param $h i64)
        local.get $h i64.const 0 i32.const 10 call $put drop)
      (func (export "doUnregister") (param $h i64)
        local.get $h i64.const 16 i32.const 12 call $put drop)
      (func (export "doSubscribe") (param $h i64)
        local.get $h i64.const 32 i32.const 29 call $put drop)
      (func (export "doUnsubscribe") (param i64))
      (func (export "isAvailable") (result i32)
        i32.const 1))
    "#;
    let registry = WasmRegistry::new(load("KvRegistry", WAT)?);

    let url = Url::new("10.0.0.1:20880/demo");
    assert_eq!(registry.register(&url)?.as_deref(), Some("registered"));
    assert_eq!(registry.unregister(&url)?.as_deref(), Some("unregistered"));
    assert!(registry.is_available()?);

    let listener = RecordingNotify {
        urls: Mutex::new(Vec::new()),
    };
    registry.subscribe(&consumer_url(), &listener)?;
    let urls = listener.urls.lock();
    assert_eq!(urls.len(), 2);
    assert_eq!(urls[0].address, "10.0.0.1:20880");
    assert_eq!(urls[1].address, "10.0.0.2:20880");

    assert_eq!(registry.unsubscribe(&consumer_url())?, None);
    Ok(())
}

struct RecordingInstances {
    events: Mutex<Vec<(String, usize)>>,
}

impl InstancesChangedListener for RecordingInstances {
    fn on_changed(&self, service_name: &str, instances: Vec<ServiceInstance>) {
        self.events
            .lock()
            .push((service_name.to_string(), instances.len()));
    }
}

#[test]
fn test_service_discovery_counted_lists() -> WasmResult<()> {
    const WAT: &str = r#"
    (module
      (import "lattice" "put_result" (func $put (param i64 i64 i32) (result i32)))
      (memory (export "memory") 1)
      (data (i32.const 0) "alpha")
      (data (i32.const 8) "beta")
      (data (i32.const 64)
        "{\"service_name\":\"alpha\",\"host\":\"10.0.0.1\",\"port\":8080}")
      (func (export "doRegister") (param i64))
      (func (export "doUnregister") (param i64))
      (func (export "doDestroy"))
      (func (export "getServices") (param $h i64) (result i32)
        local.get $h i64.const 0 i32.const 5 call $put drop
        local.get $h i64.const 8 i32.const 4 call $put drop
        i32.const 2)
      (func (export "getInstances") (param $h i64) (result i32)
        local.get $h i64.const 64 i32.const 54 call $put drop
        i32.const 1))
    "#;
    let discovery = WasmServiceDiscovery::new(load("Discovery", WAT)?);

    discovery.register(&ServiceInstance::new("alpha", "10.0.0.1", 8080))?;

    assert_eq!(discovery.services()?, ["alpha", "beta"]);

    let instances = discovery.instances("alpha")?;
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].service_name, "alpha");
    assert_eq!(instances[0].host, "10.0.0.1");
    assert_eq!(instances[0].port, 8080);

    // The listener hooks are optional in the guest; the host-side listener
    // works either way.
    let listener = Arc::new(RecordingInstances {
        events: Mutex::new(Vec::new()),
    });
    let watcher: Arc<dyn InstancesChangedListener> = listener.clone();
    discovery.add_listener("alpha", watcher)?;
    discovery.dispatch_changed("alpha", instances);
    assert_eq!(*listener.events.lock(), vec![("alpha".to_string(), 1)]);
    discovery.remove_listener("alpha")?;

    discovery.destroy()?;
    assert!(discovery.loader().is_closed());
    Ok(())
}

#[test]
fn test_service_discovery_count_mismatch_is_invalid() -> WasmResult<()> {
    // The guest claims three services but pushes only one.
    const WAT: &str = r#"
    (module
      (import "lattice" "put_result" (func $put (param i64 i64 i32) (result i32)))
      (memory (export "memory") 1)
      (data (i32.const 0) "alpha")
      (func (export "getServices") (param $h i64) (result i32)
        local.get $h i64.const 0 i32.const 5 call $put drop
        i32.const 3))
    "#;
    let discovery = WasmServiceDiscovery::new(load("Liar", WAT)?);

    match discovery.services() {
        Err(WasmError::InvalidGuestResult { module, .. }) => {
            assert_eq!(module, "Liar.wasm");
            Ok(())
        }
        other => panic!("expected InvalidGuestResult, got {other:?}"),
    }
}

#[test]
fn test_filter_sees_encoded_invocation() -> WasmResult<()> {
    // The guest echoes its argument payload back as the result value.
    const WAT: &str = r#"
    (module
      (import "lattice" "get_args" (func $get (param i64 i64 i32) (result i32)))
      (import "lattice" "put_result" (func $put (param i64 i64 i32) (result i32)))
      (memory (export "memory") 1)
      (func (export "invoke") (param $h i64)
        (local $n i32)
        local.get $h
        i64.const 0
        i32.const 4096
        call $get
        local.set $n
        local.get $h
        i64.const 0
        local.get $n
        call $put
        drop))
    "#;
    let filter = WasmFilter::new(load("EchoFilter", WAT)?);

    let invoker = Invoker::new("prov-a", Url::new("10.0.0.1:20880/demo"));
    let invocation = Invocation::new("demo.Greeter", "greet").with_attachment("trace", "t-1");
    let result = filter.invoke(&invoker, &invocation)?;

    let value = result.value.unwrap_or_default();
    assert!(value.contains("\"service\":\"demo.Greeter\""));
    assert!(value.contains("\"id\":\"prov-a\""));
    assert!(value.contains("\"trace\":\"t-1\""));
    Ok(())
}

#[test]
fn test_protocol_refer_export_invoke() -> WasmResult<()> {
    const WAT: &str = r#"
    (module
      (import "lattice" "put_result" (func $put (param i64 i64 i32) (result i32)))
      (memory (export "memory") 1)
      (data (i32.const 0) "referred")
      (data (i32.const 16) "exported")
      (data (i32.const 32) "pong")
      (func (export "refer") (param $h i64)
        local.get $h i64.const 0 i32.const 8 call $put drop)
      (func (export "export") (param $h i64)
        local.get $h i64.const 16 i32.const 8 call $put drop)
      (func (export "doInvoke") (param $h i64)
        local.get $h i64.const 32 i32.const 4 call $put drop)
      (func (export "afterUnExport")))
    "#;
    let protocol = WasmProtocol::new(load("PingProtocol", WAT)?);

    let invoker = protocol.refer(&Url::new("10.0.0.1:20880/demo"))?;
    assert_eq!(invoker.ack(), Some("referred"));

    let result = invoker.invoke(&Invocation::new("demo.Greeter", "ping"))?;
    assert_eq!(result.value.as_deref(), Some("pong"));

    let exporter = protocol.export(&Invoker::new("prov-a", Url::new("10.0.0.1:20880/demo")))?;
    assert_eq!(exporter.ack(), Some("exported"));
    exporter.unexport();

    // destroy / destroyAll are absent in this guest; teardown still closes.
    invoker.destroy();
    protocol.destroy();
    assert!(protocol.loader().is_closed());
    Ok(())
}

#[test]
fn test_channel_addresses_and_attributes() -> WasmResult<()> {
    const WAT: &str = r#"
    (module
      (import "lattice" "put_result" (func $put (param i64 i64 i32) (result i32)))
      (import "lattice" "setRemoteAddressHost" (func $remote (param i64 i64 i32) (result i32)))
      (import "lattice" "setLocalAddressHost" (func $local (param i64 i64 i32) (result i32)))
      (memory (export "memory") 1)
      (data (i32.const 0) "10.0.0.8")
      (data (i32.const 16) "127.0.0.1")
      (data (i32.const 32) "v1")
      (func (export "send") (param i64))
      (func (export "isConnected") (result i32)
        i32.const 1)
      (func (export "getRemoteAddressHost") (param $h i64)
        local.get $h i64.const 0 i32.const 8 call $remote drop)
      (func (export "getRemoteAddressPort") (param i64) (result i32)
        i32.const 20880)
      (func (export "getLocalAddressHost") (param $h i64)
        local.get $h i64.const 16 i32.const 9 call $local drop)
      (func (export "getLocalAddressPort") (param i64) (result i32)
        i32.const 30880)
      (func (export "hasAttribute") (param i64) (result i32)
        i32.const 1)
      (func (export "getAttribute") (param $h i64)
        local.get $h i64.const 32 i32.const 2 call $put drop))
    "#;
    let bytes = wat::parse_str(WAT).map_err(|e| WasmError::InvalidArgument(e.to_string()))?;
    let channel = WasmChannel::from_bytes("LoopChannel", bytes)?;

    channel.send(b"hello")?;
    assert!(channel.is_connected()?);

    assert_eq!(channel.remote_address_host()?.as_deref(), Some("10.0.0.8"));
    assert_eq!(channel.remote_address_port()?, 20880);
    assert_eq!(channel.local_address_host()?.as_deref(), Some("127.0.0.1"));
    assert_eq!(channel.local_address_port()?, 30880);

    assert_eq!(channel.has_attribute("k")?, Some(true));
    assert_eq!(channel.attribute("k")?.as_deref(), Some("v1"));
    channel.set_attribute("k", "v2")?;
    channel.remove_attribute("k")?;

    channel.close();
    assert!(channel.loader().is_closed());
    Ok(())
}

#[test]
fn test_dynamic_configuration_contract() -> WasmResult<()> {
    const WAT: &str = r#"
    (module
      (import "lattice" "put_result" (func $put (param i64 i64 i32) (result i32)))
      (memory (export "memory") 1)
      (data (i32.const 0) "timeout=30")
      (func (export "doGetConfig") (param $h i64)
        local.get $h i64.const 0 i32.const 10 call $put drop)
      (func (export "doPublishConfig") (param i64) (result i32)
        i32.const 1)
      (func (export "doRemoveConfig") (param i64) (result i32)
        i32.const 0))
    "#;
    let config = WasmDynamicConfiguration::new(load("ConfigCenter", WAT)?);

    assert_eq!(config.config("timeout", "demo")?.as_deref(), Some("timeout=30"));
    assert!(config.publish_config("timeout", "demo", "30")?);
    assert!(!config.remove_config("timeout", "demo")?);

    // getInternalProperty and doClose are absent: optional, so no-ops.
    assert_eq!(config.internal_property("cache.dir")?, None);
    config.close();
    assert!(config.loader().is_closed());
    Ok(())
}
