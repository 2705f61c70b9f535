mod common;

use common::{CountingStorage, advance_ms};
use persist_store::{
    DisposeBag, MemoryStorage, PersistConfig, ServiceOptions, StorageAdapter, StoreError,
    StoreServiceBase,
};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreferenceStore {
    current_account: Option<String>,
    locale: String,
    pin_addresses: Vec<String>,
}

fn template() -> PreferenceStore {
    PreferenceStore {
        current_account: None,
        locale: "en".into(),
        pin_addresses: Vec::new(),
    }
}

fn make_service() -> StoreServiceBase<PreferenceStore> {
    StoreServiceBase::new("preference", &template(), ServiceOptions::default()).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test(start_paused = true)]
async fn typed_template_becomes_store_shape() {
    let service = make_service();

    assert_eq!(service.name(), "preference");
    assert_eq!(
        Value::Object(service.store().snapshot()),
        json!({"currentAccount": null, "locale": "en", "pinAddresses": []})
    );
    assert_eq!(service.state().unwrap(), template());
}

#[tokio::test(start_paused = true)]
async fn state_reflects_store_writes() {
    let service = make_service();
    service.store().set("locale", json!("zh-CN"));
    service.store().set_in("pinAddresses", "/-", json!("0xabc"));

    let state = service.state().unwrap();
    assert_eq!(state.locale, "zh-CN");
    assert_eq!(state.pin_addresses, vec!["0xabc".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn state_errors_when_record_no_longer_fits_type() {
    let service = make_service();
    service.store().set("locale", json!(42));
    assert!(matches!(service.state(), Err(StoreError::Serialization(_))));
}

#[tokio::test(start_paused = true)]
async fn non_object_template_is_rejected() {
    let err = StoreServiceBase::<Vec<u8>>::new("bytes", &vec![1, 2], ServiceOptions::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTemplate { found: "array", .. }));
}

#[tokio::test(start_paused = true)]
async fn service_persists_through_given_storage() {
    let storage = Arc::new(MemoryStorage::new());
    let service = StoreServiceBase::new(
        "preference",
        &template(),
        ServiceOptions {
            config: PersistConfig {
                persist_debounce_ms: 200,
                ..Default::default()
            },
            storage: Some(storage.clone()),
        },
    )
    .unwrap();

    service.store().set("currentAccount", json!("0x1"));
    advance_ms(210).await;

    let persisted = storage.get_item("preference").unwrap().unwrap();
    assert_eq!(persisted["currentAccount"], json!("0x1"));
}

#[tokio::test(start_paused = true)]
async fn service_restores_from_storage() {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .set_item("preference", json!({"locale": "fr", "pinAddresses": ["0x9"]}))
        .unwrap();

    let service: StoreServiceBase<PreferenceStore> =
        StoreServiceBase::new("preference", &template(), ServiceOptions::with_storage(storage))
            .unwrap();

    assert_eq!(
        service.state().unwrap(),
        PreferenceStore {
            current_account: None,
            locale: "fr".into(),
            pin_addresses: vec!["0x9".into()],
        }
    );
}

// ── Hook ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn hook_sees_sets_and_deletes() {
    let service = make_service();
    let calls: Arc<Mutex<Vec<(String, Option<Value>)>>> = Arc::default();
    let recorded = calls.clone();
    let mut bag = DisposeBag::new();

    service.set_before_set_kv(
        move |key, value| {
            recorded.lock().unwrap().push((key.to_string(), value.cloned()));
            Ok(())
        },
        &mut bag,
    );
    assert!(service.has_before_set_kv());
    assert_eq!(bag.len(), 1);

    service.store().set("locale", json!("de"));
    service.store().delete("currentAccount");

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            ("locale".to_string(), Some(json!("de"))),
            ("currentAccount".to_string(), None),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn hook_runs_before_commit() {
    let service = make_service();
    let store = service.store().clone();
    let observed: Arc<Mutex<Option<Value>>> = Arc::default();
    let slot = observed.clone();
    let mut bag = DisposeBag::new();

    service.set_before_set_kv(
        move |key, _value| {
            *slot.lock().unwrap() = store.get(key);
            Ok(())
        },
        &mut bag,
    );

    service.store().set("locale", json!("es"));
    assert_eq!(*observed.lock().unwrap(), Some(json!("en")));
    assert_eq!(service.store().get("locale"), Some(json!("es")));
}

#[tokio::test(start_paused = true)]
async fn last_installed_hook_wins() {
    let service = make_service();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let mut bag = DisposeBag::new();

    let counter = first.clone();
    service.set_before_set_kv(
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        &mut bag,
    );
    let counter = second.clone();
    service.set_before_set_kv(
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        &mut bag,
    );

    service.store().set("locale", json!("it"));
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(bag.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn disposer_clears_hook() {
    let service = make_service();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let mut bag = DisposeBag::new();

    service.set_before_set_kv(
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        &mut bag,
    );
    bag.dispose_all();

    assert!(bag.is_empty());
    assert!(!service.has_before_set_kv());
    service.store().set("locale", json!("pt"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn stale_disposer_leaves_newer_hook_installed() {
    let service = make_service();
    let hits = Arc::new(AtomicUsize::new(0));
    let mut old_bag = DisposeBag::new();
    let mut new_bag = DisposeBag::new();

    service.set_before_set_kv(|_, _| Ok(()), &mut old_bag);
    let counter = hits.clone();
    service.set_before_set_kv(
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        &mut new_bag,
    );

    old_bag.dispose_all();
    assert!(service.has_before_set_kv());
    service.store().set("locale", json!("nl"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    new_bag.dispose_all();
    assert!(!service.has_before_set_kv());
}

#[tokio::test(start_paused = true)]
async fn clear_before_set_kv_removes_hook() {
    let service = make_service();
    let mut bag = DisposeBag::new();
    service.set_before_set_kv(|_, _| Ok(()), &mut bag);

    service.clear_before_set_kv();
    assert!(!service.has_before_set_kv());
}

#[tokio::test(start_paused = true)]
async fn failing_hook_does_not_block_mutation() {
    init_tracing();
    let storage = CountingStorage::new();
    let service = StoreServiceBase::new(
        "preference",
        &template(),
        ServiceOptions {
            config: PersistConfig {
                persist_debounce_ms: 100,
                ..Default::default()
            },
            storage: Some(storage.clone()),
        },
    )
    .unwrap();
    let mut bag = DisposeBag::new();
    service.set_before_set_kv(|key, _| anyhow::bail!("rejected {key}"), &mut bag);

    service.store().set("locale", json!("sv"));
    assert_eq!(service.store().get("locale"), Some(json!("sv")));

    advance_ms(110).await;
    assert_eq!(storage.last_write().unwrap().1["locale"], json!("sv"));
}

#[tokio::test(start_paused = true)]
async fn panicking_hook_does_not_block_mutation() {
    init_tracing();
    let service = make_service();
    let mut bag = DisposeBag::new();
    service.set_before_set_kv(|_, _| panic!("hook exploded"), &mut bag);

    service.store().set("locale", json!("fi"));
    service.store().delete("currentAccount");

    assert_eq!(service.store().get("locale"), Some(json!("fi")));
    assert!(!service.store().contains_key("currentAccount"));
    assert!(service.has_before_set_kv());
}

#[tokio::test(start_paused = true)]
async fn on_before_set_kv_without_hook_is_noop() {
    let service = make_service();
    service.on_before_set_kv("locale", Some(&json!("xx")));
    service.on_before_set_kv("locale", None);
    assert_eq!(service.store().get("locale"), Some(json!("en")));
}

#[tokio::test(start_paused = true)]
async fn hook_may_replace_itself() {
    let service = Arc::new(make_service());
    let mut bag = DisposeBag::new();
    let weak = Arc::downgrade(&service);

    service.set_before_set_kv(
        move |_, _| {
            if let Some(service) = weak.upgrade() {
                service.clear_before_set_kv();
            }
            Ok(())
        },
        &mut bag,
    );

    service.store().set("locale", json!("ko"));
    assert!(!service.has_before_set_kv());
}
