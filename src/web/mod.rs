//! In-page entry point (wasm32 only)
//!
//! Wires the platform-independent session to the live page: a mutation
//! observer feeds the watcher, an interval timer drives `update`, and a
//! click listener on the overlay's shadow root handles the collapse toggle.

mod host;
mod logging;
mod storage;
mod surface;

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};

use js_sys::Array;
use tracing::{debug, error, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Event, MutationObserver, MutationObserverInit, Node, ShadowRoot, Window};

use crate::core::document::{MutationKind, MutationOrigin, MutationRecord};
use crate::core::overlay::TOGGLE_ACTION;
use crate::core::session::{DashboardSession, SessionEvent};
use crate::core::{Config, UserscriptManifest};

use self::host::DomHost;
use self::storage::LocalStorageStore;
use self::surface::ShadowSurface;

static STARTED: AtomicBool = AtomicBool::new(false);

struct App {
    session: DashboardSession<ShadowSurface, LocalStorageStore>,
    host: DomHost,
}

thread_local! {
    static APP: RefCell<Option<App>> = const { RefCell::new(None) };
}

fn now_ms() -> u64 {
    js_sys::Date::now() as u64
}

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Run `f` against the app unless it is missing or already borrowed
fn with_app(f: impl FnOnce(&mut App)) {
    APP.with(|app| match app.try_borrow_mut() {
        Ok(mut guard) => {
            if let Some(app) = guard.as_mut() {
                f(app);
            }
        }
        Err(_) => debug!("[SESSION] Re-entrant callback skipped"),
    });
}

fn tick() {
    with_app(|app| {
        let App { session, host } = app;
        for event in session.update(host, now_ms()) {
            log_event(&event);
        }
    });
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::HostIncompatible(e) => error!(error = %e, "[SESSION] Host page incompatible"),
        SessionEvent::ExtractionFailed(e) => warn!(error = %e, "[SESSION] Extraction failed"),
        SessionEvent::RenderFailed(e) => debug!(error = %e, "[SESSION] Render deferred"),
        other => debug!(event = ?other, "[SESSION] Event"),
    }
}

// =============================================================================
// ENTRY POINT
// =============================================================================

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    // Userscript managers may evaluate the script more than once per page
    if STARTED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let config = Config::embedded().map_err(to_js)?;
    logging::init_logging(&config.logging);

    let window = web_sys::window().ok_or_else(|| to_js("no window"))?;
    let document = window.document().ok_or_else(|| to_js("no document"))?;

    let location = window.location().href()?;
    let manifest = UserscriptManifest::current(&config.packaging);
    if !manifest.permits(&location) {
        info!(location = %location, "[SESSION] Page not matched, staying idle");
        return Ok(());
    }

    let surface = ShadowSurface::new(document.clone()).map_err(to_js)?;
    let overlay_host = surface.host().clone();
    let shadow = surface.shadow_root().clone();

    let session = DashboardSession::new(&config, surface, LocalStorageStore).map_err(to_js)?;
    let host = DomHost::new(window.clone(), document.clone(), &config);
    APP.with(|app| *app.borrow_mut() = Some(App { session, host }));

    observe_mutations(&document, overlay_host)?;
    listen_for_toggle(&shadow)?;
    start_ticker(&window, config.watcher.tick_ms)?;

    info!(
        version = %manifest.version,
        location = %location,
        "[SESSION] Alliance dashboard started"
    );
    tick();
    Ok(())
}

// =============================================================================
// WIRING
// =============================================================================

fn mutation_kind(record: &web_sys::MutationRecord) -> MutationKind {
    match record.type_().as_str() {
        "attributes" => MutationKind::Attributes,
        "characterData" => MutationKind::CharacterData,
        _ => MutationKind::ChildList,
    }
}

/// Records inside the overlay, or that only add/remove the overlay host
/// itself, are our own writes. Host records are those inside the current
/// container or inserting a subtree that holds it; everything else is
/// unrelated page churn.
fn mutation_origin(
    record: &web_sys::MutationRecord,
    overlay: &Element,
    container: Option<&Node>,
) -> MutationOrigin {
    let overlay_node: &Node = overlay.as_ref();
    let target = record.target();
    if target
        .as_ref()
        .is_some_and(|target| overlay_node.contains(Some(target)))
    {
        return MutationOrigin::Overlay;
    }

    let added = record.added_nodes();
    let removed = record.removed_nodes();
    let only_overlay_host = added.length() + removed.length() > 0
        && [&added, &removed].iter().all(|list| {
            (0..list.length())
                .filter_map(|i| list.get(i))
                .all(|node| node.is_same_node(Some(overlay_node)))
        });
    if only_overlay_host {
        return MutationOrigin::Overlay;
    }

    let Some(container) = container else {
        return MutationOrigin::Outside;
    };
    if target.is_some_and(|target| container.contains(Some(&target))) {
        return MutationOrigin::Host;
    }
    let inserts_container = (0..added.length())
        .filter_map(|i| added.get(i))
        .any(|node| node.contains(Some(container)));
    if inserts_container {
        MutationOrigin::Host
    } else {
        MutationOrigin::Outside
    }
}

fn observe_mutations(document: &Document, overlay: Element) -> Result<(), JsValue> {
    let callback = Closure::wrap(Box::new(move |records: Array, _observer: MutationObserver| {
        let now = now_ms();
        with_app(|app| {
            // Records arrive after the DOM changed, so this is the current container
            let container: Option<Node> = app.host.container().map(Into::into);
            for record in records.iter() {
                let Ok(record) = record.dyn_into::<web_sys::MutationRecord>() else {
                    continue;
                };
                let kind = mutation_kind(&record);
                let origin = mutation_origin(&record, &overlay, container.as_ref());
                app.session.record_mutation(MutationRecord { kind, origin }, now);
            }
        });
    }) as Box<dyn FnMut(Array, MutationObserver)>);

    let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
    let init = MutationObserverInit::new();
    init.set_child_list(true);
    init.set_subtree(true);
    init.set_attributes(true);
    init.set_character_data(true);
    // Observe the document node so a replaced container is still seen;
    // records are filtered down to the container in the callback
    observer.observe_with_options(document, &init)?;
    callback.forget();
    Ok(())
}

fn listen_for_toggle(shadow: &ShadowRoot) -> Result<(), JsValue> {
    let callback = Closure::wrap(Box::new(move |event: Event| {
        let action = event
            .target()
            .and_then(|t| t.dyn_into::<Element>().ok())
            .and_then(|el| el.closest("[data-action]").ok().flatten())
            .and_then(|el| el.get_attribute("data-action"));
        if action.as_deref() != Some(TOGGLE_ACTION) {
            return;
        }
        with_app(|app| {
            let collapsed = app.session.toggle_collapsed();
            debug!(collapsed, "[PREFS] Toggled overlay");
            let App { session, host } = app;
            for event in session.update(host, now_ms()) {
                log_event(&event);
            }
        });
    }) as Box<dyn FnMut(Event)>);

    shadow.add_event_listener_with_callback("click", callback.as_ref().unchecked_ref())?;
    callback.forget();
    Ok(())
}

fn start_ticker(window: &Window, tick_ms: u64) -> Result<(), JsValue> {
    let callback = Closure::wrap(Box::new(tick) as Box<dyn FnMut()>);
    window.set_interval_with_callback_and_timeout_and_arguments_0(
        callback.as_ref().unchecked_ref(),
        tick_ms.clamp(16, 60_000) as i32,
    )?;
    callback.forget();
    Ok(())
}
