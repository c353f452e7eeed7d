//! Core module - platform-independent engine
//!
//! Everything here runs on any target and is unit-tested natively. The
//! browser-specific glue lives in `web`.

pub mod backoff;
pub mod color;
pub mod config;
pub mod document;
pub mod error;
pub mod extractor;
pub mod fields;
pub mod format;
pub mod io_traits;
pub mod locator;
pub mod manifest;
pub mod overlay;
pub mod persistence;
pub mod renderer;
pub mod replay;
pub mod session;
pub mod status_template;
pub mod store;
pub mod types;
pub mod view;
pub mod watcher;

pub use config::Config;
pub use document::{HostDocument, HostNode, MutationKind, MutationOrigin, MutationRecord};
pub use error::{ConfigError, ExtractionError, ExtractionFailure, RenderError, WatcherError};
pub use extractor::Extractor;
pub use io_traits::HostPage;
pub use manifest::UserscriptManifest;
pub use persistence::{KeyValueStore, MemoryStore, OverlayPrefs};
pub use renderer::{MemorySurface, OverlaySurface, Patch, Renderer};
pub use session::{DashboardSession, ExtractionTicket, ExtractionTrigger, SessionEvent};
pub use store::{PublishOutcome, StateStore, Subscription};
pub use types::{FieldValue, Member, Snapshot};
pub use view::OverlayViewModel;
