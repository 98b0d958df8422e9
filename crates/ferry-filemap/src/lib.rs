//! # ferry-filemap
//!
//! A live index of the files under a set of watched roots.
//!
//! On `start()` the map crawls every root recursively, recording metadata
//! (mtime, size, file kind) for each file that passes the configured filters.
//! After the crawl it attaches a watch backend per root and keeps the index
//! up to date, delivering `touch` / `delete` events to subscribers.
//!
//! Backends implement the minimal [`WatchBackend`] port — `watch(root, sink)`
//! plus `stop()` — and report bare paths; the file map classifies each report
//! by `lstat`ing the path itself. The default backend is built on `notify`.

mod backend;
mod events;
mod file_map;
mod health;

pub use backend::{NotifyBackend, WatchBackend};
pub use events::{FileEvent, FileEventKind, FileKind, FileMetadata, WatcherIncident};
pub use file_map::{FileMap, FileMapConfig, FileMapError, Subscription};
pub use health::{spawn_health_check, HealthCheckConfig};
