//! An embeddable, memory-mapped key-value storage library with pluggable
//! storage engines and crash-consistent writes.
//!
//! # Engines
//!
//! A [`Config`](config::Config) selects and parameterizes one of the
//! engines registered in [`registry`], by default an ordered B+-tree
//! (`"btree"`, see [`btree`]) and an unordered concurrent hash map
//! (`"cmap"`, see [`cmap`]). Both implement the single [`Engine`] trait;
//! callers that don't need ordered range queries can treat every engine
//! uniformly, while callers that do can check
//! [`Engine::is_ordered`](engine::Engine::is_ordered) and call the
//! `count_*`/`get_*` range methods.
//!
//! ```no_run
//! use pmemkv_rs::config::{keys, Config};
//! use pmemkv_rs::registry;
//!
//! let mut config = Config::new();
//! config.set_string(keys::PATH, "/tmp/example.pool");
//! config.set_uint64(keys::SIZE, 64 << 20);
//! config.set_uint64(keys::FORCE_CREATE, 1);
//!
//! let engine = registry::open("btree", config).expect("open engine");
//! engine.put(b"key", b"value").expect("put");
//! engine.get(b"key", &mut |value| {
//!     assert_eq!(value, b"value");
//! }).expect("get");
//! ```
//!
//! # Layering
//!
//! * [`alloc`]: the memory-mapped persistent memory region (PMR) and its
//!   transactional free-list allocator.
//! * [`stm`]: the thread-local transaction runtime (snapshot/commit/abort)
//!   every mutating engine operation runs inside.
//! * [`engine`]: the uniform storage trait engines implement.
//! * [`iterator`]: the read/write cursor protocol engines expose.
//! * [`config`]: the typed option bag used to construct an engine.
//! * [`error`]: the public [`Status`](error::Status) taxonomy and the
//!   richer internal error type engines work with.
//! * [`registry`]: the name-to-constructor factory embedders open engines
//!   through, and can extend with engines of their own.

pub mod alloc;
pub mod btree;
pub mod cmap;
pub mod config;
pub mod engine;
pub mod error;
pub mod iterator;
pub mod registry;
pub mod stm;

pub use config::Config;
pub use engine::Engine;
pub use error::{EngineError, Status};
