//! Pooled object storage with stable addresses
//!
//! A [Hive] stores objects of one class in a growing list of pages. Objects
//! never move once constructed, freed slots are reused, and each object has a
//! control block holding its strong/weak reference counts and the generation
//! of its slot.
//!
//! Removing an object that somebody still holds a strong reference to turns it
//! into a zombie: it disappears from iteration but still counts towards
//! [RawHive::size], and stays alive until the last [ObjRef] goes away
//! (possibly on another thread).
//! [WeakRef]s never resurrect an object, nor see whatever reuses its slot.
//!
//! A [HiveRegistry] maps class ids to lazily created hives.

pub mod class;
pub mod config;
pub mod control;
pub mod error;
pub mod handle;
pub mod hive;
mod loom_testing;
pub mod page;
pub mod registry;
pub mod util;

pub use class::{ClassInfo, ClassUid, DefaultFactory, FnFactory, ObjectFactory, Pooled};
pub use config::HiveConfig;
pub use error::{HiveError, Result};
pub use handle::{ObjRef, Opaque, WeakRef};
pub use hive::{Hive, RawHive, SlotId};
pub use page::{PageOwnership, SlotLayout, SlotState};
pub use registry::HiveRegistry;
