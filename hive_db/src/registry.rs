//! Mapping from class ids to hives
//!
//! A registry knows a factory for every class that has been registered with it,
//! and creates the hive for a class the first time somebody asks for it.
//! There is no global registry; whoever needs one owns one.

use std::{any::TypeId, cell::RefCell, fmt::Debug, sync::Arc};

use rustc_hash::FxHashMap;
use tracing::Level;

use crate::{
    class::{ClassUid, DefaultFactory, ObjectFactory, Pooled},
    config::HiveConfig,
    error::{HiveError, Result},
    hive::{Hive, RawHive},
};

pub struct HiveRegistry {
    /// Used for every hive the registry creates
    config: HiveConfig,
    factories: RefCell<FxHashMap<ClassUid, Arc<dyn ObjectFactory>>>,
    /// Boxed so that references into hives survive the map growing.
    /// Entries are never removed.
    pools: RefCell<FxHashMap<ClassUid, Box<RawHive>>>,
}

impl Debug for HiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut classes = self.class_uids();
        classes.sort();
        f.debug_struct("HiveRegistry")
            .field("config", &self.config)
            .field("classes", &classes)
            .field("pools", &self.pools.borrow().len())
            .finish()
    }
}

impl Default for HiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HiveRegistry {
    pub fn new() -> Self {
        Self::with_config(HiveConfig::default())
    }

    pub fn with_config(config: HiveConfig) -> Self {
        Self {
            config,
            factories: RefCell::new(FxHashMap::default()),
            pools: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    /// Register the factory for a class
    ///
    /// Registering the same factory (or another factory for the same Rust type)
    /// again does nothing.
    pub fn register_factory(&self, factory: Arc<dyn ObjectFactory>) -> Result<()> {
        let uid = factory.class_info().uid;
        let mut factories = self.factories.borrow_mut();
        if let Some(existing) = factories.get(&uid) {
            let same_type = existing.instance_type().is_some()
                && existing.instance_type() == factory.instance_type();
            if Arc::ptr_eq(existing, &factory) || same_type {
                return Ok(());
            }
            return Err(HiveError::DuplicateClass(uid));
        }
        tracing::event!(
            Level::DEBUG,
            uid = %uid,
            class = factory.class_info().name,
            "registered class"
        );
        factories.insert(uid, factory);
        Ok(())
    }

    /// Register `T`, constructed with [Default::default]
    pub fn register<T: Pooled + Default>(&self) -> Result<()> {
        self.register_factory(Arc::new(DefaultFactory::<T>::new()))
    }

    pub fn is_registered(&self, uid: ClassUid) -> bool {
        self.factories.borrow().contains_key(&uid)
    }

    /// Every registered class, in no particular order
    pub fn class_uids(&self) -> Vec<ClassUid> {
        self.factories.borrow().keys().copied().collect()
    }

    /// Number of hives created so far
    pub fn len(&self) -> usize {
        self.pools.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The hive for `uid`, creating it if needed
    pub fn get_pool(&self, uid: ClassUid) -> Result<&RawHive> {
        if let Some(pool) = self.pools.borrow().get(&uid) {
            let pool: *const RawHive = &**pool;
            // safety: hives are boxed and never removed or replaced
            // (except through &mut self, which can't happen while this borrow lives)
            return Ok(unsafe { &*pool });
        }

        let factory = self
            .factories
            .borrow()
            .get(&uid)
            .cloned()
            .ok_or(HiveError::UnknownClass(uid))?;
        let pool = Box::new(RawHive::with_config(factory, self.config.clone()));
        let pool_ptr: *const RawHive = &*pool;
        self.pools.borrow_mut().insert(uid, pool);
        tracing::event!(Level::DEBUG, uid = %uid, "created hive");
        // safety: as above
        Ok(unsafe { &*pool_ptr })
    }

    fn ensure_registered<T: Pooled + Default>(&self) -> Result<()> {
        if self.is_registered(T::CLASS_UID) {
            // whatever is there gets type checked by the caller
            Ok(())
        } else {
            self.register::<T>()
        }
    }

    /// The hive of `T`s, registering `T` if needed
    ///
    /// Fails if the class id of `T` belongs to some other type.
    pub fn pool<T: Pooled + Default>(&self) -> Result<&Hive<T>> {
        self.ensure_registered::<T>()?;
        Hive::from_raw(self.get_pool(T::CLASS_UID)?)
    }

    pub fn pool_mut<T: Pooled + Default>(&mut self) -> Result<&mut Hive<T>> {
        self.ensure_registered::<T>()?;
        self.get_pool(T::CLASS_UID)?;
        match self.pools.get_mut().get_mut(&T::CLASS_UID) {
            Some(pool) => Hive::from_raw_mut(pool),
            None => unreachable!("hive was just created"),
        }
    }

    /// Does a hive for `uid` exist already?
    pub fn has_pool(&self, uid: ClassUid) -> bool {
        self.pools.borrow().contains_key(&uid)
    }

    /// Rust type registered for `uid`, if any
    pub fn instance_type(&self, uid: ClassUid) -> Option<TypeId> {
        self.factories
            .borrow()
            .get(&uid)
            .and_then(|f| f.instance_type())
    }
}
