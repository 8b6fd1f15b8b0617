//! Class identity and the factories that construct pooled objects
//!
//! A hive never constructs or destroys anything itself. It asks the
//! [ObjectFactory] it was created with, which is also what tells it how big
//! and how aligned its slots have to be.

use std::{
    alloc::Layout,
    any::TypeId,
    fmt::{self, Debug, Display},
    marker::PhantomData,
    ptr,
};

/// Unique identifier of a class of pooled objects
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassUid(pub u64);

impl Debug for ClassUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassUid({:016x})", self.0)
    }
}
impl Display for ClassUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Everything a hive needs to know about the class it stores
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassInfo {
    pub uid: ClassUid,
    pub name: &'static str,
    pub layout: Layout,
}

impl ClassInfo {
    pub fn of<T: Pooled>() -> Self {
        Self {
            uid: T::CLASS_UID,
            name: T::class_name(),
            layout: Layout::new::<T>(),
        }
    }
}

/// Types that can live in a hive
pub trait Pooled: Send + Sync + 'static {
    const CLASS_UID: ClassUid;

    fn class_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Constructs and destroys instances of one class in place
///
/// # Safety
///
/// Implementors promise that:
/// * `create_instance` leaves a valid instance of the class at `dst`,
///   fitting inside [ClassInfo::layout]
/// * if `instance_type` returns `Some(id)`, that instance is a Rust value of the
///   type with [TypeId] `id` (typed hives rely on this to hand out `&T`)
/// * instances may be shared with and dropped on any thread
pub unsafe trait ObjectFactory: Send + Sync {
    fn class_info(&self) -> &ClassInfo;

    /// Rust type of the instances, if there is one
    fn instance_type(&self) -> Option<TypeId> {
        None
    }

    /// Construct a default instance at `dst`
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of [ClassInfo::layout] and suitably aligned
    unsafe fn create_instance(&self, dst: *mut u8);

    /// Destroy the instance at `obj` without freeing its memory
    ///
    /// # Safety
    ///
    /// `obj` must hold a live instance created by this factory,
    /// and nothing may access it afterwards
    unsafe fn destroy_instance(&self, obj: *mut u8);
}

/// Factory that constructs objects with [Default::default]
pub struct DefaultFactory<T: Pooled + Default> {
    info: ClassInfo,
    _p: PhantomData<fn() -> T>,
}

impl<T: Pooled + Default> DefaultFactory<T> {
    pub fn new() -> Self {
        Self {
            info: ClassInfo::of::<T>(),
            _p: PhantomData,
        }
    }
}

impl<T: Pooled + Default> Default for DefaultFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Pooled + Default> Debug for DefaultFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultFactory").field("info", &self.info).finish()
    }
}

// safety: we write and drop exactly a T
unsafe impl<T: Pooled + Default> ObjectFactory for DefaultFactory<T> {
    fn class_info(&self) -> &ClassInfo {
        &self.info
    }

    fn instance_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<T>())
    }

    unsafe fn create_instance(&self, dst: *mut u8) {
        ptr::write(dst as *mut T, T::default());
    }

    unsafe fn destroy_instance(&self, obj: *mut u8) {
        ptr::drop_in_place(obj as *mut T);
    }
}

/// Factory that constructs objects by calling a closure
pub struct FnFactory<T: Pooled, F> {
    info: ClassInfo,
    init: F,
    _p: PhantomData<fn() -> T>,
}

impl<T: Pooled, F: Fn() -> T + Send + Sync> FnFactory<T, F> {
    pub fn new(init: F) -> Self {
        Self {
            info: ClassInfo::of::<T>(),
            init,
            _p: PhantomData,
        }
    }
}

impl<T: Pooled, F> Debug for FnFactory<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFactory").field("info", &self.info).finish()
    }
}

// safety: we write and drop exactly a T
unsafe impl<T: Pooled, F: Fn() -> T + Send + Sync> ObjectFactory for FnFactory<T, F> {
    fn class_info(&self) -> &ClassInfo {
        &self.info
    }

    fn instance_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<T>())
    }

    unsafe fn create_instance(&self, dst: *mut u8) {
        ptr::write(dst as *mut T, (self.init)());
    }

    unsafe fn destroy_instance(&self, obj: *mut u8) {
        ptr::drop_in_place(obj as *mut T);
    }
}

#[cfg(test)]
mod tests {
    use std::{mem::MaybeUninit, sync::Arc};

    use super::*;

    #[derive(Default)]
    struct Gadget {
        a: u32,
        #[allow(dead_code)]
        b: Arc<()>,
    }
    impl Pooled for Gadget {
        const CLASS_UID: ClassUid = ClassUid(0x6a);
    }

    #[test]
    fn class_info_of() {
        let info = ClassInfo::of::<Gadget>();
        assert_eq!(info.uid, ClassUid(0x6a));
        assert!(info.name.ends_with("Gadget"));
        assert_eq!(info.layout, Layout::new::<Gadget>());
    }

    #[test]
    fn class_uid_formatting() {
        assert_eq!(format!("{}", ClassUid(0xabc)), "0000000000000abc");
        assert_eq!(format!("{:?}", ClassUid(1)), "ClassUid(0000000000000001)");
    }

    #[test]
    fn default_factory_roundtrip() {
        let factory = DefaultFactory::<Gadget>::new();
        assert_eq!(factory.instance_type(), Some(TypeId::of::<Gadget>()));
        let mut storage = MaybeUninit::<Gadget>::uninit();
        unsafe {
            factory.create_instance(storage.as_mut_ptr() as *mut u8);
            assert_eq!(storage.assume_init_ref().a, 0);
            factory.destroy_instance(storage.as_mut_ptr() as *mut u8);
        }
    }

    #[test]
    fn fn_factory_runs_closure_and_drop() {
        let marker = Arc::new(());
        let marker_for_init = marker.clone();
        let factory = FnFactory::new(move || Gadget {
            a: 7,
            b: marker_for_init.clone(),
        });
        let mut storage = MaybeUninit::<Gadget>::uninit();
        unsafe {
            factory.create_instance(storage.as_mut_ptr() as *mut u8);
            assert_eq!(storage.assume_init_ref().a, 7);
            assert_eq!(Arc::strong_count(&marker), 3);
            factory.destroy_instance(storage.as_mut_ptr() as *mut u8);
        }
        assert_eq!(Arc::strong_count(&marker), 2);
    }
}
