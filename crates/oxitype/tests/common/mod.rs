// Common test utilities for integration tests
//
// Shared fixtures: unique type names, call recorders, and small type
// hierarchies used across several test files.

#![allow(dead_code)]

use oxitype::{Registry, TypeFlags, TypeId, TypeInfo};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

static NAME_ID: AtomicUsize = AtomicUsize::new(0);

/// Returns `prefix` with a process-unique suffix.
pub fn unique_name(prefix: &str) -> String {
    let id = NAME_ID.fetch_add(1, Ordering::SeqCst);
    format!("{prefix}_{id}")
}

/// Ordered record of callback invocations.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.calls.lock().unwrap().push(entry.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

/// Registers a classed root type.
pub fn classed_root(registry: &Registry, prefix: &str, class_size: usize, flags: TypeFlags) -> TypeId {
    registry
        .register(
            &unique_name(prefix),
            TypeId::INVALID,
            TypeInfo::new().with_class_size(class_size),
            flags,
        )
        .expect("Failed to register root type")
}

/// Registers a type deriving `parent`.
pub fn derived(registry: &Registry, prefix: &str, parent: TypeId, class_size: usize) -> TypeId {
    registry
        .register(
            &unique_name(prefix),
            parent,
            TypeInfo::new().with_class_size(class_size),
            TypeFlags::empty(),
        )
        .expect("Failed to register derived type")
}

/// Registers an interface deriving the builtin interface root.
pub fn interface(registry: &Registry, prefix: &str, class_size: usize) -> TypeId {
    registry
        .register(
            &unique_name(prefix),
            TypeId::INTERFACE,
            TypeInfo::new().with_class_size(class_size),
            TypeFlags::empty(),
        )
        .expect("Failed to register interface")
}

/// Registers an instantiable type deriving the builtin instance root.
pub fn object_type(registry: &Registry, prefix: &str, instance_size: usize) -> TypeId {
    registry
        .register(
            &unique_name(prefix),
            TypeId::INSTANCE,
            TypeInfo::new()
                .with_class_size(16)
                .with_instance_size(instance_size),
            TypeFlags::empty(),
        )
        .expect("Failed to register object type")
}

/// Class and instance callbacks that record into `log` under `label`.
pub fn recording_info(log: &CallLog, label: &str, class_size: usize) -> TypeInfo {
    let (a, b) = (log.clone(), log.clone());
    let (init, fin) = (format!("init {label}"), format!("final {label}"));
    TypeInfo::new()
        .with_class_size(class_size)
        .on_class_init(move |_, _| {
            a.push(init.clone());
            Ok(())
        })
        .on_class_final(move |_, _| {
            b.push(fin.clone());
            Ok(())
        })
}
