//! Native module support for IceTea
//!
//! Native modules are shared libraries exporting a pair of entry points,
//! `wrenModule_<id>_create` and `wrenModule_<id>_exit`. The registry loads
//! each library once, keeps the class and method tables it describes, and
//! answers foreign binding lookups from the VM without touching the loader
//! again.

pub mod abi;
pub mod binding;
pub mod descriptor;
pub mod entry;
pub mod error;
pub mod library;
pub mod registry;

pub use abi::{
    AllocateFn, FinalizeFn, ForeignMethodFn, ModuleCreateFn, ModuleExitFn, RawClass, RawMethod,
    RawModule, VmHandle,
};
pub use binding::{ForeignClass, ForeignMethod};
pub use descriptor::{
    ClassDescriptor, ClassSummary, MethodDescriptor, ModuleDescriptor, ModuleSummary,
};
pub use entry::NativeModuleEntry;
pub use error::{DescriptorError, NativeError};
pub use library::{DylibOpener, LibraryOpener, ModuleLibrary, NativeLibrary};
pub use registry::{InstanceTracker, NativeModuleRegistry, NoInstances};
