//! Owned description of a native module: its metadata, inline source and
//! foreign class tables.
//!
//! Descriptors are either copied out of the [`RawModule`] a library hands
//! back from its create function, or put together in Rust for modules that
//! are compiled into the host:
//!
//! ```
//! # use icetea_ffi::{ClassDescriptor, ModuleDescriptor};
//! # unsafe extern "C" fn foo_add(_vm: *mut std::ffi::c_void) {}
//! let module = ModuleDescriptor::new("foo")
//!     .with_version("0.0.1")
//!     .with_class(ClassDescriptor::new("FooLibrary").with_method("add(_,_)", foo_add))
//!     .with_source("foreign class FooLibrary {\n  foreign add(_,_)\n}\n");
//! assert_eq!(module.classes().len(), 1);
//! ```

use std::ffi::{CStr, c_char, c_void};
use std::ptr;

use serde::Serialize;

use crate::abi::{
    AllocateFn, FinalizeFn, ForeignMethodFn, RawClass, RawMethod, RawModule, leak_string,
    leak_table, table_len,
};
use crate::error::DescriptorError;

#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub signature: String,
    pub is_static: bool,
    pub method: ForeignMethodFn,
}

#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub name: String,
    pub allocate: Option<AllocateFn>,
    pub finalize: Option<FinalizeFn>,
    pub methods: Vec<MethodDescriptor>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allocate: None,
            finalize: None,
            methods: Vec::new(),
        }
    }

    pub fn with_allocator(mut self, allocate: AllocateFn, finalize: Option<FinalizeFn>) -> Self {
        self.allocate = Some(allocate);
        self.finalize = finalize;
        self
    }

    /// Adds an instance method.
    pub fn with_method(mut self, signature: impl Into<String>, method: ForeignMethodFn) -> Self {
        self.methods.push(MethodDescriptor {
            signature: signature.into(),
            is_static: false,
            method,
        });
        self
    }

    pub fn with_static_method(
        mut self,
        signature: impl Into<String>,
        method: ForeignMethodFn,
    ) -> Self {
        self.methods.push(MethodDescriptor {
            signature: signature.into(),
            is_static: true,
            method,
        });
        self
    }

    /// Method with exactly this signature and static flag.
    pub fn method(&self, is_static: bool, signature: &str) -> Option<&MethodDescriptor> {
        self.methods
            .iter()
            .find(|method| method.is_static == is_static && method.signature == signature)
    }
}

#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub name: String,
    pub copyright: Option<String>,
    pub version: Option<String>,
    pub source: Option<String>,
    pub classes: Vec<ClassDescriptor>,
    /// Opaque to the registry; handed back to the module on exit.
    pub user_data: *mut c_void,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            copyright: None,
            version: None,
            source: None,
            classes: Vec::new(),
            user_data: ptr::null_mut(),
        }
    }

    pub fn with_copyright(mut self, copyright: impl Into<String>) -> Self {
        self.copyright = Some(copyright.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_class(mut self, class: ClassDescriptor) -> Self {
        self.classes.push(class);
        self
    }

    pub fn with_user_data(mut self, user_data: *mut c_void) -> Self {
        self.user_data = user_data;
        self
    }

    pub fn classes(&self) -> &[ClassDescriptor] {
        &self.classes
    }

    pub fn class(&self, name: &str) -> Option<&ClassDescriptor> {
        self.classes.iter().find(|class| class.name == name)
    }

    pub fn summary(&self) -> ModuleSummary {
        ModuleSummary {
            name: self.name.clone(),
            copyright: self.copyright.clone(),
            version: self.version.clone(),
            has_source: self.source.is_some(),
            classes: self
                .classes
                .iter()
                .map(|class| ClassSummary {
                    name: class.name.clone(),
                    foreign: class.allocate.is_some(),
                    methods: class
                        .methods
                        .iter()
                        .map(|method| {
                            if method.is_static {
                                format!("static {}", method.signature)
                            } else {
                                method.signature.clone()
                            }
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl ModuleDescriptor {
    /// Copies a descriptor handed out by a native module.
    ///
    /// A missing module name falls back to `fallback_name`. Class tables
    /// stop at the first unnamed class, method tables at the first entry
    /// without a signature.
    ///
    /// # Safety
    /// Every non-null pointer in `raw` must be valid and the tables must be
    /// terminated as described in [`abi`](crate::abi).
    pub unsafe fn from_raw(raw: &RawModule, fallback_name: &str) -> Result<Self, DescriptorError> {
        unsafe {
            let name = read_string(raw.name, "name")?.unwrap_or_else(|| fallback_name.to_owned());
            let mut classes = Vec::new();

            if !raw.classes.is_null() {
                let count = table_len(raw.classes, |class| class.name.is_null());
                for index in 0..count {
                    classes.push(read_class(&*raw.classes.add(index))?);
                }
            }

            Ok(Self {
                name,
                copyright: read_string(raw.copyright, "copyright")?,
                version: read_string(raw.version, "version")?,
                source: read_string(raw.source, "source")?,
                classes,
                user_data: raw.user_data,
            })
        }
    }

    /// Lays the descriptor out in the C ABI so a module written in Rust can
    /// return it from its create function. Free it with [`RawModule::free`].
    pub fn into_raw(self) -> Result<*mut RawModule, DescriptorError> {
        self.check_strings()?;

        let classes = self
            .classes
            .iter()
            .map(|class| {
                let methods = class
                    .methods
                    .iter()
                    .map(|method| RawMethod {
                        is_static: method.is_static,
                        signature: leak_string(&method.signature),
                        method: Some(method.method),
                    })
                    .chain(std::iter::once(RawMethod::END))
                    .collect();
                RawClass {
                    name: leak_string(&class.name),
                    allocate: class.allocate,
                    finalize: class.finalize,
                    methods: leak_table(methods),
                }
            })
            .chain(std::iter::once(RawClass::END))
            .collect();

        let optional = |value: &Option<String>| value.as_deref().map_or(ptr::null(), leak_string);
        Ok(Box::into_raw(Box::new(RawModule {
            name: leak_string(&self.name),
            copyright: optional(&self.copyright),
            version: optional(&self.version),
            classes: leak_table(classes),
            source: optional(&self.source),
            user_data: self.user_data,
        })))
    }

    fn check_strings(&self) -> Result<(), DescriptorError> {
        let check = |value: &str, field: &str| {
            if value.contains('\0') {
                Err(DescriptorError::InteriorNul {
                    field: field.to_owned(),
                })
            } else {
                Ok(())
            }
        };

        check(&self.name, "name")?;
        for (value, field) in [
            (&self.copyright, "copyright"),
            (&self.version, "version"),
            (&self.source, "source"),
        ] {
            if let Some(value) = value {
                check(value, field)?;
            }
        }
        for class in &self.classes {
            check(&class.name, "class name")?;
            for method in &class.methods {
                check(&method.signature, "method signature")?;
            }
        }
        Ok(())
    }
}

/// Serializable overview of a module, for tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub copyright: Option<String>,
    pub version: Option<String>,
    pub has_source: bool,
    pub classes: Vec<ClassSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassSummary {
    pub name: String,
    pub foreign: bool,
    pub methods: Vec<String>,
}

unsafe fn read_class(raw: &RawClass) -> Result<ClassDescriptor, DescriptorError> {
    unsafe {
        let name = read_string(raw.name, "class name")?.unwrap_or_default();
        let mut methods = Vec::new();

        if !raw.methods.is_null() {
            let count = table_len(raw.methods, |method| method.signature.is_null());
            for index in 0..count {
                let method = &*raw.methods.add(index);
                let signature = read_string(method.signature, "method signature")?.unwrap_or_default();
                let Some(function) = method.method else {
                    return Err(DescriptorError::MissingMethod {
                        class: name,
                        signature,
                    });
                };
                methods.push(MethodDescriptor {
                    signature,
                    is_static: method.is_static,
                    method: function,
                });
            }
        }

        Ok(ClassDescriptor {
            name,
            allocate: raw.allocate,
            finalize: raw.finalize,
            methods,
        })
    }
}

unsafe fn read_string(value: *const c_char, field: &str) -> Result<Option<String>, DescriptorError> {
    if value.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(value) }
        .to_str()
        .map(|value| Some(value.to_owned()))
        .map_err(|_| DescriptorError::InvalidUtf8 {
            field: field.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn noop(_vm: *mut c_void) {}
    unsafe extern "C" fn drop_data(_data: *mut c_void) {}

    fn sample() -> ModuleDescriptor {
        ModuleDescriptor::new("foo")
            .with_version("0.0.1")
            .with_copyright("(c) IceTea Contributors")
            .with_source("foreign class FooLibrary {}")
            .with_class(
                ClassDescriptor::new("FooLibrary")
                    .with_allocator(noop, Some(drop_data))
                    .with_method("add(_,_)", noop)
                    .with_static_method("create()", noop),
            )
            .with_class(ClassDescriptor::new("Helpers").with_static_method("id(_)", noop))
    }

    #[test]
    fn raw_layout_survives_a_round_trip() {
        let raw = sample().into_raw().unwrap();
        let copied = unsafe { ModuleDescriptor::from_raw(&*raw, "fallback") }.unwrap();
        unsafe { RawModule::free(raw) };

        assert_eq!(copied.name, "foo");
        assert_eq!(copied.version.as_deref(), Some("0.0.1"));
        assert_eq!(copied.source.as_deref(), Some("foreign class FooLibrary {}"));
        assert_eq!(copied.classes.len(), 2);

        let foo = copied.class("FooLibrary").unwrap();
        assert!(foo.allocate.is_some());
        assert!(foo.finalize.is_some());
        assert!(foo.method(false, "add(_,_)").is_some());
        assert!(foo.method(true, "create()").is_some());
        assert!(foo.method(true, "add(_,_)").is_none());
    }

    #[test]
    fn unnamed_modules_use_the_fallback() {
        let raw = RawModule {
            name: ptr::null(),
            copyright: ptr::null(),
            version: ptr::null(),
            classes: ptr::null(),
            source: ptr::null(),
            user_data: ptr::null_mut(),
        };
        let copied = unsafe { ModuleDescriptor::from_raw(&raw, "zlib") }.unwrap();
        assert_eq!(copied.name, "zlib");
        assert!(copied.classes.is_empty());
        assert!(copied.source.is_none());
    }

    #[test]
    fn methods_without_implementation_are_rejected() {
        let methods = [
            RawMethod {
                is_static: false,
                signature: c"broken()".as_ptr(),
                method: None,
            },
            RawMethod::END,
        ];
        let classes = [
            RawClass {
                name: c"Broken".as_ptr(),
                allocate: None,
                finalize: None,
                methods: methods.as_ptr(),
            },
            RawClass::END,
        ];
        let raw = RawModule {
            name: c"broken".as_ptr(),
            copyright: ptr::null(),
            version: ptr::null(),
            classes: classes.as_ptr(),
            source: ptr::null(),
            user_data: ptr::null_mut(),
        };

        let err = unsafe { ModuleDescriptor::from_raw(&raw, "broken") }.unwrap_err();
        assert_eq!(
            err,
            DescriptorError::MissingMethod {
                class: "Broken".to_owned(),
                signature: "broken()".to_owned(),
            }
        );
    }

    #[test]
    fn interior_nul_cannot_be_exported() {
        let err = ModuleDescriptor::new("bad\0name").into_raw().unwrap_err();
        assert_eq!(
            err,
            DescriptorError::InteriorNul {
                field: "name".to_owned()
            }
        );
    }

    #[test]
    fn summary_lists_static_methods() {
        let summary = sample().summary();
        assert_eq!(summary.classes[0].methods, vec!["add(_,_)", "static create()"]);
        assert!(summary.classes[0].foreign);
        assert!(!summary.classes[1].foreign);
        assert!(summary.has_source);
    }
}
