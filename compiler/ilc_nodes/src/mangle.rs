//! Symbol names for nodes.
//!
//! # Scheme
//!
//! ```text
//! _ilc_<module>$<type>[$CN$CN<method>]
//! ```
//!
//! Each `.`-separated module segment is written as `<len><segment>`, so the
//! module ends exactly where the first `$` follows a complete segment. Type
//! and method names keep ASCII letters, digits and `_`; everything else is a
//! `$` escape of fixed width: a two-letter code for common punctuation
//! (`.` → `$DT`, `<` → `$LT`, `:` → `$CN`) or lowercase hex for the rest.
//! Method symbols never carry the compilation-unit prefix since they are
//! shared between units at link time; region and table symbols always do.
//!
//! | Entity | Symbol |
//! |--------|--------|
//! | `App.Program::Main` in `App` | `_ilc_3App$App$DTProgram$CN$CNMain` |
//! | GC static descriptor of `T` | `__GCStaticDesc__ilc_3App$T` |
//! | GC static desc region, prefix `u_` | `u___GCStaticDescStart` |
//! | TLS start on x86 | `__tls_start` |

use std::fmt::Write;

use ilc_ir::{MethodId, TypeId, TypeSystem, TypeSystemEntity};

use crate::config::FactoryConfig;

pub const MANGLE_PREFIX: &str = "_ilc_";

/// Ends the module part of an entity symbol.
const MODULE_SEP: char = '$';

/// Which boundary of a region a symbol marks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegionBound {
    Start,
    End,
}

impl RegionBound {
    fn suffix(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::End => "End",
        }
    }
}

#[derive(Clone, Debug)]
pub struct NameMangler {
    unit_prefix: String,
    imported_tls_index_prefix: String,
    tls_prefix: &'static str,
}

impl NameMangler {
    #[must_use]
    pub fn new(config: &FactoryConfig) -> Self {
        Self {
            unit_prefix: config.compilation_unit_prefix().to_string(),
            imported_tls_index_prefix: config.imported_tls_index_prefix().to_string(),
            tls_prefix: config.target().tls_symbol_prefix(),
        }
    }

    pub fn compilation_unit_prefix(&self) -> &str {
        &self.unit_prefix
    }

    // === Entities ===

    #[allow(clippy::unused_self)]
    #[must_use]
    pub fn type_symbol(&self, types: &TypeSystem, ty: TypeId) -> String {
        let mut out = String::with_capacity(64);
        out.push_str(MANGLE_PREFIX);
        Self::encode_module(&mut out, &types.module_desc(types.module_of_type(ty)).name);
        out.push(MODULE_SEP);
        Self::encode_identifier(&mut out, &types.type_name(ty));
        out
    }

    #[allow(clippy::unused_self)]
    #[must_use]
    pub fn method_symbol(&self, types: &TypeSystem, method: MethodId) -> String {
        let mut out = String::with_capacity(96);
        out.push_str(MANGLE_PREFIX);
        Self::encode_module(&mut out, &types.module_desc(types.module_of_method(method)).name);
        out.push(MODULE_SEP);
        Self::encode_identifier(&mut out, &types.method_name(method));
        out
    }

    /// Entry of the stub that unboxes `this` before running `method`.
    #[must_use]
    pub fn unboxing_symbol(&self, types: &TypeSystem, method: MethodId) -> String {
        let mut out = self.method_symbol(types, method);
        out.push_str("$unbox");
        out
    }

    #[must_use]
    pub fn shadow_method_symbol(&self, types: &TypeSystem, method: MethodId, unboxing: bool) -> String {
        let inner = if unboxing {
            self.unboxing_symbol(types, method)
        } else {
            self.method_symbol(types, method)
        };
        format!("__ShadowConcreteMethod_{inner}")
    }

    #[must_use]
    pub fn fat_pointer_symbol(&self, types: &TypeSystem, method: MethodId, unboxing: bool) -> String {
        let inner = if unboxing {
            self.unboxing_symbol(types, method)
        } else {
            self.method_symbol(types, method)
        };
        format!("__fatpointer_{inner}")
    }

    #[must_use]
    pub fn dictionary_layout_symbol(&self, types: &TypeSystem, owner: TypeSystemEntity) -> String {
        let inner = match owner {
            TypeSystemEntity::Method(m) => self.method_symbol(types, m),
            TypeSystemEntity::Type(t) => self.type_symbol(types, t),
        };
        format!("__DictionaryLayout_{inner}")
    }

    // === Per-type statics ===

    #[must_use]
    pub fn gc_static_desc_symbol(&self, types: &TypeSystem, ty: TypeId, thread_static: bool) -> String {
        let kind = if thread_static {
            "__ThreadStaticGCDesc_"
        } else {
            "__GCStaticDesc_"
        };
        format!("{kind}{}", self.type_symbol(types, ty))
    }

    #[must_use]
    pub fn thread_statics_offset_symbol(&self, types: &TypeSystem, ty: TypeId) -> String {
        format!("__ThreadStaticsOffset_{}", self.type_symbol(types, ty))
    }

    /// Block holding the type's thread statics inside the TLS area.
    #[must_use]
    pub fn thread_statics_block_symbol(&self, types: &TypeSystem, ty: TypeId) -> String {
        format!("__ThreadStatics_{}", self.type_symbol(types, ty))
    }

    #[must_use]
    pub fn gc_static_base_symbol(&self, types: &TypeSystem, ty: TypeId) -> String {
        format!("__GCStaticBase_{}", self.type_symbol(types, ty))
    }

    #[must_use]
    pub fn eager_cctor_symbol(&self, types: &TypeSystem, cctor: MethodId) -> String {
        format!("__EagerCctor_{}", self.method_symbol(types, cctor))
    }

    /// TLS index of this unit.
    #[must_use]
    pub fn thread_statics_index_symbol(&self) -> String {
        Self::tls_index_symbol(&self.unit_prefix)
    }

    /// TLS index of the unit that owns foreign thread statics.
    #[must_use]
    pub fn imported_thread_statics_index_symbol(&self) -> String {
        Self::tls_index_symbol(&self.imported_tls_index_prefix)
    }

    // === Target TLS symbols ===

    #[must_use]
    pub fn tls_start_symbol(&self) -> String {
        format!("{}_tls_start", self.tls_prefix)
    }

    #[must_use]
    pub fn tls_end_symbol(&self) -> String {
        format!("{}_tls_end", self.tls_prefix)
    }

    #[must_use]
    pub fn tls_directory_symbol(&self) -> String {
        format!("{}_tls_used", self.tls_prefix)
    }

    // === Unit tables ===

    /// Boundary of the region named `name`, e.g. `GCStaticDesc`.
    #[must_use]
    pub fn region_symbol(&self, name: &str, bound: RegionBound) -> String {
        format!("{}__{name}{}", self.unit_prefix, bound.suffix())
    }

    /// A single-instance table of this unit, e.g. `ReadyToRunHeader`.
    #[must_use]
    pub fn unit_symbol(&self, name: &str) -> String {
        format!("{}__{name}", self.unit_prefix)
    }

    #[allow(clippy::unused_self)]
    #[must_use]
    pub fn standalone_region_symbol(&self, desc_symbol: &str, bound: RegionBound) -> String {
        format!("__StandaloneGCStaticDescRegion{}_{desc_symbol}", bound.suffix())
    }

    // === Helpers ===

    #[allow(clippy::unused_self)]
    #[must_use]
    pub fn delegate_ctor_symbol(&self, constructor: &str, target: &str, thunk: Option<&str>) -> String {
        let mut out = format!("__DelegateCtor_{constructor}__{target}");
        if let Some(thunk) = thunk {
            let _ = write!(out, "__{thunk}");
        }
        out
    }

    #[must_use]
    pub fn static_base_helper_symbol(&self, types: &TypeSystem, ty: TypeId, thread_static: bool) -> String {
        let kind = if thread_static {
            "__GetThreadStaticBase_"
        } else {
            "__GetGCStaticBase_"
        };
        format!("{kind}{}", self.type_symbol(types, ty))
    }

    // === Encoding ===

    fn tls_index_symbol(prefix: &str) -> String {
        format!("{prefix}_tls_index")
    }

    fn encode_char_hex(out: &mut String, c: char) {
        let code = u32::from(c);
        if code <= 0xff {
            let _ = write!(out, "${code:02x}");
        } else {
            let _ = write!(out, "$U{code:06x}");
        }
    }

    fn encode_module(out: &mut String, name: &str) {
        let mut segment = String::new();
        for part in name.split('.') {
            segment.clear();
            let mut chars = part.chars();
            // a leading digit would run into the length
            if let Some(first) = chars.next() {
                if first.is_ascii_digit() {
                    Self::encode_char_hex(&mut segment, first);
                    Self::encode_identifier(&mut segment, chars.as_str());
                } else {
                    Self::encode_identifier(&mut segment, part);
                }
            }
            let _ = write!(out, "{}{segment}", segment.len());
        }
    }

    fn encode_identifier(out: &mut String, name: &str) {
        for c in name.chars() {
            match c {
                c if c.is_ascii_alphanumeric() || c == '_' => out.push(c),
                '.' => out.push_str("$DT"),
                '<' => out.push_str("$LT"),
                '>' => out.push_str("$GT"),
                ',' => out.push_str("$CM"),
                ':' => out.push_str("$CN"),
                '[' => out.push_str("$LB"),
                ']' => out.push_str("$RB"),
                '`' => out.push_str("$BT"),
                _ => Self::encode_char_hex(out, c),
            }
        }
    }
}
