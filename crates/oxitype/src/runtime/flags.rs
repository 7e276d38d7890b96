//! Type flags.
//!
//! The low six bits are *root* flags: they describe a whole derivation tree
//! and may only be given when registering a root type. Derived types inherit
//! them from their root. The remaining bits are per-type flags.

use bitflags::bitflags;

bitflags! {
    /// Root and per-type flags of a registered type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u32 {
        /// The type may declare dependencies.
        const DEPENDENT      = 1 << 0;
        /// The type has a shared per-type class.
        const CLASSED        = 1 << 1;
        /// The type is an interface: classed, never instantiable.
        const INTERFACED     = 1 << 2;
        /// The type supports per-object instances.
        const INSTANTIABLE   = 1 << 3;
        /// One level of derivation from the root is allowed.
        const DERIVABLE      = 1 << 4;
        /// Unlimited levels of derivation are allowed.
        const DEEP_DERIVABLE = 1 << 5;

        /// Registered by the registry itself; cannot be unregistered.
        const BUILTIN        = 1 << 6;
        /// Once built, the class is never torn down.
        const CLASS_PINNED   = 1 << 8;
        /// The class is built eagerly at registration.
        const CLASS_PREINIT  = 1 << 9;
        /// Never reported through interface maps.
        const UNMAPPABLE     = 1 << 10;
        /// Cannot be instantiated directly.
        const ABSTRACT       = 1 << 12;
        /// Cannot be derived from.
        const FINAL          = 1 << 13;

        /// Every root flag.
        const ROOT_MASK = Self::DEPENDENT.bits()
            | Self::CLASSED.bits()
            | Self::INTERFACED.bits()
            | Self::INSTANTIABLE.bits()
            | Self::DERIVABLE.bits()
            | Self::DEEP_DERIVABLE.bits();
    }
}

impl TypeFlags {
    /// Returns only the root flags.
    #[must_use]
    pub fn root_flags(self) -> TypeFlags {
        self & TypeFlags::ROOT_MASK
    }

    /// Returns only the per-type flags.
    #[must_use]
    pub fn type_flags(self) -> TypeFlags {
        self - TypeFlags::ROOT_MASK
    }

    /// Adds every flag implied by the ones already set.
    ///
    /// Size- and dependency-derived root flags are only added for root types
    /// (`is_root`), since derived types take their root flags from the root.
    #[must_use]
    pub fn with_implied(
        mut self,
        is_root: bool,
        has_dependencies: bool,
        class_size: usize,
        instance_size: usize,
    ) -> TypeFlags {
        if is_root && has_dependencies {
            self |= TypeFlags::DEPENDENT;
        }
        if is_root && class_size > 0 {
            self |= TypeFlags::CLASSED;
        }
        if is_root && instance_size > 0 {
            self |= TypeFlags::INSTANTIABLE;
        }
        if self.contains(TypeFlags::CLASS_PREINIT) {
            self |= TypeFlags::CLASS_PINNED;
        }
        if self.contains(TypeFlags::INTERFACED) {
            self |= TypeFlags::CLASSED | TypeFlags::DEPENDENT;
        }
        if self.contains(TypeFlags::INSTANTIABLE) {
            self |= TypeFlags::CLASSED;
        }
        if self.contains(TypeFlags::DEEP_DERIVABLE) {
            self |= TypeFlags::DERIVABLE;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_mask_split() {
        let flags = TypeFlags::CLASSED | TypeFlags::ABSTRACT | TypeFlags::DERIVABLE;
        assert_eq!(flags.root_flags(), TypeFlags::CLASSED | TypeFlags::DERIVABLE);
        assert_eq!(flags.type_flags(), TypeFlags::ABSTRACT);
    }

    #[test]
    fn test_implied_flags_for_root() {
        let flags = TypeFlags::empty().with_implied(true, true, 16, 32);
        assert!(flags.contains(
            TypeFlags::DEPENDENT | TypeFlags::CLASSED | TypeFlags::INSTANTIABLE
        ));
    }

    #[test]
    fn test_implied_flags_for_derived() {
        let flags = TypeFlags::empty().with_implied(false, true, 16, 32);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_implied_chains() {
        let flags = TypeFlags::INTERFACED.with_implied(true, false, 0, 0);
        assert!(flags.contains(TypeFlags::CLASSED | TypeFlags::DEPENDENT));

        let flags = TypeFlags::DEEP_DERIVABLE.with_implied(true, false, 0, 0);
        assert!(flags.contains(TypeFlags::DERIVABLE));

        let flags = TypeFlags::CLASS_PREINIT.with_implied(false, false, 0, 0);
        assert!(flags.contains(TypeFlags::CLASS_PINNED));
    }

    #[test]
    fn test_flag_bit_values() {
        assert_eq!(TypeFlags::DEPENDENT.bits(), 0x1);
        assert_eq!(TypeFlags::DEEP_DERIVABLE.bits(), 0x20);
        assert_eq!(TypeFlags::ROOT_MASK.bits(), 0x3f);
        assert_eq!(TypeFlags::FINAL.bits(), 0x2000);
    }
}
