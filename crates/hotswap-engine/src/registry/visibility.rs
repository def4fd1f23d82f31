//! Visibility promotion and access rules
//!
//! Executor units are separate accessors from the type whose bodies they
//! hold, so a private nested type (a closure host, a helper) would become
//! unreachable from its enclosing type's executor. Promotion makes the
//! loaded unit of such a type public at registration.

use hotswap_unit::{access, enclosing_type_of, package_of, TypeUnit};

/// Make a restricted nested type public; returns whether anything changed
pub fn promote(unit: &mut TypeUnit) -> bool {
    if unit.is_public() || enclosing_type_of(&unit.name).is_none() {
        return false;
    }
    unit.access = (unit.access & !access::PRIVATE) | access::PUBLIC;
    true
}

/// Check whether code in `accessor` may reach a type
pub fn is_accessible(accessor: &str, target: &str, target_access: u32) -> bool {
    if target_access & access::PUBLIC != 0 || accessor == target {
        return true;
    }
    if target
        .strip_prefix(accessor)
        .map_or(false, |rest| rest.starts_with('$'))
    {
        return true;
    }
    target_access & access::PRIVATE == 0 && package_of(accessor) == package_of(target)
}
