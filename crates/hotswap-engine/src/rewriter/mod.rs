//! Rewriter
//!
//! Turns a supplied version of a reloadable type into two things:
//!
//! - once, at registration, the dispatcher unit the host runtime loads
//!   under the type's name ([`build_dispatcher`])
//! - for every version, an executor unit (`<name>$$E<version>`) holding
//!   that version's method bodies with member access, calls and closure
//!   creation redirected through the engine ([`rewrite_version`])

mod body;
mod compat;
mod dispatch;

pub use compat::History;
pub use dispatch::build_dispatcher;
pub(crate) use body::host_shape_of;

use crate::capture::SiteBinding;
use crate::error::RejectReason;
use crate::layout::Layout;
use crate::registry::TypeRegistry;
use crate::reloadable::TypeId;
use body::BodyRewriter;
use hotswap_unit::{access, verify_unit, MethodDef, TypeUnit, VerifyMode};
use rustc_hash::FxHashMap;
use tracing::debug;

/// What the rewriter needs to know about the type being rewritten
pub struct RewriteContext<'a> {
    /// Id of the type
    pub type_id: TypeId,
    /// Version index being produced
    pub version: usize,
    /// Baseline layout of the type
    pub layout: &'a Layout,
    /// Methods of the loaded unit, with whether each is static
    pub loaded_methods: &'a FxHashMap<String, bool>,
    /// Registry used to resolve references to other types
    pub registry: &'a TypeRegistry,
    /// Verify the produced executor unit
    pub verify: bool,
}

/// Counters collected while rewriting one version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Field accesses bound to a baseline slot
    pub slot_accesses: usize,
    /// Field accesses routed to the extension store
    pub extension_accesses: usize,
    /// Calls resolved at run time
    pub dynamic_invokes: usize,
    /// Closure creation expressions
    pub capture_sites: usize,
}

/// Result of rewriting one version
#[derive(Debug, Clone)]
pub struct RewrittenVersion {
    /// Executor unit
    pub executor: TypeUnit,
    /// Encoded executor unit
    pub executor_bytes: Vec<u8>,
    /// Capture site bindings to apply when the version is published
    pub bindings: Vec<SiteBinding>,
    /// Counters
    pub stats: RewriteStats,
}

/// Name of the executor unit of a version
pub fn executor_name(type_name: &str, version: usize) -> String {
    format!("{}$$E{}", type_name, version)
}

/// Rewrite one version of a type into its executor unit
pub fn rewrite_version(unit: &TypeUnit, ctx: &RewriteContext<'_>) -> Result<RewrittenVersion, RejectReason> {
    let mut constants = unit.constants.clone();
    let mut bindings = Vec::new();
    let mut stats = RewriteStats::default();
    let mut methods = Vec::with_capacity(unit.methods.len());

    {
        let mut rewriter = BodyRewriter {
            unit,
            ctx,
            constants: &mut constants,
            bindings: &mut bindings,
            stats: &mut stats,
        };
        for method in &unit.methods {
            let code = rewriter.rewrite(method)?;
            methods.push(MethodDef {
                signature: method.signature.clone(),
                flags: method.flags,
                exceptions: method.exceptions.clone(),
                local_count: method.local_count,
                code,
            });
        }
    }

    let executor = TypeUnit {
        format_flags: unit.format_flags,
        name: executor_name(&unit.name, ctx.version),
        super_name: None,
        access: access::PUBLIC | access::SYNTHETIC | access::EXECUTOR,
        constants,
        fields: Vec::new(),
        methods,
        attributes: Vec::new(),
    };

    if ctx.verify {
        verify_unit(&executor, VerifyMode::Rewritten)?;
    }

    debug!(
        executor = %executor.name,
        methods = executor.methods.len(),
        slot_accesses = stats.slot_accesses,
        extension_accesses = stats.extension_accesses,
        dynamic_invokes = stats.dynamic_invokes,
        capture_sites = stats.capture_sites,
        "rewrote version"
    );

    let executor_bytes = executor.encode();
    Ok(RewrittenVersion {
        executor,
        executor_bytes,
        bindings,
        stats,
    })
}
