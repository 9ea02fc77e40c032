//! Capability properties: the bounding set and the ambient set.

use stein_common::caps::{all_capabilities, os_mode_capabilities, suid_capabilities};
use stein_common::value::{format_bool, parse_bool};
use stein_common::{Capabilities, SteinError, SteinResult};

use crate::container::{Prop, VirtMode};

use super::{PropCtx, Property, Registry};

/// Validate and assign a new bounding set.
///
/// The set must stay inside the kernel capability space and, for anyone but
/// a host-root client configuring a host-root-owned container, inside the
/// intersection of every ancestor's bounding set and the owner's base set.
fn commit_limit(ctx: &mut PropCtx, limit: Capabilities) -> SteinResult<()> {
    ctx.alive_and_stopped()?;

    let all = all_capabilities();
    if !limit.subset_of(all) {
        return Err(SteinError::invalid_value(format!(
            "Unsupported capability: {}",
            limit.difference(all).format()
        )));
    }

    if !ctx.restoring {
        let mut bound = if ctx.client.is_superuser() {
            all
        } else if ctx.ct.virt_mode == VirtMode::Os {
            os_mode_capabilities()
        } else {
            suid_capabilities()
        };

        if !(ctx.client.is_superuser() && ctx.ct.owner_cred.is_root()) {
            bound &= ctx.ct.ancestor_cap_bound();
        }

        if !limit.subset_of(bound) {
            return Err(SteinError::permission(format!(
                "Not allowed capability: {}, you can set only: {}",
                limit.difference(bound).format(),
                bound.format()
            )));
        }
    }

    ctx.ct.cap_limit = limit;
    ctx.ct.set_prop(Prop::CapLimit);
    ctx.ct.sanitize_capabilities(ctx.host.info.has_ambient_caps);
    Ok(())
}

/// Validate and assign a new ambient set, widening the bounding set when
/// the requested bits are allowed but not yet bounded.
fn commit_ambient(ctx: &mut PropCtx, ambient: Capabilities) -> SteinResult<()> {
    ctx.alive_and_stopped()?;

    let all = all_capabilities();
    if !ambient.subset_of(all) {
        return Err(SteinError::invalid_value(format!(
            "Unsupported capability: {}",
            ambient.difference(all).format()
        )));
    }

    if !ctx.restoring && !ctx.client.is_superuser() && !ambient.subset_of(ctx.ct.cap_allowed) {
        return Err(SteinError::permission(format!(
            "Not allowed capability: {}, you can set only: {}",
            ambient.difference(ctx.ct.cap_allowed).format(),
            ctx.ct.cap_allowed.format()
        )));
    }

    if !ambient.subset_of(ctx.ct.cap_limit) {
        let widened = ctx.ct.cap_limit | ambient;
        commit_limit(ctx, widened)?;
    }

    ctx.ct.cap_ambient = ambient;
    ctx.ct.set_prop(Prop::CapAmbient);
    ctx.ct.sanitize_capabilities(ctx.host.info.has_ambient_caps);
    Ok(())
}

struct CapLimit;
static CAPABILITIES: CapLimit = CapLimit;

impl Property for CapLimit {
    fn name(&self) -> &'static str {
        "capabilities"
    }
    fn desc(&self) -> &'static str {
        "Limit capabilities in the container: SYS_ADMIN;NET_ADMIN;... see man capabilities"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::CapLimit)
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.cap_limit.format())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        let caps = Capabilities::parse(value)?;
        commit_limit(ctx, caps)
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        let caps = Capabilities::parse(index)?;
        Ok(format_bool(caps.subset_of(ctx.ct.cap_limit)).to_string())
    }
    fn set_indexed(&self, ctx: &mut PropCtx, index: &str, value: &str) -> SteinResult<()> {
        let caps = Capabilities::parse(index)?;
        let limit = if parse_bool(value)? {
            ctx.ct.cap_limit | caps
        } else {
            ctx.ct.cap_limit.difference(caps)
        };
        commit_limit(ctx, limit)
    }
}

struct CapAmbient;
static CAPABILITIES_AMBIENT: CapAmbient = CapAmbient;

impl Property for CapAmbient {
    fn name(&self) -> &'static str {
        "capabilities_ambient"
    }
    fn desc(&self) -> &'static str {
        "Raise capabilities in the container: NET_BIND_SERVICE;SYS_PTRACE;..."
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::CapAmbient)
    }
    fn indexable(&self) -> bool {
        true
    }
    fn supported(&self, host: &crate::host::Host) -> bool {
        host.info.has_ambient_caps
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.cap_ambient.format())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        let caps = Capabilities::parse(value)?;
        commit_ambient(ctx, caps)
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        let caps = Capabilities::parse(index)?;
        Ok(format_bool(caps.subset_of(ctx.ct.cap_ambient)).to_string())
    }
    fn set_indexed(&self, ctx: &mut PropCtx, index: &str, value: &str) -> SteinResult<()> {
        let caps = Capabilities::parse(index)?;
        let ambient = if parse_bool(value)? {
            ctx.ct.cap_ambient | caps
        } else {
            ctx.ct.cap_ambient.difference(caps)
        };
        commit_ambient(ctx, ambient)
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add(&CAPABILITIES);
    registry.add(&CAPABILITIES_AMBIENT);
}
