//! Memory limit and guarantee properties.

use stein_common::value::{format_bool, parse_bool, parse_size};
use stein_common::{SteinError, SteinResult};

use crate::cgroup::Controllers;
use crate::container::{hierarchy_mem_guarantee, staged_subtree_guarantee, Prop};
use crate::host::Host;

use super::{PropCtx, Property, Registry};

fn check_min_limit(ctx: &PropCtx, limit: u64) -> SteinResult<()> {
    let min = ctx.host.config.min_memory_limit;
    if !ctx.restoring && limit != 0 && limit < min {
        return Err(SteinError::invalid_value(format!(
            "Memory limit must be at least {min}: {limit}"
        )));
    }
    Ok(())
}

fn memory_flag(host: &Host, flag: fn(&dyn crate::cgroup::Subsystem) -> bool) -> bool {
    host.subsystem(Controllers::MEMORY).is_some_and(flag)
}

struct MemLimit;
static MEMORY_LIMIT: MemLimit = MemLimit;

impl Property for MemLimit {
    fn name(&self) -> &'static str {
        "memory_limit"
    }
    fn desc(&self) -> &'static str {
        "Memory hard limit [bytes] (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::MemLimit)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.mem_limit.to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let limit = parse_size(value)?;
        check_min_limit(ctx, limit)?;
        ctx.want_controllers(Controllers::MEMORY)?;
        if ctx.ct.mem_limit != limit {
            ctx.ct.mem_limit = limit;
            ctx.ct.set_prop(Prop::MemLimit);
        }
        Ok(())
    }
}

struct MemGuarantee;
static MEMORY_GUARANTEE: MemGuarantee = MemGuarantee;

impl Property for MemGuarantee {
    fn name(&self) -> &'static str {
        "memory_guarantee"
    }
    fn desc(&self) -> &'static str {
        "Guaranteed amount of memory [bytes] (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::MemGuarantee)
    }
    fn supported(&self, host: &Host) -> bool {
        memory_flag(host, |s| s.supports_guarantee())
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.mem_guarantee.to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let guarantee = parse_size(value)?;

        // stage the new value, then check the whole-tree sum against the
        // host memory minus the configured reserve
        if !ctx.restoring {
            let staged = staged_subtree_guarantee(ctx.ct, guarantee);
            let root = ctx.tree.root();
            let usage = hierarchy_mem_guarantee(&root, Some((ctx.handle, staged)));
            let total = ctx.host.info.total_memory;
            let reserve = ctx.host.config.memory_guarantee_reserve;
            if usage.saturating_add(reserve) > total {
                return Err(SteinError::resource_not_available(format!(
                    "can't guarantee all available memory: requested {guarantee} \
                     (will be {usage} of {total}, reserve {reserve})"
                )));
            }
        }

        ctx.want_controllers(Controllers::MEMORY)?;
        ctx.ct.mem_guarantee = guarantee;
        ctx.ct.set_prop(Prop::MemGuarantee);
        Ok(())
    }
}

struct AnonLimit;
static ANON_LIMIT: AnonLimit = AnonLimit;

impl Property for AnonLimit {
    fn name(&self) -> &'static str {
        "anon_limit"
    }
    fn desc(&self) -> &'static str {
        "Anonymous memory limit [bytes] (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::AnonLimit)
    }
    fn supported(&self, host: &Host) -> bool {
        memory_flag(host, |s| s.supports_anon_limit())
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.anon_mem_limit.to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let limit = parse_size(value)?;
        check_min_limit(ctx, limit)?;
        ctx.want_controllers(Controllers::MEMORY)?;
        if ctx.ct.anon_mem_limit != limit {
            ctx.ct.anon_mem_limit = limit;
            ctx.ct.set_prop(Prop::AnonLimit);
        }
        Ok(())
    }
}

struct DirtyLimit;
static DIRTY_LIMIT: DirtyLimit = DirtyLimit;

impl Property for DirtyLimit {
    fn name(&self) -> &'static str {
        "dirty_limit"
    }
    fn desc(&self) -> &'static str {
        "Dirty file cache limit [bytes] (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::DirtyLimit)
    }
    fn supported(&self, host: &Host) -> bool {
        memory_flag(host, |s| s.supports_dirty_limit())
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.dirty_mem_limit.to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let limit = parse_size(value)?;
        check_min_limit(ctx, limit)?;
        ctx.want_controllers(Controllers::MEMORY)?;
        if ctx.ct.dirty_mem_limit != limit {
            ctx.ct.dirty_mem_limit = limit;
            ctx.ct.set_prop(Prop::DirtyLimit);
        }
        Ok(())
    }
}

struct HugetlbLimit;
static HUGETLB_LIMIT: HugetlbLimit = HugetlbLimit;

impl Property for HugetlbLimit {
    fn name(&self) -> &'static str {
        "hugetlb_limit"
    }
    fn desc(&self) -> &'static str {
        "Huge page limit [bytes], empty value removes the limit (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::HugetlbLimit)
    }
    fn supported(&self, host: &Host) -> bool {
        host.subsystem(Controllers::HUGETLB)
            .is_some_and(|s| s.supported())
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.hugetlb_limit.to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        if value.trim().is_empty() {
            ctx.ct.hugetlb_limit = 0;
            ctx.ct.clear_prop(Prop::HugetlbLimit);
            return Ok(());
        }

        let limit = parse_size(value)?;
        if !ctx.restoring {
            if let Some(subsystem) = ctx.host.subsystem(Controllers::HUGETLB) {
                let usage = subsystem.huge_usage(&ctx.ct.name).unwrap_or(0);
                if usage > limit {
                    return Err(SteinError::invalid_value(format!(
                        "Current hugetlb usage is greater than limit: {usage}"
                    )));
                }
            }
        }

        ctx.want_controllers(Controllers::HUGETLB)?;
        ctx.ct.hugetlb_limit = limit;
        ctx.ct.set_prop(Prop::HugetlbLimit);
        Ok(())
    }
}

struct RechargeOnPgfault;
static RECHARGE_ON_PGFAULT: RechargeOnPgfault = RechargeOnPgfault;

impl Property for RechargeOnPgfault {
    fn name(&self) -> &'static str {
        "recharge_on_pgfault"
    }
    fn desc(&self) -> &'static str {
        "Recharge memory to the faulting container on page fault (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::RechargeOnPgfault)
    }
    fn supported(&self, host: &Host) -> bool {
        memory_flag(host, |s| s.supports_recharge_on_pgfault())
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_bool(ctx.ct.recharge_on_pgfault).to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let recharge = parse_bool(value)?;
        ctx.want_controllers(Controllers::MEMORY)?;
        if ctx.ct.recharge_on_pgfault != recharge {
            ctx.ct.recharge_on_pgfault = recharge;
            ctx.ct.set_prop(Prop::RechargeOnPgfault);
        }
        Ok(())
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add(&MEMORY_LIMIT);
    registry.add(&MEMORY_GUARANTEE);
    registry.add(&ANON_LIMIT);
    registry.add(&DIRTY_LIMIT);
    registry.add(&HUGETLB_LIMIT);
    registry.add(&RECHARGE_ON_PGFAULT);
}
