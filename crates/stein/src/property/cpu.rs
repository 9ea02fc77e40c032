//! CPU scheduling and bandwidth properties.

use stein_common::value::{format_cpu_value, parse_cpu_value};
use stein_common::{SteinError, SteinResult};

use crate::cgroup::Controllers;
use crate::container::{CpuPolicy, Prop};

use super::{PropCtx, Property, Registry};

struct CpuPolicyProp;
static CPU_POLICY: CpuPolicyProp = CpuPolicyProp;

impl Property for CpuPolicyProp {
    fn name(&self) -> &'static str {
        "cpu_policy"
    }
    fn desc(&self) -> &'static str {
        "CPU policy: rt, high, normal, batch, idle, iso (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::CpuPolicy)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.cpu_policy.as_str().to_string())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let policy = CpuPolicy::parse(value)?;
        ctx.ct.cpu_policy = policy;
        ctx.ct.set_prop(Prop::CpuPolicy);

        // the scheduling triple is derived state, rebuilt from scratch
        let (sched, prio, nice) =
            policy.sched_triple(&ctx.host.config, ctx.host.smart_supported());
        ctx.ct.sched_policy = sched;
        ctx.ct.sched_prio = prio;
        ctx.ct.sched_nice = nice;
        Ok(())
    }
}

struct CpuLimit;
static CPU_LIMIT: CpuLimit = CpuLimit;

impl Property for CpuLimit {
    fn name(&self) -> &'static str {
        "cpu_limit"
    }
    fn desc(&self) -> &'static str {
        "CPU limit: 0-100.0 [%] | 0.0c-<CPUS>c [cores] (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::CpuLimit)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_cpu_value(ctx.ct.cpu_limit))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let limit = parse_cpu_value(value, ctx.host.info.ncores)?;
        if limit > ctx.host.info.ncores as f64 {
            return Err(SteinError::invalid_value(format!(
                "CPU limit above host cores: {value}"
            )));
        }

        if !ctx.restoring && !ctx.client.is_superuser() {
            if let Some(parent) = ctx.ct.parent.upgrade() {
                let parent_limit = parent.read().cpu_limit;
                if parent_limit > 0.0 && (limit == 0.0 || limit > parent_limit) {
                    return Err(SteinError::invalid_value(format!(
                        "CPU limit above parent limit: {value}"
                    )));
                }
            }
        }

        ctx.want_controllers(Controllers::CPU)?;
        ctx.ct.cpu_limit = limit;
        ctx.ct.set_prop(Prop::CpuLimit);
        Ok(())
    }
}

struct CpuGuarantee;
static CPU_GUARANTEE: CpuGuarantee = CpuGuarantee;

impl Property for CpuGuarantee {
    fn name(&self) -> &'static str {
        "cpu_guarantee"
    }
    fn desc(&self) -> &'static str {
        "CPU guarantee: 0-100.0 [%] | 0.0c-<CPUS>c [cores] (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::CpuGuarantee)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_cpu_value(ctx.ct.cpu_guarantee))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let guarantee = parse_cpu_value(value, ctx.host.info.ncores)?;

        if let Some(parent) = ctx.ct.parent.upgrade() {
            let parent = parent.read();
            if !parent.is_root() && guarantee > parent.cpu_guarantee {
                tracing::warn!(container = %ctx.ct.name, guarantee,
                               parent_guarantee = parent.cpu_guarantee,
                               "cpu guarantee above parent guarantee");
            }
        }

        ctx.want_controllers(Controllers::CPU)?;
        ctx.ct.cpu_guarantee = guarantee;
        ctx.ct.set_prop(Prop::CpuGuarantee);
        Ok(())
    }
}

struct CpuSet;
static CPU_SET: CpuSet = CpuSet;

impl Property for CpuSet {
    fn name(&self) -> &'static str {
        "cpu_set"
    }
    fn desc(&self) -> &'static str {
        "CPU set: [N|N-M,]... | node N (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::CpuSet)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.cpu_set.clone())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let spec = value.trim();
        let list = spec.strip_prefix("node ").unwrap_or(spec);
        if !list.is_empty()
            && !list
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, ',' | '-'))
        {
            return Err(SteinError::invalid_value(format!("Invalid cpu set: {value}")));
        }

        ctx.want_controllers(Controllers::CPUSET)?;
        ctx.ct.cpu_set = spec.to_string();
        ctx.ct.set_prop(Prop::CpuSet);
        Ok(())
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add(&CPU_POLICY);
    registry.add(&CPU_LIMIT);
    registry.add(&CPU_GUARANTEE);
    registry.add(&CPU_SET);
}
