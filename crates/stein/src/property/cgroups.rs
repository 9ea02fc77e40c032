//! Controller mask configuration and cgroup path introspection.

use stein_common::value::{format_bool, format_string_map, parse_bool};
use stein_common::{SteinError, SteinResult};

use crate::cgroup::Controllers;
use crate::container::Prop;

use super::{PropCtx, Property, Registry};

fn commit_controllers(ctx: &mut PropCtx, mask: Controllers) -> SteinResult<()> {
    ctx.alive_and_stopped()?;
    if !mask.contains(ctx.ct.required_controllers) {
        return Err(SteinError::invalid_value(format!(
            "Cannot disable required controllers: {}",
            ctx.ct.required_controllers.difference(mask).format()
        )));
    }
    ctx.ct.controllers = mask;
    ctx.ct.set_prop(Prop::Controllers);
    Ok(())
}

struct ControllersProp;
static CONTROLLERS: ControllersProp = ControllersProp;

impl Property for ControllersProp {
    fn name(&self) -> &'static str {
        "controllers"
    }
    fn desc(&self) -> &'static str {
        "Cgroup controllers enabled for the container: memory;cpu;..."
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Controllers)
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.controllers.format())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        let mask = Controllers::parse(value)?;
        commit_controllers(ctx, mask)
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        let flag = Controllers::parse(index)?;
        Ok(format_bool(ctx.ct.controllers.contains(flag)).to_string())
    }
    fn set_indexed(&self, ctx: &mut PropCtx, index: &str, value: &str) -> SteinResult<()> {
        let flag = Controllers::parse(index)?;
        let mask = if parse_bool(value)? {
            ctx.ct.controllers | flag
        } else {
            ctx.ct.controllers.difference(flag)
        };
        commit_controllers(ctx, mask)
    }
}

struct Cgroups;
static CGROUPS: Cgroups = Cgroups;

impl Property for Cgroups {
    fn name(&self) -> &'static str {
        "cgroups"
    }
    fn desc(&self) -> &'static str {
        "Cgroup paths: <controller>: <path>;... (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        let mut map = std::collections::BTreeMap::new();
        for subsystem in &ctx.host.subsystems {
            map.insert(
                subsystem.controller().type_name().to_string(),
                subsystem.cgroup_path(&ctx.ct.name).display().to_string(),
            );
        }
        Ok(format_string_map(&map))
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        let flag = Controllers::parse(index)?;
        let subsystem = ctx
            .host
            .subsystem(flag)
            .ok_or_else(|| SteinError::invalid_value(format!("invalid index {index}")))?;
        Ok(subsystem.cgroup_path(&ctx.ct.name).display().to_string())
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add(&CONTROLLERS);
    registry.add(&CGROUPS);
}
